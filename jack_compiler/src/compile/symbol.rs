use super::vm::Segment;

use smol_str::SmolStr;
use std::{collections::BTreeMap, error, fmt};

/// A declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: SmolStr,
    /// Declared type, either a primitive or a class name.
    pub ty: SmolStr,
    pub role: Role,
    /// Slot within the role's memory segment.
    pub index: u16,
}

impl Symbol {
    #[inline]
    pub fn segment(&self) -> Segment {
        self.role.segment()
    }
}

/// Storage category of a declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Class level, shared by all instances.
    Static,
    /// Class level, one per instance.
    Field,
    /// Subroutine parameter.
    Argument,
    /// Subroutine local variable.
    Local,
}

impl Role {
    /// Memory segment where symbols of this role live.
    #[rustfmt::skip]
    pub fn segment(&self) -> Segment {
        match self {
            Role::Static   => Segment::Static,
            Role::Field    => Segment::This,
            Role::Argument => Segment::Argument,
            Role::Local    => Segment::Local,
        }
    }

    fn slot(&self) -> usize {
        match self {
            Role::Static => 0,
            Role::Field => 1,
            Role::Argument => 2,
            Role::Local => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Static => write!(f, "static"),
            Role::Field => write!(f, "field"),
            Role::Argument => write!(f, "argument"),
            Role::Local => write!(f, "local"),
        }
    }
}

/// Mapping of names to symbols for one scope, either a
/// class or a subroutine.
///
/// Slot indices are handed out per role in declaration
/// order, starting at zero.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<SmolStr, Symbol>,
    counts: [u16; 4],
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new symbol using the next free slot of its role.
    ///
    /// Names can't be shadowed within the same table.
    pub fn define(
        &mut self,
        name: impl Into<SmolStr>,
        ty: impl Into<SmolStr>,
        role: Role,
    ) -> Result<&Symbol, DefineError> {
        let name = name.into();
        if self.symbols.contains_key(&name) {
            return Err(DefineError::Exists(name));
        }

        // Counts must stay representable, as they end up in
        // `function` and `push constant` instructions.
        let counter = &mut self.counts[role.slot()];
        let index = *counter;
        *counter = index.checked_add(1).ok_or(DefineError::Full(role))?;

        let symbol = Symbol {
            name: name.clone(),
            ty: ty.into(),
            role,
            index,
        };
        Ok(self.symbols.entry(name).or_insert(symbol))
    }

    #[inline]
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Number of symbols defined with the given role.
    #[inline]
    pub fn count_of(&self, role: Role) -> u16 {
        self.counts[role.slot()]
    }

    /// Clear all symbols and restart every role's slot counter.
    pub fn reset(&mut self) {
        self.symbols.clear();
        self.counts = [0; 4];
    }
}

/// Reason a symbol couldn't be defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineError {
    /// Name is already in the table.
    Exists(SmolStr),
    /// Every slot of the role is taken.
    Full(Role),
}

impl error::Error for DefineError {}

impl fmt::Display for DefineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exists(name) => write!(f, "symbol '{name}' already exists"),
            Self::Full(role) => write!(f, "no free {role} slots left"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_slots_per_role_in_declaration_order() {
        let mut table = SymbolTable::new();
        table.define("a", "int", Role::Field).unwrap();
        table.define("count", "int", Role::Static).unwrap();
        table.define("b", "Point", Role::Field).unwrap();
        table.define("c", "boolean", Role::Field).unwrap();
        table.define("total", "int", Role::Static).unwrap();

        let slots: Vec<_> = ["a", "b", "c", "count", "total"]
            .iter()
            .map(|name| {
                let symbol = table.resolve(name).unwrap();
                (symbol.role, symbol.index)
            })
            .collect();

        assert_eq!(
            slots,
            vec![
                (Role::Field, 0),
                (Role::Field, 1),
                (Role::Field, 2),
                (Role::Static, 0),
                (Role::Static, 1),
            ]
        );
        assert_eq!(table.count_of(Role::Field), 3);
        assert_eq!(table.count_of(Role::Static), 2);
        assert_eq!(table.count_of(Role::Local), 0);
        assert_eq!(table.resolve("b").unwrap().ty, "Point");
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut table = SymbolTable::new();
        table.define("x", "int", Role::Argument).unwrap();
        assert_eq!(
            table.define("x", "char", Role::Local),
            Err(DefineError::Exists(SmolStr::from("x")))
        );

        // Failed definition doesn't consume a slot.
        assert_eq!(table.count_of(Role::Local), 0);
        assert_eq!(table.define("y", "int", Role::Local).unwrap().index, 0);
    }

    #[test]
    fn test_reset_clears_names_and_counters() {
        let mut table = SymbolTable::new();
        table.define("this", "Point", Role::Argument).unwrap();
        table.define("dx", "int", Role::Argument).unwrap();
        table.define("tmp", "int", Role::Local).unwrap();

        table.reset();

        assert!(table.resolve("dx").is_none());
        for role in [Role::Static, Role::Field, Role::Argument, Role::Local] {
            assert_eq!(table.count_of(role), 0);
        }
        assert_eq!(table.define("dx", "int", Role::Argument).unwrap().index, 0);
    }

    #[test]
    fn test_role_segments() {
        assert_eq!(Role::Static.segment(), Segment::Static);
        assert_eq!(Role::Field.segment(), Segment::This);
        assert_eq!(Role::Argument.segment(), Segment::Argument);
        assert_eq!(Role::Local.segment(), Segment::Local);
    }

    #[test]
    fn test_role_slots_exhausted() {
        let mut table = SymbolTable::new();
        for i in 0..u16::MAX {
            table.define(format!("v{i}"), "int", Role::Local).unwrap();
        }
        assert_eq!(table.count_of(Role::Local), u16::MAX);

        assert_eq!(
            table.define("last", "int", Role::Local),
            Err(DefineError::Full(Role::Local))
        );
        assert!(table.resolve("last").is_none());
        assert_eq!(table.count_of(Role::Local), u16::MAX);

        // Other roles keep their own counters.
        assert_eq!(table.define("arg", "int", Role::Argument).unwrap().index, 0);
    }
}
