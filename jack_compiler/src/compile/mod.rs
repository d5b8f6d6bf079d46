//! Code generation for the VM.
mod codegen;
mod symbol;
mod vm;

pub use codegen::CodeGen;
pub use symbol::{DefineError, Role, Symbol, SymbolTable};
pub use vm::{Command, Label, Segment, VmWriter};

use smol_str::SmolStr;

/// Options that change the shape of the generated code.
#[derive(Debug, Clone)]
pub struct CompileConf {
    /// Text in front of every generated label number.
    pub label_prefix: SmolStr,
}

impl Default for CompileConf {
    fn default() -> Self {
        Self {
            label_prefix: SmolStr::from("L"),
        }
    }
}
