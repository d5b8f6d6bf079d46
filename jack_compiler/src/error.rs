//! Result and errors.
use crate::{compile::Role, lex::LexError, tokens::Keyword};

use smol_str::SmolStr;
use std::{
    fmt::{self, Display, Formatter},
    io,
    path::PathBuf,
    string::FromUtf8Error,
};

pub type JackResult<T> = std::result::Result<T, JackError>;

#[derive(Debug)]
pub enum JackError {
    /// Malformed token.
    Lex(LexError),
    /// Token sequence doesn't match the grammar.
    Syntax(SyntaxError),
    /// Well formed program that refers to names incorrectly.
    Semantic(SemanticError),
    Io(io::Error),
    Utf8(FromUtf8Error),
    /// Failure while compiling a specific source file.
    File {
        path: PathBuf,
        source: Box<JackError>,
    },
    /// Some files in a batch failed to compile.
    Batch { failed: usize, total: usize },
}

impl JackError {
    /// Attach the path of the file being compiled.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        JackError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

impl Display for JackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(err) => write!(f, "{err}"),
            Self::Syntax(err) => write!(f, "{err}"),
            Self::Semantic(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Utf8(err) => write!(f, "source is not valid UTF-8: {err}"),
            Self::File { path, source } => write!(f, "{}:{source}", path.display()),
            Self::Batch { failed, total } => {
                write!(f, "{failed} of {total} source files failed to compile")
            }
        }
    }
}

impl std::error::Error for JackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lex(err) => Some(err),
            Self::Syntax(err) => Some(err),
            Self::Semantic(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Utf8(err) => Some(err),
            Self::File { source, .. } => Some(source.as_ref()),
            Self::Batch { .. } => None,
        }
    }
}

impl From<LexError> for JackError {
    fn from(err: LexError) -> Self {
        JackError::Lex(err)
    }
}

impl From<SyntaxError> for JackError {
    fn from(err: SyntaxError) -> Self {
        JackError::Syntax(err)
    }
}

impl From<SemanticError> for JackError {
    fn from(err: SemanticError) -> Self {
        JackError::Semantic(err)
    }
}

impl From<io::Error> for JackError {
    fn from(err: io::Error) -> Self {
        JackError::Io(err)
    }
}

impl From<FromUtf8Error> for JackError {
    fn from(err: FromUtf8Error) -> Self {
        JackError::Utf8(err)
    }
}

/// Error returned when an unexpected token is encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Grammar rule being matched, like `"letStatement"`.
    pub rule: &'static str,
    /// Description of what was expected.
    pub expected: SmolStr,
    /// Source text of the offending token.
    pub encountered: SmolStr,
    pub line: u32,
    pub column: u32,
}

impl std::error::Error for SyntaxError {}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: syntax error in {}: expected {}, found '{}'",
            self.line, self.column, self.rule, self.expected, self.encountered
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticErrorKind {
    /// Identifier used as a variable, but declared in neither scope.
    Undeclared(SmolStr),
    /// Name already defined in the active scope.
    Redefinition(SmolStr),
    /// Reserved keyword used where an identifier is required.
    ReservedKeyword(Keyword),
    /// More declarations of one role than a segment index can address.
    TooManySymbols(Role),
}

impl std::error::Error for SemanticError {}

impl Display for SemanticError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use SemanticErrorKind as K;

        write!(f, "{}:{}: ", self.line, self.column)?;
        match &self.kind {
            K::Undeclared(name) => write!(f, "undeclared variable '{name}'"),
            K::Redefinition(name) => write!(f, "'{name}' is already defined in this scope"),
            K::ReservedKeyword(keyword) => {
                write!(f, "reserved keyword '{keyword}' cannot be used as an identifier")
            }
            K::TooManySymbols(role) => write!(f, "too many {role} variables declared"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_file_context_in_message() {
        let err = JackError::from(SemanticError {
            kind: SemanticErrorKind::Undeclared(SmolStr::from("count")),
            line: 7,
            column: 13,
        })
        .in_file("Main.jack");

        assert_eq!(
            err.to_string(),
            "Main.jack:7:13: undeclared variable 'count'"
        );
    }
}
