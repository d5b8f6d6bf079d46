pub mod compile;
pub mod driver;
pub mod error;
pub mod lex;
pub mod listing;
pub mod token_stream;
pub mod tokens;

pub use self::{
    compile::CompileConf,
    error::{JackError, JackResult},
};

use std::io::Write;

/// Compile the source of one class to VM code.
pub fn compile_str(source: &str) -> JackResult<String> {
    compile_with(source, CompileConf::default())
}

pub fn compile_with(source: &str, conf: CompileConf) -> JackResult<String> {
    let bytes = compile_to(source, Vec::new(), conf)?;
    Ok(String::from_utf8(bytes)?)
}

/// Compile the source of one class, writing VM code to the given sink.
///
/// Lexing, parsing and code generation happen in a single pass, so
/// on failure the sink may contain a partial program.
pub fn compile_to<W: Write>(source: &str, out: W, conf: CompileConf) -> JackResult<W> {
    let lexer = lex::Lexer::new(source);
    compile::CodeGen::new(lexer, out, conf).compile()
}
