//! Token listing in the XML format of the course tools.
use crate::{
    error::JackResult,
    lex::Lexer,
    tokens::TokenKind,
};

use std::io::Write;

/// Write every token of the source as one XML element per line,
/// wrapped in a `<tokens>` element.
///
/// Stops at the first lexical error.
pub fn write_token_xml<W: Write>(source: &str, mut out: W) -> JackResult<W> {
    writeln!(out, "<tokens>")?;

    for result in Lexer::new(source) {
        let token = result?;
        let tag = match token.kind {
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Symbol(_) => "symbol",
            TokenKind::Ident => "identifier",
            TokenKind::Number(_) => "integerConstant",
            TokenKind::String => "stringConstant",
            TokenKind::EOF => break,
        };
        writeln!(out, "<{tag}> {} </{tag}>", escape(token.fragment(source)))?;
    }

    writeln!(out, "</tokens>")?;
    out.flush()?;
    Ok(out)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_token_xml() {
        let out = write_token_xml("if (x < 10) { do Output.printString(\"a&b\"); }", Vec::new())
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "<tokens>\n\
             <keyword> if </keyword>\n\
             <symbol> ( </symbol>\n\
             <identifier> x </identifier>\n\
             <symbol> &lt; </symbol>\n\
             <integerConstant> 10 </integerConstant>\n\
             <symbol> ) </symbol>\n\
             <symbol> { </symbol>\n\
             <keyword> do </keyword>\n\
             <identifier> Output </identifier>\n\
             <symbol> . </symbol>\n\
             <identifier> printString </identifier>\n\
             <symbol> ( </symbol>\n\
             <stringConstant> a&amp;b </stringConstant>\n\
             <symbol> ) </symbol>\n\
             <symbol> ; </symbol>\n\
             <symbol> } </symbol>\n\
             </tokens>\n"
        );
    }

    #[test]
    fn test_token_xml_lex_error() {
        assert!(write_token_xml("let s = \"open", Vec::new()).is_err());
    }
}
