//! Token cursor with one token of look ahead.
use crate::{
    error::{JackError, JackResult, SemanticError, SemanticErrorKind, SyntaxError},
    lex::{Lexer, LexerIter},
    tokens::{Span, Token, TokenKind},
};

use smol_str::SmolStr;
use std::iter::Peekable;

/// Stream of tokens that allows a single token of look ahead.
///
/// Tokens are lazily lexed. Peeking or consuming the next token
/// triggers the internal lexer.
pub struct TokenStream<'a> {
    lexer: Peekable<LexerIter<'a>>,
    /// Keep reference to the source so the compiler can
    /// slice fragments from it.
    original: &'a str,
    /// A copy of the previous token, handed out again
    /// once the lexer is exhausted.
    prev: Option<Token>,
}

impl<'a> TokenStream<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            original: lexer.source_code(),
            lexer: lexer.into_iter().peekable(),
            prev: None,
        }
    }

    /// Helper function to extract the span's string fragment
    /// from the original source code.
    #[inline]
    pub fn fragment(&self, span: &Span) -> &'a str {
        span.fragment(self.original)
    }

    /// Return the current token without advancing the cursor.
    ///
    /// Lexical errors are reported here, before the token is
    /// consumed. Past the end of the source the last token,
    /// [`TokenKind::EOF`], is returned.
    pub fn peek(&mut self) -> JackResult<&Token> {
        match self.lexer.peek() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(JackError::Lex(err.clone())),
            None => self.prev.as_ref().ok_or_else(eof_error),
        }
    }

    /// Return the current token kind without advancing the cursor.
    #[inline]
    pub fn peek_kind(&mut self) -> JackResult<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    /// Consumes the current token regardless of kind.
    pub fn next_token(&mut self) -> JackResult<Token> {
        match self.lexer.next() {
            Some(Ok(token)) => {
                self.prev = Some(token.clone());
                Ok(token)
            }
            Some(Err(err)) => Err(JackError::Lex(err)),
            // Repeat the end-of-file token for callers that
            // read past the end.
            None => self.prev.clone().ok_or_else(eof_error),
        }
    }

    /// Consumes the current token if it matches the given token kind.
    ///
    /// Returns true when matched. Returns false when token kinds
    /// do not match. Does not consume the token if the kinds do not match.
    pub fn match_token(&mut self, token_kind: TokenKind) -> JackResult<bool> {
        if self.peek_kind()? == token_kind {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Return the current token and advance the cursor.
    ///
    /// The consumed token must match the given token kind, otherwise
    /// a syntax error naming the grammar `rule` is returned. The
    /// cursor is not advanced if the token kind does not match.
    pub fn consume(&mut self, token_kind: TokenKind, rule: &'static str) -> JackResult<Token> {
        let token = self.peek()?;
        if token.kind == token_kind {
            self.next_token()
        } else {
            let token = token.clone();
            Err(self.unexpected(&token, rule, token_kind.to_string()))
        }
    }

    /// Consume an identifier and return its name.
    ///
    /// Encountering a keyword where an identifier is expected is a
    /// semantic error, since the keyword set is reserved.
    pub fn consume_ident(&mut self, rule: &'static str) -> JackResult<(Token, SmolStr)> {
        let token = self.peek()?.clone();
        match token.kind {
            TokenKind::Ident => {
                self.next_token()?;
                let name = SmolStr::from(self.fragment(&token.span));
                Ok((token, name))
            }
            TokenKind::Keyword(keyword) => Err(SemanticError {
                kind: SemanticErrorKind::ReservedKeyword(keyword),
                line: token.span.line,
                column: token.span.column,
            }
            .into()),
            _ => Err(self.unexpected(&token, rule, "identifier")),
        }
    }

    /// Build a syntax error for the given offending token.
    #[inline(never)]
    #[cold]
    pub fn unexpected(
        &self,
        token: &Token,
        rule: &'static str,
        expected: impl Into<SmolStr>,
    ) -> JackError {
        let encountered = match token.kind {
            TokenKind::EOF => SmolStr::from("end-of-file"),
            TokenKind::String => SmolStr::from(format!("\"{}\"", self.fragment(&token.span))),
            _ => SmolStr::from(self.fragment(&token.span)),
        };

        SyntaxError {
            rule,
            expected: expected.into(),
            encountered,
            line: token.span.line,
            column: token.span.column,
        }
        .into()
    }
}

#[cold]
fn eof_error() -> JackError {
    SyntaxError {
        rule: "class",
        expected: SmolStr::from("token"),
        encountered: SmolStr::from("end-of-file"),
        line: 1,
        column: 1,
    }
    .into()
}
