//! Lexical analysis (tokenizer)
use crate::tokens::{Keyword, Span, Symbol, Token, TokenKind};

use itertools::{multipeek, MultiPeek};
use smol_str::SmolStr;
use std::{error, fmt, str::CharIndices};

/// Largest value an integer constant may have.
pub const MAX_INT: u16 = 32767;

pub fn debug_print_lexer(lexer: Lexer) {
    let source = lexer.source_code();
    println!("Source Byte Count: {}", source.len());

    for result in lexer {
        match result {
            Ok(token) => {
                let fragment = token.fragment(source);
                println!(
                    "{:4}:{:<3} {:<16} {:?}",
                    token.span.line,
                    token.span.column,
                    fragment,
                    token.kind
                );
            }
            Err(err) => println!("{}", err),
        }
    }
}

/// Lexical analyzer.
///
/// Whitespace and comments are skipped. Each call to
/// [`Lexer::next_token`] produces exactly one token, ending
/// with a single [`TokenKind::EOF`].
pub struct Lexer<'a> {
    source: SourceText<'a>,
    token_start: SourcePos,
}

impl<'a> Lexer<'a> {
    pub fn new(source_code: &'a str) -> Self {
        Self {
            source: SourceText::new(source_code),
            token_start: SourcePos {
                position: 0,
                line: 1,
                column: 1,
            },
        }
    }

    /// Original source code that was passed in during construction.
    pub fn source_code(&self) -> &'a str {
        self.source.original
    }

    /// Indicates whether there are characters left to scan.
    ///
    /// Trailing whitespace and comments count as remaining input,
    /// in which case the next token will be [`TokenKind::EOF`].
    pub fn has_more(&self) -> bool {
        !self.source.at_end()
    }

    /// Scan the source characters and construct the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        if !fits_span(self.source.original.len()) {
            return Err(LexError {
                kind: LexErrorKind::SourceTooLarge,
                line: 1,
                column: 1,
                fragment: SmolStr::default(),
            });
        }

        self.skip_trivia()?;
        self.start_token();

        let next_char = match self.source.next_char() {
            Some(c) => c,
            None => return Ok(self.make_token(TokenKind::EOF)),
        };

        match next_char {
            '"' => self.consume_string(),
            c => match Symbol::parse(c) {
                Some(symbol) => Ok(self.make_token(TokenKind::Symbol(symbol))),
                None => self.consume_word(),
            },
        }
    }

    /// Erase whitespace, line comments and block comments until
    /// the start of the next token, or the end of the source.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            self.source.reset_peek();

            match self.source.peek_char2() {
                (Some(c), _) if c.is_whitespace() => {
                    self.source.next_char();
                }
                (Some('/'), Some('/')) => self.erase_line_comment(),
                (Some('/'), Some('*')) => self.erase_block_comment()?,
                _ => {
                    self.source.reset_peek();
                    return Ok(());
                }
            }
        }
    }

    /// Prime the lexer state for recording a new token.
    fn start_token(&mut self) {
        self.token_start = self.source.pos();
    }

    /// Offsets are narrowed to `u32`, which [`Lexer::next_token`]
    /// guarantees by rejecting larger sources up front.
    fn make_span(&self) -> Span {
        let start = &self.token_start;
        let size = self.source.offset - start.position;
        Span::new(start.position as u32, size as u32, start.line, start.column)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            span: self.make_span(),
            kind,
        }
    }

    fn make_error(&self, kind: LexErrorKind) -> LexError {
        LexError {
            kind,
            line: self.token_start.line,
            column: self.token_start.column,
            fragment: SmolStr::from(self.make_span().fragment(self.source.original)),
        }
    }

    fn token_fragment(&self) -> &'a str {
        self.make_span().fragment(self.source.original)
    }
}

/// Specialised tokens.
impl<'a> Lexer<'a> {
    /// Erase comment line up to, but not including, the trailing newline.
    fn erase_line_comment(&mut self) {
        self.source.reset_peek();
        while let Some(c) = self.source.peek_char() {
            if c == '\n' {
                break;
            }
            self.source.next_char();
        }
    }

    /// Erase a `/* ... */` or `/** ... */` comment, which may span
    /// multiple lines.
    fn erase_block_comment(&mut self) -> Result<(), LexError> {
        self.start_token();

        // Opening `/*`
        self.source.next_char();
        self.source.next_char();

        loop {
            match self.source.peek_char2() {
                (Some('*'), Some('/')) => {
                    self.source.next_char();
                    self.source.next_char();
                    return Ok(());
                }
                (Some(_), _) => {
                    self.source.next_char();
                }
                (None, _) => return Err(self.make_error(LexErrorKind::UnterminatedComment)),
            }
        }
    }

    /// Make a string constant token.
    ///
    /// The span covers the characters between the quotes. Escapes
    /// are not supported, and the string may not span lines.
    fn consume_string(&mut self) -> Result<Token, LexError> {
        // Opening quote is excluded from the token.
        self.start_token();

        loop {
            self.source.reset_peek();
            match self.source.peek_char() {
                Some('"') => break,
                Some('\n') | Some('\r') | None => {
                    return Err(self.make_error(LexErrorKind::UnterminatedString));
                }
                Some(c) if u32::from(c) > u32::from(MAX_INT) => {
                    self.source.next_char();
                    return Err(self.make_error(LexErrorKind::UnknownCharacter));
                }
                Some(_) => {
                    self.source.next_char();
                }
            }
        }

        let token = self.make_token(TokenKind::String);

        // Closing quote
        self.source.next_char();

        Ok(token)
    }

    /// Make an integer constant, keyword or identifier token from a
    /// maximal run of characters that are not whitespace, symbols or quotes.
    fn consume_word(&mut self) -> Result<Token, LexError> {
        self.source.reset_peek();
        while let Some(c) = self.source.peek_char() {
            if is_word_boundary(c) {
                break;
            }
            self.source.next_char();
        }
        self.source.reset_peek();

        let fragment = self.token_fragment();

        if fragment.chars().all(|c| c.is_ascii_digit()) {
            return match fragment.parse::<u32>() {
                Ok(value) if value <= u32::from(MAX_INT) => {
                    Ok(self.make_token(TokenKind::Number(value as u16)))
                }
                _ => Err(self.make_error(LexErrorKind::NumberOutOfRange)),
            };
        }

        if fragment.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.make_error(LexErrorKind::InvalidNumber));
        }

        if !fragment.chars().all(is_letter_or_digit) {
            return Err(self.make_error(LexErrorKind::UnknownCharacter));
        }

        // If a valid keyword can be parsed from the source fragment, then
        // the token is a reserved keyword instead of a user defined identifier.
        let token_kind = match Keyword::parse(fragment) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };

        Ok(self.make_token(token_kind))
    }
}

/// Whether every byte offset of a source this long fits a [`Span`].
#[inline]
fn fits_span(len: usize) -> bool {
    u32::try_from(len).is_ok()
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || c == '"' || Symbol::parse(c).is_some()
}

fn is_letter_or_digit(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

impl<'a> IntoIterator for Lexer<'a> {
    type Item = Result<Token, LexError>;
    type IntoIter = LexerIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        LexerIter {
            lexer: self,
            done: false,
        }
    }
}

/// Convenience iterator that wraps the lexer.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct LexerIter<'a> {
    // Track end so an EOF token is emitted once.
    done: bool,
    lexer: Lexer<'a>,
}

impl<'a> Iterator for LexerIter<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.lexer.next_token();
        match &result {
            Ok(Token {
                kind: TokenKind::EOF,
                ..
            })
            | Err(LexError {
                kind: LexErrorKind::SourceTooLarge,
                ..
            }) => self.done = true,
            _ => {}
        }
        Some(result)
    }
}

/// Wrapper for source code that keeps a cursor position.
///
/// Allows forward lookup via peeking.
struct SourceText<'a> {
    /// Keep reference to the source so the parser can
    /// slice fragments from it.
    original: &'a str,

    /// Iterator over UTF-8 encoded source code.
    ///
    /// An important semantic feature of `MultiPeek` is that peeking advances
    /// the internal peek cursor by 1. Each call will return the next element.
    /// The peek cursor offset is restored to 0 when calling `MultiPeek::next()`
    /// or `MultiPeek::reset_peek()`.
    chars: MultiPeek<CharIndices<'a>>,

    /// Byte position of the next unread character.
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> SourceText<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            original: source,
            chars: multipeek(source.char_indices()),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos {
            position: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    /// Advance the cursor and return the consumed character.
    fn next_char(&mut self) -> Option<char> {
        let (index, c) = self.chars.next()?;
        self.offset = index + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Peeks the next character in the stream.
    ///
    /// This call advances the peek cursor. Subsequent
    /// calls will look ahead by one character each call.
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    /// Two character lookahead.
    ///
    /// This call advances the peek cursor by two.
    fn peek_char2(&mut self) -> (Option<char>, Option<char>) {
        let first = self.peek_char();
        let second = self.peek_char();
        (first, second)
    }

    /// Reset the stream peek cursor.
    fn reset_peek(&mut self) {
        self.chars.reset_peek()
    }

    /// Indicates if the cursor is at the end of the source.
    fn at_end(&self) -> bool {
        self.offset >= self.original.len()
    }
}

#[derive(Debug, Default)]
struct SourcePos {
    position: usize,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: u32,
    pub column: u32,
    /// Offending source text.
    pub fragment: SmolStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnknownCharacter,
    UnterminatedString,
    UnterminatedComment,
    /// Integer constant larger than [`MAX_INT`].
    NumberOutOfRange,
    /// Digits followed by letters, like `12abc`.
    InvalidNumber,
    /// Source of 4 GiB or more, which spans can't address.
    SourceTooLarge,
}

impl error::Error for LexError {}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LexErrorKind as K;

        write!(f, "{}:{}: lexical error: ", self.line, self.column)?;
        match self.kind {
            K::UnknownCharacter => write!(f, "unknown character in \"{}\"", self.fragment),
            K::UnterminatedString => write!(f, "unterminated string constant \"{}", self.fragment),
            K::UnterminatedComment => write!(f, "unterminated block comment"),
            K::NumberOutOfRange => write!(
                f,
                "integer constant {} out of range 0..={MAX_INT}",
                self.fragment
            ),
            K::InvalidNumber => write!(f, "malformed integer constant \"{}\"", self.fragment),
            K::SourceTooLarge => write!(f, "source is larger than {} bytes", u32::MAX),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .into_iter()
            .map(|result| result.unwrap().kind)
            .collect()
    }

    fn lex_error(source: &str) -> LexError {
        Lexer::new(source)
            .into_iter()
            .find_map(Result::err)
            .expect("expected lexical error")
    }

    #[test]
    fn test_symbols_split_words() {
        use TokenKind as TK;

        assert_eq!(
            kinds("a[i]=x.y;"),
            vec![
                TK::Ident,
                TK::Symbol(Symbol::LeftBracket),
                TK::Ident,
                TK::Symbol(Symbol::RightBracket),
                TK::Symbol(Symbol::Eq),
                TK::Ident,
                TK::Symbol(Symbol::Dot),
                TK::Ident,
                TK::Symbol(Symbol::Semicolon),
                TK::EOF,
            ]
        );
    }

    #[test]
    fn test_keywords_and_numbers() {
        use TokenKind as TK;

        assert_eq!(
            kinds("let count = 32767;"),
            vec![
                TK::Keyword(Keyword::Let),
                TK::Ident,
                TK::Symbol(Symbol::Eq),
                TK::Number(32767),
                TK::Symbol(Symbol::Semicolon),
                TK::EOF,
            ]
        );
    }

    #[test]
    fn test_comments_stripped() {
        use TokenKind as TK;

        let source = "/** doc\n * comment\n */\nclass // trailing\n/* block */ Main";
        assert_eq!(
            kinds(source),
            vec![TK::Keyword(Keyword::Class), TK::Ident, TK::EOF]
        );

        let tokens: Vec<_> = Lexer::new(source).into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens[0].span.line, 4);
        assert_eq!(tokens[1].span.line, 5);
        assert_eq!(tokens[1].span.column, 13);
    }

    #[test]
    fn test_division_is_not_comment() {
        use TokenKind as TK;

        assert_eq!(
            kinds("a/b"),
            vec![TK::Ident, TK::Symbol(Symbol::Slash), TK::Ident, TK::EOF]
        );
    }

    #[test]
    fn test_string_constant() {
        let source = "do Output.printString(\"Hello, world // not a comment\");";
        let tokens: Vec<_> = Lexer::new(source).into_iter().map(Result::unwrap).collect();
        let string = tokens.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(string.fragment(source), "Hello, world // not a comment");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EOF);
    }

    #[test]
    fn test_empty_string_constant() {
        let source = "\"\"";
        let tokens: Vec<_> = Lexer::new(source).into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].fragment(source), "");
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_error("let s = \"oops;\nlet x = 1;");
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.line, 1);
        assert_eq!(err.fragment, "oops;");
    }

    #[test]
    fn test_unterminated_comment() {
        let err = lex_error("class Main {\n/* never closed\n");
        assert_eq!(err.kind, LexErrorKind::UnterminatedComment);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_number_out_of_range() {
        let err = lex_error("let x = 32768;");
        assert_eq!(err.kind, LexErrorKind::NumberOutOfRange);
        assert_eq!(err.fragment, "32768");

        let err = lex_error("99999999999999999999");
        assert_eq!(err.kind, LexErrorKind::NumberOutOfRange);
    }

    #[test]
    fn test_digit_leading_identifier() {
        let err = lex_error("var int 2fast;");
        assert_eq!(err.kind, LexErrorKind::InvalidNumber);
        assert_eq!(err.fragment, "2fast");
        assert_eq!(err.column, 9);
    }

    #[test]
    fn test_unknown_character() {
        let err = lex_error("let x = #;");
        assert_eq!(err.kind, LexErrorKind::UnknownCharacter);
        assert_eq!(err.fragment, "#");
    }

    #[test]
    fn test_has_more() {
        let mut lexer = Lexer::new("x ");
        assert!(lexer.has_more());
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Ident);
        assert!(lexer.has_more());
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::EOF);
        assert!(!lexer.has_more());
    }

    #[test]
    fn test_crlf_line_endings() {
        let source = "class\r\nMain\r\n";
        let tokens: Vec<_> = Lexer::new(source).into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].fragment(source), "Main");
    }

    #[test]
    fn test_span_limit() {
        assert!(fits_span(0));
        assert!(fits_span(u32::MAX as usize));
        if let Ok(len) = usize::try_from(u64::from(u32::MAX) + 1) {
            assert!(!fits_span(len));
        }
    }
}
