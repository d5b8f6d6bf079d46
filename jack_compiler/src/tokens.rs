//! Tokens
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub span: Span,
    pub kind: TokenKind,
}

impl Token {
    /// Source text of the token.
    ///
    /// String constants exclude their delimiting quotes.
    #[inline]
    pub fn fragment<'a>(&self, source: &'a str) -> &'a str {
        self.span.fragment(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Single character punctuation or operator.
    Symbol(Symbol),
    /// Reserved identifiers
    Keyword(Keyword),
    Ident,
    /// Integer constant, validated to be in the range `0..=32767`.
    Number(u16),
    /// String constant
    String,
    /// End-of-file
    EOF,
}

impl TokenKind {
    #[inline]
    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        *self == TokenKind::Symbol(symbol)
    }

    #[inline]
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        *self == TokenKind::Keyword(keyword)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "'{symbol}'"),
            Self::Keyword(keyword) => write!(f, "'{keyword}'"),
            Self::Ident => write!(f, "identifier"),
            Self::Number(_) => write!(f, "integer constant"),
            Self::String => write!(f, "string constant"),
            Self::EOF => write!(f, "end-of-file"),
        }
    }
}

/// Chunk of source code, encoded as a byte offset and size, and
/// the line and column where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub index: u32,
    pub size: u32,
    /// Line number, starting at 1.
    pub line: u32,
    /// Column in characters, starting at 1.
    pub column: u32,
}

impl Span {
    pub fn new(index: u32, size: u32, line: u32, column: u32) -> Self {
        Self {
            index,
            size,
            line,
            column,
        }
    }

    #[inline]
    pub fn fragment<'a>(&self, text: &'a str) -> &'a str {
        text.get((self.index as usize)..(self.end() as usize))
            .unwrap_or_default()
    }

    /// Ending index of the span, exclusive.
    #[inline]
    pub fn end(&self) -> u32 {
        self.index + self.size
    }
}

/// Characters that always form a token on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Symbol {
    LeftBrace,    // {
    RightBrace,   // }
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]
    Dot,          // .
    Comma,        // ,
    Semicolon,    // ;
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Amp,          // &
    Pipe,         // |
    Less,         // <
    Greater,      // >
    Eq,           // =
    Tilde,        // ~
}

impl Symbol {
    #[rustfmt::skip]
    pub fn parse(c: char) -> Option<Self> {
        match c {
            '{' => Some(Self::LeftBrace),
            '}' => Some(Self::RightBrace),
            '(' => Some(Self::LeftParen),
            ')' => Some(Self::RightParen),
            '[' => Some(Self::LeftBracket),
            ']' => Some(Self::RightBracket),
            '.' => Some(Self::Dot),
            ',' => Some(Self::Comma),
            ';' => Some(Self::Semicolon),
            '+' => Some(Self::Plus),
            '-' => Some(Self::Minus),
            '*' => Some(Self::Star),
            '/' => Some(Self::Slash),
            '&' => Some(Self::Amp),
            '|' => Some(Self::Pipe),
            '<' => Some(Self::Less),
            '>' => Some(Self::Greater),
            '=' => Some(Self::Eq),
            '~' => Some(Self::Tilde),
            _   => None,
        }
    }

    #[rustfmt::skip]
    pub fn as_char(&self) -> char {
        match self {
            Self::LeftBrace    => '{',
            Self::RightBrace   => '}',
            Self::LeftParen    => '(',
            Self::RightParen   => ')',
            Self::LeftBracket  => '[',
            Self::RightBracket => ']',
            Self::Dot          => '.',
            Self::Comma        => ',',
            Self::Semicolon    => ';',
            Self::Plus         => '+',
            Self::Minus        => '-',
            Self::Star         => '*',
            Self::Slash        => '/',
            Self::Amp          => '&',
            Self::Pipe         => '|',
            Self::Less         => '<',
            Self::Greater      => '>',
            Self::Eq           => '=',
            Self::Tilde        => '~',
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Reserved keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Keyword {
    // ------------------------------------------------------------------------
    // Program structure
    Class,
    Constructor,
    Function,
    Method,
    Field,
    Static,
    Var,

    // ------------------------------------------------------------------------
    // Types
    Int,
    Char,
    Boolean,
    Void,

    // ------------------------------------------------------------------------
    // Constants
    True,
    False,
    Null,
    This,

    // ------------------------------------------------------------------------
    // Statements
    Let,
    Do,
    If,
    Else,
    While,
    Return,
}

impl Keyword {
    #[rustfmt::skip]
    pub fn parse(text: impl AsRef<str>) -> Option<Self> {
        match text.as_ref() {
            "class"       => Some(Self::Class),
            "constructor" => Some(Self::Constructor),
            "function"    => Some(Self::Function),
            "method"      => Some(Self::Method),
            "field"       => Some(Self::Field),
            "static"      => Some(Self::Static),
            "var"         => Some(Self::Var),
            "int"         => Some(Self::Int),
            "char"        => Some(Self::Char),
            "boolean"     => Some(Self::Boolean),
            "void"        => Some(Self::Void),
            "true"        => Some(Self::True),
            "false"       => Some(Self::False),
            "null"        => Some(Self::Null),
            "this"        => Some(Self::This),
            "let"         => Some(Self::Let),
            "do"          => Some(Self::Do),
            "if"          => Some(Self::If),
            "else"        => Some(Self::Else),
            "while"       => Some(Self::While),
            "return"      => Some(Self::Return),
            _             => None,
        }
    }

    #[rustfmt::skip]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class       => "class",
            Self::Constructor => "constructor",
            Self::Function    => "function",
            Self::Method      => "method",
            Self::Field       => "field",
            Self::Static      => "static",
            Self::Var         => "var",
            Self::Int         => "int",
            Self::Char        => "char",
            Self::Boolean     => "boolean",
            Self::Void        => "void",
            Self::True        => "true",
            Self::False       => "false",
            Self::Null        => "null",
            Self::This        => "this",
            Self::Let         => "let",
            Self::Do          => "do",
            Self::If          => "if",
            Self::Else        => "else",
            Self::While       => "while",
            Self::Return      => "return",
        }
    }

    /// Built-in type names.
    #[inline]
    pub fn is_primitive_type(&self) -> bool {
        matches!(self, Self::Int | Self::Char | Self::Boolean)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
