use jack_compiler::{
    compile::CodeGen,
    compile_str,
    lex::{debug_print_lexer, Lexer},
    token_stream::TokenStream,
    tokens::{Keyword, Symbol, TokenKind},
    CompileConf,
};

const SOURCE: &str = include_str!("Point.jack");
const EXPECTED: &str = include_str!("Point.vm");

#[test]
fn test_lex_class() {
    let lexer = Lexer::new(SOURCE);
    debug_print_lexer(lexer);
}

#[test]
fn test_stream_class() {
    let mut stream = TokenStream::new(Lexer::new(SOURCE));

    assert_eq!(
        stream.next_token().unwrap().kind,
        TokenKind::Keyword(Keyword::Class)
    );
    assert_eq!(stream.next_token().unwrap().kind, TokenKind::Ident);
    assert_eq!(
        stream.next_token().unwrap().kind,
        TokenKind::Symbol(Symbol::LeftBrace)
    );

    let mut count = 3;
    while stream.next_token().unwrap().kind != TokenKind::EOF {
        count += 1;
    }
    assert_eq!(count, 163);
}

#[test]
fn test_compile_class() {
    let code = compile_str(SOURCE).unwrap();
    println!("{code}");
    assert_eq!(code, EXPECTED);
}

#[test]
fn test_compile_class_into_sink() {
    let out = CodeGen::new(Lexer::new(SOURCE), Vec::new(), CompileConf::default())
        .compile()
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), EXPECTED);
}
