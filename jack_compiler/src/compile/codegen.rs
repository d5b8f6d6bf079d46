use super::{
    symbol::{DefineError, Role, Symbol, SymbolTable},
    vm::{Command, Label, Segment, VmWriter},
    CompileConf,
};
use crate::{
    error::{JackError, JackResult, SemanticError, SemanticErrorKind},
    lex::{Lexer, MAX_INT},
    token_stream::TokenStream,
    tokens::{Keyword, Symbol as Sym, Token, TokenKind},
};

use log::{debug, trace};
use smol_str::SmolStr;
use std::io::Write;

const MEMORY_ALLOC: &str = "Memory.alloc";
const MATH_MULTIPLY: &str = "Math.multiply";
const MATH_DIVIDE: &str = "Math.divide";
const STRING_NEW: &str = "String.new";
const STRING_APPEND_CHAR: &str = "String.appendChar";

/// A `call` instruction counts its arguments in 16 bits.
const TOO_MANY_ARGS: &str = "at most 65535 arguments";

/// Single pass code generator.
///
/// Pulls tokens one at a time and writes VM instructions as soon
/// as each construct is recognised. No syntax tree is built.
pub struct CodeGen<'a, W: Write> {
    stream: TokenStream<'a>,
    writer: VmWriter<W>,
    /// Statics and fields, alive for the whole class.
    class_symbols: SymbolTable,
    /// Arguments and locals, cleared for every subroutine.
    sub_symbols: SymbolTable,
    class_name: SmolStr,
    /// Next free label number. Only ever increases.
    label_count: u32,
    conf: CompileConf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

/// What a binary operator compiles to.
enum BinaryOp {
    Command(Command),
    Call(&'static str),
}

impl<'a, W: Write> CodeGen<'a, W> {
    pub fn new(lexer: Lexer<'a>, out: W, conf: CompileConf) -> Self {
        Self {
            stream: TokenStream::new(lexer),
            writer: VmWriter::new(out),
            class_symbols: SymbolTable::new(),
            sub_symbols: SymbolTable::new(),
            class_name: SmolStr::default(),
            label_count: 0,
            conf,
        }
    }

    /// Compile one class, which must make up the whole source, and
    /// give back the output sink.
    pub fn compile(mut self) -> JackResult<W> {
        self.emit_class()?;
        self.stream.consume(TokenKind::EOF, "class")?;
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }

    /// Look up a name, with the subroutine scope shadowing the class scope.
    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.sub_symbols
            .resolve(name)
            .or_else(|| self.class_symbols.resolve(name))
    }

    /// Look up a name that must be a declared variable.
    fn resolve_variable(&self, token: &Token, name: &str) -> JackResult<Symbol> {
        self.lookup(name).cloned().ok_or_else(|| {
            SemanticError {
                kind: SemanticErrorKind::Undeclared(SmolStr::from(name)),
                line: token.span.line,
                column: token.span.column,
            }
            .into()
        })
    }

    /// Reserve two consecutive label numbers.
    fn reserve_labels(&mut self) -> (u32, u32) {
        let first = self.label_count;
        self.label_count += 2;
        (first, first + 1)
    }

    fn qualified_name(&self, subroutine: &str) -> String {
        format!("{}.{}", self.class_name, subroutine)
    }

    #[inline]
    fn expect(&mut self, symbol: Sym, rule: &'static str) -> JackResult<Token> {
        self.stream.consume(TokenKind::Symbol(symbol), rule)
    }

    #[inline]
    fn match_symbol(&mut self, symbol: Sym) -> JackResult<bool> {
        self.stream.match_token(TokenKind::Symbol(symbol))
    }

    /// Parse `int`, `char`, `boolean` or a class name.
    fn parse_type(&mut self, rule: &'static str) -> JackResult<SmolStr> {
        let token = self.stream.next_token()?;
        match token.kind {
            TokenKind::Keyword(keyword) if keyword.is_primitive_type() => {
                Ok(SmolStr::from(keyword.as_str()))
            }
            TokenKind::Ident => Ok(SmolStr::from(self.stream.fragment(&token.span))),
            _ => Err(self.stream.unexpected(&token, rule, "type")),
        }
    }
}

/// Emit helpers
impl<'a, W: Write> CodeGen<'a, W> {
    fn push(&mut self, segment: Segment, index: u16) -> JackResult<()> {
        Ok(self.writer.write_push(segment, index)?)
    }

    fn pop(&mut self, segment: Segment, index: u16) -> JackResult<()> {
        Ok(self.writer.write_pop(segment, index)?)
    }

    fn arithmetic(&mut self, command: Command) -> JackResult<()> {
        Ok(self.writer.write_arithmetic(command)?)
    }

    fn call(&mut self, name: &str, arg_count: u16) -> JackResult<()> {
        Ok(self.writer.write_call(name, arg_count)?)
    }

    fn label(&mut self, id: u32) -> JackResult<()> {
        let label = Label {
            prefix: &self.conf.label_prefix,
            id,
        };
        Ok(self.writer.write_label(&label)?)
    }

    fn goto(&mut self, id: u32) -> JackResult<()> {
        let label = Label {
            prefix: &self.conf.label_prefix,
            id,
        };
        Ok(self.writer.write_goto(&label)?)
    }

    fn if_goto(&mut self, id: u32) -> JackResult<()> {
        let label = Label {
            prefix: &self.conf.label_prefix,
            id,
        };
        Ok(self.writer.write_if(&label)?)
    }
}

/// Recursive descent
impl<'a, W: Write> CodeGen<'a, W> {
    /// `class Name { classVarDec* subroutineDec* }`
    fn emit_class(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::Class), "class")?;
        let (_, name) = self.stream.consume_ident("class")?;
        self.class_name = name;
        debug!("compiling class {}", self.class_name);

        self.expect(Sym::LeftBrace, "class")?;

        while let TokenKind::Keyword(Keyword::Static | Keyword::Field) = self.stream.peek_kind()? {
            self.emit_class_var_dec()?;
        }

        while let TokenKind::Keyword(Keyword::Constructor | Keyword::Function | Keyword::Method) =
            self.stream.peek_kind()?
        {
            self.emit_subroutine()?;
        }

        let token = self.stream.next_token()?;
        if !token.kind.is_symbol(Sym::RightBrace) {
            return Err(self
                .stream
                .unexpected(&token, "class", "subroutine declaration or '}'"));
        }

        Ok(())
    }

    /// `(static | field) type name (, name)* ;`
    fn emit_class_var_dec(&mut self) -> JackResult<()> {
        let token = self.stream.next_token()?;
        let role = match token.kind {
            TokenKind::Keyword(Keyword::Static) => Role::Static,
            TokenKind::Keyword(Keyword::Field) => Role::Field,
            _ => return Err(self.stream.unexpected(&token, "classVarDec", "'static' or 'field'")),
        };

        let ty = self.parse_type("classVarDec")?;
        loop {
            let (token, name) = self.stream.consume_ident("classVarDec")?;
            declare(&mut self.class_symbols, &token, name, ty.clone(), role)?;

            if !self.match_symbol(Sym::Comma)? {
                break;
            }
        }

        self.expect(Sym::Semicolon, "classVarDec")?;
        Ok(())
    }

    /// `(constructor | function | method) (void | type) name ( parameterList ) subroutineBody`
    fn emit_subroutine(&mut self) -> JackResult<()> {
        let token = self.stream.next_token()?;
        let kind = match token.kind {
            TokenKind::Keyword(Keyword::Constructor) => SubroutineKind::Constructor,
            TokenKind::Keyword(Keyword::Function) => SubroutineKind::Function,
            TokenKind::Keyword(Keyword::Method) => SubroutineKind::Method,
            _ => return Err(self.stream.unexpected(&token, "subroutineDec", "subroutine kind")),
        };

        self.sub_symbols.reset();

        if !self.stream.match_token(TokenKind::Keyword(Keyword::Void))? {
            self.parse_type("subroutineDec")?;
        }

        let (name_token, name) = self.stream.consume_ident("subroutineDec")?;

        // The object a method is invoked on is passed as argument 0.
        if kind == SubroutineKind::Method {
            let class_name = self.class_name.clone();
            declare(
                &mut self.sub_symbols,
                &name_token,
                SmolStr::from("this"),
                class_name,
                Role::Argument,
            )?;
        }

        self.expect(Sym::LeftParen, "subroutineDec")?;
        self.emit_parameter_list()?;
        self.expect(Sym::RightParen, "subroutineDec")?;

        self.emit_subroutine_body(kind, &name)
    }

    /// `( type name (, type name)* )?`
    fn emit_parameter_list(&mut self) -> JackResult<()> {
        if self.stream.peek_kind()?.is_symbol(Sym::RightParen) {
            return Ok(());
        }

        loop {
            let ty = self.parse_type("parameterList")?;
            let (token, name) = self.stream.consume_ident("parameterList")?;
            declare(&mut self.sub_symbols, &token, name, ty, Role::Argument)?;

            if !self.match_symbol(Sym::Comma)? {
                return Ok(());
            }
        }
    }

    /// `{ varDec* statements }`
    fn emit_subroutine_body(&mut self, kind: SubroutineKind, name: &str) -> JackResult<()> {
        self.expect(Sym::LeftBrace, "subroutineBody")?;

        while self.stream.peek_kind()?.is_keyword(Keyword::Var) {
            self.emit_var_dec()?;
        }

        // Local count is only known once all declarations are scanned.
        let qualified_name = self.qualified_name(name);
        let local_count = self.sub_symbols.count_of(Role::Local);
        debug!("function {qualified_name} ({kind:?}) with {local_count} locals");
        self.writer.write_function(&qualified_name, local_count)?;

        match kind {
            SubroutineKind::Constructor => {
                let field_count = self.class_symbols.count_of(Role::Field);
                self.push(Segment::Constant, field_count)?;
                self.call(MEMORY_ALLOC, 1)?;
                self.pop(Segment::Pointer, 0)?;
            }
            SubroutineKind::Method => {
                self.push(Segment::Argument, 0)?;
                self.pop(Segment::Pointer, 0)?;
            }
            SubroutineKind::Function => {}
        }

        self.emit_statements()?;
        self.expect(Sym::RightBrace, "subroutineBody")?;
        Ok(())
    }

    /// `var type name (, name)* ;`
    fn emit_var_dec(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::Var), "varDec")?;
        let ty = self.parse_type("varDec")?;

        loop {
            let (token, name) = self.stream.consume_ident("varDec")?;
            declare(&mut self.sub_symbols, &token, name, ty.clone(), Role::Local)?;

            if !self.match_symbol(Sym::Comma)? {
                break;
            }
        }

        self.expect(Sym::Semicolon, "varDec")?;
        Ok(())
    }

    /// Statements up to the first token that doesn't start one.
    fn emit_statements(&mut self) -> JackResult<()> {
        loop {
            match self.stream.peek_kind()? {
                TokenKind::Keyword(Keyword::Let) => self.emit_let()?,
                TokenKind::Keyword(Keyword::If) => self.emit_if()?,
                TokenKind::Keyword(Keyword::While) => self.emit_while()?,
                TokenKind::Keyword(Keyword::Do) => self.emit_do()?,
                TokenKind::Keyword(Keyword::Return) => self.emit_return()?,
                _ => return Ok(()),
            }
        }
    }

    /// `let name ([ expression ])? = expression ;`
    fn emit_let(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::Let), "letStatement")?;
        let (token, name) = self.stream.consume_ident("letStatement")?;
        let target = self.resolve_variable(&token, &name)?;

        if self.match_symbol(Sym::LeftBracket)? {
            // Element address: base + offset
            self.push(target.segment(), target.index)?;
            self.emit_expression()?;
            self.expect(Sym::RightBracket, "letStatement")?;
            self.arithmetic(Command::Add)?;

            self.expect(Sym::Eq, "letStatement")?;
            self.emit_expression()?;
            self.expect(Sym::Semicolon, "letStatement")?;

            // The right hand side may itself have used `that`, so the
            // address is only bound after the value is computed.
            self.pop(Segment::Temp, 0)?;
            self.pop(Segment::Pointer, 1)?;
            self.push(Segment::Temp, 0)?;
            self.pop(Segment::That, 0)?;
        } else {
            self.expect(Sym::Eq, "letStatement")?;
            self.emit_expression()?;
            self.expect(Sym::Semicolon, "letStatement")?;

            self.pop(target.segment(), target.index)?;
        }

        Ok(())
    }

    /// `if ( expression ) { statements } (else { statements })?`
    fn emit_if(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::If), "ifStatement")?;
        let (else_label, end_label) = self.reserve_labels();

        self.expect(Sym::LeftParen, "ifStatement")?;
        self.emit_expression()?;
        self.expect(Sym::RightParen, "ifStatement")?;

        self.arithmetic(Command::Not)?;
        self.if_goto(else_label)?;

        self.expect(Sym::LeftBrace, "ifStatement")?;
        self.emit_statements()?;
        self.expect(Sym::RightBrace, "ifStatement")?;

        if self.stream.match_token(TokenKind::Keyword(Keyword::Else))? {
            self.goto(end_label)?;
            self.label(else_label)?;

            self.expect(Sym::LeftBrace, "ifStatement")?;
            self.emit_statements()?;
            self.expect(Sym::RightBrace, "ifStatement")?;

            self.label(end_label)?;
        } else {
            self.label(else_label)?;
        }

        Ok(())
    }

    /// `while ( expression ) { statements }`
    fn emit_while(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::While), "whileStatement")?;
        let (top_label, exit_label) = self.reserve_labels();

        self.label(top_label)?;

        self.expect(Sym::LeftParen, "whileStatement")?;
        self.emit_expression()?;
        self.expect(Sym::RightParen, "whileStatement")?;

        self.arithmetic(Command::Not)?;
        self.if_goto(exit_label)?;

        self.expect(Sym::LeftBrace, "whileStatement")?;
        self.emit_statements()?;
        self.expect(Sym::RightBrace, "whileStatement")?;

        self.goto(top_label)?;
        self.label(exit_label)?;

        Ok(())
    }

    /// `do subroutineCall ;`
    fn emit_do(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::Do), "doStatement")?;
        let (_, name) = self.stream.consume_ident("doStatement")?;
        self.emit_subroutine_call(&name)?;
        self.expect(Sym::Semicolon, "doStatement")?;

        // Every call leaves a value on the stack.
        self.pop(Segment::Temp, 0)
    }

    /// `return expression? ;`
    fn emit_return(&mut self) -> JackResult<()> {
        self.stream.consume(TokenKind::Keyword(Keyword::Return), "returnStatement")?;

        if self.match_symbol(Sym::Semicolon)? {
            self.push(Segment::Constant, 0)?;
        } else {
            self.emit_expression()?;
            self.expect(Sym::Semicolon, "returnStatement")?;
        }

        Ok(self.writer.write_return()?)
    }

    /// `term (op term)*`
    ///
    /// Operators are applied strictly left to right, there is no precedence.
    fn emit_expression(&mut self) -> JackResult<()> {
        self.emit_term()?;

        while let TokenKind::Symbol(symbol) = self.stream.peek_kind()? {
            let Some(op) = binary_op(symbol) else {
                break;
            };
            self.stream.next_token()?;
            self.emit_term()?;

            match op {
                BinaryOp::Command(command) => self.arithmetic(command)?,
                BinaryOp::Call(name) => self.call(name, 2)?,
            }
        }

        Ok(())
    }

    fn emit_term(&mut self) -> JackResult<()> {
        use Keyword as K;
        use TokenKind as TK;

        let token = self.stream.next_token()?;
        trace!("term {:?}", token.kind);

        match token.kind {
            TK::Number(value) => self.push(Segment::Constant, value),
            TK::String => self.emit_string(&token),
            TK::Keyword(K::True) => {
                self.push(Segment::Constant, 1)?;
                self.arithmetic(Command::Neg)
            }
            TK::Keyword(K::False | K::Null) => self.push(Segment::Constant, 0),
            TK::Keyword(K::This) => self.push(Segment::Pointer, 0),
            TK::Symbol(Sym::LeftParen) => {
                self.emit_expression()?;
                self.expect(Sym::RightParen, "term")?;
                Ok(())
            }
            TK::Symbol(Sym::Minus) => {
                self.emit_term()?;
                self.arithmetic(Command::Neg)
            }
            TK::Symbol(Sym::Tilde) => {
                self.emit_term()?;
                self.arithmetic(Command::Not)
            }
            TK::Ident => {
                let name = self.stream.fragment(&token.span);
                match self.stream.peek_kind()? {
                    TK::Symbol(Sym::LeftParen | Sym::Dot) => self.emit_subroutine_call(name),
                    TK::Symbol(Sym::LeftBracket) => {
                        let array = self.resolve_variable(&token, name)?;
                        self.stream.next_token()?;

                        self.push(array.segment(), array.index)?;
                        self.emit_expression()?;
                        self.expect(Sym::RightBracket, "term")?;
                        self.arithmetic(Command::Add)?;

                        self.pop(Segment::Pointer, 1)?;
                        self.push(Segment::That, 0)
                    }
                    _ => {
                        let var = self.resolve_variable(&token, name)?;
                        self.push(var.segment(), var.index)
                    }
                }
            }
            _ => Err(self.stream.unexpected(&token, "term", "expression")),
        }
    }

    /// Build a string object one character at a time.
    fn emit_string(&mut self, token: &Token) -> JackResult<()> {
        let text = self.stream.fragment(&token.span);
        let length = match u16::try_from(text.chars().count()) {
            Ok(length) if length <= MAX_INT => length,
            _ => {
                return Err(self
                    .stream
                    .unexpected(token, "term", "string constant of at most 32767 characters"))
            }
        };

        self.push(Segment::Constant, length)?;
        self.call(STRING_NEW, 1)?;

        for c in text.chars() {
            // Character codes are limited to the integer constant range by the lexer.
            self.push(Segment::Constant, u32::from(c) as u16)?;
            self.call(STRING_APPEND_CHAR, 2)?;
        }

        Ok(())
    }

    /// `name ( expressionList )` or `(className | varName) . name ( expressionList )`
    ///
    /// The cursor is positioned right after the leading name.
    fn emit_subroutine_call(&mut self, name: &str) -> JackResult<()> {
        let (target, implicit_args): (String, u16) = if self.match_symbol(Sym::Dot)? {
            let (_, subroutine) = self.stream.consume_ident("subroutineCall")?;

            match self.lookup(name).cloned() {
                // Method call on an object held in a variable.
                Some(object) => {
                    self.push(object.segment(), object.index)?;
                    (format!("{}.{}", object.ty, subroutine), 1)
                }
                // Function or constructor of another class.
                None => (format!("{name}.{subroutine}"), 0),
            }
        } else {
            // Method call on the current object.
            self.push(Segment::Pointer, 0)?;
            (self.qualified_name(name), 1)
        };

        self.expect(Sym::LeftParen, "subroutineCall")?;
        let arg_count = self.emit_expression_list()?;
        let close = self.expect(Sym::RightParen, "subroutineCall")?;

        let total = match implicit_args.checked_add(arg_count) {
            Some(total) => total,
            None => return Err(self.stream.unexpected(&close, "subroutineCall", TOO_MANY_ARGS)),
        };
        self.call(&target, total)
    }

    /// `(expression (, expression)*)?`
    ///
    /// Returns the number of expressions compiled.
    fn emit_expression_list(&mut self) -> JackResult<u16> {
        if self.stream.peek_kind()?.is_symbol(Sym::RightParen) {
            return Ok(0);
        }

        let mut count: u16 = 0;
        loop {
            let token = self.stream.peek()?.clone();
            count = match count.checked_add(1) {
                Some(count) => count,
                None => return Err(self.stream.unexpected(&token, "expressionList", TOO_MANY_ARGS)),
            };
            self.emit_expression()?;

            if !self.match_symbol(Sym::Comma)? {
                return Ok(count);
            }
        }
    }
}

#[rustfmt::skip]
fn binary_op(symbol: Sym) -> Option<BinaryOp> {
    match symbol {
        Sym::Plus    => Some(BinaryOp::Command(Command::Add)),
        Sym::Minus   => Some(BinaryOp::Command(Command::Sub)),
        Sym::Amp     => Some(BinaryOp::Command(Command::And)),
        Sym::Pipe    => Some(BinaryOp::Command(Command::Or)),
        Sym::Less    => Some(BinaryOp::Command(Command::Lt)),
        Sym::Greater => Some(BinaryOp::Command(Command::Gt)),
        Sym::Eq      => Some(BinaryOp::Command(Command::Eq)),
        Sym::Star    => Some(BinaryOp::Call(MATH_MULTIPLY)),
        Sym::Slash   => Some(BinaryOp::Call(MATH_DIVIDE)),
        _            => None,
    }
}

/// Define a symbol, reporting failures at the name's location.
fn declare(
    table: &mut SymbolTable,
    token: &Token,
    name: SmolStr,
    ty: SmolStr,
    role: Role,
) -> JackResult<()> {
    let kind = match table.define(name, ty, role) {
        Ok(_) => return Ok(()),
        Err(DefineError::Exists(name)) => SemanticErrorKind::Redefinition(name),
        Err(DefineError::Full(role)) => SemanticErrorKind::TooManySymbols(role),
    };
    Err(JackError::from(SemanticError {
        kind,
        line: token.span.line,
        column: token.span.column,
    }))
}
