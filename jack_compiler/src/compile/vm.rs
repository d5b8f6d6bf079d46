//! Stack machine instruction writer.
use std::{
    fmt,
    io::{self, Write},
};

/// Named memory region of the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    /// Fields of the current object.
    This,
    /// Array element pointed to by `pointer 1`.
    That,
    /// `pointer 0` is the base of `this`, `pointer 1` the base of `that`.
    Pointer,
    Temp,
}

impl fmt::Display for Segment {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Segment::Constant => write!(f, "constant"),
            Segment::Argument => write!(f, "argument"),
            Segment::Local    => write!(f, "local"),
            Segment::Static   => write!(f, "static"),
            Segment::This     => write!(f, "this"),
            Segment::That     => write!(f, "that"),
            Segment::Pointer  => write!(f, "pointer"),
            Segment::Temp     => write!(f, "temp"),
        }
    }
}

/// Arithmetic and logical commands operating on the top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl fmt::Display for Command {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Add => write!(f, "add"),
            Command::Sub => write!(f, "sub"),
            Command::Neg => write!(f, "neg"),
            Command::Eq  => write!(f, "eq"),
            Command::Gt  => write!(f, "gt"),
            Command::Lt  => write!(f, "lt"),
            Command::And => write!(f, "and"),
            Command::Or  => write!(f, "or"),
            Command::Not => write!(f, "not"),
        }
    }
}

/// Jump target, formatted as the prefix followed by its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label<'a> {
    pub prefix: &'a str,
    pub id: u32,
}

impl<'a> fmt::Display for Label<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.id)
    }
}

/// Writes one line of VM code per call to the underlying sink.
pub struct VmWriter<W: Write> {
    out: W,
}

impl<W: Write> VmWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_push(&mut self, segment: Segment, index: u16) -> io::Result<()> {
        writeln!(self.out, "push {segment} {index}")
    }

    pub fn write_pop(&mut self, segment: Segment, index: u16) -> io::Result<()> {
        writeln!(self.out, "pop {segment} {index}")
    }

    pub fn write_arithmetic(&mut self, command: Command) -> io::Result<()> {
        writeln!(self.out, "{command}")
    }

    pub fn write_label(&mut self, label: &Label) -> io::Result<()> {
        writeln!(self.out, "label {label}")
    }

    pub fn write_goto(&mut self, label: &Label) -> io::Result<()> {
        writeln!(self.out, "goto {label}")
    }

    pub fn write_if(&mut self, label: &Label) -> io::Result<()> {
        writeln!(self.out, "if-goto {label}")
    }

    pub fn write_call(&mut self, name: &str, arg_count: u16) -> io::Result<()> {
        writeln!(self.out, "call {name} {arg_count}")
    }

    pub fn write_function(&mut self, name: &str, local_count: u16) -> io::Result<()> {
        writeln!(self.out, "function {name} {local_count}")
    }

    pub fn write_return(&mut self) -> io::Result<()> {
        writeln!(self.out, "return")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_instruction_format() {
        let mut writer = VmWriter::new(Vec::new());
        let top = Label { prefix: "L", id: 4 };

        writer.write_function("Main.main", 2).unwrap();
        writer.write_label(&top).unwrap();
        writer.write_push(Segment::Argument, 1).unwrap();
        writer.write_push(Segment::Constant, 32767).unwrap();
        writer.write_arithmetic(Command::Lt).unwrap();
        writer.write_arithmetic(Command::Not).unwrap();
        writer.write_if(&Label { prefix: "L", id: 5 }).unwrap();
        writer.write_call("Math.multiply", 2).unwrap();
        writer.write_pop(Segment::Temp, 0).unwrap();
        writer.write_goto(&top).unwrap();
        writer.write_return().unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "function Main.main 2\n\
             label L4\n\
             push argument 1\n\
             push constant 32767\n\
             lt\n\
             not\n\
             if-goto L5\n\
             call Math.multiply 2\n\
             pop temp 0\n\
             goto L4\n\
             return\n"
        );
    }

    #[test]
    fn test_segment_names() {
        let names: Vec<_> = [
            Segment::Constant,
            Segment::Argument,
            Segment::Local,
            Segment::Static,
            Segment::This,
            Segment::That,
            Segment::Pointer,
            Segment::Temp,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(
            names,
            ["constant", "argument", "local", "static", "this", "that", "pointer", "temp"]
        );
    }
}
