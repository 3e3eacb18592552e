//! Representación de las instrucciones de la máquina de pila objetivo.
//!
//! Cada [`Instruction`] corresponde exactamente a una línea de salida.
//! El texto de cada línea se obtiene de su implementación de
//! [`Display`].

use std::fmt::{self, Display};

use crate::{parse::ast::Identifier, types::Color};

/// Programa final, en orden de emisión.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program(pub Vec<Instruction>);

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.0
    }
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in self.instructions() {
            writeln!(fmt, "{}", instruction)?;
        }

        Ok(())
    }
}

/// Celda de memoria: índice dentro de un frame y cantidad de frames a subir.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub index: u32,
    pub level: u32,
}

impl Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "[{}:{}]", self.index, self.level)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Int(i64),
    Float(f64),
    Color(Color),

    /// Desplazamiento relativo a la posición de la propia instrucción.
    Pc(i64),

    Label(Identifier),
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(value) => write!(fmt, "{}", value),
            Operand::Float(value) => write!(fmt, "{:?}", value),
            Operand::Color(color) => write!(fmt, "{}", color),
            Operand::Pc(offset) if *offset < 0 => write!(fmt, "#PC{}", offset),
            Operand::Pc(offset) => write!(fmt, "#PC+{}", offset),
            Operand::Label(label) => write!(fmt, ".{}", label),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Not,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    St,
    Sta,
    Oframe,
    Cframe,
    Call,
    Ret,
    Cjmp,
    Jmp,
    Width,
    Height,
    Read,
    Irnd,
    Print,
    Printa,
    Delay,
    Write,
    WriteBox,
    Clear,
    Halt,
}

impl Display for Opcode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Opcode::*;

        fmt.write_str(match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            Not => "not",
            Eq => "eq",
            Neq => "neq",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            St => "st",
            Sta => "sta",
            Oframe => "oframe",
            Cframe => "cframe",
            Call => "call",
            Ret => "ret",
            Cjmp => "cjmp",
            Jmp => "jmp",
            Width => "width",
            Height => "height",
            Read => "read",
            Irnd => "irnd",
            Print => "print",
            Printa => "printa",
            Delay => "delay",
            Write => "write",
            WriteBox => "writebox",
            Clear => "clear",
            Halt => "halt",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Etiqueta de entrada de una función, o `.main`.
    Label(Identifier),

    Push(Operand),

    /// `push [i:l]`, lee un escalar.
    PushSlot(Slot),

    /// `push +[i:l]`, lee un bloque contiguo; la cantidad ya está en la pila.
    PushBlock(Slot),

    /// `pusha [i:l]`, lee un elemento; el índice ya está en la pila.
    PushIndexed(Slot),

    Op(Opcode),
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(fmt, ".{}", label),
            Instruction::Push(operand) => write!(fmt, "push {}", operand),
            Instruction::PushSlot(slot) => write!(fmt, "push {}", slot),
            Instruction::PushBlock(slot) => write!(fmt, "push +{}", slot),
            Instruction::PushIndexed(slot) => write!(fmt, "pusha {}", slot),
            Instruction::Op(opcode) => opcode.fmt(fmt),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_shapes() {
        let slot = Slot { index: 2, level: 1 };
        let program = Program(vec![
            Instruction::Label(Identifier::from("main")),
            Instruction::Push(Operand::Int(-4)),
            Instruction::Push(Operand::Float(1.0)),
            Instruction::Push(Operand::Color(Color { r: 0, g: 255, b: 16 })),
            Instruction::Push(Operand::Pc(5)),
            Instruction::Push(Operand::Pc(-3)),
            Instruction::Push(Operand::Label(Identifier::from("f"))),
            Instruction::PushSlot(slot),
            Instruction::PushBlock(slot),
            Instruction::PushIndexed(slot),
            Instruction::Op(Opcode::WriteBox),
        ]);

        assert_eq!(
            program.to_string(),
            ".main\npush -4\npush 1.0\npush #00ff10\npush #PC+5\npush #PC-3\npush .f\n\
             push [2:1]\npush +[2:1]\npusha [2:1]\nwritebox\n"
        );
    }
}
