//! Generación de expresiones.
//!
//! Toda expresión deja su valor en el tope de la pila. Los operadores
//! binarios consumen primero el operando izquierdo, por lo cual este se
//! evalúa de último. Los arreglos quedan con el elemento 0 en el tope.

use super::Generator;
use crate::{
    ir::{Operand, Slot},
    parse::ast::*,
    types::{Base, Primitive},
};

/// Módulo de la aritmética de colores, `0x1000000`.
const COLOR_MODULUS: i64 = 1 << 24;

impl Generator<'_> {
    pub(super) fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(value) => emit!(self, Push(Operand::Int(*value))),
            ExprKind::Float(value) => emit!(self, Push(Operand::Float(*value))),
            ExprKind::Bool(value) => emit!(self, Push(Operand::Int(*value as i64))),
            ExprKind::Color(color) => emit!(self, Push(Operand::Color(*color))),

            ExprKind::Array(elements) => {
                for element in elements.iter().rev() {
                    self.expr(element);
                }
            }

            ExprKind::Width => emit!(self, Width),
            ExprKind::Height => emit!(self, Height),

            ExprKind::Read { x, y } => {
                self.expr(y);
                self.expr(x);
                emit!(self, Read);
            }

            ExprKind::RandomInt(max) => {
                self.expr(max);
                emit!(self, Irnd);
            }

            ExprKind::Variable(name) => self.variable(name),

            ExprKind::Index { array, index } => {
                let (slot, _) = self.resolve(array.val());

                self.expr(index);
                emit!(self, PushIndexed(slot));
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                for argument in arguments.iter().rev() {
                    self.expr(argument);
                }

                let name = function.val();
                let (slots, label) = match self.env.lookup_function(name) {
                    Some(signature) => match signature.argument_slots() {
                        Some(slots) => (slots, signature.label.clone()),
                        None => unreachable!("arguments of `{}` exceed a frame", name),
                    },

                    None => unreachable!("call to undeclared function `{}`", name),
                };

                let label = label.unwrap_or_else(|| name.clone());
                emit!(
                    self,
                    Push(Operand::Int(slots as i64)),
                    Push(Operand::Label(label)),
                    Call
                );
            }

            ExprKind::Group(inner) => self.expr(inner),

            ExprKind::Binary(left, op, right) => self.binary(left, *op, right),

            ExprKind::Unary(UnOp::Not, operand) => {
                self.expr(operand);
                emit!(self, Not);
            }

            ExprKind::Unary(UnOp::Neg, operand) => {
                self.expr(operand);
                emit!(self, Push(Operand::Int(0)), Sub);
            }
        }
    }

    pub(super) fn exprs<const N: usize>(&mut self, exprs: [&Expr; N]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn variable(&mut self, name: &Identifier) {
        let (slot, ty) = self.resolve(name);

        let size = match ty {
            Primitive::Base(_) => {
                emit!(self, PushSlot(slot));
                return;
            }

            Primitive::Array { size, .. } => size as i64,
        };

        // Copia estructural a un frame temporal, de forma que el valor
        // leído no dependa del almacenamiento de la variable
        let source = Slot {
            index: slot.index,
            level: slot.level + 1,
        };

        let scratch = Slot { index: 0, level: 0 };
        emit!(
            self,
            Push(Operand::Int(size)),
            Oframe,
            Push(Operand::Int(size)),
            PushBlock(source),
            Push(Operand::Int(size)),
            Push(Operand::Int(0)),
            Push(Operand::Int(0)),
            Sta,
            Push(Operand::Int(size)),
            PushBlock(scratch),
            Cframe
        );
    }

    fn binary(&mut self, left: &Expr, op: BinOp, right: &Expr) {
        use BinOp::*;

        let modulus = Operand::Int(COLOR_MODULUS);

        match (op, left.ty()) {
            (Add, Primitive::Base(Base::Color)) => {
                emit!(self, Push(modulus));
                self.exprs([right, left]);
                emit!(self, Add, Mod);
            }

            (Sub, Primitive::Base(Base::Color)) => {
                emit!(self, Push(modulus.clone()), Push(modulus));
                self.exprs([right, left]);
                emit!(self, Sub, Add, Mod);
            }

            // Cociente truncado: (a - a mod b) / b
            (Div, Primitive::Base(Base::Int)) => {
                self.exprs([right, right, left]);
                emit!(self, Mod);
                self.expr(left);
                emit!(self, Sub, Div);
            }

            _ => {
                self.exprs([right, left]);
                match op {
                    Or => emit!(self, Or),
                    And => emit!(self, And),
                    Equal => emit!(self, Eq),
                    NotEqual => emit!(self, Neq),
                    Less => emit!(self, Lt),
                    LessOrEqual => emit!(self, Le),
                    Greater => emit!(self, Gt),
                    GreaterOrEqual => emit!(self, Ge),
                    Add => emit!(self, Add),
                    Sub => emit!(self, Sub),
                    Mul => emit!(self, Mul),
                    Div => emit!(self, Div),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{lex::Lexer, parse::parse, semantic::analyze};

    /// Código de la expresión inicializadora de `let v: T = ...;`.
    fn value(declaration: &str) -> Vec<String> {
        let tokens = Lexer::new(declaration)
            .try_exhaustive()
            .expect("lexical error");

        let mut program = parse(tokens).expect("parse error");
        let mut analysis = analyze(&mut program).expect("semantic errors");
        let lines: Vec<_> = super::super::generate(&program, &mut analysis.environment)
            .instructions()
            .iter()
            .map(ToString::to_string)
            .collect();

        // .main, push N, oframe ... push idx, push 0, st, cframe, halt
        lines[3..lines.len() - 5].to_vec()
    }

    #[test]
    fn literals() {
        assert_eq!(value("let b: bool = true;"), vec!["push 1"]);
        assert_eq!(value("let f: float = 2.5;"), vec!["push 2.5"]);
        assert_eq!(value("let c: colour = #FF00aa;"), vec!["push #ff00aa"]);
    }

    #[test]
    fn operands_are_evaluated_right_to_left() {
        assert_eq!(
            value("let b: bool = 1 < 2 and not false;"),
            vec!["push 0", "not", "push 2", "push 1", "lt", "and"]
        );
    }

    #[test]
    fn negation_subtracts_from_zero() {
        assert_eq!(value("let x: int = -5;"), vec!["push 5", "push 0", "sub"]);
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(
            value("let x: int = 7 / 2;"),
            vec!["push 2", "push 2", "push 7", "mod", "push 7", "sub", "div"]
        );
        assert_eq!(
            value("let x: float = 7.0 / 2.0;"),
            vec!["push 2.0", "push 7.0", "div"]
        );
    }

    #[test]
    fn colour_arithmetic_wraps() {
        assert_eq!(
            value("let c: colour = #000001 + #ffffff;"),
            vec!["push 16777216", "push #ffffff", "push #000001", "add", "mod"]
        );
        assert_eq!(
            value("let c: colour = #000001 - #000002;"),
            vec![
                "push 16777216",
                "push 16777216",
                "push #000002",
                "push #000001",
                "sub",
                "add",
                "mod",
            ]
        );
    }

    #[test]
    fn pad_builtins() {
        assert_eq!(
            value("let c: colour = __read __width, __random_int 10;"),
            vec!["push 10", "irnd", "width", "read"]
        );
    }

    #[test]
    fn casts_emit_nothing() {
        assert_eq!(value("let c: colour = 255 as colour;"), vec!["push 255"]);
    }
}
