//! Análisis sintáctico.
//!
//! Parser de descenso recursivo con una ventana fija de dos tokens de
//! lookahead. La ventana se rellena un token a la vez conforme se
//! consume la entrada, descartando espacios en blanco y comentarios.
//!
//! # Recuperación de errores
//! Al encontrar un error, este se registra y se retorna [`Recovered`]
//! hasta la secuencia de sentencias más cercana (programa o bloque).
//! Esta descarta tokens hasta un `;` (que se consume) o hasta un token
//! que inicia una sentencia con seguridad, y continúa con la siguiente
//! sentencia. De esta forma un mismo intento de compilación puede
//! reportar varios errores independientes.

use thiserror::Error;

use crate::{
    lex::{Builtin, Literal, Token, TokenKind},
    source::{Located, Position},
    types::{Base, Primitive},
};

pub mod ast;

use ast::*;

#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum ParserError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },

    #[error("expected an expression, found {0}")]
    ExpectedExpr(String),

    #[error("expected one of `int`, `float`, `bool`, `colour`, found {0}")]
    ExpectedType(String),

    #[error("array size must be a positive integer literal, found {0}")]
    BadArraySize(String),
}

/// Construye el AST de un flujo de tokens.
///
/// El AST solo se entrega si no se registró ningún error.
pub fn parse<I>(tokens: I) -> Result<Program, Vec<Located<ParserError>>>
where
    I: IntoIterator<Item = Token>,
{
    let mut parser = Parser::new(tokens.into_iter());
    let program = parser.program();

    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

/// Señal de que un error ya fue registrado y se debe sincronizar.
struct Recovered;

type Parse<T> = Result<T, Recovered>;

struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    window: [Token; 2],
    last_known: Position,
    consumed: Position,
    errors: Vec<Located<ParserError>>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    fn new(tokens: I) -> Self {
        let placeholder = Token::eof(Position::default());
        let mut parser = Parser {
            tokens,
            window: [placeholder.clone(), placeholder],
            last_known: Position::default(),
            consumed: Position::default(),
            errors: Vec::new(),
        };

        parser.advance();
        parser.advance();
        parser
    }

    fn program(&mut self) -> Program {
        let mut statements = Vec::new();
        while !self.check(TokenKind::EndOfFile) {
            match self.statement() {
                Ok(statement) => statements.push(statement),
                Err(Recovered) => self.synchronize(),
            }
        }

        Program { statements }
    }

    fn block(&mut self) -> Parse<Block> {
        let position = self.expect(TokenKind::OpenCurly, "`{`")?.position();

        let mut statements = Vec::new();
        loop {
            match self.peek().kind() {
                TokenKind::CloseCurly => break,
                TokenKind::EndOfFile => {
                    self.expect(TokenKind::CloseCurly, "`}`")?;
                }

                _ => match self.statement() {
                    Ok(statement) => statements.push(statement),
                    Err(Recovered) => self.synchronize(),
                },
            }
        }

        self.advance();
        Ok(Block {
            position,
            statements,
            scope: None,
        })
    }

    fn statement(&mut self) -> Parse<Stmt> {
        let position = self.peek().position();
        let kind = match self.peek().kind() {
            TokenKind::Let => {
                let declaration = self.declaration()?;
                self.semicolon()?;
                StmtKind::Declaration(declaration)
            }

            TokenKind::Builtin => self.builtin_statement()?,
            TokenKind::OpenCurly => StmtKind::Block(self.block()?),
            TokenKind::If => self.if_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::Fun => StmtKind::Function(self.function()?),

            TokenKind::Return => {
                self.advance();
                let value = self.expr()?;
                self.semicolon()?;
                StmtKind::Return(value)
            }

            _ => {
                let assignment = self.assignment()?;
                self.semicolon()?;
                StmtKind::Assignment(assignment)
            }
        };

        Ok(Stmt {
            position,
            end: self.consumed,
            kind,
        })
    }

    fn builtin_statement(&mut self) -> Parse<StmtKind> {
        let builtin = match self.peek().builtin() {
            Some(builtin) if builtin.is_statement() => builtin,
            _ => {
                let found = self.peek().to_string();
                return self.fail(ParserError::UnexpectedToken {
                    expected: "a statement",
                    found,
                });
            }
        };

        self.advance();
        let kind = match builtin {
            Builtin::Print => StmtKind::Print(self.expr()?),
            Builtin::Delay => StmtKind::Delay(self.expr()?),
            Builtin::Clear => StmtKind::Clear(self.expr()?),

            Builtin::Write => {
                let x = self.expr()?;
                self.comma()?;
                let y = self.expr()?;
                self.comma()?;
                let color = self.expr()?;

                StmtKind::Write { x, y, color }
            }

            Builtin::WriteBox => {
                let x = self.expr()?;
                self.comma()?;
                let y = self.expr()?;
                self.comma()?;
                let width = self.expr()?;
                self.comma()?;
                let height = self.expr()?;
                self.comma()?;
                let color = self.expr()?;

                StmtKind::WriteBox {
                    x,
                    y,
                    width,
                    height,
                    color,
                }
            }

            _ => unreachable!("expression builtin in statement position"),
        };

        self.semicolon()?;
        Ok(kind)
    }

    fn if_statement(&mut self) -> Parse<StmtKind> {
        self.expect(TokenKind::If, "`if`")?;
        self.expect(TokenKind::OpenParen, "`(`")?;
        let condition = self.expr()?;
        self.expect(TokenKind::CloseParen, "`)`")?;

        let then = self.block()?;
        let otherwise = if self.check(TokenKind::Else) {
            self.advance();
            Some(self.block()?)
        } else {
            None
        };

        Ok(StmtKind::If {
            condition,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Parse<StmtKind> {
        self.expect(TokenKind::For, "`for`")?;
        self.expect(TokenKind::OpenParen, "`(`")?;

        let init = if self.check(TokenKind::Let) {
            Some(self.declaration()?)
        } else {
            None
        };

        self.semicolon()?;
        let condition = self.expr()?;
        self.semicolon()?;

        let update = if self.check(TokenKind::CloseParen) {
            None
        } else {
            Some(self.assignment()?)
        };

        self.expect(TokenKind::CloseParen, "`)`")?;
        let body = self.block()?;

        Ok(StmtKind::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn while_statement(&mut self) -> Parse<StmtKind> {
        self.expect(TokenKind::While, "`while`")?;
        self.expect(TokenKind::OpenParen, "`(`")?;
        let condition = self.expr()?;
        self.expect(TokenKind::CloseParen, "`)`")?;
        let body = self.block()?;

        Ok(StmtKind::While { condition, body })
    }

    fn function(&mut self) -> Parse<Function> {
        self.expect(TokenKind::Fun, "`fun`")?;
        let name = self.id()?;

        self.expect(TokenKind::OpenParen, "`(`")?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                let name = self.id()?;
                self.expect(TokenKind::Colon, "`:`")?;
                let of = self.typ()?;
                parameters.push(Parameter { name, of });

                if !self.check(TokenKind::Comma) {
                    break;
                }

                self.advance();
            }
        }

        self.expect(TokenKind::CloseParen, "`)`")?;
        self.expect(TokenKind::Arrow, "`->`")?;
        let returns = self.typ()?;
        let body = self.block()?;

        Ok(Function {
            name,
            parameters,
            returns,
            body,
            scope: None,
        })
    }

    fn declaration(&mut self) -> Parse<Declaration> {
        self.expect(TokenKind::Let, "`let`")?;
        let name = self.id()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let of = self.typ()?;
        self.expect(TokenKind::Assign, "`=`")?;
        let value = self.expr()?;

        Ok(Declaration { name, of, value })
    }

    fn assignment(&mut self) -> Parse<Assignment> {
        let target = self.id()?;

        let index = if self.check(TokenKind::OpenSquare) {
            self.advance();
            let index = self.expr()?;
            self.expect(TokenKind::CloseSquare, "`]`")?;
            Some(index)
        } else {
            None
        };

        self.expect(TokenKind::Assign, "`=`")?;
        let value = self.expr()?;

        Ok(Assignment {
            target,
            index,
            value,
        })
    }

    fn typ(&mut self) -> Parse<Located<Primitive>> {
        let position = self.peek().position();
        let base = match self.peek().kind() {
            TokenKind::IntType => Base::Int,
            TokenKind::FloatType => Base::Float,
            TokenKind::BoolType => Base::Bool,
            TokenKind::ColorType => Base::Color,

            _ => {
                let found = self.peek().to_string();
                return self.fail(ParserError::ExpectedType(found));
            }
        };

        self.advance();
        if !self.check(TokenKind::OpenSquare) {
            return Ok(Located::at(Primitive::Base(base), position));
        }

        self.advance();
        let size = match self.peek().value() {
            Some(Literal::Int(size)) if size > 0 && size <= u32::MAX as i64 => size as u32,
            _ => {
                let found = self.peek().to_string();
                return self.fail(ParserError::BadArraySize(found));
            }
        };

        self.advance();
        self.expect(TokenKind::CloseSquare, "`]`")?;

        Ok(Located::at(
            Primitive::array(size, Primitive::Base(base)),
            position,
        ))
    }

    fn expr(&mut self) -> Parse<Expr> {
        let mut expr = self.logical_or()?;
        if self.check(TokenKind::As) {
            self.advance();
            expr.cast = Some(self.typ()?);
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Parse<Expr> {
        let mut left = self.logical_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.logical_and()?;
            left = binary(left, BinOp::Or, right);
        }

        Ok(left)
    }

    fn logical_and(&mut self) -> Parse<Expr> {
        let mut left = self.equality()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.equality()?;
            left = binary(left, BinOp::And, right);
        }

        Ok(left)
    }

    // Recursiva por la derecha: `a == b == c` es `a == (b == c)`
    fn equality(&mut self) -> Parse<Expr> {
        let left = self.comparison()?;
        let op = match self.peek().kind() {
            TokenKind::Equal => BinOp::Equal,
            TokenKind::NotEqual => BinOp::NotEqual,
            _ => return Ok(left),
        };

        self.advance();
        let right = self.equality()?;
        Ok(binary(left, op, right))
    }

    fn comparison(&mut self) -> Parse<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind() {
                TokenKind::Less => BinOp::Less,
                TokenKind::LessEqual => BinOp::LessOrEqual,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::GreaterEqual => BinOp::GreaterOrEqual,
                _ => break Ok(left),
            };

            self.advance();
            let right = self.additive()?;
            left = binary(left, op, right);
        }
    }

    fn additive(&mut self) -> Parse<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break Ok(left),
            };

            self.advance();
            let right = self.multiplicative()?;
            left = binary(left, op, right);
        }
    }

    fn multiplicative(&mut self) -> Parse<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break Ok(left),
            };

            self.advance();
            let right = self.unary()?;
            left = binary(left, op, right);
        }
    }

    fn unary(&mut self) -> Parse<Expr> {
        let op = match self.peek().kind() {
            TokenKind::Not => UnOp::Not,
            TokenKind::Minus => UnOp::Neg,
            _ => return self.primary(),
        };

        let position = self.advance().position();
        let operand = self.unary()?;

        Ok(Expr::new(ExprKind::Unary(op, Box::new(operand)), position))
    }

    fn primary(&mut self) -> Parse<Expr> {
        let position = self.peek().position();
        let kind = match (self.peek().kind(), self.peek().value()) {
            (_, Some(Literal::Int(integer))) => {
                self.advance();
                ExprKind::Int(integer)
            }

            (_, Some(Literal::Float(float))) => {
                self.advance();
                ExprKind::Float(float)
            }

            (_, Some(Literal::Bool(boolean))) => {
                self.advance();
                ExprKind::Bool(boolean)
            }

            (_, Some(Literal::Color(color))) => {
                self.advance();
                ExprKind::Color(color)
            }

            (_, Some(Literal::Builtin(builtin))) if !builtin.is_statement() => {
                self.advance();
                self.pad_builtin(builtin)?
            }

            (TokenKind::OpenParen, _) => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::CloseParen, "`)`")?;
                ExprKind::Group(Box::new(inner))
            }

            (TokenKind::OpenSquare, _) => {
                self.advance();
                let elements = self.comma_separated(TokenKind::CloseSquare)?;
                self.expect(TokenKind::CloseSquare, "`]`")?;
                ExprKind::Array(elements)
            }

            (TokenKind::Identifier, _) => match self.peek_second().kind() {
                TokenKind::OpenParen => {
                    let function = self.id()?;
                    self.advance();
                    let arguments = self.comma_separated(TokenKind::CloseParen)?;
                    self.expect(TokenKind::CloseParen, "`)`")?;
                    ExprKind::Call {
                        function,
                        arguments,
                    }
                }

                TokenKind::OpenSquare => {
                    let array = self.id()?;
                    self.advance();
                    let index = self.expr()?;
                    self.expect(TokenKind::CloseSquare, "`]`")?;
                    ExprKind::Index {
                        array,
                        index: Box::new(index),
                    }
                }

                _ => ExprKind::Variable(self.id()?.into_inner()),
            },

            _ => {
                let found = self.peek().to_string();
                return self.fail(ParserError::ExpectedExpr(found));
            }
        };

        Ok(Expr::new(kind, position))
    }

    fn pad_builtin(&mut self, builtin: Builtin) -> Parse<ExprKind> {
        let kind = match builtin {
            Builtin::Width => ExprKind::Width,
            Builtin::Height => ExprKind::Height,
            Builtin::RandomInt => ExprKind::RandomInt(Box::new(self.expr()?)),
            Builtin::Read => {
                let x = self.expr()?;
                self.comma()?;
                let y = self.expr()?;

                ExprKind::Read {
                    x: Box::new(x),
                    y: Box::new(y),
                }
            }

            _ => unreachable!("statement builtin in expression position"),
        };

        Ok(kind)
    }

    /// Lista de expresiones separadas por comas, posiblemente vacía.
    fn comma_separated(&mut self, end: TokenKind) -> Parse<Vec<Expr>> {
        let mut items = Vec::new();
        if self.check(end) {
            return Ok(items);
        }

        loop {
            items.push(self.expr()?);
            if !self.check(TokenKind::Comma) {
                break Ok(items);
            }

            self.advance();
        }
    }

    /// Descarta tokens hasta una frontera segura de sentencia.
    fn synchronize(&mut self) {
        loop {
            let starts_statement = self.peek().builtin().map_or(false, Builtin::is_statement);
            match self.peek().kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    break;
                }

                TokenKind::EndOfFile
                | TokenKind::OpenCurly
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Let
                | TokenKind::Return
                | TokenKind::Fun => break,

                TokenKind::Builtin if starts_statement => break,

                _ => {
                    self.advance();
                }
            }
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let token = self.expect(TokenKind::Identifier, "an identifier")?;
        Ok(Located::at(
            Identifier::from(token.lexeme()),
            token.position(),
        ))
    }

    fn semicolon(&mut self) -> Parse<Token> {
        self.expect(TokenKind::Semicolon, "`;`")
    }

    fn comma(&mut self) -> Parse<Token> {
        self.expect(TokenKind::Comma, "`,`")
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Parse<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let found = self.peek().to_string();
            self.fail(ParserError::UnexpectedToken { expected, found })
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind() == kind
    }

    fn peek(&self) -> &Token {
        &self.window[0]
    }

    fn peek_second(&self) -> &Token {
        &self.window[1]
    }

    /// Consume el token actual y desplaza la ventana.
    fn advance(&mut self) -> Token {
        self.consumed = self.window[0].position();

        let incoming = self.pull();
        let second = std::mem::replace(&mut self.window[1], incoming);
        std::mem::replace(&mut self.window[0], second)
    }

    /// Obtiene el siguiente token significativo del flujo.
    fn pull(&mut self) -> Token {
        for token in &mut self.tokens {
            self.last_known = token.position();
            if !token.kind().is_trivia() {
                return token;
            }
        }

        Token::eof(self.last_known)
    }

    fn fail<T>(&mut self, error: ParserError) -> Parse<T> {
        let position = self.peek().position();
        self.errors.push(Located::at(error, position));
        Err(Recovered)
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let position = left.position;
    Expr::new(
        ExprKind::Binary(Box::new(left), op, Box::new(right)),
        position,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lex::Lexer;

    fn try_parse(source: &str) -> Result<Program, Vec<Located<ParserError>>> {
        let tokens = Lexer::new(source).try_exhaustive().expect("lexical error");
        parse(tokens)
    }

    fn program(source: &str) -> Program {
        try_parse(source).expect("parse error")
    }

    fn errors(source: &str) -> Vec<Located<ParserError>> {
        try_parse(source).expect_err("expected parse errors")
    }

    fn only_expr(source: &str) -> Expr {
        let mut program = program(&format!("__print {};", source));
        match program.statements.pop().map(|stmt| stmt.kind) {
            Some(StmtKind::Print(expr)) => expr,
            _ => unreachable!(),
        }
    }

    /// Representación parentizada para comparar formas de árboles.
    fn shape(expr: &Expr) -> String {
        let inner = match &expr.kind {
            ExprKind::Int(integer) => integer.to_string(),
            ExprKind::Bool(boolean) => boolean.to_string(),
            ExprKind::Variable(id) => id.to_string(),
            ExprKind::Group(inner) => shape(inner),
            ExprKind::Binary(left, op, right) => {
                format!("({} {} {})", shape(left), op, shape(right))
            }
            ExprKind::Unary(op, operand) => format!("({} {})", op, shape(operand)),
            ExprKind::Call { function, arguments } => format!(
                "{}({})",
                function.as_ref(),
                arguments.iter().map(shape).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::Index { array, index } => format!("{}[{}]", array.as_ref(), shape(index)),
            other => format!("{:?}", other),
        };

        match &expr.cast {
            Some(cast) => format!("{} as {}", inner, cast.as_ref()),
            None => inner,
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(shape(&only_expr("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(shape(&only_expr("a or b and c")), "(a or (b and c))");
        assert_eq!(shape(&only_expr("1 - 2 - 3")), "((1 - 2) - 3)");
        assert_eq!(shape(&only_expr("1 < 2 == true")), "((1 < 2) == true)");
        assert_eq!(shape(&only_expr("not a and -b < 3")), "((not a) and ((- b) < 3))");
    }

    #[test]
    fn equality_is_right_recursive() {
        assert_eq!(shape(&only_expr("a == b != c")), "(a == (b != c))");
    }

    #[test]
    fn identifier_forms() {
        assert_eq!(shape(&only_expr("f(x, 1) + a[2]")), "(f(x, 1) + a[2])");
        assert_eq!(shape(&only_expr("g()")), "g()");
    }

    #[test]
    fn casts_attach_to_whole_expression() {
        assert_eq!(shape(&only_expr("1 + 2 as float")), "(1 + 2) as float");
        assert_eq!(shape(&only_expr("(x as int) + 1")), "(x as int + 1)");
    }

    #[test]
    fn types() {
        let program = program("let a: int[3] = [1, 2, 3]; let c: colour = #ff0000;");
        let types: Vec<_> = program
            .statements
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Declaration(declaration) => declaration.of.as_ref().to_string(),
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(types, vec!["int[3]", "colour"]);

        let errors = errors("let a: int[0] = [];");
        assert_eq!(
            errors[0].val(),
            &ParserError::BadArraySize(String::from("`0`"))
        );
    }

    #[test]
    fn statements() {
        let program = program(
            "fun max(a: int, b: int) -> int {
                 if (a > b) { return a; } else { return b; }
             }

             for (let i: int = 0; i < 10; i = i + 1) {
                 __write i, max(i, 3), #00ff00;
             }

             for (; true;) { __delay 10; }

             while (false) { __clear #000000; }
             __write_box 0, 0, __width, __height, __read 1, 2;
             { let r: int = __random_int 10; }",
        );

        let kinds: Vec<_> = program
            .statements
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Function(_) => "fun",
                StmtKind::For { init: Some(_), .. } => "for",
                StmtKind::For { init: None, update: None, .. } => "for(;;)",
                StmtKind::While { .. } => "while",
                StmtKind::WriteBox { .. } => "write_box",
                StmtKind::Block(_) => "block",
                _ => "other",
            })
            .collect();

        assert_eq!(kinds, vec!["fun", "for", "for(;;)", "while", "write_box", "block"]);
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let errors = errors(
            "let x: int = ;
             let y: int = 2;
             x = (1 + ;
             __print y;
             { let z: bool = true }",
        );

        let positions: Vec<_> = errors
            .iter()
            .map(|error| (error.position().line(), error.position().column()))
            .collect();

        // El `}` se descarta al sincronizar, por lo que el bloque queda abierto
        assert_eq!(positions, vec![(1, 14), (3, 23), (5, 35), (5, 36)]);
        assert_eq!(
            errors[0].val(),
            &ParserError::ExpectedExpr(String::from("`;`"))
        );
        assert_eq!(
            errors[2].val().to_string(),
            "expected `;`, found `}`"
        );
    }

    #[test]
    fn missing_brace_at_end_of_file() {
        let errors = errors("while (true) { __print 1;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].val().to_string(), "expected `}`, found end of file");
    }

    #[test]
    fn empty_program() {
        assert!(program("// nada\n").statements.is_empty());
    }
}
