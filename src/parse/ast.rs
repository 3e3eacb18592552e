//! Árbol sintáctico abstracto.
//!
//! Cada nodo es dueño exclusivo de sus hijos. Todo nodo lleva la posición
//! donde inicia; las sentencias llevan además la de su último token.
//! Las expresiones llevan una anotación opcional de conversión (`as T`)
//! y el tipo que les asigna el análisis semántico.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::{
    semantic::ScopeId,
    source::{Located, Position},
    types::{Color, Primitive},
};

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Stmt {
    pub position: Position,
    pub end: Position,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    Assignment(Assignment),
    Declaration(Declaration),
    Print(Expr),
    Delay(Expr),
    Write {
        x: Expr,
        y: Expr,
        color: Expr,
    },
    WriteBox {
        x: Expr,
        y: Expr,
        width: Expr,
        height: Expr,
        color: Expr,
    },
    Clear(Expr),
    Block(Block),
    Function(Function),
    If {
        condition: Expr,
        then: Block,
        otherwise: Option<Block>,
    },
    For {
        init: Option<Declaration>,
        condition: Expr,
        update: Option<Assignment>,
        body: Block,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Return(Expr),
}

/// Secuencia de sentencias con ámbito propio.
///
/// `scope` lo asigna el análisis semántico y lo consume la generación
/// de código para ubicar el ámbito correspondiente.
#[derive(Debug)]
pub struct Block {
    pub position: Position,
    pub statements: Vec<Stmt>,
    pub scope: Option<ScopeId>,
}

#[derive(Debug)]
pub struct Assignment {
    pub target: Located<Identifier>,
    pub index: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug)]
pub struct Declaration {
    pub name: Located<Identifier>,
    pub of: Located<Primitive>,
    pub value: Expr,
}

#[derive(Debug)]
pub struct Parameter {
    pub name: Located<Identifier>,
    pub of: Located<Primitive>,
}

#[derive(Debug)]
pub struct Function {
    pub name: Located<Identifier>,
    pub parameters: Vec<Parameter>,
    pub returns: Located<Primitive>,
    pub body: Block,
    pub scope: Option<ScopeId>,
}

#[derive(Debug)]
pub struct Expr {
    pub position: Position,
    pub kind: ExprKind,
    pub cast: Option<Located<Primitive>>,
    pub ty: Option<Primitive>,
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Expr {
            position,
            kind,
            cast: None,
            ty: None,
        }
    }

    /// Tipo inferido durante análisis semántico.
    ///
    /// # Panics
    /// Si el análisis semántico no ha anotado esta expresión. La
    /// generación de código solo opera sobre árboles ya verificados.
    pub fn ty(&self) -> &Primitive {
        self.ty
            .as_ref()
            .expect("expression was not annotated by semantic analysis")
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Color(Color),
    Array(Vec<Expr>),
    Width,
    Height,
    Read {
        x: Box<Expr>,
        y: Box<Expr>,
    },
    RandomInt(Box<Expr>),
    Variable(Identifier),
    Index {
        array: Located<Identifier>,
        index: Box<Expr>,
    },
    Call {
        function: Located<Identifier>,
        arguments: Vec<Expr>,
    },
    Group(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Unary(UnOp, Box<Expr>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Sub,
    Mul,
    Div,
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        fmt.write_str(match self {
            Or => "or",
            And => "and",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

impl Display for UnOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            UnOp::Not => "not",
            UnOp::Neg => "-",
        })
    }
}
