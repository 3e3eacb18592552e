//! Análisis semántico.
//!
//! Se ejecuta en tres pasadas sobre el AST:
//!
//! 1. Registro de las firmas de todas las funciones en el ámbito global,
//!    lo cual permite referencias adelantadas y recursión mutua.
//! 2. Resolución de ámbitos y verificación de tipos. Cada expresión
//!    queda anotada con su tipo y cada bloque con su ámbito.
//! 3. Análisis de caminos de retorno (ver [`returns`]).
//!
//! Si ninguna pasada registró errores, las funciones se trasladan al
//! inicio del programa, tanto en el AST como en el árbol de ámbitos.

use thiserror::Error;

use crate::{
    parse::ast::*,
    source::{Located, Position},
    types::Primitive,
};

mod env;
mod returns;

pub use env::{Conflict, Environment, Scope, ScopeId, ScopeKind, Signature, Symbol, Variable};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("`{0}` was not declared in this scope")]
    Undeclared(Identifier),

    #[error("`{0}` is already declared in this scope")]
    Redeclared(Identifier),

    #[error("declaring `{0}` exceeds the maximum frame size")]
    FrameTooLarge(Identifier),

    #[error("`{0}` conflicts with a function of the same name")]
    ShadowsFunction(Identifier),

    #[error("`main` is reserved for the program entry point")]
    ReservedMain,

    #[error("expected variable, found function `{0}`")]
    NotAVariable(Identifier),

    #[error("expected function, found variable `{0}`")]
    NotAFunction(Identifier),

    #[error("`{0}` is not an array")]
    NotAnArray(Identifier),

    #[error("type mismatch: left type `{left}`, right type `{right}`")]
    Mismatch { left: Primitive, right: Primitive },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    Expected {
        expected: Primitive,
        found: Primitive,
    },

    #[error("operator `{op}` cannot be applied to `{found}`")]
    BadOperand { op: String, found: Primitive },

    #[error("operator `{op}` expects operands of the same type, found `{left}` and `{right}`")]
    OperandMismatch {
        op: BinOp,
        left: Primitive,
        right: Primitive,
    },

    #[error("`{function}` takes {expected} argument(s) but {found} were supplied")]
    Arity {
        function: Identifier,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of `{function}` expects `{expected}`, found `{found}`")]
    Argument {
        function: Identifier,
        index: usize,
        expected: Primitive,
        found: Primitive,
    },

    #[error("array literals must have at least one element")]
    EmptyArray,

    #[error("array literals cannot contain arrays")]
    NestedArray,

    #[error("array literal elements must share a type: expected `{expected}`, found `{found}`")]
    HeterogeneousArray {
        expected: Primitive,
        found: Primitive,
    },

    #[error("cannot cast `{from}` as `{to}`")]
    InvalidCast { from: Primitive, to: Primitive },

    #[error("`return` outside of a function")]
    ReturnOutsideFunction,

    #[error("`{function}` returns `{expected}`, found `{found}`")]
    ReturnType {
        function: Identifier,
        expected: Primitive,
        found: Primitive,
    },

    #[error("function `{0}` must be defined at the top level")]
    NestedFunction(Identifier),

    #[error("{0}(...) does not return a value in all control paths")]
    MissingReturn(Identifier),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Warning {
    #[error("unreachable code in lines {from}-{to} has been removed")]
    Unreachable { from: u32, to: u32 },
}

/// Resultado de un análisis exitoso.
#[derive(Debug)]
pub struct Analysis {
    pub environment: Environment,
    pub warnings: Vec<Located<Warning>>,
}

/// Resultado de un análisis fallido.
#[derive(Debug)]
pub struct Rejected {
    pub errors: Vec<Located<SemanticError>>,
    pub warnings: Vec<Located<Warning>>,
}

/// Verifica y anota un programa.
///
/// El programa se modifica en sitio: se anotan tipos y ámbitos, se
/// eliminan sentencias inalcanzables y, si no hubo errores, se
/// reordenan las sentencias globales.
pub fn analyze(program: &mut Program) -> Result<Analysis, Rejected> {
    let mut environment = Environment::new();
    let mut checker = Checker {
        scope: environment.global(),
        env: &mut environment,
        function: None,
        errors: Vec::new(),
    };

    checker.register_functions(program);
    checker.statements(&mut program.statements);

    let mut errors = checker.errors;
    let warnings = returns::check(program, &mut environment, &mut errors);

    if !errors.is_empty() {
        return Err(Rejected { errors, warnings });
    }

    hoist_functions(program, &mut environment);
    Ok(Analysis {
        environment,
        warnings,
    })
}

/// Partición estable: primero funciones, luego todo lo demás.
fn hoist_functions(program: &mut Program, env: &mut Environment) {
    let (mut functions, rest): (Vec<_>, Vec<_>) = program
        .statements
        .drain(..)
        .partition(|statement| matches!(statement.kind, StmtKind::Function(_)));

    functions.extend(rest);
    program.statements = functions;

    env.hoist_functions(env.global());
}

/// Señal de que un error ya fue registrado.
struct Recovered;

type Check<T> = Result<T, Recovered>;

struct Checker<'a> {
    env: &'a mut Environment,
    scope: ScopeId,
    function: Option<(Identifier, Primitive)>,
    errors: Vec<Located<SemanticError>>,
}

impl Checker<'_> {
    fn register_functions(&mut self, program: &Program) {
        let global = self.env.global();

        for statement in &program.statements {
            let function = match &statement.kind {
                StmtKind::Function(function) => function,
                _ => continue,
            };

            let name = function.name.val();
            let position = function.name.position();

            if name.as_ref() == "main" {
                self.report(SemanticError::ReservedMain, position);
                continue;
            }

            let signature = Signature {
                parameters: function
                    .parameters
                    .iter()
                    .map(|parameter| parameter.of.val().clone())
                    .collect(),

                returns: function.returns.val().clone(),
                label: None,
            };

            if self
                .env
                .declare(global, name.clone(), Symbol::Function(signature))
                .is_err()
            {
                self.report(SemanticError::Redeclared(name.clone()), position);
            }
        }
    }

    fn statements(&mut self, statements: &mut [Stmt]) {
        for statement in statements {
            // El error ya quedó registrado, se continúa con la siguiente sentencia
            let _ = self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &mut Stmt) -> Check<()> {
        let position = statement.position;

        match &mut statement.kind {
            StmtKind::Declaration(declaration) => self.declaration(declaration),
            StmtKind::Assignment(assignment) => self.assignment(assignment),

            StmtKind::Print(value) => self.expr(value).map(drop),
            StmtKind::Delay(millis) => self.expect(millis, &Primitive::INT),

            StmtKind::Write { x, y, color } => {
                self.expect(x, &Primitive::INT)?;
                self.expect(y, &Primitive::INT)?;
                self.expect(color, &Primitive::COLOR)
            }

            StmtKind::WriteBox {
                x,
                y,
                width,
                height,
                color,
            } => {
                self.expect(x, &Primitive::INT)?;
                self.expect(y, &Primitive::INT)?;
                self.expect(width, &Primitive::INT)?;
                self.expect(height, &Primitive::INT)?;
                self.expect(color, &Primitive::COLOR)
            }

            StmtKind::Clear(color) => self.expect(color, &Primitive::COLOR),

            StmtKind::Block(block) => {
                self.scoped(block, ScopeKind::Block);
                Ok(())
            }

            StmtKind::Function(function) => self.function(function),

            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.expect(condition, &Primitive::BOOL);

                self.scoped(then, ScopeKind::If);
                if let Some(otherwise) = otherwise {
                    self.scoped(otherwise, ScopeKind::Else);
                }

                condition
            }

            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let scope = self.env.push(self.scope, ScopeKind::For, None);
                body.scope = Some(scope);

                let outer = std::mem::replace(&mut self.scope, scope);
                if let Some(init) = init {
                    let _ = self.declaration(init);
                }

                let _ = self.expect(condition, &Primitive::BOOL);
                if let Some(update) = update {
                    let _ = self.assignment(update);
                }

                self.statements(&mut body.statements);
                self.scope = outer;

                Ok(())
            }

            StmtKind::While { condition, body } => {
                let condition = self.expect(condition, &Primitive::BOOL);
                self.scoped(body, ScopeKind::While);

                condition
            }

            StmtKind::Return(value) => {
                let (function, returns) = match self.function.clone() {
                    Some(function) => function,
                    None => return self.fail(SemanticError::ReturnOutsideFunction, position),
                };

                let found = self.expr(value)?;
                if found != returns {
                    let error = SemanticError::ReturnType {
                        function,
                        expected: returns,
                        found,
                    };

                    return self.fail(error, value.position);
                }

                Ok(())
            }
        }
    }

    fn scoped(&mut self, block: &mut Block, kind: ScopeKind) {
        let scope = self.env.push(self.scope, kind, None);
        block.scope = Some(scope);

        let outer = std::mem::replace(&mut self.scope, scope);
        self.statements(&mut block.statements);
        self.scope = outer;
    }

    fn function(&mut self, function: &mut Function) -> Check<()> {
        let name = function.name.val().clone();
        if self.scope != self.env.global() {
            return self.fail(
                SemanticError::NestedFunction(name),
                function.name.position(),
            );
        }

        let scope = self
            .env
            .push(self.scope, ScopeKind::Function, Some(name.clone()));

        function.scope = Some(scope);

        let outer = std::mem::replace(&mut self.scope, scope);
        for parameter in &function.parameters {
            let _ = self.declare(&parameter.name, parameter.of.val().clone());
        }

        self.function = Some((name, function.returns.val().clone()));
        self.scoped(&mut function.body, ScopeKind::Block);
        self.function = None;

        self.scope = outer;
        Ok(())
    }

    fn declaration(&mut self, declaration: &mut Declaration) -> Check<()> {
        let value = self.expr(&mut declaration.value);

        // Se declara aun si el valor tiene errores, para no arrastrarlos
        let declared = declaration.of.val().clone();
        self.declare(&declaration.name, declared.clone())?;

        let found = value?;
        if found != declared {
            return self.fail(
                SemanticError::Mismatch {
                    left: declared,
                    right: found,
                },
                declaration.value.position,
            );
        }

        Ok(())
    }

    fn declare(&mut self, name: &Located<Identifier>, ty: Primitive) -> Check<()> {
        let position = name.position();
        let name = name.val();

        if self.env.function_in_chain(self.scope, name) {
            return self.fail(SemanticError::ShadowsFunction(name.clone()), position);
        }

        let symbol = Symbol::Variable(Variable { ty, storage: None });
        let error = match self.env.declare(self.scope, name.clone(), symbol) {
            Ok(()) => return Ok(()),
            Err(Conflict::Redeclared) => SemanticError::Redeclared(name.clone()),
            Err(Conflict::FrameTooLarge) => SemanticError::FrameTooLarge(name.clone()),
        };

        self.fail(error, position)
    }

    fn assignment(&mut self, assignment: &mut Assignment) -> Check<()> {
        let target = self.variable(&assignment.target)?;

        let expected = match &mut assignment.index {
            None => target,

            Some(index) => {
                let element = self.element(&assignment.target, &target)?;
                self.expect(index, &Primitive::INT)?;
                element
            }
        };

        let found = self.expr(&mut assignment.value)?;
        if found != expected {
            return self.fail(
                SemanticError::Mismatch {
                    left: expected,
                    right: found,
                },
                assignment.value.position,
            );
        }

        Ok(())
    }

    fn variable(&mut self, name: &Located<Identifier>) -> Check<Primitive> {
        if let Some(variable) = self.env.lookup_variable(self.scope, name.val()) {
            return Ok(variable.ty.clone());
        }

        let error = if self.env.lookup_function(name.val()).is_some() {
            SemanticError::NotAVariable(name.val().clone())
        } else {
            SemanticError::Undeclared(name.val().clone())
        };

        self.fail(error, name.position())
    }

    fn element(&mut self, name: &Located<Identifier>, ty: &Primitive) -> Check<Primitive> {
        match ty.element() {
            Some(element) => Ok(element.clone()),
            None => self.fail(
                SemanticError::NotAnArray(name.val().clone()),
                name.position(),
            ),
        }
    }

    fn expect(&mut self, expr: &mut Expr, expected: &Primitive) -> Check<()> {
        let found = self.expr(expr)?;
        if found != *expected {
            let error = SemanticError::Expected {
                expected: expected.clone(),
                found,
            };

            return self.fail(error, expr.position);
        }

        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr) -> Check<Primitive> {
        let position = expr.position;

        let ty = match &mut expr.kind {
            ExprKind::Int(_) => Primitive::INT,
            ExprKind::Float(_) => Primitive::FLOAT,
            ExprKind::Bool(_) => Primitive::BOOL,
            ExprKind::Color(_) => Primitive::COLOR,

            ExprKind::Array(elements) => self.array(elements, position)?,

            ExprKind::Width | ExprKind::Height => Primitive::INT,

            ExprKind::Read { x, y } => {
                self.expect(x, &Primitive::INT)?;
                self.expect(y, &Primitive::INT)?;
                Primitive::COLOR
            }

            ExprKind::RandomInt(max) => {
                self.expect(max, &Primitive::INT)?;
                Primitive::INT
            }

            ExprKind::Variable(name) => {
                let name = Located::at(name.clone(), position);
                self.variable(&name)?
            }

            ExprKind::Index { array, index } => {
                let ty = self.variable(array)?;
                let element = self.element(array, &ty)?;
                self.expect(index, &Primitive::INT)?;

                element
            }

            ExprKind::Call {
                function,
                arguments,
            } => self.call(function, arguments)?,

            ExprKind::Group(inner) => self.expr(inner)?,

            ExprKind::Binary(left, op, right) => self.binary(left, *op, right)?,

            ExprKind::Unary(op, operand) => {
                let found = self.expr(operand)?;
                let valid = match op {
                    UnOp::Not => found == Primitive::BOOL,
                    UnOp::Neg => !found.is_array() && found != Primitive::BOOL,
                };

                if !valid {
                    let error = SemanticError::BadOperand {
                        op: op.to_string(),
                        found,
                    };

                    return self.fail(error, position);
                }

                found
            }
        };

        let ty = match &expr.cast {
            None => ty,

            Some(cast) if ty.castable_to(cast.val()) => cast.val().clone(),

            Some(cast) => {
                let error = SemanticError::InvalidCast {
                    from: ty,
                    to: cast.val().clone(),
                };

                return self.fail(error, cast.position());
            }
        };

        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn array(&mut self, elements: &mut [Expr], position: Position) -> Check<Primitive> {
        let mut first: Option<Primitive> = None;

        for element in elements.iter_mut() {
            let found = self.expr(element)?;
            if found.is_array() {
                return self.fail(SemanticError::NestedArray, element.position);
            }

            let expected = first.get_or_insert_with(|| found.clone());
            if *expected != found {
                let error = SemanticError::HeterogeneousArray {
                    expected: expected.clone(),
                    found,
                };

                return self.fail(error, element.position);
            }
        }

        match first {
            Some(element) => Ok(Primitive::array(elements.len() as u32, element)),
            None => self.fail(SemanticError::EmptyArray, position),
        }
    }

    fn call(&mut self, function: &Located<Identifier>, arguments: &mut [Expr]) -> Check<Primitive> {
        let name = function.val();
        let signature = match self.env.lookup_function(name) {
            Some(signature) => signature.clone(),

            None => {
                let error = if self.env.lookup_variable(self.scope, name).is_some() {
                    SemanticError::NotAFunction(name.clone())
                } else {
                    SemanticError::Undeclared(name.clone())
                };

                return self.fail(error, function.position());
            }
        };

        if signature.arity() != arguments.len() {
            let error = SemanticError::Arity {
                function: name.clone(),
                expected: signature.arity(),
                found: arguments.len(),
            };

            return self.fail(error, function.position());
        }

        for (index, (argument, expected)) in arguments
            .iter_mut()
            .zip(signature.parameters.iter())
            .enumerate()
        {
            let found = self.expr(argument)?;
            if found != *expected {
                let error = SemanticError::Argument {
                    function: name.clone(),
                    index: index + 1,
                    expected: expected.clone(),
                    found,
                };

                return self.fail(error, argument.position);
            }
        }

        Ok(signature.returns)
    }

    fn binary(&mut self, left: &mut Expr, op: BinOp, right: &mut Expr) -> Check<Primitive> {
        use BinOp::*;

        // Ambos lados se verifican para reportar errores independientes
        let left_ty = self.expr(left);
        let right_ty = self.expr(right);
        let (left_ty, right_ty) = (left_ty?, right_ty?);

        let operand = |ty: &Primitive| match op {
            Or | And => *ty == Primitive::BOOL,
            Mul | Div => !ty.is_array() && *ty != Primitive::COLOR,
            _ => !ty.is_array(),
        };

        for (ty, position) in [(&left_ty, left.position), (&right_ty, right.position)] {
            if !operand(ty) {
                let error = SemanticError::BadOperand {
                    op: op.to_string(),
                    found: ty.clone(),
                };

                return self.fail(error, position);
            }
        }

        if left_ty != right_ty {
            let error = SemanticError::OperandMismatch {
                op,
                left: left_ty,
                right: right_ty,
            };

            return self.fail(error, left.position);
        }

        Ok(match op {
            Or | And | Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => {
                Primitive::BOOL
            }

            Add | Sub | Mul | Div => left_ty,
        })
    }

    fn report(&mut self, error: SemanticError, position: Position) {
        self.errors.push(Located::at(error, position));
    }

    fn fail<T>(&mut self, error: SemanticError, position: Position) -> Check<T> {
        self.report(error, position);
        Err(Recovered)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lex::Lexer, parse::parse};

    fn program(source: &str) -> Program {
        let tokens = Lexer::new(source).try_exhaustive().expect("lexical error");
        parse(tokens).expect("parse error")
    }

    fn accept(source: &str) -> (Program, Analysis) {
        let mut program = program(source);
        let analysis = analyze(&mut program).expect("semantic errors");
        (program, analysis)
    }

    fn reject(source: &str) -> Vec<String> {
        let mut program = program(source);
        analyze(&mut program)
            .expect_err("expected semantic errors")
            .errors
            .iter()
            .map(|error| error.val().to_string())
            .collect()
    }

    #[test]
    fn declaration_mismatch_names_both_types() {
        assert_eq!(
            reject("let x: int = true;"),
            vec!["type mismatch: left type `int`, right type `bool`"]
        );
    }

    #[test]
    fn expressions_are_annotated() {
        let (program, _) = accept("let x: float = (1 as float) + 2.5;");
        match &program.statements[0].kind {
            StmtKind::Declaration(declaration) => {
                assert_eq!(declaration.value.ty(), &Primitive::FLOAT)
            }

            _ => panic!("expected a declaration"),
        }
    }

    #[test]
    fn forward_and_recursive_calls() {
        accept(
            "let r: int = f(3);
             fun f(n: int) -> int { if (n < 1) { return 0; } return g(n - 1); }
             fun g(n: int) -> int { return f(n); }",
        );
    }

    #[test]
    fn main_is_reserved() {
        assert_eq!(
            reject("fun main() -> int { return 0; }"),
            vec!["`main` is reserved for the program entry point"]
        );
    }

    #[test]
    fn functions_do_not_see_globals() {
        assert_eq!(
            reject("let g: int = 1; fun f() -> int { return g; }"),
            vec!["`g` was not declared in this scope"]
        );
    }

    #[test]
    fn shadowing_and_redeclaration() {
        assert_eq!(
            reject(
                "fun f() -> int { return 1; }
                 let x: int = 1;
                 { let x: int = 2; let x: bool = true; }
                 { let f: int = 3; }"
            ),
            vec![
                "`x` is already declared in this scope",
                "`f` conflicts with a function of the same name",
            ]
        );
    }

    #[test]
    fn oversized_frames() {
        assert_eq!(
            reject("fun f(a: int[4294967295], b: int[2]) -> int { return 1; }"),
            vec!["declaring `b` exceeds the maximum frame size"]
        );
        assert_eq!(
            reject("{ let a: int[4294967295] = [1]; let b: bool = true; }").last(),
            Some(&String::from("declaring `b` exceeds the maximum frame size"))
        );
    }

    #[test]
    fn operator_rules() {
        accept("let c: colour = #000010 + #ffffff; let b: bool = true + false;");
        assert_eq!(
            reject("let c: colour = #000010 * #000002;"),
            vec!["operator `*` cannot be applied to `colour`"]
        );
        assert_eq!(
            reject("let b: bool = 1 < 2.0;"),
            vec!["operator `<` expects operands of the same type, found `int` and `float`"]
        );
        assert_eq!(
            reject("let b: bool = -true;"),
            vec!["operator `-` cannot be applied to `bool`"]
        );
    }

    #[test]
    fn arrays() {
        accept("let a: int[3] = [1, 2, 3]; a[0] = a[2] + 1; let b: float[3] = a as float[3];");
        assert_eq!(
            reject("let a: int[2] = [1, 2.0];"),
            vec!["array literal elements must share a type: expected `int`, found `float`"]
        );
        assert_eq!(
            reject("let a: int[2] = [1, 2]; let b: int[3] = a as int[3];"),
            vec!["cannot cast `int[2]` as `int[3]`"]
        );
        assert_eq!(
            reject("let x: int = 1; x[0] = 2;"),
            vec!["`x` is not an array"]
        );
    }

    #[test]
    fn builtin_signatures() {
        accept(
            "__write 1, 2, #ff0000; __write_box 0, 0, __width, __height, __read 1, 1;
             __delay __random_int 10; __clear #000000; __print [true, false];",
        );
        assert_eq!(
            reject("__write 1, 2.0, #ff0000;"),
            vec!["type mismatch: expected `int`, found `float`"]
        );
    }

    #[test]
    fn calls_are_checked() {
        assert_eq!(
            reject(
                "fun f(a: int, b: bool) -> int { return a; }
                 let x: int = f(1);
                 let y: int = f(1, 2);
                 let z: int = x(1);"
            ),
            vec![
                "`f` takes 2 argument(s) but 1 were supplied",
                "argument 2 of `f` expects `bool`, found `int`",
                "expected function, found variable `x`",
            ]
        );
    }

    #[test]
    fn misplaced_functions_and_returns() {
        assert_eq!(
            reject("return 1; { fun f() -> int { return 1; } }"),
            vec![
                "`return` outside of a function",
                "function `f` must be defined at the top level",
            ]
        );
    }

    #[test]
    fn errors_in_one_statement_do_not_stop_the_next() {
        let errors = reject("let a: int = b; let c: int = a + true; let d: bool = a;");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], "`b` was not declared in this scope");
    }

    #[test]
    fn functions_are_hoisted() {
        let (program, analysis) = accept(
            "let x: int = 1;
             { let y: int = x; }
             fun f() -> int { return 1; }",
        );

        assert!(matches!(program.statements[0].kind, StmtKind::Function(_)));

        let env = &analysis.environment;
        let kinds: Vec<_> = env
            .scope(env.global())
            .children()
            .iter()
            .map(|&child| env.scope(child).kind())
            .collect();

        assert_eq!(kinds, vec![ScopeKind::Function, ScopeKind::Block]);
    }
}
