//! Análisis de caminos de retorno.
//!
//! Una sentencia retorna incondicionalmente si es un `return`, un
//! bloque cuya secuencia retorna, o un `if` con `else` en el cual ambas
//! ramas retornan. Los ciclos nunca cuentan, ya que su cuerpo puede no
//! ejecutarse.
//!
//! Todo lo que sigue a la primera sentencia que retorna en una secuencia
//! es inalcanzable. Esas sentencias se reportan como una única
//! advertencia y se eliminan del AST; sus ámbitos se desprenden del
//! árbol y sus declaraciones se retiran del ámbito que las contiene,
//! de forma que la generación de código no las visite ni les reserve
//! espacio.

use crate::{parse::ast::*, source::Located};

use super::{Environment, ScopeId, SemanticError, Warning};

pub(super) fn check(
    program: &mut Program,
    env: &mut Environment,
    errors: &mut Vec<Located<SemanticError>>,
) -> Vec<Located<Warning>> {
    let mut pass = ReturnPaths {
        env,
        errors,
        warnings: Vec::new(),
    };

    let global = pass.env.global();
    pass.sequence(&mut program.statements, Some(global));
    pass.warnings
}

struct ReturnPaths<'a> {
    env: &'a mut Environment,
    errors: &'a mut Vec<Located<SemanticError>>,
    warnings: Vec<Located<Warning>>,
}

impl ReturnPaths<'_> {
    /// Determina si una secuencia retorna, podando lo inalcanzable.
    ///
    /// `scope` es el ámbito donde la secuencia declara sus variables.
    fn sequence(&mut self, statements: &mut Vec<Stmt>, scope: Option<ScopeId>) -> bool {
        let returning = statements
            .iter_mut()
            .position(|statement| self.statement(statement));

        let cut = match returning {
            Some(index) => index + 1,
            None => return false,
        };

        if cut < statements.len() {
            let unreachable = statements.split_off(cut);

            let from = unreachable[0].position;
            let to = unreachable[unreachable.len() - 1].end.line();
            let warning = Warning::Unreachable {
                from: from.line(),
                to,
            };

            self.warnings.push(Located::at(warning, from));
            for statement in &unreachable {
                self.detach(statement, scope);
            }
        }

        true
    }

    fn statement(&mut self, statement: &mut Stmt) -> bool {
        match &mut statement.kind {
            StmtKind::Return(_) => true,
            StmtKind::Block(block) => self.sequence(&mut block.statements, block.scope),

            StmtKind::If {
                then, otherwise, ..
            } => {
                let then = self.sequence(&mut then.statements, then.scope);
                let otherwise = match otherwise {
                    Some(otherwise) => self.sequence(&mut otherwise.statements, otherwise.scope),
                    None => false,
                };

                then && otherwise
            }

            StmtKind::For { body, .. } | StmtKind::While { body, .. } => {
                self.sequence(&mut body.statements, body.scope);
                false
            }

            StmtKind::Function(function) => {
                let body = &mut function.body;
                if !self.sequence(&mut body.statements, body.scope) {
                    let name = function.name.val().clone();
                    let error = SemanticError::MissingReturn(name);

                    self.errors.push(Located::at(error, function.name.position()));
                }

                false
            }

            _ => false,
        }
    }

    fn detach(&mut self, statement: &Stmt, enclosing: Option<ScopeId>) {
        let scopes = match &statement.kind {
            StmtKind::Declaration(declaration) => {
                if let Some(enclosing) = enclosing {
                    self.env.undeclare(enclosing, declaration.name.val());
                }

                return;
            }

            StmtKind::Block(block) => vec![block.scope],
            StmtKind::If {
                then, otherwise, ..
            } => vec![then.scope, otherwise.as_ref().and_then(|block| block.scope)],

            StmtKind::For { body, .. } | StmtKind::While { body, .. } => vec![body.scope],
            StmtKind::Function(function) => vec![function.scope],

            _ => return,
        };

        for scope in scopes.into_iter().flatten() {
            self.env.detach(scope);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        lex::Lexer,
        parse::{ast::*, parse},
        semantic::{analyze, Warning},
    };

    fn program(source: &str) -> Program {
        let tokens = Lexer::new(source).try_exhaustive().expect("lexical error");
        parse(tokens).expect("parse error")
    }

    fn body(program: &Program) -> &[Stmt] {
        match &program.statements[0].kind {
            StmtKind::Function(function) => &function.body.statements,
            _ => panic!("expected a function"),
        }
    }

    #[test]
    fn missing_return_names_the_function() {
        let mut program = program("fun f() -> int { }");
        let rejected = analyze(&mut program).expect_err("expected semantic errors");

        assert_eq!(
            rejected.errors[0].val().to_string(),
            "f(...) does not return a value in all control paths"
        );
    }

    #[test]
    fn loops_never_return_unconditionally() {
        let mut program = program(
            "fun f() -> int { while (true) { return 1; } }
             fun g() -> int { if (true) { return 1; } }",
        );

        let rejected = analyze(&mut program).expect_err("expected semantic errors");
        assert_eq!(rejected.errors.len(), 2);
    }

    #[test]
    fn both_branches_return() {
        let mut program = program(
            "fun f(x: int) -> int {
                 if (x < 0) { return 0; } else { return x; }
             }",
        );

        let analysis = analyze(&mut program).expect("semantic errors");
        assert!(analysis.warnings.is_empty());
    }

    #[test]
    fn unreachable_statements_are_removed() {
        let mut program = program(
            "fun f() -> int {
                 let x: int = 1;
                 return x;
                 __print x;
                 { __print 2; }
             }",
        );

        let analysis = analyze(&mut program).expect("semantic errors");

        assert_eq!(analysis.warnings.len(), 1);
        assert_eq!(
            analysis.warnings[0].val(),
            &Warning::Unreachable { from: 4, to: 5 }
        );
        assert_eq!(analysis.warnings[0].position().line(), 4);
        assert_eq!(body(&program).len(), 2);

        // El bloque eliminado ya no cuelga del ámbito del cuerpo
        let env = &analysis.environment;
        let function = env.scope(env.global()).children()[0];
        let body_scope = env.scope(function).children()[0];
        assert!(env.scope(body_scope).children().is_empty());
    }

    #[test]
    fn warning_spans_to_the_last_removed_line() {
        let mut program = program(
            "fun f() -> int {
                 return 1;
                 {
                     __print 2;
                 }
             }",
        );

        let analysis = analyze(&mut program).expect("semantic errors");
        assert_eq!(
            analysis.warnings[0].val(),
            &Warning::Unreachable { from: 3, to: 5 }
        );
    }

    #[test]
    fn removed_declarations_leave_their_scope() {
        let mut program = program(
            "fun f() -> int {
                 let x: int = 1;
                 return x;
                 let y: int[5] = [1, 2, 3, 4, 5];
             }",
        );

        let analysis = analyze(&mut program).expect("semantic errors");
        let env = &analysis.environment;
        let function = env.scope(env.global()).children()[0];
        let body_scope = env.scope(function).children()[0];

        assert!(env.lookup_variable(body_scope, &Identifier::from("y")).is_none());
        assert_eq!(env.scope(body_scope).declared_slots(), 1);
    }

    #[test]
    fn nested_returns_prune_inner_sequences() {
        let mut program = program(
            "fun f() -> int {
                 if (true) { return 1; __print 1; } else { return 2; }
             }",
        );

        let analysis = analyze(&mut program).expect("semantic errors");
        assert_eq!(
            analysis.warnings[0].val(),
            &Warning::Unreachable { from: 2, to: 2 }
        );
    }
}
