//! Generación de código para la máquina de pila.
//!
//! El generador recorre el AST ya verificado y, en paralelo, el árbol de
//! ámbitos que construyó el análisis semántico. Cada ámbito es un frame
//! en tiempo de ejecución: se abre con `push N; oframe` al entrar y se
//! cierra con `cframe` al salir, donde `N` es la cantidad de celdas
//! declaradas directamente en ese ámbito.
//!
//! Los saltos hacia adelante se resuelven en dos pasos: se emite un
//! `push #PC+0` provisional, se genera el código que se desea saltar y
//! finalmente se corrige el desplazamiento.

use crate::{
    ir::{self, Instruction, Operand, Slot},
    parse::ast::*,
    semantic::{Environment, ScopeId},
    types::Primitive,
};

mod expr;

/// Genera el programa final.
///
/// Las funciones se emiten primero, cada una bajo su etiqueta, seguidas
/// por el punto de entrada `.main` con el resto de sentencias globales.
pub fn generate(program: &Program, env: &mut Environment) -> ir::Program {
    env.count_slots();
    env.label_functions();

    let global = env.global();
    let mut generator = Generator {
        env,
        scope: global,
        code: Vec::new(),
    };

    let (functions, statements): (Vec<_>, Vec<_>) = program
        .statements
        .iter()
        .partition(|statement| matches!(statement.kind, StmtKind::Function(_)));

    for function in functions {
        generator.statement(function);
    }

    generator.entry_point(&statements);
    ir::Program(generator.code)
}

struct Generator<'a> {
    env: &'a mut Environment,
    scope: ScopeId,
    code: Vec<Instruction>,
}

impl Generator<'_> {
    fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn entry_point(&mut self, statements: &[&Stmt]) {
        emit!(self, Label(Identifier::from("main")));
        self.open(self.env.global());

        for statement in statements {
            self.statement(statement);
        }

        emit!(self, Cframe, Halt);
    }

    fn open(&mut self, scope: ScopeId) {
        let size = self.env.scope(scope).declared_slots();
        emit!(self, Push(Operand::Int(size as i64)), Oframe);
    }

    fn statement(&mut self, statement: &Stmt) {
        match &statement.kind {
            StmtKind::Declaration(declaration) => self.declaration(declaration),
            StmtKind::Assignment(assignment) => self.assignment(assignment),

            StmtKind::Print(value) => {
                self.expr(value);
                match value.ty() {
                    Primitive::Array { size, .. } => {
                        emit!(self, Push(Operand::Int(*size as i64)), Printa)
                    }

                    Primitive::Base(_) => emit!(self, Print),
                }
            }

            StmtKind::Delay(millis) => {
                self.expr(millis);
                emit!(self, Delay);
            }

            StmtKind::Write { x, y, color } => {
                self.exprs([color, y, x]);
                emit!(self, Write);
            }

            StmtKind::WriteBox {
                x,
                y,
                width,
                height,
                color,
            } => {
                self.exprs([color, height, width, y, x]);
                emit!(self, WriteBox);
            }

            StmtKind::Clear(color) => {
                self.expr(color);
                emit!(self, Clear);
            }

            StmtKind::Block(block) => self.block(block),
            StmtKind::Function(function) => self.function(function),

            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                let skip_then = self.branch_unless(condition);
                self.block(then);

                match otherwise {
                    None => self.patch(skip_then),

                    Some(otherwise) => {
                        let skip_else = self.placeholder();
                        emit!(self, Jmp);

                        self.patch(skip_then);
                        self.block(otherwise);
                        self.patch(skip_else);
                    }
                }
            }

            StmtKind::While { condition, body } => {
                let start = self.code.len();
                let exit = self.branch_unless(condition);

                self.block(body);
                self.jump_back(start);
                self.patch(exit);
            }

            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                // Inicialización y cuerpo comparten un único frame
                let scope = scope_of(body.scope);
                let outer = std::mem::replace(&mut self.scope, scope);
                self.open(scope);

                if let Some(init) = init {
                    self.declaration(init);
                }

                let start = self.code.len();
                let exit = self.branch_unless(condition);

                for statement in &body.statements {
                    self.statement(statement);
                }

                if let Some(update) = update {
                    self.assignment(update);
                }

                self.jump_back(start);
                self.patch(exit);

                emit!(self, Cframe);
                self.scope = outer;
            }

            StmtKind::Return(value) => {
                self.expr(value);
                for _ in 0..self.env.function_depth(self.scope) {
                    emit!(self, Cframe);
                }

                emit!(self, Ret);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        let scope = scope_of(block.scope);
        let outer = std::mem::replace(&mut self.scope, scope);
        self.open(scope);

        for statement in &block.statements {
            self.statement(statement);
        }

        emit!(self, Cframe);
        self.scope = outer;
    }

    fn function(&mut self, function: &Function) {
        let scope = scope_of(function.scope);
        let outer = std::mem::replace(&mut self.scope, scope);

        let label = match self.env.scope(scope).name() {
            Some(name) => name.clone(),
            None => unreachable!("function scope without a name"),
        };

        // El frame de parámetros lo abre `call` en el sitio de llamada
        emit!(self, Label(label));
        for parameter in &function.parameters {
            self.env.allocate(scope, parameter.name.val());
        }

        self.block(&function.body);
        self.scope = outer;
    }

    fn declaration(&mut self, declaration: &Declaration) {
        self.expr(&declaration.value);

        let index = self.env.allocate(self.scope, declaration.name.val());
        self.store(declaration.of.val(), Slot { index, level: 0 });
    }

    fn assignment(&mut self, assignment: &Assignment) {
        let (slot, ty) = self.resolve(assignment.target.val());
        self.expr(&assignment.value);

        match &assignment.index {
            None => self.store(&ty, slot),

            Some(index) => {
                self.expr(index);
                emit!(
                    self,
                    Push(Operand::Int(slot.index as i64)),
                    Add,
                    Push(Operand::Int(slot.level as i64)),
                    St
                );
            }
        }
    }

    /// Almacena el valor en el tope de la pila.
    fn store(&mut self, ty: &Primitive, slot: Slot) {
        if let Primitive::Array { size, .. } = ty {
            emit!(self, Push(Operand::Int(*size as i64)));
        }

        emit!(
            self,
            Push(Operand::Int(slot.index as i64)),
            Push(Operand::Int(slot.level as i64))
        );

        if ty.is_array() {
            emit!(self, Sta);
        } else {
            emit!(self, St);
        }
    }

    fn resolve(&self, name: &Identifier) -> (Slot, Primitive) {
        match self.env.resolve(self.scope, name) {
            Some((index, level, ty)) => (Slot { index, level }, ty.clone()),
            None => unreachable!("unresolved variable `{}`", name),
        }
    }

    /// Evalúa una condición y salta si es falsa. Retorna el salto a corregir.
    fn branch_unless(&mut self, condition: &Expr) -> usize {
        self.expr(condition);
        emit!(self, Not);

        let placeholder = self.placeholder();
        emit!(self, Cjmp);

        placeholder
    }

    fn placeholder(&mut self) -> usize {
        let at = self.code.len();
        emit!(self, Push(Operand::Pc(0)));
        at
    }

    /// Corrige un salto provisional para que apunte a la siguiente instrucción.
    fn patch(&mut self, at: usize) {
        let offset = (self.code.len() - at) as i64;
        self.code[at] = Instruction::Push(Operand::Pc(offset));
    }

    fn jump_back(&mut self, to: usize) {
        let offset = to as i64 - self.code.len() as i64;
        emit!(self, Push(Operand::Pc(offset)), Jmp);
    }
}

/// # Panics
/// Si el análisis semántico no asignó un ámbito al bloque.
fn scope_of(scope: Option<ScopeId>) -> ScopeId {
    scope.expect("block was not analyzed")
}

#[cfg(test)]
mod test {
    use crate::{lex::Lexer, parse::parse, semantic::analyze};

    fn lines(source: &str) -> Vec<String> {
        let tokens = Lexer::new(source).try_exhaustive().expect("lexical error");
        let mut program = parse(tokens).expect("parse error");
        let mut analysis = analyze(&mut program).expect("semantic errors");

        super::generate(&program, &mut analysis.environment)
            .instructions()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn declarations_and_prints() {
        assert_eq!(
            lines("let x: int = 1 + 2; __print x;"),
            vec![
                ".main", "push 1", "oframe", "push 2", "push 1", "add", "push 0", "push 0", "st",
                "push [0:0]", "print", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn if_else_is_back_patched() {
        assert_eq!(
            lines("if (true) { __print 1; } else { __print 2; }"),
            vec![
                ".main", "push 0", "oframe", "push 1", "not", "push #PC+9", "cjmp", "push 0",
                "oframe", "push 1", "print", "cframe", "push #PC+7", "jmp", "push 0", "oframe",
                "push 2", "print", "cframe", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn returns_unwind_nested_frames() {
        assert_eq!(
            lines("fun f(a: int) -> int { while (true) { return a; } return 0; }"),
            vec![
                ".f", "push 0", "oframe", "push 1", "not", "push #PC+11", "cjmp", "push 0",
                "oframe", "push [0:2]", "cframe", "cframe", "ret", "cframe", "push #PC-11",
                "jmp", "push 0", "cframe", "ret", "cframe", ".main", "push 0", "oframe",
                "cframe", "halt",
            ]
        );
    }

    #[test]
    fn removed_declarations_take_no_storage() {
        assert_eq!(
            lines("fun f() -> int { return 1; let y: int[5] = [1, 2, 3, 4, 5]; }"),
            vec![
                ".f", "push 0", "oframe", "push 1", "cframe", "ret", "cframe", ".main", "push 0",
                "oframe", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn arrays_are_copied_by_value() {
        assert_eq!(
            lines("let a: int[2] = [1, 2]; let b: int[2] = a;"),
            vec![
                ".main", "push 4", "oframe", "push 2", "push 1", "push 2", "push 0", "push 0",
                "sta", "push 2", "oframe", "push 2", "push +[0:1]", "push 2", "push 0",
                "push 0", "sta", "push 2", "push +[0:0]", "cframe", "push 2", "push 2",
                "push 0", "sta", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn calls_push_arguments_in_reverse() {
        assert_eq!(
            lines("fun f(a: int, b: int[2]) -> int { return a; } let x: int = f(1, [2, 3]);"),
            vec![
                ".f", "push 0", "oframe", "push [0:1]", "cframe", "ret", "cframe", ".main",
                "push 1", "oframe", "push 3", "push 2", "push 1", "push 3", "push .f", "call",
                "push 0", "push 0", "st", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn for_loops_share_one_frame() {
        assert_eq!(
            lines("for (let i: int = 0; i < 2; i = i + 1) { __delay i; }"),
            vec![
                ".main", "push 0", "oframe", "push 1", "oframe", "push 0", "push 0", "push 0",
                "st", "push 2", "push [0:0]", "lt", "not", "push #PC+12", "cjmp", "push [0:0]",
                "delay", "push 1", "push [0:0]", "add", "push 0", "push 0", "st",
                "push #PC-14", "jmp", "cframe", "cframe", "halt",
            ]
        );
    }

    #[test]
    fn indexed_access() {
        assert_eq!(
            lines("let a: int[3] = [1, 2, 3]; a[1] = a[2];"),
            vec![
                ".main", "push 3", "oframe", "push 3", "push 2", "push 1", "push 3", "push 0",
                "push 0", "sta", "push 2", "pusha [0:0]", "push 1", "push 0", "add", "push 0",
                "st", "cframe", "halt",
            ]
        );
    }
}
