//! Árbol de ámbitos.
//!
//! Los ámbitos forman un árbol que refleja el anidamiento léxico del
//! programa. El árbol vive en una arena: cada ámbito se identifica por
//! un [`ScopeId`] estable y guarda el índice de su padre y de sus hijos.
//! El análisis semántico construye el árbol y la generación de código
//! lo vuelve a recorrer para asignar índices de almacenamiento y
//! tamaños de frame, sin reconstruirlo.

use std::collections::HashMap;

use crate::{parse::ast::Identifier, types::Primitive};

/// Identificador estable de un ámbito dentro de un [`Environment`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Construcción léxica que introdujo un ámbito.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    If,
    Else,
    For,
    While,
    Function,
    Block,
}

#[derive(Clone, Debug)]
pub enum Symbol {
    Variable(Variable),
    Function(Signature),
}

impl Symbol {
    /// Celdas que ocupa el símbolo en el frame de su ámbito.
    pub fn slots(&self) -> u32 {
        match self {
            Symbol::Variable(variable) => variable.ty.slots(),
            Symbol::Function(_) => 0,
        }
    }
}

/// Motivo por el cual se rechaza una declaración.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conflict {
    /// El nombre ya existe en el ámbito.
    Redeclared,

    /// El frame del ámbito excedería el máximo de celdas direccionables.
    FrameTooLarge,
}

/// Una variable o arreglo.
///
/// `storage` queda vacío durante análisis semántico; la generación de
/// código le asigna un índice definitivo al encontrar la declaración.
#[derive(Clone, Debug)]
pub struct Variable {
    pub ty: Primitive,
    pub storage: Option<u32>,
}

/// Firma de una función de usuario.
#[derive(Clone, Debug)]
pub struct Signature {
    pub parameters: Vec<Primitive>,
    pub returns: Primitive,
    pub label: Option<Identifier>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Celdas que ocupan todos los argumentos en el frame de llamada.
    ///
    /// Es `None` si el total no cabe en un frame.
    pub fn argument_slots(&self) -> Option<u32> {
        self.parameters
            .iter()
            .try_fold(0u32, |total, parameter| total.checked_add(parameter.slots()))
    }
}

#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    name: Option<Identifier>,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    symbols: HashMap<Identifier, Symbol>,
    declared_slots: u32,
    next_free: u32,
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn name(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    /// Tamaño del frame, según el último conteo.
    pub fn declared_slots(&self) -> u32 {
        self.declared_slots
    }
}

/// Arena de ámbitos con raíz en el ámbito global.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let global = Scope {
            kind: ScopeKind::Global,
            name: None,
            parent: None,
            children: Vec::new(),
            symbols: HashMap::new(),
            declared_slots: 0,
            next_free: 0,
        };

        Environment {
            scopes: vec![global],
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    /// Crea un ámbito hijo de `parent`.
    ///
    /// # Panics
    /// Si se intenta crear un ámbito de función sin nombre.
    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind, name: Option<Identifier>) -> ScopeId {
        assert!(
            kind != ScopeKind::Function || name.is_some(),
            "function scopes must be named"
        );

        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            name,
            parent: Some(parent),
            children: Vec::new(),
            symbols: HashMap::new(),
            declared_slots: 0,
            next_free: 0,
        });

        self.scopes[parent.0].children.push(id);
        id
    }

    /// Desprende un ámbito de la lista de hijos de su padre.
    pub fn detach(&mut self, id: ScopeId) {
        if let Some(parent) = self.scopes[id.0].parent {
            self.scopes[parent.0].children.retain(|&child| child != id);
        }
    }

    /// Inserta un símbolo en un ámbito.
    ///
    /// Falla si el nombre ya existe en este ámbito o si el frame del
    /// ámbito dejaría de ser direccionable.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: Identifier,
        symbol: Symbol,
    ) -> Result<(), Conflict> {
        let scope = &mut self.scopes[scope.0];
        if scope.symbols.contains_key(&name) {
            return Err(Conflict::Redeclared);
        }

        let slots = scope
            .declared_slots
            .checked_add(symbol.slots())
            .ok_or(Conflict::FrameTooLarge)?;

        scope.declared_slots = slots;
        scope.symbols.insert(name, symbol);
        Ok(())
    }

    /// Retira un símbolo de un ámbito, si existe.
    pub fn undeclare(&mut self, scope: ScopeId, name: &Identifier) {
        let scope = &mut self.scopes[scope.0];
        if let Some(symbol) = scope.symbols.remove(name) {
            scope.declared_slots -= symbol.slots();
        }
    }

    /// Ancestros de un ámbito, comenzando por sí mismo.
    pub fn ancestors(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(from), move |&id| self.scopes[id.0].parent)
    }

    /// Cadena de ámbitos visibles para variables.
    ///
    /// La búsqueda se detiene en el ámbito de función más cercano: una
    /// función no ve las variables de los ámbitos que la rodean.
    fn visible(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        let mut done = false;
        self.ancestors(from).take_while(move |&id| {
            let visible = !done;
            done = self.scopes[id.0].kind == ScopeKind::Function;
            visible
        })
    }

    /// Busca una variable visible desde `from`.
    pub fn lookup_variable(&self, from: ScopeId, name: &Identifier) -> Option<&Variable> {
        self.visible(from)
            .find_map(|id| match self.scopes[id.0].symbols.get(name) {
                Some(Symbol::Variable(variable)) => Some(variable),
                _ => None,
            })
    }

    /// Busca una función. Las funciones siempre se resuelven en el ámbito global.
    pub fn lookup_function(&self, name: &Identifier) -> Option<&Signature> {
        match self.scopes[0].symbols.get(name) {
            Some(Symbol::Function(signature)) => Some(signature),
            _ => None,
        }
    }

    /// Determina si alguna función con este nombre es visible entre
    /// `from` y el ámbito global, inclusive.
    pub fn function_in_chain(&self, from: ScopeId, name: &Identifier) -> bool {
        self.ancestors(from).any(|id| {
            matches!(
                self.scopes[id.0].symbols.get(name),
                Some(Symbol::Function(_))
            )
        })
    }

    /// Mueve los ámbitos de funciones antes que los demás hijos de `scope`.
    pub fn hoist_functions(&mut self, scope: ScopeId) {
        let children = std::mem::take(&mut self.scopes[scope.0].children);
        let (mut functions, rest): (Vec<_>, Vec<_>) = children
            .into_iter()
            .partition(|&child| self.scopes[child.0].kind == ScopeKind::Function);

        functions.extend(rest);
        self.scopes[scope.0].children = functions;
    }

    /// Asigna a cada función su etiqueta de entrada.
    pub fn label_functions(&mut self) {
        for (name, symbol) in self.scopes[0].symbols.iter_mut() {
            if let Symbol::Function(signature) = symbol {
                signature.label = Some(name.clone());
            }
        }
    }

    /// Conteo de celdas declaradas directamente en cada ámbito.
    ///
    /// No es recursivo: los hijos de un ámbito tienen su propio frame.
    ///
    /// # Panics
    /// Si algún frame excede el máximo de celdas, lo cual [`Environment::declare`]
    /// ya impide.
    pub fn count_slots(&mut self) {
        for scope in &mut self.scopes {
            scope.declared_slots = match frame_slots(scope.symbols.values()) {
                Some(slots) => slots,
                None => unreachable!("frame size was checked on declaration"),
            };

            scope.next_free = 0;
        }
    }

    /// Asigna el siguiente índice libre del frame a una variable.
    ///
    /// # Panics
    /// Si la variable no fue declarada en ese ámbito durante el análisis.
    pub fn allocate(&mut self, scope: ScopeId, name: &Identifier) -> u32 {
        let scope = &mut self.scopes[scope.0];
        let index = scope.next_free;

        match scope.symbols.get_mut(name) {
            Some(Symbol::Variable(variable)) => {
                variable.storage = Some(index);
                scope.next_free += variable.ty.slots();
                index
            }

            _ => unreachable!("allocating undeclared variable `{}`", name),
        }
    }

    /// Resuelve una variable ya asignada a un par (índice, nivel de frame).
    ///
    /// El nivel cuenta cuántos frames hay que subir desde `from` hasta el
    /// ámbito que declara la variable. Las variables que todavía no han
    /// recibido almacenamiento se ignoran, ya que su declaración aún no
    /// ha sido alcanzada en el recorrido.
    pub fn resolve(&self, from: ScopeId, name: &Identifier) -> Option<(u32, u32, &Primitive)> {
        self.visible(from)
            .enumerate()
            .find_map(|(level, id)| match self.scopes[id.0].symbols.get(name) {
                Some(Symbol::Variable(Variable {
                    ty,
                    storage: Some(index),
                })) => Some((*index, level as u32, ty)),

                _ => None,
            })
    }

    /// Frames abiertos entre `from` y el frame de llamada de la función que lo contiene.
    pub fn function_depth(&self, from: ScopeId) -> u32 {
        self.ancestors(from)
            .take_while(|&id| self.scopes[id.0].kind != ScopeKind::Function)
            .count() as u32
    }
}

fn frame_slots<'a, I>(symbols: I) -> Option<u32>
where
    I: IntoIterator<Item = &'a Symbol>,
{
    symbols
        .into_iter()
        .try_fold(0u32, |total, symbol| total.checked_add(symbol.slots()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn int(ty: Primitive) -> Symbol {
        Symbol::Variable(Variable { ty, storage: None })
    }

    fn id(name: &str) -> Identifier {
        Identifier::from(name)
    }

    #[test]
    fn names_are_unique_per_scope() {
        let mut env = Environment::new();
        let global = env.global();

        assert!(env.declare(global, id("x"), int(Primitive::INT)).is_ok());
        assert!(env.declare(global, id("x"), int(Primitive::BOOL)).is_err());

        let block = env.push(global, ScopeKind::Block, None);
        assert!(env.declare(block, id("x"), int(Primitive::BOOL)).is_ok());
        assert_eq!(env.lookup_variable(block, &id("x")).unwrap().ty, Primitive::BOOL);
    }

    #[test]
    fn lookups_stop_at_function_boundary() {
        let mut env = Environment::new();
        let global = env.global();
        env.declare(global, id("g"), int(Primitive::INT)).unwrap();

        let function = env.push(global, ScopeKind::Function, Some(id("f")));
        env.declare(function, id("p"), int(Primitive::INT)).unwrap();
        let body = env.push(function, ScopeKind::Block, None);

        assert!(env.lookup_variable(body, &id("p")).is_some());
        assert!(env.lookup_variable(body, &id("g")).is_none());
        assert!(env.lookup_variable(global, &id("g")).is_some());
        assert_eq!(env.function_depth(body), 1);
    }

    #[test]
    fn storage_and_levels() {
        let mut env = Environment::new();
        let global = env.global();
        env.declare(global, id("a"), int(Primitive::array(3, Primitive::INT))).unwrap();
        env.declare(global, id("b"), int(Primitive::INT)).unwrap();
        let inner = env.push(global, ScopeKind::While, None);
        env.declare(inner, id("b"), int(Primitive::FLOAT)).unwrap();

        env.count_slots();
        assert_eq!(env.scope(global).declared_slots(), 4);
        assert_eq!(env.scope(inner).declared_slots(), 1);

        assert_eq!(env.allocate(global, &id("a")), 0);
        assert_eq!(env.allocate(global, &id("b")), 3);

        // La `b` interna todavía no fue alcanzada
        assert_eq!(
            env.resolve(inner, &id("b")),
            Some((3, 1, &Primitive::INT))
        );

        assert_eq!(env.allocate(inner, &id("b")), 0);
        assert_eq!(
            env.resolve(inner, &id("b")),
            Some((0, 0, &Primitive::FLOAT))
        );
    }

    #[test]
    fn frames_stay_addressable() {
        let mut env = Environment::new();
        let global = env.global();
        let huge = Primitive::array(u32::MAX, Primitive::INT);

        env.declare(global, id("a"), int(huge)).unwrap();
        assert_eq!(
            env.declare(global, id("b"), int(Primitive::array(2, Primitive::INT))),
            Err(Conflict::FrameTooLarge)
        );
        assert!(env.lookup_variable(global, &id("b")).is_none());

        env.count_slots();
        assert_eq!(env.scope(global).declared_slots(), u32::MAX);
    }

    #[test]
    fn undeclared_variables_free_their_slots() {
        let mut env = Environment::new();
        let global = env.global();
        env.declare(global, id("a"), int(Primitive::INT)).unwrap();
        env.declare(global, id("b"), int(Primitive::array(5, Primitive::INT))).unwrap();

        env.undeclare(global, &id("b"));
        env.count_slots();
        assert_eq!(env.scope(global).declared_slots(), 1);
        assert!(env.lookup_variable(global, &id("b")).is_none());
    }

    #[test]
    fn hoisting_and_detaching() {
        let mut env = Environment::new();
        let global = env.global();
        let block = env.push(global, ScopeKind::Block, None);
        let function = env.push(global, ScopeKind::Function, Some(id("f")));
        let other = env.push(global, ScopeKind::If, None);

        env.hoist_functions(global);
        assert_eq!(env.scope(global).children(), &[function, block, other]);

        env.detach(block);
        assert_eq!(env.scope(global).children(), &[function, other]);
        assert_eq!(env.scope(function).name(), Some(&id("f")));
    }
}
