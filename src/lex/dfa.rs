//! Autómata finito determinista para reconocimiento de lexemas.
//!
//! El autómata no opera sobre caracteres directamente, sino sobre
//! *categorías*: predicados con nombre que clasifican a un carácter.
//! Un mismo carácter puede satisfacer varias categorías a la vez (un
//! `a` es tanto letra como dígito hexadecimal), por lo cual las
//! categorías se consultan en el orden en que fueron registradas y
//! gana la primera que tenga una transición válida desde el estado
//! actual.
//!
//! El reconocimiento sigue la regla de coincidencia más larga: se
//! extiende el lexema candidato tanto como el autómata lo permita y
//! luego se retrocede hasta el último estado de aceptación visitado.

use std::{collections::HashMap, hash::Hash};

/// Un predicado de carácter con nombre.
struct Category<C> {
    name: C,
    test: fn(char) -> bool,
}

/// Tabla de transiciones y estados finales ya construida.
pub struct Dfa<S, C, K> {
    categories: Vec<Category<C>>,
    transitions: HashMap<(S, C), S>,
    initial: S,
    finals: HashMap<S, K>,
}

/// Resultado de una simulación de coincidencia más larga.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Match<K> {
    /// Un prefijo de `length` caracteres es aceptado como `kind`.
    Accepted { kind: K, length: usize },

    /// Ningún prefijo es aceptado; `length` es la corrida máxima que
    /// se intentó, siempre de al menos un carácter.
    Rejected { length: usize },
}

/// Constructor incremental de [`Dfa`].
pub struct DfaBuilder<S, C, K> {
    categories: Vec<Category<C>>,
    transitions: HashMap<(S, C), S>,
    initial: Option<S>,
    finals: HashMap<S, K>,
}

impl<S, C, K> DfaBuilder<S, C, K>
where
    S: Copy + Eq + Hash,
    C: Copy + Eq + Hash,
    K: Copy,
{
    pub fn new() -> Self {
        DfaBuilder {
            categories: Vec::new(),
            transitions: HashMap::new(),
            initial: None,
            finals: HashMap::new(),
        }
    }

    /// Registra una categoría. El orden de registro es el orden de consulta.
    pub fn category(mut self, name: C, test: fn(char) -> bool) -> Self {
        self.categories.push(Category { name, test });
        self
    }

    /// Agrega una transición `from --category--> to`.
    pub fn transition(mut self, from: S, category: C, to: S) -> Self {
        self.transitions.insert((from, category), to);
        self
    }

    /// Agrega la misma transición para varias categorías.
    pub fn transitions(mut self, from: S, categories: &[C], to: S) -> Self {
        for &category in categories {
            self.transitions.insert((from, category), to);
        }

        self
    }

    pub fn initial(mut self, state: S) -> Self {
        self.initial = Some(state);
        self
    }

    /// Marca un estado como final, asociado a un tipo de token.
    pub fn accept(mut self, state: S, kind: K) -> Self {
        self.finals.insert(state, kind);
        self
    }

    /// Finaliza la construcción.
    ///
    /// # Panics
    /// Si nunca se definió un estado inicial.
    pub fn build(self) -> Dfa<S, C, K> {
        Dfa {
            categories: self.categories,
            transitions: self.transitions,
            initial: self.initial.expect("DFA without an initial state"),
            finals: self.finals,
        }
    }
}

impl<S, C, K> Default for DfaBuilder<S, C, K>
where
    S: Copy + Eq + Hash,
    C: Copy + Eq + Hash,
    K: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C, K> Dfa<S, C, K>
where
    S: Copy + Eq + Hash,
    C: Copy + Eq + Hash,
    K: Copy,
{
    /// Categorías que satisface un carácter, en orden de registro.
    pub fn categorize(&self, c: char) -> Vec<C> {
        self.categories
            .iter()
            .filter(|category| (category.test)(c))
            .map(|category| category.name)
            .collect()
    }

    /// Primera transición válida desde `state` para alguna de las categorías.
    pub fn transition(&self, state: S, categories: &[C]) -> Option<S> {
        categories
            .iter()
            .find_map(|&category| self.transitions.get(&(state, category)).copied())
    }

    /// Tipo de token asociado a un estado, si este es final.
    pub fn accepts(&self, state: S) -> Option<K> {
        self.finals.get(&state).copied()
    }

    /// Simula el autómata sobre un prefijo de `input`.
    ///
    /// `input` no debe estar vacío.
    pub fn longest_match(&self, input: &[char]) -> Match<K> {
        let mut state = self.initial;
        let mut consumed = 0;
        let mut history: Vec<(S, usize)> = Vec::new();

        loop {
            // Un estado final invalida todo candidato anterior
            if self.accepts(state).is_some() {
                history.clear();
            }

            history.push((state, consumed));

            let next = match input.get(consumed) {
                Some(&c) => self.transition(state, &self.categorize(c)),
                None => None,
            };

            match next {
                Some(next) => {
                    state = next;
                    consumed += 1;
                }

                None => break,
            }
        }

        while let Some((state, length)) = history.pop() {
            if let Some(kind) = self.accepts(state) {
                return Match::Accepted { kind, length };
            }
        }

        Match::Rejected {
            length: consumed.max(1),
        }
    }
}
