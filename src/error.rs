//! Reporte de diagnósticos.
//!
//! Cada fase produce errores propios, tipados y con posición. Para
//! reportarlos de manera uniforme se reducen a [`Diagnostics`], que
//! conoce la fase de origen y la severidad de cada entrada.

use crate::source::{Located, Position};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn position(&self) -> Position;
}

/// Fase del compilador que originó un diagnóstico.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Lexical,
    Parsing,
    Semantic,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Phase::Lexical => "lexical",
            Phase::Parsing => "parsing",
            Phase::Semantic => "semantic",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

struct Entry {
    phase: Phase,
    severity: Severity,
    error: Box<dyn 'static + LocatedError>,
}

/// Colección ordenada de errores y advertencias.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Entry>,
}

impl Diagnostics {
    /// Asigna la fase de origen a todas las entradas.
    pub fn phase(mut self, phase: Phase) -> Self {
        for entry in &mut self.entries {
            entry.phase = phase;
        }

        self
    }

    /// Degrada todas las entradas a advertencias.
    pub fn warnings(mut self) -> Self {
        for entry in &mut self.entries {
            entry.severity = Severity::Warning;
        }

        self
    }

    /// Concatena otro conjunto de diagnósticos, preservando el orden.
    pub fn merge(mut self, other: Diagnostics) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Cantidad de entradas con severidad de error.
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == Severity::Error)
            .count()
    }

    /// Lista de líneas, una por entrada, en orden de reporte.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(Entry::to_string).collect()
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let entries = errors
            .into_iter()
            .map(|error| {
                let error: Box<dyn LocatedError> = Box::new(error);
                Entry {
                    phase: Phase::Semantic,
                    severity: Severity::Error,
                    error,
                }
            })
            .collect();

        Diagnostics { entries }
    }
}

impl Display for Entry {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{} {} at {}:: {}",
            self.phase,
            self.severity,
            self.error.position(),
            self.error.source()
        )
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(fmt, "{}", entry)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_list().entries(self.lines()).finish()
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn position(&self) -> Position {
        Located::position(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("something broke")]
    struct Broken;

    #[test]
    fn renders_phase_severity_and_position() {
        let errors = vec![Located::at(Broken, Position::new(2, 7))];
        let diagnostics = Diagnostics::from(errors).phase(Phase::Lexical);

        assert_eq!(
            diagnostics.to_string(),
            "lexical error at 2:7:: something broke\n"
        );
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn merged_warnings_keep_order() {
        let errors = Diagnostics::from(vec![Located::at(Broken, Position::new(1, 1))]);
        let warnings =
            Diagnostics::from(vec![Located::at(Broken, Position::new(5, 2))]).warnings();

        let all = errors.merge(warnings).phase(Phase::Semantic);
        assert_eq!(
            all.lines(),
            vec![
                "semantic error at 1:1:: something broke",
                "semantic warning at 5:2:: something broke",
            ]
        );
        assert_eq!(all.error_count(), 1);
    }
}
