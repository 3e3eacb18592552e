//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de la posición en el código fuente original
//! donde se originaron, lo cual permite señalar un punto exacto o
//! aproximado en donde ocurre un error de abstracción arbitraria.

use std::fmt::{self, Debug, Display, Formatter};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    position: Position,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la posición.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Descarta la posición y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Construye a partir de un valor y una posición.
    pub fn at(value: T, position: Position) -> Self {
        Located { value, position }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una posición línea-columna en el texto fuente.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición arbitraria.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }

    /// Posición inmediatamente posterior a un carácter.
    pub fn after(self, c: char) -> Position {
        match c {
            '\n' => self.newline(),
            '\t' => self.tab(),
            _ => self.advance(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new(1, 1)
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

impl Debug for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}
