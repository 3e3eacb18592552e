//! Modelo de tipos.
//!
//! El sistema de tipos es estructural: dos tipos son iguales si y solo
//! si tienen la misma forma. No existen coerciones implícitas.

use std::fmt::{self, Display};

/// Tipo primitivo escalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Base {
    Bool,
    Color,
    Float,
    Int,
}

impl Display for Base {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Base::Bool => "bool",
            Base::Color => "colour",
            Base::Float => "float",
            Base::Int => "int",
        })
    }
}

/// Un tipo del lenguaje.
///
/// Los arreglos se anidan únicamente a través del tipo de elemento. La
/// representación permite arreglos de arreglos, pero el lenguaje los
/// prohíbe; esto se verifica durante análisis semántico.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Base(Base),
    Array { size: u32, element: Box<Primitive> },
}

impl Primitive {
    pub const BOOL: Primitive = Primitive::Base(Base::Bool);
    pub const COLOR: Primitive = Primitive::Base(Base::Color);
    pub const FLOAT: Primitive = Primitive::Base(Base::Float);
    pub const INT: Primitive = Primitive::Base(Base::Int);

    /// Construye un tipo de arreglo.
    pub fn array(size: u32, element: Primitive) -> Self {
        Primitive::Array {
            size,
            element: Box::new(element),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Primitive::Array { .. })
    }

    /// Tipo de elemento, si es un arreglo.
    pub fn element(&self) -> Option<&Primitive> {
        match self {
            Primitive::Array { element, .. } => Some(element),
            Primitive::Base(_) => None,
        }
    }

    /// Cantidad de celdas de memoria que ocupa un valor de este tipo.
    pub fn slots(&self) -> u32 {
        match self {
            Primitive::Base(_) => 1,
            Primitive::Array { size, element } => size * element.slots(),
        }
    }

    /// Determina si `self as target` es una conversión válida.
    ///
    /// Entre escalares siempre lo es. Un escalar y un arreglo nunca son
    /// compatibles. Dos arreglos lo son si coinciden en tamaño en cada
    /// nivel de anidamiento.
    pub fn castable_to(&self, target: &Primitive) -> bool {
        match (self, target) {
            (Primitive::Base(_), Primitive::Base(_)) => true,
            (
                Primitive::Array { size, element },
                Primitive::Array {
                    size: target_size,
                    element: target_element,
                },
            ) => size == target_size && element.castable_to(target_element),

            _ => false,
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Base(base) => base.fmt(fmt),
            Primitive::Array { size, element } => write!(fmt, "{}[{}]", element, size),
        }
    }
}

/// Un color RGB de 24 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Interpreta un lexema de la forma `#rrggbb`.
    pub fn parse(lexeme: &str) -> Option<Self> {
        let hex = lexeme.strip_prefix('#')?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let channel = |at: usize| u8::from_str_radix(&hex[at..at + 2], 16).ok();
        Some(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl Display for Color {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn structural_equality() {
        let ints = Primitive::array(3, Primitive::INT);
        assert_eq!(ints, ints.clone());
        assert_ne!(ints, Primitive::array(3, Primitive::FLOAT));
        assert_ne!(ints, Primitive::array(4, Primitive::INT));
        assert_ne!(Primitive::INT, ints);

        for base in [Base::Bool, Base::Color, Base::Float, Base::Int] {
            assert_eq!(Primitive::Base(base), Primitive::Base(base));
        }
    }

    #[test]
    fn casts() {
        assert!(Primitive::INT.castable_to(&Primitive::COLOR));
        assert!(!Primitive::INT.castable_to(&Primitive::array(1, Primitive::INT)));
        assert!(Primitive::array(2, Primitive::INT).castable_to(&Primitive::array(2, Primitive::FLOAT)));
        assert!(!Primitive::array(2, Primitive::INT).castable_to(&Primitive::array(3, Primitive::INT)));
    }

    #[test]
    fn colors() {
        let color = Color::parse("#a1b2c3").unwrap();
        assert_eq!((color.r, color.g, color.b), (0xa1, 0xb2, 0xc3));
        assert_eq!(color.to_string(), "#a1b2c3");
        assert!(Color::parse("#zz0000").is_none());
    }

    #[test]
    fn display_and_slots() {
        let array = Primitive::array(4, Primitive::COLOR);
        assert_eq!(array.to_string(), "colour[4]");
        assert_eq!(array.slots(), 4);
        assert_eq!(Primitive::BOOL.slots(), 1);
    }
}
