//! Compilador de PArL a instrucciones de máquina de pila.
//!
//! # Front end
//! Cada programa deriva de un único texto fuente. Este texto se somete
//! primero a análisis léxico en [`lex`], de lo cual se obtiene un flujo
//! de tokens. El flujo de tokens se dispone en un AST por medio de
//! análisis sintáctico en [`parse`]. El árbol sintáctico es verificado
//! y anotado por análisis semántico en [`semantic`], que además
//! construye el árbol de ámbitos del programa.
//!
//! # Back end
//! La generación de código en [`codegen`] recorre el AST verificado y
//! el árbol de ámbitos para producir el programa descrito en [`ir`],
//! cuyo texto es la salida final del compilador.
//!
//! Cada fase acumula todos los errores que encuentre antes de
//! detenerse, pero una fase solo se ejecuta si la anterior terminó sin
//! errores. Todos los diagnósticos se reportan por medio de
//! [`error::Diagnostics`].

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod types;

use error::{Diagnostics, Phase};
use lex::{Lexer, Token};
use parse::ast::Program;

/// Resultado de una compilación exitosa.
#[derive(Debug)]
pub struct Compilation {
    pub program: ir::Program,

    /// Advertencias del análisis semántico, posiblemente vacías.
    pub warnings: Diagnostics,
}

/// Análisis léxico completo de un texto fuente.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostics> {
    Lexer::new(source)
        .try_exhaustive()
        .map_err(|errors| Diagnostics::from(errors).phase(Phase::Lexical))
}

/// Análisis sintáctico de un flujo de tokens.
pub fn build_ast(tokens: Vec<Token>) -> Result<Program, Diagnostics> {
    parse::parse(tokens).map_err(|errors| Diagnostics::from(errors).phase(Phase::Parsing))
}

/// Análisis semántico y generación de código.
pub fn lower(mut program: Program) -> Result<Compilation, Diagnostics> {
    match semantic::analyze(&mut program) {
        Ok(mut analysis) => {
            let warnings = Diagnostics::from(analysis.warnings).warnings();
            let program = codegen::generate(&program, &mut analysis.environment);

            Ok(Compilation {
                program,
                warnings: warnings.phase(Phase::Semantic),
            })
        }

        Err(rejected) => {
            let warnings = Diagnostics::from(rejected.warnings).warnings();
            let diagnostics = Diagnostics::from(rejected.errors).merge(warnings);

            Err(diagnostics.phase(Phase::Semantic))
        }
    }
}

/// Ejecuta la pipeline completa sobre un texto fuente.
pub fn compile(source: &str) -> Result<Compilation, Diagnostics> {
    let tokens = tokenize(source)?;
    let program = build_ast(tokens)?;
    lower(program)
}
