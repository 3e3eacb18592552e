//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, Context};
use bitflags::bitflags;
use clap::{crate_version, Arg, Command};
use parlc::{error::Diagnostics, lex, Compilation};

use std::{
    fs::{self, File},
    io::{self, Read, Write},
};

bitflags! {
    /// Volcados de depuración, emitidos a stderr.
    struct Dumps: u32 {
        const TOKENS = 0b01;
        const AST = 0b10;
    }
}

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("parlc")
        .version(crate_version!())
        .about("PArL compiler")
        .arg(
            Arg::new("input")
                .index(1)
                .value_name("INPUT")
                .help("Source file ('-' or absent for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("tokens")
                .long("tokens")
                .help("Dump the token stream to stderr"),
        )
        .arg(
            Arg::new("ast")
                .long("ast")
                .help("Dump the syntax tree to stderr"),
        )
        .get_matches();

    let mut dumps = Dumps::empty();
    if args.is_present("tokens") {
        dumps |= Dumps::TOKENS;
    }

    if args.is_present("ast") {
        dumps |= Dumps::AST;
    }

    let input = args.value_of("input").unwrap_or("-");
    let output = args.value_of("output").unwrap_or("-");

    let source = read_source(input)?;
    let compilation = compile(&source, dumps)?;

    // Las advertencias se reportan aunque la compilación sea exitosa
    eprint!("{}", compilation.warnings);

    match output {
        "-" => {
            let mut stdout = io::stdout();
            write!(stdout, "{}", compilation.program).context("Failed to write to stdout")?;
        }

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            write!(file, "{}", compilation.program)
                .with_context(|| format!("Failed to write to file: {}", path))?;
        }
    }

    Ok(())
}

fn read_source(input: &str) -> anyhow::Result<String> {
    match input {
        "-" => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read from stdin")?;

            Ok(source)
        }

        path => fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path)),
    }
}

fn compile(source: &str, dumps: Dumps) -> anyhow::Result<Compilation> {
    let tokens = parlc::tokenize(source).map_err(failed)?;
    if dumps.contains(Dumps::TOKENS) {
        lex::dump(&tokens, &mut io::stderr()).context("Failed to dump tokens")?;
    }

    let ast = parlc::build_ast(tokens).map_err(failed)?;
    if dumps.contains(Dumps::AST) {
        eprintln!("{:#?}", ast);
    }

    parlc::lower(ast).map_err(failed)
}

/// Reporta los diagnósticos y resume la falla.
fn failed(diagnostics: Diagnostics) -> anyhow::Error {
    eprint!("{}", diagnostics);
    anyhow!("Build failed with {} errors", diagnostics.error_count())
}
