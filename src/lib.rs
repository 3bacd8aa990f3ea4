//! Interpreter for a small Modula-2 style procedural language.
//!
//! The pipeline runs in one direction: [`lexer::tokenize`] produces tokens,
//! [`parser::parse_module`] builds a [`ast::Block`], [`analyzer::analyze`]
//! checks it, and [`interpreter::Interpreter`] walks it.

pub mod analyzer;
pub mod ast;
pub mod environment;
pub mod evaluator;
pub mod executor;
pub mod interpreter;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod types;
pub mod value;

use analyzer::SemanticError;
use ast::Block;
use environment::GlobalScope;
use interpreter::{Interpreter, RuntimeError};
use lexer::{LexError, Lexed};
use log::{debug, warn};
use parser::ParseError;
use std::io::{BufRead, Write};
use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{}", render_lex_errors(.0))]
    Lex(Vec<LexError>),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn render_lex_errors(errors: &[LexError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Knobs for one run of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Run the semantic analyzer before executing.
    pub check: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { check: true }
    }
}

/// Lexes and parses a module. Lexical errors are all reported together.
pub fn parse_source(source: &str) -> Result<Block, Error> {
    let Lexed { tokens, errors } = lexer::tokenize(source);
    if !errors.is_empty() {
        return Err(Error::Lex(errors));
    }
    debug!("lexed {} tokens", tokens.len());

    Ok(parser::parse_module(tokens)?)
}

/// Runs a whole program and hands back the final module-level bindings.
/// Terminal output and `!x` go to `out`; `?x` reads lines from `input`.
pub fn run_source(
    source: &str,
    options: &Options,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> Result<GlobalScope, Error> {
    let block = parse_source(source)?;
    if options.check {
        analyzer::analyze(&block)?;
    } else {
        warn!("semantic analysis skipped");
    }

    let mut interpreter = Interpreter::new(&block, out, input);
    interpreter.run(&block)?;
    Ok(interpreter.into_globals())
}
