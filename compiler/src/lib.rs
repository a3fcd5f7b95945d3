// beacon — pattern compiler for Pixelblaze LED controllers
//
// Library root. `compile` runs the whole pipeline; the phase modules are
// public for the CLI's intermediate dumps and for tests.

pub mod analyze;
pub mod ast;
pub mod bind;
pub mod codegen;
pub mod diag;
pub mod dot;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod program;
pub mod pulser;
pub mod registry;
pub mod stanza;

use thiserror::Error;

use crate::codegen::CodegenOptions;
use crate::diag::Diagnostic;
use crate::program::Program;

/// A failed compilation. Nothing is generated on failure.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse failed with {} error(s)", .0.len())]
    Parse(Vec<Diagnostic>),
    #[error("{0}")]
    Bind(Diagnostic),
    #[error("{0}")]
    Analyze(Diagnostic),
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Parse(diags) => diags,
            CompileError::Bind(diag) | CompileError::Analyze(diag) => std::slice::from_ref(diag),
        }
    }
}

/// Parse, bind and analyze `source`.
pub fn build(source: &str) -> Result<Program, CompileError> {
    let parsed = parser::parse(source);
    if !parsed.is_ok() {
        return Err(CompileError::Parse(parsed.errors));
    }
    let mut program = bind::bind(&parsed.forest).map_err(CompileError::Bind)?;
    program.post().map_err(CompileError::Analyze)?;
    Ok(program)
}

/// Compile `source` to Pixelblaze code.
pub fn compile(source: &str, opts: &CodegenOptions) -> Result<String, CompileError> {
    Ok(build(source)?.render(opts))
}
