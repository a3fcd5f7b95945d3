// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the term forest has been parsed without errors.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting an error-level diagnostic.
// Side effects: calls on_pass_complete after each pass for immediate display.

use std::fmt::Write;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::ast::Term;
use crate::codegen::CodegenOptions;
use crate::diag::{DiagLevel, Diagnostic};
use crate::pass::{descriptor, required_passes, PassId};
use crate::program::Program;
use crate::registry::Registry;

// ── Provenance ─────────────────────────────────────────────────────────────

/// Build fingerprint for `--emit build-info`. Two builds with equal
/// provenance generate identical code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// SHA-256 of the raw source text.
    pub source_hash: [u8; 32],
    /// SHA-256 of the keyword table (`Registry::canonical_json`).
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct ProvenanceReport {
    source_hash: String,
    registry_fingerprint: String,
    compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        hex(&self.source_hash)
    }

    pub fn registry_fingerprint_hex(&self) -> String {
        hex(&self.registry_fingerprint)
    }

    /// Pretty JSON object with hex digests, newline-terminated.
    pub fn to_json(&self) -> String {
        let report = ProvenanceReport {
            source_hash: self.source_hash_hex(),
            registry_fingerprint: self.registry_fingerprint_hex(),
            compiler_version: self.compiler_version,
        };
        serde_json::to_string_pretty(&report).unwrap_or_default() + "\n"
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

pub fn compute_provenance(source: &str, registry: &Registry) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        registry_fingerprint: sha256(registry.canonical_json().as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub forest: Vec<Term>,
    pub program: Option<Program>,
    pub generated: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(forest: Vec<Term>) -> Self {
        Self {
            forest,
            program: None,
            generated: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

/// Pipeline execution failed due to an error-level diagnostic in a pass.
/// The diagnostic is available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = diags.iter().any(|d| d.level == DiagLevel::Error);
    state.diagnostics.extend(diags);
    debug!(
        pass = descriptor(pass_id).name,
        ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Preconditions: `state.forest` holds an error-free parse.
/// Postconditions: artifacts for all passes in `required_passes(terminal)`
///   are populated, or `state.has_error` is true.
/// Failure modes: the first pass producing an error-level diagnostic.
/// Side effects: calls `on_pass_complete` after each pass.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    codegen_options: &CodegenOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let result = match pass_id {
            PassId::Bind => crate::bind::bind(&state.forest).map(|program| {
                state.program = Some(program);
            }),
            PassId::Analyze => match state.program.as_mut() {
                Some(program) => program.post(),
                None => return Err(missing_input(state, pass_id)),
            },
            PassId::Codegen => match state.program.as_ref() {
                Some(program) => {
                    state.generated = Some(program.render(codegen_options));
                    Ok(())
                }
                None => return Err(missing_input(state, pass_id)),
            },
        };
        let diags = match result {
            Ok(()) => Vec::new(),
            Err(diag) => vec![diag],
        };
        finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
    }
    Ok(())
}

fn missing_input(state: &mut CompilationState, pass_id: PassId) -> PipelineError {
    state.has_error = true;
    PipelineError {
        failing_pass: pass_id,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state_for(source: &str) -> CompilationState {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        CompilationState::new(parsed.forest)
    }

    #[test]
    fn codegen_runs_every_pass() {
        let mut state = state_for("time: wave: sine");
        let mut seen = Vec::new();
        let result = run_pipeline(&mut state, PassId::Codegen, &CodegenOptions::default(), |p, _| {
            seen.push(p)
        });
        assert!(result.is_ok());
        assert_eq!(seen, vec![PassId::Bind, PassId::Analyze, PassId::Codegen]);
        assert!(state
            .generated
            .as_deref()
            .is_some_and(|code| code.contains("export function render(index)")));
    }

    #[test]
    fn analyze_terminal_skips_codegen() {
        let mut state = state_for("wave: sine");
        let result = run_pipeline(&mut state, PassId::Analyze, &CodegenOptions::default(), |_, _| {});
        assert!(result.is_ok());
        assert!(state.program.as_ref().is_some_and(|p| p.is_posted()));
        assert!(state.generated.is_none());
    }

    #[test]
    fn bind_error_stops_the_pipeline() {
        let mut state = state_for("nosuchthing");
        let result = run_pipeline(&mut state, PassId::Codegen, &CodegenOptions::default(), |_, _| {});
        let Err(err) = result else {
            panic!("expected failure");
        };
        assert_eq!(err.failing_pass, PassId::Bind);
        assert!(state.has_error);
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(state.diagnostics[0].code.map(|c| c.0), Some("E0200"));
    }

    #[test]
    fn analysis_error_reports_analyze_pass() {
        let mut state = state_for("rgb: 1, $fff, 0");
        let result = run_pipeline(&mut state, PassId::Codegen, &CodegenOptions::default(), |_, _| {});
        assert!(matches!(result, Err(PipelineError { failing_pass: PassId::Analyze })));
    }

    #[test]
    fn provenance_hashes_source() {
        let reg = Registry::new();
        let a = compute_provenance("0.5", &reg);
        let b = compute_provenance("0.5", &reg);
        let c = compute_provenance("0.6", &reg);
        assert_eq!(a.source_hash, b.source_hash);
        assert_ne!(a.source_hash, c.source_hash);
        assert_eq!(a.registry_fingerprint, c.registry_fingerprint);
        assert_eq!(a.source_hash_hex().len(), 64);
        let json: serde_json::Value = serde_json::from_str(&a.to_json()).unwrap();
        assert_eq!(json["compiler_version"], env!("CARGO_PKG_VERSION"));
    }
}
