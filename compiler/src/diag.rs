// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used by every Beacon compiler phase,
// plus the catalogue of stable diagnostic codes.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `E0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code keeps its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable diagnostic codes, grouped by phase.
///
/// `E00xx` lexical, `E01xx` layout and syntax, `E02xx` binding,
/// `E03xx` dimension, `E04xx` program structure.
pub mod codes {
    use super::DiagCode;

    pub const E0001: DiagCode = DiagCode("E0001"); // invalid character
    pub const E0002: DiagCode = DiagCode("E0002"); // color literal length

    pub const E0100: DiagCode = DiagCode("E0100"); // syntax error
    pub const E0101: DiagCode = DiagCode("E0101"); // indent mismatch
    pub const E0102: DiagCode = DiagCode("E0102"); // args on a non-symbol term
    pub const E0103: DiagCode = DiagCode("E0103"); // indenting on nothing

    pub const E0200: DiagCode = DiagCode("E0200"); // unknown keyword
    pub const E0201: DiagCode = DiagCode("E0201"); // duplicate definition
    pub const E0202: DiagCode = DiagCode("E0202"); // wrong token type for slot
    pub const E0203: DiagCode = DiagCode("E0203"); // named reference with args
    pub const E0204: DiagCode = DiagCode("E0204"); // too many arguments
    pub const E0205: DiagCode = DiagCode("E0205"); // duplicate argument
    pub const E0206: DiagCode = DiagCode("E0206"); // unknown argument name
    pub const E0207: DiagCode = DiagCode("E0207"); // structural misuse
    pub const E0208: DiagCode = DiagCode("E0208"); // missing required argument
    pub const E0209: DiagCode = DiagCode("E0209"); // gradient shape

    pub const E0300: DiagCode = DiagCode("E0300"); // dimension mismatch

    pub const E0400: DiagCode = DiagCode("E0400"); // no root
    pub const E0401: DiagCode = DiagCode("E0401"); // multiple roots
    pub const E0402: DiagCode = DiagCode("E0402"); // space-dependent instance arg
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    /// Shorthand for an error carrying a stable code.
    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with 1-based line numbers resolved against `source`.
    pub fn render(&self, source: &str) -> String {
        let mut out = self.headline();
        out.push_str(&format!("\n  --> line {}", line_of(source, self.span.start)));
        for related in &self.related_spans {
            out.push_str(&format!(
                "\n  note: {} (line {})",
                related.label,
                line_of(source, related.span.start)
            ));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n  hint: {}", hint));
        }
        out
    }

    fn headline(&self) -> String {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        match &self.code {
            Some(code) => format!("{}[{}]: {}", level, code, self.message),
            None => format!("{}: {}", level, self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headline())?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// 1-based line number containing byte `offset`.
pub fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        (start..end).into()
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, span(0, 1), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::error(codes::E0200, span(0, 1), "unknown term: wavy");
        assert_eq!(format!("{d}"), "error[E0200]: unknown term: wavy");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(codes::E0201, span(4, 8), "duplicate def: glow")
            .with_hint("definition names are case-insensitive")
            .with_related(span(0, 4), "first defined here");

        assert_eq!(d.code, Some(codes::E0201));
        assert_eq!(
            d.hint.as_deref(),
            Some("definition names are case-insensitive")
        );
        assert_eq!(d.related_spans.len(), 1);
        assert!(d.is_error());
    }

    #[test]
    fn render_reports_line_numbers() {
        let source = "a = 1\nb = 2\nwave: sine\n";
        let d = Diagnostic::error(codes::E0300, span(12, 16), "dimension mismatch");
        let text = d.render(source);
        assert!(text.starts_with("error[E0300]: dimension mismatch"));
        assert!(text.contains("--> line 3"), "got: {text}");
    }

    #[test]
    fn line_of_clamps_past_end() {
        assert_eq!(line_of("x\ny", 100), 2);
        assert_eq!(line_of("", 0), 1);
    }
}
