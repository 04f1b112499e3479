//! Error taxonomy for the optimizer pipeline.
//!
//! Two classes are kept strictly apart:
//! - **Semantic errors**: user-facing problems found by the type-check walk
//!   after the graph reaches its fixpoint (null access, final-field writes,
//!   type mismatches). Each carries the span of the node that reported it.
//! - **Internal errors**: optimizer bugs such as a non-monotone type, an
//!   unready node picked by the scheduler, or a worklist that never drains.
//!   These are "internal compiler errors" and never caused by user input.

use crate::span::Span;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Exit Codes
// =============================================================================

/// Compilation succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// A semantic error was reported against the source program.
pub const EXIT_ERROR: u8 = 1;
/// The optimizer detected an internal inconsistency.
pub const EXIT_INTERNAL_ERROR: u8 = 120;

// =============================================================================
// Diagnostics
// =============================================================================

/// One user-facing error message tied to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

/// Pipeline phase in which an internal error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Optimize,
    TypeCheck,
    LoopTree,
    CodeMotion,
    Schedule,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Build => "build",
            Phase::Optimize => "optimize",
            Phase::TypeCheck => "type-check",
            Phase::LoopTree => "loop-tree",
            Phase::CodeMotion => "code-motion",
            Phase::Schedule => "schedule",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Error Type
// =============================================================================

/// Error returned at every phase boundary.
#[derive(Debug, Error)]
pub enum SonError {
    /// One or more semantic errors; compilation stops before code motion.
    #[error("{}", render_semantic(.0))]
    Semantic(Vec<Diagnostic>),

    /// An optimizer invariant was violated.
    #[error("internal compiler error during {phase}: {message}")]
    Internal { phase: Phase, message: String },
}

fn render_semantic(diags: &[Diagnostic]) -> String {
    match diags {
        [] => "semantic error".to_string(),
        [one] => one.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

impl SonError {
    /// Build an internal error for `phase`.
    pub fn internal(phase: Phase, message: impl Into<String>) -> Self {
        SonError::Internal {
            phase,
            message: message.into(),
        }
    }

    /// Build a semantic error from a single diagnostic.
    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        SonError::Semantic(vec![Diagnostic::new(message, span)])
    }

    /// True for internal compiler errors.
    pub fn is_internal(&self) -> bool {
        matches!(self, SonError::Internal { .. })
    }

    /// Diagnostics carried by a semantic error; empty for internal errors.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            SonError::Semantic(diags) => diags,
            SonError::Internal { .. } => &[],
        }
    }

    /// Process exit code an embedding driver should use.
    pub fn exit_code(&self) -> u8 {
        match self {
            SonError::Semantic(_) => EXIT_ERROR,
            SonError::Internal { .. } => EXIT_INTERNAL_ERROR,
        }
    }
}

/// Result alias used across the pipeline.
pub type SonResult<T> = Result<T, SonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let sem = SonError::semantic("Might be null accessing 'x'", Span::new(1, 2));
        assert_eq!(sem.exit_code(), EXIT_ERROR);
        assert!(!sem.is_internal());

        let ice = SonError::internal(Phase::Schedule, "cycle in block");
        assert_eq!(ice.exit_code(), EXIT_INTERNAL_ERROR);
        assert!(ice.is_internal());
        assert!(ice.diagnostics().is_empty());
    }

    #[test]
    fn test_display() {
        let ice = SonError::internal(Phase::Optimize, "type went up");
        assert_eq!(
            ice.to_string(),
            "internal compiler error during optimize: type went up"
        );

        let sem = SonError::Semantic(vec![
            Diagnostic::new("first", Span::DUMMY),
            Diagnostic::new("second", Span::DUMMY),
        ]);
        assert_eq!(sem.to_string(), "first (and 1 more)");
        assert_eq!(sem.diagnostics().len(), 2);
    }
}
