// diag.rs — Unified diagnostics model
//
// Provides the diagnostic type shared by net aggregation, the rewrite passes
// and the pipeline. Conditions reported here are recoverable: the graph stays
// valid and the offending net or fusion group is left untouched. Structural
// invariant violations are `GraphError`s instead and abort the run.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0201`, `W0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // E01xx: invariant violations surfaced as diagnostics
    pub const E0100_INVARIANT: DiagCode = DiagCode("E0100");

    // E02xx: net aggregation
    pub const E0201_NET_WITHOUT_DRIVER: DiagCode = DiagCode("E0201");
    pub const W0202_NET_WITHOUT_ENDPOINT: DiagCode = DiagCode("W0202");

    // W03xx: fusion groups excluded from a rewrite
    pub const W0300_SLICE_UNRESOLVED_INDEX: DiagCode = DiagCode("W0300");
    pub const W0301_SLICE_ITEM_MISMATCH: DiagCode = DiagCode("W0301");
    pub const W0302_SLICE_INCOMPLETE: DiagCode = DiagCode("W0302");
    pub const W0303_INDEX_OUT_OF_RANGE: DiagCode = DiagCode("W0303");
    pub const W0310_TREE_MIXED_NAMING: DiagCode = DiagCode("W0310");
    pub const W0320_INTERFACE_FIELD_MISMATCH: DiagCode = DiagCode("W0320");

    // W04xx: pipeline
    pub const W0400_PASS_ORDER: DiagCode = DiagCode("W0400");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by net aggregation, a pass or the pipeline.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub message: String,
    /// Label of the signal, node or port the diagnostic is about.
    pub subject: Option<String>,
    pub hint: Option<String>,
    pub related: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            message: message.into(),
            subject: None,
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message)
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

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach the label of another element involved.
    pub fn with_related(mut self, label: impl Into<String>) -> Self {
        self.related.push(label.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, "\n  --> {}", subject)?;
        }
        for label in &self.related {
            write!(f, "\n  note: {}", label)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error("something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::warning("slice group skipped").with_code(codes::W0302_SLICE_INCOMPLETE);
        assert_eq!(format!("{d}"), "warning[W0302]: slice group skipped");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error("net has endpoints but no driver")
            .with_code(codes::E0201_NET_WITHOUT_DRIVER)
            .with_subject("top.sig")
            .with_related("u0.i")
            .with_hint("drive the signal or remove its readers");

        assert_eq!(d.code, Some(DiagCode("E0201")));
        assert!(d.is_error());
        assert_eq!(d.related.len(), 1);
        assert_eq!(
            format!("{d}"),
            "error[E0201]: net has endpoints but no driver\n  --> top.sig\n  note: u0.i\n  hint: drive the signal or remove its readers"
        );
    }
}
