use crate::source::SrcLoc;
use serde::Serialize;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// Individual diagnostic attached to a description or surfaced for the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: SrcLoc,
}

/// Coarse classification used when surfacing diagnostics in aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    Parse,
    Expression,
    Attribute,
    Dependency,
    Other,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, location: SrcLoc) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Error,
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, location: SrcLoc) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Warning,
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn note(kind: DiagnosticKind, message: impl Into<String>, location: SrcLoc) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Note,
            kind,
            message: message.into(),
            location,
        }
    }
}

/// Parse errors for a single declaration. Recovered locally: the declaration
/// becomes a diagnostic-only stub and parsing resumes at the next boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        location: SrcLoc,
    },

    #[error("Unexpected end of input")]
    UnexpectedEof { location: SrcLoc },

    #[error("Syntax error: {message}")]
    SyntaxError { message: String, location: SrcLoc },

    #[error("Invalid integer constant: {text}")]
    InvalidIntegerConstant { text: String, location: SrcLoc },

    #[error("Invalid float constant: {text}")]
    InvalidFloatConstant { text: String, location: SrcLoc },

    #[error("Expression is not a compile-time constant: {context}")]
    NotConstant { context: String, location: SrcLoc },
}

impl ParseError {
    pub fn location(&self) -> &SrcLoc {
        match self {
            ParseError::UnexpectedToken { location, .. } => location,
            ParseError::UnexpectedEof { location } => location,
            ParseError::SyntaxError { location, .. } => location,
            ParseError::InvalidIntegerConstant { location, .. } => location,
            ParseError::InvalidFloatConstant { location, .. } => location,
            ParseError::NotConstant { location, .. } => location,
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(DiagnosticKind::Parse, self.to_string(), self.location().clone())
    }
}

/// Collects diagnostics for one run. Per-declaration errors land here in
/// aggregate and are surfaced at the end of the run.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    pub strict: bool,
}

impl DiagnosticEngine {
    pub fn new(strict: bool) -> Self {
        DiagnosticEngine {
            diagnostics: Vec::new(),
            strict,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn report_parse_error(&mut self, error: ParseError) {
        self.diagnostics.push(error.into_diagnostic());
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
