//! Source coordinates recovered from preprocessor line markers.
//!
//! The input to this crate is preprocessed text, so positions are tracked as
//! presumed (file, line) pairs rather than byte offsets into real files.

use serde::Serialize;
use std::fmt;

/// A presumed source location: the file and line the preprocessor says a
/// token came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SrcLoc {
    pub file: String,
    pub line: u32,
}

impl SrcLoc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SrcLoc {
            file: file.into(),
            line,
        }
    }

    /// Location for entities synthesized by the run itself (seeded typedefs,
    /// preprocessor builtins with no line marker yet).
    pub fn builtin() -> Self {
        SrcLoc::new("<builtin>", 0)
    }

    /// True for locations the preprocessor fabricates rather than reads from
    /// an input file (`<builtin>`, `<command-line>` and friends).
    pub fn is_synthetic(&self) -> bool {
        self.file.starts_with('<') && self.file.ends_with('>')
    }
}

impl Default for SrcLoc {
    fn default() -> Self {
        SrcLoc::builtin()
    }
}

impl fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
