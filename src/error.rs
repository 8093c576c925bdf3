use thiserror::Error;

/// Fatal, run-terminating errors. Per-declaration problems never appear
/// here; they are collected on the owning description instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Preprocess(#[from] PreprocessError),

    #[error("No declarations survived resolution; output would be empty")]
    EmptyOutput,

    #[error("Malformed symbol rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Aborting in strict mode: {error_count} error(s) collected")]
    Strict { error_count: usize },
}

/// The external preprocessor invocation failed. The invocation itself is
/// owned by the caller; this type carries the boundary diagnostic into the
/// run so the failing input is identified.
#[derive(Debug, Error)]
#[error("Preprocessing {input} failed: {message}")]
pub struct PreprocessError {
    pub input: String,
    pub message: String,
}

/// A tier rule string could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule {rule:?} is missing a '=' separator")]
    MissingSeparator { rule: String },

    #[error("Rule {rule:?} names unknown tier {tier:?}")]
    UnknownTier { rule: String, tier: String },

    #[error("Rule {rule:?} has an invalid pattern: {source}")]
    BadPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}
