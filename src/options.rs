//! Per-run configuration.
//!
//! Mirrors the coarse structural switches and rule strings a driver would
//! collect from its command line; this crate never parses arguments itself.

/// Switches controlling one pipeline run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Header files considered primary. Declarations whose recovered source
    /// file is not in this set are only included on demand (see
    /// `all_headers`).
    pub headers: Vec<String>,

    /// Include declarations from all headers, not just primary ones.
    pub all_headers: bool,

    /// Include symbols fabricated by the preprocessor itself
    /// (`<builtin>` / `<command-line>` origins).
    pub builtin_symbols: bool,

    /// Explicit name lists; applied after tier rules and override them.
    pub include_symbols: Vec<String>,
    pub exclude_symbols: Vec<String>,

    /// Emit macro descriptions at all. Tier rules may selectively override.
    pub include_macros: bool,

    /// Honor `#undef` directives by dropping the macro they name.
    pub include_undefs: bool,

    /// Ordered tier rules of the form `never|if_needed|yes=regex(|regex)*`.
    pub symbol_rules: Vec<String>,

    /// Disable seeding of stddef.h extension types (size_t and friends).
    pub no_stddef_types: bool,

    /// Disable seeding of GNU extension types (__builtin_va_list).
    pub no_gnu_types: bool,

    /// Elevate collected per-declaration errors to a run abort.
    pub strict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            headers: Vec::new(),
            all_headers: false,
            builtin_symbols: false,
            include_symbols: Vec::new(),
            exclude_symbols: Vec::new(),
            include_macros: true,
            include_undefs: true,
            symbol_rules: Vec::new(),
            no_stddef_types: false,
            no_gnu_types: false,
            strict: false,
        }
    }
}
