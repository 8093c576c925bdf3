//! declgen: recovers typed declarations from preprocessed C header text and
//! produces a dependency-filtered, deterministically ordered description
//! sequence for a foreign-function binding emitter.

pub mod descriptions;
pub mod diagnostic;
pub mod error;
pub mod expr;
pub mod json;
pub mod lexer;
pub mod literals;
pub mod options;
pub mod pack;
pub mod parser;
pub mod processor;
pub mod source;
pub mod types;

#[cfg(test)]
mod tests_pipeline;

use descriptions::{DescId, Description, Registry};
use diagnostic::DiagnosticEngine;
use error::Error;
use expr::EvalEnv;
use hashbrown::{HashMap, HashSet};
use lexer::{Lexer, MacroEvent};
use options::Options;
use pack::PackContext;
use types::TypeDesc;

/// One pipeline run: lex, parse, resolve, strictly in that order.
///
/// Every piece of run-scoped state lives here — registry, tag counter, pack
/// stack, typedef table — so independent runs in one process never observe
/// each other.
pub struct Run {
    pub options: Options,
    pub registry: Registry,
    pub pack: PackContext,
    pub diagnostics: DiagnosticEngine,
    pub(crate) typedefs: HashMap<String, TypeDesc>,
    pub(crate) macro_events: Vec<MacroEvent>,
    anon_counter: u32,
    primary_files: HashSet<String>,
    output: Vec<DescId>,
}

impl Run {
    pub fn new(options: Options) -> Self {
        let strict = options.strict;
        let mut typedefs = HashMap::new();
        if !options.no_stddef_types {
            for (name, ty) in types::stddef_types() {
                typedefs.insert(name.to_string(), ty);
            }
        }
        if !options.no_gnu_types {
            for (name, ty) in types::gnu_types() {
                typedefs.insert(name.to_string(), ty);
            }
        }
        typedefs.insert("_Bool".to_string(), TypeDesc::Special("c_bool".into()));

        Run {
            options,
            registry: Registry::new(),
            pack: PackContext::new(),
            diagnostics: DiagnosticEngine::new(strict),
            typedefs,
            macro_events: Vec::new(),
            anon_counter: 0,
            primary_files: HashSet::new(),
            output: Vec::new(),
        }
    }

    /// Parse one preprocessed input. `file` names the primary header the
    /// text was produced from; declarations recovered from other files (via
    /// line markers) are included on demand only.
    pub fn parse_text(&mut self, text: &str, file: &str) {
        self.primary_files.insert(file.to_string());
        let lexed = Lexer::new(text, file).tokenize();
        self.macro_events.extend(lexed.events);
        parser::Parser::new(lexed.tokens, self).parse_translation_unit();
    }

    /// Like [`Run::parse_text`], for raw bytes: undecodable sequences are
    /// replaced with U+FFFD rather than aborting the run.
    pub fn parse_bytes(&mut self, bytes: &[u8], file: &str) {
        self.primary_files.insert(file.to_string());
        let lexed = Lexer::from_bytes(bytes, file).tokenize();
        self.macro_events.extend(lexed.events);
        parser::Parser::new(lexed.tokens, self).parse_translation_unit();
    }

    /// Resolve the registry: parse captured macros, classify, filter, close
    /// over dependencies and produce the final output order.
    pub fn process(&mut self) -> Result<(), Error> {
        parser::macros::process_macro_events(self);
        self.output = processor::process(self)?;
        if self.options.strict && self.diagnostics.has_errors() {
            return Err(Error::Strict {
                error_count: self.diagnostics.error_count(),
            });
        }
        Ok(())
    }

    /// Included descriptions in final output order. Empty before
    /// [`Run::process`] has run.
    pub fn output(&self) -> impl Iterator<Item = &Description> {
        self.output.iter().map(|&id| self.registry.get(id))
    }

    pub fn output_ids(&self) -> &[DescId] {
        &self.output
    }

    /// Evaluation environment over everything the run has collected:
    /// object-like macros and enumerator constants by name, plus
    /// function-like macros.
    pub fn eval_env(&self) -> EvalEnv {
        let mut env = EvalEnv::new();
        for (_, desc) in self.registry.iter() {
            match &desc.kind {
                descriptions::DescKind::MacroConst { body } => {
                    env.constants.insert(desc.name.clone(), body.clone());
                }
                descriptions::DescKind::Constant { value } => {
                    env.constants.insert(desc.name.clone(), value.clone());
                }
                descriptions::DescKind::MacroFunction { def } => {
                    env.functions.insert(desc.name.clone(), def.clone());
                }
                _ => {}
            }
        }
        env
    }

    /// Render the finalized run as the language-neutral interchange
    /// document.
    pub fn interchange(&self) -> serde_json::Value {
        json::render_interchange(self)
    }

    pub(crate) fn next_anon_tag(&mut self) -> String {
        self.anon_counter += 1;
        format!("anon_{}", self.anon_counter)
    }

    pub(crate) fn is_primary_file(&self, file: &str) -> bool {
        self.primary_files.contains(file) || self.options.headers.iter().any(|h| h == file)
    }

    pub(crate) fn typedef_type(&self, name: &str) -> Option<&TypeDesc> {
        self.typedefs.get(name)
    }

    pub(crate) fn register_typedef(&mut self, name: String, ty: TypeDesc) {
        self.typedefs.insert(name, ty);
    }
}

/// Convenience entry point: one preprocessed input, full pipeline.
pub fn parse_and_process(text: &str, file: &str, options: Options) -> Result<Run, Error> {
    let mut run = Run::new(options);
    run.parse_text(text, file);
    run.process()?;
    Ok(run)
}

pub use expr::{ConstValue, ExprNode};
