//! Turns captured `#define` bodies into macro descriptions.
//!
//! Each body is re-lexed and parsed as a standalone constant expression,
//! outside any invocation context. A body that is not an expression becomes
//! a diagnostic-only stub: recorded, excluded from output, never fatal.

use crate::descriptions::{DescKind, Description, Namespace};
use crate::diagnostic::{Diagnostic, DiagnosticKind, ParseError};
use crate::expr::{ExprNode, MacroFn};
use crate::lexer::{Lexer, MacroDef, MacroEvent};
use crate::Run;
use log::debug;

use super::expressions::parse_constant_expression;
use super::Parser;

/// Replay the run's `#define`/`#undef` events in source order.
pub fn process_macro_events(run: &mut Run) {
    let events = std::mem::take(&mut run.macro_events);
    for event in events {
        match event {
            MacroEvent::Define(def) => define_macro(run, def),
            MacroEvent::Undef(name, loc) => {
                if run.options.include_undefs {
                    // Replaces any earlier macro of the same name outright.
                    run.registry
                        .add(Description::new(name, loc, DescKind::Undef));
                }
            }
        }
    }
}

fn define_macro(run: &mut Run, def: MacroDef) {
    if def.body.is_empty() {
        debug!("skipping empty macro {}", def.name);
        run.diagnostics.report(Diagnostic::note(
            DiagnosticKind::Parse,
            format!("Macro {} has an empty body; nothing to bind", def.name),
            def.loc.clone(),
        ));
        return;
    }

    if let Some(existing) = run.registry.lookup(Namespace::Ident, &def.name) {
        let previous = run.registry.get(existing).src.clone();
        run.diagnostics.report(Diagnostic::warning(
            DiagnosticKind::Parse,
            format!(
                "Macro {} redefined (previous definition at {})",
                def.name, previous
            ),
            def.loc.clone(),
        ));
    }

    match parse_macro_body(run, &def) {
        Ok(body) => {
            let kind = match def.params {
                Some(params) => DescKind::MacroFunction {
                    def: MacroFn { params, body },
                },
                None => DescKind::MacroConst { body },
            };
            run.registry
                .add(Description::new(def.name, def.loc, kind));
        }
        Err(error) => {
            // Diagnostic-only stub: the raw text is kept for inspection but
            // the parse error keeps it out of the output.
            let mut desc = Description::new(
                def.name.clone(),
                def.loc.clone(),
                DescKind::MacroConst {
                    body: ExprNode::StringLiteral(def.body.clone()),
                },
            );
            let diag = error.into_diagnostic();
            desc.errors.push(diag.clone());
            run.diagnostics.report(diag);
            run.registry.add(desc);
        }
    }
}

/// Parse one macro body as a constant expression. The replay goes through
/// the ordinary lexer with a line marker so coordinates point back at the
/// original `#define`.
fn parse_macro_body(run: &mut Run, def: &MacroDef) -> Result<ExprNode, ParseError> {
    let text = format!("# {} \"{}\"\n{}", def.loc.line, def.loc.file, def.body);
    let lexed = Lexer::new(text, def.loc.file.clone()).tokenize();

    let mut parser = Parser::new(lexed.tokens, run);
    let body = parse_constant_expression(&mut parser)?;
    if !parser.at_eof() {
        return Err(parser.syntax_error(format!(
            "Macro body of {} is not a single constant expression",
            def.name
        )));
    }
    Ok(body)
}
