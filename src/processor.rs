//! Dependency and inclusion resolver.
//!
//! Classifies every description into a tier, applies the ordered rule list
//! (last match wins), computes the dependency closure over included
//! descriptions, and produces a stable topological output order with
//! encounter-order tie-breaking.

use crate::descriptions::{DescId, DescKey, DescKind, Namespace, Tier};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{Error, RuleError};
use crate::expr::ExprNode;
use crate::types::TypeDesc;
use crate::Run;
use log::debug;
use regex::Regex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// The ordered tier rules, precompiled once per run. Patterns must match
/// the whole name; a later matching rule overwrites an earlier one.
pub struct RuleSet {
    rules: Vec<(Tier, Regex)>,
}

impl RuleSet {
    pub fn compile(specs: &[String]) -> Result<RuleSet, RuleError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            let (tier, patterns) = spec.split_once('=').ok_or_else(|| RuleError::MissingSeparator {
                rule: spec.clone(),
            })?;
            let tier = match tier.trim() {
                "never" => Tier::Never,
                "if_needed" => Tier::IfNeeded,
                "yes" => Tier::Yes,
                other => {
                    return Err(RuleError::UnknownTier {
                        rule: spec.clone(),
                        tier: other.to_string(),
                    })
                }
            };
            let anchored = format!("^(?:{})$", patterns);
            let regex = Regex::new(&anchored).map_err(|source| RuleError::BadPattern {
                rule: spec.clone(),
                source,
            })?;
            rules.push((tier, regex));
        }
        Ok(RuleSet { rules })
    }

    /// Last matching rule wins; `None` when no rule matches.
    pub fn tier_for(&self, name: &str) -> Option<Tier> {
        self.rules
            .iter()
            .filter(|(_, regex)| regex.is_match(name))
            .map(|(tier, _)| *tier)
            .last()
    }
}

/// One description's resolved classification and references.
struct Analysis {
    tier: Tier,
    /// (dependency, weak). Weak references (through pointers, or an enum
    /// pulling its own enumerator constants) participate in the inclusion
    /// closure but do not constrain output order.
    deps: Vec<(DescKey, bool)>,
}

/// Run the resolver over the registry. Returns the final output order.
pub fn process(run: &mut Run) -> Result<Vec<DescId>, Error> {
    let rules = RuleSet::compile(&run.options.symbol_rules)?;
    let count = run.registry.len();

    // Phase 1: classify and collect references (read-only).
    let analyses: Vec<Analysis> = (0..count)
        .map(|index| analyze(run, DescId(index), &rules))
        .collect();

    // Resolve references to ids once.
    let resolved: Vec<Vec<(Option<DescId>, DescKey, bool)>> = analyses
        .iter()
        .map(|analysis| {
            analysis
                .deps
                .iter()
                .map(|(key, weak)| (run.registry.lookup(key.0, &key.1), key.clone(), *weak))
                .collect()
        })
        .collect();

    // Phase 2: write tiers and requirement lists back.
    for (index, analysis) in analyses.iter().enumerate() {
        let desc = run.registry.get_mut(DescId(index));
        desc.tier = analysis.tier;
        desc.requirements = analysis.deps.iter().map(|(key, _)| key.clone()).collect();
    }

    // Phase 3: dependency closure from every `yes` description, in
    // encounter order. `if_needed` dependencies are promoted; `never`
    // dependencies flag the dependent and get a fallback substitution.
    let mut included = vec![false; count];
    let mut queue: VecDeque<usize> = (0..count)
        .filter(|&index| analyses[index].tier == Tier::Yes)
        .collect();
    let mut dependency_errors: Vec<(usize, DescKey)> = Vec::new();
    let mut missing: Vec<(usize, DescKey)> = Vec::new();

    while let Some(index) = queue.pop_front() {
        if included[index] {
            continue;
        }
        included[index] = true;
        for (dep, key, _weak) in &resolved[index] {
            match dep {
                Some(dep) => match analyses[dep.0].tier {
                    Tier::Yes | Tier::IfNeeded => {
                        if !included[dep.0] {
                            queue.push_back(dep.0);
                        }
                    }
                    Tier::Never => dependency_errors.push((index, key.clone())),
                },
                None => missing.push((index, key.clone())),
            }
        }
    }

    for (index, key) in dependency_errors {
        let loc = run.registry.get(DescId(index)).src.clone();
        let name = run.registry.get(DescId(index)).name.clone();
        let diag = Diagnostic::warning(
            DiagnosticKind::Dependency,
            format!(
                "{} depends on {}, which is excluded; an opaque fallback will be substituted",
                name, key.1
            ),
            loc,
        );
        run.diagnostics.report(diag.clone());
        let desc = run.registry.get_mut(DescId(index));
        desc.errors.push(diag);
        desc.fallback_refs.push(key);
    }

    for (index, key) in missing {
        let desc = run.registry.get(DescId(index));
        debug!("{} references unknown name {}", desc.name, key.1);
        let diag = Diagnostic::note(
            DiagnosticKind::Dependency,
            format!("{} references {}, which is not defined in this run", desc.name, key.1),
            desc.src.clone(),
        );
        run.diagnostics.report(diag.clone());
        run.registry.get_mut(DescId(index)).errors.push(diag);
    }

    // Phase 4: stable topological order over strong edges, ties broken by
    // encounter order. Pointer references are weak, so struct graphs cannot
    // cycle here; mutually-referential macros still can, and the remainder
    // of such a cycle falls back to encounter order.
    let mut indegree = vec![0usize; count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    for index in 0..count {
        if !included[index] {
            continue;
        }
        for (dep, _key, weak) in &resolved[index] {
            if let Some(dep) = dep {
                if !weak && included[dep.0] && dep.0 != index && analyses[dep.0].tier != Tier::Never {
                    indegree[index] += 1;
                    successors[dep.0].push(index);
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&index| included[index] && indegree[index] == 0)
        .map(Reverse)
        .collect();
    let mut order: Vec<DescId> = Vec::new();
    while let Some(Reverse(index)) = ready.pop() {
        order.push(DescId(index));
        for &succ in &successors[index] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.push(Reverse(succ));
            }
        }
    }
    if order.len() < included.iter().filter(|&&i| i).count() {
        debug!("dependency cycle detected; falling back to encounter order for the remainder");
        let mut seen: Vec<bool> = vec![false; count];
        for id in &order {
            seen[id.0] = true;
        }
        for index in 0..count {
            if included[index] && !seen[index] {
                order.push(DescId(index));
            }
        }
    }

    for index in 0..count {
        if included[index] {
            run.registry.get_mut(DescId(index)).included = true;
        }
    }

    validate_expressions(run, &order);

    if order.is_empty() {
        return Err(Error::EmptyOutput);
    }
    Ok(order)
}

/// Classify one description and collect its structural references.
fn analyze(run: &Run, id: DescId, rules: &RuleSet) -> Analysis {
    let desc = run.registry.get(id);
    let mut deps: Vec<(DescKey, bool)> = Vec::new();

    match &desc.kind {
        DescKind::Function { ty, .. } | DescKind::Variable { ty } | DescKind::Typedef { ty } => {
            type_refs(ty, false, &mut deps);
        }
        DescKind::Struct { .. } => {
            if let Some(record) = run.registry.record(&desc.name) {
                for member in &record.members {
                    type_refs(&member.ty, false, &mut deps);
                }
                if let Some(aligned) = &record.aligned {
                    expr_refs(aligned, &[], false, &mut deps);
                }
            }
        }
        DescKind::Enum => {
            if let Some(enum_desc) = run.registry.enum_desc(&desc.name) {
                let own: Vec<String> = enum_desc
                    .enumerators
                    .iter()
                    .map(|(name, _)| name.clone())
                    .collect();
                for (_, value) in &enum_desc.enumerators {
                    expr_refs(value, &own, false, &mut deps);
                }
                // Enumerator constants ride along with their enum, without
                // constraining its position.
                for name in own {
                    deps.push(((Namespace::Ident, name), true));
                }
            }
        }
        DescKind::MacroConst { body } => expr_refs(body, &[], false, &mut deps),
        DescKind::MacroFunction { def } => expr_refs(&def.body, &def.params, false, &mut deps),
        DescKind::Constant { value } => expr_refs(value, &[], false, &mut deps),
        DescKind::Undef => {}
    }

    // Default tier, then coarse switches, then the rule list.
    let mut tier = Tier::Yes;
    if desc.errors.iter().any(|e| {
        e.level == crate::diagnostic::DiagnosticLevel::Error && e.kind == DiagnosticKind::Parse
    }) {
        tier = Tier::Never;
    } else if matches!(
        desc.kind,
        DescKind::MacroConst { .. } | DescKind::MacroFunction { .. } | DescKind::Undef
    ) && !run.options.include_macros
    {
        tier = Tier::Never;
    } else if desc.src.is_synthetic() {
        if !run.options.builtin_symbols {
            tier = Tier::Never;
        }
    } else if !run.options.all_headers && !run.is_primary_file(&desc.src.file) {
        tier = Tier::IfNeeded;
    }

    if let Some(ruled) = rules.tier_for(&desc.name) {
        tier = ruled;
    }

    // Explicit name lists override everything.
    if run.options.exclude_symbols.iter().any(|n| n == &desc.name) {
        tier = Tier::Never;
    }
    if run.options.include_symbols.iter().any(|n| n == &desc.name) {
        tier = Tier::Yes;
    }

    Analysis { tier, deps }
}

/// Structural references of a type. Crossing a pointer makes everything
/// beneath it weak: needed for inclusion, irrelevant for ordering, and the
/// edge consumers can break with a forward declaration.
fn type_refs(ty: &TypeDesc, weak: bool, out: &mut Vec<(DescKey, bool)>) {
    match ty {
        TypeDesc::Simple { .. } | TypeDesc::Special(_) => {}
        TypeDesc::Record { tag, .. } => push_ref(out, (Namespace::Tag, tag.clone()), weak),
        TypeDesc::Enum { tag } => push_ref(out, (Namespace::Tag, tag.clone()), weak),
        TypeDesc::Pointer { destination, .. } => type_refs(destination, true, out),
        TypeDesc::Array { element, count } => {
            type_refs(element, weak, out);
            if let Some(count) = count {
                expr_refs(count, &[], weak, out);
            }
        }
        TypeDesc::Bitfield { base, width } => {
            type_refs(base, weak, out);
            expr_refs(width, &[], weak, out);
        }
        TypeDesc::Function { ret, args, .. } => {
            type_refs(ret, weak, out);
            for arg in args {
                type_refs(&arg.ty, weak, out);
            }
        }
    }
}

fn expr_refs(expr: &ExprNode, exclude: &[String], weak: bool, out: &mut Vec<(DescKey, bool)>) {
    let mut names = Vec::new();
    expr.collect_identifiers(exclude, &mut names);
    for name in names {
        push_ref(out, (Namespace::Ident, name), weak);
    }
}

fn push_ref(out: &mut Vec<(DescKey, bool)>, key: DescKey, weak: bool) {
    if let Some(existing) = out.iter_mut().find(|(k, _)| *k == key) {
        // A strong reference subsumes a weak one.
        existing.1 &= weak;
        return;
    }
    out.push((key, weak));
}

/// Evaluate included constant-valued descriptions once: a division by a
/// literal zero between reduced operands is an expression error; anything
/// unresolved merely marks the description as not compile-time constant.
fn validate_expressions(run: &mut Run, order: &[DescId]) {
    let env = run.eval_env();
    let mut findings: Vec<(DescId, Diagnostic)> = Vec::new();

    for &id in order {
        let desc = run.registry.get(id);
        let body = match &desc.kind {
            DescKind::MacroConst { body } => body,
            DescKind::Constant { value } => value,
            _ => continue,
        };
        match body.evaluate(&env) {
            Ok(Some(_)) => {}
            Ok(None) => findings.push((
                id,
                Diagnostic::note(
                    DiagnosticKind::Expression,
                    format!("{} is not a compile-time constant", desc.name),
                    desc.src.clone(),
                ),
            )),
            Err(error) => findings.push((
                id,
                Diagnostic::error(
                    DiagnosticKind::Expression,
                    format!("{}: {}", desc.name, error),
                    desc.src.clone(),
                ),
            )),
        }
    }

    for (id, diag) in findings {
        run.diagnostics.report(diag.clone());
        run.registry.get_mut(id).errors.push(diag);
    }
}
