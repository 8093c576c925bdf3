//! C constant-expression model.
//!
//! The AST is immutable after construction. Evaluation and textual rendering
//! are two independent read-only traversals: a node that cannot be reduced
//! (unresolved identifier, call to a non-constant function) stays symbolic
//! and is still printable through its render template.

use crate::literals::{FloatClass, IntClass};
use hashbrown::HashMap;
use serde::Serialize;
use std::fmt::Write as _;

/// A fully reduced constant value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstValue {
    Int(i64, IntClass),
    Float(f64, FloatClass),
    Str(String),
    Char(char),
}

impl ConstValue {
    pub fn int(value: i64) -> Self {
        ConstValue::Int(value, IntClass::default())
    }

    /// C truthiness: zero and the empty string are false, everything else
    /// is true.
    pub fn truthy(&self) -> bool {
        match self {
            ConstValue::Int(v, _) => *v != 0,
            ConstValue::Float(v, _) => *v != 0.0,
            ConstValue::Str(s) => !s.is_empty(),
            ConstValue::Char(c) => *c != '\0',
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(v, _) => Some(*v as f64),
            ConstValue::Float(v, _) => Some(*v),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v, _) => Some(*v),
            ConstValue::Char(c) => Some(*c as i64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// Stable operation name used by the interchange document.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "addition",
            BinaryOp::Sub => "subtraction",
            BinaryOp::Mul => "multiplication",
            BinaryOp::Div => "division",
            BinaryOp::Mod => "modulo",
            BinaryOp::Shl => "left-shift",
            BinaryOp::Shr => "right-shift",
            BinaryOp::Lt => "less-than",
            BinaryOp::Gt => "greater-than",
            BinaryOp::Le => "less-equal",
            BinaryOp::Ge => "greater-equal",
            BinaryOp::Eq => "equals",
            BinaryOp::Ne => "not-equals",
            BinaryOp::BitAnd => "bitwise-and",
            BinaryOp::BitXor => "bitwise-xor",
            BinaryOp::BitOr => "bitwise-or",
            BinaryOp::LogicalAnd => "logical-and",
            BinaryOp::LogicalOr => "logical-or",
        }
    }

    /// Render template with `%s` slots for the operands.
    pub fn format(self) -> &'static str {
        match self {
            BinaryOp::Add => "(%s + %s)",
            BinaryOp::Sub => "(%s - %s)",
            BinaryOp::Mul => "(%s * %s)",
            BinaryOp::Div => "(%s / %s)",
            BinaryOp::Mod => "(%s % %s)",
            BinaryOp::Shl => "(%s << %s)",
            BinaryOp::Shr => "(%s >> %s)",
            BinaryOp::Lt => "(%s < %s)",
            BinaryOp::Gt => "(%s > %s)",
            BinaryOp::Le => "(%s <= %s)",
            BinaryOp::Ge => "(%s >= %s)",
            BinaryOp::Eq => "(%s == %s)",
            BinaryOp::Ne => "(%s != %s)",
            BinaryOp::BitAnd => "(%s & %s)",
            BinaryOp::BitXor => "(%s ^ %s)",
            BinaryOp::BitOr => "(%s | %s)",
            BinaryOp::LogicalAnd => "(%s && %s)",
            BinaryOp::LogicalOr => "(%s || %s)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    LogicalNot,
    BitNot,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "negation",
            UnaryOp::Pos => "plus",
            UnaryOp::LogicalNot => "logical-not",
            UnaryOp::BitNot => "bitwise-not",
        }
    }

    pub fn format(self) -> &'static str {
        match self {
            UnaryOp::Neg => "(-%s)",
            UnaryOp::Pos => "(+%s)",
            UnaryOp::LogicalNot => "(!%s)",
            UnaryOp::BitNot => "(~%s)",
        }
    }
}

/// Immutable expression AST node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprNode {
    Constant {
        value: ConstValue,
        is_literal: bool,
    },
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprNode>,
    },
    Conditional {
        cond: Box<ExprNode>,
        then: Box<ExprNode>,
        otherwise: Box<ExprNode>,
    },
    Call {
        callee: String,
        args: Vec<ExprNode>,
    },
    StringLiteral(String),
    CharLiteral(char),
}

/// A captured function-like macro: ordered parameter names plus one body
/// expression built from the verbatim definition text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroFn {
    pub params: Vec<String>,
    pub body: ExprNode,
}

/// Name environment for evaluation: object-like macro / enumerator bodies
/// and function-like macros, both looked up lazily.
#[derive(Debug, Default)]
pub struct EvalEnv {
    pub constants: HashMap<String, ExprNode>,
    pub functions: HashMap<String, MacroFn>,
}

impl EvalEnv {
    pub fn new() -> Self {
        EvalEnv::default()
    }
}

/// Errors that make an expression defective rather than merely symbolic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Division by zero")]
    DivisionByZero,
}

/// Evaluation result: `Ok(None)` means the expression stays symbolic.
pub type Evaluated = Result<Option<ConstValue>, EvalError>;

// Identifier chains through macros can recurse; beyond this depth the
// expression is left symbolic.
const MAX_EVAL_DEPTH: u32 = 64;

impl ExprNode {
    pub fn int_literal(value: i64, class: IntClass) -> Self {
        ExprNode::Constant {
            value: ConstValue::Int(value, class),
            is_literal: false,
        }
    }

    /// Lazy partial evaluation against `env`. Unresolved identifiers leave
    /// the result symbolic; only structurally impossible arithmetic (e.g.
    /// dividing two reduced constants by literal zero) is an error.
    pub fn evaluate(&self, env: &EvalEnv) -> Evaluated {
        self.eval_at(env, 0)
    }

    fn eval_at(&self, env: &EvalEnv, depth: u32) -> Evaluated {
        if depth > MAX_EVAL_DEPTH {
            return Ok(None);
        }
        match self {
            ExprNode::Constant { value, .. } => Ok(Some(value.clone())),
            ExprNode::StringLiteral(s) => Ok(Some(ConstValue::Str(s.clone()))),
            ExprNode::CharLiteral(c) => Ok(Some(ConstValue::Char(*c))),
            ExprNode::Identifier(name) => match env.constants.get(name) {
                Some(body) => body.eval_at(env, depth + 1),
                None => Ok(None),
            },
            ExprNode::Unary { op, operand } => {
                let Some(value) = operand.eval_at(env, depth + 1)? else {
                    return Ok(None);
                };
                Ok(eval_unary(*op, &value))
            }
            ExprNode::Binary { op, left, right } => {
                let left = left.eval_at(env, depth + 1)?;
                let right = right.eval_at(env, depth + 1)?;
                match (left, right) {
                    (Some(l), Some(r)) => eval_binary(*op, &l, &r),
                    // Either side symbolic: defer, even a zero denominator.
                    _ => Ok(None),
                }
            }
            ExprNode::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let Some(cond) = cond.eval_at(env, depth + 1)? else {
                    return Ok(None);
                };
                // The winning branch's value passes through verbatim; it is
                // never collapsed to 0/1.
                let branch = if cond.truthy() { then } else { otherwise };
                branch.eval_at(env, depth + 1)
            }
            ExprNode::Call { callee, args } => {
                let Some(mac) = env.functions.get(callee) else {
                    return Ok(None);
                };
                if mac.params.len() != args.len() {
                    return Ok(None);
                }
                let bindings: HashMap<String, ExprNode> = mac
                    .params
                    .iter()
                    .cloned()
                    .zip(args.iter().cloned())
                    .collect();
                mac.body.substitute(&bindings).eval_at(env, depth + 1)
            }
        }
    }

    /// Structural one-shot substitution of identifier nodes by name. The
    /// substituted subtrees are inserted as-is and not revisited.
    pub fn substitute(&self, bindings: &HashMap<String, ExprNode>) -> ExprNode {
        match self {
            ExprNode::Identifier(name) => match bindings.get(name) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            ExprNode::Unary { op, operand } => ExprNode::Unary {
                op: *op,
                operand: Box::new(operand.substitute(bindings)),
            },
            ExprNode::Binary { op, left, right } => ExprNode::Binary {
                op: *op,
                left: Box::new(left.substitute(bindings)),
                right: Box::new(right.substitute(bindings)),
            },
            ExprNode::Conditional {
                cond,
                then,
                otherwise,
            } => ExprNode::Conditional {
                cond: Box::new(cond.substitute(bindings)),
                then: Box::new(then.substitute(bindings)),
                otherwise: Box::new(otherwise.substitute(bindings)),
            },
            ExprNode::Call { callee, args } => ExprNode::Call {
                callee: callee.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            _ => self.clone(),
        }
    }

    /// Render the expression as C source text through the node templates.
    pub fn render(&self) -> String {
        match self {
            ExprNode::Constant { value, .. } => render_value(value),
            ExprNode::Identifier(name) => name.clone(),
            ExprNode::Unary { op, operand } => fill_template(op.format(), &[operand.render()]),
            ExprNode::Binary { op, left, right } => {
                fill_template(op.format(), &[left.render(), right.render()])
            }
            ExprNode::Conditional {
                cond,
                then,
                otherwise,
            } => fill_template(
                "(%s ? %s : %s)",
                &[cond.render(), then.render(), otherwise.render()],
            ),
            ExprNode::Call { callee, args } => {
                let mut out = String::new();
                let _ = write!(out, "{}(", callee);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&arg.render());
                }
                out.push(')');
                out
            }
            ExprNode::StringLiteral(s) => format!("\"{}\"", escape_c(s)),
            ExprNode::CharLiteral(c) => format!("'{}'", escape_c(&c.to_string())),
        }
    }

    /// Every identifier referenced by the tree, skipping `exclude` (macro
    /// parameters). Call callees count as references too.
    pub fn collect_identifiers(&self, exclude: &[String], out: &mut Vec<String>) {
        match self {
            ExprNode::Identifier(name) => {
                if !exclude.iter().any(|p| p == name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            ExprNode::Unary { operand, .. } => operand.collect_identifiers(exclude, out),
            ExprNode::Binary { left, right, .. } => {
                left.collect_identifiers(exclude, out);
                right.collect_identifiers(exclude, out);
            }
            ExprNode::Conditional {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_identifiers(exclude, out);
                then.collect_identifiers(exclude, out);
                otherwise.collect_identifiers(exclude, out);
            }
            ExprNode::Call { callee, args } => {
                if !exclude.iter().any(|p| p == callee) && !out.contains(callee) {
                    out.push(callee.clone());
                }
                for arg in args {
                    arg.collect_identifiers(exclude, out);
                }
            }
            _ => {}
        }
    }
}

fn eval_unary(op: UnaryOp, value: &ConstValue) -> Option<ConstValue> {
    match op {
        UnaryOp::Pos => Some(value.clone()),
        UnaryOp::Neg => match value {
            ConstValue::Int(v, class) => Some(ConstValue::Int(v.wrapping_neg(), *class)),
            ConstValue::Float(v, class) => Some(ConstValue::Float(-v, *class)),
            _ => None,
        },
        UnaryOp::LogicalNot => Some(ConstValue::int(if value.truthy() { 0 } else { 1 })),
        UnaryOp::BitNot => value.as_i64().map(|v| ConstValue::int(!v)),
    }
}

fn eval_binary(op: BinaryOp, left: &ConstValue, right: &ConstValue) -> Evaluated {
    use BinaryOp::*;

    match op {
        LogicalAnd => return Ok(Some(ConstValue::int((left.truthy() && right.truthy()) as i64))),
        LogicalOr => return Ok(Some(ConstValue::int((left.truthy() || right.truthy()) as i64))),
        _ => {}
    }

    // Mixed or floating operands take the float path; comparisons still
    // yield plain ints.
    let float_math = matches!(left, ConstValue::Float(..)) || matches!(right, ConstValue::Float(..));
    if float_math {
        let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
            return Ok(None);
        };
        let value = match op {
            Add => ConstValue::Float(l + r, FloatClass::Double),
            Sub => ConstValue::Float(l - r, FloatClass::Double),
            Mul => ConstValue::Float(l * r, FloatClass::Double),
            Div => {
                if r == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                ConstValue::Float(l / r, FloatClass::Double)
            }
            Lt => ConstValue::int((l < r) as i64),
            Gt => ConstValue::int((l > r) as i64),
            Le => ConstValue::int((l <= r) as i64),
            Ge => ConstValue::int((l >= r) as i64),
            Eq => ConstValue::int((l == r) as i64),
            Ne => ConstValue::int((l != r) as i64),
            _ => return Ok(None),
        };
        return Ok(Some(value));
    }

    let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) else {
        return Ok(None);
    };
    let class = match (left, right) {
        (ConstValue::Int(_, a), ConstValue::Int(_, b)) => IntClass {
            unsigned: a.unsigned || b.unsigned,
            longs: a.longs.max(b.longs),
        },
        _ => IntClass::default(),
    };
    let value = match op {
        Add => ConstValue::Int(l.wrapping_add(r), class),
        Sub => ConstValue::Int(l.wrapping_sub(r), class),
        Mul => ConstValue::Int(l.wrapping_mul(r), class),
        Div => {
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ConstValue::Int(l.wrapping_div(r), class)
        }
        Mod => {
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ConstValue::Int(l.wrapping_rem(r), class)
        }
        Shl => ConstValue::Int(l.wrapping_shl(r as u32), class),
        Shr => ConstValue::Int(l.wrapping_shr(r as u32), class),
        BitAnd => ConstValue::Int(l & r, class),
        BitXor => ConstValue::Int(l ^ r, class),
        BitOr => ConstValue::Int(l | r, class),
        Lt => ConstValue::int((l < r) as i64),
        Gt => ConstValue::int((l > r) as i64),
        Le => ConstValue::int((l <= r) as i64),
        Ge => ConstValue::int((l >= r) as i64),
        Eq => ConstValue::int((l == r) as i64),
        Ne => ConstValue::int((l != r) as i64),
        LogicalAnd | LogicalOr => unreachable!(),
    };
    Ok(Some(value))
}

fn render_value(value: &ConstValue) -> String {
    match value {
        ConstValue::Int(v, _) => v.to_string(),
        ConstValue::Float(v, _) => {
            if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e16 {
                format!("{:.1}", v)
            } else {
                format!("{}", v)
            }
        }
        ConstValue::Str(s) => format!("\"{}\"", escape_c(s)),
        ConstValue::Char(c) => format!("'{}'", escape_c(&c.to_string())),
    }
}

fn fill_template(template: &str, operands: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + operands.iter().map(|o| o.len()).sum::<usize>());
    let mut slot = 0;
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        if let Some(op) = operands.get(slot) {
            out.push_str(op);
        }
        slot += 1;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> ExprNode {
        ExprNode::Identifier(name.to_string())
    }

    fn lit(value: i64) -> ExprNode {
        ExprNode::int_literal(value, IntClass::default())
    }

    fn binary(op: BinaryOp, left: ExprNode, right: ExprNode) -> ExprNode {
        ExprNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn ternary_passes_winning_branch_verbatim() {
        let expr = ExprNode::Conditional {
            cond: Box::new(lit(1)),
            then: Box::new(lit(99)),
            otherwise: Box::new(lit(100)),
        };
        let env = EvalEnv::new();
        assert_eq!(expr.evaluate(&env).unwrap(), Some(ConstValue::int(99)));

        let expr = ExprNode::Conditional {
            cond: Box::new(lit(0)),
            then: Box::new(lit(99)),
            otherwise: Box::new(lit(100)),
        };
        assert_eq!(expr.evaluate(&env).unwrap(), Some(ConstValue::int(100)));
    }

    #[test]
    fn unresolved_identifier_stays_symbolic() {
        let expr = binary(BinaryOp::Add, ident("MISSING"), lit(1));
        let env = EvalEnv::new();
        assert_eq!(expr.evaluate(&env).unwrap(), None);
        assert_eq!(expr.render(), "(MISSING + 1)");
    }

    #[test]
    fn division_by_literal_zero_only_errors_when_reduced() {
        let env = EvalEnv::new();
        let reduced = binary(BinaryOp::Div, lit(4), lit(0));
        assert_eq!(reduced.evaluate(&env), Err(EvalError::DivisionByZero));

        // Symbolic numerator: deferral, not an error.
        let symbolic = binary(BinaryOp::Div, ident("N"), lit(0));
        assert_eq!(symbolic.evaluate(&env), Ok(None));
    }

    #[test]
    fn macro_function_invocation_substitutes_once() {
        let mut env = EvalEnv::new();
        env.functions.insert(
            "C".to_string(),
            MacroFn {
                params: vec!["a".into(), "b".into(), "c".into()],
                body: ExprNode::Conditional {
                    cond: Box::new(ident("a")),
                    then: Box::new(ident("b")),
                    otherwise: Box::new(ident("c")),
                },
            },
        );
        let call = ExprNode::Call {
            callee: "C".to_string(),
            args: vec![lit(1), lit(1), lit(2)],
        };
        assert_eq!(call.evaluate(&env).unwrap(), Some(ConstValue::int(1)));

        let call = ExprNode::Call {
            callee: "C".to_string(),
            args: vec![lit(0), lit(99), lit(100)],
        };
        assert_eq!(call.evaluate(&env).unwrap(), Some(ConstValue::int(100)));
    }

    #[test]
    fn nested_macro_call_is_preserved_by_name() {
        // subcall(x, y) -> minus(x, y): the inner call is kept as a call
        // node, resolved only when evaluated against an environment.
        let body = ExprNode::Call {
            callee: "minus".to_string(),
            args: vec![ident("x"), ident("y")],
        };
        assert_eq!(body.render(), "minus(x, y)");

        let mut env = EvalEnv::new();
        env.functions.insert(
            "minus".to_string(),
            MacroFn {
                params: vec!["x".into(), "y".into()],
                body: binary(BinaryOp::Sub, ident("x"), ident("y")),
            },
        );
        let bindings: HashMap<String, ExprNode> =
            [("x".to_string(), lit(2)), ("y".to_string(), lit(5))].into_iter().collect();
        let substituted = body.substitute(&bindings);
        assert_eq!(substituted.render(), "minus(2, 5)");
        assert_eq!(substituted.evaluate(&env).unwrap(), Some(ConstValue::int(-3)));
    }

    #[test]
    fn identifier_chain_resolves_through_constants() {
        let mut env = EvalEnv::new();
        env.constants.insert("A".to_string(), lit(1));
        let expr = binary(BinaryOp::Add, ident("A"), lit(2));
        assert_eq!(expr.evaluate(&env).unwrap(), Some(ConstValue::int(3)));
    }

    #[test]
    fn render_templates() {
        let expr = binary(
            BinaryOp::Mul,
            ident("x"),
            binary(BinaryOp::Add, ident("y"), lit(1)),
        );
        assert_eq!(expr.render(), "(x * (y + 1))");
        let not = ExprNode::Unary {
            op: UnaryOp::BitNot,
            operand: Box::new(ident("mask")),
        };
        assert_eq!(not.render(), "(~mask)");
    }
}
