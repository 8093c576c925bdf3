//! Language-neutral interchange document.
//!
//! A tree of string-keyed mappings; every node carries a `Klass`
//! discriminator naming its variant. Field names and discriminator values
//! are the backward-compatibility surface external tooling depends on, so
//! they never change.

use crate::descriptions::{DescKind, Description};
use crate::expr::{ConstValue, ExprNode};
use crate::types::{AttrValue, AttribMap, TypeDesc};
use crate::Run;
use serde_json::{json, Map, Value};

/// Render the finalized run: one entry per included description, in final
/// output order.
pub fn render_interchange(run: &Run) -> Value {
    let entries: Vec<Value> = run.output().map(|desc| entry_json(run, desc)).collect();
    Value::Array(entries)
}

fn entry_json(run: &Run, desc: &Description) -> Value {
    let mut entry = Map::new();
    entry.insert("name".into(), json!(desc.name));
    entry.insert("type".into(), json!(desc.kind.type_name()));

    match &desc.kind {
        DescKind::MacroConst { body } => {
            entry.insert("value".into(), json!(body.render()));
        }
        DescKind::MacroFunction { def } => {
            entry.insert("args".into(), json!(def.params));
            entry.insert("body".into(), json!(def.body.render()));
        }
        DescKind::Constant { value } => {
            entry.insert("value".into(), json!(value.render()));
        }
        DescKind::Struct { .. } => {
            let (attrib, fields) = match run.registry.record(&desc.name) {
                Some(record) => (attrib_json(&record.attrib), record_fields(run, desc)),
                None => (json!({}), json!([])),
            };
            entry.insert("attrib".into(), attrib);
            entry.insert("fields".into(), fields);
        }
        DescKind::Enum => {
            let fields = match run.registry.enum_desc(&desc.name) {
                Some(enum_desc) => Value::Array(
                    enum_desc
                        .enumerators
                        .iter()
                        .map(|(name, value)| {
                            json!({ "name": name, "ctype": expr_json(value) })
                        })
                        .collect(),
                ),
                None => json!([]),
            };
            entry.insert("fields".into(), fields);
        }
        DescKind::Typedef { ty } => {
            entry.insert("ctype".into(), type_json(run, ty, true));
        }
        DescKind::Variable { ty } => {
            entry.insert("ctype".into(), type_json(run, ty, true));
        }
        DescKind::Function { ty, attrib } => {
            if let TypeDesc::Function { ret, args, variadic } = ty {
                let arg_entries: Vec<Value> = args
                    .iter()
                    .map(|arg| {
                        let mut node = type_json(run, &arg.ty, false);
                        if let Value::Object(map) = &mut node {
                            map.insert(
                                "identifier".into(),
                                json!(arg.name.clone().unwrap_or_default()),
                            );
                        }
                        node
                    })
                    .collect();
                entry.insert("args".into(), Value::Array(arg_entries));
                entry.insert("return".into(), type_json(run, ret, false));
                entry.insert("variadic".into(), json!(variadic));
            }
            entry.insert("attrib".into(), attrib_json(attrib));
        }
        DescKind::Undef => {}
    }

    Value::Object(entry)
}

fn record_fields(run: &Run, desc: &Description) -> Value {
    let Some(record) = run.registry.record(&desc.name) else {
        return json!([]);
    };
    let fields: Vec<Value> = record
        .members
        .iter()
        .map(|member| {
            let mut field = Map::new();
            field.insert(
                "name".into(),
                match &member.name {
                    Some(name) => json!(name),
                    None => Value::Null,
                },
            );
            field.insert("ctype".into(), type_json(run, &member.ty, false));
            if let TypeDesc::Bitfield { width, .. } = &member.ty {
                field.insert("bitfield".into(), json!(width.render()));
            }
            Value::Object(field)
        })
        .collect();
    Value::Array(fields)
}

/// Serialize one type descriptor. Record and enum references resolve
/// through the tag namespace; `deep` controls whether their bodies are
/// inlined (entry-level nodes) or referenced shallowly (nested nodes),
/// which keeps self-referential graphs finite.
fn type_json(run: &Run, ty: &TypeDesc, deep: bool) -> Value {
    match ty {
        TypeDesc::Simple { name, signed, longs } => json!({
            "Klass": "CtypesSimple",
            "name": name,
            "signed": signed,
            "longs": longs,
            "errors": [],
        }),
        TypeDesc::Special(name) => json!({
            "Klass": "CtypesSpecial",
            "name": name,
            "errors": [],
        }),
        TypeDesc::Pointer { destination, qualifiers } => json!({
            "Klass": "CtypesPointer",
            "destination": type_json(run, destination, false),
            "qualifiers": qualifiers.names(),
            "errors": [],
        }),
        TypeDesc::Array { element, count } => json!({
            "Klass": "CtypesArray",
            "base": type_json(run, element, false),
            "count": count.as_ref().map(|c| c.render()),
            "errors": [],
        }),
        TypeDesc::Bitfield { base, width } => json!({
            "Klass": "CtypesBitfield",
            "base": type_json(run, base, false),
            "bitfield": expr_json(width),
            "errors": [],
        }),
        TypeDesc::Function { ret, args, variadic } => json!({
            "Klass": "CtypesFunction",
            "restype": type_json(run, ret, false),
            "argtypes": args.iter().map(|a| type_json(run, &a.ty, false)).collect::<Vec<_>>(),
            "variadic": variadic,
            "errors": [],
        }),
        TypeDesc::Record { tag, is_union } => record_json(run, tag, *is_union, deep),
        TypeDesc::Enum { tag } => enum_json(run, tag, deep),
    }
}

fn record_json(run: &Run, tag: &str, is_union: bool, deep: bool) -> Value {
    let mut node = Map::new();
    let variety = if is_union { "union" } else { "struct" };
    node.insert("Klass".into(), json!("CtypesStruct"));
    node.insert("variety".into(), json!(variety));
    node.insert("tag".into(), json!(tag));
    match run.registry.record(tag) {
        Some(record) => {
            node.insert("anonymous".into(), json!(record.anonymous));
            node.insert("opaque".into(), json!(record.opaque));
            node.insert(
                "src".into(),
                json!([record.src.file.clone(), record.src.line]),
            );
            if deep {
                let members: Vec<Value> = record
                    .members
                    .iter()
                    .map(|member| {
                        json!([
                            member.name.clone(),
                            type_json(run, &member.ty, false),
                        ])
                    })
                    .collect();
                node.insert("members".into(), Value::Array(members));
                node.insert("pack".into(), json!(record.pack));
                node.insert("attrib".into(), attrib_json(&record.attrib));
            }
        }
        None => {
            node.insert("anonymous".into(), json!(false));
            node.insert("opaque".into(), json!(true));
        }
    }
    node.insert("errors".into(), json!([]));
    Value::Object(node)
}

fn enum_json(run: &Run, tag: &str, deep: bool) -> Value {
    let mut node = Map::new();
    node.insert("Klass".into(), json!("CtypesEnum"));
    node.insert("tag".into(), json!(tag));
    match run.registry.enum_desc(tag) {
        Some(enum_desc) => {
            node.insert("anonymous".into(), json!(enum_desc.anonymous));
            node.insert("opaque".into(), json!(enum_desc.opaque));
            node.insert(
                "src".into(),
                json!([enum_desc.src.file.clone(), enum_desc.src.line]),
            );
            if deep {
                let enumerators: Vec<Value> = enum_desc
                    .enumerators
                    .iter()
                    .map(|(name, value)| json!([name, expr_json(value)]))
                    .collect();
                node.insert("enumerators".into(), Value::Array(enumerators));
            }
        }
        None => {
            node.insert("anonymous".into(), json!(false));
            node.insert("opaque".into(), json!(true));
        }
    }
    node.insert("errors".into(), json!([]));
    Value::Object(node)
}

/// Serialize one expression node.
pub fn expr_json(expr: &ExprNode) -> Value {
    match expr {
        ExprNode::Constant { value, is_literal } => json!({
            "Klass": "ConstantExpressionNode",
            "value": const_json(value),
            "is_literal": is_literal,
            "errors": [],
        }),
        ExprNode::Identifier(name) => json!({
            "Klass": "IdentifierExpressionNode",
            "name": name,
            "errors": [],
        }),
        ExprNode::Binary { op, left, right } => json!({
            "Klass": "BinaryExpressionNode",
            "name": op.name(),
            "format": op.format(),
            "left": expr_json(left),
            "right": expr_json(right),
            "can_be_ctype": [false, false],
            "errors": [],
        }),
        ExprNode::Unary { op, operand } => json!({
            "Klass": "UnaryExpressionNode",
            "name": op.name(),
            "format": op.format(),
            "child": expr_json(operand),
            "errors": [],
        }),
        ExprNode::Conditional { cond, then, otherwise } => json!({
            "Klass": "ConditionalExpressionNode",
            "cond": expr_json(cond),
            "yes": expr_json(then),
            "no": expr_json(otherwise),
            "errors": [],
        }),
        ExprNode::Call { callee, args } => json!({
            "Klass": "CallExpressionNode",
            "callee": callee,
            "args": args.iter().map(expr_json).collect::<Vec<_>>(),
            "errors": [],
        }),
        ExprNode::StringLiteral(value) => json!({
            "Klass": "StringLiteralExpressionNode",
            "value": value,
            "errors": [],
        }),
        ExprNode::CharLiteral(value) => json!({
            "Klass": "CharLiteralExpressionNode",
            "value": value.to_string(),
            "errors": [],
        }),
    }
}

fn const_json(value: &ConstValue) -> Value {
    match value {
        ConstValue::Int(v, _) => json!(v),
        ConstValue::Float(v, _) => json!(v),
        ConstValue::Str(s) => json!(s),
        ConstValue::Char(c) => json!(c.to_string()),
    }
}

fn attrib_json(attrib: &AttribMap) -> Value {
    let mut map = Map::new();
    for (key, value) in attrib {
        let value = match value {
            AttrValue::Flag(flag) => json!(flag),
            AttrValue::Int(n) => json!(n),
            AttrValue::Text(text) => json!(text),
        };
        map.insert(key.clone(), value);
    }
    Value::Object(map)
}
