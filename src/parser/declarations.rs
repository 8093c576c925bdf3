//! Declaration specifiers and top-level declaration assembly.

use crate::descriptions::{DescKind, Description};
use crate::diagnostic::{Diagnostic, DiagnosticKind, ParseError};
use crate::expr::{ConstValue, ExprNode};
use crate::lexer::{Keyword, TokenKind};
use crate::source::SrcLoc;
use crate::types::{AttrValue, AttribMap, TypeDesc};
use itertools::Itertools;

use super::declarator::parse_declarator;
use super::expressions::parse_constant_expression;
use super::records;
use super::Parser;

/// Storage class recovered from the specifier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    None,
    Typedef,
    Extern,
    Static,
}

/// The flattened result of parsing a declaration-specifier sequence.
#[derive(Debug, Clone)]
pub(crate) struct DeclSpec {
    pub storage: Storage,
    pub base: TypeDesc,
    pub attrs: ParsedAttrs,
    pub loc: SrcLoc,
}

/// Attributes collected from `__attribute__((...))` blocks and calling
/// convention keywords. `packed` and `aligned` are interpreted; everything
/// else lands in the open map.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedAttrs {
    pub map: AttribMap,
    pub packed: bool,
    pub aligned: Option<ExprNode>,
}

impl ParsedAttrs {
    pub fn merge(&mut self, other: ParsedAttrs) {
        self.map.extend(other.map);
        self.packed |= other.packed;
        if other.aligned.is_some() {
            self.aligned = other.aligned;
        }
    }
}

/// Parse one top-level declaration and emit its description(s).
pub(crate) fn parse_declaration(p: &mut Parser) -> Result<(), ParseError> {
    let spec = parse_decl_specifiers(p)?;

    // `struct foo { ... };` / `enum { ... };` — the record parser already
    // emitted the description.
    if p.accept(&TokenKind::Semicolon) {
        return Ok(());
    }

    // Nothing is emitted until the whole declaration parses; a failure
    // leaves no partial descriptions behind.
    let mut pending: Vec<(String, TypeDesc, ParsedAttrs)> = Vec::new();
    loop {
        let declarator = parse_declarator(p, false)?;
        let mut attrs = spec.attrs.clone();
        let (name, ty, decl_attrs) = declarator.apply(spec.base.clone());
        attrs.map.extend(decl_attrs);
        attrs.merge(parse_trailing_attrs(p)?);

        let name = name.ok_or_else(|| p.syntax_error("declaration is missing a name"))?;

        // Initializers carry no binding information; parse and drop.
        if p.accept(&TokenKind::Equal) {
            let _ = parse_constant_expression(p)?;
        }

        let is_function = matches!(ty, TypeDesc::Function { .. });
        pending.push((name, ty, attrs));

        if p.accept(&TokenKind::Comma) {
            continue;
        }
        // Inline function definitions occasionally appear in headers; the
        // prototype is all we keep.
        if is_function && p.is(&TokenKind::LeftBrace) {
            p.skip_brace_group()?;
            break;
        }
        if !p.accept(&TokenKind::Semicolon) {
            return Err(ParseError::UnexpectedToken {
                expected: ";".to_string(),
                found: p.kind().to_string(),
                location: spec.loc.clone(),
            });
        }
        break;
    }

    for (name, ty, attrs) in pending {
        emit_declaration(p, &spec, name, ty, attrs);
    }
    Ok(())
}

fn emit_declaration(p: &mut Parser, spec: &DeclSpec, name: String, ty: TypeDesc, attrs: ParsedAttrs) {
    let loc = spec.loc.clone();
    match spec.storage {
        Storage::Typedef => {
            p.run.register_typedef(name.clone(), ty.clone());
            p.run
                .registry
                .add(Description::new(name, loc, DescKind::Typedef { ty }));
        }
        _ => {
            let desc = match ty {
                TypeDesc::Function { .. } => Description::new(
                    name,
                    loc,
                    DescKind::Function {
                        ty,
                        attrib: attrs.map,
                    },
                ),
                _ => Description::new(name, loc, DescKind::Variable { ty }),
            };
            p.run.registry.add(desc);
        }
    }
}

/// Parse a declaration-specifier sequence: storage classes, qualifiers,
/// simple type keywords, record/enum specifiers, typedef names, attributes.
///
/// A typedef name is only consumed as a specifier while no other type
/// information has been seen; afterwards the same spelling is available as
/// a declarator name. That is the whole shadowing rule: resolution is
/// lexical, not first-match.
pub(crate) fn parse_decl_specifiers(p: &mut Parser) -> Result<DeclSpec, ParseError> {
    let loc = p.loc();
    let mut storage = Storage::None;
    let mut attrs = ParsedAttrs::default();
    let mut base: Option<TypeDesc> = None;

    let mut signed: Option<bool> = None;
    let mut longs: u8 = 0;
    let mut words: Vec<&'static str> = Vec::new();

    loop {
        let kind = p.kind().clone();
        match kind {
            TokenKind::Keyword(kw) => match kw {
                Keyword::Typedef => {
                    storage = Storage::Typedef;
                    p.advance();
                }
                Keyword::Extern => {
                    storage = Storage::Extern;
                    p.advance();
                }
                Keyword::Static => {
                    storage = Storage::Static;
                    p.advance();
                }
                Keyword::Auto | Keyword::Register | Keyword::Inline | Keyword::Extension => {
                    p.advance();
                }
                Keyword::Const | Keyword::Volatile | Keyword::Restrict => {
                    p.advance();
                }
                Keyword::Signed => {
                    signed = Some(true);
                    p.advance();
                }
                Keyword::Unsigned => {
                    signed = Some(false);
                    p.advance();
                }
                Keyword::Long => {
                    longs = longs.saturating_add(1).min(2);
                    p.advance();
                }
                Keyword::Void => {
                    words.push("void");
                    p.advance();
                }
                Keyword::Char => {
                    words.push("char");
                    p.advance();
                }
                Keyword::Short => {
                    words.push("short");
                    p.advance();
                }
                Keyword::Int => {
                    words.push("int");
                    p.advance();
                }
                Keyword::Float => {
                    words.push("float");
                    p.advance();
                }
                Keyword::Double => {
                    words.push("double");
                    p.advance();
                }
                Keyword::Bool => {
                    base = Some(TypeDesc::Special("c_bool".into()));
                    p.advance();
                }
                Keyword::Struct => {
                    p.advance();
                    base = Some(records::parse_record_specifier(p, false)?);
                }
                Keyword::Union => {
                    p.advance();
                    base = Some(records::parse_record_specifier(p, true)?);
                }
                Keyword::Enum => {
                    p.advance();
                    base = Some(records::parse_enum_specifier(p)?);
                }
                Keyword::Attribute => {
                    attrs.merge(parse_attribute_block(p)?);
                }
                Keyword::Stdcall => {
                    attrs.map.insert("stdcall".to_string(), AttrValue::Flag(true));
                    p.advance();
                }
                Keyword::Cdecl => {
                    attrs.map.insert("cdecl".to_string(), AttrValue::Flag(true));
                    p.advance();
                }
                Keyword::Asm | Keyword::Sizeof => break,
            },
            TokenKind::Identifier(name)
                if base.is_none() && words.is_empty() && signed.is_none() && longs == 0 =>
            {
                match p.run.typedef_type(&name) {
                    Some(ty) => {
                        base = Some(ty.clone());
                        p.advance();
                    }
                    None => break,
                }
            }
            _ => break,
        }
    }

    let base = match base {
        Some(ty) => ty,
        None => {
            if words.is_empty() && signed.is_none() && longs == 0 {
                return Err(p.unexpected("declaration specifier"));
            }
            make_simple(&words, signed, longs)
        }
    };

    Ok(DeclSpec {
        storage,
        base,
        attrs,
        loc,
    })
}

/// Fold accumulated simple-type keywords into one descriptor. `long` counts
/// toward the width; the base name defaults to `int`.
fn make_simple(words: &[&'static str], signed: Option<bool>, longs: u8) -> TypeDesc {
    let name = ["void", "char", "short", "float", "double", "int"]
        .iter()
        .find(|candidate| words.contains(candidate))
        .copied()
        .unwrap_or("int");
    TypeDesc::simple(name, signed.unwrap_or(true), longs)
}

/// Parse one `__attribute__((...))` block. Unknown attributes are collected
/// into the open map rather than rejected; only syntactically broken items
/// produce an (attribute, non-fatal) diagnostic.
pub(crate) fn parse_attribute_block(p: &mut Parser) -> Result<ParsedAttrs, ParseError> {
    let loc = p.loc();
    p.advance(); // __attribute__
    p.expect(TokenKind::LeftParen)?;
    p.expect(TokenKind::LeftParen)?;

    let mut attrs = ParsedAttrs::default();
    loop {
        if p.is(&TokenKind::RightParen) {
            break;
        }
        if p.accept(&TokenKind::Comma) {
            continue;
        }
        let Some(word) = attr_word(p) else {
            let diag = Diagnostic::warning(
                DiagnosticKind::Attribute,
                format!("Unrecognized attribute syntax near {:?}", p.kind().to_string()),
                loc.clone(),
            );
            p.run.diagnostics.report(diag);
            skip_attr_item(p)?;
            continue;
        };
        let word = word.trim_matches('_').to_string();

        if p.is(&TokenKind::LeftParen) {
            match word.as_str() {
                "aligned" => {
                    p.advance();
                    let expr = parse_constant_expression(p)?;
                    p.expect(TokenKind::RightParen)?;
                    attrs.aligned = Some(expr);
                }
                _ => {
                    let raw = collect_attr_args(p)?;
                    let value = match raw.parse::<i64>() {
                        Ok(n) => AttrValue::Int(n),
                        Err(_) => AttrValue::Text(raw),
                    };
                    attrs.map.insert(word, value);
                }
            }
        } else {
            match word.as_str() {
                "packed" => attrs.packed = true,
                other => {
                    attrs.map.insert(other.to_string(), AttrValue::Flag(true));
                }
            }
        }
    }

    p.expect(TokenKind::RightParen)?;
    p.expect(TokenKind::RightParen)?;
    Ok(attrs)
}

/// The word opening an attribute item; some qualifiers double as attribute
/// names (`__const__` lexes as a keyword).
fn attr_word(p: &mut Parser) -> Option<String> {
    if let Some(name) = p.accept_ident() {
        return Some(name);
    }
    let word = match p.kind() {
        TokenKind::Keyword(Keyword::Const) => "const",
        TokenKind::Keyword(Keyword::Stdcall) => "stdcall",
        TokenKind::Keyword(Keyword::Cdecl) => "cdecl",
        _ => return None,
    };
    p.advance();
    Some(word.to_string())
}

/// Collect the raw text of a parenthesized attribute argument list.
fn collect_attr_args(p: &mut Parser) -> Result<String, ParseError> {
    p.expect(TokenKind::LeftParen)?;
    let mut depth = 1usize;
    let mut parts: Vec<String> = Vec::new();
    loop {
        match p.kind() {
            TokenKind::Eof => return Err(p.unexpected(")")),
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                depth -= 1;
                if depth == 0 {
                    p.advance();
                    break;
                }
            }
            _ => {}
        }
        parts.push(p.advance().kind.to_string());
    }
    Ok(parts.iter().join(" "))
}

/// Skip one malformed attribute item up to the next `,` or closing paren.
fn skip_attr_item(p: &mut Parser) -> Result<(), ParseError> {
    let mut depth = 0usize;
    loop {
        match p.kind() {
            TokenKind::Eof => return Err(p.unexpected(")")),
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            TokenKind::Comma if depth == 0 => return Ok(()),
            _ => {}
        }
        p.advance();
    }
}

/// Attributes and `__asm__` renames after a declarator.
pub(crate) fn parse_trailing_attrs(p: &mut Parser) -> Result<ParsedAttrs, ParseError> {
    let mut attrs = ParsedAttrs::default();
    loop {
        if p.is_keyword(Keyword::Attribute) {
            attrs.merge(parse_attribute_block(p)?);
        } else if p.accept_keyword(Keyword::Asm) {
            p.skip_paren_group()?;
        } else {
            break;
        }
    }
    Ok(attrs)
}

/// Attach `packed`/`aligned` to the open attribute map the way the
/// interchange document reports them.
pub(crate) fn attrs_into_map(attrs: &ParsedAttrs) -> AttribMap {
    let mut map = attrs.map.clone();
    if attrs.packed {
        map.insert("packed".to_string(), AttrValue::Flag(true));
    }
    if let Some(aligned) = &attrs.aligned {
        let value = match aligned {
            ExprNode::Constant {
                value: ConstValue::Int(n, _),
                ..
            } => AttrValue::Int(*n),
            other => AttrValue::Text(other.render()),
        };
        map.insert("aligned".to_string(), value);
    }
    map
}
