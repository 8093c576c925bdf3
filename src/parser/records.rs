//! Struct, union and enum specifier parsing.
//!
//! Each definition emits one description; the body lives in the run's tag
//! namespace so forward and self-referential uses resolve to the same
//! object. Anonymous tags are synthesized in strictly increasing encounter
//! order per run.

use crate::descriptions::{DescKind, Description};
use crate::diagnostic::ParseError;
use crate::expr::{ConstValue, ExprNode};
use crate::lexer::{Keyword, TokenKind};
use crate::literals::IntClass;
use crate::types::{Member, TypeDesc};
use thin_vec::ThinVec;

use super::declarations::{attrs_into_map, parse_attribute_block, parse_decl_specifiers, ParsedAttrs};
use super::declarator::parse_declarator;
use super::expressions::parse_constant_expression;
use super::Parser;

/// Parse a struct/union specifier; the `struct`/`union` keyword is already
/// consumed.
pub(crate) fn parse_record_specifier(p: &mut Parser, is_union: bool) -> Result<TypeDesc, ParseError> {
    let loc = p.loc();
    let mut attrs = ParsedAttrs::default();
    while p.is_keyword(Keyword::Attribute) {
        attrs.merge(parse_attribute_block(p)?);
    }

    let tag = p.accept_ident();

    if p.is(&TokenKind::LeftBrace) {
        p.advance();
        let (tag, anonymous) = match tag {
            Some(tag) => (tag, false),
            None => (p.run.next_anon_tag(), true),
        };

        // The description exists from the definition site onward; nested
        // definitions inside the member list follow it in encounter order.
        p.run.registry.ensure_record(&tag, is_union, anonymous, &loc);
        p.run
            .registry
            .add(Description::new(tag.clone(), loc.clone(), DescKind::Struct { is_union }));

        let members = parse_member_list(p)?;
        p.expect(TokenKind::RightBrace)?;
        while p.is_keyword(Keyword::Attribute) {
            attrs.merge(parse_attribute_block(p)?);
        }

        // The effective pack alignment is snapshotted here, at the closing
        // brace, and is permanent thereafter. `packed` overrides the
        // ambient stack outright; `aligned(N)` is a separate floor.
        let pack = if attrs.packed {
            Some(1)
        } else {
            p.run.pack.current()
        };
        let attrib = attrs_into_map(&attrs);
        let record = p.run.registry.ensure_record(&tag, is_union, anonymous, &loc);
        record.members = members;
        record.opaque = false;
        record.pack = pack;
        record.aligned = attrs.aligned.clone();
        record.attrib = attrib;
        record.src = loc;

        Ok(TypeDesc::Record { tag, is_union })
    } else {
        // Forward declaration or reference by tag.
        let tag = tag.ok_or_else(|| p.unexpected("struct tag or body"))?;
        p.run.registry.ensure_record(&tag, is_union, false, &loc);
        if p.run.registry.lookup(crate::descriptions::Namespace::Tag, &tag).is_none() {
            p.run
                .registry
                .add(Description::new(tag.clone(), loc, DescKind::Struct { is_union }));
        }
        Ok(TypeDesc::Record { tag, is_union })
    }
}

fn parse_member_list(p: &mut Parser) -> Result<ThinVec<Member>, ParseError> {
    let mut members = ThinVec::new();
    loop {
        match p.kind() {
            TokenKind::RightBrace | TokenKind::Eof => break,
            TokenKind::PragmaPack(event) => {
                let event = event.clone();
                p.advance();
                p.apply_pack_event(event);
            }
            TokenKind::Semicolon => {
                p.advance();
            }
            _ => parse_member_declaration(p, &mut members)?,
        }
    }
    Ok(members)
}

fn parse_member_declaration(p: &mut Parser, out: &mut ThinVec<Member>) -> Result<(), ParseError> {
    let spec = parse_decl_specifiers(p)?;

    // `struct { ... };` with no declarator: an anonymous member.
    if p.is(&TokenKind::Semicolon) {
        p.advance();
        out.push(Member {
            name: None,
            ty: spec.base,
        });
        return Ok(());
    }

    loop {
        if p.accept(&TokenKind::Colon) {
            // Unnamed bitfield: externally nameless, kept distinct by its
            // position in the member list.
            let width = parse_constant_expression(p)?;
            out.push(Member {
                name: None,
                ty: TypeDesc::Bitfield {
                    base: Box::new(spec.base.clone()),
                    width,
                },
            });
        } else {
            let declarator = parse_declarator(p, false)?;
            let (name, ty, _attrib) = declarator.apply(spec.base.clone());
            let ty = if p.accept(&TokenKind::Colon) {
                let width = parse_constant_expression(p)?;
                TypeDesc::Bitfield {
                    base: Box::new(ty),
                    width,
                }
            } else {
                ty
            };
            let _ = super::declarations::parse_trailing_attrs(p)?;
            out.push(Member { name, ty });
        }
        if !p.accept(&TokenKind::Comma) {
            break;
        }
    }
    p.expect(TokenKind::Semicolon)
}

/// Parse an enum specifier; the `enum` keyword is already consumed. The
/// enum description precedes its enumerator constants in encounter order.
pub(crate) fn parse_enum_specifier(p: &mut Parser) -> Result<TypeDesc, ParseError> {
    let loc = p.loc();
    let mut attrs = ParsedAttrs::default();
    while p.is_keyword(Keyword::Attribute) {
        attrs.merge(parse_attribute_block(p)?);
    }

    let tag = p.accept_ident();

    if p.is(&TokenKind::LeftBrace) {
        p.advance();
        let (tag, anonymous) = match tag {
            Some(tag) => (tag, false),
            None => (p.run.next_anon_tag(), true),
        };

        p.run.registry.ensure_enum(&tag, anonymous, &loc);
        p.run
            .registry
            .add(Description::new(tag.clone(), loc.clone(), DescKind::Enum));

        let enumerators = parse_enumerator_list(p)?;
        p.expect(TokenKind::RightBrace)?;
        while p.is_keyword(Keyword::Attribute) {
            attrs.merge(parse_attribute_block(p)?);
        }

        for (name, value) in &enumerators {
            p.run.registry.add(Description::new(
                name.clone(),
                loc.clone(),
                DescKind::Constant {
                    value: value.clone(),
                },
            ));
        }

        let desc = p.run.registry.ensure_enum(&tag, anonymous, &loc);
        desc.enumerators = enumerators;
        desc.opaque = false;
        desc.src = loc;

        Ok(TypeDesc::Enum { tag })
    } else {
        let tag = tag.ok_or_else(|| p.unexpected("enum tag or body"))?;
        p.run.registry.ensure_enum(&tag, false, &loc);
        if p.run.registry.lookup(crate::descriptions::Namespace::Tag, &tag).is_none() {
            p.run
                .registry
                .add(Description::new(tag.clone(), loc, DescKind::Enum));
        }
        Ok(TypeDesc::Enum { tag })
    }
}

fn parse_enumerator_list(p: &mut Parser) -> Result<Vec<(String, ExprNode)>, ParseError> {
    let mut enumerators: Vec<(String, ExprNode)> = Vec::new();

    loop {
        if p.is(&TokenKind::RightBrace) {
            break;
        }
        let name = p.expect_ident()?;
        let value = if p.accept(&TokenKind::Equal) {
            parse_constant_expression(p)?
        } else {
            match enumerators.last() {
                // Implicit values stay symbolic: `previous + 1`, not a
                // folded literal.
                Some((previous, _)) => ExprNode::Binary {
                    op: crate::expr::BinaryOp::Add,
                    left: Box::new(ExprNode::Identifier(previous.clone())),
                    right: Box::new(ExprNode::Constant {
                        value: ConstValue::Int(1, IntClass::default()),
                        is_literal: false,
                    }),
                },
                None => ExprNode::Constant {
                    value: ConstValue::Int(0, IntClass::default()),
                    is_literal: false,
                },
            }
        };
        enumerators.push((name, value));

        if !p.accept(&TokenKind::Comma) {
            break;
        }
    }

    Ok(enumerators)
}
