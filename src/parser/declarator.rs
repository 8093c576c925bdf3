//! C declarator parsing: pointers, arrays, function parameter lists,
//! nested grouping. Types are assembled inside-out from the declarator
//! structure.

use crate::diagnostic::ParseError;
use crate::expr::ExprNode;
use crate::lexer::{Keyword, TokenKind};
use crate::types::{AttrValue, AttribMap, FuncArg, Qualifiers, TypeDesc};
use thin_vec::ThinVec;

use super::declarations::{parse_attribute_block, parse_decl_specifiers};
use super::expressions::parse_constant_expression;
use super::Parser;

#[derive(Debug)]
pub(crate) struct Declarator {
    pub name: Option<String>,
    pointers: Vec<Qualifiers>,
    suffixes: Vec<Suffix>,
    inner: Option<Box<Declarator>>,
    pub attrib: AttribMap,
}

#[derive(Debug)]
enum Suffix {
    Array(Option<ExprNode>),
    Func {
        args: ThinVec<FuncArg>,
        variadic: bool,
    },
}

impl Declarator {
    /// Wrap `base` according to the declarator: pointer layers first, then
    /// array/function suffixes, then the nested declarator (if any) around
    /// the result.
    pub fn apply(self, base: TypeDesc) -> (Option<String>, TypeDesc, AttribMap) {
        let mut ty = base;
        for qualifiers in self.pointers {
            ty = TypeDesc::Pointer {
                destination: Box::new(ty),
                qualifiers,
            };
        }
        for suffix in self.suffixes {
            ty = match suffix {
                Suffix::Array(count) => TypeDesc::Array {
                    element: Box::new(ty),
                    count,
                },
                Suffix::Func { args, variadic } => TypeDesc::Function {
                    ret: Box::new(ty),
                    args,
                    variadic,
                },
            };
        }
        match self.inner {
            Some(inner) => {
                let (name, ty, mut attrib) = inner.apply(ty);
                attrib.extend(self.attrib);
                (name, ty, attrib)
            }
            None => (self.name, ty, self.attrib),
        }
    }
}

/// Parse a (possibly abstract) declarator. With `abstract_ok` the name may
/// be absent, as in function parameter positions.
pub(crate) fn parse_declarator(p: &mut Parser, abstract_ok: bool) -> Result<Declarator, ParseError> {
    let mut pointers = Vec::new();
    let mut attrib = AttribMap::new();

    loop {
        if p.accept(&TokenKind::Star) {
            let mut qualifiers = Qualifiers::empty();
            loop {
                if p.accept_keyword(Keyword::Const) {
                    qualifiers |= Qualifiers::CONST;
                } else if p.accept_keyword(Keyword::Volatile) {
                    qualifiers |= Qualifiers::VOLATILE;
                } else if p.accept_keyword(Keyword::Restrict) {
                    qualifiers |= Qualifiers::RESTRICT;
                } else {
                    break;
                }
            }
            pointers.push(qualifiers);
        } else if p.accept_keyword(Keyword::Stdcall) {
            attrib.insert("stdcall".to_string(), AttrValue::Flag(true));
        } else if p.accept_keyword(Keyword::Cdecl) {
            attrib.insert("cdecl".to_string(), AttrValue::Flag(true));
        } else if p.is_keyword(Keyword::Attribute) {
            let attrs = parse_attribute_block(p)?;
            attrib.extend(super::declarations::attrs_into_map(&attrs));
        } else {
            break;
        }
    }

    let mut inner = None;
    let mut name = None;
    if p.is(&TokenKind::LeftParen) && starts_nested_declarator(p) {
        p.advance();
        inner = Some(Box::new(parse_declarator(p, abstract_ok)?));
        p.expect(TokenKind::RightParen)?;
    } else if let Some(ident) = p.accept_ident() {
        name = Some(ident);
    } else if !abstract_ok {
        return Err(p.unexpected("declarator"));
    }

    let mut suffixes = Vec::new();
    loop {
        if p.accept(&TokenKind::LeftBracket) {
            if p.accept(&TokenKind::RightBracket) {
                suffixes.push(Suffix::Array(None));
            } else {
                let count = parse_constant_expression(p)?;
                p.expect(TokenKind::RightBracket)?;
                suffixes.push(Suffix::Array(Some(count)));
            }
        } else if p.is(&TokenKind::LeftParen) {
            p.advance();
            let (args, variadic) = parse_param_list(p)?;
            p.expect(TokenKind::RightParen)?;
            suffixes.push(Suffix::Func { args, variadic });
        } else {
            break;
        }
    }

    Ok(Declarator {
        name,
        pointers,
        suffixes,
        inner,
        attrib,
    })
}

/// Decide whether a `(` in direct-declarator position opens a nested
/// declarator or a parameter list: a following `*`, `(`, calling-convention
/// keyword or non-typedef identifier means nesting.
fn starts_nested_declarator(p: &Parser) -> bool {
    match p.peek_kind(1) {
        TokenKind::Star | TokenKind::LeftParen => true,
        TokenKind::Keyword(Keyword::Stdcall) | TokenKind::Keyword(Keyword::Cdecl) => true,
        TokenKind::Identifier(name) => p.run.typedef_type(name).is_none(),
        _ => false,
    }
}

fn parse_param_list(p: &mut Parser) -> Result<(ThinVec<FuncArg>, bool), ParseError> {
    let mut args = ThinVec::new();
    let mut variadic = false;

    if p.is(&TokenKind::RightParen) {
        return Ok((args, variadic));
    }
    // `(void)` means no parameters.
    if p.is_keyword(Keyword::Void) && p.peek_kind(1) == &TokenKind::RightParen {
        p.advance();
        return Ok((args, variadic));
    }

    loop {
        if p.accept(&TokenKind::Ellipsis) {
            variadic = true;
            break;
        }
        let spec = parse_decl_specifiers(p)?;
        let declarator = parse_declarator(p, true)?;
        let (name, ty, _attrib) = declarator.apply(spec.base);
        args.push(FuncArg { name, ty });
        if !p.accept(&TokenKind::Comma) {
            break;
        }
    }
    Ok((args, variadic))
}
