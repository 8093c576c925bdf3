//! Constant-expression parsing: a Pratt parser over the token stream that
//! builds [`ExprNode`] trees.

use crate::diagnostic::ParseError;
use crate::expr::{BinaryOp, ConstValue, ExprNode, UnaryOp};
use crate::lexer::{Keyword, TokenKind};
use crate::literals;
use itertools::Itertools;
use log::trace;

use super::Parser;

/// Binding power for operator precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct BindingPower(u8);

impl BindingPower {
    pub const CONDITIONAL: Self = Self(3);
    pub const LOGICAL_OR: Self = Self(4);
    pub const LOGICAL_AND: Self = Self(5);
    pub const BITWISE_OR: Self = Self(6);
    pub const BITWISE_XOR: Self = Self(7);
    pub const BITWISE_AND: Self = Self(8);
    pub const EQUALITY: Self = Self(9);
    pub const RELATIONAL: Self = Self(10);
    pub const SHIFT: Self = Self(11);
    pub const ADDITIVE: Self = Self(12);
    pub const MULTIPLICATIVE: Self = Self(13);

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

fn infix_binding(kind: &TokenKind) -> Option<(BindingPower, BinaryOp)> {
    let info = match kind {
        TokenKind::PipePipe => (BindingPower::LOGICAL_OR, BinaryOp::LogicalOr),
        TokenKind::AmpersandAmpersand => (BindingPower::LOGICAL_AND, BinaryOp::LogicalAnd),
        TokenKind::Pipe => (BindingPower::BITWISE_OR, BinaryOp::BitOr),
        TokenKind::Caret => (BindingPower::BITWISE_XOR, BinaryOp::BitXor),
        TokenKind::Ampersand => (BindingPower::BITWISE_AND, BinaryOp::BitAnd),
        TokenKind::EqualEqual => (BindingPower::EQUALITY, BinaryOp::Eq),
        TokenKind::BangEqual => (BindingPower::EQUALITY, BinaryOp::Ne),
        TokenKind::LessThan => (BindingPower::RELATIONAL, BinaryOp::Lt),
        TokenKind::GreaterThan => (BindingPower::RELATIONAL, BinaryOp::Gt),
        TokenKind::LessThanEqual => (BindingPower::RELATIONAL, BinaryOp::Le),
        TokenKind::GreaterThanEqual => (BindingPower::RELATIONAL, BinaryOp::Ge),
        TokenKind::LessThanLessThan => (BindingPower::SHIFT, BinaryOp::Shl),
        TokenKind::GreaterThanGreaterThan => (BindingPower::SHIFT, BinaryOp::Shr),
        TokenKind::Plus => (BindingPower::ADDITIVE, BinaryOp::Add),
        TokenKind::Minus => (BindingPower::ADDITIVE, BinaryOp::Sub),
        TokenKind::Star => (BindingPower::MULTIPLICATIVE, BinaryOp::Mul),
        TokenKind::Slash => (BindingPower::MULTIPLICATIVE, BinaryOp::Div),
        TokenKind::Percent => (BindingPower::MULTIPLICATIVE, BinaryOp::Mod),
        _ => return None,
    };
    Some(info)
}

/// Entry point for constant-expression contexts (array bounds, bitfield
/// widths, enumerator values, macro bodies). The comma operator is not part
/// of this grammar.
pub(crate) fn parse_constant_expression(p: &mut Parser) -> Result<ExprNode, ParseError> {
    parse_expression(p, BindingPower::CONDITIONAL)
}

pub(crate) fn parse_expression(
    p: &mut Parser,
    min_binding_power: BindingPower,
) -> Result<ExprNode, ParseError> {
    let mut left = parse_prefix(p)?;

    loop {
        if p.is(&TokenKind::Question) {
            if BindingPower::CONDITIONAL < min_binding_power {
                break;
            }
            p.advance();
            let then = parse_expression(p, BindingPower::CONDITIONAL)?;
            p.expect(TokenKind::Colon)?;
            // Right-associative: the else branch re-enters at the same level.
            let otherwise = parse_expression(p, BindingPower::CONDITIONAL)?;
            left = ExprNode::Conditional {
                cond: Box::new(left),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            };
            continue;
        }

        let Some((binding_power, op)) = infix_binding(p.kind()) else {
            break;
        };
        if binding_power < min_binding_power {
            break;
        }
        trace!("infix {:?} at {}", op, p.loc());
        p.advance();
        let right = parse_expression(p, binding_power.next())?;
        left = ExprNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }

    Ok(left)
}

fn parse_prefix(p: &mut Parser) -> Result<ExprNode, ParseError> {
    let loc = p.loc();
    match p.kind().clone() {
        TokenKind::Number(text) => {
            p.advance();
            if let Some((value, class)) = literals::parse_int_literal(&text) {
                return Ok(ExprNode::Constant {
                    value: ConstValue::Int(value, class),
                    is_literal: false,
                });
            }
            if let Some((value, class)) = literals::parse_float_literal(&text) {
                return Ok(ExprNode::Constant {
                    value: ConstValue::Float(value, class),
                    is_literal: false,
                });
            }
            Err(ParseError::InvalidIntegerConstant {
                text,
                location: loc,
            })
        }
        TokenKind::CharLit(raw) => {
            p.advance();
            match literals::parse_char_constant(&raw) {
                Some(c) => Ok(ExprNode::CharLiteral(c)),
                None => Err(ParseError::SyntaxError {
                    message: format!("Invalid character constant {}", raw),
                    location: loc,
                }),
            }
        }
        TokenKind::StringLit(raw) => {
            p.advance();
            let mut content = literals::parse_string_literal(&raw).ok_or_else(|| {
                ParseError::SyntaxError {
                    message: format!("Invalid string literal {}", raw),
                    location: loc.clone(),
                }
            })?;
            // Adjacent string literals concatenate.
            while let TokenKind::StringLit(next) = p.kind().clone() {
                p.advance();
                content.push_str(&literals::parse_string_literal(&next).unwrap_or_default());
            }
            Ok(ExprNode::StringLiteral(content))
        }
        TokenKind::Identifier(name) => {
            p.advance();
            if p.accept(&TokenKind::LeftParen) {
                let mut args = Vec::new();
                if !p.is(&TokenKind::RightParen) {
                    loop {
                        args.push(parse_expression(p, BindingPower::CONDITIONAL)?);
                        if !p.accept(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                p.expect(TokenKind::RightParen)?;
                return Ok(ExprNode::Call { callee: name, args });
            }
            Ok(ExprNode::Identifier(name))
        }
        TokenKind::Keyword(Keyword::Sizeof) => {
            p.advance();
            // The operand is carried as text: sizeof is never a
            // compile-time constant for this pipeline, but it must survive
            // re-rendering.
            if p.is(&TokenKind::LeftParen) {
                let text = collect_group_text(p)?;
                return Ok(ExprNode::Call {
                    callee: "sizeof".to_string(),
                    args: vec![ExprNode::Identifier(text)],
                });
            }
            let operand = parse_prefix(p)?;
            Ok(ExprNode::Call {
                callee: "sizeof".to_string(),
                args: vec![operand],
            })
        }
        TokenKind::Minus => {
            p.advance();
            Ok(unary(UnaryOp::Neg, parse_prefix(p)?))
        }
        TokenKind::Plus => {
            p.advance();
            Ok(unary(UnaryOp::Pos, parse_prefix(p)?))
        }
        TokenKind::Bang => {
            p.advance();
            Ok(unary(UnaryOp::LogicalNot, parse_prefix(p)?))
        }
        TokenKind::Tilde => {
            p.advance();
            Ok(unary(UnaryOp::BitNot, parse_prefix(p)?))
        }
        TokenKind::LeftParen => {
            p.advance();
            let inner = parse_expression(p, BindingPower::CONDITIONAL)?;
            p.expect(TokenKind::RightParen)?;
            Ok(inner)
        }
        _ => Err(p.unexpected("expression")),
    }
}

fn unary(op: UnaryOp, operand: ExprNode) -> ExprNode {
    ExprNode::Unary {
        op,
        operand: Box::new(operand),
    }
}

/// Raw text of a balanced paren group, without the outer parens.
fn collect_group_text(p: &mut Parser) -> Result<String, ParseError> {
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
