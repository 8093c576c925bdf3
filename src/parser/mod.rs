//! Pragmatic C89/C99 declaration grammar with common GNU extensions.
//!
//! The parser recovers one description per top-level declaration plus one
//! per struct/union/enum definition. Unparsable declarations are recovered
//! locally: a diagnostic is recorded and parsing resumes at the next
//! declaration boundary.

use crate::diagnostic::ParseError;
use crate::lexer::{Keyword, PackEvent, Token, TokenKind};
use crate::source::SrcLoc;
use crate::Run;
use log::debug;

pub mod declarations;
pub mod declarator;
pub mod expressions;
pub mod macros;
pub mod records;

#[cfg(test)]
mod tests_parser;

pub struct Parser<'run> {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) run: &'run mut Run,
}

impl<'run> Parser<'run> {
    pub fn new(tokens: Vec<Token>, run: &'run mut Run) -> Self {
        Parser {
            tokens,
            pos: 0,
            run,
        }
    }

    /// Parse every top-level declaration in the token stream.
    pub fn parse_translation_unit(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::PragmaPack(event) => {
                    let event = event.clone();
                    self.advance();
                    self.apply_pack_event(event);
                }
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => {
                    let start = self.pos;
                    if let Err(error) = declarations::parse_declaration(self) {
                        debug!("declaration stub at {}: {}", error.location(), error);
                        self.run.diagnostics.report_parse_error(error);
                        self.recover_to_boundary(start);
                    }
                }
            }
        }
    }

    pub(crate) fn apply_pack_event(&mut self, event: PackEvent) {
        match event {
            PackEvent::Push { name, align } => self.run.pack.push(name, align),
            PackEvent::Pop { name } => self.run.pack.pop(name.as_deref()),
            PackEvent::Set(align) => self.run.pack.set(align),
        }
    }

    /// Skip to the next declaration boundary: a `;` at brace depth zero, or
    /// the end of a brace group.
    fn recover_to_boundary(&mut self, start: usize) {
        if self.pos == start {
            self.advance();
        }
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::LeftBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RightBrace => {
                    self.advance();
                    if depth <= 1 {
                        self.accept(&TokenKind::Semicolon);
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // --- cursor helpers ----------------------------------------------------

    pub(crate) fn current(&self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    pub(crate) fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    pub(crate) fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let index = (self.pos + ahead).min(self.tokens.len().saturating_sub(1));
        &self.tokens[index].kind
    }

    pub(crate) fn loc(&self) -> SrcLoc {
        self.current().loc.clone()
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn is(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.is(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.accept(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    pub(crate) fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self.kind(), TokenKind::Keyword(k) if *k == kw)
    }

    pub(crate) fn accept_keyword(&mut self, kw: Keyword) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn accept_ident(&mut self) -> Option<String> {
        if let TokenKind::Identifier(name) = self.kind() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, ParseError> {
        self.accept_ident()
            .ok_or_else(|| self.unexpected("identifier"))
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        match self.kind() {
            TokenKind::Eof => ParseError::UnexpectedEof { location: self.loc() },
            found => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
                location: self.loc(),
            },
        }
    }

    pub(crate) fn syntax_error(&self, message: impl Into<String>) -> ParseError {
        ParseError::SyntaxError {
            message: message.into(),
            location: self.loc(),
        }
    }

    /// Skip a balanced paren group; the opening paren is the current token.
    pub(crate) fn skip_paren_group(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.kind() {
                TokenKind::Eof => return Err(self.unexpected(")")),
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    /// Skip a balanced brace group; the opening brace is the current token.
    pub(crate) fn skip_brace_group(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::LeftBrace)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.kind() {
                TokenKind::Eof => return Err(self.unexpected("}")),
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }
}
