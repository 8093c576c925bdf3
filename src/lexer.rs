//! Token/macro source over preprocessed C text.
//!
//! Recovers presumed (file, line) coordinates from line markers, captures
//! every `#define` verbatim so macros can later be parsed as standalone
//! expressions, and turns `#pragma pack` directives into in-stream events
//! the parser applies in source order.

use crate::source::SrcLoc;
use serde::Serialize;
use std::fmt;

/// C declaration keywords, including the GNU spellings the grammar folds
/// into their standard forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Keyword {
    Struct,
    Union,
    Enum,
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
    Inline,
    Const,
    Volatile,
    Restrict,
    Signed,
    Unsigned,
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    Sizeof,
    Attribute,
    Extension,
    Asm,
    Stdcall,
    Cdecl,
}

fn classify_keyword(word: &str) -> Option<Keyword> {
    let kw = match word {
        "struct" => Keyword::Struct,
        "union" => Keyword::Union,
        "enum" => Keyword::Enum,
        "typedef" => Keyword::Typedef,
        "extern" => Keyword::Extern,
        "static" => Keyword::Static,
        "auto" => Keyword::Auto,
        "register" => Keyword::Register,
        "inline" | "__inline" | "__inline__" => Keyword::Inline,
        "const" | "__const" => Keyword::Const,
        "volatile" | "__volatile__" => Keyword::Volatile,
        "restrict" | "__restrict" | "__restrict__" => Keyword::Restrict,
        "signed" | "__signed__" => Keyword::Signed,
        "unsigned" => Keyword::Unsigned,
        "void" => Keyword::Void,
        "char" => Keyword::Char,
        "short" => Keyword::Short,
        "int" => Keyword::Int,
        "long" => Keyword::Long,
        "float" => Keyword::Float,
        "double" => Keyword::Double,
        "_Bool" => Keyword::Bool,
        "sizeof" => Keyword::Sizeof,
        "__attribute__" | "__attribute" => Keyword::Attribute,
        "__extension__" => Keyword::Extension,
        "__asm__" | "__asm" | "asm" => Keyword::Asm,
        "__stdcall__" | "__stdcall" => Keyword::Stdcall,
        "__cdecl__" | "__cdecl" => Keyword::Cdecl,
        _ => return None,
    };
    Some(kw)
}

/// A `#pragma pack` directive, delivered in stream order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PackEvent {
    Push { name: Option<String>, align: Option<u32> },
    Pop { name: Option<String> },
    Set(Option<u32>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),
    /// Numeric literal, raw text; decoded by the expression layer.
    Number(String),
    /// String literal, raw text including prefix and quotes.
    StringLit(String),
    /// Character constant, raw text including prefix and quotes.
    CharLit(String),
    PragmaPack(PackEvent),
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Colon,
    Comma,
    Ellipsis,
    Dot,
    Arrow,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Equal,
    EqualEqual,
    BangEqual,
    Bang,
    Tilde,
    Ampersand,
    AmpersandAmpersand,
    Pipe,
    PipePipe,
    Caret,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    LessThanLessThan,
    GreaterThanGreaterThan,
    Question,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Keyword(k) => write!(f, "{:?}", k),
            TokenKind::Number(s) => write!(f, "{}", s),
            TokenKind::StringLit(s) => write!(f, "{}", s),
            TokenKind::CharLit(s) => write!(f, "{}", s),
            TokenKind::PragmaPack(_) => write!(f, "#pragma pack"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::BangEqual => write!(f, "!="),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::AmpersandAmpersand => write!(f, "&&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::LessThan => write!(f, "<"),
            TokenKind::GreaterThan => write!(f, ">"),
            TokenKind::LessThanEqual => write!(f, "<="),
            TokenKind::GreaterThanEqual => write!(f, ">="),
            TokenKind::LessThanLessThan => write!(f, "<<"),
            TokenKind::GreaterThanGreaterThan => write!(f, ">>"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Eof => write!(f, ""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SrcLoc,
}

/// Verbatim capture of one `#define`: name, parameter list if function-like,
/// unexpanded replacement text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroDef {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub body: String,
    pub loc: SrcLoc,
}

/// `#define` / `#undef` directives in source order. Order matters: an
/// `#undef` only cancels definitions that precede it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MacroEvent {
    Define(MacroDef),
    Undef(String, SrcLoc),
}

/// Everything the lexer recovers from one input.
#[derive(Debug, Default)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub events: Vec<MacroEvent>,
}

pub struct Lexer {
    text: String,
    file: String,
    line: u32,
    in_block_comment: bool,
    out: LexOutput,
}

impl Lexer {
    pub fn new(text: impl Into<String>, file: impl Into<String>) -> Self {
        Lexer {
            text: text.into(),
            file: file.into(),
            line: 1,
            in_block_comment: false,
            out: LexOutput::default(),
        }
    }

    /// Build a lexer from raw bytes; undecodable sequences become U+FFFD
    /// instead of aborting the run.
    pub fn from_bytes(bytes: &[u8], file: impl Into<String>) -> Self {
        Lexer::new(String::from_utf8_lossy(bytes).into_owned(), file)
    }

    fn loc(&self) -> SrcLoc {
        SrcLoc::new(self.file.clone(), self.line)
    }

    pub fn tokenize(mut self) -> LexOutput {
        let text = std::mem::take(&mut self.text);
        let mut lines = text.split('\n').peekable();

        while let Some(first) = lines.next() {
            // Join backslash-continued physical lines into one logical line.
            let mut logical = first.to_string();
            let mut physical = 1u32;
            while logical.ends_with('\\') {
                logical.pop();
                match lines.next() {
                    Some(next) => {
                        logical.push(' ');
                        logical.push_str(next);
                        physical += 1;
                    }
                    None => break,
                }
            }

            let trimmed = logical.trim_start();
            if !self.in_block_comment && trimmed.starts_with('#') {
                let consumed_marker = self.handle_directive(trimmed);
                if consumed_marker {
                    // A line marker names the line number of the line that
                    // follows it; skip the normal increment.
                    continue;
                }
            } else {
                self.scan_line(&logical);
            }
            self.line += physical;
        }

        let eof_loc = self.loc();
        self.out.tokens.push(Token {
            kind: TokenKind::Eof,
            loc: eof_loc,
        });
        self.out
    }

    /// Handle a `#...` directive line. Returns true when the directive was a
    /// line marker that re-seats the current position.
    fn handle_directive(&mut self, line: &str) -> bool {
        let rest = line[1..].trim_start();

        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            return self.handle_line_marker(rest);
        }
        if let Some(rest) = rest.strip_prefix("line") {
            return self.handle_line_marker(rest.trim_start());
        }
        if let Some(rest) = rest.strip_prefix("define") {
            self.handle_define(rest.trim_start());
            return false;
        }
        if let Some(rest) = rest.strip_prefix("undef") {
            let name: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                let loc = self.loc();
                self.out.events.push(MacroEvent::Undef(name, loc));
            }
            return false;
        }
        if let Some(rest) = rest.strip_prefix("pragma") {
            self.handle_pragma(rest.trim_start());
            return false;
        }
        // Other directives (#ident, #warning survivors, ...) carry nothing
        // we need.
        false
    }

    fn handle_line_marker(&mut self, rest: &str) -> bool {
        let mut parts = rest.splitn(2, |c: char| !c.is_ascii_digit());
        let Some(digits) = parts.next() else {
            return false;
        };
        let Ok(line) = digits.parse::<u32>() else {
            return false;
        };
        self.line = line;
        if let Some(start) = rest.find('"') {
            if let Some(len) = rest[start + 1..].find('"') {
                self.file = rest[start + 1..start + 1 + len].to_string();
            }
        }
        true
    }

    fn handle_define(&mut self, rest: &str) {
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return;
        }
        let name = rest[..name_len].to_string();
        let after = &rest[name_len..];

        // Function-like only when the paren hugs the name.
        if let Some(params_on) = after.strip_prefix('(') {
            let Some(close) = params_on.find(')') else {
                return;
            };
            let params: Vec<String> = params_on[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let body = params_on[close + 1..].trim().to_string();
            let loc = self.loc();
            self.out.events.push(MacroEvent::Define(MacroDef {
                name,
                params: Some(params),
                body,
                loc,
            }));
        } else {
            let body = after.trim().to_string();
            let loc = self.loc();
            self.out.events.push(MacroEvent::Define(MacroDef {
                name,
                params: None,
                body,
                loc,
            }));
        }
    }

    fn handle_pragma(&mut self, rest: &str) {
        let Some(args) = rest.strip_prefix("pack") else {
            return;
        };
        let args = args.trim_start();
        let Some(inner) = args.strip_prefix('(').and_then(|a| a.strip_suffix(')')) else {
            return;
        };
        let fields: Vec<&str> = inner
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();

        let event = match fields.split_first() {
            None => PackEvent::Set(None),
            Some((&"push", rest)) => {
                let mut name = None;
                let mut align = None;
                for field in rest {
                    match field.parse::<u32>() {
                        Ok(n) => align = Some(n),
                        Err(_) => name = Some(field.to_string()),
                    }
                }
                PackEvent::Push { name, align }
            }
            Some((&"pop", rest)) => PackEvent::Pop {
                name: rest.first().map(|s| s.to_string()),
            },
            Some((first, _)) => match first.parse::<u32>() {
                Ok(n) => PackEvent::Set(Some(n)),
                Err(_) => return,
            },
        };
        let loc = self.loc();
        self.out.tokens.push(Token {
            kind: TokenKind::PragmaPack(event),
            loc,
        });
    }

    fn scan_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0usize;

        while i < bytes.len() {
            if self.in_block_comment {
                match line[i..].find("*/") {
                    Some(end) => {
                        self.in_block_comment = false;
                        i += end + 2;
                        continue;
                    }
                    None => return,
                }
            }

            let c = line[i..].chars().next().unwrap_or('\0');
            if c.is_whitespace() {
                i += c.len_utf8();
                continue;
            }
            if line[i..].starts_with("//") {
                return;
            }
            if line[i..].starts_with("/*") {
                self.in_block_comment = true;
                i += 2;
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' {
                let start = i;
                while i < bytes.len() {
                    let c = line[i..].chars().next().unwrap_or('\0');
                    if c.is_alphanumeric() || c == '_' {
                        i += c.len_utf8();
                    } else {
                        break;
                    }
                }
                let word = &line[start..i];
                // L"..." / u'...' style literals: the word is a prefix.
                if matches!(word, "L" | "u" | "U" | "u8") {
                    if let Some(next) = line[i..].chars().next() {
                        if next == '"' || next == '\'' {
                            i = self.scan_quoted(line, start, i, next);
                            continue;
                        }
                    }
                }
                let kind = match classify_keyword(word) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Identifier(word.to_string()),
                };
                self.push_token(kind);
                continue;
            }

            if c.is_ascii_digit() || (c == '.' && line[i + 1..].starts_with(|c: char| c.is_ascii_digit())) {
                let start = i;
                let mut prev = '\0';
                while i < bytes.len() {
                    let c = line[i..].chars().next().unwrap_or('\0');
                    let is_exp_sign =
                        (c == '+' || c == '-') && matches!(prev, 'e' | 'E' | 'p' | 'P');
                    if c.is_alphanumeric() || c == '.' || c == '_' || is_exp_sign {
                        prev = c;
                        i += c.len_utf8();
                    } else {
                        break;
                    }
                }
                self.push_token(TokenKind::Number(line[start..i].to_string()));
                continue;
            }

            if c == '"' || c == '\'' {
                i = self.scan_quoted(line, i, i, c);
                continue;
            }

            let (kind, len) = self.scan_punct(&line[i..]);
            match kind {
                Some(kind) => {
                    self.push_token(kind);
                    i += len;
                }
                None => {
                    // Unknown byte: skip it; the parser reports anything it
                    // actually needed.
                    i += c.len_utf8();
                }
            }
        }
    }

    /// Scan a quoted literal beginning at `quote_at` with quote char `q`;
    /// `start` marks where the (possible) prefix began. Returns the index
    /// just past the closing quote.
    fn scan_quoted(&mut self, line: &str, start: usize, quote_at: usize, q: char) -> usize {
        let mut i = quote_at + 1;
        let bytes = line.as_bytes();
        while i < bytes.len() {
            let c = line[i..].chars().next().unwrap_or('\0');
            if c == '\\' {
                i += 1;
                if let Some(escaped) = line[i..].chars().next() {
                    i += escaped.len_utf8();
                }
                continue;
            }
            i += c.len_utf8();
            if c == q {
                break;
            }
        }
        let raw = line[start..i].to_string();
        let kind = if q == '"' {
            TokenKind::StringLit(raw)
        } else {
            TokenKind::CharLit(raw)
        };
        self.push_token(kind);
        i
    }

    fn scan_punct(&self, rest: &str) -> (Option<TokenKind>, usize) {
        let three = rest.get(..3);
        if three == Some("...") {
            return (Some(TokenKind::Ellipsis), 3);
        }
        if let Some(two) = rest.get(..2) {
            let kind = match two {
                "->" => Some(TokenKind::Arrow),
                "==" => Some(TokenKind::EqualEqual),
                "!=" => Some(TokenKind::BangEqual),
                "<=" => Some(TokenKind::LessThanEqual),
                ">=" => Some(TokenKind::GreaterThanEqual),
                "<<" => Some(TokenKind::LessThanLessThan),
                ">>" => Some(TokenKind::GreaterThanGreaterThan),
                "&&" => Some(TokenKind::AmpersandAmpersand),
                "||" => Some(TokenKind::PipePipe),
                _ => None,
            };
            if kind.is_some() {
                return (kind, 2);
            }
        }
        let kind = match rest.chars().next() {
            Some('(') => Some(TokenKind::LeftParen),
            Some(')') => Some(TokenKind::RightParen),
            Some('{') => Some(TokenKind::LeftBrace),
            Some('}') => Some(TokenKind::RightBrace),
            Some('[') => Some(TokenKind::LeftBracket),
            Some(']') => Some(TokenKind::RightBracket),
            Some(';') => Some(TokenKind::Semicolon),
            Some(':') => Some(TokenKind::Colon),
            Some(',') => Some(TokenKind::Comma),
            Some('.') => Some(TokenKind::Dot),
            Some('*') => Some(TokenKind::Star),
            Some('+') => Some(TokenKind::Plus),
            Some('-') => Some(TokenKind::Minus),
            Some('/') => Some(TokenKind::Slash),
            Some('%') => Some(TokenKind::Percent),
            Some('=') => Some(TokenKind::Equal),
            Some('!') => Some(TokenKind::Bang),
            Some('~') => Some(TokenKind::Tilde),
            Some('&') => Some(TokenKind::Ampersand),
            Some('|') => Some(TokenKind::Pipe),
            Some('^') => Some(TokenKind::Caret),
            Some('<') => Some(TokenKind::LessThan),
            Some('>') => Some(TokenKind::GreaterThan),
            Some('?') => Some(TokenKind::Question),
            _ => None,
        };
        (kind, 1)
    }

    fn push_token(&mut self, kind: TokenKind) {
        let loc = self.loc();
        self.out.tokens.push(Token { kind, loc });
    }
}
