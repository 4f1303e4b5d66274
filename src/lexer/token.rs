//! # Token Types
//!
//! CASL II tokens are generic: a mnemonic and a label both lex as
//! `Identifier`, and the instruction table (`crate::isa`) is what later
//! decides whether a given identifier names a known mnemonic. This mirrors
//! how the effective-address decoder works from the opcode alone rather
//! than from which mnemonic produced it — text never drives classification
//! twice.
//!
//! Each token contains:
//! - `kind`: the token type (identifier, register, literal, punctuation)
//! - `lexeme`: the original text from source code
//! - `span`: line/column for error reporting

use crate::error::Span;

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

/// Token kinds for CASL II source lines.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Label or mnemonic; case is preserved as written.
    Identifier(String),
    /// GR0..GR7.
    Register(u8),
    /// Decimal integer, optionally signed (`10`, `-5`, `+5`).
    Decimal(i32),
    /// `#hhhh` hex literal, unsigned 16-bit.
    Hex(u16),
    /// `'...'` with `''` as an escaped single quote. Stored with the
    /// surrounding quotes intact (only the doubled-quote escape is
    /// resolved) so later stages can tell a quoted string apart from a
    /// bare label by its first byte, the way the source text does.
    QuotedString(String),

    Comma,
    Equals,
    Comment(String),
    Newline,
    Eof,
}

impl TokenKind {
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            TokenKind::Identifier(s) => Some(s),
            _ => None,
        }
    }
}
