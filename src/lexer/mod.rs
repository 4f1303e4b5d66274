//! # CASL II Lexer
//!
//! Tokenizes CASL II assembly source into a token stream, grouped by line.
//!
//! ## Features
//!
//! - **Numeric literals**: decimal (`10`, `-5`, `+5`) and 16-bit hex (`#00FF`)
//! - **String literals**: single-quoted, `''` is an escaped single quote
//! - **Comments**: `;` to end of line
//! - **Registers**: `GR0`..`GR7`, recognized only when not followed by another
//!   identifier character
//! - **Leading whitespace**: reported per line, because it decides whether the
//!   line parser expects a label or a mnemonic first (see `crate::parser`)

pub mod cursor;
pub mod token;

#[cfg(test)]
mod tests;

use crate::error::{AsmError, ErrorKind};
use cursor::Cursor;
use token::{Token, TokenKind};

/// All tokens belonging to one physical source line, plus whether the line
/// began with whitespace before its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct LexedLine {
    pub line_number: usize,
    pub leading_whitespace: bool,
    pub tokens: Vec<Token>,
}

pub struct LexResult {
    pub lines: Vec<LexedLine>,
    pub errors: Vec<AsmError>,
}

#[must_use]
pub fn tokenize(source: &str) -> LexResult {
    let mut cursor = Cursor::new(source);
    let mut lines = Vec::new();
    let mut errors = Vec::new();

    let mut line_number = 1;
    let mut leading_whitespace = false;
    let mut leading_whitespace_known = false;
    let mut current_tokens: Vec<Token> = Vec::new();

    while !cursor.is_at_end() {
        if !leading_whitespace_known {
            leading_whitespace = matches!(cursor.peek(), Some(' ' | '\t'));
            leading_whitespace_known = true;
        }

        match lex_token(&mut cursor) {
            Ok(Some(token)) => match token.kind {
                TokenKind::Newline => {
                    lines.push(LexedLine {
                        line_number,
                        leading_whitespace,
                        tokens: std::mem::take(&mut current_tokens),
                    });
                    line_number += 1;
                    leading_whitespace = false;
                    leading_whitespace_known = false;
                }
                TokenKind::Comment(_) => {}
                _ => current_tokens.push(token),
            },
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }

    if !current_tokens.is_empty() || leading_whitespace_known {
        lines.push(LexedLine {
            line_number,
            leading_whitespace,
            tokens: current_tokens,
        });
    }

    LexResult { lines, errors }
}

fn lex_token(cursor: &mut Cursor) -> Result<Option<Token>, AsmError> {
    while matches!(cursor.peek(), Some(' ' | '\t')) {
        cursor.advance();
    }

    if cursor.is_at_end() {
        return Ok(None);
    }

    let (sl, sc) = cursor.current_pos();
    let ch = cursor.peek().unwrap();

    match ch {
        '\n' | '\r' => lex_newline(cursor, sl, sc),
        ';' => lex_comment(cursor, sl, sc),
        ',' => {
            cursor.advance();
            Ok(Some(Token { kind: TokenKind::Comma, lexeme: ",".into(), span: cursor.make_span(sl, sc) }))
        }
        '=' => {
            cursor.advance();
            Ok(Some(Token { kind: TokenKind::Equals, lexeme: "=".into(), span: cursor.make_span(sl, sc) }))
        }
        '\'' => lex_string(cursor, sl, sc),
        '#' => lex_hex(cursor, sl, sc),
        c if c.is_ascii_digit() || ((c == '+' || c == '-') && matches!(cursor.peek_next(), Some(d) if d.is_ascii_digit())) => {
            lex_decimal(cursor, sl, sc)
        }
        c if c.is_ascii_alphabetic() || c == '$' || c == '%' || c == '_' || c == '.' => {
            lex_word(cursor, sl, sc)
        }
        _ => {
            cursor.advance();
            Err(AsmError::new(
                ErrorKind::UnexpectedCharacter,
                format!("Unexpected character: '{}'", ch),
                cursor.make_span(sl, sc),
            ))
        }
    }
}

fn lex_newline(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    if cursor.peek() == Some('\r') {
        cursor.advance();
        if cursor.peek() == Some('\n') {
            cursor.advance();
        }
    } else {
        cursor.advance();
    }
    Ok(Some(Token { kind: TokenKind::Newline, lexeme: "\n".into(), span: cursor.make_span(sl, sc) }))
}

fn lex_comment(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    cursor.advance();
    let mut text = String::new();
    while let Some(ch) = cursor.peek() {
        if ch == '\n' || ch == '\r' {
            break;
        }
        cursor.advance();
        text.push(ch);
    }
    Ok(Some(Token { kind: TokenKind::Comment(text.clone()), lexeme: format!(";{}", text), span: cursor.make_span(sl, sc) }))
}

fn lex_string(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    cursor.advance();
    let mut content = String::new();

    loop {
        if cursor.is_at_end() || matches!(cursor.peek(), Some('\n' | '\r')) {
            return Err(AsmError::new(
                ErrorKind::UnterminatedString,
                "Unterminated string literal",
                cursor.make_span(sl, sc),
            ));
        }

        let ch = cursor.peek().unwrap();
        if ch == '\'' {
            cursor.advance();
            if cursor.peek() == Some('\'') {
                cursor.advance();
                content.push('\'');
                continue;
            }
            break;
        }
        content.push(cursor.advance().unwrap());
    }

    let lexeme = format!("'{}'", content.replace('\'', "''"));
    Ok(Some(Token { kind: TokenKind::QuotedString(content), lexeme, span: cursor.make_span(sl, sc) }))
}

fn lex_hex(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    cursor.advance();
    let mut digits = String::new();
    while matches!(cursor.peek(), Some(c) if c.is_ascii_hexdigit()) {
        digits.push(cursor.advance().unwrap());
    }

    if digits.is_empty() {
        return Err(AsmError::new(
            ErrorKind::InvalidHexLiteral,
            "Expected hex digits after #",
            cursor.make_span(sl, sc),
        ));
    }

    match u32::from_str_radix(&digits, 16) {
        Ok(v) if v <= 0xFFFF => Ok(Some(Token {
            kind: TokenKind::Hex(v as u16),
            lexeme: format!("#{}", digits),
            span: cursor.make_span(sl, sc),
        })),
        _ => Err(AsmError::new(
            ErrorKind::InvalidHexLiteral,
            format!("Hex literal #{} exceeds 16 bits", digits),
            cursor.make_span(sl, sc),
        )),
    }
}

fn lex_decimal(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    let mut raw = String::new();
    if matches!(cursor.peek(), Some('+' | '-')) {
        raw.push(cursor.advance().unwrap());
    }
    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        raw.push(cursor.advance().unwrap());
    }

    let value = raw.parse::<i32>().map_err(|_| {
        AsmError::new(
            ErrorKind::InvalidDecimalLiteral,
            format!("Invalid decimal literal: {}", raw),
            cursor.make_span(sl, sc),
        )
    })?;

    Ok(Some(Token { kind: TokenKind::Decimal(value), lexeme: raw, span: cursor.make_span(sl, sc) }))
}

fn lex_word(cursor: &mut Cursor, sl: usize, sc: usize) -> Result<Option<Token>, AsmError> {
    let mut word = String::new();
    while matches!(cursor.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '$' || c == '%' || c == '_' || c == '.') {
        word.push(cursor.advance().unwrap());
    }

    // GR0..GR7 only when the whole identifier is exactly those 3 characters —
    // a longer run like `GR0X` is a plain label, not a register reference.
    let upper = word.to_ascii_uppercase();
    if upper.len() == 3 && upper.starts_with("GR") {
        if let Some(d) = upper.chars().nth(2).and_then(|c| c.to_digit(10)) {
            if d <= 7 {
                return Ok(Some(Token { kind: TokenKind::Register(d as u8), lexeme: word, span: cursor.make_span(sl, sc) }));
            }
            return Err(AsmError::new(
                ErrorKind::InvalidRegister,
                format!("Invalid register {} (must be GR0-GR7)", word),
                cursor.make_span(sl, sc),
            ));
        }
    }

    Ok(Some(Token { kind: TokenKind::Identifier(word.clone()), lexeme: word, span: cursor.make_span(sl, sc) }))
}
