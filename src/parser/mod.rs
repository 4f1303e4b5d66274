//! # CASL II Line Parser
//!
//! Classifies each lexed line as label-only, labeled-instruction, or
//! instruction-only, and splits its operands. Disambiguating a leading
//! identifier as a label or a mnemonic relies on two things, in order:
//! whether the line had leading whitespace, and whether the identifier is a
//! known mnemonic (`crate::isa::is_known_mnemonic`) — never on a heuristic
//! over the text itself. A future mnemonic addition can therefore shadow an
//! existing label name; callers should avoid naming labels after reserved
//! words.

pub mod ast;

#[cfg(test)]
mod tests;

use crate::error::{AsmError, ErrorKind};
use crate::isa;
use crate::lexer::token::{Token, TokenKind};
use crate::lexer::LexedLine;
use ast::ParsedLine;

pub struct ParseResult {
    pub lines: Vec<ParsedLine>,
    pub errors: Vec<AsmError>,
}

#[must_use]
pub fn parse_lines(lines: &[LexedLine]) -> ParseResult {
    let mut parsed = Vec::with_capacity(lines.len());
    let mut errors = Vec::new();

    for line in lines {
        match parse_line(line) {
            Ok(p) => parsed.push(p),
            Err(err) => {
                errors.push(err);
                parsed.push(ParsedLine::empty(line.line_number));
            }
        }
    }

    ParseResult { lines: parsed, errors }
}

fn parse_line(line: &LexedLine) -> Result<ParsedLine, AsmError> {
    let tokens = &line.tokens;
    if tokens.is_empty() {
        return Ok(ParsedLine::empty(line.line_number));
    }

    let first = &tokens[0];

    if line.leading_whitespace {
        let name = first.kind.as_identifier().ok_or_else(|| {
            AsmError::new(
                ErrorKind::ExpectedInstructionAfterIndent,
                "expected instruction after leading whitespace",
                first.span,
            )
        })?;
        if !isa::is_known_mnemonic(name) {
            return Err(AsmError::new(
                ErrorKind::IllegalMnemonic,
                format!("Unknown mnemonic: {}", name),
                first.span,
            ));
        }
        let mnemonic = name.to_ascii_uppercase();
        let operands = build_operands(&tokens[1..])?;
        return Ok(ParsedLine { label: None, mnemonic: Some(mnemonic), operands, line_number: line.line_number });
    }

    match &first.kind {
        TokenKind::Identifier(name) if isa::is_known_mnemonic(name) => {
            let mnemonic = name.to_ascii_uppercase();
            let operands = build_operands(&tokens[1..])?;
            Ok(ParsedLine { label: None, mnemonic: Some(mnemonic), operands, line_number: line.line_number })
        }
        TokenKind::Identifier(name) => {
            let label = name.clone();
            if tokens.len() == 1 {
                return Ok(ParsedLine { label: Some(label), mnemonic: None, operands: Vec::new(), line_number: line.line_number });
            }
            match &tokens[1].kind {
                TokenKind::Identifier(mnem) if isa::is_known_mnemonic(mnem) => {
                    let mnemonic = mnem.to_ascii_uppercase();
                    let operands = build_operands(&tokens[2..])?;
                    Ok(ParsedLine { label: Some(label), mnemonic: Some(mnemonic), operands, line_number: line.line_number })
                }
                _ => Err(AsmError::new(
                    ErrorKind::UnexpectedToken,
                    "expected instruction after label",
                    tokens[1].span,
                )),
            }
        }
        _ => Err(AsmError::new(
            ErrorKind::UnexpectedToken,
            "expected a label or instruction at start of line",
            first.span,
        )),
    }
}

/// Split operand tokens on top-level commas. Quoted strings never contain a
/// `Comma` token (the lexer already consumed the whole literal), so this
/// never has to special-case quoting. A bare `=` immediately before a
/// value token fuses with it into one literal operand lexeme (`=10`,
/// `=#00FF`, `='ABC'`, `=LABEL`).
fn build_operands(tokens: &[Token]) -> Result<Vec<String>, AsmError> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut operands = Vec::new();
    let mut group: Vec<&Token> = Vec::new();
    let mut last_span = tokens[0].span;

    for tok in tokens {
        if tok.kind == TokenKind::Comma {
            operands.push(finish_operand(&group, tok.span)?);
            group.clear();
        } else {
            last_span = tok.span;
            group.push(tok);
        }
    }
    operands.push(finish_operand(&group, last_span)?);

    Ok(operands)
}

fn finish_operand(group: &[&Token], span_if_empty: crate::error::Span) -> Result<String, AsmError> {
    match group {
        [] => Err(AsmError::new(ErrorKind::ExpectedOperand, "expected an operand", span_if_empty)),
        [Token { kind: TokenKind::Equals, .. }, value] => Ok(format!("={}", token_lexeme(value))),
        [single] => Ok(token_lexeme(single)),
        _ => Err(AsmError::new(
            ErrorKind::TooManyOperands,
            "unexpected token in operand",
            group[1].span,
        )),
    }
}

fn token_lexeme(tok: &Token) -> String {
    match &tok.kind {
        TokenKind::Identifier(s) => s.clone(),
        TokenKind::Register(r) => format!("GR{}", r),
        TokenKind::Decimal(v) => v.to_string(),
        TokenKind::Hex(v) => format!("#{:04X}", v),
        TokenKind::QuotedString(s) => format!("'{}'", s.replace('\'', "''")),
        _ => unreachable!("punctuation tokens are consumed before reaching token_lexeme"),
    }
}
