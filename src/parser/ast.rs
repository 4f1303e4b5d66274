//! # Parsed Line
//!
//! A `ParsedLine` is deliberately thin: a label, a mnemonic, and the ordered
//! operand lexemes as strings. Shape-specific interpretation (which operand
//! is a register, which is a literal, how many words it occupies) is the
//! first pass's job, driven by `crate::isa::lookup`, not the parser's — the
//! parser only knows how to split a line into pieces, not what the pieces
//! mean for a particular mnemonic.

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operands: Vec<String>,
    pub line_number: usize,
}

impl ParsedLine {
    pub fn empty(line_number: usize) -> Self {
        Self { label: None, mnemonic: None, operands: Vec::new(), line_number }
    }
}
