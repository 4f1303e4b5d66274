//! # Pass 1
//!
//! Walks the parsed lines once, tracking a flat address cursor shared across
//! every `START`/`END` section in the file. For each line it either records
//! a label, opens/closes a section, reserves/initializes storage (`DS`/
//! `DC`), expands a macro (`IN`/`OUT`/`RPUSH`/`RPOP`) into its constituent
//! real instructions, or emits a real instruction's words. Address operands
//! that name a label are rewritten to `scope:label` and left `Symbolic`;
//! only pass 2 needs to know whether that label turned out to exist.

use crate::error::{AsmError, ErrorKind, Span};
use crate::isa::{self, Shape};
use crate::parser::ast::ParsedLine;

use super::symbol_table::{SymbolEntry, SymbolTable, SymbolValue};
use super::{MemorySlot, Word};

use std::collections::BTreeMap;

pub struct FirstPassResult {
    pub symbol_table: SymbolTable,
    pub memory: BTreeMap<u16, MemorySlot>,
    pub address_max: u16,
    /// Symbol-table key the program counter should start at, set from the
    /// first `START` line's label (and optional entry operand).
    pub entry_key: Option<String>,
    pub errors: Vec<AsmError>,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(i32),
    Hex(u16),
    Str(String),
    Label(String),
}

#[derive(PartialEq)]
enum State {
    Outside,
    InBlock,
}

struct Pass1 {
    cursor: u32,
    state: State,
    scope: String,
    first_start_seen: bool,
    entry_key: Option<String>,
    literal_counter: u32,
    pending_literals: Vec<(String, Literal, usize)>,
    memory: BTreeMap<u16, MemorySlot>,
    symbols: SymbolTable,
    errors: Vec<AsmError>,
}

pub fn run(lines: &[ParsedLine]) -> FirstPassResult {
    let mut p = Pass1 {
        cursor: 0,
        state: State::Outside,
        scope: String::new(),
        first_start_seen: false,
        entry_key: None,
        literal_counter: 0,
        pending_literals: Vec::new(),
        memory: BTreeMap::new(),
        symbols: SymbolTable::new(),
        errors: Vec::new(),
    };

    for line in lines {
        p.process(line);
    }

    if p.state == State::InBlock {
        p.errors.push(AsmError::new(
            ErrorKind::NoEndInstruction,
            "NO END instruction found",
            Span::new(lines.last().map(|l| l.line_number).unwrap_or(0), 0),
        ));
    }

    FirstPassResult {
        symbol_table: p.symbols,
        memory: p.memory,
        address_max: p.cursor.min(0x10000) as u16,
        entry_key: p.entry_key,
        errors: p.errors,
    }
}

impl Pass1 {
    fn span(&self, line: &ParsedLine) -> Span {
        Span::new(line.line_number, 0)
    }

    fn process(&mut self, line: &ParsedLine) {
        let mnemonic = match &line.mnemonic {
            None => {
                if let Some(label) = &line.label {
                    self.declare_label(label, line);
                }
                return;
            }
            Some(m) => m.clone(),
        };

        if mnemonic == "START" {
            self.handle_start(line);
            return;
        }

        if self.state == State::Outside {
            self.errors.push(AsmError::new(
                ErrorKind::NoStartInstruction,
                "NO START instruction found",
                self.span(line),
            ));
            return;
        }

        if let Some(label) = &line.label {
            self.declare_label(label, line);
        }

        match mnemonic.as_str() {
            "END" => self.handle_end(line),
            "DS" => self.handle_ds(line),
            "DC" => self.handle_dc(line),
            "IN" | "OUT" => self.handle_in_out(&mnemonic, line),
            "RPUSH" => self.handle_rpush(line),
            "RPOP" => self.handle_rpop(line),
            _ => self.handle_instruction(&mnemonic, &line.operands, line),
        }
    }

    fn declare_label(&mut self, label: &str, line: &ParsedLine) {
        let key = format!("{}:{}", self.scope, label);
        if self.symbols.contains(&key) {
            self.errors.push(AsmError::duplicate_label(label, self.span(line)));
            return;
        }
        self.symbols.insert(key, SymbolEntry { value: SymbolValue::Address(self.cursor as u16), source_line: line.line_number });
    }

    fn handle_start(&mut self, line: &ParsedLine) {
        let Some(label) = &line.label else {
            self.errors.push(AsmError::new(ErrorKind::MissingLabel, "START requires a label", self.span(line)));
            return;
        };
        if self.state == State::InBlock {
            self.errors.push(AsmError::new(
                ErrorKind::UnexpectedToken,
                "START encountered before the previous section's END",
                self.span(line),
            ));
            return;
        }
        if line.operands.len() > 1 {
            self.errors.push(AsmError::new(ErrorKind::TooManyOperands, "START takes at most one operand", self.span(line)));
        }

        self.scope = label.clone();
        self.state = State::InBlock;
        self.pending_literals.clear();

        let key = format!("{}:{}", label, label);
        if self.symbols.contains(&key) {
            self.errors.push(AsmError::duplicate_label(label, self.span(line)));
        } else {
            self.symbols.insert(key, SymbolEntry { value: SymbolValue::Address(self.cursor as u16), source_line: line.line_number });
        }

        if !self.first_start_seen {
            self.first_start_seen = true;
            let entry_name = line.operands.first().cloned().unwrap_or_else(|| label.clone());
            self.entry_key = Some(format!("{}:{}", label, entry_name));
        }
    }

    fn handle_end(&mut self, line: &ParsedLine) {
        if line.label.is_some() {
            self.errors.push(AsmError::new(ErrorKind::UnexpectedToken, "END must not have a label", self.span(line)));
        }
        if !line.operands.is_empty() {
            self.errors.push(AsmError::new(ErrorKind::TooManyOperands, "END takes no operands", self.span(line)));
        }
        if self.state != State::InBlock {
            self.errors.push(AsmError::new(ErrorKind::NoStartInstruction, "END without a matching START", self.span(line)));
            return;
        }

        for (key, value, source_line) in std::mem::take(&mut self.pending_literals) {
            self.symbols.insert(key, SymbolEntry { value: SymbolValue::Address(self.cursor as u16), source_line });
            self.emit_literal_value(value, source_line);
        }

        self.state = State::Outside;
    }

    fn handle_ds(&mut self, line: &ParsedLine) {
        if line.operands.len() != 1 {
            self.errors.push(AsmError::new(ErrorKind::InvalidDsCount, "DS takes exactly one operand", self.span(line)));
            return;
        }
        let Ok(count) = line.operands[0].parse::<i64>() else {
            self.errors.push(AsmError::new(ErrorKind::InvalidDsCount, "DS operand must be a non-negative decimal", self.span(line)));
            return;
        };
        if count < 0 {
            self.errors.push(AsmError::new(ErrorKind::InvalidDsCount, "DS operand must be a non-negative decimal", self.span(line)));
            return;
        }
        for _ in 0..count {
            self.emit(Word::Resolved(0), line.line_number);
        }
    }

    fn handle_dc(&mut self, line: &ParsedLine) {
        if line.operands.is_empty() {
            self.errors.push(AsmError::new(ErrorKind::TooFewOperands, "DC requires at least one operand", self.span(line)));
            return;
        }
        for operand in &line.operands {
            match classify_literal(operand) {
                Literal::Str(s) => {
                    for ch in s.chars() {
                        self.emit(Word::Resolved(ch as u16), line.line_number);
                    }
                    self.emit(Word::Resolved(0), line.line_number);
                }
                Literal::Hex(v) => self.emit(Word::Resolved(v), line.line_number),
                Literal::Number(v) => self.emit(Word::Resolved(v as u16), line.line_number),
                Literal::Label(l) => self.emit(Word::Symbolic(format!("{}:{}", self.scope, l)), line.line_number),
            }
        }
    }

    fn emit_literal_value(&mut self, value: Literal, source_line: usize) {
        match value {
            Literal::Str(s) => {
                for ch in s.chars() {
                    self.emit(Word::Resolved(ch as u16), source_line);
                }
                self.emit(Word::Resolved(0), source_line);
            }
            Literal::Hex(v) => self.emit(Word::Resolved(v), source_line),
            Literal::Number(v) => self.emit(Word::Resolved(v as u16), source_line),
            Literal::Label(l) => self.emit(Word::Symbolic(format!("{}:{}", self.scope, l)), source_line),
        }
    }

    fn handle_in_out(&mut self, mnemonic: &str, line: &ParsedLine) {
        if line.operands.len() != 2 {
            self.errors.push(AsmError::new(ErrorKind::TooFewOperands, format!("{} requires a buffer and a length operand", mnemonic), self.span(line)));
            return;
        }
        let buffer = &line.operands[0];
        let length = &line.operands[1];
        let svc_code = if mnemonic == "IN" { "#FFF0" } else { "#FFF2" };

        self.emit_instruction("PUSH", &["0".into(), "GR1".into()], line);
        self.emit_instruction("PUSH", &["0".into(), "GR2".into()], line);
        self.emit_instruction("LAD", &["GR1".into(), buffer.clone()], line);
        self.emit_instruction("LAD", &["GR2".into(), length.clone()], line);
        self.emit_instruction("SVC", &[svc_code.into()], line);
        self.emit_instruction("POP", &["GR2".into()], line);
        self.emit_instruction("POP", &["GR1".into()], line);
    }

    fn handle_rpush(&mut self, line: &ParsedLine) {
        if !line.operands.is_empty() {
            self.errors.push(AsmError::new(ErrorKind::TooManyOperands, "RPUSH takes no operands", self.span(line)));
        }
        for r in 1..=7u8 {
            self.emit_instruction("PUSH", &["0".into(), format!("GR{}", r)], line);
        }
    }

    fn handle_rpop(&mut self, line: &ParsedLine) {
        if !line.operands.is_empty() {
            self.errors.push(AsmError::new(ErrorKind::TooManyOperands, "RPOP takes no operands", self.span(line)));
        }
        for r in (1..=7u8).rev() {
            self.emit_instruction("POP", &[format!("GR{}", r)], line);
        }
    }

    fn handle_instruction(&mut self, mnemonic: &str, operands: &[String], line: &ParsedLine) {
        self.emit_instruction(mnemonic, operands, line);
    }

    fn emit_instruction(&mut self, mnemonic: &str, operands: &[String], line: &ParsedLine) {
        let Some(def) = isa::lookup(mnemonic) else {
            self.errors.push(AsmError::new(ErrorKind::IllegalMnemonic, format!("Unknown mnemonic: {}", mnemonic), self.span(line)));
            return;
        };

        match def.shape {
            Shape::None => {
                if !operands.is_empty() {
                    self.errors.push(AsmError::new(ErrorKind::TooManyOperands, format!("{} takes no operands", mnemonic), self.span(line)));
                    return;
                }
                self.emit(Word::Resolved((def.opcode as u16) << 8), line.line_number);
            }
            Shape::Reg => {
                if operands.len() != 1 {
                    self.errors.push(AsmError::new(ErrorKind::TooFewOperands, format!("{} takes exactly one register operand", mnemonic), self.span(line)));
                    return;
                }
                let Some(r) = parse_register(&operands[0]) else {
                    self.errors.push(AsmError::new(ErrorKind::InvalidOperandType, format!("{} expects a register operand", mnemonic), self.span(line)));
                    return;
                };
                self.emit(Word::Resolved((def.opcode as u16) << 8 | (r as u16) << 4), line.line_number);
            }
            Shape::Addr => {
                if operands.is_empty() || operands.len() > 2 {
                    self.errors.push(AsmError::new(ErrorKind::TooFewOperands, format!("{} takes an address and an optional index register", mnemonic), self.span(line)));
                    return;
                }
                let Some(index) = self.parse_index(operands.get(1), line) else { return };
                let opcode_word = (def.opcode as u16) << 8 | (index as u16);
                self.emit(Word::Resolved(opcode_word), line.line_number);
                self.emit_address_operand(&operands[0], mnemonic == "CALL", line.line_number);
            }
            Shape::RegAddr { .. } => {
                if operands.len() < 2 || operands.len() > 3 {
                    self.errors.push(AsmError::new(ErrorKind::TooFewOperands, format!("{} takes a register and an address (or register)", mnemonic), self.span(line)));
                    return;
                }
                let Some(r1) = parse_register(&operands[0]) else {
                    self.errors.push(AsmError::new(ErrorKind::InvalidOperandType, format!("{} expects a register as its first operand", mnemonic), self.span(line)));
                    return;
                };

                if operands.len() == 2 {
                    if let Some(r2) = parse_register(&operands[1]) {
                        let Some(opcode) = isa::regreg_opcode(def) else {
                            self.errors.push(AsmError::new(ErrorKind::InvalidOperandType, format!("{} has no register-register form", mnemonic), self.span(line)));
                            return;
                        };
                        self.emit(Word::Resolved((opcode as u16) << 8 | (r1 as u16) << 4 | (r2 as u16)), line.line_number);
                        return;
                    }
                }

                let Some(index) = self.parse_index(operands.get(2), line) else { return };
                let opcode_word = (def.opcode as u16) << 8 | (r1 as u16) << 4 | (index as u16);
                self.emit(Word::Resolved(opcode_word), line.line_number);
                self.emit_address_operand(&operands[1], false, line.line_number);
            }
        }
    }

    /// Validate an optional index-register operand, rejecting `GR0`. Returns
    /// `None` (with an error already recorded) when validation fails.
    fn parse_index(&mut self, operand: Option<&String>, line: &ParsedLine) -> Option<u8> {
        match operand {
            None => Some(0),
            Some(text) => match parse_register(text) {
                Some(0) => {
                    self.errors.push(AsmError::new(ErrorKind::Gr0AsIndex, "GR0 cannot be used as an index register", self.span(line)));
                    None
                }
                Some(r) => Some(r),
                None => {
                    self.errors.push(AsmError::new(ErrorKind::InvalidOperandType, "index operand must be a register", self.span(line)));
                    None
                }
            },
        }
    }

    fn emit_address_operand(&mut self, operand: &str, is_call: bool, line_number: usize) {
        if let Some(literal) = operand.strip_prefix('=') {
            let key = format!("=value_{}", self.literal_counter);
            self.literal_counter += 1;
            self.pending_literals.push((key.clone(), classify_literal(literal), line_number));
            self.emit(Word::Symbolic(key), line_number);
            return;
        }

        if let Some(hex) = operand.strip_prefix('#') {
            if let Ok(v) = u16::from_str_radix(hex, 16) {
                self.emit(Word::Resolved(v), line_number);
                return;
            }
        }
        if let Ok(v) = operand.parse::<i32>() {
            self.emit(Word::Resolved(v as u16), line_number);
            return;
        }

        let key = format!("{}:{}", self.scope, operand);
        let key = if is_call { format!("CALL_{}", key) } else { key };
        self.emit(Word::Symbolic(key), line_number);
    }

    fn emit(&mut self, word: Word, source_line: usize) {
        if self.cursor >= 0x10000 {
            self.errors.push(AsmError::new(ErrorKind::AddressOverflow, "program exceeds the 64K address space", Span::new(source_line, 0)));
            return;
        }
        self.memory.insert(self.cursor as u16, MemorySlot { word, source_line });
        self.cursor += 1;
    }
}

fn parse_register(text: &str) -> Option<u8> {
    let rest = text.strip_prefix("GR")?;
    if rest.len() != 1 {
        return None;
    }
    let d = rest.chars().next()?.to_digit(10)?;
    if d <= 7 {
        Some(d as u8)
    } else {
        None
    }
}

fn classify_literal(text: &str) -> Literal {
    if let Some(hex) = text.strip_prefix('#') {
        if let Ok(v) = u16::from_str_radix(hex, 16) {
            return Literal::Hex(v);
        }
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Literal::Str(inner.replace("''", "'"));
    }
    if let Ok(v) = text.parse::<i32>() {
        return Literal::Number(v);
    }
    Literal::Label(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_lines;

    fn run_source(src: &str) -> FirstPassResult {
        let lexed = tokenize(src);
        assert!(lexed.errors.is_empty(), "lexer errors: {:?}", lexed.errors);
        let parsed = parse_lines(&lexed.lines);
        assert!(parsed.errors.is_empty(), "parser errors: {:?}", parsed.errors);
        run(&parsed.lines)
    }

    #[test]
    fn start_pushes_its_own_entry_symbol() {
        let result = run_source("MAIN START\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.symbol_table.resolve("MAIN:MAIN"), Some(0));
        assert_eq!(result.entry_key.as_deref(), Some("MAIN:MAIN"));
    }

    #[test]
    fn start_with_entry_operand_aliases_a_later_label() {
        let result = run_source("MAIN START BEGIN\nBEGIN LD GR0,=1\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.entry_key.as_deref(), Some("MAIN:BEGIN"));
        assert_eq!(result.symbol_table.resolve("MAIN:BEGIN"), Some(0));
    }

    #[test]
    fn instruction_outside_a_block_is_an_error() {
        let result = run_source("     LD GR0,GR1\n");
        assert!(result.errors.iter().any(|e| e.kind == ErrorKind::NoStartInstruction));
    }

    #[test]
    fn missing_end_is_an_error() {
        let result = run_source("MAIN START\n     NOP\n");
        assert!(result.errors.iter().any(|e| e.kind == ErrorKind::NoEndInstruction));
    }

    #[test]
    fn duplicate_label_in_same_scope_is_an_error() {
        let result = run_source("MAIN START\nL DS 1\nL DS 1\nEND\n");
        assert!(result.errors.iter().any(|e| e.kind == ErrorKind::DuplicateLabel));
    }

    #[test]
    fn ds_reserves_zeroed_words() {
        let result = run_source("MAIN START\n     DS 3\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.address_max, 3);
    }

    #[test]
    fn dc_string_emits_chars_and_trailing_zero() {
        let result = run_source("MAIN START\n     DC 'HI'\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.address_max, 3);
    }

    #[test]
    fn regreg_form_is_chosen_when_second_operand_is_a_register() {
        let result = run_source("MAIN START\n     LD GR0,GR1\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let slot = &result.memory[&0];
        assert_eq!(slot.word, Word::Resolved(0x1401));
    }

    #[test]
    fn literal_operand_allocates_a_pool_slot_resolved_at_end() {
        let result = run_source("MAIN START\n     LD GR0,=5\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        match &result.memory[&1].word {
            Word::Symbolic(key) => assert_eq!(key, "=value_0"),
            other => panic!("expected a symbolic literal word, got {:?}", other),
        }
        assert_eq!(result.symbol_table.resolve("=value_0"), Some(2));
        assert_eq!(result.memory[&2].word, Word::Resolved(5));
    }

    #[test]
    fn gr0_as_index_is_an_error() {
        let result = run_source("MAIN START\n     LD GR1,DATA,GR0\nDATA DS 1\nEND\n");
        assert!(result.errors.iter().any(|e| e.kind == ErrorKind::Gr0AsIndex));
    }

    #[test]
    fn call_address_operand_is_prefixed_for_cross_scope_fallback() {
        let result = run_source("MAIN START\n     CALL SUB\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        match &result.memory[&1].word {
            Word::Symbolic(key) => assert_eq!(key, "CALL_MAIN:SUB"),
            other => panic!("expected a symbolic CALL operand, got {:?}", other),
        }
    }

    #[test]
    fn rpush_expands_to_seven_push_instructions() {
        let result = run_source("MAIN START\n     RPUSH\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.address_max, 14);
    }

    #[test]
    fn in_expands_to_twelve_words() {
        let result = run_source("MAIN START\n     IN BUF,LEN\nBUF DS 1\nLEN DS 1\nEND\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.address_max, 14);
    }
}
