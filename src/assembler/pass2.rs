//! # Pass 2
//!
//! A pure walk over the sparse memory map pass 1 produced: every `Resolved`
//! word copies straight into the dense image; every `Symbolic` word is
//! looked up in the symbol table and replaced with its resolved address.
//! `CALL_`-prefixed keys get a second chance at cross-scope resolution
//! (stripping the prefix, then falling back to the `label:label`
//! entry-point convention) before being declared undefined.

use std::collections::BTreeMap;

use crate::error::{AsmError, ErrorKind, Span};
use crate::source_map::SourceMap;

use super::symbol_table::SymbolTable;
use super::{MemorySlot, Word};

pub struct SecondPassResult {
    pub image: Vec<u16>,
    pub entry_address: Option<u16>,
    pub source_map: SourceMap,
    pub errors: Vec<AsmError>,
}

pub fn run(
    memory: &BTreeMap<u16, MemorySlot>,
    symbols: &SymbolTable,
    address_max: u16,
    entry_key: Option<&str>,
) -> SecondPassResult {
    let mut image = vec![0u16; address_max as usize];
    let mut source_map = SourceMap::new();
    let mut errors = Vec::new();

    for (&addr, slot) in memory {
        source_map.record(addr, slot.source_line);
        let value = match &slot.word {
            Word::Resolved(v) => *v,
            Word::Symbolic(key) => match resolve_symbol(symbols, key) {
                Some(v) => v,
                None => {
                    errors.push(AsmError::undefined_label(display_key(key), Span::new(slot.source_line, 0)));
                    0
                }
            },
        };
        if (addr as usize) < image.len() {
            image[addr as usize] = value;
        }
    }

    let entry_address = entry_key.and_then(|key| {
        let resolved = resolve_symbol(symbols, key);
        if resolved.is_none() {
            errors.push(AsmError::new(
                ErrorKind::UndefinedLabel,
                format!("Undefined entry point: {}", display_key(key)),
                Span::new(0, 0),
            ));
        }
        resolved
    });

    SecondPassResult { image, entry_address, source_map, errors }
}

fn resolve_symbol(symbols: &SymbolTable, key: &str) -> Option<u16> {
    if let Some(inner) = key.strip_prefix("CALL_") {
        if let Some(addr) = symbols.resolve(inner) {
            return Some(addr);
        }
        let label = inner.rsplit(':').next().unwrap_or(inner);
        return symbols.resolve(&format!("{}:{}", label, label));
    }
    symbols.resolve(key)
}

fn display_key(key: &str) -> &str {
    key.strip_prefix("CALL_").unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::symbol_table::{SymbolEntry, SymbolValue};

    #[test]
    fn resolved_words_copy_through_unchanged() {
        let mut memory = BTreeMap::new();
        memory.insert(0, MemorySlot { word: Word::Resolved(0x1234), source_line: 1 });
        let symbols = SymbolTable::new();
        let result = run(&memory, &symbols, 1, None);
        assert_eq!(result.image, vec![0x1234]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn call_prefixed_key_falls_back_to_label_label() {
        let mut memory = BTreeMap::new();
        memory.insert(0, MemorySlot { word: Word::Symbolic("CALL_MAIN:SUB".into()), source_line: 1 });
        let mut symbols = SymbolTable::new();
        symbols.insert("SUB:SUB", SymbolEntry { value: SymbolValue::Address(42), source_line: 2 });
        let result = run(&memory, &symbols, 1, None);
        assert_eq!(result.image, vec![42]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn undefined_symbol_resolves_to_zero_with_an_error() {
        let mut memory = BTreeMap::new();
        memory.insert(0, MemorySlot { word: Word::Symbolic("MAIN:NOPE".into()), source_line: 7 });
        let symbols = SymbolTable::new();
        let result = run(&memory, &symbols, 1, None);
        assert_eq!(result.image, vec![0]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::UndefinedLabel);
    }
}
