//! # Symbol Table
//!
//! Keys are scope-qualified (`scope:label`), since CASL II label namespaces
//! reset at every `START`. An entry is either a resolved `Address` or an
//! `Alias` pointing at another key, letting one symbol stand in for
//! another without eagerly resolving it at the point of declaration. The
//! graph this produces is a forest, so resolution always terminates.

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolValue {
    Address(u16),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub value: SymbolValue,
    pub source_line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: Vec<(String, SymbolEntry)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: SymbolEntry) {
        self.entries.push((key.into(), entry));
    }

    pub fn entry_of(&self, key: &str) -> Option<&SymbolEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    /// Resolve a key through any `Alias` chain to a final address. Bounded
    /// by `max_hops` as a defensive guard against the forest invariant ever
    /// being violated by a future change, not because real chains get long.
    pub fn resolve(&self, key: &str) -> Option<u16> {
        let mut current = key.to_string();
        for _ in 0..64 {
            match &self.entry_of(&current)?.value {
                SymbolValue::Address(addr) => return Some(*addr),
                SymbolValue::Alias(next) => current = next.clone(),
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn print_table(&self) {
        println!("//\tSymbol\t\tAddress");
        println!("//\t------\t\t-------");
        for (key, entry) in &self.entries {
            if let SymbolValue::Address(addr) = entry.value {
                println!("//\t{}\t\t#{:04X}", key, addr);
            }
        }
    }
}
