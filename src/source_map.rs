//! # Source Map
//!
//! Bidirectional lookup between assembled addresses and source line numbers,
//! built once by pass 2 from the per-word source line that pass 1 attaches
//! to every memory slot. The DAP server uses this to translate breakpoint
//! requests (source line -> address) and stopped events (address -> source
//! line) without either side needing to know about the other's addressing.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    addr_to_line: BTreeMap<u16, usize>,
    line_to_addr: BTreeMap<usize, u16>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `addr` was assembled from `line`. Only the first address
    /// seen for a given line is kept for `line_to_addr`, since a source line
    /// that expands to several words (or a macro that expands to several
    /// instructions) should set its breakpoint on the first one.
    pub fn record(&mut self, addr: u16, line: usize) {
        self.addr_to_line.insert(addr, line);
        self.line_to_addr.entry(line).or_insert(addr);
    }

    pub fn line_for_address(&self, addr: u16) -> Option<usize> {
        self.addr_to_line.get(&addr).copied()
    }

    pub fn address_for_line(&self, line: usize) -> Option<u16> {
        self.line_to_addr.get(&line).copied()
    }
}
