//! Symbol interning.
//!
//! Books and per-symbol counters live in `Vec`s indexed by [`SymbolId`], so
//! the hot path never hashes a symbol string after the first sighting.

use std::collections::HashMap;

/// Dense index assigned to a symbol on first sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bidirectional symbol ↔ id mapping. Ids are never reused.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    ids: HashMap<String, SymbolId>,
    names: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `symbol`, assigning the next free id if unseen.
    pub fn intern(&mut self, symbol: &str) -> SymbolId {
        if let Some(id) = self.ids.get(symbol) {
            return *id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(symbol.to_string());
        self.ids.insert(symbol.to_string(), id);
        id
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolId> {
        self.ids.get(symbol).copied()
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (SymbolId(i as u32), name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = SymbolTable::new();
        let btc = table.intern("BTC/USD");
        let eth = table.intern("ETH/USD");
        assert_ne!(btc, eth);
        assert_eq!(table.intern("BTC/USD"), btc);
        assert_eq!(table.name(eth), "ETH/USD");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("SOL/USD"), None);
    }
}
