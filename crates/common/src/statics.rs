//! Interned string literals.

use std::collections::HashMap;

/// Table of raw string literals lifted out of script source.
///
/// Strings are interned by content, so every occurrence of the same
/// literal in any script maps to the same index. Entries are never
/// removed; indices stay valid for the life of the table.
#[derive(Debug, Clone, Default)]
pub struct StaticTable {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl StaticTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `text`, inserting it if new.
    pub fn intern(&mut self, text: &str) -> usize {
        if let Some(&i) = self.index.get(text) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), i);
        i
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
