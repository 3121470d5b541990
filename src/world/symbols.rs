//! URI interning.
//!
//! Plugin formats and event types are keyed by URI strings; the symbol map
//! turns them into small integers that are cheap to compare and copy.

use std::collections::HashMap;
use std::num::NonZeroU32;

/// An interned URI. Zero is never a valid symbol.
pub type Symbol = NonZeroU32;

/// URI of MIDI events carried on event ports.
pub const MIDI_EVENT_URI: &str = "urn:modular-host:midi-event";

/// Bidirectional map between URIs and stable symbols.
///
/// Symbols are assigned in mapping order starting at 1 and stay valid for
/// the life of the map.
#[derive(Debug, Default)]
pub struct SymbolMap {
    ids: HashMap<String, Symbol>,
    uris: Vec<String>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the symbol for `uri`, assigning the next one on first use.
    ///
    /// Returns `None` only if every `u32` symbol is taken.
    pub fn map(&mut self, uri: &str) -> Option<Symbol> {
        if let Some(&id) = self.ids.get(uri) {
            return Some(id);
        }
        let next = u32::try_from(self.uris.len() + 1).ok()?;
        let id = NonZeroU32::new(next)?;
        self.uris.push(uri.to_string());
        self.ids.insert(uri.to_string(), id);
        Some(id)
    }

    /// Looks up a symbol without assigning one.
    pub fn lookup(&self, uri: &str) -> Option<Symbol> {
        self.ids.get(uri).copied()
    }

    /// Returns the URI a symbol was assigned to.
    pub fn unmap(&self, id: Symbol) -> Option<&str> {
        self.uris.get(id.get() as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_is_stable() {
        let mut symbols = SymbolMap::new();
        let a = symbols.map("urn:a").unwrap();
        let b = symbols.map("urn:b").unwrap();

        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(symbols.map("urn:a"), Some(a));
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn test_unmap_round_trip() {
        let mut symbols = SymbolMap::new();
        let id = symbols.map(MIDI_EVENT_URI).unwrap();
        assert_eq!(symbols.unmap(id), Some(MIDI_EVENT_URI));
        assert_eq!(symbols.unmap(NonZeroU32::new(99).unwrap()), None);
    }

    #[test]
    fn test_lookup_does_not_assign() {
        let mut symbols = SymbolMap::new();
        assert!(symbols.lookup("urn:missing").is_none());
        assert!(symbols.is_empty());
        symbols.map("urn:present");
        assert!(symbols.lookup("urn:present").is_some());
    }
}
