//! Canonical storage of word payloads. Every index holds cheap
//! handles into this storage instead of its own copy of the bytes,
//! so a word present in five indices is stored once. The interner is
//! owned by the engine and lives as long as it does; entries are
//! never evicted.

use std::collections::HashSet;
use std::sync::Arc;

/// Handle to an interned byte string. Clones share the same
/// allocation; comparison and ordering go through the bytes.
pub type Word = Arc<[u8]>;

/// Deduplicating store of word payloads.
#[derive(Debug, Default)]
pub struct Interner {
    words: HashSet<Word>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            words: HashSet::new(),
        }
    }

    /// Return the canonical handle for the given bytes, copying them
    /// into owned storage on first sight.
    pub fn intern(&mut self, bytes: &[u8]) -> Word {
        if let Some(word) = self.words.get(bytes) {
            return word.clone();
        }

        let word: Word = Arc::from(bytes);
        self.words.insert(word.clone());
        word
    }

    /// Look up the canonical handle without creating one.
    pub fn get(&self, bytes: &[u8]) -> Option<Word> {
        self.words.get(bytes).cloned()
    }

    /// How many distinct byte strings are interned.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
