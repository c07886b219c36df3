//! Inverted index from 2-byte substrings to the ids of the words
//! containing them. A 2-gram shared by a query and a word is necessary
//! but not sufficient for the query to be a substring of the word, so
//! readers intersect posting lists first and verify the survivors on
//! the actual bytes.

use std::collections::HashMap;

use crate::dictionary::WordId;
use crate::idset::IdSet;

/// A contiguous 2-byte substring.
pub type Gram = [u8; 2];

/// Map from each 2-gram present in any registered word to the set of
/// word ids containing it.
#[derive(Debug, Default)]
pub struct GramIndex {
    postings: HashMap<Gram, IdSet>,
}

/// The distinct 2-grams of a word, each one once, in first-seen
/// order. Words shorter than 2 bytes have none.
pub fn word_grams(word: &[u8]) -> Vec<Gram> {
    let mut grams: Vec<Gram> = Vec::with_capacity(word.len().saturating_sub(1));

    for window in word.windows(2) {
        let gram = [window[0], window[1]];
        if !grams.contains(&gram) {
            grams.push(gram);
        }
    }

    grams
}

impl GramIndex {
    pub fn new() -> Self {
        GramIndex {
            postings: HashMap::new(),
        }
    }

    /// Add the id under every distinct 2-gram of the word, creating
    /// posting lists on first sight. Words of length 0 or 1 register
    /// nothing.
    pub fn register(&mut self, word: &[u8], id: WordId) {
        for gram in word_grams(word) {
            self.postings.entry(gram).or_default().add(id);
        }
    }

    /// The posting list of a gram, when any word contains it.
    pub fn lookup(&self, gram: Gram) -> Option<&IdSet> {
        self.postings.get(&gram)
    }

    /// How many distinct grams have a posting list.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn clear(&mut self) {
        self.postings.clear();
    }

    /// Iterate over every (gram, posting list) pair.
    /// Ordering is unspecified; the snapshot codec sorts on its own.
    pub fn iter(&self) -> impl Iterator<Item = (&Gram, &IdSet)> {
        self.postings.iter()
    }

    /// Insert a whole posting list, as read back from a snapshot.
    pub fn insert_raw(&mut self, gram: Gram, ids: IdSet) {
        self.postings.insert(gram, ids);
    }

    /// Drop every id refused by the predicate, and every gram whose
    /// posting list ends up empty. This is the optimize pass that
    /// catches up on lazily deleted words.
    pub fn retain_ids(&mut self, keep: impl Fn(WordId) -> bool) {
        self.postings.retain(|_, ids| {
            let stale: Vec<WordId> = ids.iter().filter(|id| !keep(*id)).collect();
            for id in stale {
                ids.remove(id);
            }
            !ids.is_empty()
        });
    }

    /// Move every posting of `other` into self.
    /// Used by the bulk builder to merge worker-local maps.
    pub fn absorb(&mut self, other: GramIndex) {
        for (gram, ids) in other.postings {
            match self.postings.entry(gram) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().union_with(&ids);
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(ids);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{word_grams, GramIndex};

    #[test]
    fn gram_extraction() {
        // Duplicated grams inside one word count once.
        assert_eq!(vec![[b'a', b'b'], [b'b', b'a']], word_grams(b"abab"));

        // Too short to have any.
        assert!(word_grams(b"").is_empty());
        assert!(word_grams(b"x").is_empty());
    }

    #[test]
    fn register_and_lookup() {
        let mut index = GramIndex::new();
        index.register(b"cat", 0);
        index.register(b"cart", 1);
        index.register(b"x", 2);

        let ca = index.lookup([b'c', b'a']).unwrap();
        assert_eq!(vec![0, 1], ca.iter().collect::<Vec<u32>>());

        let rt = index.lookup([b'r', b't']).unwrap();
        assert_eq!(vec![1], rt.iter().collect::<Vec<u32>>());

        // Length 1 word contributed nothing at all.
        assert!(index.lookup([b'x', b'x']).is_none());
    }

    #[test]
    fn duplicate_grams_count_once() {
        let mut index = GramIndex::new();
        index.register(b"aaaa", 5);

        let aa = index.lookup([b'a', b'a']).unwrap();
        assert_eq!(1, aa.len());
    }

    #[test]
    fn retain_purges_empty_lists() {
        let mut index = GramIndex::new();
        index.register(b"ab", 0);
        index.register(b"ab", 1);
        index.register(b"cd", 1);

        index.retain_ids(|id| id == 0);

        assert!(index.lookup([b'c', b'd']).is_none(), "emptied gram key must go");
        assert_eq!(
            vec![0],
            index.lookup([b'a', b'b']).unwrap().iter().collect::<Vec<u32>>()
        );
    }
}
