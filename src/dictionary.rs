//! Authoritative store of the engine records. A record ties a word to
//! its id and a logical deletion flag; records are never removed, only
//! flagged. The store keeps two views of the same record set, one per
//! word and one per id, and the invariant is that they always agree.

use std::collections::{btree_map, BTreeMap, HashMap};

use crate::interner::Word;

/// Dense integer id of a word. Assigned once, on the first insertion
/// of a surface form, and never reused for another word.
pub type WordId = u32;

/// The canonical engine entry: a word, its id, and whether it has
/// been logically deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: WordId,
    pub word: Word,
    pub deleted: bool,
}

impl Record {
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// Record store with a word view and an id view.
/// Single writer: all mutation goes through the engine thread.
#[derive(Debug, Default)]
pub struct Dictionary {
    by_word: HashMap<Word, WordId>,
    by_id: BTreeMap<WordId, Record>,
    next_id: WordId,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary::default()
    }

    pub fn get_by_word(&self, word: &[u8]) -> Option<&Record> {
        self.by_word.get(word).and_then(|id| self.by_id.get(id))
    }

    pub fn get_by_id(&self, id: WordId) -> Option<&Record> {
        self.by_id.get(&id)
    }

    /// Register a brand new record under the given id.
    /// The word must not be present yet; the id counter is bumped
    /// past the given id so that later ids stay monotonic even when
    /// records are loaded from a file in arbitrary order.
    pub fn insert_new(&mut self, word: Word, id: WordId, deleted: bool) {
        debug_assert!(!self.by_word.contains_key(&word));
        debug_assert!(!self.by_id.contains_key(&id));

        self.by_word.insert(word.clone(), id);
        self.by_id.insert(id, Record { id, word, deleted });
        self.next_id = self.next_id.max(id + 1);
    }

    /// Flag the record as deleted. Returns false when the id is
    /// unknown or the record was already deleted.
    pub fn mark_deleted(&mut self, id: WordId) -> bool {
        match self.by_id.get_mut(&id) {
            Some(record) if !record.deleted => {
                record.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the deletion flag. Returns false when the id is unknown
    /// or the record was already active.
    pub fn mark_active(&mut self, id: WordId) -> bool {
        match self.by_id.get_mut(&id) {
            Some(record) if record.deleted => {
                record.deleted = false;
                true
            }
            _ => false,
        }
    }

    /// Next free id. Calling it does not reserve anything; the id is
    /// consumed by the matching `insert_new`.
    pub fn next_id(&self) -> WordId {
        self.next_id
    }

    /// All records, ascending by id, deleted ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.by_id.values()
    }

    /// Active records only, ascending by id.
    pub fn iter_active(&self) -> impl Iterator<Item = &Record> {
        self.by_id.values().filter(|record| record.is_active())
    }

    /// Records whose id falls in `[low, high]`, ascending.
    pub fn range(&self, low: WordId, high: WordId) -> btree_map::Range<'_, WordId, Record> {
        self.by_id.range(low..=high)
    }

    /// Smallest and largest id ever assigned, when any.
    pub fn id_envelope(&self) -> Option<(WordId, WordId)> {
        let first = self.by_id.keys().next()?;
        let last = self.by_id.keys().next_back()?;
        Some((*first, *last))
    }

    /// How many records exist, deleted ones included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// How many records are active.
    pub fn active_len(&self) -> usize {
        self.iter_active().count()
    }

    /// How many entries of one view disagree with the other view.
    /// Used by the index validation pass; never repairs anything.
    pub fn view_mismatches(&self) -> usize {
        let mut mismatches = 0;

        for record in self.by_id.values() {
            if self.by_word.get(&record.word) != Some(&record.id) {
                mismatches += 1;
            }
        }

        for (word, id) in self.by_word.iter() {
            match self.by_id.get(id) {
                Some(record) if record.word == *word => {}
                _ => mismatches += 1,
            }
        }

        mismatches
    }
}

#[cfg(test)]
mod tests {
    use super::Dictionary;
    use crate::interner::Interner;

    #[test]
    fn both_views_agree() {
        let mut interner = Interner::new();
        let mut dictionary = Dictionary::new();

        dictionary.insert_new(interner.intern(b"apple"), 0, false);
        dictionary.insert_new(interner.intern(b"banana"), 1, false);

        let record = dictionary.get_by_word(b"apple").unwrap();
        assert_eq!(0, record.id);
        assert_eq!(record, dictionary.get_by_id(0).unwrap());
        assert_eq!(0, dictionary.view_mismatches());
    }

    #[test]
    fn monotonic_ids() {
        let mut interner = Interner::new();
        let mut dictionary = Dictionary::new();

        assert_eq!(0, dictionary.next_id());

        // Out of order load: the counter must end past the max.
        dictionary.insert_new(interner.intern(b"late"), 7, false);
        dictionary.insert_new(interner.intern(b"early"), 2, true);

        assert_eq!(8, dictionary.next_id());
        assert_eq!(Some((2, 7)), dictionary.id_envelope());
    }

    #[test]
    fn deletion_flag() {
        let mut interner = Interner::new();
        let mut dictionary = Dictionary::new();
        dictionary.insert_new(interner.intern(b"word"), 0, false);

        assert!(dictionary.mark_deleted(0));
        // Already deleted, unknown id: both refused.
        assert!(!dictionary.mark_deleted(0));
        assert!(!dictionary.mark_deleted(42));

        assert_eq!(1, dictionary.len());
        assert_eq!(0, dictionary.active_len());

        assert!(dictionary.mark_active(0));
        assert!(!dictionary.mark_active(0));
        assert_eq!(1, dictionary.active_len());
    }
}
