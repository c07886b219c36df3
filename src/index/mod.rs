//! The lookup indices of the engine. Each one owns its own structure,
//! holds interner handles or plain ids only, and can be rebuilt from
//! the dictionary at any time.

pub mod bktree;
pub mod gram;
pub mod length;
pub mod ordered;

pub use bktree::BkTree;
pub use gram::GramIndex;
pub use length::LengthIndex;
pub use ordered::OrderedIndex;

use crate::distance::damerau_levenshtein;

/// The five indices the query evaluator reads, bundled so that the
/// builder and the snapshot codec can hand them around as one unit.
#[derive(Debug)]
pub struct Indexes {
    /// Active words, sorted over raw bytes.
    pub prefix: OrderedIndex,
    /// Byte-wise reversal of every active word; a suffix query is a
    /// prefix query on this set.
    pub suffix: OrderedIndex,
    /// 2-gram to posting list. May retain deleted ids until the next
    /// optimize or rebuild.
    pub grams: GramIndex,
    /// Word length to posting list.
    pub lengths: LengthIndex,
    /// Metric tree for bounded edit-distance search. May retain
    /// deleted ids until the next rebuild.
    pub bktree: BkTree,
}

impl Indexes {
    pub fn new() -> Self {
        Indexes {
            prefix: OrderedIndex::new(),
            suffix: OrderedIndex::new(),
            grams: GramIndex::new(),
            lengths: LengthIndex::new(),
            bktree: BkTree::new(damerau_levenshtein),
        }
    }
}

impl Default for Indexes {
    fn default() -> Self {
        Indexes::new()
    }
}

/// Byte-wise reversal used by the suffix index. The result does not
/// have to be valid UTF-8.
pub fn reverse(word: &[u8]) -> Vec<u8> {
    word.iter().rev().copied().collect()
}
