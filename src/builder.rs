//! Construction and maintenance of the five indices. Bulk build is
//! the fast path taken at startup and on a full rebuild; the
//! incremental entry points keep the same invariants for one word at
//! a time. Deletion is deliberately lazy on the 2-gram index and the
//! BK-tree: both keep the id until the next optimize or rebuild, and
//! every reader re-checks the deletion flag instead.

use std::time::Instant;

use log::info;
use rayon::prelude::*;

use crate::dictionary::{Dictionary, WordId};
use crate::index::{reverse, GramIndex, Indexes, OrderedIndex};
use crate::interner::{Interner, Word};
use crate::textlog::RawRecord;

/// How many records each build worker takes per shard.
const SHARD_SIZE: usize = 4096;

/// Which indices a bulk build has to populate. A freshly loaded
/// snapshot already covers some of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPlan {
    pub prefix_suffix: bool,
    pub grams_lengths: bool,
}

impl BuildPlan {
    /// Everything from scratch.
    pub fn full() -> Self {
        BuildPlan {
            prefix_suffix: true,
            grams_lengths: true,
        }
    }

    /// After a v1 snapshot: the two ordered sets are already there.
    pub fn after_prefix_suffix_snapshot() -> Self {
        BuildPlan {
            prefix_suffix: false,
            grams_lengths: true,
        }
    }

    /// After a v2 snapshot: only the dictionary and the BK-tree are
    /// left to build.
    pub fn after_full_snapshot() -> Self {
        BuildPlan {
            prefix_suffix: false,
            grams_lengths: false,
        }
    }
}

/// Worker-local structures built during the parallel phase. Nothing
/// shared is touched until the serial merge.
#[derive(Default)]
struct Shard {
    prefix: OrderedIndex,
    suffix: OrderedIndex,
    grams: GramIndex,
}

/// Populate the dictionary, the interner and every index from a
/// replayed record stream (active and deleted records mixed).
///
/// Steps: dictionary and interner first, then length buckets, then
/// the ordered sets and the gram postings in parallel worker shards
/// merged serially, then the BK-tree in serial batches (a BK-tree is
/// order sensitive, two worker trees cannot be merged).
pub fn bulk_build(
    records: &[RawRecord],
    dictionary: &mut Dictionary,
    interner: &mut Interner,
    indexes: &mut Indexes,
    plan: BuildPlan,
) {
    let start = Instant::now();

    // Dictionary and interner cover every record, even deleted ones:
    // a deleted record can still be listed and restored.
    for record in records {
        let word = interner.intern(&record.word);
        dictionary.insert_new(word, record.id, record.deleted);
    }

    // Only active records reach the indices.
    let active: Vec<(WordId, Word)> = dictionary
        .iter_active()
        .map(|record| (record.id, record.word.clone()))
        .collect();

    if plan.grams_lengths {
        indexes.lengths.reserve(active.iter().map(|(_, word)| word.len()));
        for (id, word) in active.iter() {
            indexes.lengths.insert(word.len(), *id);
        }
    }

    if plan.prefix_suffix || plan.grams_lengths {
        let shards: Vec<Shard> = active
            .par_chunks(SHARD_SIZE)
            .map(|chunk| {
                let mut shard = Shard::default();
                for (id, word) in chunk {
                    if plan.prefix_suffix {
                        shard.prefix.insert(word.clone());
                        shard.suffix.insert(Word::from(reverse(word)));
                    }
                    if plan.grams_lengths {
                        shard.grams.register(word, *id);
                    }
                }
                shard
            })
            .collect();

        for shard in shards {
            indexes.prefix.absorb(shard.prefix);
            indexes.suffix.absorb(shard.suffix);
            indexes.grams.absorb(shard.grams);
        }
    }

    // The BK-tree always rebuilds from the text: it is not part of
    // the snapshot, edit-distance construction is fast enough.
    let (ids, words): (Vec<WordId>, Vec<Word>) = active.into_iter().unzip();
    indexes.bktree.insert_batch(&words, &ids, None);

    info!(
        "bulk build: {} records ({} active) in {:?}",
        records.len(),
        words.len(),
        start.elapsed()
    );
}

/// Insert one new word into the dictionary and all five indices.
pub fn add(
    dictionary: &mut Dictionary,
    interner: &mut Interner,
    indexes: &mut Indexes,
    bytes: &[u8],
    id: WordId,
) {
    let word = interner.intern(bytes);

    dictionary.insert_new(word.clone(), id, false);
    indexes.prefix.insert(word.clone());
    indexes.suffix.insert(Word::from(reverse(&word)));
    indexes.lengths.insert(word.len(), id);
    indexes.grams.register(&word, id);
    indexes.bktree.insert(word, id);
}

/// Flag the word as deleted and remove its footprint from the
/// indices that support cheap removal. The 2-gram postings and the
/// BK-tree keep the id until the next optimize or rebuild; readers
/// filter on the flag.
pub fn delete(dictionary: &mut Dictionary, indexes: &mut Indexes, id: WordId) -> bool {
    let word = match dictionary.get_by_id(id) {
        Some(record) if record.is_active() => record.word.clone(),
        _ => return false,
    };

    dictionary.mark_deleted(id);
    indexes.prefix.remove(&word);
    indexes.suffix.remove(&reverse(&word));
    indexes.lengths.remove(word.len(), id);
    true
}

/// Clear the deletion flag and re-insert the word where deletion had
/// removed it. The BK-tree insert lands on the still-present node of
/// the same surface form and only refreshes its id.
pub fn restore(dictionary: &mut Dictionary, indexes: &mut Indexes, id: WordId) -> bool {
    let word = match dictionary.get_by_id(id) {
        Some(record) if record.deleted => record.word.clone(),
        _ => return false,
    };

    dictionary.mark_active(id);
    indexes.prefix.insert(word.clone());
    indexes.suffix.insert(Word::from(reverse(&word)));
    indexes.lengths.insert(word.len(), id);
    indexes.bktree.insert(word, id);
    true
}

/// Catch up on lazy deletions: purge deleted ids from the gram
/// postings, drop emptied gram keys and empty length buckets.
/// The BK-tree only sheds deleted nodes on a full rebuild.
pub fn optimize(dictionary: &Dictionary, indexes: &mut Indexes) {
    let start = Instant::now();

    indexes.grams.retain_ids(|id| {
        dictionary
            .get_by_id(id)
            .map_or(false, |record| record.is_active())
    });
    indexes.lengths.drop_empty();

    info!("optimize pass done in {:?}", start.elapsed());
}

/// Mismatch counts of one validation pass, one field per invariant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Dictionary entries whose two views disagree.
    pub dictionary_views: usize,
    /// Active words missing from the prefix set, plus prefix entries
    /// that are not active words.
    pub prefix: usize,
    /// Same for the reversed set.
    pub suffix: usize,
    /// Active words missing from their length bucket.
    pub lengths: usize,
    /// Gram postings naming an active word that does not contain the
    /// gram.
    pub grams: usize,
    /// BK-tree edges whose label is not the recomputed distance.
    pub bktree_edges: usize,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.dictionary_views
            + self.prefix
            + self.suffix
            + self.lengths
            + self.grams
            + self.bktree_edges
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Cross-check every index against the dictionary and report the
/// mismatch counts. Never mutates anything: inconsistencies are for
/// the caller to look at, not to paper over at runtime.
pub fn validate(dictionary: &Dictionary, indexes: &Indexes) -> ValidationReport {
    let mut report = ValidationReport {
        dictionary_views: dictionary.view_mismatches(),
        bktree_edges: indexes.bktree.mislabeled_edges(),
        ..ValidationReport::default()
    };

    let mut active_words = 0usize;
    for record in dictionary.iter_active() {
        active_words += 1;

        if !indexes.prefix.contains(&record.word) {
            report.prefix += 1;
        }
        if !indexes.suffix.contains(&reverse(&record.word)) {
            report.suffix += 1;
        }
        if !indexes
            .lengths
            .lookup(record.word.len())
            .map_or(false, |ids| ids.contains(record.id))
        {
            report.lengths += 1;
        }
    }

    // Entries present in the ordered sets without a matching active
    // record are stale the other way around.
    report.prefix += indexes.prefix.len().saturating_sub(active_words);
    report.suffix += indexes.suffix.len().saturating_sub(active_words);

    for (gram, ids) in indexes.grams.iter() {
        for id in ids.iter() {
            if let Some(record) = dictionary.get_by_id(id) {
                if record.is_active()
                    && !record.word.windows(2).any(|window| window == &gram[..])
                {
                    report.grams += 1;
                }
            }
        }
    }

    report
}
