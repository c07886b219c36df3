//! Query kinds and their evaluation plans. The evaluator only reads
//! the dictionary and the indices; every returned id is re-checked
//! against the deletion flag because the 2-gram index and the BK-tree
//! may still hold lazily deleted words. Results come back as ids in
//! ascending order, except similarity results which order by distance
//! first, and every result carries the elapsed wall time.

use std::time::{Duration, Instant};

use log::warn;

use crate::dictionary::{Dictionary, WordId};
use crate::error::{Error, Result};
use crate::idset::IdSet;
use crate::index::{reverse, Indexes};

/// Default search radius of a similarity query that does not name one.
pub const DEFAULT_SIMILARITY: usize = 2;

/// Default per-query timeout. Honored at loop boundaries of the
/// scanning plans; on expiry the evaluator returns what it has.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How many scan iterations run between two deadline checks.
const DEADLINE_STRIDE: usize = 1024;

/// Everything the engine can be asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// The word itself, or nothing.
    Exact(Vec<u8>),
    /// Every word starting with the key.
    Prefix(Vec<u8>),
    /// Every word ending with the key.
    Suffix(Vec<u8>),
    /// Every word containing the key anywhere.
    Substring(Vec<u8>),
    /// Everything within an edit distance of the word.
    Similarity {
        word: Vec<u8>,
        max_distance: Option<usize>,
        exhaustive: bool,
    },
    /// Every word of exactly this length.
    Length(usize),
    /// Every word whose length falls in the inclusive range.
    LengthRange(usize, usize),
    /// Every word whose id falls in the inclusive range.
    IdRange(WordId, WordId),
    /// Words containing every keyword.
    And(Vec<Vec<u8>>),
    /// Words containing at least one keyword.
    Or(Vec<Vec<u8>>),
    /// Words not containing the keyword.
    Not(Vec<u8>),
    /// Whitespace-separated `kind:value` terms, combined with AND.
    Complex(Vec<String>),
}

/// Per-query knobs.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub timeout: Duration,
    /// Also return logically deleted records. Off everywhere except
    /// the enumeration commands.
    pub include_deleted: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            timeout: DEFAULT_TIMEOUT,
            include_deleted: false,
        }
    }
}

/// One result row. The distance is zero for everything but
/// similarity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub id: WordId,
    pub distance: usize,
}

/// The outcome of one query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub matches: Vec<Match>,
    pub elapsed: Duration,
    /// The timeout fired; the matches are whatever was found so far.
    pub timed_out: bool,
    /// An id-range query fell entirely outside the known ids.
    pub out_of_range: bool,
}

impl QueryResult {
    pub fn ids(&self) -> Vec<WordId> {
        self.matches.iter().map(|hit| hit.id).collect()
    }
}

/// Read-only view over the engine state, answering queries.
pub struct Evaluator<'a> {
    dictionary: &'a Dictionary,
    indexes: &'a Indexes,
}

/// Scan bookkeeping: deadline plus an iteration counter so that
/// `Instant::now` is only paid once per stride.
struct Deadline {
    at: Instant,
    ticks: usize,
    expired: bool,
}

impl Deadline {
    fn new(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
            ticks: 0,
            expired: false,
        }
    }

    /// True once the deadline has passed. Checked every
    /// `DEADLINE_STRIDE` calls.
    fn tick(&mut self) -> bool {
        if self.expired {
            return true;
        }

        self.ticks += 1;
        if self.ticks % DEADLINE_STRIDE == 0 && Instant::now() >= self.at {
            self.expired = true;
        }

        self.expired
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(dictionary: &'a Dictionary, indexes: &'a Indexes) -> Self {
        Evaluator {
            dictionary,
            indexes,
        }
    }

    /// Evaluate the query under the given options.
    /// Invalid input (an inverted range) is an error and leaves no
    /// trace; an empty result is not an error.
    pub fn run(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult> {
        let start = Instant::now();
        let mut deadline = Deadline::new(options.timeout);

        let mut result = match query {
            Query::Exact(word) => self.exact(word),
            Query::Prefix(prefix) => self.prefix(prefix),
            Query::Suffix(suffix) => self.suffix(suffix),
            Query::Substring(key) => self.substring(key, &mut deadline),
            Query::Similarity {
                word,
                max_distance,
                exhaustive,
            } => self.similarity(word, max_distance.unwrap_or(DEFAULT_SIMILARITY), *exhaustive),
            Query::Length(length) => self.length(*length),
            Query::LengthRange(low, high) => self.length_range(*low, *high)?,
            Query::IdRange(low, high) => self.id_range(*low, *high)?,
            Query::And(keywords) => self.boolean(keywords, BooleanKind::And, &mut deadline),
            Query::Or(keywords) => self.boolean(keywords, BooleanKind::Or, &mut deadline),
            Query::Not(keyword) => {
                self.boolean(std::slice::from_ref(keyword), BooleanKind::Not, &mut deadline)
            }
            Query::Complex(terms) => self.complex(terms, &mut deadline)?,
        };

        // Whatever the plan did, deleted words never leak out unless
        // explicitly asked for: the gram index and the BK-tree are
        // allowed to keep them until the next rebuild.
        if !options.include_deleted {
            let dictionary = self.dictionary;
            result.matches.retain(|hit| {
                dictionary
                    .get_by_id(hit.id)
                    .map_or(false, |record| record.is_active())
            });
        }

        result.matches.sort_by_key(|hit| (hit.distance, hit.id));
        result.timed_out = deadline.expired;
        result.elapsed = start.elapsed();

        Ok(result)
    }

    fn from_ids(ids: impl IntoIterator<Item = WordId>) -> QueryResult {
        QueryResult {
            matches: ids.into_iter().map(|id| Match { id, distance: 0 }).collect(),
            ..QueryResult::default()
        }
    }

    fn exact(&self, word: &[u8]) -> QueryResult {
        Self::from_ids(self.dictionary.get_by_word(word).map(|record| record.id))
    }

    fn prefix(&self, prefix: &[u8]) -> QueryResult {
        let ids = self
            .indexes
            .prefix
            .scan_prefix(prefix)
            .filter_map(|word| self.dictionary.get_by_word(word))
            .map(|record| record.id);
        Self::from_ids(ids)
    }

    fn suffix(&self, suffix: &[u8]) -> QueryResult {
        let key = reverse(suffix);
        let ids = self
            .indexes
            .suffix
            .scan_prefix(&key)
            // Entries are reversed words; reverse again to look the
            // record up.
            .filter_map(|reversed| self.dictionary.get_by_word(&reverse(reversed)))
            .map(|record| record.id);
        Self::from_ids(ids)
    }

    fn substring(&self, key: &[u8], deadline: &mut Deadline) -> QueryResult {
        QueryResult {
            matches: self
                .substring_ids(key, deadline)
                .iter()
                .map(|id| Match { id, distance: 0 })
                .collect(),
            ..QueryResult::default()
        }
    }

    /// Substring plan shared with the complex terms. Single-byte keys
    /// scan the dictionary; longer keys intersect the posting lists
    /// of their 2-grams, then verify each survivor on the real bytes,
    /// because sharing every 2-gram does not yet mean containing the
    /// key.
    fn substring_ids(&self, key: &[u8], deadline: &mut Deadline) -> IdSet {
        match key.len() {
            0 => IdSet::new(),
            1 => {
                let mut ids = IdSet::new();
                for record in self.dictionary.iter_active() {
                    if deadline.tick() {
                        break;
                    }
                    if record.word.contains(&key[0]) {
                        ids.add(record.id);
                    }
                }
                ids
            }
            _ => {
                let mut candidates = match self.indexes.grams.lookup([key[0], key[1]]) {
                    Some(ids) => ids.clone(),
                    None => return IdSet::new(),
                };

                for start in 1..key.len() - 1 {
                    match self.indexes.grams.lookup([key[start], key[start + 1]]) {
                        Some(ids) => candidates.intersect_with(ids),
                        None => return IdSet::new(),
                    }
                    if candidates.is_empty() {
                        return IdSet::new();
                    }
                }

                let mut ids = IdSet::new();
                for id in candidates.iter() {
                    if deadline.tick() {
                        break;
                    }
                    if let Some(record) = self.dictionary.get_by_id(id) {
                        if contains(&record.word, key) {
                            ids.add(id);
                        }
                    }
                }
                ids
            }
        }
    }

    fn similarity(&self, word: &[u8], max_distance: usize, exhaustive: bool) -> QueryResult {
        QueryResult {
            matches: self
                .indexes
                .bktree
                .search(word, max_distance, exhaustive)
                .into_iter()
                .map(|(id, distance)| Match { id, distance })
                .collect(),
            ..QueryResult::default()
        }
    }

    fn length(&self, length: usize) -> QueryResult {
        match self.indexes.lengths.lookup(length) {
            Some(ids) => Self::from_ids(ids.iter()),
            None => QueryResult::default(),
        }
    }

    fn length_range(&self, low: usize, high: usize) -> Result<QueryResult> {
        if low > high {
            return Err(Error::InvertedRange(low as u64, high as u64));
        }
        Ok(Self::from_ids(self.indexes.lengths.lookup_range(low, high).iter()))
    }

    fn id_range(&self, low: WordId, high: WordId) -> Result<QueryResult> {
        if low > high {
            return Err(Error::InvertedRange(low as u64, high as u64));
        }

        // A request entirely outside the ids ever assigned is
        // signalled instead of being silently empty.
        let envelope = self.dictionary.id_envelope();
        let outside = match envelope {
            Some((first, last)) => high < first || low > last,
            None => true,
        };
        if outside {
            return Ok(QueryResult {
                out_of_range: true,
                ..QueryResult::default()
            });
        }

        let ids = self
            .dictionary
            .range(low, high)
            .map(|(_, record)| record.id);
        Ok(Self::from_ids(ids))
    }

    fn boolean(&self, keywords: &[Vec<u8>], kind: BooleanKind, deadline: &mut Deadline) -> QueryResult {
        let mut ids = Vec::new();

        // Deliberately a linear scan: correctness first, the gram
        // pre-filter only helps keywords of length >= 2.
        for record in self.dictionary.iter_active() {
            if deadline.tick() {
                break;
            }

            let keep = match kind {
                BooleanKind::And => keywords.iter().all(|keyword| contains(&record.word, keyword)),
                BooleanKind::Or => keywords.iter().any(|keyword| contains(&record.word, keyword)),
                BooleanKind::Not => keywords.iter().all(|keyword| !contains(&record.word, keyword)),
            };

            if keep {
                ids.push(record.id);
            }
        }

        Self::from_ids(ids)
    }

    /// `kind:value` terms, AND-combined left to right with an early
    /// exit once the intermediate set is empty. A leading `not` term
    /// starts from all active ids and subtracts. Unknown kinds are
    /// reported and skipped.
    fn complex(&self, terms: &[String], deadline: &mut Deadline) -> Result<QueryResult> {
        let mut current: Option<IdSet> = None;

        for term in terms {
            let (kind, value) = match term.split_once(':') {
                Some((kind, value)) if !value.is_empty() => (kind, value),
                _ => {
                    warn!("skipping malformed complex term {:?}", term);
                    continue;
                }
            };

            let negated = kind == "not";
            let ids = match self.complex_term(kind, value, deadline) {
                Some(ids) => ids,
                None => continue,
            };

            current = Some(match current.take() {
                None if negated => {
                    let mut all = self.all_active();
                    all.difference_with(&ids);
                    all
                }
                None => ids,
                Some(mut set) => {
                    if negated {
                        set.difference_with(&ids);
                    } else {
                        set.intersect_with(&ids);
                    }
                    set
                }
            });

            if current.as_ref().map_or(false, |set| set.is_empty()) {
                break;
            }
        }

        Ok(Self::from_ids(current.unwrap_or_default().iter()))
    }

    /// One complex term to an id set. `not` terms return the set of
    /// words *containing* the value; the caller subtracts it.
    fn complex_term(&self, kind: &str, value: &str, deadline: &mut Deadline) -> Option<IdSet> {
        match kind {
            "pre" => Some(
                self.prefix(value.as_bytes())
                    .matches
                    .iter()
                    .map(|hit| hit.id)
                    .collect(),
            ),
            "suf" => Some(
                self.suffix(value.as_bytes())
                    .matches
                    .iter()
                    .map(|hit| hit.id)
                    .collect(),
            ),
            "sub" | "not" => Some(self.substring_ids(value.as_bytes(), deadline)),
            "len" => {
                let (low, high) = match value.split_once('-') {
                    Some((low, high)) => (low.parse().ok()?, high.parse().ok()?),
                    None => {
                        let length = value.parse().ok()?;
                        (length, length)
                    }
                };
                if low > high {
                    warn!("skipping inverted len term {}-{}", low, high);
                    return None;
                }
                Some(self.indexes.lengths.lookup_range(low, high))
            }
            "id" => {
                // Unlike len, a bare number is not accepted here.
                let (low, high) = value.split_once('-')?;
                let (low, high): (WordId, WordId) = (low.parse().ok()?, high.parse().ok()?);
                if low > high {
                    warn!("skipping inverted id term {}-{}", low, high);
                    return None;
                }
                Some(
                    self.dictionary
                        .range(low, high)
                        .filter(|(_, record)| record.is_active())
                        .map(|(id, _)| *id)
                        .collect(),
                )
            }
            "sim" => {
                let (word, distance) = match value.split_once(',') {
                    Some((word, distance)) => (word, distance.parse().ok()?),
                    None => (value, DEFAULT_SIMILARITY),
                };
                Some(
                    self.indexes
                        .bktree
                        .search(word.as_bytes(), distance, false)
                        .into_iter()
                        .map(|(id, _)| id)
                        .collect(),
                )
            }
            _ => {
                warn!("skipping unknown complex term kind {:?}", kind);
                None
            }
        }
    }

    fn all_active(&self) -> IdSet {
        self.dictionary.iter_active().map(|record| record.id).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum BooleanKind {
    And,
    Or,
    Not,
}

/// Does `word` contain `key` as a contiguous byte sequence ?
fn contains(word: &[u8], key: &[u8]) -> bool {
    match key.len() {
        0 => true,
        1 => word.contains(&key[0]),
        _ => word.windows(key.len()).any(|window| window == key),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains, Evaluator, Match, Query, QueryOptions};
    use crate::builder::{bulk_build, delete, BuildPlan};
    use crate::dictionary::Dictionary;
    use crate::index::Indexes;
    use crate::interner::Interner;
    use crate::textlog::RawRecord;

    struct Fixture {
        dictionary: Dictionary,
        indexes: Indexes,
    }

    impl Fixture {
        fn new(words: &[&str]) -> Self {
            let records: Vec<RawRecord> = words
                .iter()
                .enumerate()
                .map(|(id, word)| RawRecord {
                    id: id as u32,
                    word: word.as_bytes().to_vec(),
                    deleted: false,
                })
                .collect();

            let mut dictionary = Dictionary::new();
            let mut interner = Interner::new();
            let mut indexes = Indexes::new();
            bulk_build(&records, &mut dictionary, &mut interner, &mut indexes, BuildPlan::full());

            Fixture {
                dictionary,
                indexes,
            }
        }

        fn ids(&self, query: Query) -> Vec<u32> {
            Evaluator::new(&self.dictionary, &self.indexes)
                .run(&query, &QueryOptions::default())
                .unwrap()
                .ids()
        }
    }

    #[test]
    fn contains_bytes() {
        assert!(contains(b"cart", b"ar"));
        assert!(contains(b"cart", b""));
        assert!(contains(b"cart", b"t"));
        assert!(!contains(b"cart", b"tr"));
        assert!(!contains(b"ca", b"cart"));
    }

    #[test]
    fn exact_and_prefix() {
        let fixture = Fixture::new(&["apple", "aple", "applet", "banana"]);

        assert_eq!(vec![0], fixture.ids(Query::Exact(b"apple".to_vec())));
        assert!(fixture.ids(Query::Exact(b"nope".to_vec())).is_empty());
        assert_eq!(vec![0, 2], fixture.ids(Query::Prefix(b"app".to_vec())));
    }

    #[test]
    fn suffix_re_reverses() {
        let fixture = Fixture::new(&["apple", "aple", "applet", "banana"]);

        assert_eq!(vec![2], fixture.ids(Query::Suffix(b"let".to_vec())));
        assert_eq!(vec![0, 1], fixture.ids(Query::Suffix(b"le".to_vec())));
    }

    #[test]
    fn substring_intersects_then_verifies() {
        let fixture = Fixture::new(&["cat", "car", "cart", "abba"]);

        assert_eq!(vec![0, 1, 2], fixture.ids(Query::Substring(b"ca".to_vec())));
        // Needs the verify step: "abab" shares every 2-gram of "abba"
        // without containing it.
        let tricky = Fixture::new(&["abab", "abba"]);
        assert_eq!(vec![1], tricky.ids(Query::Substring(b"abba".to_vec())));

        // Single byte key takes the scan path.
        assert_eq!(vec![0, 1, 2], fixture.ids(Query::Substring(b"c".to_vec())));
    }

    #[test]
    fn similarity_orders_by_distance() {
        let fixture = Fixture::new(&["apple", "aple", "applet", "banana"]);
        let evaluator = Evaluator::new(&fixture.dictionary, &fixture.indexes);

        let result = evaluator
            .run(
                &Query::Similarity {
                    word: b"apple".to_vec(),
                    max_distance: Some(2),
                    exhaustive: false,
                },
                &QueryOptions::default(),
            )
            .unwrap();

        // aple misses one p, applet adds a t: both at distance 1.
        assert_eq!(
            vec![
                Match { id: 0, distance: 0 },
                Match { id: 1, distance: 1 },
                Match { id: 2, distance: 1 }
            ],
            result.matches
        );
    }

    #[test]
    fn length_queries() {
        let fixture = Fixture::new(&["cat", "car", "cart", "banana"]);

        assert_eq!(vec![0, 1], fixture.ids(Query::Length(3)));
        assert_eq!(vec![0, 1, 2], fixture.ids(Query::LengthRange(3, 4)));
        assert!(fixture.ids(Query::Length(100)).is_empty());

        let evaluator = Evaluator::new(&fixture.dictionary, &fixture.indexes);
        assert!(evaluator
            .run(&Query::LengthRange(5, 3), &QueryOptions::default())
            .is_err());
    }

    #[test]
    fn id_range_envelope() {
        let fixture = Fixture::new(&["a", "b", "c"]);
        let evaluator = Evaluator::new(&fixture.dictionary, &fixture.indexes);

        let inside = evaluator
            .run(&Query::IdRange(1, 10), &QueryOptions::default())
            .unwrap();
        assert_eq!(vec![1, 2], inside.ids());
        assert!(!inside.out_of_range);

        let outside = evaluator
            .run(&Query::IdRange(50, 60), &QueryOptions::default())
            .unwrap();
        assert!(outside.ids().is_empty());
        assert!(outside.out_of_range);

        assert!(evaluator
            .run(&Query::IdRange(10, 2), &QueryOptions::default())
            .is_err());
    }

    #[test]
    fn boolean_scans() {
        let fixture = Fixture::new(&["cat", "car", "dog"]);

        assert_eq!(
            vec![0, 1],
            fixture.ids(Query::And(vec![b"c".to_vec(), b"a".to_vec()]))
        );
        assert_eq!(
            vec![0, 1, 2],
            fixture.ids(Query::Or(vec![b"ca".to_vec(), b"og".to_vec()]))
        );
        assert_eq!(vec![2], fixture.ids(Query::Not(b"ca".to_vec())));
    }

    #[test]
    fn complex_terms_combine() {
        let fixture = Fixture::new(&["cat", "car", "cart", "banana"]);

        assert_eq!(
            vec![0, 2],
            fixture.ids(Query::Complex(vec![
                "pre:c".into(),
                "suf:t".into(),
                "len:3-4".into()
            ]))
        );

        // Leading not starts from all active words.
        assert_eq!(
            vec![3],
            fixture.ids(Query::Complex(vec!["not:ca".into()]))
        );

        // Unknown kinds are skipped, not fatal.
        assert_eq!(
            vec![0, 1, 2],
            fixture.ids(Query::Complex(vec!["bogus:x".into(), "pre:ca".into()]))
        );

        // Short-circuit on an empty intermediate set.
        assert!(fixture
            .ids(Query::Complex(vec!["pre:zz".into(), "len:3".into()]))
            .is_empty());
    }

    #[test]
    fn deleted_words_never_leak() {
        let mut fixture = Fixture::new(&["apple", "aple"]);
        delete(&mut fixture.dictionary, &mut fixture.indexes, 0);

        // The BK-tree and gram index still hold id 0; the evaluator
        // must filter it out of every plan.
        assert!(fixture.ids(Query::Exact(b"apple".to_vec())).is_empty());
        assert!(fixture.ids(Query::Prefix(b"app".to_vec())).is_empty());
        assert!(fixture.ids(Query::Substring(b"pp".to_vec())).is_empty());
        assert_eq!(
            vec![1],
            fixture.ids(Query::Similarity {
                word: b"apple".to_vec(),
                max_distance: Some(2),
                exhaustive: false,
            })
        );
    }

    #[test]
    fn empty_engine_answers_everything() {
        let fixture = Fixture::new(&[]);

        assert!(fixture.ids(Query::Exact(b"x".to_vec())).is_empty());
        assert!(fixture.ids(Query::Prefix(b"x".to_vec())).is_empty());
        assert!(fixture.ids(Query::Substring(b"xy".to_vec())).is_empty());
        assert!(fixture
            .ids(Query::Similarity {
                word: b"x".to_vec(),
                max_distance: None,
                exhaustive: true,
            })
            .is_empty());
        assert!(fixture.ids(Query::Complex(vec!["pre:a".into()])).is_empty());
    }
}
