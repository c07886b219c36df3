//! The engine owns every moving part: the dictionary, the interner,
//! the five indices and the text log handle. One logical thread does
//! everything, alternating between mutations and queries, so a query
//! always observes exactly the mutations accepted before it.
//!
//! Startup prefers the binary snapshot next to the text log and only
//! rebuilds what the snapshot does not cover; shutdown flushes the
//! log (each append already did) and writes a fresh snapshot so the
//! next start is cheap.

use std::path::{Path, PathBuf};

use log::info;

use crate::builder::{self, BuildPlan, ValidationReport};
use crate::dictionary::{Dictionary, Record, WordId};
use crate::error::{Error, Result};
use crate::index::Indexes;
use crate::interner::Interner;
use crate::query::{Evaluator, Query, QueryOptions, QueryResult};
use crate::snapshot::{self, Loaded};
use crate::textlog::{self, Appender};

/// What an add request did: a brand new record, a deleted record
/// brought back, or nothing because the word is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(WordId),
    Restored(WordId),
    AlreadyPresent(WordId),
}

impl AddOutcome {
    pub fn id(&self) -> WordId {
        match self {
            AddOutcome::Added(id) | AddOutcome::Restored(id) | AddOutcome::AlreadyPresent(id) => {
                *id
            }
        }
    }
}

/// The in-memory word dictionary and its query engine.
pub struct Engine {
    dictionary: Dictionary,
    interner: Interner,
    indexes: Indexes,
    /// Present when the engine is backed by a text log on disk.
    log: Option<Appender>,
    text_path: Option<PathBuf>,
}

impl Engine {
    /// An empty engine with no file behind it. Mutations are not
    /// persisted; useful for tests and embedding.
    pub fn in_memory() -> Self {
        Engine {
            dictionary: Dictionary::new(),
            interner: Interner::new(),
            indexes: Indexes::new(),
            log: None,
            text_path: None,
        }
    }

    /// Open the engine over a text log, replaying it into memory.
    /// A fresh snapshot next to the log shortcuts the index build;
    /// without one everything is rebuilt from the text.
    pub fn open(path: &Path) -> Result<Self> {
        let records = textlog::load(path)?;

        let mut engine = Engine::in_memory();

        let plan = match snapshot::load(path, &mut engine.interner, &mut engine.indexes) {
            Loaded::Nothing => BuildPlan::full(),
            Loaded::PrefixSuffix => BuildPlan::after_prefix_suffix_snapshot(),
            Loaded::Full => BuildPlan::after_full_snapshot(),
        };

        builder::bulk_build(
            &records,
            &mut engine.dictionary,
            &mut engine.interner,
            &mut engine.indexes,
            plan,
        );

        engine.log = Some(Appender::open(path)?);
        engine.text_path = Some(path.to_path_buf());

        info!(
            "engine open over {}: {} records, {} active",
            path.display(),
            engine.dictionary.len(),
            engine.dictionary.active_len()
        );

        Ok(engine)
    }

    /// Add a word, or bring it back when it exists deleted. Adding an
    /// already active word changes nothing, not even the id counter.
    pub fn add(&mut self, word: &[u8]) -> Result<AddOutcome> {
        if word.is_empty() {
            return Err(Error::InvalidWord("the empty word cannot be stored"));
        }

        let outcome = match self.dictionary.get_by_word(word) {
            Some(record) if record.is_active() => {
                return Ok(AddOutcome::AlreadyPresent(record.id));
            }
            Some(record) => {
                let id = record.id;
                builder::restore(&mut self.dictionary, &mut self.indexes, id);
                AddOutcome::Restored(id)
            }
            None => {
                let id = self.dictionary.next_id();
                builder::add(
                    &mut self.dictionary,
                    &mut self.interner,
                    &mut self.indexes,
                    word,
                    id,
                );
                AddOutcome::Added(id)
            }
        };

        self.append(outcome.id(), false)?;
        Ok(outcome)
    }

    /// Flag the record as deleted. False when the id is unknown or
    /// already deleted.
    pub fn delete(&mut self, id: WordId) -> Result<bool> {
        if !builder::delete(&mut self.dictionary, &mut self.indexes, id) {
            return Ok(false);
        }
        self.append(id, true)?;
        Ok(true)
    }

    /// Bring a deleted record back. False when the id is unknown or
    /// already active.
    pub fn undelete(&mut self, id: WordId) -> Result<bool> {
        if !builder::restore(&mut self.dictionary, &mut self.indexes, id) {
            return Ok(false);
        }
        self.append(id, false)?;
        Ok(true)
    }

    /// Answer a query. Only reads; see [`Evaluator`].
    pub fn query(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult> {
        Evaluator::new(&self.dictionary, &self.indexes).run(query, options)
    }

    /// Throw every index away and rebuild from the text log.
    /// In-memory engines rebuild from their own record set instead.
    pub fn rebuild(&mut self) -> Result<()> {
        let records = match &self.text_path {
            Some(path) => textlog::load(path)?,
            None => self
                .dictionary
                .iter()
                .map(|record| textlog::RawRecord {
                    id: record.id,
                    word: record.word.to_vec(),
                    deleted: record.deleted,
                })
                .collect(),
        };

        self.dictionary = Dictionary::new();
        self.indexes = Indexes::new();
        // The interner is kept: its entries are canonical for the
        // process lifetime and rebuild re-uses them.

        builder::bulk_build(
            &records,
            &mut self.dictionary,
            &mut self.interner,
            &mut self.indexes,
            BuildPlan::full(),
        );

        Ok(())
    }

    /// Purge lazily deleted ids out of the gram postings and drop
    /// empty length buckets.
    pub fn optimize(&mut self) {
        builder::optimize(&self.dictionary, &mut self.indexes);
    }

    /// Cross-check every index against the dictionary.
    pub fn validate(&self) -> ValidationReport {
        builder::validate(&self.dictionary, &self.indexes)
    }

    /// Write the snapshot next to the text log.
    pub fn save_snapshot(&self) -> Result<()> {
        let path = self.text_path.as_ref().ok_or(Error::NoTextLog)?;
        snapshot::save(&snapshot::sibling_path(path), &self.indexes)
    }

    /// Flush state for a clean exit: the snapshot makes the next
    /// start fast. In-memory engines have nothing to do.
    pub fn shutdown(self) -> Result<()> {
        if self.text_path.is_some() {
            self.save_snapshot()?;
        }
        Ok(())
    }

    pub fn record(&self, id: WordId) -> Option<&Record> {
        self.dictionary.get_by_id(id)
    }

    /// All records ascending by id; deleted ones only when asked.
    pub fn list(&self, include_deleted: bool) -> Vec<&Record> {
        self.dictionary
            .iter()
            .filter(|record| include_deleted || record.is_active())
            .collect()
    }

    /// Active records in lexicographic word order.
    pub fn list_alphabetical(&self) -> Vec<&Record> {
        self.indexes
            .prefix
            .iter()
            .filter_map(|word| self.dictionary.get_by_word(word))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.dictionary.active_len()
    }

    fn append(&mut self, id: WordId, deleted: bool) -> Result<()> {
        let word = match self.dictionary.get_by_id(id) {
            Some(record) => record.word.clone(),
            None => return Ok(()),
        };

        if let Some(log) = self.log.as_mut() {
            log.append(id, &word, deleted)?;
        }
        Ok(())
    }
}
