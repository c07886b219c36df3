//! In-memory dictionary of short byte strings under dense integer
//! ids, answering exact, prefix, suffix, substring, length, id-range,
//! boolean, composed and bounded edit-distance queries through a set
//! of cooperating indices. Persistence is one append-only text log;
//! a binary snapshot next to it makes cold starts cheap.

pub mod builder;
pub mod dictionary;
pub mod distance;
pub mod engine;
pub mod error;
pub mod generate;
pub mod idset;
pub mod index;
pub mod interner;
pub mod query;
pub mod snapshot;
pub mod textlog;

pub use engine::{AddOutcome, Engine};
pub use error::{Error, Result};
pub use query::{Query, QueryOptions, QueryResult};
