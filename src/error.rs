use std::io;

/// All the ways the engine can refuse to do what was asked.
/// User input problems are always recoverable and leave the
/// engine state untouched; I/O problems bubble up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A range query where the lower bound is above the upper one.
    #[error("inverted range: {0} is above {1}")]
    InvertedRange(u64, u64),

    /// A word that the engine cannot store (only the empty word so far).
    #[error("invalid word: {0}")]
    InvalidWord(&'static str),

    /// The snapshot file could not be used as-is. The caller is
    /// expected to fall back to a rebuild from the text log.
    #[error("unusable snapshot: {0}")]
    Snapshot(&'static str),

    /// The engine has no text log attached, so file-backed
    /// operations (rebuild, snapshot save) have nothing to work on.
    #[error("no text log attached to this engine")]
    NoTextLog,
}

pub type Result<T> = std::result::Result<T, Error>;
