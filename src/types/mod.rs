#![forbid(unsafe_code)]

//! Error type and word size helpers shared by every module.

/// Size of one array word in bytes.
pub const WORD_BYTES: u64 = 8;

/// Errors raised while building or reading an index.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Underlying file or mapping operation failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-disk data does not have the expected shape.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// An internal construction invariant did not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// A caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A requested file or entry does not exist.
    #[error("not found")]
    NotFound,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Converts a word count into a byte length, rejecting overflow.
pub fn words_to_bytes(words: u64) -> Result<u64> {
    words
        .checked_mul(WORD_BYTES)
        .ok_or(IndexError::Invalid("word count overflows byte length"))
}

/// Converts a word count into a `usize`, rejecting values the platform cannot address.
pub fn words_to_usize(words: u64) -> Result<usize> {
    usize::try_from(words).map_err(|_| IndexError::Invalid("word count exceeds address space"))
}
