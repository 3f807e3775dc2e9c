use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{IndexError, WORD_BYTES};

/// Failures of the admin commands.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The words or docs file does not exist.
    #[error("index file not found: {0}")]
    MissingIndex(PathBuf),
    /// A file whose length is not a multiple of the word size.
    #[error("{path} is {bytes} bytes, not a whole number of {WORD_BYTES}-byte words")]
    Ragged {
        /// Offending file.
        path: PathBuf,
        /// Its length on disk.
        bytes: u64,
    },
    /// Failure inside the index library.
    #[error(transparent)]
    Core(#[from] IndexError),
    /// Filesystem failure outside the index library.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for the admin commands.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_index(path: impl AsRef<Path>) -> Self {
        AdminError::MissingIndex(path.as_ref().to_path_buf())
    }
}
