use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use crate::index::WORDS_BTREE_CONTEXT;
use crate::primitives::array::LongArray;
use crate::storage::btree::BTreeReader;
use crate::types::WORD_BYTES;

use crate::admin::error::{AdminError, Result};
use crate::admin::options::AdminOpenOptions;

/// Mapped files of a finished index.
pub struct IndexHandle {
    /// The words tree, mapped read-only.
    pub words: Arc<LongArray>,
    /// The docs file, mapped read-only.
    pub docs: LongArray,
}

impl IndexHandle {
    /// Opens a reader over the words tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree header is inconsistent with the file.
    pub fn words_reader(&self) -> Result<BTreeReader> {
        Ok(BTreeReader::new(Arc::clone(&self.words), WORDS_BTREE_CONTEXT, 0)?)
    }
}

/// Maps the words and docs files of an index.
///
/// # Errors
///
/// Returns an error if either file is missing or cannot be mapped.
pub fn open_index(words: &Path, docs: &Path, opts: &AdminOpenOptions) -> Result<IndexHandle> {
    for path in [words, docs] {
        let bytes = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(AdminError::missing_index(path)),
            Err(err) => return Err(err.into()),
        };
        if bytes % WORD_BYTES != 0 {
            return Err(AdminError::Ragged {
                path: path.to_path_buf(),
                bytes,
            });
        }
    }
    let words = Arc::new(LongArray::map_read_only(words, &opts.array)?);
    let docs = LongArray::map_read_only(docs, &opts.array)?;
    Ok(IndexHandle { words, docs })
}
