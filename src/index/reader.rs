use std::{path::Path, sync::Arc};

use tracing::{debug, warn};

use crate::index::context::WORDS_BTREE_CONTEXT;
use crate::primitives::array::{ArrayOptions, LongArray, LongArraySearch, LongQueryBuffer, LongRead};
use crate::storage::btree::BTreeReader;
use crate::types::{IndexError, Result, WORD_BYTES};

struct Files {
    words: BTreeReader,
    docs: LongArray,
}

/// Serves posting lists from a finished index.
pub struct ReverseIndexReader {
    files: Option<Files>,
}

impl ReverseIndexReader {
    /// Maps the docs file and words tree. When either file is missing the
    /// reader is empty and treats every word as absent.
    pub fn open(docs_path: &Path, words_path: &Path, options: &ArrayOptions) -> Result<Self> {
        if !docs_path.exists() || !words_path.exists() {
            warn!(
                docs = %docs_path.display(),
                words = %words_path.display(),
                "reader.missing_files"
            );
            return Ok(Self::empty());
        }
        let docs = LongArray::map_read_only(docs_path, options)?;
        let words_array = LongArray::map_read_only(words_path, options)?;
        words_array.advise_random()?;
        let words = BTreeReader::new(Arc::new(words_array), WORDS_BTREE_CONTEXT, 0)?;
        debug!(words = words.num_entries(), postings_words = docs.len(), "reader.open");
        Ok(Self {
            files: Some(Files { words, docs }),
        })
    }

    /// A reader over no words.
    pub fn empty() -> Self {
        Self { files: None }
    }

    /// True when no files back the reader.
    pub fn is_empty(&self) -> bool {
        self.files.is_none()
    }

    /// Number of indexed words.
    pub fn word_count(&self) -> u64 {
        self.files.as_ref().map_or(0, |files| files.words.num_entries())
    }

    /// Location of `word_id`'s postings in the docs file: first word and length.
    fn run(&self, word_id: u64) -> Result<Option<(&LongArray, u64, u64)>> {
        let Some(files) = &self.files else {
            return Ok(None);
        };
        let offset = files.words.find_entry(word_id)?;
        if offset < 0 {
            return Ok(None);
        }
        let byte_offset = files.words.data().get(offset as u64 + 1);
        if byte_offset % WORD_BYTES != 0 {
            return Err(IndexError::Corruption("docs offset is not word aligned"));
        }
        let start = byte_offset / WORD_BYTES;
        if start >= files.docs.len() {
            return Err(IndexError::Corruption("docs offset past end of file"));
        }
        let len = files.docs.get(start);
        let end = (start + 1).checked_add(len);
        if end.map_or(true, |end| end > files.docs.len()) {
            return Err(IndexError::Corruption("docs run past end of file"));
        }
        Ok(Some((&files.docs, start + 1, len)))
    }

    /// Sorted document ids containing `word_id`, or `None` when absent.
    pub fn documents(&self, word_id: u64) -> Result<Option<Vec<u64>>> {
        Ok(self
            .run(word_id)?
            .map(|(docs, start, len)| (start..start + len).map(|i| docs.get(i)).collect()))
    }

    /// Number of documents containing `word_id`; 0 when absent.
    pub fn num_documents(&self, word_id: u64) -> Result<u64> {
        Ok(self.run(word_id)?.map_or(0, |(_, _, len)| len))
    }

    /// Keeps only the candidates in `buffer` that contain `word_id`.
    pub fn retain_documents(&self, word_id: u64, buffer: &mut LongQueryBuffer) -> Result<()> {
        buffer.start_filtering_pass();
        if let Some((docs, start, len)) = self.run(word_id)? {
            docs.retain(buffer, u64::MAX, start, start + len);
        }
        buffer.reject_remaining();
        buffer.finalize_filtering();
        Ok(())
    }

    /// Drops the candidates in `buffer` that contain `word_id`.
    pub fn reject_documents(&self, word_id: u64, buffer: &mut LongQueryBuffer) -> Result<()> {
        buffer.start_filtering_pass();
        if let Some((docs, start, len)) = self.run(word_id)? {
            docs.reject(buffer, u64::MAX, start, start + len);
        }
        buffer.retain_remaining();
        buffer.finalize_filtering();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{
        IdentityRewriter, InMemoryJournal, IndexConstructor, IndexConstructorOptions, IndexJournal, JournalTerm,
        NoopHeartbeat,
    };
    use tempfile::tempdir;

    fn single_word_index(dir: &Path) -> Result<()> {
        let mut journal = InMemoryJournal::default();
        journal.push(1, vec![JournalTerm::new(5, 1)]);
        let journals: Vec<Box<dyn IndexJournal>> = vec![Box::new(journal)];
        let built = IndexConstructor::new(
            dir.join("docs.dat"),
            dir.join("words.dat"),
            IdentityRewriter,
            IndexConstructorOptions::new(dir).with_threads(1),
        )
        .create_from_journals(&NoopHeartbeat, "test", &journals)?;
        assert!(built);
        Ok(())
    }

    #[test]
    fn serves_a_single_posting() -> Result<()> {
        let dir = tempdir()?;
        single_word_index(dir.path())?;
        let reader = ReverseIndexReader::open(
            &dir.path().join("docs.dat"),
            &dir.path().join("words.dat"),
            &ArrayOptions::default(),
        )?;
        assert_eq!(reader.documents(5)?, Some(vec![1]));
        assert_eq!(reader.num_documents(6)?, 0);
        Ok(())
    }

    #[test]
    fn huge_run_length_is_corruption() -> Result<()> {
        let dir = tempdir()?;
        single_word_index(dir.path())?;
        let docs = dir.path().join("docs.dat");
        let mut bytes = std::fs::read(&docs)?;
        bytes[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&docs, bytes)?;

        let reader = ReverseIndexReader::open(&docs, &dir.path().join("words.dat"), &ArrayOptions::default())?;
        assert!(matches!(reader.num_documents(5), Err(IndexError::Corruption(_))));
        assert!(matches!(reader.documents(5), Err(IndexError::Corruption(_))));
        Ok(())
    }
}
