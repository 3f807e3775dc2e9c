use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::primitives::array::LongRead;
use crate::types::WORD_BYTES;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_index;
use crate::admin::Result;

/// Summary of a finished index.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Shape of the words tree.
    pub words: WordsTreeSection,
    /// Posting run figures from the docs file.
    pub postings: PostingsSection,
    /// On-disk sizes.
    pub filesystem: FilesystemStats,
}

/// Shape of the words tree.
#[derive(Debug, Clone, Serialize)]
pub struct WordsTreeSection {
    /// Distinct words in the index.
    pub entries: u64,
    /// Index layers above the data block.
    pub layers: u32,
    /// Word offset of the topmost index layer.
    pub index_offset: u64,
    /// Word offset of the data block.
    pub data_offset: u64,
}

/// Posting run figures from the docs file.
#[derive(Debug, Clone, Serialize)]
pub struct PostingsSection {
    /// Document ids across all runs.
    pub total: u64,
    /// Length of the longest run.
    pub longest_run: u64,
    /// Word owning the longest run, if the index has any words.
    pub longest_run_word: Option<u64>,
    /// Mean run length.
    pub mean_run: f64,
}

/// On-disk footprint of the two index files.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    /// Path of the words tree.
    pub words_path: String,
    /// Size of the words tree in bytes.
    pub words_size_bytes: u64,
    /// Path of the docs file.
    pub docs_path: String,
    /// Size of the docs file in bytes.
    pub docs_size_bytes: u64,
}

/// Gathers statistics about the index stored at `words` and `docs`.
///
/// Run lengths are read from the docs file at the offsets the words tree
/// records; runs are not validated, see [`crate::admin::verify`] for that.
///
/// # Errors
///
/// Returns an error if either file is missing, cannot be mapped, or the
/// words tree header is inconsistent with its file.
pub fn stats(words: impl AsRef<Path>, docs: impl AsRef<Path>, opts: &AdminOpenOptions) -> Result<StatsReport> {
    let (words, docs) = (words.as_ref(), docs.as_ref());
    let handle = open_index(words, docs, opts)?;
    let reader = handle.words_reader()?;
    let header = *reader.header();

    let data = reader.data();
    let mut total = 0u64;
    let mut longest: Option<(u64, u64)> = None;
    for i in 0..header.num_entries {
        let word = data.get(2 * i);
        let start = data.get(2 * i + 1) / WORD_BYTES;
        if start >= handle.docs.len() {
            continue;
        }
        let len = handle.docs.get(start);
        total += len;
        if longest.map_or(true, |(_, best)| len > best) {
            longest = Some((word, len));
        }
    }
    let mean_run = if header.num_entries == 0 {
        0.0
    } else {
        total as f64 / header.num_entries as f64
    };

    Ok(StatsReport {
        words: WordsTreeSection {
            entries: header.num_entries,
            layers: header.layers,
            index_offset: header.index_offset,
            data_offset: header.data_offset,
        },
        postings: PostingsSection {
            total,
            longest_run: longest.map_or(0, |(_, len)| len),
            longest_run_word: longest.map(|(word, _)| word),
            mean_run,
        },
        filesystem: FilesystemStats {
            words_path: words.display().to_string(),
            words_size_bytes: fs::metadata(words)?.len(),
            docs_path: docs.display().to_string(),
            docs_size_bytes: fs::metadata(docs)?.len(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::journal::{InMemoryJournal, JournalTerm};
    use crate::index::{ConstructionContext, IdentityRewriter, Preindex};
    use tempfile::tempdir;

    #[test]
    fn stats_describe_runs() -> crate::admin::Result<()> {
        let dir = tempdir()?;
        let ctx = ConstructionContext::with_threads(dir.path(), 1)?;
        let mut journal = InMemoryJournal::default();
        for (doc, words) in [(1u64, &[5u64, 9][..]), (2, &[5]), (7, &[5])] {
            let terms = words.iter().map(|&w| JournalTerm::new(w, 1)).collect();
            journal.push(doc, terms);
        }
        let preindex = Preindex::construct(&journal, &IdentityRewriter, &ctx)?;
        let words = dir.path().join("words.dat");
        let docs = dir.path().join("docs.dat");
        preindex.finalize_index(&docs, &words, ctx.array_options())?;

        let report = stats(&words, &docs, &AdminOpenOptions::default())?;
        assert_eq!(report.words.entries, 2);
        assert_eq!(report.words.layers, 0);
        assert_eq!(report.postings.total, 4);
        assert_eq!(report.postings.longest_run, 3);
        assert_eq!(report.postings.longest_run_word, Some(5));
        assert!((report.postings.mean_run - 2.0).abs() < f64::EPSILON);
        assert_eq!(report.filesystem.docs_size_bytes, 6 * WORD_BYTES);
        Ok(())
    }
}
