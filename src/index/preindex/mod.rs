//! Mergeable intermediate form of the reverse index.
//!
//! A preindex is a pair of on-disk structures: [`PreindexSegments`] (sorted
//! word ids with posting counts) and [`PreindexDocuments`] (each word's
//! postings in a sorted span, spans laid end to end in word order). Two
//! preindexes merge into a third holding the union of their postings
//! without loading either into memory.

mod documents;
mod reference;
mod segments;

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{error, info};

use crate::index::context::{ConstructionContext, WORDS_BTREE_CONTEXT};
use crate::index::journal::IndexJournal;
use crate::index::rewriter::DocIdRewriter;
use crate::primitives::array::{merge_arrays, ArrayOptions, LongArray, LongArraySearch, LongRead, LongWrite};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::btree::BTreeWriter;
use crate::types::{IndexError, Result, WORD_BYTES};

pub use documents::PreindexDocuments;
pub use reference::PreindexReference;
pub use segments::{PreindexSegments, SegmentIter, WordSegment};

/// Creates an empty, persistent temporary file in `dir`.
pub(crate) fn create_temp_file(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".dat")
        .tempfile_in(dir)?;
    let (_, path) = file.keep().map_err(|err| IndexError::Io(err.error))?;
    Ok(path)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Cuts `path` down to `words` words.
fn truncate_words(path: &Path, words: u64) -> Result<()> {
    StdFileIo::open(path)?.set_len_words(words)
}

/// Word segments and their postings.
pub struct Preindex {
    segments: PreindexSegments,
    documents: PreindexDocuments,
}

impl Preindex {
    /// Builds a preindex of `journal` in new temporary files under the
    /// context's work directory.
    pub fn construct(
        journal: &dyn IndexJournal,
        rewriter: &dyn DocIdRewriter,
        ctx: &ConstructionContext,
    ) -> Result<Self> {
        let segments = PreindexSegments::construct(journal, ctx)?;
        let documents = PreindexDocuments::construct(journal, rewriter, &segments, ctx)?;
        Ok(Self { segments, documents })
    }

    pub(crate) fn from_parts(segments: PreindexSegments, documents: PreindexDocuments) -> Self {
        Self { segments, documents }
    }

    /// The word segments.
    pub fn segments(&self) -> &PreindexSegments {
        &self.segments
    }

    /// The postings.
    pub fn documents(&self) -> &PreindexDocuments {
        &self.documents
    }

    /// Postings of `word_id`, or `None` when the word is absent.
    pub fn postings(&self, word_id: u64) -> Option<Vec<u64>> {
        let words = self.segments.word_ids();
        if words.binary_search(word_id, 0, words.len()) < 0 {
            return None;
        }
        let segment = self.segments.iter().find(|s| s.word_id == word_id)?;
        let docs = self.documents.array();
        Some((segment.start..segment.end).map(|i| docs.get(i)).collect())
    }

    /// Flushes every backing file.
    pub fn force(&self) -> Result<()> {
        self.segments.force()?;
        self.documents.force()
    }

    /// Flushes and unmaps the preindex, returning its files.
    pub fn close_to_reference(self) -> Result<PreindexReference> {
        let (word_ids_file, counts_file) = self.segments.into_files()?;
        let documents_file = self.documents.into_file()?;
        Ok(PreindexReference {
            word_ids_file,
            counts_file,
            documents_file,
        })
    }

    /// Removes every backing file.
    pub fn delete(self) -> Result<()> {
        self.segments.delete()?;
        self.documents.delete()
    }

    /// Merges two preindexes into a new one in the context's work directory.
    /// The inputs are left in place.
    pub fn merge(ctx: &ConstructionContext, left: &Preindex, right: &Preindex) -> Result<Preindex> {
        left.force()?;
        right.force()?;

        let mut segments = PreindexSegments::merged(ctx, &left.segments, &right.segments)?;
        let docs_file = create_temp_file(ctx.work_dir(), "docs")?;
        let upper_bound = left.documents.len() + right.documents.len();
        let mut merged = LongArray::map_for_writing(&docs_file, upper_bound, ctx.array_options())?;

        let left_io = StdFileIo::open_read_only(left.documents.file())?;
        let right_io = StdFileIo::open_read_only(right.documents.file())?;
        let mut left_iter = left.segments.iter().peekable();
        let mut right_iter = right.segments.iter().peekable();

        {
            let mut dest = segments.construction_cursor();
            while dest.can_put_more() {
                let word = dest.word_id();
                let start = dest.start();
                let from_left = left_iter.next_if(|s| s.word_id == word);
                let from_right = right_iter.next_if(|s| s.word_id == word);
                let written = match (from_left, from_right) {
                    (Some(l), Some(r)) => merge_arrays(
                        &mut merged,
                        start,
                        left.documents.array(),
                        l.start..l.end,
                        right.documents.array(),
                        r.start..r.end,
                    ),
                    (Some(only), None) => {
                        merged.transfer_from(&left_io, only.start, start, start + only.len())?;
                        only.len()
                    }
                    (None, Some(only)) => {
                        merged.transfer_from(&right_io, only.start, start, start + only.len())?;
                        only.len()
                    }
                    (None, None) => {
                        error!(word, "preindex.merge.orphan_word");
                        return Err(IndexError::Invariant(format!(
                            "merged word {word} is in neither source"
                        )));
                    }
                };
                dest.put_next(written);
            }
        }

        if left_iter.peek().is_some() {
            error!("preindex.merge.left_remaining");
            return Err(IndexError::Invariant("left has more to go".into()));
        }
        if right_iter.peek().is_some() {
            error!("preindex.merge.right_remaining");
            return Err(IndexError::Invariant("right has more to go".into()));
        }

        segments.force()?;
        merged.force()?;
        drop(merged);

        let written = segments.total_size();
        if written != upper_bound {
            truncate_words(&docs_file, written)?;
            info!(
                path = %docs_file.display(),
                from = upper_bound * WORD_BYTES,
                to = written * WORD_BYTES,
                "preindex.merge.shrunk"
            );
        }
        let documents = PreindexDocuments::open(docs_file, ctx.array_options())?;
        Ok(Preindex { segments, documents })
    }

    /// Writes the permanent index files.
    ///
    /// `docs_out` receives, per word in ascending order, the run
    /// `[len][doc_id x len]` with duplicates dropped. `words_out` receives a
    /// B-tree of `(word_id, byte offset of the run in docs_out)`.
    pub fn finalize_index(&self, docs_out: &Path, words_out: &Path, options: &ArrayOptions) -> Result<()> {
        remove_if_exists(docs_out)?;
        remove_if_exists(words_out)?;

        let num_words = self.segments.len();
        let postings = self.documents.array();
        let mut offsets = LongArray::allocate(num_words, options)?;

        let upper_bound = num_words + self.documents.len();
        let mut docs = LongArray::map_for_writing(docs_out, upper_bound, options)?;
        let mut pos = 0u64;
        for (i, segment) in self.segments.iter().enumerate() {
            offsets.set(i as u64, pos * WORD_BYTES);
            let run_start = pos + 1;
            let mut run_end = run_start;
            for j in segment.start..segment.end {
                let doc = postings.get(j);
                if run_end == run_start || docs.get(run_end - 1) != doc {
                    docs.set(run_end, doc);
                    run_end += 1;
                }
            }
            docs.set(pos, run_end - run_start);
            pos = run_end;
        }
        docs.force()?;
        drop(docs);
        if pos != upper_bound {
            truncate_words(docs_out, pos)?;
        }

        let word_ids = self.segments.word_ids();
        let size = WORDS_BTREE_CONTEXT.calculate_size(num_words)?;
        let mut words = LongArray::map_for_writing(words_out, size, options)?;
        BTreeWriter::new(&mut words, WORDS_BTREE_CONTEXT).write(0, num_words, |slice| {
            for i in 0..num_words {
                slice.set(2 * i, word_ids.get(i));
                slice.set(2 * i + 1, offsets.get(i));
            }
            Ok(())
        })?;
        words.force()?;

        info!(
            words = num_words,
            postings = pos - num_words,
            docs = %docs_out.display(),
            "preindex.finalized"
        );
        Ok(())
    }
}
