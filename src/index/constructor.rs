use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::index::context::{ConstructionContext, DEFAULT_MEMORY_SORT_LIMIT, DEFAULT_PARALLEL_SORT_THRESHOLD};
use crate::index::heartbeat::{AdHocTaskHeartbeat, ConstructionStep, ProcessHeartbeat};
use crate::index::journal::{find_journal_files, IndexJournal, JournalFile};
use crate::index::preindex::{Preindex, PreindexReference};
use crate::index::rewriter::DocIdRewriter;
use crate::primitives::array::{ArrayOptions, SortingContext};
use crate::types::Result;

/// Label of the ad-hoc counter reported while shards are built and merged.
pub const PREINDEX_PROGRESS_LABEL: &str = "PREINDEX/MERGE";

/// Tuning for [`IndexConstructor`].
#[derive(Clone, Debug)]
pub struct IndexConstructorOptions {
    /// Directory for temporary files.
    pub work_dir: PathBuf,
    /// Worker threads; 0 picks the number of CPUs.
    pub threads: usize,
    /// Array backend options for every intermediate file.
    pub array_options: ArrayOptions,
    /// Largest span, in words, sorted in memory.
    pub memory_sort_limit: u64,
    /// Span length, in words, above which span sorts run on the pool.
    pub parallel_sort_threshold: u64,
}

impl IndexConstructorOptions {
    /// Defaults with temporary files under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            threads: 0,
            array_options: ArrayOptions::default(),
            memory_sort_limit: DEFAULT_MEMORY_SORT_LIMIT,
            parallel_sort_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
        }
    }

    /// Sets the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the array backend options.
    pub fn with_array_options(mut self, options: ArrayOptions) -> Self {
        self.array_options = options;
        self
    }

    /// Sets the in-memory sort limit.
    pub fn with_memory_sort_limit(mut self, words: u64) -> Self {
        self.memory_sort_limit = words;
        self
    }

    /// Sets the parallel span sort threshold.
    pub fn with_parallel_sort_threshold(mut self, words: u64) -> Self {
        self.parallel_sort_threshold = words;
        self
    }

    fn context(&self, scratch: &Path) -> Result<ConstructionContext> {
        self.array_options.validate()?;
        Ok(ConstructionContext::with_threads(scratch, self.threads)?
            .with_sorting(SortingContext::new(scratch, self.memory_sort_limit))
            .with_array_options(self.array_options)
            .with_parallel_sort_threshold(self.parallel_sort_threshold))
    }
}

/// Builds the docs file and words tree from journal shards.
pub struct IndexConstructor {
    docs_out: PathBuf,
    words_out: PathBuf,
    rewriter: Arc<dyn DocIdRewriter>,
    options: IndexConstructorOptions,
}

impl IndexConstructor {
    /// Creates a constructor writing to `docs_out` and `words_out`.
    pub fn new(
        docs_out: impl Into<PathBuf>,
        words_out: impl Into<PathBuf>,
        rewriter: impl DocIdRewriter + 'static,
        options: IndexConstructorOptions,
    ) -> Self {
        Self {
            docs_out: docs_out.into(),
            words_out: words_out.into(),
            rewriter: Arc::new(rewriter),
            options,
        }
    }

    /// Builds the index from every journal shard in `source_dir`.
    ///
    /// A directory without shards is not an error: nothing is written and
    /// `false` is returned.
    pub fn create_reverse_index(
        &self,
        heartbeat: &dyn ProcessHeartbeat,
        process_name: &str,
        source_dir: &Path,
    ) -> Result<bool> {
        let files = find_journal_files(source_dir)?;
        if files.is_empty() {
            warn!(dir = %source_dir.display(), "constructor.no_journal");
            return Ok(false);
        }
        let journals = files
            .into_iter()
            .map(|path| JournalFile::open(path).map(|file| Box::new(file) as Box<dyn IndexJournal>))
            .collect::<Result<Vec<_>>>()?;
        self.create_from_journals(heartbeat, process_name, &journals)
    }

    /// Builds the index from already opened journals, one shard each.
    /// Returns whether an index was written.
    ///
    /// Intermediate files live in a fresh directory under the work dir,
    /// removed when the build ends, whether it succeeds or fails.
    pub fn create_from_journals(
        &self,
        heartbeat: &dyn ProcessHeartbeat,
        process_name: &str,
        journals: &[Box<dyn IndexJournal>],
    ) -> Result<bool> {
        if journals.is_empty() {
            warn!("constructor.no_journal");
            return Ok(false);
        }
        let started = Instant::now();
        fs::create_dir_all(&self.options.work_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("rindex-build-")
            .tempdir_in(&self.options.work_dir)?;
        let ctx = self.options.context(scratch.path())?;
        let steps = heartbeat.create_task_heartbeat(process_name);
        let counter = heartbeat.create_ad_hoc_heartbeat(process_name);

        steps.progress(ConstructionStep::Construct);
        let progress = Progress::new(counter.as_ref(), 2 * journals.len() as u64 - 1);
        let reduced = ctx.pool().install(|| {
            journals
                .par_iter()
                .map(|journal| -> Result<PreindexReference> {
                    let reference = Preindex::construct(journal.as_ref(), self.rewriter.as_ref(), &ctx)?
                        .close_to_reference()?;
                    progress.tick();
                    Ok(reference)
                })
                .try_reduce_with(|left, right| {
                    let merged = merge_references(&ctx, left, right)?;
                    progress.tick();
                    Ok(merged)
                })
        });
        let Some(reference) = reduced.transpose()? else {
            return Ok(false);
        };

        steps.progress(ConstructionStep::Finalize);
        let preindex = reference.open(ctx.array_options())?;
        preindex.finalize_index(&self.docs_out, &self.words_out, ctx.array_options())?;
        preindex.delete()?;
        drop(ctx);
        scratch.close()?;

        steps.progress(ConstructionStep::Finished);
        info!(
            shards = journals.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            words = %self.words_out.display(),
            "constructor.finished"
        );
        Ok(true)
    }
}

/// Merges two closed preindexes, deleting the inputs once the result exists.
fn merge_references(
    ctx: &ConstructionContext,
    left: PreindexReference,
    right: PreindexReference,
) -> Result<PreindexReference> {
    let left = left.open(ctx.array_options())?;
    let right = right.open(ctx.array_options())?;
    let merged = Preindex::merge(ctx, &left, &right)?;
    left.delete()?;
    right.delete()?;
    merged.close_to_reference()
}

/// Shared counter feeding the ad-hoc heartbeat from worker threads.
struct Progress<'a> {
    heartbeat: &'a dyn AdHocTaskHeartbeat,
    done: AtomicU64,
    total: u64,
}

impl<'a> Progress<'a> {
    fn new(heartbeat: &'a dyn AdHocTaskHeartbeat, total: u64) -> Self {
        Self {
            heartbeat,
            done: AtomicU64::new(0),
            total,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.heartbeat.progress(PREINDEX_PROGRESS_LABEL, done, self.total);
    }
}
