use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::primitives::array::{ArrayOptions, SortingContext};
use crate::storage::btree::{BTreeBlockSize, BTreeContext};
use crate::types::{IndexError, Result};

/// Shape of the words tree: `(word_id, docs_byte_offset)` records.
pub const WORDS_BTREE_CONTEXT: BTreeContext = BTreeContext::new(5, 2, BTreeBlockSize::Bs512);

/// Default span length, in words, above which span sorts go to the pool.
pub const DEFAULT_PARALLEL_SORT_THRESHOLD: u64 = 8192;

/// Default in-memory sort limit, in words.
pub const DEFAULT_MEMORY_SORT_LIMIT: u64 = 1 << 22;

/// Everything a preindex build or merge needs besides its inputs.
#[derive(Clone, Debug)]
pub struct ConstructionContext {
    work_dir: PathBuf,
    sorting: SortingContext,
    array_options: ArrayOptions,
    pool: Arc<rayon::ThreadPool>,
    parallel_sort_threshold: u64,
}

impl ConstructionContext {
    /// Creates a context writing temporary files to `work_dir` and running
    /// parallel work on `pool`.
    pub fn new(work_dir: impl Into<PathBuf>, pool: Arc<rayon::ThreadPool>) -> Self {
        let work_dir = work_dir.into();
        Self {
            sorting: SortingContext::new(work_dir.clone(), DEFAULT_MEMORY_SORT_LIMIT),
            work_dir,
            array_options: ArrayOptions::default(),
            pool,
            parallel_sort_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
        }
    }

    /// Creates a context with a fresh pool of `threads` workers (0 picks the
    /// number of CPUs).
    pub fn with_threads(work_dir: impl Into<PathBuf>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("rindex-worker-{i}"))
            .build()
            .map_err(|_| IndexError::Invalid("failed to start worker pool"))?;
        Ok(Self::new(work_dir, Arc::new(pool)))
    }

    /// Replaces the sorting context.
    pub fn with_sorting(mut self, sorting: SortingContext) -> Self {
        self.sorting = sorting;
        self
    }

    /// Replaces the array backend options.
    pub fn with_array_options(mut self, options: ArrayOptions) -> Self {
        self.array_options = options;
        self
    }

    /// Sets the span length above which span sorts run on the pool.
    pub fn with_parallel_sort_threshold(mut self, words: u64) -> Self {
        self.parallel_sort_threshold = words;
        self
    }

    /// Directory for temporary files.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Sorting context for large spans.
    pub fn sorting(&self) -> &SortingContext {
        &self.sorting
    }

    /// Array backend options.
    pub fn array_options(&self) -> &ArrayOptions {
        &self.array_options
    }

    /// Worker pool.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Span length above which span sorts run on the pool.
    pub fn parallel_sort_threshold(&self) -> u64 {
        self.parallel_sort_threshold
    }
}
