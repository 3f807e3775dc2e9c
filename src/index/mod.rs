#![forbid(unsafe_code)]

//! Reverse index construction and lookup.
//!
//! Journal shards are turned into preindexes in parallel, merged pairwise
//! into one, and finalized into two files: a docs file of per-word posting
//! runs and a words B-tree mapping each word to its run.

/// Shard-parallel index builds.
pub mod constructor;
/// Shared construction settings.
pub mod context;
pub mod heartbeat;
pub mod journal;
pub mod preindex;
/// Lookups against a finished index.
pub mod reader;
/// Document id remapping during construction.
pub mod rewriter;

pub use constructor::{IndexConstructor, IndexConstructorOptions, PREINDEX_PROGRESS_LABEL};
pub use context::{ConstructionContext, WORDS_BTREE_CONTEXT};
pub use heartbeat::{
    AdHocTaskHeartbeat, ConstructionStep, LoggingHeartbeat, NoopHeartbeat, ProcessHeartbeat, TaskHeartbeat,
};
pub use journal::{
    find_journal_files, journal_file_name, InMemoryJournal, IndexJournal, JournalCursor, JournalDocument,
    JournalFile, JournalTerm, JournalWriter,
};
pub use preindex::{Preindex, PreindexDocuments, PreindexReference, PreindexSegments, WordSegment};
pub use reader::ReverseIndexReader;
pub use rewriter::{DocIdRewriter, IdentityRewriter};
