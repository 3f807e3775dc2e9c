#![forbid(unsafe_code)]

//! Index administration utilities.
//!
//! This module inspects finished indexes: verification of the words tree and
//! the docs file it points into, and statistics reporting.

mod error;
mod options;
mod stats;
mod util;
mod verify;

/// Error types for administrative operations.
///
/// Defines error conditions that can occur during administrative tasks.
pub use error::{AdminError, Result};

/// Configuration options for opening an index in admin mode.
pub use options::AdminOpenOptions;

/// Statistics collection and reporting.
///
/// Reports the shape of the words tree, posting run figures and file sizes.
pub use stats::{stats, FilesystemStats, PostingsSection, StatsReport, WordsTreeSection};

/// Index integrity verification.
///
/// Verifies the structural integrity of an index and reports any issues found.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity};

/// Utility functions for opening index files.
pub use util::{open_index, IndexHandle};
