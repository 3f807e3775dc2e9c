use std::path::Path;

use serde::Serialize;

use crate::primitives::array::{LongArray, LongRead};
use crate::storage::btree::{BTreeContext, BTreeHeader, BTreeReader};
use crate::types::WORD_BYTES;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_index;
use crate::admin::Result;

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// The words tree only: header, index layers and key order.
    Fast,
    /// The words tree plus every posting run in the docs file.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Critical issue indicating data corruption or integrity failure.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Records in the words tree.
    pub words: u64,
    /// Index entries compared against the data block.
    pub index_entries: u64,
    /// Posting runs walked in the docs file.
    pub runs: u64,
    /// Postings walked in the docs file.
    pub postings: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// List of issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the data structures examined.
    pub counts: VerifyCounts,
}

/// Verifies the integrity of a finished index.
///
/// `VerifyLevel::Fast` checks the words tree: the header against the file,
/// every index entry against the data block, and that word ids strictly
/// ascend. `VerifyLevel::Full` also walks the docs file: run offsets must be
/// word aligned and tile the file exactly, and each run must strictly ascend.
///
/// # Errors
///
/// Returns an error if either file cannot be opened. Damage inside the files
/// is reported as findings, not errors.
pub fn verify(words: &Path, docs: &Path, opts: &AdminOpenOptions, level: VerifyLevel) -> Result<VerifyReport> {
    let handle = open_index(words, docs, opts)?;
    let mut findings = Vec::new();
    let mut counts = VerifyCounts::default();

    match handle.words_reader() {
        Ok(reader) => {
            counts.words = reader.num_entries();
            check_index_layers(&reader, &mut findings, &mut counts);
            check_word_order(&reader, &mut findings);
            if matches!(level, VerifyLevel::Full) {
                check_runs(&reader, &handle.docs, &mut findings, &mut counts);
            }
        }
        Err(err) => push_error(&mut findings, format!("words tree unreadable: {err}")),
    }

    Ok(VerifyReport {
        level,
        success: findings.is_empty(),
        findings,
        counts,
    })
}

fn push_error(findings: &mut Vec<VerifyFinding>, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding::error(message));
    }
}

fn check_index_layers(reader: &BTreeReader, findings: &mut Vec<VerifyFinding>, counts: &mut VerifyCounts) {
    let header: &BTreeHeader = reader.header();
    let ctx: BTreeContext = crate::index::WORDS_BTREE_CONTEXT;
    let entry_size = ctx.entry_size();
    let index = reader.index();
    let data = reader.data();
    for (layer, &start) in header.layer_offsets(&ctx).iter().enumerate() {
        let layer = layer as u32;
        let base = start - header.index_offset;
        let span = ctx.layer_span(layer);
        let entries = ctx.layer_entries(header.num_entries, layer);
        for i in 0..ctx.index_layer_size(header.num_entries, layer) {
            let expected = if i < entries {
                let last = ((i + 1).saturating_mul(span)).min(header.num_entries) - 1;
                data.get(last * entry_size)
            } else {
                u64::MAX
            };
            let found = index.get(base + i);
            if found != expected {
                push_error(
                    findings,
                    format!("index layer {layer} entry {i} holds {found}, expected {expected}"),
                );
            }
            counts.index_entries += 1;
        }
    }
}

fn check_word_order(reader: &BTreeReader, findings: &mut Vec<VerifyFinding>) {
    let data = reader.data();
    let mut previous: Option<u64> = None;
    for i in 0..reader.num_entries() {
        let word = data.get(2 * i);
        if let Some(prev) = previous {
            if word <= prev {
                push_error(findings, format!("word {word} at record {i} does not follow {prev}"));
            }
        }
        previous = Some(word);
    }
}

fn check_runs(reader: &BTreeReader, docs: &LongArray, findings: &mut Vec<VerifyFinding>, counts: &mut VerifyCounts) {
    let data = reader.data();
    let mut expected = 0u64;
    for i in 0..reader.num_entries() {
        let word = data.get(2 * i);
        let byte_offset = data.get(2 * i + 1);
        if byte_offset % WORD_BYTES != 0 {
            push_error(findings, format!("word {word} run offset {byte_offset} is not word aligned"));
            return;
        }
        let start = byte_offset / WORD_BYTES;
        if start != expected {
            push_error(
                findings,
                format!("word {word} run starts at word {start}, expected {expected}"),
            );
            return;
        }
        if start >= docs.len() {
            push_error(findings, format!("word {word} run starts past end of docs file"));
            return;
        }
        let len = docs.get(start);
        let end = start.saturating_add(1).saturating_add(len);
        if end > docs.len() {
            push_error(findings, format!("word {word} run of {len} overruns docs file"));
            return;
        }
        for j in start + 2..end {
            let (prev, doc) = (docs.get(j - 1), docs.get(j));
            if doc <= prev {
                push_error(findings, format!("word {word} run has {doc} after {prev}"));
                break;
            }
        }
        counts.runs += 1;
        counts.postings += len;
        expected = end;
    }
    if expected != docs.len() {
        push_error(
            findings,
            format!("runs cover {expected} words of a {}-word docs file", docs.len()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::journal::{InMemoryJournal, JournalTerm};
    use crate::index::{ConstructionContext, IdentityRewriter, Preindex};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn build(postings: &[(u64, &[u64])]) -> crate::admin::Result<(TempDir, PathBuf, PathBuf)> {
        let dir = tempdir()?;
        let ctx = ConstructionContext::with_threads(dir.path(), 1)?;
        let mut journal = InMemoryJournal::default();
        for &(word, docs) in postings {
            for &doc in docs {
                journal.push(doc, vec![JournalTerm::new(word, 1)]);
            }
        }
        let preindex = Preindex::construct(&journal, &IdentityRewriter, &ctx)?;
        let words = dir.path().join("words.dat");
        let docs = dir.path().join("docs.dat");
        preindex.finalize_index(&docs, &words, ctx.array_options())?;
        preindex.delete()?;
        Ok((dir, words, docs))
    }

    #[test]
    fn finished_index_verifies_clean() -> crate::admin::Result<()> {
        let postings: Vec<(u64, Vec<u64>)> = (0..700).map(|w| (w * 3, vec![w, w + 1])).collect();
        let borrowed: Vec<(u64, &[u64])> = postings.iter().map(|(w, d)| (*w, d.as_slice())).collect();
        let (_dir, words, docs) = build(&borrowed)?;

        let report = verify(&words, &docs, &AdminOpenOptions::default(), VerifyLevel::Full)?;
        assert!(report.success, "{:?}", report.findings);
        assert_eq!(report.counts.words, 700);
        assert_eq!(report.counts.runs, 700);
        assert_eq!(report.counts.postings, 1400);
        assert!(report.counts.index_entries > 0);
        Ok(())
    }

    #[test]
    fn unsorted_run_is_reported_only_by_full() -> crate::admin::Result<()> {
        let (_dir, words, docs) = build(&[(5, &[1, 2, 7]), (9, &[4])])?;
        LongArray::from_vec(vec![3, 1, 7, 2, 1, 4]).write(&docs)?;

        let fast = verify(&words, &docs, &AdminOpenOptions::default(), VerifyLevel::Fast)?;
        assert!(fast.success);
        let full = verify(&words, &docs, &AdminOpenOptions::default(), VerifyLevel::Full)?;
        assert!(!full.success);
        assert!(full.findings[0].message.contains("has 2 after 7"));
        Ok(())
    }

    #[test]
    fn untiled_docs_file_is_reported() -> crate::admin::Result<()> {
        let (_dir, words, docs) = build(&[(5, &[1, 2, 7])])?;
        LongArray::from_vec(vec![3, 1, 2, 7, 0]).write(&docs)?;

        let report = verify(&words, &docs, &AdminOpenOptions::default(), VerifyLevel::Full)?;
        assert!(!report.success);
        assert!(report.findings[0].message.contains("runs cover 4 words"));
        Ok(())
    }

    #[test]
    fn missing_files_are_errors() {
        let dir = tempdir().expect("tempdir");
        let result = verify(
            &dir.path().join("words.dat"),
            &dir.path().join("docs.dat"),
            &AdminOpenOptions::default(),
            VerifyLevel::Fast,
        );
        assert!(matches!(result, Err(crate::admin::AdminError::MissingIndex(_))));
    }
}
