#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, Once};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rindex::{
    index::{
        journal_file_name, AdHocTaskHeartbeat, ConstructionStep, IdentityRewriter, IndexConstructor,
        IndexConstructorOptions, IndexJournal, InMemoryJournal, JournalTerm, JournalWriter, NoopHeartbeat,
        ProcessHeartbeat, ReverseIndexReader, TaskHeartbeat, PREINDEX_PROGRESS_LABEL,
    },
    primitives::array::{ArrayOptions, LongQueryBuffer},
    types::{IndexError, Result},
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rindex=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

type Document = (u64, Vec<JournalTerm>);

/// Random documents with a skewed vocabulary, plus the postings they imply.
fn random_corpus(seed: u64, docs: u64, vocabulary: u64) -> (Vec<Document>, BTreeMap<u64, BTreeSet<u64>>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut corpus = Vec::new();
    let mut expected: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for doc_id in 0..docs {
        let doc_id = doc_id * 3 + 1;
        let terms: Vec<JournalTerm> = (0..rng.gen_range(0..20))
            .map(|_| {
                let skewed = rng.gen_range(0..vocabulary) % rng.gen_range(1..=vocabulary);
                let metadata = if rng.gen_ratio(1, 10) { 0 } else { rng.gen_range(1..=255) };
                JournalTerm::new(skewed, metadata)
            })
            .collect();
        for term in &terms {
            if term.metadata != 0 {
                expected.entry(term.term_id).or_default().insert(doc_id);
            }
        }
        corpus.push((doc_id, terms));
    }
    (corpus, expected)
}

fn write_shards(dir: &Path, corpus: &[Document], shards: usize) -> Result<()> {
    let mut writers = (0..shards)
        .map(|n| JournalWriter::create(dir.join(journal_file_name(n as u32))))
        .collect::<Result<Vec<_>>>()?;
    for (i, (doc_id, terms)) in corpus.iter().enumerate() {
        writers[i % shards].put(*doc_id, terms)?;
    }
    for writer in writers {
        writer.finish()?;
    }
    Ok(())
}

fn options(work: &TempDir, threads: usize) -> IndexConstructorOptions {
    IndexConstructorOptions::new(work.path())
        .with_threads(threads)
        .with_parallel_sort_threshold(64)
}

fn assert_matches(reader: &ReverseIndexReader, expected: &BTreeMap<u64, BTreeSet<u64>>) -> Result<()> {
    assert_eq!(reader.word_count(), expected.len() as u64);
    for (word, docs) in expected {
        let docs: Vec<u64> = docs.iter().copied().collect();
        assert_eq!(reader.documents(*word)?, Some(docs.clone()), "word {word}");
        assert_eq!(reader.num_documents(*word)?, docs.len() as u64);
    }
    Ok(())
}

#[test]
fn sharded_build_serves_every_posting() -> Result<()> {
    init_tracing();
    let journal_dir = TempDir::new()?;
    let work = TempDir::new()?;
    let out = TempDir::new()?;
    let (corpus, expected) = random_corpus(7, 3000, 1500);
    write_shards(journal_dir.path(), &corpus, 5)?;

    let words = out.path().join("words.dat");
    let docs = out.path().join("docs.dat");
    let built = IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, 3)).create_reverse_index(
        &NoopHeartbeat,
        "test",
        journal_dir.path(),
    )?;
    assert!(built);

    let reader = ReverseIndexReader::open(&docs, &words, &ArrayOptions::default())?;
    assert_matches(&reader, &expected)?;
    assert_eq!(reader.documents(u64::MAX)?, None);
    // temporary preindex files are all cleaned up
    assert_eq!(std::fs::read_dir(work.path())?.count(), 0);
    Ok(())
}

#[test]
fn result_does_not_depend_on_sharding() -> Result<()> {
    init_tracing();
    let (corpus, _) = random_corpus(11, 800, 300);
    let mut outputs = Vec::new();
    for (shards, threads) in [(1, 1), (4, 2), (7, 4)] {
        let journal_dir = TempDir::new()?;
        let work = TempDir::new()?;
        write_shards(journal_dir.path(), &corpus, shards)?;
        let words = work.path().join("words.dat");
        let docs = work.path().join("docs.dat");
        IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, threads)).create_reverse_index(
            &NoopHeartbeat,
            "test",
            journal_dir.path(),
        )?;
        outputs.push((std::fs::read(&words)?, std::fs::read(&docs)?));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
    Ok(())
}

#[test]
fn finalized_files_hold_runs_and_offsets() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let mut journal = InMemoryJournal::default();
    journal.push(1, vec![JournalTerm::new(5, 1)]);
    journal.push(2, vec![JournalTerm::new(5, 1), JournalTerm::new(9, 0)]);
    journal.push(4, vec![JournalTerm::new(9, 3)]);
    journal.push(7, vec![JournalTerm::new(5, 2)]);
    let journals: Vec<Box<dyn IndexJournal>> = vec![Box::new(journal)];

    let words = work.path().join("words.dat");
    let docs = work.path().join("docs.dat");
    IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, 1)).create_from_journals(
        &NoopHeartbeat,
        "test",
        &journals,
    )?;

    let docs_words: Vec<u64> = std::fs::read(&docs)?
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("word")))
        .collect();
    assert_eq!(docs_words, vec![3, 1, 2, 7, 1, 4]);

    let reader = ReverseIndexReader::open(&docs, &words, &ArrayOptions::default())?;
    assert_eq!(reader.documents(5)?, Some(vec![1, 2, 7]));
    assert_eq!(reader.documents(9)?, Some(vec![4]));

    let mut buffer = LongQueryBuffer::from_values(&[1, 3, 4, 7, 9]);
    reader.retain_documents(5, &mut buffer)?;
    assert_eq!(buffer.values(), &[1, 7]);
    let mut buffer = LongQueryBuffer::from_values(&[1, 3, 4, 7, 9]);
    reader.reject_documents(5, &mut buffer)?;
    assert_eq!(buffer.values(), &[3, 4, 9]);
    Ok(())
}

#[test]
fn rewriter_maps_document_ids() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let mut journal = InMemoryJournal::default();
    journal.push(3, vec![JournalTerm::new(1, 1)]);
    journal.push(1, vec![JournalTerm::new(1, 1)]);
    let journals: Vec<Box<dyn IndexJournal>> = vec![Box::new(journal)];

    let words = work.path().join("words.dat");
    let docs = work.path().join("docs.dat");
    IndexConstructor::new(&docs, &words, |id: u64| id * 100, options(&work, 1)).create_from_journals(
        &NoopHeartbeat,
        "test",
        &journals,
    )?;

    let reader = ReverseIndexReader::open(&docs, &words, &ArrayOptions::default())?;
    assert_eq!(reader.documents(1)?, Some(vec![100, 300]));
    Ok(())
}

#[test]
fn missing_journal_dir_writes_nothing() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let words = work.path().join("words.dat");
    let docs = work.path().join("docs.dat");
    let built = IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, 1)).create_reverse_index(
        &NoopHeartbeat,
        "test",
        &work.path().join("absent"),
    )?;
    assert!(!built);
    assert!(!words.exists());
    assert!(!docs.exists());

    let reader = ReverseIndexReader::open(&docs, &words, &ArrayOptions::default())?;
    assert!(reader.is_empty());
    assert_eq!(reader.documents(1)?, None);
    let mut buffer = LongQueryBuffer::from_values(&[1, 2]);
    reader.retain_documents(1, &mut buffer)?;
    assert!(buffer.values().is_empty());
    Ok(())
}

#[test]
fn corrupt_shard_fails_without_leaving_work_files() -> Result<()> {
    init_tracing();
    let journal_dir = TempDir::new()?;
    let work = TempDir::new()?;
    let out = TempDir::new()?;
    let (corpus, _) = random_corpus(19, 600, 200);
    write_shards(journal_dir.path(), &corpus, 3)?;

    // flip the last checksum byte of the final shard
    let last = journal_dir.path().join(journal_file_name(2));
    let mut bytes = std::fs::read(&last)?;
    let end = bytes.len() - 1;
    bytes[end] ^= 0xFF;
    std::fs::write(&last, bytes)?;

    let words = out.path().join("words.dat");
    let docs = out.path().join("docs.dat");
    let result = IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, 2)).create_reverse_index(
        &NoopHeartbeat,
        "test",
        journal_dir.path(),
    );
    assert!(matches!(result, Err(IndexError::Corruption(_))), "{result:?}");
    assert_eq!(std::fs::read_dir(work.path())?.count(), 0);
    assert!(!words.exists());
    Ok(())
}

#[derive(Default)]
struct RecordingHeartbeat {
    steps: Mutex<Vec<ConstructionStep>>,
    counter: Mutex<Vec<(String, u64, u64)>>,
}

struct Recorder<'a>(&'a RecordingHeartbeat);

impl TaskHeartbeat for Recorder<'_> {
    fn progress(&self, step: ConstructionStep) {
        self.0.steps.lock().expect("steps").push(step);
    }
}

impl AdHocTaskHeartbeat for Recorder<'_> {
    fn progress(&self, label: &str, current: u64, total: u64) {
        self.0.counter.lock().expect("counter").push((label.to_string(), current, total));
    }
}

impl ProcessHeartbeat for RecordingHeartbeat {
    fn create_task_heartbeat(&self, _task: &str) -> Box<dyn TaskHeartbeat + '_> {
        Box::new(Recorder(self))
    }

    fn create_ad_hoc_heartbeat(&self, _task: &str) -> Box<dyn AdHocTaskHeartbeat + '_> {
        Box::new(Recorder(self))
    }
}

#[test]
fn heartbeat_sees_steps_and_merge_counter() -> Result<()> {
    init_tracing();
    let journal_dir = TempDir::new()?;
    let work = TempDir::new()?;
    let (corpus, _) = random_corpus(3, 200, 50);
    write_shards(journal_dir.path(), &corpus, 4)?;

    let heartbeat = RecordingHeartbeat::default();
    let words = work.path().join("words.dat");
    let docs = work.path().join("docs.dat");
    IndexConstructor::new(&docs, &words, IdentityRewriter, options(&work, 2)).create_reverse_index(
        &heartbeat,
        "test",
        journal_dir.path(),
    )?;

    assert_eq!(*heartbeat.steps.lock().expect("steps"), ConstructionStep::ALL.to_vec());
    let counter = heartbeat.counter.lock().expect("counter");
    // four constructions and three merges
    assert_eq!(counter.len(), 7);
    assert!(counter.iter().all(|(label, _, total)| label == PREINDEX_PROGRESS_LABEL && *total == 7));
    assert_eq!(counter.iter().map(|(_, current, _)| *current).max(), Some(7));
    Ok(())
}
