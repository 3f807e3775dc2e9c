//! Postings journals: the per-document term streams construction consumes.
//!
//! A shard file is little-endian:
//!
//! ```text
//! "RIJ1"
//! 0x01 [u64 doc_id][u32 n][(u64 term_id, u8 metadata) x n]   per document
//! 0xFF [u64 doc_count][u32 crc32]                             terminator
//! ```
//!
//! The checksum covers every byte before the terminator tag.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, error};

use crate::types::{IndexError, Result};

const MAGIC: &[u8; 4] = b"RIJ1";

/// Upper bound on terms reserved up front; a record's count is unverified until the checksum.
const MAX_TERM_RESERVE: u32 = 4096;
const TAG_DOCUMENT: u8 = 0x01;
const TAG_END: u8 = 0xFF;
const FILE_PREFIX: &str = "index-journal-";
const FILE_SUFFIX: &str = ".dat";

/// One term occurrence within a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalTerm {
    /// Term identifier.
    pub term_id: u64,
    /// Metadata flags; terms with zero metadata are not indexed.
    pub metadata: u8,
}

impl JournalTerm {
    /// Creates a term occurrence.
    pub fn new(term_id: u64, metadata: u8) -> Self {
        Self { term_id, metadata }
    }
}

/// A document and its terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalDocument {
    /// Raw document identifier, before rewriting.
    pub doc_id: u64,
    /// Terms in journal order.
    pub terms: Vec<JournalTerm>,
}

impl JournalDocument {
    /// Creates a document.
    pub fn new(doc_id: u64, terms: Vec<JournalTerm>) -> Self {
        Self { doc_id, terms }
    }
}

/// Pull cursor over a journal's documents.
pub trait JournalCursor {
    /// Advances to the next document; false once the journal is exhausted.
    fn next_document(&mut self) -> Result<bool>;

    /// Identifier of the current document.
    fn document_id(&self) -> u64;

    /// Terms of the current document.
    fn terms(&self) -> &[JournalTerm];
}

/// A journal that can be scanned any number of times.
pub trait IndexJournal: Send + Sync {
    /// Opens a cursor positioned before the first document.
    fn open_cursor(&self) -> Result<Box<dyn JournalCursor + '_>>;
}

/// A journal held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryJournal {
    documents: Vec<JournalDocument>,
}

impl InMemoryJournal {
    /// Creates a journal over `documents`.
    pub fn new(documents: Vec<JournalDocument>) -> Self {
        Self { documents }
    }

    /// Appends a document.
    pub fn push(&mut self, doc_id: u64, terms: Vec<JournalTerm>) {
        self.documents.push(JournalDocument::new(doc_id, terms));
    }

    /// The documents, in order.
    pub fn documents(&self) -> &[JournalDocument] {
        &self.documents
    }
}

struct SliceCursor<'a> {
    documents: &'a [JournalDocument],
    next: usize,
}

impl JournalCursor for SliceCursor<'_> {
    fn next_document(&mut self) -> Result<bool> {
        if self.next >= self.documents.len() {
            return Ok(false);
        }
        self.next += 1;
        Ok(true)
    }

    fn document_id(&self) -> u64 {
        self.documents[self.next - 1].doc_id
    }

    fn terms(&self) -> &[JournalTerm] {
        &self.documents[self.next - 1].terms
    }
}

impl IndexJournal for InMemoryJournal {
    fn open_cursor(&self) -> Result<Box<dyn JournalCursor + '_>> {
        Ok(Box::new(SliceCursor {
            documents: &self.documents,
            next: 0,
        }))
    }
}

/// A journal shard file.
#[derive(Clone, Debug)]
pub struct JournalFile {
    path: PathBuf,
}

impl JournalFile {
    /// Opens `path`, checking its magic bytes.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut magic = [0u8; 4];
        File::open(&path)?
            .read_exact(&mut magic)
            .map_err(truncated)?;
        if &magic != MAGIC {
            return Err(IndexError::Corruption("journal file has bad magic"));
        }
        Ok(Self { path })
    }

    /// Location of the shard.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexJournal for JournalFile {
    fn open_cursor(&self) -> Result<Box<dyn JournalCursor + '_>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut hasher = crc32fast::Hasher::new();
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(truncated)?;
        hasher.update(&magic);
        Ok(Box::new(FileCursor {
            reader,
            hasher,
            doc_id: 0,
            terms: Vec::new(),
            documents: 0,
            finished: false,
        }))
    }
}

fn truncated(err: io::Error) -> IndexError {
    if err.kind() == ErrorKind::UnexpectedEof {
        IndexError::Corruption("journal file is truncated")
    } else {
        IndexError::Io(err)
    }
}

struct FileCursor {
    reader: BufReader<File>,
    hasher: crc32fast::Hasher,
    doc_id: u64,
    terms: Vec<JournalTerm>,
    documents: u64,
    finished: bool,
}

impl FileCursor {
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.reader.read_exact(&mut bytes).map_err(truncated)?;
        Ok(bytes)
    }

    fn read_hashed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_array::<N>()?;
        self.hasher.update(&bytes);
        Ok(bytes)
    }

    fn read_document(&mut self) -> Result<()> {
        self.doc_id = u64::from_le_bytes(self.read_hashed()?);
        let count = u32::from_le_bytes(self.read_hashed()?);
        self.terms.clear();
        self.terms.reserve(count.min(MAX_TERM_RESERVE) as usize);
        for _ in 0..count {
            let term_id = u64::from_le_bytes(self.read_hashed()?);
            let [metadata] = self.read_hashed::<1>()?;
            self.terms.push(JournalTerm { term_id, metadata });
        }
        self.documents += 1;
        Ok(())
    }

    fn read_terminator(&mut self) -> Result<()> {
        let expected = self.hasher.clone().finalize();
        let count = u64::from_le_bytes(self.read_array()?);
        let crc = u32::from_le_bytes(self.read_array()?);
        if count != self.documents {
            error!(stored = count, read = self.documents, "journal.count_mismatch");
            return Err(IndexError::Corruption("journal document count mismatch"));
        }
        if crc != expected {
            error!(stored = crc, computed = expected, "journal.crc_mismatch");
            return Err(IndexError::Corruption("journal checksum mismatch"));
        }
        let mut trailing = [0u8; 1];
        if self.reader.read(&mut trailing)? != 0 {
            return Err(IndexError::Corruption("journal has bytes after its terminator"));
        }
        Ok(())
    }
}

impl JournalCursor for FileCursor {
    fn next_document(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        let mut tag = [0u8; 1];
        self.reader.read_exact(&mut tag).map_err(truncated)?;
        match tag[0] {
            TAG_DOCUMENT => {
                self.hasher.update(&tag);
                self.read_document()?;
                Ok(true)
            }
            TAG_END => {
                self.read_terminator()?;
                self.finished = true;
                self.terms.clear();
                Ok(false)
            }
            _ => Err(IndexError::Corruption("journal has an unknown record tag")),
        }
    }

    fn document_id(&self) -> u64 {
        self.doc_id
    }

    fn terms(&self) -> &[JournalTerm] {
        &self.terms
    }
}

/// Writes a journal shard file.
pub struct JournalWriter {
    out: BufWriter<File>,
    hasher: crc32fast::Hasher,
    documents: u64,
    path: PathBuf,
}

impl JournalWriter {
    /// Creates (or truncates) the shard at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut writer = Self {
            out: BufWriter::new(File::create(&path)?),
            hasher: crc32fast::Hasher::new(),
            documents: 0,
            path,
        };
        writer.write_hashed(MAGIC)?;
        Ok(writer)
    }

    fn write_hashed(&mut self, bytes: &[u8]) -> Result<()> {
        self.hasher.update(bytes);
        self.out.write_all(bytes)?;
        Ok(())
    }

    /// Appends one document.
    pub fn put(&mut self, doc_id: u64, terms: &[JournalTerm]) -> Result<()> {
        let count = u32::try_from(terms.len())
            .map_err(|_| IndexError::Invalid("too many terms in one document"))?;
        self.write_hashed(&[TAG_DOCUMENT])?;
        self.write_hashed(&doc_id.to_le_bytes())?;
        self.write_hashed(&count.to_le_bytes())?;
        for term in terms {
            self.write_hashed(&term.term_id.to_le_bytes())?;
            self.write_hashed(&[term.metadata])?;
        }
        self.documents += 1;
        Ok(())
    }

    /// Documents written so far.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Writes the terminator and syncs the file. Returns the document count.
    pub fn finish(mut self) -> Result<u64> {
        let crc = self.hasher.clone().finalize();
        self.out.write_all(&[TAG_END])?;
        self.out.write_all(&self.documents.to_le_bytes())?;
        self.out.write_all(&crc.to_le_bytes())?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        debug!(path = %self.path.display(), documents = self.documents, "journal.finished");
        Ok(self.documents)
    }
}

/// File name of shard `n`.
pub fn journal_file_name(n: u32) -> String {
    format!("{FILE_PREFIX}{n}{FILE_SUFFIX}")
}

fn shard_number(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Journal shards in `dir`, ordered by shard number. A missing directory
/// holds no shards.
pub fn find_journal_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut shards = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(n) = name.to_str().and_then(shard_number) {
            if entry.file_type()?.is_file() {
                shards.push((n, entry.path()));
            }
        }
    }
    shards.sort_by_key(|(n, _)| *n);
    Ok(shards.into_iter().map(|(_, path)| path).collect())
}
