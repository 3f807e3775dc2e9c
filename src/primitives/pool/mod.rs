#![forbid(unsafe_code)]

//! Bounded page cache over a word file.
//!
//! Frames are recycled with a CLOCK sweep that skips pinned frames. All
//! bookkeeping (page table, pins, reference bits) sits behind one mutex;
//! page contents sit behind per-frame reader/writer locks so distinct pages,
//! and the same page, can be read concurrently once loaded.

mod frame;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        mpsc::{sync_channel, SyncSender, TrySendError},
        Arc, Weak,
    },
    thread::JoinHandle,
};

use parking_lot::{lock_api::ArcRwLockReadGuard, lock_api::ArcRwLockWriteGuard, Mutex, RawRwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::primitives::array::LongRead;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{words_to_usize, IndexError, Result};

use self::frame::Frame;

/// Pending readahead requests beyond this are dropped.
const READAHEAD_QUEUE_DEPTH: usize = 16;

/// How loaded pages compete for frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferEvictionPolicy {
    /// Touched pages get a second chance before eviction.
    #[default]
    Cache,
    /// Pages never earn a second chance; suited to one-pass scans.
    ReadOnce,
}

/// How many pages following a demand read are fetched in the background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferReadaheadPolicy {
    /// No readahead.
    #[default]
    None,
    /// One following page.
    Small,
    /// Three following pages.
    Medium,
    /// Seven following pages.
    Aggressive,
}

impl BufferReadaheadPolicy {
    /// Number of pages fetched after a demand read.
    pub fn pages(self) -> u64 {
        match self {
            BufferReadaheadPolicy::None => 0,
            BufferReadaheadPolicy::Small => 1,
            BufferReadaheadPolicy::Medium => 3,
            BufferReadaheadPolicy::Aggressive => 7,
        }
    }
}

/// Buffer pool configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPoolOptions {
    /// Page size in words.
    pub page_words: u64,
    /// Number of frames held in memory.
    pub frames: usize,
    /// Second-chance behaviour of loaded pages.
    pub eviction: BufferEvictionPolicy,
    /// Background prefetch depth.
    pub readahead: BufferReadaheadPolicy,
}

impl Default for BufferPoolOptions {
    fn default() -> Self {
        Self {
            page_words: 4096,
            frames: 256,
            eviction: BufferEvictionPolicy::Cache,
            readahead: BufferReadaheadPolicy::None,
        }
    }
}

impl BufferPoolOptions {
    /// Sets the page size in words.
    pub fn with_page_words(mut self, page_words: u64) -> Self {
        self.page_words = page_words;
        self
    }

    /// Sets the frame count.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the eviction policy.
    pub fn with_eviction(mut self, eviction: BufferEvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Sets the readahead policy.
    pub fn with_readahead(mut self, readahead: BufferReadaheadPolicy) -> Self {
        self.readahead = readahead;
        self
    }
}

/// Point-in-time pool counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStatsSnapshot {
    /// Pages loaded from disk on demand.
    pub disk_reads: u64,
    /// Pins satisfied by a resident page.
    pub cache_hits: u64,
    /// Pages loaded by the readahead worker.
    pub readahead_reads: u64,
    /// Frames recycled by the clock sweep.
    pub evictions: u64,
}

#[derive(Default)]
struct BufferPoolStats {
    disk_reads: AtomicU64,
    cache_hits: AtomicU64,
    readahead_reads: AtomicU64,
    evictions: AtomicU64,
}

impl BufferPoolStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn snapshot(&self) -> BufferPoolStatsSnapshot {
        BufferPoolStatsSnapshot {
            disk_reads: self.disk_reads.load(AtomicOrdering::Relaxed),
            cache_hits: self.cache_hits.load(AtomicOrdering::Relaxed),
            readahead_reads: self.readahead_reads.load(AtomicOrdering::Relaxed),
            evictions: self.evictions.load(AtomicOrdering::Relaxed),
        }
    }
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: FxHashMap<u64, usize>,
    clock_hand: usize,
}

struct PoolCore {
    io: Arc<dyn FileIo>,
    file_words: u64,
    page_words: u64,
    eviction: BufferEvictionPolicy,
    inner: Mutex<PoolInner>,
    stats: BufferPoolStats,
}

enum Pinned {
    Resident {
        idx: usize,
        loaded: bool,
        buf: Arc<parking_lot::RwLock<Box<[u64]>>>,
    },
    Loading {
        idx: usize,
        guard: ArcRwLockWriteGuard<RawRwLock, Box<[u64]>>,
        words: usize,
    },
}

impl PoolCore {
    fn page_count(&self) -> u64 {
        self.file_words.div_ceil(self.page_words)
    }

    fn valid_words(&self, page: u64) -> u64 {
        self.page_words.min(self.file_words - page * self.page_words)
    }

    /// Pins `page`, loading it when it is not resident.
    fn pin(self: &Arc<Self>, page: u64) -> Result<PageRef> {
        loop {
            let pinned = {
                let mut inner = self.inner.lock();
                self.pin_locked(&mut inner, page, true)?
            };
            match pinned {
                Pinned::Loading { idx, mut guard, words } => {
                    let result = self.io.read_words_at(page * self.page_words, &mut guard[..words]);
                    let mut inner = self.inner.lock();
                    if let Err(err) = result {
                        self.abandon_load(&mut inner, idx, page);
                        return Err(err);
                    }
                    inner.frames[idx].loaded = true;
                    drop(inner);
                    BufferPoolStats::bump(&self.stats.disk_reads);
                    return Ok(PageRef {
                        core: Arc::clone(self),
                        frame: idx,
                        page,
                        words,
                        guard: Some(ArcRwLockWriteGuard::downgrade(guard)),
                    });
                }
                Pinned::Resident { idx, loaded, buf } => {
                    let guard = buf.read_arc();
                    let words = {
                        let mut inner = self.inner.lock();
                        let frame = &inner.frames[idx];
                        if !loaded && !(frame.loaded && frame.page == Some(page)) {
                            // the loading reader failed; release and retry
                            drop(guard);
                            Self::unpin_locked(&mut inner, idx);
                            continue;
                        }
                        frame.valid_words
                    };
                    BufferPoolStats::bump(&self.stats.cache_hits);
                    return Ok(PageRef {
                        core: Arc::clone(self),
                        frame: idx,
                        page,
                        words,
                        guard: Some(guard),
                    });
                }
            }
        }
    }

    fn pin_locked(&self, inner: &mut PoolInner, page: u64, demand: bool) -> Result<Pinned> {
        if let Some(&idx) = inner.page_table.get(&page) {
            let frame = &mut inner.frames[idx];
            frame.pin_count += 1;
            if demand && self.eviction == BufferEvictionPolicy::Cache {
                frame.reference = true;
            }
            return Ok(Pinned::Resident {
                idx,
                loaded: frame.loaded,
                buf: Arc::clone(&frame.buf),
            });
        }
        let idx = self.obtain_available_frame(inner)?;
        let words = words_to_usize(self.valid_words(page))?;
        let frame = &mut inner.frames[idx];
        frame.page = Some(page);
        frame.pin_count = 1;
        frame.loaded = false;
        frame.valid_words = words;
        frame.reference = demand && self.eviction == BufferEvictionPolicy::Cache;
        // uncontended: an unpinned frame has no outstanding guards
        let guard = frame.buf.write_arc();
        inner.page_table.insert(page, idx);
        Ok(Pinned::Loading { idx, guard, words })
    }

    fn abandon_load(&self, inner: &mut PoolInner, idx: usize, page: u64) {
        warn!(page, "pool.load.failed");
        inner.page_table.remove(&page);
        inner.frames[idx].reset();
        Self::unpin_locked(inner, idx);
    }

    fn unpin_locked(inner: &mut PoolInner, idx: usize) {
        if let Some(frame) = inner.frames.get_mut(idx) {
            if frame.pin_count > 0 {
                frame.pin_count -= 1;
            }
        }
    }

    fn release(&self, idx: usize) {
        let mut inner = self.inner.lock();
        Self::unpin_locked(&mut inner, idx);
    }

    fn obtain_available_frame(&self, inner: &mut PoolInner) -> Result<usize> {
        if let Some(idx) = inner.frames.iter().position(Frame::is_free) {
            return Ok(idx);
        }
        self.run_clock(inner);
        inner
            .frames
            .iter()
            .position(Frame::is_free)
            .ok_or(IndexError::Invalid("buffer pool exhausted: every frame is pinned"))
    }

    fn run_clock(&self, inner: &mut PoolInner) {
        let len = inner.frames.len();
        for _ in 0..len * 2 {
            let idx = inner.clock_hand;
            inner.clock_hand = (inner.clock_hand + 1) % len;
            let frame = &mut inner.frames[idx];
            if frame.page.is_none() || frame.pin_count > 0 {
                continue;
            }
            if frame.reference {
                frame.reference = false;
                continue;
            }
            self.evict_frame(inner, idx);
            return;
        }
    }

    fn evict_frame(&self, inner: &mut PoolInner, idx: usize) {
        if let Some(old) = inner.frames[idx].page {
            inner.page_table.remove(&old);
            trace!(page = old, frame = idx, "pool.evict");
        }
        inner.frames[idx].reset();
        BufferPoolStats::bump(&self.stats.evictions);
    }

    /// Loads `page` without keeping it pinned. Skips pages already resident
    /// and gives up quietly when no frame is free.
    fn prefetch(&self, page: u64) {
        if page >= self.page_count() {
            return;
        }
        let pinned = {
            let mut inner = self.inner.lock();
            if inner.page_table.contains_key(&page) {
                return;
            }
            match self.pin_locked(&mut inner, page, false) {
                Ok(pinned) => pinned,
                Err(_) => return,
            }
        };
        if let Pinned::Loading { idx, mut guard, words } = pinned {
            let result = self.io.read_words_at(page * self.page_words, &mut guard[..words]);
            let mut inner = self.inner.lock();
            match result {
                Ok(()) => {
                    inner.frames[idx].loaded = true;
                    Self::unpin_locked(&mut inner, idx);
                    BufferPoolStats::bump(&self.stats.readahead_reads);
                }
                Err(_) => self.abandon_load(&mut inner, idx, page),
            }
            drop(inner);
            drop(guard);
        }
    }
}

/// A pinned, loaded page. The page stays resident until this is dropped.
pub struct PageRef {
    core: Arc<PoolCore>,
    frame: usize,
    page: u64,
    words: usize,
    guard: Option<ArcRwLockReadGuard<RawRwLock, Box<[u64]>>>,
}

impl PageRef {
    /// Page number within the file.
    pub fn page_no(&self) -> u64 {
        self.page
    }

    /// The page's words; shorter than the page size only for the file's last page.
    pub fn words(&self) -> &[u64] {
        match &self.guard {
            Some(guard) => &guard[..self.words],
            None => &[],
        }
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.core.release(self.frame);
    }
}

/// A word range held resident by pinning every page it touches.
pub struct PinnedBlock {
    pages: Vec<PageRef>,
    first_page_word: u64,
    start: u64,
    len: u64,
    page_words: u64,
}

impl PinnedBlock {
    /// Absolute word offset of the block's first word.
    pub fn start(&self) -> u64 {
        self.start
    }
}

impl LongRead for PinnedBlock {
    fn len(&self) -> u64 {
        self.len
    }

    fn get(&self, index: u64) -> u64 {
        assert!(index < self.len, "index {index} out of bounds for pinned block");
        let rel = self.start + index - self.first_page_word;
        self.pages[(rel / self.page_words) as usize].words()[(rel % self.page_words) as usize]
    }

    fn as_slice(&self, start: u64, end: u64) -> Option<&[u64]> {
        assert!(start <= end && end <= self.len, "range out of bounds for pinned block");
        if start == end {
            return Some(&[]);
        }
        let lo = self.start + start - self.first_page_word;
        let hi = self.start + end - self.first_page_word;
        let page = lo / self.page_words;
        if (hi - 1) / self.page_words != page {
            return None;
        }
        let base = page * self.page_words;
        Some(&self.pages[page as usize].words()[(lo - base) as usize..(hi - base) as usize])
    }
}

struct Readahead {
    tx: SyncSender<u64>,
    worker: JoinHandle<()>,
}

/// A bounded cache of file pages shared by concurrent readers.
pub struct BufferPool {
    core: Arc<PoolCore>,
    readahead_pages: u64,
    readahead: Option<Readahead>,
}

impl BufferPool {
    /// Opens `path` read-only behind a new pool.
    pub fn open(path: impl AsRef<Path>, options: BufferPoolOptions) -> Result<Self> {
        let io = StdFileIo::open_read_only(path)?;
        Self::new(Arc::new(io), options)
    }

    /// Creates a pool over `io`. The file length must be a whole number of words.
    pub fn new(io: Arc<dyn FileIo>, options: BufferPoolOptions) -> Result<Self> {
        if options.page_words == 0 || options.frames == 0 {
            return Err(IndexError::Invalid("buffer pool needs a positive page size and frame count"));
        }
        let file_words = io.len_words()?;
        let page_words = words_to_usize(options.page_words)?;
        let frames = (0..options.frames).map(|_| Frame::new(page_words)).collect();
        let core = Arc::new(PoolCore {
            io,
            file_words,
            page_words: options.page_words,
            eviction: options.eviction,
            inner: Mutex::new(PoolInner {
                frames,
                page_table: FxHashMap::default(),
                clock_hand: 0,
            }),
            stats: BufferPoolStats::default(),
        });
        let readahead_pages = options.readahead.pages();
        let readahead = if readahead_pages > 0 {
            Some(Self::spawn_readahead(Arc::downgrade(&core))?)
        } else {
            None
        };
        debug!(
            file_words = core.file_words,
            page_words = options.page_words,
            frames = options.frames,
            readahead = readahead_pages,
            "pool.open"
        );
        Ok(Self {
            core,
            readahead_pages,
            readahead,
        })
    }

    fn spawn_readahead(core: Weak<PoolCore>) -> Result<Readahead> {
        let (tx, rx) = sync_channel::<u64>(READAHEAD_QUEUE_DEPTH);
        let worker = std::thread::Builder::new()
            .name("rindex-readahead".into())
            .spawn(move || {
                for page in rx {
                    let Some(core) = core.upgrade() else {
                        break;
                    };
                    core.prefetch(page);
                }
                trace!("pool.readahead.stopped");
            })?;
        Ok(Readahead { tx, worker })
    }

    /// Length of the underlying file in words.
    pub fn file_words(&self) -> u64 {
        self.core.file_words
    }

    /// Page size in words.
    pub fn page_words(&self) -> u64 {
        self.core.page_words
    }

    /// Number of frames.
    pub fn capacity(&self) -> usize {
        self.core.inner.lock().frames.len()
    }

    /// Number of frames currently holding a page.
    pub fn resident_pages(&self) -> usize {
        self.core.inner.lock().page_table.len()
    }

    /// Pins page `page`.
    pub fn page(&self, page: u64) -> Result<PageRef> {
        if page >= self.core.page_count() {
            return Err(IndexError::Invalid("page number past end of file"));
        }
        self.core.pin(page)
    }

    /// Pins every page covering `[start, start + len)` words.
    pub fn read_block(&self, start: u64, len: u64) -> Result<PinnedBlock> {
        let end = start
            .checked_add(len)
            .ok_or(IndexError::Invalid("block range overflows"))?;
        if end > self.core.file_words {
            return Err(IndexError::Corruption("block extends past end of file"));
        }
        let page_words = self.core.page_words;
        let first_page = start / page_words;
        let last_page = if len == 0 { first_page } else { (end - 1) / page_words };
        let mut pages = Vec::with_capacity((last_page - first_page + 1) as usize);
        if len > 0 {
            for page in first_page..=last_page {
                pages.push(self.core.pin(page)?);
            }
            self.request_readahead(last_page + 1);
        }
        Ok(PinnedBlock {
            pages,
            first_page_word: first_page * page_words,
            start,
            len,
            page_words,
        })
    }

    fn request_readahead(&self, from_page: u64) {
        let Some(readahead) = &self.readahead else {
            return;
        };
        let last = self.core.page_count();
        for page in from_page..(from_page + self.readahead_pages).min(last) {
            match readahead.tx.try_send(page) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => break,
                Err(TrySendError::Disconnected(_)) => {
                    warn!("pool.readahead.disconnected");
                    break;
                }
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> BufferPoolStatsSnapshot {
        self.core.stats.snapshot()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Some(Readahead { tx, worker }) = self.readahead.take() {
            drop(tx);
            if worker.join().is_err() {
                warn!("pool.readahead.panicked");
            }
        }
    }
}
