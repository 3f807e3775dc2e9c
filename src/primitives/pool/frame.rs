use parking_lot::RwLock;
use std::sync::Arc;

/// One buffer pool slot.
///
/// `page` and `loaded` are only touched under the pool mutex. The page
/// contents are write-locked by the thread loading them and read-locked by
/// every pin holder.
pub struct Frame {
    pub page: Option<u64>,
    pub buf: Arc<RwLock<Box<[u64]>>>,
    pub reference: bool,
    pub pin_count: u32,
    pub loaded: bool,
    pub valid_words: usize,
}

impl Frame {
    pub fn new(page_words: usize) -> Self {
        Self {
            page: None,
            buf: Arc::new(RwLock::new(vec![0u64; page_words].into_boxed_slice())),
            reference: false,
            pin_count: 0,
            loaded: false,
            valid_words: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.page.is_none() && self.pin_count == 0
    }

    pub fn reset(&mut self) {
        self.page = None;
        self.reference = false;
        self.loaded = false;
        self.valid_words = 0;
    }
}
