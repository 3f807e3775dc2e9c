#![forbid(unsafe_code)]

/// A sorted candidate list filtered in place.
///
/// Filtering walks a read cursor over the values; each value is either
/// retained (copied down to the write cursor) or rejected (skipped). After
/// [`LongQueryBuffer::finalize_filtering`] the retained values occupy the
/// front of the buffer and the cursors are rewound for the next pass.
#[derive(Clone, Debug, Default)]
pub struct LongQueryBuffer {
    data: Vec<u64>,
    end: usize,
    read: usize,
    write: usize,
}

impl LongQueryBuffer {
    /// Creates an empty buffer able to hold `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            ..Self::default()
        }
    }

    /// Creates a buffer holding `values`, which must be ascending.
    pub fn from_values(values: &[u64]) -> Self {
        let mut buffer = Self::new(values.len());
        buffer.load(values);
        buffer
    }

    /// Replaces the contents with `values` and rewinds both cursors.
    pub fn load(&mut self, values: &[u64]) {
        if self.data.len() < values.len() {
            self.data.resize(values.len(), 0);
        }
        self.data[..values.len()].copy_from_slice(values);
        self.end = values.len();
        self.read = 0;
        self.write = 0;
    }

    /// Number of values in the buffer.
    pub fn len(&self) -> usize {
        self.end
    }

    /// True when the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// True while the read cursor has values left to judge.
    pub fn has_more(&self) -> bool {
        self.read < self.end
    }

    /// The value under the read cursor.
    pub fn current_value(&self) -> u64 {
        self.data[self.read]
    }

    /// Keeps the current value and advances; returns `has_more()`.
    pub fn retain_and_advance(&mut self) -> bool {
        self.data[self.write] = self.data[self.read];
        self.write += 1;
        self.read += 1;
        self.has_more()
    }

    /// Drops the current value and advances; returns `has_more()`.
    pub fn reject_and_advance(&mut self) -> bool {
        self.read += 1;
        self.has_more()
    }

    /// Keeps every value not yet judged.
    pub fn retain_remaining(&mut self) {
        while self.has_more() {
            self.retain_and_advance();
        }
    }

    /// Drops every value not yet judged.
    pub fn reject_remaining(&mut self) {
        self.read = self.end;
    }

    /// Truncates to the retained values and rewinds the cursors.
    pub fn finalize_filtering(&mut self) {
        self.end = self.write;
        self.read = 0;
        self.write = 0;
    }

    /// Rewinds the cursors without changing the contents.
    pub fn start_filtering_pass(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// The current values.
    pub fn values(&self) -> &[u64] {
        &self.data[..self.end]
    }

    /// Copies the current values out.
    pub fn copy_values(&self) -> Vec<u64> {
        self.values().to_vec()
    }

    /// Empties the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.end = 0;
        self.read = 0;
        self.write = 0;
    }
}
