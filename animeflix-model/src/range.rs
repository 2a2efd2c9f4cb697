use serde::{Deserialize, Serialize};

/// Inclusive byte range `[start, end]` within a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// The whole payload, or `None` for an empty one.
    pub fn full(total: u64) -> Option<Self> {
        total.checked_sub(1).map(|end| Self { start: 0, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full(&self, total: u64) -> bool {
        self.start == 0 && self.end.saturating_add(1) == total
    }

    /// Value for a `Content-Range` header, e.g. `bytes 200-499/1000`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}
