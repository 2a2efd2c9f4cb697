//! `Range` header parsing and resolution against a payload size.
//!
//! Only single ranges in the `bytes` unit are supported. Multi-range requests
//! are rejected rather than answered with the full body.

use animeflix_model::ByteRange;

use crate::error::{Result, StoreError};

/// A parsed but not yet resolved byte range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-len`: the last `len` bytes.
    Suffix(u64),
}

impl RangeSpec {
    pub fn from_bounds(start: u64, end: Option<u64>) -> Self {
        RangeSpec::From { start, end }
    }
}

/// Parse a `Range` header value such as `bytes=200-499`.
pub fn parse_range_header(value: &str) -> Result<RangeSpec> {
    let invalid = || StoreError::InvalidRange(format!("malformed range header: {value}"));

    let range_part = value.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start, end) = range_part.split_once('-').ok_or_else(invalid)?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix_len = end.parse::<u64>().map_err(|_| invalid())?;
        return Ok(RangeSpec::Suffix(suffix_len));
    }

    let start = start.parse::<u64>().map_err(|_| invalid())?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().map_err(|_| invalid())?)
    };
    Ok(RangeSpec::From { start, end })
}

/// Resolve an optional range request against a payload of `total` bytes.
///
/// No request means the whole payload. `end` is clamped to the last byte;
/// a start past the end of the payload or after `end` is rejected.
pub fn resolve_range(spec: Option<RangeSpec>, total: u64) -> Result<ByteRange> {
    let empty = || StoreError::InvalidRange("payload is empty".into());
    let Some(spec) = spec else {
        return ByteRange::full(total).ok_or_else(empty);
    };
    let last = total.checked_sub(1).ok_or_else(empty)?;

    let (start, end) = match spec {
        RangeSpec::From { start, end } => {
            (start, end.map_or(last, |end| end.min(last)))
        }
        RangeSpec::Suffix(0) => {
            return Err(StoreError::InvalidRange(
                "zero-length suffix range".into(),
            ));
        }
        RangeSpec::Suffix(len) => (total.saturating_sub(len), last),
    };

    if start >= total {
        return Err(StoreError::InvalidRange(format!(
            "start {start} beyond size {total}"
        )));
    }
    ByteRange::new(start, end).ok_or_else(|| {
        StoreError::InvalidRange(format!("start {start} after end {end}"))
    })
}
