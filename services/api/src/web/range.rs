//! services/api/src/web/range.rs
//!
//! Single-range `Range: bytes=...` parsing for media playback.

/// An inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; serve the whole file.
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interprets a `Range` header against a file of `total` bytes.
///
/// Multi-range and non-byte requests fall back to the whole file.
pub fn parse_range(header: Option<&str>, total: u64) -> RangeRequest {
    let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeRequest::Unsatisfiable;
    };
    let (first, last) = (first.trim(), last.trim());

    let range = match (first.is_empty(), last.is_empty()) {
        // bytes=-N: the final N bytes.
        (true, false) => match last.parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(_) if total == 0 => None,
            Ok(n) => Some(ByteRange {
                start: total.saturating_sub(n),
                end: total - 1,
            }),
        },
        // bytes=N-: from N to the end.
        (false, true) => match first.parse::<u64>() {
            Ok(start) if start < total => Some(ByteRange { start, end: total - 1 }),
            _ => None,
        },
        (false, false) => match (first.parse::<u64>(), last.parse::<u64>()) {
            (Ok(start), Ok(end)) if start <= end && start < total => Some(ByteRange {
                start,
                end: end.min(total - 1),
            }),
            _ => None,
        },
        (true, true) => None,
    };

    range.map_or(RangeRequest::Unsatisfiable, RangeRequest::Partial)
}
