//! `Range` request header handling for single byte ranges.
//!
//! Accepted forms are `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`.
//! Only the first range of a multi-range header is honoured.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header")]
    Malformed,

    #[error("range not satisfiable")]
    Unsatisfiable,
}

impl ByteRange {
    /// The whole object.
    pub fn full(size: u64) -> Self {
        Self {
            start: 0,
            length: size,
        }
    }

    /// Inclusive last byte offset. Only meaningful for non-empty ranges.
    pub fn last(&self) -> u64 {
        self.start + self.length.saturating_sub(1)
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.last(), size)
    }

    /// `Range` value to forward to the object store.
    pub fn to_request_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.last())
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// Resolves a `Range` header against an object of `size` bytes.
///
/// `start` and `end` are inclusive. An `end` past the object is clamped to
/// the last byte; a `start` at or past `size` is unsatisfiable.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;

    let first = spec.split(',').next().unwrap_or_default().trim();
    let (start_s, end_s) = first.split_once('-').ok_or(RangeError::Malformed)?;
    let (start_s, end_s) = (start_s.trim(), end_s.trim());

    if start_s.is_empty() {
        // bytes=-n: the last n bytes
        let suffix: u64 = end_s.parse().map_err(|_| RangeError::Malformed)?;
        if suffix == 0 || size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        let length = suffix.min(size);
        return Ok(ByteRange {
            start: size - length,
            length,
        });
    }

    let start: u64 = start_s.parse().map_err(|_| RangeError::Malformed)?;
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }

    let end = if end_s.is_empty() {
        size - 1
    } else {
        let end: u64 = end_s.parse().map_err(|_| RangeError::Malformed)?;
        if end < start {
            return Err(RangeError::Malformed);
        }
        end.min(size - 1)
    };

    Ok(ByteRange {
        start,
        length: end - start + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range() {
        let range = parse_range("bytes=2-5", 10).unwrap();
        assert_eq!(range, ByteRange { start: 2, length: 4 });
        assert_eq!(range.content_range(10), "bytes 2-5/10");
        assert_eq!(range.to_request_header(), "bytes=2-5");
    }

    #[test]
    fn test_whole_object_as_range() {
        let range = parse_range("bytes=0-9", 10).unwrap();
        assert_eq!(range, ByteRange::full(10));
        assert_eq!(range.content_range(10), "bytes 0-9/10");
    }

    #[test]
    fn test_open_ended_range_serves_tail() {
        let range = parse_range("bytes=7-", 10).unwrap();
        assert_eq!(range, ByteRange { start: 7, length: 3 });
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            parse_range("bytes=-4", 10).unwrap(),
            ByteRange { start: 6, length: 4 }
        );
        assert_eq!(parse_range("bytes=-40", 10).unwrap(), ByteRange::full(10));
        assert_eq!(parse_range("bytes=-0", 10), Err(RangeError::Unsatisfiable));
    }

    #[test]
    fn test_end_is_clamped() {
        let range = parse_range("bytes=5-500", 10).unwrap();
        assert_eq!(range, ByteRange { start: 5, length: 5 });
        assert_eq!(range.content_range(10), "bytes 5-9/10");
    }

    #[test]
    fn test_start_past_end_of_object() {
        assert_eq!(parse_range("bytes=10-", 10), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range("bytes=10-20", 10), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range("bytes=0-", 0), Err(RangeError::Unsatisfiable));
        assert_eq!(unsatisfiable_content_range(10), "bytes */10");
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(parse_range("items=0-1", 10), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=abc", 10), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=1-x", 10), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=5-2", 10), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=0-1-2", 10), Err(RangeError::Malformed));
    }

    #[test]
    fn test_multi_range_uses_first() {
        assert_eq!(
            parse_range("bytes=0-1, 4-5", 10).unwrap(),
            ByteRange { start: 0, length: 2 }
        );
    }
}
