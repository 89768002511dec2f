//! Range request types and header parsing

use crate::errors::{Error, Result};

/// A contiguous byte range `[start, start + len)` of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Absolute offset of the first byte
    pub start: u64,
    /// Number of bytes requested
    pub len: usize,
}

impl ByteRange {
    pub fn new(start: u64, len: usize) -> Self {
        Self { start, len }
    }

    /// Offset of the last byte (inclusive), `None` for an empty range
    pub fn last(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.start + self.len as u64 - 1)
        }
    }

    /// `Range` header value, e.g. `bytes=0-4095`
    pub fn to_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.last().unwrap_or(self.start))
    }
}

/// Parsed `Content-Range` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive `(first, last)` byte positions, `None` for `bytes */N`
    pub range: Option<(u64, u64)>,
    /// Complete length, `None` for `bytes a-b/*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes a-b/N`, `bytes */N` or `bytes a-b/*`
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidContentRange(value.to_string());

        let rest = value.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
        let (range, total) = rest.split_once('/').ok_or_else(invalid)?;

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().map_err(|_| invalid())?),
        };

        let range = match range.trim() {
            "*" => None,
            r => {
                let (first, last) = r.split_once('-').ok_or_else(invalid)?;
                let first = first.trim().parse::<u64>().map_err(|_| invalid())?;
                let last = last.trim().parse::<u64>().map_err(|_| invalid())?;
                if last < first {
                    return Err(invalid());
                }
                Some((first, last))
            }
        };

        if range.is_none() && total.is_none() {
            return Err(invalid());
        }

        Ok(Self { range, total })
    }
}
