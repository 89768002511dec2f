//! Window Cache
//!
//! Holds a single contiguous window of the remote file in memory.
//! A miss is answered by replacing the whole window: there is no merging
//! with the previous window and no eviction policy beyond that.

use tracing::{trace, warn};

/// Default window capacity: 4 MiB
pub const DEFAULT_WINDOW_SIZE: usize = 2 << 21;

/// Window offset of a cache that has never been filled
pub const COLD_OFFSET: i64 = -1;

/// Returned by [`offset_copy`] when the requested range runs past the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read window overflow")]
pub struct WindowOverflow;

/// Fill `dest` with `src[offset..offset + dest.len()]`.
///
/// Nothing is written when the range does not fit inside `src`.
pub fn offset_copy<T: Copy>(dest: &mut [T], src: &[T], offset: u64) -> Result<(), WindowOverflow> {
    let start = usize::try_from(offset).map_err(|_| WindowOverflow)?;
    let end = start.checked_add(dest.len()).ok_or(WindowOverflow)?;
    if end > src.len() {
        return Err(WindowOverflow);
    }
    dest.copy_from_slice(&src[start..end]);
    Ok(())
}

/// In-memory window over a larger byte-addressable remote resource
#[derive(Debug)]
pub struct WindowCache {
    /// Absolute offset of `buf[0]`, or `COLD_OFFSET`
    offset: i64,
    /// Current window contents
    buf: Vec<u8>,
    /// Maximum window length in bytes
    capacity: usize,
    /// Length of the remote resource, used to clamp fetches
    total_len: u64,
}

impl WindowCache {
    /// Create a cold cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum window length in bytes
    /// * `total_len` - Length of the remote resource
    pub fn new(capacity: usize, total_len: u64) -> Self {
        Self {
            offset: COLD_OFFSET,
            buf: Vec::new(),
            capacity,
            total_len,
        }
    }

    /// Copy the requested range into `dest` if the current window covers it.
    ///
    /// Returns the number of bytes copied on a hit, `None` on a miss.
    /// Never fails: an internal bounds inconsistency is logged and reported
    /// as a miss so the caller refetches.
    pub fn lookup(&self, dest: &mut [u8], offset: i64) -> Option<usize> {
        if self.offset < 0 {
            trace!(offset = offset, "Window cold");
            return None;
        }

        let relative = offset.checked_sub(self.offset)?;
        if relative < 0 {
            return None;
        }

        let len = i64::try_from(dest.len()).ok()?;
        let window_len = i64::try_from(self.buf.len()).ok()?;
        if relative.checked_add(len)? > window_len {
            return None;
        }

        if let Err(e) = offset_copy(dest, &self.buf, relative as u64) {
            warn!(
                offset = offset,
                len = dest.len(),
                window_offset = self.offset,
                window_len = self.buf.len(),
                error = %e,
                "Window copy failed, treating as miss"
            );
            return None;
        }

        Some(dest.len())
    }

    /// Adopt `data` as the new window starting at `offset`.
    ///
    /// The previous window is dropped entirely. Returns the bytes stored.
    pub fn replace(&mut self, data: Vec<u8>, offset: i64) -> usize {
        self.buf = data;
        self.offset = offset;
        self.buf.len()
    }

    /// Length of the window to fetch for a miss at `offset`:
    /// `min(capacity, total_len - offset)`, never past end-of-file.
    pub fn fetch_len(&self, offset: i64) -> usize {
        let Ok(start) = u64::try_from(offset) else {
            return 0;
        };
        let remaining = self.total_len.saturating_sub(start);
        usize::try_from(remaining).map_or(self.capacity, |r| r.min(self.capacity))
    }

    /// Maximum window length in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the remote resource
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Whether no window has been stored yet
    pub fn is_cold(&self) -> bool {
        self.offset < 0
    }

    /// Current window as `(offset, len)`, `None` when cold
    pub fn window(&self) -> Option<(i64, usize)> {
        if self.is_cold() {
            None
        } else {
            Some((self.offset, self.buf.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

    #[test]
    fn test_offset_copy() {
        let mut dest = [0u8; 4];

        assert_eq!(offset_copy(&mut dest, &SRC, 0), Ok(()));
        assert_eq!(dest, [0, 1, 2, 3]);

        assert_eq!(offset_copy(&mut dest, &SRC, 1), Ok(()));
        assert_eq!(dest, [1, 2, 3, 4]);

        assert_eq!(offset_copy(&mut dest, &SRC, 6), Ok(()));
        assert_eq!(dest, [6, 7, 8, 9]);
    }

    #[test]
    fn test_offset_copy_overflow_leaves_dest_untouched() {
        let mut dest = [0xAAu8; 4];

        assert_eq!(offset_copy(&mut dest, &SRC, 7), Err(WindowOverflow));
        assert_eq!(offset_copy(&mut dest, &SRC, 11), Err(WindowOverflow));
        assert_eq!(offset_copy(&mut dest, &SRC, u64::MAX), Err(WindowOverflow));
        assert_eq!(dest, [0xAA; 4]);
    }

    #[test]
    fn test_offset_copy_fails_iff_past_end() {
        for len in 0..=SRC.len() {
            for offset in 0..=(SRC.len() as u64 + 2) {
                let mut dest = vec![0u8; len];
                let fits = offset as usize + len <= SRC.len();
                let result = offset_copy(&mut dest, &SRC, offset);
                assert_eq!(result.is_ok(), fits, "len={} offset={}", len, offset);
                if fits {
                    assert_eq!(&dest[..], &SRC[offset as usize..offset as usize + len]);
                }
            }
        }
    }

    #[test]
    fn test_cold_cache_always_misses() {
        let cache = WindowCache::new(4, 10);
        assert!(cache.is_cold());
        assert_eq!(cache.window(), None);

        let mut empty: [u8; 0] = [];
        assert_eq!(cache.lookup(&mut empty, 0), None);
        for offset in [-1, 0, 1, 9, i64::MAX] {
            let mut dest = [0u8; 2];
            assert_eq!(cache.lookup(&mut dest, offset), None);
        }
    }

    #[test]
    fn test_replace_then_lookup() {
        const CACHE_SIZE: usize = 4;
        let mut cache = WindowCache::new(CACHE_SIZE, SRC.len() as u64);

        assert_eq!(cache.replace(SRC[0..4].to_vec(), 0), 4);
        assert_eq!(cache.window(), Some((0, 4)));

        // Replacing with a shifted window drops the old one entirely
        assert_eq!(cache.replace(SRC[1..5].to_vec(), 1), 4);
        assert_eq!(cache.window(), Some((1, 4)));

        let mut dest = [0u8; 2];
        assert_eq!(cache.lookup(&mut dest, 3), Some(2));
        assert_eq!(dest, [3, 4]);

        // Offset 0 was in the previous window only
        let mut dest = [0u8; 1];
        assert_eq!(cache.lookup(&mut dest, 0), None);
    }

    #[test]
    fn test_lookup_same_offset_any_length() {
        let mut cache = WindowCache::new(8, 100);
        let data: Vec<u8> = (40..48).collect();
        cache.replace(data.clone(), 40);

        for len in 0..=data.len() {
            let mut dest = vec![0u8; len];
            assert_eq!(cache.lookup(&mut dest, 40), Some(len));
            assert_eq!(dest, data[..len]);
        }
    }

    #[test]
    fn test_hit_iff_contained() {
        let mut cache = WindowCache::new(4, 20);
        cache.replace(vec![5, 6, 7, 8], 5);

        for offset in 0..12i64 {
            for len in 0..6usize {
                let mut dest = vec![0u8; len];
                let contained = offset >= 5 && offset + len as i64 <= 9;
                let hit = cache.lookup(&mut dest, offset);
                assert_eq!(hit.is_some(), contained, "offset={} len={}", offset, len);
                if contained {
                    let expected: Vec<u8> = (offset..offset + len as i64).map(|b| b as u8).collect();
                    assert_eq!(dest, expected);
                }
            }
        }
    }

    #[test]
    fn test_offset_before_window_is_a_miss() {
        let mut cache = WindowCache::new(4, 10);
        cache.replace(vec![1, 2, 3, 4], 1);

        let mut dest = [0u8; 1];
        assert_eq!(cache.lookup(&mut dest, 0), None);
        assert_eq!(cache.lookup(&mut dest, -5), None);
        assert_eq!(cache.lookup(&mut dest, i64::MIN), None);
    }

    #[test]
    fn test_fetch_len_clamps_to_eof() {
        let cache = WindowCache::new(4, 10);
        assert_eq!(cache.fetch_len(0), 4);
        assert_eq!(cache.fetch_len(6), 4);
        assert_eq!(cache.fetch_len(7), 3);
        assert_eq!(cache.fetch_len(9), 1);
        assert_eq!(cache.fetch_len(10), 0);
        assert_eq!(cache.fetch_len(12), 0);
        assert_eq!(cache.fetch_len(-1), 0);

        for offset in 0..10i64 {
            assert!(cache.fetch_len(offset) as u64 <= 10 - offset as u64);
        }
    }
}
