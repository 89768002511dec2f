//! Remote file handle
//!
//! Serves SQLite's fixed-size page reads from the session's window cache,
//! falling through to exactly one range fetch per miss.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::contract::{DeviceCharacteristics, LockKind, SyncFlags, VfsFile};
use super::stats::ReadStats;
use crate::cache::WindowCache;
use crate::errors::{Error, Result};
use crate::http::RangeClient;

/// One open session against a remote database file
///
/// Owns its window cache outright; nothing is shared with other sessions
/// except the diagnostic counters.
#[derive(Debug)]
pub struct HttpFile {
    /// Range reader bound to the remote URL
    client: RangeClient,
    /// This session's window
    cache: WindowCache,
    /// Counters shared with the owning VFS
    stats: Arc<ReadStats>,
}

impl HttpFile {
    pub fn new(client: RangeClient, cache: WindowCache, stats: Arc<ReadStats>) -> Self {
        Self {
            client,
            cache,
            stats,
        }
    }

    /// The session's window cache
    pub fn cache(&self) -> &WindowCache {
        &self.cache
    }

    /// Fill `dest` from the window, fetching a new window on a miss.
    ///
    /// `dest` must lie entirely before end-of-file.
    fn fill(&mut self, dest: &mut [u8], offset: i64) -> Result<()> {
        if let Some(copied) = self.cache.lookup(dest, offset) {
            self.stats.record_hit();
            debug!(offset = offset, bytes = copied, "Window HIT");
            return Ok(());
        }

        self.stats.record_miss();
        let fetch_len = self.cache.fetch_len(offset);
        debug!(
            offset = offset,
            len = dest.len(),
            fetch_len = fetch_len,
            "Window MISS, fetching"
        );

        let window = self.client.read_range(offset as u64, fetch_len)?;
        info!(bytes = window.len(), offset = offset, "Network read");

        let stored = self.cache.replace(window, offset);
        self.stats.record_fetch(stored as u64);
        debug!(bytes = stored, offset = offset, "Window replaced");

        match self.cache.lookup(dest, offset) {
            Some(_) => Ok(()),
            None => {
                error!(
                    offset = offset,
                    len = dest.len(),
                    window = ?self.cache.window(),
                    "Fresh window does not cover the request"
                );
                Err(Error::WindowMiss {
                    offset,
                    len: dest.len(),
                })
            }
        }
    }
}

impl VfsFile for HttpFile {
    fn read_at(&mut self, buf: &mut [u8], offset: i64) -> Result<()> {
        if offset < 0 {
            return Err(Error::InvalidOffset(offset));
        }
        if buf.is_empty() {
            return Ok(());
        }

        let requested = buf.len();
        let available = self.cache.total_len().saturating_sub(offset as u64);
        if requested as u64 <= available {
            return self.fill(buf, offset);
        }

        // Past end-of-file: hand back what exists and zero the rest
        let read = available as usize;
        let (head, tail) = buf.split_at_mut(read);
        if !head.is_empty() {
            self.fill(head, offset)?;
        }
        tail.fill(0);

        debug!(offset = offset, requested = requested, read = read, "Short read");
        Err(Error::ShortRead {
            offset,
            requested,
            read,
        })
    }

    fn write_at(&mut self, _buf: &[u8], _offset: i64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn truncate(&mut self, _size: i64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn sync(&mut self, _flags: SyncFlags) -> Result<()> {
        Ok(())
    }

    fn file_size(&self) -> Result<u64> {
        Ok(self.cache.total_len())
    }

    fn lock(&mut self, _lock: LockKind) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self, _lock: LockKind) -> Result<()> {
        Ok(())
    }

    fn check_reserved_lock(&self) -> Result<bool> {
        Ok(false)
    }

    fn sector_size(&self) -> i32 {
        0
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        // Windows are never invalidated, so the remote file must not change
        DeviceCharacteristics::IMMUTABLE
    }

    fn close(&mut self) -> Result<()> {
        debug!(url = %self.client.url(), "Closed remote file");
        Ok(())
    }
}
