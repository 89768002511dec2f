//! Blocking Range Client
//!
//! Binds a URL and a [`Transport`] to a tokio runtime so the synchronous
//! VFS callbacks can perform ranged reads. Calls block the current thread
//! until the transport returns; they must not be made from inside an async
//! task.

use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use tokio::runtime::Runtime;

use super::transport::Transport;
use super::types::ByteRange;
use crate::errors::Result;

/// Range reader for one remote resource
#[derive(Clone)]
pub struct RangeClient {
    /// Remote resource
    url: Url,
    /// Fetch strategy (HTTP, local file, or injected)
    transport: Arc<dyn Transport>,
    /// Runtime driving the transport futures
    runtime: Arc<Runtime>,
}

impl RangeClient {
    pub fn new(url: Url, transport: Arc<dyn Transport>, runtime: Arc<Runtime>) -> Self {
        Self {
            url,
            transport,
            runtime,
        }
    }

    /// Discover the total length of the resource
    pub fn size(&self) -> Result<u64> {
        self.runtime.block_on(self.transport.size(&self.url))
    }

    /// Fetch `len` bytes starting at `offset` in a single request
    pub fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.runtime
            .block_on(self.transport.read_range(&self.url, ByteRange::new(offset, len)))
    }

    /// The remote resource this client reads from
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Debug for RangeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeClient")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
