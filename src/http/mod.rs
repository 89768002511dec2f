//! Remote range access
//!
//! Size discovery and ranged reads, over HTTP or from local `file://` URLs.

pub mod client;
pub mod transport;
pub mod types;

pub use client::RangeClient;
pub use transport::{FileTransport, HttpTransport, MemoryTransport, Transport};
pub use types::{ByteRange, ContentRange};
