//! VFS layer
//!
//! The storage contract SQLite drives, and its HTTP-backed implementation.

pub mod contract;
pub mod file;
pub mod http_vfs;
pub mod stats;

pub use contract::{
    AccessFlag, DeviceCharacteristics, LockKind, OpenFlags, OpenKind, SyncFlags, Vfs, VfsFile,
};
pub use file::HttpFile;
pub use http_vfs::{HttpVfs, HttpVfsBuilder};
pub use stats::ReadStats;
