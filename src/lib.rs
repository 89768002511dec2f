//! sqlite-httpvfs
//!
//! A read-only SQLite VFS that serves a remote database file through HTTP
//! range requests. SQLite's page reads go through a per-connection window
//! cache; each miss costs exactly one ranged request for a whole window.
//!
//! ```no_run
//! use sqlite_httpvfs::HttpVfs;
//!
//! # fn main() -> sqlite_httpvfs::Result<()> {
//! let vfs = HttpVfs::builder("https://example.com/data.db")
//!     .user_agent("reader/1.0")
//!     .build()?;
//! let registration = vfs.register("httpvfs")?;
//!
//! let conn = registration.open_connection()?;
//! let count: i64 = conn.query_row("SELECT count(*) FROM foo", [], |row| row.get(0))?;
//! println!("{} rows, {} bytes fetched", count, registration.vfs().total_read_bytes());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod http;
pub mod sqlite;
pub mod vfs;

pub use config::VfsOptions;
pub use errors::{Error, Result};
pub use sqlite::{register, Registration};
pub use vfs::{HttpVfs, HttpVfsBuilder, Vfs, VfsFile};
