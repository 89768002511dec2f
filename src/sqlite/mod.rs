//! SQLite integration
//!
//! Registration of [`crate::vfs::Vfs`] implementations with the SQLite
//! library bundled by `rusqlite`.

pub mod bridge;

pub use bridge::{register, Registration};
