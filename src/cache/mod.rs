//! Read caching layer
//!
//! A single fixed-size window over the remote database file. Each open
//! session owns its own window.

pub mod window;

pub use window::{offset_copy, WindowCache, WindowOverflow, COLD_OFFSET, DEFAULT_WINDOW_SIZE};
