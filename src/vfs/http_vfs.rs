//! HTTP-backed VFS
//!
//! Hands SQLite a fresh [`HttpFile`] for every open of the main database.
//! Sessions share the transport, the runtime and the read counters; each
//! owns its own window cache.

use std::borrow::Cow;
use std::sync::Arc;

use reqwest::Url;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use super::contract::{AccessFlag, OpenFlags, OpenKind, Vfs};
use super::file::HttpFile;
use super::stats::ReadStats;
use crate::cache::WindowCache;
use crate::config::VfsOptions;
use crate::errors::{Error, Result};
use crate::http::{FileTransport, HttpTransport, RangeClient, Transport};
use crate::sqlite::{self, Registration};

/// Companion files that never exist next to a remote database
const ABSENT_SUFFIXES: [&str; 2] = ["-wal", "-journal"];

/// Read-only VFS over a single remote database file
pub struct HttpVfs {
    /// Remote database file
    url: Url,
    /// Options the VFS was built with
    options: VfsOptions,
    /// Fetch strategy shared by every session
    transport: Arc<dyn Transport>,
    /// Runtime that drives transport futures from the blocking callbacks
    runtime: Arc<Runtime>,
    /// Counters across all sessions
    stats: Arc<ReadStats>,
}

impl HttpVfs {
    /// VFS for `url` with default options
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::from_options(VfsOptions::new(url))
    }

    /// VFS from a complete set of options, choosing the transport by URL scheme
    pub fn from_options(options: VfsOptions) -> Result<Self> {
        Self::build(options, None)
    }

    /// Fluent construction starting from `url`
    pub fn builder(url: impl Into<String>) -> HttpVfsBuilder {
        HttpVfsBuilder::new(url)
    }

    fn build(options: VfsOptions, transport: Option<Arc<dyn Transport>>) -> Result<Self> {
        options.validate()?;
        let url = options.parsed_url()?;

        let transport = match transport {
            Some(transport) => transport,
            None => default_transport(&url, &options)?,
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("httpvfs-io")
            .enable_all()
            .build()?;

        info!(url = %url, window_size = options.window_size, "HTTP VFS created");

        Ok(Self {
            url,
            options,
            transport,
            runtime: Arc::new(runtime),
            stats: Arc::new(ReadStats::default()),
        })
    }

    /// The remote database file
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Capacity of each session's window
    pub fn window_size(&self) -> usize {
        self.options.window_size
    }

    /// Cumulative bytes fetched from the network by every session
    pub fn total_read_bytes(&self) -> u64 {
        self.stats.total_read_bytes()
    }

    /// Returns (hits, misses, hit_rate) across every session
    pub fn stats(&self) -> (u64, u64, f64) {
        self.stats.stats()
    }

    pub fn log_metrics(&self) {
        self.stats.log_metrics();
    }

    /// Register with SQLite under `name`
    pub fn register(self, name: &str) -> Result<Registration<Self>> {
        sqlite::register(name, self)
    }
}

impl std::fmt::Debug for HttpVfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVfs")
            .field("url", &self.url.as_str())
            .field("window_size", &self.options.window_size)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Pick a transport for `url`'s scheme
fn default_transport(url: &Url, options: &VfsOptions) -> Result<Arc<dyn Transport>> {
    match url.scheme() {
        "file" => Ok(Arc::new(FileTransport)),
        "http" | "https" => Ok(Arc::new(HttpTransport::new(options)?)),
        other => {
            warn!(scheme = other, "No transport for URL scheme");
            Err(Error::InvalidUrl(url.to_string()))
        }
    }
}

impl Vfs for HttpVfs {
    type File = HttpFile;

    fn open(&self, name: &str, flags: OpenFlags) -> Result<HttpFile> {
        let kind = flags.kind();
        if kind != OpenKind::MainDb {
            debug!(name = name, kind = ?kind, "Refusing non-database open");
            return Err(Error::Unsupported(format!("{:?} file '{}'", kind, name)));
        }

        let client = RangeClient::new(self.url.clone(), self.transport.clone(), self.runtime.clone());
        let size = client.size()?;

        info!(name = name, url = %self.url, size = size, "Opened remote database");
        let cache = WindowCache::new(self.options.window_size, size);
        Ok(HttpFile::new(client, cache, self.stats.clone()))
    }

    fn delete(&self, name: &str, _sync_dir: bool) -> Result<()> {
        debug!(name = name, "Refusing delete");
        Err(Error::ReadOnly)
    }

    fn access(&self, name: &str, _flag: AccessFlag) -> Result<bool> {
        Ok(!ABSENT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
    }

    fn full_pathname<'a>(&self, name: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(name)
    }
}

/// Builder for [`HttpVfs`]
#[derive(Default)]
pub struct HttpVfsBuilder {
    options: VfsOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpVfsBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            options: VfsOptions::new(url),
            transport: None,
        }
    }

    pub fn window_size(mut self, bytes: usize) -> Self {
        self.options.window_size = bytes;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.options.timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.user_agent = Some(user_agent.into());
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.options.referer = Some(referer.into());
        self
    }

    /// Add an extra request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name.into(), value.into());
        self
    }

    /// Use `transport` instead of picking one by URL scheme
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<HttpVfs> {
        HttpVfs::build(self.options, self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_WINDOW_SIZE;
    use crate::http::MemoryTransport;
    use crate::vfs::contract::VfsFile;
    use rusqlite::ffi;
    use std::io::Write;

    fn main_db() -> OpenFlags {
        OpenFlags::from_bits(ffi::SQLITE_OPEN_MAIN_DB | ffi::SQLITE_OPEN_READONLY)
    }

    fn memory_vfs(data: Vec<u8>) -> (HttpVfs, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new(data));
        let vfs = HttpVfs::builder("https://example.com/test.db")
            .window_size(MIN_WINDOW_SIZE)
            .transport(transport.clone())
            .build()
            .unwrap();
        (vfs, transport)
    }

    #[test]
    fn test_access_hides_companion_files() {
        let vfs = HttpVfs::new("https://example.com/test.db").unwrap();
        assert!(!vfs.access("test.db-wal", AccessFlag::Exists).unwrap());
        assert!(!vfs.access("test.db-journal", AccessFlag::Exists).unwrap());
        assert!(vfs.access("test.db", AccessFlag::Exists).unwrap());
        assert!(vfs.access("test.db-shm", AccessFlag::ReadWrite).unwrap());
    }

    #[test]
    fn test_delete_and_full_pathname() {
        let vfs = HttpVfs::new("https://example.com/test.db").unwrap();
        assert!(matches!(vfs.delete("test.db", true), Err(Error::ReadOnly)));
        assert_eq!(vfs.full_pathname("test.db"), "test.db");
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(HttpVfs::new("ftp://example.com/test.db"), Err(Error::InvalidUrl(_))));
        assert!(matches!(HttpVfs::new("no scheme"), Err(Error::InvalidUrl(_))));
        assert!(matches!(
            HttpVfs::builder("https://example.com/test.db").window_size(1000).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_open_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        file.write_all(&data).unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let vfs = HttpVfs::builder(url.as_str())
            .window_size(MIN_WINDOW_SIZE)
            .build()
            .unwrap();
        let mut session = vfs.open("test.db", main_db()).unwrap();
        assert_eq!(session.file_size().unwrap(), 70_000);

        let mut buf = [0u8; 4];
        session.read_at(&mut buf, 256).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(vfs.total_read_bytes(), MIN_WINDOW_SIZE as u64);

        // Window [256, 65792) ends before the file does
        session.read_at(&mut buf, 69_996).unwrap();
        assert_eq!(buf.to_vec(), data[69_996..].to_vec());
        assert_eq!(vfs.total_read_bytes(), MIN_WINDOW_SIZE as u64 + 4);
    }

    #[test]
    fn test_open_rejects_companion_kinds() {
        let (vfs, transport) = memory_vfs(vec![0; 16]);
        let journal = OpenFlags::from_bits(ffi::SQLITE_OPEN_MAIN_JOURNAL | ffi::SQLITE_OPEN_READWRITE);
        assert!(matches!(vfs.open("test.db-journal", journal), Err(Error::Unsupported(_))));
        let temp = OpenFlags::from_bits(ffi::SQLITE_OPEN_TEMP_DB | ffi::SQLITE_OPEN_CREATE);
        assert!(matches!(vfs.open("", temp), Err(Error::Unsupported(_))));
        assert_eq!(transport.fetch_count(), 0);
    }

    #[test]
    fn test_open_propagates_size_failure() {
        let (vfs, transport) = memory_vfs(vec![0; 16]);
        transport.set_failing(true);
        assert!(matches!(vfs.open("test.db", main_db()), Err(Error::Network(_))));
    }

    #[test]
    fn test_sessions_own_their_windows() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (vfs, transport) = memory_vfs(data.clone());

        let mut first = vfs.open("test.db", main_db()).unwrap();
        let mut second = vfs.open("test.db", main_db()).unwrap();

        let mut buf = [0u8; 16];
        first.read_at(&mut buf, 0).unwrap();
        second.read_at(&mut buf, 100_000).unwrap();
        assert_eq!(buf.to_vec(), data[100_000..100_016].to_vec());
        assert_eq!(transport.fetch_count(), 2);

        // Each session still hits its own window
        first.read_at(&mut buf, 1024).unwrap();
        second.read_at(&mut buf, 100_512).unwrap();
        assert_eq!(transport.fetch_count(), 2);
        assert_eq!(first.cache().window(), Some((0, MIN_WINDOW_SIZE)));
        assert_eq!(second.cache().window(), Some((100_000, MIN_WINDOW_SIZE)));

        let (hits, misses, _) = vfs.stats();
        assert_eq!((hits, misses), (2, 2));
        assert_eq!(vfs.total_read_bytes(), 2 * MIN_WINDOW_SIZE as u64);
    }
}
