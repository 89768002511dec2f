//! Range transports
//!
//! A [`Transport`] knows how to discover the length of a remote resource and
//! fetch byte ranges from it. `HttpTransport` speaks HTTP range requests;
//! `FileTransport` serves `file://` URLs straight from the local disk;
//! `MemoryTransport` serves an in-memory buffer.
//! Embedders can inject their own implementation to add caching, signing or
//! an alternate fetch strategy.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE, REFERER};
use reqwest::{Client, StatusCode, Url};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::types::{ByteRange, ContentRange};
use crate::config::VfsOptions;
use crate::errors::{Error, Result};

/// Size discovery and ranged reads against a remote resource
#[async_trait]
pub trait Transport: Send + Sync {
    /// Total length of the resource in bytes
    async fn size(&self, url: &Url) -> Result<u64>;

    /// Fetch exactly `range.len` bytes starting at `range.start`.
    ///
    /// Implementations must return a freshly allocated buffer on every call;
    /// the window cache adopts it without copying.
    async fn read_range(&self, url: &Url, range: ByteRange) -> Result<Vec<u8>>;
}

/// Range transport over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with the timeout and header overrides in `options`
    pub fn new(options: &VfsOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }
        if let Some(referer) = &options.referer {
            let value = HeaderValue::from_str(referer)
                .map_err(|e| Error::Config(format!("referer: {}", e)))?;
            headers.insert(REFERER, value);
        }

        let mut builder = Client::builder()
            .timeout(options.timeout())
            .default_headers(headers);
        if let Some(user_agent) = &options.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder.build().map_err(Error::from_reqwest)?;
        Ok(Self { client })
    }

    /// Fall back to `GET Range: bytes=0-0` and read the total from `Content-Range`
    async fn probe_size(&self, url: &Url) -> Result<u64> {
        let response = self
            .client
            .get(url.clone())
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::PARTIAL_CONTENT || status == StatusCode::RANGE_NOT_SATISFIABLE {
            let value = header_str(response.headers(), &CONTENT_RANGE).ok_or(Error::MissingContentLength)?;
            return ContentRange::parse(value)?
                .total
                .ok_or(Error::MissingContentLength);
        }

        if status.is_success() {
            return header_u64(response.headers(), &CONTENT_LENGTH).ok_or(Error::MissingContentLength);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn size(&self, url: &Url) -> Result<u64> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            // Read the header itself: the body of a HEAD response is always empty
            if let Some(len) = header_u64(response.headers(), &CONTENT_LENGTH) {
                debug!(url = %url, size = len, "Discovered remote size");
                return Ok(len);
            }
            debug!(url = %url, "HEAD without Content-Length, probing with a range request");
        } else if status != StatusCode::METHOD_NOT_ALLOWED {
            // A HEAD response has no body to report, so use the reason phrase
            return Err(Error::from_status(status.as_u16(), status.canonical_reason().unwrap_or("")));
        }

        let len = self.probe_size(url).await?;
        debug!(url = %url, size = len, "Discovered remote size");
        Ok(len)
    }

    async fn read_range(&self, url: &Url, range: ByteRange) -> Result<Vec<u8>> {
        if range.len == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(url.clone())
            .header(RANGE, range.to_header_value())
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {
                if let Some(value) = header_str(response.headers(), &CONTENT_RANGE) {
                    let content_range = ContentRange::parse(value)?;
                    if content_range.range.map(|(first, _)| first) != Some(range.start) {
                        return Err(Error::InvalidContentRange(value.to_string()));
                    }
                }
            }
            // Server ignored the Range header; usable only if the whole body is the range
            StatusCode::OK if range.start == 0 => {}
            s if s.is_success() => return Err(Error::RangeNotSupported(s.as_u16())),
            s => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::from_status(s.as_u16(), &body));
            }
        }

        let bytes = response.bytes().await.map_err(Error::from_reqwest)?;

        if bytes.len() != range.len {
            if status == StatusCode::OK {
                return Err(Error::RangeNotSupported(status.as_u16()));
            }
            return Err(Error::ShortBody {
                expected: range.len,
                actual: bytes.len(),
            });
        }

        Ok(bytes.to_vec())
    }
}

/// Range transport for `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn path_of(url: &Url) -> Result<PathBuf> {
        url.to_file_path()
            .map_err(|_| Error::InvalidUrl(url.to_string()))
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn size(&self, url: &Url) -> Result<u64> {
        let path = Self::path_of(url)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        Ok(metadata.len())
    }

    async fn read_range(&self, url: &Url, range: ByteRange) -> Result<Vec<u8>> {
        let path = Self::path_of(url)?;
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let mut buf = Vec::with_capacity(range.len);
        file.take(range.len as u64).read_to_end(&mut buf).await?;

        if buf.len() != range.len {
            return Err(Error::ShortBody {
                expected: range.len,
                actual: buf.len(),
            });
        }
        Ok(buf)
    }
}

/// Range transport over an in-memory buffer
///
/// Records every requested range and can be switched into a failing mode.
/// Not gated on `cfg(test)` so embedders can use it in their own tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    data: Vec<u8>,
    requests: Mutex<Vec<ByteRange>>,
    fail: AtomicBool,
}

impl MemoryTransport {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `size`/`read_range` call fail with a network error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Ranges requested so far, oldest first
    pub fn requests(&self) -> Vec<ByteRange> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of `read_range` calls so far
    pub fn fetch_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Network("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn size(&self, _url: &Url) -> Result<u64> {
        self.check_failing()?;
        Ok(self.data.len() as u64)
    }

    async fn read_range(&self, _url: &Url, range: ByteRange) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(range);
        self.check_failing()?;

        let start = usize::try_from(range.start).unwrap_or(usize::MAX).min(self.data.len());
        let end = start.saturating_add(range.len).min(self.data.len());
        if end - start != range.len {
            return Err(Error::ShortBody {
                expected: range.len,
                actual: end - start,
            });
        }
        Ok(self.data[start..end].to_vec())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &HeaderName) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> (tempfile::NamedTempFile, Url) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        file.flush().unwrap();
        let url = Url::from_file_path(file.path()).unwrap();
        (file, url)
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_file_transport_size_and_range() {
        let (_file, url) = fixture();
        let transport = FileTransport;

        assert_eq!(block_on(transport.size(&url)).unwrap(), 10);
        assert_eq!(
            block_on(transport.read_range(&url, ByteRange::new(3, 4))).unwrap(),
            vec![3, 4, 5, 6]
        );
    }

    #[test]
    fn test_file_transport_short_body() {
        let (_file, url) = fixture();
        let result = block_on(FileTransport.read_range(&url, ByteRange::new(8, 4)));
        assert!(matches!(
            result,
            Err(Error::ShortBody {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_file_transport_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.db")).unwrap();
        assert!(matches!(block_on(FileTransport.size(&url)), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_memory_transport_records_requests() {
        let transport = MemoryTransport::new((0..10).collect());
        let url = Url::parse("memory://test.db").unwrap();

        assert_eq!(block_on(transport.size(&url)).unwrap(), 10);
        assert_eq!(
            block_on(transport.read_range(&url, ByteRange::new(6, 4))).unwrap(),
            vec![6, 7, 8, 9]
        );
        assert!(matches!(
            block_on(transport.read_range(&url, ByteRange::new(8, 4))),
            Err(Error::ShortBody { expected: 4, actual: 2 })
        ));
        assert_eq!(transport.requests(), vec![ByteRange::new(6, 4), ByteRange::new(8, 4)]);

        transport.set_failing(true);
        assert!(matches!(block_on(transport.size(&url)), Err(Error::Network(_))));
    }

    #[test]
    fn test_http_transport_rejects_bad_header() {
        let mut options = VfsOptions::new("http://localhost/test.db");
        options.headers.insert("Bad Header".into(), "x".into());
        assert!(matches!(HttpTransport::new(&options), Err(Error::Config(_))));

        let mut options = VfsOptions::new("http://localhost/test.db");
        options.user_agent = Some("reader/1.0".into());
        options.referer = Some("https://example.com/".into());
        assert!(HttpTransport::new(&options).is_ok());
    }
}
