//! HTTP fetcher for downloading block lists.
//!
//! A fetch is a single bounded attempt: no immediate retries. A failed source
//! keeps its previous DomainSet and is tried again on the next scheduled
//! refresh.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_ENCODING;
use reqwest::Client;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum size per block list (20 MB, after decompression)
/// StevenBlack's unified hosts file is ~4 MB, so this leaves ample margin
pub const MAX_LIST_SIZE: usize = 20 * 1024 * 1024;

const USER_AGENT: &str = concat!("pidns/", env!("CARGO_PKG_VERSION"));

/// Why a fetch failed. `status` is set when the server answered with a
/// non-success HTTP status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    pub status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, url: &str) -> Self {
        Self {
            status: Some(status),
            message: format!("HTTP {} for {}", status, url),
        }
    }
}

/// Downloads the raw content of a block list.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `url`, returning the (decompressed) body bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP client for fetching lists
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_size: usize,
}

impl HttpFetcher {
    /// Create a new fetcher with the given request timeout and size cap.
    pub fn new(timeout: Duration, max_size: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            timeout,
            max_size,
        })
    }

    /// Create a fetcher with the default 30 s timeout and 20 MB cap.
    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS), MAX_LIST_SIZE)
    }

    fn describe(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::new(format!(
                "Timed out after {}s fetching {}",
                self.timeout.as_secs(),
                url
            ))
        } else if let Some(status) = err.status() {
            FetchError::http(status.as_u16(), url)
        } else {
            FetchError::new(format!("Network error fetching {}: {}", url, err))
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.describe(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http(status.as_u16(), url));
        }

        // Check Content-Length header if available
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_size as u64 {
                return Err(FetchError::new(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    content_length, self.max_size
                )));
            }
        }

        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.describe(url, e))? {
            if body.len() + chunk.len() > self.max_size {
                return Err(FetchError::new(format!(
                    "Downloaded content too large (max: {} bytes)",
                    self.max_size
                )));
            }
            body.extend_from_slice(&chunk);
        }

        decode_body(body, encoding.as_deref(), self.max_size)
    }
}

/// Undo `Content-Encoding: gzip`. Other encodings pass through untouched.
///
/// The decompressed size is capped at `max_size` as well.
pub fn decode_body(
    body: Vec<u8>,
    content_encoding: Option<&str>,
    max_size: usize,
) -> Result<Vec<u8>, FetchError> {
    let is_gzip = content_encoding
        .map(|enc| {
            enc.split(',')
                .any(|part| part.trim().eq_ignore_ascii_case("gzip"))
        })
        .unwrap_or(false);

    if !is_gzip {
        return Ok(body);
    }

    let mut decoded = Vec::with_capacity(body.len() * 4);
    GzDecoder::new(body.as_slice())
        .take(max_size as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| FetchError::new(format!("Failed to decompress gzip body: {}", e)))?;

    if decoded.len() > max_size {
        return Err(FetchError::new(format!(
            "Decompressed content too large (max: {} bytes)",
            max_size
        )));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::http(503, "https://example.com/hosts");
        assert_eq!(err.status, Some(503));
        assert_eq!(err.to_string(), "HTTP 503 for https://example.com/hosts");

        let err = FetchError::new("boom");
        assert_eq!(err.status, None);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_decode_identity() {
        let body = b"0.0.0.0 ads.example.com\n".to_vec();
        assert_eq!(decode_body(body.clone(), None, MAX_LIST_SIZE).unwrap(), body);
        assert_eq!(
            decode_body(body.clone(), Some("identity"), MAX_LIST_SIZE).unwrap(),
            body
        );
    }

    #[test]
    fn test_decode_gzip() {
        let plain = b"||ads.example.com^\n".repeat(100);
        let compressed = gzip(&plain);
        assert_eq!(
            decode_body(compressed.clone(), Some("gzip"), MAX_LIST_SIZE).unwrap(),
            plain
        );
        assert_eq!(
            decode_body(compressed, Some("GZIP"), MAX_LIST_SIZE).unwrap(),
            plain
        );
    }

    #[test]
    fn test_decode_gzip_invalid() {
        let err = decode_body(b"not gzip at all".to_vec(), Some("gzip"), MAX_LIST_SIZE)
            .unwrap_err();
        assert!(err.message.contains("decompress"));
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_decode_gzip_size_cap() {
        let plain = vec![b'a'; 4096];
        let err = decode_body(gzip(&plain), Some("gzip"), 1024).unwrap_err();
        assert!(err.message.contains("too large"));
    }

    #[test]
    fn test_http_fetcher_new() {
        assert!(HttpFetcher::with_defaults().is_ok());
        assert!(HttpFetcher::new(Duration::from_secs(1), 1024).is_ok());
    }

    #[tokio::test]
    async fn test_http_fetcher_connection_refused() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2), 1024).unwrap();
        // Port 1 on loopback is not listening in test environments
        let err = fetcher.fetch("http://127.0.0.1:1/hosts").await.unwrap_err();
        assert_eq!(err.status, None);
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn test_mock_fetcher() {
        let mut mock = MockSourceFetcher::new();
        mock.expect_fetch()
            .withf(|url| url == "https://example.com/hosts")
            .times(1)
            .returning(|_| Ok(b"example.org\n".to_vec()));

        let body = mock.fetch("https://example.com/hosts").await.unwrap();
        assert_eq!(body, b"example.org\n");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes as gzip never panics
        #[test]
        fn prop_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_body(bytes, Some("gzip"), 4096);
        }
    }
}
