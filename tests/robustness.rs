//! Robustness tests for edge cases and error conditions.
//!
//! These tests verify that pidns handles hostile inputs and failing
//! upstreams gracefully: no panics, bounded waits, and errors that say why.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pidns::config::Config;
use pidns::fetcher::{HttpFetcher, SourceFetcher, MAX_LIST_SIZE};
use pidns::lists::parse_import;
use pidns::parser::{parse_bytes, parse_list};
use pidns::store::JsonStore;
use pidns::validation::{normalize_domain, parse_expiry, validate_url};

/// Accept one connection, read the request head and answer with `response`
/// after `delay`. Returns the URL to fetch.
async fn serve_once(response: Vec<u8>, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        tokio::time::sleep(delay).await;
        let _ = socket.write_all(&response).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/list.txt", addr)
}

fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

// =============================================================================
// Fetcher
// =============================================================================

/// A server that never answers must not hold the fetch forever
#[tokio::test]
async fn test_fetch_times_out() {
    let url = serve_once(
        http_response("200 OK", &[], b"ads.example.com\n"),
        Duration::from_secs(10),
    )
    .await;
    let fetcher = HttpFetcher::new(Duration::from_millis(200), MAX_LIST_SIZE).unwrap();

    let started = std::time::Instant::now();
    let err = fetcher.fetch(&url).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(err.status, None);
    assert!(err.message.contains("Timed out"), "{}", err.message);
}

#[tokio::test]
async fn test_fetch_reports_http_status() {
    let url = serve_once(
        http_response("404 Not Found", &[], b"gone"),
        Duration::ZERO,
    )
    .await;
    let fetcher = HttpFetcher::with_defaults().unwrap();

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(err.status, Some(404));
    assert!(err.message.contains("404"));
}

#[tokio::test]
async fn test_fetch_decodes_gzip_body() {
    let body = gzip(b"0.0.0.0 ads.example.com\n||track.example.net^\n");
    let url = serve_once(
        http_response("200 OK", &[("Content-Encoding", "gzip")], &body),
        Duration::ZERO,
    )
    .await;
    let fetcher = HttpFetcher::with_defaults().unwrap();

    let content = fetcher.fetch(&url).await.unwrap();
    let domains = parse_bytes(&content);
    assert!(domains.contains("ads.example.com"));
    assert!(domains.contains("track.example.net"));
}

#[tokio::test]
async fn test_fetch_rejects_corrupt_gzip() {
    let url = serve_once(
        http_response("200 OK", &[("Content-Encoding", "gzip")], b"definitely not gzip"),
        Duration::ZERO,
    )
    .await;
    let fetcher = HttpFetcher::with_defaults().unwrap();

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(err.message.contains("decompress"), "{}", err.message);
}

#[tokio::test]
async fn test_fetch_enforces_size_limit() {
    let body = "ads.example.com\n".repeat(64);
    let url = serve_once(
        http_response("200 OK", &[], body.as_bytes()),
        Duration::ZERO,
    )
    .await;
    let fetcher = HttpFetcher::new(Duration::from_secs(5), 128).unwrap();

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(err.message.contains("too large"), "{}", err.message);
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let fetcher = HttpFetcher::new(Duration::from_secs(5), MAX_LIST_SIZE).unwrap();

    let err = fetcher
        .fetch(&format!("http://{}/list.txt", addr))
        .await
        .unwrap_err();
    assert_eq!(err.status, None);
    assert!(!err.message.is_empty());
}

// =============================================================================
// Parsing and validation
// =============================================================================

#[test]
fn test_garbage_lines_are_skipped() {
    let content = "\u{0}\u{1}\u{2}\n\
                   ||^\n\
                   0.0.0.0\n\
                   127.0.0.1 localhost\n\
                   ::1 ip6-localhost\n\
                   <html><body>404</body></html>\n\
                   ads.example.com\n";
    let domains = parse_list(content);
    assert_eq!(domains.len(), 1);
    assert!(domains.contains("ads.example.com"));
}

#[test]
fn test_unicode_handling() {
    assert_eq!(normalize_domain("münchen.de"), None);
    assert_eq!(normalize_domain("例え.jp"), None);
    assert_eq!(normalize_domain("xn--mnchen-3ya.de"), Some("xn--mnchen-3ya.de".to_string()));

    let domains = parse_bytes(&[0xff, 0xfe, b'\n', b'a', b'd', b's', b'.', b'i', b'o', b'\n']);
    assert!(domains.contains("ads.io"));
}

#[test]
fn test_empty_and_whitespace() {
    assert!(parse_list("").is_empty());
    assert!(parse_list("   \n\t\n\r\n").is_empty());
    assert_eq!(normalize_domain(""), None);
    assert_eq!(normalize_domain("   "), None);
}

#[test]
fn test_windows_line_endings() {
    let domains = parse_list("0.0.0.0 ads.example.com\r\nexample.org\r\n");
    assert!(domains.contains("ads.example.com"));
    assert!(domains.contains("example.org"));
}

#[test]
fn test_large_input_handling() {
    let content: String = (0..50_000)
        .map(|i| format!("0.0.0.0 host{}.example.com\n", i))
        .collect();
    let domains = parse_list(&content);
    assert_eq!(domains.len(), 50_000);
}

#[test]
fn test_degenerate_domains_rejected() {
    let long_label = format!("{}.com", "a".repeat(64));
    for raw in [
        "a.b.c.d.e.example.com",
        long_label.as_str(),
        "example.c0m",
        "example.c",
        "256.256.256.256",
        "printer.localhost",
    ] {
        assert_eq!(normalize_domain(raw), None, "{} should be rejected", raw);
    }
}

#[test]
fn test_url_validation_edge_cases() {
    assert!(validate_url("").is_err());
    assert!(validate_url("ftp://example.com/list.txt").is_err());
    assert!(validate_url("https://").is_err());
    assert!(validate_url("javascript:alert(1)").is_err());
    assert!(validate_url("  https://example.com/hosts  ").is_ok());
}

#[test]
fn test_expiry_parsing_edge_cases() {
    assert!(parse_expiry("2026-02-30").is_err());
    assert!(parse_expiry("tomorrow").is_err());
    assert!(parse_expiry("").is_err());
    assert!(parse_expiry("2026-01-01T00:00:00+02:00").is_ok());
}

// =============================================================================
// Malformed files
// =============================================================================

#[test]
fn test_yaml_malformed_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    for content in [
        "dnsmasq: [unclosed",
        "fetch:\n  timeout_secs: -5\n",
        "schedule:\n  update_interval: 5 minutes\n",
        "fetch:\n  concurrency: 0\n",
    ] {
        std::fs::write(&path, content).unwrap();
        assert!(Config::load(&path).is_err(), "accepted: {}", content);
    }

    // Unknown keys and partial files fall back to defaults
    std::fs::write(&path, "schedule:\n  update_interval: 12h\n").unwrap();
    let config = Config::load(&path).unwrap();
    assert_eq!(config.schedule.update_interval, "12h");
    assert_eq!(config.dnsmasq.service, "dnsmasq");
}

#[test]
fn test_json_store_malformed_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pidns.json");

    std::fs::write(&path, "{\"sources\": {").unwrap();
    let err = JsonStore::open(&path).err().unwrap();
    assert!(err.to_string().contains("Failed to parse store"));

    // An empty file is a fresh store
    std::fs::write(&path, "").unwrap();
    assert!(JsonStore::open(&path).is_ok());
}

#[test]
fn test_import_malformed_input() {
    assert!(parse_import("[{\"domain\": ").is_err());
    assert!(parse_import("[1, 2, 3]").is_err());

    let records = parse_import("# exported\n\nads.example.com\n  cdn.example.com  \n").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].domain, "cdn.example.com");
}
