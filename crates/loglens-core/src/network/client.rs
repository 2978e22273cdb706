//! HTTP client used by link resolvers and the update checker.
//!
//! Wraps reqwest with:
//! - Status checking (429 maps to `RateLimited`, other failures to `Network`)
//! - Best-effort `HEAD` metadata probes
//! - Body streams adapted to `io::Result<Bytes>` for the decode pipe

use crate::config::NetworkConfig;
use crate::error::{LogLensError, Result};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client, Response, StatusCode};
use std::io;
use std::time::Duration;
use tracing::debug;

/// Raw body bytes of a download, as pulled from the network.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Metadata a `HEAD` request revealed about a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub size: Option<u64>,
    pub filename: Option<String>,
}

/// An opened download body.
pub struct OpenedStream {
    pub stream: ByteStream,
    pub content_length: Option<u64>,
    pub filename: Option<String>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("content_length", &self.content_length)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// HTTP client wrapper.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Timeout for requests whose body is read in full.
    default_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom default timeout.
    ///
    /// Streamed downloads are bounded only by the connect timeout, since a
    /// large archive may legitimately take longer than any request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| LogLensError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .timeout(self.default_timeout)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e, self.default_timeout))?;
        check_response_status(response, url)
    }

    /// Make a HEAD request.
    pub async fn head(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .head(url)
            .timeout(NetworkConfig::PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error("HEAD", url, e, NetworkConfig::PROBE_TIMEOUT))?;
        check_response_status(response, url)
    }

    /// GET a page and return its body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| LogLensError::Network {
            message: format!("Failed to read body of {}: {}", url, e),
            cause: None,
        })
    }

    /// Ask the server for size and file name without downloading anything.
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let response = self.head(url).await?;
        let info = probe_info(&response);
        debug!(
            "Probed {}: size={:?} filename={:?}",
            url, info.size, info.filename
        );
        Ok(info)
    }

    /// Start a streamed GET and hand back the body as a byte stream.
    pub async fn open_stream(&self, url: &str) -> Result<OpenedStream> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e, NetworkConfig::CONNECT_TIMEOUT))?;
        let response = check_response_status(response, url)?;
        let info = probe_info(&response);
        let stream = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(OpenedStream {
            stream,
            content_length: info.size,
            filename: info.filename,
        })
    }
}

fn request_error(method: &str, url: &str, err: reqwest::Error, timeout: Duration) -> LogLensError {
    if err.is_timeout() {
        return LogLensError::Timeout(timeout);
    }
    LogLensError::Network {
        message: format!("{} {} failed: {}", method, url, err),
        cause: std::error::Error::source(&err).map(|s| s.to_string()),
    }
}

fn check_response_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    // Handle rate limiting specifically
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        return Err(LogLensError::RateLimited {
            service: extract_domain(url),
            retry_after_secs: retry_after,
        });
    }

    Err(LogLensError::Network {
        message: format!("{} returned HTTP {}", url, status),
        cause: status.canonical_reason().map(str::to_string),
    })
}

fn probe_info(response: &Response) -> ProbeInfo {
    let headers = response.headers();
    // Read the header directly; the body of a HEAD response is always empty.
    let size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);
    ProbeInfo { size, filename }
}

/// Extract the file name from a `Content-Disposition` header value,
/// preferring the RFC 5987 `filename*` form.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let Some((key, val)) = part.trim().split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let val = val.trim();
        match key.as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = val.splitn(3, '\'').nth(2).unwrap_or(val);
                if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                    if !decoded.is_empty() {
                        return Some(decoded.into_owned());
                    }
                }
            }
            "filename" => {
                let name = val.trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// File name from the last path segment of a URL, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    urlencoding::decode(segment)
        .ok()
        .map(|name| name.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.mediafire.com/file/abc/RPCS3.log.gz/file"),
            "www.mediafire.com"
        );
        assert_eq!(extract_domain("invalid-url"), "unknown");
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="RPCS3.log.gz""#),
            Some("RPCS3.log.gz".to_string())
        );
        assert_eq!(
            filename_from_disposition(
                r#"attachment; filename="fallback.log"; filename*=UTF-8''RPCS3%20%281%29.log"#
            ),
            Some("RPCS3 (1).log".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
        assert_eq!(filename_from_disposition("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/logs/RPCS3%20old.log.gz?dl=1"),
            Some("RPCS3 old.log.gz".to_string())
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(client.default_timeout, Duration::from_secs(5));
    }
}
