//! Latest-build lookup used by the staleness check.
//!
//! Provides:
//! - `UpdateSource`, the collaborator interface
//! - `CompatUpdateClient`, the HTTP implementation against the update API
//! - `CachedUpdateSource`, a TTL cache in front of any source
//! - `fetch_update_info`, the commit-qualified query with one fallback

use crate::config::NetworkConfig;
use crate::error::{LogLensError, Result};
use crate::network::client::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use mini_moka::sync::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

static BUILD_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rpcs3-v(?P<version>[\d.]+)(?:-(?P<build>\d+))?-(?P<commit>[0-9a-f]+)_")
        .expect("Invalid build link regex")
});

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The newest known release, as reported by the update service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub latest_version: String,
    pub latest_build_number: Option<u64>,
    pub latest_commit: String,
    pub release_timestamp: DateTime<Utc>,
    /// Build time of the commit the query was made for, when the service knew it.
    pub current_build_timestamp: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
}

impl UpdateInfo {
    /// Time between the queried build and the latest release, when known.
    pub fn build_gap(&self) -> Option<chrono::Duration> {
        self.current_build_timestamp
            .map(|current| self.release_timestamp - current)
    }
}

/// Supplier of latest-release information.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// `Ok(None)` means the service had no data for this query.
    async fn latest_update(&self, commit_hint: Option<&str>) -> Result<Option<UpdateInfo>>;
}

#[async_trait]
impl<S: UpdateSource + ?Sized> UpdateSource for Arc<S> {
    async fn latest_update(&self, commit_hint: Option<&str>) -> Result<Option<UpdateInfo>> {
        (**self).latest_update(commit_hint).await
    }
}

/// Query with the log's commit first, then once more without it if the
/// commit-qualified query had no data.
pub async fn fetch_update_info(
    source: &dyn UpdateSource,
    commit: Option<&str>,
) -> Result<Option<UpdateInfo>> {
    let Some(commit) = commit.filter(|c| !c.is_empty()) else {
        return source.latest_update(None).await;
    };
    if let Some(info) = source.latest_update(Some(commit)).await? {
        return Ok(Some(info));
    }
    debug!("No update data for commit {}, querying latest build", commit);
    source.latest_update(None).await
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    return_code: i32,
    latest_build: Option<BuildEntry>,
    current_build: Option<BuildEntry>,
}

#[derive(Debug, Deserialize)]
struct BuildEntry {
    datetime: Option<String>,
    windows: Option<PlatformBuild>,
    linux: Option<PlatformBuild>,
}

#[derive(Debug, Deserialize)]
struct PlatformBuild {
    download: Option<String>,
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Version, optional build number and commit from a build download link.
pub fn parse_build_link(link: &str) -> Option<(String, Option<u64>, String)> {
    let caps = BUILD_LINK_REGEX.captures(link)?;
    let version = caps.name("version")?.as_str().trim_end_matches('.').to_string();
    let build = caps.name("build").and_then(|b| b.as_str().parse().ok());
    let commit = caps.name("commit")?.as_str().to_string();
    Some((version, build, commit))
}

/// Parse an update API response body.
pub fn parse_update_response(body: &str) -> Result<Option<UpdateInfo>> {
    let response: UpdateResponse = serde_json::from_str(body)?;
    if response.return_code < 0 {
        return Ok(None);
    }
    let Some(latest) = response.latest_build else {
        return Ok(None);
    };

    let download_url = latest
        .windows
        .as_ref()
        .and_then(|w| w.download.clone())
        .or_else(|| latest.linux.as_ref().and_then(|l| l.download.clone()));
    let Some((latest_version, latest_build_number, latest_commit)) =
        download_url.as_deref().and_then(parse_build_link)
    else {
        return Ok(None);
    };
    let Some(release_timestamp) = latest.datetime.as_deref().and_then(parse_datetime) else {
        return Err(LogLensError::Json {
            message: "latest_build.datetime is missing or malformed".to_string(),
            source: None,
        });
    };
    let current_build_timestamp = response
        .current_build
        .and_then(|c| c.datetime)
        .as_deref()
        .and_then(parse_datetime);

    Ok(Some(UpdateInfo {
        latest_version,
        latest_build_number,
        latest_commit,
        release_timestamp,
        current_build_timestamp,
        download_url,
    }))
}

/// HTTP client for the build update API.
pub struct CompatUpdateClient {
    http: Arc<HttpClient>,
    base_url: String,
}

impl CompatUpdateClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_base_url(http, NetworkConfig::UPDATE_API_BASE)
    }

    pub fn with_base_url(http: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn query_url(&self, commit_hint: Option<&str>) -> String {
        let mut url = format!("{}?api=v1", self.base_url);
        if let Some(commit) = commit_hint {
            url.push_str("&c=");
            url.push_str(&urlencoding::encode(commit));
        }
        url
    }
}

#[async_trait]
impl UpdateSource for CompatUpdateClient {
    async fn latest_update(&self, commit_hint: Option<&str>) -> Result<Option<UpdateInfo>> {
        let url = self.query_url(commit_hint);
        let body = self.http.get_text(&url).await?;
        parse_update_response(&body)
    }
}

/// TTL cache in front of another update source.
pub struct CachedUpdateSource<S> {
    inner: S,
    cache: Cache<String, Option<UpdateInfo>>,
}

impl<S: UpdateSource> CachedUpdateSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_ttl(inner, NetworkConfig::UPDATE_CACHE_TTL)
    }

    pub fn with_ttl(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(NetworkConfig::UPDATE_CACHE_CAPACITY)
                .build(),
        }
    }

    fn key(commit_hint: Option<&str>) -> String {
        commit_hint.unwrap_or_default().to_ascii_lowercase()
    }
}

#[async_trait]
impl<S: UpdateSource> UpdateSource for CachedUpdateSource<S> {
    async fn latest_update(&self, commit_hint: Option<&str>) -> Result<Option<UpdateInfo>> {
        let key = Self::key(commit_hint);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Update info cache hit for {:?}", commit_hint);
            return Ok(cached);
        }
        let fresh = self.inner.latest_update(commit_hint).await?;
        self.cache.insert(key, fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const RESPONSE: &str = r#"{
        "return_code": 1,
        "latest_build": {
            "pr": 12345,
            "datetime": "2021-03-02 10:20:30",
            "windows": { "download": "https://github.com/RPCS3/rpcs3-binaries-win/releases/download/build-abc/rpcs3-v0.0.15-11900-5d3a4d3a_win64.7z", "size": 1 },
            "linux": { "download": "https://github.com/RPCS3/rpcs3-binaries-linux/releases/download/build-abc/rpcs3-v0.0.15-11900-5d3a4d3a_linux64.AppImage" }
        },
        "current_build": { "pr": 12000, "datetime": "2021-02-20 08:00:00" }
    }"#;

    #[test]
    fn test_parse_update_response() {
        let info = parse_update_response(RESPONSE).unwrap().unwrap();
        assert_eq!(info.latest_version, "0.0.15");
        assert_eq!(info.latest_build_number, Some(11900));
        assert_eq!(info.latest_commit, "5d3a4d3a");
        assert_eq!(
            info.release_timestamp,
            Utc.with_ymd_and_hms(2021, 3, 2, 10, 20, 30).unwrap()
        );
        assert_eq!(
            info.build_gap(),
            Some(Utc.with_ymd_and_hms(2021, 3, 2, 10, 20, 30).unwrap()
                - Utc.with_ymd_and_hms(2021, 2, 20, 8, 0, 0).unwrap())
        );
        assert!(info.download_url.unwrap().ends_with("_win64.7z"));
    }

    #[test]
    fn test_negative_return_code_is_no_data() {
        let body = r#"{ "return_code": -1, "latest_build": null }"#;
        assert_eq!(parse_update_response(body).unwrap(), None);
    }

    #[test]
    fn test_parse_build_link_without_build_number() {
        assert_eq!(
            parse_build_link("rpcs3-v0.0.5-a19113025_win64.7z"),
            Some(("0.0.5".to_string(), None, "a19113025".to_string()))
        );
        assert_eq!(parse_build_link("rpcs3.7z"), None);
    }

    #[test]
    fn test_query_url() {
        let http = Arc::new(HttpClient::new().unwrap());
        let client = CompatUpdateClient::with_base_url(http, "https://update.example/");
        assert_eq!(client.query_url(None), "https://update.example/?api=v1");
        assert_eq!(
            client.query_url(Some("a19113025")),
            "https://update.example/?api=v1&c=a19113025"
        );
    }

    struct ScriptedSource {
        calls: AtomicUsize,
        hints: Mutex<Vec<Option<String>>>,
        with_commit: Option<UpdateInfo>,
        without_commit: Option<UpdateInfo>,
    }

    impl ScriptedSource {
        fn new(with_commit: Option<UpdateInfo>, without_commit: Option<UpdateInfo>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                hints: Mutex::new(Vec::new()),
                with_commit,
                without_commit,
            }
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn latest_update(&self, commit_hint: Option<&str>) -> Result<Option<UpdateInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hints
                .lock()
                .unwrap()
                .push(commit_hint.map(str::to_string));
            Ok(match commit_hint {
                Some(_) => self.with_commit.clone(),
                None => self.without_commit.clone(),
            })
        }
    }

    fn sample_info() -> UpdateInfo {
        parse_update_response(RESPONSE).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_falls_back_once() {
        let source = ScriptedSource::new(None, Some(sample_info()));
        let info = fetch_update_info(&source, Some("deadbeef")).await.unwrap();
        assert_eq!(info, Some(sample_info()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *source.hints.lock().unwrap(),
            vec![Some("deadbeef".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_fetch_uses_commit_answer() {
        let source = ScriptedSource::new(Some(sample_info()), None);
        let info = fetch_update_info(&source, Some("deadbeef")).await.unwrap();
        assert!(info.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_without_commit_queries_once() {
        let source = ScriptedSource::new(None, None);
        assert_eq!(fetch_update_info(&source, None).await.unwrap(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_queries() {
        let cached = CachedUpdateSource::new(ScriptedSource::new(Some(sample_info()), None));
        for _ in 0..3 {
            assert!(cached.latest_update(Some("ABC")).await.unwrap().is_some());
        }
        assert!(cached.latest_update(Some("abc")).await.unwrap().is_some());
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        // A different hint is a different entry.
        cached.latest_update(None).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }
}
