use super::{LinkCandidate, LinkResolver};
use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::Result;
use crate::network::{filename_from_url, HttpClient};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const HOST: &str = "direct";

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`|]+"#).expect("Invalid URL regex"));

const EXTENSIONS: &[&str] = &[".log", ".gz", ".zip", ".zst", ".7z", ".rar"];

/// Hosts that have a dedicated resolver.
const CLAIMED_HOSTS: &[&str] = &["mediafire.com", "drive.google.com", "dropbox.com"];

/// Plain links that already point at a log or archive.
#[derive(Debug, Clone)]
pub struct DirectLinkResolver {
    extensions: Vec<String>,
}

impl DirectLinkResolver {
    pub fn new() -> Self {
        Self {
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn accepts(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let claimed = CLAIMED_HOSTS
            .iter()
            .any(|c| host == *c || host.ends_with(&format!(".{}", c)));
        if claimed {
            return false;
        }
        let path = url.path().to_ascii_lowercase();
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

impl Default for DirectLinkResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkResolver for DirectLinkResolver {
    fn host(&self) -> &'static str {
        HOST
    }

    fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        URL_REGEX
            .find_iter(message)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '>']))
            .filter(|link| Url::parse(link).is_ok_and(|url| self.accepts(&url)))
            .map(|link| LinkCandidate::new(HOST, link, filename_from_url(link)))
            .collect()
    }

    async fn resolve(
        &self,
        _http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate> {
        cancel.check()?;
        Ok(candidate.resolved(candidate.raw_url.clone()))
    }
}
