use super::{with_scheme, LinkCandidate, LinkResolver};
use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::{LogLensError, Result};
use crate::network::HttpClient;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

const HOST: &str = "google_drive";

static SHARE_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<link>(https?://)?drive\.google\.com/(?:file/d/(?P<file_id>[\w-]+)[^\s]*|open\?id=(?P<open_id>[\w-]+)))",
    )
    .expect("Invalid Google Drive link regex")
});

/// `drive.google.com` share links.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleDriveResolver;

impl GoogleDriveResolver {
    pub fn download_url(file_id: &str) -> String {
        format!(
            "https://drive.usercontent.google.com/download?id={}&export=download&confirm=t",
            file_id
        )
    }

    fn file_id(raw_url: &str) -> Option<String> {
        let caps = SHARE_LINK_REGEX.captures(raw_url)?;
        caps.name("file_id")
            .or_else(|| caps.name("open_id"))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl LinkResolver for GoogleDriveResolver {
    fn host(&self) -> &'static str {
        HOST
    }

    fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        SHARE_LINK_REGEX
            .captures_iter(message)
            .filter_map(|caps| caps.name("link"))
            .map(|m| LinkCandidate::new(HOST, with_scheme(m.as_str()), None))
            .collect()
    }

    // The file name only becomes known from the download's Content-Disposition.
    async fn resolve(
        &self,
        _http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate> {
        cancel.check()?;
        let file_id = Self::file_id(&candidate.raw_url).ok_or_else(|| LogLensError::ResolveFailed {
            host: HOST.to_string(),
            url: candidate.raw_url.clone(),
            message: "link has no file id".to_string(),
        })?;
        Ok(candidate.resolved(Self::download_url(&file_id)))
    }
}
