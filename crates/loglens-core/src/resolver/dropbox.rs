use super::{with_scheme, LinkCandidate, LinkResolver};
use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::{LogLensError, Result};
use crate::network::{filename_from_url, HttpClient};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const HOST: &str = "dropbox";

static SHARE_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<link>(https?://)?(www\.)?dropbox\.com/(?:s|scl/fi)/[^\s<>]+)")
        .expect("Invalid Dropbox link regex")
});

/// Dropbox share links, switched to direct download with `dl=1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropboxResolver;

impl DropboxResolver {
    /// Rewrite a share link so it serves the file instead of a preview page.
    pub fn direct_url(share_url: &str) -> Option<String> {
        let mut url = Url::parse(share_url).ok()?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "dl" && k != "raw")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("dl", "1");
        Some(url.to_string())
    }
}

#[async_trait]
impl LinkResolver for DropboxResolver {
    fn host(&self) -> &'static str {
        HOST
    }

    fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        SHARE_LINK_REGEX
            .captures_iter(message)
            .filter_map(|caps| caps.name("link"))
            .map(|m| {
                let link = with_scheme(m.as_str());
                let filename = filename_from_url(&link);
                LinkCandidate::new(HOST, link, filename)
            })
            .collect()
    }

    async fn resolve(
        &self,
        _http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate> {
        cancel.check()?;
        let direct =
            Self::direct_url(&candidate.raw_url).ok_or_else(|| LogLensError::ResolveFailed {
                host: HOST.to_string(),
                url: candidate.raw_url.clone(),
                message: "malformed share link".to_string(),
            })?;
        Ok(candidate.resolved(direct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_share_link() {
        let links = DropboxResolver.find_links("https://www.dropbox.com/s/abc123/RPCS3.log.gz?dl=0");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].declared_filename.as_deref(), Some("RPCS3.log.gz"));
        assert_eq!(
            DropboxResolver::direct_url(&links[0].raw_url).as_deref(),
            Some("https://www.dropbox.com/s/abc123/RPCS3.log.gz?dl=1")
        );
    }

    #[test]
    fn test_scl_link_keeps_rlkey() {
        let direct = DropboxResolver::direct_url(
            "https://www.dropbox.com/scl/fi/xyz/RPCS3.zip?rlkey=k3y&dl=0",
        )
        .unwrap();
        assert_eq!(
            direct,
            "https://www.dropbox.com/scl/fi/xyz/RPCS3.zip?rlkey=k3y&dl=1"
        );
    }

    #[tokio::test]
    async fn test_resolve() {
        let http = HttpClient::new().unwrap();
        let candidate = LinkCandidate::new(HOST, "https://dropbox.com/s/k/RPCS3.log", None);
        let resolved = DropboxResolver
            .resolve(&http, &candidate, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.download_url(), "https://dropbox.com/s/k/RPCS3.log?dl=1");
        assert_eq!(resolved.raw_url, candidate.raw_url);
    }
}
