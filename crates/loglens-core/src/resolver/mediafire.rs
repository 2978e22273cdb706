use super::{with_scheme, LinkCandidate, LinkResolver};
use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::{LogLensError, Result};
use crate::network::HttpClient;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

const HOST: &str = "mediafire";

static SHARE_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<mediafire_link>(https?://)?(www\.)?mediafire\.com/file/(?P<quick_key>[^/\s]+)/(?P<filename>[^/?\s]+)(/file)?)",
    )
    .expect("Invalid MediaFire link regex")
});

static DIRECT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(?P<url>https?://download\d+\.mediafire\.com/[^"]+)""#)
        .expect("Invalid MediaFire download regex")
});

/// Direct download link embedded in a MediaFire share page.
pub fn scrape_direct_link(html: &str) -> Option<String> {
    DIRECT_LINK_REGEX
        .captures(html)
        .and_then(|caps| caps.name("url"))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

/// `mediafire.com/file/<quick_key>/<filename>` share pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediafireResolver;

#[async_trait]
impl LinkResolver for MediafireResolver {
    fn host(&self) -> &'static str {
        HOST
    }

    fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        SHARE_LINK_REGEX
            .captures_iter(message)
            .filter_map(|caps| {
                let link = caps.name("mediafire_link")?.as_str();
                let filename = caps.name("filename").map(|m| {
                    urlencoding::decode(m.as_str())
                        .map_or_else(|_| m.as_str().to_string(), |name| name.into_owned())
                });
                Some(LinkCandidate::new(HOST, with_scheme(link), filename))
            })
            .collect()
    }

    async fn resolve(
        &self,
        http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate> {
        cancel.check()?;
        let page = http.get_text(&candidate.raw_url).await?;
        let direct = scrape_direct_link(&page).ok_or_else(|| LogLensError::ResolveFailed {
            host: HOST.to_string(),
            url: candidate.raw_url.clone(),
            message: "share page has no download link".to_string(),
        })?;
        debug!("MediaFire link {} resolved to {}", candidate.raw_url, direct);
        Ok(candidate.resolved(direct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_links() {
        let links = MediafireResolver.find_links(
            "log: http://www.mediafire.com/file/tmybrjpmtrpcejl/DemonsSouls_CrashLog_Nov.19th.zip/file thanks",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].raw_url,
            "http://www.mediafire.com/file/tmybrjpmtrpcejl/DemonsSouls_CrashLog_Nov.19th.zip/file"
        );
        assert_eq!(
            links[0].declared_filename.as_deref(),
            Some("DemonsSouls_CrashLog_Nov.19th.zip")
        );
        assert_eq!(links[0].declared_size, None);
    }

    #[test]
    fn test_find_links_without_scheme() {
        let links = MediafireResolver.find_links("mediafire.com/file/abc123/RPCS3%20(2).log");
        assert_eq!(links[0].raw_url, "https://mediafire.com/file/abc123/RPCS3%20(2).log");
        assert_eq!(links[0].declared_filename.as_deref(), Some("RPCS3 (2).log"));
    }

    #[test]
    fn test_scrape_direct_link() {
        let html = r#"<a class="input popsok" aria-label="Download file"
            href="https://download1587.mediafire.com/abcdefg/tmybrjpmtrpcejl/RPCS3.log.gz?a=1&amp;b=2"
            id="downloadButton">Download (1.2MB)</a>"#;
        assert_eq!(
            scrape_direct_link(html).as_deref(),
            Some("https://download1587.mediafire.com/abcdefg/tmybrjpmtrpcejl/RPCS3.log.gz?a=1&b=2")
        );
        assert_eq!(scrape_direct_link("<html>file removed</html>"), None);
    }
}
