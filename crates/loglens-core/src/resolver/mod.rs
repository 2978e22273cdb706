//! Per-host link discovery and resolution.
//!
//! Each [`LinkResolver`] owns the URL pattern of one file host and knows how
//! to turn a share link into a URL that streams the file itself. Resolvers
//! never see each other's candidates, so a broken host cannot affect the
//! others.

mod direct;
mod dropbox;
mod google_drive;
mod mediafire;

pub use self::direct::DirectLinkResolver;
pub use self::dropbox::DropboxResolver;
pub use self::google_drive::GoogleDriveResolver;
pub use self::mediafire::{scrape_direct_link, MediafireResolver};

use crate::cancel::{CancellationToken, CancelledError};
use crate::error::{LogLensError, Result};
use crate::network::{filename_from_url, HttpClient, ProbeInfo};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A download link found in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCandidate {
    /// Name of the resolver that found the link.
    pub host: String,
    pub raw_url: String,
    pub resolved_download_url: Option<String>,
    pub declared_filename: Option<String>,
    /// `None` until a probe confirms the size.
    pub declared_size: Option<u64>,
}

impl LinkCandidate {
    pub fn new(host: &str, raw_url: impl Into<String>, declared_filename: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            raw_url: raw_url.into(),
            resolved_download_url: None,
            declared_filename,
            declared_size: None,
        }
    }

    /// A copy pointing at the given direct download URL.
    pub fn resolved(&self, download_url: impl Into<String>) -> Self {
        Self {
            resolved_download_url: Some(download_url.into()),
            ..self.clone()
        }
    }

    /// A copy carrying whatever a probe learned. Missing probe values keep
    /// the declared ones.
    pub fn with_probe(&self, probe: &ProbeInfo) -> Self {
        Self {
            declared_size: probe.size.filter(|s| *s > 0).or(self.declared_size),
            declared_filename: probe
                .filename
                .clone()
                .or_else(|| self.declared_filename.clone()),
            ..self.clone()
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_download_url.is_some()
    }

    /// URL to stream from: the resolved one when available.
    pub fn download_url(&self) -> &str {
        self.resolved_download_url.as_deref().unwrap_or(&self.raw_url)
    }

    /// Best known file name for sniffing.
    pub fn file_name(&self) -> String {
        self.declared_filename
            .clone()
            .or_else(|| filename_from_url(self.download_url()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Link strategy for one file host.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Short name stored in [`LinkCandidate::host`].
    fn host(&self) -> &'static str;

    /// All links for this host in `message`, in order of appearance.
    fn find_links(&self, message: &str) -> Vec<LinkCandidate>;

    /// Turn a share link into a direct download link.
    async fn resolve(
        &self,
        http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate>;
}

/// Add a scheme to links pasted without one.
pub(crate) fn with_scheme(link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{}", link)
    }
}

/// The registered resolvers, tried in order.
#[derive(Clone, Default)]
pub struct ResolverSet {
    resolvers: Vec<Arc<dyn LinkResolver>>,
}

impl std::fmt::Debug for ResolverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.host()))
            .finish()
    }
}

impl ResolverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// MediaFire, Google Drive, Dropbox, then plain links.
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(MediafireResolver));
        set.register(Arc::new(GoogleDriveResolver));
        set.register(Arc::new(DropboxResolver));
        set.register(Arc::new(DirectLinkResolver::new()));
        set
    }

    pub fn register(&mut self, resolver: Arc<dyn LinkResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn hosts(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.host()).collect()
    }

    /// Candidates from every resolver. A URL claimed by an earlier resolver
    /// is not reported again.
    pub fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for resolver in &self.resolvers {
            for candidate in resolver.find_links(message) {
                if seen.insert(candidate.raw_url.to_ascii_lowercase()) {
                    candidates.push(candidate);
                }
            }
        }
        debug!("Found {} link candidate(s) in message", candidates.len());
        candidates
    }

    /// Resolve a candidate with the resolver that found it.
    pub async fn resolve(
        &self,
        http: &HttpClient,
        candidate: &LinkCandidate,
        cancel: &CancellationToken,
    ) -> Result<LinkCandidate> {
        if candidate.is_resolved() {
            return Ok(candidate.clone());
        }
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.host() == candidate.host)
            .ok_or_else(|| LogLensError::ResolveFailed {
                host: candidate.host.clone(),
                url: candidate.raw_url.clone(),
                message: "no resolver registered for this host".to_string(),
            })?;

        let result = cancel
            .run_until_cancelled(resolver.resolve(http, candidate, cancel))
            .await
            .ok_or(CancelledError)?;
        if let Err(e) = &result {
            warn!("Failed to resolve {} link {}: {}", candidate.host, candidate.raw_url, e);
        }
        result
    }
}
