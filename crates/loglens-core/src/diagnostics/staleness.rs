//! Build staleness relative to the latest known release.

use super::version::parse_lenient;
use crate::config::StalenessConfig;
use crate::network::UpdateInfo;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static BANNER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)rpcs3 v(?P<version>\d+(?:\.\d+)+)(?:-(?P<build>\d+))?-(?P<commit>[0-9a-f]+) \w+ \|",
    )
    .expect("Invalid build banner regex")
});

/// `(version, build number, commit)` of the build that wrote a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub build_number: Option<u64>,
    pub commit: String,
}

impl BuildInfo {
    pub fn parse_banner(banner: &str) -> Option<Self> {
        let caps = BANNER_REGEX.captures(banner)?;
        Some(Self {
            version: caps["version"].to_string(),
            build_number: caps.name("build").and_then(|b| b.as_str().parse().ok()),
            commit: caps["commit"].to_lowercase(),
        })
    }
}

/// Commits are the same build when their common-length prefixes match.
pub fn same_commits(a: &str, b: &str) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => {
            let len = a.len().min(b.len());
            match (a.get(..len), b.get(..len)) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            }
        }
    }
}

pub fn is_outdated(
    build: &BuildInfo,
    update: &UpdateInfo,
    config: &StalenessConfig,
    now: DateTime<Utc>,
) -> bool {
    let gap = update
        .build_gap()
        .unwrap_or_else(|| now - update.release_timestamp);
    if gap < config.min_release_gap() {
        debug!("Latest release is only {}s newer, skipping staleness check", gap.num_seconds());
        return false;
    }

    let (Some(log_version), Some(latest_version)) = (
        parse_lenient(&build.version),
        parse_lenient(&update.latest_version),
    ) else {
        return !same_commits(&build.commit, &update.latest_commit);
    };

    if log_version < latest_version {
        return true;
    }
    if log_version > latest_version {
        return false;
    }
    // Build numbers, when both are known, decide on their own.
    if let (Some(log_build), Some(latest_build)) = (build.build_number, update.latest_build_number) {
        return log_build.saturating_add(config.build_number_slack) < latest_build;
    }
    !same_commits(&build.commit, &update.latest_commit)
}
