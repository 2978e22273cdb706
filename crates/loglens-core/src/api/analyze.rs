//! End-to-end analysis methods for LogLens.

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationToken, CancelledError};
use crate::diagnostics::{BuildInfo, DiagnosticVerdict};
use crate::error::{LogLensError, Result};
use crate::extract::fields::{BUILD_AND_SPECS, PIRACY_CONTEXT};
use crate::extract::{normalize, NormalizedFieldTable};
use crate::network::{fetch_update_info, ProbeInfo, UpdateInfo};
use crate::progress::{ProgressTracker, StreamProgress};
use crate::resolver::LinkCandidate;
use crate::source::{bytes_stream, DecodedLog, SourceInfo};
use crate::LogLens;

/// Source type reported for in-memory uploads.
const ATTACHMENT_SOURCE: &str = "attachment";
/// Source type reported for logs pasted into the message itself.
const PASTED_SOURCE: &str = "message";

/// Where a report's log came from and how much work decoding it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    /// Resolver host for links, `attachment` or `message` otherwise.
    pub source_type: String,
    pub file_name: String,
    /// Name of the archive handler that decoded the log.
    pub handler: String,
    pub source_size: Option<u64>,
    pub source_bytes_read: u64,
    pub decoded_bytes: u64,
}

impl SourceSummary {
    fn from_decoded(source_type: &str, decoded: &DecodedLog) -> Self {
        let progress = decoded.source.progress.snapshot();
        Self {
            source_type: source_type.to_string(),
            file_name: decoded.source.file_name.clone(),
            handler: decoded.source.handler.name().to_string(),
            source_size: progress.source_size,
            source_bytes_read: progress.source_bytes_read,
            decoded_bytes: progress.decoded_bytes_emitted,
        }
    }

    fn pasted(text: &str) -> Self {
        Self {
            source_type: PASTED_SOURCE.to_string(),
            file_name: String::new(),
            handler: "plaintext".to_string(),
            source_size: Some(text.len() as u64),
            source_bytes_read: text.len() as u64,
            decoded_bytes: text.len() as u64,
        }
    }
}

/// Everything learned from one log.
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    /// `None` for text handed to [`LogLens::analyze_text`] directly.
    pub source: Option<SourceSummary>,
    pub fields: NormalizedFieldTable,
    pub verdict: DiagnosticVerdict,
}

impl LogLens {
    /// Every downloadable log link in `message`, in order of appearance.
    pub fn find_links(&self, message: &str) -> Vec<LinkCandidate> {
        self.resolvers.find_links(message)
    }

    /// Analyze every log a message links to.
    ///
    /// Candidates run concurrently and fail independently; the outer error is
    /// only [`LogLensError::LinkNotFound`] for a message with neither links
    /// nor a pasted log.
    pub async fn analyze_message(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<LogReport>>> {
        let candidates = self.find_links(message);
        if candidates.is_empty() {
            if BuildInfo::parse_banner(message).is_none() {
                return Err(LogLensError::LinkNotFound);
            }
            debug!("No links in message, analyzing pasted log");
            let mut report = self.analyze_text(message).await;
            report.source = Some(SourceSummary::pasted(message));
            return Ok(vec![Ok(report)]);
        }

        let reports = join_all(
            candidates
                .iter()
                .map(|candidate| self.analyze_link(candidate, None, cancel)),
        )
        .await;
        Ok(reports)
    }

    /// Resolve, download, decode and analyze one link.
    ///
    /// Progress snapshots go to `progress_tx` while the body streams.
    pub async fn analyze_link(
        &self,
        candidate: &LinkCandidate,
        progress_tx: Option<mpsc::Sender<StreamProgress>>,
        cancel: &CancellationToken,
    ) -> Result<LogReport> {
        let resolved = self.resolvers.resolve(&self.http, candidate, cancel).await?;
        let url = resolved.download_url().to_string();

        // A failed probe only costs us the declared metadata.
        let probed = cancel
            .run_until_cancelled(self.http.probe(&url))
            .await
            .ok_or(CancelledError)?;
        let resolved = match probed {
            Ok(probe) => resolved.with_probe(&probe),
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                resolved
            }
        };

        let opened = cancel
            .run_until_cancelled(self.http.open_stream(&url))
            .await
            .ok_or(CancelledError)??;
        let resolved = resolved.with_probe(&ProbeInfo {
            size: opened.content_length,
            filename: opened.filename.clone(),
        });

        let info = SourceInfo {
            file_name: resolved.file_name(),
            declared_size: resolved.declared_size,
            download_url: Some(url),
        };
        let progress = ProgressTracker::new(
            info.declared_size,
            self.config.pipeline.progress_interval(),
            progress_tx,
        );

        let decoded = self.decoder.decode(opened.stream, info, progress, cancel).await?;
        let mut report = self.analyze_text(&decoded.text).await;
        report.source = Some(SourceSummary::from_decoded(&candidate.host, &decoded));
        Ok(report)
    }

    /// Analyze an upload that is already in memory.
    pub async fn analyze_bytes(
        &self,
        file_name: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<LogReport> {
        let info = SourceInfo {
            file_name: file_name.to_string(),
            declared_size: Some(data.len() as u64),
            download_url: None,
        };
        let progress = ProgressTracker::new(
            info.declared_size,
            self.config.pipeline.progress_interval(),
            None,
        );
        let stream = bytes_stream(data, self.config.pipeline.read_chunk_size);

        let decoded = self.decoder.decode(stream, info, progress, cancel).await?;
        let mut report = self.analyze_text(&decoded.text).await;
        report.source = Some(SourceSummary::from_decoded(ATTACHMENT_SOURCE, &decoded));
        Ok(report)
    }

    /// Extract, normalize and evaluate decoded log text.
    pub async fn analyze_text(&self, text: &str) -> LogReport {
        let raw = self.extractor.extract(text);
        let mut fields = normalize(&raw);

        let update = if fields.contains_key(PIRACY_CONTEXT) {
            None
        } else {
            self.latest_update(&fields).await
        };

        let verdict = self.diagnostics.evaluate(&mut fields, update.as_ref(), Utc::now());
        info!(
            "Analyzed log: {} field(s), {} warning(s), outdated={}",
            fields.len(),
            verdict.warnings.len(),
            verdict.is_outdated()
        );

        LogReport {
            source: None,
            fields,
            verdict,
        }
    }

    /// Update lookup for the log's build. Lookup failures only skip the
    /// staleness check.
    async fn latest_update(&self, fields: &NormalizedFieldTable) -> Option<UpdateInfo> {
        let source = self.updates.as_ref()?;
        let build = fields.get(BUILD_AND_SPECS).and_then(BuildInfo::parse_banner)?;

        match fetch_update_info(source.as_ref(), Some(&build.commit)).await {
            Ok(update) => update,
            Err(e) => {
                warn!("Update check for {} failed: {}", build.commit, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{gzip, zip_with, SAMPLE_LOG};
    use crate::extract::fields::{CPU_MODEL, SERIAL};
    use crate::extract::test_support::FULL_LOG;
    use crate::error::FailureKind;

    fn lens() -> LogLens {
        LogLens::builder().build().unwrap()
    }

    #[tokio::test]
    async fn test_analyze_text_without_updates() {
        let report = lens().analyze_text(FULL_LOG).await;
        assert!(report.source.is_none());
        assert!(report.fields.get(CPU_MODEL).is_some());
        assert!(!report.verdict.is_piracy);
        assert!(!report.verdict.is_outdated());
    }

    #[tokio::test]
    async fn test_message_without_links_or_log() {
        let err = lens()
            .analyze_message("my game crashes, help", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::LinkNotFound);
    }

    #[tokio::test]
    async fn test_pasted_log_is_analyzed() {
        let reports = lens()
            .analyze_message(SAMPLE_LOG, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        let report = reports.into_iter().next().unwrap().unwrap();
        assert_eq!(report.source.unwrap().source_type, "message");
    }

    #[tokio::test]
    async fn test_analyze_bytes_gzip() {
        let lens = lens();
        let data = Bytes::from(gzip(FULL_LOG.as_bytes()));
        let size = data.len() as u64;
        let report = lens
            .analyze_bytes("RPCS3.log.gz", data, &CancellationToken::new())
            .await
            .unwrap();

        let source = report.source.unwrap();
        assert_eq!(source.source_type, "attachment");
        assert_eq!(source.handler, "gzip");
        assert_eq!(source.source_size, Some(size));
        assert_eq!(source.source_bytes_read, size);
        assert_eq!(source.decoded_bytes, FULL_LOG.len() as u64);
        assert!(report.fields.get(SERIAL).is_some());
        assert_eq!(lens.buffer_pool().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_analyze_bytes_zip_without_log() {
        let data = Bytes::from(zip_with(&[("readme.txt", b"nothing here")]));
        let err = lens()
            .analyze_bytes("logs.zip", data, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::HandlerRejected);
        assert_eq!(err.to_string(), "Archive doesn't contain any logs.");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = lens()
            .analyze_bytes("RPCS3.log", Bytes::from_static(SAMPLE_LOG.as_bytes()), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }
}
