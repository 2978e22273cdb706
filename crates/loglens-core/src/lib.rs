//! LogLens - turns emulator crash logs linked or pasted in chat messages into
//! diagnostic facts.
//!
//! The pipeline finds download links in a message, resolves them to direct
//! streams, sniffs the archive format from the first window of bytes,
//! stream-decodes the embedded log through a bounded pipe and then extracts,
//! normalizes and evaluates the log's fields.
//!
//! # Example
//!
//! ```rust,ignore
//! use loglens::{CancellationToken, LogLens};
//!
//! #[tokio::main]
//! async fn main() -> loglens::Result<()> {
//!     let lens = LogLens::builder().with_compat_updates().build()?;
//!     let cancel = CancellationToken::new();
//!
//!     for report in lens.analyze_message("https://example.com/RPCS3.log.gz", &cancel).await? {
//!         match report {
//!             Ok(report) => println!("{:?}", report.verdict),
//!             Err(e) => println!("{}: {}", e.kind(), e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod buffer_pool;
pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod network;
pub mod pipe;
pub mod progress;
pub mod resolver;
pub mod source;

mod api;

// Re-export commonly used types
pub use api::{LogLensBuilder, LogReport, SourceSummary};
pub use archive::{ArchiveHandler, Capability, HandlerRegistry, LogSink, SniffOutcome, SniffWindow};
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use cancel::{CancellationExt, CancellationToken, CancelledError};
pub use config::{
    DiagnosticsConfig, ExtractionConfig, FeatureHint, LogLensConfig, NetworkConfig,
    PipelineConfig, StalenessConfig,
};
pub use diagnostics::{DiagnosticVerdict, DiagnosticsEngine};
pub use error::{FailureKind, LogLensError, Result};
pub use extract::{normalize, FieldExtractor, NormalizedFieldTable, RawFieldTable};
pub use network::{HttpClient, UpdateInfo, UpdateSource};
pub use progress::{ProgressTracker, StreamProgress};
pub use resolver::{LinkCandidate, LinkResolver, ResolverSet};
pub use source::{SourceStream, StreamDecoder};

use std::sync::Arc;

/// Entry point for analyzing logs.
///
/// One instance is meant to live for the whole process: the buffer pool,
/// HTTP client and update cache are shared by every request it serves.
pub struct LogLens {
    config: LogLensConfig,
    http: Arc<HttpClient>,
    resolvers: ResolverSet,
    decoder: StreamDecoder,
    extractor: FieldExtractor,
    diagnostics: DiagnosticsEngine,
    updates: Option<Arc<dyn UpdateSource>>,
}

impl LogLens {
    /// Create a builder for LogLens.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let lens = LogLens::builder()
    ///     .config(LogLensConfig::load("loglens.json")?)
    ///     .with_compat_updates()
    ///     .build()?;
    /// ```
    pub fn builder() -> LogLensBuilder {
        LogLensBuilder::new()
    }

    /// A LogLens with default configuration and no update checks.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn config(&self) -> &LogLensConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        self.decoder.pool()
    }

    pub fn resolvers(&self) -> &ResolverSet {
        &self.resolvers
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        self.decoder.registry()
    }
}

impl std::fmt::Debug for LogLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLens")
            .field("resolvers", &self.resolvers)
            .field("handlers", &self.handlers().handler_names())
            .field("update_checks", &self.updates.is_some())
            .finish_non_exhaustive()
    }
}
