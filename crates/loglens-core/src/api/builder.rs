//! Builder for configuring LogLens.

use std::sync::Arc;

use crate::archive::HandlerRegistry;
use crate::buffer_pool::BufferPool;
use crate::config::LogLensConfig;
use crate::diagnostics::DiagnosticsEngine;
use crate::error::Result;
use crate::extract::FieldExtractor;
use crate::network::{CachedUpdateSource, CompatUpdateClient, HttpClient, UpdateSource};
use crate::resolver::ResolverSet;
use crate::source::StreamDecoder;
use crate::LogLens;

enum Updates {
    Disabled,
    Compat,
    Custom(Arc<dyn UpdateSource>),
}

/// Builder for configuring LogLens.
///
/// Everything not set explicitly falls back to the stock implementation:
/// default configuration, every built-in link resolver and archive handler,
/// and no update checks.
pub struct LogLensBuilder {
    config: LogLensConfig,
    http: Option<Arc<HttpClient>>,
    resolvers: Option<ResolverSet>,
    handlers: Option<HandlerRegistry>,
    updates: Updates,
}

impl LogLensBuilder {
    pub fn new() -> Self {
        Self {
            config: LogLensConfig::default(),
            http: None,
            resolvers: None,
            handlers: None,
            updates: Updates::Disabled,
        }
    }

    pub fn config(mut self, config: LogLensConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing HTTP client.
    pub fn http_client(mut self, http: Arc<HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the built-in link resolvers.
    pub fn resolvers(mut self, resolvers: ResolverSet) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    /// Replace the built-in archive handlers.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Check builds against the public update API.
    pub fn with_compat_updates(mut self) -> Self {
        self.updates = Updates::Compat;
        self
    }

    /// Check builds against a custom source. Answers are cached for
    /// `NetworkConfig::UPDATE_CACHE_TTL`.
    pub fn update_source<S: UpdateSource + 'static>(mut self, source: S) -> Self {
        self.updates = Updates::Custom(Arc::new(CachedUpdateSource::new(source)));
        self
    }

    pub fn build(self) -> Result<LogLens> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => Arc::new(HttpClient::new()?),
        };

        let updates: Option<Arc<dyn UpdateSource>> = match self.updates {
            Updates::Disabled => None,
            Updates::Compat => Some(Arc::new(CachedUpdateSource::new(CompatUpdateClient::new(
                http.clone(),
            )))),
            Updates::Custom(source) => Some(source),
        };

        let pipeline = self.config.pipeline.clone();
        let handlers = self
            .handlers
            .unwrap_or_else(|| HandlerRegistry::with_defaults(pipeline.max_log_size));
        let pool = BufferPool::new(pipeline.sniff_window_size, pipeline.max_pooled_buffers);

        Ok(LogLens {
            http,
            resolvers: self.resolvers.unwrap_or_else(ResolverSet::with_defaults),
            decoder: StreamDecoder::new(Arc::new(handlers), pool, pipeline),
            extractor: FieldExtractor::new(&self.config.extraction),
            diagnostics: DiagnosticsEngine::new(
                self.config.diagnostics.clone(),
                self.config.staleness.clone(),
            ),
            updates,
            config: self.config,
        })
    }
}

impl Default for LogLensBuilder {
    fn default() -> Self {
        Self::new()
    }
}
