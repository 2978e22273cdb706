//! Centralized configuration for loglens.
//!
//! Fixed transport settings live in constant structs. Every policy value a
//! deployment may want to tune (window sizes, staleness thresholds, known
//! title lists) is a serde struct with defaults, loadable from JSON.

use crate::error::{LogLensError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const USER_AGENT: &'static str = "loglens/0.1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const UPDATE_API_BASE: &'static str = "https://update.rpcs3.net/";
    pub const UPDATE_CACHE_TTL: Duration = Duration::from_secs(600);
    pub const UPDATE_CACHE_CAPACITY: u64 = 64;
}

/// Aggregated, externally overridable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLensConfig {
    pub pipeline: PipelineConfig,
    pub staleness: StalenessConfig,
    pub extraction: ExtractionConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl LogLensConfig {
    /// Parse configuration from a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| LogLensError::io_with_path(e, path))?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.sniff_window_size == 0 {
            return Err(LogLensError::Config {
                message: "pipeline.sniff_window_size must be greater than zero".into(),
            });
        }
        if p.pipe_capacity == 0 || p.read_chunk_size == 0 {
            return Err(LogLensError::Config {
                message: "pipeline.pipe_capacity and pipeline.read_chunk_size must be non-zero"
                    .into(),
            });
        }
        if p.max_log_size == 0 {
            return Err(LogLensError::Config {
                message: "pipeline.max_log_size must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Streaming pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes presented to handlers for the format decision.
    pub sniff_window_size: usize,
    /// Bytes the pipe holds before the network side stalls.
    pub pipe_capacity: usize,
    /// Read buffer used by the decode loop.
    pub read_chunk_size: usize,
    /// Maximum decoded log size accepted.
    pub max_log_size: u64,
    /// Idle sniff buffers kept for reuse.
    pub max_pooled_buffers: usize,
    /// Minimum time between progress snapshots, in milliseconds.
    pub progress_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sniff_window_size: 512 * 1024,
            pipe_capacity: 1024 * 1024,
            read_chunk_size: 64 * 1024,
            max_log_size: 256 * 1024 * 1024,
            max_pooled_buffers: 16,
            progress_interval_ms: 500,
        }
    }
}

impl PipelineConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Build staleness thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    /// A release younger than this never marks a build outdated.
    pub min_release_gap_secs: u64,
    /// Builds this many numbers behind the latest are still current.
    pub build_number_slack: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            min_release_gap_secs: 24 * 60 * 60,
            build_number_slack: 10,
        }
    }
}

impl StalenessConfig {
    pub fn min_release_gap(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.min_release_gap_secs).unwrap_or(i64::MAX))
    }
}

/// Field extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Substrings that mark a log as coming from a pirated dump.
    pub piracy_triggers: Vec<String>,
}

/// A settings hint emitted when a field holds a given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureHint {
    pub field: String,
    pub value: String,
    pub glyph: String,
    pub message: String,
}

impl FeatureHint {
    fn new(field: &str, value: &str, glyph: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            glyph: glyph.to_string(),
            message: message.to_string(),
        }
    }
}

/// Rule tables and thresholds for the diagnostics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub min_opengl_version: String,
    pub recommended_opengl_version: String,
    pub min_firmware_version: String,
    /// Inclusive NVIDIA driver range with known Vulkan rendering bugs.
    pub nvidia_bug_range: (f64, f64),
    pub nvidia_recommended_driver: String,
    pub bogus_licenses: Vec<String>,
    /// Disc serial to the digital release it is known to share content with.
    pub disc_to_psn: BTreeMap<String, String>,
    /// Titles that need the vertex cache disabled.
    pub disable_vertex_cache_ids: Vec<String>,
    /// Warning glyphs from most to least severe.
    pub glyph_priority: Vec<String>,
    pub piracy_glyph: String,
    pub piracy_advisory: String,
    pub feature_hints: Vec<FeatureHint>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        let disc_to_psn = [
            ("BLES00932", "NPEB01202"),
            ("BLUS30443", "NPUB30910"),
            ("BCJS70013", "NPJA00102"),
        ]
        .into_iter()
        .map(|(disc, psn)| (disc.to_string(), psn.to_string()))
        .collect();

        Self {
            min_opengl_version: "4.3".into(),
            recommended_opengl_version: "4.5".into(),
            min_firmware_version: "4.80".into(),
            nvidia_bug_range: (400.0, 499.99),
            nvidia_recommended_driver: "399.41".into(),
            bogus_licenses: vec![
                "UP0700-NPUB30932_00-NNKDLFULLGAMEPTB.rap".into(),
                "EP0700-NPEB01158_00-NNKDLFULLGAMEPTB.rap".into(),
            ],
            disc_to_psn,
            disable_vertex_cache_ids: vec![
                "NPEB00258".into(),
                "NPUB30162".into(),
                "NPJB00068".into(),
            ],
            glyph_priority: ["😱", "💢", "‼", "❗", "❌", "⁉", "⚠", "❔", "✅", "ℹ"]
                .into_iter()
                .map(String::from)
                .collect(),
            piracy_glyph: "🏴\u{200d}☠\u{fe0f}".into(),
            piracy_advisory: "This log indicates the use of a pirated copy of the game. \
                              Support is only provided for legally dumped titles."
                .into(),
            feature_hints: vec![
                FeatureHint::new(
                    "ppu_decoder",
                    "Interpreter (precise)",
                    "⚠",
                    "PPU decoder is set to `Interpreter (precise)`, use `Recompiler (LLVM)`",
                ),
                FeatureHint::new(
                    "ppu_decoder",
                    "Interpreter (fast)",
                    "⚠",
                    "PPU decoder is set to `Interpreter (fast)`, use `Recompiler (LLVM)`",
                ),
                FeatureHint::new(
                    "spu_decoder",
                    "Interpreter (precise)",
                    "⚠",
                    "SPU decoder is set to `Interpreter (precise)`, use `Recompiler (LLVM)`",
                ),
                FeatureHint::new(
                    "spu_decoder",
                    "Interpreter (fast)",
                    "⚠",
                    "SPU decoder is set to `Interpreter (fast)`, use `Recompiler (LLVM)`",
                ),
                FeatureHint::new(
                    "accurate_xfloat",
                    "[x]",
                    "ℹ",
                    "`Accurate xfloat` is enabled, it is only required by a few titles",
                ),
            ],
        }
    }
}
