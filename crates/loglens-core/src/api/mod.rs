//! API implementation submodules.
//!
//! Each submodule contains `impl LogLens` blocks; the struct itself lives in
//! `lib.rs`.

mod analyze;
mod builder;

pub use analyze::{LogReport, SourceSummary};
pub use builder::LogLensBuilder;
