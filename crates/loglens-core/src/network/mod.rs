//! Network collaborators.
//!
//! This module provides:
//! - HTTP client with streamed GET and `HEAD` probes
//! - Latest-build lookup with a TTL cache

mod client;
mod update;

pub use client::{
    extract_domain, filename_from_disposition, filename_from_url, ByteStream, HttpClient,
    OpenedStream, ProbeInfo,
};
pub use update::{
    fetch_update_info, parse_build_link, parse_update_response, CachedUpdateSource,
    CompatUpdateClient, UpdateInfo, UpdateSource,
};
