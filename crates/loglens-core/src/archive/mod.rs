//! Format sniffing and streaming archive decoders.
//!
//! Every handler inspects the same sniff window and answers with a
//! [`Capability`]. The registry returns the first handler that accepts,
//! stops at the first one that rejects with a reason, and otherwise reports
//! no match. Decoding reads the archive strictly forward from a
//! [`std::io::Read`], so it can run against a pipe fed by the network.

mod gzip;
mod plaintext;
mod sink;
mod unsupported;
mod zip;
mod zstd;

pub use self::gzip::GzipHandler;
pub use self::plaintext::PlainTextHandler;
pub use self::sink::LogSink;
pub use self::unsupported::UnsupportedHandler;
pub use self::zip::ZipHandler;
pub use self::zstd::ZstdHandler;

use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::{LogLensError, Result};
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use tracing::debug;

/// Size of a tar header block.
const TAR_BLOCK: usize = 512;
/// Offset of the `ustar` magic inside a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;
/// Read buffer for moving decoded bytes into the sink.
const DECODE_CHUNK: usize = 64 * 1024;

/// The leading bytes of a stream plus what the source declared about it.
#[derive(Debug, Clone, Copy)]
pub struct SniffWindow<'a> {
    pub file_name: &'a str,
    pub declared_size: Option<u64>,
    pub header: &'a [u8],
}

impl<'a> SniffWindow<'a> {
    pub fn new(file_name: &'a str, declared_size: Option<u64>, header: &'a [u8]) -> Self {
        Self {
            file_name,
            declared_size,
            header,
        }
    }

    pub fn starts_with(&self, magic: &[u8]) -> bool {
        self.header.starts_with(magic)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        let name = self.file_name.to_ascii_lowercase();
        name.ends_with(&ext.to_ascii_lowercase())
    }
}

/// A handler's answer to "can you decode this?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Accept,
    /// Not this format; keep scanning.
    Reject,
    /// Right format family, but the content cannot be used. Ends the scan.
    RejectWithReason(String),
}

/// A streaming decoder for one archive format.
pub trait ArchiveHandler: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fewest header bytes needed for a decision.
    fn min_header_len(&self) -> usize;

    fn can_handle(&self, window: &SniffWindow<'_>) -> Capability;

    /// Decode the full stream (sniff window included) into `sink`.
    fn decode(
        &self,
        input: &mut dyn Read,
        sink: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Result of running the sniff window past every registered handler.
#[derive(Debug, Clone)]
pub enum SniffOutcome {
    Accepted(Arc<dyn ArchiveHandler>),
    Rejected {
        handler: &'static str,
        reason: String,
    },
    NoMatch,
}

impl SniffOutcome {
    /// Turn anything but an accepting handler into the matching error.
    pub fn into_handler(self, file_name: &str) -> Result<Arc<dyn ArchiveHandler>> {
        match self {
            SniffOutcome::Accepted(handler) => Ok(handler),
            SniffOutcome::Rejected { handler, reason } => Err(LogLensError::HandlerRejected {
                handler: handler.to_string(),
                reason,
            }),
            SniffOutcome::NoMatch => Err(LogLensError::NoHandlerMatched {
                file_name: file_name.to_string(),
            }),
        }
    }
}

/// Ordered set of archive handlers.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ArchiveHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock handler set, in sniffing order.
    pub fn with_defaults(max_log_size: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UnsupportedHandler::seven_zip()));
        registry.register(Arc::new(UnsupportedHandler::rar()));
        registry.register(Arc::new(ZipHandler));
        registry.register(Arc::new(GzipHandler));
        registry.register(Arc::new(ZstdHandler));
        registry.register(Arc::new(PlainTextHandler::new(max_log_size)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ArchiveHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Smallest header length any handler can decide on.
    pub fn min_header_len(&self) -> usize {
        self.handlers
            .iter()
            .map(|h| h.min_header_len())
            .min()
            .unwrap_or(0)
    }

    /// Pick a handler for the window.
    pub fn sniff(&self, window: &SniffWindow<'_>) -> SniffOutcome {
        for handler in &self.handlers {
            if window.header.len() < handler.min_header_len() {
                continue;
            }
            match handler.can_handle(window) {
                Capability::Accept => {
                    debug!(
                        "Handler {} accepted {} ({} header bytes)",
                        handler.name(),
                        window.file_name,
                        window.header.len()
                    );
                    return SniffOutcome::Accepted(handler.clone());
                }
                Capability::Reject => continue,
                Capability::RejectWithReason(reason) => {
                    debug!(
                        "Handler {} rejected {}: {}",
                        handler.name(),
                        window.file_name,
                        reason
                    );
                    return SniffOutcome::Rejected {
                        handler: handler.name(),
                        reason,
                    };
                }
            }
        }
        debug!("No handler matched {}", window.file_name);
        SniffOutcome::NoMatch
    }
}

/// Whether an archive member looks like an emulator log worth reading.
pub(crate) fn is_log_entry(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".log") && lower != "tty.log"
}

/// Copy `input` into `sink` until end of stream.
pub(crate) fn pump(
    handler: &'static str,
    input: &mut dyn Read,
    sink: &mut LogSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; DECODE_CHUNK];
    loop {
        cancel.check()?;
        let n = match input.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LogLensError::decode(handler, e)),
        };
        sink.write_chunk(handler, &buf[..n])?;
    }
}

/// Read a decompressed payload that is either a bare log or a tar archive
/// holding one.
pub(crate) fn read_log_payload(
    handler: &'static str,
    input: &mut dyn Read,
    sink: &mut LogSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut head = vec![0u8; TAR_BLOCK];
    let filled = fill(input, &mut head).map_err(|e| LogLensError::decode(handler, e))?;
    head.truncate(filled);

    let is_tar =
        filled == TAR_BLOCK && &head[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar";
    let mut joined = Cursor::new(head).chain(input);
    if !is_tar {
        return pump(handler, &mut joined, sink, cancel);
    }

    let mut archive = tar::Archive::new(joined);
    let entries = archive
        .entries()
        .map_err(|e| LogLensError::decode(handler, e))?;
    for entry in entries {
        cancel.check()?;
        let mut entry = entry.map_err(|e| LogLensError::decode(handler, e))?;
        let path = entry
            .path()
            .map_err(|e| LogLensError::decode(handler, e))?
            .to_string_lossy()
            .into_owned();
        if is_log_entry(&path) {
            debug!("Reading {} from tar payload", path);
            return pump(handler, &mut entry, sink, cancel);
        }
    }
    Err(LogLensError::decode(handler, "No log file found in the archive"))
}

/// Read until `buf` is full or the stream ends.
fn fill(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;

    pub const SAMPLE_LOG: &str = "RPCS3 v0.0.29-15726-7b1a4b1c Alpha | master\n\
                                  SYS: Title: Demon's Souls\n";

    pub fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A zip as streaming writers produce it: flag bit 3 set, zeroed sizes
    /// in each local header and a signed data descriptor after the data.
    /// Entries are `(name, data, deflate)`.
    pub fn streamed_zip(entries: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data, deflate) in entries {
            let payload = if *deflate {
                let mut encoder =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            } else {
                data.to_vec()
            };
            let mut crc = flate2::Crc::new();
            crc.update(data);
            let method: u16 = if *deflate { 8 } else { 0 };

            out.extend_from_slice(b"PK\x03\x04");
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0x0008u16.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&[0; 4]); // mod time and date
            out.extend_from_slice(&[0; 12]); // crc and both sizes
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&payload);
            out.extend_from_slice(b"PK\x07\x08");
            out.extend_from_slice(&crc.sum().to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&[0; 18]);
        out
    }
}
