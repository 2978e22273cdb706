use super::{fill, is_log_entry, pump, ArchiveHandler, Capability, LogSink, SniffWindow, DECODE_CHUNK};
use crate::cancel::{CancellationExt, CancellationToken};
use crate::error::{LogLensError, Result};
use std::io::{self, BufRead, BufReader, Cursor, Read};
use tracing::debug;

const NAME: &str = "zip";
const LOCAL_HEADER_MAGIC: &[u8] = b"PK\x03\x04";
const DATA_DESCRIPTOR_MAGIC: &[u8] = b"PK\x07\x08";
const LOCAL_HEADER_LEN: usize = 30;

const FLAG_ENCRYPTED: u16 = 1;
/// Sizes and CRC follow the entry data instead of sitting in the header.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Zip archives, read entry by entry through local file headers.
///
/// Entries with known sizes go through the `zip` crate's stream reader.
/// Entries written to a non-seekable stream (general purpose flag bit 3)
/// only learn their sizes from the trailing data descriptor, so they are
/// walked here: deflated data ends where the deflate stream ends, stored
/// data ends at the first descriptor whose sizes match the bytes seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipHandler;

impl ArchiveHandler for ZipHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_header_len(&self) -> usize {
        LOCAL_HEADER_LEN
    }

    fn can_handle(&self, window: &SniffWindow<'_>) -> Capability {
        if !window.starts_with(LOCAL_HEADER_MAGIC) {
            return Capability::Reject;
        }
        let mentions_log = window
            .header
            .windows(4)
            .any(|w| w.eq_ignore_ascii_case(b".log"));
        if mentions_log {
            Capability::Accept
        } else {
            Capability::RejectWithReason("Archive doesn't contain any logs.".to_string())
        }
    }

    fn decode(
        &self,
        input: &mut dyn Read,
        sink: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut reader = BufReader::with_capacity(DECODE_CHUNK, input);
        loop {
            cancel.check()?;
            // Anything but another local header is the central directory.
            let Some(header) = LocalHeader::read(&mut reader)? else {
                break;
            };
            let wanted = !header.is_dir() && is_log_entry(&header.name);
            if wanted {
                debug!("Reading {} from zip archive", header.name);
            }

            if header.flags & FLAG_DATA_DESCRIPTOR == 0 {
                let mut joined = Cursor::new(header.raw).chain(&mut reader);
                let entry = ::zip::read::read_zipfile_from_stream(&mut joined)
                    .map_err(|e| LogLensError::decode(NAME, e))?;
                let Some(mut entry) = entry else {
                    break;
                };
                if wanted {
                    return pump(NAME, &mut entry, sink, cancel);
                }
                // Dropping a streamed entry skips over its data.
                continue;
            }

            if header.flags & FLAG_ENCRYPTED != 0 {
                return Err(LogLensError::decode(
                    NAME,
                    format!("{} is encrypted", header.name),
                ));
            }
            match header.method {
                METHOD_DEFLATED => {
                    let mut inflater = flate2::bufread::DeflateDecoder::new(&mut reader);
                    if wanted {
                        return pump(NAME, &mut inflater, sink, cancel);
                    }
                    io::copy(&mut inflater, &mut io::sink())
                        .map_err(|e| LogLensError::decode(NAME, e))?;
                    drop(inflater);
                    skip_data_descriptor(&mut reader, header.zip64)?;
                }
                METHOD_STORED => {
                    if wanted {
                        return copy_stored(&mut reader, header.zip64, cancel, |chunk| {
                            sink.write_chunk(NAME, chunk)
                        });
                    }
                    copy_stored(&mut reader, header.zip64, cancel, |_| Ok(()))?;
                }
                other => {
                    return Err(LogLensError::decode(
                        NAME,
                        format!(
                            "{} uses compression method {} with a trailing data descriptor",
                            header.name, other
                        ),
                    ));
                }
            }
        }
        Err(LogLensError::decode(NAME, "No log file found in the archive"))
    }
}

/// A local file header, kept raw so it can be replayed to the `zip` crate.
struct LocalHeader {
    raw: Vec<u8>,
    flags: u16,
    method: u16,
    name: String,
    zip64: bool,
}

impl LocalHeader {
    fn read(reader: &mut dyn Read) -> Result<Option<Self>> {
        let mut fixed = [0u8; LOCAL_HEADER_LEN];
        match read_exact_or_eof(reader, &mut fixed[..4])? {
            false => return Ok(None),
            true if &fixed[..4] != LOCAL_HEADER_MAGIC => return Ok(None),
            true => {}
        }
        if !read_exact_or_eof(reader, &mut fixed[4..])? {
            return Err(truncated());
        }

        let flags = u16_at(&fixed, 6);
        let method = u16_at(&fixed, 8);
        let name_len = usize::from(u16_at(&fixed, 26));
        let extra_len = usize::from(u16_at(&fixed, 28));

        let mut raw = fixed.to_vec();
        raw.resize(LOCAL_HEADER_LEN + name_len + extra_len, 0);
        if !read_exact_or_eof(reader, &mut raw[LOCAL_HEADER_LEN..])? {
            return Err(truncated());
        }
        let name_end = LOCAL_HEADER_LEN + name_len;
        let name = String::from_utf8_lossy(&raw[LOCAL_HEADER_LEN..name_end]).into_owned();
        let zip64 = has_zip64_extra(&raw[name_end..]);

        Ok(Some(Self {
            raw,
            flags,
            method,
            name,
            zip64,
        }))
    }

    fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }
}

/// Fill `buf` completely. `Ok(false)` when the stream was already at its end;
/// a partial fill is a truncated archive.
fn read_exact_or_eof(reader: &mut dyn Read, buf: &mut [u8]) -> Result<bool> {
    let filled = fill(reader, buf).map_err(|e| LogLensError::decode(NAME, e))?;
    match filled {
        0 if !buf.is_empty() => Ok(false),
        n if n == buf.len() => Ok(true),
        _ => Err(truncated()),
    }
}

fn truncated() -> LogLensError {
    LogLensError::decode(NAME, "Zip archive ends in the middle of an entry")
}

fn u16_at(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn u32_at(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn u64_at(data: &[u8], at: usize) -> u64 {
    u64::from(u32_at(data, at)) | (u64::from(u32_at(data, at + 4)) << 32)
}

fn has_zip64_extra(mut extra: &[u8]) -> bool {
    while extra.len() >= 4 {
        let id = u16_at(extra, 0);
        if id == ZIP64_EXTRA_ID {
            return true;
        }
        let len = usize::from(u16_at(extra, 2));
        extra = extra.get(4 + len..).unwrap_or_default();
    }
    false
}

/// Descriptor length after its optional signature: CRC plus both sizes.
fn descriptor_body_len(zip64: bool) -> usize {
    if zip64 {
        20
    } else {
        12
    }
}

/// Step over the data descriptor that follows a deflated entry. The
/// signature is optional, so a first word that is not the signature was the
/// CRC.
fn skip_data_descriptor(reader: &mut dyn Read, zip64: bool) -> Result<()> {
    let mut word = [0u8; 4];
    if !read_exact_or_eof(reader, &mut word)? {
        return Err(truncated());
    }
    let mut rest = vec![0u8; descriptor_body_len(zip64)];
    if word != DATA_DESCRIPTOR_MAGIC {
        rest.truncate(rest.len() - 4);
    }
    if !read_exact_or_eof(reader, &mut rest)? {
        return Err(truncated());
    }
    Ok(())
}

/// Position of a signed data descriptor whose sizes equal the data seen so far.
fn find_descriptor(data: &[u8], emitted: u64, zip64: bool) -> Option<usize> {
    let len = 4 + descriptor_body_len(zip64);
    if data.len() < len {
        return None;
    }
    (0..=data.len() - len).find(|&at| {
        if &data[at..at + 4] != DATA_DESCRIPTOR_MAGIC {
            return false;
        }
        let size = emitted + at as u64;
        if zip64 {
            u64_at(data, at + 8) == size && u64_at(data, at + 16) == size
        } else {
            u64::from(u32_at(data, at + 8)) == size && u64::from(u32_at(data, at + 12)) == size
        }
    })
}

/// Hand a stored entry's data to `emit` and consume its data descriptor.
///
/// A stored entry has no end marker of its own, so the tail of each read is
/// held back until it is known not to start the descriptor.
fn copy_stored(
    reader: &mut impl BufRead,
    zip64: bool,
    cancel: &CancellationToken,
    mut emit: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    let descriptor_len = 4 + descriptor_body_len(zip64);
    let mut carry: Vec<u8> = Vec::new();
    let mut emitted = 0u64;
    loop {
        cancel.check()?;
        let buf = reader
            .fill_buf()
            .map_err(|e| LogLensError::decode(NAME, e))?;
        if buf.is_empty() {
            return Err(truncated());
        }
        let fresh = buf.len();
        let mut joined = std::mem::take(&mut carry);
        let carried = joined.len();
        joined.extend_from_slice(buf);

        if let Some(at) = find_descriptor(&joined, emitted, zip64) {
            emit(&joined[..at])?;
            reader.consume(at + descriptor_len - carried);
            return Ok(());
        }

        let split = joined.len().saturating_sub(descriptor_len - 1);
        emit(&joined[..split])?;
        emitted += split as u64;
        carry = joined.split_off(split);
        reader.consume(fresh);
    }
}
