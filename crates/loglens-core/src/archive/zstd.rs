use super::{read_log_payload, ArchiveHandler, Capability, LogSink, SniffWindow};
use crate::cancel::CancellationToken;
use crate::error::{LogLensError, Result};
use std::io::Read;

const NAME: &str = "zstd";
const MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Zstandard frames, including `.tar.zst`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdHandler;

impl ArchiveHandler for ZstdHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_header_len(&self) -> usize {
        // magic, frame header descriptor, one block header
        16
    }

    fn can_handle(&self, window: &SniffWindow<'_>) -> Capability {
        if window.starts_with(MAGIC) {
            Capability::Accept
        } else {
            Capability::Reject
        }
    }

    fn decode(
        &self,
        input: &mut dyn Read,
        sink: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut decoder =
            ::zstd::stream::read::Decoder::new(input).map_err(|e| LogLensError::decode(NAME, e))?;
        read_log_payload(NAME, &mut decoder, sink, cancel)
    }
}
