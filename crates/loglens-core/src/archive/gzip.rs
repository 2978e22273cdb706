use super::{read_log_payload, ArchiveHandler, Capability, LogSink, SniffWindow};
use crate::cancel::CancellationToken;
use crate::error::Result;
use flate2::read::MultiGzDecoder;
use std::io::Read;

const NAME: &str = "gzip";
const MAGIC: &[u8] = &[0x1f, 0x8b, 0x08];

/// Gzip streams, including concatenated members and `.tar.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipHandler;

impl ArchiveHandler for GzipHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    // 10 byte member header plus 8 byte trailer.
    fn min_header_len(&self) -> usize {
        18
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
        let mut decoder = MultiGzDecoder::new(input);
        read_log_payload(NAME, &mut decoder, sink, cancel)
    }
}
