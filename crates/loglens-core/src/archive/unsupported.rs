use super::{ArchiveHandler, Capability, LogSink, SniffWindow};
use crate::cancel::CancellationToken;
use crate::error::{LogLensError, Result};
use std::io::Read;

/// Recognizes containers that cannot be read front to back and turns them
/// away with an explanation.
#[derive(Debug, Clone)]
pub struct UnsupportedHandler {
    name: &'static str,
    label: &'static str,
    magic: &'static [u8],
    min_len: usize,
}

impl UnsupportedHandler {
    pub fn seven_zip() -> Self {
        Self {
            name: "7z",
            label: "7-Zip",
            magic: &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C],
            min_len: 32,
        }
    }

    pub fn rar() -> Self {
        Self {
            name: "rar",
            label: "RAR",
            magic: b"Rar!\x1a\x07",
            min_len: 20,
        }
    }

    fn reason(&self) -> String {
        format!(
            "{} archives can't be read as a stream, please upload the log as .zip or .gz",
            self.label
        )
    }
}

impl ArchiveHandler for UnsupportedHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn min_header_len(&self) -> usize {
        self.min_len
    }

    fn can_handle(&self, window: &SniffWindow<'_>) -> Capability {
        if window.starts_with(self.magic) {
            Capability::RejectWithReason(self.reason())
        } else {
            Capability::Reject
        }
    }

    fn decode(
        &self,
        _input: &mut dyn Read,
        _sink: &mut LogSink,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(LogLensError::HandlerRejected {
            handler: self.name.to_string(),
            reason: self.reason(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rar_rejected_with_reason() {
        let mut header = b"Rar!\x1a\x07\x01\x00".to_vec();
        header.resize(32, 0);
        let handler = UnsupportedHandler::rar();
        match handler.can_handle(&SniffWindow::new("log.rar", None, &header)) {
            Capability::RejectWithReason(reason) => assert!(reason.starts_with("RAR")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_bytes_rejected_silently() {
        let header = [0u8; 40];
        let handler = UnsupportedHandler::seven_zip();
        assert_eq!(
            handler.can_handle(&SniffWindow::new("log.7z", None, &header)),
            Capability::Reject
        );
    }
}
