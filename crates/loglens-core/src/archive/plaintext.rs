use super::{pump, ArchiveHandler, Capability, LogSink, SniffWindow};
use crate::cancel::CancellationToken;
use crate::error::Result;
use std::io::Read;

const NAME: &str = "plaintext";
const BANNER: &[u8] = b"RPCS3 v";
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// An uncompressed log file.
#[derive(Debug, Clone)]
pub struct PlainTextHandler {
    max_log_size: u64,
}

impl PlainTextHandler {
    pub fn new(max_log_size: u64) -> Self {
        Self { max_log_size }
    }

    fn has_banner(header: &[u8]) -> bool {
        header
            .strip_prefix(UTF8_BOM)
            .unwrap_or(header)
            .starts_with(BANNER)
    }
}

impl ArchiveHandler for PlainTextHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_header_len(&self) -> usize {
        16
    }

    fn can_handle(&self, window: &SniffWindow<'_>) -> Capability {
        let named_log = window.has_extension(".log");
        if !named_log && !Self::has_banner(window.header) {
            return Capability::Reject;
        }
        if window.file_name.eq_ignore_ascii_case("tty.log") {
            return Capability::RejectWithReason(
                "You uploaded tty.log, which holds guest output; please upload RPCS3.log instead"
                    .to_string(),
            );
        }
        if let Some(size) = window.declared_size {
            if size > self.max_log_size {
                return Capability::RejectWithReason(format!(
                    "Log size is too large ({} bytes), please compress it before uploading",
                    size
                ));
            }
        }
        Capability::Accept
    }

    fn decode(
        &self,
        input: &mut dyn Read,
        sink: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        pump(NAME, input, sink, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::SAMPLE_LOG;
    use super::*;
    use crate::progress::ProgressTracker;

    #[test]
    fn test_accepts_by_name_or_banner() {
        let handler = PlainTextHandler::new(1024);
        let text = b"just some text that is long enough";
        assert_eq!(
            handler.can_handle(&SniffWindow::new("RPCS3.LOG", None, text)),
            Capability::Accept
        );
        assert_eq!(
            handler.can_handle(&SniffWindow::new("message.txt", None, SAMPLE_LOG.as_bytes())),
            Capability::Accept
        );
        let with_bom = [UTF8_BOM, SAMPLE_LOG.as_bytes()].concat();
        assert_eq!(
            handler.can_handle(&SniffWindow::new("paste", None, &with_bom)),
            Capability::Accept
        );
        assert_eq!(
            handler.can_handle(&SniffWindow::new("notes.txt", None, text)),
            Capability::Reject
        );
    }

    #[test]
    fn test_rejects_tty_and_oversized() {
        let handler = PlainTextHandler::new(1024);
        let text = SAMPLE_LOG.as_bytes();
        assert!(matches!(
            handler.can_handle(&SniffWindow::new("TTY.log", None, text)),
            Capability::RejectWithReason(_)
        ));
        match handler.can_handle(&SniffWindow::new("RPCS3.log", Some(4096), text)) {
            Capability::RejectWithReason(reason) => assert!(reason.starts_with("Log size is too large")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_copies_input() {
        let mut sink = LogSink::new(1 << 20, ProgressTracker::detached());
        PlainTextHandler::new(1 << 20)
            .decode(
                &mut SAMPLE_LOG.as_bytes(),
                &mut sink,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(sink.into_text(), SAMPLE_LOG);
    }
}
