use crate::error::{LogLensError, Result};
use crate::progress::ProgressTracker;

/// Collects decoded log bytes, refusing to grow past `limit`.
#[derive(Debug)]
pub struct LogSink {
    buf: Vec<u8>,
    limit: u64,
    progress: ProgressTracker,
}

impl LogSink {
    pub fn new(limit: u64, progress: ProgressTracker) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            progress,
        }
    }

    pub fn write_chunk(&mut self, handler: &str, chunk: &[u8]) -> Result<()> {
        let total = self.buf.len() as u64 + chunk.len() as u64;
        if total > self.limit {
            return Err(LogLensError::Decode {
                handler: handler.to_string(),
                message: format!("decoded log exceeds the {} byte limit", self.limit),
            });
        }
        self.buf.extend_from_slice(chunk);
        self.progress.record_decoded(chunk.len() as u64);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The decoded log as text. Invalid UTF-8 is replaced, not rejected.
    pub fn into_text(self) -> String {
        String::from_utf8(self.buf)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }
}
