//! Sniff-then-stream decoding of one log source.
//!
//! The first window of bytes is read into a pooled buffer and shown to the
//! handler registry. The chosen handler then runs on the blocking pool and
//! reads the whole source (window included) through a bounded pipe, while a
//! producer task keeps pulling the network stream into it.

use crate::archive::{ArchiveHandler, HandlerRegistry, LogSink, SniffWindow};
use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{LogLensError, Result};
use crate::network::ByteStream;
use crate::pipe::{pipe, PipeWriter};
use crate::progress::ProgressTracker;
use bytes::Bytes;
use futures::StreamExt;
use std::io::{self, BufReader};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info};

/// The handler chosen for a source, with its live counters.
#[derive(Debug, Clone)]
pub struct SourceStream {
    pub handler: Arc<dyn ArchiveHandler>,
    pub file_name: String,
    pub download_url: Option<String>,
    pub progress: ProgressTracker,
}

/// Log text recovered from a source.
#[derive(Debug)]
pub struct DecodedLog {
    pub source: SourceStream,
    pub text: String,
}

/// Where a byte stream came from.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub file_name: String,
    pub declared_size: Option<u64>,
    pub download_url: Option<String>,
}

/// Runs sniffing and streaming decode against a shared handler registry.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    registry: Arc<HandlerRegistry>,
    pool: BufferPool,
    config: PipelineConfig,
}

impl StreamDecoder {
    pub fn new(registry: Arc<HandlerRegistry>, pool: BufferPool, config: PipelineConfig) -> Self {
        Self {
            registry,
            pool,
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Sniff `stream` and decode it into log text.
    pub async fn decode(
        &self,
        mut stream: ByteStream,
        info: SourceInfo,
        progress: ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<DecodedLog> {
        let mut window = self.pool.checkout();
        let carry = fill_window(&mut stream, &mut window, &progress, cancel).await?;

        let handler = self
            .registry
            .sniff(&SniffWindow::new(&info.file_name, info.declared_size, &window[..]))
            .into_handler(&info.file_name)?;
        info!(
            "Decoding {} with the {} handler ({} byte window)",
            info.file_name,
            handler.name(),
            window.len()
        );

        let (writer, reader) = pipe(self.config.pipe_capacity);
        let producer = tokio::spawn(produce(
            stream,
            window,
            carry,
            writer,
            progress.clone(),
            cancel.clone(),
        ));

        let consumer = {
            let handler = handler.clone();
            let cancel = cancel.clone();
            let mut sink = LogSink::new(self.config.max_log_size, progress.clone());
            let mut input = BufReader::with_capacity(
                self.config.read_chunk_size.max(1),
                SyncIoBridge::new(reader),
            );
            tokio::task::spawn_blocking(move || -> Result<String> {
                handler.decode(&mut input, &mut sink, &cancel)?;
                Ok(sink.into_text())
            })
        };

        let decoded = consumer.await;
        let produced = producer.await;
        if cancel.is_cancelled() {
            return Err(LogLensError::Cancelled);
        }

        let decoded = decoded.map_err(|e| {
            LogLensError::decode(handler.name(), format!("decode task failed: {}", e))
        })?;
        let produced = produced.map_err(|e| LogLensError::Network {
            message: format!("stream task failed: {}", e),
            cause: None,
        })?;

        let text = match (decoded, produced) {
            (Ok(text), _) => text,
            // A broken transfer explains the decode failure better than the
            // truncated archive it left behind.
            (Err(_), Err(network)) => return Err(network),
            (Err(decode), Ok(())) => return Err(decode),
        };

        progress.finish();
        debug!(
            "Decoded {} bytes of log from {} source bytes",
            progress.decoded_bytes_emitted(),
            progress.source_bytes_read()
        );

        Ok(DecodedLog {
            source: SourceStream {
                handler,
                file_name: info.file_name,
                download_url: info.download_url,
                progress,
            },
            text,
        })
    }
}

/// Split an in-memory payload into a stream of `chunk_size` pieces.
pub fn bytes_stream(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    futures::stream::iter(chunks).boxed()
}

/// Read until the window is full or the stream ends. Returns the part of the
/// last chunk that did not fit.
async fn fill_window(
    stream: &mut ByteStream,
    window: &mut PooledBuffer,
    progress: &ProgressTracker,
    cancel: &CancellationToken,
) -> Result<Option<Bytes>> {
    while !window.is_full() {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogLensError::Cancelled),
            next = stream.next() => next,
        };
        let chunk = match next {
            None => return Ok(None),
            Some(chunk) => chunk.map_err(stream_error)?,
        };
        progress.record_source(chunk.len() as u64);

        let take = chunk.len().min(window.remaining());
        window.extend_from_slice(&chunk[..take]);
        if take < chunk.len() {
            return Ok(Some(chunk.slice(take..)));
        }
    }
    Ok(None)
}

fn stream_error(err: io::Error) -> LogLensError {
    LogLensError::Network {
        message: format!("download interrupted: {}", err),
        cause: std::error::Error::source(&err).map(|s| s.to_string()),
    }
}

enum Forward {
    Written,
    ReaderGone,
    Cancelled,
    Failed(io::Error),
}

async fn forward(writer: &mut PipeWriter, data: &[u8], cancel: &CancellationToken) -> Forward {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Forward::Cancelled,
        written = writer.write_all(data) => match written {
            Ok(()) => Forward::Written,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Forward::ReaderGone,
            Err(e) => Forward::Failed(e),
        },
    }
}

enum Next {
    Chunk(Option<io::Result<Bytes>>),
    ReaderGone,
    Cancelled,
}

/// Feed the window, the leftover chunk and then the rest of the stream into
/// the pipe. Ends early, without error, once the decoder drops its reader.
async fn produce(
    mut stream: ByteStream,
    window: PooledBuffer,
    carry: Option<Bytes>,
    mut writer: PipeWriter,
    progress: ProgressTracker,
    cancel: CancellationToken,
) -> Result<()> {
    let head = forward(&mut writer, &window, &cancel).await;
    drop(window);
    let head = match (head, carry) {
        (Forward::Written, Some(carry)) => forward(&mut writer, &carry, &cancel).await,
        (head, _) => head,
    };
    if let Some(result) = settle(&writer, head) {
        return result;
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => Next::Cancelled,
            _ = writer.reader_closed() => Next::ReaderGone,
            chunk = stream.next() => Next::Chunk(chunk),
        };

        let chunk = match next {
            Next::Cancelled => return settle(&writer, Forward::Cancelled).unwrap_or(Ok(())),
            Next::ReaderGone => return Ok(()),
            Next::Chunk(None) => {
                if let Err(e) = writer.shutdown().await {
                    debug!("Pipe shutdown after end of stream: {}", e);
                }
                return Ok(());
            }
            Next::Chunk(Some(Err(e))) => {
                writer.fail(io::Error::new(e.kind(), e.to_string()));
                return Err(stream_error(e));
            }
            Next::Chunk(Some(Ok(chunk))) => chunk,
        };

        progress.record_source(chunk.len() as u64);
        let outcome = forward(&mut writer, &chunk, &cancel).await;
        if let Some(result) = settle(&writer, outcome) {
            return result;
        }
    }
}

/// `None` to keep producing, otherwise the producer's result.
fn settle(writer: &PipeWriter, outcome: Forward) -> Option<Result<()>> {
    match outcome {
        Forward::Written => None,
        Forward::ReaderGone => Some(Ok(())),
        Forward::Cancelled => {
            writer.fail(io::Error::other("stream cancelled"));
            Some(Err(LogLensError::Cancelled))
        }
        Forward::Failed(e) => {
            writer.fail(io::Error::new(e.kind(), e.to_string()));
            Some(Err(LogLensError::Network {
                message: format!("pipe write failed: {}", e),
                cause: None,
            }))
        }
    }
}
