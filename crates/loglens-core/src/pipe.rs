//! Bounded byte pipe between the network reader and the archive decoder.
//!
//! The writer stalls once `capacity` bytes are buffered and resumes as soon
//! as the reader drains some of them. Both ends observe the other closing:
//! a writer shutdown reads as end of stream, a writer failure (or a writer
//! dropped without shutdown) reads as an error, and a dropped reader makes
//! every further write fail with `BrokenPipe`.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;

#[derive(Debug)]
struct State {
    buf: VecDeque<u8>,
    capacity: usize,
    write_closed: bool,
    failure: Option<(io::ErrorKind, String)>,
    read_closed: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl State {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    reader_gone: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a pipe that buffers at most `capacity` bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity: capacity.max(1),
            write_closed: false,
            failure: None,
            read_closed: false,
            read_waker: None,
            write_waker: None,
        }),
        reader_gone: Notify::new(),
    });
    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

/// Producer half.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Close the pipe with an error the reader will observe after draining
    /// what is already buffered.
    pub fn fail(&self, err: io::Error) {
        let mut state = self.shared.lock();
        if state.write_closed {
            return;
        }
        state.failure = Some((err.kind(), err.to_string()));
        state.write_closed = true;
        state.wake_reader();
    }

    /// Whether the reader has been dropped.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.lock().read_closed
    }

    /// Resolve once the reader has been dropped.
    pub async fn reader_closed(&self) {
        loop {
            let notified = self.shared.reader_gone.notified();
            if self.is_reader_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.shared.lock().buf.len()
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.shared.lock();
        if state.read_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader closed",
            )));
        }
        if state.write_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after pipe shutdown",
            )));
        }
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let free = state.capacity.saturating_sub(state.buf.len());
        if free == 0 {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = free.min(data.len());
        state.buf.extend(&data[..n]);
        state.wake_reader();
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();
        state.write_closed = true;
        state.wake_reader();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if !state.write_closed {
            state.failure = Some((
                io::ErrorKind::UnexpectedEof,
                "pipe writer dropped before end of stream".to_string(),
            ));
            state.write_closed = true;
        }
        state.wake_reader();
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.shared.lock().buf.len()
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if out.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut state = self.shared.lock();
        if !state.buf.is_empty() {
            let n = out.remaining().min(state.buf.len());
            {
                let (front, back) = state.buf.as_slices();
                let from_front = n.min(front.len());
                out.put_slice(&front[..from_front]);
                if n > from_front {
                    out.put_slice(&back[..n - from_front]);
                }
            }
            state.buf.drain(..n);
            state.wake_writer();
            return Poll::Ready(Ok(()));
        }

        if let Some((kind, message)) = &state.failure {
            return Poll::Ready(Err(io::Error::new(*kind, message.clone())));
        }
        if state.write_closed {
            return Poll::Ready(Ok(()));
        }

        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.read_closed = true;
            state.buf.clear();
            state.wake_writer();
        }
        self.shared.reader_gone.notify_waiters();
    }
}
