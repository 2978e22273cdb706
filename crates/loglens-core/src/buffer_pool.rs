//! Reusable sniff-window buffers.
//!
//! The pool is an injected service shared by every in-flight request. A
//! checked-out buffer is returned when its guard drops, on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

#[derive(Debug)]
struct PoolInner {
    buffer_size: usize,
    max_pooled: usize,
    idle: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
}

/// Concurrency-safe pool of fixed-capacity byte buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes, keeping at
    /// most `max_pooled` idle buffers around.
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                max_pooled,
                idle: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Capacity of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Take an empty buffer from the pool, allocating when none is idle.
    pub fn checkout(&self) -> PooledBuffer {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let buf = match reused {
            Some(buf) => buf,
            None => {
                trace!("Allocating sniff buffer of {} bytes", self.inner.buffer_size);
                Vec::with_capacity(self.inner.buffer_size)
            }
        };
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        PooledBuffer {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A checked-out buffer. Derefs to a `Vec<u8>` whose length never needs to
/// exceed the pool's buffer size.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Bytes still free before the buffer reaches the pool's buffer size.
    pub fn remaining(&self) -> usize {
        self.pool.buffer_size.saturating_sub(self.len())
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the buffer out.
        self.buf.as_ref().map_or(&EMPTY, |b| b)
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.get_or_insert_with(Vec::new)
    }
}

static EMPTY: Vec<u8> = Vec::new();

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::SeqCst);
        let Some(mut buf) = self.buf.take() else {
            return;
        };
        buf.clear();
        // Buffers that grew past the configured size are not worth keeping.
        if buf.capacity() > self.pool.buffer_size * 2 {
            return;
        }
        let mut idle = self
            .pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.pool.max_pooled {
            idle.push(buf);
        }
    }
}
