use bytes::{Buf, Bytes, BytesMut};
use std::{
    collections::VecDeque,
    io,
    task::{Context, Poll},
};

use super::{DirectWindow, ReadBuffer, WriteBuffer};
use crate::config::BufferConfig;

/// In memory [`ReadBuffer`] which receive scripted fragments.
///
/// Each refill moves exactly one fragment into the buffer, which makes
/// it possible to replay how bytes arrive from a network.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    buf: BytesMut,
    fragments: VecDeque<Bytes>,
    refills: usize,
}

impl MemoryBuffer {
    /// Create buffer with all `bytes` already buffered.
    pub fn new(bytes: impl AsRef<[u8]>) -> MemoryBuffer {
        Self {
            buf: BytesMut::from(bytes.as_ref()),
            ..Default::default()
        }
    }

    /// Create an empty buffer, each refill receive the next fragment.
    pub fn from_fragments<I, B>(fragments: I) -> MemoryBuffer
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create an empty buffer which receive `bytes` in fragments of `size`.
    pub fn chunked(bytes: impl AsRef<[u8]>, size: usize) -> MemoryBuffer {
        let bytes = Bytes::copy_from_slice(bytes.as_ref());
        let size = size.max(1);
        let fragments = (0..bytes.len())
            .step_by(size)
            .map(|start| bytes.slice(start..(start + size).min(bytes.len())));
        Self::from_fragments(fragments)
    }

    /// Buffer `bytes` immediately.
    pub fn extend(&mut self, bytes: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(bytes.as_ref());
    }

    /// Returns the number of refills performed.
    pub fn refills(&self) -> usize {
        self.refills
    }

    /// Returns the number of bytes not yet received.
    pub fn unreceived(&self) -> usize {
        self.fragments.iter().map(Bytes::len).sum()
    }

    fn refill(&mut self) -> io::Result<()> {
        let Some(fragment) = self.fragments.pop_front() else {
            return Err(io::ErrorKind::UnexpectedEof.into());
        };
        self.refills += 1;
        self.buf.extend_from_slice(&fragment);
        Ok(())
    }
}

impl Buf for MemoryBuffer {
    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.buf.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.buf.advance(cnt);
    }
}

impl ReadBuffer for MemoryBuffer {
    fn poll_ensure(&mut self, _: &mut Context, n: usize) -> Poll<io::Result<()>> {
        while self.buf.len() < n {
            if let Err(err) = self.refill() {
                return Poll::Ready(Err(err));
            }
        }
        Poll::Ready(Ok(()))
    }

    fn poll_read_more(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
        Poll::Ready(self.refill())
    }
}

/// In memory [`WriteBuffer`] with bounded room, flushed bytes are collected.
#[derive(Debug)]
pub struct MemorySink {
    storage: BytesMut,
    filled: usize,
    output: BytesMut,
    flushes: usize,
}

impl MemorySink {
    /// Create sink with given transmit buffer configuration.
    pub fn new(config: &BufferConfig) -> MemorySink {
        Self::with_capacity(config.write_capacity)
    }

    /// Create sink with a transmit buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> MemorySink {
        Self {
            storage: BytesMut::zeroed(capacity),
            filled: 0,
            output: BytesMut::new(),
            flushes: 0,
        }
    }

    /// Returns all flushed bytes.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Take all flushed bytes.
    pub fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }

    /// Returns the number of flushes that sent any byte.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl WriteBuffer for MemorySink {
    fn window(&mut self) -> DirectWindow<'_> {
        DirectWindow::new(&mut self.storage[self.filled..])
    }

    fn commit(&mut self, n: usize) {
        assert!(self.filled + n <= self.storage.len(), "commit beyond transmit buffer");
        self.filled += n;
    }

    fn pending(&self) -> usize {
        self.filled
    }

    fn poll_flush(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
        if self.filled != 0 {
            self.output.extend_from_slice(&self.storage[..self.filled]);
            self.filled = 0;
            self.flushes += 1;
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::{ReadBufferExt, WriteBufferExt};

    #[tokio::test]
    async fn ensure_refills() {
        let mut buf = MemoryBuffer::from_fragments([&b"\0\0"[..], &b"\0\x2a"[..]]);
        buf.ensure(4).await.unwrap();
        assert_eq!(buf.refills(), 2);
        assert_eq!(buf.get_i32(), 42);
        let err = buf.read_more().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn chunked_fragments() {
        let buf = MemoryBuffer::chunked(b"abcdefg", 3);
        assert_eq!(buf.fragments.len(), 3);
        assert_eq!(buf.unreceived(), 7);
    }

    #[tokio::test]
    async fn sink_collects() {
        let mut sink = MemorySink::with_capacity(4);
        let mut window = sink.window();
        window.put_partial(b"abcdef");
        let n = window.filled();
        sink.commit(n);
        assert_eq!(sink.pending(), 4);
        sink.flush().await.unwrap();
        assert_eq!(sink.output(), b"abcd");
        assert_eq!(sink.flushes(), 1);
        assert_eq!(sink.window().size(), 4);
    }
}
