use bytes::{Buf, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{DirectWindow, ReadBuffer, WriteBuffer};
use crate::{common::verbose, config::BufferConfig};

/// Buffered read and write over a tokio io.
#[derive(Debug)]
pub struct SocketBuffer<S> {
    socket: S,
    read_buf: BytesMut,
    read_chunk: usize,
    write_buf: BytesMut,
    filled: usize,
    sent: usize,
}

impl<S> SocketBuffer<S> {
    /// Create buffer with default configuration.
    pub fn new(socket: S) -> Self {
        Self::with_config(socket, &BufferConfig::default())
    }

    pub fn with_config(socket: S, config: &BufferConfig) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(config.read_capacity),
            read_chunk: config.read_capacity,
            write_buf: BytesMut::zeroed(config.write_capacity),
            filled: 0,
            sent: 0,
        }
    }

    /// Returns the underlying io.
    pub fn get_ref(&self) -> &S {
        &self.socket
    }

    /// Consume self into the underlying io, discarding buffered bytes.
    pub fn into_inner(self) -> S {
        self.socket
    }
}

impl<S: AsyncRead + Unpin> SocketBuffer<S> {
    /// Single read from the io into the buffer.
    fn poll_fill(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        let start = self.read_buf.len();
        self.read_buf.resize(start + self.read_chunk, 0);

        let mut read = ReadBuf::new(&mut self.read_buf[start..]);
        let result = Pin::new(&mut self.socket).poll_read(cx, &mut read);
        let n = read.filled().len();
        self.read_buf.truncate(start + n);

        match result {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Ready(Ok(())) if n == 0 => Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into())),
            Poll::Ready(Ok(())) => {
                verbose!(n, "socket read");
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl<S> Buf for SocketBuffer<S> {
    fn remaining(&self) -> usize {
        self.read_buf.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.read_buf.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.read_buf.advance(cnt);
    }
}

impl<S: AsyncRead + Unpin> ReadBuffer for SocketBuffer<S> {
    fn poll_ensure(&mut self, cx: &mut Context, n: usize) -> Poll<io::Result<()>> {
        while self.read_buf.len() < n {
            ready!(self.poll_fill(cx))?;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_read_more(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.poll_fill(cx)
    }
}

impl<S: AsyncWrite + Unpin> WriteBuffer for SocketBuffer<S> {
    fn window(&mut self) -> DirectWindow<'_> {
        DirectWindow::new(&mut self.write_buf[self.filled..])
    }

    fn commit(&mut self, n: usize) {
        assert!(self.filled + n <= self.write_buf.len(), "commit beyond transmit buffer");
        self.filled += n;
    }

    fn pending(&self) -> usize {
        self.filled - self.sent
    }

    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while self.sent < self.filled {
            let n = ready!(Pin::new(&mut self.socket).poll_write(cx, &self.write_buf[self.sent..self.filled]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.sent += n;
        }
        ready!(Pin::new(&mut self.socket).poll_flush(cx))?;
        verbose!(n = self.filled, "socket flushed");
        self.filled = 0;
        self.sent = 0;
        Poll::Ready(Ok(()))
    }
}
