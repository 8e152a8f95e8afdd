//! Receive and transmit buffer contracts.
//!
//! - [`ReadBuffer`], the receive side consumed by readers
//! - [`WriteBuffer`], the transmit side filled by writers
//! - [`DirectWindow`], a bounded view of the transmit buffer free room
use bytes::Buf;
use std::{
    io,
    task::{Context, Poll},
};

mod memory;
#[cfg(feature = "tokio")]
mod socket;

pub use memory::{MemoryBuffer, MemorySink};
#[cfg(feature = "tokio")]
pub use socket::SocketBuffer;

/// A receive buffer which can be refilled from the transport.
///
/// The buffered bytes are read through the [`Buf`] implementation.
pub trait ReadBuffer: Buf + Unpin {
    /// Poll until at least `n` bytes are buffered.
    ///
    /// On `Ready(Ok)`, the first `n` bytes must be contiguous in [`Buf::chunk`].
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the peer closed before `n` bytes arrive.
    fn poll_ensure(&mut self, cx: &mut Context, n: usize) -> Poll<io::Result<()>>;

    /// Poll to read more bytes into the buffer, without a specific target count.
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the peer is closed.
    fn poll_read_more(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;
}

impl<B> ReadBuffer for &mut B where B: ReadBuffer {
    fn poll_ensure(&mut self, cx: &mut Context, n: usize) -> Poll<io::Result<()>> {
        B::poll_ensure(self, cx, n)
    }

    fn poll_read_more(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        B::poll_read_more(self, cx)
    }
}

/// An extension trait to provide `Future` API for [`ReadBuffer`].
pub trait ReadBufferExt: ReadBuffer {
    /// Wait until at least `n` bytes are buffered.
    fn ensure(&mut self, n: usize) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(move |cx| self.poll_ensure(cx, n))
    }

    /// Read more bytes into the buffer.
    fn read_more(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx| self.poll_read_more(cx))
    }
}

impl<T> ReadBufferExt for T where T: ReadBuffer { }

/// A size limited transmit buffer.
pub trait WriteBuffer: Unpin {
    /// Returns a window over the free room of the buffer.
    fn window(&mut self) -> DirectWindow<'_>;

    /// Mark `n` bytes written through the last [`window`][WriteBuffer::window] as ready to send.
    fn commit(&mut self, n: usize);

    /// Returns the number of committed bytes not yet flushed.
    fn pending(&self) -> usize;

    /// Poll to send all committed bytes, freeing the whole buffer.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;
}

impl<W> WriteBuffer for &mut W where W: WriteBuffer {
    fn window(&mut self) -> DirectWindow<'_> {
        W::window(self)
    }

    fn commit(&mut self, n: usize) {
        W::commit(self, n);
    }

    fn pending(&self) -> usize {
        W::pending(self)
    }

    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        W::poll_flush(self, cx)
    }
}

/// An extension trait to provide `Future` API for [`WriteBuffer`].
pub trait WriteBufferExt: WriteBuffer {
    /// Send all committed bytes.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx| self.poll_flush(cx))
    }
}

impl<T> WriteBufferExt for T where T: WriteBuffer { }

/// A bounded view into transmit storage.
///
/// `offset` is where the next byte is written, `size` is the room left.
/// A writer that has no more output clears the window, setting `size` to zero.
///
/// The window borrows the storage, so it cannot outlive the step call that received it.
#[derive(Debug)]
pub struct DirectWindow<'a> {
    buf: &'a mut [u8],
    offset: usize,
    size: usize,
}

impl<'a> DirectWindow<'a> {
    /// Create window over the whole `buf`.
    pub fn new(buf: &'a mut [u8]) -> DirectWindow<'a> {
        let size = buf.len();
        Self { buf, offset: 0, size }
    }

    /// Returns the number of bytes written.
    pub fn filled(&self) -> usize {
        self.offset
    }

    /// Returns the room left.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if writer cleared the window.
    pub fn is_cleared(&self) -> bool {
        self.size == 0
    }

    /// Returns the written bytes.
    pub fn as_filled(&self) -> &[u8] {
        &self.buf[..self.offset]
    }

    /// Signal that the writer has no more output.
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Write the whole `src`.
    ///
    /// # Panics
    ///
    /// Panics if there is not enough room, simple writers rely on caller
    /// providing enough room.
    pub fn put_slice(&mut self, src: &[u8]) {
        assert!(src.len() <= self.size, "direct window overflow");
        self.put_partial(src);
    }

    /// Write as much of `src` as fit, returns the number of bytes written.
    pub fn put_partial(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.size);
        self.buf[self.offset..self.offset + n].copy_from_slice(&src[..n]);
        self.offset += n;
        self.size -= n;
        n
    }

    /// Returns a window over the room left, for nested writers.
    ///
    /// Call [`advance`][DirectWindow::advance] with the nested window
    /// [`filled`][DirectWindow::filled] afterwards.
    pub fn nested(&mut self) -> DirectWindow<'_> {
        DirectWindow::new(&mut self.buf[self.offset..self.offset + self.size])
    }

    /// Account `n` bytes written by a nested window.
    pub fn advance(&mut self, n: usize) {
        assert!(n <= self.size, "direct window overflow");
        self.offset += n;
        self.size -= n;
    }
}

macro_rules! put {
    ($($fn:ident($ty:ty);)*) => {
        impl DirectWindow<'_> {
            $(
                #[doc = concat!("Write big endian `", stringify!($ty), "`, panics if there is not enough room.")]
                pub fn $fn(&mut self, value: $ty) {
                    self.put_slice(&value.to_be_bytes());
                }
            )*
        }
    };
}

put! {
    put_u8(u8);
    put_i16(i16);
    put_i32(i32);
    put_u32(u32);
    put_i64(i64);
    put_f32(f32);
    put_f64(f64);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn window_partial() {
        let mut storage = [0u8; 6];
        let mut window = DirectWindow::new(&mut storage);
        window.put_i16(7);
        assert_eq!(window.put_partial(b"abcdef"), 4);
        assert_eq!(window.size(), 0);
        assert_eq!(window.as_filled(), b"\0\x07abcd");
    }

    #[test]
    fn nested_window() {
        let mut storage = [0u8; 8];
        let mut window = DirectWindow::new(&mut storage);
        window.put_u8(1);
        let n = {
            let mut nested = window.nested();
            nested.put_partial(b"xy");
            nested.clear();
            nested.filled()
        };
        window.advance(n);
        assert!(!window.is_cleared());
        assert_eq!(window.as_filled(), b"\x01xy");
        assert_eq!(window.size(), 5);
    }

    #[test]
    #[should_panic]
    fn simple_overflow() {
        let mut storage = [0u8; 2];
        DirectWindow::new(&mut storage).put_i32(1);
    }
}
