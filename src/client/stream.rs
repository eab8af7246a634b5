//! Client byte stream
//!
//! [`PrefixedStream`] yields bytes that were already read off a socket before
//! reading from the socket itself. Connections handed over from another
//! server (for example after HTTP tunnel detection) arrive with such an
//! initial buffer.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Stream handed to clients by the server
pub type ClientStream = PrefixedStream<TcpStream>;

/// Stream with bytes to replay before the inner stream's own
#[derive(Debug)]
pub struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    /// Wrap `inner` with nothing to replay
    pub fn new(inner: S) -> Self {
        Self::with_prefix(Bytes::new(), inner)
    }

    /// Wrap `inner`, replaying `prefix` first
    pub fn with_prefix(prefix: impl Into<Bytes>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    /// Bytes still to be replayed
    pub fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap into the unread prefix and the inner stream
    pub fn into_parts(self) -> (Bytes, S) {
        (self.prefix, self.inner)
    }
}

impl PrefixedStream<TcpStream> {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_prefix_read_before_inner() {
        let mock = Builder::new()
            .read(b"* RTSP/1.0\r\n")
            .write(b"RTSP/1.0 200 OK\r\n")
            .build();
        let mut stream = PrefixedStream::with_prefix(Bytes::from_static(b"OPTIONS "), mock);

        let mut request = [0u8; 20];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"OPTIONS * RTSP/1.0\r\n");
        assert!(stream.prefix().is_empty());

        stream.write_all(b"RTSP/1.0 200 OK\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_prefix_larger_than_read_buffer() {
        let mock = Builder::new().read(b"DEF").build();
        let mut stream = PrefixedStream::with_prefix(&b"ABC"[..], mock);

        let mut first = [0u8; 2];
        stream.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"AB");
        assert_eq!(stream.prefix().as_ref(), b"C");

        let mut rest = [0u8; 4];
        stream.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"CDEF");
    }

    #[tokio::test]
    async fn test_empty_prefix_reads_inner() {
        let mock = Builder::new().read(b"data").build();
        let mut stream = PrefixedStream::new(mock);

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"data");

        let (prefix, _inner) = stream.into_parts();
        assert!(prefix.is_empty());
    }
}
