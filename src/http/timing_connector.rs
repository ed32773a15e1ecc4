// Connector wrappers that mark the connection checkpoints of a probe.
//
// The client stack is HandoffCheckpoint(HttpsConnector(ConnectCheckpoint(HttpConnector))):
// the inner wrapper sees the bare TCP connection, the outer one sees the
// connection the request will actually be written to.

use crate::timing::TraceRecorder;
use futures::future::BoxFuture;
use hyper::rt::{Read, ReadBuf, ReadBufCursor, Write};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_service::Service;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Marks `connect_start` when a connection is requested and `conn_done` once
/// the transport connection is established.
#[derive(Clone, Debug)]
pub struct ConnectCheckpoint<C> {
    inner: C,
    recorder: Arc<TraceRecorder>,
}

impl<C> ConnectCheckpoint<C> {
    pub fn new(inner: C, recorder: Arc<TraceRecorder>) -> Self {
        Self { inner, recorder }
    }
}

impl<C> Service<Uri> for ConnectCheckpoint<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Send + 'static,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = C::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        self.recorder.mark_connect_start();
        let recorder = Arc::clone(&self.recorder);
        let connecting = self.inner.call(dst);
        Box::pin(async move {
            let io = connecting.await?;
            recorder.mark_conn_done();
            Ok(io)
        })
    }
}

/// Marks `got_conn` when the usable connection is handed over, and traces
/// reads on it to catch the first response byte.
///
/// Connection setup past this point (TLS handshake included) is bounded by
/// `handshake_timeout`.
#[derive(Clone, Debug)]
pub struct HandoffCheckpoint<C> {
    inner: C,
    recorder: Arc<TraceRecorder>,
    handshake_timeout: Duration,
}

impl<C> HandoffCheckpoint<C> {
    pub fn new(inner: C, recorder: Arc<TraceRecorder>, handshake_timeout: Duration) -> Self {
        Self {
            inner,
            recorder,
            handshake_timeout,
        }
    }
}

impl<C> Service<Uri> for HandoffCheckpoint<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = TracedIo<C::Response>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let recorder = Arc::clone(&self.recorder);
        let handshake_timeout = self.handshake_timeout;
        let connecting = self.inner.call(dst);
        Box::pin(async move {
            let io = match tokio::time::timeout(handshake_timeout, connecting).await {
                Ok(connected) => connected.map_err(Into::<BoxError>::into)?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connection not ready after {:?}", handshake_timeout),
                    )
                    .into())
                }
            };
            recorder.mark_got_conn();
            Ok(TracedIo { inner: io, recorder })
        })
    }
}

/// Stream that marks `first_byte` on its first completed read.
#[derive(Debug)]
pub struct TracedIo<T> {
    inner: T,
    recorder: Arc<TraceRecorder>,
}

impl<T: Connection> Connection for TracedIo<T> {
    fn connected(&self) -> Connected {
        self.inner.connected()
    }
}

impl<T: Read + Unpin> Read for TracedIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        mut buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut staged = ReadBuf::uninit(unsafe { buf.as_mut() });
        match Pin::new(&mut this.inner).poll_read(cx, staged.unfilled()) {
            Poll::Ready(Ok(())) => {
                let n = staged.filled().len();
                // a zero-length read is EOF, not a response byte
                if n > 0 {
                    this.recorder.mark_first_byte();
                }
                unsafe { buf.advance(n) };
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Write + Unpin> Write for TracedIo<T> {
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

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}
