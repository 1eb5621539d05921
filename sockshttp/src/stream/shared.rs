use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// A cloneable read handle onto one underlying stream.
///
/// Handles take turns: the lock is held only for the duration of a single
/// poll, so readers must agree on ordering themselves (as the chunked
/// decoder and its parts do).
#[derive(Debug)]
pub struct Shared<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Shared<R> {
    pub fn new(inner: R) -> Self {
        Shared {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl<R> Clone for Shared<R> {
    fn clone(&self) -> Self {
        Shared {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Shared<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "shared stream lock poisoned"))?;

        Pin::new(&mut *inner).poll_read(cx, buf)
    }
}
