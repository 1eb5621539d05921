use pin_project_lite::pin_project;
use std::cmp;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

pin_project! {
    /// Exposes at most `length` bytes of `inner`, counted from where it
    /// was positioned when wrapped.
    ///
    /// Dropping a `Limited` drops `inner`; wrap a `Shared` handle to keep
    /// the base stream open.
    #[derive(Debug)]
    pub struct Limited<R> {
        #[pin]
        inner: R,
        length: u64,
        position: u64,
        seek_target: Option<u64>,
    }
}

impl<R> Limited<R> {
    pub fn new(
        inner: R,
        length: u64,
    ) -> Self {
        Limited {
            inner,
            length,
            position: 0,
            seek_target: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.length - self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead> AsyncRead for Limited<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();

        let remaining = *this.length - *this.position;
        if remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let max = cmp::min(buf.remaining() as u64, remaining) as usize;
        let mut limited = ReadBuf::new(buf.initialize_unfilled_to(max));

        futures::ready!(this.inner.poll_read(cx, &mut limited))?;

        let read = limited.filled().len();
        if read == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended {} bytes before its bound", remaining),
            )));
        }

        buf.advance(read);
        *this.position += read as u64;

        Poll::Ready(Ok(()))
    }
}

impl<R: AsyncSeek> AsyncSeek for Limited<R> {
    fn start_seek(
        self: Pin<&mut Self>,
        position: SeekFrom,
    ) -> io::Result<()> {
        let this = self.project();

        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) => i128::from(*this.position) + i128::from(offset),
            SeekFrom::End(offset) => i128::from(*this.length) + i128::from(offset),
        };

        if target < 0 || target > i128::from(*this.length) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek target {} is outside of 0..={}", target, this.length),
            ));
        }

        let delta = (target - i128::from(*this.position)) as i64;
        this.inner.start_seek(SeekFrom::Current(delta))?;
        *this.seek_target = Some(target as u64);

        Ok(())
    }

    fn poll_complete(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<u64>> {
        let this = self.project();

        futures::ready!(this.inner.poll_complete(cx))?;
        if let Some(target) = this.seek_target.take() {
            *this.position = target;
        }

        Poll::Ready(Ok(*this.position))
    }
}
