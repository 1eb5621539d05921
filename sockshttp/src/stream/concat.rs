use futures::stream::{self, Stream};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::vec;
use tokio::io::{AsyncRead, ReadBuf};

/// Parts known up front, see `Concat::from_parts`.
pub type PartList<R> = stream::Iter<vec::IntoIter<io::Result<R>>>;

pin_project! {
    /// Reads a sequence of streams back to back.
    ///
    /// Parts are pulled lazily from `parts` and dropped as soon as they
    /// hit EOF; a part is never read again once it has been retired.
    pub struct Concat<St, R> {
        #[pin]
        parts: St,
        current: Option<R>,
        deferred: Option<io::Error>,
        finished: bool,
        position: u64,
        length: Option<u64>,
    }
}

impl<St, R> Concat<St, R>
where
    St: Stream<Item = io::Result<R>>,
    R: AsyncRead + Unpin,
{
    pub fn new(parts: St) -> Self {
        Self::with_length(parts, None)
    }

    /// `length` is informational; it is what `len` reports, nothing is enforced.
    pub fn with_length(
        parts: St,
        length: Option<u64>,
    ) -> Self {
        Concat {
            parts,
            current: None,
            deferred: None,
            finished: false,
            position: 0,
            length,
        }
    }

    pub fn len(&self) -> Option<u64> {
        self.length
    }

    /// Bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R> Concat<PartList<R>, R>
where
    R: AsyncRead + Unpin,
{
    pub fn from_parts(parts: Vec<R>) -> Self {
        let parts: Vec<io::Result<R>> = parts.into_iter().map(Ok).collect();
        Self::new(stream::iter(parts))
    }
}

impl<St, R> AsyncRead for Concat<St, R>
where
    St: Stream<Item = io::Result<R>>,
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();
        let start = buf.filled().len();

        // An error that showed up after bytes were copied is reported on the next call.
        if let Some(e) = this.deferred.take() {
            return Poll::Ready(Err(e));
        }

        // Keep going until the buffer is full or every part is drained, but
        // never report Pending once some bytes were copied.
        while buf.remaining() > 0 && !*this.finished {
            let progressed = buf.filled().len() > start;

            let part = match this.current.as_mut() {
                Some(part) => part,
                None => match this.parts.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(part))) => this.current.get_or_insert(part),
                    Poll::Ready(Some(Err(e))) => {
                        if progressed {
                            *this.deferred = Some(e);
                            break;
                        }
                        return Poll::Ready(Err(e));
                    }
                    Poll::Ready(None) => {
                        *this.finished = true;
                        break;
                    }
                    Poll::Pending if progressed => break,
                    Poll::Pending => return Poll::Pending,
                },
            };

            let before = buf.filled().len();
            match Pin::new(part).poll_read(cx, buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() == before {
                        // Exhausted, retire it.
                        *this.current = None;
                    }
                }
                Poll::Ready(Err(e)) => {
                    if progressed {
                        *this.deferred = Some(e);
                        break;
                    }
                    return Poll::Ready(Err(e));
                }
                Poll::Pending if progressed => break,
                Poll::Pending => return Poll::Pending,
            }
        }

        *this.position += (buf.filled().len() - start) as u64;

        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    /// Counts how many times a part reports EOF and when it is dropped.
    struct Tracked {
        inner: Cursor<Vec<u8>>,
        eofs: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
    }

    impl AsyncRead for Tracked {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let before = buf.filled().len();
            let result = Pin::new(&mut self.inner).poll_read(cx, buf);
            if buf.filled().len() == before {
                self.eofs.fetch_add(1, Ordering::SeqCst);
            }
            result
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn concatenates_in_order_for_any_read_size() {
        let sizes = [5usize, 0, 12, 3];

        for chunk in [1usize, 2, 7, 64].iter().copied() {
            let eofs = Arc::new(AtomicUsize::new(0));
            let drops = Arc::new(AtomicUsize::new(0));

            let mut expected = Vec::new();
            let mut parts = Vec::new();
            for (index, size) in sizes.iter().enumerate() {
                let data: Vec<u8> = (0..*size).map(|i| (index * 50 + i) as u8).collect();
                expected.extend_from_slice(&data);
                parts.push(Tracked {
                    inner: Cursor::new(data),
                    eofs: Arc::clone(&eofs),
                    drops: Arc::clone(&drops),
                });
            }

            let mut concat = Concat::from_parts(parts);
            let mut total = Vec::new();
            let mut buffer = vec![0; chunk];

            loop {
                let read = concat.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                total.extend_from_slice(&buffer[..read]);
            }

            assert_eq!(total, expected);
            assert_eq!(concat.position(), expected.len() as u64);
            assert_eq!(eofs.load(Ordering::SeqCst), sizes.len());
            assert_eq!(drops.load(Ordering::SeqCst), sizes.len());
        }
    }

    #[tokio::test]
    async fn fills_buffer_across_parts() {
        let parts = vec![Cursor::new(b"ab".to_vec()), Cursor::new(b"cde".to_vec())];
        let mut concat = Concat::from_parts(parts);

        let mut buffer = [0; 5];
        let read = concat.read(&mut buffer).await.unwrap();

        assert_eq!(read, 5);
        assert_eq!(&buffer, b"abcde");
    }

    #[tokio::test]
    async fn empty_sequence_is_eof() {
        let mut concat = Concat::from_parts(Vec::<Cursor<Vec<u8>>>::new());
        let mut buffer = Vec::new();

        assert_eq!(concat.read_to_end(&mut buffer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn part_error_surfaces() {
        let parts = stream::iter(vec![
            Ok(Cursor::new(b"ok".to_vec())),
            Err(io::Error::new(io::ErrorKind::InvalidData, "broken part")),
        ]);
        let mut concat = Concat::with_length(parts, Some(10));
        assert_eq!(concat.len(), Some(10));

        let mut buffer = Vec::new();
        let error = concat.read_to_end(&mut buffer).await.unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
        assert_eq!(buffer, b"ok");
    }
}
