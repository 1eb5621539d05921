use crate::stream::{Concat, Limited, Shared};
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One chunk of a chunked body, reading through to the shared wire stream.
pub type Chunk<R> = Limited<Shared<R>>;

/// A chunked body decoded into one logical stream.
pub type Chunked<R> = Concat<BoxStream<'static, io::Result<Chunk<R>>>, Chunk<R>>;

/// Splits a `Transfer-Encoding: chunked` wire stream into its chunks.
///
/// The sequence is lazy: a size line is only read when the next chunk is
/// requested, so each chunk must be drained before pulling the next one.
/// A zero-size chunk ends the sequence; trailers are left unread.
pub fn chunks<R>(input: R) -> BoxStream<'static, io::Result<Chunk<R>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let input = Shared::new(input);

    stream::try_unfold((input, false), |(mut input, started)| async move {
        if started {
            // CRLF after the previous chunk's data.
            let mut terminator = [0; 2];
            input.read_exact(&mut terminator).await?;
        }

        let length = read_chunk_size(&mut input).await?;
        if length == 0 {
            return Ok(None);
        }

        trace!("Chunk of {} bytes", length);
        let chunk = Limited::new(input.clone(), length);

        Ok::<_, io::Error>(Some((chunk, (input, true))))
    })
    .boxed()
}

/// Decodes a chunked wire stream into the plain body.
pub fn decode<R>(input: R) -> Chunked<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Concat::new(chunks(input))
}

/// Reads a hexadecimal size line, skipping `\r` and any chunk extension.
async fn read_chunk_size<R>(input: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut length: u64 = 0;
    let mut digits = 0;
    let mut extension = false;

    loop {
        let byte = input.read_u8().await?;

        match byte {
            b'\n' => break,
            b'\r' => continue,
            _ if extension => continue,
            b';' => extension = true,
            _ => {
                let nibble = hex_value(byte).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid character in chunk size: {:?}", byte as char),
                    )
                })?;

                length = length
                    .checked_mul(16)
                    .and_then(|l| l.checked_add(u64::from(nibble)))
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "chunk size overflows"))?;
                digits += 1;
            }
        }
    }

    if digits == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing chunk size"));
    }

    Ok(length)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
