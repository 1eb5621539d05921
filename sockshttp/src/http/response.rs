use crate::http::{is_content_header, Body, Content, Headers, Response};
use crate::interface::CookieStore;
use crate::stream::{Concat, Limited};
use crate::{Error, Result};
use async_compression::tokio::bufread::{GzipDecoder, ZlibDecoder};
use http::{StatusCode, Version};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Cursor};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use url::Url;

const BUFFER_SIZE: usize = 4096;
const MAX_LINE_LENGTH: usize = 64 * 1024;

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^HTTP/(\d)\.(\d)\s+(\d{3})(?:\s+(.*))?$").expect("valid status line pattern"));

static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:\s]+)\s*:\s*(.*)$").expect("valid header line pattern"));

type Wire = Box<dyn AsyncRead + Send + Unpin>;

/// Line-oriented reader over a fixed buffer.
///
/// Whatever is left in the buffer after the last line belongs to the
/// body, see `into_parts`.
pub struct LineReader<S> {
    stream: S,
    buffer: Box<[u8]>,
    index: usize,
    length: usize,
}

impl<S> LineReader<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: S) -> Self {
        LineReader {
            stream,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            index: 0,
            length: 0,
        }
    }

    /// Reads up to and including the next `\n`. At EOF the partial tail is
    /// returned, and once that is gone an empty string.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut start = self.index;

        loop {
            if self.index >= self.length {
                line.extend_from_slice(&self.buffer[start..self.index]);
                if line.len() > MAX_LINE_LENGTH {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
                }

                self.index = 0;
                self.length = 0;
                start = 0;

                self.length = self.stream.read(&mut self.buffer).await?;
                if self.length == 0 {
                    break;
                }
            }

            let byte = self.buffer[self.index];
            self.index += 1;

            if byte == b'\n' {
                line.extend_from_slice(&self.buffer[start..self.index]);
                break;
            }
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes read from the stream but not yet consumed as lines.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.index..self.length]
    }

    pub fn into_parts(self) -> (Vec<u8>, S) {
        let remainder = self.buffered().to_vec();
        (remainder, self.stream)
    }
}

/// Reads a status line, headers, and sets up the body stream.
pub struct ResponseParser<S> {
    reader: LineReader<S>,
}

impl<S> ResponseParser<S>
where
    S: AsyncRead + Send + Unpin + 'static,
{
    pub fn new(stream: S) -> Self {
        ResponseParser {
            reader: LineReader::new(stream),
        }
    }

    ///
    ///
    ///
    pub async fn parse(
        mut self,
        url: &Url,
        cookies: Option<&dyn CookieStore>,
    ) -> Result<Response> {
        let line = self.reader.read_line().await?;
        if line.is_empty() {
            return Err(Error::MalformedResponse(String::from("connection closed before status line")));
        }

        let (version, status, reason) = parse_status_line(trim_line(&line))?;
        debug!("Response from {}: {:?} {} {}", url, version, status.as_u16(), reason);

        let mut headers = Headers::new();
        let mut content_headers = Headers::new();
        let mut set_cookies = Vec::new();
        let mut complete = false;

        loop {
            let line = self.reader.read_line().await?;
            if line.is_empty() {
                // EOF within the header section, there is no body.
                break;
            }

            let line = trim_line(&line);
            if line.is_empty() {
                complete = true;
                break;
            }

            let (name, value) = parse_header_line(line)?;
            trace!("Header {}: {}", name, value);

            if name.eq_ignore_ascii_case("Set-Cookie") {
                set_cookies.push(value.to_string());
            }

            let values = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from);

            if is_content_header(name) {
                content_headers.extend(name, values);
            } else {
                headers.extend(name, values);
            }
        }

        if let Some(store) = cookies {
            if !set_cookies.is_empty() {
                store.set_cookies(url, &set_cookies);
            }
        }

        let content = if complete && !content_headers.is_empty() {
            Some(self.into_content(&headers, content_headers)?)
        } else {
            None
        };

        Ok(Response::new(version, status, reason, headers, content))
    }

    fn into_content(
        self,
        headers: &Headers,
        content_headers: Headers,
    ) -> Result<Content> {
        if let Some(encoding) = headers.get("Transfer-Encoding") {
            return Err(Error::UnsupportedFeature(format!(
                "Transfer-Encoding: {}",
                encoding.iter().join(", ")
            )));
        }

        let length = match content_headers.first("Content-Length") {
            Some(value) => Some(
                value
                    .parse::<u64>()
                    .map_err(|_| Error::MalformedResponse(format!("invalid Content-Length: {}", value)))?,
            ),
            None => None,
        };

        let encoding = match content_headers.get("Content-Encoding") {
            Some(values) if values.len() > 1 => return Err(Error::UnsupportedEncoding(values.iter().join(", "))),
            Some(values) => values.first().map(|v| v.to_ascii_lowercase()),
            None => None,
        };

        let (buffered, stream) = self.reader.into_parts();
        let parts: Vec<Wire> = vec![Box::new(Cursor::new(buffered)), Box::new(stream)];
        let wire = Concat::from_parts(parts);

        let raw: Wire = match length {
            Some(length) => Box::new(Limited::new(wire, length)),
            None => Box::new(wire),
        };

        let body = match encoding.as_deref() {
            None | Some("identity") => Body::new(raw),
            Some("gzip") | Some("x-gzip") => Body::new(GzipDecoder::new(BufReader::new(raw))),
            Some("deflate") => Body::new(ZlibDecoder::new(BufReader::new(raw))),
            Some(other) => return Err(Error::UnsupportedEncoding(other.to_string())),
        };

        Ok(Content {
            headers: content_headers,
            body,
        })
    }
}

/// Parses a response off `stream`. `url` is the request URL, which scopes
/// any `Set-Cookie` headers handed to `cookies`.
pub async fn read_response<S>(
    stream: S,
    url: &Url,
    cookies: Option<&dyn CookieStore>,
) -> Result<Response>
where
    S: AsyncRead + Send + Unpin + 'static,
{
    ResponseParser::new(stream).parse(url, cookies).await
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\r' || c == '\n')
}

fn parse_status_line(line: &str) -> Result<(Version, StatusCode, String)> {
    let malformed = || Error::MalformedResponse(format!("invalid status line: {:?}", line));

    let captures = STATUS_LINE.captures(line).ok_or_else(malformed)?;

    let version = match (&captures[1], &captures[2]) {
        ("0", "9") => Version::HTTP_09,
        ("1", "0") => Version::HTTP_10,
        ("1", "1") => Version::HTTP_11,
        ("2", "0") => Version::HTTP_2,
        _ => return Err(malformed()),
    };

    let status = captures[3]
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(malformed)?;

    let reason = captures.get(4).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

    Ok((version, status, reason))
}

fn parse_header_line(line: &str) -> Result<(&str, &str)> {
    let captures = HEADER_LINE
        .captures(line)
        .ok_or_else(|| Error::MalformedResponse(format!("invalid header line: {:?}", line)))?;

    match (captures.get(1), captures.get(2)) {
        (Some(name), Some(value)) => Ok((name.as_str(), value.as_str().trim())),
        _ => Err(Error::MalformedResponse(format!("invalid header line: {:?}", line))),
    }
}
