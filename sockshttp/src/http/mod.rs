//! HTTP/1.1 messages and their wire codec.

use crate::{Error, Result};
use bytes::Bytes;
use http::{Method, StatusCode, Version};
use std::fmt;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use url::Url;

pub mod request;
pub mod response;

pub use request::{render_head, write_request};
pub use response::{read_response, LineReader, ResponseParser};

/// Headers that describe the body rather than the message. They travel
/// with the body (`RequestBody::headers`, `Content::headers`).
pub const CONTENT_HEADERS: [&str; 10] = [
    "Last-Modified",
    "Expires",
    "Content-Type",
    "Content-Range",
    "Content-MD5",
    "Content-Location",
    "Content-Length",
    "Content-Language",
    "Content-Encoding",
    "Allow",
];

/// Case-insensitive membership test against `CONTENT_HEADERS`.
pub fn is_content_header(name: &str) -> bool {
    CONTENT_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Ordered header multimap. Names compare case-insensitively and keep the
/// spelling they were first added with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Adds a value after any values already present under `name`.
    pub fn append<N, V>(
        &mut self,
        name: N,
        value: V,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        self.extend(name, Some(value.into()));
    }

    /// Adds zero or more values; the name is recorded even if `values` is empty.
    pub fn extend<N, I>(
        &mut self,
        name: N,
        values: I,
    ) where
        N: Into<String>,
        I: IntoIterator<Item = String>,
    {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1.extend(values),
            None => self.entries.push((name, values.into_iter().collect())),
        }
    }

    /// Replaces all values under `name`.
    pub fn insert<N, V>(
        &mut self,
        name: N,
        value: V,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(index) => self.entries[index].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    pub fn remove(
        &mut self,
        name: &str,
    ) -> Option<Vec<String>> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&[String]> {
        self.position(name).map(|index| self.entries[index].1.as_slice())
    }

    pub fn first(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///
///
///
pub struct RequestBody {
    pub(crate) reader: Pin<Box<dyn AsyncRead + Send>>,
    headers: Headers,
    length: Option<u64>,
}

impl RequestBody {
    /// A body read from `reader`. When `length` is given it is sent as
    /// `Content-Length` and must match what the reader yields.
    pub fn new<R>(
        reader: R,
        length: Option<u64>,
    ) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        RequestBody {
            reader: Box::pin(reader),
            headers: Headers::new(),
            length,
        }
    }

    pub fn with_header<N, V>(
        mut self,
        name: N,
        value: V,
    ) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.headers.append(name, value);
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("headers", &self.headers)
            .field("length", &self.length)
            .finish()
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        let length = data.len() as u64;
        RequestBody::new(Cursor::new(data), Some(length))
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        RequestBody::from(data.into_bytes())
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        RequestBody::from(data.as_bytes().to_vec())
    }
}

/// An outgoing request. Only HTTP/1.1 can be written.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: Headers,
    body: Option<RequestBody>,
}

impl Request {
    pub fn new(
        method: Method,
        url: Url,
    ) -> Self {
        Request {
            method,
            url,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Parses `url` and checks it is an absolute http(s) URL with a host.
    pub fn parse(
        method: Method,
        url: &str,
    ) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{}: {}", url, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidRequest(format!("unsupported scheme: {}", scheme))),
        }
        if url.host_str().is_none() {
            return Err(Error::InvalidRequest(format!("missing host: {}", url)));
        }

        Ok(Self::new(method, url))
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::parse(Method::GET, url)
    }

    pub fn with_version(
        mut self,
        version: Version,
    ) -> Self {
        self.version = version;
        self
    }

    pub fn with_header<N, V>(
        mut self,
        name: N,
        value: V,
    ) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.headers.append(name, value);
        self
    }

    pub fn with_body<B: Into<RequestBody>>(
        mut self,
        body: B,
    ) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub(crate) fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }
}

/// Response body as a readable stream. Decompression, if any, has
/// already been applied.
pub struct Body {
    inner: Pin<Box<dyn AsyncRead + Send>>,
}

impl Body {
    pub fn new<R>(inner: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Body { inner: Box::pin(inner) }
    }

    /// Reads the body to its end.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let mut data = Vec::new();
        self.read_to_end(&mut data).await?;

        Ok(Bytes::from(data))
    }

    /// Reads the body to its end as text, replacing invalid UTF-8.
    pub async fn text(self) -> io::Result<String> {
        let data = self.bytes().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for Body {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Body")
    }
}

/// The body of a response together with its content headers.
#[derive(Debug)]
pub struct Content {
    pub headers: Headers,
    pub body: Body,
}

///
///
///
#[derive(Debug)]
pub struct Response {
    version: Version,
    status: StatusCode,
    reason: String,
    headers: Headers,
    content: Option<Content>,
}

impl Response {
    pub(crate) fn new(
        version: Version,
        status: StatusCode,
        reason: String,
        headers: Headers,
        content: Option<Content>,
    ) -> Self {
        Response {
            version,
            status,
            reason,
            headers,
            content,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase as sent by the server, possibly empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Message headers; content headers are under `content()`.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn content_headers(&self) -> Option<&Headers> {
        self.content.as_ref().map(|c| &c.headers)
    }

    pub fn into_content(self) -> Option<Content> {
        self.content
    }

    pub fn into_body(self) -> Option<Body> {
        self.content.map(|c| c.body)
    }

    /// Reads the whole body; a response without content yields nothing.
    pub async fn bytes(self) -> io::Result<Bytes> {
        match self.into_body() {
            Some(body) => body.bytes().await,
            None => Ok(Bytes::new()),
        }
    }

    pub async fn text(self) -> io::Result<String> {
        match self.into_body() {
            Some(body) => body.text().await,
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive_and_ordered() {
        let mut headers = Headers::new();
        headers.append("Accept", "text/html");
        headers.append("X-Trace", "1");
        headers.append("accept", "text/plain");

        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers.get("ACCEPT").unwrap(),
            &["text/html".to_string(), "text/plain".to_string()]
        );

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Accept", "X-Trace"]);
    }

    #[test]
    fn insert_replaces_values() {
        let mut headers = Headers::new();
        headers.append("Accept", "a");
        headers.append("Accept", "b");
        headers.insert("accept", "c");

        assert_eq!(headers.first("Accept"), Some("c"));
        assert_eq!(headers.get("Accept").unwrap().len(), 1);

        assert_eq!(headers.remove("ACCEPT"), Some(vec!["c".to_string()]));
        assert!(headers.is_empty());
    }

    #[test]
    fn content_header_set() {
        assert!(is_content_header("content-type"));
        assert!(is_content_header("Allow"));
        assert!(is_content_header("EXPIRES"));
        assert!(!is_content_header("Host"));
        assert!(!is_content_header("Transfer-Encoding"));
    }

    #[test]
    fn request_requires_http_url() {
        assert!(Request::get("http://example.com/").is_ok());
        assert!(matches!(Request::get("ftp://example.com/"), Err(Error::InvalidRequest(_))));
        assert!(matches!(Request::get("not a url"), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn string_body_has_length() {
        let body = RequestBody::from("a=1").with_header("Content-Type", "application/x-www-form-urlencoded");

        assert_eq!(body.length(), Some(3));
        assert!(body.headers().contains("content-type"));
    }

    #[tokio::test]
    async fn response_without_content_reads_empty() {
        let response = Response::new(
            Version::HTTP_11,
            StatusCode::NO_CONTENT,
            "No Content".to_string(),
            Headers::new(),
            None,
        );

        assert!(response.content_headers().is_none());
        assert!(response.bytes().await.unwrap().is_empty());
    }
}
