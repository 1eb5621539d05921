use crate::http::{Headers, Request};
use crate::interface::CookieStore;
use crate::{Error, Result};
use http::Version;
use itertools::Itertools;
use std::fmt::Write as _;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes `request` to `stream`: head, then body, then a flush.
///
/// The body is copied straight from its reader; nothing is buffered
/// beyond the head.
pub async fn write_request<W>(
    stream: &mut W,
    mut request: Request,
    cookies: Option<&dyn CookieStore>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = render_head(&request, cookies)?;
    trace!("Request head:\n{}", head);

    stream.write_all(head.as_bytes()).await?;

    if let Some(mut body) = request.take_body() {
        let written = tokio::io::copy(&mut body.reader, stream).await?;
        if let Some(length) = body.length() {
            if written != length {
                warn!("Request body was {} bytes but Content-Length said {}", written, length);
            }
        }
    }

    stream.flush().await?;

    Ok(())
}

/// Renders the request line and headers, including the blank line that
/// ends them.
pub fn render_head(
    request: &Request,
    cookies: Option<&dyn CookieStore>,
) -> Result<String> {
    if request.version() != Version::HTTP_11 {
        return Err(Error::UnsupportedVersion(request.version()));
    }

    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut head = String::new();
    let _ = write!(head, "{} {} HTTP/1.1\r\n", request.method(), target);

    let headers = request.headers();
    if !headers.contains("Host") {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidRequest(format!("missing host: {}", url)))?;

        // `port()` is None when the URL uses its scheme's default.
        match url.port() {
            Some(port) => push_header(&mut head, "Host", &format!("{}:{}", host, port))?,
            None => push_header(&mut head, "Host", host)?,
        }
    }
    if !headers.contains("Connection") {
        push_header(&mut head, "Connection", "close")?;
    }

    push_headers(&mut head, headers, |_| true)?;

    if !headers.contains("Cookie") {
        if let Some(store) = cookies {
            let pairs = store.cookies(url);
            if !pairs.is_empty() {
                let cookie = pairs.iter().map(|(name, value)| format!("{}={}", name, value)).join("; ");
                push_header(&mut head, "Cookie", &cookie)?;
            }
        }
    }

    if let Some(body) = request.body() {
        let length = body.length().filter(|length| *length > 0);

        push_headers(&mut head, body.headers(), |name| {
            length.is_none() || !name.eq_ignore_ascii_case("Content-Length")
        })?;

        if let Some(length) = length {
            push_header(&mut head, "Content-Length", &length.to_string())?;
        }
    }

    head.push_str("\r\n");

    Ok(head)
}

/// Emits one line per header, values joined by a space. Headers whose
/// joined value is blank are skipped.
fn push_headers<F>(
    head: &mut String,
    headers: &Headers,
    include: F,
) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    for (name, values) in headers.iter().filter(|(name, _)| include(name)) {
        let value = values.iter().join(" ");
        if value.trim().is_empty() {
            continue;
        }

        push_header(head, name, &value)?;
    }

    Ok(())
}

fn push_header(
    head: &mut String,
    name: &str,
    value: &str,
) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidRequest(format!("invalid header name: {:?}", name)));
    }
    if value.contains(|c| c == '\r' || c == '\n') {
        return Err(Error::InvalidRequest(format!("line break in value of header {}", name)));
    }

    let _ = write!(head, "{}: {}\r\n", name, value);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieJar;
    use crate::http::RequestBody;
    use http::Method;
    use std::io::Cursor;
    use url::Url;

    fn lines(head: &str) -> Vec<&str> {
        head.split("\r\n").collect()
    }

    #[test]
    fn simple_get() {
        let request = Request::get("http://example.com/index.html?q=1#top").unwrap();
        let head = render_head(&request, None).unwrap();

        assert_eq!(
            head,
            "GET /index.html?q=1 HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn host_includes_non_default_port() {
        let request = Request::get("http://example.com:8080/").unwrap();
        let head = render_head(&request, None).unwrap();
        assert!(head.contains("\r\nHost: example.com:8080\r\n"));

        let request = Request::get("https://example.com:443/").unwrap();
        let head = render_head(&request, None).unwrap();
        assert!(head.contains("\r\nHost: example.com\r\n"));

        let request = Request::get("http://[::1]:8080/").unwrap();
        let head = render_head(&request, None).unwrap();
        assert!(head.contains("\r\nHost: [::1]:8080\r\n"));
    }

    #[test]
    fn explicit_host_is_kept() {
        let request = Request::get("http://example.com/")
            .unwrap()
            .with_header("Host", "other.example");
        let head = render_head(&request, None).unwrap();

        assert!(head.contains("\r\nHost: other.example\r\n"));
        assert!(!head.contains("Host: example.com"));
    }

    #[test]
    fn multi_values_are_space_joined_and_blanks_skipped() {
        let request = Request::get("http://example.com/")
            .unwrap()
            .with_header("Accept", "text/html")
            .with_header("Accept", "text/plain")
            .with_header("X-Empty", " ");
        let head = render_head(&request, None).unwrap();

        assert!(head.contains("\r\nAccept: text/html text/plain\r\n"));
        assert!(!head.contains("X-Empty"));
    }

    #[test]
    fn body_headers_follow_message_headers() {
        let body = RequestBody::from("a=1")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_header("Content-Length", "99");
        let request = Request::parse(Method::POST, "http://example.com/form")
            .unwrap()
            .with_header("Accept", "*/*")
            .with_body(body);
        let head = render_head(&request, None).unwrap();

        assert_eq!(
            lines(&head),
            vec![
                "POST /form HTTP/1.1",
                "Host: example.com",
                "Connection: close",
                "Accept: */*",
                "Content-Type: application/x-www-form-urlencoded",
                "Content-Length: 3",
                "",
                "",
            ]
        );
    }

    #[test]
    fn empty_body_has_no_length() {
        let request = Request::parse(Method::POST, "http://example.com/")
            .unwrap()
            .with_body(Vec::new());
        let head = render_head(&request, None).unwrap();

        assert!(!head.contains("Content-Length"));
    }

    #[test]
    fn cookies_from_store() {
        let jar = CookieJar::new();
        let url = Url::parse("http://example.com/").unwrap();
        jar.set_cookies(&url, &["a=1; Path=/".to_string(), "b=2".to_string()]);

        let request = Request::get("http://example.com/").unwrap();
        let head = render_head(&request, Some(&jar)).unwrap();

        assert!(head.contains("\r\nCookie: a=1; b=2\r\n"));
    }

    #[test]
    fn rejects_other_versions() {
        let request = Request::get("http://example.com/").unwrap().with_version(Version::HTTP_10);

        assert!(matches!(
            render_head(&request, None),
            Err(Error::UnsupportedVersion(version)) if version == Version::HTTP_10
        ));
    }

    #[test]
    fn rejects_header_injection() {
        let request = Request::get("http://example.com/")
            .unwrap()
            .with_header("X-Evil", "a\r\nInjected: yes");
        assert!(matches!(render_head(&request, None), Err(Error::InvalidRequest(_))));

        let request = Request::get("http://example.com/").unwrap().with_header("Bad Name", "x");
        assert!(matches!(render_head(&request, None), Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn writes_head_then_body() {
        let request = Request::parse(Method::PUT, "http://example.com/data")
            .unwrap()
            .with_body(RequestBody::new(Cursor::new(b"payload".to_vec()), Some(7)));

        let mut wire = Vec::new();
        write_request(&mut wire, request, None).await.unwrap();

        let wire = String::from_utf8(wire).unwrap();
        assert!(wire.starts_with("PUT /data HTTP/1.1\r\n"));
        assert!(wire.ends_with("Content-Length: 7\r\n\r\npayload"));
    }
}
