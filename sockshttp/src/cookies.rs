use crate::interface::CookieStore;
use std::collections::HashMap;
use std::sync::RwLock;
use url::Url;

/// In-memory cookies, scoped by exact host.
///
/// Only the name/value pair of a `Set-Cookie` is kept. Of the attributes,
/// just `Max-Age` is honored, and only to delete a cookie (`Max-Age=0`).
#[derive(Debug, Default)]
pub struct CookieJar {
    hosts: RwLock<HashMap<String, Vec<(String, String)>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.hosts.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl CookieStore for CookieJar {
    fn cookies(
        &self,
        url: &Url,
    ) -> Vec<(String, String)> {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return vec![],
        };

        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        hosts.get(&host).cloned().unwrap_or_default()
    }

    fn set_cookies(
        &self,
        url: &Url,
        headers: &[String],
    ) {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return,
        };

        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let cookies = hosts.entry(host).or_default();

        for header in headers {
            let (name, value, expired) = match parse_set_cookie(header) {
                Some(cookie) => cookie,
                None => {
                    debug!("Ignoring malformed Set-Cookie: {}", header);
                    continue;
                }
            };

            let existing = cookies.iter().position(|(n, _)| n == name);
            match (existing, expired) {
                (Some(index), true) => {
                    cookies.remove(index);
                }
                (Some(index), false) => cookies[index].1 = value.to_string(),
                (None, false) => cookies.push((name.to_string(), value.to_string())),
                (None, true) => {}
            }
        }
    }
}

/// Splits `name=value; attr; attr=x` into name, value, and whether
/// `Max-Age` says the cookie has already expired.
fn parse_set_cookie(header: &str) -> Option<(&str, &str, bool)> {
    let mut segments = header.split(';');

    let pair = segments.next()?;
    let (name, value) = match pair.find('=') {
        Some(index) => (pair[..index].trim(), pair[index + 1..].trim()),
        None => return None,
    };
    if name.is_empty() {
        return None;
    }

    let expired = segments
        .filter_map(|attribute| {
            let mut parts = attribute.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();

            if key.eq_ignore_ascii_case("Max-Age") {
                value.parse::<i64>().ok()
            } else {
                None
            }
        })
        .any(|max_age| max_age <= 0);

    Some((name, value.trim_matches('"'), expired))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn stores_per_host_in_order() {
        let jar = CookieJar::new();
        jar.set_cookies(
            &url("http://example.com/login"),
            &["session=abc; Path=/; HttpOnly".to_string(), "theme=\"dark\"".to_string()],
        );

        assert_eq!(
            jar.cookies(&url("https://EXAMPLE.com/other")),
            vec![
                ("session".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string())
            ]
        );
        assert!(jar.cookies(&url("http://example.org/")).is_empty());
    }

    #[test]
    fn replaces_and_expires() {
        let jar = CookieJar::new();
        let site = url("http://example.com/");

        jar.set_cookies(&site, &["a=1".to_string(), "b=2".to_string()]);
        jar.set_cookies(&site, &["a=3".to_string(), "b=; Max-Age=0".to_string()]);

        assert_eq!(jar.cookies(&site), vec![("a".to_string(), "3".to_string())]);

        jar.clear();
        assert!(jar.cookies(&site).is_empty());
    }

    #[test]
    fn ignores_malformed() {
        let jar = CookieJar::new();
        let site = url("http://example.com/");

        jar.set_cookies(&site, &["novalue".to_string(), "=nameless".to_string()]);
        assert!(jar.cookies(&site).is_empty());
    }
}
