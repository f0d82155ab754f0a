/*
 * uri.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client engine.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Absolute request URIs (http, https, ws, wss) and redirect `Location` resolution.
//! Characters that are not legal in a URI (space, non-ASCII, ...) are percent-encoded
//! on parse; existing `%XX` escapes are kept as they are.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Encode what may not appear literally in a path or query. `%` is left alone so that
/// already-encoded input passes through unchanged.
const PATH_QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("URI has no scheme: {0}")]
    MissingScheme(String),
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("URI has no host")]
    MissingHost,
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("unterminated IPv6 bracket")]
    UnterminatedBracket,
}

/// Parsed absolute URI. Scheme and host are lowercased; the fragment is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    userinfo: Option<String>,
    host: String,
    port: Option<u16>,
    path_and_query: String,
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" | "wss" => 443,
        _ => 80,
    }
}

impl Uri {
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let input = input.trim();
        let (scheme, rest) = match input.find("://") {
            Some(i) if i > 0 => (&input[..i], &input[i + 3..]),
            _ => return Err(UriError::MissingScheme(input.to_string())),
        };
        let scheme = scheme.to_ascii_lowercase();
        if !matches!(scheme.as_str(), "http" | "https" | "ws" | "wss") {
            return Err(UriError::UnsupportedScheme(scheme));
        }
        let rest = match rest.find('#') {
            Some(i) => &rest[..i],
            None => rest,
        };

        let split = rest.find(|c| c == '/' || c == '?').unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(split);
        let (userinfo, hostport) = match authority.rfind('@') {
            Some(i) => (Some(authority[..i].to_string()), &authority[i + 1..]),
            None => (None, authority),
        };

        // IPv6 literal [::1]:port
        let (host, port_str) = if let Some(stripped) = hostport.strip_prefix('[') {
            let end = stripped.find(']').ok_or(UriError::UnterminatedBracket)?;
            let after = &stripped[end + 1..];
            (&stripped[..end], after.strip_prefix(':'))
        } else {
            match hostport.rfind(':') {
                Some(i) => (&hostport[..i], Some(&hostport[i + 1..])),
                None => (hostport, None),
            }
        };
        if host.is_empty() {
            return Err(UriError::MissingHost);
        }
        let port = match port_str {
            Some("") | None => None,
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| UriError::InvalidPort(p.to_string()))?,
            ),
        };

        let path_and_query = if tail.is_empty() {
            "/".to_string()
        } else if tail.starts_with('?') {
            format!("/{}", utf8_percent_encode(tail, PATH_QUERY))
        } else {
            utf8_percent_encode(tail, PATH_QUERY).to_string()
        };

        Ok(Self {
            scheme,
            userinfo,
            host: host.to_ascii_lowercase(),
            port,
            path_and_query,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn userinfo(&self) -> Option<&str> {
        self.userinfo.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Effective port: explicit, or the scheme default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| default_port(&self.scheme))
    }

    pub fn explicit_port(&self) -> Option<u16> {
        self.port
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    pub fn path(&self) -> &str {
        match self.path_and_query.find('?') {
            Some(i) => &self.path_and_query[..i],
            None => &self.path_and_query,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.path_and_query.find('?').map(|i| &self.path_and_query[i + 1..])
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.scheme.as_str(), "https" | "wss")
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self.scheme.as_str(), "ws" | "wss")
    }

    /// Host header value: host, plus the port when it is not the scheme default.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(p) if p != default_port(&self.scheme) => format!("{}:{}", host, p),
            _ => host,
        }
    }

    /// Same scheme, host and effective port.
    pub fn same_origin(&self, other: &Uri) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port() == other.port()
    }

    /// Resolve a `Location` header value against this URI.
    pub fn join(&self, location: &str) -> Result<Uri, UriError> {
        let location = location.trim();
        if let Some(i) = location.find("://") {
            let scheme = &location[..i];
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
                return Uri::parse(location);
            }
        }
        if let Some(rest) = location.strip_prefix("//") {
            return Uri::parse(&format!("{}://{}", self.scheme, rest));
        }

        let target = if location.starts_with('/') {
            location.to_string()
        } else if location.starts_with('?') {
            format!("{}{}", self.path(), location)
        } else if location.is_empty() {
            self.path_and_query.clone()
        } else {
            let base = self.path();
            let dir = match base.rfind('/') {
                Some(i) => &base[..=i],
                None => "/",
            };
            format!("{}{}", dir, location)
        };
        let target = match target.find('#') {
            Some(i) => target[..i].to_string(),
            None => target,
        };
        let (path, query) = match target.find('?') {
            Some(i) => (&target[..i], Some(&target[i..])),
            None => (target.as_str(), None),
        };
        let mut joined = remove_dot_segments(path);
        if let Some(q) = query {
            joined.push_str(q);
        }
        Ok(Uri {
            scheme: self.scheme.clone(),
            userinfo: self.userinfo.clone(),
            host: self.host.clone(),
            port: self.port,
            path_and_query: utf8_percent_encode(&joined, PATH_QUERY).to_string(),
        })
    }
}

/// RFC 3986 §5.2.4, on an absolute path.
fn remove_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let trailing_slash = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    let mut result = String::from("/");
    result.push_str(&out.join("/"));
    if trailing_slash && !out.is_empty() {
        result.push('/');
    }
    result
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(u) = &self.userinfo {
            write!(f, "{}@", u)?;
        }
        write!(f, "{}{}", self.authority(), self.path_and_query)
    }
}

impl std::str::FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let u = Uri::parse("http://Example.org").unwrap();
        assert_eq!(u.scheme(), "http");
        assert_eq!(u.host(), "example.org");
        assert_eq!(u.port(), 80);
        assert_eq!(u.explicit_port(), None);
        assert_eq!(u.path_and_query(), "/");
        assert_eq!(u.to_string(), "http://example.org/");

        let s = Uri::parse("wss://chat.example.org/socket?room=1#frag").unwrap();
        assert_eq!(s.port(), 443);
        assert!(s.is_secure());
        assert!(s.is_websocket());
        assert_eq!(s.path_and_query(), "/socket?room=1");
        assert_eq!(s.query(), Some("room=1"));
    }

    #[test]
    fn parse_port_userinfo_and_ipv6() {
        let u = Uri::parse("https://user:pw@host:8443/a/b").unwrap();
        assert_eq!(u.userinfo(), Some("user:pw"));
        assert_eq!(u.port(), 8443);
        assert_eq!(u.authority(), "host:8443");

        let v6 = Uri::parse("http://[::1]:8080?x=1").unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.port(), 8080);
        assert_eq!(v6.authority(), "[::1]:8080");
        assert_eq!(v6.path_and_query(), "/?x=1");
    }

    #[test]
    fn default_port_is_omitted_from_authority() {
        let u = Uri::parse("https://host:443/").unwrap();
        assert_eq!(u.authority(), "host");
    }

    #[test]
    fn rejects_missing_scheme_and_bad_port() {
        assert!(matches!(Uri::parse("gatling.io"), Err(UriError::MissingScheme(_))));
        assert!(matches!(Uri::parse("ftp://x/"), Err(UriError::UnsupportedScheme(_))));
        assert!(matches!(Uri::parse("http://x:99999/"), Err(UriError::InvalidPort(_))));
        assert_eq!(Uri::parse("http:///path"), Err(UriError::MissingHost));
    }

    #[test]
    fn encodes_illegal_characters() {
        let u = Uri::parse("http://h/a b/caffè?q=x y").unwrap();
        assert_eq!(u.path_and_query(), "/a%20b/caff%C3%A8?q=x%20y");
        let kept = Uri::parse("http://h/a%20b").unwrap();
        assert_eq!(kept.path_and_query(), "/a%20b");
    }

    #[test]
    fn join_resolves_location_forms() {
        let base = Uri::parse("http://h:8080/dir/page?x=1").unwrap();
        assert_eq!(base.join("https://other/p").unwrap().to_string(), "https://other/p");
        assert_eq!(base.join("//cdn.example/p").unwrap().to_string(), "http://cdn.example/p");
        assert_eq!(base.join("/root").unwrap().to_string(), "http://h:8080/root");
        assert_eq!(base.join("next").unwrap().to_string(), "http://h:8080/dir/next");
        assert_eq!(base.join("../up?y=2").unwrap().to_string(), "http://h:8080/up?y=2");
        assert_eq!(base.join("?z=3").unwrap().to_string(), "http://h:8080/dir/page?z=3");
    }

    #[test]
    fn same_origin_uses_effective_port() {
        let a = Uri::parse("http://h/").unwrap();
        let b = Uri::parse("http://h:80/x").unwrap();
        let c = Uri::parse("https://h/").unwrap();
        assert!(a.same_origin(&b));
        assert!(!a.same_origin(&c));
    }
}
