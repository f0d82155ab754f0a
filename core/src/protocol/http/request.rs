/*
 * request.rs
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

//! HTTP request: method, absolute URI, headers, optional body.
//!
//! Built via RequestBuilder; a built `Request` is an immutable value. Redirects produce
//! a new request rather than mutating the old one.

use std::fmt;
use std::time::Duration;

use crate::error::ClientError;
use crate::protocol::http::body::Body;
use crate::protocol::http::headers::Headers;
use crate::uri::Uri;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
    Other(&'static str),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(s) => s,
        }
    }

    /// Safe to resend without duplicating side effects (GET, HEAD, OPTIONS, PUT, DELETE).
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Method::Get | Method::Head | Method::Options | Method::Put | Method::Delete
        )
    }

    /// Methods whose empty body is still announced with `Content-Length: 0`.
    pub(crate) fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forwarding HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }
}

/// Immutable request value.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: Headers,
    body: Body,
    virtual_host: Option<String>,
    proxy: Option<Proxy>,
    follow_redirects: Option<bool>,
    request_timeout: Option<Duration>,
}

impl Request {
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    pub fn get(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Get, uri)
    }

    pub fn post(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Post, uri)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Host header override; the connection still goes to the URI's host.
    pub fn virtual_host(&self) -> Option<&str> {
        self.virtual_host.as_deref()
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// Per-request override of the client's follow-redirects flag.
    pub fn follow_redirects(&self) -> Option<bool> {
        self.follow_redirects
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Copy of this request aimed at `uri`, for redirects.
    pub(crate) fn redirected(&self, uri: Uri) -> Request {
        Request {
            uri,
            ..self.clone()
        }
    }

    pub(crate) fn with_method(mut self, method: Method) -> Request {
        self.method = method;
        self
    }

    pub(crate) fn with_body(mut self, body: Body) -> Request {
        self.body = body;
        self
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub(crate) fn without_virtual_host(mut self) -> Request {
        self.virtual_host = None;
        self
    }
}

/// Request builder: method, uri, headers, body. `build()` validates the URI.
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Headers,
    body: Body,
    virtual_host: Option<String>,
    proxy: Option<Proxy>,
    follow_redirects: Option<bool>,
    request_timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Body::Empty,
            virtual_host: None,
            proxy: None,
            follow_redirects: None,
            request_timeout: None,
        }
    }

    /// Add or replace a header. Comparison is case-insensitive per HTTP.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Add a header value without replacing existing ones.
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set request body. Without a known length it is sent with chunked encoding.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn virtual_host(mut self, host: impl Into<String>) -> Self {
        self.virtual_host = Some(host.into());
        self
    }

    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Request, ClientError> {
        let uri = Uri::parse(&self.uri).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        Ok(Request {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body,
            virtual_host: self.virtual_host,
            proxy: self.proxy,
            follow_redirects: self.follow_redirects,
            request_timeout: self.request_timeout,
        })
    }
}
