/*
 * key.rs
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

//! Endpoint key: identity of a poolable destination. Equality and hash partition the pool.

use std::fmt;

use crate::protocol::http::request::{Proxy, Request};

/// Transport scheme. ws/wss share connections semantics with http/https.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    scheme: Scheme,
    host: String,
    port: u16,
    proxy: Option<Proxy>,
    virtual_host: Option<String>,
}

impl EndpointKey {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            proxy: None,
            virtual_host: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<Proxy>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_virtual_host(mut self, virtual_host: Option<String>) -> Self {
        self.virtual_host = virtual_host;
        self
    }

    pub fn for_request(request: &Request) -> Self {
        let uri = request.uri();
        let scheme = if uri.is_secure() {
            Scheme::Https
        } else {
            Scheme::Http
        };
        Self::new(scheme, uri.host(), uri.port())
            .with_proxy(request.proxy().cloned())
            .with_virtual_host(request.virtual_host().map(str::to_string))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Origin host (TLS server name).
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    pub fn virtual_host(&self) -> Option<&str> {
        self.virtual_host.as_deref()
    }

    /// Where the TCP connection goes: the proxy if any, else the origin.
    pub fn connect_address(&self) -> (&str, u16) {
        match &self.proxy {
            Some(p) => (p.host.as_str(), p.port),
            None => (self.host.as_str(), self.port),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)?;
        if let Some(p) = &self.proxy {
            write!(f, " via {}:{}", p.host, p.port)?;
        }
        if let Some(v) = &self.virtual_host {
            write!(f, " as {}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn websocket_schemes_map_to_transport_schemes() {
        let ws = Request::get("ws://h/chat").build().unwrap();
        let http = Request::get("http://h:80/other").build().unwrap();
        assert_eq!(EndpointKey::for_request(&ws), EndpointKey::for_request(&http));
        let wss = Request::get("wss://h/chat").build().unwrap();
        assert!(EndpointKey::for_request(&wss).is_secure());
        assert_eq!(EndpointKey::for_request(&wss).port(), 443);
    }

    #[test]
    fn proxy_and_virtual_host_partition_the_pool() {
        let plain = Request::get("http://h/").build().unwrap();
        let proxied = Request::get("http://h/")
            .proxy(Proxy::new("proxy", 3128))
            .build()
            .unwrap();
        let vhost = Request::get("http://h/").virtual_host("v").build().unwrap();
        let keys: HashSet<_> = [&plain, &proxied, &vhost]
            .into_iter()
            .map(EndpointKey::for_request)
            .collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(EndpointKey::for_request(&proxied).connect_address(), ("proxy", 3128));
        assert_eq!(
            EndpointKey::for_request(&proxied).to_string(),
            "http://h:80 via proxy:3128"
        );
    }
}
