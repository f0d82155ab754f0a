/*
 * handshake.rs
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

//! WebSocket opening handshake (RFC 6455 §4): key generation, Upgrade request headers,
//! and validation of the 101 response.

use std::io;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::ClientError;
use crate::protocol::http::request::{Method, Request};
use crate::protocol::http::response::Response;

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const WS_VERSION: &str = "13";

/// Source of handshake nonces. Injected so tests can fix the key.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> io::Result<()>;
}

/// Operating system randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> io::Result<()> {
        getrandom::getrandom(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// Sec-WebSocket-Key: base64 of 16 random bytes.
pub fn generate_key(random: &dyn RandomSource) -> io::Result<String> {
    let mut nonce = [0u8; 16];
    random.fill(&mut nonce)?;
    Ok(STANDARD.encode(nonce))
}

/// Expected Sec-WebSocket-Accept for the base64 key we sent: base64(SHA-1(key + GUID)).
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    STANDARD.encode(hasher.finalize())
}

/// Copy of `request` carrying the Upgrade headers and a fresh key.
pub fn upgrade_request(request: &Request, random: &dyn RandomSource) -> Result<(Request, String), ClientError> {
    if request.method() != Method::Get {
        return Err(ClientError::InvalidRequest(format!(
            "WebSocket upgrade must use GET, not {}",
            request.method()
        )));
    }
    let key = generate_key(random).map_err(|e| ClientError::Handshake(format!("no handshake key: {}", e)))?;
    let mut upgraded = request.clone();
    let headers = upgraded.headers_mut();
    headers.set("Upgrade", "websocket");
    headers.set("Connection", "Upgrade");
    headers.set("Sec-WebSocket-Key", key.as_str());
    if !headers.contains("Sec-WebSocket-Version") {
        headers.set("Sec-WebSocket-Version", WS_VERSION);
    }
    Ok((upgraded, key))
}

/// Check the server's 101 against the key we sent.
pub fn verify_response(response: &Response, key: &str) -> Result<(), ClientError> {
    if response.status() != 101 {
        return Err(ClientError::Handshake(format!(
            "expected 101, got {}",
            response.status()
        )));
    }
    let headers = response.headers();
    if !headers.contains_token("Upgrade", "websocket") {
        return Err(ClientError::Handshake("missing Upgrade: websocket".into()));
    }
    if !headers.contains_token("Connection", "upgrade") {
        return Err(ClientError::Handshake("missing Connection: Upgrade".into()));
    }
    match headers.get("Sec-WebSocket-Accept") {
        Some(accept) if accept.trim() == compute_accept(key) => Ok(()),
        Some(_) => Err(ClientError::Handshake("Sec-WebSocket-Accept mismatch".into())),
        None => Err(ClientError::Handshake("missing Sec-WebSocket-Accept".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::headers::Headers;
    use crate::protocol::http::response::ResponseHead;
    use crate::uri::Uri;
    use bytes::Bytes;

    struct Counting;

    impl RandomSource for Counting {
        fn fill(&self, buf: &mut [u8]) -> io::Result<()> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = i as u8;
            }
            Ok(())
        }
    }

    fn response(status: u16, headers: &[(&str, &str)]) -> Response {
        let headers: Headers = headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Response::new(
            ResponseHead {
                status,
                reason: None,
                headers,
            },
            Bytes::new(),
            Uri::parse("ws://h/chat").unwrap(),
            0,
        )
    }

    #[test]
    fn rfc6455_reference_vector() {
        assert_eq!(compute_accept("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn key_is_base64_of_sixteen_bytes() {
        let key = generate_key(&Counting).unwrap();
        assert_eq!(key, "AAECAwQFBgcICQoLDA0ODw==");
        assert_eq!(STANDARD.decode(&key).unwrap().len(), 16);
    }

    #[test]
    fn upgrade_request_headers() {
        let req = Request::get("ws://h/chat").build().unwrap();
        let (req, key) = upgrade_request(&req, &Counting).unwrap();
        assert_eq!(req.headers().get("Sec-WebSocket-Key"), Some(key.as_str()));
        assert_eq!(req.headers().get("Sec-WebSocket-Version"), Some("13"));
        assert!(req.headers().contains_token("Connection", "upgrade"));

        let post = Request::post("ws://h/chat").build().unwrap();
        assert!(matches!(upgrade_request(&post, &Counting), Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn verify_accepts_matching_response() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let ok = response(
            101,
            &[
                ("Upgrade", "websocket"),
                ("Connection", "Upgrade"),
                ("Sec-WebSocket-Accept", "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            ],
        );
        assert!(verify_response(&ok, key).is_ok());

        let wrong = response(
            101,
            &[
                ("Upgrade", "websocket"),
                ("Connection", "Upgrade"),
                ("Sec-WebSocket-Accept", "AAAAAAAAAAAAAAAAAAAAAAAAAAA="),
            ],
        );
        assert!(matches!(verify_response(&wrong, key), Err(ClientError::Handshake(m)) if m.contains("mismatch")));

        let missing = response(101, &[("Upgrade", "websocket"), ("Connection", "Upgrade")]);
        assert!(verify_response(&missing, key).is_err());
        assert!(verify_response(&response(200, &[]), key).is_err());
    }
}
