/*
 * response.rs
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

//! HTTP response delivered in a `Success` outcome.

use std::borrow::Cow;

use bytes::Bytes;

use crate::protocol::http::headers::Headers;
use crate::uri::Uri;

/// Status line and headers, before any body.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Headers,
}

/// Final response of an execution. The body is empty when the handler streamed it
/// instead of buffering, and partial when the handler aborted.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    headers: Headers,
    body: Bytes,
    uri: Uri,
    redirects: u32,
}

impl Response {
    pub(crate) fn new(head: ResponseHead, body: Bytes, uri: Uri, redirects: u32) -> Self {
        Self {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
            uri,
            redirects,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// URI of the request that produced this response (after redirects).
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn redirects(&self) -> u32 {
        self.redirects
    }
}
