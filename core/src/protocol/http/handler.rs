/*
 * handler.rs
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

//! Response handler trait (push-model hooks, each with a no-op default).
//!
//! Events on a fresh connection:
//! connection_pool → hostname_resolution → hostname_resolved → connection_open →
//! connection_success → request_send → headers_written → status_received →
//! headers_received → body_part (×n) → connection_offer → completed.
//!
//! A pooled connection fires `connection_pooled` in place of the resolution and open
//! events. `redirecting` and `retrying` fire when the execution loops back.

use std::net::SocketAddr;

use crate::error::ExecutionError;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::request::Request;
use crate::protocol::http::response::Response;
use crate::uri::Uri;

/// Returned by the streaming hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading. The execution completes with what was received so far.
    Abort,
}

/// Handler for execution events. The state machine calls these at its transitions,
/// on the task that owns the execution, never concurrently.
pub trait ResponseHandler: Send + 'static {
    /// About to ask the pool for a connection.
    fn connection_pool(&mut self) {}

    /// The pool handed out an idle connection.
    fn connection_pooled(&mut self) {}

    fn hostname_resolution(&mut self, _host: &str) {}

    fn hostname_resolved(&mut self, _addresses: &[SocketAddr]) {}

    fn connection_open(&mut self, _address: SocketAddr) {}

    fn tls_handshake(&mut self) {}

    /// A new connection is ready.
    fn connection_success(&mut self) {}

    fn request_send(&mut self, _request: &Request) {}

    fn headers_written(&mut self) {}

    /// Status line of the final response (intermediate redirects are not reported).
    fn status_received(&mut self, _status: u16, _reason: Option<&str>) -> Flow {
        Flow::Continue
    }

    fn headers_received(&mut self, _headers: &Headers) -> Flow {
        Flow::Continue
    }

    /// Body bytes as they arrive. Data is only valid for the duration of the call.
    fn body_part(&mut self, _data: &[u8]) -> Flow {
        Flow::Continue
    }

    /// The connection went back to the pool.
    fn connection_offer(&mut self) {}

    fn redirecting(&mut self, _location: &Uri) {}

    /// A transport-level retry is starting; `attempt` counts from 2.
    fn retrying(&mut self, _attempt: u32) {}

    /// Whether body bytes are collected into the `Response`. Streaming consumers return false.
    fn buffer_body(&self) -> bool {
        true
    }

    /// Response complete. An `Err` turns the outcome into a `Handler` failure, reported
    /// through `failed`.
    fn completed(&mut self, _response: &Response) -> Result<(), String> {
        Ok(())
    }

    fn failed(&mut self, _error: &ExecutionError) {}

    /// The caller cancelled before the execution finished.
    fn cancelled(&mut self) {}
}

/// No hooks: the outcome alone is enough.
impl ResponseHandler for () {}
