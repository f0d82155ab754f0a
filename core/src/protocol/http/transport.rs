/*
 * transport.rs
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

//! Transport collaborator: opens channels and decodes responses into ordered events.
//!
//! The engine writes raw request bytes (request line, headers, body framing) and reads
//! decoded `ChannelEvent`s back. `TcpTransport` in `connection` is the tokio implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::ConnectError;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::key::EndpointKey;
use crate::protocol::http::request::Method;

/// Decoded response event, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Status { code: u16, reason: Option<String> },
    Headers(Headers),
    BodyChunk(Bytes),
    /// End of the current message.
    End,
    /// Peer closed the connection between messages.
    Closed,
}

/// Progress of a connect, reported by the transport.
pub trait ConnectObserver: Send {
    fn hostname_resolution(&mut self, _host: &str) {}
    fn hostname_resolved(&mut self, _addresses: &[SocketAddr]) {}
    fn connection_open(&mut self, _address: SocketAddr) {}
    fn tls_handshake(&mut self) {}
}

/// One live connection. Leased by at most one execution at a time; dropping it
/// releases the underlying resources.
pub trait Channel: Send + 'static {
    /// Write all of `data`. An error leaves the channel unusable.
    fn write(&mut self, data: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Next decoded response event. `InvalidData` signals a malformed response;
    /// `UnexpectedEof` or a reset signals a premature close.
    fn next_event(&mut self) -> impl Future<Output = io::Result<ChannelEvent>> + Send;

    /// Close the connection. Closing an already-closed channel is not an error.
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Called before a request is written, so the decoder knows the response framing
    /// (a HEAD response never has a body).
    fn expect_response(&mut self, _method: Method) {}

    /// False once the channel knows it cannot carry another message (close-delimited body,
    /// decoder error, peer close).
    fn is_reusable(&self) -> bool {
        true
    }

    /// True once any byte of the response to the current request has arrived, even if
    /// no complete event was decoded from it. Reset by `expect_response`.
    fn response_started(&self) -> bool {
        false
    }
}

/// Opens channels to endpoints.
pub trait Transport: Send + Sync + 'static {
    type Channel: Channel;

    fn connect<'a>(
        &'a self,
        key: &'a EndpointKey,
        observer: &'a mut dyn ConnectObserver,
    ) -> impl Future<Output = Result<Self::Channel, ConnectError>> + Send + 'a;
}
