/*
 * connection.rs
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

//! WebSocket session: owns the upgraded channel after a successful handshake.
//!
//! Framing is left to the owner: take the channel (or, over TCP, the raw stream and any
//! bytes already read past the 101) and speak RFC 6455 frames on it.

use std::io;

use bytes::Bytes;

use crate::net::HttpStream;
use crate::protocol::http::connection::TcpChannel;
use crate::protocol::http::response::Response;
use crate::protocol::http::transport::Channel;

/// Upgraded connection. Never part of the HTTP connection pool.
pub struct WebSocketSession<C: Channel> {
    channel: C,
    response: Response,
    key: String,
}

impl<C: Channel> WebSocketSession<C> {
    pub(crate) fn new(channel: C, response: Response, key: String) -> Self {
        Self {
            channel,
            response,
            key,
        }
    }

    /// The 101 response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Sec-WebSocket-Key sent in the handshake.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Subprotocol chosen by the server, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.response.header("Sec-WebSocket-Protocol")
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub async fn close(mut self) -> io::Result<()> {
        self.channel.close().await
    }
}

impl WebSocketSession<TcpChannel> {
    /// Raw stream plus bytes the server sent right after the 101.
    pub fn into_stream(self) -> (HttpStream, Bytes) {
        self.channel.into_parts()
    }
}
