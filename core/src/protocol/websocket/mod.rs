/*
 * mod.rs
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

//! WebSocket client: the opening handshake as a specialization of HTTP request execution.
//!
//! `HttpClient::websocket` sends a GET with the Upgrade headers, expects a 101 whose
//! Sec-WebSocket-Accept matches the key, and hands the connection over as a
//! `WebSocketSession`.

pub(crate) mod client;
pub mod connection;
pub mod handshake;

pub use connection::WebSocketSession;
pub use handshake::{compute_accept, OsRandom, RandomSource};
