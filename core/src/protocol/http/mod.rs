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

//! HTTP/1.1 client engine.
//!
//! Layout:
//! - `pool`: connections keyed by endpoint, bounded per key and globally, LIFO reuse.
//! - `execution`: per-request state machine (acquire, send, await, redirect, retry).
//! - `policy`: redirect and retry decisions as pure functions of the response or failure.
//! - `timeout`: the connect, acquire, read and request deadlines of one execution.
//! - `transport` / `connection`: the network seam and its tokio TCP/TLS implementation.
//! - `h1`: push parser for HTTP/1.1 responses.
//! - Buffers: `bytes` crate (BytesMut for the parse buffer, Bytes for payload slices).

pub mod body;
pub mod client;
pub mod connection;
pub mod execution;
pub mod h1;
pub mod handler;
pub mod headers;
pub mod key;
pub mod policy;
pub mod pool;
pub mod request;
pub mod response;
pub mod timeout;
pub mod transport;

pub use body::{Body, BodyProducer};
pub use client::{HttpClient, UpgradeFuture};
pub use connection::{TcpChannel, TcpTransport};
pub use execution::{CancelHandle, Outcome, ResponseFuture, State};
pub use handler::{Flow, ResponseHandler};
pub use headers::Headers;
pub use key::{EndpointKey, Scheme};
pub use pool::{PoolStats, ReleaseOutcome};
pub use request::{Method, Proxy, Request, RequestBuilder};
pub use response::Response;
pub use transport::{Channel, ChannelEvent, ConnectObserver, Transport};
