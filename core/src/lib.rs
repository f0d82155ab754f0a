/*
 * lib.rs
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

//! Corriere core: an asynchronous HTTP(S)/WebSocket client engine.
//!
//! ```no_run
//! use corriere_core::{ClientConfig, HttpClient, Request};
//!
//! # async fn demo() -> Result<(), corriere_core::ClientError> {
//! let client = HttpClient::new(ClientConfig::default());
//! let request = Request::get("https://example.org/").build()?;
//! let response = client.execute(request).await.into_result()?;
//! println!("{} {}", response.status(), response.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod uri;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ConnectError, ConnectFailure, ExecutionError, Limit, ProtocolFailure, TimeoutKind};
pub use protocol::http::{
    Body, CancelHandle, Flow, Headers, HttpClient, Method, Outcome, Request, Response, ResponseFuture,
    ResponseHandler,
};
pub use protocol::websocket::WebSocketSession;
pub use uri::Uri;
