/*
 * client.rs
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

//! WebSocket upgrade adapter: one request through the execution state machine in upgrade
//! mode, then the validated channel becomes a session.

use crate::protocol::http::execution::{Outcome, RequestExecution};
use crate::protocol::http::handler::ResponseHandler;
use crate::protocol::http::transport::Transport;
use crate::protocol::websocket::connection::WebSocketSession;
use crate::protocol::websocket::handshake::verify_response;

/// Drive `execution` (built with the Upgrade headers carrying `key`) to a session.
/// A 101 that fails validation closes the channel; it never reaches the pool.
pub(crate) async fn upgrade<T, H>(
    execution: RequestExecution<T, H>,
    key: String,
) -> Outcome<WebSocketSession<T::Channel>>
where
    T: Transport,
    H: ResponseHandler,
{
    let outcome = execution
        .run_upgrade(|response| verify_response(response, &key))
        .await;
    outcome.map(|(response, channel)| WebSocketSession::new(channel, response, key))
}
