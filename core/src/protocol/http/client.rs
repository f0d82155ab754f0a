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

//! HTTP client facade: owns the configuration, the connection pool and the transport, and
//! spawns one execution per submitted request.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::protocol::http::connection::TcpTransport;
use crate::protocol::http::execution::{spawn, Engine, Mode, RequestExecution, ResponseFuture};
use crate::protocol::http::handler::ResponseHandler;
use crate::protocol::http::policy::Policy;
use crate::protocol::http::pool::{ConnectionPool, PoolConfig, PoolStats};
use crate::protocol::http::request::Request;
use crate::protocol::http::transport::Transport;
use crate::protocol::websocket::client::upgrade;
use crate::protocol::websocket::handshake::{upgrade_request, OsRandom, RandomSource};
use crate::protocol::websocket::WebSocketSession;

/// Resolves to the upgraded session once the handshake has been validated.
pub type UpgradeFuture<C> = ResponseFuture<WebSocketSession<C>>;

/// Asynchronous HTTP(S)/WebSocket client. Cheap to share behind an `Arc`; every request
/// runs on its own tokio task.
pub struct HttpClient<T: Transport = TcpTransport> {
    engine: Arc<Engine<T>>,
    evictor: Option<JoinHandle<()>>,
}

impl HttpClient<TcpTransport> {
    /// Client on the tokio TCP/TLS transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, TcpTransport::new())
    }
}

impl<T: Transport> HttpClient<T> {
    /// Client on any transport. The idle sweep starts only when called inside a runtime.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let pool = ConnectionPool::new(PoolConfig::from(&config));
        let evictor = match tokio::runtime::Handle::try_current() {
            Ok(_) if !config.eviction_interval.is_zero() => {
                Some(pool.spawn_evictor(config.eviction_interval))
            }
            _ => {
                debug!("no runtime or zero interval: idle sweep disabled");
                None
            }
        };
        let engine = Engine {
            policy: Policy::from(&config),
            config,
            pool,
            transport,
        };
        Self {
            engine: Arc::new(engine),
            evictor,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.engine.config
    }

    /// Start executing `request`, reporting events to `handler`.
    pub fn submit<H: ResponseHandler>(&self, request: Request, handler: H) -> ResponseFuture {
        let cancel = CancellationToken::new();
        let execution = RequestExecution::new(
            Arc::clone(&self.engine),
            request,
            handler,
            Mode::Http,
            cancel.clone(),
        );
        spawn(execution.run(), cancel)
    }

    /// `submit` without hooks.
    pub fn execute(&self, request: Request) -> ResponseFuture {
        self.submit(request, ())
    }

    /// Open a WebSocket: GET with the Upgrade headers, expect a validated 101.
    pub fn websocket<H: ResponseHandler>(
        &self,
        request: Request,
        handler: H,
    ) -> UpgradeFuture<T::Channel> {
        self.websocket_with_random(request, handler, &OsRandom)
    }

    /// `websocket` with the handshake nonce drawn from `random`.
    pub fn websocket_with_random<H: ResponseHandler>(
        &self,
        request: Request,
        handler: H,
        random: &dyn RandomSource,
    ) -> UpgradeFuture<T::Channel> {
        let cancel = CancellationToken::new();
        match upgrade_request(&request, random) {
            Ok((request, key)) => {
                let execution = RequestExecution::new(
                    Arc::clone(&self.engine),
                    request,
                    handler,
                    Mode::Upgrade,
                    cancel.clone(),
                );
                spawn(upgrade(execution, key), cancel)
            }
            Err(error) => {
                let execution = RequestExecution::new(
                    Arc::clone(&self.engine),
                    request,
                    handler,
                    Mode::Upgrade,
                    cancel.clone(),
                );
                spawn(async move { execution.reject(error) }, cancel)
            }
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.engine.pool.stats()
    }

    /// Sweep idle connections now; returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        self.engine.pool.evict().await
    }

    /// Close every idle connection and refuse further acquires. In-flight executions
    /// finish; their connections are closed on release. Later requests fail with
    /// `ClientError::Closed`.
    pub async fn close(&self) {
        if let Some(evictor) = &self.evictor {
            evictor.abort();
        }
        self.engine.pool.close().await;
    }
}

impl<T: Transport> Drop for HttpClient<T> {
    fn drop(&mut self) {
        if let Some(evictor) = self.evictor.take() {
            evictor.abort();
        }
    }
}
