/*
 * execution.rs
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

//! Request execution state machine.
//!
//! One `RequestExecution` drives one logical request from submission to its terminal
//! outcome on the task that owns it:
//!
//! ```text
//! Created → Acquiring → [Connecting] → Sending → AwaitingResponse → Deciding
//!     Deciding → Redirecting → Sending (same connection) | Acquiring (new endpoint)
//!     Deciding → Completing → Terminal
//!     failure  → Retrying → Acquiring | Terminal
//! ```
//!
//! Every suspension point (pool acquire, connect, write, each response event) is raced
//! against the caller's cancellation token and the armed timers. Any error path destroys
//! the leased connection; only a fully read response can put it back in the pool.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{ClientError, ConnectError, ConnectFailure, ExecutionError, TimeoutKind};
use crate::protocol::http::body::BodyProducer;
use crate::protocol::http::handler::{Flow, ResponseHandler};
use crate::protocol::http::key::EndpointKey;
use crate::protocol::http::policy::{FailureDecision, History, Policy, ResponseDecision};
use crate::protocol::http::pool::{Acquired, ConnectionPool, PooledConnection, ReleaseOutcome};
use crate::protocol::http::request::Request;
use crate::protocol::http::response::{Response, ResponseHead};
use crate::protocol::http::timeout::{race, TimeoutSet};
use crate::protocol::http::transport::{Channel, ChannelEvent, ConnectObserver, Transport};

/// Execution states. `Terminal` is entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Acquiring,
    Connecting,
    Sending,
    AwaitingResponse,
    Deciding,
    Redirecting,
    Retrying,
    Completing,
    Terminal,
}

/// Terminal result of one logical request.
#[derive(Debug)]
pub enum Outcome<T = Response> {
    Success(T),
    Failure(ExecutionError),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(t) => Some(t),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionError> {
        match self {
            Outcome::Failure(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<T, ClientError> {
        match self {
            Outcome::Success(t) => Ok(t),
            Outcome::Failure(e) => Err(e.into_inner()),
            Outcome::Cancelled => Err(ClientError::Cancelled),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(t) => Outcome::Success(f(t)),
            Outcome::Failure(e) => Outcome::Failure(e),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// What the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Http,
    /// Expect a 101 and detach the channel; the caller supplies the Upgrade headers.
    Upgrade,
}

/// Everything executions share: configuration, pool and transport.
pub(crate) struct Engine<T: Transport> {
    pub(crate) config: ClientConfig,
    pub(crate) policy: Policy,
    pub(crate) pool: ConnectionPool<T::Channel>,
    pub(crate) transport: T,
}

/// Forwards transport connect progress to the handler hooks.
struct HookObserver<'a, H>(&'a mut H);

impl<H: ResponseHandler> ConnectObserver for HookObserver<'_, H> {
    fn hostname_resolution(&mut self, host: &str) {
        self.0.hostname_resolution(host);
    }

    fn hostname_resolved(&mut self, addresses: &[std::net::SocketAddr]) {
        self.0.hostname_resolved(addresses);
    }

    fn connection_open(&mut self, address: std::net::SocketAddr) {
        self.0.connection_open(address);
    }

    fn tls_handshake(&mut self) {
        self.0.tls_handshake();
    }
}

pub(crate) struct RequestExecution<T: Transport, H: ResponseHandler> {
    engine: Arc<Engine<T>>,
    original: Request,
    current: Request,
    handler: H,
    history: History,
    state: State,
    timers: TimeoutSet,
    cancel: CancellationToken,
    mode: Mode,
    conn: Option<PooledConnection<T::Channel>>,
    upgraded: Option<T::Channel>,
}

impl<T: Transport, H: ResponseHandler> RequestExecution<T, H> {
    pub(crate) fn new(
        engine: Arc<Engine<T>>,
        request: Request,
        handler: H,
        mode: Mode,
        cancel: CancellationToken,
    ) -> Self {
        let timers = TimeoutSet::from_config(&engine.config, request.request_timeout());
        Self {
            engine,
            original: request.clone(),
            current: request,
            handler,
            history: History::default(),
            state: State::Created,
            timers,
            cancel,
            mode,
            conn: None,
            upgraded: None,
        }
    }

    /// Drive an HTTP request to its outcome.
    pub(crate) async fn run(mut self) -> Outcome {
        match self.drive().await {
            Ok(response) => match self.handler.completed(&response) {
                Ok(()) => {
                    self.terminate();
                    Outcome::Success(response)
                }
                Err(message) => self.fail(ClientError::Handler(message)),
            },
            Err(error) => self.fail(error),
        }
    }

    /// Drive an upgrade request. On a 101 that passes `validate` the detached channel is
    /// handed out with the response; otherwise the channel is destroyed.
    pub(crate) async fn run_upgrade<V>(mut self, validate: V) -> Outcome<(Response, T::Channel)>
    where
        V: FnOnce(&Response) -> Result<(), ClientError>,
    {
        let response = match self.drive().await {
            Ok(response) => response,
            Err(error) => return self.fail(error),
        };
        let Some(mut channel) = self.upgraded.take() else {
            return self.fail(ClientError::Handshake(format!(
                "expected 101, got {}",
                response.status()
            )));
        };
        let verdict = validate(&response)
            .and_then(|()| self.handler.completed(&response).map_err(ClientError::Handler));
        match verdict {
            Ok(()) => {
                self.terminate();
                Outcome::Success((response, channel))
            }
            Err(error) => {
                if let Err(e) = channel.close().await {
                    debug!(error = %e, "error closing rejected upgrade channel");
                }
                self.fail(error)
            }
        }
    }

    /// Fail before anything was sent; the handler still sees exactly one terminal hook.
    pub(crate) fn reject<S>(mut self, error: ClientError) -> Outcome<S> {
        self.fail(error)
    }

    fn enter(&mut self, state: State) {
        trace!(uri = %self.current.uri(), from = ?self.state, to = ?state, "execution state");
        self.state = state;
    }

    fn terminate(&mut self) {
        self.timers.disarm_all();
        self.enter(State::Terminal);
        debug!(
            uri = %self.original.uri(),
            attempts = self.history.attempts,
            redirects = self.history.redirects,
            "execution finished"
        );
    }

    fn fail<S>(&mut self, error: ClientError) -> Outcome<S> {
        self.terminate();
        match error {
            ClientError::Cancelled => {
                self.handler.cancelled();
                Outcome::Cancelled
            }
            error => {
                let error = ExecutionError {
                    error,
                    attempts: self.history.attempts,
                    redirects: self.history.redirects,
                };
                debug!(uri = %self.current.uri(), error = %error, "execution failed");
                self.handler.failed(&error);
                Outcome::Failure(error)
            }
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.mode == Mode::Http && self.current.uri().is_websocket() {
            return Err(ClientError::InvalidRequest(format!(
                "{} needs a WebSocket upgrade",
                self.current.uri()
            )));
        }
        Ok(())
    }

    async fn drive(&mut self) -> Result<Response, ClientError> {
        self.validate()?;
        loop {
            match self.attempt().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if self.conn.as_ref().is_some_and(|c| c.channel().response_started()) {
                        self.history.response_started = true;
                    }
                    self.discard().await;
                    let method = self.current.method();
                    match self.engine.policy.on_failure(error, method, &self.history) {
                        FailureDecision::Retry => {
                            self.history.retries += 1;
                            self.history.attempts += 1;
                            self.enter(State::Retrying);
                            debug!(
                                uri = %self.current.uri(),
                                attempt = self.history.attempts,
                                "retrying after premature close"
                            );
                            self.handler.retrying(self.history.attempts);
                        }
                        FailureDecision::GiveUp(error) => return Err(error),
                    }
                }
            }
        }
    }

    /// One transport attempt, following redirects until a final response.
    async fn attempt(&mut self) -> Result<Response, ClientError> {
        loop {
            if self.conn.is_none() {
                self.enter(State::Acquiring);
                let conn = self.acquire().await?;
                self.conn = Some(conn);
            }
            self.history.begin_attempt();
            self.send().await?;
            let head = self.read_head().await?;
            self.enter(State::Deciding);

            if self.mode == Mode::Upgrade && head.status == 101 {
                return self.upgrade(head).await;
            }
            let decision =
                self.engine
                    .policy
                    .on_response(head.status, &head.headers, &self.current, &self.history);
            match decision {
                ResponseDecision::Complete => return self.complete(head).await,
                ResponseDecision::GiveUp(error) => return Err(error),
                ResponseDecision::Redirect(next) => self.redirect(head, next).await?,
            }
        }
    }

    async fn acquire(&mut self) -> Result<PooledConnection<T::Channel>, ClientError> {
        let key = EndpointKey::for_request(&self.current);
        self.handler.connection_pool();
        self.timers.disarm(TimeoutKind::Read);
        self.timers.arm(TimeoutKind::PoolAcquire);
        let acquired = race(&self.cancel, &self.timers, self.engine.pool.acquire(&key)).await;
        self.timers.disarm(TimeoutKind::PoolAcquire);

        let slot = match acquired?? {
            Acquired::Reused(conn) => {
                self.handler.connection_pooled();
                return Ok(conn);
            }
            Acquired::Vacant(slot) => slot,
        };

        self.enter(State::Connecting);
        self.timers.arm(TimeoutKind::Connect);
        let mut observer = HookObserver(&mut self.handler);
        let connected = race(
            &self.cancel,
            &self.timers,
            self.engine.transport.connect(&key, &mut observer),
        )
        .await;
        self.timers.disarm(TimeoutKind::Connect);

        match connected? {
            Ok(channel) => {
                self.engine.pool.mark_alive(&key);
                debug!(endpoint = %key, "connected");
                self.handler.connection_success();
                Ok(slot.fill(channel))
            }
            Err(ConnectError { kind, source }) => {
                if kind == ConnectFailure::Tls {
                    self.engine.pool.mark_dead(&key);
                }
                Err(ClientError::Connect {
                    kind,
                    endpoint: key.to_string(),
                    source,
                })
            }
        }
    }

    async fn send(&mut self) -> Result<(), ClientError> {
        self.enter(State::Sending);
        self.timers.disarm(TimeoutKind::Read);
        self.timers.arm_once(TimeoutKind::Request);
        self.handler.request_send(&self.current);

        let producer = self.current.body().open();
        let length = producer.declared_length();
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::premature_close("no connection leased"));
        };
        let absolute_form = conn.key().proxy().is_some() && !conn.key().is_secure();
        let head = encode_head(&self.current, &self.engine.config, self.mode, length, absolute_form);
        conn.channel_mut().expect_response(self.current.method());
        race(&self.cancel, &self.timers, conn.channel_mut().write(head))
            .await?
            .map_err(ClientError::from_channel_io)?;
        self.handler.headers_written();
        self.write_body(producer, length).await
    }

    /// Stream the body. An unknown length goes out chunked, one frame per produced chunk.
    async fn write_body(&mut self, mut producer: Box<dyn BodyProducer>, length: Option<u64>) -> Result<(), ClientError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::premature_close("no connection leased"));
        };
        let mut sent: u64 = 0;
        loop {
            let next = race(&self.cancel, &self.timers, producer.next_chunk())
                .await?
                .map_err(ClientError::Body)?;
            let Some(chunk) = next else {
                break;
            };
            if chunk.is_empty() {
                continue;
            }
            sent += chunk.len() as u64;
            if let Some(declared) = length {
                if sent > declared {
                    return Err(length_mismatch(declared, sent));
                }
            }
            let frame = match length {
                Some(_) => chunk,
                None => chunk_frame(&chunk),
            };
            self.history.body_bytes_sent = sent;
            race(&self.cancel, &self.timers, conn.channel_mut().write(frame))
                .await?
                .map_err(ClientError::from_channel_io)?;
        }
        match length {
            Some(declared) if declared != sent => Err(length_mismatch(declared, sent)),
            Some(_) => Ok(()),
            None => race(
                &self.cancel,
                &self.timers,
                conn.channel_mut().write(Bytes::from_static(b"0\r\n\r\n")),
            )
            .await?
            .map_err(ClientError::from_channel_io),
        }
    }

    async fn next_event(&mut self) -> Result<ChannelEvent, ClientError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::premature_close("no connection leased"));
        };
        let event = race(&self.cancel, &self.timers, conn.channel_mut().next_event())
            .await?
            .map_err(ClientError::from_channel_io)?;
        self.timers.refresh_read();
        Ok(event)
    }

    async fn read_head(&mut self) -> Result<ResponseHead, ClientError> {
        self.enter(State::AwaitingResponse);
        self.timers.arm(TimeoutKind::Read);
        let mut status = None;
        loop {
            match self.next_event().await? {
                ChannelEvent::Status { code, reason } => {
                    self.history.response_started = true;
                    status = Some((code, reason));
                }
                ChannelEvent::Headers(headers) => {
                    let Some((status, reason)) = status.take() else {
                        return Err(ClientError::malformed("headers before status line"));
                    };
                    return Ok(ResponseHead {
                        status,
                        reason,
                        headers,
                    });
                }
                ChannelEvent::Closed => {
                    return Err(ClientError::premature_close(
                        "connection closed before the response",
                    ))
                }
                ChannelEvent::BodyChunk(_) | ChannelEvent::End => {
                    return Err(ClientError::malformed("body before response headers"))
                }
            }
        }
    }

    /// Deliver the final response: hooks, body, then give the connection back.
    async fn complete(&mut self, head: ResponseHead) -> Result<Response, ClientError> {
        self.enter(State::Completing);
        if self.handler.status_received(head.status, head.reason.as_deref()) == Flow::Abort
            || self.handler.headers_received(&head.headers) == Flow::Abort
        {
            return Ok(self.abort(head, Bytes::new()).await);
        }
        let buffer = self.handler.buffer_body();
        let mut body = BytesMut::new();
        loop {
            match self.next_event().await? {
                ChannelEvent::BodyChunk(chunk) => {
                    if buffer {
                        body.extend_from_slice(&chunk);
                    }
                    if self.handler.body_part(&chunk) == Flow::Abort {
                        return Ok(self.abort(head, body.freeze()).await);
                    }
                }
                ChannelEvent::End => break,
                ChannelEvent::Closed => {
                    return Err(ClientError::premature_close("connection closed mid-response"))
                }
                ChannelEvent::Status { .. } | ChannelEvent::Headers(_) => {
                    return Err(ClientError::malformed("response head inside body"))
                }
            }
        }
        let reusable = self.reusable(&head);
        if self.release(reusable).await == ReleaseOutcome::Pooled {
            self.handler.connection_offer();
        }
        Ok(self.response(head, body.freeze()))
    }

    async fn abort(&mut self, head: ResponseHead, body: Bytes) -> Response {
        debug!(uri = %self.current.uri(), "handler aborted the response");
        self.discard().await;
        self.response(head, body)
    }

    async fn redirect(&mut self, head: ResponseHead, next: Request) -> Result<(), ClientError> {
        self.enter(State::Redirecting);
        let drained = self.drain().await?;
        let reusable = drained && self.reusable(&head);
        let key = EndpointKey::for_request(&next);
        let keep = reusable && self.conn.as_ref().is_some_and(|c| c.key() == &key);
        if !keep {
            self.release(reusable).await;
        }
        self.history.redirects += 1;
        debug!(
            from = %self.current.uri(),
            to = %next.uri(),
            status = head.status,
            redirects = self.history.redirects,
            "following redirect"
        );
        self.handler.redirecting(next.uri());
        self.current = next;
        Ok(())
    }

    /// Read and drop the rest of a redirect response. Ok(false) if the channel failed;
    /// cancellation and timers still end the execution.
    async fn drain(&mut self) -> Result<bool, ClientError> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(false);
        };
        loop {
            let event = race(&self.cancel, &self.timers, conn.channel_mut().next_event()).await?;
            self.timers.refresh_read();
            match event {
                Ok(ChannelEvent::BodyChunk(_)) => continue,
                Ok(ChannelEvent::End) => return Ok(true),
                Ok(_) => return Ok(false),
                Err(e) => {
                    debug!(error = %e, "redirect body could not be drained");
                    return Ok(false);
                }
            }
        }
    }

    /// 101 Switching Protocols: take the channel out of the pool's hands.
    async fn upgrade(&mut self, head: ResponseHead) -> Result<Response, ClientError> {
        self.enter(State::Completing);
        if self.handler.status_received(head.status, head.reason.as_deref()) == Flow::Abort
            || self.handler.headers_received(&head.headers) == Flow::Abort
        {
            self.discard().await;
            return Err(ClientError::Handshake("upgrade aborted by handler".into()));
        }
        match self.next_event().await? {
            ChannelEvent::End => {}
            _ => return Err(ClientError::malformed("101 response with a body")),
        }
        let Some(conn) = self.conn.take() else {
            return Err(ClientError::premature_close("no connection leased"));
        };
        debug!(endpoint = %conn.key(), "connection upgraded");
        self.upgraded = Some(conn.detach());
        Ok(self.response(head, Bytes::new()))
    }

    fn reusable(&self, head: &ResponseHead) -> bool {
        self.engine.config.keep_alive
            && !head.headers.contains_token("Connection", "close")
            && self.conn.as_ref().is_some_and(|c| c.channel().is_reusable())
    }

    fn response(&self, head: ResponseHead, body: Bytes) -> Response {
        Response::new(head, body, self.current.uri().clone(), self.history.redirects)
    }

    async fn release(&mut self, reusable: bool) -> ReleaseOutcome {
        match self.conn.take() {
            Some(conn) => self.engine.pool.release(conn, reusable).await,
            None => ReleaseOutcome::Closed,
        }
    }

    /// Destroy the leased connection, if any.
    async fn discard(&mut self) {
        self.release(false).await;
    }
}

fn length_mismatch(declared: u64, sent: u64) -> ClientError {
    ClientError::Body(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("body produced {} bytes, declared {}", sent, declared),
    ))
}

/// One chunk of chunked transfer coding.
pub(crate) fn chunk_frame(data: &[u8]) -> Bytes {
    let size = format!("{:x}\r\n", data.len());
    let mut buf = BytesMut::with_capacity(size.len() + data.len() + 2);
    buf.extend_from_slice(size.as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

/// Request line and header block. Framing headers are always computed from the body;
/// caller-supplied Content-Length and Transfer-Encoding are ignored.
pub(crate) fn encode_head(
    request: &Request,
    config: &ClientConfig,
    mode: Mode,
    length: Option<u64>,
    absolute_form: bool,
) -> Bytes {
    let uri = request.uri();
    let target = if absolute_form {
        format!("http://{}{}", uri.authority(), uri.path_and_query())
    } else {
        uri.path_and_query().to_string()
    };
    let headers = request.headers();
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    if !headers.contains("Host") {
        let host = request
            .virtual_host()
            .map(str::to_string)
            .unwrap_or_else(|| uri.authority());
        head.push_str("Host: ");
        head.push_str(&host);
        head.push_str("\r\n");
    }
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    if !headers.contains("User-Agent") {
        if let Some(ua) = &config.user_agent {
            head.push_str("User-Agent: ");
            head.push_str(ua);
            head.push_str("\r\n");
        }
    }
    if !headers.contains("Accept") {
        head.push_str("Accept: */*\r\n");
    }
    if mode == Mode::Http && !headers.contains("Connection") {
        head.push_str(if config.keep_alive {
            "Connection: keep-alive\r\n"
        } else {
            "Connection: close\r\n"
        });
    }
    match length {
        Some(0) if !request.method().expects_body() => {}
        Some(n) => {
            head.push_str("Content-Length: ");
            head.push_str(&n.to_string());
            head.push_str("\r\n");
        }
        None => head.push_str("Transfer-Encoding: chunked\r\n"),
    }
    head.push_str("\r\n");
    Bytes::from(head)
}

/// Caller side of a spawned execution. Resolves to exactly one `Outcome`.
pub struct ResponseFuture<T = Response> {
    rx: oneshot::Receiver<Outcome<T>>,
    cancel: CancellationToken,
}

impl<T> ResponseFuture<T> {
    /// Ask the execution to stop. A no-op once it has finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that can cancel from elsewhere (another task, a timer, a UI).
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The execution task was torn down (runtime shutdown) without an outcome.
            Poll::Ready(Err(_)) => Poll::Ready(Outcome::Cancelled),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run an execution on its own task; its outcome goes to the returned future.
pub(crate) fn spawn<S, F>(execution: F, cancel: CancellationToken) -> ResponseFuture<S>
where
    S: Send + 'static,
    F: Future<Output = Outcome<S>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = execution.await;
        if tx.send(outcome).is_err() {
            trace!("outcome dropped: response future was dropped");
        }
    });
    ResponseFuture { rx, cancel }
}
