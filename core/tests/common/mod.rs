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

//! Test support: a scripted transport and a handler that records every hook.
//!
//! Response scripts are queued on the transport and handed to whichever channel the
//! engine prepares next (`expect_response`), so a script follows the request order
//! regardless of which pooled connection carries it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::{pending, Future};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use corriere_core::error::{ConnectError, ConnectFailure, ExecutionError};
use corriere_core::protocol::http::{
    Channel, ChannelEvent, ConnectObserver, EndpointKey, Flow, Headers, Method, Request, Response,
    ResponseHandler, Transport,
};
use corriere_core::uri::Uri;

/// One step of a scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Event(ChannelEvent),
    Delay(Duration),
    Fail(io::ErrorKind),
    /// Response bytes arrive that do not yet decode to an event.
    Partial,
    /// Never produce another event.
    Hang,
}

/// Status, headers, body (if any) and end of message.
pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Vec<Step> {
    let mut steps = vec![
        Step::Event(ChannelEvent::Status {
            code: status,
            reason: Some("Scripted".to_string()),
        }),
        Step::Event(ChannelEvent::Headers(
            headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Headers>(),
        )),
    ];
    if !body.is_empty() {
        steps.push(Step::Event(ChannelEvent::BodyChunk(Bytes::copy_from_slice(body.as_bytes()))));
    }
    steps.push(Step::Event(ChannelEvent::End));
    steps
}

pub fn ok(body: &str) -> Vec<Step> {
    let length = body.len().to_string();
    response(200, &[("Content-Length", length.as_str())], body)
}

pub fn redirect(status: u16, location: &str) -> Vec<Step> {
    response(status, &[("Location", location), ("Content-Length", "0")], "")
}

/// How the next connect behaves.
#[derive(Debug, Clone, Copy)]
pub enum ConnectPlan {
    Succeed,
    Fail(ConnectFailure),
    Hang,
}

#[derive(Default)]
struct MockState {
    scripts: VecDeque<Vec<Step>>,
    plans: VecDeque<ConnectPlan>,
    connects: Vec<String>,
    writes: Vec<(u64, Bytes)>,
    closes: Vec<u64>,
    next_id: u64,
}

/// Transport whose channels replay queued scripts.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, steps: Vec<Step>) -> &Self {
        self.state.lock().unwrap().scripts.push_back(steps);
        self
    }

    pub fn plan_connect(&self, plan: ConnectPlan) -> &Self {
        self.state.lock().unwrap().plans.push_back(plan);
        self
    }

    /// Endpoint of every connect attempt, in order.
    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    /// Ids of closed channels, in close order.
    pub fn closes(&self) -> Vec<u64> {
        self.state.lock().unwrap().closes.clone()
    }

    /// Everything written to channel `id`.
    pub fn written(&self, id: u64) -> String {
        let state = self.state.lock().unwrap();
        state
            .writes
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    /// Everything written, all channels, in order.
    pub fn all_written(&self) -> String {
        let state = self.state.lock().unwrap();
        state
            .writes
            .iter()
            .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    /// (channel id, request line) of every request head written.
    pub fn request_lines(&self) -> Vec<(u64, String)> {
        let state = self.state.lock().unwrap();
        state
            .writes
            .iter()
            .filter_map(|(c, b)| {
                let text = String::from_utf8_lossy(b);
                let line = text.split("\r\n").next()?;
                line.ends_with(" HTTP/1.1").then(|| (*c, line.to_string()))
            })
            .collect()
    }

    /// Header blocks written, in order.
    pub fn heads(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .writes
            .iter()
            .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
            .filter(|text| text.split("\r\n").next().is_some_and(|l| l.ends_with(" HTTP/1.1")))
            .collect()
    }
}

impl Transport for MockTransport {
    type Channel = MockChannel;

    fn connect<'a>(
        &'a self,
        key: &'a EndpointKey,
        observer: &'a mut dyn ConnectObserver,
    ) -> impl Future<Output = Result<MockChannel, ConnectError>> + Send + 'a {
        async move {
            let (plan, id) = {
                let mut state = self.state.lock().unwrap();
                state.connects.push(key.to_string());
                let plan = state.plans.pop_front().unwrap_or(ConnectPlan::Succeed);
                state.next_id += 1;
                (plan, state.next_id)
            };
            let (host, port) = key.connect_address();
            let address = SocketAddr::from(([127, 0, 0, 1], port));
            observer.hostname_resolution(host);
            observer.hostname_resolved(&[address]);
            observer.connection_open(address);
            match plan {
                ConnectPlan::Succeed => Ok(MockChannel {
                    id,
                    state: Arc::clone(&self.state),
                    steps: VecDeque::new(),
                    started: false,
                    closed: false,
                }),
                ConnectPlan::Fail(kind) => Err(ConnectError::new(
                    kind,
                    io::Error::new(io::ErrorKind::Other, "scripted connect failure"),
                )),
                ConnectPlan::Hang => pending().await,
            }
        }
    }
}

pub struct MockChannel {
    id: u64,
    state: Arc<Mutex<MockState>>,
    steps: VecDeque<Step>,
    started: bool,
    closed: bool,
}

impl MockChannel {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Channel for MockChannel {
    fn write(&mut self, data: Bytes) -> impl Future<Output = io::Result<()>> + Send {
        let result = if self.closed {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        } else {
            self.state.lock().unwrap().writes.push((self.id, data));
            Ok(())
        };
        async move { result }
    }

    fn next_event(&mut self) -> impl Future<Output = io::Result<ChannelEvent>> + Send {
        async move {
            loop {
                match self.steps.pop_front() {
                    Some(Step::Event(event)) => {
                        if event == ChannelEvent::Closed {
                            self.closed = true;
                        } else {
                            self.started = true;
                        }
                        return Ok(event);
                    }
                    Some(Step::Partial) => self.started = true,
                    Some(Step::Delay(d)) => tokio::time::sleep(d).await,
                    Some(Step::Fail(kind)) => {
                        self.closed = true;
                        return Err(io::Error::new(kind, "scripted failure"));
                    }
                    Some(Step::Hang) => pending::<()>().await,
                    None => {
                        self.closed = true;
                        return Ok(ChannelEvent::Closed);
                    }
                }
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        let mut state = self.state.lock().unwrap();
        if !state.closes.contains(&self.id) {
            state.closes.push(self.id);
        }
        drop(state);
        self.closed = true;
        async { Ok(()) }
    }

    fn expect_response(&mut self, _method: Method) {
        self.started = false;
        self.steps = self
            .state
            .lock()
            .unwrap()
            .scripts
            .pop_front()
            .unwrap_or_default()
            .into();
    }

    fn is_reusable(&self) -> bool {
        !self.closed && self.steps.is_empty()
    }

    fn response_started(&self) -> bool {
        self.started
    }
}

/// What the recording handler should do besides recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    pub abort_on_body: bool,
    pub reject_completed: bool,
    pub stream_only: bool,
}

/// Records every hook as a short string, shared with the test through an `Arc`.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
    behaviour: Behaviour,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(behaviour: Behaviour) -> Self {
        Self {
            events: Arc::default(),
            behaviour,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.split(' ').next() == Some(name)).count()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl ResponseHandler for Recorder {
    fn connection_pool(&mut self) {
        self.push("connection_pool");
    }
    fn connection_pooled(&mut self) {
        self.push("connection_pooled");
    }
    fn hostname_resolution(&mut self, host: &str) {
        self.push(format!("hostname_resolution {}", host));
    }
    fn hostname_resolved(&mut self, _addresses: &[SocketAddr]) {
        self.push("hostname_resolved");
    }
    fn connection_open(&mut self, _address: SocketAddr) {
        self.push("connection_open");
    }
    fn connection_success(&mut self) {
        self.push("connection_success");
    }
    fn request_send(&mut self, request: &Request) {
        self.push(format!("request_send {} {}", request.method(), request.uri()));
    }
    fn headers_written(&mut self) {
        self.push("headers_written");
    }
    fn status_received(&mut self, status: u16, _reason: Option<&str>) -> Flow {
        self.push(format!("status_received {}", status));
        Flow::Continue
    }
    fn headers_received(&mut self, _headers: &Headers) -> Flow {
        self.push("headers_received");
        Flow::Continue
    }
    fn body_part(&mut self, data: &[u8]) -> Flow {
        self.push(format!("body_part {}", data.len()));
        if self.behaviour.abort_on_body {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }
    fn connection_offer(&mut self) {
        self.push("connection_offer");
    }
    fn redirecting(&mut self, location: &Uri) {
        self.push(format!("redirecting {}", location));
    }
    fn retrying(&mut self, attempt: u32) {
        self.push(format!("retrying {}", attempt));
    }
    fn buffer_body(&self) -> bool {
        !self.behaviour.stream_only
    }
    fn completed(&mut self, response: &Response) -> Result<(), String> {
        self.push(format!("completed {}", response.status()));
        if self.behaviour.reject_completed {
            Err("rejected by handler".to_string())
        } else {
            Ok(())
        }
    }
    fn failed(&mut self, error: &ExecutionError) {
        self.push(format!("failed {}", error));
    }
    fn cancelled(&mut self) {
        self.push("cancelled");
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
