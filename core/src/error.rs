/*
 * error.rs
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

//! Client errors: connect, timeout, protocol, limit, handshake, cancellation, pool exhaustion.
//!
//! `ClientError` is the kind plus underlying cause. `ExecutionError` wraps it with the
//! attempt and redirect counts of the execution that produced it; that is what a
//! `Failure` outcome carries.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a connection could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Host name did not resolve.
    Dns,
    /// Every resolved address refused the TCP connection.
    Refused,
    /// TCP connected but the TLS handshake failed.
    Tls,
    /// Anything else (unreachable network, unsupported proxy setup, ...).
    Other,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectFailure::Dns => "dns",
            ConnectFailure::Refused => "refused",
            ConnectFailure::Tls => "tls",
            ConnectFailure::Other => "other",
        })
    }
}

/// The four timer classes of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    Connect,
    Request,
    Read,
    PoolAcquire,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Request => "request",
            TimeoutKind::Read => "read",
            TimeoutKind::PoolAcquire => "pool acquire",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFailure {
    /// The response could not be decoded.
    Malformed,
    /// The transport closed (or reset) before a complete response arrived.
    PrematureClose,
}

impl fmt::Display for ProtocolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolFailure::Malformed => "malformed response",
            ProtocolFailure::PrematureClose => "premature close",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Redirects,
    Retries,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Limit::Redirects => "redirects",
            Limit::Retries => "retries",
        })
    }
}

/// Failure reported by a transport's `connect`.
#[derive(Debug, Error)]
#[error("{kind} failure: {source}")]
pub struct ConnectError {
    pub kind: ConnectFailure,
    #[source]
    pub source: io::Error,
}

impl ConnectError {
    pub fn new(kind: ConnectFailure, source: io::Error) -> Self {
        Self { kind, source }
    }
}

/// Error taxonomy of the request-execution engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request rejected before anything was sent (bad URI, unsupported scheme).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connect to {endpoint} failed ({kind}): {source}")]
    Connect {
        kind: ConnectFailure,
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} timeout")]
    Timeout(TimeoutKind),

    #[error("protocol error ({kind}): {message}")]
    Protocol {
        kind: ProtocolFailure,
        message: String,
    },

    /// Redirect or retry budget spent. `hops` counts the hop that was refused.
    #[error("maximum {limit} ({max}) exceeded after {hops} hops")]
    LimitExceeded {
        limit: Limit,
        max: u32,
        hops: u32,
        #[source]
        cause: Option<Box<ClientError>>,
    },

    /// WebSocket upgrade refused or Sec-WebSocket-Accept mismatch.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The request body producer failed, or produced a length other than declared.
    #[error("request body failed: {0}")]
    Body(#[source] io::Error),

    /// The caller's `completed` hook rejected the response.
    #[error("{0}")]
    Handler(String),

    #[error("request cancelled by caller")]
    Cancelled,

    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The client (and its pool) was closed before the request could start.
    #[error("client closed")]
    Closed,
}

impl ClientError {
    /// Classify an I/O error raised by an established channel.
    pub fn from_channel_io(error: io::Error) -> Self {
        let kind = match error.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => ProtocolFailure::Malformed,
            _ => ProtocolFailure::PrematureClose,
        };
        ClientError::Protocol {
            kind,
            message: error.to_string(),
        }
    }

    pub fn premature_close(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            kind: ProtocolFailure::PrematureClose,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            kind: ProtocolFailure::Malformed,
            message: message.into(),
        }
    }

    /// True for network conditions that may succeed when resubmitted: connect failures
    /// other than TLS, timeouts, premature closes and pool exhaustion.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Connect { kind, .. } => *kind != ConnectFailure::Tls,
            ClientError::Timeout(_) | ClientError::PoolExhausted => true,
            ClientError::Protocol { kind, .. } => *kind == ProtocolFailure::PrematureClose,
            ClientError::LimitExceeded { limit, .. } => *limit == Limit::Retries,
            _ => false,
        }
    }

    pub fn timeout_kind(&self) -> Option<TimeoutKind> {
        match self {
            ClientError::Timeout(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Terminal failure of one execution: kind and cause plus how far it got.
#[derive(Debug, Error)]
#[error("{error} (attempts: {attempts}, redirects: {redirects})")]
pub struct ExecutionError {
    #[source]
    pub error: ClientError,
    /// Transport-level attempts made, including the first.
    pub attempts: u32,
    /// Redirects followed before the failure.
    pub redirects: u32,
}

impl ExecutionError {
    pub fn kind(&self) -> &ClientError {
        &self.error
    }

    pub fn is_transient(&self) -> bool {
        self.error.is_transient()
    }

    pub fn into_inner(self) -> ClientError {
        self.error
    }
}
