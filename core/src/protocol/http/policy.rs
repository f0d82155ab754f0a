/*
 * policy.rs
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

//! Redirect and retry decisions. Pure functions of the response (or failure), the current
//! request and the execution history; the state machine acts on the result.

use crate::config::ClientConfig;
use crate::error::{ClientError, Limit, ProtocolFailure};
use crate::protocol::http::body::Body;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::request::{Method, Request};

/// Headers describing the body, dropped when a redirect switches to GET.
const BODY_HEADERS: [&str; 3] = ["Content-Length", "Content-Type", "Transfer-Encoding"];

/// Credentials, dropped on cross-origin redirects.
const CREDENTIAL_HEADERS: [&str; 3] = ["Authorization", "Proxy-Authorization", "Cookie"];

/// What the execution has done so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    /// Transport-level attempts, including the first.
    pub attempts: u32,
    pub retries: u32,
    /// Redirects followed. Never decreases.
    pub redirects: u32,
    /// Request body bytes written in the current attempt.
    pub body_bytes_sent: u64,
    /// Any response byte received in the current attempt.
    pub response_started: bool,
}

impl Default for History {
    fn default() -> Self {
        Self {
            attempts: 1,
            retries: 0,
            redirects: 0,
            body_bytes_sent: 0,
            response_started: false,
        }
    }
}

impl History {
    /// Reset the per-attempt progress before a request goes out again.
    pub fn begin_attempt(&mut self) {
        self.body_bytes_sent = 0;
        self.response_started = false;
    }
}

#[derive(Debug)]
pub enum ResponseDecision {
    /// Send this request next.
    Redirect(Request),
    /// The response is the outcome.
    Complete,
    GiveUp(ClientError),
}

#[derive(Debug)]
pub enum FailureDecision {
    /// Send the same request again on another connection.
    Retry,
    GiveUp(ClientError),
}

#[derive(Debug, Clone)]
pub struct Policy {
    pub max_redirects: u32,
    pub max_retries: u32,
    pub follow_redirects: bool,
    pub strict_302: bool,
    pub keep_auth_on_cross_origin_redirect: bool,
}

impl From<&ClientConfig> for Policy {
    fn from(c: &ClientConfig) -> Self {
        Self {
            max_redirects: c.max_redirects,
            max_retries: c.max_retries,
            follow_redirects: c.follow_redirects,
            strict_302: c.strict_302,
            keep_auth_on_cross_origin_redirect: c.keep_auth_on_cross_origin_redirect,
        }
    }
}

pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

impl Policy {
    /// Decide on a complete status line and header block.
    pub fn on_response(
        &self,
        status: u16,
        headers: &Headers,
        request: &Request,
        history: &History,
    ) -> ResponseDecision {
        if !is_redirect(status) || !request.follow_redirects().unwrap_or(self.follow_redirects) {
            return ResponseDecision::Complete;
        }
        let Some(location) = headers.get("Location") else {
            return ResponseDecision::Complete;
        };
        if history.redirects >= self.max_redirects {
            return ResponseDecision::GiveUp(ClientError::LimitExceeded {
                limit: Limit::Redirects,
                max: self.max_redirects,
                hops: history.redirects + 1,
                cause: None,
            });
        }
        let target = match request.uri().join(location) {
            Ok(uri) => uri,
            Err(e) => {
                return ResponseDecision::GiveUp(ClientError::malformed(format!(
                    "bad Location {:?}: {}",
                    location, e
                )))
            }
        };

        let method = request.method();
        let switch_to_get = match status {
            303 => !matches!(method, Method::Get | Method::Head),
            301 | 302 => {
                !self.strict_302 && !matches!(method, Method::Get | Method::Head | Method::Options)
            }
            _ => false,
        };
        let cross_origin = !request.uri().same_origin(&target);

        let mut next = request.redirected(target);
        if switch_to_get {
            next = next.with_method(Method::Get).with_body(Body::Empty);
            for name in BODY_HEADERS {
                next.headers_mut().remove(name);
            }
        }
        if cross_origin {
            if !self.keep_auth_on_cross_origin_redirect {
                for name in CREDENTIAL_HEADERS {
                    next.headers_mut().remove(name);
                }
            }
            next = next.without_virtual_host();
        }
        ResponseDecision::Redirect(next)
    }

    /// Decide on a failure of the current attempt. Only a premature close before any
    /// response byte is retried, and only if resending cannot duplicate a side effect.
    pub fn on_failure(&self, error: ClientError, method: Method, history: &History) -> FailureDecision {
        let premature = matches!(
            error,
            ClientError::Protocol {
                kind: ProtocolFailure::PrematureClose,
                ..
            }
        );
        let replay_safe = method.is_idempotent() || history.body_bytes_sent == 0;
        if !premature || history.response_started || !replay_safe {
            return FailureDecision::GiveUp(error);
        }
        if history.retries >= self.max_retries {
            if self.max_retries == 0 {
                return FailureDecision::GiveUp(error);
            }
            return FailureDecision::GiveUp(ClientError::LimitExceeded {
                limit: Limit::Retries,
                max: self.max_retries,
                hops: history.retries + 1,
                cause: Some(Box::new(error)),
            });
        }
        FailureDecision::Retry
    }
}
