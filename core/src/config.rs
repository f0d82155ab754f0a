/*
 * config.rs
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

//! Client configuration: pool limits, timeouts, redirect and retry budgets.
//!
//! Built in code (`ClientConfig::default()` plus `with_*` setters) or read from an XML file:
//!
//! ```xml
//! <client>
//!   <max-connections>64</max-connections>
//!   <max-connections-per-host>8</max-connections-per-host>
//!   <connect-timeout-ms>5000</connect-timeout-ms>
//!   <follow-redirects>true</follow-redirects>
//! </client>
//! ```
//!
//! Durations are in milliseconds; `0` (or a negative value) disables an optional timer or limit.
//! For the pool that means no idle expiry, no dead-endpoint marks and no acquire queue.
//! All XML reading uses the quick_xml reader; unknown elements are ignored.

use std::fs;
use std::path::Path;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("invalid value for <{element}>: {value}")]
    InvalidValue { element: String, value: String },
}

/// Read-only inputs to the pool and the execution state machine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connections (idle + leased) per endpoint. `None` is unbounded.
    pub max_connections_per_host: Option<usize>,
    /// Connections across all endpoints. `None` is unbounded.
    pub max_connections_total: Option<usize>,
    /// Idle connections older than this (since last use) are never handed out again.
    /// `None` keeps idle connections until their TTL or an explicit sweep.
    pub pooled_idle_timeout: Option<Duration>,
    /// Maximum lifetime of a pooled connection since it was opened.
    pub connection_ttl: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Overall deadline of one execution, redirects and retries included.
    pub request_timeout: Option<Duration>,
    /// Maximum stall between two response events.
    pub read_timeout: Option<Duration>,
    /// How long an acquire may wait in the pool queue.
    pub acquire_timeout: Option<Duration>,
    /// Bounded acquire queue. 0: fail fast with `PoolExhausted` when the pool is full.
    pub max_pending_acquires: usize,
    pub max_redirects: u32,
    pub max_retries: u32,
    pub follow_redirects: bool,
    /// Keep method and body on 301/302 (303 always switches to GET).
    pub strict_302: bool,
    /// Keep Authorization and Cookie headers on cross-origin redirects.
    pub keep_auth_on_cross_origin_redirect: bool,
    pub keep_alive: bool,
    /// Period of the background idle sweep.
    pub eviction_interval: Duration,
    /// How long a TLS-failed endpoint stays marked dead.
    pub dead_endpoint_ttl: Duration,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: None,
            max_connections_total: None,
            pooled_idle_timeout: Some(Duration::from_secs(60)),
            connection_ttl: None,
            connect_timeout: Some(Duration::from_secs(5)),
            request_timeout: Some(Duration::from_secs(60)),
            read_timeout: Some(Duration::from_secs(60)),
            acquire_timeout: None,
            max_pending_acquires: 0,
            max_redirects: 5,
            max_retries: 5,
            follow_redirects: false,
            strict_302: false,
            keep_auth_on_cross_origin_redirect: false,
            keep_alive: true,
            eviction_interval: Duration::from_secs(1),
            dead_endpoint_ttl: Duration::from_secs(30),
            user_agent: Some(concat!("corriere/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl ClientConfig {
    pub fn with_max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = Some(max);
        self
    }

    pub fn with_max_connections_total(mut self, max: usize) -> Self {
        self.max_connections_total = Some(max);
        self
    }

    pub fn with_pooled_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.pooled_idle_timeout = idle;
        self
    }

    pub fn with_connection_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.connection_ttl = ttl;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Queue up to `max_pending` acquires when the pool is full, each waiting at most `timeout`.
    pub fn with_acquire_queue(mut self, max_pending: usize, timeout: Option<Duration>) -> Self {
        self.max_pending_acquires = max_pending;
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_strict_302(mut self, strict: bool) -> Self {
        self.strict_302 = strict;
        self
    }

    pub fn with_keep_auth_on_cross_origin_redirect(mut self, keep: bool) -> Self {
        self.keep_auth_on_cross_origin_redirect = keep;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Load from an XML file (see module docs for the format).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_xml(&content)
    }

    /// Parse XML configuration on top of the defaults.
    pub fn from_xml(content: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut config = Self::default();
        let mut element = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(ConfigError::Xml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                }
                Ok(Event::Text(e)) => {
                    if element.is_empty() {
                        continue;
                    }
                    let text = e
                        .unescape()
                        .map_err(|e| ConfigError::Xml(e.to_string()))?
                        .trim()
                        .to_string();
                    config.apply(&element, &text)?;
                    element.clear();
                }
                Ok(Event::End(_)) => element.clear(),
                _ => {}
            }
            buf.clear();
        }
        Ok(config)
    }

    fn apply(&mut self, element: &str, value: &str) -> Result<(), ConfigError> {
        match element {
            "max-connections-per-host" => self.max_connections_per_host = limit(element, value)?,
            "max-connections" => self.max_connections_total = limit(element, value)?,
            "pooled-idle-timeout-ms" => {
                self.pooled_idle_timeout = millis(element, value)?
            }
            "connection-ttl-ms" => self.connection_ttl = millis(element, value)?,
            "connect-timeout-ms" => self.connect_timeout = millis(element, value)?,
            "request-timeout-ms" => self.request_timeout = millis(element, value)?,
            "read-timeout-ms" => self.read_timeout = millis(element, value)?,
            "acquire-timeout-ms" => self.acquire_timeout = millis(element, value)?,
            "max-pending-acquires" => {
                self.max_pending_acquires = limit(element, value)?.unwrap_or(0)
            }
            "max-redirects" => self.max_redirects = count(element, value)?,
            "max-retries" => self.max_retries = count(element, value)?,
            "follow-redirects" => self.follow_redirects = flag(element, value)?,
            "strict-302" => self.strict_302 = flag(element, value)?,
            "keep-auth-on-redirect" => {
                self.keep_auth_on_cross_origin_redirect = flag(element, value)?
            }
            "keep-alive" => self.keep_alive = flag(element, value)?,
            "eviction-interval-ms" => {
                if let Some(d) = millis(element, value)? {
                    self.eviction_interval = d;
                }
            }
            "dead-endpoint-ttl-ms" => {
                self.dead_endpoint_ttl = millis(element, value)?.unwrap_or(Duration::ZERO)
            }
            "user-agent" => {
                self.user_agent = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn invalid(element: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
    }
}

fn millis(element: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    let ms: i64 = value.parse().map_err(|_| invalid(element, value))?;
    Ok((ms > 0).then(|| Duration::from_millis(ms as u64)))
}

fn limit(element: &str, value: &str) -> Result<Option<usize>, ConfigError> {
    let n: i64 = value.parse().map_err(|_| invalid(element, value))?;
    Ok((n > 0).then_some(n as usize))
}

fn count(element: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| invalid(element, value))
}

fn flag(element: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(element, value)),
    }
}
