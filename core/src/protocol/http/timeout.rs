/*
 * timeout.rs
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

//! Timeout coordinator: the four deadlines of one execution.
//!
//! Timers are plain deadlines owned by the execution. Every suspension point is raced
//! against the earliest armed deadline and the caller's cancellation token, so a timer can
//! only interrupt an execution that is still waiting on something; once the execution is
//! terminal nothing polls the timers and a late deadline has no effect.

use std::future::{pending, Future};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, TimeoutKind};

const KINDS: [TimeoutKind; 4] = [
    TimeoutKind::Connect,
    TimeoutKind::PoolAcquire,
    TimeoutKind::Read,
    TimeoutKind::Request,
];

fn slot(kind: TimeoutKind) -> usize {
    match kind {
        TimeoutKind::Connect => 0,
        TimeoutKind::PoolAcquire => 1,
        TimeoutKind::Read => 2,
        TimeoutKind::Request => 3,
    }
}

/// Durations and armed deadlines for one execution. An unconfigured timer never arms.
#[derive(Debug, Clone)]
pub struct TimeoutSet {
    durations: [Option<Duration>; 4],
    deadlines: [Option<Instant>; 4],
}

impl TimeoutSet {
    pub fn new(
        connect: Option<Duration>,
        request: Option<Duration>,
        read: Option<Duration>,
        acquire: Option<Duration>,
    ) -> Self {
        let mut durations = [None; 4];
        durations[slot(TimeoutKind::Connect)] = connect;
        durations[slot(TimeoutKind::Request)] = request;
        durations[slot(TimeoutKind::Read)] = read;
        durations[slot(TimeoutKind::PoolAcquire)] = acquire;
        Self {
            durations,
            deadlines: [None; 4],
        }
    }

    /// Timers from the client config; `request_override` replaces the request timeout.
    pub fn from_config(config: &ClientConfig, request_override: Option<Duration>) -> Self {
        Self::new(
            config.connect_timeout,
            request_override.or(config.request_timeout),
            config.read_timeout,
            config.acquire_timeout,
        )
    }

    /// Start (or restart) a timer from now.
    pub fn arm(&mut self, kind: TimeoutKind) {
        let i = slot(kind);
        self.deadlines[i] = self.durations[i].map(|d| Instant::now() + d);
    }

    /// Arm a timer unless it is already running.
    pub fn arm_once(&mut self, kind: TimeoutKind) {
        if self.deadlines[slot(kind)].is_none() {
            self.arm(kind);
        }
    }

    pub fn disarm(&mut self, kind: TimeoutKind) {
        self.deadlines[slot(kind)] = None;
    }

    pub fn disarm_all(&mut self) {
        self.deadlines = [None; 4];
    }

    /// Push the read-idle deadline out after progress.
    pub fn refresh_read(&mut self) {
        self.arm(TimeoutKind::Read);
    }

    pub fn is_armed(&self, kind: TimeoutKind) -> bool {
        self.deadlines[slot(kind)].is_some()
    }

    pub fn deadline(&self, kind: TimeoutKind) -> Option<Instant> {
        self.deadlines[slot(kind)]
    }

    /// Earliest armed deadline. Ties go to the more specific timer.
    pub fn next_deadline(&self) -> Option<(TimeoutKind, Instant)> {
        KINDS
            .iter()
            .filter_map(|k| self.deadline(*k).map(|at| (*k, at)))
            .min_by_key(|(_, at)| *at)
    }

    /// Resolves when the earliest armed deadline passes; never resolves with none armed.
    pub async fn expired(&self) -> TimeoutKind {
        match self.next_deadline() {
            Some((kind, at)) => {
                sleep_until(at).await;
                kind
            }
            None => pending().await,
        }
    }
}

/// Why a raced future did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    Timeout(TimeoutKind),
}

impl From<Interrupt> for ClientError {
    fn from(i: Interrupt) -> Self {
        match i {
            Interrupt::Cancelled => ClientError::Cancelled,
            Interrupt::Timeout(kind) => ClientError::Timeout(kind),
        }
    }
}

/// Run `fut` until it completes, the caller cancels, or a timer fires. Cancellation wins
/// over a timer that expires at the same instant, and both win over completion.
pub async fn race<F: Future>(
    cancel: &CancellationToken,
    timers: &TimeoutSet,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        kind = timers.expired() => Err(Interrupt::Timeout(kind)),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    fn read_only(read: Duration) -> TimeoutSet {
        TimeoutSet::new(None, None, Some(read), None)
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_set_never_expires() {
        let timers = TimeoutSet::new(Some(Duration::from_secs(1)), None, None, None);
        let token = CancellationToken::new();
        let out = race(&token, &timers, async {
            sleep(Duration::from_secs(3600)).await;
            7
        })
        .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn read_timer_refreshed_by_progress_does_not_fire() {
        let mut timers = read_only(Duration::from_millis(100));
        let token = CancellationToken::new();
        timers.arm(TimeoutKind::Read);
        for _ in 0..20 {
            let out = race(&token, &timers, sleep(Duration::from_millis(60))).await;
            assert_eq!(out, Ok(()));
            timers.refresh_read();
        }
        let start = Instant::now();
        let out = race(&token, &timers, pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::Timeout(TimeoutKind::Read)));
        assert_eq!(Instant::now() - start, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn read_timer_fires_before_request_timer() {
        let mut timers = TimeoutSet::new(
            None,
            Some(Duration::from_secs(60)),
            Some(Duration::from_secs(1)),
            None,
        );
        timers.arm(TimeoutKind::Request);
        timers.arm(TimeoutKind::Read);
        let token = CancellationToken::new();
        let out = race(&token, &timers, pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::Timeout(TimeoutKind::Read)));
    }

    #[tokio::test(start_paused = true)]
    async fn arm_once_keeps_first_deadline() {
        let mut timers = TimeoutSet::new(None, Some(Duration::from_secs(10)), None, None);
        timers.arm_once(TimeoutKind::Request);
        let first = timers.deadline(TimeoutKind::Request);
        advance(Duration::from_secs(3)).await;
        timers.arm_once(TimeoutKind::Request);
        assert_eq!(timers.deadline(TimeoutKind::Request), first);
        timers.disarm_all();
        assert!(!timers.is_armed(TimeoutKind::Request));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_timer() {
        let mut timers = read_only(Duration::from_millis(1));
        timers.arm(TimeoutKind::Read);
        advance(Duration::from_millis(5)).await;
        let token = CancellationToken::new();
        token.cancel();
        let out = race(&token, &timers, pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::Cancelled));
        assert!(matches!(ClientError::from(out.unwrap_err()), ClientError::Cancelled));
    }
}
