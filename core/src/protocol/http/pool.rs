/*
 * pool.rs
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

//! Connection pool: idle connections keyed by endpoint, bounded per key and globally.
//!
//! All bookkeeping lives behind one mutex that is never held across an await; channels
//! are closed after the lock is released. `acquire` and `release` are the only ways in.
//!
//! Capacity counts idle plus leased connections (a slot reserved for a connect in progress
//! counts as leased). Leases are RAII: a `PooledConnection` or `ConnectSlot` dropped
//! without being released gives its capacity back, so a lease ends exactly once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::http::key::EndpointKey;
use crate::protocol::http::transport::Channel;

/// Pool limits, derived from `ClientConfig`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_per_key: Option<usize>,
    pub max_total: Option<usize>,
    /// `None`: idle connections do not expire by age.
    pub idle_timeout: Option<Duration>,
    pub ttl: Option<Duration>,
    /// Acquires allowed to wait for capacity. 0 fails fast.
    pub max_pending: usize,
    pub dead_ttl: Duration,
}

impl From<&ClientConfig> for PoolConfig {
    fn from(c: &ClientConfig) -> Self {
        Self {
            max_per_key: c.max_connections_per_host,
            max_total: c.max_connections_total,
            idle_timeout: c.pooled_idle_timeout,
            ttl: c.connection_ttl,
            max_pending: c.max_pending_acquires,
            dead_ttl: c.dead_endpoint_ttl,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::from(&ClientConfig::default())
    }
}

impl PoolConfig {
    fn is_expired<C>(&self, entry: &IdleEntry<C>, now: Instant) -> bool {
        self.idle_timeout
            .is_some_and(|idle| now.duration_since(entry.last_used) >= idle)
            || self
                .ttl
                .is_some_and(|ttl| now.duration_since(entry.created) >= ttl)
    }
}

/// Result of `acquire`.
pub enum Acquired<C: Channel> {
    /// An idle connection, now leased.
    Reused(PooledConnection<C>),
    /// Capacity reserved; the caller connects and calls `ConnectSlot::fill`.
    Vacant(ConnectSlot<C>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Stored idle for reuse.
    Pooled,
    /// Destroyed (not reusable, pool closed, endpoint dead, or past its lifetime).
    Closed,
    /// The lease had already ended; the channel was closed and the pool left untouched.
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub leased: usize,
    pub pending: usize,
    pub dead_endpoints: usize,
}

struct IdleEntry<C> {
    channel: C,
    id: u64,
    created: Instant,
    last_used: Instant,
}

struct Partition<C> {
    /// Most recently released last.
    idle: Vec<IdleEntry<C>>,
    leased: usize,
}

impl<C> Partition<C> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            leased: 0,
        }
    }

    fn size(&self) -> usize {
        self.idle.len() + self.leased
    }
}

struct PoolState<C> {
    partitions: HashMap<EndpointKey, Partition<C>>,
    /// Live leases and the key they count against.
    leases: HashMap<u64, EndpointKey>,
    total: usize,
    next_id: u64,
    waiters: VecDeque<oneshot::Sender<()>>,
    dead: HashMap<EndpointKey, Instant>,
    closed: bool,
}

impl<C> PoolState<C> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_dead(&self, key: &EndpointKey, now: Instant, ttl: Duration) -> bool {
        self.dead
            .get(key)
            .is_some_and(|since| now.duration_since(*since) < ttl)
    }

    fn free_leased(&mut self, key: &EndpointKey) {
        if let Some(p) = self.partitions.get_mut(key) {
            p.leased = p.leased.saturating_sub(1);
            if p.size() == 0 {
                self.partitions.remove(key);
            }
        }
        self.total = self.total.saturating_sub(1);
    }

    /// Close the least recently used idle connection of another endpoint.
    fn evict_lru_idle(&mut self, except: &EndpointKey) -> Option<(EndpointKey, C)> {
        let victim = self
            .partitions
            .iter()
            .filter(|(k, p)| *k != except && !p.idle.is_empty())
            .min_by_key(|(_, p)| p.idle[0].last_used)
            .map(|(k, _)| k.clone())?;
        let partition = self.partitions.get_mut(&victim)?;
        let entry = partition.idle.remove(0);
        if partition.size() == 0 {
            self.partitions.remove(&victim);
        }
        self.total = self.total.saturating_sub(1);
        Some((victim, entry.channel))
    }

    /// Capacity changed: every waiter retries.
    fn wake_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

struct PoolShared<C> {
    state: Mutex<PoolState<C>>,
    config: PoolConfig,
}

impl<C> PoolShared<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        // Bookkeeping is consistent at every point a panic could unwind from.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// End a lease whose channel is gone (dropped, detached, or never connected).
    fn forget(&self, lease: u64) {
        let mut state = self.lock();
        if let Some(key) = state.leases.remove(&lease) {
            state.free_leased(&key);
            state.wake_waiters();
            trace!(endpoint = %key, lease, "lease ended without release");
        }
    }
}

enum Attempt<C: Channel> {
    Ready(Acquired<C>),
    Wait(oneshot::Receiver<()>),
    Exhausted,
    Closed,
}

/// Shared handle to the pool. Clones refer to the same pool.
pub struct ConnectionPool<C: Channel> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Channel> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Channel> ConnectionPool<C> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    partitions: HashMap::new(),
                    leases: HashMap::new(),
                    total: 0,
                    next_id: 0,
                    waiters: VecDeque::new(),
                    dead: HashMap::new(),
                    closed: false,
                }),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Lease the most recently released idle connection for `key`, or reserve capacity for
    /// a new one. When the pool is full this waits in the bounded queue, or fails with
    /// `PoolExhausted` if the queue is full or disabled, or with `Closed` once the pool has
    /// been closed. The wait is unbounded here; the
    /// caller races it against its pool-acquire timer.
    pub async fn acquire(&self, key: &EndpointKey) -> Result<Acquired<C>, ClientError> {
        let mut queued = false;
        loop {
            let (attempt, stale) = self.try_acquire(key, queued);
            close_all(stale).await;
            match attempt {
                Attempt::Ready(acquired) => return Ok(acquired),
                Attempt::Exhausted => return Err(ClientError::PoolExhausted),
                Attempt::Closed => return Err(ClientError::Closed),
                Attempt::Wait(rx) => {
                    queued = true;
                    trace!(endpoint = %key, "waiting for pool capacity");
                    // A dropped sender means the pool closed; the next attempt reports it.
                    let _ = rx.await;
                }
            }
        }
    }

    fn try_acquire(&self, key: &EndpointKey, queued: bool) -> (Attempt<C>, Vec<(EndpointKey, C)>) {
        let config = &self.shared.config;
        let now = Instant::now();
        let mut stale = Vec::new();
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.closed {
            return (Attempt::Closed, stale);
        }

        let dead = state.is_dead(key, now, config.dead_ttl);
        let mut reused = None;
        if let Some(partition) = state.partitions.get_mut(key) {
            while let Some(entry) = partition.idle.pop() {
                if dead || config.is_expired(&entry, now) {
                    stale.push((key.clone(), entry.channel));
                    continue;
                }
                partition.leased += 1;
                reused = Some(entry);
                break;
            }
        }
        state.total = state.total.saturating_sub(stale.len());

        if let Some(entry) = reused {
            let lease = state.next_id();
            state.leases.insert(lease, key.clone());
            debug!(endpoint = %key, connection = entry.id, "reusing pooled connection");
            let conn = PooledConnection {
                channel: Some(entry.channel),
                key: key.clone(),
                lease,
                id: entry.id,
                created: entry.created,
                reused: true,
                pool: Arc::downgrade(&self.shared),
            };
            return (Attempt::Ready(Acquired::Reused(conn)), stale);
        }

        let per_key = state.partitions.get(key).map_or(0, Partition::size);
        let key_full = config.max_per_key.is_some_and(|max| per_key >= max);
        let mut total_full = config.max_total.is_some_and(|max| state.total >= max);
        if !key_full && total_full {
            if let Some(victim) = state.evict_lru_idle(key) {
                debug!(endpoint = %victim.0, "closing idle connection to make room for {}", key);
                stale.push(victim);
                total_full = config.max_total.is_some_and(|max| state.total >= max);
            }
        }

        if !key_full && !total_full {
            state
                .partitions
                .entry(key.clone())
                .or_insert_with(Partition::new)
                .leased += 1;
            state.total += 1;
            let lease = state.next_id();
            state.leases.insert(lease, key.clone());
            debug!(endpoint = %key, "reserved pool slot for a new connection");
            let slot = ConnectSlot {
                key: key.clone(),
                lease,
                pool: Arc::downgrade(&self.shared),
                armed: true,
            };
            return (Attempt::Ready(Acquired::Vacant(slot)), stale);
        }

        state.waiters.retain(|w| !w.is_closed());
        if !queued && state.waiters.len() >= config.max_pending {
            debug!(endpoint = %key, per_key, total = state.total, "pool exhausted");
            return (Attempt::Exhausted, stale);
        }
        let (tx, rx) = oneshot::channel();
        if queued {
            state.waiters.push_front(tx);
        } else {
            state.waiters.push_back(tx);
        }
        (Attempt::Wait(rx), stale)
    }

    /// End a lease. A reusable connection goes back to the idle store; anything else is
    /// closed. A lease that already ended is rejected: the channel is closed and the idle
    /// store is not touched.
    pub async fn release(&self, mut conn: PooledConnection<C>, reusable: bool) -> ReleaseOutcome {
        let Some(channel) = conn.channel.take() else {
            return ReleaseOutcome::Rejected;
        };
        let (outcome, to_close) = self.settle(&conn, channel, reusable);
        if let Some(mut channel) = to_close {
            close_quietly(&mut channel, &conn.key).await;
        }
        outcome
    }

    fn settle(&self, conn: &PooledConnection<C>, channel: C, reusable: bool) -> (ReleaseOutcome, Option<C>) {
        let config = &self.shared.config;
        let now = Instant::now();
        let key = &conn.key;
        let mut state = self.shared.lock();
        if state.leases.remove(&conn.lease).is_none() {
            warn!(endpoint = %key, lease = conn.lease, "rejecting release of a lease that already ended");
            return (ReleaseOutcome::Rejected, Some(channel));
        }
        let expired = config
            .ttl
            .is_some_and(|ttl| now.duration_since(conn.created) >= ttl);
        if reusable && !state.closed && !expired && !state.is_dead(key, now, config.dead_ttl) {
            let partition = state
                .partitions
                .entry(key.clone())
                .or_insert_with(Partition::new);
            partition.leased = partition.leased.saturating_sub(1);
            partition.idle.push(IdleEntry {
                channel,
                id: conn.id,
                created: conn.created,
                last_used: now,
            });
            state.wake_waiters();
            debug!(endpoint = %key, connection = conn.id, "connection returned to pool");
            (ReleaseOutcome::Pooled, None)
        } else {
            state.free_leased(key);
            state.wake_waiters();
            debug!(endpoint = %key, connection = conn.id, reusable, "destroying connection");
            (ReleaseOutcome::Closed, Some(channel))
        }
    }

    /// Close idle connections past their idle age or lifetime, and those of dead endpoints.
    /// Returns how many were closed.
    pub async fn evict(&self) -> usize {
        let config = &self.shared.config;
        let now = Instant::now();
        let stale = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state
                .dead
                .retain(|_, since| now.duration_since(*since) < config.dead_ttl);
            let dead: HashSet<EndpointKey> = state.dead.keys().cloned().collect();
            let mut stale = Vec::new();
            for (key, partition) in state.partitions.iter_mut() {
                let is_dead = dead.contains(key);
                let mut kept = Vec::with_capacity(partition.idle.len());
                for entry in partition.idle.drain(..) {
                    if is_dead || config.is_expired(&entry, now) {
                        stale.push((key.clone(), entry.channel));
                    } else {
                        kept.push(entry);
                    }
                }
                partition.idle = kept;
            }
            state.total = state.total.saturating_sub(stale.len());
            state.partitions.retain(|_, p| p.size() > 0);
            if !stale.is_empty() {
                state.wake_waiters();
            }
            stale
        };
        let evicted = stale.len();
        close_all(stale).await;
        if evicted > 0 {
            debug!(evicted, "evicted idle connections");
        }
        evicted
    }

    /// Mark an endpoint dead after a TLS or handshake failure. Its idle connections are
    /// never handed out and go on the next sweep.
    pub fn mark_dead(&self, key: &EndpointKey) {
        debug!(endpoint = %key, "marking endpoint dead");
        self.shared.lock().dead.insert(key.clone(), Instant::now());
    }

    /// Clear a dead mark after a successful connect.
    pub fn mark_alive(&self, key: &EndpointKey) {
        self.shared.lock().dead.remove(key);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        let now = Instant::now();
        PoolStats {
            idle: state.partitions.values().map(|p| p.idle.len()).sum(),
            leased: state.partitions.values().map(|p| p.leased).sum(),
            pending: state.waiters.iter().filter(|w| !w.is_closed()).count(),
            dead_endpoints: state
                .dead
                .values()
                .filter(|since| now.duration_since(**since) < self.shared.config.dead_ttl)
                .count(),
        }
    }

    /// Close every idle connection and refuse further acquires. Leased connections are
    /// closed when they are released.
    pub async fn close(&self) {
        let stale: Vec<(EndpointKey, C)> = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state.closed = true;
            state.waiters.clear();
            state.dead.clear();
            let mut stale = Vec::new();
            for (key, partition) in state.partitions.iter_mut() {
                for entry in partition.idle.drain(..) {
                    stale.push((key.clone(), entry.channel));
                }
            }
            state.total = state.total.saturating_sub(stale.len());
            state.partitions.retain(|_, p| p.size() > 0);
            stale
        };
        close_all(stale).await;
    }

    /// Run `evict` every `interval` until the pool is dropped.
    pub fn spawn_evictor(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                ConnectionPool { shared }.evict().await;
            }
        })
    }
}

async fn close_quietly<C: Channel>(channel: &mut C, key: &EndpointKey) {
    if let Err(e) = channel.close().await {
        warn!(endpoint = %key, error = %e, "error closing connection");
    }
}

async fn close_all<C: Channel>(channels: Vec<(EndpointKey, C)>) {
    for (key, mut channel) in channels {
        close_quietly(&mut channel, &key).await;
    }
}

/// Capacity reserved for a connection being opened. Dropping it unfilled frees the slot.
pub struct ConnectSlot<C: Channel> {
    key: EndpointKey,
    lease: u64,
    pool: Weak<PoolShared<C>>,
    armed: bool,
}

impl<C: Channel> ConnectSlot<C> {
    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    /// Turn the reservation into a leased connection.
    pub fn fill(mut self, channel: C) -> PooledConnection<C> {
        self.armed = false;
        let id = self.pool.upgrade().map_or(0, |p| p.lock().next_id());
        PooledConnection {
            channel: Some(channel),
            key: self.key.clone(),
            lease: self.lease,
            id,
            created: Instant::now(),
            reused: false,
            pool: self.pool.clone(),
        }
    }
}

impl<C: Channel> Drop for ConnectSlot<C> {
    fn drop(&mut self) {
        if self.armed {
            if let Some(pool) = self.pool.upgrade() {
                pool.forget(self.lease);
            }
        }
    }
}

/// A connection leased to exactly one execution.
pub struct PooledConnection<C: Channel> {
    channel: Option<C>,
    key: EndpointKey,
    lease: u64,
    id: u64,
    created: Instant,
    reused: bool,
    pool: Weak<PoolShared<C>>,
}

impl<C: Channel> PooledConnection<C> {
    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True if this lease came from the idle store.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn channel(&self) -> &C {
        self.channel
            .as_ref()
            .unwrap_or_else(|| unreachable!("channel is present until release"))
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.channel
            .as_mut()
            .unwrap_or_else(|| unreachable!("channel is present until release"))
    }

    /// Take the channel out of the pool's accounting for good (protocol upgrade).
    pub fn detach(mut self) -> C {
        let channel = self
            .channel
            .take()
            .unwrap_or_else(|| unreachable!("channel is present until release"));
        if let Some(pool) = self.pool.upgrade() {
            pool.forget(self.lease);
        }
        channel
    }
}

impl<C: Channel> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if self.channel.is_some() {
            if let Some(pool) = self.pool.upgrade() {
                pool.forget(self.lease);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::key::Scheme;
    use crate::protocol::http::transport::ChannelEvent;
    use bytes::Bytes;
    use std::future::Future;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestChannel {
        closed: Arc<AtomicUsize>,
        close_fails: bool,
    }

    impl Channel for TestChannel {
        fn write(&mut self, _data: Bytes) -> impl Future<Output = io::Result<()>> + Send {
            async { Ok(()) }
        }

        fn next_event(&mut self) -> impl Future<Output = io::Result<ChannelEvent>> + Send {
            async { Ok(ChannelEvent::Closed) }
        }

        fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send {
            self.closed.fetch_add(1, Ordering::SeqCst);
            let fails = self.close_fails;
            async move {
                if fails {
                    Err(io::Error::new(io::ErrorKind::NotConnected, "already closed"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn key(host: &str) -> EndpointKey {
        EndpointKey::new(Scheme::Http, host, 80)
    }

    fn pool(config: PoolConfig) -> (ConnectionPool<TestChannel>, Arc<AtomicUsize>) {
        (ConnectionPool::new(config), Arc::new(AtomicUsize::new(0)))
    }

    fn channel(closed: &Arc<AtomicUsize>) -> TestChannel {
        TestChannel {
            closed: Arc::clone(closed),
            close_fails: false,
        }
    }

    fn vacant(a: Acquired<TestChannel>) -> ConnectSlot<TestChannel> {
        match a {
            Acquired::Vacant(slot) => slot,
            Acquired::Reused(_) => panic!("expected a new connection slot"),
        }
    }

    fn reused(a: Acquired<TestChannel>) -> PooledConnection<TestChannel> {
        match a {
            Acquired::Reused(conn) => conn,
            Acquired::Vacant(_) => panic!("expected a pooled connection"),
        }
    }

    async fn open(pool: &ConnectionPool<TestChannel>, k: &EndpointKey, closed: &Arc<AtomicUsize>) -> PooledConnection<TestChannel> {
        vacant(pool.acquire(k).await.unwrap()).fill(channel(closed))
    }

    #[tokio::test]
    async fn per_key_cap_fails_fast_without_queue() {
        let (pool, closed) = pool(PoolConfig {
            max_per_key: Some(3),
            ..PoolConfig::default()
        });
        let k = key("a");
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(open(&pool, &k, &closed).await);
        }
        let ids: HashSet<u64> = held.iter().map(PooledConnection::id).collect();
        assert_eq!(ids.len(), 3);
        assert!(matches!(pool.acquire(&k).await, Err(ClientError::PoolExhausted)));
        assert_eq!(pool.stats().leased, 3);
        // Another endpoint is unaffected by the per-key cap.
        assert!(matches!(pool.acquire(&key("b")).await, Ok(Acquired::Vacant(_))));
    }

    #[tokio::test]
    async fn most_recently_released_is_reused_first() {
        let (pool, closed) = pool(PoolConfig::default());
        let k = key("a");
        let first = open(&pool, &k, &closed).await;
        let second = open(&pool, &k, &closed).await;
        let second_id = second.id();
        assert_eq!(pool.release(first, true).await, ReleaseOutcome::Pooled);
        assert_eq!(pool.release(second, true).await, ReleaseOutcome::Pooled);
        let conn = reused(pool.acquire(&k).await.unwrap());
        assert_eq!(conn.id(), second_id);
        assert!(conn.is_reused());
    }

    #[tokio::test]
    async fn second_release_of_a_lease_is_rejected() {
        let (pool, closed) = pool(PoolConfig::default());
        let k = key("a");
        let conn = open(&pool, &k, &closed).await;
        let forged = PooledConnection {
            channel: Some(channel(&closed)),
            key: k.clone(),
            lease: conn.lease,
            id: conn.id,
            created: conn.created,
            reused: false,
            pool: Arc::downgrade(&pool.shared),
        };
        assert_eq!(pool.release(conn, true).await, ReleaseOutcome::Pooled);
        assert_eq!(pool.release(forged, true).await, ReleaseOutcome::Rejected);
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.leased, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_reusable_release_is_never_handed_out() {
        let (pool, closed) = pool(PoolConfig::default());
        let k = key("a");
        let conn = open(&pool, &k, &closed).await;
        assert_eq!(pool.release(conn, false).await, ReleaseOutcome::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.acquire(&k).await.unwrap(), Acquired::Vacant(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_expire() {
        let (pool, closed) = pool(PoolConfig {
            idle_timeout: Some(Duration::from_secs(10)),
            ..PoolConfig::default()
        });
        let k = key("a");
        let conn = open(&pool, &k, &closed).await;
        pool.release(conn, true).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(pool.acquire(&k).await.unwrap(), Acquired::Vacant(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_idle_timeout_keeps_connections() {
        let (pool, closed) = pool(PoolConfig {
            idle_timeout: None,
            ..PoolConfig::default()
        });
        let k = key("a");
        let conn = open(&pool, &k, &closed).await;
        pool.release(conn, true).await;
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(pool.evict().await, 0);
        assert!(matches!(pool.acquire(&k).await.unwrap(), Acquired::Reused(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_sweeps_expired_and_dead() {
        let (pool, closed) = pool(PoolConfig {
            idle_timeout: Some(Duration::from_secs(10)),
            ..PoolConfig::default()
        });
        let (a, b) = (key("a"), key("b"));
        let ca = open(&pool, &a, &closed).await;
        let cb = open(&pool, &b, &closed).await;
        pool.release(ca, true).await;
        pool.release(cb, true).await;
        assert_eq!(pool.evict().await, 0);

        pool.mark_dead(&b);
        assert_eq!(pool.evict().await, 1);
        assert_eq!(pool.stats().idle, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(pool.evict().await, 1);
        assert_eq!(pool.stats(), PoolStats { dead_endpoints: 1, ..PoolStats::default() });
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_leases_return_capacity() {
        let (pool, closed) = pool(PoolConfig {
            max_per_key: Some(1),
            ..PoolConfig::default()
        });
        let k = key("a");
        let slot = vacant(pool.acquire(&k).await.unwrap());
        drop(slot);
        assert_eq!(pool.stats().leased, 0);
        let conn = open(&pool, &k, &closed).await;
        drop(conn);
        assert_eq!(pool.stats().leased, 0);
        let conn = open(&pool, &k, &closed).await;
        let _channel = conn.detach();
        assert_eq!(pool.stats().leased, 0);
        assert!(matches!(pool.acquire(&k).await.unwrap(), Acquired::Vacant(_)));
    }

    #[tokio::test]
    async fn queued_acquire_is_woken_by_release() {
        let (pool, closed) = pool(PoolConfig {
            max_per_key: Some(1),
            max_pending: 1,
            ..PoolConfig::default()
        });
        let k = key("a");
        let held = open(&pool, &k, &closed).await;

        let waiter = {
            let pool = pool.clone();
            let k = k.clone();
            tokio::spawn(async move { matches!(pool.acquire(&k).await, Ok(Acquired::Reused(_))) })
        };
        while pool.stats().pending == 0 {
            tokio::task::yield_now().await;
        }
        // The queue holds one waiter; the next caller fails fast.
        assert!(matches!(pool.acquire(&k).await, Err(ClientError::PoolExhausted)));

        pool.release(held, true).await;
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn queued_acquire_sees_close() {
        let (pool, closed) = pool(PoolConfig {
            max_per_key: Some(1),
            max_pending: 1,
            ..PoolConfig::default()
        });
        let k = key("a");
        let _held = open(&pool, &k, &closed).await;

        let waiter = {
            let pool = pool.clone();
            let k = k.clone();
            tokio::spawn(async move { matches!(pool.acquire(&k).await, Err(ClientError::Closed)) })
        };
        while pool.stats().pending == 0 {
            tokio::task::yield_now().await;
        }
        pool.close().await;
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn global_cap_closes_idle_connection_of_other_endpoint() {
        let (pool, closed) = pool(PoolConfig {
            max_total: Some(1),
            ..PoolConfig::default()
        });
        let conn = open(&pool, &key("a"), &closed).await;
        pool.release(conn, true).await;
        assert!(matches!(pool.acquire(&key("b")).await.unwrap(), Acquired::Vacant(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn close_failures_are_swallowed() {
        let (pool, closed) = pool(PoolConfig::default());
        let k = key("a");
        let conn = vacant(pool.acquire(&k).await.unwrap()).fill(TestChannel {
            closed: Arc::clone(&closed),
            close_fails: true,
        });
        assert_eq!(pool.release(conn, false).await, ReleaseOutcome::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_pool_refuses_acquires() {
        let (pool, closed) = pool(PoolConfig::default());
        let k = key("a");
        let conn = open(&pool, &k, &closed).await;
        pool.release(conn, true).await;
        pool.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.acquire(&k).await, Err(ClientError::Closed)));
    }
}
