//! Session registry: serialized access to per-session agent handles.
//!
//! The registry maps an opaque session key to exactly one live agent
//! connection plus a `tokio::sync::Mutex` guard. Same-key requests serialize
//! on the guard so their messages never interleave inside one conversational
//! context; distinct keys never contend. Idle sessions are evicted by a
//! periodic sweep.
//!
//! Backed by `DashMap`; entries are cloned out as `Arc`s immediately so no
//! `DashMap` guard is ever held across an `.await` point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;

use parley_types::agent::Reply;
use parley_types::error::AgentError;
use parley_types::session::SessionSnapshot;

use crate::client::{AgentConnection, AgentConnector, InterruptHandle};

/// One registry entry: a live connection, its guard, and activity tracking.
pub struct SessionEntry<T> {
    /// The agent connection; the mutex is the session's exclusion guard.
    connection: Mutex<T>,
    /// Interrupt signal, usable without taking the guard.
    interrupt: InterruptHandle,
    created_at: DateTime<Utc>,
    opened: Instant,
    /// Milliseconds since `opened` at the last request, updated atomically
    /// so snapshots and eviction scans never take the guard.
    last_activity: AtomicU64,
}

impl<T> SessionEntry<T> {
    fn new(connection: T, interrupt: InterruptHandle) -> Self {
        Self {
            connection: Mutex::new(connection),
            interrupt,
            created_at: Utc::now(),
            opened: Instant::now(),
            last_activity: AtomicU64::new(0),
        }
    }

    /// Refresh the last-activity stamp.
    fn touch(&self) {
        self.last_activity
            .store(self.opened.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Time elapsed since the last request touched this session.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last)
    }

    /// Whether a request currently holds the guard.
    pub fn in_flight(&self) -> bool {
        self.connection.try_lock().is_err()
    }

    /// When the handle was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn snapshot(&self, key: &str) -> SessionSnapshot {
        SessionSnapshot {
            key: key.to_string(),
            created_at: self.created_at,
            idle_ms: self.idle_for().as_millis() as u64,
            in_flight: self.in_flight(),
        }
    }
}

/// Registry of live agent sessions, indexed by opaque session key.
///
/// At most one entry exists per key; all requests for a key run against the
/// same handle for the session's lifetime. The registry never retries --
/// collaborator errors are surfaced to the caller untouched.
pub struct SessionRegistry<C: AgentConnector> {
    connector: C,
    sessions: DashMap<String, Arc<SessionEntry<C::Connection>>>,
}

impl<C: AgentConnector> SessionRegistry<C> {
    /// Create an empty registry over the given connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sessions: DashMap::new(),
        }
    }

    /// Return the entry for `key`, opening a fresh handle if none exists.
    ///
    /// The connect runs without any map lock held, so two racing callers for
    /// a brand-new key may both open a connection; the insert loser closes
    /// its own and adopts the winner's, preserving one-entry-per-key. A
    /// failed connect leaves no entry behind.
    pub async fn acquire(
        &self,
        key: &str,
    ) -> Result<Arc<SessionEntry<C::Connection>>, AgentError> {
        if let Some(existing) = self.sessions.get(key) {
            let entry = Arc::clone(existing.value());
            drop(existing);
            entry.touch();
            return Ok(entry);
        }

        let connection = self.connector.connect(key).await?;
        let interrupt = connection.interrupt_handle();
        let fresh = Arc::new(SessionEntry::new(connection, interrupt));

        let existing = match self.sessions.entry(key.to_string()) {
            Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&fresh));
                None
            }
        };

        match existing {
            Some(winner) => {
                // Lost the insert race: nobody else can see `fresh`, so the
                // lock below is uncontended.
                let mut connection = fresh.connection.lock().await;
                if let Err(err) = connection.close().await {
                    tracing::debug!(session = %key, error = %err, "closing raced connection failed");
                }
                winner.touch();
                Ok(winner)
            }
            None => {
                tracing::debug!(session = %key, "opened new agent session");
                Ok(fresh)
            }
        }
    }

    /// Send `message` on the session's handle and collect the full reply,
    /// holding the session guard for the whole exchange.
    ///
    /// A second caller for the same key blocks until this exchange finishes;
    /// callers for other keys proceed in parallel. Errors are returned
    /// untouched; an error fatal to the handle (dead process, broken
    /// connection, desynced frame stream) additionally drops the entry so
    /// the next request opens a fresh one.
    pub async fn run_exclusive(&self, key: &str, message: &str) -> Result<Reply, AgentError> {
        let entry = self.acquire(key).await?;

        let mut connection = entry.connection.lock().await;
        entry.touch();

        let result = match connection.send(message).await {
            Ok(()) => connection.receive_reply().await,
            Err(err) => Err(err),
        };
        entry.touch();

        match result {
            Ok(blocks) => {
                drop(connection);
                Ok(Reply {
                    session_key: key.to_string(),
                    blocks,
                })
            }
            Err(err) => {
                if err.is_fatal_to_handle() {
                    // Remove only if the map still points at this entry
                    // (a sweep may already have replaced or dropped it).
                    self.sessions
                        .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
                    if let Err(close_err) = connection.close().await {
                        tracing::debug!(session = %key, error = %close_err, "close after handle failure failed");
                    }
                    tracing::warn!(session = %key, error = %err, "dropped session after handle failure");
                }
                drop(connection);
                Err(err)
            }
        }
    }

    /// Best-effort interrupt of an in-flight reply on `key`.
    ///
    /// Goes through the entry's interrupt handle rather than the guard --
    /// the guard is held by the very request being interrupted. Returns
    /// `false` when no session exists for the key.
    pub fn interrupt(&self, key: &str) -> bool {
        match self.sessions.get(key) {
            Some(entry) => {
                entry.interrupt.raise();
                tracing::debug!(session = %key, "interrupt raised");
                true
            }
            None => false,
        }
    }

    /// Remove and close the session for `key`, waiting for any in-flight
    /// exchange to release the guard first. Returns `false` if absent.
    pub async fn close_session(&self, key: &str) -> bool {
        let Some((_, entry)) = self.sessions.remove(key) else {
            return false;
        };
        let mut connection = entry.connection.lock().await;
        if let Err(err) = connection.close().await {
            tracing::debug!(session = %key, error = %err, "close on session removal failed");
        }
        tracing::info!(session = %key, "session closed");
        true
    }

    /// Evict every session idle for at least `max_idle` whose guard is free.
    ///
    /// Keys currently mid-exchange are skipped and picked up by a later
    /// sweep; the idle-and-unguarded check runs atomically with removal so
    /// an entry is never evicted out from under a request that just reached
    /// it through the map. Returns the number of sessions evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::new();
        for key in stale {
            let removed = self.sessions.remove_if(&key, |_, entry| {
                entry.idle_for() >= max_idle && !entry.in_flight()
            });
            if let Some((key, entry)) = removed {
                evicted.push((key, entry));
            }
        }

        for (key, entry) in &evicted {
            // Close takes the guard: a straggler that cloned the Arc before
            // removal finishes its exchange before the handle goes away.
            let mut connection = entry.connection.lock().await;
            if let Err(err) = connection.close().await {
                tracing::debug!(session = %key, error = %err, "close during eviction failed");
            }
            tracing::info!(session = %key, idle_ms = entry.idle_for().as_millis() as u64, "evicted idle session");
        }

        evicted.len()
    }

    /// Close every session and clear the registry. Used at process exit.
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.sessions.remove(&key) {
                let mut connection = entry.connection.lock().await;
                if let Err(err) = connection.close().await {
                    tracing::debug!(session = %key, error = %err, "close during shutdown failed");
                }
            }
        }
        tracing::info!("session registry shut down");
    }

    /// Snapshot of one session, or `None` if absent. Does not touch activity.
    pub fn snapshot(&self, key: &str) -> Option<SessionSnapshot> {
        self.sessions.get(key).map(|e| e.value().snapshot(key))
    }

    /// Snapshots of all live sessions.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|e| e.value().snapshot(e.key()))
            .collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
