//! Session registry and aggregate statistics.
//!
//! The registry maps session ids to live session handles. Only the
//! acceptor inserts and only a session's own driver removes; everything
//! else takes the read path for stats iteration and shutdown.

use crate::ws::session::SessionHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// How often aggregate statistics are logged while sessions are active.
pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
    sessions_total: AtomicU64,
    bytes_from_clients: AtomicU64,
    bytes_to_clients: AtomicU64,
    conversions: AtomicU64,
    transport_errors: AtomicU64,
}

/// A point-in-time view of the registry, also served from `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active_sessions: u64,
    pub sessions_total: u64,
    pub bytes_from_clients: u64,
    pub bytes_to_clients: u64,
    pub conversions: u64,
    pub transport_errors: u64,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Arc<SessionHandle>) {
        self.sessions.write().await.insert(session.id, session);
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn active(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Folds a finished session's counters into the global totals.
    ///
    /// Call exactly once per session, after it has been removed, so the
    /// snapshot never counts the same bytes twice.
    pub fn absorb(&self, session: &SessionHandle) {
        let totals = session.totals();
        self.bytes_from_clients
            .fetch_add(totals.bytes_from_client, Ordering::Relaxed);
        self.bytes_to_clients
            .fetch_add(totals.bytes_to_client, Ordering::Relaxed);
        self.conversions
            .fetch_add(totals.conversions, Ordering::Relaxed);
        self.transport_errors
            .fetch_add(totals.transport_errors, Ordering::Relaxed);
    }

    /// Aggregate view: finished-session totals plus live session counters.
    pub async fn snapshot(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let mut stats = RegistryStats {
            active_sessions: sessions.len() as u64,
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            bytes_from_clients: self.bytes_from_clients.load(Ordering::Relaxed),
            bytes_to_clients: self.bytes_to_clients.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        };
        for session in sessions.values() {
            let totals = session.totals();
            stats.bytes_from_clients += totals.bytes_from_client;
            stats.bytes_to_clients += totals.bytes_to_client;
            stats.conversions += totals.conversions;
            stats.transport_errors += totals.transport_errors;
        }
        stats
    }

    /// Signals close to every active session. Their drivers perform the
    /// actual teardown and removal.
    pub async fn close_all(&self, reason: &str) {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.close(reason);
        }
    }
}

/// Logs the aggregate snapshot every 30 s while any session is active.
pub fn spawn_stats_reporter(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = registry.snapshot().await;
            if stats.active_sessions > 0 {
                log_stats(&stats, "Bridge statistics");
            }
        }
    })
}

pub fn log_stats(stats: &RegistryStats, message: &str) {
    info!(
        active_sessions = stats.active_sessions,
        sessions_total = stats.sessions_total,
        bytes_from_clients = stats.bytes_from_clients,
        bytes_to_clients = stats.bytes_to_clients,
        conversions = stats.conversions,
        transport_errors = stats.transport_errors,
        "{message}"
    );
}
