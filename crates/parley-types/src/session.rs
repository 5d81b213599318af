//! Read-only session views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one registry entry.
///
/// Snapshots are taken without touching the session's guard or activity
/// stamp, so listing sessions never perturbs eviction timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Opaque caller-chosen session key.
    pub key: String,
    /// When the handle was opened.
    pub created_at: DateTime<Utc>,
    /// Milliseconds since the last request touched this session.
    pub idle_ms: u64,
    /// Whether a request currently holds the session's guard.
    pub in_flight: bool,
}
