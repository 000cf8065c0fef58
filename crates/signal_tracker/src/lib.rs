/// ValueScout — Signal Tracker
/// Dedup notifikovaných signálů + TTL expirace + settlement marking.
/// Mapu vlastní výhradně tracker; scheduler ji dostává by reference.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Default TTL — po hodině je stejný uid znovu eligible
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// Upstream stavy které znamenají ukončený zápas
const TERMINAL_STATUSES: [&str; 5] = ["finished", "ended", "resolved", "closed", "result"];

#[derive(Debug, Clone, Serialize)]
pub struct TrackedSignal {
    pub odds: f64,
    pub participants: String,
    pub link: String,
    pub sent_at: DateTime<Utc>,
    pub settled: bool,
}

pub struct SignalTracker {
    signals: HashMap<String, TrackedSignal>,
    ttl_secs: i64,
}

impl SignalTracker {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            signals: HashMap::new(),
            ttl_secs,
        }
    }

    /// uid v trackeru = už notifikováno, znovu až po expiraci
    pub fn is_new(&self, uid: &str) -> bool {
        !self.signals.contains_key(uid)
    }

    pub fn record(&mut self, uid: impl Into<String>, signal: TrackedSignal) {
        self.signals.insert(uid.into(), signal);
    }

    /// Best-effort settlement: flipne `settled` když upstream nahlásí
    /// terminální stav. Bez reportu entry prostě vyexpiruje unsettled.
    pub fn mark_settled_if_reported(&mut self, uid: &str, status: &str) -> bool {
        if !is_terminal_status(status) {
            return false;
        }
        match self.signals.get_mut(uid) {
            Some(signal) if !signal.settled => {
                signal.settled = true;
                debug!("signal {} settled with status '{}'", uid, status);
                true
            }
            _ => false,
        }
    }

    /// Odstraní entry starší než TTL. Musí běžet na začátku cyklu,
    /// před dedup checkem — právě vyexpirovaný uid je hned eligible.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl_secs;
        let before = self.signals.len();
        self.signals.retain(|_, s| (now - s.sent_at).num_seconds() <= ttl);
        let removed = before - self.signals.len();
        if removed > 0 {
            debug!("swept {} expired signals", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&TrackedSignal> {
        self.signals.get(uid)
    }
}

pub fn is_terminal_status(status: &str) -> bool {
    let s = status.to_lowercase();
    TERMINAL_STATUSES.iter().any(|t| s == *t)
}
