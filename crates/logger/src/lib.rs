/// ValueScout — Logger
/// JSONL event stream

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct SignalAlertEvent {
    pub ts:          String,
    pub event:       &'static str,   // "SIGNAL_ALERT"
    pub sport:       String,
    pub teams:       String,
    pub outcome:     String,
    pub odds:        f64,            // decimal
    pub probability: f64,            // 0.0–1.0
    pub link:        String,
    pub uid:         String,
}

#[derive(Serialize, Debug)]
pub struct ApiStatusEvent {
    pub ts:          String,
    pub event:       &'static str,   // "API_STATUS"
    pub source:      String,         // "json_api" | "static_html" | "rendered_html" | "h2h" | "mirror"
    pub ok:          bool,
    pub status_code: Option<u16>,
    pub message:     String,
    pub items:       usize,
}

#[derive(Serialize, Debug)]
pub struct SystemHeartbeatEvent {
    pub ts:             String,
    pub event:          &'static str,   // "SYSTEM_HEARTBEAT"
    pub cycle:          u64,
    pub events_seen:    usize,
    pub candidates:     usize,
    pub signals_sent:   usize,
    pub tracked_active: usize,
    pub active_host:    Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SignalSettledEvent {
    pub ts:     String,
    pub event:  &'static str,   // "SIGNAL_SETTLED"
    pub uid:    String,
    pub status: String,
}
