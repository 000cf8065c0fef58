/// ValueScout — Live Odds Signal Observer
///
/// Co dělá:
///   1. Každých ~180s polluje live kurzy z aktivního zrcadla upstreamu
///   2. Eventy v pásmu [1.10, 1.40] skóruje (implied odds + H2H historie)
///   3. Dedup přes signal tracker (TTL 1h), top-2 za cyklus
///   4. Telegram alert pro každý signál, heartbeat když nic neprošlo
///
/// Spuštění:
///   TELEGRAM_BOT_TOKEN=... TELEGRAM_CHAT_ID=... cargo run --bin signal-observer

use anyhow::{Context, Result};
use async_trait::async_trait;
use dotenv::dotenv;
use h2h_stats::H2hStats;
use logger::EventLogger;
use mirror_resolver::MirrorResolver;
use odds_feed::{FeedMode, OddsFeed};
use prediction_engine::Scorer;
use signal_engine::{
    truncate_message, EngineConfig, LiveSource, Notifier, NotifyError, SignalEngine,
};
use std::env;
use std::fs::File;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Pozorovaný deployment: zrcadla sdílí identický path/query kontrakt
const DEFAULT_FEED_PATH: &str = "/events/list?lang=ru&scopeMarket=2300";
const DEFAULT_HOSTS: &str = "https://line-lb01-w.pb06e2-resources.com";
const DEFAULT_H2H_BASE: &str = "https://www.flashscorekz.com";

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} is not set (add it to the environment)"))
}

// ── Telegram notifier ────────────────────────────────────────────────────────

struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: i64,
}

impl TelegramNotifier {
    fn new(token: String, chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token,
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_message(text),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("Telegram sendMessage failed: {} — {}", status, body);
            return Err(NotifyError::Delivery(format!("HTTP {status}")));
        }
        Ok(())
    }
}

fn parse_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!("=== ValueScout Observer — LIVE SIGNAL DETECTION ===");
    info!("Pipeline: mirror resolve → fetch → band filter → score → dedup → top-K notify");
    info!("Logs: ./logs/");

    // Single instance lock
    let lock_file_path = env::temp_dir().join("valuescout_observer.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of signal-observer is already running! Exiting.");
            return Ok(());
        }
    };

    // Konfigurace — čte se jednou při startu
    let cfg = EngineConfig {
        update_interval_secs: env_or("UPDATE_INTERVAL", 180),
        odds_band_low: env_or("ODDS_BAND_LOW", 1.10),
        odds_band_high: env_or("ODDS_BAND_HIGH", 1.40),
        min_probability: env_or("MIN_PROBABILITY", 0.70),
        signal_ttl_secs: env_or("SIGNAL_TTL_SECS", 3600),
        max_signals_per_cycle: env_or("MAX_SIGNALS_PER_CYCLE", 2),
        threshold_before_dedup: env_or("THRESHOLD_BEFORE_DEDUP", false),
        ..EngineConfig::default()
    };

    let hosts = parse_hosts(&env::var("FEED_HOSTS").unwrap_or_else(|_| DEFAULT_HOSTS.to_string()));
    let feed_path = env::var("FEED_PATH").unwrap_or_else(|_| DEFAULT_FEED_PATH.to_string());
    let feed_mode = match env::var("FEED_MODE").as_deref() {
        Ok("html") => FeedMode::StaticHtml,
        _ => FeedMode::JsonApi,
    };
    let render_fallback = env_or("RENDER_FALLBACK", false);

    let token = env_required("TELEGRAM_BOT_TOKEN")?;
    let chat_id: i64 = env_required("TELEGRAM_CHAT_ID")?
        .parse()
        .context("TELEGRAM_CHAT_ID must be a number")?;

    info!("Update interval: {}s", cfg.update_interval_secs);
    info!("Odds band: [{}, {}], threshold {}", cfg.odds_band_low, cfg.odds_band_high, cfg.min_probability);
    info!("Mirrors: {}", hosts.join(", "));

    let feed = OddsFeed::new(feed_mode, feed_path.clone(), render_fallback);
    let mirrors = MirrorResolver::new(hosts, feed_path);
    let notifier = Arc::new(TelegramNotifier::new(token, chat_id));

    // H2H scoring — H2H_BASE_URL= (prázdné) vypne lookup, zůstane odds-only
    let h2h_base = env::var("H2H_BASE_URL").unwrap_or_else(|_| DEFAULT_H2H_BASE.to_string());
    let scorer = if h2h_base.is_empty() {
        info!("H2H lookup disabled, odds-only scoring");
        Scorer::new(None)
    } else {
        Scorer::new(Some(Arc::new(H2hStats::new(h2h_base))))
    };

    let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let mut engine = SignalEngine::new(
        cfg,
        Box::new(LiveSource::new(feed, mirrors)),
        scorer,
        notifier.clone(),
        EventLogger::new(log_dir),
    );

    if let Err(e) = notifier.notify("✅ Signal observer started and watching live odds.").await {
        warn!("startup notify failed: {}", e);
    }

    // Cancellation: ctrl-c → watch kanál → loop se ukončí i uprostřed cyklu
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;

    info!("Shutdown complete.");
    Ok(())
}
