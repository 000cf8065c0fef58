//! Testovací binárka pro zrcadla upstreamu
//! Spustit: cargo run --bin mirror-probe
//!
//! Proklepne FEED_HOSTS, stáhne jeden batch z aktivního zrcadla
//! a vypíše eventy které prochází kvalifikačním pásmem kurzů.

use anyhow::Result;
use dotenv::dotenv;
use mirror_resolver::MirrorResolver;
use odds_feed::{FeedMode, OddsFeed};
use signal_engine::normalize_raw;
use std::env;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_FEED_PATH: &str = "/events/list?lang=ru&scopeMarket=2300";
const DEFAULT_HOSTS: &str = "https://line-lb01-w.pb06e2-resources.com";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let hosts: Vec<String> = env::var("FEED_HOSTS")
        .unwrap_or_else(|_| DEFAULT_HOSTS.to_string())
        .split(',')
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    let feed_path = env::var("FEED_PATH").unwrap_or_else(|_| DEFAULT_FEED_PATH.to_string());
    let band_low: f64 = env::var("ODDS_BAND_LOW").ok().and_then(|v| v.parse().ok()).unwrap_or(1.10);
    let band_high: f64 = env::var("ODDS_BAND_HIGH").ok().and_then(|v| v.parse().ok()).unwrap_or(1.40);

    info!("🔍 Probing {} mirror(s)...", hosts.len());

    let resolver = MirrorResolver::new(hosts, feed_path.clone());
    let Some(base_url) = resolver.resolve_active_host().await else {
        warn!("❌ No reachable mirror found.");
        return Ok(());
    };
    info!("✅ Active mirror: {}", base_url);

    let mut feed = OddsFeed::new(FeedMode::JsonApi, feed_path, false);
    let raw_events = match feed.fetch(&base_url).await {
        Ok(events) => events,
        Err(e) => {
            warn!("❌ Fetch against active mirror failed: {}", e);
            return Ok(());
        }
    };

    let mut total = 0usize;
    let mut in_band = Vec::new();
    for raw in &raw_events {
        for event in normalize_raw(raw) {
            total += 1;
            if event.odds >= band_low && event.odds <= band_high {
                in_band.push(event);
            }
        }
    }

    info!("📊 Raw events: {}, normalized outcomes: {}", raw_events.len(), total);
    info!("🎯 In band [{}, {}]: {}", band_low, band_high, in_band.len());

    for event in in_band.iter().take(5) {
        info!(
            "  {} | {} ({}) @ {:.2}",
            event.sport, event.name, event.outcome, event.odds
        );
    }

    Ok(())
}
