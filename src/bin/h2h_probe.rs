//! Testovací binárka pro H2H scraper
//! Spustit: cargo run --bin h2h-probe -- "Dynamo" "Spartak"

use anyhow::Result;
use h2h_stats::{summarize_rows, H2hStats};
use std::env;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_H2H_BASE: &str = "https://www.flashscorekz.com";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        warn!("Usage: h2h-probe <team1> <team2>");
        return Ok(());
    }
    let (team1, team2) = (&args[1], &args[2]);

    let base = env::var("H2H_BASE_URL").unwrap_or_else(|_| DEFAULT_H2H_BASE.to_string());
    let stats = H2hStats::new(base);

    info!("🔍 Fetching H2H for {} vs {}...", team1, team2);

    let rows = match stats.fetch_rows(team1, team2).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("❌ H2H fetch failed: {}", e);
            return Ok(());
        }
    };

    if rows.is_empty() {
        info!("No H2H rows found.");
        return Ok(());
    }

    for row in &rows {
        info!(
            "  {}:{}  winner: {}",
            row.score.0,
            row.score.1,
            row.winner.as_deref().unwrap_or("draw")
        );
    }

    let summary = summarize_rows(&rows, team1, team2);
    info!(
        "📊 {}: {} wins | {}: {} wins | draws: {}",
        team1, summary.wins_a, team2, summary.wins_b, summary.draws
    );

    Ok(())
}
