//! Prediction Engine pro win-probability kandidátů
//! Heuristika místo AI/ML - implied probability z kurzu + H2H historie

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Váha H2H složky vs implied probability ve smíšeném skóre
const H2H_WEIGHT: f64 = 0.6;
const IMPLIED_WEIGHT: f64 = 0.4;

/// Nikdy nehlásíme jistotu
const MAX_PROBABILITY: f64 = 0.99;

/// Souhrn head-to-head historie dvou účastníků.
/// `wins_a` patří prvnímu jménu v dotazu, `wins_b` druhému.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct H2hSummary {
    pub wins_a: u32,
    pub wins_b: u32,
    pub draws: u32,
}

impl H2hSummary {
    pub fn total(&self) -> u32 {
        self.wins_a + self.wins_b + self.draws
    }
}

/// Zdroj H2H dat. None = lookup selhal nebo data nejsou — scoring
/// tiše spadne na odds-only cestu, nikdy to není chyba.
#[async_trait]
pub trait H2hProvider: Send + Sync {
    async fn head_to_head(&self, team1: &str, team2: &str) -> Option<H2hSummary>;
}

fn separator_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "A vs B", "A - B", "A @ B" — pomlčka jen s mezerami okolo,
    // aby se nerozpadla jména typu "Al-Ahli"
    RE.get_or_init(|| Regex::new(r"\s+(?i:vs)\.?\s+|\s+[-–—@]\s+").unwrap())
}

/// Rozdělí free-text label eventu na dvojici účastníků.
pub fn split_participants(name: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = separator_pattern()
        .split(name)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        Some((parts[0].to_string(), parts[1].to_string()))
    } else {
        None
    }
}

/// Odds-only heuristika: monotónně klesající od 1.1, krátké kurzy
/// historicky znamenají silné favority. Mimo pásmo [1.05, 1.4] nula.
pub fn odds_only_score(odds: f64) -> f64 {
    if (1.05..=1.4).contains(&odds) {
        (0.9 - (odds - 1.1) * 0.8).max(0.7)
    } else {
        0.0
    }
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(0.0, MAX_PROBABILITY)
}

/// Scorer kandidátů — mix implied probability a H2H historie.
pub struct Scorer {
    provider: Option<Arc<dyn H2hProvider>>,
}

impl Scorer {
    pub fn new(provider: Option<Arc<dyn H2hProvider>>) -> Self {
        Self { provider }
    }

    /// Odhad pravděpodobnosti výhry sledovaného outcome, vždy v [0.0, 0.99].
    /// Deterministický pro stejné vstupy a stav cache; nikdy neselže.
    pub async fn score(&self, event_name: &str, odds: f64) -> f64 {
        let implied = if odds > 0.0 { 1.0 / odds } else { 0.5 };

        if let (Some(provider), Some((team1, team2))) =
            (&self.provider, split_participants(event_name))
        {
            if let Some(h2h) = provider.head_to_head(&team1, &team2).await {
                let total = h2h.total().max(1) as f64;
                let favorite_ratio = h2h.wins_a.max(h2h.wins_b) as f64 / total;
                let prob = H2H_WEIGHT * favorite_ratio + IMPLIED_WEIGHT * implied;
                debug!(
                    "H2H score for '{}': ratio={:.2} implied={:.2} -> {:.2}",
                    event_name, favorite_ratio, implied, prob
                );
                return clamp_probability(prob);
            }
        }

        clamp_probability(odds_only_score(odds))
    }
}
