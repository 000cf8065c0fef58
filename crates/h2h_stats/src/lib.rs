//! Flashscore-style H2H scraper s cache a rate limitingem
//!
//! Struktura H2H bloku:
//! <div class="h2h__table">
//!   <div class="h2h__row">
//!     <span class="h2h__participant">Dynamo</span>
//!     <span class="h2h__participant">Spartak</span>
//!     <span class="h2h__result">2:1</span>
//!   </div>
//! </div>
//!
//! Stránka je často JS-rendered — static fetch se zkouší první,
//! headless Chrome jen když selektory nic nenajdou.

use anyhow::{Context, Result};
use async_trait::async_trait;
use prediction_engine::{H2hProvider, H2hSummary};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::task;
use tokio::time::sleep;
use tracing::debug;

/// Kolik posledních vzájemných zápasů se počítá do souhrnu
const H2H_ROW_LIMIT: usize = 8;

/// Cache TTL — klíčový prostor je malý, evikce jen časem
const CACHE_TTL: Duration = Duration::from_secs(3600);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Jedna H2H řádka (pro diagnostiku a probe bin)
#[derive(Debug, Clone, PartialEq)]
pub struct H2hRow {
    pub score: (u32, u32),
    pub winner: Option<String>, // None = remíza nebo nejasný zápis
}

fn score_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2}):(\d{1,2})").unwrap())
}

/// NFKD fold + jen alfanumerika a mezery, lowercase.
/// Stejný tvar jmen drží cache klíče i match řádků na dotazovaná jména.
/// Jména bez ASCII reprezentace (cyrilice) se jen lowercasují.
pub fn normalize_name(name: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    let folded: String = name.nfkd().filter(|c| c.is_ascii()).collect();
    let cleaned: String = folded
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if normalized.is_empty() {
        return name.trim().to_lowercase();
    }
    normalized
}

fn cache_key(team1: &str, team2: &str) -> String {
    format!("{}|{}", normalize_name(team1), normalize_name(team2))
}

// ── HTML parsing ─────────────────────────────────────────────────────────────

/// Vytáhne H2H řádky z dokumentu. Selektory první, regex přes textové
/// bloky jako fallback. Opakované řádky se deduplikují.
pub fn parse_h2h_rows(html: &str, team1: &str, team2: &str, limit: usize) -> Vec<H2hRow> {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("div.h2h__row").unwrap();
    let participant_sel = Selector::parse(".h2h__participant").unwrap();
    let result_sel = Selector::parse(".h2h__result").unwrap();

    let mut rows = Vec::new();
    let mut seen: HashSet<(u32, u32, String)> = HashSet::new();

    for node in document.select(&row_sel) {
        let text = node.text().collect::<String>();
        let Some(cap) = score_pattern().captures(&text) else { continue };
        let a: u32 = cap[1].parse().unwrap_or(0);
        let b: u32 = cap[2].parse().unwrap_or(0);

        let participants: Vec<String> = node
            .select(&participant_sel)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // skóre z dedikovaného elementu má přednost před regexem celé řádky
        let (a, b) = node
            .select(&result_sel)
            .next()
            .and_then(|e| {
                let t = e.text().collect::<String>();
                score_pattern()
                    .captures(&t)
                    .map(|c| (c[1].parse().unwrap_or(0), c[2].parse().unwrap_or(0)))
            })
            .unwrap_or((a, b));

        let (home, away) = match participants.as_slice() {
            [h, aw, ..] => (h.clone(), aw.clone()),
            // bez jmen bereme pořadí dotazu (home = team1)
            _ => (team1.to_string(), team2.to_string()),
        };

        let winner = if a > b {
            Some(home)
        } else if b > a {
            Some(away)
        } else {
            None
        };

        let dedup_key = (a, b, winner.clone().unwrap_or_default());
        if !seen.insert(dedup_key) {
            continue;
        }

        rows.push(H2hRow { score: (a, b), winner });
        if rows.len() >= limit {
            break;
        }
    }

    rows
}

/// Sečte řádky do souhrnu vztaženého k pořadí dotazu (wins_a = team1).
pub fn summarize_rows(rows: &[H2hRow], team1: &str, team2: &str) -> H2hSummary {
    let norm1 = normalize_name(team1);
    let norm2 = normalize_name(team2);
    let mut summary = H2hSummary { wins_a: 0, wins_b: 0, draws: 0 };

    for row in rows {
        match &row.winner {
            None => summary.draws += 1,
            Some(winner) => {
                let w = normalize_name(winner);
                if w == norm1 || w.contains(&norm1) || norm1.contains(&w) {
                    summary.wins_a += 1;
                } else if w == norm2 || w.contains(&norm2) || norm2.contains(&w) {
                    summary.wins_b += 1;
                }
                // vítěz který nesedí ani na jedno jméno se nepočítá
            }
        }
    }

    summary
}

// ── Scraper klient ───────────────────────────────────────────────────────────

pub struct H2hStats {
    client: reqwest::Client,
    base_url: String,
    /// klíč "norm(a)|norm(b)" → (fetched_at, souhrn)
    cache: Mutex<HashMap<String, (Instant, H2hSummary)>>,
    last_request: Mutex<Instant>,
    min_request_interval: Duration,
    last_browser_fetch: Mutex<Instant>,
    min_browser_interval: Duration,
}

impl H2hStats {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".parse().unwrap(),
        );
        headers.insert("Accept-Language", "ru-RU,ru;q=0.8,en-US;q=0.5".parse().unwrap());

        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .default_headers(headers)
                .timeout(Duration::from_secs(15))
                .gzip(true)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
            last_request: Mutex::new(Instant::now() - Duration::from_secs(60)),
            min_request_interval: Duration::from_secs(3),
            last_browser_fetch: Mutex::new(Instant::now() - Duration::from_secs(300)),
            min_browser_interval: Duration::from_secs(6),
        }
    }

    /// H2H souhrn pro dvojici jmen. Cache hit v TTL se vrací rovnou,
    /// miss spustí fetch; selhání nechává cache nedotčenou a vrací None.
    pub async fn get_h2h(&self, team1: &str, team2: &str) -> Option<H2hSummary> {
        let key = cache_key(team1, team2);
        {
            let cache = self.cache.lock().unwrap();
            if let Some((fetched_at, summary)) = cache.get(&key) {
                if fetched_at.elapsed() < CACHE_TTL {
                    return Some(*summary);
                }
            }
        }

        match self.fetch_h2h(team1, team2).await {
            Ok(summary) => {
                self.cache.lock().unwrap().insert(key, (Instant::now(), summary));
                Some(summary)
            }
            Err(e) => {
                debug!("H2H fetch failed for {} vs {}: {}", team1, team2, e);
                None
            }
        }
    }

    /// Plný fetch včetně parsování — pro probe bin vrací i řádky.
    pub async fn fetch_rows(&self, team1: &str, team2: &str) -> Result<Vec<H2hRow>> {
        let url = self.h2h_url(team1, team2);
        let html = self.fetch_html_http(&url).await?;
        let mut rows = parse_h2h_rows(&html, team1, team2, H2H_ROW_LIMIT);

        if rows.is_empty() {
            debug!("static H2H page empty for {}, trying browser", url);
            let html = self.fetch_html_browser(&url).await?;
            rows = parse_h2h_rows(&html, team1, team2, H2H_ROW_LIMIT);
        }

        Ok(rows)
    }

    async fn fetch_h2h(&self, team1: &str, team2: &str) -> Result<H2hSummary> {
        let rows = self.fetch_rows(team1, team2).await?;
        if rows.is_empty() {
            anyhow::bail!("no H2H rows found");
        }
        Ok(summarize_rows(&rows, team1, team2))
    }

    fn h2h_url(&self, team1: &str, team2: &str) -> String {
        let slug = |name: &str| normalize_name(name).replace(' ', "-");
        format!("{}/h2h/{}-vs-{}", self.base_url, slug(team1), slug(team2))
    }

    async fn fetch_html_http(&self, url: &str) -> Result<String> {
        self.wait_for_rate_limit().await;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context(format!("H2H request failed for {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("H2H HTTP {}", status);
        }

        Ok(resp.text().await?)
    }

    async fn fetch_html_browser(&self, url: &str) -> Result<String> {
        {
            let mut last = self.last_browser_fetch.lock().unwrap();
            let elapsed = last.elapsed();
            if elapsed < self.min_browser_interval {
                anyhow::bail!(
                    "Browser fallback cooldown active ({}s remaining)",
                    (self.min_browser_interval - elapsed).as_secs()
                );
            }
            *last = Instant::now();
        }

        let url = url.to_string();
        let html = task::spawn_blocking(move || -> Result<String> {
            use headless_chrome::{Browser, LaunchOptions};

            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .build()
                .context("Failed to build Chrome launch options")?;

            let browser = Browser::new(options).context("Failed to launch Chrome")?;
            let tab = browser.new_tab().context("Failed to create browser tab")?;

            tab.navigate_to(&url).context("Chrome navigate failed")?;
            // H2H blok se dokresluje po loadu; počkej na tabulku, fallback body
            if tab.wait_for_element("div.h2h__table").is_err() {
                tab.wait_for_element("body").context("Chrome wait_for_element failed")?;
            }
            std::thread::sleep(Duration::from_secs(2));

            tab.get_content().context("Failed to read HTML from browser tab")
        })
        .await??;

        Ok(html)
    }

    async fn wait_for_rate_limit(&self) {
        let wait = {
            let last = self.last_request.lock().unwrap();
            let elapsed = last.elapsed();
            if elapsed < self.min_request_interval {
                Some(self.min_request_interval - elapsed)
            } else {
                None
            }
        };
        if let Some(wait) = wait {
            sleep(wait).await;
        }
        *self.last_request.lock().unwrap() = Instant::now();
    }
}

#[async_trait]
impl H2hProvider for H2hStats {
    async fn head_to_head(&self, team1: &str, team2: &str) -> Option<H2hSummary> {
        self.get_h2h(team1, team2).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <div class="h2h__table">
          <div class="h2h__row">
            <span class="h2h__participant">Dynamo</span>
            <span class="h2h__participant">Spartak</span>
            <span class="h2h__result">2:1</span>
          </div>
          <div class="h2h__row">
            <span class="h2h__participant">Spartak</span>
            <span class="h2h__participant">Dynamo</span>
            <span class="h2h__result">0:3</span>
          </div>
          <div class="h2h__row">
            <span class="h2h__participant">Dynamo</span>
            <span class="h2h__participant">Spartak</span>
            <span class="h2h__result">1:1</span>
          </div>
        </div>
    "#;

    #[test]
    fn parses_rows_and_winners() {
        let rows = parse_h2h_rows(SAMPLE, "Dynamo", "Spartak", 8);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].score, (2, 1));
        assert_eq!(rows[0].winner.as_deref(), Some("Dynamo"));
        // druhá řádka má prohozené strany — vítěz je away
        assert_eq!(rows[1].score, (0, 3));
        assert_eq!(rows[1].winner.as_deref(), Some("Dynamo"));
        assert_eq!(rows[2].winner, None);
    }

    #[test]
    fn summarize_counts_by_query_order() {
        let rows = parse_h2h_rows(SAMPLE, "Dynamo", "Spartak", 8);
        let summary = summarize_rows(&rows, "Dynamo", "Spartak");
        assert_eq!(summary, H2hSummary { wins_a: 2, wins_b: 0, draws: 1 });
        // obrácený dotaz obrací i strany
        let summary = summarize_rows(&rows, "Spartak", "Dynamo");
        assert_eq!(summary, H2hSummary { wins_a: 0, wins_b: 2, draws: 1 });
    }

    #[test]
    fn rows_without_participants_use_query_order() {
        let html = r#"
            <div class="h2h__row">12.03.2024  4:2</div>
            <div class="h2h__row">01.11.2023  1:2</div>
        "#;
        let rows = parse_h2h_rows(html, "Alpha", "Beta", 8);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].winner.as_deref(), Some("Alpha"));
        assert_eq!(rows[1].winner.as_deref(), Some("Beta"));
    }

    #[test]
    fn duplicate_rows_collapse_and_limit_applies() {
        let html = r#"
            <div class="h2h__row">3:1</div>
            <div class="h2h__row">3:1</div>
            <div class="h2h__row">2:0</div>
            <div class="h2h__row">1:0</div>
        "#;
        let rows = parse_h2h_rows(html, "A", "B", 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].score, (3, 1));
        assert_eq!(rows[1].score, (2, 0));
    }

    #[test]
    fn normalize_folds_accents_and_case() {
        assert_eq!(normalize_name("  Viktoria Plzeň  "), "viktoria plzen");
        assert_eq!(normalize_name("FC Køben-havn!"), "fc kbenhavn");
        assert_eq!(normalize_name("REAL  MADRID"), "real madrid");
        // cyrilice nemá ASCII fold — drží se aspoň lowercase
        assert_eq!(normalize_name("Динамо"), "динамо");
    }

    #[test]
    fn cache_key_is_order_sensitive() {
        assert_ne!(cache_key("A", "B"), cache_key("B", "A"));
        assert_eq!(cache_key("Team A", "team a"), cache_key("TEAM A", "Team A"));
    }
}
