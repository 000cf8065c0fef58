/// ValueScout — Odds Feed
///
/// Source adapter pro live kurzy. Tři varianty:
///   - JsonApi:      JSON endpoint (PARI-style `/events/list?...`)
///   - StaticHtml:   lightweight scraping přes CSS selektory
///   - RenderedHtml: headless Chrome fallback — jen když static fetch
///                   nevrátí žádný event (rendering je drahý, last resort)
///
/// Per-request timeout 15s, browser-like User-Agent kvůli anti-bot ochranám.
/// Jednotlivé vadné eventy se přeskakují; chybou končí jen top-level fetch.

use anyhow::Context;
use odds_extractor::RawPayload;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Klíče pod kterými upstream schovává seznam eventů
const EVENT_LIST_KEYS: [&str; 4] = ["sports", "events", "data", "result"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream HTTP {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Parse(String),
    #[error("render fallback failed: {0}")]
    Render(String),
}

/// Který adapter event vyprodukoval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    JsonApi,
    StaticHtml,
    RenderedHtml,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::JsonApi => "json_api",
            SourceKind::StaticHtml => "static_html",
            SourceKind::RenderedHtml => "rendered_html",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    JsonApi,
    StaticHtml,
}

/// Jeden syrový event před normalizací. Zahazuje se hned po extrakci kurzů.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub source: SourceKind,
    pub sport: String,
    pub id: Option<String>,
    pub name: String,
    pub link: Option<String>,
    /// Upstream stav ("live", "finished", ...) — pro settlement tracking
    pub status: Option<String>,
    pub payload: RawPayload,
}

pub struct OddsFeed {
    client: reqwest::Client,
    mode: FeedMode,
    feed_path: String,
    render_fallback: bool,
    last_render: Instant,
    min_render_interval: Duration,
}

impl OddsFeed {
    pub fn new(mode: FeedMode, feed_path: impl Into<String>, render_fallback: bool) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            "text/html,application/json,application/xhtml+xml,*/*;q=0.8".parse().unwrap(),
        );
        headers.insert("Accept-Language", "ru-RU,ru;q=0.8,en-US;q=0.5".parse().unwrap());
        headers.insert("Connection", "keep-alive".parse().unwrap());

        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .default_headers(headers)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            mode,
            feed_path: feed_path.into(),
            render_fallback,
            last_render: Instant::now() - Duration::from_secs(300),
            min_render_interval: Duration::from_secs(60),
        }
    }

    /// Top-level fetch proti aktivnímu hostu. Chyba zde = backoff v scheduleru.
    pub async fn fetch(&mut self, base_url: &str) -> Result<Vec<RawEvent>, FetchError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.feed_path);
        match self.mode {
            FeedMode::JsonApi => self.fetch_json(&url).await,
            FeedMode::StaticHtml => {
                let html = self.fetch_html_http(&url).await?;
                let events = parse_events_html(&html, &url, SourceKind::StaticHtml);
                if !events.is_empty() || !self.render_fallback {
                    return Ok(events);
                }
                // Static fetch bez výsledků → zkus rendered page (s cooldownem).
                // Selhání fallbacku neshazuje cyklus, static výsledek platí.
                warn!("static fetch yielded 0 events, trying rendered fallback for {}", url);
                match self.fetch_html_browser(&url).await {
                    Ok(html) => Ok(parse_events_html(&html, &url, SourceKind::RenderedHtml)),
                    Err(e) => {
                        warn!("rendered fallback failed: {}", e);
                        Ok(events)
                    }
                }
            }
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Vec<RawEvent>, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        let data: Value = serde_json::from_str(&body).map_err(|e| {
            let head: String = body.chars().take(120).collect();
            FetchError::Parse(format!("{e}: {head}"))
        })?;
        Ok(parse_events_json(&data, url))
    }

    async fn fetch_html_http(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }

    async fn fetch_html_browser(&mut self, url: &str) -> Result<String, FetchError> {
        let elapsed = self.last_render.elapsed();
        if elapsed < self.min_render_interval {
            return Err(FetchError::Render(format!(
                "browser cooldown active ({}s remaining)",
                (self.min_render_interval - elapsed).as_secs()
            )));
        }
        self.last_render = Instant::now();

        let url = url.to_string();
        let html = task::spawn_blocking(move || -> anyhow::Result<String> {
            use headless_chrome::{Browser, LaunchOptions};

            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .build()
                .context("Failed to build Chrome launch options")?;

            let browser = Browser::new(options).context("Failed to launch Chrome")?;
            let tab = browser.new_tab().context("Failed to create browser tab")?;

            tab.navigate_to(&url).context("Chrome navigate failed")?;
            tab.wait_for_element("body").context("Chrome wait_for_element(body) failed")?;
            std::thread::sleep(Duration::from_secs(2));

            tab.get_content().context("Failed to read HTML from browser tab")
        })
        .await
        .map_err(|e| FetchError::Render(e.to_string()))?
        .map_err(|e| FetchError::Render(e.to_string()))?;

        Ok(html)
    }
}

// ── JSON parsing ─────────────────────────────────────────────────────────────

/// Najde seznam eventů pod konvenčním klíčem a normalizuje obě známé podoby:
/// `sports[].events[]` (PARI live) i plochý seznam s `team1`/`team2`.
pub fn parse_events_json(data: &Value, source_url: &str) -> Vec<RawEvent> {
    let mut out = Vec::new();

    let list = EVENT_LIST_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(|v| v.as_array()).map(|a| (*key, a)));

    let Some((key, items)) = list else {
        debug!("no event list under conventional keys in payload from {}", source_url);
        return out;
    };

    for item in items {
        // sport kontejner s vlastním seznamem eventů
        if let Some(events) = item.get("events").and_then(|v| v.as_array()) {
            let sport = item
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            for ev in events {
                if let Some(raw) = raw_event_from_json(ev, &sport, source_url) {
                    out.push(raw);
                }
            }
        } else if let Some(raw) = raw_event_from_json(item, "", source_url) {
            out.push(raw);
        } else {
            debug!("skipping malformed event under '{}' key", key);
        }
    }

    out
}

fn raw_event_from_json(ev: &Value, sport_hint: &str, source_url: &str) -> Option<RawEvent> {
    if !ev.is_object() {
        return None;
    }

    let id = match ev.get("id") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    let name = match ev.get("name").and_then(|v| v.as_str()) {
        Some(s) => s.to_string(),
        None => {
            let t1 = ev.get("team1").and_then(|v| v.as_str());
            let t2 = ev.get("team2").and_then(|v| v.as_str());
            match (t1, t2) {
                (Some(a), Some(b)) => format!("{a} - {b}"),
                _ => return None, // bez názvu není co notifikovat
            }
        }
    };

    let sport = if !sport_hint.is_empty() {
        sport_hint.to_string()
    } else {
        ev.get("sport")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ev.get("sportId").map(|v| format!("sport_{v}")))
            .unwrap_or_else(|| "unknown".to_string())
    };

    let link = id.as_ref().map(|id| {
        let base = source_url.split('/').take(3).collect::<Vec<_>>().join("/");
        format!("{base}/event/{id}")
    });

    let status = ["status", "state", "result"]
        .iter()
        .find_map(|k| ev.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string);

    Some(RawEvent {
        source: SourceKind::JsonApi,
        sport,
        id,
        name,
        link,
        status,
        payload: RawPayload::Json(ev.clone()),
    })
}

// ── HTML parsing ─────────────────────────────────────────────────────────────

/// CSS-selector heuristiky — zkouší známé podoby řádku s eventem.
/// Chybějící uzly se přeskakují, nikdy panic.
pub fn parse_events_html(html: &str, page_url: &str, kind: SourceKind) -> Vec<RawEvent> {
    let document = Html::parse_document(html);

    let row_selectors = ["div.event-row", "div.sport-event", "tr.event", "a.match-item"];
    let name_selectors = [".event-name", ".teams", ".match-item-vs-team-name", ".team-name"];
    let odds_selectors = [".odds", ".odd", ".coef", ".factor-value"];

    let mut out = Vec::new();

    for row_sel in row_selectors {
        let Ok(rows) = Selector::parse(row_sel) else { continue };
        for row in document.select(&rows) {
            let name = name_selectors.iter().find_map(|sel| {
                let sel = Selector::parse(sel).ok()?;
                let parts: Vec<String> = row
                    .select(&sel)
                    .map(|e| e.text().collect::<String>().trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() { None } else { Some(parts.join(" - ")) }
            });
            let Some(name) = name else { continue };

            // Text s kurzy — buď dedikované elementy, nebo celý řádek
            let odds_text = odds_selectors
                .iter()
                .find_map(|sel| {
                    let sel = Selector::parse(sel).ok()?;
                    let parts: Vec<String> = row
                        .select(&sel)
                        .map(|e| e.text().collect::<String>().trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if parts.is_empty() { None } else { Some(parts.join(" ")) }
                })
                .unwrap_or_else(|| row.text().collect::<String>());

            let link = row
                .value()
                .attr("href")
                .map(|href| absolutize(page_url, href));

            out.push(RawEvent {
                source: kind,
                sport: "unknown".to_string(),
                id: None,
                name,
                link,
                status: None,
                payload: RawPayload::Text(odds_text),
            });
        }
        if !out.is_empty() {
            break;
        }
    }

    out
}

fn absolutize(page_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        let base = page_url.split('/').take(3).collect::<Vec<_>>().join("/");
        format!("{base}{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_sports_container_shape() {
        let data = json!({
            "sports": [{
                "name": "Table Tennis",
                "events": [
                    { "id": 101, "name": "Ivanov - Petrov",
                      "markets": [{ "outcomes": [{ "name": "W1", "odd": 1.25 }] }] },
                    { "id": 102, "name": "Li - Chen" },
                ],
            }],
        });
        let events = parse_events_json(&data, "https://host.example/events/list");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sport, "Table Tennis");
        assert_eq!(events[0].id.as_deref(), Some("101"));
        assert_eq!(events[0].link.as_deref(), Some("https://host.example/event/101"));
    }

    #[test]
    fn parses_flat_events_with_team_fields() {
        let data = json!({
            "events": [
                { "id": "e7", "team1": "Alpha", "team2": "Beta", "sportId": 40,
                  "status": "live" },
            ],
        });
        let events = parse_events_json(&data, "https://host.example/events/list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Alpha - Beta");
        assert_eq!(events[0].sport, "sport_40");
        assert_eq!(events[0].status.as_deref(), Some("live"));
    }

    #[test]
    fn missing_keys_are_skipped_not_fatal() {
        let data = json!({ "events": [ { "id": 1 }, 42, { "name": "Ok - Event" } ] });
        let events = parse_events_json(&data, "https://host.example/x");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Ok - Event");
    }

    #[test]
    fn no_conventional_key_is_empty() {
        let data = json!({ "stuff": [] });
        assert!(parse_events_json(&data, "https://host.example/x").is_empty());
    }

    #[test]
    fn html_rows_parsed_via_selectors() {
        let html = r#"
            <html><body>
              <div class="event-row">
                <span class="event-name">Dynamo - Spartak</span>
                <span class="coef">1,18</span>
              </div>
              <div class="event-row">
                <span class="coef">2.30</span>
              </div>
            </body></html>
        "#;
        let events = parse_events_html(html, "https://book.example/live", SourceKind::StaticHtml);
        // druhý řádek nemá jméno → přeskočen
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Dynamo - Spartak");
        match &events[0].payload {
            RawPayload::Text(t) => assert!(t.contains("1,18")),
            _ => panic!("expected text payload"),
        }
    }

    #[test]
    fn html_match_item_shape() {
        let html = r#"
            <a class="match-item" href="/match/555">
              <div class="match-item-vs-team-name">NaVi</div>
              <div class="match-item-vs-team-name">FaZe</div>
              <div class="odd">1.31</div>
            </a>
        "#;
        let events = parse_events_html(html, "https://scores.example/live", SourceKind::RenderedHtml);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "NaVi - FaZe");
        assert_eq!(events[0].link.as_deref(), Some("https://scores.example/match/555"));
        assert_eq!(events[0].source, SourceKind::RenderedHtml);
    }
}
