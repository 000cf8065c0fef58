//! Signal Engine — jeden fetch→score→notify cyklus za interval
//!
//! Pipeline cyklu:
//!   sweep expired → resolve host → fetch → extract → settlement check
//!   → odds band filter → score → dedup → threshold → top-K → notify+record
//!
//! Chyby fetchů/hostů eskalují do BACKOFF stavu (floor 5s, ×2, cap 300s);
//! všechno ostatní se chytá co nejúžeji — jeden vadný event nikdy
//! neshodí celý cyklus. Loop běží dokud nepřijde cancellation.

use async_trait::async_trait;
use chrono::Utc;
use logger::{now_iso, ApiStatusEvent, EventLogger, SignalAlertEvent, SignalSettledEvent, SystemHeartbeatEvent};
use mirror_resolver::MirrorResolver;
use odds_feed::{FetchError, OddsFeed, RawEvent, SourceKind};
use prediction_engine::{split_participants, Scorer};
use signal_tracker::{SignalTracker, TrackedSignal};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

/// Limit transportu — delší text notifieru ořezáváme
pub const MESSAGE_LIMIT: usize = 4000;

// ── Konfigurace ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval mezi úspěšnými cykly (sekundy)
    pub update_interval_secs: u64,
    /// Kvalifikační pásmo kurzů, obě meze včetně
    pub odds_band_low: f64,
    pub odds_band_high: f64,
    /// Minimální odhadnutá pravděpodobnost pro notifikaci
    pub min_probability: f64,
    /// TTL notifikovaného signálu v trackeru
    pub signal_ttl_secs: i64,
    /// Top-K výběr — max notifikací za cyklus
    pub max_signals_per_cycle: usize,
    /// Pozorované varianty se liší pořadím threshold vs dedup filtru;
    /// obojí je validní konfigurace, default = dedup první
    pub threshold_before_dedup: bool,
    pub backoff_floor_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 180,
            odds_band_low: 1.10,
            odds_band_high: 1.40,
            min_probability: 0.70,
            signal_ttl_secs: 3600,
            max_signals_per_cycle: 2,
            threshold_before_dedup: false,
            backoff_floor_secs: 5,
            backoff_cap_secs: 300,
        }
    }
}

// ── Datový model ─────────────────────────────────────────────────────────────

/// Normalizovaný event — jeden sledovaný outcome s kurzem
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub sport: String,
    pub name: String,
    pub participants: Option<(String, String)>,
    pub outcome: String,
    pub odds: f64,
    /// None = upstream nedal event-specifický odkaz, zobrazí se source page
    pub link: Option<String>,
    pub source: SourceKind,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub event: Event,
    pub probability: f64,
    pub uid: String,
}

/// Stabilní dedup klíč: event-specifický link, jinak název + kurz
/// na dvě desetinná místa.
pub fn event_uid(event: &Event) -> String {
    match &event.link {
        Some(link) if !link.is_empty() => link.clone(),
        _ => format!("{}|{:.2}", event.name, event.odds),
    }
}

/// Rozbalí raw event na normalizované eventy — jeden na každý
/// nalezený kurz. Eventy bez parsovatelného kurzu mizí tady.
pub fn normalize_raw(raw: &RawEvent) -> Vec<Event> {
    odds_extractor::extract(&raw.payload)
        .into_iter()
        .map(|(outcome, odds)| Event {
            id: raw
                .id
                .clone()
                .unwrap_or_else(|| format!("{}|{:.2}", raw.name, odds)),
            sport: raw.sport.clone(),
            name: raw.name.clone(),
            participants: split_participants(&raw.name),
            outcome,
            odds,
            link: raw.link.clone(),
            source: raw.source,
            status: raw.status.clone(),
        })
        .collect()
}

// ── Notifier seam ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Externí kolaborátor. Implementace musí ořezat text na MESSAGE_LIMIT
/// a nikdy nepanikařit — selhání se vrací jako NotifyError a engine
/// ho jen zaloguje.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Char-safe ořez na limit transportu (Telegram 4096, držíme 4000)
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MESSAGE_LIMIT - 3).collect();
    out.push_str("...");
    out
}

// ── Event source seam ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no reachable mirror")]
    NoHost,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub struct SourceBatch {
    pub events: Vec<RawEvent>,
    /// Base URL aktivního hostu — fallback pro linky a heartbeat log
    pub base_url: String,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&mut self) -> Result<SourceBatch, CycleError>;
}

/// Produkční source: mirror resolve → feed fetch, invalidace při selhání.
pub struct LiveSource {
    feed: OddsFeed,
    mirrors: MirrorResolver,
}

impl LiveSource {
    pub fn new(feed: OddsFeed, mirrors: MirrorResolver) -> Self {
        Self { feed, mirrors }
    }
}

#[async_trait]
impl EventSource for LiveSource {
    async fn fetch_events(&mut self) -> Result<SourceBatch, CycleError> {
        let Some(host) = self.mirrors.resolve_active_host().await else {
            return Err(CycleError::NoHost);
        };
        match self.feed.fetch(&host).await {
            Ok(events) => Ok(SourceBatch { events, base_url: host }),
            Err(e) => {
                // aktivní host neodpovídá — příští cyklus proběhne re-probe
                self.mirrors.invalidate();
                Err(CycleError::Fetch(e))
            }
        }
    }
}

// ── Backoff ──────────────────────────────────────────────────────────────────

/// Exponenciální backoff: první selhání spí floor, každé další ×2, cap 300s.
/// Úspěšný cyklus resetuje na floor.
#[derive(Debug)]
pub struct Backoff {
    current: u64,
    floor: u64,
    cap: u64,
}

impl Backoff {
    pub fn new(floor: u64, cap: u64) -> Self {
        Self { current: floor, floor, cap }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        Duration::from_secs(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CycleReport {
    pub events_seen: usize,
    pub candidates: usize,
    pub signals_sent: usize,
}

pub struct SignalEngine {
    cfg: EngineConfig,
    source: Box<dyn EventSource>,
    scorer: Scorer,
    tracker: SignalTracker,
    notifier: Arc<dyn Notifier>,
    logger: EventLogger,
    cycle: u64,
    last_host: Option<String>,
}

impl SignalEngine {
    pub fn new(
        cfg: EngineConfig,
        source: Box<dyn EventSource>,
        scorer: Scorer,
        notifier: Arc<dyn Notifier>,
        logger: EventLogger,
    ) -> Self {
        let tracker = SignalTracker::new(cfg.signal_ttl_secs);
        Self {
            cfg,
            source,
            scorer,
            tracker,
            notifier,
            logger,
            cycle: 0,
            last_host: None,
        }
    }

    pub fn tracker(&self) -> &SignalTracker {
        &self.tracker
    }

    fn in_band(&self, odds: f64) -> bool {
        odds >= self.cfg.odds_band_low && odds <= self.cfg.odds_band_high
    }

    /// Jeden kompletní cyklus. Chyba = jen top-level fetch / host resolve.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.cycle += 1;

        // sweep PŘED dedup checkem — právě vyexpirovaný uid je eligible
        self.tracker.sweep_expired(Utc::now());

        let batch = match self.source.fetch_events().await {
            Ok(batch) => batch,
            Err(e) => {
                let _ = self.logger.log(&ApiStatusEvent {
                    ts: now_iso(),
                    event: "API_STATUS",
                    source: "feed".to_string(),
                    ok: false,
                    status_code: None,
                    message: e.to_string(),
                    items: 0,
                });
                return Err(e);
            }
        };
        self.last_host = Some(batch.base_url.clone());

        let _ = self.logger.log(&ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: "feed".to_string(),
            ok: true,
            status_code: Some(200),
            message: "ok".to_string(),
            items: batch.events.len(),
        });

        let mut events_seen = 0usize;
        let mut qualifying: Vec<Event> = Vec::new();

        for raw in &batch.events {
            for event in normalize_raw(raw) {
                events_seen += 1;

                // settlement je best-effort — upstream status nemusí nikdy přijít
                if let Some(status) = event.status.clone() {
                    let uid = event_uid(&event);
                    if self.tracker.mark_settled_if_reported(&uid, &status) {
                        let _ = self.logger.log(&SignalSettledEvent {
                            ts: now_iso(),
                            event: "SIGNAL_SETTLED",
                            uid,
                            status,
                        });
                    }
                }

                if self.in_band(event.odds) {
                    qualifying.push(event);
                }
            }
        }

        let mut candidates: Vec<Candidate> = Vec::with_capacity(qualifying.len());
        for event in qualifying {
            let probability = self.scorer.score(&event.name, event.odds).await;
            let uid = event_uid(&event);
            candidates.push(Candidate { event, probability, uid });
        }
        let scored = candidates.len();

        if self.cfg.threshold_before_dedup {
            candidates.retain(|c| c.probability >= self.cfg.min_probability);
            candidates.retain(|c| self.tracker.is_new(&c.uid));
        } else {
            candidates.retain(|c| self.tracker.is_new(&c.uid));
            candidates.retain(|c| c.probability >= self.cfg.min_probability);
        }

        candidates.sort_by(|a, b| {
            b.probability.partial_cmp(&a.probability).unwrap_or(Ordering::Equal)
        });
        candidates.truncate(self.cfg.max_signals_per_cycle);

        let mut signals_sent = 0usize;
        for candidate in &candidates {
            let text = format_signal_message(candidate, &batch.base_url);
            if let Err(e) = self.notifier.notify(&text).await {
                // doručení je best-effort; tracker stav to neovlivní
                warn!("signal notify failed: {}", e);
            }
            // zápis do trackeru až PO návratu notify callu
            self.tracker.record(
                candidate.uid.clone(),
                TrackedSignal {
                    odds: candidate.event.odds,
                    participants: participants_label(&candidate.event),
                    link: candidate
                        .event
                        .link
                        .clone()
                        .unwrap_or_else(|| batch.base_url.clone()),
                    sent_at: Utc::now(),
                    settled: false,
                },
            );
            let _ = self.logger.log(&SignalAlertEvent {
                ts: now_iso(),
                event: "SIGNAL_ALERT",
                sport: candidate.event.sport.clone(),
                teams: candidate.event.name.clone(),
                outcome: candidate.event.outcome.clone(),
                odds: candidate.event.odds,
                probability: candidate.probability,
                link: candidate
                    .event
                    .link
                    .clone()
                    .unwrap_or_else(|| batch.base_url.clone()),
                uid: candidate.uid.clone(),
            });
            signals_sent += 1;
        }

        if signals_sent == 0 {
            // heartbeat aby operátor věděl že loop žije a nestojí
            let text = format!(
                "✅ Cycle {}: no qualifying signals ({} events checked)",
                self.cycle, events_seen
            );
            if let Err(e) = self.notifier.notify(&text).await {
                warn!("heartbeat notify failed: {}", e);
            }
        }

        let report = CycleReport {
            events_seen,
            candidates: scored,
            signals_sent,
        };

        let _ = self.logger.log(&SystemHeartbeatEvent {
            ts: now_iso(),
            event: "SYSTEM_HEARTBEAT",
            cycle: self.cycle,
            events_seen: report.events_seen,
            candidates: report.candidates,
            signals_sent: report.signals_sent,
            tracked_active: self.tracker.len(),
            active_host: self.last_host.clone(),
        });

        info!(
            "cycle {} done: {} events, {} candidates, {} signals, {} tracked",
            self.cycle, report.events_seen, report.candidates, report.signals_sent,
            self.tracker.len()
        );

        Ok(report)
    }

    /// Hlavní loop — běží do cancellation. Úspěch spí update interval,
    /// selhání spí backoff. Shutdown signál přerušuje i probíhající cyklus.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.cfg.backoff_floor_secs, self.cfg.backoff_cap_secs);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.run_cycle() => outcome,
            };

            let sleep_for = match outcome {
                Ok(_) => {
                    backoff.reset();
                    Duration::from_secs(self.cfg.update_interval_secs)
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("cycle failed: {} — retrying in {}s", e, delay.as_secs());
                    let text = format!(
                        "⚠️ Upstream fetch failed ({e}) — retrying in {}s",
                        delay.as_secs()
                    );
                    if let Err(e) = self.notifier.notify(&text).await {
                        warn!("admin notify failed: {}", e);
                    }
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(sleep_for) => {}
            }
        }

        info!("signal loop stopped");
    }
}

fn participants_label(event: &Event) -> String {
    match &event.participants {
        Some((a, b)) => format!("{a} vs {b}"),
        None => event.name.clone(),
    }
}

fn format_signal_message(candidate: &Candidate, fallback_link: &str) -> String {
    let link = candidate.event.link.as_deref().unwrap_or(fallback_link);
    let pct = (candidate.probability * 100.0).round() as u32;
    format!(
        "🎯 <b>Value signal</b> — {}\n⚔️ {} ({})\n💰 Odds {:.2} → est. win {}%\n🔗 {}",
        candidate.event.sport, candidate.event.name, candidate.event.outcome,
        candidate.event.odds, pct, link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use odds_extractor::RawPayload;
    use prediction_engine::{H2hProvider, H2hSummary};
    use serde_json::json;
    use std::sync::Mutex;

    fn test_logger() -> EventLogger {
        EventLogger::new(std::env::temp_dir().join("valuescout-test-logs"))
    }

    struct RecordingNotifier {
        messages: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct StaticSource {
        events: Vec<RawEvent>,
    }

    #[async_trait]
    impl EventSource for StaticSource {
        async fn fetch_events(&mut self) -> Result<SourceBatch, CycleError> {
            Ok(SourceBatch {
                events: self.events.clone(),
                base_url: "https://mock.example".to_string(),
            })
        }
    }

    /// Selže N-krát, pak vrací prázdné batche; zapisuje časy fetchů
    struct FlakySource {
        failures_left: u32,
        fetch_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    #[async_trait]
    impl EventSource for FlakySource {
        async fn fetch_events(&mut self) -> Result<SourceBatch, CycleError> {
            self.fetch_times.lock().unwrap().push(tokio::time::Instant::now());
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(CycleError::NoHost);
            }
            Ok(SourceBatch {
                events: vec![],
                base_url: "https://mock.example".to_string(),
            })
        }
    }

    fn raw_event(id: &str, name: &str, odds: f64) -> RawEvent {
        RawEvent {
            source: SourceKind::JsonApi,
            sport: "table-tennis".to_string(),
            id: Some(id.to_string()),
            name: name.to_string(),
            link: Some(format!("https://mock.example/event/{id}")),
            status: None,
            payload: RawPayload::Json(json!({ "name": name, "odd": odds })),
        }
    }

    fn engine_with(
        events: Vec<RawEvent>,
        cfg: EngineConfig,
    ) -> (SignalEngine, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let notifier = Arc::new(RecordingNotifier { messages: messages.clone() });
        let engine = SignalEngine::new(
            cfg,
            Box::new(StaticSource { events }),
            Scorer::new(None),
            notifier,
            test_logger(),
        );
        (engine, messages)
    }

    fn signal_messages(messages: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.starts_with("🎯"))
            .cloned()
            .collect()
    }

    fn heartbeat_messages(messages: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.starts_with("✅"))
            .cloned()
            .collect()
    }

    #[test]
    fn backoff_doubles_and_resets() {
        let mut backoff = Backoff::new(5, 300);
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        // cap na 300
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(300));
    }

    #[test]
    fn truncation_keeps_limit() {
        let short = "hello";
        assert_eq!(truncate_message(short), "hello");
        let long = "x".repeat(MESSAGE_LIMIT + 500);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.chars().count(), MESSAGE_LIMIT);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn band_bounds_are_inclusive() {
        let (engine, _) = engine_with(vec![], EngineConfig::default());
        assert!(engine.in_band(1.10));
        assert!(engine.in_band(1.40));
        assert!(engine.in_band(1.25));
        assert!(!engine.in_band(1.099999));
        assert!(!engine.in_band(1.400001));
    }

    #[test]
    fn uid_prefers_link_then_name_odds() {
        let mut event = Event {
            id: "E1".to_string(),
            sport: "tt".to_string(),
            name: "A - B".to_string(),
            participants: None,
            outcome: "W1".to_string(),
            odds: 1.2,
            link: Some("https://x/event/1".to_string()),
            source: SourceKind::JsonApi,
            status: None,
        };
        assert_eq!(event_uid(&event), "https://x/event/1");
        event.link = None;
        assert_eq!(event_uid(&event), "A - B|1.20");
    }

    #[tokio::test]
    async fn single_event_notified_once_then_deduped() {
        let events = vec![raw_event("E1", "A - B", 1.20)];
        let (mut engine, messages) = engine_with(events, EngineConfig::default());

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals_sent, 1);

        let signals = signal_messages(&messages);
        assert_eq!(signals.len(), 1);
        // fallback heuristika: clamp(0.9 - (1.20-1.10)*0.8, 0.7) = 0.82
        assert!(signals[0].contains("1.20"), "{}", signals[0]);
        assert!(signals[0].contains("82%"), "{}", signals[0]);

        // druhý identický poll uvnitř TTL — nula signálů, jen heartbeat
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals_sent, 0);
        assert_eq!(signal_messages(&messages).len(), 1);
        assert_eq!(heartbeat_messages(&messages).len(), 1);
    }

    #[tokio::test]
    async fn three_empty_cycles_three_heartbeats() {
        let (mut engine, messages) = engine_with(vec![], EngineConfig::default());
        for _ in 0..3 {
            engine.run_cycle().await.unwrap();
        }
        assert_eq!(heartbeat_messages(&messages).len(), 3);
        assert!(signal_messages(&messages).is_empty());
    }

    #[tokio::test]
    async fn out_of_band_odds_dropped() {
        let events = vec![
            raw_event("E1", "A - B", 1.05),
            raw_event("E2", "C - D", 1.50),
        ];
        let (mut engine, messages) = engine_with(events, EngineConfig::default());
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals_sent, 0);
        assert!(signal_messages(&messages).is_empty());
    }

    #[tokio::test]
    async fn top_k_caps_notifications_by_probability() {
        let events = vec![
            raw_event("E1", "A - B", 1.30), // p = 0.74
            raw_event("E2", "C - D", 1.15), // p = 0.86
            raw_event("E3", "E - F", 1.20), // p = 0.82
        ];
        let (mut engine, messages) = engine_with(events, EngineConfig::default());
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals_sent, 2);

        let signals = signal_messages(&messages);
        assert_eq!(signals.len(), 2);
        // seřazeno podle pravděpodobnosti sestupně
        assert!(signals[0].contains("C - D"));
        assert!(signals[1].contains("E - F"));
    }

    #[tokio::test]
    async fn low_probability_candidate_dropped() {
        struct WeakH2h;
        #[async_trait]
        impl H2hProvider for WeakH2h {
            async fn head_to_head(&self, _: &str, _: &str) -> Option<H2hSummary> {
                // vyrovnaná historie → blend hluboko pod threshold
                Some(H2hSummary { wins_a: 1, wins_b: 1, draws: 6 })
            }
        }

        let messages = Arc::new(Mutex::new(Vec::new()));
        let notifier = Arc::new(RecordingNotifier { messages: messages.clone() });
        let mut engine = SignalEngine::new(
            EngineConfig::default(),
            Box::new(StaticSource { events: vec![raw_event("E1", "A - B", 1.20)] }),
            Scorer::new(Some(Arc::new(WeakH2h))),
            notifier,
            test_logger(),
        );

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.signals_sent, 0);
        assert_eq!(heartbeat_messages(&messages).len(), 1);
    }

    #[tokio::test]
    async fn settlement_marked_from_upstream_status() {
        let mut finished = raw_event("E1", "A - B", 1.20);
        let (mut engine, _) = engine_with(vec![finished.clone()], EngineConfig::default());
        engine.run_cycle().await.unwrap();
        let uid = "https://mock.example/event/E1";
        assert!(!engine.tracker().get(uid).unwrap().settled);

        // další poll hlásí terminální stav
        finished.status = Some("finished".to_string());
        engine.source = Box::new(StaticSource { events: vec![finished] });
        engine.run_cycle().await.unwrap();
        assert!(engine.tracker().get(uid).unwrap().settled);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_floor_then_doubles_then_resets() {
        let fetch_times = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let notifier = Arc::new(RecordingNotifier { messages });
        let source = FlakySource {
            failures_left: 2,
            fetch_times: fetch_times.clone(),
        };
        let cfg = EngineConfig {
            update_interval_secs: 120,
            ..EngineConfig::default()
        };
        let mut engine = SignalEngine::new(
            cfg,
            Box::new(source),
            Scorer::new(None),
            notifier,
            test_logger(),
        );

        let (tx, rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(async move { engine.run(rx).await });

        // fetch #1 t=0 (fail → 5s), #2 t=5 (fail → 10s), #3 t=15 (ok → interval),
        // #4 t=135
        tokio::time::sleep(Duration::from_secs(140)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let times: Vec<u64> = fetch_times
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start).as_secs())
            .collect();
        assert_eq!(times, vec![0, 5, 15, 135]);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_loop_promptly() {
        let (mut engine, _) = engine_with(vec![], EngineConfig::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        // už nastavený shutdown → okamžitý návrat, žádný cyklus
        engine.run(rx).await;
    }
}
