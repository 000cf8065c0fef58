/// ValueScout — Odds Extractor
///
/// Vytahuje číselné kurzy z heterogenních payloadů:
///   1. přímé číselné pole (w1/home aliasy před obecnými klíči)
///   2. vnořené struktury (markets → outcomes, customFactors)
///   3. regex nad volným textem ("1.23" i "1,23" — čárka se normalizuje)
///
/// Strategie se zkouší v pevném pořadí, první úspěšná vyhrává.
/// Žádné kurzy = prázdný vektor, nikdy chyba.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::trace;

/// Raw payload z jednoho source adapteru. JSON z API, text ze scrapingu.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Json(Value),
    Text(String),
}

/// Klíče s kurzem — home/primary aliasy mají přednost před obecnými
const ODDS_KEYS: [&str; 9] = ["w1", "home", "odd1", "k1", "odd", "odds", "price", "coef", "value"];

/// Klíče s názvem outcome
const LABEL_KEYS: [&str; 4] = ["name", "outcome", "title", "label"];

/// Klíče s vnořenými seznamy outcomes
const NESTED_KEYS: [&str; 4] = ["markets", "outcomes", "customFactors", "factors"];

fn odds_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3}[.,]\d{1,2})\b").unwrap())
}

/// "1,23" i "1.23" → 1.23. Hodnoty <= 1.0 nejsou validní decimal kurz.
pub fn parse_decimal_odds(s: &str) -> Option<f64> {
    let normalized = s.trim().replace(',', ".");
    let v: f64 = normalized.parse().ok()?;
    if v.is_finite() && v > 1.0 {
        Some(v)
    } else {
        None
    }
}

fn value_as_odds(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite() && *f > 1.0),
        Value::String(s) => parse_decimal_odds(s),
        _ => None,
    }
}

fn label_of(obj: &Value) -> String {
    for key in LABEL_KEYS {
        if let Some(s) = obj.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    "Unknown".to_string()
}

// ── Strategie ────────────────────────────────────────────────────────────────

pub trait ExtractStrategy {
    fn name(&self) -> &'static str;
    /// Vrací None pokud strategie na payload nepasuje; jinak nalezené páry.
    fn try_extract(&self, raw: &Value) -> Option<Vec<(String, f64)>>;
}

/// Kurz jako přímé pole eventu: { "name": "...", "odd": 1.23 }
pub struct DirectFieldStrategy;

impl ExtractStrategy for DirectFieldStrategy {
    fn name(&self) -> &'static str {
        "direct_field"
    }

    fn try_extract(&self, raw: &Value) -> Option<Vec<(String, f64)>> {
        let obj = raw.as_object()?;
        for key in ODDS_KEYS {
            if let Some(odds) = obj.get(key).and_then(value_as_odds) {
                return Some(vec![(label_of(raw), odds)]);
            }
        }
        None
    }
}

/// Kurzy ve vnořené struktuře: markets[].outcomes[].{odd|price}, customFactors[]
pub struct NestedOutcomesStrategy;

impl NestedOutcomesStrategy {
    fn collect(&self, node: &Value, depth: u8, out: &mut Vec<(String, f64)>) {
        if depth > 3 {
            return;
        }
        for key in NESTED_KEYS {
            if let Some(items) = node.get(key).and_then(|v| v.as_array()) {
                for item in items {
                    for odds_key in ODDS_KEYS {
                        if let Some(odds) = item.get(odds_key).and_then(value_as_odds) {
                            out.push((label_of(item), odds));
                            break;
                        }
                    }
                    // markets mívají outcomes ještě o úroveň níž
                    self.collect(item, depth + 1, out);
                }
            }
        }
    }
}

impl ExtractStrategy for NestedOutcomesStrategy {
    fn name(&self) -> &'static str {
        "nested_outcomes"
    }

    fn try_extract(&self, raw: &Value) -> Option<Vec<(String, f64)>> {
        let mut out = Vec::new();
        self.collect(raw, 0, &mut out);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Kurz zmíněný ve volném textu string polí: "Výhra 1 — 1,23"
pub struct TextPatternStrategy;

impl ExtractStrategy for TextPatternStrategy {
    fn name(&self) -> &'static str {
        "text_pattern"
    }

    fn try_extract(&self, raw: &Value) -> Option<Vec<(String, f64)>> {
        let mut out = Vec::new();
        match raw {
            Value::String(s) => scan_text(s, &mut out),
            Value::Object(obj) => {
                for (_, v) in obj {
                    if let Value::String(s) = v {
                        scan_text(s, &mut out);
                    }
                }
            }
            _ => {}
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

fn scan_text(text: &str, out: &mut Vec<(String, f64)>) {
    for cap in odds_pattern().captures_iter(text) {
        if let Some(odds) = parse_decimal_odds(&cap[1]) {
            out.push((text.trim().to_string(), odds));
        }
    }
}

// ── Extrakce ─────────────────────────────────────────────────────────────────

fn strategies() -> [&'static dyn ExtractStrategy; 3] {
    [&DirectFieldStrategy, &NestedOutcomesStrategy, &TextPatternStrategy]
}

/// Projede strategie v prioritním pořadí; stejná hodnota dvakrát = jeden kandidát.
pub fn extract(payload: &RawPayload) -> Vec<(String, f64)> {
    let pairs = match payload {
        RawPayload::Json(v) => {
            let mut found = Vec::new();
            for strategy in strategies() {
                if let Some(pairs) = strategy.try_extract(v) {
                    trace!("odds via {} strategy: {} pairs", strategy.name(), pairs.len());
                    found = pairs;
                    break;
                }
            }
            found
        }
        RawPayload::Text(s) => {
            let mut out = Vec::new();
            scan_text(s, &mut out);
            out
        }
    };
    dedup_odds(pairs)
}

/// Dedup podle hodnoty kurzu na dvě desetinná místa.
fn dedup_odds(pairs: Vec<(String, f64)>) -> Vec<(String, f64)> {
    let mut seen = std::collections::HashSet::new();
    pairs
        .into_iter()
        .filter(|(_, odds)| seen.insert((odds * 100.0).round() as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comma_and_dot_decimal_parse_equal() {
        assert_eq!(parse_decimal_odds("1,23"), Some(1.23));
        assert_eq!(parse_decimal_odds("1.23"), Some(1.23));
        assert_eq!(parse_decimal_odds(" 2,05 "), Some(2.05));
    }

    #[test]
    fn sub_one_values_are_not_odds() {
        assert_eq!(parse_decimal_odds("0.95"), None);
        assert_eq!(parse_decimal_odds("1.0"), None);
        assert_eq!(parse_decimal_odds("abc"), None);
    }

    #[test]
    fn direct_field_wins_over_nested() {
        let raw = RawPayload::Json(json!({
            "name": "Team A - Team B",
            "odd": 1.20,
            "markets": [{ "outcomes": [{ "name": "W2", "odd": 3.4 }] }],
        }));
        let pairs = extract(&raw);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, 1.20);
    }

    #[test]
    fn nested_outcomes_found() {
        let raw = RawPayload::Json(json!({
            "name": "Team A - Team B",
            "markets": [{
                "outcomes": [
                    { "name": "W1", "odd": 1.25 },
                    { "name": "W2", "price": "3,80" },
                ],
            }],
        }));
        let pairs = extract(&raw);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("W1".to_string(), 1.25));
        assert_eq!(pairs[1].1, 3.80);
    }

    #[test]
    fn custom_factors_shape() {
        let raw = RawPayload::Json(json!({
            "customFactors": [{ "name": "П1", "value": "1,31" }],
        }));
        let pairs = extract(&raw);
        assert_eq!(pairs, vec![("П1".to_string(), 1.31)]);
    }

    #[test]
    fn free_text_odds_with_comma() {
        let raw = RawPayload::Text("Dinamo - Spartak  výhra 1: 1,18".to_string());
        let pairs = extract(&raw);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, 1.18);
    }

    #[test]
    fn duplicate_values_collapse() {
        let raw = RawPayload::Json(json!({
            "markets": [
                { "outcomes": [{ "name": "W1", "odd": 1.30 }] },
                { "outcomes": [{ "name": "Winner", "odd": "1,30" }] },
            ],
        }));
        assert_eq!(extract(&raw).len(), 1);
    }

    #[test]
    fn no_odds_is_empty_not_error() {
        let raw = RawPayload::Json(json!({ "name": "no markets here" }));
        assert!(extract(&raw).is_empty());
        let raw = RawPayload::Text("no numbers".to_string());
        assert!(extract(&raw).is_empty());
    }
}
