//! Dashboard counters fed by the batch traffic analysis.
//!
//! The model is asked to end its answer with a fenced ```json block holding
//! `attack_vectors` and `traffic_stats` objects; a series is replaced only
//! when the block carries a non-empty object for it.

use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub count: f64,
}

impl ChartPoint {
    fn new(name: &str, count: f64) -> Self {
        Self {
            name: name.to_string(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub attack_vectors: Vec<ChartPoint>,
    pub traffic_stats: Vec<ChartPoint>,
}

impl Default for DashboardStats {
    fn default() -> Self {
        Self {
            attack_vectors: vec![
                ChartPoint::new("DDoS", 120.0),
                ChartPoint::new("SQL Injection", 85.0),
                ChartPoint::new("Brute Force", 90.0),
                ChartPoint::new("Malware", 45.0),
                ChartPoint::new("Phishing", 30.0),
            ],
            traffic_stats: vec![
                ChartPoint::new("HTTP/HTTPS", 450.0),
                ChartPoint::new("DNS", 120.0),
                ChartPoint::new("TCP", 300.0),
                ChartPoint::new("UDP", 150.0),
                ChartPoint::new("ICMP", 80.0),
            ],
        }
    }
}

fn json_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("static pattern compiles"))
}

impl DashboardStats {
    /// Updates the series from an AI answer. Returns whether anything changed;
    /// answers without a usable block leave the stats untouched.
    pub fn update_from_response(&mut self, response: &str) -> bool {
        let Some(block) = json_block_regex()
            .captures(response)
            .and_then(|caps| caps.get(1))
        else {
            debug!("No JSON stats block in analysis response");
            return false;
        };

        let parsed: Value = match serde_json::from_str(block.as_str()) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse AI stats: {}", e);
                return false;
            }
        };

        let mut changed = false;
        if let Some(vectors) = series(&parsed, "attack_vectors") {
            self.attack_vectors = vectors;
            changed = true;
        }
        if let Some(stats) = series(&parsed, "traffic_stats") {
            self.traffic_stats = stats;
            changed = true;
        }
        changed
    }
}

fn series(parsed: &Value, field: &str) -> Option<Vec<ChartPoint>> {
    let object: &Map<String, Value> = parsed.get(field)?.as_object()?;
    let points: Vec<ChartPoint> = object
        .iter()
        .map(|(name, count)| ChartPoint {
            name: name.clone(),
            count: as_count(count),
        })
        .collect();
    if points.is_empty() {
        None
    } else {
        Some(points)
    }
}

// Numbers and numeric strings count; anything else counts as zero.
fn as_count(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}
