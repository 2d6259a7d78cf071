//! Filter/sort engine deriving the displayed table from a buffer snapshot.
//!
//! Everything here is pure: the input slice is never touched and a new
//! vector is returned on each call, so it can run on every request.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::types::Record;

/// Record field a view can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Sequence,
    ObservedAt,
    SourceAddress,
    DestinationAddress,
    ProtocolLabel,
    SizeBytes,
    Severity,
    InfoText,
}

impl FromStr for SortKey {
    type Err = String;

    /// Accepts the camelCase and snake_case field names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().replace('_', "").to_lowercase();
        match key.as_str() {
            "sequence" => Ok(SortKey::Sequence),
            "observedat" => Ok(SortKey::ObservedAt),
            "sourceaddress" => Ok(SortKey::SourceAddress),
            "destinationaddress" => Ok(SortKey::DestinationAddress),
            "protocollabel" => Ok(SortKey::ProtocolLabel),
            "sizebytes" => Ok(SortKey::SizeBytes),
            "severity" => Ok(SortKey::Severity),
            "infotext" => Ok(SortKey::InfoText),
            _ => Err(format!("unknown sort key: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(format!("unknown sort direction: {}", s)),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => f.write_str("asc"),
            SortDirection::Descending => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    pub filter_text: String,
    pub sort_key: SortKey,
    pub direction: SortDirection,
}

impl ViewQuery {
    pub fn new<S: Into<String>>(filter_text: S, sort_key: SortKey, direction: SortDirection) -> Self {
        Self {
            filter_text: filter_text.into(),
            sort_key,
            direction,
        }
    }

    /// Filters then sorts `snapshot` into a new vector.
    pub fn apply(&self, snapshot: &[Record]) -> Vec<Record> {
        let needle = self.filter_text.to_lowercase();
        let mut rows: Vec<Record> = snapshot
            .iter()
            .filter(|r| matches_filter(r, &needle))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let by_key = compare_by_key(a, b, self.sort_key);
            let by_key = match self.direction {
                SortDirection::Ascending => by_key,
                SortDirection::Descending => by_key.reverse(),
            };
            // Equal keys keep arrival order whatever the direction.
            by_key.then_with(|| a.sequence.cmp(&b.sequence))
        });
        rows
    }
}

/// `needle` must already be lowercase; empty matches everything.
fn matches_filter(record: &Record, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    [
        &record.protocol_label,
        &record.source_address,
        &record.destination_address,
        &record.info_text,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

fn compare_by_key(a: &Record, b: &Record, key: SortKey) -> Ordering {
    match key {
        SortKey::Sequence => a.sequence.cmp(&b.sequence),
        SortKey::ObservedAt => a.observed_at.cmp(&b.observed_at),
        SortKey::SizeBytes => a.size_bytes.cmp(&b.size_bytes),
        SortKey::Severity => a.severity.rank().cmp(&b.severity.rank()),
        SortKey::SourceAddress => caseless(&a.source_address, &b.source_address),
        SortKey::DestinationAddress => caseless(&a.destination_address, &b.destination_address),
        SortKey::ProtocolLabel => caseless(&a.protocol_label, &b.protocol_label),
        SortKey::InfoText => caseless(&a.info_text, &b.info_text),
    }
}

fn caseless(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
