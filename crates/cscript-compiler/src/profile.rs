//! Profile-count collection and hot-set selection.
//!
//! The instrumented binary flushes `<symbol> <count>` lines. Parsing is
//! permissive: malformed lines are skipped, duplicate symbol lines add.
//! Hot-set selection is fully deterministic regardless of input ordering:
//! descending count, ascending symbol name on ties, counts of zero never
//! qualify.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Aggregated call counts from one instrumented run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSample {
    counts: BTreeMap<String, u64>,
}

impl ProfileSample {
    /// Parse a counts file body. Lines that are not exactly
    /// `<symbol> <count>` with a non-negative integer count are skipped.
    pub fn parse(text: &str) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(symbol), Some(raw_count), None) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Ok(count) = raw_count.parse::<u64>() else {
                continue;
            };
            let slot = counts.entry(symbol.to_string()).or_insert(0);
            *slot = slot.saturating_add(count);
        }
        Self { counts }
    }

    pub fn count(&self, symbol: &str) -> u64 {
        self.counts.get(symbol).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(symbol, &count)| (symbol.as_str(), count))
    }
}

/// Select the hot set: top `top_n` symbols by descending count, ascending
/// name on ties, zero counts excluded.
pub fn select_hot_functions(sample: &ProfileSample, top_n: usize) -> BTreeSet<String> {
    let mut ranked: Vec<(&str, u64)> = sample.iter().filter(|&(_, count)| count > 0).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(symbol, _)| symbol.to_string())
        .collect()
}
