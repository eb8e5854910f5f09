//! C10 — key-number table: margin-of-victory frequency lookup.
//!
//! Per Open Question #3, the table is config, not a hardcoded match: one
//! JSON file per league under `config/key_numbers/<league>.json`, shaped
//! `{"3": 0.08, "7": 0.06, ...}`. `KeyNumberTable::load` validates that
//! every percentage is non-negative and the sum does not exceed 1.0.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyNumberTable {
    /// margin of victory -> frequency (0.0..1.0)
    frequencies: BTreeMap<i32, f64>,
}

impl KeyNumberTable {
    pub fn from_map(frequencies: BTreeMap<i32, f64>) -> Result<Self> {
        let table = KeyNumberTable { frequencies };
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading key-number table at {}", path.display()))?;
        let raw: BTreeMap<String, f64> =
            serde_json::from_str(&text).context("parsing key-number table JSON")?;
        let frequencies = raw
            .into_iter()
            .map(|(k, v)| {
                k.parse::<i32>()
                    .with_context(|| format!("key-number table key {k:?} is not an integer"))
                    .map(|k| (k, v))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Self::from_map(frequencies)
    }

    /// Exemplar NFL table from spec §4.10: 3≈8%, 7≈6%, 6/10/14≈4-5%.
    pub fn nfl_exemplar() -> Self {
        Self::from_map(
            [(3, 0.08), (7, 0.06), (6, 0.045), (10, 0.045), (14, 0.04)]
                .into_iter()
                .collect(),
        )
        .expect("exemplar table is valid")
    }

    /// Exemplar NCAAF table: lower than NFL (3≈7%, 7≈5%).
    pub fn ncaaf_exemplar() -> Self {
        Self::from_map([(3, 0.07), (7, 0.05)].into_iter().collect())
            .expect("exemplar table is valid")
    }

    fn validate(&self) -> Result<()> {
        let mut sum = 0.0;
        for (&margin, &freq) in &self.frequencies {
            if freq < 0.0 {
                bail!("key-number table has negative frequency at margin {margin}: {freq}");
            }
            sum += freq;
        }
        if sum > 1.0 + 1e-9 {
            bail!("key-number table frequencies sum to {sum} > 1.0");
        }
        Ok(())
    }

    /// Key numbers between `market_line` and `your_line` inclusive (in
    /// magnitude — a line resting exactly on a key number still counts as
    /// moving off it), and the summed percentage as a win-probability edge.
    pub fn edge_value(&self, your_line: f64, market_line: f64) -> (Vec<i32>, f64) {
        let (lo, hi) = if your_line <= market_line {
            (your_line, market_line)
        } else {
            (market_line, your_line)
        };

        // Key numbers are magnitudes of margin-of-victory; a line can cross
        // a given key number on either the home-favored (negative) or
        // away-favored (positive) side of zero.
        let mut crossed = Vec::new();
        let mut total = 0.0;
        for (&margin, &freq) in &self.frequencies {
            let m = margin as f64;
            if (m >= lo && m <= hi) || (-m >= lo && -m <= hi) {
                crossed.push(margin);
                total += freq;
            }
        }
        (crossed, total)
    }

    /// Compares the value of crossing a key number at `line` against the
    /// implied cost of moving the price by `price_delta` (in probability
    /// terms, already converted by the caller). Returns `true` if the
    /// key-number value exceeds the cost — i.e. "buy the half point".
    pub fn should_buy_half_point(&self, line: f64, price_delta: f64) -> bool {
        let rounded = line.round() as i32;
        let value = self.frequencies.get(&rounded).copied().unwrap_or(0.0);
        value > price_delta
    }
}
