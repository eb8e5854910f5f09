//! C5 — normalizer: raw adapter output -> canonical entities.
//!
//! Grounded on OddsForge's fuzzy team-name matching and stale-data gating
//! (`odds_fetcher.rs.rs`) and on the teacher's own "one canonical shape per
//! entity" discipline in `db::models`. Team-name reconciliation goes through
//! a configured alias table rather than string-distance heuristics, per
//! §4.5's explicit preference for an auditable mapping file over fuzzy
//! matching in the collection hot path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::PipelineError;
use crate::model::{Game, League, Odds};

/// team alias (as seen from a given source) -> canonical abbreviation.
#[derive(Debug, Clone, Default)]
pub struct TeamMapping {
    aliases: HashMap<String, String>,
}

impl TeamMapping {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        TeamMapping {
            aliases: pairs.into_iter().collect(),
        }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: HashMap<String, String> = serde_json::from_str(&text)?;
        Ok(TeamMapping { aliases: raw })
    }

    pub fn canonical(&self, source_name: &str) -> Option<&str> {
        self.aliases.get(source_name).map(String::as_str)
    }

    /// Distinct canonical abbreviations this mapping resolves to — the
    /// closest thing to a team roster the pipeline has without a dedicated
    /// "teams" endpoint, used to seed the team-stats adapter's per-team
    /// fan-out (§4.4).
    pub fn canonical_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.aliases.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Resolve a source-reported team name to its canonical abbreviation.
/// §4.5: unmapped names are a hard error for odds/ratings sources (a
/// mispriced or misattributed line is worse than a missing one) and a
/// warning-tolerant placeholder for weather/injuries (best-effort context).
pub fn resolve_team_name(mapping: &TeamMapping, source_name: &str, strict: bool) -> Result<String, PipelineError> {
    match mapping.canonical(source_name) {
        Some(canonical) => Ok(canonical.to_string()),
        None if strict => Err(PipelineError::ValidationError(format!(
            "no team mapping for {source_name:?}"
        ))),
        None => Ok(source_name.to_string()),
    }
}

/// A season calendar maps `(league, game_date)` to a week number. Loaded
/// once at startup from `season_calendar_path`; §4.5 derives week-of-season
/// from this table rather than a fixed day-count formula, since bye weeks
/// and Thursday/Saturday kickoffs break any arithmetic shortcut.
#[derive(Debug, Clone, Default)]
pub struct SeasonCalendar {
    /// league -> sorted (week_start, week_number) boundaries.
    boundaries: HashMap<League, Vec<(DateTime<Utc>, i32)>>,
}

impl SeasonCalendar {
    pub fn from_boundaries(boundaries: HashMap<League, Vec<(DateTime<Utc>, i32)>>) -> Self {
        let mut sorted = boundaries;
        for v in sorted.values_mut() {
            v.sort_by_key(|(start, _)| *start);
        }
        SeasonCalendar { boundaries: sorted }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        #[derive(serde::Deserialize)]
        struct RawEntry {
            league: String,
            week_start: DateTime<Utc>,
            week: i32,
        }
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<RawEntry> = serde_json::from_str(&text)?;
        let mut boundaries: HashMap<League, Vec<(DateTime<Utc>, i32)>> = HashMap::new();
        for entry in entries {
            let league = League::parse(&entry.league)
                .ok_or_else(|| anyhow::anyhow!("unknown league {:?} in season calendar", entry.league))?;
            boundaries.entry(league).or_default().push((entry.week_start, entry.week));
        }
        Ok(Self::from_boundaries(boundaries))
    }

    /// Last boundary at or before `game_date`, else the first boundary's week.
    pub fn week_for(&self, league: League, game_date: DateTime<Utc>) -> Option<i32> {
        let rows = self.boundaries.get(&league)?;
        let mut current = None;
        for &(start, week) in rows {
            if start <= game_date {
                current = Some(week);
            } else {
                break;
            }
        }
        current.or_else(|| rows.first().map(|(_, w)| *w))
    }
}

/// §3 invariant check: flag odds whose home/away spreads don't sum to ~0 as
/// `suspect` rather than rejecting them outright — a malformed feed entry is
/// still useful signal that something is wrong with a source, but must not
/// silently poison the edge detector.
pub fn validate_and_flag_odds(mut odds: Odds) -> Odds {
    if !odds.is_balanced() {
        odds.suspect = true;
    }
    odds
}

/// team_id -> (lat, lon) for its home venue, used to drive the weather
/// adapter (§4.4's "weather keyed by venue coordinates"). A separate small
/// table rather than folding into `Team` since not every deployment needs
/// weather and the coordinates rarely change.
#[derive(Debug, Clone, Default)]
pub struct VenueCoordinates {
    coords: HashMap<String, (f64, f64)>,
}

impl VenueCoordinates {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, (f64, f64))>) -> Self {
        VenueCoordinates {
            coords: pairs.into_iter().collect(),
        }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: HashMap<String, (f64, f64)> = serde_json::from_str(&text)?;
        Ok(VenueCoordinates { coords: raw })
    }

    pub fn get(&self, team_id: &str) -> Option<(f64, f64)> {
        self.coords.get(team_id).copied()
    }
}

/// Build the canonical `game_id` for a game from already-resolved team
/// abbreviations, reusing `Game::synth_id` so adapters and the normalizer
/// never diverge on the synthesis rule.
pub fn synthesize_game_id(away_abbr: &str, home_abbr: &str, game_date: DateTime<Utc>) -> String {
    Game::synth_id(away_abbr, home_abbr, game_date)
}
