//! Odds adapter grounded on OddsForge's `odds_fetcher.rs` (The Odds API
//! response shape: events -> bookmakers -> markets -> outcomes) and its
//! "best odds across bookmakers" selection, generalized here to spreads
//! instead of moneylines per §4.4's per-book + consensus requirement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::cache::TtlCache;
use crate::error::PipelineError;
use crate::http::ReliableClient;
use crate::model::{League, Odds};
use crate::normalize::{resolve_team_name, TeamMapping};

use super::SourceAdapter;

#[derive(Debug, Deserialize)]
struct OddsEvent {
    commence_time: DateTime<Utc>,
    home_team: String,
    away_team: String,
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    key: String,
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    key: String,
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    price: f64,
    point: Option<f64>,
}

pub struct OddsApiAdapter {
    client: Arc<ReliableClient>,
    base_url: String,
    api_key: String,
    team_mapping: TeamMapping,
    cache: TtlCache<League, Vec<Odds>>,
}

impl OddsApiAdapter {
    pub fn new(client: Arc<ReliableClient>, api_key: String, base_url: Option<&str>) -> Self {
        OddsApiAdapter {
            client,
            base_url: base_url.unwrap_or("https://api.the-odds-api.com/v4").to_string(),
            api_key,
            team_mapping: TeamMapping::default(),
            // §4.3: odds lines move fastest of any collected source, so the
            // default TTL here is the shortest in the pipeline.
            cache: TtlCache::new(60),
        }
    }

    pub fn with_team_mapping(mut self, team_mapping: TeamMapping) -> Self {
        self.team_mapping = team_mapping;
        self
    }

    pub fn with_cache_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.cache = TtlCache::new(ttl_secs);
        self
    }

    fn sport_key(league: League) -> &'static str {
        match league {
            League::Nfl => "americanfootball_nfl",
            League::Ncaaf => "americanfootball_ncaaf",
        }
    }
}

#[async_trait]
impl SourceAdapter for OddsApiAdapter {
    type Output = Vec<Odds>;

    fn name(&self) -> &str {
        "odds_api"
    }

    async fn fetch(&self, league: League) -> Result<Vec<Odds>, PipelineError> {
        if let Some(cached) = self.cache.get(&league).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/sports/{}/odds/?apiKey={}&regions=us&markets=spreads,h2h,totals",
            self.base_url,
            Self::sport_key(league),
            self.api_key
        );
        let events: Vec<OddsEvent> = self.client.get_json(&url).await?;
        let odds: Vec<Odds> = events
            .into_iter()
            .flat_map(|ev| odds_from_event(ev, &self.team_mapping))
            .collect();
        self.cache.put(league, odds.clone()).await;
        Ok(odds)
    }
}

/// One `Odds` row per bookmaker (not collapsed to a single consensus line;
/// the normalizer/store keep every book so later code can pick a consensus
/// or compare against a specific book for CLV).
///
/// §4.5: odds is a critical source, so an unresolvable team name is a hard
/// error for that event rather than a pass-through guess — a line attached
/// to the wrong `game_id` is worse than a missing one — but per §7 a single
/// bad event still doesn't fail the whole batch.
fn odds_from_event(ev: OddsEvent, team_mapping: &TeamMapping) -> Vec<Odds> {
    let home = match resolve_team_name(team_mapping, &ev.home_team, true) {
        Ok(name) => name,
        Err(e) => {
            warn!(team = %ev.home_team, error = %e, "odds event references unmapped home team, skipping");
            return Vec::new();
        }
    };
    let away = match resolve_team_name(team_mapping, &ev.away_team, true) {
        Ok(name) => name,
        Err(e) => {
            warn!(team = %ev.away_team, error = %e, "odds event references unmapped away team, skipping");
            return Vec::new();
        }
    };

    let game_id = crate::model::Game::synth_id(&away, &home, ev.commence_time);
    ev.bookmakers
        .into_iter()
        .filter_map(|book| {
            spread_and_moneyline(&book).map(|(hs, as_, total, hm, am)| Odds {
                game_id: game_id.clone(),
                sportsbook: book.key.clone(),
                captured_at: Utc::now(),
                home_spread: hs,
                away_spread: as_,
                total,
                home_moneyline: hm,
                away_moneyline: am,
                suspect: false,
            })
        })
        .collect()
}

fn spread_and_moneyline(book: &Bookmaker) -> Option<(f64, f64, f64, i32, i32)> {
    let spreads = book.markets.iter().find(|m| m.key == "spreads")?;
    let h2h = book.markets.iter().find(|m| m.key == "h2h");
    let totals = book.markets.iter().find(|m| m.key == "totals");

    let home_spread = spreads.outcomes.iter().find(|o| o.name == "home").and_then(|o| o.point)?;
    let away_spread = spreads.outcomes.iter().find(|o| o.name == "away").and_then(|o| o.point)?;

    let (home_ml, away_ml) = h2h
        .map(|m| {
            let h = m.outcomes.iter().find(|o| o.name == "home").map(|o| o.price as i32).unwrap_or(0);
            let a = m.outcomes.iter().find(|o| o.name == "away").map(|o| o.price as i32).unwrap_or(0);
            (h, a)
        })
        .unwrap_or((0, 0));

    // Over/Under outcomes share the same `point` (the total line itself);
    // either one gives us the number.
    let total = totals
        .and_then(|m| m.outcomes.iter().find_map(|o| o.point))
        .unwrap_or(0.0);

    Some((home_spread, away_spread, total, home_ml, away_ml))
}
