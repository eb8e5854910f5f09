//! ESPN team-stats adapter: per-team season-aggregate metrics (ppg, papg,
//! yardage, turnover margin, 3rd-down %). Unlike the scoreboard/injuries
//! adapters, ESPN exposes this one team at a time, so this fans out across
//! a roster of team IDs with a bounded `tokio::task::JoinSet` rather than
//! one request per league — grounded on the teacher's
//! `live_scores::mod::start_score_monitor` concurrent-fetch-then-merge
//! shape (§5 AMBIENT/EXPANSION: "`tokio::task::JoinSet` bounds the N
//! concurrent in-flight requests fan-out inside a single adapter call").
//! Concurrency is bounded by the reliability layer's own rate-limit gate,
//! not by the fan-out width itself, per §4.7: "32 team requests in
//! parallel, bounded by C2's per-client rate limit."

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::PipelineError;
use crate::http::ReliableClient;
use crate::model::{League, TeamStats};

#[derive(Debug, Deserialize)]
struct TeamStatsResponse {
    splits: Splits,
}

#[derive(Debug, Deserialize)]
struct Splits {
    categories: Vec<StatCategory>,
}

#[derive(Debug, Deserialize)]
struct StatCategory {
    stats: Vec<Stat>,
}

#[derive(Debug, Deserialize)]
struct Stat {
    name: String,
    value: f64,
}

pub struct EspnTeamStatsAdapter {
    client: Arc<ReliableClient>,
    base_url: String,
}

impl EspnTeamStatsAdapter {
    pub fn new(client: Arc<ReliableClient>, base_url: Option<&str>) -> Self {
        EspnTeamStatsAdapter {
            client,
            base_url: base_url
                .unwrap_or("https://site.api.espn.com/apis/site/v2/sports/football")
                .to_string(),
        }
    }

    fn league_path(league: League) -> &'static str {
        match league {
            League::Nfl => "nfl",
            League::Ncaaf => "college-football",
        }
    }

    /// Fetch season-aggregate stats for every team in `team_ids`, fanning
    /// out concurrently. Per-team failures are logged and dropped from the
    /// batch rather than failing the whole call — §4.4's per-record
    /// tolerance, since one team's stats page being down shouldn't block
    /// the other 31.
    pub async fn fetch_many(&self, league: League, season: i32, team_ids: &[String]) -> Vec<TeamStats> {
        let mut set: JoinSet<(String, Result<TeamStats, PipelineError>)> = JoinSet::new();
        for team_id in team_ids {
            let client = Arc::clone(&self.client);
            let base_url = self.base_url.clone();
            let path = Self::league_path(league);
            let team_id = team_id.clone();
            set.spawn(async move {
                let result = fetch_one(&client, &base_url, path, league, season, &team_id).await;
                (team_id, result)
            });
        }

        let mut out = Vec::with_capacity(team_ids.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((team_id, Ok(stats))) => out.push(stats),
                Ok((team_id, Err(e))) => warn!(team_id, error = %e, "team-stats fetch failed"),
                Err(join_err) => warn!(error = %join_err, "team-stats task panicked"),
            }
        }
        out
    }
}

async fn fetch_one(
    client: &ReliableClient,
    base_url: &str,
    league_path: &str,
    league: League,
    season: i32,
    team_id: &str,
) -> Result<TeamStats, PipelineError> {
    let url = format!("{base_url}/{league_path}/teams/{team_id}/statistics");
    let response: TeamStatsResponse = client.get_json(&url).await?;
    Ok(parse_stats(league, team_id, season, &response))
}

fn stat_value(response: &TeamStatsResponse, name: &str) -> f64 {
    response
        .splits
        .categories
        .iter()
        .flat_map(|c| &c.stats)
        .find(|s| s.name == name)
        .map(|s| s.value)
        .unwrap_or(0.0)
}

fn parse_stats(league: League, team_id: &str, season: i32, response: &TeamStatsResponse) -> TeamStats {
    TeamStats {
        league,
        team_id: team_id.to_string(),
        season,
        captured_at: chrono::Utc::now(),
        points_per_game: stat_value(response, "avgPointsFor"),
        points_allowed_per_game: stat_value(response, "avgPointsAgainst"),
        yards_per_game: stat_value(response, "yardsPerGame"),
        turnover_margin: stat_value(response, "turnOverDifferential"),
        third_down_pct: stat_value(response, "thirdDownConvPct"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(stats: Vec<(&str, f64)>) -> TeamStatsResponse {
        TeamStatsResponse {
            splits: Splits {
                categories: vec![StatCategory {
                    stats: stats
                        .into_iter()
                        .map(|(name, value)| Stat { name: name.to_string(), value })
                        .collect(),
                }],
            },
        }
    }

    #[test]
    fn parses_known_stat_names_into_team_stats() {
        let response = response_with(vec![
            ("avgPointsFor", 27.3),
            ("avgPointsAgainst", 19.1),
            ("yardsPerGame", 365.0),
            ("turnOverDifferential", 5.0),
            ("thirdDownConvPct", 41.2),
        ]);
        let stats = parse_stats(League::Nfl, "ne", 2026, &response);
        assert_eq!(stats.points_per_game, 27.3);
        assert_eq!(stats.points_allowed_per_game, 19.1);
        assert_eq!(stats.turnover_margin, 5.0);
    }

    #[test]
    fn missing_stat_defaults_to_zero() {
        let response = response_with(vec![("avgPointsFor", 27.3)]);
        let stats = parse_stats(League::Nfl, "ne", 2026, &response);
        assert_eq!(stats.yards_per_game, 0.0);
    }
}
