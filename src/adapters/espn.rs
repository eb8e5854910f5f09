//! Scoreboard + team-stats adapter against ESPN's public scoreboard API.
//! Wire shapes grounded on `cfb_betting`'s `game_results_api.rs` (Bearer
//! client, typed event/competitor response) and the teacher's
//! `live_scores::sports::TheSportsDB` (base-url-overridable client,
//! status-string normalization, filter_map-based event parsing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::http::ReliableClient;
use crate::model::{Game, GameStatus, League};
use std::sync::Arc;

use super::SourceAdapter;

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    events: Vec<ScoreboardEvent>,
}

#[derive(Debug, Deserialize)]
struct ScoreboardEvent {
    id: String,
    date: DateTime<Utc>,
    competitions: Vec<Competition>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    venue: Option<Venue>,
    competitors: Vec<Competitor>,
    status: CompetitionStatus,
}

#[derive(Debug, Deserialize)]
struct Venue {
    #[serde(rename = "fullName")]
    full_name: Option<String>,
    indoor: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    #[serde(rename = "homeAway")]
    home_away: String,
    team: CompetitorTeam,
    score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompetitorTeam {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct CompetitionStatus {
    #[serde(rename = "type")]
    status_type: StatusType,
}

#[derive(Debug, Deserialize)]
struct StatusType {
    name: String,
}

fn status_from_espn(name: &str) -> GameStatus {
    match name {
        "STATUS_FINAL" => GameStatus::Final,
        "STATUS_IN_PROGRESS" | "STATUS_HALFTIME" | "STATUS_END_PERIOD" => GameStatus::InProgress,
        "STATUS_POSTPONED" => GameStatus::Postponed,
        "STATUS_CANCELED" => GameStatus::Canceled,
        _ => GameStatus::Scheduled,
    }
}

pub struct EspnScoreboardAdapter {
    client: Arc<ReliableClient>,
    base_url: String,
}

impl EspnScoreboardAdapter {
    pub fn new(client: Arc<ReliableClient>, base_url: Option<&str>) -> Self {
        EspnScoreboardAdapter {
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
}

#[async_trait]
impl SourceAdapter for EspnScoreboardAdapter {
    type Output = Vec<Game>;

    fn name(&self) -> &str {
        "espn_scoreboard"
    }

    async fn fetch(&self, league: League) -> Result<Vec<Game>, PipelineError> {
        let url = format!(
            "{}/{}/scoreboard",
            self.base_url,
            Self::league_path(league)
        );
        let response: ScoreboardResponse = self
            .client
            .get_json(&url)
            .await
            .map_err(|e| PipelineError::ParseError {
                source: self.name().to_string(),
                message: e.to_string(),
            })?;

        let games = response
            .events
            .into_iter()
            .filter_map(|ev| parse_event(league, ev))
            .collect();
        Ok(games)
    }
}

fn parse_event(league: League, ev: ScoreboardEvent) -> Option<Game> {
    let competition = ev.competitions.into_iter().next()?;
    let home = competition
        .competitors
        .iter()
        .find(|c| c.home_away == "home")?;
    let away = competition
        .competitors
        .iter()
        .find(|c| c.home_away == "away")?;

    let game_id = Game::synth_id(&away.team.abbreviation, &home.team.abbreviation, ev.date);

    Some(Game {
        game_id,
        league,
        season: ev.date.format("%Y").to_string().parse().unwrap_or(0),
        week: 0, // overwritten by the orchestrator's season-calendar lookup before persisting
        away_team: away.team.abbreviation.clone(),
        home_team: home.team.abbreviation.clone(),
        game_date: ev.date,
        venue: competition.venue.as_ref().and_then(|v| v.full_name.clone()),
        indoor: competition.venue.as_ref().and_then(|v| v.indoor).unwrap_or(false),
        status: status_from_espn(&competition.status.status_type.name),
        home_score: home.score.as_ref().and_then(|s| s.parse().ok()),
        away_score: away.score.as_ref().and_then(|s| s.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_final_and_in_progress() {
        assert_eq!(status_from_espn("STATUS_FINAL"), GameStatus::Final);
        assert_eq!(status_from_espn("STATUS_IN_PROGRESS"), GameStatus::InProgress);
        assert_eq!(status_from_espn("STATUS_SCHEDULED"), GameStatus::Scheduled);
    }

    #[test]
    fn parse_event_picks_home_and_away_by_home_away_field() {
        let ev = ScoreboardEvent {
            id: "1".to_string(),
            date: Utc::now(),
            competitions: vec![Competition {
                venue: Some(Venue {
                    full_name: Some("Gillette Stadium".to_string()),
                    indoor: Some(false),
                }),
                competitors: vec![
                    Competitor {
                        home_away: "away".to_string(),
                        team: CompetitorTeam { abbreviation: "BUF".to_string() },
                        score: Some("20".to_string()),
                    },
                    Competitor {
                        home_away: "home".to_string(),
                        team: CompetitorTeam { abbreviation: "NE".to_string() },
                        score: Some("24".to_string()),
                    },
                ],
                status: CompetitionStatus {
                    status_type: StatusType { name: "STATUS_FINAL".to_string() },
                },
            }],
        };
        let game = parse_event(League::Nfl, ev).unwrap();
        assert_eq!(game.home_team, "NE");
        assert_eq!(game.away_team, "BUF");
        assert_eq!(game.home_score, Some(24));
        assert_eq!(game.status, GameStatus::Final);
    }
}
