//! Canonical entities (§3). Everything downstream of the adapters operates
//! on these types; adapters never hand raw JSON further than the normalizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum League {
    Nfl,
    Ncaaf,
}

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            League::Nfl => "nfl",
            League::Ncaaf => "ncaaf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nfl" => Some(League::Nfl),
            "ncaaf" | "cfb" => Some(League::Ncaaf),
            _ => None,
        }
    }
}

impl std::fmt::Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub league: League,
    pub team_id: String,
    pub name: String,
    pub abbreviation: String,
    pub conference: Option<String>,
    pub division: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Canceled,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
            GameStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> GameStatus {
        match s {
            "in_progress" => GameStatus::InProgress,
            "final" => GameStatus::Final,
            "postponed" => GameStatus::Postponed,
            "canceled" | "cancelled" => GameStatus::Canceled,
            _ => GameStatus::Scheduled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub league: League,
    pub season: i32,
    pub week: i32,
    pub away_team: String,
    pub home_team: String,
    pub game_date: DateTime<Utc>,
    pub venue: Option<String>,
    pub indoor: bool,
    pub status: GameStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl Game {
    /// `{away_abbr}_{home_abbr}_{yyyymmdd}` per §4.5.
    pub fn synth_id(away_abbr: &str, home_abbr: &str, game_date: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}",
            away_abbr.to_ascii_lowercase(),
            home_abbr.to_ascii_lowercase(),
            game_date.format("%Y%m%d")
        )
    }
}

/// Ring buffer of at most 10 historical ratings, most recent last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingHistory {
    pub values: Vec<f64>,
}

impl RatingHistory {
    pub const CAPACITY: usize = 10;

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
        if self.values.len() > Self::CAPACITY {
            self.values.remove(0);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRating {
    pub league: League,
    pub season: i32,
    pub team_id: String,
    pub as_of_week: i32,
    pub rating: f64,
    pub games_played: i32,
    pub history: RatingHistory,
}

/// Per-team season-aggregate metrics from the ESPN team-stats adapter
/// (§4.4). Not part of the rating update itself (C8 only consumes
/// `GameResult`); this is supplementary context the factor calculator and
/// human-readable reasoning text can draw on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStats {
    pub league: League,
    pub team_id: String,
    pub season: i32,
    pub captured_at: DateTime<Utc>,
    pub points_per_game: f64,
    pub points_allowed_per_game: f64,
    pub yards_per_game: f64,
    pub turnover_margin: f64,
    pub third_down_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub team: String,
    pub opponent: String,
    pub team_score: i32,
    pub opponent_score: i32,
    pub is_home: bool,
    pub league: League,
    pub season: i32,
    pub week: i32,
    pub date: DateTime<Utc>,
    pub game_id: String,
    pub injury_differential: f64,
}

impl GameResult {
    pub fn score_differential(&self) -> i32 {
        self.team_score - self.opponent_score
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Odds {
    pub game_id: String,
    pub sportsbook: String,
    pub captured_at: DateTime<Utc>,
    pub home_spread: f64,
    pub away_spread: f64,
    pub total: f64,
    pub home_moneyline: i32,
    pub away_moneyline: i32,
    pub suspect: bool,
}

impl Odds {
    /// §3 invariant: `home_spread + away_spread = 0` within ±0.01.
    pub fn is_balanced(&self) -> bool {
        (self.home_spread + self.away_spread).abs() <= 0.01
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjurySeverity {
    Healthy,
    Minor,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryReport {
    pub team: String,
    pub player_name: String,
    pub position: String,
    pub status: String,
    pub captured_at: DateTime<Utc>,
    pub point_value: f64,
    pub replacement_value: f64,
    pub severity: InjurySeverity,
    pub confidence: f64,
    pub source: String,
}

impl InjuryReport {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.captured_at).num_hours() >= 72
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecipitationKind {
    None,
    Rain,
    Snow,
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub game_id: String,
    pub captured_at: DateTime<Utc>,
    pub temp_f: f64,
    pub wind_mph: f64,
    pub precipitation_kind: PrecipitationKind,
    pub precipitation_probability: f64,
    pub indoor_flag: bool,
}

/// Transient, assembled at analysis time from Team/Game/InjuryReport/WeatherReport.
#[derive(Debug, Clone, Default)]
pub struct GameContext {
    pub rest_days_for: i32,
    pub rest_days_against: i32,
    pub travel_miles: f64,
    pub travel_timezones: i32,
    pub divisional: bool,
    pub rivalry: bool,
    pub revenge: bool,
    pub ats_last_5: Vec<bool>,
    pub playoff_elimination: bool,
    pub playoff_clinch: bool,
    pub seeding_implications: bool,
    pub new_head_coach: bool,
    pub key_returning_star: bool,
    pub wind_mph: f64,
    pub temp_f: f64,
    pub indoor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Stars(pub f64);

pub const STARS_LEVELS: [f64; 7] = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: String,
    pub game_id: String,
    pub generated_at: DateTime<Utc>,
    pub model_version: String,
    pub predicted_spread: f64,
    pub predicted_total: Option<f64>,
    pub market_spread: f64,
    pub market_total: Option<f64>,
    pub edge_points: f64,
    pub edge_percentage: f64,
    pub stars_rating: f64,
    pub recommended_side: Side,
    pub stake_units: f64,
    pub kelly_fraction_used: f64,
    pub confidence_score: f64,
    pub reasoning_text: String,
    pub status: PredictionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Pending,
    Open,
    Settled,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettleResult {
    Win,
    Loss,
    Push,
    Void,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledBet {
    pub prediction_id: String,
    pub result: SettleResult,
    pub profit: f64,
    pub clv: f64,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Degraded,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStep {
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub ok: bool,
    pub records: i64,
    pub errors: i64,
    /// True when this step failed with a `PipelineError` that
    /// `is_source_fatal()` flags as source-fatal (auth failure, open
    /// circuit breaker) on a source the pipeline treats as critical (odds,
    /// ratings). Drives the session-level critical-failure gate separately
    /// from the coverage-threshold gate.
    #[serde(default)]
    pub critical_fatal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub league: League,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub source_breakdown: Vec<SourceStep>,
}
