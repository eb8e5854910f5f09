//! C6 — Store: idempotent relational persistence on natural keys.
//!
//! Generalizes the teacher's `db::Database` (`Arc<Mutex<Connection>>`,
//! idempotent `CREATE TABLE IF NOT EXISTS` schema, `ON CONFLICT ... DO
//! UPDATE` upserts, row-mapper functions) from its four tables to the
//! full entity set in §3/§6. SQLite via `rusqlite` stands in for the
//! Postgres schema the spec marks out of scope — the relational shape is
//! what the spec specifies, the engine is an implementation detail.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::*;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    league TEXT NOT NULL,
    team_id TEXT NOT NULL,
    name TEXT NOT NULL,
    abbreviation TEXT NOT NULL,
    conference TEXT,
    division TEXT,
    PRIMARY KEY (league, team_id)
);

CREATE TABLE IF NOT EXISTS games (
    game_id TEXT PRIMARY KEY,
    league TEXT NOT NULL,
    season INTEGER NOT NULL,
    week INTEGER NOT NULL,
    away_team TEXT NOT NULL,
    home_team TEXT NOT NULL,
    game_date TEXT NOT NULL,
    venue TEXT,
    indoor INTEGER NOT NULL,
    status TEXT NOT NULL,
    home_score INTEGER,
    away_score INTEGER
);
CREATE INDEX IF NOT EXISTS idx_games_league_week ON games (league, week);

CREATE TABLE IF NOT EXISTS odds (
    game_id TEXT NOT NULL,
    sportsbook TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    home_spread REAL NOT NULL,
    away_spread REAL NOT NULL,
    total REAL NOT NULL,
    home_moneyline INTEGER NOT NULL,
    away_moneyline INTEGER NOT NULL,
    suspect INTEGER NOT NULL,
    PRIMARY KEY (game_id, sportsbook, captured_at)
);

CREATE TABLE IF NOT EXISTS injuries (
    team TEXT NOT NULL,
    player_name TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    position TEXT NOT NULL,
    status TEXT NOT NULL,
    point_value REAL NOT NULL,
    replacement_value REAL NOT NULL,
    severity TEXT NOT NULL,
    confidence REAL NOT NULL,
    source TEXT NOT NULL,
    PRIMARY KEY (team, player_name, captured_at)
);

CREATE TABLE IF NOT EXISTS weather (
    game_id TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    temp_f REAL NOT NULL,
    wind_mph REAL NOT NULL,
    precipitation_kind TEXT NOT NULL,
    precipitation_probability REAL NOT NULL,
    indoor_flag INTEGER NOT NULL,
    PRIMARY KEY (game_id, captured_at)
);

CREATE TABLE IF NOT EXISTS game_results (
    game_id TEXT PRIMARY KEY,
    team TEXT NOT NULL,
    opponent TEXT NOT NULL,
    team_score INTEGER NOT NULL,
    opponent_score INTEGER NOT NULL,
    is_home INTEGER NOT NULL,
    league TEXT NOT NULL,
    season INTEGER NOT NULL,
    week INTEGER NOT NULL,
    game_date TEXT NOT NULL,
    injury_differential REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_game_results_league_season_week ON game_results (league, season, week);

CREATE TABLE IF NOT EXISTS ratings (
    league TEXT NOT NULL,
    season INTEGER NOT NULL,
    week INTEGER NOT NULL,
    team_id TEXT NOT NULL,
    rating REAL NOT NULL,
    games_played INTEGER NOT NULL,
    history_blob TEXT NOT NULL,
    PRIMARY KEY (league, season, week, team_id)
);

CREATE TABLE IF NOT EXISTS predictions (
    prediction_id TEXT PRIMARY KEY,
    game_id TEXT NOT NULL,
    model_version TEXT NOT NULL,
    generated_at TEXT NOT NULL,
    predicted_spread REAL NOT NULL,
    market_spread REAL NOT NULL,
    edge_points REAL NOT NULL,
    edge_percentage REAL NOT NULL,
    stars_rating REAL NOT NULL,
    recommended_side TEXT NOT NULL,
    stake_units REAL NOT NULL,
    kelly_fraction_used REAL NOT NULL,
    confidence_score REAL NOT NULL,
    reasoning_text TEXT NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_game ON predictions (game_id);

CREATE TABLE IF NOT EXISTS settled_bets (
    prediction_id TEXT PRIMARY KEY,
    result TEXT NOT NULL,
    profit REAL NOT NULL,
    clv REAL NOT NULL,
    settled_at TEXT NOT NULL,
    FOREIGN KEY (prediction_id) REFERENCES predictions (prediction_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    league TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    source_breakdown_blob TEXT NOT NULL
);
"#;

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("opening sqlite database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("running schema migrations")?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // -- teams --

    pub fn upsert_team(&self, team: &Team) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO teams (league, team_id, name, abbreviation, conference, division)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (league, team_id) DO UPDATE SET
                name = excluded.name,
                abbreviation = excluded.abbreviation,
                conference = excluded.conference,
                division = excluded.division",
            params![
                team.league.as_str(),
                team.team_id,
                team.name,
                team.abbreviation,
                team.conference,
                team.division,
            ],
        )?;
        Ok(())
    }

    // -- games --

    pub fn upsert_game(&self, game: &Game) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO games (game_id, league, season, week, away_team, home_team, game_date,
                venue, indoor, status, home_score, away_score)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT (game_id) DO UPDATE SET
                status = excluded.status,
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                venue = excluded.venue",
            params![
                game.game_id,
                game.league.as_str(),
                game.season,
                game.week,
                game.away_team,
                game.home_team,
                game.game_date.to_rfc3339(),
                game.venue,
                game.indoor as i64,
                game.status.as_str(),
                game.home_score,
                game.away_score,
            ],
        )?;
        Ok(())
    }

    pub fn final_games(&self, league: League, week: i32) -> Result<Vec<Game>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT game_id, league, season, week, away_team, home_team, game_date, venue,
                indoor, status, home_score, away_score
             FROM games WHERE league = ?1 AND week = ?2 AND status = 'final'",
        )?;
        let rows = stmt
            .query_map(params![league.as_str(), week], map_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Any game by id regardless of status, used by the results checker to
    /// tell "not final yet" (game exists, status != final) apart from
    /// "missing entirely from the feed" (no row at all) per §4.12.
    pub fn game_by_id(&self, game_id: &str) -> Result<Option<Game>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT game_id, league, season, week, away_team, home_team, game_date, venue,
                    indoor, status, home_score, away_score
                 FROM games WHERE game_id = ?1",
                params![game_id],
                map_game,
            )
            .optional()?;
        Ok(row)
    }

    /// Every game in `(league, week)` regardless of status, used by edge
    /// detection (which needs the not-yet-final slate) and by the results
    /// checker's companion lookup `game_by_id`.
    pub fn games_for_week(&self, league: League, week: i32) -> Result<Vec<Game>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT game_id, league, season, week, away_team, home_team, game_date, venue,
                indoor, status, home_score, away_score
             FROM games WHERE league = ?1 AND week = ?2",
        )?;
        let rows = stmt
            .query_map(params![league.as_str(), week], map_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // -- odds --

    pub fn insert_odds(&self, odds: &Odds) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO odds (game_id, sportsbook, captured_at, home_spread, away_spread,
                total, home_moneyline, away_moneyline, suspect)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT (game_id, sportsbook, captured_at) DO UPDATE SET
                home_spread = excluded.home_spread,
                away_spread = excluded.away_spread,
                total = excluded.total,
                suspect = excluded.suspect",
            params![
                odds.game_id,
                odds.sportsbook,
                odds.captured_at.to_rfc3339(),
                odds.home_spread,
                odds.away_spread,
                odds.total,
                odds.home_moneyline,
                odds.away_moneyline,
                odds.suspect as i64,
            ],
        )?;
        Ok(())
    }

    /// Latest capture per (game, book), used to build the edge detector's
    /// per-book consensus.
    pub fn latest_odds_for_game(&self, game_id: &str) -> Result<Vec<Odds>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT o.game_id, o.sportsbook, o.captured_at, o.home_spread, o.away_spread,
                o.total, o.home_moneyline, o.away_moneyline, o.suspect
             FROM odds o
             INNER JOIN (
                SELECT sportsbook, MAX(captured_at) AS max_ts FROM odds
                WHERE game_id = ?1 GROUP BY sportsbook
             ) latest ON o.sportsbook = latest.sportsbook AND o.captured_at = latest.max_ts
             WHERE o.game_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![game_id], map_odds)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // -- injuries --

    pub fn upsert_injury(&self, injury: &InjuryReport) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO injuries (team, player_name, captured_at, position, status,
                point_value, replacement_value, severity, confidence, source)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT (team, player_name, captured_at) DO UPDATE SET
                status = excluded.status,
                point_value = excluded.point_value",
            params![
                injury.team,
                injury.player_name,
                injury.captured_at.to_rfc3339(),
                injury.position,
                injury.status,
                injury.point_value,
                injury.replacement_value,
                severity_str(injury.severity),
                injury.confidence,
                injury.source,
            ],
        )?;
        Ok(())
    }

    pub fn latest_injuries_for_team(&self, team: &str) -> Result<Vec<InjuryReport>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT team, player_name, captured_at, position, status, point_value,
                replacement_value, severity, confidence, source
             FROM injuries WHERE team = ?1 ORDER BY captured_at DESC",
        )?;
        let rows = stmt
            .query_map(params![team], map_injury)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // -- weather --

    pub fn upsert_weather(&self, weather: &WeatherReport) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO weather (game_id, captured_at, temp_f, wind_mph, precipitation_kind,
                precipitation_probability, indoor_flag)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT (game_id, captured_at) DO UPDATE SET
                temp_f = excluded.temp_f,
                wind_mph = excluded.wind_mph,
                precipitation_kind = excluded.precipitation_kind,
                precipitation_probability = excluded.precipitation_probability",
            params![
                weather.game_id,
                weather.captured_at.to_rfc3339(),
                weather.temp_f,
                weather.wind_mph,
                precipitation_str(weather.precipitation_kind),
                weather.precipitation_probability,
                weather.indoor_flag as i64,
            ],
        )?;
        Ok(())
    }

    /// Most recent capture for a game, if any was recorded.
    pub fn latest_weather_for_game(&self, game_id: &str) -> Result<Option<WeatherReport>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT game_id, captured_at, temp_f, wind_mph, precipitation_kind,
                    precipitation_probability, indoor_flag
                 FROM weather WHERE game_id = ?1 ORDER BY captured_at DESC LIMIT 1",
                params![game_id],
                map_weather,
            )
            .optional()?;
        Ok(row)
    }

    // -- game results (C8 input) --

    /// `GameResult` rows are immutable after insertion (§3); a repeat
    /// capture for the same game is a no-op rather than an overwrite.
    pub fn insert_game_result(&self, result: &GameResult) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO game_results (game_id, team, opponent, team_score, opponent_score,
                is_home, league, season, week, game_date, injury_differential)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT (game_id) DO NOTHING",
            params![
                result.game_id,
                result.team,
                result.opponent,
                result.team_score,
                result.opponent_score,
                result.is_home as i64,
                result.league.as_str(),
                result.season,
                result.week,
                result.date.to_rfc3339(),
                result.injury_differential,
            ],
        )?;
        Ok(())
    }

    /// Distinct weeks with at least one completed `GameResult`, ascending,
    /// capped at `through_week` — the rating driver's per-week work list.
    pub fn game_result_weeks(&self, league: League, season: i32, through_week: i32) -> Result<Vec<i32>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT week FROM game_results
             WHERE league = ?1 AND season = ?2 AND week <= ?3 AND week >= 1
             ORDER BY week ASC",
        )?;
        let rows = stmt
            .query_map(params![league.as_str(), season, through_week], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(rows)
    }

    /// One week's completed results in ascending `(game_date, game_id)`
    /// order, per §4.8's update ordering.
    pub fn game_results_for_week(&self, league: League, season: i32, week: i32) -> Result<Vec<GameResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT game_id, team, opponent, team_score, opponent_score, is_home, league,
                season, week, game_date, injury_differential
             FROM game_results
             WHERE league = ?1 AND season = ?2 AND week = ?3
             ORDER BY game_date ASC, game_id ASC",
        )?;
        let rows = stmt
            .query_map(params![league.as_str(), season, week], map_game_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether week `week` already has at least one committed rating row —
    /// the rating driver's idempotency check (P2): a committed week is
    /// never recomputed on rerun.
    pub fn ratings_committed_for_week(&self, league: League, season: i32, week: i32) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ratings WHERE league = ?1 AND season = ?2 AND week = ?3",
            params![league.as_str(), season, week],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -- ratings --

    pub fn upsert_rating(&self, rating: &TeamRating) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let history_blob = serde_json::to_string(&rating.history)?;
        conn.execute(
            "INSERT INTO ratings (league, season, week, team_id, rating, games_played, history_blob)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT (league, season, week, team_id) DO UPDATE SET
                rating = excluded.rating,
                games_played = excluded.games_played,
                history_blob = excluded.history_blob",
            params![
                rating.league.as_str(),
                rating.season,
                rating.as_of_week,
                rating.team_id,
                rating.rating,
                rating.games_played,
                history_blob,
            ],
        )?;
        Ok(())
    }

    pub fn rating_at_week(&self, league: League, season: i32, team_id: &str, week: i32) -> Result<Option<TeamRating>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT league, season, week, team_id, rating, games_played, history_blob
                 FROM ratings WHERE league = ?1 AND season = ?2 AND team_id = ?3 AND week = ?4",
                params![league.as_str(), season, team_id, week],
                map_rating,
            )
            .optional()?;
        Ok(row)
    }

    // -- predictions / settled bets --

    pub fn insert_prediction(&self, prediction: &Prediction) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO predictions (prediction_id, game_id, model_version, generated_at,
                predicted_spread, market_spread, edge_points, edge_percentage, stars_rating,
                recommended_side, stake_units, kelly_fraction_used, confidence_score,
                reasoning_text, status)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
             ON CONFLICT (prediction_id) DO NOTHING",
            params![
                prediction.prediction_id,
                prediction.game_id,
                prediction.model_version,
                prediction.generated_at.to_rfc3339(),
                prediction.predicted_spread,
                prediction.market_spread,
                prediction.edge_points,
                prediction.edge_percentage,
                prediction.stars_rating,
                side_str(prediction.recommended_side),
                prediction.stake_units,
                prediction.kelly_fraction_used,
                prediction.confidence_score,
                prediction.reasoning_text,
                status_str(prediction.status),
            ],
        )?;
        Ok(())
    }

    pub fn pending_predictions_for_week(&self, league: League, week: i32) -> Result<Vec<Prediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT p.prediction_id, p.game_id, p.model_version, p.generated_at,
                p.predicted_spread, p.market_spread, p.edge_points, p.edge_percentage,
                p.stars_rating, p.recommended_side, p.stake_units, p.kelly_fraction_used,
                p.confidence_score, p.reasoning_text, p.status
             FROM predictions p
             INNER JOIN games g ON g.game_id = p.game_id
             WHERE g.league = ?1 AND g.week = ?2 AND p.status IN ('pending', 'open')",
        )?;
        let rows = stmt
            .query_map(params![league.as_str(), week], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Write a settled bet and flip the prediction's status, unless one
    /// already exists for this prediction (P7 — never rewrite a settlement).
    pub fn insert_settled_bet_if_absent(&self, settled: &SettledBet) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT prediction_id FROM settled_bets WHERE prediction_id = ?1",
                params![settled.prediction_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO settled_bets (prediction_id, result, profit, clv, settled_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                settled.prediction_id,
                result_str(settled.result),
                settled.profit,
                settled.clv,
                settled.settled_at.to_rfc3339(),
            ],
        )?;
        conn.execute(
            "UPDATE predictions SET status = 'settled' WHERE prediction_id = ?1",
            params![settled.prediction_id],
        )?;
        Ok(true)
    }

    // -- sessions --

    pub fn start_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob = serde_json::to_string(&session.source_breakdown)?;
        conn.execute(
            "INSERT INTO sessions (session_id, league, started_at, finished_at, status, source_breakdown_blob)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                session.session_id,
                session.league.as_str(),
                session.started_at.to_rfc3339(),
                session.finished_at.map(|t| t.to_rfc3339()),
                session_status_str(session.status),
                blob,
            ],
        )?;
        Ok(())
    }

    pub fn finish_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob = serde_json::to_string(&session.source_breakdown)?;
        conn.execute(
            "UPDATE sessions SET finished_at = ?1, status = ?2, source_breakdown_blob = ?3
             WHERE session_id = ?4",
            params![
                session.finished_at.map(|t| t.to_rfc3339()),
                session_status_str(session.status),
                blob,
                session.session_id,
            ],
        )?;
        Ok(())
    }
}

fn severity_str(s: InjurySeverity) -> &'static str {
    match s {
        InjurySeverity::Healthy => "healthy",
        InjurySeverity::Minor => "minor",
        InjurySeverity::Moderate => "moderate",
        InjurySeverity::Severe => "severe",
    }
}

fn precipitation_str(p: PrecipitationKind) -> &'static str {
    match p {
        PrecipitationKind::None => "none",
        PrecipitationKind::Rain => "rain",
        PrecipitationKind::Snow => "snow",
        PrecipitationKind::Mixed => "mixed",
    }
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Home => "home",
        Side::Away => "away",
    }
}

fn status_str(s: PredictionStatus) -> &'static str {
    match s {
        PredictionStatus::Pending => "pending",
        PredictionStatus::Open => "open",
        PredictionStatus::Settled => "settled",
        PredictionStatus::Void => "void",
    }
}

fn result_str(r: SettleResult) -> &'static str {
    match r {
        SettleResult::Win => "win",
        SettleResult::Loss => "loss",
        SettleResult::Push => "push",
        SettleResult::Void => "void",
    }
}

fn session_status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Degraded => "degraded",
        SessionStatus::Aborted => "aborted",
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
    Ok(Game {
        game_id: row.get(0)?,
        league: League::parse(&row.get::<_, String>(1)?).unwrap_or(League::Nfl),
        season: row.get(2)?,
        week: row.get(3)?,
        away_team: row.get(4)?,
        home_team: row.get(5)?,
        game_date: parse_dt(&row.get::<_, String>(6)?),
        venue: row.get(7)?,
        indoor: row.get::<_, i64>(8)? != 0,
        status: GameStatus::parse(&row.get::<_, String>(9)?),
        home_score: row.get(10)?,
        away_score: row.get(11)?,
    })
}

fn map_odds(row: &rusqlite::Row) -> rusqlite::Result<Odds> {
    Ok(Odds {
        game_id: row.get(0)?,
        sportsbook: row.get(1)?,
        captured_at: parse_dt(&row.get::<_, String>(2)?),
        home_spread: row.get(3)?,
        away_spread: row.get(4)?,
        total: row.get(5)?,
        home_moneyline: row.get(6)?,
        away_moneyline: row.get(7)?,
        suspect: row.get::<_, i64>(8)? != 0,
    })
}

fn map_injury(row: &rusqlite::Row) -> rusqlite::Result<InjuryReport> {
    let severity = match row.get::<_, String>(7)?.as_str() {
        "minor" => InjurySeverity::Minor,
        "moderate" => InjurySeverity::Moderate,
        "severe" => InjurySeverity::Severe,
        _ => InjurySeverity::Healthy,
    };
    Ok(InjuryReport {
        team: row.get(0)?,
        player_name: row.get(1)?,
        captured_at: parse_dt(&row.get::<_, String>(2)?),
        position: row.get(3)?,
        status: row.get(4)?,
        point_value: row.get(5)?,
        replacement_value: row.get(6)?,
        severity,
        confidence: row.get(8)?,
        source: row.get(9)?,
    })
}

fn map_weather(row: &rusqlite::Row) -> rusqlite::Result<WeatherReport> {
    let kind = match row.get::<_, String>(4)?.as_str() {
        "rain" => PrecipitationKind::Rain,
        "snow" => PrecipitationKind::Snow,
        "mixed" => PrecipitationKind::Mixed,
        _ => PrecipitationKind::None,
    };
    Ok(WeatherReport {
        game_id: row.get(0)?,
        captured_at: parse_dt(&row.get::<_, String>(1)?),
        temp_f: row.get(2)?,
        wind_mph: row.get(3)?,
        precipitation_kind: kind,
        precipitation_probability: row.get(5)?,
        indoor_flag: row.get::<_, i64>(6)? != 0,
    })
}

fn map_game_result(row: &rusqlite::Row) -> rusqlite::Result<GameResult> {
    Ok(GameResult {
        game_id: row.get(0)?,
        team: row.get(1)?,
        opponent: row.get(2)?,
        team_score: row.get(3)?,
        opponent_score: row.get(4)?,
        is_home: row.get::<_, i64>(5)? != 0,
        league: League::parse(&row.get::<_, String>(6)?).unwrap_or(League::Nfl),
        season: row.get(7)?,
        week: row.get(8)?,
        date: parse_dt(&row.get::<_, String>(9)?),
        injury_differential: row.get(10)?,
    })
}

fn map_rating(row: &rusqlite::Row) -> rusqlite::Result<TeamRating> {
    let history_blob: String = row.get(6)?;
    let history = serde_json::from_str(&history_blob).unwrap_or_default();
    Ok(TeamRating {
        league: League::parse(&row.get::<_, String>(0)?).unwrap_or(League::Nfl),
        season: row.get(1)?,
        as_of_week: row.get(2)?,
        team_id: row.get(3)?,
        rating: row.get(4)?,
        games_played: row.get(5)?,
        history,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    let side = match row.get::<_, String>(9)?.as_str() {
        "away" => Side::Away,
        _ => Side::Home,
    };
    let status = match row.get::<_, String>(14)?.as_str() {
        "open" => PredictionStatus::Open,
        "settled" => PredictionStatus::Settled,
        "void" => PredictionStatus::Void,
        _ => PredictionStatus::Pending,
    };
    Ok(Prediction {
        prediction_id: row.get(0)?,
        game_id: row.get(1)?,
        model_version: row.get(2)?,
        generated_at: parse_dt(&row.get::<_, String>(3)?),
        predicted_spread: row.get(4)?,
        predicted_total: None,
        market_spread: row.get(5)?,
        market_total: None,
        edge_points: row.get(6)?,
        edge_percentage: row.get(7)?,
        stars_rating: row.get(8)?,
        recommended_side: side,
        stake_units: row.get(10)?,
        kelly_fraction_used: row.get(11)?,
        confidence_score: row.get(12)?,
        reasoning_text: row.get(13)?,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game(id: &str, week: i32, status: GameStatus) -> Game {
        Game {
            game_id: id.to_string(),
            league: League::Nfl,
            season: 2026,
            week,
            away_team: "NE".to_string(),
            home_team: "BUF".to_string(),
            game_date: Utc::now(),
            venue: Some("Highmark Stadium".to_string()),
            indoor: false,
            status,
            home_score: None,
            away_score: None,
        }
    }

    #[test]
    fn upsert_game_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let game = sample_game("ne_buf_20261004", 5, GameStatus::Scheduled);
        store.upsert_game(&game).unwrap();
        store.upsert_game(&game).unwrap();
        let finals = store.final_games(League::Nfl, 5).unwrap();
        assert!(finals.is_empty());
    }

    #[test]
    fn final_games_filters_by_status() {
        let store = Store::open_in_memory().unwrap();
        let mut final_game = sample_game("ne_buf_20261004", 5, GameStatus::Final);
        final_game.home_score = Some(24);
        final_game.away_score = Some(20);
        store.upsert_game(&final_game).unwrap();
        store.upsert_game(&sample_game("mia_nyj_20261004", 5, GameStatus::Scheduled)).unwrap();

        let finals = store.final_games(League::Nfl, 5).unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].game_id, "ne_buf_20261004");
    }

    /// Settlement is monotone: a second attempt to settle the same
    /// prediction does not modify the existing row.
    #[test]
    fn settlement_never_rewrites_an_existing_row() {
        let store = Store::open_in_memory().unwrap();
        let settled = SettledBet {
            prediction_id: "p1".to_string(),
            result: SettleResult::Win,
            profit: 0.909,
            clv: 0.5,
            settled_at: Utc::now(),
        };
        let first = store.insert_settled_bet_if_absent(&settled).unwrap();
        assert!(first);

        let mut different = settled.clone();
        different.result = SettleResult::Loss;
        different.profit = -1.0;
        let second = store.insert_settled_bet_if_absent(&different).unwrap();
        assert!(!second, "must not overwrite an existing settlement");
    }

    #[test]
    fn odds_upsert_updates_latest_capture() {
        let store = Store::open_in_memory().unwrap();
        let ts = Utc::now();
        let odds = Odds {
            game_id: "g1".to_string(),
            sportsbook: "pinnacle".to_string(),
            captured_at: ts,
            home_spread: -3.0,
            away_spread: 3.0,
            total: 44.5,
            home_moneyline: -150,
            away_moneyline: 130,
            suspect: false,
        };
        store.insert_odds(&odds).unwrap();
        let mut updated = odds.clone();
        updated.home_spread = -3.5;
        updated.away_spread = 3.5;
        store.insert_odds(&updated).unwrap();

        let latest = store.latest_odds_for_game("g1").unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].home_spread, -3.5);
    }

    #[test]
    fn games_for_week_includes_non_final_games() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_game(&sample_game("ne_buf_20261004", 5, GameStatus::Scheduled)).unwrap();
        let games = store.games_for_week(League::Nfl, 5).unwrap();
        assert_eq!(games.len(), 1);
        assert!(store.final_games(League::Nfl, 5).unwrap().is_empty());
    }

    #[test]
    fn weather_upsert_is_idempotent_per_capture() {
        let store = Store::open_in_memory().unwrap();
        let ts = Utc::now();
        let report = WeatherReport {
            game_id: "g1".to_string(),
            captured_at: ts,
            temp_f: 45.0,
            wind_mph: 12.0,
            precipitation_kind: PrecipitationKind::None,
            precipitation_probability: 0.0,
            indoor_flag: false,
        };
        store.upsert_weather(&report).unwrap();
        let mut updated = report.clone();
        updated.temp_f = 40.0;
        store.upsert_weather(&updated).unwrap();

        let latest = store.latest_weather_for_game("g1").unwrap().unwrap();
        assert_eq!(latest.temp_f, 40.0);
    }

    fn sample_game_result(game_id: &str, week: i32, date: DateTime<Utc>) -> GameResult {
        GameResult {
            game_id: game_id.to_string(),
            team: "A".to_string(),
            opponent: "B".to_string(),
            team_score: 42,
            opponent_score: 35,
            is_home: true,
            league: League::Ncaaf,
            season: 2026,
            week,
            date,
            injury_differential: 0.0,
        }
    }

    #[test]
    fn game_result_insert_is_immutable_on_repeat_capture() {
        let store = Store::open_in_memory().unwrap();
        let result = sample_game_result("a_b_20260905", 2, Utc::now());
        store.insert_game_result(&result).unwrap();

        let mut different = result.clone();
        different.team_score = 99;
        store.insert_game_result(&different).unwrap();

        let stored = store.game_results_for_week(League::Ncaaf, 2026, 2).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].team_score, 42, "a repeat capture must not overwrite the first insert");
    }

    #[test]
    fn game_results_for_week_orders_by_date_then_game_id() {
        let store = Store::open_in_memory().unwrap();
        let early = Utc::now() - chrono::Duration::hours(2);
        let late = Utc::now();
        store.insert_game_result(&sample_game_result("z_game", 2, late)).unwrap();
        store.insert_game_result(&sample_game_result("a_game", 2, early)).unwrap();

        let ordered = store.game_results_for_week(League::Ncaaf, 2026, 2).unwrap();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].game_id, "a_game");
        assert_eq!(ordered[1].game_id, "z_game");
    }

    #[test]
    fn game_result_weeks_returns_distinct_ascending_weeks_through_cap() {
        let store = Store::open_in_memory().unwrap();
        store.insert_game_result(&sample_game_result("g1", 3, Utc::now())).unwrap();
        store.insert_game_result(&sample_game_result("g2", 1, Utc::now())).unwrap();
        store.insert_game_result(&sample_game_result("g3", 5, Utc::now())).unwrap();

        let weeks = store.game_result_weeks(League::Ncaaf, 2026, 3).unwrap();
        assert_eq!(weeks, vec![1, 3], "week 5 is beyond through_week=3");
    }

    #[test]
    fn ratings_committed_for_week_reflects_stored_rows() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.ratings_committed_for_week(League::Ncaaf, 2026, 2).unwrap());

        store
            .upsert_rating(&TeamRating {
                league: League::Ncaaf,
                season: 2026,
                team_id: "A".to_string(),
                as_of_week: 2,
                rating: 80.0,
                games_played: 1,
                history: RatingHistory::default(),
            })
            .unwrap();

        assert!(store.ratings_committed_for_week(League::Ncaaf, 2026, 2).unwrap());
    }
}
