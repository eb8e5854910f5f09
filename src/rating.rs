//! C8 — power-rating engine: deterministic exponential update.
//!
//! Structured the way the teacher's `bot/win_probability.rs` lays out a
//! sport-dispatch function backed by small pure helpers and a thorough
//! test module — but the rating model itself is the spec's deterministic
//! update, not a logistic in-play win-probability curve, per the Non-goal
//! "no machine-learning training loop; the rating model is a deterministic
//! exponential update."

use tracing::warn;

use crate::error::RunOutcome;
use crate::model::{Game, GameResult, League, RatingHistory, TeamRating};
use crate::store::Store;

/// Home-field advantage, by league. Exposed on `Config` (see Open
/// Question #1); these are just the documented NFL/NCAAF defaults.
pub fn default_hfa(league: League) -> f64 {
    match league {
        League::Nfl => 2.5,
        League::Ncaaf => 3.5,
    }
}

/// `true_perf = score_diff + opponent_rating + injury_diff − home_field_adj`
/// with `home_field_adj` subtracted for the home team, added for the visitor.
pub fn true_performance(
    score_diff: i32,
    opponent_rating: f64,
    injury_differential: f64,
    home_field_adj: f64,
    is_home: bool,
) -> f64 {
    let hfa_term = if is_home {
        -home_field_adj
    } else {
        home_field_adj
    };
    score_diff as f64 + opponent_rating + injury_differential + hfa_term
}

/// `new_rating = decay * old_rating + (1 - decay) * true_perf`. Spec fixes
/// `decay = 0.9`; exposed as `Config::rating_decay` so it's not hardcoded.
pub fn update_rating(old_rating: f64, true_perf: f64, decay: f64) -> f64 {
    decay * old_rating + (1.0 - decay) * true_perf
}

/// Apply one completed game to both teams' pre-game ratings, returning the
/// new (team_rating, opponent_rating) pair. Both update simultaneously from
/// the same pre-game snapshot per §4.8's ordering guarantee — callers must
/// not read back an in-flight write before this returns.
pub fn apply_game_result(
    team_rating: &TeamRating,
    opponent_rating: &TeamRating,
    result: &GameResult,
    home_field_adj: f64,
    decay: f64,
) -> (TeamRating, TeamRating) {
    let team_perf = true_performance(
        result.score_differential(),
        opponent_rating.rating,
        result.injury_differential,
        home_field_adj,
        result.is_home,
    );
    let opp_perf = true_performance(
        -result.score_differential(),
        team_rating.rating,
        -result.injury_differential,
        home_field_adj,
        !result.is_home,
    );

    let mut new_team = team_rating.clone();
    new_team.rating = update_rating(team_rating.rating, team_perf, decay);
    new_team.games_played += 1;
    new_team.history.push(new_team.rating);

    let mut new_opp = opponent_rating.clone();
    new_opp.rating = update_rating(opponent_rating.rating, opp_perf, decay);
    new_opp.games_played += 1;
    new_opp.history.push(new_opp.rating);

    (new_team, new_opp)
}

/// Preseason composition: prior-season-final rating plus signed deltas for
/// drafted players, free-agent moves, coaching changes, expected player
/// progression. Deltas are inputs to this function, never computed here.
pub fn preseason_rating(prior_final_rating: f64, offseason_deltas: &[f64]) -> TeamRating {
    let rating = prior_final_rating + offseason_deltas.iter().sum::<f64>();
    TeamRating {
        league: League::Nfl, // caller overwrites league/team_id/season below
        season: 0,
        team_id: String::new(),
        as_of_week: 0,
        rating,
        games_played: 0,
        history: RatingHistory::default(),
    }
}

/// `predicted_home_spread = away_rating − home_rating − home_field_adj`.
/// Negative means home favored by that many points.
pub fn predicted_home_spread(away_rating: f64, home_rating: f64, home_field_adj: f64) -> f64 {
    away_rating - home_rating - home_field_adj
}

/// Derive the home-team-perspective `GameResult` for one finalized game.
/// One row is sufficient: `apply_game_result` updates both teams from a
/// single result. `injury_differential` is left at 0.0 — no depth-chart
/// weighting adapter feeds this pipeline (same simplification as
/// `adapters/injuries.rs`'s `point_value`, noted in DESIGN.md).
pub fn game_result_from_final_game(game: &Game) -> Option<GameResult> {
    let home_score = game.home_score?;
    let away_score = game.away_score?;
    Some(GameResult {
        team: game.home_team.clone(),
        opponent: game.away_team.clone(),
        team_score: home_score,
        opponent_score: away_score,
        is_home: true,
        league: game.league,
        season: game.season,
        week: game.week,
        date: game.game_date,
        game_id: game.game_id.clone(),
        injury_differential: 0.0,
    })
}

#[derive(Debug, Clone, Default)]
pub struct RatingUpdateSummary {
    pub weeks_committed: u32,
    pub games_applied: u32,
}

/// A team with no prior committed rating (first appearance this season)
/// seeds at a neutral 0.0 rather than a real preseason composition — no
/// adapter in this pipeline supplies prior-season-final ratings or
/// offseason deltas for `preseason_rating` to combine (see DESIGN.md).
fn seed_rating(league: League, season: i32, team_id: &str, as_of_week: i32) -> TeamRating {
    TeamRating {
        league,
        season,
        team_id: team_id.to_string(),
        as_of_week,
        rating: 0.0,
        games_played: 0,
        history: RatingHistory::default(),
    }
}

/// C8 driver: read completed `GameResult`s from the store in ascending
/// `(game_date, game_id)` order, one week at a time, and apply §4.8's
/// update rule. A week that already has a committed rating row is skipped
/// so reruns converge (P2) instead of re-deriving the same numbers twice;
/// `Store::game_result_weeks` already returns weeks in ascending order and
/// this loop never advances past a week before every earlier one has
/// committed, per §4.8's ordering guarantee and the "processing week N
/// before N-1 is forbidden" invariant in §3.
pub fn run_rating_updates(
    store: &Store,
    league: League,
    season: i32,
    through_week: i32,
    home_field_adj: f64,
    decay: f64,
) -> anyhow::Result<(RunOutcome, RatingUpdateSummary)> {
    let mut summary = RatingUpdateSummary::default();
    let weeks = store.game_result_weeks(league, season, through_week)?;

    for week in &weeks {
        let week = *week;
        if store.ratings_committed_for_week(league, season, week)? {
            continue;
        }

        let results = store.game_results_for_week(league, season, week)?;
        for result in &results {
            let team_before = store
                .rating_at_week(league, season, &result.team, week - 1)?
                .unwrap_or_else(|| seed_rating(league, season, &result.team, week - 1));
            let opponent_before = store
                .rating_at_week(league, season, &result.opponent, week - 1)?
                .unwrap_or_else(|| seed_rating(league, season, &result.opponent, week - 1));

            let (mut new_team, mut new_opponent) =
                apply_game_result(&team_before, &opponent_before, result, home_field_adj, decay);
            new_team.as_of_week = week;
            new_opponent.as_of_week = week;

            store.upsert_rating(&new_team)?;
            store.upsert_rating(&new_opponent)?;
            summary.games_applied += 1;
        }
        summary.weeks_committed += 1;
    }

    let outcome = if weeks.is_empty() {
        warn!(league = %league, season, through_week, "no completed game results to rate yet");
        RunOutcome::NoOp
    } else {
        RunOutcome::Ok
    };
    Ok((outcome, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn game_result(team: &str, opp: &str, team_score: i32, opp_score: i32, is_home: bool) -> GameResult {
        GameResult {
            team: team.to_string(),
            opponent: opp.to_string(),
            team_score,
            opponent_score: opp_score,
            is_home,
            league: League::Ncaaf,
            season: 2026,
            week: 1,
            date: Utc::now(),
            game_id: "g1".to_string(),
            injury_differential: 0.0,
        }
    }

    fn rating(team_id: &str, value: f64) -> TeamRating {
        TeamRating {
            league: League::Ncaaf,
            season: 2026,
            team_id: team_id.to_string(),
            as_of_week: 1,
            rating: value,
            games_played: 0,
            history: RatingHistory::default(),
        }
    }

    /// Team A rating 80.0 (home), Team B rating 85.0 (away), NCAAF HFA 3.5.
    /// Final A 42, B 35.
    #[test]
    fn rating_update_matches_documented_example() {
        let a = rating("A", 80.0);
        let b = rating("B", 85.0);
        let result_a = game_result("A", "B", 42, 35, true);

        let (new_a, new_b) = apply_game_result(&a, &b, &result_a, 3.5, 0.9);

        assert_relative_eq!(new_a.rating, 80.85, epsilon = 1e-9);
        assert_relative_eq!(new_b.rating, 84.15, epsilon = 1e-9);
    }

    #[test]
    fn true_performance_adds_hfa_for_visitor_subtracts_for_home() {
        let home_perf = true_performance(7, 85.0, 0.0, 3.5, true);
        let away_perf = true_performance(-7, 80.0, 0.0, 3.5, false);
        assert_relative_eq!(home_perf, 88.5, epsilon = 1e-9);
        assert_relative_eq!(away_perf, 76.5, epsilon = 1e-9);
    }

    #[test]
    fn predicted_spread_negative_means_home_favored() {
        let spread = predicted_home_spread(85.0, 90.0, 2.5);
        assert!(spread < 0.0);
    }

    #[test]
    fn preseason_rating_sums_prior_plus_deltas() {
        let r = preseason_rating(80.0, &[1.5, -0.5, 2.0]);
        assert_relative_eq!(r.rating, 83.0, epsilon = 1e-9);
    }

    #[test]
    fn rating_history_caps_at_ten_entries() {
        let mut rating = rating("A", 0.0);
        for i in 0..15 {
            rating.history.push(i as f64);
        }
        assert_eq!(rating.history.values.len(), RatingHistory::CAPACITY);
        assert_eq!(rating.history.values[0], 5.0);
    }

    fn final_game(game_id: &str, week: i32, home: &str, away: &str, home_score: i32, away_score: i32, date: chrono::DateTime<Utc>) -> Game {
        Game {
            game_id: game_id.to_string(),
            league: League::Ncaaf,
            season: 2026,
            week,
            away_team: away.to_string(),
            home_team: home.to_string(),
            game_date: date,
            venue: None,
            indoor: false,
            status: crate::model::GameStatus::Final,
            home_score: Some(home_score),
            away_score: Some(away_score),
        }
    }

    #[test]
    fn game_result_from_final_game_derives_home_perspective() {
        let game = final_game("a_b_20260905", 3, "A", "B", 42, 35, Utc::now());
        let result = game_result_from_final_game(&game).unwrap();
        assert_eq!(result.team, "A");
        assert_eq!(result.opponent, "B");
        assert_eq!(result.team_score, 42);
        assert_eq!(result.opponent_score, 35);
        assert!(result.is_home);
        assert_eq!(result.week, 3);
    }

    #[test]
    fn game_result_from_final_game_is_none_when_scores_missing() {
        let mut game = final_game("a_b_20260905", 3, "A", "B", 0, 0, Utc::now());
        game.home_score = None;
        assert!(game_result_from_final_game(&game).is_none());
    }

    /// End-to-end: a completed game persisted through the store produces a
    /// committed `TeamRating` the edge detector can read back, matching the
    /// documented rating example (E1) via the driver rather than the bare
    /// pure function.
    #[test]
    fn run_rating_updates_persists_committed_ratings_matching_documented_example() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_rating(&rating("A", 80.0)).unwrap();
        store.upsert_rating(&rating("B", 85.0)).unwrap();

        let game = final_game("a_b_20260905", 2, "A", "B", 42, 35, Utc::now());
        let result = game_result_from_final_game(&game).unwrap();
        store.insert_game_result(&result).unwrap();

        let (outcome, summary) = run_rating_updates(&store, League::Ncaaf, 2026, 2, 3.5, 0.9).unwrap();
        assert_eq!(outcome, RunOutcome::Ok);
        assert_eq!(summary.weeks_committed, 1);
        assert_eq!(summary.games_applied, 1);

        let new_a = store.rating_at_week(League::Ncaaf, 2026, "A", 2).unwrap().unwrap();
        let new_b = store.rating_at_week(League::Ncaaf, 2026, "B", 2).unwrap().unwrap();
        assert_relative_eq!(new_a.rating, 80.85, epsilon = 1e-9);
        assert_relative_eq!(new_b.rating, 84.15, epsilon = 1e-9);
    }

    /// A team with no prior rating row seeds neutral (0.0) rather than
    /// failing the update.
    #[test]
    fn run_rating_updates_seeds_teams_with_no_prior_rating() {
        let store = Store::open_in_memory().unwrap();
        let game = final_game("c_d_20260905", 1, "C", "D", 10, 7, Utc::now());
        let result = game_result_from_final_game(&game).unwrap();
        store.insert_game_result(&result).unwrap();

        let (outcome, summary) = run_rating_updates(&store, League::Ncaaf, 2026, 1, 3.5, 0.9).unwrap();
        assert_eq!(outcome, RunOutcome::Ok);
        assert_eq!(summary.games_applied, 1);

        let new_c = store.rating_at_week(League::Ncaaf, 2026, "C", 1).unwrap().unwrap();
        assert!(new_c.games_played == 1);
    }

    /// P2 / idempotency: a second call with no new game results does not
    /// recompute or duplicate the already-committed week.
    #[test]
    fn run_rating_updates_is_idempotent_on_rerun() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_rating(&rating("A", 80.0)).unwrap();
        store.upsert_rating(&rating("B", 85.0)).unwrap();
        let game = final_game("a_b_20260905", 2, "A", "B", 42, 35, Utc::now());
        store.insert_game_result(&game_result_from_final_game(&game).unwrap()).unwrap();

        let (_, first) = run_rating_updates(&store, League::Ncaaf, 2026, 2, 3.5, 0.9).unwrap();
        assert_eq!(first.weeks_committed, 1);

        let (outcome, second) = run_rating_updates(&store, League::Ncaaf, 2026, 2, 3.5, 0.9).unwrap();
        assert_eq!(outcome, RunOutcome::Ok);
        assert_eq!(second.weeks_committed, 0, "already-committed week must not be recomputed");

        let new_a = store.rating_at_week(League::Ncaaf, 2026, "A", 2).unwrap().unwrap();
        assert_relative_eq!(new_a.rating, 80.85, epsilon = 1e-9);
    }

    #[test]
    fn run_rating_updates_reports_noop_with_no_game_results() {
        let store = Store::open_in_memory().unwrap();
        let (outcome, summary) = run_rating_updates(&store, League::Ncaaf, 2026, 5, 3.5, 0.9).unwrap();
        assert_eq!(outcome, RunOutcome::NoOp);
        assert_eq!(summary.weeks_committed, 0);
    }
}
