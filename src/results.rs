//! C12 — results checker / CLV tracker: settle predictions against finals,
//! compute ATS outcomes, ROI, and closing-line value.
//!
//! Shaped after `bot::strategy::manage_positions` (load open positions,
//! check against current state, close out with realized profit) but
//! settling against a week's worth of finished games instead of live price
//! ticks, and adding §4.12's CLV computation on top.

use chrono::Utc;
use tracing::{info, warn};

use crate::error::RunOutcome;
use crate::model::{Game, League, Odds, Prediction, SettleResult, SettledBet, Side};
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct SettlementSummary {
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub units_profit: f64,
    pub stake_total: f64,
    pub clv_total: f64,
    pub clv_count: u32,
    pub beating_close: u32,
    pub unmatched: Vec<String>,
}

impl SettlementSummary {
    pub fn settled_count(&self) -> u32 {
        self.wins + self.losses + self.pushes
    }

    /// ROI% = net profit / total staked.
    pub fn roi_pct(&self) -> f64 {
        if self.stake_total <= 0.0 {
            0.0
        } else {
            100.0 * self.units_profit / self.stake_total
        }
    }

    pub fn avg_clv(&self) -> f64 {
        if self.clv_count == 0 {
            0.0
        } else {
            self.clv_total / self.clv_count as f64
        }
    }

    pub fn pct_beating_close(&self) -> f64 {
        if self.clv_count == 0 {
            0.0
        } else {
            100.0 * self.beating_close as f64 / self.clv_count as f64
        }
    }
}

/// Median home spread across non-suspect captures, the same "consensus"
/// rule the edge detector uses for entry lines (§4.11 step 1), applied
/// here to the most recent (closing) capture instead of the pre-game one.
pub(crate) fn consensus_home_spread(odds: &[Odds]) -> Option<f64> {
    let mut values: Vec<f64> = odds.iter().filter(|o| !o.suspect).map(|o| o.home_spread).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(values[values.len() / 2])
}

/// Settle one prediction against its final game. `bet_home_spread` is the
/// home-spread line at the moment the bet was recorded (`Prediction::market_spread`);
/// `closing_home_spread` is the latest captured line before settlement.
/// `decimal_odds` is the captured price, or the `-110` default (§4.12 step 4).
pub fn settle_prediction(
    prediction: &Prediction,
    game: &Game,
    closing_home_spread: Option<f64>,
    decimal_odds: f64,
) -> Option<SettledBet> {
    let home_score = game.home_score?;
    let away_score = game.away_score?;
    let margin = (home_score - away_score) as f64;

    // Positive => home covers `prediction.market_spread`; negative => away covers.
    let diff = margin + prediction.market_spread;
    const EPS: f64 = 1e-9;

    let result = match prediction.recommended_side {
        Side::Home => {
            if diff > EPS {
                SettleResult::Win
            } else if diff < -EPS {
                SettleResult::Loss
            } else {
                SettleResult::Push
            }
        }
        Side::Away => {
            if diff < -EPS {
                SettleResult::Win
            } else if diff > EPS {
                SettleResult::Loss
            } else {
                SettleResult::Push
            }
        }
    };

    let profit = match result {
        SettleResult::Win => (decimal_odds - 1.0) * prediction.stake_units,
        SettleResult::Loss => -prediction.stake_units,
        SettleResult::Push | SettleResult::Void => 0.0,
    };

    // CLV sign convention: positive always means the bettor's number beat
    // the close for the side they took (§4.12 step 5, per E5). On the
    // home-spread scale, a home bettor benefits from the line moving more
    // negative (the team they bet became a bigger favorite after they bet
    // a smaller number); an away bettor benefits from the opposite move.
    let clv = closing_home_spread.map(|closing| {
        let raw = closing - prediction.market_spread;
        match prediction.recommended_side {
            Side::Home => -raw,
            Side::Away => raw,
        }
    });

    Some(SettledBet {
        prediction_id: prediction.prediction_id.clone(),
        result,
        profit,
        clv: clv.unwrap_or(0.0),
        settled_at: Utc::now(),
    })
}

/// Run the results checker for one `(league, week)`. Returns the outcome
/// the CLI maps to an exit code and a summary for reporting.
pub fn check_results(
    store: &Store,
    league: League,
    week: i32,
    default_decimal_odds: f64,
) -> anyhow::Result<(RunOutcome, SettlementSummary)> {
    let pending = store.pending_predictions_for_week(league, week)?;
    if pending.is_empty() {
        info!(league = %league, week, "no pending predictions to check");
        return Ok((RunOutcome::Ok, SettlementSummary::default()));
    }

    let mut summary = SettlementSummary::default();
    let mut any_settled_now = false;

    for prediction in &pending {
        let game = match store.game_by_id(&prediction.game_id)? {
            None => {
                warn!(game_id = %prediction.game_id, "prediction references a game missing from the feed entirely");
                summary.unmatched.push(prediction.game_id.clone());
                continue;
            }
            Some(g) => g,
        };

        if game.status != crate::model::GameStatus::Final {
            // §4.12 graceful degradation: not final yet, leave pending.
            continue;
        }

        let closing = store
            .latest_odds_for_game(&prediction.game_id)?
            .into_iter()
            .collect::<Vec<_>>();
        let closing_spread = consensus_home_spread(&closing);

        let Some(settled) = settle_prediction(prediction, &game, closing_spread, default_decimal_odds) else {
            continue;
        };

        let inserted = store.insert_settled_bet_if_absent(&settled)?;
        if inserted {
            any_settled_now = true;
            match settled.result {
                SettleResult::Win => summary.wins += 1,
                SettleResult::Loss => summary.losses += 1,
                SettleResult::Push | SettleResult::Void => summary.pushes += 1,
            }
            summary.units_profit += settled.profit;
            summary.stake_total += prediction.stake_units;
            if closing_spread.is_some() {
                summary.clv_total += settled.clv;
                summary.clv_count += 1;
                if settled.clv > 0.0 {
                    summary.beating_close += 1;
                }
            }
        }
    }

    let outcome = if any_settled_now {
        if summary.unmatched.is_empty() {
            RunOutcome::Ok
        } else {
            RunOutcome::Degraded
        }
    } else if !summary.unmatched.is_empty() {
        RunOutcome::Degraded
    } else {
        // E6: predictions exist, nothing was final yet.
        info!(league = %league, week, "games not final yet, nothing settled");
        RunOutcome::NoOp
    };

    Ok((outcome, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GameStatus, PredictionStatus};
    use chrono::Utc;

    fn final_game(home_score: i32, away_score: i32) -> Game {
        Game {
            game_id: "ne_buf_20261004".to_string(),
            league: League::Nfl,
            season: 2026,
            week: 5,
            away_team: "BUF".to_string(),
            home_team: "NE".to_string(),
            game_date: Utc::now(),
            venue: None,
            indoor: false,
            status: GameStatus::Final,
            home_score: Some(home_score),
            away_score: Some(away_score),
        }
    }

    fn home_prediction(market_spread: f64, stake: f64) -> Prediction {
        Prediction {
            prediction_id: "p1".to_string(),
            game_id: "ne_buf_20261004".to_string(),
            generated_at: Utc::now(),
            model_version: "v1".to_string(),
            predicted_spread: market_spread - 1.0,
            predicted_total: None,
            market_spread,
            market_total: None,
            edge_points: 1.0,
            edge_percentage: 8.0,
            stars_rating: 1.0,
            recommended_side: Side::Home,
            stake_units: stake,
            kelly_fraction_used: 0.25,
            confidence_score: 0.4,
            reasoning_text: String::new(),
            status: PredictionStatus::Open,
        }
    }

    /// E5: home -3.0 at -110, stake 1.0. Final home 24 away 20 (margin 4).
    /// Home covers -> win, profit +0.909. Closing home -3.5 -> CLV +0.5.
    #[test]
    fn settles_home_cover_matches_documented_scenario() {
        let prediction = home_prediction(-3.0, 1.0);
        let game = final_game(24, 20);
        let settled = settle_prediction(&prediction, &game, Some(-3.5), 1.909).unwrap();

        assert_eq!(settled.result, SettleResult::Win);
        assert!((settled.profit - 0.909).abs() < 1e-3);
        assert!((settled.clv - 0.5).abs() < 1e-9);
    }

    #[test]
    fn home_bet_push_when_margin_equals_spread_exactly() {
        let prediction = home_prediction(-3.0, 1.0);
        let game = final_game(23, 20); // margin 3, exactly the line
        let settled = settle_prediction(&prediction, &game, None, 1.909).unwrap();
        assert_eq!(settled.result, SettleResult::Push);
        assert_eq!(settled.profit, 0.0);
    }

    #[test]
    fn home_bet_loses_when_home_fails_to_cover() {
        let prediction = home_prediction(-7.0, 2.0);
        let game = final_game(24, 20); // margin 4, short of -7 line
        let settled = settle_prediction(&prediction, &game, None, 1.909).unwrap();
        assert_eq!(settled.result, SettleResult::Loss);
        assert_eq!(settled.profit, -2.0);
    }

    #[test]
    fn away_bet_clv_sign_is_not_flipped() {
        let mut prediction = home_prediction(-3.0, 1.0);
        prediction.recommended_side = Side::Away;
        let game = final_game(20, 24); // away wins outright, covers easily
        let settled = settle_prediction(&prediction, &game, Some(-3.5), 1.909).unwrap();
        assert_eq!(settled.result, SettleResult::Win);
        assert!((settled.clv - (-0.5)).abs() < 1e-9);
    }

    #[test]
    fn check_results_reports_ok_noop_when_no_predictions_pending() {
        let store = Store::open_in_memory().unwrap();
        let (outcome, summary) = check_results(&store, League::Nfl, 5, 1.909).unwrap();
        assert_eq!(outcome, RunOutcome::Ok);
        assert_eq!(summary.settled_count(), 0);
    }

    /// E6: predictions pending but no games final -> NoOp (exit code 2).
    #[test]
    fn check_results_reports_noop_when_games_not_final() {
        let store = Store::open_in_memory().unwrap();
        let mut scheduled = final_game(0, 0);
        scheduled.status = GameStatus::Scheduled;
        scheduled.home_score = None;
        scheduled.away_score = None;
        store.upsert_game(&scheduled).unwrap();
        store.insert_prediction(&home_prediction(-3.0, 1.0)).unwrap();

        let (outcome, summary) = check_results(&store, League::Nfl, 5, 1.909).unwrap();
        assert_eq!(outcome, RunOutcome::NoOp);
        assert_eq!(summary.settled_count(), 0);
    }

    /// P7: once a SettledBet exists, a second check-results run does not
    /// change its result or double-count it in the summary.
    #[test]
    fn check_results_is_monotone_across_repeated_runs() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_game(&final_game(24, 20)).unwrap();
        store.insert_prediction(&home_prediction(-3.0, 1.0)).unwrap();

        let (_, first) = check_results(&store, League::Nfl, 5, 1.909).unwrap();
        assert_eq!(first.wins, 1);

        // Second run: prediction status flipped to settled, so it no longer
        // appears in pending_predictions_for_week at all.
        let (outcome, second) = check_results(&store, League::Nfl, 5, 1.909).unwrap();
        assert_eq!(outcome, RunOutcome::Ok);
        assert_eq!(second.settled_count(), 0);
    }
}
