//! C9 — factor calculator: GameContext -> signed point adjustments.
//!
//! Same shape as the teacher's `bot/win_probability.rs` (constants block
//! with an empirical-calibration comment, a pure compute function, and a
//! `detail_map` style breakdown) but produces the spec's S/W/E rollup
//! instead of an in-play win probability.

use std::collections::HashMap;

use crate::model::GameContext;

/// 5 S-factor points ≡ 1 spread point.
const S_FACTOR_POINTS_PER_SPREAD_POINT: f64 = 5.0;
/// 5 E-factor points ≡ 1 spread point.
const E_FACTOR_POINTS_PER_SPREAD_POINT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct FactorResult {
    pub spread_adjustment: f64,
    pub total_adjustment: f64,
    pub summary_text: String,
    pub detail_map: HashMap<String, f64>,
}

/// Buckets the signed rest-day *differential* (for minus against), not
/// either side's absolute rest days — a 1-day edge and a 4-day edge over a
/// 3-day edge must tier differently even when the absolute day counts
/// overlap.
fn rest_factor(rest_day_differential: i32) -> f64 {
    match rest_day_differential {
        d if d >= 3 => 3.0,
        2 => 2.0,
        1 => 1.0,
        0 => 0.0,
        -1 => -1.0,
        -2 => -2.0,
        _ => -3.0,
    }
}

fn travel_factor(timezones: i32, miles: f64) -> f64 {
    if timezones >= 3 {
        -3.0
    } else if miles >= 2000.0 {
        -2.0
    } else if miles >= 1000.0 {
        -1.0
    } else {
        0.0
    }
}

fn ats_streak_factor(last_5: &[bool]) -> f64 {
    let wins = last_5.iter().filter(|&&w| w).count();
    let games = last_5.len();
    if games == 5 && (wins == 4 || wins == 5) {
        2.0
    } else if games == 5 && (wins == 0 || wins == 1) {
        -2.0
    } else {
        0.0
    }
}

fn wind_factor(wind_mph: f64) -> f64 {
    if wind_mph >= 25.0 {
        -7.0
    } else if wind_mph >= 20.0 {
        -5.0
    } else if wind_mph >= 15.0 {
        -3.0
    } else {
        0.0
    }
}

fn cold_factor(temp_f: f64) -> f64 {
    if temp_f < 20.0 {
        -3.0
    } else {
        0.0
    }
}

/// Translate a `GameContext` into `(spread_adjustment, total_adjustment,
/// summary_text, detail_map)` favoring the team the context describes.
pub fn compute_factors(ctx: &GameContext) -> FactorResult {
    let mut detail = HashMap::new();

    let rest = rest_factor(ctx.rest_days_for - ctx.rest_days_against);
    let travel = travel_factor(ctx.travel_timezones, ctx.travel_miles);
    let divisional = if ctx.divisional { 1.0 } else { 0.0 };
    let rivalry = if ctx.rivalry { 2.0 } else { 0.0 };
    let revenge = if ctx.revenge { 2.0 } else { 0.0 };
    let ats = ats_streak_factor(&ctx.ats_last_5);

    let s_total = rest + travel + divisional + rivalry + revenge + ats;
    detail.insert("s_rest".to_string(), rest);
    detail.insert("s_travel".to_string(), travel);
    detail.insert("s_divisional".to_string(), divisional);
    detail.insert("s_rivalry".to_string(), rivalry);
    detail.insert("s_revenge".to_string(), revenge);
    detail.insert("s_ats_streak".to_string(), ats);
    detail.insert("s_total".to_string(), s_total);

    let elimination = if ctx.playoff_elimination { 5.0 } else { 0.0 };
    let clinch = if ctx.playoff_clinch { 3.0 } else { 0.0 };
    let seeding = if ctx.seeding_implications { 2.0 } else { 0.0 };
    let new_hc = if ctx.new_head_coach { 2.0 } else { 0.0 };
    let star = if ctx.key_returning_star { 1.0 } else { 0.0 };

    let e_total = elimination + clinch + seeding + new_hc + star;
    detail.insert("e_elimination".to_string(), elimination);
    detail.insert("e_clinch".to_string(), clinch);
    detail.insert("e_seeding".to_string(), seeding);
    detail.insert("e_new_hc".to_string(), new_hc);
    detail.insert("e_returning_star".to_string(), star);
    detail.insert("e_total".to_string(), e_total);

    let total_adjustment = if ctx.indoor {
        0.0
    } else {
        wind_factor(ctx.wind_mph) + cold_factor(ctx.temp_f)
    };
    detail.insert("w_total".to_string(), total_adjustment);

    let spread_adjustment = s_total / S_FACTOR_POINTS_PER_SPREAD_POINT
        + e_total / E_FACTOR_POINTS_PER_SPREAD_POINT;

    let summary_text = format!(
        "S={s_total:+.1} ({:+.2} pts) E={e_total:+.1} ({:+.2} pts) W={total_adjustment:+.1} pts",
        s_total / S_FACTOR_POINTS_PER_SPREAD_POINT,
        e_total / E_FACTOR_POINTS_PER_SPREAD_POINT,
    );

    FactorResult {
        spread_adjustment,
        total_adjustment,
        summary_text,
        detail_map: detail,
    }
}
