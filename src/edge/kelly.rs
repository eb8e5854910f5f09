//! Kelly staking math, carried over near-verbatim from the teacher's
//! `bot/kelly.rs` — the formula and the clamping behavior are
//! domain-agnostic and the spec's fractional-Kelly rule (§4.11 step 7)
//! is the same shape, just capped additionally at a fraction of bankroll
//! rather than of a market-implied price.

/// Full Kelly fraction: `f* = (b*p - q) / b`, clamped to `[0, 1]`.
/// `b` = decimal-odds payoff minus 1 (net odds), `p` = win probability.
pub fn kelly_stake(win_prob: f64, decimal_odds: f64, kelly_fraction: f64) -> f64 {
    let b = decimal_odds - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - win_prob;
    let full_kelly = (b * win_prob - q) / b;
    if full_kelly <= 0.0 {
        return 0.0;
    }
    (full_kelly * kelly_fraction).clamp(0.0, 1.0)
}

/// Model edge over the market-implied probability at the given decimal odds.
pub fn edge(win_prob: f64, decimal_odds: f64) -> f64 {
    win_prob * decimal_odds - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_edge_yields_zero_stake() {
        // decimal 2.0 (+100) implies p=0.5; win_prob=0.5 has zero edge.
        let stake = kelly_stake(0.5, 2.0, 0.25);
        assert_relative_eq!(stake, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn positive_edge_yields_positive_stake() {
        let stake = kelly_stake(0.60, 2.0, 1.0);
        // full kelly = (1*0.6 - 0.4)/1 = 0.2
        assert_relative_eq!(stake, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn fractional_multiplier_scales_linearly() {
        let full = kelly_stake(0.60, 2.0, 1.0);
        let quarter = kelly_stake(0.60, 2.0, 0.25);
        assert_relative_eq!(quarter, full * 0.25, epsilon = 1e-9);
    }

    #[test]
    fn negative_edge_yields_zero_stake() {
        let stake = kelly_stake(0.40, 2.0, 0.25);
        assert_relative_eq!(stake, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn stake_never_exceeds_full_bankroll_fraction() {
        let stake = kelly_stake(0.99, 10.0, 1.0);
        assert!(stake <= 1.0);
    }

    #[test]
    fn edge_matches_definition() {
        assert_relative_eq!(edge(0.6, 2.0), 0.2, epsilon = 1e-9);
        assert_relative_eq!(edge(0.5, 2.0), 0.0, epsilon = 1e-9);
    }
}
