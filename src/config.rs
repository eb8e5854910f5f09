//! Process configuration: CLI flags with environment-variable fallbacks.
//!
//! Every tunable in the pipeline — rate limits, breaker thresholds, cache
//! TTLs, staking parameters — is a field here rather than a scattered
//! constant, so an operator can override any of it without a rebuild.

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "keyline", version, about = "Power-rating edge-detection pipeline")]
pub struct Config {
    /// SQLite database file.
    #[arg(long, env = "KEYLINE_DB_PATH", default_value = "keyline.db")]
    pub database_path: String,

    /// Directory raw per-source payloads are archived under.
    #[arg(long, env = "KEYLINE_RAW_DIR", default_value = "raw")]
    pub raw_dir: String,

    /// Path to the season calendar file (kickoff date -> week number).
    #[arg(long, env = "KEYLINE_SEASON_CALENDAR")]
    pub season_calendar_path: Option<String>,

    /// Directory of per-(league,source) team-name mapping files.
    #[arg(long, env = "KEYLINE_TEAM_MAPPING_DIR", default_value = "config/team_mappings")]
    pub team_mapping_dir: String,

    /// Directory of per-league key-number frequency tables (JSON).
    #[arg(long, env = "KEYLINE_KEY_NUMBER_DIR", default_value = "config/key_numbers")]
    pub key_number_dir: String,

    /// Path to the venue-coordinates table (team_id -> [lat, lon]) used to
    /// key the weather adapter. Missing or omitted means weather is skipped.
    #[arg(long, env = "KEYLINE_VENUE_COORDS_PATH")]
    pub venue_coords_path: Option<String>,

    /// Current season year, used to tag ratings/team-stats rows and raw
    /// archive paths.
    #[arg(long, env = "KEYLINE_SEASON", default_value_t = 2026)]
    pub season: i32,

    /// Odds provider API key.
    #[arg(long, env = "ODDS_API_KEY", default_value = "")]
    pub odds_api_key: String,

    /// Weather provider API key.
    #[arg(long, env = "WEATHER_API_KEY", default_value = "")]
    pub weather_api_key: String,

    // -- Reliability layer (C2) --
    /// Minimum interval between requests of the same client, in milliseconds.
    #[arg(long, env = "KEYLINE_RATE_LIMIT_MS", default_value_t = 500)]
    pub rate_limit_ms: u64,

    /// Max retry attempts for transient failures.
    #[arg(long, env = "KEYLINE_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Retry backoff cap, in seconds.
    #[arg(long, env = "KEYLINE_RETRY_BACKOFF_CAP_SECS", default_value_t = 10)]
    pub retry_backoff_cap_secs: u64,

    /// Consecutive failures before the circuit breaker opens.
    #[arg(long, env = "KEYLINE_BREAKER_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,

    /// Seconds the breaker stays open before a half-open probe is allowed.
    #[arg(long, env = "KEYLINE_BREAKER_RESET_SECS", default_value_t = 300)]
    pub breaker_reset_secs: i64,

    // -- Cache (C3) --
    #[arg(long, env = "KEYLINE_CACHE_TTL_WEATHER_SECS", default_value_t = 1800)]
    pub cache_ttl_weather_secs: i64,

    #[arg(long, env = "KEYLINE_CACHE_TTL_INJURIES_SECS", default_value_t = 900)]
    pub cache_ttl_injuries_secs: i64,

    #[arg(long, env = "KEYLINE_CACHE_TTL_ODDS_SECS", default_value_t = 60)]
    pub cache_ttl_odds_secs: i64,

    #[arg(long, env = "KEYLINE_CACHE_TTL_GENERIC_SECS", default_value_t = 300)]
    pub cache_ttl_generic_secs: i64,

    // -- Power-rating engine (C8) --
    /// Home-field advantage, NFL. Spec treats 2.5 as canonical but
    /// configurable (see Open Questions in DESIGN.md).
    #[arg(long, env = "KEYLINE_HFA_NFL", default_value_t = 2.5)]
    pub hfa_nfl: f64,

    #[arg(long, env = "KEYLINE_HFA_NCAAF", default_value_t = 3.5)]
    pub hfa_ncaaf: f64,

    /// Exponential smoothing weight applied to the prior rating.
    #[arg(long, env = "KEYLINE_RATING_DECAY", default_value_t = 0.9)]
    pub rating_decay: f64,

    // -- Edge detector / staking (C11) --
    /// Starting bankroll, in dollars.
    #[arg(long, env = "KEYLINE_BANKROLL", default_value_t = 10_000.0)]
    pub bankroll: f64,

    /// Fraction of full Kelly used for sizing. Spec fixes this at 0.25.
    #[arg(long, env = "KEYLINE_KELLY_FRACTION", default_value_t = 0.25)]
    pub kelly_fraction: f64,

    /// Maximum stake as a fraction of bankroll, regardless of Kelly size.
    #[arg(long, env = "KEYLINE_MAX_BET_FRACTION", default_value_t = 0.03)]
    pub max_bet_fraction: f64,

    /// Minimum edge percentage required to produce a non-zero stake.
    #[arg(long, env = "KEYLINE_MIN_EDGE_PCT", default_value_t = 5.5)]
    pub min_edge_pct: f64,

    /// Market-vig baseline implied win probability, e.g. 52.38% for -110.
    #[arg(long, env = "KEYLINE_BASELINE_IMPLIED_PROB", default_value_t = 0.5238)]
    pub baseline_implied_prob: f64,

    /// Standard -110 decimal payoff used when no captured price is stored.
    #[arg(long, env = "KEYLINE_DEFAULT_DECIMAL_ODDS", default_value_t = 1.909)]
    pub default_decimal_odds: f64,

    // -- Collection orchestrator --
    /// Minimum fraction of expected teams a source must cover to pass
    /// post-flight validation.
    #[arg(long, env = "KEYLINE_MIN_TEAM_COVERAGE", default_value_t = 0.9)]
    pub min_team_coverage: f64,

    /// Suppress all writes; still run the full computation.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Bind address for the ambient health endpoint.
    #[arg(long, env = "KEYLINE_HEALTH_ADDR", default_value = "127.0.0.1:8787")]
    pub health_addr: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_ms == 0 {
            bail!("rate_limit_ms must be > 0");
        }
        if self.retry_attempts == 0 || self.retry_attempts > 10 {
            bail!("retry_attempts must be in 1..=10, got {}", self.retry_attempts);
        }
        if self.retry_backoff_cap_secs == 0 {
            bail!("retry_backoff_cap_secs must be > 0");
        }
        if self.breaker_failure_threshold == 0 {
            bail!("breaker_failure_threshold must be > 0");
        }
        if self.breaker_reset_secs <= 0 {
            bail!("breaker_reset_secs must be > 0");
        }
        for (name, ttl) in [
            ("cache_ttl_weather_secs", self.cache_ttl_weather_secs),
            ("cache_ttl_injuries_secs", self.cache_ttl_injuries_secs),
            ("cache_ttl_odds_secs", self.cache_ttl_odds_secs),
            ("cache_ttl_generic_secs", self.cache_ttl_generic_secs),
        ] {
            if ttl <= 0 {
                bail!("{name} must be > 0");
            }
        }
        if !(0.0..=10.0).contains(&self.hfa_nfl) {
            bail!("hfa_nfl out of plausible range: {}", self.hfa_nfl);
        }
        if !(0.0..=10.0).contains(&self.hfa_ncaaf) {
            bail!("hfa_ncaaf out of plausible range: {}", self.hfa_ncaaf);
        }
        if !(0.0..1.0).contains(&self.rating_decay) {
            bail!("rating_decay must be in [0, 1), got {}", self.rating_decay);
        }
        if self.bankroll <= 0.0 {
            bail!("bankroll must be > 0");
        }
        if !(0.0..=1.0).contains(&self.kelly_fraction) {
            bail!("kelly_fraction must be in [0, 1], got {}", self.kelly_fraction);
        }
        if !(0.0..=1.0).contains(&self.max_bet_fraction) {
            bail!("max_bet_fraction must be in [0, 1], got {}", self.max_bet_fraction);
        }
        if self.min_edge_pct < 0.0 {
            bail!("min_edge_pct must be >= 0");
        }
        if !(0.0..1.0).contains(&self.baseline_implied_prob) {
            bail!(
                "baseline_implied_prob must be in (0, 1), got {}",
                self.baseline_implied_prob
            );
        }
        if self.default_decimal_odds <= 1.0 {
            bail!("default_decimal_odds must be > 1.0");
        }
        if !(0.0..=1.0).contains(&self.min_team_coverage) {
            bail!("min_team_coverage must be in [0, 1]");
        }
        Ok(())
    }
}
