//! Injury-report adapter. Same ESPN-site-API family as the scoreboard
//! adapter, different endpoint; confidence/point-value scoring is the
//! normalizer/factor calculator's job, not the adapter's — this layer only
//! parses the wire shape into `InjuryReport` rows.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::error::PipelineError;
use crate::http::ReliableClient;
use crate::model::{InjuryReport, InjurySeverity, League};

use super::SourceAdapter;

#[derive(Debug, Deserialize)]
struct InjuriesResponse {
    items: Vec<InjuryItem>,
}

#[derive(Debug, Deserialize)]
struct InjuryItem {
    team_abbreviation: String,
    athlete_name: String,
    position: String,
    status: String,
    #[serde(default)]
    long_comment: Option<String>,
}

fn severity_from_status(status: &str) -> InjurySeverity {
    match status.to_ascii_lowercase().as_str() {
        "out" | "injured reserve" | "ir" => InjurySeverity::Severe,
        "doubtful" => InjurySeverity::Moderate,
        "questionable" => InjurySeverity::Minor,
        _ => InjurySeverity::Healthy,
    }
}

pub struct EspnInjuriesAdapter {
    client: Arc<ReliableClient>,
    base_url: String,
    cache: TtlCache<League, Vec<InjuryReport>>,
}

impl EspnInjuriesAdapter {
    pub fn new(client: Arc<ReliableClient>, base_url: Option<&str>) -> Self {
        EspnInjuriesAdapter {
            client,
            base_url: base_url
                .unwrap_or("https://site.api.espn.com/apis/site/v2/sports/football")
                .to_string(),
            // §4.3: injury designations change on a practice-report cadence.
            cache: TtlCache::new(900),
        }
    }

    pub fn with_cache_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.cache = TtlCache::new(ttl_secs);
        self
    }

    fn league_path(league: League) -> &'static str {
        match league {
            League::Nfl => "nfl",
            League::Ncaaf => "college-football",
        }
    }
}

#[async_trait]
impl SourceAdapter for EspnInjuriesAdapter {
    type Output = Vec<InjuryReport>;

    fn name(&self) -> &str {
        "espn_injuries"
    }

    async fn fetch(&self, league: League) -> Result<Vec<InjuryReport>, PipelineError> {
        if let Some(cached) = self.cache.get(&league).await {
            return Ok(cached);
        }

        let url = format!("{}/{}/injuries", self.base_url, Self::league_path(league));
        let response: InjuriesResponse = self.client.get_json(&url).await?;
        let now = Utc::now();
        let reports: Vec<InjuryReport> = response
            .items
            .into_iter()
            .map(|item| InjuryReport {
                team: item.team_abbreviation,
                player_name: item.athlete_name,
                position: item.position,
                status: item.status.clone(),
                captured_at: now,
                point_value: 0.0, // populated downstream from a depth-chart weighting table
                replacement_value: 0.0,
                severity: severity_from_status(&item.status),
                confidence: if item.long_comment.is_some() { 0.9 } else { 0.6 },
                source: "espn".to_string(),
            })
            .collect();
        self.cache.put(league, reports.clone()).await;
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_out_to_severe_and_questionable_to_minor() {
        assert_eq!(severity_from_status("Out"), InjurySeverity::Severe);
        assert_eq!(severity_from_status("Questionable"), InjurySeverity::Minor);
        assert_eq!(severity_from_status("Probable"), InjurySeverity::Healthy);
    }
}
