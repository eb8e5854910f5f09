//! External ratings-feed adapter (a Massey-style composite power-rating
//! site). Used only as a sanity cross-check during preseason calibration
//! (§4.8's "preseason composition" note) — the pipeline's own C8 engine is
//! always authoritative for in-season predictions.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::error::PipelineError;
use crate::http::ReliableClient;
use crate::model::League;

use super::SourceAdapter;

#[derive(Debug, Deserialize)]
struct RatingsFeedResponse {
    ratings: HashMap<String, f64>,
}

pub struct CompositeRatingsAdapter {
    client: Arc<ReliableClient>,
    base_url: String,
    cache: TtlCache<League, HashMap<String, f64>>,
}

impl CompositeRatingsAdapter {
    pub fn new(client: Arc<ReliableClient>, base_url: Option<&str>) -> Self {
        CompositeRatingsAdapter {
            client,
            base_url: base_url.unwrap_or("https://example-ratings-feed.test").to_string(),
            // §4.3 generic TTL: this feed has no dedicated category and
            // updates at most a few times a day.
            cache: TtlCache::new(300),
        }
    }

    pub fn with_cache_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.cache = TtlCache::new(ttl_secs);
        self
    }
}

#[async_trait]
impl SourceAdapter for CompositeRatingsAdapter {
    type Output = HashMap<String, f64>;

    fn name(&self) -> &str {
        "composite_ratings_feed"
    }

    async fn fetch(&self, league: League) -> Result<HashMap<String, f64>, PipelineError> {
        if let Some(cached) = self.cache.get(&league).await {
            return Ok(cached);
        }
        let url = format!("{}/{}/ratings.json", self.base_url, league.as_str());
        let response: RatingsFeedResponse = self.client.get_json(&url).await?;
        self.cache.put(league, response.ratings.clone()).await;
        Ok(response.ratings)
    }
}
