//! C4 — source adapters: one per upstream, each parsing its own wire
//! format into canonical entities behind a common trait. Shape follows the
//! teacher's `live_scores::provider::ScoreProvider` (a small async trait
//! plus a `name()` for logging), generalized from "live games" to the
//! spec's five source kinds (§4.4).

pub mod espn;
pub mod odds;
pub mod injuries;
pub mod weather;
pub mod ratings_feed;
pub mod team_stats;

use async_trait::async_trait;

use crate::error::PipelineError;

/// Every adapter fetches one batch of raw records for one league and
/// reports how it went, so the orchestrator (C7) can log per-source
/// success/failure without each adapter knowing about sessions.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    type Output;

    fn name(&self) -> &str;

    async fn fetch(&self, league: crate::model::League) -> Result<Self::Output, PipelineError>;
}
