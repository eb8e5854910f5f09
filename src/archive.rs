//! Raw-artifact archival: one JSON file per fetch, so a disputed prediction
//! or a normalizer bug can be traced back to exactly what a source returned.
//! Grounded on the teacher's `db::Database` "write what you got, idempotent
//! path" discipline, generalized from SQLite rows to flat files since the
//! payloads here are opaque upstream JSON rather than canonical entities.
//!
//! Layout: `raw/<league>/<source>/<yyyy>/<ww>/<timestamp>.json`, per §6.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::League;

pub fn archive_raw<T: Serialize>(
    raw_dir: &str,
    league: League,
    source: &str,
    week: i32,
    captured_at: DateTime<Utc>,
    payload: &T,
) -> Result<PathBuf> {
    let dir = PathBuf::from(raw_dir)
        .join(league.as_str())
        .join(source)
        .join(captured_at.format("%Y").to_string())
        .join(format!("{:02}", week.max(0)));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating raw archive dir {}", dir.display()))?;

    let file = dir.join(format!("{}.json", captured_at.format("%Y%m%dT%H%M%S%.3f")));
    let body = serde_json::to_vec_pretty(payload).context("serializing raw archive payload")?;
    std::fs::write(&file, body).with_context(|| format!("writing raw archive file {}", file.display()))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_under_the_documented_layout() {
        let dir = tempdir();
        let captured_at = DateTime::parse_from_rfc3339("2026-10-04T18:00:00Z").unwrap().with_timezone(&Utc);
        let path = archive_raw(dir.to_str().unwrap(), League::Nfl, "espn_scoreboard", 5, captured_at, &json!({"ok": true})).unwrap();
        assert!(path.starts_with(dir.join("nfl").join("espn_scoreboard").join("2026").join("05")));
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("keyline-archive-test-{:?}", std::thread::current().id()));
        p
    }
}
