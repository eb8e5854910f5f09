//! C13 — scheduler: cron-like gating of collection, edge detection, and
//! results checking. No preemption: a trigger for a league that already has
//! a run in flight queues behind it rather than running concurrently,
//! modeled the same way the teacher's `bot::strategy` serializes position
//! management per market — one `tokio::sync::Mutex` per key, acquired
//! before the work starts, so a second trigger simply waits its turn.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RunOutcome;
use crate::model::League;

type AsyncOutcome = Pin<Box<dyn Future<Output = RunOutcome> + Send>>;
type OutcomeFn = Arc<dyn Fn(League) -> AsyncOutcome + Send + Sync>;

/// Drives C7 (collection) on a periodic cadence, C11 (edge detection)
/// immediately after every successful-or-degraded collection run, and C12
/// (results checking) on its own cadence. The three callbacks are supplied
/// by `main` so this module stays decoupled from `Orchestrator`/`Store`
/// construction details, per the Design Note preferring explicit context
/// objects over process-global singletons.
pub struct Scheduler {
    leagues: Vec<League>,
    collect: OutcomeFn,
    detect_edges: OutcomeFn,
    check_results: OutcomeFn,
    locks: HashMap<League, Arc<Mutex<()>>>,
}

impl Scheduler {
    pub fn new(leagues: Vec<League>, collect: OutcomeFn, detect_edges: OutcomeFn, check_results: OutcomeFn) -> Self {
        let locks = leagues.iter().map(|&l| (l, Arc::new(Mutex::new(())))).collect();
        Scheduler {
            leagues,
            collect,
            detect_edges,
            check_results,
            locks,
        }
    }

    fn lock_for(&self, league: League) -> Arc<Mutex<()>> {
        self.locks
            .get(&league)
            .cloned()
            .expect("every scheduled league has a lock configured in Scheduler::new")
    }

    /// Run one collection pass for `league`, then edge detection only if
    /// the collection run completed cleanly (§4.7 step 5: a degraded
    /// session — coverage shortfall, a critical-source fatal failure, or
    /// any other reason the session didn't complete in full — is marked
    /// degraded and downstream edge detection is *not* triggered; only
    /// `RunOutcome::Ok` advances to edge detection).
    pub async fn trigger_collection_and_detect(&self, league: League) {
        let lock = self.lock_for(league);
        let _guard = lock.lock().await;

        let collect_outcome = (self.collect)(league).await;
        info!(%league, outcome = ?collect_outcome, "collection run finished");

        if matches!(collect_outcome, RunOutcome::Ok) {
            let detect_outcome = (self.detect_edges)(league).await;
            info!(%league, outcome = ?detect_outcome, "edge detection finished");
        } else {
            warn!(%league, outcome = ?collect_outcome, "skipping edge detection: collection run did not complete cleanly");
        }
    }

    /// Run one results-check pass for `league`, queued the same way as
    /// collection per-league.
    pub async fn trigger_check_results(&self, league: League) {
        let lock = self.lock_for(league);
        let _guard = lock.lock().await;
        let outcome = (self.check_results)(league).await;
        info!(%league, outcome = ?outcome, "results check finished");
    }

    /// Block forever, firing collection+detect on `collection_interval` and
    /// results-checking on `check_interval` for every configured league.
    /// Each tick spawns one task per league; a league whose previous run is
    /// still in flight queues behind its own mutex rather than stacking a
    /// concurrent run (§4.13: "new trigger while a run is in progress is
    /// queued, not run concurrently with itself per league").
    pub async fn run_forever(self: Arc<Self>, collection_interval: Duration, check_interval: Duration) {
        let mut collection_tick = tokio::time::interval(collection_interval);
        let mut check_tick = tokio::time::interval(check_interval);
        collection_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        check_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = collection_tick.tick() => {
                    for &league in &self.leagues {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move { this.trigger_collection_and_detect(league).await });
                    }
                }
                _ = check_tick.tick() => {
                    for &league in &self.leagues {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move { this.trigger_check_results(league).await });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    fn outcome_fn(counter: Arc<AtomicU32>) -> OutcomeFn {
        Arc::new(move |_league| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                RunOutcome::Ok
            })
        })
    }

    #[tokio::test]
    async fn successful_collection_triggers_edge_detection() {
        let collect_calls = Arc::new(AtomicU32::new(0));
        let detect_calls = Arc::new(AtomicU32::new(0));
        let check_calls = Arc::new(AtomicU32::new(0));

        let scheduler = Scheduler::new(
            vec![League::Nfl],
            outcome_fn(Arc::clone(&collect_calls)),
            outcome_fn(Arc::clone(&detect_calls)),
            outcome_fn(Arc::clone(&check_calls)),
        );

        scheduler.trigger_collection_and_detect(League::Nfl).await;
        assert_eq!(collect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_collection_skips_edge_detection() {
        let detect_calls = Arc::new(AtomicU32::new(0));
        let collect: OutcomeFn = Arc::new(|_league| Box::pin(async { RunOutcome::Failed }));

        let scheduler = Scheduler::new(
            vec![League::Nfl],
            collect,
            outcome_fn(Arc::clone(&detect_calls)),
            outcome_fn(Arc::new(AtomicU32::new(0))),
        );

        scheduler.trigger_collection_and_detect(League::Nfl).await;
        assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
    }

    /// A degraded collection run (coverage shortfall, critical-source
    /// failure) does not trigger edge detection either -- only a clean
    /// `Ok` run does.
    #[tokio::test]
    async fn degraded_collection_skips_edge_detection() {
        let detect_calls = Arc::new(AtomicU32::new(0));
        let collect: OutcomeFn = Arc::new(|_league| Box::pin(async { RunOutcome::Degraded }));

        let scheduler = Scheduler::new(
            vec![League::Nfl],
            collect,
            outcome_fn(Arc::clone(&detect_calls)),
            outcome_fn(Arc::new(AtomicU32::new(0))),
        );

        scheduler.trigger_collection_and_detect(League::Nfl).await;
        assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
    }

    /// A second trigger for the same league queues behind the first rather
    /// than running concurrently: it cannot observe the counter before the
    /// first trigger's callback has released the lock.
    #[tokio::test]
    async fn second_trigger_for_same_league_queues_behind_the_first() {
        let order = Arc::new(std::sync::Mutex::new(Vec::<&'static str>::new()));
        let release = Arc::new(Notify::new());

        let order_a = Arc::clone(&order);
        let release_a = Arc::clone(&release);
        let collect: OutcomeFn = Arc::new(move |_league| {
            let order = Arc::clone(&order_a);
            let release = Arc::clone(&release_a);
            Box::pin(async move {
                order.lock().unwrap().push("first-start");
                release.notified().await;
                order.lock().unwrap().push("first-end");
                RunOutcome::Ok
            })
        });
        let noop: OutcomeFn = Arc::new(|_league| Box::pin(async { RunOutcome::Ok }));

        let scheduler = Arc::new(Scheduler::new(vec![League::Nfl], collect, noop.clone(), noop));

        let s1 = Arc::clone(&scheduler);
        let first = tokio::spawn(async move { s1.trigger_collection_and_detect(League::Nfl).await });
        tokio::task::yield_now().await;

        let order_b = Arc::clone(&order);
        let s2 = Arc::clone(&scheduler);
        let second = tokio::spawn(async move {
            s2.trigger_collection_and_detect(League::Nfl).await;
            order_b.lock().unwrap().push("second-start");
        });

        tokio::task::yield_now().await;
        release.notify_one();
        first.await.unwrap();
        second.await.unwrap();

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["first-start", "first-end", "second-start"]);
    }
}
