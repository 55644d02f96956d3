//! Single-flight credential refresh after authorization failures.
//!
//! The first request to hit a 401 becomes the leader of a refresh cycle and
//! runs the refresher. Requests that hit a 401 while the cycle is running
//! park on a oneshot channel and receive the cycle's outcome. Each settled
//! cycle bumps `generation`, so a request that was sent before a cycle
//! settled and comes back with a 401 afterwards adopts that cycle's outcome
//! instead of starting another refresh.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::hooks::{GlobalHandlers, TokenRefresher};
use super::lock;

/// Result of a refresh cycle as seen by each waiting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New credentials are in place; replay the request.
    Refreshed,
    /// Session is gone; the request fails with an authorization error.
    Failed,
}

#[derive(Debug, Default)]
struct RefreshState {
    in_progress: bool,
    generation: u64,
    last_outcome: Option<RefreshOutcome>,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Serializes concurrent authorization failures behind one refresh.
#[derive(Debug)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    timeout: Duration,
}

impl RefreshCoordinator {
    /// `timeout` bounds each refresh call; expiry counts as a failed refresh.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            timeout,
        }
    }

    /// Number of settled refresh cycles. Capture before dispatch, pass to `recover`.
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).in_progress
    }

    /// Wait for credentials to be renewed after a 401.
    ///
    /// `observed_generation` is the value of [`generation`](Self::generation)
    /// when the failing request was sent. Without a refresher every cycle
    /// fails at once, so a burst of 401s still logs out a single time.
    pub async fn recover(
        &self,
        observed_generation: u64,
        refresher: Option<&dyn TokenRefresher>,
        handlers: &dyn GlobalHandlers,
    ) -> RefreshOutcome {
        loop {
            let waiter = {
                let mut state = lock(&self.state);
                if !state.in_progress && state.generation != observed_generation {
                    if let Some(outcome) = state.last_outcome {
                        debug!(?outcome, "adopting outcome of a refresh that settled after dispatch");
                        return outcome;
                    }
                }
                if state.in_progress {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(tx);
                    Some(rx)
                } else {
                    state.in_progress = true;
                    None
                }
            };
            match waiter {
                Some(rx) => match rx.await {
                    Ok(outcome) => return outcome,
                    // Leader was dropped mid-refresh; compete to lead a new cycle.
                    Err(_) => continue,
                },
                None => return self.lead(refresher, handlers).await,
            }
        }
    }

    async fn lead(
        &self,
        refresher: Option<&dyn TokenRefresher>,
        handlers: &dyn GlobalHandlers,
    ) -> RefreshOutcome {
        let mut cycle = CycleGuard {
            coordinator: self,
            armed: true,
        };
        let outcome = match refresher {
            Some(refresher) => self.refresh_with(refresher).await,
            None => {
                info!("authorization failed and no refresher is configured");
                RefreshOutcome::Failed
            }
        };
        let waiters = cycle.settle(outcome);
        if outcome == RefreshOutcome::Failed {
            handlers.logout();
        }
        debug!(waiters = waiters.len(), ?outcome, "resuming parked requests");
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }
        outcome
    }

    async fn refresh_with(&self, refresher: &dyn TokenRefresher) -> RefreshOutcome {
        info!("authorization failed; refreshing credentials");
        match tokio::time::timeout(self.timeout, refresher.refresh_token()).await {
            Ok(Ok(true)) => RefreshOutcome::Refreshed,
            Ok(Ok(false)) => {
                warn!("token refresh was rejected");
                RefreshOutcome::Failed
            }
            Ok(Err(err)) => {
                warn!(error = %err, "token refresh failed");
                RefreshOutcome::Failed
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "token refresh timed out");
                RefreshOutcome::Failed
            }
        }
    }
}

/// Resets the cycle if the leader is dropped before the refresh settles.
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl CycleGuard<'_> {
    fn settle(&mut self, outcome: RefreshOutcome) -> Vec<oneshot::Sender<RefreshOutcome>> {
        self.armed = false;
        let mut state = lock(&self.coordinator.state);
        state.in_progress = false;
        state.generation = state.generation.wrapping_add(1);
        state.last_outcome = Some(outcome);
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(&self.coordinator.state);
        state.in_progress = false;
        // Dropping the senders wakes waiters so one of them can lead a new cycle.
        state.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{CountingRefresher, RecordingHandlers};
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_failures_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new(Duration::from_secs(5)));
        let refresher = Arc::new(CountingRefresher::succeeding(Duration::from_millis(50)));
        let handlers = Arc::new(RecordingHandlers::default());

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let refresher = refresher.clone();
            let handlers = handlers.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .recover(0, Some(&*refresher as &dyn TokenRefresher), handlers.as_ref())
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.expect("join"), RefreshOutcome::Refreshed);
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(handlers.logouts(), 0);
        assert_eq!(coordinator.generation(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn failed_refresh_logs_out_once_and_fails_everyone() {
        let coordinator = Arc::new(RefreshCoordinator::new(Duration::from_secs(5)));
        let refresher = Arc::new(CountingRefresher::failing(Duration::from_millis(50)));
        let handlers = Arc::new(RecordingHandlers::default());

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let refresher = refresher.clone();
            let handlers = handlers.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .recover(0, Some(&*refresher as &dyn TokenRefresher), handlers.as_ref())
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.expect("join"), RefreshOutcome::Failed);
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(handlers.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_timeout_is_a_failure() {
        let coordinator = RefreshCoordinator::new(Duration::from_millis(100));
        let refresher = CountingRefresher::succeeding(Duration::from_secs(10));
        let handlers = RecordingHandlers::default();
        let outcome = coordinator.recover(0, Some(&refresher), &handlers).await;
        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(handlers.logouts(), 1);
    }

    #[tokio::test]
    async fn late_failure_adopts_settled_cycle() {
        let coordinator = RefreshCoordinator::new(Duration::from_secs(5));
        let refresher = CountingRefresher::succeeding(Duration::ZERO);
        let handlers = RecordingHandlers::default();

        assert_eq!(
            coordinator.recover(0, Some(&refresher), &handlers).await,
            RefreshOutcome::Refreshed
        );
        // Sent before the cycle settled, failed after: no second refresh.
        assert_eq!(
            coordinator.recover(0, Some(&refresher), &handlers).await,
            RefreshOutcome::Refreshed
        );
        assert_eq!(refresher.calls(), 1);

        // Sent after the cycle settled: a fresh cycle is allowed.
        let current = coordinator.generation();
        coordinator.recover(current, Some(&refresher), &handlers).await;
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn dropped_leader_releases_the_cycle() {
        let coordinator = Arc::new(RefreshCoordinator::new(Duration::from_secs(5)));
        let slow = Arc::new(CountingRefresher::succeeding(Duration::from_secs(60)));
        let handlers = Arc::new(RecordingHandlers::default());

        let leader = {
            let coordinator = coordinator.clone();
            let slow = slow.clone();
            let handlers = handlers.clone();
            tokio::spawn(async move { coordinator.recover(0, Some(&*slow as &dyn TokenRefresher), handlers.as_ref()).await })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        leader.abort();
        let _ = leader.await;
        assert!(!coordinator.is_refreshing());

        let quick = CountingRefresher::succeeding(Duration::ZERO);
        let outcome = coordinator.recover(0, Some(&quick), handlers.as_ref()).await;
        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(quick.calls(), 1);
    }

    #[tokio::test]
    async fn missing_refresher_fails_a_burst_with_one_logout() {
        let coordinator = Arc::new(RefreshCoordinator::new(Duration::from_secs(5)));
        let handlers = Arc::new(RecordingHandlers::default());

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let handlers = handlers.clone();
            tasks.push(tokio::spawn(async move {
                coordinator.recover(0, None, handlers.as_ref()).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.expect("join"), RefreshOutcome::Failed);
        }
        assert_eq!(handlers.logouts(), 1);
        assert_eq!(coordinator.generation(), 1);

        // A request dispatched after the burst starts a new cycle.
        assert_eq!(
            coordinator.recover(1, None, handlers.as_ref()).await,
            RefreshOutcome::Failed
        );
        assert_eq!(handlers.logouts(), 2);
    }
}
