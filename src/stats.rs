//! Statistics polling controller.
//!
//! Owns the loading/error/data state for the selected [`TimeWindow`]. A fetch
//! is started synchronously (state flips to `Loading`), awaited without
//! borrowing the controller, then applied. Each start bumps a generation
//! counter and only the completion carrying the current generation is
//! applied, so a slow response for an earlier window can never overwrite
//! the one the user selected last.

use crate::api::StatsSource;
use crate::error::ApiError;
use crate::models::{StatsSnapshot, TimeWindow};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the dashboard should currently display.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsState {
    /// Nothing requested yet.
    Idle,
    /// A fetch is in flight; no data is shown meanwhile.
    Loading,
    Loaded(StatsSnapshot),
    /// Last fetch failed; holds the message to show next to a retry action.
    Errored(String),
}

/// A started fetch, detached from the controller.
///
/// Dropping it before completion abandons the request; its generation is
/// then simply never applied.
pub struct PendingFetch {
    source: Arc<dyn StatsSource>,
    window: TimeWindow,
    generation: u64,
}

impl PendingFetch {
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self) -> FetchOutcome {
        let result = self.source.fetch_stats(self.window).await;
        FetchOutcome {
            window: self.window,
            generation: self.generation,
            result,
        }
    }
}

/// Completion of a [`PendingFetch`], to be handed to [`StatsController::apply`].
#[derive(Debug)]
pub struct FetchOutcome {
    pub window: TimeWindow,
    pub generation: u64,
    pub result: Result<StatsSnapshot, ApiError>,
}

pub struct StatsController {
    source: Arc<dyn StatsSource>,
    window: TimeWindow,
    generation: u64,
    state: StatsState,
}

impl StatsController {
    pub fn new(source: Arc<dyn StatsSource>, window: TimeWindow) -> Self {
        Self {
            source,
            window,
            generation: 0,
            state: StatsState::Idle,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn state(&self) -> &StatsState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, StatsState::Loading)
    }

    pub fn snapshot(&self) -> Option<&StatsSnapshot> {
        match &self.state {
            StatsState::Loaded(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            StatsState::Errored(message) => Some(message),
            _ => None,
        }
    }

    /// Switch to `window` and start fetching it. Selecting the current
    /// window again does nothing and returns `None`.
    pub fn set_window(&mut self, window: TimeWindow) -> Option<PendingFetch> {
        if window == self.window {
            return None;
        }
        info!(from = %self.window, to = %window, "statistics window changed");
        self.window = window;
        Some(self.begin())
    }

    /// Start a fetch for the current window, whatever the current state.
    pub fn refetch(&mut self) -> PendingFetch {
        self.begin()
    }

    fn begin(&mut self) -> PendingFetch {
        self.generation += 1;
        self.state = StatsState::Loading;
        debug!(window = %self.window, generation = self.generation, "statistics fetch started");
        PendingFetch {
            source: Arc::clone(&self.source),
            window: self.window,
            generation: self.generation,
        }
    }

    /// Fold a completed fetch into the state. Returns `false` when the
    /// outcome belongs to a superseded request and was discarded.
    pub fn apply(&mut self, outcome: FetchOutcome) -> bool {
        if outcome.generation != self.generation {
            debug!(
                window = %outcome.window,
                generation = outcome.generation,
                current = self.generation,
                "discarding stale statistics response"
            );
            return false;
        }

        self.state = match outcome.result {
            Ok(snapshot) => {
                info!(
                    window = %outcome.window,
                    points = snapshot.activity.len(),
                    "statistics loaded"
                );
                StatsState::Loaded(snapshot)
            }
            Err(e) => {
                warn!(window = %outcome.window, error = %e, "failed to fetch statistics");
                StatsState::Errored(e.user_message())
            }
        };
        true
    }

    /// Fetch the current window and apply the result.
    pub async fn reload(&mut self) {
        let pending = self.refetch();
        let outcome = pending.run().await;
        self.apply(outcome);
    }

    /// Switch window, fetch and apply. Returns `false` if the window was
    /// already selected and nothing was fetched.
    pub async fn select_window(&mut self, window: TimeWindow) -> bool {
        match self.set_window(window) {
            Some(pending) => {
                let outcome = pending.run().await;
                self.apply(outcome)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivitySeries, MetricValue, SummaryMetrics, Trend};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn metric(value: f64) -> MetricValue {
        MetricValue {
            value,
            change_percent: 0.0,
            trend: Trend::Stable,
            description: "Flat".to_string(),
        }
    }

    fn snapshot(window: TimeWindow) -> StatsSnapshot {
        let points = match window {
            TimeWindow::Day => 24,
            TimeWindow::Week => 7,
            TimeWindow::Month => 30,
        };
        StatsSnapshot {
            window,
            summary: SummaryMetrics {
                total_conversations: metric(points as f64),
                active_users: metric(1.0),
                avg_conversation_length: metric(2.0),
                growth_rate: metric(3.0),
            },
            activity: ActivitySeries {
                labels: (0..points).map(|i| i.to_string()).collect(),
                values: vec![1.0; points],
            },
            recent_conversations: vec![],
            top_users: vec![],
        }
    }

    /// Answers every window with a snapshot, or fails while `fail` is set.
    #[derive(Default)]
    struct FakeStats {
        calls: Mutex<Vec<TimeWindow>>,
        fail: Mutex<Option<ApiError>>,
    }

    #[async_trait]
    impl StatsSource for FakeStats {
        async fn fetch_stats(&self, window: TimeWindow) -> Result<StatsSnapshot, ApiError> {
            self.calls.lock().unwrap().push(window);
            match self.fail.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(snapshot(window)),
            }
        }
    }

    fn controller() -> (Arc<FakeStats>, StatsController) {
        let fake = Arc::new(FakeStats::default());
        let ctrl = StatsController::new(fake.clone(), TimeWindow::Week);
        (fake, ctrl)
    }

    #[tokio::test]
    async fn test_initial_state_is_idle_then_loaded() {
        let (fake, mut ctrl) = controller();
        assert_eq!(ctrl.state(), &StatsState::Idle);

        ctrl.reload().await;
        assert_eq!(ctrl.snapshot().unwrap().window, TimeWindow::Week);
        assert_eq!(*fake.calls.lock().unwrap(), vec![TimeWindow::Week]);
    }

    #[tokio::test]
    async fn test_set_window_clears_snapshot_before_fetch() {
        let (_fake, mut ctrl) = controller();
        ctrl.reload().await;
        assert!(ctrl.snapshot().is_some());

        let pending = ctrl.set_window(TimeWindow::Day).unwrap();
        assert!(ctrl.is_loading());
        assert!(ctrl.snapshot().is_none());
        assert_eq!(pending.window(), TimeWindow::Day);

        assert!(ctrl.apply(pending.run().await));
        assert_eq!(ctrl.snapshot().unwrap().window, TimeWindow::Day);
    }

    #[tokio::test]
    async fn test_same_window_is_noop() {
        let (fake, mut ctrl) = controller();
        ctrl.reload().await;
        assert!(ctrl.set_window(TimeWindow::Week).is_none());
        assert!(!ctrl.select_window(TimeWindow::Week).await);
        assert_eq!(fake.calls.lock().unwrap().len(), 1);
        assert!(ctrl.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_refetch_targets_same_window_and_overwrites() {
        let (fake, mut ctrl) = controller();
        ctrl.reload().await;
        ctrl.reload().await;
        ctrl.reload().await;
        assert_eq!(*fake.calls.lock().unwrap(), vec![TimeWindow::Week; 3]);
        assert_eq!(ctrl.snapshot().unwrap().activity.len(), 7);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let (_fake, mut ctrl) = controller();

        let to_day = ctrl.set_window(TimeWindow::Day).unwrap();
        let to_month = ctrl.set_window(TimeWindow::Month).unwrap();
        assert!(to_month.generation() > to_day.generation());

        // The later request completes first
        let month = to_month.run().await;
        let day = to_day.run().await;
        assert!(ctrl.apply(month));
        assert!(!ctrl.apply(day));

        assert_eq!(ctrl.window(), TimeWindow::Month);
        assert_eq!(ctrl.snapshot().unwrap().window, TimeWindow::Month);
    }

    #[tokio::test]
    async fn test_failure_clears_data_and_sets_message() {
        let (fake, mut ctrl) = controller();
        ctrl.reload().await;

        *fake.fail.lock().unwrap() = Some(ApiError::Network {
            service: "Stats API",
            base_url: "http://localhost:8001".to_string(),
            reason: "connection refused".to_string(),
        });
        ctrl.reload().await;
        assert!(ctrl.snapshot().is_none());
        assert!(ctrl.error().unwrap().contains("Make sure the service is running"));

        // Recovery is an explicit refetch
        *fake.fail.lock().unwrap() = None;
        ctrl.reload().await;
        assert!(ctrl.error().is_none());
        assert!(ctrl.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_http_failure_message_carries_detail() {
        let (fake, mut ctrl) = controller();
        *fake.fail.lock().unwrap() = Some(ApiError::Http {
            service: "Stats API",
            status: 400,
            detail: "Invalid period".to_string(),
        });
        ctrl.select_window(TimeWindow::Month).await;
        assert!(matches!(ctrl.state(), StatsState::Errored(msg) if msg.contains("Invalid period")));
        // Failures are never retried automatically
        assert_eq!(fake.calls.lock().unwrap().len(), 1);
    }
}
