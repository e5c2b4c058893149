//! Preference sync client.
//!
//! Holds the scored result set, debounces preference changes and asks a
//! [`Scorer`] to re-score the held shifts. A successful response replaces the
//! whole result set; any failure leaves it exactly as it was.
//!
//! Each issued request carries a sequence number. A response is applied only
//! while its request is still the latest one issued, so a slow response can
//! never overwrite a newer result.

pub mod error;
pub mod scorer;

pub use error::SyncError;
pub use scorer::{HttpScorer, LocalScorer, ScoreRequest, ScoreResponse, Scorer};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::SyncConfig;
use crate::preferences::Preferences;
use crate::scoring::ScoredShift;
use crate::shift::Shift;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub type ResultSet = Arc<Vec<ScoredShift>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Scheduled,
    InFlight,
}

pub struct PreferenceSyncClient<S: Scorer + 'static> {
    shared: Arc<Shared<S>>,
    preferences: watch::Receiver<Preferences>,
    debounce: Duration,
    pending: Option<JoinHandle<()>>,
}

struct Shared<S> {
    scorer: S,
    results: watch::Sender<ResultSet>,
    issued: AtomicU64,
    in_flight: AtomicUsize,
}

impl PreferenceSyncClient<HttpScorer> {
    pub fn from_config(
        config: &SyncConfig,
        preferences: watch::Receiver<Preferences>,
    ) -> Result<Self, SyncError> {
        let scorer = HttpScorer::new(config.scorer_url.clone(), config.request_timeout())?;
        Ok(Self::new(scorer, preferences, config.debounce()))
    }
}

impl<S: Scorer + 'static> PreferenceSyncClient<S> {
    pub fn new(scorer: S, preferences: watch::Receiver<Preferences>, debounce: Duration) -> Self {
        let (results, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                scorer,
                results,
                issued: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
            preferences,
            debounce,
            pending: None,
        }
    }

    /// Seeds or replaces the result set from an external discovery step.
    pub fn replace_results(&self, scored: Vec<ScoredShift>) {
        self.shared.results.send_replace(Arc::new(scored));
    }

    pub fn results(&self) -> ResultSet {
        Arc::clone(&self.shared.results.borrow())
    }

    /// Receiver that observes every replacement of the result set.
    pub fn subscribe(&self) -> watch::Receiver<ResultSet> {
        self.shared.results.subscribe()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn phase(&self) -> SyncPhase {
        if self.pending.as_ref().is_some_and(|h| !h.is_finished()) {
            SyncPhase::Scheduled
        } else if self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            SyncPhase::InFlight
        } else {
            SyncPhase::Idle
        }
    }

    /// Called on every filter change. Restarts the quiet period; when it
    /// elapses without another change a single re-score request is sent.
    pub fn on_preferences_changed(&mut self) {
        if self.shared.results.borrow().is_empty() {
            trace!("result set empty; ignoring preference change");
            return;
        }
        self.cancel_pending();

        let shared = Arc::clone(&self.shared);
        let preferences = self.preferences.clone();
        let delay = self.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let snapshot = preferences.borrow().clone();
            // Detached so that superseding the timer never cancels a sent request.
            shared.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let outcome = shared.sync(snapshot).await;
                shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                log_outcome(outcome);
            });
        }));
    }

    /// Drops a scheduled sync that has not fired yet.
    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                trace!("superseding pending sync");
            }
            handle.abort();
        }
    }

    /// Re-scores immediately with the current preferences.
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        let snapshot = self.preferences.borrow().clone();
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.shared.sync(snapshot).await;
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl<S: Scorer + 'static> Drop for PreferenceSyncClient<S> {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl<S: Scorer> Shared<S> {
    async fn sync(&self, preferences: Preferences) -> Result<(), SyncError> {
        let shifts = self
            .results
            .borrow()
            .iter()
            .map(|scored| scored.shift.clone())
            .collect::<Vec<Shift>>();
        if shifts.is_empty() {
            return Err(SyncError::NothingToScore);
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let request = ScoreRequest {
            shifts,
            preferences,
        };
        let response = self.scorer.score(&request).await?;

        let latest = self.issued.load(Ordering::SeqCst);
        if seq != latest {
            return Err(SyncError::Stale { seq, latest });
        }
        debug!(
            seq,
            scored = response.scored_shifts.len(),
            "applying re-scored result set"
        );
        self.results.send_replace(Arc::new(response.scored_shifts));
        Ok(())
    }
}

fn log_outcome(outcome: Result<(), SyncError>) {
    match outcome {
        Ok(()) => {}
        Err(err) if err.is_failure() => warn!("re-score failed; keeping previous results: {err}"),
        Err(err) => debug!("re-score dropped: {err}"),
    }
}
