use std::sync::Arc;

use tracing::{debug, warn};

use quietgate_core::{AppError, AppResult};
use quietgate_domain::{DecisionOutcome, HistorySnapshot, ThrottleConfig};

use super::history::HistoryStore;
use super::ports::{Clock, RecordStore};

/// Application service deciding whether an identifier may attempt again.
#[derive(Clone)]
pub struct ThrottleService {
    history: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
    config: Arc<ThrottleConfig>,
}

impl ThrottleService {
    /// Creates a service over a record store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: ThrottleConfig) -> Self {
        let history = HistoryStore::new(store, clock.clone(), config.collection());
        Self {
            history: Arc::new(history),
            clock,
            config: Arc::new(config),
        }
    }

    /// Starts a builder that validates its inputs on `build`.
    #[must_use]
    pub fn builder() -> ThrottleServiceBuilder {
        ThrottleServiceBuilder::default()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Returns the underlying history store.
    #[must_use]
    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    /// Evaluates a new attempt from `identifier`.
    ///
    /// History is read before anything is written, so the outcome reflects
    /// the state prior to this attempt. When allowed, the attempt is recorded
    /// on a detached task; a failure there is logged and never reaches the
    /// caller. Store failures while reading abort the evaluation and nothing
    /// is recorded.
    ///
    /// Concurrent evaluations for the same identifier are not serialized: two
    /// simultaneous attempts can both observe history without each other and
    /// both be allowed. The limits are best-effort, not a hard quota.
    pub async fn evaluate(&self, identifier: &str) -> AppResult<DecisionOutcome> {
        let now = self.clock.now();
        let hits = self.history.get_history_at(identifier, now).await?;

        if let Some(quiet_time) = self.config.quiet_time_millis() {
            debug!(
                identifier,
                gap_millis = hits.most_recent_gap_millis(),
                quiet_time_millis = quiet_time,
                "checking attempt frequency"
            );
        }

        if let Some(reason) = self.config.judge(&hits, now) {
            debug!(identifier, %reason, count = hits.count(), "attempt denied");
            return Ok(DecisionOutcome::denied(hits, reason));
        }

        debug!(identifier, count = hits.count(), "attempt allowed");

        let history = self.history.clone();
        let identifier = identifier.to_owned();
        tokio::spawn(async move {
            if let Err(error) = history.record_attempt_at(&identifier, now).await {
                warn!(identifier = %identifier, %error, "failed to record permitted attempt");
            }
        });

        Ok(DecisionOutcome::allowed(hits))
    }

    /// Returns the identifier's history without evaluating it.
    pub async fn history(&self, identifier: &str) -> AppResult<HistorySnapshot> {
        self.history.get_history(identifier).await
    }

    /// Records an attempt and waits for the write to complete.
    pub async fn record_attempt_now(&self, identifier: &str) -> AppResult<()> {
        self.history.record_attempt(identifier).await
    }

    /// Deletes one identifier's history, or all history when `None`.
    pub async fn clear_history(&self, identifier: Option<&str>) -> AppResult<u64> {
        self.history.clear_history(identifier).await
    }
}

/// Builder for [`ThrottleService`].
#[derive(Default)]
pub struct ThrottleServiceBuilder {
    store: Option<Arc<dyn RecordStore>>,
    clock: Option<Arc<dyn Clock>>,
    config: Option<ThrottleConfig>,
}

impl ThrottleServiceBuilder {
    /// Sets the record store. Required.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the clock. Required.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the throttle limits. Defaults to [`ThrottleConfig::default`].
    #[must_use]
    pub fn config(mut self, config: ThrottleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the service, failing when a required collaborator is missing.
    pub fn build(self) -> AppResult<ThrottleService> {
        let store = self.store.ok_or_else(|| {
            AppError::Configuration("a record store is required to build the throttle".to_owned())
        })?;
        let clock = self.clock.ok_or_else(|| {
            AppError::Configuration("a clock is required to build the throttle".to_owned())
        })?;

        Ok(ThrottleService::new(
            store,
            clock,
            self.config.unwrap_or_default(),
        ))
    }
}
