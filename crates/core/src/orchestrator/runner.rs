//! Run orchestrator implementation.
//!
//! Drives one run through the state machine:
//! - Authenticating: establish the session (retries inside SessionManager)
//! - Cataloging: snapshot the postings table
//! - Selecting: classify listings for the run mode
//! - Executing: one listing at a time, in catalog order, with pacing
//! - Finalizing: counts, artifacts, summary and dataset hand-off

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactCapture, ArtifactKind, ArtifactRefs, CapturePlan};
use crate::audit::{EventHandle, RunEvent};
use crate::catalog::{CatalogParser, Decision, ListingRecord, Outcome, RowWarning, SkipReason};
use crate::config::{validate_config, Config, ConfigError, RunConfig, ScreenshotPolicy};
use crate::driver::BrowserDriver;
use crate::eligibility;
use crate::executor::{ActionExecutor, ActionVerifier, AffordanceVerifier, ExecutionContext};
use crate::output::{DatasetRow, DatasetSink, KeyValueStore};
use crate::pacing::{Clock, Deadline, HumanPacer, Pacer, SystemClock};
use crate::session::{Credentials, Session, SessionManager};

use super::types::{Checkpoint, RunAbortHandle, RunCounts, RunState, RunSummary, StateTransition};

const SUMMARY_KEY: &str = "summary.json";
const CHECKPOINT_KEY: &str = "checkpoint.json";
const JSON: &str = "application/json";

/// Mutable state of the run in progress.
struct RunProgress {
    run_id: String,
    started_at: DateTime<Utc>,
    state: RunState,
    transitions: Vec<StateTransition>,
    listings: Vec<ListingRecord>,
    row_warnings: Vec<RowWarning>,
    abort_reason: Option<String>,
    run_artifacts: ArtifactRefs,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            state: RunState::Init,
            transitions: Vec::new(),
            listings: Vec::new(),
            row_warnings: Vec::new(),
            abort_reason: None,
            run_artifacts: ArtifactRefs::default(),
        }
    }
}

/// How the executing phase ended.
struct ExecutionOutcome {
    reason: String,
    /// Index of the last listing handed to the executor.
    last_processed: Option<usize>,
}

/// The run orchestrator - composes session, catalog, selection and execution.
pub struct RunOrchestrator {
    config: Config,
    driver: Arc<dyn BrowserDriver>,
    catalog: Arc<CatalogParser>,
    pacer: Arc<dyn Pacer>,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn ActionVerifier>,
    events: Option<EventHandle>,
    dataset: Option<Arc<dyn DatasetSink>>,
    store: Option<Arc<dyn KeyValueStore>>,
    abort: RunAbortHandle,
}

impl RunOrchestrator {
    /// Create an orchestrator for one run.
    ///
    /// Fails before any browser activity when the config is invalid.
    pub fn new(config: Config, driver: Arc<dyn BrowserDriver>) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let catalog = Arc::new(CatalogParser::new(config.platform.clone())?);

        Ok(Self {
            config,
            driver,
            catalog,
            pacer: Arc::new(HumanPacer),
            clock: Arc::new(SystemClock::new()),
            verifier: Arc::new(AffordanceVerifier),
            events: None,
            dataset: None,
            store: None,
            abort: RunAbortHandle::new(),
        })
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ActionVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_dataset(mut self, dataset: Arc<dyn DatasetSink>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Key-value store for the summary, artifacts and checkpoint.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Handle that ends the run early at the next listing boundary.
    pub fn abort_handle(&self) -> RunAbortHandle {
        self.abort.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one complete run.
    ///
    /// Always returns a summary; fatal errors show up as `RunState::Aborted`
    /// with an abort reason.
    pub async fn run(&self, credentials: &Credentials) -> RunSummary {
        let mut progress = RunProgress::new();
        let deadline = Deadline::start(Arc::clone(&self.clock), self.config.run.timeout());
        let run_id = progress.run_id.clone();

        info!(
            run_id = %run_id,
            mode = self.config.run.mode.as_str(),
            timeout_secs = self.config.run.timeout_secs,
            driver = self.driver.name(),
            "Run starting"
        );
        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            mode: self.config.run.mode.as_str().to_string(),
            config_hash: self.config_hash(),
        })
        .await;

        let artifacts = self.store.as_ref().map(|store| {
            let capture = ArtifactCapture::new(
                self.config.run.screenshot_policy,
                Arc::clone(store),
                &run_id,
            );
            Arc::new(match &self.events {
                Some(events) => capture.with_events(events.clone()),
                None => capture,
            })
        });

        let sessions = SessionManager::new(
            Arc::clone(&self.driver),
            self.config.platform.clone(),
            self.config.session.clone(),
            Arc::clone(&self.pacer),
        );

        // Authenticating
        self.transition(&mut progress, RunState::Authenticating, None).await;
        let mut session = match sessions.establish(credentials).await {
            Ok(session) => session,
            Err(e) => {
                let session = Session::new(Arc::clone(&self.driver));
                let reason = format!("authentication failed: {}", e);
                return self
                    .abort_run(progress, &session, artifacts.as_deref(), reason)
                    .await;
            }
        };

        // Cataloging
        self.transition(&mut progress, RunState::Cataloging, None).await;
        if !sessions.is_alive(&session).await {
            warn!(run_id = %run_id, "Session not alive before cataloging, re-establishing");
            match sessions.establish(credentials).await {
                Ok(fresh) => session = fresh,
                Err(e) => {
                    let reason = format!("session lost before cataloging: {}", e);
                    return self
                        .abort_run(progress, &session, artifacts.as_deref(), reason)
                        .await;
                }
            }
        }

        let snapshot = match self.catalog.extract(&session).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let reason = format!("catalog extraction failed: {}", e);
                return self
                    .abort_run(progress, &session, artifacts.as_deref(), reason)
                    .await;
            }
        };
        for warning in &snapshot.warnings {
            self.emit(RunEvent::RowSkipped {
                run_id: run_id.clone(),
                index: warning.index,
                reason: warning.reason.clone(),
            })
            .await;
        }
        progress.row_warnings = snapshot.warnings;

        // Selecting
        let detected = snapshot.listings.len();
        self.transition(
            &mut progress,
            RunState::Selecting,
            Some(format!("{} listings detected", detected)),
        )
        .await;
        progress.listings = eligibility::classify(&snapshot.listings, self.config.run.mode);
        let eligible = progress.listings.iter().filter(|l| l.is_eligible()).count();
        info!(
            run_id = %run_id,
            detected,
            eligible,
            mode = self.config.run.mode.as_str(),
            "Work list selected"
        );

        // Executing
        self.transition(
            &mut progress,
            RunState::Executing,
            Some(format!("{} eligible", eligible)),
        )
        .await;
        let outcome = self
            .execute_all(
                &mut progress,
                &mut session,
                &sessions,
                credentials,
                &deadline,
                artifacts.clone(),
            )
            .await;

        // Finalizing
        self.transition(&mut progress, RunState::Finalizing, Some(outcome.reason))
            .await;
        self.finalize(progress, &session, artifacts.as_deref(), outcome.last_processed)
            .await
    }

    /// Process eligible listings in catalog order until exhausted or stopped.
    async fn execute_all(
        &self,
        progress: &mut RunProgress,
        session: &mut Session,
        sessions: &SessionManager,
        credentials: &Credentials,
        deadline: &Deadline,
        artifacts: Option<Arc<ArtifactCapture>>,
    ) -> ExecutionOutcome {
        let run = &self.config.run;
        let mut executor = ActionExecutor::new(
            progress.run_id.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.verifier),
            Arc::clone(&self.pacer),
            run.max_retries,
            run.delay_range,
        );
        if let Some(artifacts) = artifacts {
            executor = executor.with_artifacts(artifacts);
        }
        if let Some(events) = &self.events {
            executor = executor.with_events(events.clone());
        }

        let work: Vec<usize> = progress
            .listings
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_eligible())
            .map(|(i, _)| i)
            .collect();

        let mut stop: Option<SkipReason> = None;
        let mut last_processed: Option<usize> = None;

        for index in work {
            if stop.is_none() {
                stop = self.stop_reason(deadline);
            }
            if stop.is_none() && last_processed.is_some() {
                executor.pause_between_listings().await;
                stop = self.stop_reason(deadline);
            }

            if let Some(reason) = stop {
                let listing = &mut progress.listings[index];
                debug!(
                    listing_id = %listing.listing_id,
                    reason = reason.as_str(),
                    "Listing not started"
                );
                listing.skip(reason);
                self.emit(RunEvent::ListingCompleted {
                    run_id: progress.run_id.clone(),
                    listing_id: listing.listing_id.clone(),
                    outcome: listing.outcome.as_str().to_string(),
                    attempts: 0,
                })
                .await;
                continue;
            }

            let ctx = ExecutionContext {
                deadline,
                plan: CapturePlan::for_listing(run.screenshot_policy, last_processed.is_none()),
            };
            let record = progress.listings[index].clone();
            let execution = executor.execute(session, record, &ctx).await;
            let failed = execution.record.outcome == Outcome::Failed;
            let expired = execution.session_expired();
            progress.listings[index] = execution.record;
            last_processed = Some(index);

            self.write_checkpoint(progress).await;

            if failed && !sessions.is_alive(session).await {
                warn!(
                    run_id = %progress.run_id,
                    session_expired = expired,
                    "Session not alive after failed listing, re-establishing"
                );
                match sessions.establish(credentials).await {
                    Ok(fresh) => {
                        info!(run_id = %progress.run_id, "Session re-established");
                        *session = fresh;
                    }
                    Err(e) => {
                        error!(
                            run_id = %progress.run_id,
                            error = %e,
                            "Session could not be re-established"
                        );
                        stop = Some(SkipReason::SessionLost);
                    }
                }
            }
        }

        let reason = match stop {
            None => "eligible listings exhausted",
            Some(SkipReason::Deadline) => "deadline reached",
            Some(SkipReason::OperatorAbort) => "operator abort",
            Some(SkipReason::SessionLost) => "session lost",
            Some(other) => other.as_str(),
        };
        if let Some(reason) = stop {
            warn!(run_id = %progress.run_id, reason = reason.as_str(), "Stopping early");
        }

        ExecutionOutcome {
            reason: reason.to_string(),
            last_processed,
        }
    }

    /// Reason to stop before starting another listing, if any.
    fn stop_reason(&self, deadline: &Deadline) -> Option<SkipReason> {
        if self.abort.is_aborted() {
            Some(SkipReason::OperatorAbort)
        } else if deadline.expired() {
            Some(SkipReason::Deadline)
        } else {
            None
        }
    }

    async fn finalize(
        &self,
        mut progress: RunProgress,
        session: &Session,
        artifacts: Option<&ArtifactCapture>,
        last_processed: Option<usize>,
    ) -> RunSummary {
        if self.config.run.screenshot_policy == ScreenshotPolicy::Summary {
            if let (Some(artifacts), Some(index)) = (artifacts, last_processed) {
                let listing_id = progress.listings[index].listing_id.clone();
                if let Some(artifact) = artifacts
                    .capture_logged(session, ArtifactKind::After, "summary", Some(&listing_id))
                    .await
                {
                    progress.listings[index].artifacts.set(artifact);
                }
            }
        }

        if let Some(artifacts) = artifacts.filter(|a| a.policy() != ScreenshotPolicy::None) {
            if let Some(artifact) = artifacts
                .capture_logged(session, ArtifactKind::HtmlSnapshot, "final", None)
                .await
            {
                progress.run_artifacts.set(artifact);
            }
        }

        self.transition(&mut progress, RunState::Done, None).await;
        let summary = self.build_summary(progress);
        self.hand_off(&summary).await;
        summary
    }

    /// Fatal error: end the run as aborted, still producing a summary.
    async fn abort_run(
        &self,
        mut progress: RunProgress,
        session: &Session,
        artifacts: Option<&ArtifactCapture>,
        reason: String,
    ) -> RunSummary {
        error!(run_id = %progress.run_id, reason = %reason, "Run aborted");
        progress.abort_reason = Some(reason.clone());
        self.transition(&mut progress, RunState::Aborted, Some(reason)).await;

        if let Some(artifacts) = artifacts {
            if artifacts.policy() != ScreenshotPolicy::None {
                for kind in [ArtifactKind::After, ArtifactKind::HtmlSnapshot] {
                    let captured = artifacts.capture_logged(session, kind, "abort", None).await;
                    if let Some(artifact) = captured {
                        progress.run_artifacts.set(artifact);
                    }
                }
            }
        }

        let summary = self.build_summary(progress);
        self.hand_off(&summary).await;
        summary
    }

    fn build_summary(&self, progress: RunProgress) -> RunSummary {
        let counts = RunCounts::tally(&progress.listings);
        RunSummary {
            run_id: progress.run_id,
            started_at: progress.started_at,
            finished_at: Utc::now(),
            state: progress.state,
            abort_reason: progress.abort_reason,
            config: self.config.run.clone(),
            counts,
            listings: progress.listings,
            row_warnings: progress.row_warnings,
            transitions: progress.transitions,
            run_artifacts: progress.run_artifacts,
        }
    }

    /// Hand the summary and dataset rows to the output stores.
    ///
    /// Errors are logged only; the summary returned to the caller stands.
    async fn hand_off(&self, summary: &RunSummary) {
        let run_id = &summary.run_id;

        if let Some(store) = &self.store {
            store_summary(store.as_ref(), summary).await;

            if self.config.output.checkpoint {
                let key = format!("{}/{}", run_id, CHECKPOINT_KEY);
                if let Err(e) = store.delete(&key).await {
                    warn!(run_id = %run_id, error = %e, "Failed to delete checkpoint");
                }
            }
        }

        if let (true, Some(dataset)) = (self.config.output.dataset, &self.dataset) {
            let rows = dataset_rows(summary);
            if !rows.is_empty() {
                if let Err(e) = dataset.push(&rows).await {
                    error!(run_id = %run_id, error = %e, "Failed to push dataset rows");
                }
            }
        }

        let counts = summary.counts;
        info!(
            run_id = %run_id,
            state = summary.state.as_str(),
            detected = counts.detected,
            eligible = counts.eligible,
            succeeded = counts.succeeded,
            failed = counts.failed,
            skipped = counts.skipped,
            "Run finished"
        );
        self.emit(RunEvent::RunFinished {
            run_id: run_id.clone(),
            state: summary.state.as_str().to_string(),
            detected: counts.detected,
            eligible: counts.eligible,
            succeeded: counts.succeeded,
            failed: counts.failed,
            skipped: counts.skipped,
        })
        .await;
    }

    async fn write_checkpoint(&self, progress: &RunProgress) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.config.output.checkpoint {
            return;
        }

        let checkpoint = Checkpoint {
            run_id: progress.run_id.clone(),
            state: progress.state,
            written_at: Utc::now(),
            resolved: progress
                .listings
                .iter()
                .filter(|l| l.is_eligible() && l.outcome.is_resolved())
                .cloned()
                .collect(),
        };
        let key = format!("{}/{}", progress.run_id, CHECKPOINT_KEY);
        let result = match serde_json::to_vec(&checkpoint) {
            Ok(bytes) => store.put(&key, bytes, JSON).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            warn!(run_id = %progress.run_id, error = %e, "Failed to write checkpoint");
        }
    }

    async fn transition(&self, progress: &mut RunProgress, to: RunState, reason: Option<String>) {
        let from = progress.state;
        if !from.can_transition_to(to) {
            error!(from = %from, to = %to, "Illegal state transition ignored");
            return;
        }

        info!(
            run_id = %progress.run_id,
            from = %from,
            to = %to,
            reason = reason.as_deref().unwrap_or(""),
            "State changed"
        );
        progress.transitions.push(StateTransition {
            from,
            to,
            at: Utc::now(),
            reason: reason.clone(),
        });
        progress.state = to;

        self.emit(RunEvent::StateChanged {
            run_id: progress.run_id.clone(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            reason,
        })
        .await;
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.emit(event).await;
        }
    }

    /// SHA-256 of the run parameters, for correlating runs in the event log.
    fn config_hash(&self) -> String {
        match serde_json::to_vec(&self.config.run) {
            Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
            Err(_) => String::new(),
        }
    }
}

/// One dataset row per listing the executor actually tried.
fn dataset_rows(summary: &RunSummary) -> Vec<DatasetRow> {
    summary
        .listings
        .iter()
        .filter(|l| l.decision == Decision::Attempted && l.attempts > 0)
        .map(|l| DatasetRow {
            run_id: summary.run_id.clone(),
            listing_id: l.listing_id.clone(),
            title: l.title.clone(),
            action: l
                .intended_action
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
            outcome: l.outcome.as_str().to_string(),
            timestamp: l.completed_at.unwrap_or(summary.finished_at),
        })
        .collect()
}

/// Record a run that failed before the orchestrator could start it, such as
/// missing credentials or an unreachable WebDriver endpoint.
///
/// The aborted summary lands under the usual summary key, so every run
/// leaves one behind.
pub async fn record_setup_failure(
    store: &dyn KeyValueStore,
    config: &RunConfig,
    reason: impl Into<String>,
) -> RunSummary {
    let progress = RunProgress::new();
    let summary = RunSummary {
        run_id: progress.run_id,
        started_at: progress.started_at,
        finished_at: Utc::now(),
        state: RunState::Aborted,
        abort_reason: Some(reason.into()),
        config: config.clone(),
        counts: RunCounts::tally(&[]),
        listings: Vec::new(),
        row_warnings: Vec::new(),
        transitions: Vec::new(),
        run_artifacts: ArtifactRefs::default(),
    };
    error!(
        run_id = %summary.run_id,
        reason = summary.abort_reason.as_deref().unwrap_or_default(),
        "Run aborted during setup"
    );
    store_summary(store, &summary).await;
    summary
}

async fn store_summary(store: &dyn KeyValueStore, summary: &RunSummary) {
    let run_id = &summary.run_id;
    let key = format!("{}/{}", run_id, SUMMARY_KEY);
    match serde_json::to_vec_pretty(summary) {
        Ok(bytes) => {
            if let Err(e) = store.put(&key, bytes, JSON).await {
                error!(run_id = %run_id, error = %e, "Failed to store run summary");
            }
        }
        Err(e) => error!(run_id = %run_id, error = %e, "Failed to serialize run summary"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::executor::StatusVerifier;
    use crate::testing::{fixtures, MemoryKeyValueStore, MockBrowser, MockListing, RecordingPacer};

    fn orchestrator(browser: Arc<MockBrowser>, mode: RunMode) -> RunOrchestrator {
        RunOrchestrator::new(fixtures::config(mode), browser)
            .unwrap()
            .with_pacer(Arc::new(RecordingPacer::new()))
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = fixtures::config(RunMode::Renew);
        config.run.delay_range.min_ms = 5000;
        config.run.delay_range.max_ms = 10;
        let browser = Arc::new(MockBrowser::new(&config.platform));

        let result = RunOrchestrator::new(config, browser);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_hash_is_stable() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        let a = orchestrator(browser.clone(), RunMode::Renew);
        let b = orchestrator(browser.clone(), RunMode::Renew);
        let c = orchestrator(browser, RunMode::Repost);

        assert_eq!(a.config_hash(), b.config_hash());
        assert_ne!(a.config_hash(), c.config_hash());
        assert_eq!(a.config_hash().len(), 64);
    }

    #[tokio::test]
    async fn test_transition_history() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser
            .set_listings(vec![MockListing::new("100001", "Desk").renewable()])
            .await;

        let summary = orchestrator(browser, RunMode::Renew)
            .run(&fixtures::credentials())
            .await;

        let states: Vec<_> = summary.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                RunState::Authenticating,
                RunState::Cataloging,
                RunState::Selecting,
                RunState::Executing,
                RunState::Finalizing,
                RunState::Done,
            ]
        );
        assert_eq!(summary.transitions[0].from, RunState::Init);
    }

    #[tokio::test]
    async fn test_dataset_rows_only_for_tried_listings() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser
            .set_listings(vec![
                MockListing::new("100001", "Desk").renewable(),
                MockListing::new("100002", "Bike").repostable(),
            ])
            .await;

        let summary = orchestrator(browser, RunMode::Renew)
            .run(&fixtures::credentials())
            .await;

        let rows = dataset_rows(&summary);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].listing_id, "100001");
        assert_eq!(rows[0].action, "renew");
        assert_eq!(rows[0].outcome, "success");
        assert_eq!(rows[0].run_id, summary.run_id);
    }

    #[tokio::test]
    async fn test_setup_failure_leaves_aborted_summary() {
        let store = MemoryKeyValueStore::new();
        let config = fixtures::config(RunMode::Renew);

        let summary = record_setup_failure(
            &store,
            &config.run,
            "Failed to start browser session: connection refused",
        )
        .await;

        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.counts, RunCounts::tally(&[]));
        let stored = store
            .get(&format!("{}/summary.json", summary.run_id))
            .await
            .unwrap()
            .expect("summary stored");
        let json: serde_json::Value = serde_json::from_slice(&stored.bytes).unwrap();
        assert_eq!(json["state"], "aborted");
        assert_eq!(
            json["abort_reason"],
            "Failed to start browser session: connection refused"
        );
        assert_eq!(json["config"]["mode"], "renew");
    }

    #[tokio::test]
    async fn test_done_run_keeps_final_page_source() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser
            .set_listings(vec![MockListing::new("100001", "Desk").renewable()])
            .await;
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut config = fixtures::config(RunMode::Renew);
        config.run.screenshot_policy = ScreenshotPolicy::Summary;

        let summary = RunOrchestrator::new(config, browser)
            .unwrap()
            .with_pacer(Arc::new(RecordingPacer::new()))
            .with_store(store.clone())
            .run(&fixtures::credentials())
            .await;

        assert_eq!(summary.state, RunState::Done);
        let html = summary.run_artifacts.html.as_ref().expect("final snapshot");
        assert_eq!(html.key, format!("{}/final-html-snapshot.html", summary.run_id));
        assert!(summary.run_artifacts.after.is_none());
        let stored = store.get(&html.key).await.unwrap().unwrap();
        assert!(stored.content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_no_final_page_source_without_policy() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser
            .set_listings(vec![MockListing::new("100001", "Desk").renewable()])
            .await;

        let summary = orchestrator(browser, RunMode::Renew)
            .with_store(Arc::new(MemoryKeyValueStore::new()))
            .run(&fixtures::credentials())
            .await;

        assert_eq!(summary.state, RunState::Done);
        assert!(summary.run_artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_custom_verifier_decides_outcome() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        // Renewing an active listing leaves its status unchanged
        browser
            .set_listings(vec![MockListing::new("100001", "Desk").renewable()])
            .await;

        let summary = orchestrator(browser.clone(), RunMode::Renew)
            .with_verifier(Arc::new(StatusVerifier::default()))
            .run(&fixtures::credentials())
            .await;

        let listing = summary.listing("100001").unwrap();
        assert_eq!(listing.outcome, Outcome::Failed);
        // The retry finds the control gone and stops without clicking again
        assert_eq!(listing.attempts, 2);
        assert!(listing.failure.as_deref().unwrap().contains("not offered"));
        assert_eq!(browser.clicks().await.len(), 1);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.state, RunState::Done);
    }
}
