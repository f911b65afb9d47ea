use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactCapture, ArtifactKind};
use crate::audit::{EventHandle, RunEvent};
use crate::catalog::{
    ActionKind, CatalogParser, Decision, ListingObservation, ListingRecord, Outcome, SkipReason,
};
use crate::config::DelayRange;
use crate::pacing::Pacer;
use crate::session::Session;

use super::{ActionError, ActionVerifier, Execution, ExecutionContext};

/// Executes the intended action of one listing at a time.
///
/// Never fails past its own boundary: every error ends up in the returned
/// record's outcome.
pub struct ActionExecutor {
    run_id: String,
    catalog: Arc<CatalogParser>,
    verifier: Arc<dyn ActionVerifier>,
    pacer: Arc<dyn Pacer>,
    max_retries: u32,
    delay_range: DelayRange,
    artifacts: Option<Arc<ArtifactCapture>>,
    events: Option<EventHandle>,
}

impl ActionExecutor {
    pub fn new(
        run_id: impl Into<String>,
        catalog: Arc<CatalogParser>,
        verifier: Arc<dyn ActionVerifier>,
        pacer: Arc<dyn Pacer>,
        max_retries: u32,
        delay_range: DelayRange,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            catalog,
            verifier,
            pacer,
            max_retries,
            delay_range,
            artifacts: None,
            events: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<ArtifactCapture>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Resolve one eligible listing.
    ///
    /// Dry-run listings are only captured and skipped. Others are attempted
    /// up to `max_retries + 1` times; no retry starts once the deadline has
    /// passed.
    pub async fn execute(
        &self,
        session: &Session,
        mut listing: ListingRecord,
        ctx: &ExecutionContext<'_>,
    ) -> Execution {
        let label = format!("listing-{}", listing.listing_id);

        if ctx.plan.before {
            self.capture_into(session, &mut listing, ArtifactKind::Before, &label)
                .await;
        }

        let action = match (listing.decision, listing.intended_action) {
            (Decision::Attempted, Some(action)) => action,
            (Decision::SkippedDryRun, intended) => {
                info!(
                    listing_id = %listing.listing_id,
                    intended = ?intended,
                    "Dry run, not dispatching"
                );
                listing.skip(SkipReason::DryRun);
                self.emit_completed(&listing).await;
                return Execution {
                    record: listing,
                    error: None,
                };
            }
            _ => {
                listing.skip(SkipReason::Ineligible);
                self.emit_completed(&listing).await;
                return Execution {
                    record: listing,
                    error: None,
                };
            }
        };

        let max_attempts = self.max_retries + 1;
        let mut first_seen: Option<ListingObservation> = None;
        let mut last_error: Option<ActionError> = None;

        loop {
            if listing.attempts > 0 {
                if ctx.deadline.expired() {
                    warn!(
                        listing_id = %listing.listing_id,
                        attempts = listing.attempts,
                        "Deadline reached, no further retries"
                    );
                    listing.outcome = Outcome::Failed;
                    listing.failure = Some(match &last_error {
                        Some(e) => format!("deadline reached before retry (last error: {})", e),
                        None => "deadline reached before retry".to_string(),
                    });
                    break;
                }
                self.pacer.pause(self.delay_range).await;
            }

            listing.attempts += 1;
            let attempt = listing.attempts;
            debug!(listing_id = %listing.listing_id, attempt, action = %action, "Dispatching");

            let result = self
                .attempt(session, &listing.listing_id, action, &mut first_seen)
                .await;
            self.emit_attempted(&listing.listing_id, attempt, action, result.as_ref().err())
                .await;

            match result {
                Ok(()) => {
                    listing.outcome = Outcome::Success;
                    listing.failure = None;
                    last_error = None;
                    break;
                }
                Err(e) => {
                    let retry = e.is_retryable() && attempt < max_attempts;
                    warn!(
                        listing_id = %listing.listing_id,
                        attempt,
                        error = %e,
                        will_retry = retry,
                        "Attempt failed"
                    );
                    listing.failure = Some(e.to_string());
                    last_error = Some(e);
                    if !retry {
                        listing.outcome = Outcome::Failed;
                        break;
                    }
                }
            }
        }

        listing.completed_at = Some(Utc::now());

        match listing.outcome {
            Outcome::Success if ctx.plan.after => {
                self.capture_into(session, &mut listing, ArtifactKind::After, &label)
                    .await;
            }
            Outcome::Failed if ctx.plan.html_on_failure => {
                self.capture_into(session, &mut listing, ArtifactKind::HtmlSnapshot, &label)
                    .await;
            }
            _ => {}
        }

        info!(
            listing_id = %listing.listing_id,
            action = %action,
            outcome = listing.outcome.as_str(),
            attempts = listing.attempts,
            "Listing resolved"
        );
        self.emit_completed(&listing).await;

        Execution {
            record: listing,
            error: last_error,
        }
    }

    /// Wait a random human-like delay before the next listing.
    pub async fn pause_between_listings(&self) {
        self.pacer.pause(self.delay_range).await;
    }

    /// One dispatch + verification round.
    ///
    /// `first_seen` holds the row as read before the first click; once a
    /// click was sent, a later attempt that finds the effect already applied
    /// counts as success instead of dispatching again.
    async fn attempt(
        &self,
        session: &Session,
        listing_id: &str,
        action: ActionKind,
        first_seen: &mut Option<ListingObservation>,
    ) -> Result<(), ActionError> {
        let current = self.catalog.observe(session, listing_id).await?;

        if let Some(original) = first_seen.as_ref() {
            let observed = current.as_ref().map(|row| &row.observation);
            if self.verifier.verify(action, original, observed) {
                debug!(listing_id, "Earlier dispatch took effect late");
                return Ok(());
            }
        }

        let row = current.ok_or_else(|| {
            ActionError::Rejected("listing no longer in the catalog".to_string())
        })?;
        let control = row
            .control(action)
            .cloned()
            .ok_or_else(|| ActionError::Rejected(format!("{} control not offered", action)))?;

        session.driver().click(&control).await?;
        first_seen.get_or_insert_with(|| row.observation.clone());

        let after = self.catalog.observe(session, listing_id).await?;
        let verified = self.verifier.verify(
            action,
            &row.observation,
            after.as_ref().map(|m| &m.observation),
        );

        if verified {
            Ok(())
        } else {
            Err(ActionError::NoEffect(format!(
                "{} still offered after dispatch",
                action
            )))
        }
    }

    async fn capture_into(
        &self,
        session: &Session,
        listing: &mut ListingRecord,
        kind: ArtifactKind,
        label: &str,
    ) {
        let Some(artifacts) = &self.artifacts else {
            return;
        };
        if let Some(artifact) = artifacts
            .capture_logged(session, kind, label, Some(&listing.listing_id))
            .await
        {
            listing.artifacts.set(artifact);
        }
    }

    async fn emit_attempted(
        &self,
        listing_id: &str,
        attempt: u32,
        action: ActionKind,
        error: Option<&ActionError>,
    ) {
        if let Some(events) = &self.events {
            events
                .emit(RunEvent::ListingAttempted {
                    run_id: self.run_id.clone(),
                    listing_id: listing_id.to_string(),
                    attempt,
                    action: action.as_str().to_string(),
                    error: error.map(|e| e.to_string()),
                })
                .await;
        }
    }

    async fn emit_completed(&self, listing: &ListingRecord) {
        if let Some(events) = &self.events {
            events
                .emit(RunEvent::ListingCompleted {
                    run_id: self.run_id.clone(),
                    listing_id: listing.listing_id.clone(),
                    outcome: listing.outcome.as_str().to_string(),
                    attempts: listing.attempts,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::artifact::CapturePlan;
    use crate::catalog::AvailableAction;
    use crate::config::{RunMode, ScreenshotPolicy};
    use crate::driver::{BrowserDriver, DriverError};
    use crate::eligibility;
    use crate::executor::{AffordanceVerifier, StatusVerifier};
    use crate::pacing::Deadline;
    use crate::testing::{
        fixtures, ManualClock, MemoryKeyValueStore, MockBrowser, MockListing, RecordingPacer,
    };

    struct Harness {
        browser: Arc<MockBrowser>,
        session: Session,
        pacer: Arc<RecordingPacer>,
        clock: Arc<ManualClock>,
        catalog: Arc<CatalogParser>,
    }

    impl Harness {
        async fn new(listings: Vec<MockListing>) -> Self {
            let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
            browser.set_listings(listings).await;
            browser.sign_in().await;
            let session = Session::new(Arc::clone(&browser) as Arc<dyn BrowserDriver>);
            Self {
                browser,
                session,
                pacer: Arc::new(RecordingPacer::new()),
                clock: Arc::new(ManualClock::new()),
                catalog: Arc::new(CatalogParser::new(fixtures::platform_config()).unwrap()),
            }
        }

        fn executor(&self, max_retries: u32) -> ActionExecutor {
            ActionExecutor::new(
                "run-1",
                Arc::clone(&self.catalog),
                Arc::new(AffordanceVerifier),
                self.pacer.clone(),
                max_retries,
                DelayRange::new(100, 200),
            )
        }

        fn deadline(&self, secs: u64) -> Deadline {
            Deadline::start(self.clock.clone(), Duration::from_secs(secs))
        }

        async fn eligible(&self, mode: RunMode) -> Vec<ListingRecord> {
            let snapshot = self.catalog.extract(&self.session).await.unwrap();
            eligibility::select(&snapshot.listings, mode)
        }
    }

    #[tokio::test]
    async fn test_successful_renew() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Success);
        assert_eq!(execution.record.attempts, 1);
        assert!(execution.record.completed_at.is_some());
        assert!(execution.error.is_none());
        assert_eq!(h.browser.clicks().await.len(), 1);
        assert!(h.pacer.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_transient_error_then_success() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser
            .fail_clicks("100001", 1, DriverError::StaleElement("detached".into()))
            .await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Success);
        assert_eq!(execution.record.attempts, 2);
        assert!(execution.record.failure.is_none());
        // One pause between the two attempts, drawn from the delay range
        let sleeps = h.pacer.sleeps();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] >= Duration::from_millis(100) && sleeps[0] <= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_unreadable_row_after_click_is_not_success() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser.ignore_clicks("100001", 10).await;
        h.browser
            .fail_id_read_after_click("100001", DriverError::StaleElement("id cell".into()))
            .await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        // The click never took effect, so a row that could not be read must not pass as gone.
        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert_eq!(execution.record.attempts, 3);
        assert!(matches!(execution.error, Some(ActionError::NoEffect(_))));
        assert_eq!(h.browser.clicks().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_row_before_click_is_retried() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        h.browser
            .fail_id_read("100001", DriverError::StaleElement("id cell".into()))
            .await;
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Success);
        assert_eq!(execution.record.attempts, 2);
        assert!(execution.error.is_none());
        assert_eq!(h.browser.clicks().await.len(), 1);
        assert_eq!(h.pacer.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser.ignore_clicks("100001", 10).await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert_eq!(execution.record.attempts, 3);
        assert!(matches!(execution.error, Some(ActionError::NoEffect(_))));
        assert!(execution.record.failure.unwrap().contains("no visible effect"));
        assert_eq!(h.browser.clicks().await.len(), 3);
    }

    #[tokio::test]
    async fn test_protocol_error_fails_immediately() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser
            .fail_clicks("100001", 1, DriverError::Protocol("invalid argument".into()))
            .await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert_eq!(execution.record.attempts, 1);
        assert!(matches!(execution.error, Some(ActionError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_vanished_control_is_rejected() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        // Control disappears between extraction and dispatch
        h.browser
            .set_listings(vec![MockListing::new("100001", "Desk")])
            .await;
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert_eq!(execution.record.attempts, 1);
        assert!(h.browser.clicks().await.is_empty());
    }

    #[tokio::test]
    async fn test_late_effect_counts_as_success() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser.delay_click_effect("100001").await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Success);
        assert_eq!(execution.record.attempts, 2);
        // Second attempt saw the effect and did not click again
        assert_eq!(h.browser.clicks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_past_deadline() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser.ignore_clicks("100001", 10).await;
        h.browser
            .advance_clock_on_click(h.clock.clone(), Duration::from_secs(30))
            .await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(20);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert_eq!(execution.record.attempts, 1);
        assert!(execution.record.failure.unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn test_session_loss_fails_listing() {
        let h = Harness::new(vec![MockListing::new("100001", "Desk").renewable()]).await;
        h.browser
            .fail_clicks("100001", 1, DriverError::SessionLost("browser closed".into()))
            .await;
        let listing = h.eligible(RunMode::Renew).await.remove(0);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = h.executor(2).execute(&h.session, listing, &ctx).await;

        assert_eq!(execution.record.outcome, Outcome::Failed);
        assert!(execution.session_expired());
        assert_eq!(execution.record.attempts, 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_clicks() {
        let h = Harness::new(vec![
            MockListing::new("100001", "Desk").renewable(),
            MockListing::new("100002", "Lamp").repostable(),
        ])
        .await;
        let executor = h.executor(2);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        for listing in h.eligible(RunMode::DryRun).await {
            let execution = executor.execute(&h.session, listing, &ctx).await;
            assert_eq!(execution.record.outcome, Outcome::Skipped);
            assert_eq!(execution.record.skip_reason, Some(SkipReason::DryRun));
            assert_eq!(execution.record.decision, Decision::SkippedDryRun);
            assert_eq!(execution.record.attempts, 0);
        }
        assert!(h.browser.clicks().await.is_empty());
    }

    #[tokio::test]
    async fn test_per_action_captures() {
        let h = Harness::new(vec![
            MockListing::new("100001", "Desk").renewable(),
            MockListing::new("100002", "Lamp").renewable(),
        ])
        .await;
        h.browser.ignore_clicks("100002", 10).await;
        let store = Arc::new(MemoryKeyValueStore::new());
        let artifacts = Arc::new(ArtifactCapture::new(
            ScreenshotPolicy::PerAction,
            store.clone(),
            "run-1",
        ));
        let executor = h.executor(0).with_artifacts(artifacts);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::for_listing(ScreenshotPolicy::PerAction, true),
        };

        let mut listings = h.eligible(RunMode::Renew).await.into_iter();
        let ok = executor
            .execute(&h.session, listings.next().unwrap(), &ctx)
            .await
            .record;
        let failed = executor
            .execute(&h.session, listings.next().unwrap(), &ctx)
            .await
            .record;

        assert!(ok.artifacts.before.is_some());
        assert!(ok.artifacts.after.is_some());
        assert!(ok.artifacts.html.is_none());

        assert_eq!(failed.outcome, Outcome::Failed);
        assert!(failed.artifacts.before.is_some());
        assert!(failed.artifacts.after.is_none());
        assert_eq!(
            failed.artifacts.html.as_ref().unwrap().key,
            "run-1/listing-100002-html-snapshot.html"
        );
        assert_eq!(store.keys().await.len(), 4);
    }

    #[tokio::test]
    async fn test_status_verifier_plugged_in() {
        let h = Harness::new(vec![MockListing::new("100001", "Bike")
            .repostable()
            .with_status("expired")])
        .await;
        let executor = ActionExecutor::new(
            "run-1",
            Arc::clone(&h.catalog),
            Arc::new(StatusVerifier::default()),
            h.pacer.clone(),
            0,
            DelayRange::zero(),
        );
        let listing = h.eligible(RunMode::Repost).await.remove(0);
        assert_eq!(listing.available_action, AvailableAction::Repost);
        let deadline = h.deadline(60);
        let ctx = ExecutionContext {
            deadline: &deadline,
            plan: CapturePlan::default(),
        };

        let execution = executor.execute(&h.session, listing, &ctx).await;
        assert_eq!(execution.record.outcome, Outcome::Success);
    }
}
