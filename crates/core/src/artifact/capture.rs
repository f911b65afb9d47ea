use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::audit::{EventHandle, RunEvent};
use crate::config::ScreenshotPolicy;
use crate::output::KeyValueStore;
use crate::session::Session;

use super::{ArtifactError, ArtifactKind, ArtifactRef};

/// Which captures to take around one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturePlan {
    pub before: bool,
    pub after: bool,
    /// Page source when the listing fails.
    pub html_on_failure: bool,
}

impl CapturePlan {
    /// Plan for a listing under `policy`.
    ///
    /// `first` marks the first listing handed to the executor; the summary
    /// policy takes its single "before" there. The summary "after" is taken
    /// at finalization, not per listing.
    pub fn for_listing(policy: ScreenshotPolicy, first: bool) -> Self {
        match policy {
            ScreenshotPolicy::None => Self::default(),
            ScreenshotPolicy::Summary => Self {
                before: first,
                ..Self::default()
            },
            ScreenshotPolicy::PerAction => Self {
                before: true,
                after: true,
                html_on_failure: true,
            },
        }
    }
}

/// Captures screenshots and page source into the key-value store.
pub struct ArtifactCapture {
    policy: ScreenshotPolicy,
    store: Arc<dyn KeyValueStore>,
    run_id: String,
    events: Option<EventHandle>,
}

impl ArtifactCapture {
    pub fn new(
        policy: ScreenshotPolicy,
        store: Arc<dyn KeyValueStore>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            store,
            run_id: run_id.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> ScreenshotPolicy {
        self.policy
    }

    /// Capture one artifact and store it under `{run_id}/{label}-{kind}.{ext}`.
    pub async fn capture(
        &self,
        session: &Session,
        kind: ArtifactKind,
        label: &str,
    ) -> Result<ArtifactRef, ArtifactError> {
        let bytes = match kind {
            ArtifactKind::Before | ArtifactKind::After => session.driver().screenshot().await?,
            ArtifactKind::HtmlSnapshot => session.driver().page_source().await?.into_bytes(),
        };

        let key = format!(
            "{}/{}-{}.{}",
            self.run_id,
            sanitize_label(label),
            kind.as_str(),
            kind.extension()
        );
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        let size_bytes = bytes.len() as u64;

        self.store.put(&key, bytes, kind.content_type()).await?;
        debug!(key = %key, size_bytes, "Artifact stored");

        Ok(ArtifactRef {
            key,
            kind,
            content_type: kind.content_type().to_string(),
            size_bytes,
            sha256,
        })
    }

    /// Capture, logging failures instead of returning them.
    ///
    /// Capture problems never change a listing's outcome.
    pub async fn capture_logged(
        &self,
        session: &Session,
        kind: ArtifactKind,
        label: &str,
        listing_id: Option<&str>,
    ) -> Option<ArtifactRef> {
        match self.capture(session, kind, label).await {
            Ok(artifact) => {
                if let Some(events) = &self.events {
                    events
                        .emit(RunEvent::ArtifactCaptured {
                            run_id: self.run_id.clone(),
                            listing_id: listing_id.map(String::from),
                            kind: kind.as_str().to_string(),
                            key: artifact.key.clone(),
                            size_bytes: artifact.size_bytes,
                        })
                        .await;
                }
                Some(artifact)
            }
            Err(e) => {
                warn!(kind = kind.as_str(), label = label, error = %e, "Artifact capture failed");
                None
            }
        }
    }
}

/// Keep labels safe to use as a single path segment.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BrowserDriver;
    use crate::testing::{fixtures, MemoryKeyValueStore, MockBrowser};

    async fn session() -> (Arc<MockBrowser>, Session) {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser.sign_in().await;
        let session = Session::new(Arc::clone(&browser) as Arc<dyn BrowserDriver>);
        (browser, session)
    }

    #[test]
    fn test_capture_plans() {
        assert_eq!(
            CapturePlan::for_listing(ScreenshotPolicy::None, true),
            CapturePlan::default()
        );

        let first = CapturePlan::for_listing(ScreenshotPolicy::Summary, true);
        assert!(first.before && !first.after && !first.html_on_failure);
        let later = CapturePlan::for_listing(ScreenshotPolicy::Summary, false);
        assert_eq!(later, CapturePlan::default());

        let per_action = CapturePlan::for_listing(ScreenshotPolicy::PerAction, false);
        assert!(per_action.before && per_action.after && per_action.html_on_failure);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("listing-7712345678"), "listing-7712345678");
        assert_eq!(sanitize_label("../x y"), "___x_y");
    }

    #[tokio::test]
    async fn test_capture_screenshot_stores_blob() {
        let (_browser, session) = session().await;
        let store = Arc::new(MemoryKeyValueStore::new());
        let capture = ArtifactCapture::new(ScreenshotPolicy::PerAction, store.clone(), "run-1");

        let artifact = capture
            .capture(&session, ArtifactKind::Before, "listing-100001")
            .await
            .unwrap();

        assert_eq!(artifact.key, "run-1/listing-100001-before.png");
        assert_eq!(artifact.content_type, "image/png");
        let stored = store.get(&artifact.key).await.unwrap().unwrap();
        assert_eq!(stored.bytes.len() as u64, artifact.size_bytes);
        assert_eq!(artifact.sha256, format!("{:x}", Sha256::digest(&stored.bytes)));
    }

    #[tokio::test]
    async fn test_capture_html_snapshot() {
        let (_browser, session) = session().await;
        let store = Arc::new(MemoryKeyValueStore::new());
        let capture = ArtifactCapture::new(ScreenshotPolicy::Summary, store.clone(), "run-1");

        let artifact = capture
            .capture(&session, ArtifactKind::HtmlSnapshot, "run")
            .await
            .unwrap();

        assert_eq!(artifact.key, "run-1/run-html-snapshot.html");
        let stored = store.get(&artifact.key).await.unwrap().unwrap();
        assert!(String::from_utf8(stored.bytes).unwrap().contains("<html"));
    }

    #[tokio::test]
    async fn test_capture_logged_swallows_failures() {
        let (browser, session) = session().await;
        browser.close().await.unwrap();
        let store = Arc::new(MemoryKeyValueStore::new());
        let capture = ArtifactCapture::new(ScreenshotPolicy::PerAction, store.clone(), "run-1");

        let result = capture
            .capture_logged(&session, ArtifactKind::After, "listing-1", Some("1"))
            .await;

        assert!(result.is_none());
        assert!(store.keys().await.is_empty());
    }
}
