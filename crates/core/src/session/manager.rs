use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use crate::config::{PlatformConfig, SessionConfig};
use crate::driver::{BrowserDriver, DriverError};
use crate::pacing::Pacer;

use super::{AuthError, Credentials, Session};

/// Establishes and checks the authenticated session.
pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    platform: PlatformConfig,
    config: SessionConfig,
    pacer: Arc<dyn Pacer>,
}

impl SessionManager {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        platform: PlatformConfig,
        config: SessionConfig,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            driver,
            platform,
            config,
            pacer,
        }
    }

    /// Log in, retrying transient failures with exponential backoff.
    ///
    /// A rejection is returned immediately. Transient failures are retried
    /// until `max_attempts` logins have been tried.
    pub async fn establish(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "Attempting login");

            match self.login_once(credentials).await {
                Ok(()) => {
                    info!(attempt, driver = self.driver.name(), "Session established");
                    return Ok(Session::new(Arc::clone(&self.driver)));
                }
                Err(AuthError::Rejected(reason)) => {
                    error!(reason = %reason, "Login rejected");
                    return Err(AuthError::Rejected(reason));
                }
                Err(AuthError::Transient(reason)) => {
                    if attempt >= max_attempts {
                        error!(attempt, reason = %reason, "Login failed, giving up");
                        return Err(AuthError::Transient(format!(
                            "gave up after {} attempts: {}",
                            attempt, reason
                        )));
                    }
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Login did not complete, retrying"
                    );
                    self.pacer.sleep(delay).await;
                }
            }
        }
    }

    /// Look for the account marker on the current page without navigating.
    ///
    /// Any driver error counts as not alive.
    pub async fn is_alive(&self, session: &Session) -> bool {
        match session
            .driver()
            .find_all(&self.platform.selectors.account_marker)
            .await
        {
            Ok(found) => !found.is_empty(),
            Err(e) => {
                debug!(error = %e, "Liveness check failed");
                false
            }
        }
    }

    async fn login_once(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let driver = self.driver.as_ref();
        let selectors = &self.platform.selectors;

        driver
            .navigate(&self.platform.login_url)
            .await
            .map_err(transient)?;

        let identifier = match driver
            .wait_for(
                &selectors.identifier_field,
                Duration::from_secs(self.config.login_timeout_secs),
            )
            .await
        {
            Ok(el) => el,
            Err(e) => {
                // No login form: either still signed in from earlier, or blocked.
                if self.marker_present(&selectors.account_marker).await {
                    debug!("Login form absent, account page already shown");
                    return Ok(());
                }
                self.check_rejection().await?;
                return Err(transient(e));
            }
        };

        driver
            .fill(&identifier, credentials.identifier.expose_secret())
            .await
            .map_err(transient)?;

        let secret_field = driver
            .find_all(&selectors.secret_field)
            .await
            .map_err(transient)?
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Transient("secret field not found".to_string()))?;

        driver
            .fill(&secret_field, credentials.secret.expose_secret())
            .await
            .map_err(transient)?;

        let submit = driver
            .find_all(&selectors.submit_button)
            .await
            .map_err(transient)?
            .into_iter()
            .next();
        match submit {
            Some(button) => driver.click(&button).await.map_err(transient)?,
            None => driver.submit(&secret_field).await.map_err(transient)?,
        }

        match driver
            .wait_for(
                &selectors.account_marker,
                Duration::from_secs(self.config.confirm_timeout_secs),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                self.check_rejection().await?;
                Err(AuthError::Transient(format!(
                    "account page did not appear: {}",
                    e
                )))
            }
        }
    }

    async fn marker_present(&self, selector: &str) -> bool {
        matches!(self.driver.find_all(selector).await, Ok(found) if !found.is_empty())
    }

    /// Fail with `Rejected` when a login error banner is displayed.
    async fn check_rejection(&self) -> Result<(), AuthError> {
        let driver = self.driver.as_ref();
        let banners = driver
            .find_all(&self.platform.selectors.rejection_marker)
            .await
            .unwrap_or_default();

        for banner in banners {
            if !driver.is_displayed(&banner).await.unwrap_or(false) {
                continue;
            }
            let text = driver.text(&banner).await.unwrap_or_default();
            let text = text.trim();
            return Err(AuthError::Rejected(if text.is_empty() {
                "login error displayed".to_string()
            } else {
                text.to_string()
            }));
        }
        Ok(())
    }
}

fn transient(e: DriverError) -> AuthError {
    AuthError::Transient(e.to_string())
}

/// Delay before retrying after failed attempt number `attempt` (1-based).
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockBrowser, RecordingPacer};

    fn manager(browser: Arc<MockBrowser>, pacer: Arc<RecordingPacer>) -> SessionManager {
        SessionManager::new(
            browser,
            fixtures::platform_config(),
            SessionConfig::default(),
            pacer,
        )
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_establish_success() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        let pacer = Arc::new(RecordingPacer::new());
        let manager = manager(Arc::clone(&browser), Arc::clone(&pacer));

        let session = manager
            .establish(&fixtures::credentials())
            .await
            .expect("login should succeed");

        assert!(manager.is_alive(&session).await);
        assert_eq!(browser.login_submissions().await, 1);
        assert!(pacer.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_establish_types_credentials_into_fields() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        let manager = manager(Arc::clone(&browser), Arc::new(RecordingPacer::new()));

        manager.establish(&fixtures::credentials()).await.unwrap();

        let filled = browser.filled_fields().await;
        assert_eq!(
            filled,
            vec![
                ("identifier".to_string(), "seller@example.test".to_string()),
                ("secret".to_string(), "correct horse".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_establish_submits_form_without_button() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser.remove_submit_button().await;
        let manager = manager(Arc::clone(&browser), Arc::new(RecordingPacer::new()));

        assert!(manager.establish(&fixtures::credentials()).await.is_ok());
        assert_eq!(browser.login_submissions().await, 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser.reject_login("Your account has been locked").await;
        let pacer = Arc::new(RecordingPacer::new());
        let manager = manager(Arc::clone(&browser), Arc::clone(&pacer));

        let err = manager.establish(&fixtures::credentials()).await.unwrap_err();

        assert_eq!(
            err,
            AuthError::Rejected("Your account has been locked".to_string())
        );
        assert_eq!(browser.login_submissions().await, 1);
        assert!(pacer.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_retry_with_backoff() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser.fail_logins(2).await;
        let pacer = Arc::new(RecordingPacer::new());
        let manager = manager(Arc::clone(&browser), Arc::clone(&pacer));

        assert!(manager.establish(&fixtures::credentials()).await.is_ok());
        assert_eq!(browser.login_submissions().await, 3);
        assert_eq!(
            pacer.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_attempts() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        browser.fail_logins(10).await;
        let manager = manager(Arc::clone(&browser), Arc::new(RecordingPacer::new()));

        let err = manager.establish(&fixtures::credentials()).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(browser.login_submissions().await, 3);
    }

    #[tokio::test]
    async fn test_is_alive_false_after_expiry() {
        let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
        let manager = manager(Arc::clone(&browser), Arc::new(RecordingPacer::new()));
        let session = manager.establish(&fixtures::credentials()).await.unwrap();

        browser.expire_session().await;

        assert!(!manager.is_alive(&session).await);
    }
}
