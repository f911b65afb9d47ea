use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use crate::driver::BrowserDriver;

/// Account credentials for one run.
///
/// Both values stay wrapped in `SecretString`; they are exposed only at the
/// moment they are typed into the login form.
pub struct Credentials {
    pub identifier: SecretString,
    pub secret: SecretString,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: SecretString::from(identifier.into()),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated browser session.
///
/// Owned by the orchestrator for the length of a run and passed by
/// reference to every component that touches the page.
#[derive(Clone)]
pub struct Session {
    driver: Arc<dyn BrowserDriver>,
    established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            established_at: Utc::now(),
        }
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("driver", &self.driver.name())
            .field("established_at", &self.established_at)
            .finish()
    }
}

/// Login failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The platform refused the credentials or the account is locked. Never retried.
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// The login did not complete; worth another attempt.
    #[error("Login did not complete: {0}")]
    Transient(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
