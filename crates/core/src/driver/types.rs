//! Types for browser driver operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a browser driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether the same command is worth issuing again.
    ///
    /// Timeouts, detached/stale references, intercepted clicks and
    /// not-yet-rendered elements are typical of a page that is still moving.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::Timeout(_)
                | Self::ElementNotFound { .. }
                | Self::StaleElement(_)
                | Self::NotInteractable(_)
                | Self::Navigation(_)
        )
    }

    /// Whether the browser session itself is gone.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }

    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }
}

/// Opaque reference to an element on the current page.
///
/// Only valid until the page changes; using it afterwards yields
/// `DriverError::StaleElement`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
