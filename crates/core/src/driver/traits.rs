//! Trait definition for browser drivers.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{DriverError, ElementHandle};

/// Intent-level browser automation commands.
///
/// The orchestrator never relies on the driver's own waiting or retry
/// behavior; it verifies and retries above this layer.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Returns the name of this driver implementation.
    fn name(&self) -> &str;

    /// Loads `url` in the current tab.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// URL of the page currently shown.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// All elements on the page matching a CSS selector, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;

    /// All descendants of `parent` matching a CSS selector, in document order.
    async fn find_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Polls until an element matches `selector`, or fails with `Timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration)
        -> Result<ElementHandle, DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Types `value` into an input element, replacing its content.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    /// Submits the form owning `element` (Enter key).
    async fn submit(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Rendered text of an element.
    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Serialized DOM of the current page.
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Ends the browser session.
    async fn close(&self) -> Result<(), DriverError>;
}
