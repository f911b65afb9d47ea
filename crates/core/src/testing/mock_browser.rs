//! Mock browser for testing.
//!
//! Simulates the platform's login page and manage-postings table. Selectors
//! are matched by exact string comparison against the configured
//! `PlatformSelectors`, so the mock only understands the selectors the
//! orchestrator actually issues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::ActionKind;
use crate::config::{PlatformConfig, PlatformSelectors};
use crate::driver::{BrowserDriver, DriverError, ElementHandle};

use super::ManualClock;

/// A posting shown in the mock catalog.
#[derive(Debug, Clone)]
pub struct MockListing {
    pub id: String,
    pub title: Option<String>,
    pub status: String,
    pub renew: bool,
    pub repost: bool,
    pub renew_enabled: bool,
    pub hidden: bool,
    pub blank: bool,
}

impl MockListing {
    /// An active listing without any affordance.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            status: "Active".to_string(),
            renew: false,
            repost: false,
            renew_enabled: true,
            hidden: false,
            blank: false,
        }
    }

    /// A row with no content at all (spacer rows).
    pub fn blank() -> Self {
        Self {
            title: None,
            blank: true,
            ..Self::new("", "")
        }
    }

    pub fn renewable(mut self) -> Self {
        self.renew = true;
        self
    }

    pub fn repostable(mut self) -> Self {
        self.repost = true;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    /// Renew control rendered but disabled.
    pub fn with_disabled_renew(mut self) -> Self {
        self.renew_enabled = false;
        self
    }
}

/// A recorded click on a listing control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockClick {
    pub listing_id: String,
    pub action: ActionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Login,
    Account,
    Confirmation,
    Other,
}

#[derive(Debug)]
struct MockState {
    url: String,
    page: Page,
    /// Bumped on every page change; handles from older generations are stale.
    generation: u64,
    logged_in: bool,
    closed: bool,

    listings: Vec<MockListing>,
    table_present: bool,
    submit_button: bool,

    login_failures_remaining: u32,
    /// Logins succeeding before every further login is rejected.
    rejection: Option<(u32, String)>,
    rejection_shown: bool,
    successful_logins: u32,
    login_submissions: u32,
    filled: Vec<(String, String)>,

    clicks: Vec<MockClick>,
    click_failures: HashMap<String, (u32, DriverError)>,
    ignored_clicks: HashMap<String, u32>,
    delayed_effects: Vec<String>,
    /// (listing id, action, catalog reads until the effect shows)
    pending_effects: Vec<(String, ActionKind, u32)>,
    expire_on_click: Vec<String>,
    /// One-shot failures reading a listing's id cell.
    id_read_failures: Vec<(String, DriverError)>,
    /// Moved into `id_read_failures` when the listing is next clicked.
    id_read_failures_after_click: Vec<(String, DriverError)>,
    clock: Option<(Arc<ManualClock>, Duration)>,
}

/// Mock implementation of the BrowserDriver trait.
///
/// # Example
///
/// ```rust,ignore
/// let browser = MockBrowser::new(&platform);
/// browser.set_listings(vec![MockListing::new("100001", "Desk").renewable()]).await;
/// browser.fail_clicks("100001", 1, DriverError::StaleElement("detached".into())).await;
///
/// // ... run the orchestrator ...
///
/// assert_eq!(browser.clicks().await.len(), 2);
/// ```
pub struct MockBrowser {
    selectors: PlatformSelectors,
    login_url: String,
    manage_url: String,
    state: Arc<RwLock<MockState>>,
}

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

impl MockBrowser {
    /// A browser showing a blank page, with an empty catalog behind the login.
    pub fn new(platform: &PlatformConfig) -> Self {
        Self {
            selectors: platform.selectors.clone(),
            login_url: platform.login_url.clone(),
            manage_url: platform.manage_url.clone(),
            state: Arc::new(RwLock::new(MockState {
                url: "about:blank".to_string(),
                page: Page::Blank,
                generation: 0,
                logged_in: false,
                closed: false,
                listings: Vec::new(),
                table_present: true,
                submit_button: true,
                login_failures_remaining: 0,
                rejection: None,
                rejection_shown: false,
                successful_logins: 0,
                login_submissions: 0,
                filled: Vec::new(),
                clicks: Vec::new(),
                click_failures: HashMap::new(),
                ignored_clicks: HashMap::new(),
                delayed_effects: Vec::new(),
                pending_effects: Vec::new(),
                expire_on_click: Vec::new(),
                id_read_failures: Vec::new(),
                id_read_failures_after_click: Vec::new(),
                clock: None,
            })),
        }
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Replace the catalog rows.
    pub async fn set_listings(&self, listings: Vec<MockListing>) {
        let mut state = self.state.write().await;
        state.listings = listings;
        state.generation += 1;
    }

    /// The manage page renders without the postings table.
    pub async fn remove_table(&self) {
        self.state.write().await.table_present = false;
    }

    /// The login form has no submit button; the form is submitted with Enter.
    pub async fn remove_submit_button(&self) {
        self.state.write().await.submit_button = false;
    }

    /// The next `count` logins neither land nor show an error.
    pub async fn fail_logins(&self, count: u32) {
        self.state.write().await.login_failures_remaining = count;
    }

    /// Every login is rejected with `message`.
    pub async fn reject_login(&self, message: impl Into<String>) {
        self.reject_login_after(0, message).await;
    }

    /// The first `successful` logins work; later ones are rejected.
    pub async fn reject_login_after(&self, successful: u32, message: impl Into<String>) {
        self.state.write().await.rejection = Some((successful, message.into()));
    }

    /// Put the browser on the account page as if already logged in.
    pub async fn sign_in(&self) {
        let mut state = self.state.write().await;
        state.logged_in = true;
        state.page = Page::Account;
        state.url = self.manage_url.clone();
        state.generation += 1;
    }

    /// Drop the login; the browser lands on the login page.
    pub async fn expire_session(&self) {
        let mut state = self.state.write().await;
        Self::expire(&mut state, &self.login_url);
    }

    /// The next `count` clicks on the listing's controls fail with `error`.
    pub async fn fail_clicks(&self, listing_id: &str, count: u32, error: DriverError) {
        self.state
            .write()
            .await
            .click_failures
            .insert(listing_id.to_string(), (count, error));
    }

    /// The next `count` clicks on the listing's controls go through without effect.
    pub async fn ignore_clicks(&self, listing_id: &str, count: u32) {
        self.state
            .write()
            .await
            .ignored_clicks
            .insert(listing_id.to_string(), count);
    }

    /// The next click's effect only shows on the second catalog read after it.
    pub async fn delay_click_effect(&self, listing_id: &str) {
        self.state
            .write()
            .await
            .delayed_effects
            .push(listing_id.to_string());
    }

    /// The session silently expires when the listing's control is clicked.
    pub async fn expire_session_on_click(&self, listing_id: &str) {
        self.state
            .write()
            .await
            .expire_on_click
            .push(listing_id.to_string());
    }

    /// The next read of the listing's id cell fails with `error`.
    pub async fn fail_id_read(&self, listing_id: &str, error: DriverError) {
        self.state
            .write()
            .await
            .id_read_failures
            .push((listing_id.to_string(), error));
    }

    /// Like `fail_id_read`, but only for the first read after the listing is next clicked.
    pub async fn fail_id_read_after_click(&self, listing_id: &str, error: DriverError) {
        self.state
            .write()
            .await
            .id_read_failures_after_click
            .push((listing_id.to_string(), error));
    }

    /// Every listing click advances `clock` by `step`.
    pub async fn advance_clock_on_click(&self, clock: Arc<ManualClock>, step: Duration) {
        self.state.write().await.clock = Some((clock, step));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn clicks(&self) -> Vec<MockClick> {
        self.state.read().await.clicks.clone()
    }

    pub async fn login_submissions(&self) -> u32 {
        self.state.read().await.login_submissions
    }

    /// (field, value) pairs typed into the login form, in order.
    pub async fn filled_fields(&self) -> Vec<(String, String)> {
        self.state.read().await.filled.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.read().await.logged_in
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Current listing rows.
    pub async fn listings(&self) -> Vec<MockListing> {
        self.state.read().await.listings.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn expire(state: &mut MockState, login_url: &str) {
        state.logged_in = false;
        state.page = Page::Login;
        state.url = login_url.to_string();
        state.generation += 1;
    }

    fn handle(state: &MockState, kind: &str, index: usize) -> ElementHandle {
        ElementHandle::new(format!("{}:{}:{}", kind, state.generation, index))
    }

    /// Split a handle into (kind, index), rejecting handles from older pages.
    fn resolve<'a>(
        state: &MockState,
        element: &'a ElementHandle,
    ) -> Result<(&'a str, usize), DriverError> {
        let mut parts = element.id().split(':');
        let (Some(kind), Some(generation), Some(index)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DriverError::Protocol(format!(
                "unknown element {}",
                element.id()
            )));
        };
        let generation: u64 = generation
            .parse()
            .map_err(|_| DriverError::Protocol(format!("unknown element {}", element.id())))?;
        let index: usize = index
            .parse()
            .map_err(|_| DriverError::Protocol(format!("unknown element {}", element.id())))?;
        if generation != state.generation {
            return Err(DriverError::StaleElement(element.id().to_string()));
        }
        Ok((kind, index))
    }

    fn check_open(state: &MockState) -> Result<(), DriverError> {
        if state.closed {
            return Err(DriverError::SessionLost("browser closed".to_string()));
        }
        Ok(())
    }

    /// Listing behind row `index` (row 0 is the header).
    fn listing(state: &MockState, index: usize) -> Result<&MockListing, DriverError> {
        index
            .checked_sub(1)
            .and_then(|i| state.listings.get(i))
            .ok_or_else(|| DriverError::StaleElement(format!("row {}", index)))
    }

    fn do_login(&self, state: &mut MockState) {
        state.login_submissions += 1;
        if state.login_failures_remaining > 0 {
            state.login_failures_remaining -= 1;
            return;
        }
        if let Some((allowed, _)) = &state.rejection {
            if state.successful_logins >= *allowed {
                state.rejection_shown = true;
                return;
            }
        }
        state.successful_logins += 1;
        state.logged_in = true;
        state.page = Page::Account;
        state.url = self.manage_url.clone();
        state.generation += 1;
    }

    fn apply_effect(state: &mut MockState, listing_id: &str, action: ActionKind) {
        if let Some(listing) = state.listings.iter_mut().find(|l| l.id == listing_id) {
            match action {
                ActionKind::Renew => listing.renew = false,
                ActionKind::Repost => listing.repost = false,
            }
            listing.status = "Active".to_string();
        }
    }

    fn click_listing(
        &self,
        state: &mut MockState,
        index: usize,
        action: ActionKind,
    ) -> Result<(), DriverError> {
        let listing_id = Self::listing(state, index)?.id.clone();
        state.clicks.push(MockClick {
            listing_id: listing_id.clone(),
            action,
        });

        if let Some(pos) = state
            .id_read_failures_after_click
            .iter()
            .position(|(id, _)| *id == listing_id)
        {
            let armed = state.id_read_failures_after_click.remove(pos);
            state.id_read_failures.push(armed);
        }

        if let Some((clock, step)) = &state.clock {
            clock.advance(*step);
        }

        if let Some((remaining, error)) = state.click_failures.get_mut(&listing_id) {
            if *remaining > 0 {
                *remaining -= 1;
                let error = error.clone();
                if error.is_session_lost() {
                    state.closed = true;
                }
                return Err(error);
            }
        }

        if let Some(pos) = state.expire_on_click.iter().position(|id| *id == listing_id) {
            state.expire_on_click.remove(pos);
            Self::expire(state, &self.login_url);
            return Ok(());
        }

        let ignored = match state.ignored_clicks.get_mut(&listing_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        if !ignored {
            if let Some(pos) = state.delayed_effects.iter().position(|id| *id == listing_id) {
                state.delayed_effects.remove(pos);
                state.pending_effects.push((listing_id, action, 2));
            } else {
                Self::apply_effect(state, &listing_id, action);
            }
        }

        state.page = Page::Confirmation;
        state.url = format!("{}?confirm={}", self.manage_url, action);
        state.generation += 1;
        Ok(())
    }

    /// Count a catalog read against delayed effects.
    fn tick_pending_effects(state: &mut MockState) {
        let mut landed = Vec::new();
        for (listing_id, action, remaining) in state.pending_effects.iter_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                landed.push((listing_id.clone(), *action));
            }
        }
        state.pending_effects.retain(|(_, _, remaining)| *remaining > 0);
        for (listing_id, action) in landed {
            Self::apply_effect(state, &listing_id, action);
        }
    }

    fn page_elements(&self, state: &MockState, selector: &str) -> Vec<ElementHandle> {
        let s = &self.selectors;
        let found = match state.page {
            Page::Login => {
                if selector == s.identifier_field {
                    Some("identifier")
                } else if selector == s.secret_field {
                    Some("secret")
                } else if selector == s.submit_button && state.submit_button {
                    Some("submit")
                } else if selector == s.rejection_marker && state.rejection_shown {
                    Some("rejection")
                } else {
                    None
                }
            }
            Page::Account => {
                if selector == s.account_marker {
                    Some("account")
                } else if selector == s.table && state.table_present {
                    Some("table")
                } else if s.empty_catalog_marker.as_deref() == Some(selector)
                    && state.listings.is_empty()
                {
                    Some("empty")
                } else {
                    None
                }
            }
            Page::Confirmation => (selector == s.account_marker).then_some("account"),
            Page::Blank | Page::Other => None,
        };
        found
            .map(|kind| vec![Self::handle(state, kind, 0)])
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    fn name(&self) -> &str {
        "mock"
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;

        state.generation += 1;
        state.rejection_shown = false;

        if url == self.manage_url || url == self.login_url {
            if state.logged_in {
                state.page = Page::Account;
                state.url = self.manage_url.clone();
            } else {
                state.page = Page::Login;
                state.url = self.login_url.clone();
            }
        } else {
            state.page = Page::Other;
            state.url = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        Ok(state.url.clone())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        Ok(self.page_elements(&state, selector))
    }

    async fn find_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, parent)?;
        let s = &self.selectors;

        let found = match kind {
            "table" if selector == s.row => {
                Self::tick_pending_effects(&mut state);
                (0..=state.listings.len())
                    .map(|i| Self::handle(&state, "row", i))
                    .collect()
            }
            "row" if index == 0 => {
                if selector == s.header_cell {
                    vec![Self::handle(&state, "th", 0)]
                } else {
                    vec![]
                }
            }
            "row" => {
                let listing_id = Self::listing(&state, index)?.id.clone();
                if selector == s.listing_id {
                    if let Some(pos) = state
                        .id_read_failures
                        .iter()
                        .position(|(id, _)| *id == listing_id)
                    {
                        let (_, error) = state.id_read_failures.remove(pos);
                        return Err(error);
                    }
                }
                let listing = Self::listing(&state, index)?;
                let kind = if selector == s.listing_id && !listing.blank {
                    Some("id")
                } else if selector == s.title && listing.title.is_some() {
                    Some("title")
                } else if selector == s.status && !listing.blank {
                    Some("status")
                } else if selector == s.renew_button && listing.renew {
                    Some("renew")
                } else if selector == s.repost_button && listing.repost {
                    Some("repost")
                } else {
                    None
                };
                kind.map(|k| vec![Self::handle(&state, k, index)])
                    .unwrap_or_default()
            }
            _ => vec![],
        };
        Ok(found)
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.find_all(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DriverError::Timeout(format!("{} did not appear within {:?}", selector, timeout))
            })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, element)?;
        match kind {
            "submit" => {
                self.do_login(&mut state);
                Ok(())
            }
            "renew" => self.click_listing(&mut state, index, ActionKind::Renew),
            "repost" => self.click_listing(&mut state, index, ActionKind::Repost),
            _ => Ok(()),
        }
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;
        let (kind, _) = Self::resolve(&state, element)?;
        match kind {
            "identifier" | "secret" => {
                state.filled.push((kind.to_string(), value.to_string()));
                Ok(())
            }
            other => Err(DriverError::NotInteractable(format!("{} is not an input", other))),
        }
    }

    async fn submit(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;
        let (kind, _) = Self::resolve(&state, element)?;
        if matches!(kind, "identifier" | "secret") {
            self.do_login(&mut state);
        }
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, element)?;

        let text = match kind {
            "row" if index == 0 => "Posting Title Status".to_string(),
            "row" => {
                let l = Self::listing(&state, index)?;
                if l.blank {
                    String::new()
                } else {
                    format!("{} {} {}", l.id, l.title.clone().unwrap_or_default(), l.status)
                }
            }
            "id" => Self::listing(&state, index)?.id.clone(),
            "title" => Self::listing(&state, index)?.title.clone().unwrap_or_default(),
            "status" => Self::listing(&state, index)?.status.clone(),
            "renew" => "renew".to_string(),
            "repost" => "repost".to_string(),
            "rejection" => state
                .rejection
                .as_ref()
                .map(|(_, message)| message.clone())
                .unwrap_or_default(),
            "account" => "log out".to_string(),
            _ => String::new(),
        };
        Ok(text)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, element)?;
        Ok(match (kind, name) {
            ("renew" | "repost", "value") => Some(kind.to_string()),
            ("id", "data-id") => Some(Self::listing(&state, index)?.id.clone()),
            _ => None,
        })
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, element)?;
        match kind {
            "row" if index > 0 => Ok(!Self::listing(&state, index)?.hidden),
            _ => Ok(true),
        }
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        let (kind, index) = Self::resolve(&state, element)?;
        match kind {
            "renew" => Ok(Self::listing(&state, index)?.renew_enabled),
            _ => Ok(true),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(&state.generation.to_be_bytes());
        Ok(png)
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        Ok(format!(
            "<html><body data-page=\"{:?}\" data-url=\"{}\"></body></html>",
            state.page, state.url
        ))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.write().await.closed = true;
        Ok(())
    }
}
