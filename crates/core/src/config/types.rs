use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ============================================================================
// Run Configuration
// ============================================================================

/// Parameters of a single run. Validated once, then never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunConfig {
    /// What the run is allowed to do with eligible listings.
    pub mode: RunMode,

    /// Which verification screenshots to take.
    #[serde(default)]
    pub screenshot_policy: ScreenshotPolicy,

    /// Bounds of the randomized pause between attempts and listings.
    #[serde(default)]
    pub delay_range: DelayRange,

    /// Global budget for the whole run, measured from run start.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Launch the browser without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Retries after the first attempt of a listing (attempts <= max_retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl RunConfig {
    /// A config with defaults for everything but the mode.
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            screenshot_policy: ScreenshotPolicy::default(),
            delay_range: DelayRange::default(),
            timeout_secs: default_timeout_secs(),
            headless: true,
            max_retries: default_max_retries(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    900
}

fn default_max_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// Requested run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Repost,
    Renew,
    DryRun,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Repost => "repost",
            RunMode::Renew => "renew",
            RunMode::DryRun => "dry-run",
        }
    }
}

/// Screenshot capture policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotPolicy {
    /// Capture nothing.
    None,
    /// One before/after pair for the whole run.
    #[default]
    Summary,
    /// A before/after pair for every attempted listing.
    PerAction,
}

/// Inclusive range of a randomized delay, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// No delay at all.
    pub fn zero() -> Self {
        Self::new(0, 0)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_ms: 1500,
            max_ms: 4500,
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Login retry and wait settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Total login attempts for transient failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay; doubles on each further attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// How long to wait for the login form.
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// How long to wait for the account page after submitting.
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            login_timeout_secs: default_login_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_login_timeout() -> u64 {
    15
}

fn default_confirm_timeout() -> u64 {
    10
}

// ============================================================================
// Platform Configuration
// ============================================================================

/// Target platform URLs and page selectors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_manage_url")]
    pub manage_url: String,
    /// How long to wait for the postings table to render.
    #[serde(default = "default_catalog_timeout")]
    pub catalog_timeout_secs: u64,
    #[serde(default)]
    pub selectors: PlatformSelectors,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            manage_url: default_manage_url(),
            catalog_timeout_secs: default_catalog_timeout(),
            selectors: PlatformSelectors::default(),
        }
    }
}

fn default_login_url() -> String {
    "https://accounts.craigslist.org/login/home".to_string()
}

fn default_manage_url() -> String {
    // The account home page doubles as the manage-postings page.
    "https://accounts.craigslist.org/login/home".to_string()
}

fn default_catalog_timeout() -> u64 {
    15
}

/// CSS selectors for every element the orchestrator reads or clicks.
///
/// Every field can be overridden individually in `[platform.selectors]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformSelectors {
    pub identifier_field: String,
    pub secret_field: String,
    pub submit_button: String,
    /// Present only on an authenticated account page.
    pub account_marker: String,
    /// Login error banner (bad credentials, locked or blocked account).
    pub rejection_marker: String,

    pub table: String,
    /// Rows, relative to the table.
    pub row: String,
    /// Marks a header row, relative to a row.
    pub header_cell: String,
    /// Rendered instead of rows when the account has no postings.
    pub empty_catalog_marker: Option<String>,

    pub listing_id: String,
    /// Attribute holding the id; the element text is used when unset.
    pub listing_id_attribute: Option<String>,
    /// First capture group (or whole match) is the listing id.
    pub listing_id_pattern: String,
    pub title: String,
    pub status: String,
    pub renew_button: String,
    pub repost_button: String,
}

impl Default for PlatformSelectors {
    fn default() -> Self {
        Self {
            identifier_field: "#inputEmailHandle".to_string(),
            secret_field: "#inputPassword".to_string(),
            submit_button: r#"button[type="submit"], input[type="submit"]"#.to_string(),
            account_marker: r#"a[href*="logout"], a[href*="logoff"], form[action*="logout"]"#
                .to_string(),
            rejection_marker: ".alert-error, .login-error, p.error".to_string(),
            table: r#"table.account-table, table[data-event*="manage"], table"#.to_string(),
            row: "tr".to_string(),
            header_cell: "th".to_string(),
            empty_catalog_marker: None,
            listing_id: "td.postingID".to_string(),
            listing_id_attribute: None,
            listing_id_pattern: r"(\d{5,})".to_string(),
            title: "td.title".to_string(),
            status: "td.status".to_string(),
            renew_button: r#"input[type="submit"][value="renew"], button[value="renew"]"#
                .to_string(),
            repost_button: r#"input[type="submit"][value="repost"], button[value="repost"]"#
                .to_string(),
        }
    }
}

// ============================================================================
// Driver Configuration
// ============================================================================

/// Browser driver configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub backend: DriverBackend,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Available driver backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverBackend {
    #[default]
    Webdriver,
    // Future: Cdp
}

/// W3C WebDriver endpoint (chromedriver, geckodriver, selenium)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    #[serde(default)]
    pub browser: BrowserKind,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u32,
    /// How often `wait_for` polls the page
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            browser: BrowserKind::default(),
            timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_request_timeout() -> u32 {
    30
}

fn default_poll_interval() -> u64 {
    250
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

// ============================================================================
// Output Configuration
// ============================================================================

/// Where run results are handed off.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Key-value store directory (summary.json, artifacts, checkpoint).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// SQLite database for dataset rows and run events.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Push one dataset row per attempted listing.
    #[serde(default = "default_true")]
    pub dataset: bool,
    /// Write a crash-recovery checkpoint after each listing.
    #[serde(default = "default_true")]
    pub checkpoint: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database: default_database(),
            dataset: true,
            checkpoint: true,
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_database() -> PathBuf {
    PathBuf::from("renewal.db")
}
