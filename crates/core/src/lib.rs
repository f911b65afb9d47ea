pub mod artifact;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod eligibility;
pub mod executor;
pub mod orchestrator;
pub mod output;
pub mod pacing;
pub mod session;
pub mod testing;

pub use catalog::{ActionKind, AvailableAction, Decision, ListingRecord, Outcome, SkipReason};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, RunConfig, RunMode,
    ScreenshotPolicy,
};
pub use driver::{BrowserDriver, DriverError, WebDriverClient};
pub use orchestrator::{
    record_setup_failure, RunAbortHandle, RunCounts, RunOrchestrator, RunState, RunSummary,
};
pub use session::{AuthError, Credentials};
