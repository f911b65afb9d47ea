//! Testing utilities and mock implementations.
//!
//! A scripted browser that simulates the platform's login page and postings
//! table, plus deterministic time and in-memory result stores, so whole runs
//! can be exercised without a real browser.
//!
//! # Example
//!
//! ```rust,ignore
//! use renewal_core::testing::{fixtures, MockBrowser, MockListing, RecordingPacer};
//!
//! let browser = Arc::new(MockBrowser::new(&fixtures::platform_config()));
//! browser.set_listings(vec![
//!     MockListing::new("7712345678", "Oak desk").renewable(),
//!     MockListing::new("7712345679", "Road bike").repostable(),
//! ]).await;
//!
//! let orchestrator = RunOrchestrator::new(fixtures::config(RunMode::Renew), browser.clone())?
//!     .with_pacer(Arc::new(RecordingPacer::new()));
//! let summary = orchestrator.run(&fixtures::credentials()).await;
//!
//! assert_eq!(browser.clicks().await.len(), 1);
//! ```

mod mock_browser;
mod mock_pacing;
mod mock_stores;

pub use mock_browser::{MockBrowser, MockClick, MockListing};
pub use mock_pacing::{ManualClock, RecordingPacer};
pub use mock_stores::{MemoryDataset, MemoryKeyValueStore};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::config::{
        Config, DelayRange, DriverConfig, OutputConfig, PlatformConfig, RunConfig, RunMode,
        ScreenshotPolicy, SessionConfig,
    };
    use crate::session::Credentials;

    /// Platform settings pointing at a fake account host; default selectors.
    pub fn platform_config() -> PlatformConfig {
        PlatformConfig {
            login_url: "https://accounts.example.test/login".to_string(),
            manage_url: "https://accounts.example.test/home".to_string(),
            ..PlatformConfig::default()
        }
    }

    pub fn credentials() -> Credentials {
        Credentials::new("seller@example.test", "correct horse")
    }

    /// Run parameters with no screenshots and no pacing delay.
    pub fn run_config(mode: RunMode) -> RunConfig {
        RunConfig {
            mode,
            screenshot_policy: ScreenshotPolicy::None,
            delay_range: DelayRange::zero(),
            timeout_secs: 600,
            headless: true,
            max_retries: 2,
        }
    }

    /// A complete config around `run_config(mode)`.
    pub fn config(mode: RunMode) -> Config {
        Config {
            run: run_config(mode),
            session: SessionConfig {
                backoff_base_ms: 10,
                ..SessionConfig::default()
            },
            platform: platform_config(),
            driver: DriverConfig::default(),
            output: OutputConfig {
                storage_dir: PathBuf::from("storage"),
                database: PathBuf::from(":memory:"),
                dataset: true,
                checkpoint: true,
            },
        }
    }
}
