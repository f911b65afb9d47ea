//! Browser automation abstraction.
//!
//! This module provides a `BrowserDriver` trait for issuing intent-level
//! commands (navigate, find, click, read, screenshot) to a browser, and a
//! W3C WebDriver implementation talking to chromedriver or geckodriver.

mod traits;
mod types;
mod webdriver;

pub use traits::BrowserDriver;
pub use types::{DriverError, ElementHandle};
pub use webdriver::WebDriverClient;
