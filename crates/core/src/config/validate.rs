use super::{
    types::{Config, RunConfig},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Run parameters (see `validate_run_config`)
/// - Session retry bound is at least one attempt
/// - Platform URLs are absolute http(s) URLs
/// - The listing id pattern compiles
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;

    if config.session.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "session.max_attempts must be at least 1".to_string(),
        ));
    }

    for (name, url) in [
        ("platform.login_url", &config.platform.login_url),
        ("platform.manage_url", &config.platform.manage_url),
        ("driver.webdriver.url", &config.driver.webdriver.url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be an http(s) URL, got {:?}",
                name, url
            )));
        }
    }

    regex_lite::Regex::new(&config.platform.selectors.listing_id_pattern).map_err(|e| {
        ConfigError::ValidationError(format!(
            "platform.selectors.listing_id_pattern is not a valid regex: {}",
            e
        ))
    })?;

    Ok(())
}

/// Validate the parameters of a single run.
///
/// Checked once before the run starts, so a bad config fails before any
/// network activity.
pub fn validate_run_config(run: &RunConfig) -> Result<(), ConfigError> {
    if run.delay_range.min_ms > run.delay_range.max_ms {
        return Err(ConfigError::ValidationError(format!(
            "run.delay_range.min_ms ({}) must not exceed max_ms ({})",
            run.delay_range.min_ms, run.delay_range.max_ms
        )));
    }

    if run.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "run.timeout_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
