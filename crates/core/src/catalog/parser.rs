use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use regex_lite::Regex;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PlatformConfig};
use crate::driver::{BrowserDriver, DriverError, ElementHandle};
use crate::session::Session;

use super::{
    AvailableAction, CatalogSnapshot, ListingObservation, ListingRecord, ListingStatus,
    ParseError, RowMatch, RowWarning,
};

/// Reads the manage-postings table.
pub struct CatalogParser {
    platform: PlatformConfig,
    id_pattern: Regex,
}

impl CatalogParser {
    pub fn new(platform: PlatformConfig) -> Result<Self, ConfigError> {
        let id_pattern = Regex::new(&platform.selectors.listing_id_pattern).map_err(|e| {
            ConfigError::ValidationError(format!("invalid listing id pattern: {}", e))
        })?;
        Ok(Self {
            platform,
            id_pattern,
        })
    }

    /// Show the catalog page and wait for the postings table.
    ///
    /// Navigates only when the browser is somewhere else.
    pub async fn open(&self, session: &Session) -> Result<ElementHandle, ParseError> {
        let driver = session.driver();

        let current = driver.current_url().await?;
        if current.trim_end_matches('/') != self.platform.manage_url.trim_end_matches('/') {
            debug!(from = %current, "Opening catalog page");
            driver.navigate(&self.platform.manage_url).await?;
        }

        let timeout = Duration::from_secs(self.platform.catalog_timeout_secs);
        match driver.wait_for(&self.platform.selectors.table, timeout).await {
            Ok(table) => Ok(table),
            Err(DriverError::Timeout(_)) | Err(DriverError::ElementNotFound { .. }) => {
                Err(ParseError::StructuralMismatch(format!(
                    "postings table ({}) not found",
                    self.platform.selectors.table
                )))
            }
            Err(e) => Err(ParseError::Driver(e)),
        }
    }

    /// Snapshot every listing on the catalog page, in page order.
    ///
    /// Rows that cannot be read are dropped with a warning. Fails only when
    /// the table is missing, holds no data rows without the empty-catalog
    /// marker, or when every data row fails.
    pub async fn extract(&self, session: &Session) -> Result<CatalogSnapshot, ParseError> {
        let table = self.open(session).await?;
        let driver = session.driver();
        let rows = driver.find_in(&table, &self.platform.selectors.row).await?;

        let mut snapshot = CatalogSnapshot::default();
        let mut seen = HashSet::new();
        let mut data_rows = 0usize;

        for (index, row) in rows.iter().enumerate() {
            let parsed = match self.read_row(driver, row, index).await {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(ParseError::RowSkipped { index, reason }) => {
                    data_rows += 1;
                    warn!(index, reason = %reason, "Skipping catalog row");
                    snapshot.warnings.push(RowWarning { index, reason });
                    continue;
                }
                Err(e) => return Err(e),
            };
            data_rows += 1;

            let observation = parsed.observation;
            if !seen.insert(observation.listing_id.clone()) {
                let reason = format!("duplicate listing id {}", observation.listing_id);
                warn!(index, reason = %reason, "Skipping catalog row");
                snapshot.warnings.push(RowWarning { index, reason });
                continue;
            }

            debug!(
                listing_id = %observation.listing_id,
                status = ?observation.status,
                available = ?observation.available_action,
                "Catalog row"
            );
            snapshot
                .listings
                .push(ListingRecord::observed(observation, Utc::now()));
        }

        if data_rows == 0 {
            if self.empty_marker_present(driver).await {
                info!("Catalog is empty");
                return Ok(snapshot);
            }
            return Err(ParseError::StructuralMismatch(
                "postings table has no listing rows".to_string(),
            ));
        }

        if snapshot.listings.is_empty() {
            return Err(ParseError::StructuralMismatch(format!(
                "none of {} rows could be read",
                data_rows
            )));
        }

        info!(
            listings = snapshot.listings.len(),
            warnings = snapshot.warnings.len(),
            "Catalog extracted"
        );
        Ok(snapshot)
    }

    /// Re-read the row of one listing from a freshly loaded catalog page.
    ///
    /// Returns `None` only when every row was read and none carries the
    /// listing. If the listing is missing but some row could not be read,
    /// the first read error is returned instead, since that row may be it.
    pub async fn observe(
        &self,
        session: &Session,
        listing_id: &str,
    ) -> Result<Option<RowMatch>, ParseError> {
        let table = self.open(session).await?;
        let driver = session.driver();
        let rows = driver.find_in(&table, &self.platform.selectors.row).await?;

        let mut unreadable: Option<DriverError> = None;
        for (index, row) in rows.iter().enumerate() {
            match self.try_read_row(driver, row, index).await {
                Ok(Some(found)) if found.observation.listing_id == listing_id => {
                    return Ok(Some(found));
                }
                Ok(_) | Err(ParseError::RowSkipped { .. }) => continue,
                Err(ParseError::Driver(e)) if !e.is_session_lost() => {
                    debug!(index, error = %e, "Row unreadable while looking for {}", listing_id);
                    unreadable.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match unreadable {
            Some(e) => Err(ParseError::Driver(e)),
            None => Ok(None),
        }
    }

    async fn empty_marker_present(&self, driver: &dyn BrowserDriver) -> bool {
        let Some(marker) = &self.platform.selectors.empty_catalog_marker else {
            return false;
        };
        matches!(driver.find_all(marker).await, Ok(found) if !found.is_empty())
    }

    /// Read one table row.
    ///
    /// `Ok(None)` for rows that carry no listing (header, hidden, blank).
    async fn read_row(
        &self,
        driver: &dyn BrowserDriver,
        row: &ElementHandle,
        index: usize,
    ) -> Result<Option<RowMatch>, ParseError> {
        self.try_read_row(driver, row, index)
            .await
            .map_err(|e| match e {
                ParseError::Driver(e) if !e.is_session_lost() => ParseError::RowSkipped {
                    index,
                    reason: e.to_string(),
                },
                other => other,
            })
    }

    async fn try_read_row(
        &self,
        driver: &dyn BrowserDriver,
        row: &ElementHandle,
        index: usize,
    ) -> Result<Option<RowMatch>, ParseError> {
        let selectors = &self.platform.selectors;

        if !driver.find_in(row, &selectors.header_cell).await?.is_empty() {
            return Ok(None);
        }
        if !driver.is_displayed(row).await? {
            return Ok(None);
        }
        if driver.text(row).await?.trim().is_empty() {
            return Ok(None);
        }

        let skipped = |reason: String| ParseError::RowSkipped { index, reason };

        let id_cell = first_in(driver, row, &selectors.listing_id)
            .await?
            .ok_or_else(|| skipped("missing listing id".to_string()))?;
        let raw_id = match &selectors.listing_id_attribute {
            Some(name) => driver.attribute(&id_cell, name).await?.unwrap_or_default(),
            None => driver.text(&id_cell).await?,
        };
        let listing_id = self
            .extract_id(&raw_id)
            .ok_or_else(|| skipped(format!("no listing id in {:?}", raw_id.trim())))?;

        let title_cell = first_in(driver, row, &selectors.title)
            .await?
            .ok_or_else(|| skipped("missing title".to_string()))?;
        let title = driver.text(&title_cell).await?.trim().to_string();

        let raw_status = match first_in(driver, row, &selectors.status).await? {
            Some(cell) => driver.text(&cell).await?.trim().to_string(),
            None => String::new(),
        };

        let renew_control = usable_control(driver, row, &selectors.renew_button).await?;
        let repost_control = usable_control(driver, row, &selectors.repost_button).await?;

        Ok(Some(RowMatch {
            row: row.clone(),
            observation: ListingObservation {
                listing_id,
                title,
                status: ListingStatus::from_raw(&raw_status),
                raw_status,
                available_action: AvailableAction::from_flags(
                    renew_control.is_some(),
                    repost_control.is_some(),
                ),
            },
            renew_control,
            repost_control,
        }))
    }

    fn extract_id(&self, raw: &str) -> Option<String> {
        let captures = self.id_pattern.captures(raw)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}

async fn first_in(
    driver: &dyn BrowserDriver,
    row: &ElementHandle,
    selector: &str,
) -> Result<Option<ElementHandle>, DriverError> {
    Ok(driver.find_in(row, selector).await?.into_iter().next())
}

/// First control matching `selector` that is displayed and enabled.
async fn usable_control(
    driver: &dyn BrowserDriver,
    row: &ElementHandle,
    selector: &str,
) -> Result<Option<ElementHandle>, DriverError> {
    for control in driver.find_in(row, selector).await? {
        if driver.is_displayed(&control).await? && driver.is_enabled(&control).await? {
            return Ok(Some(control));
        }
    }
    Ok(None)
}
