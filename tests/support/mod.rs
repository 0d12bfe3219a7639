//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod fake_portal;

use std::path::Path;
use std::time::Duration;

use harvester_core::{HarvestSettings, WaitSettings};
use url::Url;

pub const BASE_URL: &str = "https://portal.test/search/";

/// Listing page URL as the discoverer builds it.
pub fn listing(page: u32) -> String {
    format!("{BASE_URL}?page={page}")
}

pub fn dataset_url(slug: &str) -> String {
    format!("https://portal.test/dataset/{slug}")
}

/// Waits short enough that absent elements and downloads fail fast.
pub fn fast_waits() -> WaitSettings {
    WaitSettings {
        navigation_timeout: Duration::from_secs(1),
        page_settle: Duration::from_millis(30),
        form_wait: Duration::from_millis(60),
        download_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
    }
}

/// Settings for pages `1..=last_page` writing into `output`.
pub fn test_settings(output: &Path, last_page: u32) -> HarvestSettings {
    HarvestSettings {
        base_url: Url::parse(BASE_URL).unwrap(),
        first_page: 1,
        last_page,
        output_dir: output.to_path_buf(),
        waits: fast_waits(),
        page_retry_attempts: 1,
        ..HarvestSettings::default()
    }
}
