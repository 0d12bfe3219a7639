//! Run settings: portal location, requester identity, locators, and wait budgets.
//!
//! Everything the harvester treats as a constant lives in [`HarvestSettings`],
//! whose [`Default`] reproduces the fixed behavior of a plain run. The binary
//! layers an optional config file ([`file`]) and CLI flags on top.

pub mod file;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::session::Locator;
use crate::session::chromium::BrowserOptions;
use crate::wait::{DEFAULT_PAGE_RETRY_ATTEMPTS, PollPolicy};

pub use file::{FileConfig, LoadedConfig, load_config_file, load_default_file_config};

/// Portal searched by default.
pub const DEFAULT_BASE_URL: &str = "https://data.telangana.gov.in/search/";

/// Output root created in the working directory by default.
pub const DEFAULT_OUTPUT_DIR: &str = "telanganadatasets";

/// Name of the staging root under the output directory.
pub const STAGING_DIR_NAME: &str = "temp_downloads";

pub const DEFAULT_FIRST_PAGE: u32 = 1;
pub const DEFAULT_LAST_PAGE: u32 = 30;

/// Highest page number accepted from config or CLI.
pub const MAX_PAGE: u32 = 10_000;

/// Decode+submit cycles per dataset unless configured otherwise.
pub const DEFAULT_CAPTCHA_ATTEMPTS: u32 = 1;

/// Upper bound for `captcha_attempts`.
pub const MAX_CAPTCHA_ATTEMPTS: u32 = 10;

/// Consecutive unreadable listing pages tolerated before paging stops.
pub const DEFAULT_MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_SETTLE: Duration = Duration::from_secs(2);
const DEFAULT_FORM_WAIT: Duration = Duration::from_secs(2);
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Identity submitted in the download request form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterIdentity {
    pub name: String,
    pub email: String,
    pub purpose: String,
    /// `value` of the usage-type radio to select.
    pub usage_type: String,
}

impl Default for RequesterIdentity {
    fn default() -> Self {
        Self {
            name: "Researcher".to_string(),
            email: "researcher@example.org".to_string(),
            purpose: "Research".to_string(),
            usage_type: "non-commercial".to_string(),
        }
    }
}

/// Where things are on the portal's pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalLayout {
    /// Dataset anchors on a listing page.
    pub listing_link: Locator,
    /// Dataset heading on a detail page.
    pub title: Locator,
    /// Metadata panel on a detail page.
    pub metadata_panel: Locator,
    /// Control opening the download gate.
    pub download_trigger: Locator,
    pub name_field: Locator,
    pub email_field: Locator,
    pub purpose_field: Locator,
    /// Radio group for the usage type.
    pub usage_radio: Locator,
    pub captcha_image: Locator,
    pub captcha_input: Locator,
    pub submit: Locator,
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            listing_link: Locator::css(".dc-search-list-item h2 a"),
            title: Locator::tag("h1"),
            metadata_panel: Locator::css(".col-md-9.col-sm-12"),
            download_trigger: Locator::xpath("//a[contains(text(),'Download')]"),
            name_field: Locator::name("Name"),
            email_field: Locator::name("Email"),
            purpose_field: Locator::name("Purpose"),
            usage_radio: Locator::name("type"),
            captcha_image: Locator::css("img.captcha"),
            captcha_input: Locator::name("captcha"),
            submit: Locator::xpath("//button[contains(text(),'Download')]"),
        }
    }
}

/// Time budgets for every bounded wait in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Page load, per navigation.
    pub navigation_timeout: Duration,
    /// Dynamic content on listing and detail pages.
    pub page_settle: Duration,
    /// Request form appearing after the trigger click.
    pub form_wait: Duration,
    /// File materializing in staging after submit.
    pub download_timeout: Duration,
    /// First interval between polls; grows exponentially.
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            page_settle: DEFAULT_PAGE_SETTLE,
            form_wait: DEFAULT_FORM_WAIT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitSettings {
    fn poll(&self, timeout: Duration) -> PollPolicy {
        PollPolicy::new(timeout).with_intervals(self.poll_interval, MAX_POLL_INTERVAL)
    }

    #[must_use]
    pub fn settle_policy(&self) -> PollPolicy {
        self.poll(self.page_settle)
    }

    #[must_use]
    pub fn form_policy(&self) -> PollPolicy {
        self.poll(self.form_wait)
    }

    #[must_use]
    pub fn download_policy(&self) -> PollPolicy {
        self.poll(self.download_timeout)
    }
}

/// Complete configuration for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub base_url: Url,
    pub first_page: u32,
    pub last_page: u32,
    pub output_dir: PathBuf,
    pub requester: RequesterIdentity,
    pub layout: PortalLayout,
    pub waits: WaitSettings,
    pub captcha_attempts: u32,
    /// Attempts per listing page when the renderer fails.
    pub page_retry_attempts: u32,
    pub max_consecutive_page_failures: u32,
    /// Drop repeated dataset URLs across listing pages.
    pub dedupe_links: bool,
    /// End paging at the first listing page with no items.
    pub stop_on_empty_page: bool,
    /// Write `{output}.report.json` after archiving.
    pub write_report: bool,
    pub browser: BrowserOptions,
    pub tesseract_path: Option<PathBuf>,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            first_page: DEFAULT_FIRST_PAGE,
            last_page: DEFAULT_LAST_PAGE,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            requester: RequesterIdentity::default(),
            layout: PortalLayout::default(),
            waits: WaitSettings::default(),
            captcha_attempts: DEFAULT_CAPTCHA_ATTEMPTS,
            page_retry_attempts: DEFAULT_PAGE_RETRY_ATTEMPTS,
            max_consecutive_page_failures: DEFAULT_MAX_CONSECUTIVE_PAGE_FAILURES,
            dedupe_links: false,
            stop_on_empty_page: false,
            write_report: true,
            browser: BrowserOptions::default(),
            tesseract_path: None,
        }
    }
}

impl HarvestSettings {
    /// `{output_dir}/temp_downloads`.
    #[must_use]
    pub fn staging_root(&self) -> PathBuf {
        self.output_dir.join(STAGING_DIR_NAME)
    }

    /// `{output_dir}.zip`.
    #[must_use]
    pub fn bundle_path(&self) -> PathBuf {
        sibling_with_suffix(&self.output_dir, ".zip")
    }

    /// `{output_dir}.report.json`.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        sibling_with_suffix(&self.output_dir, ".report.json")
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.first_page == 0 {
            return Err("first_page must be at least 1".to_string());
        }
        if self.last_page < self.first_page {
            return Err(format!(
                "last_page ({}) must not be lower than first_page ({})",
                self.last_page, self.first_page
            ));
        }
        if self.last_page > MAX_PAGE {
            return Err(format!("last_page must be at most {MAX_PAGE}"));
        }
        if !(1..=MAX_CAPTCHA_ATTEMPTS).contains(&self.captcha_attempts) {
            return Err(format!(
                "captcha_attempts must be between 1 and {MAX_CAPTCHA_ATTEMPTS}"
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir must not be empty".to_string());
        }
        if named_root(&self.output_dir).file_name().is_none() {
            return Err(format!(
                "output_dir {} has no directory name to put the bundle beside",
                self.output_dir.display()
            ));
        }
        Ok(())
    }
}

/// Appends `suffix` to the final path component (`out` -> `out.zip`).
///
/// Trailing separators are ignored (`out/` -> `out.zip`), and a path ending
/// in `.` or `..` is resolved first, so the result always sits beside the
/// directory rather than inside it.
#[must_use]
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = named_root(path).into_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// `path` with a real final name: separators trimmed, `.`/`..` canonicalized.
fn named_root(path: &Path) -> PathBuf {
    let trimmed: PathBuf = path.components().collect();
    if trimmed.file_name().is_some() {
        return trimmed;
    }
    fs::canonicalize(path)
        .ok()
        .filter(|resolved| resolved.file_name().is_some())
        .unwrap_or(trimmed)
}

fn default_base_url() -> Url {
    match Url::parse(DEFAULT_BASE_URL) {
        Ok(url) => url,
        Err(_) => unreachable!("DEFAULT_BASE_URL is a valid URL"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_fixed_run() {
        let settings = HarvestSettings::default();
        assert_eq!(settings.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!((settings.first_page, settings.last_page), (1, 30));
        assert_eq!(settings.captcha_attempts, 1);
        assert!(!settings.dedupe_links);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_derived_paths() {
        let settings = HarvestSettings {
            output_dir: PathBuf::from("/data/out"),
            ..HarvestSettings::default()
        };
        assert_eq!(settings.staging_root(), PathBuf::from("/data/out/temp_downloads"));
        assert_eq!(settings.bundle_path(), PathBuf::from("/data/out.zip"));
        assert_eq!(settings.report_path(), PathBuf::from("/data/out.report.json"));
    }

    #[test]
    fn test_sibling_ignores_trailing_separator() {
        assert_eq!(
            sibling_with_suffix(Path::new("/data/out/"), ".zip"),
            PathBuf::from("/data/out.zip")
        );
        assert_eq!(
            sibling_with_suffix(Path::new("out//"), ".report.json"),
            PathBuf::from("out.report.json")
        );
    }

    #[test]
    fn test_sibling_resolves_parent_reference() {
        let temp = tempfile::TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(out.join("sub")).unwrap();

        let bundle = sibling_with_suffix(&out.join("sub").join(".."), ".zip");
        let expected = fs::canonicalize(temp.path()).unwrap().join("out.zip");
        assert_eq!(bundle, expected);
        assert!(!bundle.starts_with(fs::canonicalize(&out).unwrap()));
    }

    #[test]
    fn test_validate_rejects_filesystem_root_output() {
        let settings = HarvestSettings {
            output_dir: PathBuf::from("/"),
            ..HarvestSettings::default()
        };
        let error = settings.validate().unwrap_err();
        assert!(error.contains("output_dir"), "{error}");
    }

    #[test]
    fn test_validate_rejects_inverted_page_range() {
        let settings = HarvestSettings {
            first_page: 5,
            last_page: 2,
            ..HarvestSettings::default()
        };
        let error = settings.validate().unwrap_err();
        assert!(error.contains("last_page"), "{error}");
    }

    #[test]
    fn test_validate_rejects_page_zero() {
        let settings = HarvestSettings {
            first_page: 0,
            ..HarvestSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_captcha_attempts_out_of_range() {
        let settings = HarvestSettings {
            captcha_attempts: 0,
            ..HarvestSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
