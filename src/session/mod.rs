//! Page renderer abstraction.
//!
//! The harvester drives a single browser tab through [`PageSession`]. Elements
//! returned by a session are [`PageElement`] handles supporting the handful of
//! interactions the download gate needs. The production implementation is
//! [`chromium::ChromiumSession`]; tests plug in scripted fakes.

pub mod chromium;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::wait::{PollPolicy, poll_until};

/// How to locate elements on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS selector, e.g. `.dc-search-list-item h2 a`.
    Css(String),
    /// XPath expression, e.g. `//a[contains(text(),'Download')]`.
    XPath(String),
    /// Value of the `name` attribute.
    Name(String),
    /// Tag name, e.g. `h1`.
    Tag(String),
}

impl Locator {
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    /// CSS form of this locator, or `None` for XPath.
    #[must_use]
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::Css(selector) => Some(selector.clone()),
            Self::Name(name) => Some(format!("[name=\"{}\"]", name.replace('"', "\\\""))),
            Self::Tag(tag) => Some(tag.clone()),
            Self::XPath(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css={selector}"),
            Self::XPath(expr) => write!(f, "xpath={expr}"),
            Self::Name(name) => write!(f, "name={name}"),
            Self::Tag(tag) => write!(f, "tag={tag}"),
        }
    }
}

/// Errors raised by the page renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The browser could not be started.
    #[error("failed to launch browser: {reason}")]
    Launch {
        /// What went wrong.
        reason: String,
    },

    /// Navigation to a URL failed.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// Target URL.
        url: String,
        /// Driver message.
        reason: String,
    },

    /// Navigation did not finish within the allowed time.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target URL.
        url: String,
        /// Time budget that was exceeded.
        timeout_ms: u64,
    },

    /// A required element was not on the page.
    #[error("element not found: {locator}")]
    ElementNotFound {
        /// The locator that matched nothing.
        locator: String,
    },

    /// A driver command (query, click, type, screenshot...) failed.
    #[error("{action} failed: {reason}")]
    Command {
        /// The attempted action.
        action: &'static str,
        /// Driver message.
        reason: String,
    },
}

impl RenderError {
    pub fn navigation(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn not_found(locator: &Locator) -> Self {
        Self::ElementNotFound {
            locator: locator.to_string(),
        }
    }

    pub fn command(action: &'static str, reason: impl fmt::Display) -> Self {
        Self::Command {
            action,
            reason: reason.to_string(),
        }
    }
}

/// A single rendering context (one browser tab) reused for the whole run.
///
/// Not safe to drive from several flows at once; callers hold it as
/// `&mut dyn PageSession` and process strictly in sequence.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Loads `url` and waits for it to render, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// All elements matching `locator`, in document order.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn PageElement>>, RenderError>;

    /// First element matching `locator`, if any.
    async fn find(&self, locator: &Locator) -> Result<Option<Box<dyn PageElement>>, RenderError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// Directs browser-initiated downloads into `dir`.
    async fn set_download_dir(&mut self, dir: &Path) -> Result<(), RenderError>;

    /// Releases the tab and the browser behind it.
    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}

/// A handle to one element on the current page.
#[async_trait]
pub trait PageElement: Send + Sync {
    /// Rendered text content.
    async fn text(&self) -> Result<String, RenderError>;

    /// Attribute value, `None` when the attribute is absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError>;

    async fn click(&self) -> Result<(), RenderError>;

    /// Types `text` into the element, appending to any existing value.
    async fn send_keys(&self, text: &str) -> Result<(), RenderError>;

    /// Empties an input's value.
    async fn clear(&self) -> Result<(), RenderError>;

    /// PNG screenshot of the element's bounding box.
    async fn screenshot_png(&self) -> Result<Vec<u8>, RenderError>;
}

/// Polls until `locator` matches, bounded by `policy`.
///
/// Returns `Ok(None)` when the element never appeared.
///
/// # Errors
///
/// Returns [`RenderError`] if a query itself fails.
pub async fn wait_for(
    session: &dyn PageSession,
    locator: &Locator,
    policy: &PollPolicy,
) -> Result<Option<Box<dyn PageElement>>, RenderError> {
    poll_until(policy, || session.find(locator)).await
}

/// First element matching `locator`, or [`RenderError::ElementNotFound`].
///
/// # Errors
///
/// Returns [`RenderError`] if the query fails or nothing matches.
pub async fn require(
    session: &dyn PageSession,
    locator: &Locator,
) -> Result<Box<dyn PageElement>, RenderError> {
    session
        .find(locator)
        .await?
        .ok_or_else(|| RenderError::not_found(locator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_to_css() {
        assert_eq!(
            Locator::name("Email").to_css().as_deref(),
            Some("[name=\"Email\"]")
        );
        assert_eq!(Locator::tag("h1").to_css().as_deref(), Some("h1"));
        assert_eq!(
            Locator::css("img.captcha").to_css().as_deref(),
            Some("img.captcha")
        );
        assert_eq!(Locator::xpath("//a").to_css(), None);
    }

    #[test]
    fn test_locator_display_names_kind() {
        assert_eq!(Locator::name("captcha").to_string(), "name=captcha");
        assert_eq!(Locator::xpath("//button").to_string(), "xpath=//button");
    }

    #[test]
    fn test_render_error_timeout_display() {
        let error = RenderError::timeout("https://portal.test/a", Duration::from_secs(2));
        let msg = error.to_string();
        assert!(msg.contains("2000ms"), "Expected timeout in: {msg}");
        assert!(msg.contains("https://portal.test/a"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_render_error_not_found_display() {
        let error = RenderError::not_found(&Locator::css("img.captcha"));
        assert_eq!(error.to_string(), "element not found: css=img.captcha");
    }
}
