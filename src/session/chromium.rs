//! Chromium-backed [`PageSession`] using chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{Locator, PageElement, PageSession, RenderError};

/// Environment variable overriding the Chromium binary location.
pub const CHROMIUM_PATH_ENV: &str = "HARVESTER_CHROMIUM_PATH";

/// Options for launching the browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit binary path; falls back to the environment and `PATH`.
    pub executable: Option<PathBuf>,
    /// Run without a visible window.
    pub headless: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
        }
    }
}

/// Find the Chromium binary.
///
/// Order: explicit path, `HARVESTER_CHROMIUM_PATH`, then `PATH` lookups.
#[must_use]
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    if let Some(path) = std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from)
        && path.exists()
    {
        return Some(path);
    }

    ["google-chrome", "chromium", "chromium-browser", "chrome"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// One headless Chromium instance driving a single tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Launches Chromium and opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Launch`] if no binary is found or the browser fails to start.
    #[instrument(skip(options), fields(headless = options.headless))]
    pub async fn launch(options: &BrowserOptions) -> Result<Self, RenderError> {
        let chrome_path =
            find_chromium(options.executable.as_deref()).ok_or_else(|| RenderError::Launch {
                reason: format!(
                    "Chromium not found; install it or set {CHROMIUM_PATH_ENV} / --chromium-path"
                ),
            })?;
        debug!(path = %chrome_path.display(), "using chromium binary");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-gpu");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|reason| RenderError::Launch { reason })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| RenderError::Launch {
                    reason: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "chromium handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::command("open tab", e))?;

        info!("browser session started");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<Element>, RenderError> {
        let result = match locator.to_css() {
            Some(selector) => self.page.find_elements(selector).await,
            None => match locator {
                Locator::XPath(expr) => self.page.find_xpaths(expr.as_str()).await,
                _ => return Ok(Vec::new()),
            },
        };
        result.map_err(|e| RenderError::command("query", e))
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RenderError::navigation(url, e)),
            Err(_) => Err(RenderError::timeout(url, timeout)),
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn PageElement>>, RenderError> {
        let elements = self.query(locator).await?;
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn PageElement>)
            .collect())
    }

    async fn set_download_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        params.download_path = Some(dir.to_string_lossy().into_owned());
        self.browser
            .execute(params)
            .await
            .map_err(|e| RenderError::command("set download directory", e))?;
        debug!(dir = %dir.display(), "download directory set");
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        let Self {
            mut browser,
            page,
            handler,
        } = *self;

        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close tab");
        }
        let closed = browser
            .close()
            .await
            .map_err(|e| RenderError::command("close browser", e));
        if closed.is_ok() {
            let _ = browser.wait().await;
        }
        handler.abort();
        info!("browser session closed");
        closed.map(|_| ())
    }
}

struct ChromiumElement {
    element: Element,
}

#[async_trait]
impl PageElement for ChromiumElement {
    async fn text(&self) -> Result<String, RenderError> {
        self.element
            .inner_text()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| RenderError::command("read text", e))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RenderError> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| RenderError::command("read attribute", e))
    }

    async fn click(&self) -> Result<(), RenderError> {
        self.element
            .click()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::command("click", e))
    }

    async fn send_keys(&self, text: &str) -> Result<(), RenderError> {
        self.element
            .focus()
            .await
            .map_err(|e| RenderError::command("focus", e))?;
        self.element
            .type_str(text)
            .await
            .map(|_| ())
            .map_err(|e| RenderError::command("type", e))
    }

    async fn clear(&self) -> Result<(), RenderError> {
        self.element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map(|_| ())
            .map_err(|e| RenderError::command("clear", e))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, RenderError> {
        self.element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| RenderError::command("screenshot", e))
    }
}
