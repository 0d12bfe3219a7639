//! Listing-page link discovery.

use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::WaitSettings;
use crate::dataset::DatasetReference;
use crate::session::{Locator, PageSession, RenderError, wait_for};
use crate::wait::FailureType;

/// Errors from discovering links on one listing page.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Listing pages are numbered from 1.
    #[error("invalid listing page {page}: pages start at 1")]
    InvalidPage { page: u32 },

    /// The base URL can't carry a query string.
    #[error("invalid base URL {url}")]
    InvalidBaseUrl { url: String },

    /// The renderer failed to load or query the page.
    #[error("listing page {page} failed to render: {source}")]
    Render {
        page: u32,
        #[source]
        source: RenderError,
    },
}

impl DiscoveryError {
    /// Only renderer failures are worth retrying.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Render { .. } => FailureType::Transient,
            Self::InvalidPage { .. } | Self::InvalidBaseUrl { .. } => FailureType::Permanent,
        }
    }
}

/// Finds dataset detail-page URLs on numbered listing pages.
#[derive(Debug, Clone)]
pub struct LinkDiscoverer {
    base_url: Url,
    link: Locator,
    waits: WaitSettings,
}

impl LinkDiscoverer {
    #[must_use]
    pub fn new(base_url: Url, link: Locator, waits: WaitSettings) -> Self {
        Self {
            base_url,
            link,
            waits,
        }
    }

    /// `{base}?page={n}`, keeping any query pairs already on the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidPage`] for page 0 and
    /// [`DiscoveryError::InvalidBaseUrl`] when the base can't take a query.
    pub fn listing_url(&self, page: u32) -> Result<Url, DiscoveryError> {
        if page == 0 {
            return Err(DiscoveryError::InvalidPage { page });
        }
        if self.base_url.cannot_be_a_base() {
            return Err(DiscoveryError::InvalidBaseUrl {
                url: self.base_url.to_string(),
            });
        }
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// Dataset links on listing page `page`, in document order.
    ///
    /// An empty page yields an empty list. Anchors without an `href`, or with
    /// one that doesn't resolve to an http(s) URL, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] for invalid input or renderer failures.
    #[instrument(skip(self, session))]
    pub async fn discover(
        &self,
        session: &mut dyn PageSession,
        page: u32,
    ) -> Result<Vec<DatasetReference>, DiscoveryError> {
        let listing = self.listing_url(page)?;
        let render = |source| DiscoveryError::Render { page, source };

        session
            .navigate(listing.as_str(), self.waits.navigation_timeout)
            .await
            .map_err(render)?;

        // Items are rendered client-side; give them a bounded chance to appear.
        let first = wait_for(&*session, &self.link, &self.waits.settle_policy())
            .await
            .map_err(render)?;
        if first.is_none() {
            debug!(page, "listing page has no items");
            return Ok(Vec::new());
        }

        let anchors = session.find_all(&self.link).await.map_err(render)?;
        let mut references = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let Some(href) = anchor.attribute("href").await.map_err(render)? else {
                continue;
            };
            match resolve_href(&listing, &href) {
                Some(url) => references.push(DatasetReference::new(url)),
                None => debug!(page, href = %href, "skipping unresolvable link"),
            }
        }

        debug!(page, links = references.len(), "listing page parsed");
        Ok(references)
    }
}

fn resolve_href(listing: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = listing.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn discoverer(base: &str) -> LinkDiscoverer {
        LinkDiscoverer::new(
            Url::parse(base).unwrap(),
            Locator::css("a"),
            WaitSettings::default(),
        )
    }

    #[test]
    fn test_listing_url_appends_page() {
        let d = discoverer("https://portal.test/search/");
        assert_eq!(
            d.listing_url(3).unwrap().as_str(),
            "https://portal.test/search/?page=3"
        );
    }

    #[test]
    fn test_listing_url_keeps_existing_query() {
        let d = discoverer("https://portal.test/search/?sort=title");
        assert_eq!(
            d.listing_url(1).unwrap().as_str(),
            "https://portal.test/search/?sort=title&page=1"
        );
    }

    #[test]
    fn test_listing_url_rejects_page_zero() {
        let d = discoverer("https://portal.test/search/");
        let error = d.listing_url(0).unwrap_err();
        assert!(matches!(error, DiscoveryError::InvalidPage { page: 0 }));
        assert_eq!(error.failure_type(), FailureType::Permanent);
    }

    #[test]
    fn test_listing_url_rejects_opaque_base() {
        let d = discoverer("mailto:data@portal.test");
        assert!(matches!(
            d.listing_url(1),
            Err(DiscoveryError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_resolve_href_relative_and_absolute() {
        let listing = Url::parse("https://portal.test/search/?page=1").unwrap();
        assert_eq!(
            resolve_href(&listing, "/dataset/rain").unwrap().as_str(),
            "https://portal.test/dataset/rain"
        );
        assert_eq!(
            resolve_href(&listing, "https://other.test/x").unwrap().as_str(),
            "https://other.test/x"
        );
        assert!(resolve_href(&listing, "").is_none());
        assert!(resolve_href(&listing, "#top").is_none());
        assert!(resolve_href(&listing, "javascript:void(0)").is_none());
    }

    #[test]
    fn test_render_error_is_transient() {
        let error = DiscoveryError::Render {
            page: 2,
            source: RenderError::command("query", "closed"),
        };
        assert_eq!(error.failure_type(), FailureType::Transient);
        assert!(error.to_string().contains("listing page 2"));
    }
}
