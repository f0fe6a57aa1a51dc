//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::time::Duration;

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Landsat Collection 2 Level-2 collection id on both public catalogs.
pub const LANDSAT_C2_L2: &str = "landsat-c2-l2";

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (root URL or full `/search` URL).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether asset hrefs need a SAS token before download.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 60 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 500).
    pub max_items: usize,
    /// Items requested per page (default 100).
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            max_items: 500,
            page_size: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut params = params.clone();
        if params.limit.is_none() {
            params.limit = Some(self.options.page_size);
        }

        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;
        let mut page = self.search(&params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                tracing::warn!(max_items = max, "STAC search truncated");
                break;
            }

            match next {
                Some(link) => {
                    page = self.follow_next(&link, &params).await?;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        Ok(all_items)
    }

    /// Sign an asset href for download.
    ///
    /// For catalogs other than Planetary Computer the href is returned
    /// unchanged.
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }
        self.sign_pc_href(href).await
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                // 500 ms, 1 s, 2 s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1).min(6)));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(url).json(params).send().await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| CloudError::InvalidResponse(format!("parsing STAC response: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    tracing::debug!(
                        %status,
                        attempt,
                        body = %body.chars().take(200).collect::<String>(),
                        "STAC search rejected"
                    );
                    last_err = Some(CloudError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                    // Don't retry client errors (4xx)
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "STAC search request failed");
                    last_err = Some(CloudError::Network(format!("STAC search request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("STAC search failed".into())))
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(&self, link: &StacLink, original: &StacSearchParams) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let params = next_page_params(link, original)?;
            self.post_search(&link.href, &params).await
        } else {
            let resp = self.client.get(&link.href).send().await?;
            if !resp.status().is_success() {
                return Err(CloudError::Status {
                    status: resp.status().as_u16(),
                    url: link.href.clone(),
                });
            }
            let body = resp.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| CloudError::InvalidResponse(format!("parsing pagination response: {e}")))
        }
    }

    /// Sign one href via the Planetary Computer `/api/sas/v1/sign` endpoint.
    async fn sign_pc_href(&self, href: &str) -> Result<String> {
        let resp = self
            .client
            .get("https://planetarycomputer.microsoft.com/api/sas/v1/sign")
            .query(&[("href", href)])
            .send()
            .await
            .map_err(|e| CloudError::Signing(format!("sign request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CloudError::Signing(format!("sign returned HTTP {}", resp.status())));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CloudError::Signing(format!("parsing sign response: {e}")))?;

        body["href"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CloudError::Signing("sign response missing 'href' field".into()))
    }
}

/// Request body for a POST `next` link: the link body, merged over the
/// original request when the link asks for it.
fn next_page_params(link: &StacLink, original: &StacSearchParams) -> Result<StacSearchParams> {
    let to_value = |p: &StacSearchParams| {
        serde_json::to_value(p).map_err(|e| CloudError::InvalidResponse(format!("serializing params: {e}")))
    };
    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = to_value(original)?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            base
        }
        (Some(link_body), false) => link_body.clone(),
        (None, _) => to_value(original)?,
    };
    serde_json::from_value(body).map_err(|e| CloudError::InvalidResponse(format!("parsing next-page body: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
