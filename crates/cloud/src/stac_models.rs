//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (POST /search) requests and responses,
//! covering what the Landsat archive needs: bbox, datetime, collection and
//! property filters, pagination via `links`, and per-band assets.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API Item Search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Property filters in the STAC query extension syntax,
    /// e.g. `{"eo:cloud_cover": {"lt": 10}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]` in WGS84 degrees.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set datetime or datetime range (e.g. `"2016-01-01T00:00:00Z/2017-01-01T00:00:00Z"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add one property filter, e.g. `("platform", json!({"in": ["landsat-8"]}))`.
    pub fn filter(mut self, property: &str, condition: serde_json::Value) -> Self {
        let query = self
            .query
            .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(obj) = query.as_object_mut() {
            obj.insert(property.to_string(), condition);
        }
        self
    }

    pub fn token(mut self, tok: &str) -> Self {
        self.token = Some(tok.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature), i.e. one Landsat scene.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// EPSG code from the projection extension (`proj:epsg`, or the newer
    /// `proj:code` of the form `"EPSG:32645"`).
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        if let Some(code) = extra.get("proj:epsg").and_then(|v| v.as_u64()) {
            return Some(code as u32);
        }
        extra
            .get("proj:code")
            .and_then(|v| v.as_str())
            .and_then(|s| s.strip_prefix("EPSG:"))
            .and_then(|s| s.parse().ok())
    }

    /// Scene cloud cover in percent.
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }

    /// Acquisition date parsed from the `datetime` property.
    pub fn acquired(&self) -> Option<NaiveDate> {
        let dt = self.properties.datetime.as_deref()?;
        DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|d| d.date_naive())
            .or_else(|| dt.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
    }

    /// The asset holding archive band `band` (e.g. `"SR_B4"`).
    ///
    /// Catalogs key Landsat assets by common name (`red`, `nir08`), so the
    /// band is matched against, in order: the asset's `eo:bands` name, the
    /// asset key, and the `_<band>.TIF` suffix of the Collection 2 file name.
    pub fn band_asset(&self, band: &str) -> Option<(&str, &StacAsset)> {
        let suffix = format!("_{}.tif", band.to_ascii_lowercase());
        let by_eo = self.assets.iter().find(|(_, a)| a.eo_band_names().any(|n| n == band));
        let by_key = || {
            self.assets
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(band))
        };
        let by_href = || {
            self.assets.iter().find(|(_, a)| {
                let path = a.href.split('?').next().unwrap_or(&a.href);
                path.to_ascii_lowercase().ends_with(&suffix)
            })
        };
        by_eo
            .or_else(by_key)
            .or_else(by_href)
            .map(|(k, a)| (k.as_str(), a))
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Cloud cover percentage (EO extension).
    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    /// Platform name, e.g. `"landsat-8"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StacAsset {
    /// Band names listed in the asset's `eo:bands`.
    pub fn eo_band_names(&self) -> impl Iterator<Item = &str> {
        self.extra
            .get("eo:bands")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|b| b.get("name").and_then(|n| n.as_str()))
    }
}

/// A STAC Link (used for pagination).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// If true, merge `body` into the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
