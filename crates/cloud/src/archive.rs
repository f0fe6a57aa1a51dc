//! Landsat Collection 2 Level-2 scenes from a STAC catalog.
//!
//! [`StacArchive`] answers an [`ArchiveQuery`] by searching the
//! `landsat-c2-l2` collection, keeping the scenes that pass the platform,
//! date, footprint and strict cloud-cover predicates, downloading the
//! requested band assets and resampling each onto the campaign grid.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use covermap_core::io::read_geotiff_from_buffer;
use covermap_core::{ArchiveQuery, BandStack, GridSpec, ImageryArchive, RawImage};

use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::reproject::bbox_to_wgs84;
use crate::resample::resample_nearest;
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions, LANDSAT_C2_L2};
use crate::stac_models::{StacItem, StacSearchParams};

/// Landsat L2 fill value for missing surface reflectance.
pub const LANDSAT_FILL: f64 = 0.0;

/// Configuration for [`StacArchive`].
#[derive(Debug, Clone)]
pub struct StacArchiveOptions {
    pub catalog: StacCatalog,
    pub search: StacClientOptions,
    /// Timeout of a single asset download.
    pub download_timeout: Duration,
    /// Retries per asset on transient failures.
    pub download_retries: u32,
    /// Scenes downloaded at the same time.
    pub concurrent_scenes: usize,
    /// Raw value treated as missing in addition to the file's nodata tag.
    pub fill_value: Option<f64>,
}

impl Default for StacArchiveOptions {
    fn default() -> Self {
        Self {
            catalog: StacCatalog::PlanetaryComputer,
            search: StacClientOptions::default(),
            download_timeout: Duration::from_secs(300),
            download_retries: 3,
            concurrent_scenes: 2,
            fill_value: Some(LANDSAT_FILL),
        }
    }
}

/// STAC platform name for a Landsat archive id such as
/// `LANDSAT/LC08/C02/T1_L2`.
pub fn landsat_platform(archive_id: &str) -> Result<&'static str> {
    let mission = archive_id
        .split('/')
        .nth(1)
        .ok_or_else(|| CloudError::UnknownArchive(archive_id.to_string()))?;
    match mission {
        "LT04" => Ok("landsat-4"),
        "LT05" => Ok("landsat-5"),
        "LE07" => Ok("landsat-7"),
        "LC08" => Ok("landsat-8"),
        "LC09" => Ok("landsat-9"),
        _ => Err(CloudError::UnknownArchive(archive_id.to_string())),
    }
}

/// Search body for one archive query. `bbox` is in WGS84 degrees.
pub fn search_params(query: &ArchiveQuery, bbox: (f64, f64, f64, f64)) -> Result<StacSearchParams> {
    let platform = landsat_platform(&query.archive_id)?;
    Ok(StacSearchParams::new()
        .collections(&[LANDSAT_C2_L2])
        .bbox(bbox.0, bbox.1, bbox.2, bbox.3)
        .datetime(&query.dates.to_interval())
        .filter("platform", serde_json::json!({ "in": [platform] }))
        .filter("eo:cloud_cover", serde_json::json!({ "lt": query.cloud_cover_max })))
}

/// Re-check every predicate of `query` on the returned items.
///
/// Catalogs differ in how faithfully they apply the query extension, and
/// the cloud ceiling must be strict, so nothing is taken on trust. Items
/// without a cloud cover value are dropped. The result is ordered by id.
pub fn select_items(items: Vec<StacItem>, query: &ArchiveQuery, bbox: (f64, f64, f64, f64)) -> Result<Vec<StacItem>> {
    let platform = landsat_platform(&query.archive_id)?;
    let mut kept: Vec<StacItem> = items
        .into_iter()
        .filter(|item| {
            let platform_ok = item.properties.platform.as_deref().map_or(true, |p| p == platform);
            let cloud_ok = item.cloud_cover().is_some_and(|cc| query.accepts_cloud_cover(cc));
            let date_ok = item.acquired().map_or(true, |d| query.dates.contains(d));
            let footprint_ok = item.bbox.as_deref().map_or(true, |b| intersects(b, bbox));
            if !(platform_ok && cloud_ok && date_ok && footprint_ok) {
                tracing::debug!(
                    item = %item.id,
                    platform_ok,
                    cloud_ok,
                    date_ok,
                    footprint_ok,
                    "scene rejected"
                );
            }
            platform_ok && cloud_ok && date_ok && footprint_ok
        })
        .collect();
    kept.sort_by(|a, b| a.id.cmp(&b.id));
    kept.dedup_by(|a, b| a.id == b.id);
    Ok(kept)
}

fn intersects(item_bbox: &[f64], (west, south, east, north): (f64, f64, f64, f64)) -> bool {
    let (w, s, e, n) = match *item_bbox {
        [w, s, e, n] => (w, s, e, n),
        // 3D bbox: [w, s, zmin, e, n, zmax]
        [w, s, _, e, n, _] => (w, s, e, n),
        _ => return true,
    };
    w <= east && e >= west && s <= north && n >= south
}

/// Imagery archive backed by a STAC API.
pub struct StacArchive {
    client: StacClient,
    http: HttpClient,
    options: StacArchiveOptions,
}

impl StacArchive {
    pub fn new(options: StacArchiveOptions) -> Result<Self> {
        let client = StacClient::new(options.catalog.clone(), options.search.clone())?;
        let http = HttpClient::new(options.download_timeout, options.download_retries)?;
        Ok(Self { client, http, options })
    }

    /// Scenes matching `query`, without downloading any asset.
    pub async fn search(&self, query: &ArchiveQuery, grid: &GridSpec) -> Result<Vec<StacItem>> {
        let bbox = bbox_to_wgs84(query.bounds, grid.epsg)?;
        let params = search_params(query, bbox)?;
        let items = self.client.search_all(&params).await?;
        let found = items.len();
        let kept = select_items(items, query, bbox)?;
        tracing::info!(
            year = query.year,
            archive = %query.archive_id,
            found,
            kept = kept.len(),
            "STAC search done"
        );
        Ok(kept)
    }

    /// Download the query's bands of one scene onto `grid`.
    pub async fn load(&self, item: &StacItem, query: &ArchiveQuery, grid: &GridSpec) -> Result<RawImage> {
        let mut bands = BandStack::new();
        for band in &query.bands {
            let (_, asset) = item.band_asset(band).ok_or_else(|| CloudError::MissingAsset {
                item: item.id.clone(),
                band: band.clone(),
            })?;
            let href = self.client.sign_asset_href(&asset.href).await?;
            let bytes = self.http.fetch(&href).await?;
            tracing::debug!(item = %item.id, band = %band, size = bytes.len(), "asset downloaded");

            let grid = *grid;
            let fill = self.options.fill_value;
            let item_epsg = item.epsg();
            let resampled = tokio::task::spawn_blocking(move || -> Result<_> {
                let raster = read_geotiff_from_buffer::<f64>(&bytes, None)?;
                let epsg = raster
                    .epsg()
                    .or(item_epsg)
                    .ok_or_else(|| CloudError::InvalidResponse("asset has no CRS".into()))?;
                Ok(resample_nearest(&raster, epsg, &grid, fill)?)
            })
            .await
            .map_err(|e| CloudError::Network(format!("resampling task failed: {e}")))??;
            bands.push(band.clone(), resampled)?;
        }

        let mut image = RawImage::new(item.id.clone(), bands);
        if let Some(date) = item.acquired() {
            image = image.with_acquired(date);
        }
        if let Some(cc) = item.cloud_cover() {
            image = image.with_cloud_cover(cc);
        }
        Ok(image)
    }

    async fn fetch_year(&self, query: &ArchiveQuery, grid: &GridSpec) -> Result<Vec<RawImage>> {
        let items = self.search(query, grid).await?;
        let loaded: Vec<Option<RawImage>> = stream::iter(items)
            .map(|item| async move {
                match self.load(&item, query, grid).await {
                    Ok(image) => Ok(Some(image)),
                    Err(CloudError::MissingAsset { item, band }) => {
                        tracing::warn!(%item, %band, "scene skipped, band asset missing");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(self.options.concurrent_scenes.max(1))
            .try_collect()
            .await?;
        Ok(loaded.into_iter().flatten().collect())
    }
}

impl ImageryArchive for StacArchive {
    async fn query(&self, query: &ArchiveQuery, grid: &GridSpec) -> covermap_core::Result<Vec<RawImage>> {
        Ok(self.fetch_year(query, grid).await?)
    }
}
