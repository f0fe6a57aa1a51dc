//! Integration tests against real STAC catalogs.
//!
//! Tests marked `#[ignore]` require network access.
//! Run with: `cargo test -p covermap-cloud -- --ignored stac`

use covermap_cloud::archive::{landsat_platform, search_params, select_items};
use covermap_cloud::{StacArchive, StacArchiveOptions, StacCatalog, StacClient, StacClientOptions};
use covermap_core::{GridSpec, ImageryArchive, SensorTable};

/// Kathmandu valley, WGS84.
const VALLEY: (f64, f64, f64, f64) = (85.25, 27.65, 85.40, 27.75);

/// Landsat 8 scenes over the valley in 2016 pass every predicate.
#[tokio::test]
#[ignore]
async fn stac_planetary_computer_landsat8_year() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let query = SensorTable::landsat().query(2016, VALLEY).unwrap();
    let params = search_params(&query, VALLEY).unwrap();
    let items = client.search_all(&params).await.expect("search failed");
    let kept = select_items(items, &query, VALLEY).unwrap();

    println!("{} scenes kept", kept.len());
    assert!(!kept.is_empty(), "expected cloud-free Landsat 8 scenes in 2016");
    for item in &kept {
        assert_eq!(item.properties.platform.as_deref(), Some("landsat-8"));
        assert!(item.cloud_cover().unwrap() < 10.0);
        for band in &query.bands {
            assert!(item.band_asset(band).is_some(), "{} lacks {band}", item.id);
        }
    }
}

/// Landsat 5 era: TM band names resolve to assets too.
#[tokio::test]
#[ignore]
async fn stac_earth_search_landsat5_assets() {
    let client = StacClient::new(StacCatalog::EarthSearch, StacClientOptions::default())
        .expect("failed to create client");

    let query = SensorTable::landsat().query(1990, VALLEY).unwrap();
    assert_eq!(landsat_platform(&query.archive_id).unwrap(), "landsat-5");
    let params = search_params(&query, VALLEY).unwrap();
    let items = client.search(&params).await.expect("search failed");

    if let Some(item) = items.features.first() {
        assert!(item.band_asset("SR_B1").is_some());
        assert!(item.band_asset("SR_B7").is_some());
    }
}

/// Test Planetary Computer URL signing via the /sign endpoint.
#[tokio::test]
#[ignore]
async fn stac_pc_url_signing() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let href = "https://landsateuwest.blob.core.windows.net/landsat-c2/level-2/standard/oli-tirs/2016/141/041/LC08_L2SP_141041_20160310_20200907_02_T1/LC08_L2SP_141041_20160310_20200907_02_T1_SR_B4.TIF";
    let signed = client.sign_asset_href(href).await.expect("signing failed");

    assert!(signed.starts_with(href), "should start with original href");
    assert!(signed.contains("sig="), "should contain SAS token params");
}

/// A small UTM grid over the valley: every returned image sits on the grid.
#[tokio::test]
#[ignore]
async fn stac_archive_resamples_onto_grid() {
    let archive = StacArchive::new(StacArchiveOptions::default()).expect("archive");
    // ~600 m square in UTM 45N
    let grid = GridSpec::covering((330_000.0, 3_065_000.0, 330_600.0, 3_065_600.0), 30.0, 32645).unwrap();
    let mut query = SensorTable::landsat().query(2016, grid.bounds()).unwrap();
    query.bands.truncate(2);

    let images = archive.query(&query, &grid).await.expect("archive query failed");
    for image in &images {
        assert_eq!(image.bands.shape(), (grid.rows, grid.cols));
        assert_eq!(image.bands.len(), 2);
    }
}

/// Paginated search respects `max_items`.
#[tokio::test]
#[ignore]
async fn stac_paginated_search() {
    let opts = StacClientOptions {
        max_items: 15,
        page_size: 5,
        ..Default::default()
    };
    let client = StacClient::new(StacCatalog::EarthSearch, opts).expect("failed to create client");

    let mut query = SensorTable::landsat().query(2018, VALLEY).unwrap();
    query.cloud_cover_max = 100.0;
    let params = search_params(&query, VALLEY).unwrap();
    let items = client.search_all(&params).await.expect("search_all failed");

    println!("Fetched {} items across pages", items.len());
    assert!(items.len() > 5, "should have fetched more than one page");
    assert!(items.len() <= 15, "should respect max_items");
}
