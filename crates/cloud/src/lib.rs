//! # covermap cloud
//!
//! Landsat imagery archive backed by a STAC API.
//!
//! [`StacArchive`] implements [`covermap_core::ImageryArchive`] against the
//! `landsat-c2-l2` collection on Planetary Computer, Earth Search or any
//! STAC endpoint:
//!
//! - item search with pagination and retry ([`StacClient`])
//! - client-side platform, date, footprint and strict cloud-cover filtering
//! - asset download with exponential backoff ([`http::HttpClient`])
//! - nearest-neighbour resampling onto the campaign grid, with pure-Rust
//!   WGS84 / UTM reprojection

pub mod archive;
pub mod error;
pub mod http;
pub mod reproject;
pub mod resample;
pub mod stac_client;
pub mod stac_models;

pub use archive::{StacArchive, StacArchiveOptions};
pub use error::{CloudError, Result};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
