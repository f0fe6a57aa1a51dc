//! The imagery archive collaborator.

use std::future::Future;

use chrono::NaiveDate;

use crate::error::Result;
use crate::raster::{BandStack, GridSpec};
use crate::sensor::ArchiveQuery;

/// One archive scene resampled onto the campaign grid.
///
/// Band values are the archive's raw digital numbers; scale factors are
/// applied later by radiometric correction. Pixels the scene does not cover
/// are NaN.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub id: String,
    pub acquired: Option<NaiveDate>,
    pub cloud_cover: Option<f64>,
    pub bands: BandStack,
}

impl RawImage {
    pub fn new(id: impl Into<String>, bands: BandStack) -> Self {
        Self {
            id: id.into(),
            acquired: None,
            cloud_cover: None,
            bands,
        }
    }

    pub fn with_acquired(mut self, date: NaiveDate) -> Self {
        self.acquired = Some(date);
        self
    }

    pub fn with_cloud_cover(mut self, cloud_cover: f64) -> Self {
        self.cloud_cover = Some(cloud_cover);
        self
    }
}

/// Source of archive scenes.
///
/// Implementations must apply all four predicates of the query: archive id,
/// date range, intersection with `query.bounds`, and the strict cloud-cover
/// ceiling. Every returned image carries the bands listed in `query.bands`
/// on `grid`.
///
/// An empty result is not an error; callers turn it into a skipped year.
/// Transient failures should surface as [`crate::Error::ArchiveUnavailable`]
/// so the caller's retry policy can act on them.
pub trait ImageryArchive: Send + Sync {
    fn query(
        &self,
        query: &ArchiveQuery,
        grid: &GridSpec,
    ) -> impl Future<Output = Result<Vec<RawImage>>> + Send;
}
