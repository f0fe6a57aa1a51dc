//! Labeled reference samples.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect, Geometry, Rect};

use crate::error::{Error, Result};
use crate::vector::roi::geometry_kind;
use crate::vector::{read_labeled_features, ClassCode};

/// A reference geometry tagged with its class.
///
/// Points label the pixel they fall in; polygons label every pixel whose
/// centre they contain.
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub geometry: Geometry<f64>,
    pub class: ClassCode,
    bounds: Rect<f64>,
}

impl LabeledSample {
    pub fn new(geometry: Geometry<f64>, class: ClassCode) -> Result<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) | Geometry::Polygon(_)
            | Geometry::MultiPolygon(_) | Geometry::Rect(_) => {}
            ref other => {
                return Err(Error::Geometry(format!(
                    "training samples must be points or polygons, got {}",
                    geometry_kind(other)
                )))
            }
        }
        if class == u8::MAX {
            return Err(Error::InvalidParameter {
                name: "class",
                value: class.to_string(),
                reason: "code 255 is reserved for nodata".into(),
            });
        }
        let bounds = geometry
            .bounding_rect()
            .ok_or_else(|| Error::Geometry("empty training geometry".into()))?;
        Ok(Self { geometry, class, bounds })
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        (min.x, min.y, max.x, max.y)
    }
}

/// The campaign's full set of labeled samples, reused unchanged every year.
#[derive(Debug, Clone, Default)]
pub struct LabeledSampleSet {
    samples: Vec<LabeledSample>,
}

impl LabeledSampleSet {
    pub fn new(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    /// Load one GeoJSON file of features carrying an integer `property`.
    pub fn from_geojson_file(path: impl AsRef<Path>, property: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&text, property)
    }

    pub fn from_geojson_str(text: &str, property: &str) -> Result<Self> {
        let samples = read_labeled_features(text, property)?
            .into_iter()
            .map(|(g, c)| LabeledSample::new(g, c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { samples })
    }

    /// Append another set, the way per-class collections are merged into one
    /// training collection.
    pub fn merge(mut self, other: LabeledSampleSet) -> Self {
        self.samples.extend(other.samples);
        self
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct class codes present, ascending.
    pub fn classes(&self) -> Vec<ClassCode> {
        self.class_counts().into_keys().collect()
    }

    /// Number of geometries per class.
    pub fn class_counts(&self) -> BTreeMap<ClassCode, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.class).or_insert(0) += 1;
        }
        counts
    }
}
