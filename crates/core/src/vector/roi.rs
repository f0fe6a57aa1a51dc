//! Region of interest.

use std::path::Path;

use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Point, Polygon, Rect};

use crate::error::{Error, Result};
use crate::vector::read_geometries;

/// The single (possibly multi-part) polygon every product is clipped to.
///
/// Built once per campaign and shared read-only across years.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    geometry: MultiPolygon<f64>,
    bounds: Rect<f64>,
}

impl RegionOfInterest {
    /// Wrap a multipolygon; it must have a non-degenerate extent.
    pub fn new(geometry: MultiPolygon<f64>) -> Result<Self> {
        let bounds = geometry
            .bounding_rect()
            .ok_or_else(|| Error::Geometry("region of interest is empty".into()))?;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(Error::Geometry("region of interest has zero area".into()));
        }
        Ok(Self { geometry, bounds })
    }

    /// Dissolve polygonal geometries into one region.
    ///
    /// Parts are kept as separate polygons; point-in-region tests treat the
    /// collection as their union.
    pub fn from_geometries<I>(geometries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Geometry<f64>>,
    {
        let mut parts: Vec<Polygon<f64>> = Vec::new();
        for geometry in geometries {
            match geometry {
                Geometry::Polygon(p) => parts.push(p),
                Geometry::MultiPolygon(mp) => parts.extend(mp.0),
                Geometry::Rect(r) => parts.push(r.to_polygon()),
                other => {
                    return Err(Error::Geometry(format!(
                        "region of interest must be polygonal, got {}",
                        geometry_kind(&other)
                    )))
                }
            }
        }
        Self::new(MultiPolygon::new(parts))
    }

    /// Axis-aligned rectangle region.
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let rect = Rect::new((min_x, min_y), (max_x, max_y));
        Self::new(MultiPolygon::new(vec![rect.to_polygon()]))
    }

    /// Read a region from a GeoJSON file.
    pub fn from_geojson_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_geometries(read_geometries(&text)?)
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        (min.x, min.y, max.x, max.y)
    }

    /// Whether the point lies inside or on the boundary of the region.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let p = Point::new(x, y);
        self.bounds.intersects(&p) && self.geometry.intersects(&p)
    }
}

pub(crate) fn geometry_kind(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
