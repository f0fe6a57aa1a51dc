use geo::{Geometry, Intersects, Point};

use covermap_core::raster::{BandStack, GeoTransform};
use covermap_core::vector::{LabeledSample, LabeledSampleSet};
use covermap_core::{Error, Result};

use super::FeatureVector;
use crate::maybe_rayon::*;

/// Grid cells a sample labels: the cell holding each point, or every cell
/// whose centre lies inside (or on the edge of) a polygon.
pub fn sample_pixels(
    sample: &LabeledSample,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Vec<(usize, usize)> {
    match &sample.geometry {
        Geometry::Point(p) => transform
            .cell_containing(p.x(), p.y(), rows, cols)
            .into_iter()
            .collect(),
        Geometry::MultiPoint(mp) => mp
            .iter()
            .filter_map(|p| transform.cell_containing(p.x(), p.y(), rows, cols))
            .collect(),
        polygonal => {
            let (min_x, min_y, max_x, max_y) = sample.bounds();
            let (c0, r0) = transform.geo_to_pixel(min_x, max_y);
            let (c1, r1) = transform.geo_to_pixel(max_x, min_y);
            let clamp = |v: f64, n: usize| v.floor().clamp(0.0, n as f64) as usize;
            let (row_lo, row_hi) = (clamp(r0.min(r1), rows), clamp(r0.max(r1) + 1.0, rows));
            let (col_lo, col_hi) = (clamp(c0.min(c1), cols), clamp(c0.max(c1) + 1.0, cols));

            let mut cells = Vec::new();
            for row in row_lo..row_hi {
                for col in col_lo..col_hi {
                    let (x, y) = transform.pixel_to_geo(col, row);
                    if polygonal.intersects(&Point::new(x, y)) {
                        cells.push((row, col));
                    }
                }
            }
            cells
        }
    }
}

/// Sample the `bands` of `composite` under every labeled geometry.
///
/// Pixels where any selected band is not finite (outside the ROI, no clear
/// observation) are skipped, so a sample outside the valid area contributes
/// nothing. Output order follows the sample set, then row-major pixel order.
pub fn sample_regions<S: AsRef<str>>(
    composite: &BandStack,
    samples: &LabeledSampleSet,
    bands: &[S],
) -> Result<Vec<FeatureVector>> {
    if bands.is_empty() {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: "[]".into(),
            reason: "at least one band is required".into(),
        });
    }
    let indices = composite.indices_of(bands)?;
    let (rows, cols) = composite.shape();
    let transform = composite.transform();

    let features: Vec<FeatureVector> = samples
        .samples()
        .par_iter()
        .flat_map(|sample| {
            let mut values = Vec::with_capacity(indices.len());
            sample_pixels(sample, &transform, rows, cols)
                .into_iter()
                .filter_map(|(row, col)| {
                    composite
                        .read_pixel(row, col, &indices, &mut values)
                        .then(|| FeatureVector {
                            class: sample.class,
                            values: values.clone(),
                            row,
                            col,
                        })
                })
                .collect::<Vec<_>>()
        })
        .collect();

    tracing::debug!(
        samples = samples.len(),
        vectors = features.len(),
        "sampled training regions"
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covermap_core::Raster;
    use geo::polygon;

    fn composite() -> BandStack {
        // 3x3 grid, 10 m cells, upper-left corner at (0, 30)
        let gt = GeoTransform::new(0.0, 30.0, 10.0, -10.0);
        let mut red = Raster::from_vec((0..9).map(|v| v as f64).collect(), 3, 3).unwrap();
        red.set_transform(gt);
        red.set(2, 2, f64::NAN).unwrap();
        let mut nir = Raster::from_vec((0..9).map(|v| 10.0 + v as f64).collect(), 3, 3).unwrap();
        nir.set_transform(gt);
        BandStack::from_bands([("red", red), ("nir", nir)]).unwrap()
    }

    fn point(x: f64, y: f64, class: u8) -> LabeledSample {
        LabeledSample::new(Geometry::Point(Point::new(x, y)), class).unwrap()
    }

    #[test]
    fn points_take_their_pixel() {
        let set = LabeledSampleSet::new(vec![point(15.0, 25.0, 1), point(5.0, 5.0, 2)]);
        let fv = sample_regions(&composite(), &set, &["nir", "red"]).unwrap();
        assert_eq!(fv.len(), 2);
        assert_eq!((fv[0].row, fv[0].col, fv[0].class), (0, 1, 1));
        assert_eq!(fv[0].values, vec![11.0, 1.0]);
        assert_eq!((fv[1].row, fv[1].col), (2, 0));
    }

    #[test]
    fn polygons_take_contained_centres() {
        let poly = polygon![(x: 0.0, y: 30.0), (x: 20.0, y: 30.0), (x: 20.0, y: 10.0), (x: 0.0, y: 10.0)];
        let set = LabeledSampleSet::new(vec![LabeledSample::new(Geometry::Polygon(poly), 3).unwrap()]);
        let fv = sample_regions(&composite(), &set, &["red"]).unwrap();
        let cells: Vec<_> = fv.iter().map(|f| (f.row, f.col)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert!(fv.iter().all(|f| f.class == 3));
    }

    #[test]
    fn invalid_and_outside_pixels_are_skipped() {
        let set = LabeledSampleSet::new(vec![
            point(25.0, 5.0, 1),     // NaN red
            point(500.0, 500.0, 1),  // off the grid
        ]);
        assert!(sample_regions(&composite(), &set, &["red", "nir"]).unwrap().is_empty());
        // the NaN is only in red
        assert_eq!(sample_regions(&composite(), &set, &["nir"]).unwrap().len(), 1);
    }

    #[test]
    fn unknown_band_is_an_error() {
        let set = LabeledSampleSet::new(vec![point(15.0, 25.0, 1)]);
        assert!(matches!(
            sample_regions(&composite(), &set, &["swir1"]),
            Err(Error::MissingBand(_))
        ));
    }
}
