//! Nearest-neighbour resampling of a scene band onto the campaign grid.

use covermap_core::{GridSpec, Raster, Result};

use crate::reproject::PointTransform;

/// Resample `source` (georeferenced in `source_epsg`) onto `grid`.
///
/// Every grid cell centre is projected into the source CRS and takes the
/// value of the source pixel containing it. Cells outside the scene and
/// source cells that are nodata (or equal to `fill`) become NaN.
pub fn resample_nearest(
    source: &Raster<f64>,
    source_epsg: u32,
    grid: &GridSpec,
    fill: Option<f64>,
) -> Result<Raster<f64>> {
    let transform = PointTransform::new(grid.epsg, source_epsg)?;
    let (src_rows, src_cols) = source.shape();
    let src_transform = source.transform();

    let mut data = Vec::with_capacity(grid.rows * grid.cols);
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let (x, y) = grid.transform.pixel_to_geo(col, row);
            let (sx, sy) = transform.apply(x, y);
            let value = src_transform
                .cell_containing(sx, sy, src_rows, src_cols)
                .and_then(|(r, c)| source.get(r, c).ok())
                .filter(|&v| !source.is_nodata(v) && Some(v) != fill)
                .unwrap_or(f64::NAN);
            data.push(value);
        }
    }

    let mut output = grid.blank(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    output.replace_data(data)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reproject::wgs84_to_utm;
    use covermap_core::{Error, GeoTransform};

    fn scene(epsg: u32, transform: GeoTransform) -> Raster<f64> {
        let values: Vec<f64> = (0..16).map(|v| v as f64).collect();
        let mut r = Raster::from_vec(values, 4, 4).unwrap();
        r.set_transform(transform);
        r.set_epsg(Some(epsg));
        r.set_nodata(Some(0.0));
        r
    }

    #[test]
    fn same_crs_coarser_grid_picks_centre_pixels() {
        let src = scene(32645, GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        let grid = GridSpec::covering((0.0, 0.0, 120.0, 120.0), 60.0, 32645).unwrap();
        let out = resample_nearest(&src, 32645, &grid, None).unwrap();
        assert_eq!(out.shape(), (2, 2));
        // centre (30, 90) falls on the corner of pixels; floor picks row 1, col 1
        assert_eq!(out.get(0, 0).unwrap(), 5.0);
        assert_eq!(out.get(1, 1).unwrap(), 15.0);
        assert!(grid.matches(&out));
    }

    #[test]
    fn nodata_and_outside_become_nan() {
        let src = scene(32645, GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        // extends one 30 m column to the left of the scene
        let grid = GridSpec::covering((-30.0, 90.0, 30.0, 120.0), 30.0, 32645).unwrap();
        let out = resample_nearest(&src, 32645, &grid, None).unwrap();
        assert!(out.get(0, 0).unwrap().is_nan());
        // source (0, 0) holds 0.0, the nodata value
        assert!(out.get(0, 1).unwrap().is_nan());

        // source (0, 1) holds 1.0, dropped as the archive fill value
        let one_cell = GridSpec::covering((30.0, 90.0, 60.0, 120.0), 30.0, 32645).unwrap();
        let out = resample_nearest(&src, 32645, &one_cell, Some(1.0)).unwrap();
        assert!(out.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn geographic_grid_over_utm_scene() {
        let (e, n) = wgs84_to_utm(85.3, 27.7, 45, true);
        let src = scene(32645, GeoTransform::new(e - 60.0, n + 60.0, 30.0, -30.0));
        let grid = GridSpec {
            transform: GeoTransform::new(85.2999, 27.7001, 0.0002, -0.0002),
            rows: 1,
            cols: 1,
            epsg: 4326,
        };
        let out = resample_nearest(&src, 32645, &grid, None).unwrap();
        assert_eq!(out.shape(), (1, 1));
        // (85.3, 27.7) sits exactly at the corner between source rows/cols 1 and 2
        let v = out.get(0, 0).unwrap();
        assert!([5.0, 6.0, 9.0, 10.0].contains(&v), "got {v}");
    }

    #[test]
    fn unsupported_crs_rejected() {
        let src = scene(3857, GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        let grid = GridSpec::covering((0.0, 0.0, 120.0, 120.0), 60.0, 32645).unwrap();
        assert!(matches!(
            resample_nearest(&src, 3857, &grid, None),
            Err(Error::UnsupportedCrs(3857))
        ));
    }
}
