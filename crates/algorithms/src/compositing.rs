//! Per-pixel temporal compositing.
//!
//! Collapses one year of corrected scenes into a single cloud-reduced image
//! by taking, band by band, the median of every valid observation of each
//! pixel, then masks everything outside the region of interest.

use covermap_core::raster::{BandStack, Raster};
use covermap_core::vector::RegionOfInterest;
use covermap_core::{Error, Result};

use crate::maybe_rayon::*;

/// Median of the finite values in `values`; `None` when there are none.
///
/// Even counts average the two middle values. `values` is reordered.
pub fn median_of(values: &mut Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    let n = values.len();
    if n == 0 {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = n / 2;
    Some(if n % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    })
}

/// Row-major mask of the cells whose centre lies inside `roi`.
pub fn roi_mask(template: &Raster<f64>, roi: &RegionOfInterest) -> Vec<bool> {
    let (rows, cols) = template.shape();
    let transform = *template.transform();
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = transform.pixel_to_geo(col, row);
                    roi.contains_point(x, y)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn check_compatible(first: &BandStack, other: &BandStack) -> Result<()> {
    for name in first.band_names() {
        if !other.contains(name) {
            return Err(Error::MissingBand(name.clone()));
        }
    }
    let same_grid = first.band_at(0).same_grid(other.band(&first.band_names()[0])?);
    if !same_grid {
        let ((er, ec), (ar, ac)) = (first.shape(), other.shape());
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

/// Median composite of `images`, clipped to `roi`.
///
/// Band names come from the first image; every image must carry them all on
/// the same grid. NaN observations are ignored, so a pixel is NaN only when
/// no image saw it or its centre falls outside `roi`. The result does not
/// depend on the order of `images`.
pub fn median_composite(images: &[BandStack], roi: &RegionOfInterest) -> Result<BandStack> {
    let first = images
        .first()
        .ok_or_else(|| Error::EmptyCollection("nothing to composite".into()))?;
    if first.is_empty() {
        return Err(Error::MissingBand("composite input has no bands".into()));
    }
    for other in &images[1..] {
        check_compatible(first, other)?;
    }

    let (rows, cols) = first.shape();
    let template = first.band_at(0);
    let mask = roi_mask(template, roi);

    let mut composite = BandStack::new();
    for name in first.band_names() {
        let layers: Vec<&Raster<f64>> = images
            .iter()
            .map(|img| img.band(name))
            .collect::<Result<_>>()?;

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                let mut values = Vec::with_capacity(layers.len());
                for (col, out) in row_data.iter_mut().enumerate() {
                    if !mask[row * cols + col] {
                        continue;
                    }
                    values.clear();
                    values.extend(layers.iter().map(|l| unsafe { l.get_unchecked(row, col) }));
                    if let Some(m) = median_of(&mut values) {
                        *out = m;
                    }
                }
                row_data
            })
            .collect();

        let mut band = template.with_same_meta::<f64>(f64::NAN);
        band.set_nodata(Some(f64::NAN));
        band.replace_data(data)?;
        composite.push(name.clone(), band)?;
    }

    tracing::debug!(images = images.len(), bands = composite.len(), rows, cols, "median composite");
    Ok(composite)
}
