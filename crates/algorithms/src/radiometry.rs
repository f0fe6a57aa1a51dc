//! Radiometric correction of Landsat Collection 2 Level-2 scenes.
//!
//! Converts stored digital numbers to surface reflectance (optical `SR_B*`
//! bands) and surface temperature in kelvin (thermal `ST_B*` bands). Bands
//! with neither prefix are copied through unchanged.

use covermap_core::raster::{BandStack, Raster};
use covermap_core::{RawImage, Result};

use crate::maybe_rayon::*;

/// A linear `raw * multiply + add` rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub multiply: f64,
    pub add: f64,
}

impl LinearScale {
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.multiply + self.add
    }
}

/// Scale factors for the optical and thermal band families.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleFactors {
    pub optical_prefix: String,
    pub optical: LinearScale,
    pub thermal_prefix: String,
    pub thermal: LinearScale,
}

impl ScaleFactors {
    /// Collection 2 Level-2 factors, shared by TM, ETM+, OLI and OLI-2.
    pub fn landsat_c2_l2() -> Self {
        Self {
            optical_prefix: "SR_B".into(),
            optical: LinearScale {
                multiply: 2.75e-5,
                add: -0.2,
            },
            thermal_prefix: "ST_B".into(),
            thermal: LinearScale {
                multiply: 3.41802e-3,
                add: 149.0,
            },
        }
    }

    /// The rescaling applied to a band, `None` for pass-through bands.
    pub fn for_band(&self, name: &str) -> Option<LinearScale> {
        if name.starts_with(&self.optical_prefix) {
            Some(self.optical)
        } else if name.starts_with(&self.thermal_prefix) {
            Some(self.thermal)
        } else {
            None
        }
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::landsat_c2_l2()
    }
}

fn rescale(band: &Raster<f64>, scale: LinearScale) -> Result<Raster<f64>> {
    let (rows, cols) = band.shape();
    let nodata = band.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let raw = unsafe { band.get_unchecked(row, col) };
                if raw.is_nan() || nodata.is_some_and(|nd| raw == nd) {
                    continue;
                }
                *out = scale.apply(raw);
            }
            row_data
        })
        .collect();

    let mut output = band.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    output.replace_data(data)?;
    Ok(output)
}

/// Return a corrected copy of `stack`; the input is left untouched.
///
/// Output values are not clamped: reflectance slightly below 0 or above 1
/// is kept as the archive delivers it. Cells equal to a band's nodata value
/// become NaN.
pub fn correct(stack: &BandStack, factors: &ScaleFactors) -> Result<BandStack> {
    let mut out = BandStack::new();
    for (name, band) in stack.iter() {
        let corrected = match factors.for_band(name) {
            Some(scale) => rescale(band, scale)?,
            None => band.clone(),
        };
        out.push(name, corrected)?;
    }
    Ok(out)
}

/// Correct every image of one year's collection, images in parallel.
pub fn correct_collection(images: &[RawImage], factors: &ScaleFactors) -> Result<Vec<BandStack>> {
    images
        .par_iter()
        .map(|image| correct(&image.bands, factors))
        .collect()
}
