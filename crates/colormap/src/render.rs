//! Composite and class-map rendering.

use serde::{Deserialize, Serialize};

use covermap_core::raster::{BandStack, Raster};
use covermap_core::{Error, Result};

use crate::scheme::ClassPalette;

/// Names of the 8-bit bands produced by [`visualize_rgb`].
pub const VIS_BANDS: [&str; 3] = ["vis-red", "vis-green", "vis-blue"];

/// Linear stretch of three reflectance bands to 0..=255.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbStretch {
    /// Reflectance mapped to 0.
    pub min: f64,
    /// Reflectance mapped to 255.
    pub max: f64,
}

impl Default for RgbStretch {
    fn default() -> Self {
        Self { min: -0.2, max: 0.3 }
    }
}

impl RgbStretch {
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.max > self.min) {
            return Err(Error::InvalidParameter {
                name: "stretch",
                value: format!("[{}, {}]", self.min, self.max),
                reason: "need finite min < max".into(),
            });
        }
        Ok(())
    }

    /// 8-bit display value of `v`, or `None` if `v` is not finite.
    pub fn apply(&self, v: f64) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        let t = (v - self.min) / (self.max - self.min);
        Some((t.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// An RGBA pixel buffer, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// Stretch the `bands` (red, green, blue order) of `composite` into three
/// 0..=255 bands named [`VIS_BANDS`].
///
/// Pixels where any input band is not finite are NaN in all three outputs.
pub fn visualize_rgb<S: AsRef<str>>(composite: &BandStack, bands: &[S; 3], stretch: &RgbStretch) -> Result<BandStack> {
    stretch.validate()?;
    let indices = composite.indices_of(&bands[..])?;
    let (rows, cols) = composite.shape();

    let mut channels: [Vec<f64>; 3] = std::array::from_fn(|_| Vec::with_capacity(rows * cols));
    let mut values = Vec::with_capacity(3);
    for row in 0..rows {
        for col in 0..cols {
            let valid = composite.read_pixel(row, col, &indices, &mut values);
            for (k, channel) in channels.iter_mut().enumerate() {
                let v = if valid {
                    stretch.apply(values[k]).map_or(f64::NAN, f64::from)
                } else {
                    f64::NAN
                };
                channel.push(v);
            }
        }
    }

    let template = composite.band_at(indices[0]);
    let mut out = BandStack::new();
    for (name, data) in VIS_BANDS.iter().zip(channels) {
        let mut band = template.with_same_meta::<f64>(f64::NAN);
        band.set_nodata(Some(f64::NAN));
        band.replace_data(data)?;
        out.push(*name, band)?;
    }
    Ok(out)
}

/// RGBA buffer of a stack produced by [`visualize_rgb`]. NaN pixels are
/// transparent.
pub fn rgb_to_rgba(visualized: &BandStack, name: impl Into<String>) -> Result<RgbaImage> {
    let indices = visualized.indices_of(&VIS_BANDS[..])?;
    let (rows, cols) = visualized.shape();
    let mut pixels = Vec::with_capacity(rows * cols * 4);
    let mut values = Vec::with_capacity(3);
    for row in 0..rows {
        for col in 0..cols {
            if visualized.read_pixel(row, col, &indices, &mut values) {
                pixels.extend(values.iter().map(|&v| v.clamp(0.0, 255.0) as u8));
                pixels.push(255);
            } else {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }
    Ok(RgbaImage {
        name: name.into(),
        width: cols,
        height: rows,
        pixels,
    })
}

/// Convert a class map to RGBA through `palette`.
///
/// Nodata pixels are rendered with `palette.nodata_color`.
pub fn classes_to_rgba(classes: &Raster<u8>, palette: &ClassPalette, name: impl Into<String>) -> RgbaImage {
    let nodata = classes.nodata();
    let mut pixels = Vec::with_capacity(classes.len() * 4);
    for &code in classes.data().iter() {
        if Some(code) == nodata {
            pixels.extend_from_slice(&palette.nodata_color);
        } else {
            pixels.extend_from_slice(&palette.color_of(code).to_rgba(255));
        }
    }
    RgbaImage {
        name: name.into(),
        width: classes.cols(),
        height: classes.rows(),
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covermap_core::{ClassCatalog, GeoTransform};

    fn composite() -> BandStack {
        let band = |values: Vec<f64>| {
            let mut r = Raster::from_vec(values, 1, 3).unwrap();
            r.set_transform(GeoTransform::new(0.0, 30.0, 30.0, -30.0));
            r
        };
        BandStack::from_bands([
            ("SR_B4", band(vec![-0.2, 0.05, 0.5])),
            ("SR_B3", band(vec![-0.3, 0.3, f64::NAN])),
            ("SR_B2", band(vec![0.0, 0.1, 0.1])),
        ])
        .unwrap()
    }

    #[test]
    fn stretch_maps_range_to_bytes() {
        let s = RgbStretch::default();
        assert_eq!(s.apply(-0.2), Some(0));
        assert_eq!(s.apply(0.3), Some(255));
        assert_eq!(s.apply(0.1), Some(153));
        assert_eq!(s.apply(1.0), Some(255));
        assert_eq!(s.apply(f64::NAN), None);
        assert!(RgbStretch { min: 0.3, max: 0.3 }.validate().is_err());
    }

    #[test]
    fn visualized_bands_and_rgba() {
        let vis = visualize_rgb(&composite(), &["SR_B4", "SR_B3", "SR_B2"], &RgbStretch::default()).unwrap();
        assert_eq!(vis.band_names(), &VIS_BANDS.map(String::from));
        assert_eq!(vis.band("vis-red").unwrap().get(0, 0).unwrap(), 0.0);
        assert_eq!(vis.band("vis-green").unwrap().get(0, 1).unwrap(), 255.0);
        assert!(vis.band("vis-blue").unwrap().get(0, 2).unwrap().is_nan());

        let rgba = rgb_to_rgba(&vis, "Landsat_RGB_2016").unwrap();
        assert_eq!((rgba.width, rgba.height), (3, 1));
        assert_eq!(&rgba.pixels[0..4], &[0, 0, 102, 255]);
        assert_eq!(&rgba.pixels[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn missing_band_is_an_error() {
        assert!(visualize_rgb(&composite(), &["SR_B4", "SR_B3", "SR_B1"], &RgbStretch::default()).is_err());
    }

    #[test]
    fn class_map_colours() {
        let mut classes = Raster::from_vec(vec![0u8, 4, 255], 1, 3).unwrap();
        classes.set_nodata(Some(255));
        let palette = ClassPalette::from_catalog(&ClassCatalog::landcover()).unwrap();
        let rgba = classes_to_rgba(&classes, &palette, "Landsat_Classified_2016");
        assert_eq!(&rgba.pixels[0..4], &[0x16, 0x2b, 0xff, 255]);
        assert_eq!(&rgba.pixels[4..8], &[0xbf, 0x04, 0xc2, 255]);
        assert_eq!(&rgba.pixels[8..12], &[0, 0, 0, 0]);
    }
}
