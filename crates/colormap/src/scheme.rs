//! Colours and the discrete class palette.

use covermap_core::{ClassCatalog, ClassCode, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn to_rgba(self, alpha: u8) -> [u8; 4] {
        [self.r, self.g, self.b, alpha]
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

/// Multi-stop linear interpolation at `t`, clamped to the end stops.
pub fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgb::new(0, 0, 0);
    };
    if t <= first.t {
        return first.color;
    }
    if t >= last.t {
        return last.color;
    }
    for pair in stops.windows(2) {
        if t <= pair[1].t {
            let ratio = (t - pair[0].t) / (pair[1].t - pair[0].t);
            return lerp_color(pair[0].color, pair[1].color, ratio);
        }
    }
    last.color
}

/// Palette of a class map: colours spread evenly over `[min code, max code]`.
///
/// Codes with a catalog entry get their own colour; codes in between are
/// interpolated the way a `min`/`max`/`palette` visualization does.
#[derive(Debug, Clone)]
pub struct ClassPalette {
    stops: Vec<ColorStop>,
    min: ClassCode,
    max: ClassCode,
    /// Colour of nodata pixels. Default: fully transparent.
    pub nodata_color: [u8; 4],
}

impl ClassPalette {
    /// One stop per catalog class, in code order.
    pub fn from_catalog(catalog: &ClassCatalog) -> Result<Self> {
        let codes = catalog.codes();
        let min = codes.first().copied().unwrap_or(0);
        let max = codes.last().copied().unwrap_or(0);
        let span = f64::from(max.saturating_sub(min)).max(1.0);
        let stops = catalog
            .classes
            .iter()
            .map(|c| {
                let [r, g, b] = c.rgb()?;
                Ok(ColorStop::new(f64::from(c.code - min) / span, r, g, b))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stops,
            min,
            max,
            nodata_color: [0, 0, 0, 0],
        })
    }

    /// `(min, max)` codes the palette spans.
    pub fn range(&self) -> (ClassCode, ClassCode) {
        (self.min, self.max)
    }

    /// Colour of `code`; codes outside the range clamp to the end colours.
    pub fn color_of(&self, code: ClassCode) -> Rgb {
        let span = f64::from(self.max.saturating_sub(self.min)).max(1.0);
        let t = (f64::from(code) - f64::from(self.min)) / span;
        multi_stop(&self.stops, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covermap_core::vector::ClassInfo;

    #[test]
    fn landcover_palette_colours() {
        let palette = ClassPalette::from_catalog(&ClassCatalog::landcover()).unwrap();
        assert_eq!(palette.range(), (0, 4));
        assert_eq!(palette.color_of(0), Rgb::new(0x16, 0x2b, 0xff));
        assert_eq!(palette.color_of(1), Rgb::new(255, 255, 255));
        assert_eq!(palette.color_of(3), Rgb::new(0x2e, 0xff, 0x32));
        assert_eq!(palette.color_of(4), Rgb::new(0xbf, 0x04, 0xc2));
    }

    #[test]
    fn codes_outside_clamp() {
        let palette = ClassPalette::from_catalog(&ClassCatalog::landcover()).unwrap();
        assert_eq!(palette.color_of(9), palette.color_of(4));
    }

    #[test]
    fn sparse_codes_interpolate_between() {
        let catalog = ClassCatalog::new(vec![
            ClassInfo::new(0, "dark", "#000000"),
            ClassInfo::new(2, "light", "#c8c8c8"),
        ])
        .unwrap();
        let palette = ClassPalette::from_catalog(&catalog).unwrap();
        assert_eq!(palette.color_of(1), Rgb::new(100, 100, 100));
    }

    #[test]
    fn bad_colour_rejected() {
        let catalog = ClassCatalog::new(vec![ClassInfo::new(0, "x", "blue")]).unwrap();
        assert!(ClassPalette::from_catalog(&catalog).is_err());
    }

    #[test]
    fn multi_stop_endpoints() {
        let stops = [ColorStop::new(0.0, 0, 0, 0), ColorStop::new(1.0, 255, 255, 255)];
        assert_eq!(multi_stop(&stops, -1.0), Rgb::new(0, 0, 0));
        assert_eq!(multi_stop(&stops, 0.5), Rgb::new(128, 128, 128));
        assert_eq!(multi_stop(&stops, 2.0), Rgb::new(255, 255, 255));
        assert_eq!(multi_stop(&[], 0.5), Rgb::new(0, 0, 0));
    }
}
