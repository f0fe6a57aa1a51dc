//! # covermap colormap
//!
//! Display rendering of covermap products.
//!
//! - [`visualize_rgb`] stretches three reflectance bands of a composite to
//!   8-bit `vis-red` / `vis-green` / `vis-blue` bands, the form in which the
//!   RGB product is exported.
//! - [`classes_to_rgba`] paints a class map with the catalog palette.
//! - [`rgb_to_rgba`] turns a visualized stack into an RGBA buffer.
//!
//! ## Usage
//!
//! ```ignore
//! use covermap_colormap::{visualize_rgb, RgbStretch};
//!
//! let vis = visualize_rgb(&composite, &["SR_B4", "SR_B3", "SR_B2"], &RgbStretch::default())?;
//! ```

mod render;
mod scheme;

pub use render::{classes_to_rgba, rgb_to_rgba, visualize_rgb, RgbStretch, RgbaImage, VIS_BANDS};
pub use scheme::{multi_stop, ClassPalette, ColorStop, Rgb};
