//! Export and visualization collaborators.

use std::path::{Path, PathBuf};

use covermap_colormap::RgbaImage;
use covermap_core::io::{write_band_stack, write_class_geotiff};
use covermap_core::raster::BandStack;
use covermap_core::{Error, ExportRaster, ExportReceipt, ExportRequest, ExportSink, Result};

use crate::retry::RetryPolicy;
use crate::tiles::{Tile, TileIterator};

/// Writes every export as `<dir>/<name>.tif`.
///
/// Band stacks become multi-page float GeoTIFFs, class maps 8-bit GeoTIFFs.
/// Only the native grid resolution is supported.
#[derive(Debug, Clone)]
pub struct GeoTiffDirSink {
    dir: PathBuf,
}

impl GeoTiffDirSink {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.tif"))
    }
}

impl ExportSink for GeoTiffDirSink {
    async fn export(&self, request: ExportRequest<'_>) -> Result<ExportReceipt> {
        let pixels = request.pixel_count();
        if pixels > request.max_pixels {
            return Err(Error::ExportLimitExceeded {
                name: request.name,
                pixels,
                max_pixels: request.max_pixels,
            });
        }
        let cell = request.raster.transform().cell_size();
        if (request.scale - cell).abs() > 1e-9 * cell.max(1.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: request.scale.to_string(),
                reason: format!("only the native cell size {cell} can be written"),
            });
        }

        // Encoding runs on the blocking pool so the retry timeout can fire.
        let path = self.path_for(&request.name);
        let target = path.clone();
        let write = match request.raster {
            ExportRaster::Bands(stack) => {
                let stack = stack.clone();
                tokio::task::spawn_blocking(move || write_band_stack(&stack, &target, None))
            }
            ExportRaster::Classes(classes) => {
                let classes = classes.clone();
                tokio::task::spawn_blocking(move || write_class_geotiff(&classes, &target))
            }
        };
        write
            .await
            .map_err(|e| Error::Other(format!("writer for '{}' aborted: {e}", request.name)))??;
        tracing::debug!(name = %request.name, path = %path.display(), pixels, "export written");
        Ok(ExportReceipt {
            name: request.name,
            location: path.display().to_string(),
            pixels,
            parts: 1,
        })
    }
}

/// Receives the RGBA layers of the most recent completed year.
pub trait VisualizationSink: Send + Sync {
    fn show(&self, year: i32, layers: &[RgbaImage]) -> Result<()>;
}

/// Export `request` through `sink` under `retry`. A product over its pixel
/// limit is retried once as tiles that each fit under the limit.
pub async fn export_product<E: ExportSink>(
    sink: &E,
    request: ExportRequest<'_>,
    retry: &RetryPolicy,
) -> Result<ExportReceipt> {
    let what = format!("export {}", request.name);
    match retry.run(&what, || sink.export(request.clone())).await {
        Err(Error::ExportLimitExceeded {
            name,
            pixels,
            max_pixels,
        }) => {
            tracing::info!(%name, pixels, max_pixels, "export over the pixel limit, writing tiles");
            export_tiled(sink, &request, retry).await
        }
        other => other,
    }
}

async fn export_tiled<E: ExportSink>(
    sink: &E,
    request: &ExportRequest<'_>,
    retry: &RetryPolicy,
) -> Result<ExportReceipt> {
    let (rows, cols) = request.raster.shape();
    let tiles = TileIterator::under_limit(rows, cols, request.max_pixels).ok_or_else(|| {
        Error::ExportLimitExceeded {
            name: request.name.clone(),
            pixels: request.pixel_count(),
            max_pixels: request.max_pixels,
        }
    })?;

    let mut locations = Vec::with_capacity(tiles.tile_count());
    let mut pixels = 0;
    for tile in tiles {
        let piece = TilePiece::cut(&request.raster, &tile)?;
        let tile_request = ExportRequest {
            name: tile.name(&request.name),
            raster: piece.as_export(),
            scale: request.scale,
            region: piece.bounds(),
            max_pixels: request.max_pixels,
            format: request.format,
        };
        let what = format!("export {}", tile_request.name);
        let receipt = retry.run(&what, || sink.export(tile_request.clone())).await?;
        pixels += receipt.pixels;
        locations.push(receipt.location);
    }

    Ok(ExportReceipt {
        name: request.name.clone(),
        parts: locations.len(),
        location: locations.join(";"),
        pixels,
    })
}

/// An owned window of an export raster.
enum TilePiece {
    Bands(BandStack),
    Classes(covermap_core::Raster<u8>),
}

impl TilePiece {
    fn cut(raster: &ExportRaster<'_>, tile: &Tile) -> Result<Self> {
        let Tile {
            row_offset,
            col_offset,
            rows,
            cols,
        } = *tile;
        match raster {
            ExportRaster::Bands(stack) => {
                let mut out = BandStack::new();
                for (name, band) in stack.iter() {
                    out.push(name, band.window(row_offset, col_offset, rows, cols)?)?;
                }
                Ok(TilePiece::Bands(out))
            }
            ExportRaster::Classes(classes) => Ok(TilePiece::Classes(classes.window(
                row_offset, col_offset, rows, cols,
            )?)),
        }
    }

    fn as_export(&self) -> ExportRaster<'_> {
        match self {
            TilePiece::Bands(stack) => ExportRaster::Bands(stack),
            TilePiece::Classes(classes) => ExportRaster::Classes(classes),
        }
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        let (rows, cols) = self.as_export().shape();
        self.as_export().transform().bounds(cols, rows)
    }
}
