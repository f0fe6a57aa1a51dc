//! Row/column tiling of products that exceed an export pixel limit.

/// A window of a product raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row offset in the source raster
    pub row_offset: usize,
    /// Column offset in the source raster
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    pub fn new(row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// Export name of this tile of product `name`.
    pub fn name(&self, name: &str) -> String {
        format!("{name}_r{}_c{}", self.row_offset, self.col_offset)
    }
}

/// Iterator over non-overlapping tiles covering a raster, row-major.
#[derive(Debug, Clone)]
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    pub fn new(total_rows: usize, total_cols: usize, tile_rows: usize, tile_cols: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_rows.max(1),
            tile_cols: tile_cols.max(1),
            current_row: 0,
            current_col: 0,
        }
    }

    /// Near-square tiles of at most `max_pixels` cells each, or `None` when
    /// `max_pixels` is zero.
    pub fn under_limit(total_rows: usize, total_cols: usize, max_pixels: u64) -> Option<Self> {
        if max_pixels == 0 {
            return None;
        }
        let side = ((max_pixels as f64).sqrt().floor() as u64).max(1);
        let tile_cols = side.min(total_cols.max(1) as u64);
        let tile_rows = (max_pixels / tile_cols).min(total_rows.max(1) as u64);
        Some(Self::new(
            total_rows,
            total_cols,
            tile_rows as usize,
            tile_cols as usize,
        ))
    }

    /// Number of tiles this iterator yields in total.
    pub fn tile_count(&self) -> usize {
        self.total_rows.div_ceil(self.tile_rows) * self.total_cols.div_ceil(self.tile_cols)
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let cols = self.tile_cols.min(self.total_cols - self.current_col);
        let tile = Tile::new(self.current_row, self.current_col, rows, cols);

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_raster_exactly_once() {
        let tiles: Vec<Tile> = TileIterator::new(100, 75, 32, 32).collect();
        assert_eq!(tiles.len(), TileIterator::new(100, 75, 32, 32).tile_count());

        let mut covered = vec![0u8; 100 * 75];
        for t in &tiles {
            for r in t.row_offset..t.row_offset + t.rows {
                for c in t.col_offset..t.col_offset + t.cols {
                    covered[r * 75 + c] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&n| n == 1));
    }

    #[test]
    fn limit_bounds_every_tile() {
        let it = TileIterator::under_limit(3, 3, 4).unwrap();
        let tiles: Vec<Tile> = it.collect();
        assert_eq!(
            tiles,
            vec![
                Tile::new(0, 0, 2, 2),
                Tile::new(0, 2, 2, 1),
                Tile::new(2, 0, 1, 2),
                Tile::new(2, 2, 1, 1),
            ]
        );
        assert!(tiles.iter().all(|t| t.pixel_count() <= 4));
    }

    #[test]
    fn wide_rasters_use_full_rows_when_allowed() {
        let tiles: Vec<Tile> = TileIterator::under_limit(10, 4, 20).unwrap().collect();
        assert!(tiles.iter().all(|t| t.pixel_count() <= 20));
        assert_eq!(tiles[0], Tile::new(0, 0, 5, 4));
        assert_eq!(tiles.len(), 2);
    }

    #[test]
    fn zero_limit_cannot_tile() {
        assert!(TileIterator::under_limit(3, 3, 0).is_none());
    }

    #[test]
    fn tile_names() {
        assert_eq!(Tile::new(512, 0, 1, 1).name("Landsat_RGB_2001"), "Landsat_RGB_2001_r512_c0");
    }
}
