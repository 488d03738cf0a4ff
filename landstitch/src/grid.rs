//! Tile grid over the area of interest.
//!
//! The area of interest is split into a regular `n x n` grid of rectangular
//! cells. Cells are addressed by `(east, north)` steps from the grid origin
//! (the south-west corner). The grid also answers the two geometric
//! questions the pipeline asks of it: the expanded read window of a cell
//! and the border line shared by two adjacent cells.

use geo::{Coord, LineString, Rect};

/// A regular rectangular tiling of the area of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    origin: Coord<f64>,
    cell_width: f64,
    cell_height: f64,
    tiles_per_axis: usize,
}

impl TileGrid {
    /// Splits `aoi` into `tiles_per_axis` x `tiles_per_axis` cells.
    pub fn split(aoi: Rect<f64>, tiles_per_axis: usize) -> Self {
        let n = tiles_per_axis.max(1);
        Self {
            origin: aoi.min(),
            cell_width: aoi.width() / n as f64,
            cell_height: aoi.height() / n as f64,
            tiles_per_axis: n,
        }
    }

    pub fn tiles_per_axis(&self) -> usize {
        self.tiles_per_axis
    }

    /// Side length of a cell along the x axis.
    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn cell_height(&self) -> f64 {
        self.cell_height
    }

    /// The rectangle of the cell `east` steps east and `north` steps north
    /// of the origin.
    pub fn cell(&self, east: usize, north: usize) -> Rect<f64> {
        let min = Coord {
            x: self.origin.x + east as f64 * self.cell_width,
            y: self.origin.y + north as f64 * self.cell_height,
        };
        let max = Coord {
            x: min.x + self.cell_width,
            y: min.y + self.cell_height,
        };
        Rect::new(min, max)
    }

    /// All cell addresses with their rectangles, row-major from the origin.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Rect<f64>)> + '_ {
        let n = self.tiles_per_axis;
        (0..n).flat_map(move |north| (0..n).map(move |east| (east, north, self.cell(east, north))))
    }

    /// The straight border line between a cell and its eastern neighbor.
    ///
    /// Returns `None` when the cell is on the eastern edge of the grid.
    pub fn east_border(&self, east: usize, north: usize) -> Option<LineString<f64>> {
        if east + 1 >= self.tiles_per_axis {
            return None;
        }
        let cell = self.cell(east, north);
        Some(LineString::new(vec![
            Coord {
                x: cell.max().x,
                y: cell.min().y,
            },
            Coord {
                x: cell.max().x,
                y: cell.max().y,
            },
        ]))
    }

    /// The straight border line between a cell and its northern neighbor.
    ///
    /// Returns `None` when the cell is on the northern edge of the grid.
    pub fn north_border(&self, east: usize, north: usize) -> Option<LineString<f64>> {
        if north + 1 >= self.tiles_per_axis {
            return None;
        }
        let cell = self.cell(east, north);
        Some(LineString::new(vec![
            Coord {
                x: cell.min().x,
                y: cell.max().y,
            },
            Coord {
                x: cell.max().x,
                y: cell.max().y,
            },
        ]))
    }
}

/// Expands a rectangle outward by `distance` on every side.
pub fn expand_rect(rect: Rect<f64>, distance: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - distance,
            y: rect.min().y - distance,
        },
        Coord {
            x: rect.max().x + distance,
            y: rect.max().y + distance,
        },
    )
}
