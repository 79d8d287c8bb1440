//! Force-map scan grid: pixel coordinates ↔ linear curve indices.
//!
//! Force maps store curves in acquisition order. The grid is laid out as
//! `lines × points_per_line` where `x` selects the scan line and `y` the point
//! along it. With `Serpentine` order every odd line is traversed backwards,
//! so the curve index of `(x, y)` on an odd line is `x * rows + (rows - 1 - y)`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    /// Every line is traversed in the same direction.
    Raster,
    /// Alternate lines are traversed in opposite directions.
    Serpentine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanGrid {
    /// Number of scan lines (`x` range).
    pub cols: usize,
    /// Points per scan line (`y` range).
    pub rows: usize,
    pub order: ScanOrder,
}

impl ScanGrid {
    pub fn new(cols: usize, rows: usize, order: ScanOrder) -> Self {
        Self { cols, rows, order }
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Curve index at pixel `(x, y)`; `None` outside the grid.
    pub fn index_at(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        let y = match self.order {
            ScanOrder::Serpentine if x % 2 == 1 => self.rows - 1 - y,
            _ => y,
        };
        Some(x * self.rows + y)
    }

    /// Pixel `(x, y)` of a curve index; `None` when the index is past the grid.
    pub fn position_of(&self, index: usize) -> Option<(usize, usize)> {
        if self.rows == 0 || index >= self.len() {
            return None;
        }
        let x = index / self.rows;
        let along = index % self.rows;
        let y = match self.order {
            ScanOrder::Serpentine if x % 2 == 1 => self.rows - 1 - along,
            _ => along,
        };
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_indices_are_line_major() {
        let grid = ScanGrid::new(3, 4, ScanOrder::Raster);
        assert_eq!(grid.index_at(0, 0), Some(0));
        assert_eq!(grid.index_at(0, 3), Some(3));
        assert_eq!(grid.index_at(1, 0), Some(4));
        assert_eq!(grid.index_at(2, 3), Some(11));
    }

    #[test]
    fn serpentine_reverses_odd_lines() {
        let grid = ScanGrid::new(3, 4, ScanOrder::Serpentine);
        assert_eq!(grid.index_at(0, 0), Some(0));
        assert_eq!(grid.index_at(1, 0), Some(7));
        assert_eq!(grid.index_at(1, 3), Some(4));
        assert_eq!(grid.index_at(2, 0), Some(8));
    }

    #[test]
    fn boundaries_are_rejected() {
        let grid = ScanGrid::new(3, 4, ScanOrder::Serpentine);
        assert_eq!(grid.index_at(3, 0), None);
        assert_eq!(grid.index_at(0, 4), None);
        assert_eq!(grid.position_of(12), None);
        assert_eq!(ScanGrid::new(0, 0, ScanOrder::Raster).position_of(0), None);
    }

    #[test]
    fn position_inverts_index_on_every_pixel() {
        for order in [ScanOrder::Raster, ScanOrder::Serpentine] {
            let grid = ScanGrid::new(5, 3, order);
            let mut seen = vec![false; grid.len()];
            for x in 0..grid.cols {
                for y in 0..grid.rows {
                    let idx = grid.index_at(x, y).unwrap();
                    assert!(!seen[idx], "index {idx} visited twice");
                    seen[idx] = true;
                    assert_eq!(grid.position_of(idx), Some((x, y)));
                }
            }
            assert!(seen.iter().all(|v| *v));
        }
    }
}
