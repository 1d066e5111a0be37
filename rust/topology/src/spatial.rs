// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid index over bounding boxes for the whole-topology checks.
//!
//! Uses a grid-based spatial hash: every item is registered in each square
//! cell its box touches, and a query collects the items of the cells the
//! query box touches. The validator builds one over all edges so that
//! pairwise checks only look at neighbours.

use planar_topo_geometry::BBox;
use rustc_hash::{FxHashMap, FxHashSet};

/// Upper bound on the cells a single box is registered in.
const MAX_CELLS_PER_ITEM: i64 = 4096;

/// A spatial hash grid of item keys.
#[derive(Debug)]
pub struct SpatialGrid<K> {
    cell_size: f64,
    grid: FxHashMap<(i64, i64), Vec<K>>,
    /// Items too large to register cell by cell.
    oversized: Vec<K>,
}

impl<K: Copy + Eq + std::hash::Hash> SpatialGrid<K> {
    /// Creates an index with square cells of side `cell_size`.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            grid: FxHashMap::default(),
            oversized: Vec::new(),
        }
    }

    /// Picks a cell size giving about one item per cell over `extent`.
    pub fn for_extent(extent: &BBox, items: usize) -> Self {
        let side = extent.width().max(extent.height());
        let per_axis = (items.max(1) as f64).sqrt().ceil();
        Self::new(side / per_axis)
    }

    pub fn insert(&mut self, key: K, bbox: &BBox) {
        let ((x0, y0), (x1, y1)) = self.cell_range(bbox);
        if cell_count((x0, y0), (x1, y1)) > MAX_CELLS_PER_ITEM {
            self.oversized.push(key);
            return;
        }
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.grid.entry((cx, cy)).or_default().push(key);
            }
        }
    }

    /// Keys whose cells intersect `bbox`, each once, in insertion-cell
    /// order. Candidates only: boxes are not compared exactly.
    pub fn query(&self, bbox: &BBox) -> Vec<K> {
        let ((x0, y0), (x1, y1)) = self.cell_range(bbox);
        let mut seen: FxHashSet<K> = FxHashSet::default();
        let mut result = Vec::new();
        for &k in &self.oversized {
            if seen.insert(k) {
                result.push(k);
            }
        }
        if cell_count((x0, y0), (x1, y1)) > MAX_CELLS_PER_ITEM {
            // scanning the occupied cells is cheaper than walking the range
            for (&(cx, cy), keys) in &self.grid {
                if cx < x0 || cx > x1 || cy < y0 || cy > y1 {
                    continue;
                }
                for &k in keys {
                    if seen.insert(k) {
                        result.push(k);
                    }
                }
            }
            return result;
        }
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if let Some(keys) = self.grid.get(&(cx, cy)) {
                    for &k in keys {
                        if seen.insert(k) {
                            result.push(k);
                        }
                    }
                }
            }
        }
        result
    }

    fn cell_range(&self, bbox: &BBox) -> ((i64, i64), (i64, i64)) {
        (
            self.cell_coords(bbox.min_x, bbox.min_y),
            self.cell_coords(bbox.max_x, bbox.max_y),
        )
    }

    /// Cell indices saturate at the `i64` range for huge coordinates.
    fn cell_coords(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }
}

/// Cells in the inclusive range, saturating instead of overflowing.
fn cell_count((x0, y0): (i64, i64), (x1, y1): (i64, i64)) -> i64 {
    let span = |lo: i64, hi: i64| hi.saturating_sub(lo).saturating_add(1);
    span(x0, x1).saturating_mul(span(y0, y1))
}
