//! Tile planning: slicing stepped 1D/2D/3D iteration spaces into tiles the
//! pool can dispatch, and mapping tile indices back to per-axis sub-ranges.
//!
//! The default sizing heuristics parallelize the outer axis first and fall
//! back to slicing inner axes only when the outer one is too narrow to feed
//! every target tile.

use crate::pool::TilePool;
use crate::SINGLE_THREAD_COST_CUTOFF;

/// Number of stepped items in `[start, end)`. Requires `start < end`.
fn axis_items(start: usize, end: usize, step: usize) -> usize {
    1 + (end - start - 1) / step
}

fn tile_count(items: usize, tile_size: usize) -> usize {
    items.div_ceil(tile_size)
}

/// Whether the whole space is cheap enough to run inline on the submitter.
/// A negative cost estimate disables the shortcut.
fn below_parallel_cutoff(items: usize, cost_per_item: isize) -> bool {
    cost_per_item >= 0
        && items.saturating_mul(cost_per_item as usize) < SINGLE_THREAD_COST_CUTOFF
}

fn default_tile_size_1d(items: usize, target_tiles: usize) -> usize {
    (items / target_tiles).max(1)
}

fn default_tile_sizes_2d(items0: usize, items1: usize, target_tiles: usize) -> (usize, usize) {
    if items0 >= target_tiles {
        (items0 / target_tiles, items1)
    } else {
        (1, (items0 * items1 / target_tiles).max(1))
    }
}

fn default_tile_sizes_3d(
    items0: usize,
    items1: usize,
    items2: usize,
    target_tiles: usize,
) -> (usize, usize, usize) {
    if items0 >= target_tiles {
        return (items0 / target_tiles, items1, items2);
    }
    let items01 = items0 * items1;
    if items01 >= target_tiles {
        (1, items01 / target_tiles, items2)
    } else {
        (1, 1, (items01 * items2 / target_tiles).max(1))
    }
}

impl TilePool {
    /// Runs `body(tile_start, tile_end, step)` over `[start, end)`.
    ///
    /// A `tile_size` of 0 picks a size targeting the pool's default tile
    /// count. When the estimated total cost is under the inline cutoff the
    /// body runs once on the calling thread with the full range; pass a
    /// negative `cost_per_item` to force parallel dispatch.
    pub fn compute_1d<F>(
        &self,
        body: F,
        start: usize,
        end: usize,
        step: usize,
        tile_size: usize,
        cost_per_item: isize,
    ) where
        F: Fn(usize, usize, usize) + Sync,
    {
        if start >= end {
            return;
        }

        let items = axis_items(start, end, step);
        if self.thread_count() <= 1 || below_parallel_cutoff(items, cost_per_item) {
            body(start, end, step);
            return;
        }

        let tile_size = if tile_size == 0 {
            default_tile_size_1d(items, self.default_tile_count())
        } else {
            tile_size
        };
        let step_tile = step * tile_size;

        self.run(
            |tile_idx| {
                let tile_start = start + tile_idx * step_tile;
                let tile_end = (tile_start + step_tile).min(end);
                body(tile_start, tile_end, step);
            },
            tile_count(items, tile_size),
        );
    }

    /// Runs `body(s0, e0, st0, s1, e1, st1)` over two stepped axes.
    ///
    /// Tile sizes of 0 are replaced together by the default sizing; the
    /// inline shortcut works as in [`compute_1d`](Self::compute_1d) with the
    /// cost taken over the whole 2D space.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_2d<F>(
        &self,
        body: F,
        start0: usize,
        end0: usize,
        step0: usize,
        start1: usize,
        end1: usize,
        step1: usize,
        tile_size0: usize,
        tile_size1: usize,
        cost_per_item: isize,
    ) where
        F: Fn(usize, usize, usize, usize, usize, usize) + Sync,
    {
        if start0 >= end0 || start1 >= end1 {
            return;
        }

        let items0 = axis_items(start0, end0, step0);
        let items1 = axis_items(start1, end1, step1);
        if self.thread_count() <= 1 || below_parallel_cutoff(items0 * items1, cost_per_item) {
            body(start0, end0, step0, start1, end1, step1);
            return;
        }

        let (tile_size0, tile_size1) = if tile_size0 == 0 || tile_size1 == 0 {
            default_tile_sizes_2d(items0, items1, self.default_tile_count())
        } else {
            (tile_size0, tile_size1)
        };

        let step_tile0 = step0 * tile_size0;
        let step_tile1 = step1 * tile_size1;
        let tile_count0 = tile_count(items0, tile_size0);
        let tile_count1 = tile_count(items1, tile_size1);

        self.run(
            |tile_idx| {
                let tile_idx0 = tile_idx / tile_count1;
                let tile_idx1 = tile_idx - tile_idx0 * tile_count1;
                let tile_start0 = start0 + tile_idx0 * step_tile0;
                let tile_end0 = (tile_start0 + step_tile0).min(end0);
                let tile_start1 = start1 + tile_idx1 * step_tile1;
                let tile_end1 = (tile_start1 + step_tile1).min(end1);
                body(tile_start0, tile_end0, step0, tile_start1, tile_end1, step1);
            },
            tile_count0 * tile_count1,
        );
    }

    /// Runs `body(s0, e0, st0, s1, e1, st1, s2, e2, st2)` over three stepped
    /// axes, slicing outer axes first when sizing defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_3d<F>(
        &self,
        body: F,
        start0: usize,
        end0: usize,
        step0: usize,
        start1: usize,
        end1: usize,
        step1: usize,
        start2: usize,
        end2: usize,
        step2: usize,
        tile_size0: usize,
        tile_size1: usize,
        tile_size2: usize,
        cost_per_item: isize,
    ) where
        F: Fn(usize, usize, usize, usize, usize, usize, usize, usize, usize) + Sync,
    {
        if start0 >= end0 || start1 >= end1 || start2 >= end2 {
            return;
        }

        let items0 = axis_items(start0, end0, step0);
        let items1 = axis_items(start1, end1, step1);
        let items2 = axis_items(start2, end2, step2);
        if self.thread_count() <= 1
            || below_parallel_cutoff(items0 * items1 * items2, cost_per_item)
        {
            body(start0, end0, step0, start1, end1, step1, start2, end2, step2);
            return;
        }

        let (tile_size0, tile_size1, tile_size2) =
            if tile_size0 == 0 || tile_size1 == 0 || tile_size2 == 0 {
                default_tile_sizes_3d(items0, items1, items2, self.default_tile_count())
            } else {
                (tile_size0, tile_size1, tile_size2)
            };

        let step_tile0 = step0 * tile_size0;
        let step_tile1 = step1 * tile_size1;
        let step_tile2 = step2 * tile_size2;
        let tile_count0 = tile_count(items0, tile_size0);
        let tile_count1 = tile_count(items1, tile_size1);
        let tile_count2 = tile_count(items2, tile_size2);
        let tile_count12 = tile_count1 * tile_count2;

        self.run(
            |tile_idx| {
                let tile_idx0 = tile_idx / tile_count12;
                let tile_idx12 = tile_idx - tile_idx0 * tile_count12;
                let tile_idx1 = tile_idx12 / tile_count2;
                let tile_idx2 = tile_idx12 - tile_idx1 * tile_count2;
                let tile_start0 = start0 + tile_idx0 * step_tile0;
                let tile_end0 = (tile_start0 + step_tile0).min(end0);
                let tile_start1 = start1 + tile_idx1 * step_tile1;
                let tile_end1 = (tile_start1 + step_tile1).min(end1);
                let tile_start2 = start2 + tile_idx2 * step_tile2;
                let tile_end2 = (tile_start2 + step_tile2).min(end2);
                body(
                    tile_start0, tile_end0, step0, tile_start1, tile_end1, step1, tile_start2,
                    tile_end2, step2,
                );
            },
            tile_count0 * tile_count12,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_items_counts_stepped_range() {
        assert_eq!(axis_items(0, 10, 1), 10);
        assert_eq!(axis_items(0, 10, 3), 4);
        assert_eq!(axis_items(0, 9, 3), 3);
        assert_eq!(axis_items(5, 6, 10), 1);
    }

    #[test]
    fn test_tile_count_rounds_up() {
        assert_eq!(tile_count(100, 37), 3);
        assert_eq!(tile_count(100, 100), 1);
        assert_eq!(tile_count(1, 4), 1);
    }

    #[test]
    fn test_inline_cutoff() {
        assert!(below_parallel_cutoff(99, 1));
        assert!(!below_parallel_cutoff(100, 1));
        assert!(below_parallel_cutoff(0, 0));
        // Negative cost always dispatches.
        assert!(!below_parallel_cutoff(1, -1));
    }

    #[test]
    fn test_default_tile_size_1d() {
        assert_eq!(default_tile_size_1d(1000, 8), 125);
        // Fewer items than target tiles degenerates to single-item tiles.
        assert_eq!(default_tile_size_1d(3, 8), 1);
    }

    #[test]
    fn test_default_tile_sizes_2d_wide_outer_axis() {
        assert_eq!(default_tile_sizes_2d(64, 100, 8), (8, 100));
    }

    #[test]
    fn test_default_tile_sizes_2d_narrow_outer_axis() {
        // items0 = 3 < 8 target tiles, so rows split the inner axis:
        // tile_size1 = 3 * 100 / 8 = 37, giving 3 x 3 = 9 tiles.
        let (tile_size0, tile_size1) = default_tile_sizes_2d(3, 100, 8);
        assert_eq!((tile_size0, tile_size1), (1, 37));
        assert_eq!(tile_count(3, tile_size0), 3);
        assert_eq!(tile_count(100, tile_size1), 3);
    }

    #[test]
    fn test_default_tile_sizes_3d_branches() {
        assert_eq!(default_tile_sizes_3d(64, 5, 7, 8), (8, 5, 7));
        assert_eq!(default_tile_sizes_3d(2, 12, 7, 8), (1, 3, 7));
        assert_eq!(default_tile_sizes_3d(2, 2, 40, 8), (1, 1, 20));
        // All axes tiny: never produce a zero tile size.
        assert_eq!(default_tile_sizes_3d(1, 1, 1, 8), (1, 1, 1));
    }
}
