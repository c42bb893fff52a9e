//! Integration tests for the tile planners: coverage, stepping, defaults,
//! and the single-thread shortcut.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tilepool::{AffinityPolicy, TilePool};

fn grid(n: usize) -> Vec<AtomicUsize> {
    (0..n).map(|_| AtomicUsize::new(0)).collect()
}

fn assert_all_once(cells: &[AtomicUsize]) {
    for (i, cell) in cells.iter().enumerate() {
        assert_eq!(cell.load(Ordering::Relaxed), 1, "cell {i}");
    }
}

#[test]
fn test_compute_1d_covers_unit_step_range() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    const N: usize = 1000;
    let cells = grid(N);
    pool.compute_1d(
        |start, end, step| {
            for i in (start..end).step_by(step) {
                cells[i].fetch_add(1, Ordering::Relaxed);
            }
        },
        0,
        N,
        1,
        0,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_1d_covers_strided_range() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let (start, end, step) = (5usize, 1000usize, 3usize);
    let items = 1 + (end - start - 1) / step;
    let cells = grid(items);
    pool.compute_1d(
        |tile_start, tile_end, tile_step| {
            assert_eq!(tile_step, step);
            assert!(tile_start >= start && tile_end <= end);
            for i in (tile_start..tile_end).step_by(tile_step) {
                cells[(i - start) / step].fetch_add(1, Ordering::Relaxed);
            }
        },
        start,
        end,
        step,
        0,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_1d_explicit_tile_size_bounds_tiles() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    const N: usize = 30;
    const TILE: usize = 7;
    let cells = grid(N);
    pool.compute_1d(
        |start, end, step| {
            assert!(end - start <= TILE);
            for i in (start..end).step_by(step) {
                cells[i].fetch_add(1, Ordering::Relaxed);
            }
        },
        0,
        N,
        1,
        TILE,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_1d_cheap_range_runs_inline() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let caller = thread::current().id();
    let calls = AtomicUsize::new(0);
    // 50 items at cost 1 sits under the dispatch cutoff.
    pool.compute_1d(
        |start, end, step| {
            assert_eq!((start, end, step), (0, 50, 1));
            assert_eq!(thread::current().id(), caller);
            calls.fetch_add(1, Ordering::Relaxed);
        },
        0,
        50,
        1,
        0,
        1,
    );
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_compute_1d_negative_cost_forces_dispatch() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let calls = AtomicUsize::new(0);
    pool.compute_1d(
        |_, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
        0,
        8,
        1,
        1, // one item per tile
        -1,
    );
    let expected = if pool.thread_count() > 1 { 8 } else { 1 };
    assert_eq!(calls.load(Ordering::Relaxed), expected);
}

#[test]
fn test_compute_1d_empty_range_is_a_no_op() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let calls = AtomicUsize::new(0);
    pool.compute_1d(
        |_, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
        10,
        10,
        1,
        0,
        -1,
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_compute_2d_covers_strided_grid() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let (start0, end0, step0) = (1usize, 15usize, 2usize);
    let (start1, end1, step1) = (0usize, 39usize, 3usize);
    let items0 = 1 + (end0 - start0 - 1) / step0;
    let items1 = 1 + (end1 - start1 - 1) / step1;
    let cells = grid(items0 * items1);

    pool.compute_2d(
        |s0, e0, st0, s1, e1, st1| {
            assert!(s0 >= start0 && e0 <= end0 && st0 == step0);
            assert!(s1 >= start1 && e1 <= end1 && st1 == step1);
            for i0 in (s0..e0).step_by(st0) {
                for i1 in (s1..e1).step_by(st1) {
                    let cell = (i0 - start0) / step0 * items1 + (i1 - start1) / step1;
                    cells[cell].fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        start0,
        end0,
        step0,
        start1,
        end1,
        step1,
        0,
        0,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_2d_empty_axis_is_a_no_op() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let calls = AtomicUsize::new(0);
    pool.compute_2d(
        |_, _, _, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
        0,
        10,
        1,
        5,
        5,
        1,
        0,
        0,
        -1,
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_compute_3d_covers_grid() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let (items0, items1, items2) = (3usize, 4usize, 5usize);
    let cells = grid(items0 * items1 * items2);

    pool.compute_3d(
        |s0, e0, st0, s1, e1, st1, s2, e2, st2| {
            for i0 in (s0..e0).step_by(st0) {
                for i1 in (s1..e1).step_by(st1) {
                    for i2 in (s2..e2).step_by(st2) {
                        let cell = (i0 * items1 + i1) * items2 + i2;
                        cells[cell].fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        },
        0,
        items0,
        1,
        0,
        items1,
        1,
        0,
        items2,
        1,
        0,
        0,
        0,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_3d_depth_axis_beyond_inner_axis_still_runs() {
    // The depth range starting past the inner axis's end is still a valid
    // iteration space; only its own emptiness may skip the dispatch.
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let cells = grid(2 * 2 * 4);
    pool.compute_3d(
        |s0, e0, st0, s1, e1, st1, s2, e2, st2| {
            for i0 in (s0..e0).step_by(st0) {
                for i1 in (s1..e1).step_by(st1) {
                    for i2 in (s2..e2).step_by(st2) {
                        let cell = (i0 * 2 + i1) * 4 + (i2 - 5);
                        cells[cell].fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        },
        0,
        2,
        1,
        0,
        2,
        1,
        5, // starts past end1 == 2
        9,
        1,
        0,
        0,
        0,
        -1,
    );
    assert_all_once(&cells);
}

#[test]
fn test_compute_3d_empty_depth_axis_is_a_no_op() {
    let mut pool = TilePool::new(4, AffinityPolicy::None);
    pool.init();

    let calls = AtomicUsize::new(0);
    pool.compute_3d(
        |_, _, _, _, _, _, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        },
        0,
        2,
        1,
        0,
        2,
        1,
        7,
        7,
        1,
        0,
        0,
        0,
        -1,
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}
