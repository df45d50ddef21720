//! Two-dimensional process grids.
//!
//! A grid of height `r` and width `c` arranges `p = r * c` processes in column-major order: the
//! process at grid coordinates `(row, col)` has world rank `row + col * r`, which is also its
//! rank in the `VC` communicator. The `VR` communicator orders the same processes row-major
//! (rank `col + row * c`).
//!
//! | communicator | members                  | rank of `(row, col)` |
//! |--------------|--------------------------|----------------------|
//! | `col_comm`   | processes of grid column | `row`                |
//! | `row_comm`   | processes of grid row    | `col`                |
//! | `vc_comm`    | all                      | `row + col * r`      |
//! | `vr_comm`    | all                      | `col + row * c`      |
//! | `self_comm`  | the caller               | `0`                  |

mod comm;

pub use comm::Comm;

use crate::assert;
use comm::{lock, Abort, CommShared};
use std::{
    any::Any,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

/// The view one process has of the process grid it belongs to.
///
/// Cloning a `Grid` is cheap: the clone shares the communicators of the original.
#[derive(Clone, Debug)]
pub struct Grid {
    height: usize,
    width: usize,
    row: usize,
    col: usize,
    col_comm: Comm,
    row_comm: Comm,
    vc_comm: Comm,
    vr_comm: Comm,
    self_comm: Comm,
}

impl Grid {
    /// Runs `f` on every process of a `height x width` grid and returns the results, indexed by
    /// world (`VC`) rank.
    ///
    /// Each process is a scoped thread. If one of them panics, the others are aborted at their
    /// next collective and the first panic is propagated to the caller.
    ///
    /// # Panics
    /// Panics if `height` or `width` is zero.
    #[track_caller]
    pub fn run<R: Send>(height: usize, width: usize, f: impl Fn(&Grid) -> R + Sync) -> Vec<R> {
        assert!(all(height > 0, width > 0));
        let size = height * width;
        let abort = Arc::new(Abort::default());

        let vc = CommShared::new((0..size).collect(), abort.clone());
        let vr = CommShared::new(
            (0..size)
                .map(|vr_rank| {
                    let (row, col) = (vr_rank / width, vr_rank % width);
                    row + col * height
                })
                .collect(),
            abort.clone(),
        );
        let cols = (0..width)
            .map(|col| {
                let members = (0..height).map(|row| row + col * height).collect();
                CommShared::new(members, abort.clone())
            })
            .collect::<Vec<_>>();
        let rows = (0..height)
            .map(|row| {
                let members = (0..width).map(|col| row + col * height).collect();
                CommShared::new(members, abort.clone())
            })
            .collect::<Vec<_>>();

        let grids = (0..size)
            .map(|rank| {
                let (row, col) = (rank % height, rank / height);
                Grid {
                    height,
                    width,
                    row,
                    col,
                    col_comm: Comm::new(row, cols[col].clone()),
                    row_comm: Comm::new(col, rows[row].clone()),
                    vc_comm: Comm::new(rank, vc.clone()),
                    vr_comm: Comm::new(col + row * width, vr.clone()),
                    self_comm: Comm::new(0, CommShared::new(vec![rank], abort.clone())),
                }
            })
            .collect::<Vec<_>>();

        let payloads: Mutex<Vec<Option<Box<dyn Any + Send>>>> =
            Mutex::new((0..size).map(|_| None).collect());

        let results = std::thread::scope(|s| {
            let handles = grids
                .iter()
                .enumerate()
                .map(|(rank, grid)| {
                    let f = &f;
                    let abort = &abort;
                    let payloads = &payloads;
                    s.spawn(move || match catch_unwind(AssertUnwindSafe(|| f(grid))) {
                        Ok(r) => Some(r),
                        Err(payload) => {
                            abort.raise(rank);
                            lock(payloads)[rank] = Some(payload);
                            None
                        }
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().ok().flatten())
                .collect::<Vec<_>>()
        });

        if let Some(first) = abort.first() {
            let mut payloads = lock(&payloads);
            match payloads[first].take() {
                Some(payload) => resume_unwind(payload),
                None => panic!("process {first} panicked"),
            }
        }

        results
            .into_iter()
            .map(|r| match r {
                Some(r) => r,
                None => panic!("a grid process did not return"),
            })
            .collect()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of processes of the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    /// World rank of the calling process, equal to [`Grid::vc_rank`].
    #[inline]
    pub fn rank(&self) -> usize {
        self.vc_rank()
    }

    /// Grid row of the calling process.
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Grid column of the calling process.
    #[inline]
    pub fn col(&self) -> usize {
        self.col
    }

    #[inline]
    pub fn vc_rank(&self) -> usize {
        self.row + self.col * self.height
    }

    #[inline]
    pub fn vr_rank(&self) -> usize {
        self.col + self.row * self.width
    }

    /// Communicator of the processes sharing the caller's grid column (`MC`).
    #[inline]
    pub fn col_comm(&self) -> &Comm {
        &self.col_comm
    }

    /// Communicator of the processes sharing the caller's grid row (`MR`).
    #[inline]
    pub fn row_comm(&self) -> &Comm {
        &self.row_comm
    }

    #[inline]
    pub fn vc_comm(&self) -> &Comm {
        &self.vc_comm
    }

    #[inline]
    pub fn vr_comm(&self) -> &Comm {
        &self.vr_comm
    }

    #[inline]
    pub fn self_comm(&self) -> &Comm {
        &self.self_comm
    }

    /// Returns `true` if `self` and `other` describe the same process grid.
    pub fn same_as(&self, other: &Grid) -> bool {
        core::ptr::eq(self, other) || self.vc_comm.same_group(&other.vc_comm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn coordinates() {
        let coords = Grid::run(2, 3, |grid| {
            assert!(grid.size() == 6);
            assert!(grid.col_comm().size() == 2);
            assert!(grid.row_comm().size() == 3);
            assert!(grid.col_comm().rank() == grid.row());
            assert!(grid.row_comm().rank() == grid.col());
            assert!(grid.vr_comm().rank() == grid.vr_rank());
            (grid.row(), grid.col(), grid.vr_rank())
        });
        assert_eq!(
            coords,
            vec![
                (0, 0, 0),
                (1, 0, 3),
                (0, 1, 1),
                (1, 1, 4),
                (0, 2, 2),
                (1, 2, 5)
            ]
        );
    }

    #[test]
    fn collectives() {
        let out = Grid::run(2, 2, |grid| {
            let world = grid.vc_comm();
            let sum = world.all_reduce(world.rank() + 1, |a, b| a + b);

            let mut value = if grid.row() == 1 { grid.col() * 10 } else { 0 };
            grid.col_comm().broadcast(1, &mut value);

            let gathered = grid.row_comm().all_gather(grid.rank());

            let send = (0..world.size())
                .map(|dst| vec![(world.rank(), dst)])
                .collect::<Vec<_>>();
            let recv = world.all_to_all_v(send);
            for (src, msg) in recv.iter().enumerate() {
                assert!(msg == &vec![(src, world.rank())]);
            }

            let root = world.reduce(3, world.rank(), usize::max);
            world.barrier();
            (sum, value, gathered, root)
        });
        for (rank, (sum, value, gathered, root)) in out.into_iter().enumerate() {
            assert!(sum == 10);
            assert!(value == (rank / 2) * 10);
            assert!(gathered == vec![rank % 2, rank % 2 + 2]);
            assert!(root == if rank == 3 { Some(3) } else { None });
        }
    }

    #[test]
    fn congruence() {
        Grid::run(2, 2, |grid| {
            assert!(grid.vc_comm().congruent(grid.vc_comm()));
            assert!(!grid.vc_comm().congruent(grid.vr_comm()));
            assert!(grid.same_as(grid));
        });
        Grid::run(1, 1, |grid| {
            assert!(grid.vc_comm().congruent(grid.vr_comm()));
            assert!(grid.vc_comm().congruent(grid.self_comm()));
        });
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn panic_is_propagated() {
        Grid::run(2, 2, |grid| {
            if grid.rank() == 2 {
                panic!("boom");
            }
            grid.vc_comm().barrier();
        });
    }
}
