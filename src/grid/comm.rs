//! Blocking collectives between the processes of a grid.
//!
//! Processes are threads of the same OS process. A communicator is a group of them with ranks
//! `0..size`; every collective must be entered by all members, in the same order, exactly like
//! its MPI counterpart. Payloads travel through a slot per member: each member deposits its
//! contribution, a barrier publishes the slots, members read what they need and a second
//! barrier makes the slots reusable.

use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// World-wide abort state.
///
/// Set by the first process that panics. Processes waiting in (or later entering) a collective
/// observe it and panic as well, so that no member of the grid waits forever.
#[derive(Debug, Default)]
pub(crate) struct Abort {
    flag: AtomicBool,
    first: Mutex<Option<usize>>,
}

impl Abort {
    pub(crate) fn raise(&self, world_rank: usize) {
        let mut first = lock(&self.first);
        if first.is_none() {
            log::error!(target: "plaid_grid", "process {world_rank} panicked, aborting the grid");
            *first = Some(world_rank);
        }
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn first(&self) -> Option<usize> {
        *lock(&self.first)
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: usize,
}

pub(crate) struct CommShared {
    /// World ranks of the members, indexed by their rank in this communicator.
    members: Vec<usize>,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
    barrier: Mutex<BarrierState>,
    cvar: Condvar,
    abort: Arc<Abort>,
}

impl CommShared {
    pub(crate) fn new(members: Vec<usize>, abort: Arc<Abort>) -> Arc<Self> {
        let size = members.len();
        Arc::new(Self {
            members,
            slots: Mutex::new((0..size).map(|_| None).collect()),
            barrier: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
            abort,
        })
    }
}

/// Handle of one process on a communicator.
#[derive(Clone)]
pub struct Comm {
    rank: usize,
    shared: Arc<CommShared>,
}

impl core::fmt::Debug for Comm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Comm")
            .field("rank", &self.rank)
            .field("members", &self.shared.members)
            .finish()
    }
}

#[track_caller]
fn aborted() -> ! {
    panic!("collective aborted: another process of the grid panicked")
}

impl Comm {
    pub(crate) fn new(rank: usize, shared: Arc<CommShared>) -> Self {
        Self { rank, shared }
    }

    /// Rank of the calling process in this communicator.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of processes in this communicator.
    #[inline]
    pub fn size(&self) -> usize {
        self.shared.members.len()
    }

    /// Returns `true` if both communicators have the same members, in the same order.
    pub fn congruent(&self, other: &Comm) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) || self.shared.members == other.shared.members
    }

    /// Returns `true` if both handles refer to the same communicator.
    #[inline]
    pub(crate) fn same_group(&self, other: &Comm) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Blocks until every member of the communicator has entered the barrier.
    ///
    /// # Panics
    /// Panics if the grid was aborted.
    pub fn barrier(&self) {
        let shared = &*self.shared;
        if shared.abort.is_raised() {
            aborted();
        }
        if self.size() == 1 {
            return;
        }

        let mut state = lock(&shared.barrier);
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size() {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            shared.cvar.notify_all();
            return;
        }
        while state.generation == generation {
            if shared.abort.is_raised() {
                drop(state);
                aborted();
            }
            state = shared
                .cvar
                .wait_timeout(state, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn deposit<T: Send + 'static>(&self, value: T) {
        lock(&self.shared.slots)[self.rank] = Some(Box::new(value));
    }

    fn with_slot<T: 'static, R>(&self, src: usize, f: impl FnOnce(&mut T) -> R) -> R {
        let mut slots = lock(&self.shared.slots);
        match slots[src].as_mut().and_then(|slot| slot.downcast_mut::<T>()) {
            Some(value) => f(value),
            None => panic!(
                "collective mismatch: rank {src} did not contribute a `{}`",
                core::any::type_name::<T>(),
            ),
        }
    }

    /// Copies `value` from `root` to every member.
    pub fn broadcast<T: Clone + Send + 'static>(&self, root: usize, value: &mut T) {
        crate::assert!(root < self.size());
        if self.size() == 1 {
            return;
        }
        if self.rank == root {
            self.deposit(value.clone());
        }
        self.barrier();
        if self.rank != root {
            *value = self.with_slot(root, |v: &mut T| v.clone());
        }
        self.barrier();
    }

    /// Returns the contributions of all members, indexed by rank.
    pub fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Vec<T> {
        if self.size() == 1 {
            return vec![value];
        }
        self.deposit(value);
        self.barrier();
        let gathered = (0..self.size())
            .map(|src| self.with_slot(src, |v: &mut T| v.clone()))
            .collect();
        self.barrier();
        gathered
    }

    /// Combines the contributions of all members with `op`, folding them in rank order, and
    /// returns the result to every member.
    ///
    /// Every member computes the same fold, so the result is bitwise identical on all of them.
    pub fn all_reduce<T: Clone + Send + 'static>(&self, value: T, op: impl Fn(T, T) -> T) -> T {
        let mut values = self.all_gather(value).into_iter();
        let mut acc = match values.next() {
            Some(first) => first,
            None => unreachable!(),
        };
        for v in values {
            acc = op(acc, v);
        }
        acc
    }

    /// Same as [`Comm::all_reduce`], but only `root` receives the result.
    pub fn reduce<T: Clone + Send + 'static>(
        &self,
        root: usize,
        value: T,
        op: impl Fn(T, T) -> T,
    ) -> Option<T> {
        crate::assert!(root < self.size());
        if self.size() == 1 {
            return Some(value);
        }
        self.deposit(value);
        self.barrier();
        let result = if self.rank == root {
            let mut acc = self.with_slot(0, |v: &mut T| v.clone());
            for src in 1..self.size() {
                acc = op(acc, self.with_slot(src, |v: &mut T| v.clone()));
            }
            Some(acc)
        } else {
            None
        };
        self.barrier();
        result
    }

    /// Personalized all-to-all exchange: `send[dst]` is delivered to `dst`, and the returned
    /// vector holds at index `src` what `src` sent to the caller.
    ///
    /// # Panics
    /// Panics if `send.len() != self.size()`.
    #[track_caller]
    pub fn all_to_all_v<T: Send + 'static>(&self, mut send: Vec<Vec<T>>) -> Vec<Vec<T>> {
        crate::assert!(send.len() == self.size());
        if self.size() == 1 {
            return send;
        }
        let own = core::mem::take(&mut send[self.rank]);
        self.deposit(send);
        self.barrier();
        let me = self.rank;
        let recv = (0..self.size())
            .map(|src| {
                if src == me {
                    Vec::new()
                } else {
                    self.with_slot(src, |v: &mut Vec<Vec<T>>| core::mem::take(&mut v[me]))
                }
            })
            .collect::<Vec<_>>();
        self.barrier();
        let mut recv = recv;
        recv[me] = own;
        recv
    }
}
