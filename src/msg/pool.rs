//! Fixed-capacity, reference-counted pooled allocators (`spec.md` §4.1).
//!
//! Each message/buffer type gets its own [`Pool<T>`]: a preallocated array of cells
//! handed out as [`PoolHandle<T>`]s. `AddRef`/`RemoveRef` are lock-free atomic
//! operations on the cell's refcount; the final `RemoveRef` calls [`Clearable::clear`]
//! to wipe invariant-relevant state and returns the cell to the free list. Allocation
//! blocks the caller when the pool is exhausted — back-pressure, not an error, per
//! `spec.md` §4.1 and §7.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

/// Implemented by every pooled payload type. `clear` resets fields a reused cell must
/// not leak between allocations (mirrors the source's virtual `Clear()` hook).
pub trait Clearable: Default {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

struct Cell<T> {
    /// Lock-free reference count; 0 means the cell is on the free list.
    refcount: AtomicU32,
    payload: Mutex<T>,
}

struct PoolInner<T: Clearable> {
    name: &'static str,
    cells_total: usize,
    free: Mutex<VecDeque<Arc<Cell<T>>>>,
    not_empty: Condvar,
    cells_used: AtomicUsize,
    cells_used_max: AtomicUsize,
}

/// A fixed-capacity pool of `T` cells.
pub struct Pool<T: Clearable> {
    inner: Arc<PoolInner<T>>,
}

/// Current/peak usage of a pool, exposed via [`Pool::memory`] for the `memory`
/// introspection query of `spec.md` §4.1.
#[derive(Debug, Clone, Copy)]
pub struct PoolMemory {
    pub cells_total: usize,
    pub cells_used: usize,
    pub cells_used_max: usize,
}

impl<T: Clearable> Pool<T> {
    /// Preallocates `num_cells` cells and pushes them all onto the free list.
    pub fn new(name: &'static str, num_cells: usize) -> Self {
        let mut free = VecDeque::with_capacity(num_cells);
        for _ in 0..num_cells {
            free.push_back(Arc::new(Cell {
                refcount: AtomicU32::new(0),
                payload: Mutex::new(T::default()),
            }));
        }
        Self {
            inner: Arc::new(PoolInner {
                name,
                cells_total: num_cells,
                free: Mutex::new(free),
                not_empty: Condvar::new(),
                cells_used: AtomicUsize::new(0),
                cells_used_max: AtomicUsize::new(0),
            }),
        }
    }

    /// Dequeues a cell (blocking if the pool is exhausted), resets its refcount to 1,
    /// runs `init` against the (already-cleared) payload, and returns a handle.
    pub fn allocate(&self, init: impl FnOnce(&mut T)) -> PoolHandle<T> {
        let cell = {
            let mut free = self.inner.free.lock().unwrap();
            loop {
                if let Some(cell) = free.pop_front() {
                    break cell;
                }
                tracing::warn!(pool = self.inner.name, "pool exhausted, blocking allocator");
                free = self.inner.not_empty.wait(free).unwrap();
            }
        };
        debug_assert_eq!(cell.refcount.load(Ordering::Acquire), 0, "allocated a cell still in use");
        cell.refcount.store(1, Ordering::Release);
        init(&mut cell.payload.lock().unwrap());
        let used = self.inner.cells_used.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.cells_used_max.fetch_max(used, Ordering::Relaxed);
        PoolHandle {
            cell,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Current and peak pool occupancy. Counts may be slightly stale (`spec.md` §5).
    pub fn memory(&self) -> PoolMemory {
        PoolMemory {
            cells_total: self.inner.cells_total,
            cells_used: self.inner.cells_used.load(Ordering::Relaxed),
            cells_used_max: self.inner.cells_used_max.load(Ordering::Relaxed),
        }
    }
}

/// A reference-counted handle to a pooled cell. Cloning is `AddRef`; dropping the last
/// handle is `RemoveRef` and returns the cell to its pool.
pub struct PoolHandle<T: Clearable> {
    cell: Arc<Cell<T>>,
    pool: Weak<PoolInner<T>>,
}

impl<T: Clearable> PoolHandle<T> {
    /// Current reference count.
    pub fn ref_count(&self) -> u32 {
        self.cell.refcount.load(Ordering::Acquire)
    }

    /// Runs `f` against the payload. Locking here guards concurrent field access, not
    /// the refcount itself (which stays lock-free).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.payload.lock().unwrap())
    }

    /// As [`with`](Self::with), but allows mutation. Only the logical owner of a
    /// message should call this; once queued, a message must be treated as immutable
    /// (`spec.md` §5).
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.cell.payload.lock().unwrap())
    }

    /// `true` if `self` and `other` are handles to the same cell.
    pub fn points_to_same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// A stable identity for this cell, usable to detect whether the same message has
    /// been enqueued twice (`spec.md` §4.1 invariant: a message in a queue has refcount
    /// ≥ 1; double-queueing the same message is forbidden and asserts).
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }

    fn release(&mut self) {
        if self.cell.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.cell.payload.lock().unwrap().clear();
            if let Some(pool) = self.pool.upgrade() {
                pool.free.lock().unwrap().push_back(Arc::clone(&self.cell));
                pool.cells_used.fetch_sub(1, Ordering::Relaxed);
                pool.not_empty.notify_one();
            }
        }
    }
}

impl<T: Clearable> Clone for PoolHandle<T> {
    /// `AddRef`.
    fn clone(&self) -> Self {
        let prev = self.cell.refcount.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "AddRef on a cell that was already free");
        Self {
            cell: Arc::clone(&self.cell),
            pool: self.pool.clone(),
        }
    }
}

impl<T: Clearable> Drop for PoolHandle<T> {
    /// `RemoveRef`.
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(u32);
    impl Clearable for Counter {}

    #[test]
    fn allocate_sets_refcount_to_one() {
        let pool: Pool<Counter> = Pool::new("test", 2);
        let handle = pool.allocate(|c| c.0 = 42);
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(handle.with(|c| c.0), 42);
    }

    #[test]
    fn addref_removeref_returns_exactly_one_cell() {
        let pool: Pool<Counter> = Pool::new("test", 1);
        assert_eq!(pool.memory().cells_used, 0);
        let handle = pool.allocate(|c| c.0 = 1);
        let clone1 = handle.clone();
        let clone2 = handle.clone();
        assert_eq!(pool.memory().cells_used, 1);
        drop(clone1);
        drop(clone2);
        assert_eq!(pool.memory().cells_used, 1);
        drop(handle);
        assert_eq!(pool.memory().cells_used, 0);
    }

    #[test]
    fn reused_cell_is_cleared() {
        let pool: Pool<Counter> = Pool::new("test", 1);
        let handle = pool.allocate(|c| c.0 = 99);
        drop(handle);
        let handle2 = pool.allocate(|_| {});
        assert_eq!(handle2.with(|c| c.0), 0);
    }

    #[test]
    fn exhaustion_blocks_until_a_cell_is_freed() {
        use std::sync::Arc as StdArc;
        use std::thread;
        use std::time::Duration;

        let pool: StdArc<Pool<Counter>> = StdArc::new(Pool::new("test", 2));
        let h1 = pool.allocate(|_| {});
        let h2 = pool.allocate(|_| {});

        let pool2 = StdArc::clone(&pool);
        let done = StdArc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = StdArc::clone(&done);
        let handle = thread::spawn(move || {
            let _h3 = pool2.allocate(|_| {});
            done2.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst), "allocate should still be blocked");

        drop(h1);
        handle.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        drop(h2);
    }
}
