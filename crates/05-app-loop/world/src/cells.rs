//! Fixed-length storage written concurrently through disjoint slot ranges.

use std::cell::UnsafeCell;

pub(crate) struct SlotCells<T> {
    cells: Box<[UnsafeCell<T>]>,
}

impl<T: Copy + Default> SlotCells<T> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }
}

impl<T> SlotCells<T> {
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    /// Mutable view of `start..start + len` through a shared reference.
    ///
    /// # Safety
    ///
    /// The caller must hold the only reservation covering the range, and no
    /// `&mut self` borrow may be live while the returned slice is used.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn range_mut(&self, start: usize, len: usize) -> &mut [T] {
        let range = &self.cells[start..start + len];
        // SAFETY: `UnsafeCell<T>` is `repr(transparent)` over `T`, the range is
        // in bounds (checked by the slice index above) and the caller promises
        // exclusive access to it.
        unsafe { std::slice::from_raw_parts_mut(UnsafeCell::raw_get(range.as_ptr()), len) }
    }

    pub(crate) fn as_slice(&mut self) -> &[T] {
        self.as_mut_slice()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.cells.len();
        // SAFETY: `&mut self` rules out outstanding slot handles, and the cell
        // layout matches `T`.
        unsafe { std::slice::from_raw_parts_mut(UnsafeCell::raw_get(self.cells.as_ptr()), len) }
    }
}

// SAFETY: Elements are only reachable through `range_mut`, whose callers own
// disjoint ranges, or through `&mut self`. Sharing the container across threads
// therefore never produces aliasing mutable access.
unsafe impl<T: Send> Sync for SlotCells<T> {}
