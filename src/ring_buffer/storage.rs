//! Aligned, zero-initialised byte region backing a ring buffer.
//!
//! The region is touched once at allocation (zeroed) so the audio thread never
//! takes a first-touch page fault. Bytes are stored as `AtomicU8` and accessed
//! with relaxed ordering: the cursors carry all cross-thread ordering, and the
//! policy-governed overlap between an evicting writer and a late reader stays
//! a benign race instead of undefined behaviour.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::{AudioRingError, Result};

/// Alignment of the storage region in bytes (one cache line, wide enough for SIMD copies)
pub const STORAGE_ALIGN: usize = 64;

pub(crate) struct Storage {
    ptr: NonNull<AtomicU8>,
    len: usize,
}

// SAFETY: the region is exclusively owned by `Storage` and only ever accessed
// through `AtomicU8`, which is itself `Sync`.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocate `len` zeroed bytes aligned to [`STORAGE_ALIGN`].
    pub(crate) fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(AudioRingError::InvalidCapacity(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }

        let layout = Layout::from_size_align(len, STORAGE_ALIGN)
            .map_err(|e| AudioRingError::InvalidCapacity(format!("{len} bytes: {e}")))?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };

        // Zeroed memory is a valid `AtomicU8(0)`, which has the layout of `u8`.
        let ptr = NonNull::new(raw.cast::<AtomicU8>())
            .ok_or(AudioRingError::AllocationFailed { bytes: len })?;

        Ok(Storage { ptr, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn cells(&self) -> &[AtomicU8] {
        // SAFETY: ptr is valid for `len` initialised cells for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `src` into the region starting at `offset`, wrapping past the end.
    ///
    /// `offset` must be in bounds and `src` no longer than the region.
    pub(crate) fn copy_in(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset < self.len && src.len() <= self.len);

        let cells = self.cells();
        let first = src.len().min(self.len - offset);
        store_bytes(&cells[offset..offset + first], &src[..first]);
        store_bytes(&cells[..src.len() - first], &src[first..]);
    }

    /// Copy bytes starting at `offset` into `dst`, wrapping past the end.
    pub(crate) fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset < self.len && dst.len() <= self.len);

        let cells = self.cells();
        let first = dst.len().min(self.len - offset);
        let (head, tail) = dst.split_at_mut(first);
        load_bytes(&cells[offset..offset + first], head);
        load_bytes(&cells[..tail.len()], tail);
    }
}

fn store_bytes(dst: &[AtomicU8], src: &[u8]) {
    for (cell, &byte) in dst.iter().zip(src) {
        cell.store(byte, Ordering::Relaxed);
    }
}

fn load_bytes(src: &[AtomicU8], dst: &mut [u8]) {
    for (byte, cell) in dst.iter_mut().zip(src) {
        *byte = cell.load(Ordering::Relaxed);
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // SAFETY: same size and alignment that `zeroed` validated and allocated with.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len, STORAGE_ALIGN);
            alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), layout);
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_is_zeroed_and_aligned() {
        let storage = Storage::zeroed(256).unwrap();
        assert_eq!(storage.len(), 256);
        assert_eq!(storage.ptr.as_ptr() as usize % STORAGE_ALIGN, 0);

        let mut out = [0xAAu8; 256];
        storage.copy_out(0, &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            Storage::zeroed(0),
            Err(AudioRingError::InvalidCapacity(_))
        ));
    }

    #[test]
    fn test_copy_wraps_past_end() {
        let storage = Storage::zeroed(8).unwrap();
        storage.copy_in(6, &[1, 2, 3, 4]);

        let mut all = [0u8; 8];
        storage.copy_out(0, &mut all);
        assert_eq!(all, [3, 4, 0, 0, 0, 0, 1, 2]);

        let mut wrapped = [0u8; 4];
        storage.copy_out(6, &mut wrapped);
        assert_eq!(wrapped, [1, 2, 3, 4]);
    }
}
