//! Linear memory bridge: bounds-checked copies between host buffers and
//! module-relative offsets.
//!
//! The memory's data slice is re-resolved on every access. Nothing here keeps
//! a host pointer into linear memory across calls, since `memory.grow` may
//! move the backing allocation.

use std::ops::Range;

use replayhost_types::InvocationError;
use wasmtime::{Memory, SharedMemory, Store};

/// A module-relative region, stamped with the reset generation it was
/// obtained in. Regions from an older generation are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestRegion {
    pub offset: u32,
    pub len: u32,
    pub generation: u64,
}

impl GuestRegion {
    #[must_use]
    pub fn len_usize(&self) -> usize {
        self.len as usize
    }
}

/// Validate `offset + len` against `memory_size` without overflowing.
///
/// # Errors
///
/// Returns [`InvocationError::OutOfBounds`] when the range does not fit.
pub fn check_bounds(
    offset: u32,
    len: usize,
    memory_size: usize,
) -> Result<Range<usize>, InvocationError> {
    let start = offset as usize;
    match start.checked_add(len) {
        Some(end) if end <= memory_size => Ok(start..end),
        _ => Err(InvocationError::OutOfBounds {
            offset,
            len,
            memory_size,
        }),
    }
}

/// The module's linear memory, whether exported, imported, or shared.
#[derive(Clone)]
pub(crate) enum GuestMemory {
    Local(Memory),
    Shared(SharedMemory),
}

impl GuestMemory {
    pub(crate) fn size<T: 'static>(&self, store: &Store<T>) -> usize {
        match self {
            Self::Local(memory) => memory.data_size(store),
            Self::Shared(memory) => memory.data_size(),
        }
    }

    pub(crate) fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    pub(crate) fn read<T: 'static>(
        &self,
        store: &Store<T>,
        offset: u32,
        len: usize,
    ) -> Result<Vec<u8>, InvocationError> {
        match self {
            Self::Local(memory) => {
                let data = memory.data(store);
                let range = check_bounds(offset, len, data.len())?;
                Ok(data[range].to_vec())
            }
            Self::Shared(memory) => {
                let data = memory.data();
                let range = check_bounds(offset, len, data.len())?;
                // SAFETY: the harness is single-threaded and never runs guest
                // code while copying, so no other agent writes these cells.
                Ok(data[range].iter().map(|cell| unsafe { *cell.get() }).collect())
            }
        }
    }

    pub(crate) fn write<T: 'static>(
        &self,
        store: &mut Store<T>,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), InvocationError> {
        match self {
            Self::Local(memory) => {
                let data = memory.data_mut(store);
                let range = check_bounds(offset, bytes.len(), data.len())?;
                data[range].copy_from_slice(bytes);
                Ok(())
            }
            Self::Shared(memory) => {
                let data = memory.data();
                let range = check_bounds(offset, bytes.len(), data.len())?;
                for (cell, byte) in data[range].iter().zip(bytes) {
                    // SAFETY: see `read`; no guest thread runs during the copy.
                    unsafe { *cell.get() = *byte };
                }
                Ok(())
            }
        }
    }
}
