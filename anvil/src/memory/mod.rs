//! Device memory as seen by sparse resources.
//!
//! Memory is allocated outside this crate. A [`MemoryBlock`] wraps an existing `VkDeviceMemory`
//! allocation so that it can be referred to by identity, for example by a
//! [`PageTracker`](page_tracker::PageTracker) that records which parts of a sparse resource are
//! bound to it.

use crate::{macros::impl_id_counter, DeviceSize, VulkanObject};
use std::num::NonZeroU64;

pub mod page_tracker;

/// A block of device memory that sparse resources can be bound to.
///
/// Two `MemoryBlock`s are equal only if they are the same object, even if they wrap the same
/// handle.
#[derive(Debug)]
pub struct MemoryBlock {
    handle: ash::vk::DeviceMemory,
    id: NonZeroU64,

    allocation_size: DeviceSize,
    memory_type_index: u32,
}

impl MemoryBlock {
    /// Wraps an existing allocation. The allocation is not freed when the `MemoryBlock` is
    /// dropped.
    #[inline]
    pub fn from_handle(
        handle: ash::vk::DeviceMemory,
        allocation_size: DeviceSize,
        memory_type_index: u32,
    ) -> Self {
        MemoryBlock {
            handle,
            id: Self::next_id(),
            allocation_size,
            memory_type_index,
        }
    }

    /// Returns the size of the allocation in bytes.
    #[inline]
    pub fn allocation_size(&self) -> DeviceSize {
        self.allocation_size
    }

    /// Returns the index of the memory type the allocation was made from.
    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }
}

unsafe impl VulkanObject for MemoryBlock {
    type Handle = ash::vk::DeviceMemory;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

impl_id_counter!(MemoryBlock);

/// Returns whether `offset` is a multiple of `alignment`. `alignment` must not be zero.
#[inline]
pub(crate) fn is_aligned(offset: DeviceSize, alignment: DeviceSize) -> bool {
    offset % alignment == 0
}

#[cfg(test)]
mod tests {
    use super::{is_aligned, MemoryBlock};
    use crate::{Handle, VulkanObject};
    use ash::vk;

    #[test]
    fn identity() {
        let a = MemoryBlock::from_handle(vk::DeviceMemory::from_raw(1), 4096, 0);
        let b = MemoryBlock::from_handle(vk::DeviceMemory::from_raw(1), 4096, 0);

        assert_eq!(a.handle(), b.handle());
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn alignment() {
        assert!(is_aligned(0, 4096));
        assert!(is_aligned(8192, 4096));
        assert!(!is_aligned(100, 4096));
        assert!(is_aligned(12, 3));
    }
}
