//! Bookkeeping of the memory bindings of a sparse resource.
//!
//! A sparse buffer or image is divided into pages of equal size. Each page can be bound to a
//! range of a [`MemoryBlock`], or be left unbacked. The [`PageTracker`] keeps the binding map of
//! one such resource: a list of bindings that never overlap, and a bitmap with one bit per page
//! that tells whether the page is backed.
//!
//! A new binding replaces whatever covered its range before. Existing bindings that overlap it
//! are trimmed, split in two, or removed:
//!
//! ```text
//! existing:  |---- A ----|          |------- B -------|   |- C -|
//! new:              |======= N =======|
//! result:    |- A -|======= N =======|- B (shifted) -|   |- C -|
//! ```
//!
//! Binding "none" instead of a memory block records that a range is explicitly unbacked.
//! Unbacked bindings take part in the overlap rules like any other binding.

use super::{is_aligned, MemoryBlock};
use crate::{
    object_tracker::{self, ObjectType},
    DeviceSize, ValidationError,
};
use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

/// One contiguous range of the resource, bound to a contiguous range of a memory block.
#[derive(Clone, Copy, Debug)]
pub struct PageBinding<'mb> {
    /// The memory block backing the range, or `None` if the range is unbacked.
    pub memory_block: Option<&'mb MemoryBlock>,

    /// The offset in `memory_block` that `region_offset` is bound to.
    pub memory_block_offset: DeviceSize,

    /// The start of the range in the resource.
    pub region_offset: DeviceSize,

    /// The size of the range in bytes.
    pub size: DeviceSize,
}

impl PageBinding<'_> {
    /// Returns the end of the range in the resource.
    #[inline]
    pub fn region_end(&self) -> DeviceSize {
        self.region_offset + self.size
    }

    #[inline]
    fn overlaps(&self, start: DeviceSize, end: DeviceSize) -> bool {
        self.region_offset < end && start < self.region_end()
    }
}

impl PartialEq for PageBinding<'_> {
    fn eq(&self, other: &Self) -> bool {
        let same_block = match (self.memory_block, other.memory_block) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };

        same_block
            && self.memory_block_offset == other.memory_block_offset
            && self.region_offset == other.region_offset
            && self.size == other.size
    }
}

/// Tracks which pages of a sparse resource are bound to which memory blocks.
///
/// The tracker does not own the memory blocks. The `'mb` lifetime ensures they outlive it.
#[derive(Debug)]
pub struct PageTracker<'mb> {
    id: NonZeroU64,
    region_size: DeviceSize,
    page_size: DeviceSize,
    bindings: Vec<PageBinding<'mb>>,
    // One bit per page, set if a binding with a memory block covers the page.
    residency: Vec<u64>,
    backed_page_count: u64,
}

impl<'mb> PageTracker<'mb> {
    /// Creates a tracker for a resource of `region_size` bytes, with pages of `page_size` bytes.
    /// No page is backed initially.
    pub fn new(
        region_size: DeviceSize,
        page_size: DeviceSize,
    ) -> Result<Self, Box<ValidationError>> {
        if region_size == 0 {
            return Err(Box::new(ValidationError {
                context: "region_size".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        if page_size == 0 {
            return Err(Box::new(ValidationError {
                context: "page_size".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        let page_count = region_size.div_ceil(page_size);
        let tracker = PageTracker {
            id: next_id(),
            region_size,
            page_size,
            bindings: Vec::new(),
            residency: vec![0; page_count.div_ceil(64) as usize],
            backed_page_count: 0,
        };
        object_tracker::register(ObjectType::PageTracker, tracker.id);

        tracing::debug!(
            id = tracker.id.get(),
            region_size,
            page_size,
            page_count,
            "created page tracker"
        );

        Ok(tracker)
    }

    /// Returns the process-unique id of the tracker.
    #[inline]
    pub fn id(&self) -> NonZeroU64 {
        self.id
    }

    /// Returns the size of the tracked resource in bytes.
    #[inline]
    pub fn region_size(&self) -> DeviceSize {
        self.region_size
    }

    /// Returns the size of a page in bytes.
    #[inline]
    pub fn page_size(&self) -> DeviceSize {
        self.page_size
    }

    /// Returns the number of pages. The last page may extend past the end of the resource.
    #[inline]
    pub fn page_count(&self) -> DeviceSize {
        self.region_size.div_ceil(self.page_size)
    }

    /// Returns the number of bindings.
    #[inline]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Returns the binding at `index`, in the order they were created in.
    #[inline]
    pub fn binding(&self, index: usize) -> Option<&PageBinding<'mb>> {
        self.bindings.get(index)
    }

    /// Returns all bindings, in the order they were created in.
    #[inline]
    pub fn bindings(&self) -> &[PageBinding<'mb>] {
        &self.bindings
    }

    /// Returns the number of pages that are backed by a memory block.
    #[inline]
    pub fn backed_page_count(&self) -> u64 {
        self.backed_page_count
    }

    /// Returns whether the page at `page_index` is backed by a memory block.
    #[inline]
    pub fn is_page_backed(&self, page_index: u64) -> bool {
        self.residency
            .get((page_index / 64) as usize)
            .is_some_and(|word| word & (1 << (page_index % 64)) != 0)
    }

    /// Binds `[region_offset, region_offset + size)` of the resource to `memory_block`, starting
    /// at `memory_block_offset`, or marks it unbacked if `memory_block` is `None`.
    ///
    /// Everything that was bound in the range before is unbound.
    ///
    /// The range must start on a page boundary and end on one, or at the end of the region. It
    /// must also fit in `memory_block`, starting at `memory_block_offset`.
    pub fn set_binding(
        &mut self,
        memory_block: Option<&'mb MemoryBlock>,
        memory_block_offset: DeviceSize,
        region_offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_set_binding(memory_block, memory_block_offset, region_offset, size)?;

        self.set_binding_unchecked(memory_block, memory_block_offset, region_offset, size);

        Ok(())
    }

    fn validate_set_binding(
        &self,
        memory_block: Option<&'mb MemoryBlock>,
        memory_block_offset: DeviceSize,
        region_offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), Box<ValidationError>> {
        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        let region_end = region_offset
            .checked_add(size)
            .filter(|&end| end <= self.region_size)
            .ok_or_else(|| {
                Box::new(ValidationError {
                    problem: "`region_offset + size` is greater than the region size".into(),
                    vuids: &["VUID-VkSparseMemoryBind-size-01100"],
                    ..Default::default()
                })
            })?;

        if !is_aligned(region_offset, self.page_size) {
            return Err(Box::new(ValidationError {
                context: "region_offset".into(),
                problem: "is not a multiple of the page size".into(),
                vuids: &["VUID-VkSparseMemoryBind-resourceOffset-01101"],
                ..Default::default()
            }));
        }

        if !(is_aligned(region_end, self.page_size) || region_end == self.region_size) {
            return Err(Box::new(ValidationError {
                problem: "`region_offset + size` is not a multiple of the page size, and is not \
                    equal to the region size"
                    .into(),
                vuids: &["VUID-VkSparseMemoryBind-size-01099"],
                ..Default::default()
            }));
        }

        if let Some(memory_block) = memory_block {
            if memory_block_offset
                .checked_add(size)
                .is_none_or(|end| end > memory_block.allocation_size())
            {
                return Err(Box::new(ValidationError {
                    problem: "`memory_block_offset + size` is greater than the allocation size \
                        of `memory_block`"
                        .into(),
                    vuids: &["VUID-VkSparseMemoryBind-size-01102"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    fn set_binding_unchecked(
        &mut self,
        memory_block: Option<&'mb MemoryBlock>,
        memory_block_offset: DeviceSize,
        region_offset: DeviceSize,
        size: DeviceSize,
    ) {
        let new_start = region_offset;
        let new_end = region_offset + size;

        let mut rewritten = Vec::with_capacity(self.bindings.len() + 2);

        for existing in self.bindings.drain(..) {
            if !existing.overlaps(new_start, new_end) {
                rewritten.push(existing);
                continue;
            }

            let existing_start = existing.region_offset;
            let existing_end = existing.region_end();

            // Part of `existing` before the new range.
            if existing_start < new_start {
                rewritten.push(PageBinding {
                    size: new_start - existing_start,
                    ..existing
                });
            }

            // Part of `existing` after the new range.
            if new_end < existing_end {
                let skipped = new_end - existing_start;

                rewritten.push(PageBinding {
                    memory_block: existing.memory_block,
                    memory_block_offset: existing.memory_block_offset + skipped,
                    region_offset: new_end,
                    size: existing_end - new_end,
                });
            }
        }

        rewritten.push(PageBinding {
            memory_block,
            memory_block_offset,
            region_offset,
            size,
        });
        self.bindings = rewritten;

        let first_page = new_start / self.page_size;
        let end_page = new_end.div_ceil(self.page_size);
        let backed = memory_block.is_some();

        for page in first_page..end_page {
            let word = &mut self.residency[(page / 64) as usize];
            let bit = 1u64 << (page % 64);
            let was_backed = *word & bit != 0;

            match (was_backed, backed) {
                (false, true) => {
                    *word |= bit;
                    self.backed_page_count += 1;
                }
                (true, false) => {
                    *word &= !bit;
                    self.backed_page_count -= 1;
                }
                _ => (),
            }
        }

        tracing::trace!(
            id = self.id.get(),
            region_offset,
            size,
            memory_block = memory_block.map(|block| block.id().get()),
            binding_count = self.bindings.len(),
            backed_page_count = self.backed_page_count,
            "set sparse binding"
        );
    }

    /// Returns the memory block backing `[region_offset, region_offset + size)`, and the offset
    /// in the memory block that `region_offset` is bound to.
    ///
    /// The block is `None` if the range was explicitly unbound. The range must be at most one
    /// page, and must be contained in a single binding.
    pub fn memory_block_at(
        &self,
        region_offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(Option<&'mb MemoryBlock>, DeviceSize), Box<ValidationError>> {
        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        if size > self.page_size {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is greater than the page size".into(),
                ..Default::default()
            }));
        }

        let query_end = region_offset
            .checked_add(size)
            .filter(|&end| end <= self.region_size)
            .ok_or_else(|| {
                Box::new(ValidationError {
                    problem: "`region_offset + size` is greater than the region size".into(),
                    ..Default::default()
                })
            })?;

        self.bindings
            .iter()
            .find(|binding| {
                binding.region_offset <= region_offset && query_end <= binding.region_end()
            })
            .map(|binding| {
                (
                    binding.memory_block,
                    binding.memory_block_offset + (region_offset - binding.region_offset),
                )
            })
            .ok_or_else(|| {
                Box::new(ValidationError {
                    problem: "the range is not contained in a single binding".into(),
                    ..Default::default()
                })
            })
    }
}

impl Drop for PageTracker<'_> {
    fn drop(&mut self) {
        object_tracker::unregister(ObjectType::PageTracker, self.id);
    }
}

fn next_id() -> NonZeroU64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    NonZeroU64::new(COUNTER.fetch_add(1, Ordering::Relaxed)).unwrap_or_else(|| {
        eprintln!("an ID counter has overflown ...somehow");
        std::process::abort();
    })
}
