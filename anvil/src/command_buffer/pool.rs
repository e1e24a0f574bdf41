//! Memory and resource pool for recording command buffers.
//!
//! A command pool holds and manages the memory of one or more command buffers. Every
//! [`CommandBuffer`] keeps its pool alive, and frees itself back to it when dropped.
//!
//! Allocation, freeing and resetting are serialized by a lock inside the pool. A pool created
//! with [`thread_safe`](CommandPoolCreateInfo::thread_safe) also takes that lock around every
//! command its command buffers record, so that command buffers of the same pool can be recorded
//! from different threads.

use super::{sys::CommandBuffer, CommandBufferLevel};
use crate::{
    device::{Device, DeviceOwned},
    macros::{impl_id_counter, vulkan_bitflags},
    object_tracker::{self, ObjectType},
    Validated, ValidationError, VulkanError, VulkanObject,
};
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::{
    mem::MaybeUninit,
    num::NonZeroU64,
    ptr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Represents a Vulkan command pool.
///
/// A command pool is always tied to a specific queue family. Command buffers allocated from a pool
/// can only be executed on the corresponding queue family.
#[derive(Debug)]
pub struct CommandPool {
    handle: ash::vk::CommandPool,
    device: Arc<Device>,
    id: NonZeroU64,

    flags: CommandPoolCreateFlags,
    queue_family_index: u32,
    thread_safe: bool,
    stash_commands: bool,

    state: Mutex<PoolState>,
    reset_epoch: AtomicU64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolState {
    allocated_count: usize,
}

impl CommandPool {
    /// Creates a new `CommandPool`.
    pub fn new(
        device: Arc<Device>,
        create_info: CommandPoolCreateInfo,
    ) -> Result<Arc<CommandPool>, Validated<VulkanError>> {
        Self::validate_new(&device, &create_info)?;

        unsafe { Ok(Self::new_unchecked(device, create_info)?) }
    }

    fn validate_new(
        device: &Device,
        create_info: &CommandPoolCreateInfo,
    ) -> Result<(), Box<ValidationError>> {
        create_info
            .validate(device)
            .map_err(|err| err.add_context("create_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn new_unchecked(
        device: Arc<Device>,
        create_info: CommandPoolCreateInfo,
    ) -> Result<Arc<CommandPool>, VulkanError> {
        let &CommandPoolCreateInfo {
            flags,
            queue_family_index,
            ..
        } = &create_info;

        let create_info_vk = ash::vk::CommandPoolCreateInfo::default()
            .flags((flags | CommandPoolCreateFlags::RESET_COMMAND_BUFFER).into())
            .queue_family_index(queue_family_index);

        let handle = {
            let fns = device.fns();
            let mut output = MaybeUninit::uninit();
            (fns.v1_0.create_command_pool)(
                device.handle(),
                &create_info_vk,
                ptr::null(),
                output.as_mut_ptr(),
            )
            .result()
            .map_err(|err| {
                tracing::warn!(result = ?err, "vkCreateCommandPool failed");
                VulkanError::from(err)
            })?;
            output.assume_init()
        };

        Ok(Self::from_handle(device, handle, create_info))
    }

    /// Creates a new `CommandPool` from a raw object handle.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid Vulkan object handle created from `device`.
    /// - `create_info` must match the info used to create the object.
    /// - The pool must have been created with [`CommandPoolCreateFlags::RESET_COMMAND_BUFFER`],
    ///   whether or not `create_info.flags` contains it.
    pub unsafe fn from_handle(
        device: Arc<Device>,
        handle: ash::vk::CommandPool,
        create_info: CommandPoolCreateInfo,
    ) -> Arc<CommandPool> {
        let CommandPoolCreateInfo {
            flags,
            queue_family_index,
            thread_safe,
            stash_commands,
            _ne: _,
        } = create_info;

        let pool = CommandPool {
            handle,
            device,
            id: Self::next_id(),

            flags: flags | CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index,
            thread_safe,
            stash_commands,

            state: Mutex::new(PoolState::default()),
            reset_epoch: AtomicU64::new(0),
        };
        object_tracker::register(ObjectType::CommandPool, pool.id);
        tracing::debug!(pool = pool.id.get(), queue_family_index, "created command pool");

        Arc::new(pool)
    }

    /// Returns the flags that the command pool was created with.
    #[inline]
    pub fn flags(&self) -> CommandPoolCreateFlags {
        self.flags
    }

    /// Returns the queue family on which command buffers of this pool can be executed.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Returns whether command buffers of this pool take the pool lock when recording.
    #[inline]
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// Returns whether command buffers of this pool stash the commands they record.
    #[inline]
    pub fn stashes_commands(&self) -> bool {
        self.stash_commands
    }

    /// Returns the number of command buffers currently allocated from the pool.
    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated_count
    }

    /// Allocates a primary command buffer.
    #[inline]
    pub fn allocate_primary(self: &Arc<Self>) -> Result<CommandBuffer, VulkanError> {
        self.allocate(CommandBufferLevel::Primary)
    }

    /// Allocates a secondary command buffer.
    #[inline]
    pub fn allocate_secondary(self: &Arc<Self>) -> Result<CommandBuffer, VulkanError> {
        self.allocate(CommandBufferLevel::Secondary)
    }

    /// Allocates a command buffer of the given level.
    pub fn allocate(
        self: &Arc<Self>,
        level: CommandBufferLevel,
    ) -> Result<CommandBuffer, VulkanError> {
        let allocate_info = ash::vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(level.into())
            .command_buffer_count(1);

        let handle = {
            let mut state = self.state.lock();

            let handle = unsafe {
                let fns = self.device.fns();
                let mut out = Vec::with_capacity(1);
                (fns.v1_0.allocate_command_buffers)(
                    self.device.handle(),
                    &allocate_info,
                    out.as_mut_ptr(),
                )
                .result()
                .map_err(|err| {
                    tracing::warn!(
                        pool = self.id.get(),
                        result = ?err,
                        "vkAllocateCommandBuffers failed"
                    );
                    VulkanError::from(err)
                })?;
                out.set_len(1);
                out[0]
            };

            state.allocated_count += 1;
            handle
        };

        Ok(unsafe { CommandBuffer::from_allocation(self.clone(), handle, level) })
    }

    /// Resets the pool, which resets all the command buffers that were allocated from it.
    ///
    /// Every command buffer of the pool goes back to the idle state. Commands they stashed are
    /// discarded the next time they start recording.
    ///
    /// # Safety
    ///
    /// - The command buffers allocated from this pool must not be pending execution.
    pub unsafe fn reset(&self, release_resources: bool) -> Result<(), Validated<VulkanError>> {
        Ok(self.reset_unchecked(release_resources)?)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn reset_unchecked(&self, release_resources: bool) -> Result<(), VulkanError> {
        let flags = if release_resources {
            ash::vk::CommandPoolResetFlags::RELEASE_RESOURCES
        } else {
            ash::vk::CommandPoolResetFlags::empty()
        };

        let _state = self.state.lock();
        let fns = self.device.fns();
        (fns.v1_0.reset_command_pool)(self.device.handle(), self.handle, flags)
            .result()
            .map_err(|err| {
                tracing::warn!(pool = self.id.get(), result = ?err, "vkResetCommandPool failed");
                VulkanError::from(err)
            })?;

        let epoch = self.reset_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(pool = self.id.get(), epoch, release_resources, "reset command pool");

        Ok(())
    }

    /// Frees command buffers back to the pool. Used by the `Drop` implementation of
    /// `CommandBuffer`.
    pub(crate) unsafe fn free_command_buffers(&self, command_buffers: &[ash::vk::CommandBuffer]) {
        let command_buffers_vk: SmallVec<[_; 4]> = command_buffers.iter().copied().collect();

        let mut state = self.state.lock();
        let fns = self.device.fns();
        (fns.v1_0.free_command_buffers)(
            self.device.handle(),
            self.handle,
            command_buffers_vk.len() as u32,
            command_buffers_vk.as_ptr(),
        );
        state.allocated_count = state.allocated_count.saturating_sub(command_buffers_vk.len());
    }

    /// Takes the pool lock if the pool is thread-safe.
    #[inline]
    pub(crate) fn lock_for_recording(&self) -> Option<MutexGuard<'_, PoolState>> {
        self.thread_safe.then(|| self.state.lock())
    }

    /// Returns the number of times the pool has been reset.
    #[inline]
    pub(crate) fn reset_epoch(&self) -> u64 {
        self.reset_epoch.load(Ordering::Acquire)
    }
}

impl Drop for CommandPool {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            let fns = self.device.fns();
            (fns.v1_0.destroy_command_pool)(self.device.handle(), self.handle, ptr::null());
        }

        object_tracker::unregister(ObjectType::CommandPool, self.id);
    }
}

unsafe impl VulkanObject for CommandPool {
    type Handle = ash::vk::CommandPool;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

unsafe impl DeviceOwned for CommandPool {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl_id_counter!(CommandPool);

/// Parameters to create a `CommandPool`.
#[derive(Clone, Debug)]
pub struct CommandPoolCreateInfo {
    /// Additional properties of the command pool.
    ///
    /// [`CommandPoolCreateFlags::RESET_COMMAND_BUFFER`] is always added, so that every command
    /// buffer can be reset and recorded again on its own.
    ///
    /// The default value is empty.
    pub flags: CommandPoolCreateFlags,

    /// The index of the queue family that this pool is created for. All command buffers allocated
    /// from this pool must be submitted on a queue belonging to that family.
    ///
    /// The default value is `0`.
    pub queue_family_index: u32,

    /// Whether command buffers allocated from the pool take the pool lock around every command
    /// they record. Without it, the caller must make sure that no two command buffers of the pool
    /// are recorded at the same time.
    ///
    /// The default value is `true`.
    pub thread_safe: bool,

    /// Whether command buffers allocated from the pool keep an owned copy of every command they
    /// record.
    ///
    /// The default value is `false`.
    pub stash_commands: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for CommandPoolCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: CommandPoolCreateFlags::empty(),
            queue_family_index: 0,
            thread_safe: true,
            stash_commands: false,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl CommandPoolCreateInfo {
    pub(crate) fn validate(&self, _device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            queue_family_index, ..
        } = self;

        if queue_family_index == ash::vk::QUEUE_FAMILY_IGNORED {
            return Err(Box::new(ValidationError {
                context: "queue_family_index".into(),
                problem: "is `VK_QUEUE_FAMILY_IGNORED`".into(),
                vuids: &["VUID-vkCreateCommandPool-queueFamilyIndex-01937"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}

vulkan_bitflags! {
    /// Additional properties of the command pool.
    CommandPoolCreateFlags = CommandPoolCreateFlags(u32);

    /// A hint to the implementation that the command buffers allocated from this pool will be
    /// short-lived.
    TRANSIENT = TRANSIENT,

    /// Command buffers allocated from this pool can be reset individually.
    RESET_COMMAND_BUFFER = RESET_COMMAND_BUFFER,
}
