//! Recording commands to execute on the device.
//!
//! A [`CommandBuffer`] is allocated from a [`CommandPool`] and goes through three states:
//!
//! - [`Idle`](CommandBufferState::Idle): nothing is being recorded. This is the state of a newly
//!   allocated command buffer, of one whose recording has ended, and of every command buffer of
//!   a pool that was reset.
//! - [`RecordingOutsideRenderPass`](CommandBufferState::RecordingOutsideRenderPass): entered
//!   with [`start_recording`](CommandBuffer::start_recording).
//! - [`RecordingInsideRenderPass`](CommandBufferState::RecordingInsideRenderPass): entered with
//!   [`begin_render_pass`](CommandBuffer::begin_render_pass) and left with
//!   [`end_render_pass`](CommandBuffer::end_render_pass). Secondary command buffers that
//!   continue a render pass start in this state.
//!
//! Every recording command is only valid in some of the states. Commands that can only be
//! recorded inside a render pass include draws and attachment clears; commands that can only
//! be recorded outside include transfers and dispatches. Everything else can be recorded in
//! either recording state. A command that is recorded in the wrong state, or whose arguments are
//! invalid, returns a [`ValidationError`] and is not passed on to Vulkan.
//!
//! # Stashing commands
//!
//! A pool created with [`stash_commands`](CommandPoolCreateInfo::stash_commands) gives command
//! buffers that also keep an owned copy of every command they record, which can be inspected with
//! [`CommandBuffer::stashed_commands`]. This is meant for debugging, and does not change what is
//! sent to Vulkan. Stashing can be turned off for the whole process with
//! [`set_command_stashing_disabled`].
//!
//! # Callbacks
//!
//! Every command buffer publishes an event whenever a pipeline barrier, the beginning or end of
//! a render pass, or an execution of secondary command buffers is recorded. See
//! [`CommandBufferCallbackId`].
//!
//! [`ValidationError`]: crate::ValidationError

pub use self::{
    commands::{clear::ClearAttachment, dynamic_state::SampleLocationsInfo},
    pool::{CommandPool, CommandPoolCreateFlags, CommandPoolCreateInfo},
    stash::Command,
    sys::CommandBuffer,
};
use crate::{
    format::ClearValue,
    macros::vulkan_enum,
    query::QueryControlFlags,
};
use ash::vk;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
pub mod pool;
mod stash;
mod sys;

static COMMAND_STASHING_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disables or re-enables command stashing for every command buffer in the process.
///
/// While disabled, command buffers of pools created with
/// [`stash_commands`](CommandPoolCreateInfo::stash_commands) record commands without stashing
/// them. Commands that were already stashed are kept.
#[inline]
pub fn set_command_stashing_disabled(disabled: bool) {
    COMMAND_STASHING_DISABLED.store(disabled, Ordering::Relaxed);
}

/// Returns whether command stashing is disabled for the whole process.
#[inline]
pub fn is_command_stashing_disabled() -> bool {
    COMMAND_STASHING_DISABLED.load(Ordering::Relaxed)
}

vulkan_enum! {
    /// The level of a command buffer.
    CommandBufferLevel = CommandBufferLevel(i32);

    /// A primary command buffer can be submitted to a queue, and can execute secondary command
    /// buffers.
    Primary = PRIMARY,

    /// A secondary command buffer cannot be submitted directly, but must be executed as part of
    /// a primary command buffer.
    Secondary = SECONDARY,
}

vulkan_enum! {
    /// Describes what a subpass of a render pass will contain.
    SubpassContents = SubpassContents(i32);

    /// The subpass will only directly contain commands.
    Inline = INLINE,

    /// The subpass will only contain secondary command buffers invocations.
    SecondaryCommandBuffers = SECONDARY_COMMAND_BUFFERS,
}

/// The recording state of a [`CommandBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// The command buffer is not recording.
    Idle,

    /// The command buffer is recording, and no render pass instance is active.
    RecordingOutsideRenderPass,

    /// The command buffer is recording inside a render pass instance.
    RecordingInsideRenderPass,
}

impl CommandBufferState {
    /// Returns whether the command buffer is in one of the recording states.
    #[inline]
    pub fn is_recording(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Usage flags to pass when starting to record a command buffer.
///
/// The safest option is `SimultaneousUse`, but it may be slower than the other two.
// NOTE: The ordering is important: the variants are listed from least to most permissive!
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum CommandBufferUsage {
    /// The command buffer can only be submitted once before being reset.
    OneTimeSubmit = vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT.as_raw(),

    /// The command buffer can be submitted multiple times, but must not be pending execution
    /// more than once at a time.
    MultipleSubmit = 0,

    /// The command buffer can be pending execution multiple times at once. If it's a secondary
    /// command buffer, it can be recorded to multiple primary command buffers at once.
    SimultaneousUse = vk::CommandBufferUsageFlags::SIMULTANEOUS_USE.as_raw(),
}

impl From<CommandBufferUsage> for vk::CommandBufferUsageFlags {
    #[inline]
    fn from(val: CommandBufferUsage) -> Self {
        Self::from_raw(val as u32)
    }
}

/// Parameters to start recording a command buffer.
#[derive(Clone, Debug)]
pub struct CommandBufferBeginInfo {
    /// How the command buffer will be used.
    ///
    /// The default value is [`CommandBufferUsage::MultipleSubmit`].
    pub usage: CommandBufferUsage,

    /// What a secondary command buffer inherits from the primary command buffer that executes
    /// it.
    ///
    /// Must be `Some` for secondary command buffers and `None` for primary ones.
    ///
    /// The default value is `None`.
    pub inheritance_info: Option<CommandBufferInheritanceInfo>,

    /// The physical devices of the device group that execute the command buffer.
    ///
    /// If `None`, every physical device of the group executes it. A device that is not part of
    /// a multi-device group only accepts `None` or `Some(1)`.
    ///
    /// The default value is `None`.
    pub device_mask: Option<u32>,

    pub _ne: crate::NonExhaustive,
}

impl Default for CommandBufferBeginInfo {
    #[inline]
    fn default() -> Self {
        Self {
            usage: CommandBufferUsage::MultipleSubmit,
            inheritance_info: None,
            device_mask: None,
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// The context that a secondary command buffer inherits from the primary command buffer that
/// executes it.
#[derive(Clone, Debug)]
pub struct CommandBufferInheritanceInfo {
    /// If `Some`, the secondary command buffer is executed entirely within a subpass of a render
    /// pass instance, and starts recording inside that render pass.
    ///
    /// The default value is `None`.
    pub render_pass: Option<CommandBufferInheritanceRenderPassInfo>,

    /// If `Some`, the secondary command buffer may be executed while an occlusion query is
    /// active, with the given control flags.
    ///
    /// The default value is `None`.
    pub occlusion_query: Option<QueryControlFlags>,

    pub _ne: crate::NonExhaustive,
}

impl Default for CommandBufferInheritanceInfo {
    #[inline]
    fn default() -> Self {
        Self {
            render_pass: None,
            occlusion_query: None,
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// The render pass subpass a secondary command buffer continues.
#[derive(Clone, Debug)]
pub struct CommandBufferInheritanceRenderPassInfo {
    /// The render pass the command buffer is executed in.
    ///
    /// There is no default value.
    pub render_pass: vk::RenderPass,

    /// The index of the subpass the command buffer is executed in.
    ///
    /// The default value is `0`.
    pub subpass: u32,

    /// The framebuffer the command buffer is executed with, if known.
    ///
    /// The default value is a null handle.
    pub framebuffer: vk::Framebuffer,

    pub _ne: crate::NonExhaustive,
}

impl CommandBufferInheritanceRenderPassInfo {
    /// Returns a `CommandBufferInheritanceRenderPassInfo` with the specified `render_pass`.
    #[inline]
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            subpass: 0,
            framebuffer: vk::Framebuffer::null(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// Parameters to begin a new render pass.
#[derive(Clone, Debug)]
pub struct RenderPassBeginInfo {
    /// The render pass to begin.
    ///
    /// There is no default value.
    pub render_pass: vk::RenderPass,

    /// The framebuffer to use for rendering.
    ///
    /// There is no default value.
    pub framebuffer: vk::Framebuffer,

    /// The area of the framebuffer that is rendered to.
    ///
    /// The default value is a zero-sized area, which must be overridden.
    pub render_area: RenderArea,

    /// Provides, for each attachment that is cleared on load, the value to clear it with.
    /// Attachments that are not cleared can be given `None`.
    ///
    /// The default value is empty.
    pub clear_values: Vec<Option<ClearValue>>,

    /// The physical devices of the device group that execute the render pass instance.
    ///
    /// If `None`, the device mask the command buffer started recording with is used. Otherwise,
    /// it must be a subset of that mask.
    ///
    /// The default value is `None`.
    pub device_mask: Option<u32>,

    pub _ne: crate::NonExhaustive,
}

impl RenderPassBeginInfo {
    /// Returns a `RenderPassBeginInfo` with the specified `render_pass` and `framebuffer`.
    #[inline]
    pub fn new(render_pass: vk::RenderPass, framebuffer: vk::Framebuffer) -> Self {
        Self {
            render_pass,
            framebuffer,
            render_area: RenderArea::Single(vk::Rect2D::default()),
            clear_values: Vec::new(),
            device_mask: None,
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// The area rendered to by a render pass instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderArea {
    /// The same area for every physical device.
    Single(vk::Rect2D),

    /// One area per physical device of the device group, indexed by device index. Only valid on
    /// devices that span more than one physical device.
    PerDevice(SmallVec<[vk::Rect2D; 2]>),
}

/// The events published by a [`CommandBuffer`].
///
/// Use [`slot`](Self::slot) to get the slot number to subscribe to in
/// [`CommandBuffer::callbacks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandBufferCallbackId {
    /// A pipeline barrier was recorded.
    PipelineBarrierCommandRecorded = 0,

    /// A render pass instance was begun.
    BeginRenderPassCommandRecorded = 1,

    /// A render pass instance was ended.
    EndRenderPassCommandRecorded = 2,

    /// Secondary command buffers were executed.
    ExecuteCommandsCommandRecorded = 3,
}

impl CommandBufferCallbackId {
    pub(crate) const COUNT: u32 = 4;

    /// Returns the slot number of the event.
    #[inline]
    pub fn slot(self) -> u32 {
        self as u32
    }
}

/// The argument passed to the callbacks of a [`CommandBuffer`].
///
/// Callbacks run while the command buffer is mutably borrowed by the command being recorded, so
/// the argument identifies it by its raw handle instead of a reference.
#[derive(Clone, Debug)]
pub struct CommandBufferCallbackArgument {
    /// The raw handle of the command buffer that recorded the command. It is not owned, and
    /// stays valid for as long as the [`CommandBuffer`] is alive.
    pub command_buffer: vk::CommandBuffer,

    /// A copy of the recorded command.
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::{
        is_command_stashing_disabled, pool::CommandPool, set_command_stashing_disabled,
        CommandBufferBeginInfo, CommandBufferCallbackArgument, CommandBufferCallbackId,
        CommandBufferInheritanceInfo, CommandBufferInheritanceRenderPassInfo, CommandBufferUsage,
        CommandPoolCreateInfo, RenderArea, RenderPassBeginInfo, SubpassContents,
    };
    use crate::{
        callback::{Callback, OwnerTag},
        command_buffer::Command,
        image::ImageLayout,
        sync::{DependencyInfo, ImageMemoryBarrier, MemoryBarrier, PipelineStages},
        tests::take_calls,
        Handle, VulkanObject,
    };
    use ash::vk;
    use serial_test::serial;
    use smallvec::smallvec;
    use std::sync::{Arc, Mutex};

    fn render_pass_begin_info() -> RenderPassBeginInfo {
        RenderPassBeginInfo {
            render_area: RenderArea::Single(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: 64,
                    height: 64,
                },
            }),
            ..RenderPassBeginInfo::new(vk::RenderPass::from_raw(1), vk::Framebuffer::from_raw(2))
        }
    }

    fn copy_regions() -> [vk::BufferCopy; 1] {
        [vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: 16,
        }]
    }

    #[test]
    fn partition_follows_render_pass() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        let (src, dst) = (vk::Buffer::from_raw(10), vk::Buffer::from_raw(11));

        cb.start_recording(CommandBufferBeginInfo {
            usage: CommandBufferUsage::OneTimeSubmit,
            ..Default::default()
        })
        .unwrap();
        assert!(cb.draw(3, 1, 0, 0).is_err());

        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        assert!(cb.draw(3, 1, 0, 0).is_ok());
        assert!(cb.copy_buffer(src, dst, &copy_regions()).is_err());

        cb.end_render_pass().unwrap();
        assert!(cb.copy_buffer(src, dst, &copy_regions()).is_ok());

        cb.stop_recording().unwrap();
        assert!(!cb.state().is_recording());
        assert!(cb.copy_buffer(src, dst, &copy_regions()).is_err());
        assert!(cb.draw(3, 1, 0, 0).is_err());

        assert_eq!(
            take_calls(),
            [
                "vkCreateCommandPool",
                "vkAllocateCommandBuffers",
                "vkBeginCommandBuffer",
                "vkCmdBeginRenderPass",
                "vkCmdDraw",
                "vkCmdEndRenderPass",
                "vkCmdCopyBuffer",
                "vkEndCommandBuffer",
            ],
        );
    }

    #[test]
    fn pipeline_barrier_callback() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let callback = Callback::new({
            let received = received.clone();
            move |argument: &CommandBufferCallbackArgument| {
                received.lock().unwrap().push(argument.clone());
            }
        });
        cb.callbacks()
            .subscribe(
                CommandBufferCallbackId::PipelineBarrierCommandRecorded.slot(),
                callback,
                OwnerTag::new(1),
            )
            .unwrap();

        let dependency_info = DependencyInfo {
            memory_barriers: smallvec![MemoryBarrier {
                src_stages: PipelineStages::TRANSFER,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                ..Default::default()
            }],
            image_memory_barriers: smallvec![ImageMemoryBarrier {
                new_layout: ImageLayout::ShaderReadOnlyOptimal,
                image: vk::Image::from_raw(20),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            }],
            ..Default::default()
        };

        cb.start_recording(Default::default()).unwrap();
        assert!(cb.pipeline_barrier(&dependency_info).is_ok());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].command_buffer, cb.handle());

        match &received[0].command {
            Command::PipelineBarrier { dependency_info } => {
                assert_eq!(dependency_info.memory_barriers.len(), 1);
                assert_eq!(dependency_info.image_memory_barriers.len(), 1);
                assert_eq!(
                    dependency_info.image_memory_barriers[0].image,
                    vk::Image::from_raw(20),
                );
            }
            command => panic!("unexpected command {:?}", command),
        }
    }

    #[test]
    #[serial]
    fn stash_switch() {
        let device = mock_device!();
        let pool = CommandPool::new(
            device,
            CommandPoolCreateInfo {
                stash_commands: true,
                ..Default::default()
            },
        )
        .unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        cb.dispatch([1, 1, 1]).unwrap();
        assert_eq!(cb.stashed_commands().len(), 1);

        set_command_stashing_disabled(true);
        assert!(is_command_stashing_disabled());
        cb.dispatch([2, 1, 1]).unwrap();
        assert_eq!(cb.stashed_commands().len(), 1);

        set_command_stashing_disabled(false);
        cb.dispatch([3, 1, 1]).unwrap();
        assert_eq!(cb.stashed_commands().len(), 2);
        assert!(matches!(
            cb.stashed_commands()[1],
            Command::Dispatch {
                group_counts: [3, 1, 1],
            },
        ));

        unsafe { cb.reset(false) }.unwrap();
        assert!(cb.stashed_commands().is_empty());
    }

    // Records the same program on a fresh pool, and returns the entrypoints it called.
    fn record_mixed_program(stash_commands: bool) -> Vec<&'static str> {
        let device = mock_device!();
        let pool = CommandPool::new(
            device,
            CommandPoolCreateInfo {
                stash_commands,
                ..Default::default()
            },
        )
        .unwrap();

        let mut secondary = pool.allocate_secondary().unwrap();
        secondary
            .start_recording(CommandBufferBeginInfo {
                inheritance_info: Some(CommandBufferInheritanceInfo {
                    render_pass: Some(CommandBufferInheritanceRenderPassInfo::new(
                        vk::RenderPass::from_raw(1),
                    )),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();
        secondary.draw(6, 1, 0, 0).unwrap();
        secondary.stop_recording().unwrap();

        let mut cb = pool.allocate_primary().unwrap();
        cb.callbacks()
            .subscribe(
                CommandBufferCallbackId::BeginRenderPassCommandRecorded.slot(),
                Callback::new(|_: &CommandBufferCallbackArgument| {}),
                OwnerTag::new(3),
            )
            .unwrap();

        let barrier = DependencyInfo {
            memory_barriers: smallvec![MemoryBarrier {
                src_stages: PipelineStages::COMPUTE_SHADER,
                dst_stages: PipelineStages::VERTEX_INPUT,
                ..Default::default()
            }],
            ..Default::default()
        };

        take_calls();
        cb.start_recording(Default::default()).unwrap();
        cb.dispatch([4, 4, 1]).unwrap();
        cb.pipeline_barrier(&barrier).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        cb.draw(3, 1, 0, 0).unwrap();
        cb.next_subpass(SubpassContents::SecondaryCommandBuffers)
            .unwrap();
        cb.execute_commands(&[&secondary]).unwrap();
        assert!(cb.draw(3, 1, 0, 0).is_err());
        cb.end_render_pass().unwrap();
        cb.dispatch([1, 1, 1]).unwrap();
        cb.stop_recording().unwrap();

        let stashing = stash_commands && !is_command_stashing_disabled();
        assert_eq!(cb.stashed_commands().len(), if stashing { 8 } else { 0 });

        take_calls()
    }

    #[test]
    #[serial]
    fn stashing_does_not_change_emitted_commands() {
        let without_stash = record_mixed_program(false);
        assert_eq!(
            without_stash,
            [
                "vkBeginCommandBuffer",
                "vkCmdDispatch",
                "vkCmdPipelineBarrier",
                "vkCmdBeginRenderPass",
                "vkCmdDraw",
                "vkCmdNextSubpass",
                "vkCmdExecuteCommands",
                "vkCmdEndRenderPass",
                "vkCmdDispatch",
                "vkEndCommandBuffer",
            ],
        );
        assert_eq!(record_mixed_program(true), without_stash);

        set_command_stashing_disabled(true);
        let switched_off = record_mixed_program(true);
        set_command_stashing_disabled(false);
        assert_eq!(switched_off, without_stash);
    }
}
