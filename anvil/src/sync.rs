//! Synchronization primitives recorded into command buffers.
//!
//! A pipeline barrier creates a dependency between commands recorded before the barrier (the
//! source scope) and commands recorded after it (the destination scope). The barrier types here
//! own all of their data, so that a recorded barrier can be kept in the command stash and handed
//! to callbacks after the caller's arguments are gone.

use crate::{
    device::Device,
    image::{is_valid_subresource_range, ImageLayout},
    macros::vulkan_bitflags,
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError, Version,
};
use ash::vk;
use smallvec::SmallVec;
use std::ops::Range;

vulkan_bitflags! {
    /// A set of stages in a graphics or compute pipeline.
    PipelineStages = PipelineStageFlags(u32);

    TOP_OF_PIPE = TOP_OF_PIPE,
    DRAW_INDIRECT = DRAW_INDIRECT,
    VERTEX_INPUT = VERTEX_INPUT,
    VERTEX_SHADER = VERTEX_SHADER,
    TESSELLATION_CONTROL_SHADER = TESSELLATION_CONTROL_SHADER,
    TESSELLATION_EVALUATION_SHADER = TESSELLATION_EVALUATION_SHADER,
    GEOMETRY_SHADER = GEOMETRY_SHADER,
    FRAGMENT_SHADER = FRAGMENT_SHADER,
    EARLY_FRAGMENT_TESTS = EARLY_FRAGMENT_TESTS,
    LATE_FRAGMENT_TESTS = LATE_FRAGMENT_TESTS,
    COLOR_ATTACHMENT_OUTPUT = COLOR_ATTACHMENT_OUTPUT,
    COMPUTE_SHADER = COMPUTE_SHADER,
    TRANSFER = TRANSFER,
    BOTTOM_OF_PIPE = BOTTOM_OF_PIPE,
    HOST = HOST,
    ALL_GRAPHICS = ALL_GRAPHICS,
    ALL_COMMANDS = ALL_COMMANDS,
    TRANSFORM_FEEDBACK = TRANSFORM_FEEDBACK_EXT,
}

vulkan_bitflags! {
    /// A set of memory access types that are included in a memory dependency.
    AccessFlags = AccessFlags(u32);

    INDIRECT_COMMAND_READ = INDIRECT_COMMAND_READ,
    INDEX_READ = INDEX_READ,
    VERTEX_ATTRIBUTE_READ = VERTEX_ATTRIBUTE_READ,
    UNIFORM_READ = UNIFORM_READ,
    INPUT_ATTACHMENT_READ = INPUT_ATTACHMENT_READ,
    SHADER_READ = SHADER_READ,
    SHADER_WRITE = SHADER_WRITE,
    COLOR_ATTACHMENT_READ = COLOR_ATTACHMENT_READ,
    COLOR_ATTACHMENT_WRITE = COLOR_ATTACHMENT_WRITE,
    DEPTH_STENCIL_ATTACHMENT_READ = DEPTH_STENCIL_ATTACHMENT_READ,
    DEPTH_STENCIL_ATTACHMENT_WRITE = DEPTH_STENCIL_ATTACHMENT_WRITE,
    TRANSFER_READ = TRANSFER_READ,
    TRANSFER_WRITE = TRANSFER_WRITE,
    HOST_READ = HOST_READ,
    HOST_WRITE = HOST_WRITE,
    MEMORY_READ = MEMORY_READ,
    MEMORY_WRITE = MEMORY_WRITE,
    TRANSFORM_FEEDBACK_WRITE = TRANSFORM_FEEDBACK_WRITE_EXT,
    TRANSFORM_FEEDBACK_COUNTER_READ = TRANSFORM_FEEDBACK_COUNTER_READ_EXT,
    TRANSFORM_FEEDBACK_COUNTER_WRITE = TRANSFORM_FEEDBACK_COUNTER_WRITE_EXT,
}

vulkan_bitflags! {
    /// Flags that modify how execution and memory dependencies are formed.
    DependencyFlags = DependencyFlags(u32);

    /// For framebuffer-space pipeline stages, specifies that the dependency is framebuffer-local.
    BY_REGION = BY_REGION,

    /// For devices that consist of multiple physical devices, specifies that the dependency is
    /// device-local.
    DEVICE_GROUP = DEVICE_GROUP,

    /// For subpass dependencies, and pipeline barriers executing within a render pass instance,
    /// if the render pass uses multiview rendering, specifies that the dependency is view-local.
    VIEW_LOCAL = VIEW_LOCAL,
}

/// Dependency info for barriers in a pipeline barrier or a wait events command.
///
/// Each barrier has a set of source/destination pipeline stages and source/destination memory
/// access types. The pipeline stages create an *execution dependency*, the memory access types
/// create a *memory dependency* on top of it.
#[derive(Clone, Debug)]
pub struct DependencyInfo {
    /// Flags to modify how the execution and memory dependencies are formed.
    ///
    /// The default value is empty.
    pub dependency_flags: DependencyFlags,

    /// Memory barriers for global operations and accesses, not limited to a single resource.
    ///
    /// The default value is empty.
    pub memory_barriers: SmallVec<[MemoryBarrier; 2]>,

    /// Memory barriers for individual buffers.
    ///
    /// The default value is empty.
    pub buffer_memory_barriers: SmallVec<[BufferMemoryBarrier; 4]>,

    /// Memory barriers for individual images.
    ///
    /// The default value is empty.
    pub image_memory_barriers: SmallVec<[ImageMemoryBarrier; 4]>,

    pub _ne: crate::NonExhaustive,
}

impl Default for DependencyInfo {
    #[inline]
    fn default() -> Self {
        Self {
            dependency_flags: DependencyFlags::empty(),
            memory_barriers: SmallVec::new(),
            buffer_memory_barriers: SmallVec::new(),
            image_memory_barriers: SmallVec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DependencyInfo {
    /// Returns `true` if `self` doesn't contain any barriers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory_barriers.is_empty()
            && self.buffer_memory_barriers.is_empty()
            && self.image_memory_barriers.is_empty()
    }

    /// Returns the total number of barriers in `self`.
    #[inline]
    pub fn barrier_count(&self) -> usize {
        self.memory_barriers.len()
            + self.buffer_memory_barriers.len()
            + self.image_memory_barriers.len()
    }

    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            dependency_flags,
            ref memory_barriers,
            ref buffer_memory_barriers,
            ref image_memory_barriers,
            _ne: _,
        } = self;

        if dependency_flags.intersects(DependencyFlags::DEVICE_GROUP)
            && !(device.api_version() >= Version::V1_1
                || device.enabled_extensions().khr_device_group)
        {
            return Err(Box::new(ValidationError {
                context: "dependency_flags".into(),
                problem: "contains `DependencyFlags::DEVICE_GROUP`".into(),
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_1)]),
                    RequiresAllOf(&[Requires::DeviceExtension("khr_device_group")]),
                ]),
                ..Default::default()
            }));
        }

        for (index, barrier) in memory_barriers.iter().enumerate() {
            barrier
                .validate(device)
                .map_err(|err| err.add_context(format!("memory_barriers[{}]", index)))?;
        }

        for (index, barrier) in buffer_memory_barriers.iter().enumerate() {
            barrier
                .validate(device)
                .map_err(|err| err.add_context(format!("buffer_memory_barriers[{}]", index)))?;
        }

        for (index, barrier) in image_memory_barriers.iter().enumerate() {
            barrier
                .validate(device)
                .map_err(|err| err.add_context(format!("image_memory_barriers[{}]", index)))?;
        }

        Ok(())
    }

    /// Converts the barriers to their Vulkan 1.0 form. The stage masks of all barriers are
    /// merged, since `vkCmdPipelineBarrier` only takes one pair of them.
    pub(crate) fn to_vk(&self) -> DependencyInfoVk {
        let mut src_stage_mask = vk::PipelineStageFlags::empty();
        let mut dst_stage_mask = vk::PipelineStageFlags::empty();

        let memory_barriers = self
            .memory_barriers
            .iter()
            .map(|barrier| {
                let &MemoryBarrier {
                    src_stages,
                    src_access,
                    dst_stages,
                    dst_access,
                    _ne: _,
                } = barrier;

                src_stage_mask |= src_stages.into();
                dst_stage_mask |= dst_stages.into();

                vk::MemoryBarrier::default()
                    .src_access_mask(src_access.into())
                    .dst_access_mask(dst_access.into())
            })
            .collect();

        let buffer_memory_barriers = self
            .buffer_memory_barriers
            .iter()
            .map(|barrier| {
                let &BufferMemoryBarrier {
                    src_stages,
                    src_access,
                    dst_stages,
                    dst_access,
                    buffer,
                    ref range,
                    _ne: _,
                } = barrier;

                src_stage_mask |= src_stages.into();
                dst_stage_mask |= dst_stages.into();

                vk::BufferMemoryBarrier::default()
                    .src_access_mask(src_access.into())
                    .dst_access_mask(dst_access.into())
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer)
                    .offset(range.start)
                    .size(range.end - range.start)
            })
            .collect();

        let image_memory_barriers = self
            .image_memory_barriers
            .iter()
            .map(|barrier| {
                let &ImageMemoryBarrier {
                    src_stages,
                    src_access,
                    dst_stages,
                    dst_access,
                    old_layout,
                    new_layout,
                    image,
                    subresource_range,
                    _ne: _,
                } = barrier;

                src_stage_mask |= src_stages.into();
                dst_stage_mask |= dst_stages.into();

                vk::ImageMemoryBarrier::default()
                    .src_access_mask(src_access.into())
                    .dst_access_mask(dst_access.into())
                    .old_layout(old_layout.into())
                    .new_layout(new_layout.into())
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(subresource_range)
            })
            .collect();

        if src_stage_mask.is_empty() {
            // "VK_PIPELINE_STAGE_2_TOP_OF_PIPE_BIT is [...] equivalent to
            // VK_PIPELINE_STAGE_2_NONE in the first scope."
            src_stage_mask |= vk::PipelineStageFlags::TOP_OF_PIPE;
        }

        if dst_stage_mask.is_empty() {
            // "VK_PIPELINE_STAGE_2_BOTTOM_OF_PIPE_BIT is [...] equivalent to
            // VK_PIPELINE_STAGE_2_NONE in the second scope."
            dst_stage_mask |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        DependencyInfoVk {
            src_stage_mask,
            dst_stage_mask,
            dependency_flags: self.dependency_flags.into(),
            memory_barriers,
            buffer_memory_barriers,
            image_memory_barriers,
        }
    }
}

pub(crate) struct DependencyInfoVk {
    pub(crate) src_stage_mask: vk::PipelineStageFlags,
    pub(crate) dst_stage_mask: vk::PipelineStageFlags,
    pub(crate) dependency_flags: vk::DependencyFlags,
    pub(crate) memory_barriers: SmallVec<[vk::MemoryBarrier<'static>; 2]>,
    pub(crate) buffer_memory_barriers: SmallVec<[vk::BufferMemoryBarrier<'static>; 4]>,
    pub(crate) image_memory_barriers: SmallVec<[vk::ImageMemoryBarrier<'static>; 4]>,
}

pub(crate) fn validate_stages(
    device: &Device,
    stages: PipelineStages,
) -> Result<(), Box<ValidationError>> {
    if stages.intersects(PipelineStages::TRANSFORM_FEEDBACK)
        && !device.enabled_extensions().ext_transform_feedback
    {
        return Err(Box::new(ValidationError {
            problem: "contains `PipelineStages::TRANSFORM_FEEDBACK`".into(),
            requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                "ext_transform_feedback",
            )])]),
            ..Default::default()
        }));
    }

    Ok(())
}

fn validate_scopes(
    device: &Device,
    src_stages: PipelineStages,
    dst_stages: PipelineStages,
) -> Result<(), Box<ValidationError>> {
    validate_stages(device, src_stages).map_err(|err| err.add_context("src_stages"))?;
    validate_stages(device, dst_stages).map_err(|err| err.add_context("dst_stages"))?;

    Ok(())
}

/// A memory barrier that is applied globally.
#[derive(Clone, Debug)]
pub struct MemoryBarrier {
    /// The pipeline stages in the source scope to wait for.
    ///
    /// The default value is [`PipelineStages::empty()`].
    pub src_stages: PipelineStages,

    /// The memory accesses in the source scope to make available and visible.
    ///
    /// The default value is [`AccessFlags::empty()`].
    pub src_access: AccessFlags,

    /// The pipeline stages in the destination scope that must wait for `src_stages`.
    ///
    /// The default value is [`PipelineStages::empty()`].
    pub dst_stages: PipelineStages,

    /// The memory accesses in the destination scope that must wait for `src_access` to be made
    /// available and visible.
    ///
    /// The default value is [`AccessFlags::empty()`].
    pub dst_access: AccessFlags,

    pub _ne: crate::NonExhaustive,
}

impl Default for MemoryBarrier {
    #[inline]
    fn default() -> Self {
        Self {
            src_stages: PipelineStages::empty(),
            src_access: AccessFlags::empty(),
            dst_stages: PipelineStages::empty(),
            dst_access: AccessFlags::empty(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl MemoryBarrier {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        validate_scopes(device, self.src_stages, self.dst_stages)
    }
}

/// A memory barrier that is applied to a single buffer.
#[derive(Clone, Debug)]
pub struct BufferMemoryBarrier {
    /// Same as [`MemoryBarrier::src_stages`].
    pub src_stages: PipelineStages,

    /// Same as [`MemoryBarrier::src_access`].
    pub src_access: AccessFlags,

    /// Same as [`MemoryBarrier::dst_stages`].
    pub dst_stages: PipelineStages,

    /// Same as [`MemoryBarrier::dst_access`].
    pub dst_access: AccessFlags,

    /// Must be set to a non-null handle.
    pub buffer: vk::Buffer,

    /// The byte range of `buffer` to apply the barrier to.
    ///
    /// The default value is empty, which must be overridden.
    pub range: Range<DeviceSize>,

    pub _ne: crate::NonExhaustive,
}

impl Default for BufferMemoryBarrier {
    #[inline]
    fn default() -> Self {
        Self {
            src_stages: PipelineStages::empty(),
            src_access: AccessFlags::empty(),
            dst_stages: PipelineStages::empty(),
            dst_access: AccessFlags::empty(),
            buffer: vk::Buffer::null(),
            range: 0..0,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl BufferMemoryBarrier {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            src_stages,
            src_access: _,
            dst_stages,
            dst_access: _,
            buffer,
            ref range,
            _ne: _,
        } = self;

        validate_scopes(device, src_stages, dst_stages)?;

        if buffer == vk::Buffer::null() {
            return Err(Box::new(ValidationError {
                context: "buffer".into(),
                problem: "is a null handle".into(),
                vuids: &["VUID-VkBufferMemoryBarrier-buffer-parameter"],
                ..Default::default()
            }));
        }

        if range.is_empty() {
            return Err(Box::new(ValidationError {
                context: "range".into(),
                problem: "is empty".into(),
                vuids: &["VUID-VkBufferMemoryBarrier-size-01188"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}

/// A memory barrier that is applied to a single image.
#[derive(Clone, Debug)]
pub struct ImageMemoryBarrier {
    /// Same as [`MemoryBarrier::src_stages`].
    pub src_stages: PipelineStages,

    /// Same as [`MemoryBarrier::src_access`].
    pub src_access: AccessFlags,

    /// Same as [`MemoryBarrier::dst_stages`].
    pub dst_stages: PipelineStages,

    /// Same as [`MemoryBarrier::dst_access`].
    pub dst_access: AccessFlags,

    /// The current layout of the subresources. `Undefined` discards their contents.
    pub old_layout: ImageLayout,

    /// The layout to transition the subresources to. Must be set to something other than
    /// `Undefined` or `Preinitialized`.
    pub new_layout: ImageLayout,

    pub image: vk::Image,

    /// The subresource range of `image` to apply the barrier to.
    ///
    /// The default value is empty, which must be overridden.
    pub subresource_range: vk::ImageSubresourceRange,

    pub _ne: crate::NonExhaustive,
}

impl Default for ImageMemoryBarrier {
    #[inline]
    fn default() -> Self {
        Self {
            src_stages: PipelineStages::empty(),
            src_access: AccessFlags::empty(),
            dst_stages: PipelineStages::empty(),
            dst_access: AccessFlags::empty(),
            old_layout: ImageLayout::Undefined,
            new_layout: ImageLayout::Undefined,
            image: vk::Image::null(),
            subresource_range: vk::ImageSubresourceRange::default(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl ImageMemoryBarrier {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            src_stages,
            src_access: _,
            dst_stages,
            dst_access: _,
            old_layout: _,
            new_layout,
            image,
            ref subresource_range,
            _ne: _,
        } = self;

        validate_scopes(device, src_stages, dst_stages)?;

        if matches!(
            new_layout,
            ImageLayout::Undefined | ImageLayout::Preinitialized
        ) {
            return Err(Box::new(ValidationError {
                context: "new_layout".into(),
                problem: "is `ImageLayout::Undefined` or `ImageLayout::Preinitialized`".into(),
                vuids: &["VUID-VkImageMemoryBarrier-newLayout-01198"],
                ..Default::default()
            }));
        }

        if image == vk::Image::null() {
            return Err(Box::new(ValidationError {
                context: "image".into(),
                problem: "is a null handle".into(),
                vuids: &["VUID-VkImageMemoryBarrier-image-parameter"],
                ..Default::default()
            }));
        }

        if !is_valid_subresource_range(subresource_range) {
            return Err(Box::new(ValidationError {
                context: "subresource_range".into(),
                problem: "selects no aspects, mip levels or array layers".into(),
                vuids: &["VUID-VkImageSubresourceRange-aspectMask-requiredbitmask"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}
