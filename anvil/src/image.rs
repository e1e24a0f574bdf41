//! Image-related value types used by recording operations.
//!
//! Images themselves are opaque to this crate: commands take raw `VkImage` handles, and the
//! caller is responsible for the layouts and subresources they pass in.

use crate::macros::{vulkan_bitflags, vulkan_enum};

vulkan_enum! {
    /// In-memory layout of the pixel data of an image.
    ImageLayout = ImageLayout(i32);

    /// The layout of the data is unknown, and the image is treated as containing no valid data.
    Undefined = UNDEFINED,

    /// A layout optimal for no particular operation, but usable by all of them.
    General = GENERAL,

    /// A layout optimal for use as a color attachment.
    ColorAttachmentOptimal = COLOR_ATTACHMENT_OPTIMAL,

    /// A layout optimal for use as a depth/stencil attachment.
    DepthStencilAttachmentOptimal = DEPTH_STENCIL_ATTACHMENT_OPTIMAL,

    /// A layout optimal for read-only use as a depth/stencil attachment or in shaders.
    DepthStencilReadOnlyOptimal = DEPTH_STENCIL_READ_ONLY_OPTIMAL,

    /// A layout optimal for read-only use in shaders.
    ShaderReadOnlyOptimal = SHADER_READ_ONLY_OPTIMAL,

    /// A layout optimal for use as the source of transfer operations.
    TransferSrcOptimal = TRANSFER_SRC_OPTIMAL,

    /// A layout optimal for use as the destination of transfer operations.
    TransferDstOptimal = TRANSFER_DST_OPTIMAL,

    /// The layout of linear images that were written to by the host before use.
    Preinitialized = PREINITIALIZED,

    /// The layout of swapchain images that are about to be presented.
    PresentSrc = PRESENT_SRC_KHR,
}

impl ImageLayout {
    /// Returns whether an image in this layout can be the source of a transfer command.
    #[inline]
    pub fn is_valid_transfer_src(self) -> bool {
        matches!(self, Self::General | Self::TransferSrcOptimal)
    }

    /// Returns whether an image in this layout can be the destination of a transfer command.
    #[inline]
    pub fn is_valid_transfer_dst(self) -> bool {
        matches!(self, Self::General | Self::TransferDstOptimal)
    }
}

vulkan_bitflags! {
    /// An individual data type within an image.
    ImageAspects = ImageAspectFlags(u32);

    /// The single aspect of images with a color format.
    COLOR = COLOR,

    /// The single aspect of images with a depth format, or one of the two aspects of images
    /// with a combined depth/stencil format.
    DEPTH = DEPTH,

    /// The single aspect of images with a stencil format, or one of the two aspects of images
    /// with a combined depth/stencil format.
    STENCIL = STENCIL,

    /// An aspect used with sparse memory on some implementations, to hold implementation-defined
    /// metadata of an image.
    METADATA = METADATA,
}

vulkan_enum! {
    /// The filter to use when a blit scales an image.
    Filter = Filter(i32);

    /// The nearest texel is used.
    Nearest = NEAREST,

    /// The texels are linearly interpolated.
    Linear = LINEAR,
}

/// Returns whether `range` selects at least one mip level and array layer of at least one
/// aspect.
pub(crate) fn is_valid_subresource_range(range: &ash::vk::ImageSubresourceRange) -> bool {
    !range.aspect_mask.is_empty() && range.level_count != 0 && range.layer_count != 0
}

/// Returns whether `layers` selects at least one array layer of at least one aspect.
pub(crate) fn is_valid_subresource_layers(layers: &ash::vk::ImageSubresourceLayers) -> bool {
    !layers.aspect_mask.is_empty() && layers.layer_count != 0
}
