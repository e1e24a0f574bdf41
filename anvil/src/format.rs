//! Values used to clear images and attachments.
//!
//! The format of an image decides which kind of clear value is valid for it. Since images are
//! opaque to this crate, only the shape of the value is checked.

/// A value that will be used to clear a color image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearColorValue {
    /// Value for formats with a numeric type that is not `SINT` or `UINT`.
    Float([f32; 4]),
    /// Value for formats with a numeric type of `SINT`.
    Int([i32; 4]),
    /// Value for formats with a numeric type of `UINT`.
    Uint([u32; 4]),
}

impl From<ClearColorValue> for ash::vk::ClearColorValue {
    #[inline]
    fn from(val: ClearColorValue) -> Self {
        match val {
            ClearColorValue::Float(float32) => Self { float32 },
            ClearColorValue::Int(int32) => Self { int32 },
            ClearColorValue::Uint(uint32) => Self { uint32 },
        }
    }
}

impl From<[f32; 4]> for ClearColorValue {
    #[inline]
    fn from(val: [f32; 4]) -> Self {
        Self::Float(val)
    }
}

impl From<[i32; 4]> for ClearColorValue {
    #[inline]
    fn from(val: [i32; 4]) -> Self {
        Self::Int(val)
    }
}

impl From<[u32; 4]> for ClearColorValue {
    #[inline]
    fn from(val: [u32; 4]) -> Self {
        Self::Uint(val)
    }
}

/// A value that will be used to clear a depth/stencil image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClearDepthStencilValue {
    /// Value to clear the depth component with.
    pub depth: f32,
    /// Value to clear the stencil component with.
    pub stencil: u32,
}

impl ClearDepthStencilValue {
    /// Returns whether `depth` is within the `[0.0, 1.0]` range that Vulkan accepts without
    /// the `VK_EXT_depth_range_unrestricted` extension.
    #[inline]
    pub fn is_depth_in_unit_range(&self) -> bool {
        (0.0..=1.0).contains(&self.depth)
    }
}

impl From<ClearDepthStencilValue> for ash::vk::ClearDepthStencilValue {
    #[inline]
    fn from(val: ClearDepthStencilValue) -> Self {
        let ClearDepthStencilValue { depth, stencil } = val;

        ash::vk::ClearDepthStencilValue { depth, stencil }
    }
}

/// A value that will be used to clear an attachment when a render pass begins, or with
/// `clear_attachments`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    /// Value for floating-point attachments, including `UNORM`, `SNORM`, `SFLOAT`.
    Float([f32; 4]),
    /// Value for integer attachments, including `SINT`.
    Int([i32; 4]),
    /// Value for unsigned integer attachments, including `UINT`.
    Uint([u32; 4]),
    /// Value for depth attachments.
    Depth(f32),
    /// Value for stencil attachments.
    Stencil(u32),
    /// Value for depth and stencil attachments.
    DepthStencil((f32, u32)),
}

impl ClearValue {
    /// Returns whether the value clears a color attachment.
    #[inline]
    pub fn is_color(&self) -> bool {
        matches!(self, Self::Float(_) | Self::Int(_) | Self::Uint(_))
    }
}

impl From<ClearValue> for ash::vk::ClearValue {
    #[inline]
    fn from(val: ClearValue) -> Self {
        match val {
            ClearValue::Float(float32) => Self {
                color: ash::vk::ClearColorValue { float32 },
            },
            ClearValue::Int(int32) => Self {
                color: ash::vk::ClearColorValue { int32 },
            },
            ClearValue::Uint(uint32) => Self {
                color: ash::vk::ClearColorValue { uint32 },
            },
            ClearValue::Depth(depth) => Self {
                depth_stencil: ash::vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
            ClearValue::Stencil(stencil) => Self {
                depth_stencil: ash::vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil,
                },
            },
            ClearValue::DepthStencil((depth, stencil)) => Self {
                depth_stencil: ash::vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

impl From<ClearColorValue> for ClearValue {
    #[inline]
    fn from(val: ClearColorValue) -> Self {
        match val {
            ClearColorValue::Float(val) => Self::Float(val),
            ClearColorValue::Int(val) => Self::Int(val),
            ClearColorValue::Uint(val) => Self::Uint(val),
        }
    }
}

impl From<ClearDepthStencilValue> for ClearValue {
    #[inline]
    fn from(val: ClearDepthStencilValue) -> Self {
        Self::DepthStencil((val.depth, val.stencil))
    }
}
