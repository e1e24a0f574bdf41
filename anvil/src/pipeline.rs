//! Pipeline-related value types used by binding and push constant commands.

use crate::macros::{vulkan_bitflags, vulkan_enum};

vulkan_enum! {
    /// The type of a pipeline.
    ///
    /// When binding a pipeline or descriptor sets in a command buffer, the state for each bind
    /// point is independent from the others. This means that it is possible, for example, to
    /// bind a graphics pipeline without disturbing any bound compute pipeline.
    PipelineBindPoint = PipelineBindPoint(i32);

    /// The pipeline is used for compute dispatches.
    Compute = COMPUTE,

    /// The pipeline is used for draw commands.
    Graphics = GRAPHICS,
}

vulkan_enum! {
    /// The type of index that is used in an index buffer.
    IndexType = IndexType(i32);

    /// Indices are 16-bit unsigned integers.
    U16 = UINT16,

    /// Indices are 32-bit unsigned integers.
    U32 = UINT32,
}

impl IndexType {
    /// Returns the size in bytes of indices of this type.
    #[inline]
    pub fn size(self) -> u64 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

vulkan_bitflags! {
    /// A set of shader stages.
    ShaderStages = ShaderStageFlags(u32);

    VERTEX = VERTEX,
    TESSELLATION_CONTROL = TESSELLATION_CONTROL,
    TESSELLATION_EVALUATION = TESSELLATION_EVALUATION,
    GEOMETRY = GEOMETRY,
    FRAGMENT = FRAGMENT,
    COMPUTE = COMPUTE,
}

vulkan_bitflags! {
    /// Which faces of a primitive a stencil state command applies to.
    StencilFaces = StencilFaceFlags(u32);

    FRONT = FRONT,
    BACK = BACK,
}
