use super::{
    ClearAttachment, RenderPassBeginInfo, SampleLocationsInfo, SubpassContents,
};
use crate::{
    format::{ClearColorValue, ClearDepthStencilValue},
    image::{Filter, ImageLayout},
    pipeline::{IndexType, PipelineBindPoint, ShaderStages, StencilFaces},
    query::{QueryControlFlags, QueryResultFlags},
    sync::{DependencyInfo, PipelineStages},
    DeviceSize,
};
use ash::vk;
use smallvec::SmallVec;

/// An owned copy of a command recorded into a [`CommandBuffer`].
///
/// Resources are referred to by their raw handles. The command buffer does not keep them alive,
/// so a handle in a stashed command may have been destroyed since.
///
/// [`CommandBuffer`]: super::CommandBuffer
#[derive(Clone, Debug)]
pub enum Command {
    BindPipeline {
        pipeline_bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: SmallVec<[vk::DescriptorSet; 4]>,
        dynamic_offsets: SmallVec<[u32; 4]>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: SmallVec<[vk::Buffer; 4]>,
        offsets: SmallVec<[DeviceSize; 4]>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },

    SetViewport {
        first_viewport: u32,
        viewports: SmallVec<[vk::Viewport; 2]>,
    },
    SetScissor {
        first_scissor: u32,
        scissors: SmallVec<[vk::Rect2D; 2]>,
    },
    SetLineWidth {
        line_width: f32,
    },
    SetDepthBias {
        constant_factor: f32,
        clamp: f32,
        slope_factor: f32,
    },
    SetBlendConstants {
        constants: [f32; 4],
    },
    SetDepthBounds {
        min_depth_bounds: f32,
        max_depth_bounds: f32,
    },
    SetStencilCompareMask {
        faces: StencilFaces,
        compare_mask: u32,
    },
    SetStencilWriteMask {
        faces: StencilFaces,
        write_mask: u32,
    },
    SetStencilReference {
        faces: StencilFaces,
        reference: u32,
    },
    SetDeviceMask {
        device_mask: u32,
    },
    SetSampleLocations {
        sample_locations_info: SampleLocationsInfo,
    },

    PipelineBarrier {
        dependency_info: DependencyInfo,
    },
    WaitEvents {
        events: SmallVec<[vk::Event; 2]>,
        dependency_info: DependencyInfo,
    },
    SetEvent {
        event: vk::Event,
        stages: PipelineStages,
    },
    ResetEvent {
        event: vk::Event,
        stages: PipelineStages,
    },

    BeginQuery {
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
    },
    EndQuery {
        query_pool: vk::QueryPool,
        query: u32,
    },
    BeginQueryIndexed {
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
        index: u32,
    },
    EndQueryIndexed {
        query_pool: vk::QueryPool,
        query: u32,
        index: u32,
    },
    WriteTimestamp {
        stage: PipelineStages,
        query_pool: vk::QueryPool,
        query: u32,
    },
    ResetQueryPool {
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    },
    CopyQueryPoolResults {
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
        flags: QueryResultFlags,
    },

    WriteBufferMarker {
        stage: PipelineStages,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        marker: u32,
    },
    DebugMarkerBegin {
        name: String,
        color: [f32; 4],
    },
    DebugMarkerEnd,
    DebugMarkerInsert {
        name: String,
        color: [f32; 4],
    },

    CopyBuffer {
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: SmallVec<[vk::BufferCopy; 1]>,
    },
    CopyImage {
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: SmallVec<[vk::ImageCopy; 1]>,
    },
    BlitImage {
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: SmallVec<[vk::ImageBlit; 1]>,
        filter: Filter,
    },
    CopyBufferToImage {
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: SmallVec<[vk::BufferImageCopy; 1]>,
    },
    CopyImageToBuffer {
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_buffer: vk::Buffer,
        regions: SmallVec<[vk::BufferImageCopy; 1]>,
    },
    UpdateBuffer {
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        data: Vec<u8>,
    },
    FillBuffer {
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    },
    ResolveImage {
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: SmallVec<[vk::ImageResolve; 1]>,
    },

    ClearColorImage {
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearColorValue,
        regions: SmallVec<[vk::ImageSubresourceRange; 1]>,
    },
    ClearDepthStencilImage {
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearDepthStencilValue,
        regions: SmallVec<[vk::ImageSubresourceRange; 1]>,
    },
    ClearAttachments {
        attachments: SmallVec<[ClearAttachment; 4]>,
        rects: SmallVec<[vk::ClearRect; 4]>,
    },

    Dispatch {
        group_counts: [u32; 3],
    },
    DispatchBase {
        base_group: [u32; 3],
        group_counts: [u32; 3],
    },
    DispatchIndirect {
        buffer: vk::Buffer,
        offset: DeviceSize,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    DrawIndirectCount {
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirectCount {
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndirectByteCount {
        instance_count: u32,
        first_instance: u32,
        counter_buffer: vk::Buffer,
        counter_buffer_offset: DeviceSize,
        counter_offset: u32,
        vertex_stride: u32,
    },

    BindTransformFeedbackBuffers {
        first_binding: u32,
        buffers: SmallVec<[vk::Buffer; 4]>,
        offsets: SmallVec<[DeviceSize; 4]>,
        sizes: SmallVec<[DeviceSize; 4]>,
    },
    BeginTransformFeedback {
        first_counter_buffer: u32,
        counter_buffers: SmallVec<[vk::Buffer; 4]>,
        counter_buffer_offsets: SmallVec<[DeviceSize; 4]>,
    },
    EndTransformFeedback {
        first_counter_buffer: u32,
        counter_buffers: SmallVec<[vk::Buffer; 4]>,
        counter_buffer_offsets: SmallVec<[DeviceSize; 4]>,
    },

    /// `render_pass2` is `true` if the command was recorded with `vkCmdBeginRenderPass2`.
    BeginRenderPass {
        render_pass_begin_info: RenderPassBeginInfo,
        contents: SubpassContents,
        render_pass2: bool,
    },
    NextSubpass {
        contents: SubpassContents,
        render_pass2: bool,
    },
    EndRenderPass {
        render_pass2: bool,
    },
    ExecuteCommands {
        command_buffers: SmallVec<[vk::CommandBuffer; 4]>,
    },
}
