#![cfg(test)]

//! A mock Vulkan driver for unit tests.
//!
//! Every entrypoint the crate calls is replaced with a stub that appends its name to a
//! thread-local call log. Functions returning `VkResult` succeed, unless a failure was requested
//! with [`fail_next`]. Object creation functions hand out fresh handles.

use ash::vk::{self, Handle};
use std::{
    cell::{Cell, RefCell},
    ffi::{c_void, CStr},
    sync::atomic::{AtomicU64, Ordering},
};

/// Creates a `Device` backed by the mock driver.
///
/// ```ignore
/// let device = mock_device!();
/// let device = mock_device!(api_version: Version::V1_1, physical_device_count: 2);
/// let device = mock_device!(extensions: [ext_debug_marker], api_version: Version::V1_2);
/// ```
macro_rules! mock_device {
    (extensions: [$($extension:ident),* $(,)?] $(, $field:ident: $value:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut create_info = $crate::device::DeviceCreateInfo::default();
        $(create_info.$field = $value;)*
        $(create_info.enabled_extensions.$extension = true;)*

        unsafe {
            $crate::device::Device::from_handle(
                <ash::vk::Device as ash::vk::Handle>::from_raw(0x1000),
                create_info,
                $crate::tests::lookup,
            )
        }
        .unwrap()
    }};
    ($($field:ident: $value:expr),* $(,)?) => {
        mock_device!(extensions: [] $(, $field: $value)*)
    };
}

thread_local! {
    static CALLS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static FAIL_NEXT: Cell<Option<&'static str>> = const { Cell::new(None) };
    static BEGIN_INFO: Cell<Option<BeginInfo>> = const { Cell::new(None) };
    static RENDER_PASS_INFO: Cell<Option<RenderPassInfo>> = const { Cell::new(None) };
    static DEBUG_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
    static POOL_FLAGS: Cell<Option<vk::CommandPoolCreateFlags>> = const { Cell::new(None) };
}

/// What the last `vkBeginCommandBuffer` call received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BeginInfo {
    pub(crate) flags: vk::CommandBufferUsageFlags,
    pub(crate) device_mask: Option<u32>,
    pub(crate) has_inheritance: bool,
}

/// What the last `vkCmdBeginRenderPass*` call received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RenderPassInfo {
    pub(crate) clear_value_count: u32,
    pub(crate) device_mask: Option<u32>,
    pub(crate) device_render_area_count: u32,
}

/// Returns and clears the entrypoints called on this thread so far.
pub(crate) fn take_calls() -> Vec<&'static str> {
    CALLS.with_borrow_mut(std::mem::take)
}

/// Returns whether the entrypoint was called on this thread, without clearing the log.
pub(crate) fn was_called(name: &str) -> bool {
    CALLS.with_borrow(|calls| calls.contains(&name))
}

/// Makes the next call to `name` on this thread return `VK_ERROR_OUT_OF_HOST_MEMORY`.
pub(crate) fn fail_next(name: &'static str) {
    FAIL_NEXT.set(Some(name));
}

pub(crate) fn last_begin_info() -> Option<BeginInfo> {
    BEGIN_INFO.get()
}

pub(crate) fn last_render_pass_info() -> Option<RenderPassInfo> {
    RENDER_PASS_INFO.get()
}

/// The flags of the last `vkCreateCommandPool` call.
pub(crate) fn last_pool_flags() -> Option<vk::CommandPoolCreateFlags> {
    POOL_FLAGS.get()
}

pub(crate) fn last_debug_name() -> Option<String> {
    DEBUG_NAME.with_borrow(Clone::clone)
}

fn log_call(name: &'static str) {
    CALLS.with_borrow_mut(|calls| calls.push(name));
}

fn result_for(name: &'static str) -> vk::Result {
    if FAIL_NEXT.get() == Some(name) {
        FAIL_NEXT.set(None);
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
    } else {
        vk::Result::SUCCESS
    }
}

fn next_handle() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0x10000);

    COUNTER.fetch_add(1, Ordering::Relaxed)
}

// Walks a `pNext` chain looking for a structure of type `s_type`.
unsafe fn find_in_chain(mut next: *const c_void, s_type: vk::StructureType) -> *const c_void {
    while !next.is_null() {
        let base = unsafe { &*next.cast::<vk::BaseInStructure<'_>>() };

        if base.s_type == s_type {
            return next;
        }

        next = base.p_next.cast();
    }

    std::ptr::null()
}

unsafe extern "system" fn create_command_pool(
    _device: vk::Device,
    create_info: *const c_void,
    _allocator: *const c_void,
    pool: *mut vk::CommandPool,
) -> vk::Result {
    log_call("vkCreateCommandPool");
    let create_info = unsafe { &*create_info.cast::<vk::CommandPoolCreateInfo<'_>>() };
    POOL_FLAGS.set(Some(create_info.flags));
    let result = result_for("vkCreateCommandPool");

    if result == vk::Result::SUCCESS {
        unsafe { pool.write(vk::CommandPool::from_raw(next_handle())) };
    }

    result
}

unsafe extern "system" fn allocate_command_buffers(
    _device: vk::Device,
    allocate_info: *const vk::CommandBufferAllocateInfo<'_>,
    command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    log_call("vkAllocateCommandBuffers");
    let result = result_for("vkAllocateCommandBuffers");

    if result == vk::Result::SUCCESS {
        let count = unsafe { (*allocate_info).command_buffer_count };

        for index in 0..count as usize {
            unsafe {
                command_buffers
                    .add(index)
                    .write(vk::CommandBuffer::from_raw(next_handle()))
            };
        }
    }

    result
}

unsafe extern "system" fn begin_command_buffer(
    _command_buffer: vk::CommandBuffer,
    begin_info: *const vk::CommandBufferBeginInfo<'_>,
) -> vk::Result {
    log_call("vkBeginCommandBuffer");

    let begin_info = unsafe { &*begin_info };
    let device_group = unsafe {
        find_in_chain(
            begin_info.p_next,
            vk::StructureType::DEVICE_GROUP_COMMAND_BUFFER_BEGIN_INFO,
        )
    };

    BEGIN_INFO.set(Some(BeginInfo {
        flags: begin_info.flags,
        device_mask: (!device_group.is_null()).then(|| unsafe {
            (*device_group.cast::<vk::DeviceGroupCommandBufferBeginInfo<'_>>()).device_mask
        }),
        has_inheritance: !begin_info.p_inheritance_info.is_null(),
    }));

    result_for("vkBeginCommandBuffer")
}

unsafe fn capture_render_pass_begin(begin_info: *const vk::RenderPassBeginInfo<'_>) {
    let begin_info = unsafe { &*begin_info };
    let device_group = unsafe {
        find_in_chain(
            begin_info.p_next,
            vk::StructureType::DEVICE_GROUP_RENDER_PASS_BEGIN_INFO,
        )
    }
    .cast::<vk::DeviceGroupRenderPassBeginInfo<'_>>();

    let (device_mask, device_render_area_count) = if device_group.is_null() {
        (None, 0)
    } else {
        let device_group = unsafe { &*device_group };
        (
            Some(device_group.device_mask),
            device_group.device_render_area_count,
        )
    };

    RENDER_PASS_INFO.set(Some(RenderPassInfo {
        clear_value_count: begin_info.clear_value_count,
        device_mask,
        device_render_area_count,
    }));
}

unsafe extern "system" fn cmd_begin_render_pass(
    _command_buffer: vk::CommandBuffer,
    begin_info: *const vk::RenderPassBeginInfo<'_>,
    _contents: vk::SubpassContents,
) {
    log_call("vkCmdBeginRenderPass");
    unsafe { capture_render_pass_begin(begin_info) };
}

unsafe extern "system" fn cmd_begin_render_pass2(
    _command_buffer: vk::CommandBuffer,
    begin_info: *const vk::RenderPassBeginInfo<'_>,
    _subpass_begin_info: *const c_void,
) {
    log_call("vkCmdBeginRenderPass2");
    unsafe { capture_render_pass_begin(begin_info) };
}

unsafe extern "system" fn cmd_begin_render_pass2_khr(
    _command_buffer: vk::CommandBuffer,
    begin_info: *const vk::RenderPassBeginInfo<'_>,
    _subpass_begin_info: *const c_void,
) {
    log_call("vkCmdBeginRenderPass2KHR");
    unsafe { capture_render_pass_begin(begin_info) };
}

unsafe extern "system" fn debug_marker_set_object_name_ext(
    _device: vk::Device,
    name_info: *const vk::DebugMarkerObjectNameInfoEXT<'_>,
) -> vk::Result {
    log_call("vkDebugMarkerSetObjectNameEXT");

    let name = unsafe { CStr::from_ptr((*name_info).p_object_name) };
    DEBUG_NAME.set(Some(name.to_string_lossy().into_owned()));

    result_for("vkDebugMarkerSetObjectNameEXT")
}

macro_rules! mock_entrypoints {
    (
        $(
            $vk_name:literal => fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
        )+
    ) => {
        $(
            #[allow(unused_variables)]
            unsafe extern "system" fn $name($($arg: $ty),*) $(-> $ret)? {
                log_call($vk_name);
                $(return <$ret>::from(result_for($vk_name));)?
            }
        )+

        fn lookup_generated(name: &CStr) -> *const c_void {
            $(
                if name.to_bytes() == $vk_name.as_bytes() {
                    return $name as *const c_void;
                }
            )+

            std::ptr::null()
        }
    };
}

type Cb = vk::CommandBuffer;
type Ptr = *const c_void;

mock_entrypoints! {
    "vkDestroyCommandPool" => fn destroy_command_pool(d: vk::Device, p: vk::CommandPool, a: Ptr);
    "vkResetCommandPool" => fn reset_command_pool(
        d: vk::Device,
        p: vk::CommandPool,
        f: vk::CommandPoolResetFlags,
    ) -> vk::Result;
    "vkFreeCommandBuffers" => fn free_command_buffers(
        d: vk::Device,
        p: vk::CommandPool,
        n: u32,
        c: Ptr,
    );
    "vkEndCommandBuffer" => fn end_command_buffer(cb: Cb) -> vk::Result;
    "vkResetCommandBuffer" => fn reset_command_buffer(
        cb: Cb,
        f: vk::CommandBufferResetFlags,
    ) -> vk::Result;

    "vkCmdBindPipeline" => fn cmd_bind_pipeline(
        cb: Cb,
        b: vk::PipelineBindPoint,
        p: vk::Pipeline,
    );
    "vkCmdSetViewport" => fn cmd_set_viewport(cb: Cb, first: u32, n: u32, v: Ptr);
    "vkCmdSetScissor" => fn cmd_set_scissor(cb: Cb, first: u32, n: u32, s: Ptr);
    "vkCmdSetLineWidth" => fn cmd_set_line_width(cb: Cb, w: f32);
    "vkCmdSetDepthBias" => fn cmd_set_depth_bias(cb: Cb, c: f32, clamp: f32, s: f32);
    "vkCmdSetBlendConstants" => fn cmd_set_blend_constants(cb: Cb, c: Ptr);
    "vkCmdSetDepthBounds" => fn cmd_set_depth_bounds(cb: Cb, min: f32, max: f32);
    "vkCmdSetStencilCompareMask" => fn cmd_set_stencil_compare_mask(
        cb: Cb,
        f: vk::StencilFaceFlags,
        m: u32,
    );
    "vkCmdSetStencilWriteMask" => fn cmd_set_stencil_write_mask(
        cb: Cb,
        f: vk::StencilFaceFlags,
        m: u32,
    );
    "vkCmdSetStencilReference" => fn cmd_set_stencil_reference(
        cb: Cb,
        f: vk::StencilFaceFlags,
        r: u32,
    );
    "vkCmdBindDescriptorSets" => fn cmd_bind_descriptor_sets(
        cb: Cb,
        b: vk::PipelineBindPoint,
        l: vk::PipelineLayout,
        first: u32,
        n: u32,
        s: Ptr,
        dn: u32,
        d: Ptr,
    );
    "vkCmdBindIndexBuffer" => fn cmd_bind_index_buffer(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        t: vk::IndexType,
    );
    "vkCmdBindVertexBuffers" => fn cmd_bind_vertex_buffers(
        cb: Cb,
        first: u32,
        n: u32,
        b: Ptr,
        o: Ptr,
    );
    "vkCmdDraw" => fn cmd_draw(cb: Cb, v: u32, i: u32, fv: u32, fi: u32);
    "vkCmdDrawIndexed" => fn cmd_draw_indexed(
        cb: Cb,
        idx: u32,
        i: u32,
        fidx: u32,
        vo: i32,
        fi: u32,
    );
    "vkCmdDrawIndirect" => fn cmd_draw_indirect(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        n: u32,
        s: u32,
    );
    "vkCmdDrawIndexedIndirect" => fn cmd_draw_indexed_indirect(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        n: u32,
        s: u32,
    );
    "vkCmdDispatch" => fn cmd_dispatch(cb: Cb, x: u32, y: u32, z: u32);
    "vkCmdDispatchIndirect" => fn cmd_dispatch_indirect(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
    );
    "vkCmdCopyBuffer" => fn cmd_copy_buffer(
        cb: Cb,
        s: vk::Buffer,
        d: vk::Buffer,
        n: u32,
        r: Ptr,
    );
    "vkCmdCopyImage" => fn cmd_copy_image(
        cb: Cb,
        s: vk::Image,
        sl: vk::ImageLayout,
        d: vk::Image,
        dl: vk::ImageLayout,
        n: u32,
        r: Ptr,
    );
    "vkCmdBlitImage" => fn cmd_blit_image(
        cb: Cb,
        s: vk::Image,
        sl: vk::ImageLayout,
        d: vk::Image,
        dl: vk::ImageLayout,
        n: u32,
        r: Ptr,
        f: vk::Filter,
    );
    "vkCmdCopyBufferToImage" => fn cmd_copy_buffer_to_image(
        cb: Cb,
        s: vk::Buffer,
        d: vk::Image,
        dl: vk::ImageLayout,
        n: u32,
        r: Ptr,
    );
    "vkCmdCopyImageToBuffer" => fn cmd_copy_image_to_buffer(
        cb: Cb,
        s: vk::Image,
        sl: vk::ImageLayout,
        d: vk::Buffer,
        n: u32,
        r: Ptr,
    );
    "vkCmdUpdateBuffer" => fn cmd_update_buffer(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        s: vk::DeviceSize,
        data: Ptr,
    );
    "vkCmdFillBuffer" => fn cmd_fill_buffer(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        s: vk::DeviceSize,
        data: u32,
    );
    "vkCmdClearColorImage" => fn cmd_clear_color_image(
        cb: Cb,
        i: vk::Image,
        l: vk::ImageLayout,
        c: Ptr,
        n: u32,
        r: Ptr,
    );
    "vkCmdClearDepthStencilImage" => fn cmd_clear_depth_stencil_image(
        cb: Cb,
        i: vk::Image,
        l: vk::ImageLayout,
        c: Ptr,
        n: u32,
        r: Ptr,
    );
    "vkCmdClearAttachments" => fn cmd_clear_attachments(
        cb: Cb,
        an: u32,
        a: Ptr,
        rn: u32,
        r: Ptr,
    );
    "vkCmdResolveImage" => fn cmd_resolve_image(
        cb: Cb,
        s: vk::Image,
        sl: vk::ImageLayout,
        d: vk::Image,
        dl: vk::ImageLayout,
        n: u32,
        r: Ptr,
    );
    "vkCmdSetEvent" => fn cmd_set_event(cb: Cb, e: vk::Event, s: vk::PipelineStageFlags);
    "vkCmdResetEvent" => fn cmd_reset_event(cb: Cb, e: vk::Event, s: vk::PipelineStageFlags);
    "vkCmdWaitEvents" => fn cmd_wait_events(
        cb: Cb,
        en: u32,
        e: Ptr,
        ss: vk::PipelineStageFlags,
        ds: vk::PipelineStageFlags,
        mn: u32,
        m: Ptr,
        bn: u32,
        b: Ptr,
        imn: u32,
        im: Ptr,
    );
    "vkCmdPipelineBarrier" => fn cmd_pipeline_barrier(
        cb: Cb,
        ss: vk::PipelineStageFlags,
        ds: vk::PipelineStageFlags,
        f: vk::DependencyFlags,
        mn: u32,
        m: Ptr,
        bn: u32,
        b: Ptr,
        imn: u32,
        im: Ptr,
    );
    "vkCmdBeginQuery" => fn cmd_begin_query(
        cb: Cb,
        p: vk::QueryPool,
        q: u32,
        f: vk::QueryControlFlags,
    );
    "vkCmdEndQuery" => fn cmd_end_query(cb: Cb, p: vk::QueryPool, q: u32);
    "vkCmdResetQueryPool" => fn cmd_reset_query_pool(
        cb: Cb,
        p: vk::QueryPool,
        first: u32,
        n: u32,
    );
    "vkCmdWriteTimestamp" => fn cmd_write_timestamp(
        cb: Cb,
        s: vk::PipelineStageFlags,
        p: vk::QueryPool,
        q: u32,
    );
    "vkCmdCopyQueryPoolResults" => fn cmd_copy_query_pool_results(
        cb: Cb,
        p: vk::QueryPool,
        first: u32,
        n: u32,
        d: vk::Buffer,
        o: vk::DeviceSize,
        s: vk::DeviceSize,
        f: vk::QueryResultFlags,
    );
    "vkCmdPushConstants" => fn cmd_push_constants(
        cb: Cb,
        l: vk::PipelineLayout,
        s: vk::ShaderStageFlags,
        o: u32,
        n: u32,
        v: Ptr,
    );
    "vkCmdNextSubpass" => fn cmd_next_subpass(cb: Cb, c: vk::SubpassContents);
    "vkCmdEndRenderPass" => fn cmd_end_render_pass(cb: Cb);
    "vkCmdExecuteCommands" => fn cmd_execute_commands(cb: Cb, n: u32, c: Ptr);

    "vkCmdSetDeviceMask" => fn cmd_set_device_mask(cb: Cb, m: u32);
    "vkCmdSetDeviceMaskKHR" => fn cmd_set_device_mask_khr(cb: Cb, m: u32);
    "vkCmdDispatchBase" => fn cmd_dispatch_base(
        cb: Cb,
        bx: u32,
        by: u32,
        bz: u32,
        x: u32,
        y: u32,
        z: u32,
    );
    "vkCmdDispatchBaseKHR" => fn cmd_dispatch_base_khr(
        cb: Cb,
        bx: u32,
        by: u32,
        bz: u32,
        x: u32,
        y: u32,
        z: u32,
    );

    "vkCmdDrawIndirectCount" => fn cmd_draw_indirect_count(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        cbuf: vk::Buffer,
        co: vk::DeviceSize,
        max: u32,
        s: u32,
    );
    "vkCmdDrawIndexedIndirectCount" => fn cmd_draw_indexed_indirect_count(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        cbuf: vk::Buffer,
        co: vk::DeviceSize,
        max: u32,
        s: u32,
    );
    "vkCmdDrawIndirectCountKHR" => fn cmd_draw_indirect_count_khr(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        cbuf: vk::Buffer,
        co: vk::DeviceSize,
        max: u32,
        s: u32,
    );
    "vkCmdDrawIndexedIndirectCountKHR" => fn cmd_draw_indexed_indirect_count_khr(
        cb: Cb,
        b: vk::Buffer,
        o: vk::DeviceSize,
        cbuf: vk::Buffer,
        co: vk::DeviceSize,
        max: u32,
        s: u32,
    );

    "vkCmdNextSubpass2" => fn cmd_next_subpass2(cb: Cb, b: Ptr, e: Ptr);
    "vkCmdNextSubpass2KHR" => fn cmd_next_subpass2_khr(cb: Cb, b: Ptr, e: Ptr);
    "vkCmdEndRenderPass2" => fn cmd_end_render_pass2(cb: Cb, e: Ptr);
    "vkCmdEndRenderPass2KHR" => fn cmd_end_render_pass2_khr(cb: Cb, e: Ptr);

    "vkCmdBindTransformFeedbackBuffersEXT" => fn cmd_bind_transform_feedback_buffers_ext(
        cb: Cb,
        first: u32,
        n: u32,
        b: Ptr,
        o: Ptr,
        s: Ptr,
    );
    "vkCmdBeginTransformFeedbackEXT" => fn cmd_begin_transform_feedback_ext(
        cb: Cb,
        first: u32,
        n: u32,
        b: Ptr,
        o: Ptr,
    );
    "vkCmdEndTransformFeedbackEXT" => fn cmd_end_transform_feedback_ext(
        cb: Cb,
        first: u32,
        n: u32,
        b: Ptr,
        o: Ptr,
    );
    "vkCmdBeginQueryIndexedEXT" => fn cmd_begin_query_indexed_ext(
        cb: Cb,
        p: vk::QueryPool,
        q: u32,
        f: vk::QueryControlFlags,
        i: u32,
    );
    "vkCmdEndQueryIndexedEXT" => fn cmd_end_query_indexed_ext(
        cb: Cb,
        p: vk::QueryPool,
        q: u32,
        i: u32,
    );
    "vkCmdDrawIndirectByteCountEXT" => fn cmd_draw_indirect_byte_count_ext(
        cb: Cb,
        i: u32,
        fi: u32,
        b: vk::Buffer,
        o: vk::DeviceSize,
        co: u32,
        s: u32,
    );

    "vkCmdSetSampleLocationsEXT" => fn cmd_set_sample_locations_ext(cb: Cb, i: Ptr);
    "vkCmdWriteBufferMarkerAMD" => fn cmd_write_buffer_marker_amd(
        cb: Cb,
        s: vk::PipelineStageFlags,
        b: vk::Buffer,
        o: vk::DeviceSize,
        m: u32,
    );
    "vkCmdDebugMarkerBeginEXT" => fn cmd_debug_marker_begin_ext(cb: Cb, i: Ptr);
    "vkCmdDebugMarkerEndEXT" => fn cmd_debug_marker_end_ext(cb: Cb);
    "vkCmdDebugMarkerInsertEXT" => fn cmd_debug_marker_insert_ext(cb: Cb, i: Ptr);
}

/// Resolves an entrypoint of the mock driver. Unknown names resolve to null.
pub(crate) fn lookup(name: &CStr) -> *const c_void {
    match name.to_bytes() {
        b"vkCreateCommandPool" => create_command_pool as *const c_void,
        b"vkAllocateCommandBuffers" => allocate_command_buffers as *const c_void,
        b"vkBeginCommandBuffer" => begin_command_buffer as *const c_void,
        b"vkCmdBeginRenderPass" => cmd_begin_render_pass as *const c_void,
        b"vkCmdBeginRenderPass2" => cmd_begin_render_pass2 as *const c_void,
        b"vkCmdBeginRenderPass2KHR" => cmd_begin_render_pass2_khr as *const c_void,
        b"vkDebugMarkerSetObjectNameEXT" => debug_marker_set_object_name_ext as *const c_void,
        _ => lookup_generated(name),
    }
}
