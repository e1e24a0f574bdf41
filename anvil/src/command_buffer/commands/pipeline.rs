use crate::{
    command_buffer::{
        commands::transfer::validate_non_null,
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    device::DeviceOwned,
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError, Version,
};
use ash::vk;
use std::mem::size_of;

/// # Commands to execute a bound pipeline.
///
/// Dispatch commands can only be recorded outside of a render pass, and draw commands only
/// inside of one.
impl CommandBuffer {
    /// Performs a single compute operation using a compute pipeline.
    pub fn dispatch(&mut self, group_counts: [u32; 3]) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)
            .map_err(|err| self.rejected("dispatch", err))?;

        Ok(unsafe { self.dispatch_unchecked(group_counts) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn dispatch_unchecked(&mut self, group_counts: [u32; 3]) -> &mut Self {
        let [x, y, z] = group_counts;

        self.emit(|fns, command_buffer| (fns.v1_0.cmd_dispatch)(command_buffer, x, y, z));
        self.record("dispatch", || Command::Dispatch { group_counts });

        self
    }

    /// Performs a single compute operation, with the workgroup IDs starting at `base_group`
    /// instead of zero.
    pub fn dispatch_base(
        &mut self,
        base_group: [u32; 3],
        group_counts: [u32; 3],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_dispatch_base()
            .map_err(|err| self.rejected("dispatch_base", err))?;

        Ok(unsafe { self.dispatch_base_unchecked(base_group, group_counts) })
    }

    fn validate_dispatch_base(&self) -> Result<(), Box<ValidationError>> {
        let device = self.device();

        if !(device.api_version() >= Version::V1_1
            || device.enabled_extensions().khr_device_group)
        {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_1)]),
                    RequiresAllOf(&[Requires::DeviceExtension("khr_device_group")]),
                ]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::OutsideRenderPass)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn dispatch_base_unchecked(
        &mut self,
        base_group: [u32; 3],
        group_counts: [u32; 3],
    ) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_1;
        let [base_x, base_y, base_z] = base_group;
        let [x, y, z] = group_counts;

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_1.cmd_dispatch_base)(command_buffer, base_x, base_y, base_z, x, y, z)
            } else {
                (fns.khr_device_group.cmd_dispatch_base_khr)(
                    command_buffer,
                    base_x,
                    base_y,
                    base_z,
                    x,
                    y,
                    z,
                )
            }
        });
        self.record("dispatch_base", || Command::DispatchBase {
            base_group,
            group_counts,
        });

        self
    }

    /// Performs a single compute operation, reading the workgroup counts from `buffer`.
    pub fn dispatch_indirect(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_dispatch_indirect(buffer, offset)
            .map_err(|err| self.rejected("dispatch_indirect", err))?;

        Ok(unsafe { self.dispatch_indirect_unchecked(buffer, offset) })
    }

    fn validate_dispatch_indirect(
        &self,
        buffer: vk::Buffer,
        offset: DeviceSize,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_indirect_buffer(buffer, offset, "buffer", "offset")
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn dispatch_indirect_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_dispatch_indirect)(command_buffer, buffer, offset)
        });
        self.record("dispatch_indirect", || Command::DispatchIndirect { buffer, offset });

        self
    }

    /// Draws non-indexed vertices.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_recording(RecordingScope::InsideRenderPass)
            .map_err(|err| self.rejected("draw", err))?;

        Ok(unsafe { self.draw_unchecked(vertex_count, instance_count, first_vertex, first_instance) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_unchecked(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_draw)(
                command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        });
        self.record("draw", || Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });

        self
    }

    /// Draws vertices using the bound index buffer.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_recording(RecordingScope::InsideRenderPass)
            .map_err(|err| self.rejected("draw_indexed", err))?;

        Ok(unsafe {
            self.draw_indexed_unchecked(
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indexed_unchecked(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_draw_indexed)(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        });
        self.record("draw_indexed", || Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });

        self
    }

    /// Performs `draw_count` non-indexed draws, reading the parameters of each from `buffer`.
    ///
    /// If `draw_count` is greater than 1, `stride` must be a multiple of 4 and at least the size
    /// of `vk::DrawIndirectCommand`.
    pub fn draw_indirect(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_draw_indirect(buffer, offset, draw_count, stride)
            .map_err(|err| self.rejected("draw_indirect", err))?;

        Ok(unsafe { self.draw_indirect_unchecked(buffer, offset, draw_count, stride) })
    }

    fn validate_draw_indirect(
        &self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::InsideRenderPass)?;
        validate_indirect_buffer(buffer, offset, "buffer", "offset")?;

        if draw_count > 1 {
            validate_stride(
                stride,
                size_of::<vk::DrawIndirectCommand>(),
                &["VUID-vkCmdDrawIndirect-drawCount-00476"],
            )?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indirect_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_draw_indirect)(command_buffer, buffer, offset, draw_count, stride)
        });
        self.record("draw_indirect", || Command::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });

        self
    }

    /// Performs `draw_count` indexed draws, reading the parameters of each from `buffer`.
    ///
    /// If `draw_count` is greater than 1, `stride` must be a multiple of 4 and at least the size
    /// of `vk::DrawIndexedIndirectCommand`.
    pub fn draw_indexed_indirect(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_draw_indexed_indirect(buffer, offset, draw_count, stride)
            .map_err(|err| self.rejected("draw_indexed_indirect", err))?;

        Ok(unsafe { self.draw_indexed_indirect_unchecked(buffer, offset, draw_count, stride) })
    }

    fn validate_draw_indexed_indirect(
        &self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::InsideRenderPass)?;
        validate_indirect_buffer(buffer, offset, "buffer", "offset")?;

        if draw_count > 1 {
            validate_stride(
                stride,
                size_of::<vk::DrawIndexedIndirectCommand>(),
                &["VUID-vkCmdDrawIndexedIndirect-drawCount-00528"],
            )?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indexed_indirect_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_draw_indexed_indirect)(
                command_buffer,
                buffer,
                offset,
                draw_count,
                stride,
            )
        });
        self.record("draw_indexed_indirect", || Command::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });

        self
    }

    /// Like [`draw_indirect`](Self::draw_indirect), but reads the number of draws from
    /// `count_buffer`, up to `max_draw_count`.
    pub fn draw_indirect_count(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_draw_indirect_count(
            buffer,
            offset,
            count_buffer,
            count_buffer_offset,
            stride,
            size_of::<vk::DrawIndirectCommand>(),
            &["VUID-vkCmdDrawIndirectCount-stride-03110"],
        )
        .map_err(|err| self.rejected("draw_indirect_count", err))?;

        Ok(unsafe {
            self.draw_indirect_count_unchecked(
                buffer,
                offset,
                count_buffer,
                count_buffer_offset,
                max_draw_count,
                stride,
            )
        })
    }

    fn validate_draw_indirect_count(
        &self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        stride: u32,
        min_stride: usize,
        stride_vuids: &'static [&'static str],
    ) -> Result<(), Box<ValidationError>> {
        let device = self.device();

        if !(device.api_version() >= Version::V1_2
            || device.enabled_extensions().khr_draw_indirect_count)
        {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_2)]),
                    RequiresAllOf(&[Requires::DeviceExtension("khr_draw_indirect_count")]),
                ]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::InsideRenderPass)?;
        validate_indirect_buffer(buffer, offset, "buffer", "offset")?;
        validate_indirect_buffer(
            count_buffer,
            count_buffer_offset,
            "count_buffer",
            "count_buffer_offset",
        )?;
        validate_stride(stride, min_stride, stride_vuids)?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indirect_count_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_2;

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_2.cmd_draw_indirect_count)(
                    command_buffer,
                    buffer,
                    offset,
                    count_buffer,
                    count_buffer_offset,
                    max_draw_count,
                    stride,
                )
            } else {
                (fns.khr_draw_indirect_count.cmd_draw_indirect_count_khr)(
                    command_buffer,
                    buffer,
                    offset,
                    count_buffer,
                    count_buffer_offset,
                    max_draw_count,
                    stride,
                )
            }
        });
        self.record("draw_indirect_count", || Command::DrawIndirectCount {
            buffer,
            offset,
            count_buffer,
            count_buffer_offset,
            max_draw_count,
            stride,
        });

        self
    }

    /// Like [`draw_indexed_indirect`](Self::draw_indexed_indirect), but reads the number of
    /// draws from `count_buffer`, up to `max_draw_count`.
    pub fn draw_indexed_indirect_count(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_draw_indirect_count(
            buffer,
            offset,
            count_buffer,
            count_buffer_offset,
            stride,
            size_of::<vk::DrawIndexedIndirectCommand>(),
            &["VUID-vkCmdDrawIndexedIndirectCount-stride-03142"],
        )
        .map_err(|err| self.rejected("draw_indexed_indirect_count", err))?;

        Ok(unsafe {
            self.draw_indexed_indirect_count_unchecked(
                buffer,
                offset,
                count_buffer,
                count_buffer_offset,
                max_draw_count,
                stride,
            )
        })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indexed_indirect_count_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        count_buffer: vk::Buffer,
        count_buffer_offset: DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_2;

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_2.cmd_draw_indexed_indirect_count)(
                    command_buffer,
                    buffer,
                    offset,
                    count_buffer,
                    count_buffer_offset,
                    max_draw_count,
                    stride,
                )
            } else {
                (fns.khr_draw_indirect_count.cmd_draw_indexed_indirect_count_khr)(
                    command_buffer,
                    buffer,
                    offset,
                    count_buffer,
                    count_buffer_offset,
                    max_draw_count,
                    stride,
                )
            }
        });
        self.record("draw_indexed_indirect_count", || {
            Command::DrawIndexedIndirectCount {
                buffer,
                offset,
                count_buffer,
                count_buffer_offset,
                max_draw_count,
                stride,
            }
        });

        self
    }

    /// Draws vertices, deriving the vertex count from the byte count that transform feedback
    /// wrote to `counter_buffer`.
    pub fn draw_indirect_byte_count(
        &mut self,
        instance_count: u32,
        first_instance: u32,
        counter_buffer: vk::Buffer,
        counter_buffer_offset: DeviceSize,
        counter_offset: u32,
        vertex_stride: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_draw_indirect_byte_count(counter_buffer, counter_buffer_offset, vertex_stride)
            .map_err(|err| self.rejected("draw_indirect_byte_count", err))?;

        Ok(unsafe {
            self.draw_indirect_byte_count_unchecked(
                instance_count,
                first_instance,
                counter_buffer,
                counter_buffer_offset,
                counter_offset,
                vertex_stride,
            )
        })
    }

    fn validate_draw_indirect_byte_count(
        &self,
        counter_buffer: vk::Buffer,
        counter_buffer_offset: DeviceSize,
        vertex_stride: u32,
    ) -> Result<(), Box<ValidationError>> {
        if !self.device().enabled_extensions().ext_transform_feedback {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                    "ext_transform_feedback",
                )])]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::InsideRenderPass)?;
        validate_indirect_buffer(
            counter_buffer,
            counter_buffer_offset,
            "counter_buffer",
            "counter_buffer_offset",
        )?;

        if vertex_stride == 0 {
            return Err(Box::new(ValidationError {
                context: "vertex_stride".into(),
                problem: "is zero".into(),
                vuids: &["VUID-vkCmdDrawIndirectByteCountEXT-vertexStride-02289"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn draw_indirect_byte_count_unchecked(
        &mut self,
        instance_count: u32,
        first_instance: u32,
        counter_buffer: vk::Buffer,
        counter_buffer_offset: DeviceSize,
        counter_offset: u32,
        vertex_stride: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_draw_indirect_byte_count_ext)(
                command_buffer,
                instance_count,
                first_instance,
                counter_buffer,
                counter_buffer_offset,
                counter_offset,
                vertex_stride,
            )
        });
        self.record("draw_indirect_byte_count", || Command::DrawIndirectByteCount {
            instance_count,
            first_instance,
            counter_buffer,
            counter_buffer_offset,
            counter_offset,
            vertex_stride,
        });

        self
    }
}

fn validate_indirect_buffer(
    buffer: vk::Buffer,
    offset: DeviceSize,
    buffer_context: &'static str,
    offset_context: &'static str,
) -> Result<(), Box<ValidationError>> {
    validate_non_null(buffer, buffer_context)?;

    if offset % 4 != 0 {
        return Err(Box::new(ValidationError {
            context: offset_context.into(),
            problem: "is not a multiple of 4".into(),
            ..Default::default()
        }));
    }

    Ok(())
}

fn validate_stride(
    stride: u32,
    min_stride: usize,
    vuids: &'static [&'static str],
) -> Result<(), Box<ValidationError>> {
    if stride % 4 != 0 || (stride as usize) < min_stride {
        return Err(Box::new(ValidationError {
            context: "stride".into(),
            problem: format!(
                "is not a multiple of 4, or is less than {} bytes",
                min_stride,
            )
            .into(),
            vuids,
            ..Default::default()
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::{
            Command, CommandPool, CommandPoolCreateInfo, RenderArea, RenderPassBeginInfo,
            SubpassContents,
        },
        tests::take_calls,
        Handle, Version,
    };
    use ash::vk;
    use serial_test::serial;

    fn render_pass_begin_info() -> RenderPassBeginInfo {
        RenderPassBeginInfo {
            render_area: RenderArea::Single(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: 32,
                    height: 32,
                },
            }),
            ..RenderPassBeginInfo::new(vk::RenderPass::from_raw(1), vk::Framebuffer::from_raw(2))
        }
    }

    #[test]
    #[serial]
    fn dispatches_outside_render_pass() {
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
        let buffer = vk::Buffer::from_raw(90);

        cb.start_recording(Default::default()).unwrap();
        take_calls();
        cb.dispatch([8, 8, 1])
            .unwrap()
            .dispatch_indirect(buffer, 16)
            .unwrap();
        assert_eq!(take_calls(), ["vkCmdDispatch", "vkCmdDispatchIndirect"]);
        assert!(matches!(
            cb.stashed_commands()[0],
            Command::Dispatch {
                group_counts: [8, 8, 1],
            },
        ));

        assert!(cb.dispatch_indirect(buffer, 3).is_err());
        match cb.dispatch_base([1, 0, 0], [1, 1, 1]) {
            Err(err) => assert!(!err.requires_one_of.is_empty()),
            Ok(_) => panic!(),
        }

        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        assert!(cb.dispatch([1, 1, 1]).is_err());
    }

    #[test]
    fn dispatch_base_entrypoints() {
        let device = mock_device!(api_version: Version::V1_1);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        take_calls();
        cb.dispatch_base([4, 0, 0], [4, 1, 1]).unwrap();
        assert_eq!(take_calls(), ["vkCmdDispatchBase"]);

        let device = mock_device!(extensions: [khr_device_group]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        take_calls();
        cb.dispatch_base([4, 0, 0], [4, 1, 1]).unwrap();
        assert_eq!(take_calls(), ["vkCmdDispatchBaseKHR"]);
    }

    #[test]
    fn draws_inside_render_pass() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        let buffer = vk::Buffer::from_raw(91);

        cb.start_recording(Default::default()).unwrap();
        assert!(cb.draw_indexed(6, 1, 0, 0, 0).is_err());

        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        take_calls();
        cb.draw(3, 1, 0, 0)
            .unwrap()
            .draw_indexed(6, 1, 0, -2, 0)
            .unwrap()
            .draw_indirect(buffer, 0, 2, 16)
            .unwrap()
            .draw_indexed_indirect(buffer, 0, 2, 20)
            .unwrap();
        assert_eq!(
            take_calls(),
            [
                "vkCmdDraw",
                "vkCmdDrawIndexed",
                "vkCmdDrawIndirect",
                "vkCmdDrawIndexedIndirect",
            ],
        );

        // A single draw does not read the stride.
        assert!(cb.draw_indirect(buffer, 0, 1, 0).is_ok());
        assert!(cb.draw_indirect(buffer, 0, 2, 12).is_err());
        assert!(cb.draw_indirect(buffer, 0, 2, 18).is_err());
        assert!(cb.draw_indexed_indirect(buffer, 0, 2, 16).is_err());
        assert!(cb.draw_indirect(buffer, 2, 1, 16).is_err());
        assert!(cb.draw_indirect(vk::Buffer::null(), 0, 1, 16).is_err());
    }

    #[test]
    fn draw_count_entrypoints() {
        let buffer = vk::Buffer::from_raw(92);
        let count_buffer = vk::Buffer::from_raw(93);

        let device = mock_device!(api_version: Version::V1_1);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        match cb.draw_indirect_count(buffer, 0, count_buffer, 0, 4, 16) {
            Err(err) => assert!(!err.requires_one_of.is_empty()),
            Ok(_) => panic!(),
        }

        let device = mock_device!(api_version: Version::V1_2);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        take_calls();
        cb.draw_indirect_count(buffer, 0, count_buffer, 4, 4, 16)
            .unwrap()
            .draw_indexed_indirect_count(buffer, 0, count_buffer, 4, 4, 20)
            .unwrap();
        assert_eq!(
            take_calls(),
            ["vkCmdDrawIndirectCount", "vkCmdDrawIndexedIndirectCount"],
        );
        assert!(cb
            .draw_indexed_indirect_count(buffer, 0, count_buffer, 4, 4, 16)
            .is_err());
        assert!(cb
            .draw_indirect_count(buffer, 0, count_buffer, 2, 4, 16)
            .is_err());

        let device = mock_device!(extensions: [khr_draw_indirect_count]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        take_calls();
        cb.draw_indirect_count(buffer, 0, count_buffer, 0, 1, 16)
            .unwrap()
            .draw_indexed_indirect_count(buffer, 0, count_buffer, 0, 1, 20)
            .unwrap();
        assert_eq!(
            take_calls(),
            ["vkCmdDrawIndirectCountKHR", "vkCmdDrawIndexedIndirectCountKHR"],
        );
    }

    #[test]
    fn draw_indirect_byte_count() {
        let counter_buffer = vk::Buffer::from_raw(94);

        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        assert!(cb
            .draw_indirect_byte_count(1, 0, counter_buffer, 0, 0, 16)
            .is_err());

        let device = mock_device!(extensions: [ext_transform_feedback]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        take_calls();
        cb.draw_indirect_byte_count(1, 0, counter_buffer, 0, 0, 16)
            .unwrap();
        assert_eq!(take_calls(), ["vkCmdDrawIndirectByteCountEXT"]);
        assert!(cb
            .draw_indirect_byte_count(1, 0, counter_buffer, 0, 0, 0)
            .is_err());
    }
}
