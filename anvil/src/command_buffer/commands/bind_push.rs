use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    pipeline::{IndexType, PipelineBindPoint, ShaderStages},
    DeviceSize, ValidationError,
};
use ash::vk;
use smallvec::SmallVec;

/// # Commands to bind or push state for pipeline execution commands.
///
/// These commands can be recorded both inside and outside of a render pass.
impl CommandBuffer {
    /// Binds a pipeline to the given bind point.
    pub fn bind_pipeline(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_bind_pipeline(pipeline)
            .map_err(|err| self.rejected("bind_pipeline", err))?;

        Ok(unsafe { self.bind_pipeline_unchecked(pipeline_bind_point, pipeline) })
    }

    fn validate_bind_pipeline(&self, pipeline: vk::Pipeline) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if pipeline == vk::Pipeline::null() {
            return Err(Box::new(ValidationError {
                context: "pipeline".into(),
                problem: "is a null handle".into(),
                vuids: &["VUID-vkCmdBindPipeline-pipeline-parameter"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn bind_pipeline_unchecked(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_bind_pipeline)(command_buffer, pipeline_bind_point.into(), pipeline)
        });
        self.record("bind_pipeline", || Command::BindPipeline {
            pipeline_bind_point,
            pipeline,
        });

        self
    }

    /// Binds descriptor sets for future dispatch or draw calls.
    pub fn bind_descriptor_sets(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_bind_descriptor_sets(layout, descriptor_sets)
            .map_err(|err| self.rejected("bind_descriptor_sets", err))?;

        Ok(unsafe {
            self.bind_descriptor_sets_unchecked(
                pipeline_bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            )
        })
    }

    fn validate_bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        descriptor_sets: &[vk::DescriptorSet],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if layout == vk::PipelineLayout::null() {
            return Err(Box::new(ValidationError {
                context: "layout".into(),
                problem: "is a null handle".into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-layout-parameter"],
                ..Default::default()
            }));
        }

        if descriptor_sets.is_empty() {
            return Err(Box::new(ValidationError {
                context: "descriptor_sets".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-descriptorSetCount-arraylength"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn bind_descriptor_sets_unchecked(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_bind_descriptor_sets)(
                command_buffer,
                pipeline_bind_point.into(),
                layout,
                first_set,
                descriptor_sets.len() as u32,
                descriptor_sets.as_ptr(),
                dynamic_offsets.len() as u32,
                dynamic_offsets.as_ptr(),
            )
        });
        self.record("bind_descriptor_sets", || Command::BindDescriptorSets {
            pipeline_bind_point,
            layout,
            first_set,
            descriptor_sets: descriptor_sets.iter().copied().collect(),
            dynamic_offsets: dynamic_offsets.iter().copied().collect(),
        });

        self
    }

    /// Binds an index buffer for future indexed draw calls.
    ///
    /// `offset` must be a multiple of the size of `index_type`.
    pub fn bind_index_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_bind_index_buffer(buffer, offset, index_type)
            .map_err(|err| self.rejected("bind_index_buffer", err))?;

        Ok(unsafe { self.bind_index_buffer_unchecked(buffer, offset, index_type) })
    }

    fn validate_bind_index_buffer(
        &self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if buffer == vk::Buffer::null() {
            return Err(Box::new(ValidationError {
                context: "buffer".into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        if offset % index_type.size() != 0 {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of the size of `index_type`".into(),
                vuids: &["VUID-vkCmdBindIndexBuffer-offset-08783"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn bind_index_buffer_unchecked(
        &mut self,
        buffer: vk::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_bind_index_buffer)(command_buffer, buffer, offset, index_type.into())
        });
        self.record("bind_index_buffer", || Command::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });

        self
    }

    /// Binds vertex buffers for future draw calls, starting at binding `first_binding`.
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_bind_vertex_buffers(buffers, offsets)
            .map_err(|err| self.rejected("bind_vertex_buffers", err))?;

        Ok(unsafe { self.bind_vertex_buffers_unchecked(first_binding, buffers, offsets) })
    }

    fn validate_bind_vertex_buffers(
        &self,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if buffers.is_empty() {
            return Err(Box::new(ValidationError {
                context: "buffers".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdBindVertexBuffers-bindingCount-arraylength"],
                ..Default::default()
            }));
        }

        if buffers.len() != offsets.len() {
            return Err(Box::new(ValidationError {
                problem: "`buffers` and `offsets` do not have the same length".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn bind_vertex_buffers_unchecked(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_bind_vertex_buffers)(
                command_buffer,
                first_binding,
                buffers.len() as u32,
                buffers.as_ptr(),
                offsets.as_ptr(),
            )
        });
        self.record("bind_vertex_buffers", || Command::BindVertexBuffers {
            first_binding,
            buffers: buffers.iter().copied().collect(),
            offsets: offsets.iter().copied().collect(),
        });

        self
    }

    /// Sets push constants for future dispatch or draw calls.
    ///
    /// `offset` and the length of `data` must be multiples of 4, and `data` must not be empty.
    pub fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_push_constants(layout, stages, offset, data)
            .map_err(|err| self.rejected("push_constants", err))?;

        Ok(unsafe { self.push_constants_unchecked(layout, stages, offset, data) })
    }

    fn validate_push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if layout == vk::PipelineLayout::null() {
            return Err(Box::new(ValidationError {
                context: "layout".into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        if stages.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdPushConstants-stageFlags-requiredbitmask"],
                ..Default::default()
            }));
        }

        if offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdPushConstants-offset-00368"],
                ..Default::default()
            }));
        }

        if data.is_empty() {
            return Err(Box::new(ValidationError {
                context: "data".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdPushConstants-size-arraylength"],
                ..Default::default()
            }));
        }

        if data.len() % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "data".into(),
                problem: "the length is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdPushConstants-size-00369"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn push_constants_unchecked(
        &mut self,
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_push_constants)(
                command_buffer,
                layout,
                stages.into(),
                offset,
                data.len() as u32,
                data.as_ptr().cast(),
            )
        });
        self.record("push_constants", || Command::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });

        self
    }
}
