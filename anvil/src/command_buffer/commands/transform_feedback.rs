use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    device::DeviceOwned,
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError,
};
use ash::vk;
use std::ptr;

/// # Commands for transform feedback.
///
/// These commands need the `ext_transform_feedback` extension.
impl CommandBuffer {
    /// Binds buffers to capture transform feedback output into, starting at binding
    /// `first_binding`.
    ///
    /// `sizes` can be empty, in which case every buffer is written up to its end.
    pub fn bind_transform_feedback_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
        sizes: &[DeviceSize],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_bind_transform_feedback_buffers(buffers, offsets, sizes)
            .map_err(|err| self.rejected("bind_transform_feedback_buffers", err))?;

        Ok(unsafe {
            self.bind_transform_feedback_buffers_unchecked(first_binding, buffers, offsets, sizes)
        })
    }

    fn validate_bind_transform_feedback_buffers(
        &self,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
        sizes: &[DeviceSize],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_transform_feedback_extension()?;
        self.validate_recording(RecordingScope::Anywhere)?;

        if self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is active".into(),
                vuids: &["VUID-vkCmdBindTransformFeedbackBuffersEXT-None-02365"],
                ..Default::default()
            }));
        }

        if buffers.is_empty() {
            return Err(Box::new(ValidationError {
                context: "buffers".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdBindTransformFeedbackBuffersEXT-bindingCount-arraylength"],
                ..Default::default()
            }));
        }

        if offsets.len() != buffers.len() {
            return Err(Box::new(ValidationError {
                problem: "`offsets` does not have the same length as `buffers`".into(),
                ..Default::default()
            }));
        }

        if !sizes.is_empty() && sizes.len() != buffers.len() {
            return Err(Box::new(ValidationError {
                problem: "`sizes` is not empty, and does not have the same length as `buffers`"
                    .into(),
                ..Default::default()
            }));
        }

        if let Some(index) = buffers.iter().position(|&buffer| buffer == vk::Buffer::null()) {
            return Err(Box::new(ValidationError {
                context: format!("buffers[{}]", index).into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        if let Some(index) = offsets.iter().position(|&offset| offset % 4 != 0) {
            return Err(Box::new(ValidationError {
                context: format!("offsets[{}]", index).into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdBindTransformFeedbackBuffersEXT-pOffsets-02359"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn bind_transform_feedback_buffers_unchecked(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
        sizes: &[DeviceSize],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_bind_transform_feedback_buffers_ext)(
                command_buffer,
                first_binding,
                buffers.len() as u32,
                buffers.as_ptr(),
                offsets.as_ptr(),
                if sizes.is_empty() {
                    ptr::null()
                } else {
                    sizes.as_ptr()
                },
            )
        });
        self.record("bind_transform_feedback_buffers", || {
            Command::BindTransformFeedbackBuffers {
                first_binding,
                buffers: buffers.iter().copied().collect(),
                offsets: offsets.iter().copied().collect(),
                sizes: sizes.iter().copied().collect(),
            }
        });

        self
    }

    /// Starts capturing transform feedback output into the bound buffers.
    ///
    /// If `counter_buffers` is not empty, capturing resumes from the byte counts stored in them.
    /// `counter_buffer_offsets` can be empty, in which case the counts are read from offset 0.
    pub fn begin_transform_feedback(
        &mut self,
        first_counter_buffer: u32,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_begin_transform_feedback(counter_buffers, counter_buffer_offsets)
            .map_err(|err| self.rejected("begin_transform_feedback", err))?;

        Ok(unsafe {
            self.begin_transform_feedback_unchecked(
                first_counter_buffer,
                counter_buffers,
                counter_buffer_offsets,
            )
        })
    }

    fn validate_begin_transform_feedback(
        &self,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_transform_feedback_extension()?;
        self.validate_recording(RecordingScope::InsideRenderPass)?;

        if self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is already active".into(),
                vuids: &["VUID-vkCmdBeginTransformFeedbackEXT-None-02367"],
                ..Default::default()
            }));
        }

        validate_counter_buffers(counter_buffers, counter_buffer_offsets)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn begin_transform_feedback_unchecked(
        &mut self,
        first_counter_buffer: u32,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_begin_transform_feedback_ext)(
                command_buffer,
                first_counter_buffer,
                counter_buffers.len() as u32,
                counter_buffers.as_ptr(),
                if counter_buffer_offsets.is_empty() {
                    ptr::null()
                } else {
                    counter_buffer_offsets.as_ptr()
                },
            )
        });
        self.transform_feedback_active = true;
        self.record("begin_transform_feedback", || {
            Command::BeginTransformFeedback {
                first_counter_buffer,
                counter_buffers: counter_buffers.iter().copied().collect(),
                counter_buffer_offsets: counter_buffer_offsets.iter().copied().collect(),
            }
        });

        self
    }

    /// Stops capturing transform feedback output.
    ///
    /// If `counter_buffers` is not empty, the byte counts reached are written to them, so that
    /// capturing can be resumed later.
    pub fn end_transform_feedback(
        &mut self,
        first_counter_buffer: u32,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_end_transform_feedback(counter_buffers, counter_buffer_offsets)
            .map_err(|err| self.rejected("end_transform_feedback", err))?;

        Ok(unsafe {
            self.end_transform_feedback_unchecked(
                first_counter_buffer,
                counter_buffers,
                counter_buffer_offsets,
            )
        })
    }

    fn validate_end_transform_feedback(
        &self,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_transform_feedback_extension()?;
        self.validate_recording(RecordingScope::InsideRenderPass)?;

        if !self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is not active".into(),
                vuids: &["VUID-vkCmdEndTransformFeedbackEXT-None-02375"],
                ..Default::default()
            }));
        }

        validate_counter_buffers(counter_buffers, counter_buffer_offsets)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn end_transform_feedback_unchecked(
        &mut self,
        first_counter_buffer: u32,
        counter_buffers: &[vk::Buffer],
        counter_buffer_offsets: &[DeviceSize],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_end_transform_feedback_ext)(
                command_buffer,
                first_counter_buffer,
                counter_buffers.len() as u32,
                counter_buffers.as_ptr(),
                if counter_buffer_offsets.is_empty() {
                    ptr::null()
                } else {
                    counter_buffer_offsets.as_ptr()
                },
            )
        });
        self.transform_feedback_active = false;
        self.record("end_transform_feedback", || Command::EndTransformFeedback {
            first_counter_buffer,
            counter_buffers: counter_buffers.iter().copied().collect(),
            counter_buffer_offsets: counter_buffer_offsets.iter().copied().collect(),
        });

        self
    }

    fn validate_transform_feedback_extension(&self) -> Result<(), Box<ValidationError>> {
        if !self.device().enabled_extensions().ext_transform_feedback {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                    "ext_transform_feedback",
                )])]),
                ..Default::default()
            }));
        }

        Ok(())
    }
}

// Counter buffers may be null handles, in which case capturing starts from zero.
fn validate_counter_buffers(
    counter_buffers: &[vk::Buffer],
    counter_buffer_offsets: &[DeviceSize],
) -> Result<(), Box<ValidationError>> {
    if !counter_buffer_offsets.is_empty() && counter_buffer_offsets.len() != counter_buffers.len()
    {
        return Err(Box::new(ValidationError {
            problem: "`counter_buffer_offsets` is not empty, and does not have the same length \
                as `counter_buffers`"
                .into(),
            ..Default::default()
        }));
    }

    if let Some(index) = counter_buffer_offsets
        .iter()
        .position(|&offset| offset % 4 != 0)
    {
        return Err(Box::new(ValidationError {
            context: format!("counter_buffer_offsets[{}]", index).into(),
            problem: "is not a multiple of 4".into(),
            ..Default::default()
        }));
    }

    Ok(())
}
