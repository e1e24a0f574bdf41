use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    device::DeviceOwned,
    sync::{validate_stages, PipelineStages},
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError,
};
use ash::vk;
use std::ffi::CString;

/// # Commands for debugging.
///
/// Debug marker commands need the `ext_debug_marker` extension. They can be recorded both inside
/// and outside of a render pass.
impl CommandBuffer {
    /// Opens a debug marker region. Regions can be nested, and every region must be closed with
    /// [`debug_marker_end`](Self::debug_marker_end) before recording stops.
    pub fn debug_marker_begin(
        &mut self,
        name: &str,
        color: [f32; 4],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_debug_marker(Some(name))
            .map_err(|err| self.rejected("debug_marker_begin", err))?;

        Ok(unsafe { self.debug_marker_begin_unchecked(name, color) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn debug_marker_begin_unchecked(&mut self, name: &str, color: [f32; 4]) -> &mut Self {
        let name_vk = CString::new(name).unwrap_or_default();
        let marker_info_vk = vk::DebugMarkerMarkerInfoEXT::default()
            .marker_name(&name_vk)
            .color(color);

        self.emit(|fns, command_buffer| {
            (fns.ext_debug_marker.cmd_debug_marker_begin_ext)(command_buffer, &marker_info_vk)
        });
        self.debug_marker_depth += 1;
        self.record("debug_marker_begin", || Command::DebugMarkerBegin {
            name: name.to_owned(),
            color,
        });

        self
    }

    /// Closes the innermost open debug marker region.
    pub fn debug_marker_end(&mut self) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_debug_marker_end()
            .map_err(|err| self.rejected("debug_marker_end", err))?;

        Ok(unsafe { self.debug_marker_end_unchecked() })
    }

    fn validate_debug_marker_end(&self) -> Result<(), Box<ValidationError>> {
        self.validate_debug_marker(None)?;

        if self.debug_marker_depth == 0 {
            return Err(Box::new(ValidationError {
                problem: "there is no open debug marker region".into(),
                vuids: &["VUID-vkCmdDebugMarkerEndEXT-commandBuffer-01239"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn debug_marker_end_unchecked(&mut self) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_debug_marker.cmd_debug_marker_end_ext)(command_buffer)
        });
        self.debug_marker_depth = self.debug_marker_depth.saturating_sub(1);
        self.record("debug_marker_end", || Command::DebugMarkerEnd);

        self
    }

    /// Inserts a single debug marker.
    pub fn debug_marker_insert(
        &mut self,
        name: &str,
        color: [f32; 4],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_debug_marker(Some(name))
            .map_err(|err| self.rejected("debug_marker_insert", err))?;

        Ok(unsafe { self.debug_marker_insert_unchecked(name, color) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn debug_marker_insert_unchecked(
        &mut self,
        name: &str,
        color: [f32; 4],
    ) -> &mut Self {
        let name_vk = CString::new(name).unwrap_or_default();
        let marker_info_vk = vk::DebugMarkerMarkerInfoEXT::default()
            .marker_name(&name_vk)
            .color(color);

        self.emit(|fns, command_buffer| {
            (fns.ext_debug_marker.cmd_debug_marker_insert_ext)(command_buffer, &marker_info_vk)
        });
        self.record("debug_marker_insert", || Command::DebugMarkerInsert {
            name: name.to_owned(),
            color,
        });

        self
    }

    fn validate_debug_marker(&self, name: Option<&str>) -> Result<(), Box<ValidationError>> {
        if !self.device().enabled_extensions().ext_debug_marker {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                    "ext_debug_marker",
                )])]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::Anywhere)?;

        if name.is_some_and(|name| name.contains('\0')) {
            return Err(Box::new(ValidationError {
                context: "name".into(),
                problem: "contains a null byte".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Writes `marker` to a buffer once `stage` of the preceding commands has completed.
    pub fn write_buffer_marker(
        &mut self,
        stage: PipelineStages,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        marker: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_write_buffer_marker(stage, dst_buffer, dst_offset)
            .map_err(|err| self.rejected("write_buffer_marker", err))?;

        Ok(unsafe { self.write_buffer_marker_unchecked(stage, dst_buffer, dst_offset, marker) })
    }

    fn validate_write_buffer_marker(
        &self,
        stage: PipelineStages,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
    ) -> Result<(), Box<ValidationError>> {
        if !self.device().enabled_extensions().amd_buffer_marker {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                    "amd_buffer_marker",
                )])]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::Anywhere)?;

        if stage.count() != 1 {
            return Err(Box::new(ValidationError {
                context: "stage".into(),
                problem: "does not contain exactly one pipeline stage".into(),
                ..Default::default()
            }));
        }

        validate_stages(self.device(), stage).map_err(|err| err.add_context("stage"))?;

        if dst_buffer == vk::Buffer::null() {
            return Err(Box::new(ValidationError {
                context: "dst_buffer".into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        if dst_offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "dst_offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdWriteBufferMarkerAMD-dstOffset-01800"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn write_buffer_marker_unchecked(
        &mut self,
        stage: PipelineStages,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        marker: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.amd_buffer_marker.cmd_write_buffer_marker_amd)(
                command_buffer,
                stage.into(),
                dst_buffer,
                dst_offset,
                marker,
            )
        });
        self.record("write_buffer_marker", || Command::WriteBufferMarker {
            stage,
            dst_buffer,
            dst_offset,
            marker,
        });

        self
    }
}
