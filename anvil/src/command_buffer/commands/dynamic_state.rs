use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    device::{Device, DeviceOwned},
    pipeline::StencilFaces,
    Requires, RequiresAllOf, RequiresOneOf, ValidationError, Version,
};
use ash::vk;
use smallvec::SmallVec;

/// # Commands to set dynamic state for pipelines.
///
/// These commands can be recorded both inside and outside of a render pass. They only have an
/// effect on pipelines that were created with the corresponding state marked as dynamic.
impl CommandBuffer {
    /// Sets the viewports, starting at index `first_viewport`.
    pub fn set_viewport(
        &mut self,
        first_viewport: u32,
        viewports: &[vk::Viewport],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_viewport(viewports)
            .map_err(|err| self.rejected("set_viewport", err))?;

        Ok(unsafe { self.set_viewport_unchecked(first_viewport, viewports) })
    }

    fn validate_set_viewport(&self, viewports: &[vk::Viewport]) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if viewports.is_empty() {
            return Err(Box::new(ValidationError {
                context: "viewports".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdSetViewport-viewportCount-arraylength"],
                ..Default::default()
            }));
        }

        for (index, viewport) in viewports.iter().enumerate() {
            if !(viewport.width > 0.0) {
                return Err(Box::new(ValidationError {
                    context: format!("viewports[{}].width", index).into(),
                    problem: "is not greater than zero".into(),
                    vuids: &["VUID-VkViewport-width-01770"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_viewport_unchecked(
        &mut self,
        first_viewport: u32,
        viewports: &[vk::Viewport],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_viewport)(
                command_buffer,
                first_viewport,
                viewports.len() as u32,
                viewports.as_ptr(),
            )
        });
        self.record("set_viewport", || Command::SetViewport {
            first_viewport,
            viewports: viewports.iter().copied().collect(),
        });

        self
    }

    /// Sets the scissor rectangles, starting at index `first_scissor`.
    pub fn set_scissor(
        &mut self,
        first_scissor: u32,
        scissors: &[vk::Rect2D],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_scissor(scissors)
            .map_err(|err| self.rejected("set_scissor", err))?;

        Ok(unsafe { self.set_scissor_unchecked(first_scissor, scissors) })
    }

    fn validate_set_scissor(&self, scissors: &[vk::Rect2D]) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if scissors.is_empty() {
            return Err(Box::new(ValidationError {
                context: "scissors".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdSetScissor-scissorCount-arraylength"],
                ..Default::default()
            }));
        }

        for (index, scissor) in scissors.iter().enumerate() {
            if scissor.offset.x < 0 || scissor.offset.y < 0 {
                return Err(Box::new(ValidationError {
                    context: format!("scissors[{}].offset", index).into(),
                    problem: "is negative".into(),
                    vuids: &["VUID-vkCmdSetScissor-x-00595"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_scissor_unchecked(
        &mut self,
        first_scissor: u32,
        scissors: &[vk::Rect2D],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_scissor)(
                command_buffer,
                first_scissor,
                scissors.len() as u32,
                scissors.as_ptr(),
            )
        });
        self.record("set_scissor", || Command::SetScissor {
            first_scissor,
            scissors: scissors.iter().copied().collect(),
        });

        self
    }

    /// Sets the line width.
    pub fn set_line_width(&mut self, line_width: f32) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_line_width(line_width)
            .map_err(|err| self.rejected("set_line_width", err))?;

        Ok(unsafe { self.set_line_width_unchecked(line_width) })
    }

    fn validate_set_line_width(&self, line_width: f32) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if !(line_width > 0.0) {
            return Err(Box::new(ValidationError {
                context: "line_width".into(),
                problem: "is not greater than zero".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_line_width_unchecked(&mut self, line_width: f32) -> &mut Self {
        self.emit(|fns, command_buffer| (fns.v1_0.cmd_set_line_width)(command_buffer, line_width));
        self.record("set_line_width", || Command::SetLineWidth { line_width });

        self
    }

    /// Sets the depth bias.
    pub fn set_depth_bias(
        &mut self,
        constant_factor: f32,
        clamp: f32,
        slope_factor: f32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)
            .map_err(|err| self.rejected("set_depth_bias", err))?;

        Ok(unsafe { self.set_depth_bias_unchecked(constant_factor, clamp, slope_factor) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_depth_bias_unchecked(
        &mut self,
        constant_factor: f32,
        clamp: f32,
        slope_factor: f32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_depth_bias)(command_buffer, constant_factor, clamp, slope_factor)
        });
        self.record("set_depth_bias", || Command::SetDepthBias {
            constant_factor,
            clamp,
            slope_factor,
        });

        self
    }

    /// Sets the constants for blending.
    pub fn set_blend_constants(
        &mut self,
        constants: [f32; 4],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)
            .map_err(|err| self.rejected("set_blend_constants", err))?;

        Ok(unsafe { self.set_blend_constants_unchecked(constants) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_blend_constants_unchecked(&mut self, constants: [f32; 4]) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_blend_constants)(command_buffer, &constants)
        });
        self.record("set_blend_constants", || Command::SetBlendConstants { constants });

        self
    }

    /// Sets the depth bounds. Both bounds must be between 0.0 and 1.0 inclusive.
    pub fn set_depth_bounds(
        &mut self,
        min_depth_bounds: f32,
        max_depth_bounds: f32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_depth_bounds(min_depth_bounds, max_depth_bounds)
            .map_err(|err| self.rejected("set_depth_bounds", err))?;

        Ok(unsafe { self.set_depth_bounds_unchecked(min_depth_bounds, max_depth_bounds) })
    }

    fn validate_set_depth_bounds(
        &self,
        min_depth_bounds: f32,
        max_depth_bounds: f32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if !(0.0..=1.0).contains(&min_depth_bounds) {
            return Err(Box::new(ValidationError {
                context: "min_depth_bounds".into(),
                problem: "is not between 0.0 and 1.0 inclusive".into(),
                vuids: &["VUID-vkCmdSetDepthBounds-minDepthBounds-00600"],
                ..Default::default()
            }));
        }

        if !(0.0..=1.0).contains(&max_depth_bounds) {
            return Err(Box::new(ValidationError {
                context: "max_depth_bounds".into(),
                problem: "is not between 0.0 and 1.0 inclusive".into(),
                vuids: &["VUID-vkCmdSetDepthBounds-maxDepthBounds-00601"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_depth_bounds_unchecked(
        &mut self,
        min_depth_bounds: f32,
        max_depth_bounds: f32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_depth_bounds)(command_buffer, min_depth_bounds, max_depth_bounds)
        });
        self.record("set_depth_bounds", || Command::SetDepthBounds {
            min_depth_bounds,
            max_depth_bounds,
        });

        self
    }

    /// Sets the stencil compare mask of the given faces.
    pub fn set_stencil_compare_mask(
        &mut self,
        faces: StencilFaces,
        compare_mask: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_stencil_faces(faces)
            .map_err(|err| self.rejected("set_stencil_compare_mask", err))?;

        Ok(unsafe { self.set_stencil_compare_mask_unchecked(faces, compare_mask) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_stencil_compare_mask_unchecked(
        &mut self,
        faces: StencilFaces,
        compare_mask: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_stencil_compare_mask)(command_buffer, faces.into(), compare_mask)
        });
        self.record("set_stencil_compare_mask", || Command::SetStencilCompareMask {
            faces,
            compare_mask,
        });

        self
    }

    /// Sets the stencil write mask of the given faces.
    pub fn set_stencil_write_mask(
        &mut self,
        faces: StencilFaces,
        write_mask: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_stencil_faces(faces)
            .map_err(|err| self.rejected("set_stencil_write_mask", err))?;

        Ok(unsafe { self.set_stencil_write_mask_unchecked(faces, write_mask) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_stencil_write_mask_unchecked(
        &mut self,
        faces: StencilFaces,
        write_mask: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_stencil_write_mask)(command_buffer, faces.into(), write_mask)
        });
        self.record("set_stencil_write_mask", || Command::SetStencilWriteMask {
            faces,
            write_mask,
        });

        self
    }

    /// Sets the stencil reference value of the given faces.
    pub fn set_stencil_reference(
        &mut self,
        faces: StencilFaces,
        reference: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_stencil_faces(faces)
            .map_err(|err| self.rejected("set_stencil_reference", err))?;

        Ok(unsafe { self.set_stencil_reference_unchecked(faces, reference) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_stencil_reference_unchecked(
        &mut self,
        faces: StencilFaces,
        reference: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_stencil_reference)(command_buffer, faces.into(), reference)
        });
        self.record("set_stencil_reference", || Command::SetStencilReference {
            faces,
            reference,
        });

        self
    }

    fn validate_stencil_faces(&self, faces: StencilFaces) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if faces.is_empty() {
            return Err(Box::new(ValidationError {
                context: "faces".into(),
                problem: "is empty".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Sets the physical devices of the device group that execute the following commands.
    ///
    /// `device_mask` must be a non-zero subset of the mask the command buffer started recording
    /// with. Inside a render pass it must also be a subset of the render pass device mask.
    pub fn set_device_mask(&mut self, device_mask: u32) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_device_mask(device_mask)
            .map_err(|err| self.rejected("set_device_mask", err))?;

        Ok(unsafe { self.set_device_mask_unchecked(device_mask) })
    }

    fn validate_set_device_mask(&self, device_mask: u32) -> Result<(), Box<ValidationError>> {
        let device = self.device();

        if !((device.api_version() >= Version::V1_1
            || device.enabled_extensions().khr_device_group)
            && device.is_multi_device())
        {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_1), Requires::DeviceGroup]),
                    RequiresAllOf(&[
                        Requires::DeviceExtension("khr_device_group"),
                        Requires::DeviceGroup,
                    ]),
                ]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::Anywhere)?;

        if device_mask == 0 {
            return Err(Box::new(ValidationError {
                context: "device_mask".into(),
                problem: "is zero".into(),
                vuids: &["VUID-vkCmdSetDeviceMask-deviceMask-00109"],
                ..Default::default()
            }));
        }

        if device_mask & !self.device_mask != 0 {
            return Err(Box::new(ValidationError {
                context: "device_mask".into(),
                problem: "is not a subset of the device mask the command buffer started \
                    recording with"
                    .into(),
                vuids: &["VUID-vkCmdSetDeviceMask-deviceMask-00110"],
                ..Default::default()
            }));
        }

        if let Some(render_pass) = &self.render_pass {
            if device_mask & !render_pass.device_mask != 0 {
                return Err(Box::new(ValidationError {
                    context: "device_mask".into(),
                    problem: "is not a subset of the device mask of the current render pass \
                        instance"
                        .into(),
                    vuids: &["VUID-vkCmdSetDeviceMask-deviceMask-00111"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_device_mask_unchecked(&mut self, device_mask: u32) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_1;

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_1.cmd_set_device_mask)(command_buffer, device_mask)
            } else {
                (fns.khr_device_group.cmd_set_device_mask_khr)(command_buffer, device_mask)
            }
        });
        self.record("set_device_mask", || Command::SetDeviceMask { device_mask });

        self
    }

    /// Sets the sample locations for the following draws.
    pub fn set_sample_locations(
        &mut self,
        sample_locations_info: &SampleLocationsInfo,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_set_sample_locations(sample_locations_info)
            .map_err(|err| self.rejected("set_sample_locations", err))?;

        Ok(unsafe { self.set_sample_locations_unchecked(sample_locations_info) })
    }

    fn validate_set_sample_locations(
        &self,
        sample_locations_info: &SampleLocationsInfo,
    ) -> Result<(), Box<ValidationError>> {
        if !self.device().enabled_extensions().ext_sample_locations {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceExtension(
                    "ext_sample_locations",
                )])]),
                ..Default::default()
            }));
        }

        self.validate_recording(RecordingScope::Anywhere)?;

        sample_locations_info
            .validate(self.device())
            .map_err(|err| err.add_context("sample_locations_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_sample_locations_unchecked(
        &mut self,
        sample_locations_info: &SampleLocationsInfo,
    ) -> &mut Self {
        let &SampleLocationsInfo {
            sample_locations_per_pixel,
            sample_location_grid_size,
            ref sample_locations,
            _ne: _,
        } = sample_locations_info;

        let sample_locations_vk: SmallVec<[_; 16]> = sample_locations
            .iter()
            .map(|&[x, y]| vk::SampleLocationEXT { x, y })
            .collect();
        let sample_locations_info_vk = vk::SampleLocationsInfoEXT::default()
            .sample_locations_per_pixel(sample_locations_per_pixel)
            .sample_location_grid_size(vk::Extent2D {
                width: sample_location_grid_size[0],
                height: sample_location_grid_size[1],
            })
            .sample_locations(&sample_locations_vk);

        self.emit(|fns, command_buffer| {
            (fns.ext_sample_locations.cmd_set_sample_locations_ext)(
                command_buffer,
                &sample_locations_info_vk,
            )
        });
        self.record("set_sample_locations", || Command::SetSampleLocations {
            sample_locations_info: sample_locations_info.clone(),
        });

        self
    }
}

/// Custom sample locations for a grid of pixels.
#[derive(Clone, Debug)]
pub struct SampleLocationsInfo {
    /// The number of samples per pixel. Exactly one bit must be set.
    ///
    /// The default value is `vk::SampleCountFlags::TYPE_1`.
    pub sample_locations_per_pixel: vk::SampleCountFlags,

    /// The width and height of the pixel grid the locations are given for.
    ///
    /// The default value is `[1, 1]`.
    pub sample_location_grid_size: [u32; 2],

    /// The sample locations, in the `[0.0, 1.0]` range. The locations of each pixel of the grid
    /// follow each other, in row-major order.
    ///
    /// The number of locations must be the number of samples per pixel multiplied by the
    /// number of pixels in the grid.
    ///
    /// The default value is empty.
    pub sample_locations: Vec<[f32; 2]>,

    pub _ne: crate::NonExhaustive,
}

impl Default for SampleLocationsInfo {
    #[inline]
    fn default() -> Self {
        Self {
            sample_locations_per_pixel: vk::SampleCountFlags::TYPE_1,
            sample_location_grid_size: [1, 1],
            sample_locations: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl SampleLocationsInfo {
    pub(crate) fn validate(&self, _device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            sample_locations_per_pixel,
            sample_location_grid_size,
            ref sample_locations,
            _ne: _,
        } = self;

        let samples = sample_locations_per_pixel.as_raw();

        if samples.count_ones() != 1 {
            return Err(Box::new(ValidationError {
                context: "sample_locations_per_pixel".into(),
                problem: "does not contain exactly one sample count".into(),
                ..Default::default()
            }));
        }

        if sample_location_grid_size.contains(&0) {
            return Err(Box::new(ValidationError {
                context: "sample_location_grid_size".into(),
                problem: "has a zero dimension".into(),
                ..Default::default()
            }));
        }

        let expected_count = samples as u64
            * sample_location_grid_size[0] as u64
            * sample_location_grid_size[1] as u64;

        if sample_locations.len() as u64 != expected_count {
            return Err(Box::new(ValidationError {
                context: "sample_locations".into(),
                problem: "the length is not the number of samples per pixel multiplied by the \
                    number of pixels in the grid"
                    .into(),
                vuids: &["VUID-VkSampleLocationsInfoEXT-sampleLocationsCount-01527"],
                ..Default::default()
            }));
        }

        for (index, location) in sample_locations.iter().enumerate() {
            if !location.iter().all(|coord| (0.0..=1.0).contains(coord)) {
                return Err(Box::new(ValidationError {
                    context: format!("sample_locations[{}]", index).into(),
                    problem: "is not within the [0.0, 1.0] range".into(),
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}
