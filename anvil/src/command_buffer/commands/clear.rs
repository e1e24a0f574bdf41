use crate::{
    command_buffer::{
        commands::transfer::{validate_non_null, validate_regions},
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    format::{ClearColorValue, ClearDepthStencilValue},
    image::{is_valid_subresource_range, ImageLayout},
    ValidationError,
};
use ash::vk;
use smallvec::SmallVec;

/// # Commands to fill resources with new data.
impl CommandBuffer {
    /// Clears a color image with a specific value.
    ///
    /// Can only be recorded outside of a render pass.
    pub fn clear_color_image(
        &mut self,
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearColorValue,
        regions: &[vk::ImageSubresourceRange],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_clear_image(image, image_layout, regions)
            .map_err(|err| self.rejected("clear_color_image", err))?;

        Ok(unsafe { self.clear_color_image_unchecked(image, image_layout, clear_value, regions) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn clear_color_image_unchecked(
        &mut self,
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearColorValue,
        regions: &[vk::ImageSubresourceRange],
    ) -> &mut Self {
        let clear_value_vk: vk::ClearColorValue = clear_value.into();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_clear_color_image)(
                command_buffer,
                image,
                image_layout.into(),
                &clear_value_vk,
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("clear_color_image", || Command::ClearColorImage {
            image,
            image_layout,
            clear_value,
            regions: regions.iter().copied().collect(),
        });

        self
    }

    /// Clears a depth/stencil image with a specific value.
    ///
    /// Can only be recorded outside of a render pass. The depth value must be between 0.0 and
    /// 1.0 inclusive.
    pub fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearDepthStencilValue,
        regions: &[vk::ImageSubresourceRange],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_clear_depth_stencil_image(image, image_layout, clear_value, regions)
            .map_err(|err| self.rejected("clear_depth_stencil_image", err))?;

        Ok(unsafe {
            self.clear_depth_stencil_image_unchecked(image, image_layout, clear_value, regions)
        })
    }

    fn validate_clear_depth_stencil_image(
        &self,
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearDepthStencilValue,
        regions: &[vk::ImageSubresourceRange],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_clear_image(image, image_layout, regions)?;

        if !clear_value.is_depth_in_unit_range() {
            return Err(Box::new(ValidationError {
                context: "clear_value.depth".into(),
                problem: "is not between 0.0 and 1.0 inclusive".into(),
                vuids: &["VUID-VkClearDepthStencilValue-depth-00022"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn clear_depth_stencil_image_unchecked(
        &mut self,
        image: vk::Image,
        image_layout: ImageLayout,
        clear_value: ClearDepthStencilValue,
        regions: &[vk::ImageSubresourceRange],
    ) -> &mut Self {
        let clear_value_vk: vk::ClearDepthStencilValue = clear_value.into();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_clear_depth_stencil_image)(
                command_buffer,
                image,
                image_layout.into(),
                &clear_value_vk,
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("clear_depth_stencil_image", || {
            Command::ClearDepthStencilImage {
                image,
                image_layout,
                clear_value,
                regions: regions.iter().copied().collect(),
            }
        });

        self
    }

    fn validate_clear_image(
        &self,
        image: vk::Image,
        image_layout: ImageLayout,
        regions: &[vk::ImageSubresourceRange],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(image, "image")?;

        if !image_layout.is_valid_transfer_dst() {
            return Err(Box::new(ValidationError {
                context: "image_layout".into(),
                problem: "is not `ImageLayout::TransferDstOptimal` or `ImageLayout::General`"
                    .into(),
                ..Default::default()
            }));
        }

        validate_regions(regions)?;

        if let Some(index) = regions
            .iter()
            .position(|range| !is_valid_subresource_range(range))
        {
            return Err(Box::new(ValidationError {
                context: format!("regions[{}]", index).into(),
                problem: "selects no aspect, no mip level or no array layer".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Clears regions of the attachments of the current subpass.
    ///
    /// Can only be recorded inside of a render pass.
    pub fn clear_attachments(
        &mut self,
        attachments: &[ClearAttachment],
        rects: &[vk::ClearRect],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_clear_attachments(attachments, rects)
            .map_err(|err| self.rejected("clear_attachments", err))?;

        Ok(unsafe { self.clear_attachments_unchecked(attachments, rects) })
    }

    fn validate_clear_attachments(
        &self,
        attachments: &[ClearAttachment],
        rects: &[vk::ClearRect],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::InsideRenderPass)?;

        if attachments.is_empty() {
            return Err(Box::new(ValidationError {
                context: "attachments".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdClearAttachments-attachmentCount-arraylength"],
                ..Default::default()
            }));
        }

        for (index, attachment) in attachments.iter().enumerate() {
            if let &ClearAttachment::Depth(depth) | &ClearAttachment::DepthStencil((depth, _)) =
                attachment
            {
                if !(0.0..=1.0).contains(&depth) {
                    return Err(Box::new(ValidationError {
                        context: format!("attachments[{}]", index).into(),
                        problem: "the depth value is not between 0.0 and 1.0 inclusive".into(),
                        vuids: &["VUID-VkClearDepthStencilValue-depth-00022"],
                        ..Default::default()
                    }));
                }
            }
        }

        if rects.is_empty() {
            return Err(Box::new(ValidationError {
                context: "rects".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdClearAttachments-rectCount-arraylength"],
                ..Default::default()
            }));
        }

        for (index, rect) in rects.iter().enumerate() {
            if rect.rect.extent.width == 0 || rect.rect.extent.height == 0 {
                return Err(Box::new(ValidationError {
                    context: format!("rects[{}].rect.extent", index).into(),
                    problem: "has a width or height of zero".into(),
                    vuids: &["VUID-vkCmdClearAttachments-rect-02682"],
                    ..Default::default()
                }));
            }

            if rect.layer_count == 0 {
                return Err(Box::new(ValidationError {
                    context: format!("rects[{}].layer_count", index).into(),
                    problem: "is zero".into(),
                    vuids: &["VUID-vkCmdClearAttachments-layerCount-01934"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn clear_attachments_unchecked(
        &mut self,
        attachments: &[ClearAttachment],
        rects: &[vk::ClearRect],
    ) -> &mut Self {
        let attachments_vk: SmallVec<[_; 4]> =
            attachments.iter().copied().map(ClearAttachment::to_vk).collect();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_clear_attachments)(
                command_buffer,
                attachments_vk.len() as u32,
                attachments_vk.as_ptr(),
                rects.len() as u32,
                rects.as_ptr(),
            )
        });
        self.record("clear_attachments", || Command::ClearAttachments {
            attachments: attachments.iter().copied().collect(),
            rects: rects.iter().copied().collect(),
        });

        self
    }
}

/// An attachment of the current subpass to clear, and the value to clear it with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearAttachment {
    /// Clears the color attachment at `color_attachment` in the subpass.
    Color {
        color_attachment: u32,
        clear_value: ClearColorValue,
    },

    /// Clears the depth attachment of the subpass.
    Depth(f32),

    /// Clears the stencil attachment of the subpass.
    Stencil(u32),

    /// Clears both the depth and stencil attachments of the subpass.
    DepthStencil((f32, u32)),
}

impl ClearAttachment {
    pub(crate) fn to_vk(self) -> vk::ClearAttachment {
        match self {
            ClearAttachment::Color {
                color_attachment,
                clear_value,
            } => vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment,
                clear_value: vk::ClearValue {
                    color: clear_value.into(),
                },
            },
            ClearAttachment::Depth(depth) => vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
                },
            },
            ClearAttachment::Stencil(stencil) => vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::STENCIL,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 0.0,
                        stencil,
                    },
                },
            },
            ClearAttachment::DepthStencil((depth, stencil)) => vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
                },
            },
        }
    }
}
