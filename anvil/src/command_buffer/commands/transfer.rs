use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    image::{is_valid_subresource_layers, Filter, ImageLayout},
    DeviceSize, Handle, ValidationError,
};
use ash::vk;
use std::borrow::Cow;

/// # Commands to transfer data between resources.
///
/// These commands can only be recorded outside of a render pass.
impl CommandBuffer {
    /// Copies data between two buffers.
    pub fn copy_buffer(
        &mut self,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_copy_buffer(src_buffer, dst_buffer, regions)
            .map_err(|err| self.rejected("copy_buffer", err))?;

        Ok(unsafe { self.copy_buffer_unchecked(src_buffer, dst_buffer, regions) })
    }

    fn validate_copy_buffer(
        &self,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(src_buffer, "src_buffer")?;
        validate_non_null(dst_buffer, "dst_buffer")?;
        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            if region.size == 0 {
                return Err(Box::new(ValidationError {
                    context: format!("regions[{}].size", index).into(),
                    problem: "is zero".into(),
                    vuids: &["VUID-VkBufferCopy-size-01988"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn copy_buffer_unchecked(
        &mut self,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_copy_buffer)(
                command_buffer,
                src_buffer,
                dst_buffer,
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("copy_buffer", || Command::CopyBuffer {
            src_buffer,
            dst_buffer,
            regions: regions.iter().copied().collect(),
        });

        self
    }

    /// Copies data between two images, without any format conversion.
    pub fn copy_image(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageCopy],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_copy_image(src_image, src_image_layout, dst_image, dst_image_layout, regions)
            .map_err(|err| self.rejected("copy_image", err))?;

        Ok(unsafe {
            self.copy_image_unchecked(
                src_image,
                src_image_layout,
                dst_image,
                dst_image_layout,
                regions,
            )
        })
    }

    fn validate_copy_image(
        &self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageCopy],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_image_pair(src_image, src_image_layout, dst_image, dst_image_layout)?;
        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            validate_layers(&region.src_subresource, index, "src_subresource")?;
            validate_layers(&region.dst_subresource, index, "dst_subresource")?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn copy_image_unchecked(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageCopy],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_copy_image)(
                command_buffer,
                src_image,
                src_image_layout.into(),
                dst_image,
                dst_image_layout.into(),
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("copy_image", || Command::CopyImage {
            src_image,
            src_image_layout,
            dst_image,
            dst_image_layout,
            regions: regions.iter().copied().collect(),
        });

        self
    }

    /// Blits regions of an image into another, scaling and converting formats as needed.
    pub fn blit_image(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageBlit],
        filter: Filter,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_blit_image(src_image, src_image_layout, dst_image, dst_image_layout, regions)
            .map_err(|err| self.rejected("blit_image", err))?;

        Ok(unsafe {
            self.blit_image_unchecked(
                src_image,
                src_image_layout,
                dst_image,
                dst_image_layout,
                regions,
                filter,
            )
        })
    }

    fn validate_blit_image(
        &self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageBlit],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_image_pair(src_image, src_image_layout, dst_image, dst_image_layout)?;
        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            validate_layers(&region.src_subresource, index, "src_subresource")?;
            validate_layers(&region.dst_subresource, index, "dst_subresource")?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn blit_image_unchecked(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageBlit],
        filter: Filter,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_blit_image)(
                command_buffer,
                src_image,
                src_image_layout.into(),
                dst_image,
                dst_image_layout.into(),
                regions.len() as u32,
                regions.as_ptr(),
                filter.into(),
            )
        });
        self.record("blit_image", || Command::BlitImage {
            src_image,
            src_image_layout,
            dst_image,
            dst_image_layout,
            regions: regions.iter().copied().collect(),
            filter,
        });

        self
    }

    /// Copies data from a buffer to an image.
    pub fn copy_buffer_to_image(
        &mut self,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_copy_buffer_to_image(src_buffer, dst_image, dst_image_layout, regions)
            .map_err(|err| self.rejected("copy_buffer_to_image", err))?;

        Ok(unsafe {
            self.copy_buffer_to_image_unchecked(src_buffer, dst_image, dst_image_layout, regions)
        })
    }

    fn validate_copy_buffer_to_image(
        &self,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(src_buffer, "src_buffer")?;
        validate_non_null(dst_image, "dst_image")?;

        if !dst_image_layout.is_valid_transfer_dst() {
            return Err(Box::new(ValidationError {
                context: "dst_image_layout".into(),
                problem: "is not `ImageLayout::TransferDstOptimal` or `ImageLayout::General`"
                    .into(),
                vuids: &["VUID-vkCmdCopyBufferToImage-dstImageLayout-01396"],
                ..Default::default()
            }));
        }

        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            validate_layers(&region.image_subresource, index, "image_subresource")?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn copy_buffer_to_image_unchecked(
        &mut self,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_copy_buffer_to_image)(
                command_buffer,
                src_buffer,
                dst_image,
                dst_image_layout.into(),
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("copy_buffer_to_image", || Command::CopyBufferToImage {
            src_buffer,
            dst_image,
            dst_image_layout,
            regions: regions.iter().copied().collect(),
        });

        self
    }

    /// Copies data from an image to a buffer.
    pub fn copy_image_to_buffer(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_copy_image_to_buffer(src_image, src_image_layout, dst_buffer, regions)
            .map_err(|err| self.rejected("copy_image_to_buffer", err))?;

        Ok(unsafe {
            self.copy_image_to_buffer_unchecked(src_image, src_image_layout, dst_buffer, regions)
        })
    }

    fn validate_copy_image_to_buffer(
        &self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(src_image, "src_image")?;
        validate_non_null(dst_buffer, "dst_buffer")?;

        if !src_image_layout.is_valid_transfer_src() {
            return Err(Box::new(ValidationError {
                context: "src_image_layout".into(),
                problem: "is not `ImageLayout::TransferSrcOptimal` or `ImageLayout::General`"
                    .into(),
                vuids: &["VUID-vkCmdCopyImageToBuffer-srcImageLayout-01397"],
                ..Default::default()
            }));
        }

        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            validate_layers(&region.image_subresource, index, "image_subresource")?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn copy_image_to_buffer_unchecked(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_copy_image_to_buffer)(
                command_buffer,
                src_image,
                src_image_layout.into(),
                dst_buffer,
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("copy_image_to_buffer", || Command::CopyImageToBuffer {
            src_image,
            src_image_layout,
            dst_buffer,
            regions: regions.iter().copied().collect(),
        });

        self
    }

    /// Writes `data` inline into a buffer.
    ///
    /// `dst_offset` and the length of `data` must be multiples of 4, and `data` can be at most
    /// 65536 bytes long.
    pub fn update_buffer(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        data: &[u8],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_update_buffer(dst_buffer, dst_offset, data)
            .map_err(|err| self.rejected("update_buffer", err))?;

        Ok(unsafe { self.update_buffer_unchecked(dst_buffer, dst_offset, data) })
    }

    fn validate_update_buffer(
        &self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        data: &[u8],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(dst_buffer, "dst_buffer")?;

        if dst_offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "dst_offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdUpdateBuffer-dstOffset-00036"],
                ..Default::default()
            }));
        }

        if data.is_empty() {
            return Err(Box::new(ValidationError {
                context: "data".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdUpdateBuffer-dataSize-00037"],
                ..Default::default()
            }));
        }

        if data.len() > 65536 {
            return Err(Box::new(ValidationError {
                context: "data".into(),
                problem: "is longer than 65536 bytes".into(),
                vuids: &["VUID-vkCmdUpdateBuffer-dataSize-00037"],
                ..Default::default()
            }));
        }

        if data.len() % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "data".into(),
                problem: "the length is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdUpdateBuffer-dataSize-00038"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn update_buffer_unchecked(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        data: &[u8],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_update_buffer)(
                command_buffer,
                dst_buffer,
                dst_offset,
                data.len() as DeviceSize,
                data.as_ptr().cast(),
            )
        });
        self.record("update_buffer", || Command::UpdateBuffer {
            dst_buffer,
            dst_offset,
            data: data.to_vec(),
        });

        self
    }

    /// Fills a region of a buffer with repeated copies of `data`.
    ///
    /// `dst_offset` must be a multiple of 4. `size` must be a non-zero multiple of 4, or
    /// `vk::WHOLE_SIZE` to fill up to the end of the buffer.
    pub fn fill_buffer(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_fill_buffer(dst_buffer, dst_offset, size)
            .map_err(|err| self.rejected("fill_buffer", err))?;

        Ok(unsafe { self.fill_buffer_unchecked(dst_buffer, dst_offset, size, data) })
    }

    fn validate_fill_buffer(
        &self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_non_null(dst_buffer, "dst_buffer")?;

        if dst_offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "dst_offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdFillBuffer-dstOffset-00025"],
                ..Default::default()
            }));
        }

        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                vuids: &["VUID-vkCmdFillBuffer-size-00026"],
                ..Default::default()
            }));
        }

        if size != vk::WHOLE_SIZE && size % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is not a multiple of 4, and is not `vk::WHOLE_SIZE`".into(),
                vuids: &["VUID-vkCmdFillBuffer-size-00028"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn fill_buffer_unchecked(
        &mut self,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_fill_buffer)(command_buffer, dst_buffer, dst_offset, size, data)
        });
        self.record("fill_buffer", || Command::FillBuffer {
            dst_buffer,
            dst_offset,
            size,
            data,
        });

        self
    }

    /// Resolves a multisampled image into a single-sampled image.
    pub fn resolve_image(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageResolve],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_resolve_image(src_image, src_image_layout, dst_image, dst_image_layout, regions)
            .map_err(|err| self.rejected("resolve_image", err))?;

        Ok(unsafe {
            self.resolve_image_unchecked(
                src_image,
                src_image_layout,
                dst_image,
                dst_image_layout,
                regions,
            )
        })
    }

    fn validate_resolve_image(
        &self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageResolve],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_image_pair(src_image, src_image_layout, dst_image, dst_image_layout)?;
        validate_regions(regions)?;

        for (index, region) in regions.iter().enumerate() {
            validate_layers(&region.src_subresource, index, "src_subresource")?;
            validate_layers(&region.dst_subresource, index, "dst_subresource")?;
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn resolve_image_unchecked(
        &mut self,
        src_image: vk::Image,
        src_image_layout: ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: ImageLayout,
        regions: &[vk::ImageResolve],
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_resolve_image)(
                command_buffer,
                src_image,
                src_image_layout.into(),
                dst_image,
                dst_image_layout.into(),
                regions.len() as u32,
                regions.as_ptr(),
            )
        });
        self.record("resolve_image", || Command::ResolveImage {
            src_image,
            src_image_layout,
            dst_image,
            dst_image_layout,
            regions: regions.iter().copied().collect(),
        });

        self
    }
}

pub(in crate::command_buffer) fn validate_non_null(
    handle: impl Handle,
    context: &'static str,
) -> Result<(), Box<ValidationError>> {
    if handle.as_raw() == 0 {
        return Err(Box::new(ValidationError {
            context: context.into(),
            problem: "is a null handle".into(),
            ..Default::default()
        }));
    }

    Ok(())
}

pub(in crate::command_buffer) fn validate_regions<T>(
    regions: &[T],
) -> Result<(), Box<ValidationError>> {
    if regions.is_empty() {
        return Err(Box::new(ValidationError {
            context: "regions".into(),
            problem: "is empty".into(),
            ..Default::default()
        }));
    }

    Ok(())
}

fn validate_layers(
    layers: &vk::ImageSubresourceLayers,
    index: usize,
    field: &str,
) -> Result<(), Box<ValidationError>> {
    if !is_valid_subresource_layers(layers) {
        let context: Cow<'static, str> = format!("regions[{}].{}", index, field).into();

        return Err(Box::new(ValidationError {
            context,
            problem: "selects no aspect or no array layer".into(),
            ..Default::default()
        }));
    }

    Ok(())
}

fn validate_image_pair(
    src_image: vk::Image,
    src_image_layout: ImageLayout,
    dst_image: vk::Image,
    dst_image_layout: ImageLayout,
) -> Result<(), Box<ValidationError>> {
    validate_non_null(src_image, "src_image")?;
    validate_non_null(dst_image, "dst_image")?;

    if !src_image_layout.is_valid_transfer_src() {
        return Err(Box::new(ValidationError {
            context: "src_image_layout".into(),
            problem: "is not `ImageLayout::TransferSrcOptimal` or `ImageLayout::General`".into(),
            ..Default::default()
        }));
    }

    if !dst_image_layout.is_valid_transfer_dst() {
        return Err(Box::new(ValidationError {
            context: "dst_image_layout".into(),
            problem: "is not `ImageLayout::TransferDstOptimal` or `ImageLayout::General`".into(),
            ..Default::default()
        }));
    }

    Ok(())
}
