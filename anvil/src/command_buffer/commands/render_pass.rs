use crate::{
    command_buffer::{
        commands::transfer::validate_non_null,
        sys::{CommandBuffer, RecordingScope, RenderPassState},
        Command, CommandBufferCallbackId, CommandBufferState, RenderArea, RenderPassBeginInfo,
        SubpassContents,
    },
    device::DeviceOwned,
    Requires, RequiresAllOf, RequiresOneOf, ValidationError, Version,
};
use ash::vk;
use smallvec::SmallVec;
use std::iter;

/// # Commands for render passes.
///
/// These commands can only be recorded into primary command buffers. Secondary command buffers
/// that continue a render pass inherit it instead.
impl CommandBuffer {
    /// Begins a render pass instance, moving the command buffer into the render pass recording
    /// state.
    ///
    /// Subscribers of [`CommandBufferCallbackId::BeginRenderPassCommandRecorded`] are notified.
    pub fn begin_render_pass(
        &mut self,
        render_pass_begin_info: &RenderPassBeginInfo,
        contents: SubpassContents,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_begin_render_pass(render_pass_begin_info)
            .map_err(|err| self.rejected("begin_render_pass", err))?;

        Ok(unsafe { self.begin_render_pass_unchecked(render_pass_begin_info, contents) })
    }

    /// Like [`begin_render_pass`](Self::begin_render_pass), but records `vkCmdBeginRenderPass2`.
    pub fn begin_render_pass2(
        &mut self,
        render_pass_begin_info: &RenderPassBeginInfo,
        contents: SubpassContents,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_render_pass2()
            .and_then(|()| self.validate_begin_render_pass(render_pass_begin_info))
            .map_err(|err| self.rejected("begin_render_pass2", err))?;

        Ok(unsafe { self.begin_render_pass2_unchecked(render_pass_begin_info, contents) })
    }

    fn validate_render_pass2(&self) -> Result<(), Box<ValidationError>> {
        let device = self.device();

        if !(device.api_version() >= Version::V1_2
            || device.enabled_extensions().khr_create_renderpass2)
        {
            return Err(Box::new(ValidationError {
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_2)]),
                    RequiresAllOf(&[Requires::DeviceExtension("khr_create_renderpass2")]),
                ]),
                ..Default::default()
            }));
        }

        Ok(())
    }

    fn validate_begin_render_pass(
        &self,
        render_pass_begin_info: &RenderPassBeginInfo,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_primary()?;
        self.validate_state(RecordingScope::OutsideRenderPass)?;
        render_pass_begin_info
            .validate(self)
            .map_err(|err| err.add_context("render_pass_begin_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn begin_render_pass_unchecked(
        &mut self,
        render_pass_begin_info: &RenderPassBeginInfo,
        contents: SubpassContents,
    ) -> &mut Self {
        self.begin_render_pass_inner(render_pass_begin_info, contents, false)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn begin_render_pass2_unchecked(
        &mut self,
        render_pass_begin_info: &RenderPassBeginInfo,
        contents: SubpassContents,
    ) -> &mut Self {
        self.begin_render_pass_inner(render_pass_begin_info, contents, true)
    }

    unsafe fn begin_render_pass_inner(
        &mut self,
        render_pass_begin_info: &RenderPassBeginInfo,
        contents: SubpassContents,
        render_pass2: bool,
    ) -> &mut Self {
        let &RenderPassBeginInfo {
            render_pass,
            framebuffer,
            ref render_area,
            ref clear_values,
            device_mask,
            _ne: _,
        } = render_pass_begin_info;

        let device = self.device().clone();
        let device_mask = device_mask.unwrap_or(self.device_mask);

        let clear_values_vk: SmallVec<[vk::ClearValue; 4]> = clear_values
            .iter()
            .map(|clear_value| clear_value.map_or_else(vk::ClearValue::default, Into::into))
            .collect();

        let device_render_areas_vk: SmallVec<[vk::Rect2D; 2]> = match render_area {
            RenderArea::Single(area) => {
                iter::repeat(*area).take(device.physical_device_count() as usize).collect()
            }
            RenderArea::PerDevice(areas) => areas.clone(),
        };

        let mut device_group_info_vk = device.is_multi_device().then(|| {
            vk::DeviceGroupRenderPassBeginInfo::default()
                .device_mask(device_mask)
                .device_render_areas(&device_render_areas_vk)
        });

        let mut render_pass_begin_info_vk = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(match render_area {
                RenderArea::Single(area) => *area,
                RenderArea::PerDevice(areas) => areas.first().copied().unwrap_or_default(),
            })
            .clear_values(&clear_values_vk);

        if let Some(device_group_info_vk) = device_group_info_vk.as_mut() {
            render_pass_begin_info_vk = render_pass_begin_info_vk.push_next(device_group_info_vk);
        }

        let use_core = device.api_version() >= Version::V1_2;

        if render_pass2 {
            let subpass_begin_info_vk = vk::SubpassBeginInfo::default().contents(contents.into());

            self.emit(|fns, command_buffer| {
                if use_core {
                    (fns.v1_2.cmd_begin_render_pass2)(
                        command_buffer,
                        &render_pass_begin_info_vk,
                        &subpass_begin_info_vk,
                    )
                } else {
                    (fns.khr_create_renderpass2.cmd_begin_render_pass2_khr)(
                        command_buffer,
                        &render_pass_begin_info_vk,
                        &subpass_begin_info_vk,
                    )
                }
            });
        } else {
            self.emit(|fns, command_buffer| {
                (fns.v1_0.cmd_begin_render_pass)(
                    command_buffer,
                    &render_pass_begin_info_vk,
                    contents.into(),
                )
            });
        }

        self.state = CommandBufferState::RecordingInsideRenderPass;
        self.render_pass = Some(RenderPassState {
            contents,
            device_mask,
        });

        tracing::debug!(
            command_buffer = self.id().get(),
            device_mask,
            ?contents,
            "began render pass"
        );

        self.record_and_publish(
            if render_pass2 {
                "begin_render_pass2"
            } else {
                "begin_render_pass"
            },
            CommandBufferCallbackId::BeginRenderPassCommandRecorded,
            || Command::BeginRenderPass {
                render_pass_begin_info: render_pass_begin_info.clone(),
                contents,
                render_pass2,
            },
        );

        self
    }

    /// Advances to the next subpass of the current render pass instance.
    pub fn next_subpass(
        &mut self,
        contents: SubpassContents,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_next_subpass()
            .map_err(|err| self.rejected("next_subpass", err))?;

        Ok(unsafe { self.next_subpass_unchecked(contents) })
    }

    /// Like [`next_subpass`](Self::next_subpass), but records `vkCmdNextSubpass2`.
    pub fn next_subpass2(
        &mut self,
        contents: SubpassContents,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_render_pass2()
            .and_then(|()| self.validate_next_subpass())
            .map_err(|err| self.rejected("next_subpass2", err))?;

        Ok(unsafe { self.next_subpass2_unchecked(contents) })
    }

    fn validate_next_subpass(&self) -> Result<(), Box<ValidationError>> {
        self.validate_primary()?;
        self.validate_state(RecordingScope::InsideRenderPass)?;

        if self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is active".into(),
                vuids: &["VUID-vkCmdNextSubpass-None-02349"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn next_subpass_unchecked(&mut self, contents: SubpassContents) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_next_subpass)(command_buffer, contents.into())
        });
        self.set_subpass_contents(contents);
        self.record("next_subpass", || Command::NextSubpass {
            contents,
            render_pass2: false,
        });

        self
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn next_subpass2_unchecked(&mut self, contents: SubpassContents) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_2;
        let subpass_begin_info_vk = vk::SubpassBeginInfo::default().contents(contents.into());
        let subpass_end_info_vk = vk::SubpassEndInfo::default();

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_2.cmd_next_subpass2)(
                    command_buffer,
                    &subpass_begin_info_vk,
                    &subpass_end_info_vk,
                )
            } else {
                (fns.khr_create_renderpass2.cmd_next_subpass2_khr)(
                    command_buffer,
                    &subpass_begin_info_vk,
                    &subpass_end_info_vk,
                )
            }
        });
        self.set_subpass_contents(contents);
        self.record("next_subpass2", || Command::NextSubpass {
            contents,
            render_pass2: true,
        });

        self
    }

    fn set_subpass_contents(&mut self, contents: SubpassContents) {
        if let Some(render_pass) = &mut self.render_pass {
            render_pass.contents = contents;
        }
    }

    /// Ends the current render pass instance, moving the command buffer back out of the render
    /// pass recording state.
    ///
    /// Subscribers of [`CommandBufferCallbackId::EndRenderPassCommandRecorded`] are notified.
    pub fn end_render_pass(&mut self) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_end_render_pass()
            .map_err(|err| self.rejected("end_render_pass", err))?;

        Ok(unsafe { self.end_render_pass_unchecked() })
    }

    /// Like [`end_render_pass`](Self::end_render_pass), but records `vkCmdEndRenderPass2`.
    pub fn end_render_pass2(&mut self) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_render_pass2()
            .and_then(|()| self.validate_end_render_pass())
            .map_err(|err| self.rejected("end_render_pass2", err))?;

        Ok(unsafe { self.end_render_pass2_unchecked() })
    }

    fn validate_end_render_pass(&self) -> Result<(), Box<ValidationError>> {
        self.validate_primary()?;
        self.validate_state(RecordingScope::InsideRenderPass)?;

        if self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is active".into(),
                vuids: &["VUID-vkCmdEndRenderPass-None-02351"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn end_render_pass_unchecked(&mut self) -> &mut Self {
        self.emit(|fns, command_buffer| (fns.v1_0.cmd_end_render_pass)(command_buffer));
        self.end_render_pass_inner(false)
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn end_render_pass2_unchecked(&mut self) -> &mut Self {
        let use_core = self.device().api_version() >= Version::V1_2;
        let subpass_end_info_vk = vk::SubpassEndInfo::default();

        self.emit(|fns, command_buffer| {
            if use_core {
                (fns.v1_2.cmd_end_render_pass2)(command_buffer, &subpass_end_info_vk)
            } else {
                (fns.khr_create_renderpass2.cmd_end_render_pass2_khr)(
                    command_buffer,
                    &subpass_end_info_vk,
                )
            }
        });
        self.end_render_pass_inner(true)
    }

    fn end_render_pass_inner(&mut self, render_pass2: bool) -> &mut Self {
        self.state = CommandBufferState::RecordingOutsideRenderPass;
        self.render_pass = None;

        tracing::debug!(command_buffer = self.id().get(), "ended render pass");

        self.record_and_publish(
            if render_pass2 {
                "end_render_pass2"
            } else {
                "end_render_pass"
            },
            CommandBufferCallbackId::EndRenderPassCommandRecorded,
            || Command::EndRenderPass { render_pass2 },
        );

        self
    }
}

impl RenderPassBeginInfo {
    pub(crate) fn validate(
        &self,
        command_buffer: &CommandBuffer,
    ) -> Result<(), Box<ValidationError>> {
        let &Self {
            render_pass,
            framebuffer,
            ref render_area,
            clear_values: _,
            device_mask,
            _ne: _,
        } = self;

        let device = command_buffer.device();

        validate_non_null(render_pass, "render_pass")?;
        validate_non_null(framebuffer, "framebuffer")?;

        match render_area {
            RenderArea::Single(area) => {
                if area.extent.width == 0 || area.extent.height == 0 {
                    return Err(Box::new(ValidationError {
                        context: "render_area".into(),
                        problem: "has a width or height of zero".into(),
                        vuids: &["VUID-VkRenderPassBeginInfo-None-08996"],
                        ..Default::default()
                    }));
                }
            }
            RenderArea::PerDevice(areas) => {
                if !device.is_multi_device() {
                    return Err(Box::new(ValidationError {
                        context: "render_area".into(),
                        problem: "is `RenderArea::PerDevice`, but the device has only one \
                            physical device"
                            .into(),
                        ..Default::default()
                    }));
                }

                if areas.len() != device.physical_device_count() as usize {
                    return Err(Box::new(ValidationError {
                        context: "render_area".into(),
                        problem: "the number of areas does not equal the number of physical \
                            devices of the device"
                            .into(),
                        vuids: &["VUID-VkDeviceGroupRenderPassBeginInfo-deviceRenderAreaCount-00908"],
                        ..Default::default()
                    }));
                }

                if let Some(index) = areas
                    .iter()
                    .position(|area| area.extent.width == 0 || area.extent.height == 0)
                {
                    return Err(Box::new(ValidationError {
                        context: format!("render_area[{}]", index).into(),
                        problem: "has a width or height of zero".into(),
                        ..Default::default()
                    }));
                }
            }
        }

        if let Some(device_mask) = device_mask {
            if device_mask == 0 {
                return Err(Box::new(ValidationError {
                    context: "device_mask".into(),
                    problem: "is zero".into(),
                    vuids: &["VUID-VkDeviceGroupRenderPassBeginInfo-deviceMask-00907"],
                    ..Default::default()
                }));
            }

            if device_mask & !command_buffer.device_mask != 0 {
                return Err(Box::new(ValidationError {
                    context: "device_mask".into(),
                    problem: "is not a subset of the device mask the command buffer started \
                        recording with"
                        .into(),
                    vuids: &["VUID-VkDeviceGroupRenderPassBeginInfo-deviceMask-00906"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::{
            Command, CommandBufferBeginInfo, CommandBufferState, CommandPool,
            CommandPoolCreateInfo, RenderArea, RenderPassBeginInfo, SubpassContents,
        },
        format::ClearValue,
        tests::{last_render_pass_info, take_calls, RenderPassInfo},
        Handle, Version,
    };
    use ash::vk;
    use serial_test::serial;
    use smallvec::smallvec;

    fn area(width: u32, height: u32) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width, height },
        }
    }

    fn render_pass_begin_info() -> RenderPassBeginInfo {
        RenderPassBeginInfo {
            render_area: RenderArea::Single(area(128, 128)),
            clear_values: vec![Some(ClearValue::Float([0.0; 4])), None],
            ..RenderPassBeginInfo::new(vk::RenderPass::from_raw(1), vk::Framebuffer::from_raw(2))
        }
    }

    #[test]
    #[serial]
    fn render_pass_lifecycle() {
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

        assert!(cb
            .begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .is_err());

        cb.start_recording(Default::default()).unwrap();
        assert!(cb.next_subpass(SubpassContents::Inline).is_err());
        assert!(cb.end_render_pass().is_err());
        take_calls();

        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        assert_eq!(cb.state(), CommandBufferState::RecordingInsideRenderPass);
        assert_eq!(
            last_render_pass_info(),
            Some(RenderPassInfo {
                clear_value_count: 2,
                device_mask: None,
                device_render_area_count: 0,
            }),
        );
        assert!(cb
            .begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .is_err());

        cb.next_subpass(SubpassContents::Inline)
            .unwrap()
            .end_render_pass()
            .unwrap();
        assert_eq!(cb.state(), CommandBufferState::RecordingOutsideRenderPass);
        assert_eq!(
            take_calls(),
            [
                "vkCmdBeginRenderPass",
                "vkCmdNextSubpass",
                "vkCmdEndRenderPass",
            ],
        );

        assert!(matches!(
            cb.stashed_commands(),
            [
                Command::BeginRenderPass {
                    contents: SubpassContents::Inline,
                    render_pass2: false,
                    ..
                },
                Command::NextSubpass { .. },
                Command::EndRenderPass {
                    render_pass2: false,
                },
            ],
        ));
        cb.stop_recording().unwrap();
    }

    #[test]
    fn invalid_begin_info() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        take_calls();

        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    render_area: RenderArea::Single(area(0, 16)),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());
        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    render_pass: vk::RenderPass::null(),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());
        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    render_area: RenderArea::PerDevice(smallvec![area(16, 16)]),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());
        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    device_mask: Some(0b10),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());
        assert!(take_calls().is_empty());
        assert_eq!(cb.state(), CommandBufferState::RecordingOutsideRenderPass);
    }

    #[test]
    fn subpass_contents() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(
            &render_pass_begin_info(),
            SubpassContents::SecondaryCommandBuffers,
        )
        .unwrap();

        // Only secondary command buffers can be recorded into this subpass.
        assert!(cb.draw(3, 1, 0, 0).is_err());

        cb.next_subpass(SubpassContents::Inline).unwrap();
        assert!(cb.draw(3, 1, 0, 0).is_ok());
        cb.end_render_pass().unwrap();
    }

    #[test]
    fn render_pass2_entrypoints() {
        let device = mock_device!(api_version: Version::V1_1);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        match cb.begin_render_pass2(&render_pass_begin_info(), SubpassContents::Inline) {
            Err(err) => assert!(!err.requires_one_of.is_empty()),
            Ok(_) => panic!(),
        }

        let device = mock_device!(api_version: Version::V1_2);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        take_calls();
        cb.begin_render_pass2(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap()
            .next_subpass2(SubpassContents::Inline)
            .unwrap()
            .end_render_pass2()
            .unwrap();
        assert_eq!(
            take_calls(),
            [
                "vkCmdBeginRenderPass2",
                "vkCmdNextSubpass2",
                "vkCmdEndRenderPass2",
            ],
        );

        let device = mock_device!(extensions: [khr_create_renderpass2]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        cb.start_recording(Default::default()).unwrap();
        take_calls();
        cb.begin_render_pass2(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap()
            .next_subpass2(SubpassContents::Inline)
            .unwrap()
            .end_render_pass2()
            .unwrap();
        assert_eq!(
            take_calls(),
            [
                "vkCmdBeginRenderPass2KHR",
                "vkCmdNextSubpass2KHR",
                "vkCmdEndRenderPass2KHR",
            ],
        );
    }

    #[test]
    fn device_group_render_areas() {
        let device = mock_device!(api_version: Version::V1_1, physical_device_count: 3);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(CommandBufferBeginInfo {
            device_mask: Some(0b011),
            ..Default::default()
        })
        .unwrap();

        // A single area is replicated to every physical device.
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();
        assert_eq!(
            last_render_pass_info(),
            Some(RenderPassInfo {
                clear_value_count: 2,
                device_mask: Some(0b011),
                device_render_area_count: 3,
            }),
        );
        cb.end_render_pass().unwrap();

        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    render_area: RenderArea::PerDevice(smallvec![area(8, 8), area(8, 8)]),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());
        assert!(cb
            .begin_render_pass(
                &RenderPassBeginInfo {
                    device_mask: Some(0b100),
                    ..render_pass_begin_info()
                },
                SubpassContents::Inline,
            )
            .is_err());

        cb.begin_render_pass(
            &RenderPassBeginInfo {
                render_area: RenderArea::PerDevice(smallvec![
                    area(8, 8),
                    area(16, 16),
                    area(32, 32),
                ]),
                device_mask: Some(0b010),
                ..render_pass_begin_info()
            },
            SubpassContents::Inline,
        )
        .unwrap();
        assert_eq!(
            last_render_pass_info(),
            Some(RenderPassInfo {
                clear_value_count: 2,
                device_mask: Some(0b010),
                device_render_area_count: 3,
            }),
        );
    }

    #[test]
    fn secondary_cannot_begin_render_pass() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_secondary().unwrap();

        cb.start_recording(CommandBufferBeginInfo {
            inheritance_info: Some(Default::default()),
            ..Default::default()
        })
        .unwrap();
        assert!(cb
            .begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .is_err());
    }
}
