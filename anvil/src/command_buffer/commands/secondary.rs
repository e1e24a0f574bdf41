use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command, CommandBufferCallbackId, CommandBufferLevel, CommandBufferState,
        SubpassContents,
    },
    ValidationError, VulkanObject,
};
use ash::vk;
use smallvec::SmallVec;

/// # Commands to execute a secondary command buffer inside a primary command buffer.
impl CommandBuffer {
    /// Executes secondary command buffers.
    ///
    /// Inside a render pass, the current subpass must have been begun with
    /// `SubpassContents::SecondaryCommandBuffers` and every secondary command buffer must
    /// continue a render pass. Outside a render pass, none of them may.
    ///
    /// Subscribers of [`CommandBufferCallbackId::ExecuteCommandsCommandRecorded`] are notified.
    pub fn execute_commands(
        &mut self,
        command_buffers: &[&CommandBuffer],
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_execute_commands(command_buffers)
            .map_err(|err| self.rejected("execute_commands", err))?;

        Ok(unsafe { self.execute_commands_unchecked(command_buffers) })
    }

    fn validate_execute_commands(
        &self,
        command_buffers: &[&CommandBuffer],
    ) -> Result<(), Box<ValidationError>> {
        self.validate_primary()?;
        self.validate_state(RecordingScope::Anywhere)?;

        if command_buffers.is_empty() {
            return Err(Box::new(ValidationError {
                context: "command_buffers".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdExecuteCommands-commandBufferCount-arraylength"],
                ..Default::default()
            }));
        }

        let inside_render_pass = self.state() == CommandBufferState::RecordingInsideRenderPass;

        if inside_render_pass
            && self
                .render_pass
                .is_some_and(|rp| rp.contents != SubpassContents::SecondaryCommandBuffers)
        {
            return Err(Box::new(ValidationError {
                problem: "a render pass instance is active, but the current subpass was not \
                    begun with `SubpassContents::SecondaryCommandBuffers`"
                    .into(),
                vuids: &["VUID-vkCmdExecuteCommands-contents-06018"],
                ..Default::default()
            }));
        }

        for (index, command_buffer) in command_buffers.iter().enumerate() {
            if command_buffer.level() != CommandBufferLevel::Secondary {
                return Err(Box::new(ValidationError {
                    context: format!("command_buffers[{}]", index).into(),
                    problem: "is not a secondary command buffer".into(),
                    vuids: &["VUID-vkCmdExecuteCommands-pCommandBuffers-00088"],
                    ..Default::default()
                }));
            }

            if !command_buffer.is_executable() {
                return Err(Box::new(ValidationError {
                    context: format!("command_buffers[{}]", index).into(),
                    problem: "has not finished recording".into(),
                    vuids: &["VUID-vkCmdExecuteCommands-pCommandBuffers-00089"],
                    ..Default::default()
                }));
            }

            match (inside_render_pass, command_buffer.is_render_pass_continuation()) {
                (true, false) => {
                    return Err(Box::new(ValidationError {
                        context: format!("command_buffers[{}]", index).into(),
                        problem: "a render pass instance is active, but the command buffer \
                            does not continue a render pass"
                            .into(),
                        vuids: &["VUID-vkCmdExecuteCommands-pCommandBuffers-00096"],
                        ..Default::default()
                    }));
                }
                (false, true) => {
                    return Err(Box::new(ValidationError {
                        context: format!("command_buffers[{}]", index).into(),
                        problem: "a render pass instance is not active, but the command buffer \
                            continues a render pass"
                            .into(),
                        vuids: &["VUID-vkCmdExecuteCommands-pCommandBuffers-00100"],
                        ..Default::default()
                    }));
                }
                _ => (),
            }
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn execute_commands_unchecked(
        &mut self,
        command_buffers: &[&CommandBuffer],
    ) -> &mut Self {
        let command_buffers_vk: SmallVec<[vk::CommandBuffer; 4]> = command_buffers
            .iter()
            .map(|command_buffer| command_buffer.handle())
            .collect();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_execute_commands)(
                command_buffer,
                command_buffers_vk.len() as u32,
                command_buffers_vk.as_ptr(),
            )
        });
        self.record_and_publish(
            "execute_commands",
            CommandBufferCallbackId::ExecuteCommandsCommandRecorded,
            || Command::ExecuteCommands {
                command_buffers: command_buffers_vk.clone(),
            },
        );

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        callback::{Callback, OwnerTag},
        command_buffer::{
            Command, CommandBuffer, CommandBufferBeginInfo, CommandBufferCallbackArgument,
            CommandBufferCallbackId, CommandBufferInheritanceInfo,
            CommandBufferInheritanceRenderPassInfo, CommandPool, CommandPoolCreateInfo,
            RenderArea, RenderPassBeginInfo, SubpassContents,
        },
        tests::take_calls,
        Handle, VulkanObject,
    };
    use ash::vk;
    use std::sync::{Arc, Mutex};

    fn render_pass_begin_info() -> RenderPassBeginInfo {
        RenderPassBeginInfo {
            render_area: RenderArea::Single(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: 16,
                    height: 16,
                },
            }),
            ..RenderPassBeginInfo::new(vk::RenderPass::from_raw(1), vk::Framebuffer::from_raw(2))
        }
    }

    fn recorded_secondary(pool: &Arc<CommandPool>, render_pass_continue: bool) -> CommandBuffer {
        let mut secondary = pool.allocate_secondary().unwrap();
        let inheritance_info = CommandBufferInheritanceInfo {
            render_pass: render_pass_continue.then(|| {
                CommandBufferInheritanceRenderPassInfo::new(vk::RenderPass::from_raw(1))
            }),
            ..Default::default()
        };

        secondary
            .start_recording(CommandBufferBeginInfo {
                inheritance_info: Some(inheritance_info),
                ..Default::default()
            })
            .unwrap();

        if render_pass_continue {
            secondary.draw(3, 1, 0, 0).unwrap();
        } else {
            secondary.dispatch([1, 1, 1]).unwrap();
        }

        secondary.stop_recording().unwrap();

        secondary
    }

    #[test]
    fn execute_inside_render_pass() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let continuing = recorded_secondary(&pool, true);
        let standalone = recorded_secondary(&pool, false);
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info(), SubpassContents::Inline)
            .unwrap();

        // The subpass was begun for inline commands.
        assert!(cb.execute_commands(&[&continuing]).is_err());

        cb.next_subpass(SubpassContents::SecondaryCommandBuffers)
            .unwrap();
        take_calls();
        assert!(cb.execute_commands(&[&standalone]).is_err());
        assert!(cb.execute_commands(&[]).is_err());
        cb.execute_commands(&[&continuing, &continuing]).unwrap();
        assert_eq!(take_calls(), ["vkCmdExecuteCommands"]);

        cb.end_render_pass().unwrap();
        assert!(cb.execute_commands(&[&continuing]).is_err());
        assert!(cb.execute_commands(&[&standalone]).is_ok());
        cb.stop_recording().unwrap();
    }

    #[test]
    fn executed_command_buffers_must_be_ready() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut secondary = pool.allocate_secondary().unwrap();
        let other_primary = pool.allocate_primary().unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        assert!(cb.execute_commands(&[&secondary]).is_err());
        assert!(cb.execute_commands(&[&other_primary]).is_err());

        secondary
            .start_recording(CommandBufferBeginInfo {
                inheritance_info: Some(Default::default()),
                ..Default::default()
            })
            .unwrap();
        assert!(cb.execute_commands(&[&secondary]).is_err());
        secondary.stop_recording().unwrap();
        assert!(cb.execute_commands(&[&secondary]).is_ok());

        // Secondary command buffers cannot execute other secondary command buffers.
        let nested = recorded_secondary(&pool, false);
        let mut outer = pool.allocate_secondary().unwrap();
        outer
            .start_recording(CommandBufferBeginInfo {
                inheritance_info: Some(Default::default()),
                ..Default::default()
            })
            .unwrap();
        assert!(outer.execute_commands(&[&nested]).is_err());
    }

    #[test]
    fn execute_commands_callback() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let secondary = recorded_secondary(&pool, false);
        let mut cb = pool.allocate_primary().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        cb.callbacks()
            .subscribe(
                CommandBufferCallbackId::ExecuteCommandsCommandRecorded.slot(),
                Callback::new({
                    let received = received.clone();
                    move |argument: &CommandBufferCallbackArgument| {
                        received.lock().unwrap().push(argument.command.clone());
                    }
                }),
                OwnerTag::new(7),
            )
            .unwrap();

        cb.start_recording(Default::default()).unwrap();
        cb.execute_commands(&[&secondary]).unwrap();

        let received = received.lock().unwrap();
        match received.as_slice() {
            [Command::ExecuteCommands { command_buffers }] => {
                assert_eq!(command_buffers.as_slice(), [secondary.handle()]);
            }
            commands => panic!("unexpected commands {:?}", commands),
        }
    }
}
