use super::{
    is_command_stashing_disabled, pool::CommandPool, Command, CommandBufferBeginInfo,
    CommandBufferCallbackArgument, CommandBufferCallbackId, CommandBufferInheritanceInfo,
    CommandBufferInheritanceRenderPassInfo, CommandBufferLevel, CommandBufferState,
    CommandBufferUsage, SubpassContents,
};
use crate::{
    callback::CallbackMultiplexer,
    device::{Device, DeviceOwned},
    fns::DeviceFunctions,
    macros::impl_id_counter,
    object_tracker::{self, ObjectType},
    Handle, Validated, ValidationError, VulkanError, VulkanObject,
};
use ash::vk;
use foldhash::HashSet;
use std::{
    ffi::CString,
    fmt::{Debug, Error as FmtError, Formatter},
    num::NonZeroU64,
    sync::Arc,
};

/// A command buffer allocated from a [`CommandPool`], together with its recording state.
///
/// Commands are recorded with the methods of this type. Every command checks that the command
/// buffer is in a state where it can be recorded, and that its arguments are valid, before it is
/// passed on to Vulkan. See the [module-level documentation](super) for the states.
///
/// The command buffer is freed back to its pool when dropped.
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    pool: Arc<CommandPool>,
    id: NonZeroU64,
    level: CommandBufferLevel,

    pub(super) state: CommandBufferState,
    // Value of the pool's reset epoch when recording last started or the command buffer was
    // reset. If the pool was reset since, the command buffer is idle.
    pool_epoch: u64,
    executable: bool,
    usage: CommandBufferUsage,
    pub(super) render_pass_continue: bool,
    pub(super) render_pass: Option<RenderPassState>,
    pub(super) device_mask: u32,
    pub(super) debug_marker_depth: u32,
    pub(super) active_queries: HashSet<(vk::QueryPool, u32)>,
    pub(super) transform_feedback_active: bool,

    stash: Vec<Command>,
    callbacks: CallbackMultiplexer<CommandBufferCallbackArgument>,
    debug_name: Option<String>,
}

/// What is known about the active render pass instance.
#[derive(Clone, Copy, Debug)]
pub(super) struct RenderPassState {
    pub(super) contents: SubpassContents,
    pub(super) device_mask: u32,
}

/// The recording states a command is valid in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RecordingScope {
    Anywhere,
    OutsideRenderPass,
    InsideRenderPass,
}

impl CommandBuffer {
    pub(super) unsafe fn from_allocation(
        pool: Arc<CommandPool>,
        handle: vk::CommandBuffer,
        level: CommandBufferLevel,
    ) -> Self {
        let device_mask = pool.device().all_physical_devices_mask();
        let pool_epoch = pool.reset_epoch();

        let command_buffer = CommandBuffer {
            handle,
            pool,
            id: Self::next_id(),
            level,

            state: CommandBufferState::Idle,
            pool_epoch,
            executable: false,
            usage: CommandBufferUsage::MultipleSubmit,
            render_pass_continue: false,
            render_pass: None,
            device_mask,
            debug_marker_depth: 0,
            active_queries: HashSet::default(),
            transform_feedback_active: false,

            stash: Vec::new(),
            callbacks: CallbackMultiplexer::new(CommandBufferCallbackId::COUNT),
            debug_name: None,
        };
        object_tracker::register(ObjectType::CommandBuffer, command_buffer.id);
        tracing::trace!(
            command_buffer = command_buffer.id.get(),
            ?level,
            "allocated command buffer"
        );

        command_buffer
    }

    /// Returns the pool the command buffer was allocated from.
    #[inline]
    pub fn pool(&self) -> &Arc<CommandPool> {
        &self.pool
    }

    /// Returns the level of the command buffer.
    #[inline]
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Returns the current recording state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        if self.is_stale() {
            CommandBufferState::Idle
        } else {
            self.state
        }
    }

    /// Returns whether recording was ended successfully, and the command buffer was not reset
    /// since. Only such secondary command buffers can be executed by a primary command buffer.
    #[inline]
    pub fn is_executable(&self) -> bool {
        self.executable && !self.is_stale()
    }

    /// Returns the usage the command buffer last started recording with.
    #[inline]
    pub fn usage(&self) -> CommandBufferUsage {
        self.usage
    }

    /// Returns whether the command buffer is a secondary command buffer that continues a render
    /// pass instance of the primary command buffer executing it.
    #[inline]
    pub fn is_render_pass_continuation(&self) -> bool {
        self.render_pass_continue
    }

    /// Returns the device mask the command buffer is currently recording for. Before recording
    /// starts, this is the mask of all physical devices.
    #[inline]
    pub fn device_mask(&self) -> u32 {
        self.device_mask
    }

    /// Returns the number of debug marker regions that are open.
    #[inline]
    pub fn debug_marker_depth(&self) -> u32 {
        self.debug_marker_depth
    }

    /// Returns the commands stashed since recording last started.
    ///
    /// This is always empty unless the pool was created with
    /// [`stash_commands`](super::CommandPoolCreateInfo::stash_commands).
    #[inline]
    pub fn stashed_commands(&self) -> &[Command] {
        &self.stash
    }

    /// Returns the callbacks published by the command buffer. The slots are the values of
    /// [`CommandBufferCallbackId`].
    #[inline]
    pub fn callbacks(&self) -> &CallbackMultiplexer<CommandBufferCallbackArgument> {
        &self.callbacks
    }

    /// Returns the debug name given with [`set_debug_name`](Self::set_debug_name).
    #[inline]
    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    fn is_stale(&self) -> bool {
        self.pool_epoch != self.pool.reset_epoch()
    }

    /// Starts recording.
    ///
    /// The command buffer must be idle. Primary command buffers start recording outside of a
    /// render pass. Secondary command buffers that inherit a render pass start inside it.
    pub fn start_recording(
        &mut self,
        begin_info: CommandBufferBeginInfo,
    ) -> Result<(), Validated<VulkanError>> {
        self.validate_start_recording(&begin_info)
            .map_err(|err| self.rejected("start_recording", err))?;

        unsafe { Ok(self.start_recording_unchecked(begin_info)?) }
    }

    fn validate_start_recording(
        &self,
        begin_info: &CommandBufferBeginInfo,
    ) -> Result<(), Box<ValidationError>> {
        if self.state().is_recording() {
            return Err(Box::new(ValidationError {
                problem: "the command buffer is already recording".into(),
                vuids: &["VUID-vkBeginCommandBuffer-commandBuffer-00049"],
                ..Default::default()
            }));
        }

        begin_info
            .validate(self.device(), self.level)
            .map_err(|err| err.add_context("begin_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn start_recording_unchecked(
        &mut self,
        begin_info: CommandBufferBeginInfo,
    ) -> Result<(), VulkanError> {
        let CommandBufferBeginInfo {
            usage,
            ref inheritance_info,
            device_mask,
            _ne: _,
        } = begin_info;

        let device = self.pool.device().clone();
        let device_mask = device_mask.unwrap_or(device.all_physical_devices_mask());
        let render_pass_continue = inheritance_info
            .as_ref()
            .is_some_and(|info| info.render_pass.is_some());

        let mut flags = vk::CommandBufferUsageFlags::from(usage);

        if render_pass_continue {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }

        let inheritance_info_vk = inheritance_info.as_ref().map(|inheritance_info| {
            let CommandBufferInheritanceInfo {
                ref render_pass,
                occlusion_query,
                _ne: _,
            } = *inheritance_info;

            let mut inheritance_info_vk = vk::CommandBufferInheritanceInfo::default();

            if let Some(render_pass) = render_pass {
                let &CommandBufferInheritanceRenderPassInfo {
                    render_pass,
                    subpass,
                    framebuffer,
                    _ne: _,
                } = render_pass;

                inheritance_info_vk = inheritance_info_vk
                    .render_pass(render_pass)
                    .subpass(subpass)
                    .framebuffer(framebuffer);
            }

            if let Some(query_flags) = occlusion_query {
                inheritance_info_vk = inheritance_info_vk
                    .occlusion_query_enable(true)
                    .query_flags(query_flags.into());
            }

            inheritance_info_vk
        });

        let mut device_group_info_vk =
            vk::DeviceGroupCommandBufferBeginInfo::default().device_mask(device_mask);
        let mut begin_info_vk = vk::CommandBufferBeginInfo::default().flags(flags);

        if let Some(inheritance_info_vk) = &inheritance_info_vk {
            begin_info_vk = begin_info_vk.inheritance_info(inheritance_info_vk);
        }

        if device.is_multi_device() {
            begin_info_vk = begin_info_vk.push_next(&mut device_group_info_vk);
        }

        {
            let _guard = self.pool.lock_for_recording();
            (device.fns().v1_0.begin_command_buffer)(self.handle, &begin_info_vk)
                .result()
                .map_err(|err| {
                    tracing::warn!(
                        command_buffer = self.id.get(),
                        result = ?err,
                        "vkBeginCommandBuffer failed"
                    );
                    VulkanError::from(err)
                })?;
        }

        self.pool_epoch = self.pool.reset_epoch();
        self.executable = false;
        self.usage = usage;
        self.render_pass_continue = render_pass_continue;
        self.device_mask = device_mask;
        self.debug_marker_depth = 0;
        self.active_queries.clear();
        self.transform_feedback_active = false;
        self.stash.clear();

        if render_pass_continue {
            self.state = CommandBufferState::RecordingInsideRenderPass;
            self.render_pass = Some(RenderPassState {
                contents: SubpassContents::Inline,
                device_mask,
            });
        } else {
            self.state = CommandBufferState::RecordingOutsideRenderPass;
            self.render_pass = None;
        }

        tracing::debug!(
            command_buffer = self.id.get(),
            ?usage,
            device_mask,
            render_pass_continue,
            "started recording"
        );

        Ok(())
    }

    /// Ends recording. The command buffer goes back to the idle state.
    ///
    /// A primary command buffer must not be inside a render pass. No query, debug marker region
    /// or transform feedback may be active.
    pub fn stop_recording(&mut self) -> Result<(), Validated<VulkanError>> {
        self.validate_stop_recording()
            .map_err(|err| self.rejected("stop_recording", err))?;

        unsafe { Ok(self.stop_recording_unchecked()?) }
    }

    fn validate_stop_recording(&self) -> Result<(), Box<ValidationError>> {
        match self.state() {
            CommandBufferState::Idle => {
                return Err(Box::new(ValidationError {
                    problem: "the command buffer is not recording".into(),
                    vuids: &["VUID-vkEndCommandBuffer-commandBuffer-00059"],
                    ..Default::default()
                }));
            }
            CommandBufferState::RecordingInsideRenderPass
                if self.level == CommandBufferLevel::Primary =>
            {
                return Err(Box::new(ValidationError {
                    problem: "a render pass instance is active".into(),
                    vuids: &["VUID-vkEndCommandBuffer-commandBuffer-00060"],
                    ..Default::default()
                }));
            }
            _ => (),
        }

        if !self.active_queries.is_empty() {
            return Err(Box::new(ValidationError {
                problem: "a query is active".into(),
                vuids: &["VUID-vkEndCommandBuffer-commandBuffer-00061"],
                ..Default::default()
            }));
        }

        if self.debug_marker_depth != 0 {
            return Err(Box::new(ValidationError {
                problem: "a debug marker region is still open".into(),
                ..Default::default()
            }));
        }

        if self.transform_feedback_active {
            return Err(Box::new(ValidationError {
                problem: "transform feedback is active".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn stop_recording_unchecked(&mut self) -> Result<(), VulkanError> {
        let result = {
            let _guard = self.pool.lock_for_recording();
            (self.fns().v1_0.end_command_buffer)(self.handle).result()
        };

        self.state = CommandBufferState::Idle;
        self.render_pass = None;

        if let Err(err) = result {
            tracing::warn!(
                command_buffer = self.id.get(),
                result = ?err,
                "vkEndCommandBuffer failed"
            );
            self.executable = false;

            return Err(VulkanError::from(err));
        }

        self.executable = true;
        tracing::debug!(command_buffer = self.id.get(), "stopped recording");

        Ok(())
    }

    /// Resets the command buffer to the idle state, whatever state it is in. Stashed commands
    /// are discarded.
    ///
    /// Every pool created by [`CommandPool::new`] allows its command buffers to be reset
    /// individually.
    ///
    /// # Safety
    ///
    /// - The command buffer must not be pending execution.
    pub unsafe fn reset(&mut self, release_resources: bool) -> Result<(), VulkanError> {
        let flags = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };

        let result = {
            let _guard = self.pool.lock_for_recording();
            (self.fns().v1_0.reset_command_buffer)(self.handle, flags).result()
        };

        self.pool_epoch = self.pool.reset_epoch();
        self.state = CommandBufferState::Idle;
        self.executable = false;
        self.render_pass_continue = false;
        self.render_pass = None;
        self.debug_marker_depth = 0;
        self.active_queries.clear();
        self.transform_feedback_active = false;
        self.stash.clear();

        result.map_err(|err| {
            tracing::warn!(
                command_buffer = self.id.get(),
                result = ?err,
                "vkResetCommandBuffer failed"
            );
            VulkanError::from(err)
        })?;

        tracing::debug!(command_buffer = self.id.get(), release_resources, "reset");

        Ok(())
    }

    /// Gives the command buffer a name, which debugging tools show in place of its handle.
    ///
    /// The name is always kept on the object. It is only passed on to Vulkan if the
    /// [`ext_debug_marker`](crate::device::DeviceExtensions::ext_debug_marker) extension is
    /// enabled.
    pub fn set_debug_name(&mut self, name: &str) -> Result<(), Validated<VulkanError>> {
        self.validate_set_debug_name(name)
            .map_err(|err| self.rejected("set_debug_name", err))?;

        unsafe { Ok(self.set_debug_name_unchecked(name)?) }
    }

    fn validate_set_debug_name(&self, name: &str) -> Result<(), Box<ValidationError>> {
        if name.contains('\0') {
            return Err(Box::new(ValidationError {
                context: "name".into(),
                problem: "contains a null byte".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_debug_name_unchecked(&mut self, name: &str) -> Result<(), VulkanError> {
        self.debug_name = Some(name.to_owned());

        let device = self.pool.device();

        if !device.enabled_extensions().ext_debug_marker {
            return Ok(());
        }

        let name_vk = CString::new(name).unwrap_or_default();
        let name_info_vk = vk::DebugMarkerObjectNameInfoEXT::default()
            .object_type(vk::DebugReportObjectTypeEXT::COMMAND_BUFFER)
            .object(self.handle.as_raw())
            .object_name(&name_vk);

        (device.fns().ext_debug_marker.debug_marker_set_object_name_ext)(
            device.handle(),
            &name_info_vk,
        )
        .result()
        .map_err(VulkanError::from)?;

        Ok(())
    }

    /// Checks that the command buffer is recording, in one of the states `scope` allows.
    ///
    /// Inside a render pass, a primary command buffer can only record commands other than
    /// `execute_commands`, `next_subpass` and `end_render_pass` if the subpass contents are
    /// inline. Those three use [`validate_state`](Self::validate_state) instead.
    pub(super) fn validate_recording(
        &self,
        scope: RecordingScope,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_state(scope)?;

        if self.level == CommandBufferLevel::Primary
            && self.state() == CommandBufferState::RecordingInsideRenderPass
            && self
                .render_pass
                .is_some_and(|rp| rp.contents != SubpassContents::Inline)
        {
            return Err(Box::new(ValidationError {
                problem: "the current subpass was begun with \
                    `SubpassContents::SecondaryCommandBuffers`, so it can only contain \
                    secondary command buffers"
                    .into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    pub(super) fn validate_state(&self, scope: RecordingScope) -> Result<(), Box<ValidationError>> {
        match (self.state(), scope) {
            (CommandBufferState::Idle, _) => Err(Box::new(ValidationError {
                problem: "the command buffer is not recording".into(),
                ..Default::default()
            })),
            (CommandBufferState::RecordingInsideRenderPass, RecordingScope::OutsideRenderPass) => {
                Err(Box::new(ValidationError {
                    problem: "a render pass instance is active".into(),
                    ..Default::default()
                }))
            }
            (CommandBufferState::RecordingOutsideRenderPass, RecordingScope::InsideRenderPass) => {
                Err(Box::new(ValidationError {
                    problem: "a render pass instance is not active".into(),
                    ..Default::default()
                }))
            }
            _ => Ok(()),
        }
    }

    pub(super) fn validate_primary(&self) -> Result<(), Box<ValidationError>> {
        if self.level != CommandBufferLevel::Primary {
            return Err(Box::new(ValidationError {
                problem: "the command buffer is not a primary command buffer".into(),
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Logs a rejected command and hands back the error.
    pub(super) fn rejected(
        &self,
        command: &'static str,
        err: Box<ValidationError>,
    ) -> Box<ValidationError> {
        tracing::debug!(
            command_buffer = self.id.get(),
            command,
            error = %err,
            "rejected command"
        );

        err
    }

    #[inline]
    pub(super) fn fns(&self) -> &DeviceFunctions {
        self.pool.device().fns()
    }

    /// Calls a `vkCmd*` entrypoint, holding the pool lock if the pool is thread-safe.
    #[inline]
    pub(super) unsafe fn emit(&self, f: impl FnOnce(&DeviceFunctions, vk::CommandBuffer)) {
        let _guard = self.pool.lock_for_recording();
        f(self.fns(), self.handle);
    }

    fn is_stashing(&self) -> bool {
        self.pool.stashes_commands() && !is_command_stashing_disabled()
    }

    /// Logs an emitted command and stashes it. `command` is only called if stashing is enabled.
    pub(super) fn record(&mut self, name: &'static str, command: impl FnOnce() -> Command) {
        tracing::trace!(command_buffer = self.id.get(), command = name, "recorded command");

        if self.is_stashing() {
            self.stash.push(command());
        }
    }

    /// Like [`record`](Self::record), and also delivers the command to the subscribers of
    /// `event`.
    pub(super) fn record_and_publish(
        &mut self,
        name: &'static str,
        event: CommandBufferCallbackId,
        command: impl FnOnce() -> Command,
    ) {
        tracing::trace!(command_buffer = self.id.get(), command = name, "recorded command");

        let stash = self.is_stashing();
        let publish = self.callbacks.has_subscribers(event.slot());

        if publish {
            let argument = CommandBufferCallbackArgument {
                command_buffer: self.handle,
                command: command(),
            };

            if let Err(err) = self.callbacks.deliver(event.slot(), &argument) {
                tracing::debug!(
                    command_buffer = self.id.get(),
                    ?event,
                    error = %err,
                    "failed to deliver callback"
                );
            }

            if stash {
                self.stash.push(argument.command);
            }
        } else if stash {
            self.stash.push(command());
        }
    }
}

impl Drop for CommandBuffer {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.pool.free_command_buffers(&[self.handle]) };
        object_tracker::unregister(ObjectType::CommandBuffer, self.id);
    }
}

impl Debug for CommandBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("CommandBuffer")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("level", &self.level)
            .field("state", &self.state())
            .field("debug_name", &self.debug_name)
            .finish_non_exhaustive()
    }
}

unsafe impl VulkanObject for CommandBuffer {
    type Handle = vk::CommandBuffer;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

unsafe impl DeviceOwned for CommandBuffer {
    #[inline]
    fn device(&self) -> &Arc<Device> {
        self.pool.device()
    }
}

impl_id_counter!(CommandBuffer);

impl CommandBufferBeginInfo {
    pub(crate) fn validate(
        &self,
        device: &Device,
        level: CommandBufferLevel,
    ) -> Result<(), Box<ValidationError>> {
        let &Self {
            usage: _,
            ref inheritance_info,
            device_mask,
            _ne: _,
        } = self;

        match (level, inheritance_info) {
            (CommandBufferLevel::Secondary, None) => {
                return Err(Box::new(ValidationError {
                    context: "inheritance_info".into(),
                    problem: "is `None`, but the command buffer is a secondary command buffer"
                        .into(),
                    vuids: &["VUID-vkBeginCommandBuffer-commandBuffer-00051"],
                    ..Default::default()
                }));
            }
            (CommandBufferLevel::Primary, Some(_)) => {
                return Err(Box::new(ValidationError {
                    context: "inheritance_info".into(),
                    problem: "is `Some`, but the command buffer is a primary command buffer"
                        .into(),
                    ..Default::default()
                }));
            }
            (_, Some(inheritance_info)) => {
                if let Some(render_pass) = &inheritance_info.render_pass {
                    if render_pass.render_pass == vk::RenderPass::null() {
                        return Err(Box::new(ValidationError {
                            context: "inheritance_info.render_pass.render_pass".into(),
                            problem: "is a null handle".into(),
                            ..Default::default()
                        }));
                    }
                }
            }
            (_, None) => (),
        }

        if let Some(device_mask) = device_mask {
            if device_mask == 0 {
                return Err(Box::new(ValidationError {
                    context: "device_mask".into(),
                    problem: "is zero".into(),
                    vuids: &["VUID-VkDeviceGroupCommandBufferBeginInfo-deviceMask-00107"],
                    ..Default::default()
                }));
            }

            if device_mask & !device.all_physical_devices_mask() != 0 {
                return Err(Box::new(ValidationError {
                    context: "device_mask".into(),
                    problem: "contains bits for physical devices that are not part of the device"
                        .into(),
                    vuids: &["VUID-VkDeviceGroupCommandBufferBeginInfo-deviceMask-00106"],
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
            CommandBuffer, CommandBufferBeginInfo, CommandBufferInheritanceInfo,
            CommandBufferInheritanceRenderPassInfo, CommandBufferState, CommandBufferUsage,
            CommandPool, CommandPoolCreateInfo, RenderArea, RenderPassBeginInfo,
            SubpassContents,
        },
        object_tracker::{self, ObjectType},
        query::QueryControlFlags,
        tests::{fail_next, last_begin_info, last_debug_name, take_calls, was_called},
        Handle, Validated, VulkanError, Version,
    };
    use ash::vk;
    use serial_test::serial;

    #[test]
    fn start_and_stop() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        assert!(object_tracker::is_registered(ObjectType::CommandBuffer, cb.id()));
        assert_eq!(cb.state(), CommandBufferState::Idle);
        assert!(cb.stop_recording().is_err());

        cb.start_recording(CommandBufferBeginInfo {
            usage: CommandBufferUsage::OneTimeSubmit,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cb.state(), CommandBufferState::RecordingOutsideRenderPass);
        assert!(cb.start_recording(Default::default()).is_err());

        let begin_info = last_begin_info().unwrap();
        assert_eq!(begin_info.flags, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        assert_eq!(begin_info.device_mask, None);
        assert!(!begin_info.has_inheritance);

        cb.stop_recording().unwrap();
        assert_eq!(cb.state(), CommandBufferState::Idle);
        assert!(cb.is_executable());

        // A finished command buffer can be recorded again straight away.
        cb.start_recording(Default::default()).unwrap();
        assert_eq!(cb.state(), CommandBufferState::RecordingOutsideRenderPass);
        assert!(!cb.is_executable());
        cb.stop_recording().unwrap();

        let id = cb.id();
        drop(cb);
        assert!(!object_tracker::is_registered(ObjectType::CommandBuffer, id));
        assert!(was_called("vkFreeCommandBuffers"));
    }

    #[test]
    fn restart_after_reset() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        cb.stop_recording().unwrap();
        cb.start_recording(Default::default()).unwrap();

        unsafe { cb.reset(true) }.unwrap();
        assert_eq!(cb.state(), CommandBufferState::Idle);
        assert!(!cb.is_executable());
        assert!(take_calls().contains(&"vkResetCommandBuffer"));
    }

    #[test]
    #[serial]
    fn reset_from_every_state() {
        let device = mock_device!(extensions: [ext_debug_marker]);
        let pool = CommandPool::new(
            device,
            CommandPoolCreateInfo {
                stash_commands: true,
                ..Default::default()
            },
        )
        .unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        let query_pool = vk::QueryPool::from_raw(40);
        let render_pass_begin_info = RenderPassBeginInfo {
            render_area: RenderArea::Single(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: 8,
                    height: 8,
                },
            }),
            ..RenderPassBeginInfo::new(vk::RenderPass::from_raw(1), vk::Framebuffer::from_raw(2))
        };

        let assert_reset = |cb: &mut CommandBuffer| {
            unsafe { cb.reset(false) }.unwrap();
            assert_eq!(cb.state(), CommandBufferState::Idle);
            assert!(!cb.is_executable());
            assert!(cb.stashed_commands().is_empty());

            cb.start_recording(Default::default()).unwrap();
            cb.dispatch([1, 1, 1]).unwrap();
            assert_eq!(cb.stashed_commands().len(), 1);
            cb.stop_recording().unwrap();
            assert!(cb.is_executable());
        };

        // Recording outside a render pass, with an open query and marker region.
        cb.start_recording(Default::default()).unwrap();
        cb.begin_query(query_pool, 0, QueryControlFlags::empty())
            .unwrap();
        cb.debug_marker_begin("upload", [0.5; 4]).unwrap();
        assert!(!cb.stashed_commands().is_empty());
        assert_reset(&mut cb);

        // Recording inside a render pass.
        cb.start_recording(Default::default()).unwrap();
        cb.begin_render_pass(&render_pass_begin_info, SubpassContents::Inline)
            .unwrap();
        cb.begin_query(query_pool, 1, QueryControlFlags::empty())
            .unwrap();
        cb.draw(3, 1, 0, 0).unwrap();
        assert_eq!(cb.state(), CommandBufferState::RecordingInsideRenderPass);
        assert_reset(&mut cb);

        // Executable, after recording ended.
        assert_eq!(cb.state(), CommandBufferState::Idle);
        assert_reset(&mut cb);

        assert!(was_called("vkResetCommandBuffer"));
    }

    #[test]
    fn begin_failure_keeps_idle() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        fail_next("vkBeginCommandBuffer");
        match cb.start_recording(Default::default()) {
            Err(Validated::Error(VulkanError::OutOfHostMemory)) => (),
            _ => panic!(),
        }
        assert_eq!(cb.state(), CommandBufferState::Idle);
    }

    #[test]
    fn secondary_inheritance() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut secondary = pool.allocate_secondary().unwrap();

        // Secondary command buffers need inheritance info.
        assert!(secondary.start_recording(Default::default()).is_err());

        secondary
            .start_recording(CommandBufferBeginInfo {
                inheritance_info: Some(CommandBufferInheritanceInfo {
                    render_pass: Some(CommandBufferInheritanceRenderPassInfo::new(
                        vk::RenderPass::from_raw(5),
                    )),
                    occlusion_query: Some(QueryControlFlags::empty()),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            secondary.state(),
            CommandBufferState::RecordingInsideRenderPass,
        );
        assert!(secondary.is_render_pass_continuation());

        let begin_info = last_begin_info().unwrap();
        assert!(begin_info
            .flags
            .contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE));
        assert!(begin_info.has_inheritance);

        // Draws are allowed right away, and recording can end inside the render pass.
        assert!(secondary.draw(3, 1, 0, 0).is_ok());
        assert!(secondary.stop_recording().is_ok());
    }

    #[test]
    fn primary_rejects_inheritance() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        let result = cb.start_recording(CommandBufferBeginInfo {
            inheritance_info: Some(Default::default()),
            ..Default::default()
        });
        match result {
            Err(Validated::ValidationError(err)) => {
                assert_eq!(err.context, "begin_info.inheritance_info");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn device_mask_on_device_group() {
        let device = mock_device!(api_version: Version::V1_1, physical_device_count: 3);
        let pool = CommandPool::new(device.clone(), CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.start_recording(Default::default()).unwrap();
        assert_eq!(last_begin_info().unwrap().device_mask, Some(0b111));
        assert_eq!(cb.device_mask(), 0b111);
        cb.stop_recording().unwrap();

        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        assert!(cb
            .start_recording(CommandBufferBeginInfo {
                device_mask: Some(0b1000),
                ..Default::default()
            })
            .is_err());
        assert!(cb
            .start_recording(CommandBufferBeginInfo {
                device_mask: Some(0),
                ..Default::default()
            })
            .is_err());

        cb.start_recording(CommandBufferBeginInfo {
            device_mask: Some(0b101),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(last_begin_info().unwrap().device_mask, Some(0b101));
        assert_eq!(cb.device_mask(), 0b101);
    }

    #[test]
    fn single_device_mask() {
        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        assert!(cb
            .start_recording(CommandBufferBeginInfo {
                device_mask: Some(0b10),
                ..Default::default()
            })
            .is_err());

        cb.start_recording(CommandBufferBeginInfo {
            device_mask: Some(1),
            ..Default::default()
        })
        .unwrap();
        // No device group structure is chained on a single device.
        assert_eq!(last_begin_info().unwrap().device_mask, None);
        assert_eq!(cb.device_mask(), 1);
    }

    #[test]
    fn stop_with_open_regions() {
        let device = mock_device!(extensions: [ext_debug_marker]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        let query_pool = vk::QueryPool::from_raw(30);

        cb.start_recording(Default::default()).unwrap();
        cb.begin_query(query_pool, 0, QueryControlFlags::empty())
            .unwrap();
        assert!(cb.stop_recording().is_err());
        cb.end_query(query_pool, 0).unwrap();

        cb.debug_marker_begin("frame", [1.0; 4]).unwrap();
        assert!(cb.stop_recording().is_err());
        cb.debug_marker_end().unwrap();

        assert!(cb.stop_recording().is_ok());
    }

    #[test]
    fn debug_name() {
        let device = mock_device!(extensions: [ext_debug_marker]);
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();

        cb.set_debug_name("main pass").unwrap();
        assert_eq!(cb.debug_name(), Some("main pass"));
        assert_eq!(last_debug_name().as_deref(), Some("main pass"));
        assert!(cb.set_debug_name("bad\0name").is_err());

        let device = mock_device!();
        let pool = CommandPool::new(device, CommandPoolCreateInfo::default()).unwrap();
        let mut cb = pool.allocate_primary().unwrap();
        take_calls();

        cb.set_debug_name("unnamed").unwrap();
        assert_eq!(cb.debug_name(), Some("unnamed"));
        assert!(take_calls().is_empty());
    }
}
