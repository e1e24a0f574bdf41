use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command, CommandBufferCallbackId,
    },
    device::DeviceOwned,
    sync::{validate_stages, DependencyInfo, PipelineStages},
    ValidationError,
};
use ash::vk;
use smallvec::SmallVec;

/// # Commands to synchronize resource accesses between commands.
impl CommandBuffer {
    /// Inserts a pipeline barrier.
    ///
    /// Subscribers of [`CommandBufferCallbackId::PipelineBarrierCommandRecorded`] are notified
    /// with a copy of `dependency_info`.
    pub fn pipeline_barrier(
        &mut self,
        dependency_info: &DependencyInfo,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_pipeline_barrier(dependency_info)
            .map_err(|err| self.rejected("pipeline_barrier", err))?;

        Ok(unsafe { self.pipeline_barrier_unchecked(dependency_info) })
    }

    fn validate_pipeline_barrier(
        &self,
        dependency_info: &DependencyInfo,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if dependency_info.is_empty() {
            return Err(Box::new(ValidationError {
                context: "dependency_info".into(),
                problem: "contains no barriers".into(),
                ..Default::default()
            }));
        }

        dependency_info
            .validate(self.device())
            .map_err(|err| err.add_context("dependency_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn pipeline_barrier_unchecked(
        &mut self,
        dependency_info: &DependencyInfo,
    ) -> &mut Self {
        let dependency_info_vk = dependency_info.to_vk();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_pipeline_barrier)(
                command_buffer,
                dependency_info_vk.src_stage_mask,
                dependency_info_vk.dst_stage_mask,
                dependency_info_vk.dependency_flags,
                dependency_info_vk.memory_barriers.len() as u32,
                dependency_info_vk.memory_barriers.as_ptr(),
                dependency_info_vk.buffer_memory_barriers.len() as u32,
                dependency_info_vk.buffer_memory_barriers.as_ptr(),
                dependency_info_vk.image_memory_barriers.len() as u32,
                dependency_info_vk.image_memory_barriers.as_ptr(),
            )
        });
        self.record_and_publish(
            "pipeline_barrier",
            CommandBufferCallbackId::PipelineBarrierCommandRecorded,
            || Command::PipelineBarrier {
                dependency_info: dependency_info.clone(),
            },
        );

        self
    }

    /// Waits for one or more events to be signaled, then applies the barriers of
    /// `dependency_info`.
    pub fn wait_events(
        &mut self,
        events: &[vk::Event],
        dependency_info: &DependencyInfo,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_wait_events(events, dependency_info)
            .map_err(|err| self.rejected("wait_events", err))?;

        Ok(unsafe { self.wait_events_unchecked(events, dependency_info) })
    }

    fn validate_wait_events(
        &self,
        events: &[vk::Event],
        dependency_info: &DependencyInfo,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;

        if events.is_empty() {
            return Err(Box::new(ValidationError {
                context: "events".into(),
                problem: "is empty".into(),
                vuids: &["VUID-vkCmdWaitEvents-eventCount-arraylength"],
                ..Default::default()
            }));
        }

        if let Some(index) = events.iter().position(|&event| event == vk::Event::null()) {
            return Err(Box::new(ValidationError {
                context: format!("events[{}]", index).into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        dependency_info
            .validate(self.device())
            .map_err(|err| err.add_context("dependency_info"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn wait_events_unchecked(
        &mut self,
        events: &[vk::Event],
        dependency_info: &DependencyInfo,
    ) -> &mut Self {
        let dependency_info_vk = dependency_info.to_vk();

        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_wait_events)(
                command_buffer,
                events.len() as u32,
                events.as_ptr(),
                dependency_info_vk.src_stage_mask,
                dependency_info_vk.dst_stage_mask,
                dependency_info_vk.memory_barriers.len() as u32,
                dependency_info_vk.memory_barriers.as_ptr(),
                dependency_info_vk.buffer_memory_barriers.len() as u32,
                dependency_info_vk.buffer_memory_barriers.as_ptr(),
                dependency_info_vk.image_memory_barriers.len() as u32,
                dependency_info_vk.image_memory_barriers.as_ptr(),
            )
        });
        self.record("wait_events", || Command::WaitEvents {
            events: events.iter().copied().collect::<SmallVec<_>>(),
            dependency_info: dependency_info.clone(),
        });

        self
    }

    /// Signals an event once the given stages of the preceding commands have completed.
    pub fn set_event(
        &mut self,
        event: vk::Event,
        stages: PipelineStages,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_event_command(event, stages)
            .map_err(|err| self.rejected("set_event", err))?;

        Ok(unsafe { self.set_event_unchecked(event, stages) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn set_event_unchecked(
        &mut self,
        event: vk::Event,
        stages: PipelineStages,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_set_event)(command_buffer, event, stages.into())
        });
        self.record("set_event", || Command::SetEvent { event, stages });

        self
    }

    /// Unsignals an event once the given stages of the preceding commands have completed.
    pub fn reset_event(
        &mut self,
        event: vk::Event,
        stages: PipelineStages,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_event_command(event, stages)
            .map_err(|err| self.rejected("reset_event", err))?;

        Ok(unsafe { self.reset_event_unchecked(event, stages) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn reset_event_unchecked(
        &mut self,
        event: vk::Event,
        stages: PipelineStages,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_reset_event)(command_buffer, event, stages.into())
        });
        self.record("reset_event", || Command::ResetEvent { event, stages });

        self
    }

    fn validate_event_command(
        &self,
        event: vk::Event,
        stages: PipelineStages,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;

        if event == vk::Event::null() {
            return Err(Box::new(ValidationError {
                context: "event".into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        if stages.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                ..Default::default()
            }));
        }

        if stages.intersects(PipelineStages::HOST) {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "contains `PipelineStages::HOST`".into(),
                vuids: &["VUID-vkCmdSetEvent-stageMask-01149"],
                ..Default::default()
            }));
        }

        validate_stages(self.device(), stages).map_err(|err| err.add_context("stages"))?;

        Ok(())
    }
}
