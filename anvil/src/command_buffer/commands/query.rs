use crate::{
    command_buffer::{
        sys::{CommandBuffer, RecordingScope},
        Command,
    },
    device::DeviceOwned,
    query::{QueryControlFlags, QueryResultFlags},
    sync::{validate_stages, PipelineStages},
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError,
};
use ash::vk;

/// # Commands related to queries.
impl CommandBuffer {
    /// Begins a query.
    ///
    /// The query must not already be active in this command buffer. It stays active until
    /// [`end_query`](Self::end_query) is recorded, and recording cannot stop while it is.
    pub fn begin_query(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_begin_query(query_pool, query)
            .map_err(|err| self.rejected("begin_query", err))?;

        Ok(unsafe { self.begin_query_unchecked(query_pool, query, flags) })
    }

    fn validate_begin_query(
        &self,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;
        validate_query_pool(query_pool)?;

        if self.active_queries.contains(&(query_pool, query)) {
            return Err(Box::new(ValidationError {
                problem: "the query is already active".into(),
                vuids: &["VUID-vkCmdBeginQuery-None-01922"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn begin_query_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_begin_query)(command_buffer, query_pool, query, flags.into())
        });
        self.active_queries.insert((query_pool, query));
        self.record("begin_query", || Command::BeginQuery {
            query_pool,
            query,
            flags,
        });

        self
    }

    /// Ends an active query.
    pub fn end_query(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_end_query(query_pool, query)
            .map_err(|err| self.rejected("end_query", err))?;

        Ok(unsafe { self.end_query_unchecked(query_pool, query) })
    }

    fn validate_end_query(
        &self,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;
        validate_query_pool(query_pool)?;

        if !self.active_queries.contains(&(query_pool, query)) {
            return Err(Box::new(ValidationError {
                problem: "the query is not active".into(),
                vuids: &["VUID-vkCmdEndQuery-None-01923"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn end_query_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_end_query)(command_buffer, query_pool, query)
        });
        self.active_queries.remove(&(query_pool, query));
        self.record("end_query", || Command::EndQuery { query_pool, query });

        self
    }

    /// Begins an indexed query, such as a transform feedback stream query.
    pub fn begin_query_indexed(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
        index: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_transform_feedback_query()
            .and_then(|()| self.validate_begin_query(query_pool, query))
            .map_err(|err| self.rejected("begin_query_indexed", err))?;

        Ok(unsafe { self.begin_query_indexed_unchecked(query_pool, query, flags, index) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn begin_query_indexed_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        flags: QueryControlFlags,
        index: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_begin_query_indexed_ext)(
                command_buffer,
                query_pool,
                query,
                flags.into(),
                index,
            )
        });
        self.active_queries.insert((query_pool, query));
        self.record("begin_query_indexed", || Command::BeginQueryIndexed {
            query_pool,
            query,
            flags,
            index,
        });

        self
    }

    /// Ends an active indexed query.
    pub fn end_query_indexed(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        index: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_transform_feedback_query()
            .and_then(|()| self.validate_end_query(query_pool, query))
            .map_err(|err| self.rejected("end_query_indexed", err))?;

        Ok(unsafe { self.end_query_indexed_unchecked(query_pool, query, index) })
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn end_query_indexed_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        query: u32,
        index: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.ext_transform_feedback.cmd_end_query_indexed_ext)(
                command_buffer,
                query_pool,
                query,
                index,
            )
        });
        self.active_queries.remove(&(query_pool, query));
        self.record("end_query_indexed", || Command::EndQueryIndexed {
            query_pool,
            query,
            index,
        });

        self
    }

    fn validate_transform_feedback_query(&self) -> Result<(), Box<ValidationError>> {
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

    /// Writes a timestamp to a query once `stage` of the preceding commands has completed.
    pub fn write_timestamp(
        &mut self,
        stage: PipelineStages,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_write_timestamp(stage, query_pool)
            .map_err(|err| self.rejected("write_timestamp", err))?;

        Ok(unsafe { self.write_timestamp_unchecked(stage, query_pool, query) })
    }

    fn validate_write_timestamp(
        &self,
        stage: PipelineStages,
        query_pool: vk::QueryPool,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::Anywhere)?;
        validate_query_pool(query_pool)?;

        if stage.count() != 1 {
            return Err(Box::new(ValidationError {
                context: "stage".into(),
                problem: "does not contain exactly one pipeline stage".into(),
                vuids: &["VUID-vkCmdWriteTimestamp-pipelineStage-parameter"],
                ..Default::default()
            }));
        }

        validate_stages(self.device(), stage).map_err(|err| err.add_context("stage"))?;

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn write_timestamp_unchecked(
        &mut self,
        stage: PipelineStages,
        query_pool: vk::QueryPool,
        query: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_write_timestamp)(command_buffer, stage.into(), query_pool, query)
        });
        self.record("write_timestamp", || Command::WriteTimestamp {
            stage,
            query_pool,
            query,
        });

        self
    }

    /// Resets a range of queries of a query pool.
    pub fn reset_query_pool(
        &mut self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_reset_query_pool(query_pool, first_query, query_count)
            .map_err(|err| self.rejected("reset_query_pool", err))?;

        Ok(unsafe { self.reset_query_pool_unchecked(query_pool, first_query, query_count) })
    }

    fn validate_reset_query_pool(
        &self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_query_pool(query_pool)?;

        if query_count == 0 {
            return Err(Box::new(ValidationError {
                context: "query_count".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        let queries = first_query..first_query.saturating_add(query_count);

        if self
            .active_queries
            .iter()
            .any(|&(pool, query)| pool == query_pool && queries.contains(&query))
        {
            return Err(Box::new(ValidationError {
                problem: "one of the queries to reset is active".into(),
                vuids: &["VUID-vkCmdResetQueryPool-None-02841"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn reset_query_pool_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_reset_query_pool)(command_buffer, query_pool, first_query, query_count)
        });
        self.record("reset_query_pool", || Command::ResetQueryPool {
            query_pool,
            first_query,
            query_count,
        });

        self
    }

    /// Copies the results of a range of queries to a buffer.
    ///
    /// `dst_offset` and `stride` must be multiples of the size of one result, which is 8 bytes
    /// with [`QueryResultFlags::WITH_64_BIT`] and 4 bytes otherwise.
    pub fn copy_query_pool_results(
        &mut self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
        flags: QueryResultFlags,
    ) -> Result<&mut Self, Box<ValidationError>> {
        self.validate_copy_query_pool_results(
            query_pool,
            query_count,
            dst_buffer,
            dst_offset,
            stride,
            flags,
        )
        .map_err(|err| self.rejected("copy_query_pool_results", err))?;

        Ok(unsafe {
            self.copy_query_pool_results_unchecked(
                query_pool,
                first_query,
                query_count,
                dst_buffer,
                dst_offset,
                stride,
                flags,
            )
        })
    }

    fn validate_copy_query_pool_results(
        &self,
        query_pool: vk::QueryPool,
        query_count: u32,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
        flags: QueryResultFlags,
    ) -> Result<(), Box<ValidationError>> {
        self.validate_recording(RecordingScope::OutsideRenderPass)?;
        validate_query_pool(query_pool)?;

        if query_count == 0 {
            return Err(Box::new(ValidationError {
                context: "query_count".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        if dst_buffer == vk::Buffer::null() {
            return Err(Box::new(ValidationError {
                context: "dst_buffer".into(),
                problem: "is a null handle".into(),
                ..Default::default()
            }));
        }

        let result_size = flags.result_size();

        if dst_offset % result_size != 0 {
            return Err(Box::new(ValidationError {
                context: "dst_offset".into(),
                problem: "is not a multiple of the size of one result".into(),
                vuids: &["VUID-vkCmdCopyQueryPoolResults-flags-00822"],
                ..Default::default()
            }));
        }

        if stride % result_size != 0 {
            return Err(Box::new(ValidationError {
                context: "stride".into(),
                problem: "is not a multiple of the size of one result".into(),
                vuids: &["VUID-vkCmdCopyQueryPoolResults-flags-00823"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn copy_query_pool_results_unchecked(
        &mut self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
        flags: QueryResultFlags,
    ) -> &mut Self {
        self.emit(|fns, command_buffer| {
            (fns.v1_0.cmd_copy_query_pool_results)(
                command_buffer,
                query_pool,
                first_query,
                query_count,
                dst_buffer,
                dst_offset,
                stride,
                flags.into(),
            )
        });
        self.record("copy_query_pool_results", || Command::CopyQueryPoolResults {
            query_pool,
            first_query,
            query_count,
            dst_buffer,
            dst_offset,
            stride,
            flags,
        });

        self
    }
}

fn validate_query_pool(query_pool: vk::QueryPool) -> Result<(), Box<ValidationError>> {
    if query_pool == vk::QueryPool::null() {
        return Err(Box::new(ValidationError {
            context: "query_pool".into(),
            problem: "is a null handle".into(),
            ..Default::default()
        }));
    }

    Ok(())
}
