pub(super) mod bind_push;
pub(super) mod clear;
pub(super) mod debug;
pub(super) mod dynamic_state;
pub(super) mod pipeline;
pub(super) mod query;
pub(super) mod render_pass;
pub(super) mod secondary;
pub(super) mod sync;
pub(super) mod transfer;
pub(super) mod transform_feedback;
