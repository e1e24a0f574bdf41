//! Flags for query commands.
//!
//! Query pools are opaque to this crate; commands take raw `VkQueryPool` handles.

use crate::macros::vulkan_bitflags;

vulkan_bitflags! {
    /// Flags that control how a query is executed.
    QueryControlFlags = QueryControlFlags(u32);

    /// For occlusion queries, specifies that the result must reflect the exact number of
    /// tests passed. If not enabled, the query may return a result of 1 even if more fragments
    /// passed the test.
    PRECISE = PRECISE,
}

vulkan_bitflags! {
    /// Flags to control how query results are copied.
    QueryResultFlags = QueryResultFlags(u32);

    /// Store the results as 64-bit values instead of 32-bit.
    WITH_64_BIT = TYPE_64,

    /// Wait for the results to become available before writing them.
    WAIT = WAIT,

    /// Write an additional value after each result, indicating whether the result is available.
    WITH_AVAILABILITY = WITH_AVAILABILITY,

    /// Allow writing partial results.
    PARTIAL = PARTIAL,
}

impl QueryResultFlags {
    /// Returns the size in bytes of one result value written with these flags.
    #[inline]
    pub fn result_size(self) -> u64 {
        if self.intersects(QueryResultFlags::WITH_64_BIT) {
            8
        } else {
            4
        }
    }
}
