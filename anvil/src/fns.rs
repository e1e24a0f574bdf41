use std::{
    ffi::{c_void, CStr},
    fmt::{Debug, Error as FmtError, Formatter},
};

macro_rules! fns {
    ($struct_name:ident, { $($member:ident => $($fn_struct:ident)::+,)+ }) => {
        /// Raw Vulkan function pointers, one table per API version or extension.
        pub struct $struct_name {
            $(
                pub $member: $($fn_struct)::+,
            )+
        }

        impl $struct_name {
            /// Loads every table through `load_fn`.
            ///
            /// Entrypoints for which `load_fn` returns a null pointer are replaced with a stub
            /// that panics when called.
            pub fn load<F>(mut load_fn: F) -> $struct_name
            where
                F: FnMut(&CStr) -> *const c_void,
            {
                $struct_name {
                    $(
                        $member: $($fn_struct)::+::load(&mut load_fn),
                    )+
                }
            }
        }

        impl Debug for $struct_name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.debug_struct(stringify!($struct_name)).finish_non_exhaustive()
            }
        }
    };
}

fns!(DeviceFunctions, {
    v1_0 => ash::DeviceFnV1_0,
    v1_1 => ash::DeviceFnV1_1,
    v1_2 => ash::DeviceFnV1_2,
    amd_buffer_marker => ash::amd::buffer_marker::DeviceFn,
    ext_debug_marker => ash::ext::debug_marker::DeviceFn,
    ext_sample_locations => ash::ext::sample_locations::DeviceFn,
    ext_transform_feedback => ash::ext::transform_feedback::DeviceFn,
    khr_create_renderpass2 => ash::khr::create_renderpass2::DeviceFn,
    khr_device_group => ash::khr::device_group::DeviceFn,
    khr_draw_indirect_count => ash::khr::draw_indirect_count::DeviceFn,
});
