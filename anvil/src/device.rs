//! Communication channel with a physical device or a device group.
//!
//! The `Device` is the object every other object in this crate hangs off. It carries the raw
//! `VkDevice` handle, the function tables that commands are emitted through, the set of enabled
//! device extensions, and the number of physical devices that make up the logical device.
//!
//! The crate does not create devices itself. A device created through another loader is wrapped
//! with [`Device::from_handle`]:
//!
//! ```no_run
//! use anvil::device::{Device, DeviceCreateInfo, DeviceExtensions};
//! use anvil::Version;
//! # let (instance, raw_device): (ash::Instance, ash::vk::Device) = unimplemented!();
//!
//! let device = unsafe {
//!     Device::from_handle(
//!         raw_device,
//!         DeviceCreateInfo {
//!             api_version: Version::V1_1,
//!             enabled_extensions: DeviceExtensions {
//!                 ext_debug_marker: true,
//!                 ..DeviceExtensions::empty()
//!             },
//!             ..Default::default()
//!         },
//!         |name| {
//!             instance
//!                 .get_device_proc_addr(raw_device, name.as_ptr())
//!                 .map_or(std::ptr::null(), |f| f as *const std::ffi::c_void)
//!         },
//!     )
//! }
//! .unwrap();
//! ```

use crate::{
    fns::DeviceFunctions, macros::impl_id_counter, Requires, RequiresAllOf, RequiresOneOf,
    ValidationError, Version, VulkanObject,
};
use std::{
    ffi::{c_void, CStr},
    fmt::{Debug, Error as FmtError, Formatter},
    num::NonZeroU64,
    ops::Deref,
    sync::Arc,
};

/// Represents a Vulkan context.
pub struct Device {
    handle: ash::vk::Device,
    id: NonZeroU64,

    fns: DeviceFunctions,
    api_version: Version,
    enabled_extensions: DeviceExtensions,
    physical_device_count: u32,
}

impl Device {
    /// Wraps an existing `VkDevice`.
    ///
    /// `load_fn` is used to resolve every entrypoint the crate calls. It should forward to
    /// `vkGetDeviceProcAddr` for `handle`.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid Vulkan device handle, and must stay valid for as long as the
    ///   returned object or any object created from it is alive.
    /// - `create_info` must match the parameters the device was created with.
    /// - The pointers returned by `load_fn` must be the entrypoints of `handle`, or null.
    pub unsafe fn from_handle(
        handle: ash::vk::Device,
        create_info: DeviceCreateInfo,
        load_fn: impl FnMut(&CStr) -> *const c_void,
    ) -> Result<Arc<Device>, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        Ok(Self::from_handle_unchecked(handle, create_info, load_fn))
    }

    #[cfg_attr(not(feature = "document_unchecked"), doc(hidden))]
    pub unsafe fn from_handle_unchecked(
        handle: ash::vk::Device,
        create_info: DeviceCreateInfo,
        load_fn: impl FnMut(&CStr) -> *const c_void,
    ) -> Arc<Device> {
        let DeviceCreateInfo {
            api_version,
            enabled_extensions,
            physical_device_count,
            _ne: _,
        } = create_info;

        let device = Device {
            handle,
            id: Self::next_id(),
            fns: DeviceFunctions::load(load_fn),
            api_version,
            enabled_extensions,
            physical_device_count,
        };

        tracing::debug!(
            id = device.id.get(),
            %api_version,
            physical_device_count,
            "wrapped device"
        );

        Arc::new(device)
    }

    /// Returns the Vulkan version supported by the device.
    #[inline]
    pub fn api_version(&self) -> Version {
        self.api_version
    }

    /// Grants access to the Vulkan functions of the device.
    #[inline]
    pub fn fns(&self) -> &DeviceFunctions {
        &self.fns
    }

    /// Returns the extensions that have been enabled on the device.
    #[inline]
    pub fn enabled_extensions(&self) -> &DeviceExtensions {
        &self.enabled_extensions
    }

    /// Returns the number of physical devices in the device group of this device. This is `1`
    /// for a device that is not created from a device group.
    #[inline]
    pub fn physical_device_count(&self) -> u32 {
        self.physical_device_count
    }

    /// Returns whether the device spans more than one physical device.
    #[inline]
    pub fn is_multi_device(&self) -> bool {
        self.physical_device_count > 1
    }

    /// Returns a device mask with a bit set for every physical device of the device group.
    #[inline]
    pub fn all_physical_devices_mask(&self) -> u32 {
        if self.physical_device_count >= 32 {
            u32::MAX
        } else {
            (1 << self.physical_device_count) - 1
        }
    }
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let Self {
            handle,
            id,
            fns: _,
            api_version,
            enabled_extensions,
            physical_device_count,
        } = self;

        f.debug_struct("Device")
            .field("handle", handle)
            .field("id", id)
            .field("api_version", api_version)
            .field("enabled_extensions", enabled_extensions)
            .field("physical_device_count", physical_device_count)
            .finish_non_exhaustive()
    }
}

unsafe impl VulkanObject for Device {
    type Handle = ash::vk::Device;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

impl_id_counter!(Device);

/// Parameters describing how a wrapped device was created.
#[derive(Clone, Debug)]
pub struct DeviceCreateInfo {
    /// The Vulkan API version the device was created for.
    ///
    /// The default value is [`Version::V1_0`].
    pub api_version: Version,

    /// The extensions that were enabled on the device.
    ///
    /// The default value is [`DeviceExtensions::empty()`].
    pub enabled_extensions: DeviceExtensions,

    /// The number of physical devices of the device group the device was created from.
    ///
    /// The default value is `1`.
    pub physical_device_count: u32,

    pub _ne: crate::NonExhaustive,
}

impl Default for DeviceCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            api_version: Version::V1_0,
            enabled_extensions: DeviceExtensions::empty(),
            physical_device_count: 1,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DeviceCreateInfo {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            api_version,
            ref enabled_extensions,
            physical_device_count,
            _ne: _,
        } = self;

        if api_version < Version::V1_0 {
            return Err(Box::new(ValidationError {
                context: "api_version".into(),
                problem: "is lower than 1.0".into(),
                ..Default::default()
            }));
        }

        if physical_device_count == 0 {
            return Err(Box::new(ValidationError {
                context: "physical_device_count".into(),
                problem: "is zero".into(),
                ..Default::default()
            }));
        }

        if physical_device_count > ash::vk::MAX_DEVICE_GROUP_SIZE as u32 {
            return Err(Box::new(ValidationError {
                context: "physical_device_count".into(),
                problem: "is greater than `VK_MAX_DEVICE_GROUP_SIZE`".into(),
                ..Default::default()
            }));
        }

        if physical_device_count > 1
            && !(api_version >= Version::V1_1 || enabled_extensions.khr_device_group)
        {
            return Err(Box::new(ValidationError {
                context: "physical_device_count".into(),
                problem: "is greater than 1".into(),
                requires_one_of: RequiresOneOf(&[
                    RequiresAllOf(&[Requires::APIVersion(Version::V1_1)]),
                    RequiresAllOf(&[Requires::DeviceExtension("khr_device_group")]),
                ]),
                ..Default::default()
            }));
        }

        Ok(())
    }
}

macro_rules! device_extensions {
    ($($member:ident => $raw:literal,)+) => {
        /// List of device extensions that the crate knows about.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct DeviceExtensions {
            $(
                #[doc = concat!("`", $raw, "`")]
                pub $member: bool,
            )+
            pub _ne: crate::NonExhaustive,
        }

        impl Default for DeviceExtensions {
            #[inline]
            fn default() -> Self {
                Self::empty()
            }
        }

        impl DeviceExtensions {
            /// Returns a `DeviceExtensions` with none of the members set.
            #[inline]
            pub const fn empty() -> Self {
                Self {
                    $($member: false,)+
                    _ne: crate::NonExhaustive(()),
                }
            }

            /// Returns whether any members are set.
            #[inline]
            pub const fn is_empty(&self) -> bool {
                !(false $(|| self.$member)+)
            }

            /// Returns whether all members in `other` are set in `self`.
            #[inline]
            pub const fn contains(&self, other: &Self) -> bool {
                true $(&& (self.$member || !other.$member))+
            }

            /// Returns the union of `self` and `other`.
            #[inline]
            pub const fn union(&self, other: &Self) -> Self {
                Self {
                    $($member: self.$member || other.$member,)+
                    _ne: crate::NonExhaustive(()),
                }
            }

            /// Returns the Vulkan names of the extensions that are set.
            pub fn names(&self) -> impl Iterator<Item = &'static str> {
                [$((self.$member, $raw),)+]
                    .into_iter()
                    .filter_map(|(enabled, name)| enabled.then_some(name))
            }
        }
    };
}

device_extensions! {
    amd_buffer_marker => "VK_AMD_buffer_marker",
    ext_debug_marker => "VK_EXT_debug_marker",
    ext_sample_locations => "VK_EXT_sample_locations",
    ext_transform_feedback => "VK_EXT_transform_feedback",
    khr_create_renderpass2 => "VK_KHR_create_renderpass2",
    khr_device_group => "VK_KHR_device_group",
    khr_draw_indirect_count => "VK_KHR_draw_indirect_count",
}

/// Implemented on objects that belong to a Vulkan device.
///
/// # Safety
///
/// - `device()` must return the correct device.
pub unsafe trait DeviceOwned {
    /// Returns the device that owns `self`.
    fn device(&self) -> &Arc<Device>;
}

unsafe impl<T> DeviceOwned for T
where
    T: Deref,
    T::Target: DeviceOwned,
{
    #[inline]
    fn device(&self) -> &Arc<Device> {
        (**self).device()
    }
}
