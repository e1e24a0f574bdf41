use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Represents an API version of Vulkan.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
    /// Patch version number.
    pub patch: u32,
}

impl Version {
    pub const V1_0: Version = Version::major_minor(1, 0);
    pub const V1_1: Version = Version::major_minor(1, 1);
    pub const V1_2: Version = Version::major_minor(1, 2);
    pub const V1_3: Version = Version::major_minor(1, 3);

    /// Constructs a `Version` from the given major and minor version numbers.
    #[inline]
    pub const fn major_minor(major: u32, minor: u32) -> Version {
        Version {
            major,
            minor,
            patch: 0,
        }
    }
}

impl Default for Version {
    #[inline]
    fn default() -> Self {
        Self::V1_0
    }
}

impl From<u32> for Version {
    #[inline]
    fn from(val: u32) -> Self {
        Version {
            major: ash::vk::api_version_major(val),
            minor: ash::vk::api_version_minor(val),
            patch: ash::vk::api_version_patch(val),
        }
    }
}

impl TryFrom<Version> for u32 {
    type Error = ();

    #[inline]
    fn try_from(val: Version) -> Result<Self, Self::Error> {
        if val.major <= 0x7f && val.minor <= 0x3ff && val.patch <= 0xfff {
            Ok(ash::vk::make_api_version(0, val.major, val.minor, val.patch))
        } else {
            Err(())
        }
    }
}

impl Debug for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Version;

    #[test]
    fn into_vk_version() {
        let version = Version::major_minor(1, 0);
        assert_eq!(u32::try_from(version).unwrap(), 0x400000);
    }

    #[test]
    fn from_vk_version() {
        let version = Version::from(ash::vk::make_api_version(0, 1, 2, 170));
        assert_eq!(
            version,
            Version {
                major: 1,
                minor: 2,
                patch: 170,
            }
        );
    }

    #[test]
    fn out_of_range() {
        let version = Version {
            major: 0x80,
            minor: 0,
            patch: 0,
        };
        assert!(u32::try_from(version).is_err());
    }

    #[test]
    fn ordering() {
        assert!(Version::V1_2 > Version::V1_1);
        assert!(Version::major_minor(1, 3) > Version::major_minor(1, 0));
        assert!(
            Version {
                major: 1,
                minor: 0,
                patch: 5,
            } > Version {
                major: 1,
                minor: 0,
                patch: 4,
            }
        );
    }
}
