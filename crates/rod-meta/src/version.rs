use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetaError;

/// Library version tag, `major.minor.patch`.
///
/// Even minor numbers mark stable lines, odd minor numbers development
/// lines. Stored as a string in the metadata document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a library at `running` may open data written at `self`.
    ///
    /// - identical versions are compatible;
    /// - a running library older than the data never is;
    /// - on a stable line (even minor) any later patch reads older patches;
    /// - on a development line (odd minor) only the exact patch does;
    /// - a different major or minor is incompatible.
    pub fn accepts(&self, running: &Version) -> bool {
        if self == running {
            return true;
        }
        if running < self {
            return false;
        }
        if self.major != running.major || self.minor != running.minor {
            return false;
        }
        self.minor % 2 == 0 && running.patch >= self.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(MetaError::InvalidVersion(s.to_string()));
        };
        let number = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| MetaError::InvalidVersion(s.to_string()))
        };
        Ok(Self::new(number(major)?, number(minor)?, number(patch)?))
    }
}

impl TryFrom<String> for Version {
    type Error = MetaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn equal_versions_are_valid() {
        assert!(v("0.1.1").accepts(&v("0.1.1")));
        assert!(v("1.3.0").accepts(&v("1.3.0")));
    }

    #[test]
    fn stable_line_accepts_later_patches() {
        assert!(v("0.2.0").accepts(&v("0.2.1")));
        assert!(v("0.2.3").accepts(&v("0.2.9")));
    }

    #[test]
    fn development_line_requires_exact_patch() {
        assert!(!v("0.1.0").accepts(&v("0.1.1")));
    }

    #[test]
    fn older_library_is_rejected() {
        assert!(!v("0.1.1").accepts(&v("0.1.0")));
        assert!(!v("0.2.4").accepts(&v("0.2.3")));
        assert!(!v("1.0.0").accepts(&v("0.9.9")));
    }

    #[test]
    fn different_minor_or_major_is_rejected() {
        assert!(!v("0.2.0").accepts(&v("0.4.0")));
        assert!(!v("0.2.0").accepts(&v("1.2.0")));
    }

    #[test]
    fn parsing() {
        assert_eq!(v("1.22.333"), Version::new(1, 22, 333));
        assert_eq!(Version::new(0, 2, 1).to_string(), "0.2.1");
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
    }
}
