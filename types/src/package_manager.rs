use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package managers whose global module directory can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

#[derive(Debug, Error)]
#[error("unknown package manager: {0}")]
pub struct UnknownPackageManager(String);

impl PackageManager {
    pub const ALL: [PackageManager; 3] = [Self::Npm, Self::Yarn, Self::Pnpm];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    /// Executable name on the current host.
    ///
    /// Windows installs the managers as `.cmd` shims.
    #[must_use]
    pub fn executable(self) -> &'static str {
        if cfg!(windows) {
            match self {
                Self::Npm => "npm.cmd",
                Self::Yarn => "yarn.cmd",
                Self::Pnpm => "pnpm.cmd",
            }
        } else {
            self.as_str()
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = UnknownPackageManager;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "yarn" => Ok(Self::Yarn),
            "pnpm" => Ok(Self::Pnpm),
            _ => Err(UnknownPackageManager(s.to_string())),
        }
    }
}
