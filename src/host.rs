//! Host identification.
//!
//! Derives the `{os}-{arch}` key used to pick which bundled native artifact
//! applies to the running process. Only two OS families (`linux`, `windows`)
//! and two architecture buckets (`x86`, `x64`) are recognized.

use crate::loader::LoaderError;
use once_cell::sync::OnceCell;
use std::fmt;

static CURRENT: OnceCell<HostKey> = OnceCell::new();

/// Operating system family of a host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    Windows,
}

impl HostOs {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

/// Architecture bucket of a host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostArch {
    X86,
    X64,
}

impl HostArch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
        }
    }
}

/// Stable identifier of an OS/architecture combination, e.g. `linux-x64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostKey {
    os: HostOs,
    arch: HostArch,
}

impl HostKey {
    pub const fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    /// Build a key from raw OS name and architecture strings.
    ///
    /// Accepts the names reported by `std::env::consts` as well as the common
    /// aliases (`Windows 10`, `i686`, `amd64`, `universal`, ...).
    pub fn from_platform(os_name: &str, arch_name: &str) -> Result<Self, LoaderError> {
        let unsupported = || LoaderError::UnsupportedHost {
            os: os_name.to_string(),
            arch: arch_name.to_string(),
        };

        let lower = os_name.to_ascii_lowercase();
        let os = if lower == "linux" {
            HostOs::Linux
        } else if lower.starts_with("win") {
            HostOs::Windows
        } else {
            return Err(unsupported());
        };

        let arch = match arch_name.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i586" | "i686" => HostArch::X86,
            // Universal (fat) binaries report this name; they run the 64-bit slice.
            "x86_64" | "amd64" | "x64" | "universal" => HostArch::X64,
            _ => return Err(unsupported()),
        };

        Ok(Self { os, arch })
    }

    /// Resolve the key of the running process.
    ///
    /// The first successful resolution is cached for the process lifetime.
    pub fn resolve() -> Result<Self, LoaderError> {
        CURRENT
            .get_or_try_init(|| Self::from_platform(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    pub fn os(&self) -> HostOs {
        self.os
    }

    pub fn arch(&self) -> HostArch {
        self.arch
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}
