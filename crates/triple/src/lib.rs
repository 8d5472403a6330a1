use std::fmt::{Display, Formatter};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetTriple {
    pub architecture: Architecture,
    pub vendor: Vendor,
    pub operating_system: OperatingSystem,
}

impl TargetTriple {
    pub const fn new(
        architecture: Architecture,
        vendor: Vendor,
        operating_system: OperatingSystem,
    ) -> Self {
        Self {
            architecture,
            vendor,
            operating_system,
        }
    }

    pub fn parse(s: &str) -> Result<Self, InvalidTriple<'_>> {
        let mut triple = s.split('-');

        let arch = Architecture::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;
        let vendor = Vendor::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;
        let os = OperatingSystem::parse(triple.next().ok_or(InvalidTriple::InvalidFormat(s))?)?;

        if triple.next().is_some() {
            return Err(InvalidTriple::InvalidFormat(s));
        }

        let triple = Self::new(arch, vendor, os);
        // Reject pairs that no toolchain produces, e.g. `aarch64-pc-darwin`.
        match (vendor, os) {
            (Vendor::Apple, OperatingSystem::Darwin)
            | (Vendor::Pc, OperatingSystem::Windows)
            | (Vendor::Unknown, OperatingSystem::Linux | OperatingSystem::Windows) => Ok(triple),
            _ => Err(InvalidTriple::InvalidCombination),
        }
    }

    /// Returns the C calling convention used by default on the target.
    pub fn default_call_conv(&self) -> CallConv {
        match (self.architecture, self.operating_system) {
            (Architecture::X86_64, OperatingSystem::Windows) => CallConv::Win64,
            (Architecture::X86_64, _) => CallConv::SysV64,
            (Architecture::Aarch64, OperatingSystem::Darwin) => CallConv::AppleAarch64,
            (Architecture::Aarch64, _) => CallConv::Aapcs64,
        }
    }

    /// Returns the triple of the host the crate is compiled for, if it is one
    /// of the known targets.
    pub fn host() -> Option<Self> {
        let arch = if cfg!(target_arch = "x86_64") {
            Architecture::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Architecture::Aarch64
        } else {
            return None;
        };

        let (vendor, os) = if cfg!(target_os = "windows") {
            (Vendor::Pc, OperatingSystem::Windows)
        } else if cfg!(target_os = "macos") {
            (Vendor::Apple, OperatingSystem::Darwin)
        } else if cfg!(target_os = "linux") {
            (Vendor::Unknown, OperatingSystem::Linux)
        } else {
            return None;
        };

        Some(Self::new(arch, vendor, os))
    }
}

impl Display for TargetTriple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.architecture, self.vendor, self.operating_system
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86_64,
    Aarch64,
}

impl Architecture {
    fn parse(s: &str) -> Result<Self, InvalidTriple<'_>> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "aarch64" => Ok(Self::Aarch64),
            _ => Err(InvalidTriple::ArchitectureNotSupported),
        }
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Aarch64 => write!(f, "aarch64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Pc,
    Apple,
    Unknown,
}

impl Vendor {
    fn parse(s: &str) -> Result<Self, InvalidTriple<'_>> {
        match s {
            "pc" => Ok(Self::Pc),
            "apple" => Ok(Self::Apple),
            "unknown" => Ok(Self::Unknown),
            _ => Err(InvalidTriple::VendorNotSupported),
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pc => write!(f, "pc"),
            Self::Apple => write!(f, "apple"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    Windows,
    Linux,
    Darwin,
}

impl OperatingSystem {
    fn parse(s: &str) -> Result<Self, InvalidTriple<'_>> {
        match s {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "darwin" => Ok(Self::Darwin),
            _ => Err(InvalidTriple::OperatingSystemNotSupported),
        }
    }
}

impl Display for OperatingSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
        }
    }
}

/// C calling conventions a target may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// Microsoft x64 convention.
    Win64,
    /// System V AMD64 convention.
    SysV64,
    /// Procedure call standard for Arm 64-bit.
    Aapcs64,
    /// Apple's variant of AAPCS64.
    AppleAarch64,
}

impl CallConv {
    pub fn parse(s: &str) -> Result<Self, InvalidTriple<'_>> {
        match s {
            "win64" => Ok(Self::Win64),
            "sysv64" => Ok(Self::SysV64),
            "aapcs64" => Ok(Self::Aapcs64),
            "apple-aarch64" => Ok(Self::AppleAarch64),
            _ => Err(InvalidTriple::InvalidFormat(s)),
        }
    }
}

impl Display for CallConv {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win64 => write!(f, "win64"),
            Self::SysV64 => write!(f, "sysv64"),
            Self::Aapcs64 => write!(f, "aapcs64"),
            Self::AppleAarch64 => write!(f, "apple-aarch64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidTriple<'a> {
    #[error("the format of triple must be `architecture-vendor-os`: but got `{0}`")]
    InvalidFormat(&'a str),

    #[error("given architecture is not supported")]
    ArchitectureNotSupported,

    #[error("given vendor is not supported")]
    VendorNotSupported,

    #[error("given operating system is not supported")]
    OperatingSystemNotSupported,

    #[error("given triple consists of invalid combination")]
    InvalidCombination,
}
