//! Error types for HD-Audio discovery, mapping and dump operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code: device not found (or PCI subsystem unavailable)
pub const EXIT_DEVICE_NOT_FOUND: u8 = 3;
/// Exit code: located device is not a supported platform
pub const EXIT_UNSUPPORTED_PLATFORM: u8 = 4;
/// Exit code: mapping refused for lack of privilege
pub const EXIT_PERMISSION_DENIED: u8 = 5;
/// Exit code: mapping failed for any other reason
pub const EXIT_MAPPING_FAILED: u8 = 6;
/// Exit code: dump to file failed
pub const EXIT_DUMP_FAILED: u8 = 7;

/// Errors while locating the controller on the bus
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The PCI access layer could not be brought up
    #[error("Couldn't initialize PCI system: {reason}")]
    SystemInitFailed {
        /// Reason for failure
        reason: String,
    },

    /// Neither the canonical slot nor the bus scan yielded a controller
    #[error("Couldn't find Intel HD-Audio controller")]
    NotFound,

    /// Enumerating the bus failed after initialization
    #[error("PCI bus scan failed: {source}")]
    ScanFailed {
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl DiscoveryError {
    /// Create a system init failed error
    pub fn system_init_failed(reason: impl Into<String>) -> Self {
        Self::SystemInitFailed {
            reason: reason.into(),
        }
    }
}

/// Errors while reading or interpreting BARs from configuration space.
///
/// These never abort the pipeline.
#[derive(Debug, Error)]
pub enum ConfigReadError {
    /// A configuration-space read or write failed
    #[error("Config space access at {offset:#x} failed: {source}")]
    Access {
        /// Config-space offset
        offset: u16,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Region index is neither HDA nor DSP
    #[error("Unknown region index {0}")]
    UnknownRegion(u8),

    /// BAR base not aligned to the region size
    #[error("{region} BAR base {base:#x} is not aligned to size {size:#x}")]
    Misaligned {
        /// Region name
        region: &'static str,
        /// Masked base address
        base: u64,
        /// Region size
        size: u64,
    },

    /// Write/read-back sizing produced no usable size
    #[error("{region} BAR size probe failed: {reason}")]
    Probe {
        /// Region name
        region: &'static str,
        /// Reason for failure
        reason: String,
    },
}

/// Located device is not on the supported-platform list
#[derive(Debug, Error)]
#[error("Only support Broxton/ApolloLake atm (found {vendor_id:04x}:{device_id:04x})")]
pub struct PlatformUnsupported {
    /// Vendor ID of the located device
    pub vendor_id: u16,
    /// Device ID of the located device
    pub device_id: u16,
}

/// Errors while mapping a region into the process
#[derive(Debug, Error)]
pub enum MapError {
    /// Insufficient privilege to open or map the BAR resource
    #[error("Couldn't map {target}, error {code}. Need root access.")]
    PermissionDenied {
        /// What was being mapped
        target: String,
        /// OS error code
        code: i32,
    },

    /// A live mapping of the same physical region exists
    #[error("Region at {base:#x} is already mapped")]
    AlreadyMapped {
        /// Physical base address
        base: u64,
    },

    /// Descriptor and device region table disagree on the base address
    #[error("BAR base mismatch: config space says {described:#x}, device reports {device:#x}")]
    BaseMismatch {
        /// Base from the region descriptor
        described: u64,
        /// Base from the device's own region table
        device: u64,
    },

    /// Any other mapping failure
    #[error("Couldn't map MMIO region: {reason}")]
    Failed {
        /// Reason for failure
        reason: String,
    },
}

impl MapError {
    /// Create a mapping failed error
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Classify an OS error raised while opening or mapping `target`
    pub fn from_io(target: impl Into<String>, err: &io::Error) -> Self {
        let target = target.into();
        match err.raw_os_error() {
            Some(code @ (libc::EACCES | libc::EPERM)) => Self::PermissionDenied { target, code },
            None if err.kind() == io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                target,
                code: libc::EACCES,
            },
            _ => Self::Failed {
                reason: format!("{target}: {err}"),
            },
        }
    }
}

/// Errors from register reads through a mapped view
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// Access would run past the end of the mapping
    #[error("Out of bounds read: offset={offset:#x}, size={width}, limit={limit:#x}")]
    OutOfRange {
        /// Requested offset
        offset: u64,
        /// Access width in bytes
        width: usize,
        /// Mapping size
        limit: usize,
    },

    /// Offset not aligned to the access width
    #[error("Misaligned read: offset={offset:#x}, size={width}")]
    Misaligned {
        /// Requested offset
        offset: u64,
        /// Access width in bytes
        width: usize,
    },
}

/// Errors while dumping a mapped region to a file
#[derive(Debug, Error)]
pub enum DumpError {
    /// Target could not be created or opened
    #[error("failed to open {}: {source}", path.display())]
    OpenFailed {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Fewer bytes written than the region holds
    #[error("can't write HDA memory, {written} of {expected} bytes written")]
    PartialWrite {
        /// Bytes actually written
        written: usize,
        /// Bytes requested
        expected: usize,
    },

    /// Empty mapping or empty path
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: &'static str,
    },
}

/// Fatal pipeline errors; each maps to a distinct process exit code
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Controller could not be located
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Controller is not a supported platform
    #[error(transparent)]
    Unsupported(#[from] PlatformUnsupported),

    /// HDA region could not be mapped
    #[error(transparent)]
    Map(#[from] MapError),

    /// Dump to file failed
    #[error(transparent)]
    Dump(#[from] DumpError),
}

impl PipelineError {
    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Discovery(_) => EXIT_DEVICE_NOT_FOUND,
            Self::Unsupported(_) => EXIT_UNSUPPORTED_PLATFORM,
            Self::Map(MapError::PermissionDenied { .. }) => EXIT_PERMISSION_DENIED,
            Self::Map(_) => EXIT_MAPPING_FAILED,
            Self::Dump(_) => EXIT_DUMP_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_classified() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        assert!(matches!(
            MapError::from_io("BAR0", &err),
            MapError::PermissionDenied { code, .. } if code == libc::EACCES
        ));

        let err = io::Error::from_raw_os_error(libc::EPERM);
        assert!(matches!(
            MapError::from_io("BAR0", &err),
            MapError::PermissionDenied { code, .. } if code == libc::EPERM
        ));

        let err = io::Error::from_raw_os_error(libc::ENOMEM);
        assert!(matches!(MapError::from_io("BAR0", &err), MapError::Failed { .. }));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            PipelineError::from(DiscoveryError::NotFound).exit_code(),
            PipelineError::from(PlatformUnsupported {
                vendor_id: 0x8086,
                device_id: 0,
            })
            .exit_code(),
            PipelineError::from(MapError::PermissionDenied {
                target: "BAR0".into(),
                code: libc::EACCES,
            })
            .exit_code(),
            PipelineError::from(MapError::AlreadyMapped { base: 0 }).exit_code(),
            PipelineError::from(DumpError::InvalidArgument { reason: "empty" }).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            assert_ne!(*a, 2, "2 is reserved for usage errors");
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn permission_message_is_actionable() {
        let msg = MapError::PermissionDenied {
            target: "resource0".into(),
            code: libc::EACCES,
        }
        .to_string();
        assert!(msg.contains("root"));
    }
}
