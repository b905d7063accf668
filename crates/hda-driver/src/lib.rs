//! Userspace access to the Intel HD-Audio controller on Broxton / Apollo Lake.
//!
//! Locates the controller on the PCI bus, maps its HDA register BAR, checks
//! the global capabilities register and dumps the region to a file. Read
//! only: nothing here writes device registers.
//!
//! # Pipeline
//!
//! ```text
//! find_target_device → require_supported → describe_region → Mapper::map_region
//!                                                           ├─ self_test
//!                                                           └─ dump_to_file
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use hda_driver::{Pipeline, PipelineConfig, SysfsBus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SysfsBus::init()?;
//! let report = Pipeline::new(bus, PipelineConfig {
//!     output: Some("hda.bin".into()),
//!     ..PipelineConfig::default()
//! })
//! .run()?;
//!
//! println!("{} @ {}", report.platform.name(), report.device.address());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod bus;
mod diagnostic;
mod discovery;
mod dump;
mod error;
pub mod mmio;
mod pipeline;
mod platform;
mod region;
mod selftest;
mod sysfs;

/// Hardware identification constants (re-exported from hda-chip).
pub mod chip {
    pub use hda_chip::bar::{self, Region};
    pub use hda_chip::pcie::{self, Platform};
    pub use hda_chip::regs;
}

pub use bus::{DeviceMatch, PciAddress, PciBus, PciDeviceHandle, ResourceEntry};
pub use diagnostic::{Diagnostic, Fatal};
pub use discovery::find_target_device;
pub use dump::{dump_to_file, DumpSummary};
pub use error::{
    ConfigReadError, DiscoveryError, DumpError, MapError, PipelineError, PlatformUnsupported,
    RegisterError,
};
pub use error::{
    EXIT_DEVICE_NOT_FOUND, EXIT_DUMP_FAILED, EXIT_MAPPING_FAILED, EXIT_PERMISSION_DENIED,
    EXIT_UNSUPPORTED_PLATFORM,
};
pub use mmio::{MappedRegion, Mapper, MmioView};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use platform::{is_supported, require_supported};
pub use region::{describe_region, AddressRegion, SizeStrategy};
pub use selftest::{self_test, SelfTest};
pub use sysfs::{SysfsBus, DEFAULT_SYSFS_ROOT};
