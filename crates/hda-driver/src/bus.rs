//! PCI bus abstraction
//!
//! Everything the pipeline needs from the bus goes through [`PciBus`]:
//! identity lookup, enumeration, probing, config-space access and opening a
//! BAR resource for mapping. [`crate::SysfsBus`] is the Linux implementation.

use hda_chip::pcie::{AUDIO_CLASS_MASK, AUDIO_DEVICE_CLASS, CANONICAL_ADDRESS, INTEL_VENDOR_ID};
use std::fmt;
use std::fs::File;
use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Number of standard BARs in a type 0 header
pub const BAR_COUNT: usize = 6;

/// `domain:bus:slot.function` address of a PCI function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    /// PCI segment / domain
    pub domain: u16,
    /// Bus number
    pub bus: u8,
    /// Device (slot) number
    pub slot: u8,
    /// Function number
    pub function: u8,
}

impl PciAddress {
    /// Create an address
    #[must_use]
    pub const fn new(domain: u16, bus: u8, slot: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            slot,
            function,
        }
    }

    /// Address the controller occupies on the expected platform layout
    #[must_use]
    pub const fn canonical() -> Self {
        let (domain, bus, slot, function) = CANONICAL_ADDRESS;
        Self::new(domain, bus, slot, function)
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

/// Malformed `domain:bus:slot.function` string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid PCI address: {0:?}")]
pub struct InvalidPciAddress(pub String);

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPciAddress(s.to_string());

        let (domain, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(invalid)?;
        let (slot, function) = rest.split_once('.').ok_or_else(invalid)?;

        let domain = u16::from_str_radix(domain, 16).map_err(|_| invalid())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| invalid())?;
        let slot = u8::from_str_radix(slot, 16).map_err(|_| invalid())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| invalid())?;

        if slot > 0x1F || function > 0x7 {
            return Err(invalid());
        }

        Ok(Self::new(domain, bus, slot, function))
    }
}

/// One entry of a device's region table, as the kernel reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Physical start address
    pub start: u64,
    /// Size in bytes
    pub size: u64,
    /// Kernel resource flags
    pub flags: u64,
}

impl ResourceEntry {
    /// Parse one `start end flags` line of a sysfs `resource` file.
    ///
    /// Returns `Ok(None)` for an unused (all-zero) slot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the line is not three hex fields, or if the
    /// range is reversed or spans the whole 64-bit space.
    pub fn parse_line(line: &str) -> io::Result<Option<Self>> {
        let fields: Vec<u64> = line
            .split_whitespace()
            .map(|f| u64::from_str_radix(f.trim_start_matches("0x"), 16))
            .collect::<Result<_, _>>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{line:?}: {e}")))?;

        let [start, end, flags] = fields[..] else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected 3 fields in resource line {line:?}"),
            ));
        };

        if start == 0 && end == 0 {
            return Ok(None);
        }

        let size = end
            .checked_sub(start)
            .and_then(|span| span.checked_add(1))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad range {start:#x}..={end:#x} in resource line"),
                )
            })?;

        Ok(Some(Self { start, size, flags }))
    }
}

/// Per-BAR region table, indexed by BAR register number
pub type RegionTable = [Option<ResourceEntry>; BAR_COUNT];

/// A PCI function located on the bus.
///
/// Identity is fixed at discovery; the region table is filled in by
/// [`PciBus::probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDeviceHandle {
    address: PciAddress,
    vendor_id: u16,
    device_id: u16,
    class: u32,
    regions: RegionTable,
}

impl PciDeviceHandle {
    /// Create a handle with an empty region table
    #[must_use]
    pub const fn new(address: PciAddress, vendor_id: u16, device_id: u16, class: u32) -> Self {
        Self {
            address,
            vendor_id,
            device_id,
            class,
            regions: [None; BAR_COUNT],
        }
    }

    /// Install the region table returned by [`PciBus::probe`]
    pub(crate) fn set_regions(&mut self, regions: RegionTable) {
        self.regions = regions;
    }

    /// Bus address
    #[must_use]
    pub const fn address(&self) -> PciAddress {
        self.address
    }

    /// Vendor ID
    #[must_use]
    pub const fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// Device ID
    #[must_use]
    pub const fn device_id(&self) -> u16 {
        self.device_id
    }

    /// 24-bit class code (class, subclass, programming interface)
    #[must_use]
    pub const fn class(&self) -> u32 {
        self.class
    }

    /// Region table entry for a BAR register number
    #[must_use]
    pub fn resource(&self, bar: u8) -> Option<&ResourceEntry> {
        self.regions.get(usize::from(bar)).and_then(Option::as_ref)
    }

    /// Whether the probe populated any region
    #[must_use]
    pub fn is_probed(&self) -> bool {
        self.regions.iter().any(Option::is_some)
    }
}

/// Match criteria for a bus scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatch {
    /// Required vendor, or any
    pub vendor_id: Option<u16>,
    /// Required device, or any
    pub device_id: Option<u16>,
    /// Class code to compare after masking
    pub class: u32,
    /// Bits of the class code that must match
    pub class_mask: u32,
}

impl DeviceMatch {
    /// Intel multimedia audio controller, any device ID
    #[must_use]
    pub const fn hda_controller() -> Self {
        Self {
            vendor_id: Some(INTEL_VENDOR_ID),
            device_id: None,
            class: AUDIO_DEVICE_CLASS,
            class_mask: AUDIO_CLASS_MASK,
        }
    }

    /// Whether `device` satisfies every criterion
    #[must_use]
    pub fn matches(&self, device: &PciDeviceHandle) -> bool {
        self.vendor_id.map_or(true, |v| v == device.vendor_id)
            && self.device_id.map_or(true, |d| d == device.device_id)
            && device.class & self.class_mask == self.class & self.class_mask
    }
}

/// Access to the PCI bus.
///
/// Every call blocks until it completes or fails.
pub trait PciBus {
    /// Look up the function at `address`, `Ok(None)` if nothing is there
    ///
    /// # Errors
    ///
    /// Returns an error if the function exists but its identity cannot be read.
    fn device_at(&self, address: PciAddress) -> io::Result<Option<PciDeviceHandle>>;

    /// All functions on the bus, in enumeration order
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot be enumerated.
    fn devices(&self) -> io::Result<Vec<PciDeviceHandle>>;

    /// Check config-space visibility and read the device's region table.
    ///
    /// Discovery installs the returned table in the handle; it is the only
    /// way a handle gets one.
    ///
    /// # Errors
    ///
    /// Returns an error if the region table cannot be read.
    fn probe(&self, device: &PciDeviceHandle) -> io::Result<RegionTable>;

    /// Read a 32-bit word from configuration space
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or is short.
    fn read_config_u32(&self, device: &PciDeviceHandle, offset: u16) -> io::Result<u32>;

    /// Write a 32-bit word to configuration space
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or is short.
    fn write_config_u32(&self, device: &PciDeviceHandle, offset: u16, value: u32)
        -> io::Result<()>;

    /// Open the mappable resource backing BAR register `bar`, read/write
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be opened.
    fn open_resource(&self, device: &PciDeviceHandle, bar: u8) -> io::Result<File>;

    /// First function satisfying `criteria`, in enumeration order
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot be enumerated.
    fn find_matching(&self, criteria: &DeviceMatch) -> io::Result<Option<PciDeviceHandle>> {
        Ok(self.devices()?.into_iter().find(|d| criteria.matches(d)))
    }
}
