//! Region descriptor: BAR base and size from configuration space

use crate::bus::{PciBus, PciDeviceHandle};
use crate::error::ConfigReadError;
use hda_chip::bar::{self, BarFlags, Region};
use std::fmt;

/// Command register offset in config space
const PCI_COMMAND: u16 = 0x04;
/// Memory space decode enable
const COMMAND_MEMORY: u32 = 1 << 1;

/// How the size of a region is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeStrategy {
    /// Use the fixed size declared for the region
    #[default]
    Static,
    /// Write all ones to the BAR, read back the size mask, restore
    Probe,
}

/// Span of one BAR in physical address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRegion {
    /// Which region this is
    pub region: Region,
    /// Physical base with the BAR flag bits cleared
    pub base_physical_address: u64,
    /// Size in bytes
    pub size_bytes: u64,
}

impl AddressRegion {
    /// Region built from the device's own region table and the fixed size.
    ///
    /// `None` if the probe never populated the table entry.
    #[must_use]
    pub fn from_device(device: &PciDeviceHandle, region: Region) -> Option<Self> {
        let entry = device.resource(region.resource())?;
        Some(Self {
            region,
            base_physical_address: entry.start,
            size_bytes: region.size(),
        })
    }
}

impl fmt::Display for AddressRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} BAR {:#x}, size {:#x}",
            self.region.name(),
            self.base_physical_address,
            self.size_bytes
        )
    }
}

/// Read a region's base address from configuration space and pair it with its size.
///
/// # Errors
///
/// Returns `ConfigReadError` if the index is unknown, a config access fails,
/// size probing yields nothing, or the base is not aligned to the size.
pub fn describe_region<B: PciBus + ?Sized>(
    bus: &B,
    device: &PciDeviceHandle,
    region_index: u8,
    strategy: SizeStrategy,
) -> Result<AddressRegion, ConfigReadError> {
    let region = Region::from_index(region_index).ok_or(ConfigReadError::UnknownRegion(region_index))?;
    let (lower_off, upper_off) = region.config_offsets();

    let lower = read(bus, device, lower_off)?;
    let upper = read(bus, device, upper_off)?;

    tracing::info!(
        "{} BAR lower {:x}, upper {:x} ({})",
        region.name(),
        bar::mask_base_address(lower),
        upper,
        BarFlags::decode(lower).describe()
    );

    let base = bar::base_address(lower, upper);
    let size = match strategy {
        SizeStrategy::Static => region.size(),
        SizeStrategy::Probe => probe_size(bus, device, region, lower, upper)?,
    };

    if !bar::is_naturally_aligned(base, size) {
        return Err(ConfigReadError::Misaligned {
            region: region.name(),
            base,
            size,
        });
    }

    Ok(AddressRegion {
        region,
        base_physical_address: base,
        size_bytes: size,
    })
}

/// Standard BAR sizing with memory decode disabled for the duration.
///
/// The saved BAR words and command register are restored even when the
/// sizing itself fails.
fn probe_size<B: PciBus + ?Sized>(
    bus: &B,
    device: &PciDeviceHandle,
    region: Region,
    lower: u32,
    upper: u32,
) -> Result<u64, ConfigReadError> {
    let (lower_off, upper_off) = region.config_offsets();
    let is_64bit = BarFlags::decode(lower).is_64bit;

    // Status bits are write-1-to-clear; only write the command half back
    let command = read(bus, device, PCI_COMMAND)? & 0xFFFF;
    write(bus, device, PCI_COMMAND, command & !COMMAND_MEMORY)?;

    let sized = (|| -> Result<(u32, u32), ConfigReadError> {
        write(bus, device, lower_off, u32::MAX)?;
        if is_64bit {
            write(bus, device, upper_off, u32::MAX)?;
        }
        let lower_mask = read(bus, device, lower_off)?;
        let upper_mask = if is_64bit {
            read(bus, device, upper_off)?
        } else {
            0
        };
        Ok((lower_mask, upper_mask))
    })();

    let mut restored = write(bus, device, lower_off, lower);
    if is_64bit {
        restored = restored.and(write(bus, device, upper_off, upper));
    }
    restored = restored.and(write(bus, device, PCI_COMMAND, command));

    let (lower_mask, upper_mask) = sized?;
    restored?;

    let size = bar::size_from_probe(lower_mask, upper_mask).ok_or_else(|| ConfigReadError::Probe {
        region: region.name(),
        reason: format!("BAR read back {lower_mask:#x}/{upper_mask:#x}, not implemented"),
    })?;

    tracing::debug!("{} BAR probed size {size:#x}", region.name());
    Ok(size)
}

fn read<B: PciBus + ?Sized>(
    bus: &B,
    device: &PciDeviceHandle,
    offset: u16,
) -> Result<u32, ConfigReadError> {
    bus.read_config_u32(device, offset)
        .map_err(|source| ConfigReadError::Access { offset, source })
}

fn write<B: PciBus + ?Sized>(
    bus: &B,
    device: &PciDeviceHandle,
    offset: u16,
    value: u32,
) -> Result<(), ConfigReadError> {
    bus.write_config_u32(device, offset, value)
        .map_err(|source| ConfigReadError::Access { offset, source })
}
