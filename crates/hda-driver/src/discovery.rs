//! Controller discovery
//!
//! Fast path: the canonical slot. Fallback: scan the whole bus for an Intel
//! multimedia audio controller and take the first one enumerated.

use crate::bus::{DeviceMatch, PciAddress, PciBus, PciDeviceHandle};
use crate::error::DiscoveryError;
use hda_chip::pcie::INTEL_VENDOR_ID;

/// Locate the HD-Audio controller and probe it.
///
/// A probe failure is logged and does not fail discovery; the returned
/// handle then has an empty region table.
///
/// # Errors
///
/// Returns `DiscoveryError::NotFound` if neither the canonical slot nor the
/// bus scan yields a controller, and `DiscoveryError::ScanFailed` if the bus
/// cannot be enumerated.
pub fn find_target_device<B: PciBus + ?Sized>(bus: &B) -> Result<PciDeviceHandle, DiscoveryError> {
    let canonical = PciAddress::canonical();

    let direct = match bus.device_at(canonical) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Lookup at {canonical} failed, falling back to bus scan: {e}");
            None
        }
    };

    if let Some(device) = &direct {
        tracing::info!(
            "Found device {:04x}:{:04x} at slot {:#x}",
            device.vendor_id(),
            device.device_id(),
            canonical.slot
        );
    }

    let mut device = match direct {
        Some(device) if device.vendor_id() == INTEL_VENDOR_ID => device,
        _ => scan(bus)?,
    };

    match bus.probe(&device) {
        Ok(regions) => device.set_regions(regions),
        Err(e) => tracing::warn!(
            "Fail to probe HDA controller at {}, error {}: {e}",
            device.address(),
            e.raw_os_error().unwrap_or(0)
        ),
    }

    Ok(device)
}

fn scan<B: PciBus + ?Sized>(bus: &B) -> Result<PciDeviceHandle, DiscoveryError> {
    let criteria = DeviceMatch::hda_controller();
    tracing::debug!("Scanning bus for {criteria:?}");

    let found = bus
        .find_matching(&criteria)
        .map_err(|source| DiscoveryError::ScanFailed { source })?;

    match found {
        Some(device) => {
            tracing::info!(
                "Found Intel HD-Audio controller: id {:x}, class {:x} @ {}",
                device.device_id(),
                device.class(),
                device.address()
            );
            Ok(device)
        }
        None => {
            tracing::error!("Couldn't find Intel HD-Audio controller");
            Err(DiscoveryError::NotFound)
        }
    }
}
