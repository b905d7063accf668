//! Supported-platform gate

use crate::bus::PciDeviceHandle;
use crate::error::PlatformUnsupported;
use hda_chip::pcie::Platform;

/// Whether the located controller is on the supported list.
#[must_use]
pub fn is_supported(device: &PciDeviceHandle) -> bool {
    Platform::from_ids(device.vendor_id(), device.device_id()).is_supported()
}

/// Identify the platform, refusing anything unsupported.
///
/// # Errors
///
/// Returns `PlatformUnsupported` for any vendor/device pair other than
/// Broxton / Apollo Lake.
pub fn require_supported(device: &PciDeviceHandle) -> Result<Platform, PlatformUnsupported> {
    let platform = Platform::from_ids(device.vendor_id(), device.device_id());
    if platform.is_supported() {
        Ok(platform)
    } else {
        Err(PlatformUnsupported {
            vendor_id: device.vendor_id(),
            device_id: device.device_id(),
        })
    }
}
