//! Linux sysfs implementation of [`PciBus`]
//!
//! Reads identity from `/sys/bus/pci/devices/*/{vendor,device,class}`,
//! configuration space from `config`, the region table from `resource`, and
//! maps BARs through `resourceN`.

use crate::bus::{PciAddress, PciBus, PciDeviceHandle, RegionTable, ResourceEntry, BAR_COUNT};
use crate::error::DiscoveryError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Default sysfs PCI bus root
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/pci";

/// PCI bus as exposed by sysfs
#[derive(Debug, Clone)]
pub struct SysfsBus {
    root: PathBuf,
}

impl SysfsBus {
    /// Open the system PCI bus at [`DEFAULT_SYSFS_ROOT`]
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::SystemInitFailed` if the device tree is unreadable.
    pub fn init() -> Result<Self, DiscoveryError> {
        Self::with_root(DEFAULT_SYSFS_ROOT)
    }

    /// Open a PCI bus tree rooted at `root` (which contains `devices/`)
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::SystemInitFailed` if `root/devices` is unreadable.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, DiscoveryError> {
        let root = root.into();
        let devices = root.join("devices");

        std::fs::read_dir(&devices).map_err(|e| {
            DiscoveryError::system_init_failed(format!("cannot read {}: {e}", devices.display()))
        })?;

        tracing::debug!("PCI bus at {}", root.display());
        Ok(Self { root })
    }

    /// Bus root path
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, address: PciAddress) -> PathBuf {
        self.root.join("devices").join(address.to_string())
    }

    fn read_identity(&self, address: PciAddress) -> io::Result<PciDeviceHandle> {
        let dir = self.device_dir(address);

        let vendor_id = read_hex_sysfs(&dir.join("vendor"))?;
        let device_id = read_hex_sysfs(&dir.join("device"))?;
        let class = read_hex_sysfs(&dir.join("class"))?;

        let narrow = |v: u32, what: &str| {
            u16::try_from(v).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, format!("{what} {v:#x} out of range"))
            })
        };

        Ok(PciDeviceHandle::new(
            address,
            narrow(vendor_id, "vendor")?,
            narrow(device_id, "device")?,
            class & 0x00FF_FFFF,
        ))
    }
}

impl PciBus for SysfsBus {
    fn device_at(&self, address: PciAddress) -> io::Result<Option<PciDeviceHandle>> {
        if !self.device_dir(address).exists() {
            return Ok(None);
        }
        self.read_identity(address).map(Some)
    }

    fn devices(&self) -> io::Result<Vec<PciDeviceHandle>> {
        let mut addresses: Vec<PciAddress> = std::fs::read_dir(self.root.join("devices"))?
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();

        // Sort to ensure consistent ordering
        addresses.sort();

        let mut devices = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.read_identity(address) {
                Ok(device) => devices.push(device),
                Err(e) => tracing::debug!("Skipping {address}: {e}"),
            }
        }

        Ok(devices)
    }

    fn probe(&self, device: &PciDeviceHandle) -> io::Result<RegionTable> {
        let dir = self.device_dir(device.address());

        // Config space must be readable, and agree with the identity files
        let id = self.read_config_u32(device, 0)?;
        let vendor = (id & 0xFFFF) as u16;
        if vendor != device.vendor_id() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "config space vendor {vendor:#06x} disagrees with sysfs {:#06x}",
                    device.vendor_id()
                ),
            ));
        }

        let content = std::fs::read_to_string(dir.join("resource"))?;
        let mut regions: RegionTable = [None; BAR_COUNT];
        for (slot, line) in regions.iter_mut().zip(content.lines()) {
            *slot = ResourceEntry::parse_line(line)?;
        }

        tracing::debug!(
            "Probed {}: {} region(s)",
            device.address(),
            regions.iter().flatten().count()
        );

        Ok(regions)
    }

    fn read_config_u32(&self, device: &PciDeviceHandle, offset: u16) -> io::Result<u32> {
        let file = File::open(self.device_dir(device.address()).join("config"))?;
        let mut word = [0u8; 4];
        file.read_exact_at(&mut word, u64::from(offset))?;
        Ok(u32::from_le_bytes(word))
    }

    fn write_config_u32(
        &self,
        device: &PciDeviceHandle,
        offset: u16,
        value: u32,
    ) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.device_dir(device.address()).join("config"))?;
        file.write_all_at(&value.to_le_bytes(), u64::from(offset))
    }

    fn open_resource(&self, device: &PciDeviceHandle, bar: u8) -> io::Result<File> {
        let path = self
            .device_dir(device.address())
            .join(format!("resource{bar}"));

        tracing::debug!("Opening {}", path.display());

        OpenOptions::new().read(true).write(true).open(path)
    }
}

/// Read a hexadecimal value from sysfs
fn read_hex_sysfs(path: &Path) -> io::Result<u32> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim().trim_start_matches("0x");

    u32::from_str_radix(trimmed, 16).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid hex value in {}: {e}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = SysfsBus::with_root(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, DiscoveryError::SystemInitFailed { .. }));
    }

    #[test]
    fn hex_sysfs_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class");
        std::fs::write(&path, "0x040100\n").unwrap();
        assert_eq!(read_hex_sysfs(&path).unwrap(), 0x0401_00);

        std::fs::write(&path, "bogus\n").unwrap();
        assert!(read_hex_sysfs(&path).is_err());
    }

    #[test]
    fn enumeration_is_sorted_and_skips_non_devices() {
        let dir = tempfile::tempdir().unwrap();
        let devices = dir.path().join("devices");
        for (addr, vendor) in [("0000:00:1f.3", "0x8086"), ("0000:00:02.0", "0x8086")] {
            let d = devices.join(addr);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("vendor"), vendor).unwrap();
            std::fs::write(d.join("device"), "0x1234").unwrap();
            std::fs::write(d.join("class"), "0x030000").unwrap();
        }
        // Not a device address
        std::fs::create_dir_all(devices.join("slots")).unwrap();
        // Device with unreadable identity
        std::fs::create_dir_all(devices.join("0000:00:03.0")).unwrap();

        let bus = SysfsBus::with_root(dir.path()).unwrap();
        let found: Vec<String> = bus
            .devices()
            .unwrap()
            .iter()
            .map(|d| d.address().to_string())
            .collect();
        assert_eq!(found, ["0000:00:02.0", "0000:00:1f.3"]);
    }
}
