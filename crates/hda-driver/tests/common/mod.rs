//! Shared fixtures: a fake sysfs PCI tree and an in-memory bus

#![allow(dead_code)]

use hda_driver::bus::{RegionTable, BAR_COUNT};
use hda_driver::{PciAddress, PciBus, PciDeviceHandle, ResourceEntry, SysfsBus};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

pub const HDA_BASE: u64 = 0x9000_0000;
pub const DSP_BASE: u64 = 0x9001_0000;
pub const HDA_SIZE: u64 = 0x4000;
pub const DSP_SIZE: u64 = 0x1_0000;

/// 64-bit non-prefetchable memory BAR
const BAR_FLAGS_64: u32 = 0x4;
/// IORESOURCE_MEM | IORESOURCE_MEM_64 | ...
const RESOURCE_FLAGS: u64 = 0x0014_0204;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hda_driver=debug")
        .with_test_writer()
        .try_init();
}

/// Serializes tests that map: live mappings are tracked process-wide and
/// every fixture uses the same physical bases.
pub fn exclusive() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HDA register image whose first word reads GCAP 0x6701
pub fn hda_pattern() -> Vec<u8> {
    let mut image: Vec<u8> = (0..HDA_SIZE as usize)
        .map(|i| (i.wrapping_mul(31) + 7) as u8)
        .collect();
    image[..4].copy_from_slice(&0x0001_6701u32.to_le_bytes());
    image
}

#[derive(Debug, Clone)]
pub struct FakeBar {
    pub resource: u8,
    pub base: u64,
    pub size: u64,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub address: String,
    pub vendor: u16,
    pub device: u16,
    pub class: u32,
    pub bars: Vec<FakeBar>,
    /// Write the `resource` table (probe fails without it)
    pub resource_table: bool,
}

impl FakeDevice {
    /// Apollo Lake controller at the canonical slot
    pub fn bxt() -> Self {
        Self {
            address: "0000:00:0e.0".into(),
            vendor: 0x8086,
            device: 0x5A98,
            class: 0x0401_00,
            bars: vec![
                FakeBar {
                    resource: 0,
                    base: HDA_BASE,
                    size: HDA_SIZE,
                    contents: hda_pattern(),
                },
                FakeBar {
                    resource: 4,
                    base: DSP_BASE,
                    size: DSP_SIZE,
                    contents: vec![0; DSP_SIZE as usize],
                },
            ],
            resource_table: true,
        }
    }

    pub fn at(mut self, address: &str) -> Self {
        self.address = address.into();
        self
    }

    pub fn ids(mut self, vendor: u16, device: u16) -> Self {
        self.vendor = vendor;
        self.device = device;
        self
    }

    pub fn class(mut self, class: u32) -> Self {
        self.class = class;
        self
    }

    pub fn without_bars(mut self) -> Self {
        self.bars.clear();
        self
    }

    pub fn without_resource_table(mut self) -> Self {
        self.resource_table = false;
        self
    }

    /// 256-byte type 0 config header
    pub fn config_space(&self) -> Vec<u8> {
        let mut cfg = vec![0u8; 256];
        cfg[0..2].copy_from_slice(&self.vendor.to_le_bytes());
        cfg[2..4].copy_from_slice(&self.device.to_le_bytes());
        cfg[0x08..0x0C].copy_from_slice(&(self.class << 8 | 0x0B).to_le_bytes());
        for bar in &self.bars {
            let lower = 0x10 + 4 * usize::from(bar.resource);
            let lo = (bar.base as u32 & !0xF) | BAR_FLAGS_64;
            let hi = (bar.base >> 32) as u32;
            cfg[lower..lower + 4].copy_from_slice(&lo.to_le_bytes());
            cfg[lower + 4..lower + 8].copy_from_slice(&hi.to_le_bytes());
        }
        cfg
    }

    pub fn region_table(&self) -> RegionTable {
        let mut table = [None; BAR_COUNT];
        for bar in &self.bars {
            table[usize::from(bar.resource)] = Some(ResourceEntry {
                start: bar.base,
                size: bar.size,
                flags: RESOURCE_FLAGS,
            });
        }
        table
    }

    pub fn handle(&self) -> PciDeviceHandle {
        PciDeviceHandle::new(
            self.address.parse().expect("fixture address"),
            self.vendor,
            self.device,
            self.class,
        )
    }
}

/// Temporary `/sys/bus/pci` lookalike
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("devices")).expect("devices dir");
        Self { dir }
    }

    pub fn with(devices: &[FakeDevice]) -> Self {
        let fake = Self::new();
        for device in devices {
            fake.add(device);
        }
        fake
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn device_dir(&self, address: &str) -> PathBuf {
        self.dir.path().join("devices").join(address)
    }

    pub fn add(&self, device: &FakeDevice) -> PathBuf {
        let dir = self.device_dir(&device.address);
        std::fs::create_dir_all(&dir).expect("device dir");

        std::fs::write(dir.join("vendor"), format!("0x{:04x}\n", device.vendor)).unwrap();
        std::fs::write(dir.join("device"), format!("0x{:04x}\n", device.device)).unwrap();
        std::fs::write(dir.join("class"), format!("0x{:06x}\n", device.class)).unwrap();
        std::fs::write(dir.join("config"), device.config_space()).unwrap();

        if device.resource_table {
            let table = device.region_table();
            let mut lines = String::new();
            for slot in 0..13 {
                let (start, end, flags) = match table.get(slot).copied().flatten() {
                    Some(e) => (e.start, e.start + e.size - 1, e.flags),
                    None => (0, 0, 0),
                };
                lines.push_str(&format!("0x{start:016x} 0x{end:016x} 0x{flags:016x}\n"));
            }
            std::fs::write(dir.join("resource"), lines).unwrap();
        }

        for bar in &device.bars {
            std::fs::write(dir.join(format!("resource{}", bar.resource)), &bar.contents).unwrap();
        }

        dir
    }

    pub fn bus(&self) -> SysfsBus {
        SysfsBus::with_root(self.root()).expect("fake sysfs root")
    }
}

/// In-memory bus with BAR sizing emulation
#[derive(Default)]
pub struct MemoryBus {
    devices: Vec<PciDeviceHandle>,
    tables: HashMap<PciAddress, RegionTable>,
    config: RefCell<HashMap<(PciAddress, u16), u32>>,
    /// `(device, lower BAR offset)` → region size
    sized_bars: HashMap<(PciAddress, u16), u64>,
    /// `(device, BAR)` → resource contents
    backing: HashMap<(PciAddress, u8), Vec<u8>>,
    pub fail_probe: bool,
    pub fail_scan: bool,
    pub fail_canonical: bool,
    pub deny_resources: bool,
    /// Serve resources from anonymous temp files instead of failing
    pub backed_resources: bool,
    pub probes: Cell<usize>,
    pub resource_opens: Cell<usize>,
    pub config_writes: RefCell<Vec<(u16, u32)>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: &FakeDevice) {
        let handle = device.handle();
        let address = handle.address();
        let cfg = device.config_space();
        {
            let mut config = self.config.borrow_mut();
            for offset in (0..cfg.len()).step_by(4) {
                let word = u32::from_le_bytes(cfg[offset..offset + 4].try_into().unwrap());
                config.insert((address, offset as u16), word);
            }
        }
        for bar in &device.bars {
            self.sized_bars
                .insert((address, 0x10 + 4 * u16::from(bar.resource)), bar.size);
            self.backing
                .insert((address, bar.resource), bar.contents.clone());
        }
        self.tables.insert(address, device.region_table());
        self.devices.push(handle);
    }

    pub fn with(devices: &[FakeDevice]) -> Self {
        let mut bus = Self::new();
        for device in devices {
            bus.add(device);
        }
        bus
    }

    /// Overwrite a config word without BAR sizing emulation
    pub fn set_config_word(&self, address: PciAddress, offset: u16, value: u32) {
        self.config.borrow_mut().insert((address, offset), value);
    }

    pub fn config_word(&self, address: PciAddress, offset: u16) -> u32 {
        self.config
            .borrow()
            .get(&(address, offset))
            .copied()
            .unwrap_or(0)
    }
}

impl PciBus for MemoryBus {
    fn device_at(&self, address: PciAddress) -> io::Result<Option<PciDeviceHandle>> {
        if self.fail_canonical {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(self.devices.iter().find(|d| d.address() == address).cloned())
    }

    fn devices(&self) -> io::Result<Vec<PciDeviceHandle>> {
        if self.fail_scan {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(self.devices.clone())
    }

    fn probe(&self, device: &PciDeviceHandle) -> io::Result<RegionTable> {
        self.probes.set(self.probes.get() + 1);
        if self.fail_probe {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(self
            .tables
            .get(&device.address())
            .copied()
            .unwrap_or([None; BAR_COUNT]))
    }

    fn read_config_u32(&self, device: &PciDeviceHandle, offset: u16) -> io::Result<u32> {
        Ok(self.config_word(device.address(), offset))
    }

    fn write_config_u32(
        &self,
        device: &PciDeviceHandle,
        offset: u16,
        value: u32,
    ) -> io::Result<()> {
        let address = device.address();
        self.config_writes.borrow_mut().push((offset, value));

        let old = self.config_word(address, offset);
        let stored = if let Some(size) = self.sized_bars.get(&(address, offset)) {
            let mask = !(size - 1);
            (value & mask as u32 & !0xF) | (old & 0xF)
        } else if let Some(size) = self.sized_bars.get(&(address, offset.wrapping_sub(4))) {
            let mask = !(size - 1);
            value & (mask >> 32) as u32
        } else {
            value
        };

        self.config.borrow_mut().insert((address, offset), stored);
        Ok(())
    }

    fn open_resource(&self, device: &PciDeviceHandle, bar: u8) -> io::Result<File> {
        self.resource_opens.set(self.resource_opens.get() + 1);
        if self.deny_resources {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        if self.backed_resources {
            if let Some(contents) = self.backing.get(&(device.address(), bar)) {
                let mut file = tempfile::tempfile()?;
                file.write_all(contents)?;
                file.rewind()?;
                return Ok(file);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no backing file for resource{bar}"),
        ))
    }
}
