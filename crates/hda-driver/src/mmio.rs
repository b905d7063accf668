//! Memory-Mapped I/O for the HD-Audio controller
//!
//! [`Mapper`] maps a BAR resource into the process. At most one mapping per
//! physical region is live at a time, across every `Mapper` in the process.
//! Every register access goes through a bounds-checked [`MmioView`]; nothing
//! hands out raw pointers.

// MMIO registers are naturally aligned by hardware, offsets are checked below
#![allow(clippy::cast_ptr_alignment)]

use crate::bus::{PciBus, PciDeviceHandle};
use crate::error::{MapError, RegisterError};
use crate::region::AddressRegion;
use hda_chip::bar::Region;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::collections::HashSet;
use std::fs::File;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::{Mutex, OnceLock, PoisonError};

const WORD: usize = std::mem::size_of::<u32>();

/// Physical bases with a live mapping, shared by every [`Mapper`]
fn live_mappings() -> &'static Mutex<HashSet<u64>> {
    static LIVE: OnceLock<Mutex<HashSet<u64>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Creates mappings of BAR regions
#[derive(Debug, Default)]
pub struct Mapper {
    _private: (),
}

impl Mapper {
    /// Create a mapper
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a mapping of the region at `base` is currently live
    #[must_use]
    pub fn is_mapped(&self, base: u64) -> bool {
        live_mappings()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&base)
    }

    /// Map `region` of `device` read/write into the process.
    ///
    /// The mapping covers the device's own BAR resource; `region` supplies
    /// the size and must agree with the device's region table on the base.
    ///
    /// # Errors
    ///
    /// - `MapError::AlreadyMapped` if a mapping of the same base is live,
    ///   whichever `Mapper` created it
    /// - `MapError::BaseMismatch` if `region` and the device disagree
    /// - `MapError::PermissionDenied` if the resource cannot be opened or
    ///   mapped for lack of privilege
    /// - `MapError::Failed` for anything else
    pub fn map_region<B: PciBus + ?Sized>(
        &self,
        bus: &B,
        device: &PciDeviceHandle,
        region: &AddressRegion,
    ) -> Result<MappedRegion, MapError> {
        let bar = region.region.resource();
        let target = format!("{} BAR{bar} of {}", region.region.name(), device.address());

        let entry = device.resource(bar).ok_or_else(|| {
            MapError::failed(format!("{target}: no region table entry (probe failed?)"))
        })?;

        if entry.start != region.base_physical_address {
            return Err(MapError::BaseMismatch {
                described: region.base_physical_address,
                device: entry.start,
            });
        }

        if entry.size < region.size_bytes {
            return Err(MapError::failed(format!(
                "{target}: BAR is {:#x} bytes, {:#x} requested",
                entry.size, region.size_bytes
            )));
        }

        let size = usize::try_from(region.size_bytes)
            .map_err(|_| MapError::failed(format!("{target}: size does not fit in usize")))?;
        if size == 0 {
            return Err(MapError::failed(format!("{target}: zero-sized region")));
        }

        // Released on every early return below
        let claim = Claim::acquire(entry.start)?;

        let file = bus
            .open_resource(device, bar)
            .map_err(|e| MapError::from_io(target.clone(), &e))?;

        let available = file
            .metadata()
            .map_err(|e| MapError::failed(format!("{target}: cannot stat resource: {e}")))?
            .len();
        if available < region.size_bytes {
            return Err(MapError::failed(format!(
                "{target}: resource is {available:#x} bytes, {:#x} requested",
                region.size_bytes
            )));
        }

        // SAFETY: mmap of a BAR resource file.
        // Invariants: (1) file is open read/write for the lifetime of the mapping
        // (stored in MappedRegion); (2) size is non-zero and no larger than the
        // resource; (3) offset 0 is the start of the BAR; (4) the pointer is only
        // dereferenced through MmioView with bounds checks; (5) unmapped in Drop.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &file,
                0,
            )
        }
        .map_err(|e| MapError::from_io(target.clone(), &e.into()))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| MapError::failed(format!("{target}: mmap returned null")))?;

        tracing::info!(
            "Mapped {target} (phys {:#x}) at {ptr:p}, size {size:#x}",
            entry.start
        );

        Ok(MappedRegion {
            ptr,
            size,
            base: entry.start,
            region: region.region,
            _file: file,
            _claim: claim,
        })
    }
}

/// Registry entry for one live mapping, removed on drop
#[derive(Debug)]
struct Claim {
    base: u64,
}

impl Claim {
    fn acquire(base: u64) -> Result<Self, MapError> {
        let inserted = live_mappings()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(base);
        if !inserted {
            return Err(MapError::AlreadyMapped { base });
        }
        Ok(Self { base })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        live_mappings()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.base);
    }
}

/// A live mapping of one BAR region
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    base: u64,
    region: Region,
    _file: File,
    _claim: Claim,
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .field("base", &format_args!("{:#x}", self.base))
            .field("region", &self.region)
            .finish()
    }
}

impl MappedRegion {
    /// Bounds-checked view over the mapping
    #[must_use]
    pub fn view(&self) -> MmioView<'_> {
        MmioView {
            base: self.ptr,
            len: self.size,
            _mapping: PhantomData,
        }
    }

    /// Read the 32-bit register at `offset`
    ///
    /// # Errors
    ///
    /// Returns `RegisterError` if `offset + 4` exceeds the mapping or
    /// `offset` is not 4-byte aligned. No memory is touched in that case.
    pub fn read_u32(&self, offset: u32) -> Result<u32, RegisterError> {
        self.view().read_u32(u64::from(offset))
    }

    /// Mapping size in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Physical base address of the mapped region
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Which region is mapped
    #[must_use]
    pub const fn region(&self) -> Region {
        self.region
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: munmap of the mapping created in Mapper::map_region.
        // Invariants: (1) ptr/size are exactly what mmap returned/was given;
        // (2) Drop runs at most once; (3) every MmioView borrows self, so none
        // outlives this call.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
        tracing::debug!("Unmapped {} region at {:#x}", self.region.name(), self.base);
    }
}

/// Bounds-checked window over mapped device memory
#[derive(Debug, Clone, Copy)]
pub struct MmioView<'a> {
    base: NonNull<u8>,
    len: usize,
    _mapping: PhantomData<&'a MappedRegion>,
}

impl MmioView<'_> {
    /// Length of the window in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: u64, width: usize) -> Result<usize, RegisterError> {
        let out_of_range = RegisterError::OutOfRange {
            offset,
            width,
            limit: self.len,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range.clone())?;
        match start.checked_add(width) {
            Some(end) if end <= self.len => {}
            _ => return Err(out_of_range),
        }
        if start % width != 0 {
            return Err(RegisterError::Misaligned { offset, width });
        }
        Ok(start)
    }

    /// Single volatile 32-bit load at `offset`
    ///
    /// # Errors
    ///
    /// Returns `RegisterError::OutOfRange` if `offset + 4` exceeds the window,
    /// `RegisterError::Misaligned` if `offset` is not 4-byte aligned.
    pub fn read_u32(&self, offset: u64) -> Result<u32, RegisterError> {
        let start = self.check(offset, WORD)?;

        // SAFETY: Volatile read from mapped device memory.
        // Invariants: (1) start + 4 <= len, checked above; (2) base is valid for
        // len bytes while the borrowed MappedRegion lives; (3) start is 4-byte
        // aligned and base is page aligned; (4) volatile so the load is neither
        // elided nor merged.
        let value = unsafe { self.base.as_ptr().add(start).cast::<u32>().read_volatile() };

        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Copy the whole window out with 32-bit volatile loads.
    ///
    /// The result is the byte image of the window in memory order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        let words = self.len / WORD;
        let mut image: Vec<u32> = Vec::with_capacity(words);

        for i in 0..words {
            // SAFETY: i * 4 + 4 <= len; aligned as in read_u32.
            image.push(unsafe { self.base.as_ptr().add(i * WORD).cast::<u32>().read_volatile() });
        }

        let mut bytes = bytemuck::cast_slice::<u32, u8>(&image).to_vec();
        for i in words * WORD..self.len {
            // SAFETY: i < len.
            bytes.push(unsafe { self.base.as_ptr().add(i).read_volatile() });
        }
        bytes
    }
}

#[cfg(test)]
impl<'a> MmioView<'a> {
    /// View over ordinary memory, for exercising the bounds checks
    fn over(words: &'a mut [u32]) -> Self {
        Self {
            base: NonNull::from(&mut words[0]).cast(),
            len: words.len() * WORD,
            _mapping: PhantomData,
        }
    }
}
