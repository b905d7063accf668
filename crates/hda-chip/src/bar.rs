//! Memory regions exposed by the HD-Audio controller.
//!
//! ```text
//! Region  Config BAR  Offsets      sysfs       Size    Purpose
//! ─────── ─────────── ──────────── ─────────── ─────── ───────────────────────────
//!  HDA     BAR0        0x10 / 0x14  resource0   16 KiB  HDA registers (aliases end at 0x3FFF)
//!  DSP     BAR4        0x20 / 0x24  resource4   64 KiB  Audio DSP (DMIC registers end at 0xFFFF)
//! ```
//!
//! Both BARs are 64-bit memory BARs, which is why the DSP region lives in
//! config BAR4 even though it is the second region.

/// HDA register region (region index 0).
pub mod hda {
    /// Region index.
    pub const INDEX: u8 = 0;
    /// Size in bytes.
    pub const SIZE: u64 = 0x4000; // 16 KiB
    /// Config-space offset of the lower base address word.
    pub const CFG_LOWER: u16 = 0x10;
    /// Config-space offset of the upper base address word.
    pub const CFG_UPPER: u16 = 0x14;
    /// sysfs `resourceN` number backing this region.
    pub const RESOURCE: u8 = 0;
}

/// Audio DSP region (region index 1).
pub mod dsp {
    /// Region index.
    pub const INDEX: u8 = 1;
    /// Size in bytes.
    pub const SIZE: u64 = 0x10000; // 64 KiB
    /// Config-space offset of the lower base address word.
    pub const CFG_LOWER: u16 = 0x20;
    /// Config-space offset of the upper base address word.
    pub const CFG_UPPER: u16 = 0x24;
    /// sysfs `resourceN` number backing this region.
    pub const RESOURCE: u8 = 4;
}

/// Flag bits of a memory BAR's lower word: bit 0 space, bits 2:1 type, bit 3 prefetch.
pub const MEM_BAR_FLAG_BITS: u32 = 0xF;

/// Address bits of a memory BAR's lower word.
pub const MEM_BAR_ADDRESS_MASK: u32 = !MEM_BAR_FLAG_BITS;

const BAR_SPACE_IO: u32 = 1 << 0;
const BAR_TYPE_MASK: u32 = 0b11 << 1;
const BAR_TYPE_64: u32 = 0b10 << 1;
const BAR_PREFETCHABLE: u32 = 1 << 3;

/// The two regions the tooling knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Region {
    /// HD-Audio registers.
    Hda = hda::INDEX,
    /// Audio DSP.
    Dsp = dsp::INDEX,
}

impl Region {
    /// All known regions, in index order.
    pub const ALL: [Self; 2] = [Self::Hda, Self::Dsp];

    /// Region from its index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            hda::INDEX => Some(Self::Hda),
            dsp::INDEX => Some(Self::Dsp),
            _ => None,
        }
    }

    /// Region index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Fixed size of this region in bytes.
    #[must_use]
    pub const fn size(self) -> u64 {
        match self {
            Self::Hda => hda::SIZE,
            Self::Dsp => dsp::SIZE,
        }
    }

    /// Config-space offsets of the `(lower, upper)` base address words.
    #[must_use]
    pub const fn config_offsets(self) -> (u16, u16) {
        match self {
            Self::Hda => (hda::CFG_LOWER, hda::CFG_UPPER),
            Self::Dsp => (dsp::CFG_LOWER, dsp::CFG_UPPER),
        }
    }

    /// sysfs `resourceN` number backing this region.
    #[must_use]
    pub const fn resource(self) -> u8 {
        match self {
            Self::Hda => hda::RESOURCE,
            Self::Dsp => dsp::RESOURCE,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hda => "HDA",
            Self::Dsp => "DSP",
        }
    }
}

/// Clear the flag bits of a memory BAR's lower word.
#[must_use]
pub const fn mask_base_address(raw: u32) -> u32 {
    raw & MEM_BAR_ADDRESS_MASK
}

/// Decoded flag bits of a BAR's lower word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarFlags {
    /// I/O space rather than memory space.
    pub is_io: bool,
    /// 64-bit memory BAR (consumes the next BAR register as upper half).
    pub is_64bit: bool,
    /// Prefetchable memory.
    pub is_prefetchable: bool,
}

impl BarFlags {
    /// Decode the flag bits from a raw lower word.
    #[must_use]
    pub const fn decode(raw: u32) -> Self {
        let is_io = raw & BAR_SPACE_IO != 0;
        Self {
            is_io,
            is_64bit: !is_io && raw & BAR_TYPE_MASK == BAR_TYPE_64,
            is_prefetchable: !is_io && raw & BAR_PREFETCHABLE != 0,
        }
    }

    /// Human-readable BAR kind.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match (self.is_io, self.is_64bit, self.is_prefetchable) {
            (true, _, _) => "I/O port",
            (false, false, false) => "32-bit non-prefetch",
            (false, false, true) => "32-bit prefetchable",
            (false, true, false) => "64-bit non-prefetch",
            (false, true, true) => "64-bit prefetchable",
        }
    }
}

/// Physical base address from the raw `(lower, upper)` BAR words.
///
/// The upper word only contributes when the lower word says the BAR is 64-bit.
#[must_use]
pub const fn base_address(lower: u32, upper: u32) -> u64 {
    let low = mask_base_address(lower) as u64;
    if BarFlags::decode(lower).is_64bit {
        (upper as u64) << 32 | low
    } else {
        low
    }
}

/// Region size from the words read back after writing all ones to a BAR.
///
/// `lower` and `upper` are the read-back values; `lower` still carries the
/// (read-only) flag bits. Returns `None` for an unimplemented BAR.
#[must_use]
pub const fn size_from_probe(lower: u32, upper: u32) -> Option<u64> {
    let low = mask_base_address(lower);
    let mask = if BarFlags::decode(lower).is_64bit {
        (upper as u64) << 32 | low as u64
    } else {
        if low == 0 {
            return None;
        }
        0xFFFF_FFFF_0000_0000 | low as u64
    };
    if mask == 0 {
        return None;
    }
    Some((!mask).wrapping_add(1))
}

/// Whether `base` is naturally aligned to `size` (BARs always are).
#[must_use]
pub const fn is_naturally_aligned(base: u64, size: u64) -> bool {
    size.is_power_of_two() && base & (size - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn region_sizes_are_fixed() {
        assert_eq!(Region::Hda.size(), 16_384);
        assert_eq!(Region::Dsp.size(), 65_536);
    }

    #[test]
    fn region_config_offsets() {
        assert_eq!(Region::Hda.config_offsets(), (0x10, 0x14));
        assert_eq!(Region::Dsp.config_offsets(), (0x20, 0x24));
        assert_eq!(Region::from_index(0), Some(Region::Hda));
        assert_eq!(Region::from_index(1), Some(Region::Dsp));
        assert_eq!(Region::from_index(2), None);
    }

    #[test]
    fn mask_clears_flag_bits() {
        // 64-bit non-prefetchable memory BAR at 0x9000_0000
        assert_eq!(mask_base_address(0x9000_0004), 0x9000_0000);
        assert_eq!(mask_base_address(0x9001_000C), 0x9001_0000);
        assert_eq!(mask_base_address(0x0000_000F), 0);
    }

    #[test]
    fn base_address_combines_upper_only_for_64bit() {
        assert_eq!(base_address(0x9000_0004, 0x1), 0x1_9000_0000);
        assert_eq!(base_address(0x9000_0000, 0x1), 0x9000_0000);
    }

    #[test]
    fn flags_decode() {
        let f = BarFlags::decode(0x9000_000C);
        assert!(f.is_64bit && f.is_prefetchable && !f.is_io);
        assert_eq!(f.describe(), "64-bit prefetchable");
        assert_eq!(BarFlags::decode(0x7001).describe(), "I/O port");
    }

    #[test]
    fn probe_sizes() {
        // 16 KiB 64-bit BAR: lower reads back 0xFFFF_C004, upper all ones
        assert_eq!(size_from_probe(0xFFFF_C004, 0xFFFF_FFFF), Some(0x4000));
        // 64 KiB 32-bit BAR
        assert_eq!(size_from_probe(0xFFFF_0000, 0), Some(0x1_0000));
        // Unimplemented BAR
        assert_eq!(size_from_probe(0, 0), None);
    }

    #[test]
    fn alignment() {
        assert!(is_naturally_aligned(0x9000_0000, 0x4000));
        assert!(!is_naturally_aligned(0x9000_2000, 0x4000));
        assert!(!is_naturally_aligned(0x9000_0000, 0x3000));
    }

    proptest! {
        #[test]
        fn mask_is_idempotent(v in any::<u32>()) {
            let once = mask_base_address(v);
            prop_assert_eq!(mask_base_address(once), once);
            prop_assert_eq!(once & MEM_BAR_FLAG_BITS, 0);
            prop_assert_eq!(once, v & !0xF);
        }
    }
}
