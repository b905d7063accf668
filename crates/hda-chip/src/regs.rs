//! HDA register map.
//!
//! Only the global capabilities register is interpreted; it is used as a
//! sanity check that the mapping really points at the controller.

/// Global capabilities (GCAP, 16 bits) at the start of the HDA region.
pub const GCAP: u32 = 0x0000;

/// Bits of the 32-bit word at [`GCAP`] that hold the capability field.
pub const GCAP_MASK: u32 = 0xFFFF;

/// GCAP value reported by Broxton / Apollo Lake.
pub const BXT_GCAP: u32 = 0x6701;

/// Extract the capability field from the 32-bit word read at [`GCAP`].
#[must_use]
pub const fn gcap(word: u32) -> u32 {
    word & GCAP_MASK
}
