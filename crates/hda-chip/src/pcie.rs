//! PCI identifiers for the HD-Audio controller.
//!
//! On Broxton / Apollo Lake the controller sits at `0000:00:0e.0`
//! (`lspci: 8086:5a98`), class `0x0401xx` when the audio DSP is enabled.

/// Intel vendor ID (PCI-SIG assigned).
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// Device IDs for supported controllers.
pub mod device_id {
    /// Broxton / Apollo Lake HD-Audio with audio DSP (`lspci: 8086:5a98`).
    pub const BXT_APL_HDA: u16 = 0x5A98;
}

/// Base class: multimedia controller.
pub const CLASS_MULTIMEDIA: u32 = 0x04;

/// Subclass: multimedia audio controller.
pub const SUBCLASS_AUDIO: u32 = 0x01;

/// 24-bit class code the bus scan looks for (`class << 16 | subclass << 8`).
pub const AUDIO_DEVICE_CLASS: u32 = CLASS_MULTIMEDIA << 16 | SUBCLASS_AUDIO << 8;

/// Compares class and subclass, ignores the programming interface byte.
pub const AUDIO_CLASS_MASK: u32 = 0x00FF_FF00;

/// PCI slot the controller occupies on the expected platform layout.
pub const CANONICAL_SLOT: u8 = 0x0E;

/// Canonical `domain:bus:slot.function` of the controller.
pub const CANONICAL_ADDRESS: (u16, u8, u8, u8) = (0, 0, CANONICAL_SLOT, 0);

/// Platform identified from the controller's PCI IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Broxton / Apollo Lake.
    BroxtonApolloLake,
    /// Anything else; the tooling refuses to touch it.
    Unsupported {
        /// Vendor ID as read from the device.
        vendor_id: u16,
        /// Device ID as read from the device.
        device_id: u16,
    },
}

impl Platform {
    /// Identify the platform from a vendor/device pair.
    #[must_use]
    pub const fn from_ids(vendor_id: u16, device_id: u16) -> Self {
        match (vendor_id, device_id) {
            (INTEL_VENDOR_ID, device_id::BXT_APL_HDA) => Self::BroxtonApolloLake,
            _ => Self::Unsupported {
                vendor_id,
                device_id,
            },
        }
    }

    /// Whether the tooling supports this platform.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::BroxtonApolloLake)
    }

    /// Human-readable platform name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BroxtonApolloLake => "Broxton / Apollo Lake",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}
