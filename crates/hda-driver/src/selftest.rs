//! Mapping sanity check against the global capabilities register

use crate::diagnostic::Diagnostic;
use crate::error::RegisterError;
use crate::mmio::MappedRegion;
use hda_chip::regs;

/// Result of reading GCAP through a fresh mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTest {
    /// Capability field as read
    pub gcap: u32,
    /// Value the supported platform reports
    pub expected: u32,
}

impl SelfTest {
    /// Whether the mapping reads back the expected capabilities
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.gcap == self.expected
    }
}

/// Read GCAP at offset 0 and compare it with the Broxton value.
///
/// A mismatch is reported in the returned [`SelfTest`], not as an error.
pub fn self_test(mapping: &MappedRegion) -> Diagnostic<SelfTest, RegisterError> {
    let outcome = mapping.read_u32(regs::GCAP).map(|word| {
        let result = SelfTest {
            gcap: regs::gcap(word),
            expected: regs::BXT_GCAP,
        };
        if result.passed() {
            tracing::info!("HDA Global capabilities {:#x}", result.gcap);
        } else {
            tracing::warn!(
                "HDA Global capabilities {:#x} (should be {:#x})",
                result.gcap,
                result.expected
            );
        }
        result
    });

    Diagnostic::new("Self test", outcome)
}
