//! End-to-end run: locate, gate, describe, map, self-test, dump
//!
//! [`Pipeline`] owns the bus and the mapper and threads them through every
//! stage. The only state outside it is the process-wide set of live
//! mappings.

use crate::bus::{PciBus, PciDeviceHandle};
use crate::diagnostic::{Diagnostic, Fatal};
use crate::discovery::find_target_device;
use crate::dump::{dump_to_file, DumpSummary};
use crate::error::MapError;
use crate::mmio::Mapper;
use crate::platform::require_supported;
use crate::region::{describe_region, AddressRegion, SizeStrategy};
use crate::selftest::{self_test, SelfTest};
use hda_chip::bar::Region;
use hda_chip::pcie::Platform;
use std::path::PathBuf;

/// Run options
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Dump the HDA region here after the self-test
    pub output: Option<PathBuf>,
    /// How BAR sizes are determined
    pub size_strategy: SizeStrategy,
}

/// Everything a successful run found
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Located controller
    pub device: PciDeviceHandle,
    /// Identified platform
    pub platform: Platform,
    /// HDA region that was mapped
    pub hda: AddressRegion,
    /// DSP region, if its BAR could be read
    pub dsp: Option<AddressRegion>,
    /// Self-test result, if GCAP could be read
    pub self_test: Option<SelfTest>,
    /// Dump result, if a dump was requested
    pub dump: Option<DumpSummary>,
}

/// One pass over the controller
#[derive(Debug)]
pub struct Pipeline<B> {
    bus: B,
    mapper: Mapper,
    config: PipelineConfig,
}

impl<B: PciBus> Pipeline<B> {
    /// Create a pipeline over `bus`
    pub fn new(bus: B, config: PipelineConfig) -> Self {
        Self {
            bus,
            mapper: Mapper::new(),
            config,
        }
    }

    /// Bus in use
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Mapper in use
    pub const fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    /// Run every stage once.
    ///
    /// The mapping is released before this returns, on success and on error.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` if discovery fails, the platform is
    /// unsupported, the HDA region cannot be mapped, or the dump fails.
    pub fn run(&self) -> Fatal<PipelineReport> {
        let device = find_target_device(&self.bus)?;
        let platform = require_supported(&device)?;

        tracing::info!(
            "{} HD-Audio controller {:04x}:{:04x} @ {}",
            platform.name(),
            device.vendor_id(),
            device.device_id(),
            device.address()
        );

        let hda = self.describe(&device, Region::Hda);
        let dsp = self.describe(&device, Region::Dsp);

        for region in Region::ALL {
            match device.resource(region.resource()) {
                Some(entry) => tracing::info!(
                    "{} BAR {:#x}, size {:#x} (device region table)",
                    region.name(),
                    entry.start,
                    entry.size
                ),
                None => tracing::warn!("{} BAR missing from device region table", region.name()),
            }
        }

        let hda = match hda {
            Some(region) => region,
            None => AddressRegion::from_device(&device, Region::Hda).ok_or_else(|| {
                MapError::failed(format!(
                    "no HDA BAR known for {} (config space and probe both failed)",
                    device.address()
                ))
            })?,
        };

        let mapping = self.mapper.map_region(&self.bus, &device, &hda)?;

        let self_test = self_test(&mapping).report();

        let dump = match &self.config.output {
            Some(path) => Some(dump_to_file(&mapping, path)?),
            None => None,
        };

        Ok(PipelineReport {
            device,
            platform,
            hda,
            dsp,
            self_test,
            dump,
        })
    }

    fn describe(&self, device: &PciDeviceHandle, region: Region) -> Option<AddressRegion> {
        let what = match region {
            Region::Hda => "HDA BAR read",
            Region::Dsp => "DSP BAR read",
        };
        Diagnostic::new(
            what,
            describe_region(&self.bus, device, region.index(), self.config.size_strategy),
        )
        .report()
    }
}
