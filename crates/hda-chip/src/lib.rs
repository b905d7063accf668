//! Silicon model for the Intel HD-Audio / audio DSP controller found on
//! Broxton and Apollo Lake SoCs.
//!
//! This crate has **no dependencies** and **no hardware access**; it is a
//! pure model of the controller as seen from the PCI bus: identifiers, the
//! layout of the two memory regions, BAR decoding arithmetic and the one
//! register the tooling interprets.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pcie`] | Vendor/device IDs, class codes, canonical bus address |
//! | [`bar`] | Region table (HDA 16 KiB, DSP 64 KiB), BAR masking and size probing |
//! | [`regs`] | Global capabilities register (GCAP) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bar;
pub mod pcie;
pub mod regs;
