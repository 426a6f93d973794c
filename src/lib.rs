//! A/B firmware update core.
//!
//! Copies a staged image from the Storage region into the Run region,
//! checks the copy against the checksum recorded next to the staged image
//! and then either enters the new firmware or gives up after a bounded
//! number of whole-image retries.
//!
//! Flash access, the checksum unit, the failure indicator and the jump
//! into the Run image are supplied by the board through
//! [`NonVolatileMemory`], [`ChecksumEngine`], [`PanicSignal`] and
//! [`FirmwareEntry`]. Any `embedded_storage` [`NorFlash`] already is a
//! [`NonVolatileMemory`].
//!
//! [`NorFlash`]: embedded_storage::nor_flash::NorFlash

#![no_std]

#[cfg(test)]
extern crate std;

mod fmt;

pub mod boot;
pub mod checksum;
pub mod copy;
pub mod error;
pub mod flash;
pub mod layout;

#[cfg(test)]
mod mock;

pub use boot::{Attempt, BootReport, BootStatus, Bootloader, FirmwareEntry, PanicSignal};
pub use checksum::{ChecksumConfig, ChecksumEngine, Polynomial, SoftCrc, CRC_MODE};
pub use copy::CopyStats;
pub use error::{AttemptFailure, AttemptOutcome, ChecksumError, LayoutError};
pub use flash::NonVolatileMemory;
pub use layout::{Region, RegionMap, DEFAULT_MAX_RETRIES};

pub use embedded_storage;

/// Byte offset in non-volatile memory.
pub type Address = u32;

/// Size of one programmed word. Destination addresses are multiples of it.
pub const WORD_SIZE: u32 = 4;
