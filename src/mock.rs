//! In-RAM flash and collaborator doubles for the unit tests.

use std::boxed::Box;
use std::vec;
use std::vec::Vec;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::boot::{BootStatus, FirmwareEntry, PanicSignal};
use crate::layout::{Region, RegionMap};
use crate::Address;

pub const FLASH_SIZE: usize = 0x8000;
pub const PAGE_SIZE: u32 = 1024;

/// Run region in the lower half, Storage in the upper half, markers in the last words.
pub fn test_map() -> RegionMap {
    let run = Region::new(0x0000, 0x4000, PAGE_SIZE)
        .with_end_marker(0x3FF8)
        .with_checksum(0x3FFC);
    let storage = Region::new(0x4000, 0x8000, PAGE_SIZE)
        .with_end_marker(0x7FF8)
        .with_checksum(0x7FFC);
    RegionMap::new(storage, run)
}

/// Which calls of one kind fail. Calls are counted from zero across the flash's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    Never,
    Nth(usize),
    Always,
}

impl Fault {
    fn hits(self, call: usize) -> bool {
        match self {
            Fault::Never => false,
            Fault::Nth(n) => call == n,
            Fault::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFlashError {
    Driver(NorFlashErrorKind),
    Injected,
}

impl NorFlashError for MemFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            MemFlashError::Driver(kind) => *kind,
            MemFlashError::Injected => NorFlashErrorKind::Other,
        }
    }
}

/// NOR flash simulator: erase sets bytes to 0xFF, programming can only clear bits.
pub struct MemFlash {
    data: Vec<u8>,
    erase_log: Vec<Address>,
    program_log: Vec<Address>,
    erase_fault: Fault,
    program_fault: Fault,
    erase_calls: usize,
    program_calls: usize,
}

impl MemFlash {
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; FLASH_SIZE],
            erase_log: Vec::new(),
            program_log: Vec::new(),
            erase_fault: Fault::Never,
            program_fault: Fault::Never,
            erase_calls: 0,
            program_calls: 0,
        }
    }

    pub fn with_erase_fault(mut self, fault: Fault) -> Self {
        self.erase_fault = fault;
        self
    }

    pub fn with_program_fault(mut self, fault: Fault) -> Self {
        self.program_fault = fault;
        self
    }

    /// Place bytes directly, bypassing NOR rules and the logs.
    pub fn load(&mut self, address: Address, bytes: &[u8]) {
        let start = address as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn load_word(&mut self, address: Address, word: u32) {
        self.load(address, &word.to_le_bytes());
    }

    pub fn bytes(&self, address: Address, len: usize) -> &[u8] {
        let start = address as usize;
        &self.data[start..start + len]
    }

    /// Every erase call, failed ones included, by start address.
    pub fn erases(&self) -> &[Address] {
        &self.erase_log
    }

    /// Every program call, failed ones included, by address.
    pub fn programs(&self) -> &[Address] {
        &self.program_log
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<(), MemFlashError> {
        match (offset as usize).checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(MemFlashError::Driver(NorFlashErrorKind::OutOfBounds)),
        }
    }
}

impl ErrorType for MemFlash {
    type Error = MemFlashError;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.check_range(offset, bytes.len())?;
        bytes.copy_from_slice(self.bytes(offset, bytes.len()));
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let call = self.erase_calls;
        self.erase_calls += 1;
        self.erase_log.push(from);

        if from % PAGE_SIZE != 0 || to % PAGE_SIZE != 0 || to < from {
            return Err(MemFlashError::Driver(NorFlashErrorKind::NotAligned));
        }
        self.check_range(from, (to - from) as usize)?;
        if self.erase_fault.hits(call) {
            return Err(MemFlashError::Injected);
        }
        self.data[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let call = self.program_calls;
        self.program_calls += 1;
        self.program_log.push(offset);

        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(MemFlashError::Driver(NorFlashErrorKind::NotAligned));
        }
        self.check_range(offset, bytes.len())?;
        if self.program_fault.hits(call) {
            return Err(MemFlashError::Injected);
        }
        let start = offset as usize;
        for (dst, src) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *dst &= *src;
        }
        Ok(())
    }
}

/// Deterministic, non-repeating-looking test image.
pub fn test_image(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).rotate_left(7) as u8)
        .collect()
}

/// CRC-32 with no reflection and no complement, seed all ones.
pub fn image_crc(bytes: &[u8]) -> u32 {
    crc::Crc::<u32>::new(&crc::CRC_32_MPEG_2).checksum(bytes)
}

/// Stage `image` in Storage with its end marker and the given expected checksum.
pub fn stage(flash: &mut MemFlash, map: &RegionMap, image: &[u8], checksum: u32) {
    flash.load(map.storage.start, image);
    flash.load_word(map.storage.end_marker, map.run_base + image.len() as u32);
    flash.load_word(map.storage.checksum, checksum);
}

/// Stage `image` with a correct checksum.
pub fn stage_valid(flash: &mut MemFlash, map: &RegionMap, image: &[u8]) {
    assert_eq!(image.len() % 4, 0);
    stage(flash, map, image, image_crc(image));
}

/// Unwind payload raised by the never-returning doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Entered,
    Panicked,
}

#[derive(Default)]
pub struct RecordingEntry {
    pub calls: usize,
}

impl FirmwareEntry for RecordingEntry {
    fn transfer_control(&mut self) -> ! {
        self.calls += 1;
        std::panic::resume_unwind(Box::new(Halt::Entered))
    }
}

#[derive(Default)]
pub struct RecordingPanic {
    pub signals: Vec<BootStatus>,
}

impl PanicSignal for RecordingPanic {
    fn signal(&mut self, reason: BootStatus) -> ! {
        self.signals.push(reason);
        std::panic::resume_unwind(Box::new(Halt::Panicked))
    }
}
