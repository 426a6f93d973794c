//! Non-volatile memory access used by the copy engine and validator.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::Address;

/// Blocking word-level access to the flash holding both regions.
///
/// Every call waits for the hardware to report completion. Status is
/// success or failure only.
pub trait NonVolatileMemory {
    type Error;

    /// Read one little-endian word.
    fn read_word(&mut self, address: Address) -> Result<u32, Self::Error>;

    /// Erase `page_size` bytes starting at the page-aligned `address`.
    fn erase_page(&mut self, address: Address, page_size: u32) -> Result<(), Self::Error>;

    /// Program `data` at the word-aligned `address`.
    fn program(&mut self, address: Address, data: &[u8]) -> Result<(), Self::Error>;
}

impl<F: NorFlash> NonVolatileMemory for F {
    type Error = F::Error;

    fn read_word(&mut self, address: Address) -> Result<u32, Self::Error> {
        let mut word = [0u8; 4];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    fn erase_page(&mut self, address: Address, page_size: u32) -> Result<(), Self::Error> {
        self.erase(address, address + page_size)
    }

    fn program(&mut self, address: Address, data: &[u8]) -> Result<(), Self::Error> {
        self.write(address, data)
    }
}
