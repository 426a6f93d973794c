//! Static description of the Storage and Run regions.
//!
//! Nothing in here touches flash. The map is built once per invocation,
//! validated, and then only read.

use crate::error::{AttemptFailure, LayoutError};
use crate::{Address, WORD_SIZE};

/// Retry budget used when the board does not pick one.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// A contiguous range of non-volatile memory holding an image plus its markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    /// First byte of the image area
    pub start: Address,
    /// One past the last byte of the region
    pub end: Address,
    /// Word holding the absolute end address of the staged image
    pub end_marker: Address,
    /// Word holding the expected checksum of the image
    pub checksum: Address,
    /// Start-of-copy marker
    pub signature: Address,
    /// Smallest erasable unit, in bytes
    pub page_size: u32,
}

impl Region {
    /// A region whose markers all sit at `start`. Use the `with_*` methods to place them.
    pub const fn new(start: Address, end: Address, page_size: u32) -> Self {
        Self {
            start,
            end,
            end_marker: start,
            checksum: start,
            signature: start,
            page_size,
        }
    }

    pub const fn with_end_marker(mut self, address: Address) -> Self {
        self.end_marker = address;
        self
    }

    pub const fn with_checksum(mut self, address: Address) -> Self {
        self.checksum = address;
        self
    }

    pub const fn with_signature(mut self, address: Address) -> Self {
        self.signature = address;
        self
    }

    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end
    }

    /// Start of the page containing `address`.
    pub const fn page_of(&self, address: Address) -> Address {
        address & !(self.page_size - 1)
    }

    fn validate(&self) -> Result<(), LayoutError> {
        if self.page_size < WORD_SIZE || !self.page_size.is_power_of_two() {
            return Err(LayoutError::BadPageSize(self.page_size));
        }
        if self.end <= self.start {
            return Err(LayoutError::EmptyRegion {
                start: self.start,
                end: self.end,
            });
        }
        for address in [self.start, self.end, self.end_marker, self.checksum, self.signature] {
            if address % WORD_SIZE != 0 {
                return Err(LayoutError::Misaligned(address));
            }
        }
        for marker in [self.end_marker, self.checksum, self.signature] {
            if !self.contains(marker) {
                return Err(LayoutError::MarkerOutOfRegion(marker));
            }
        }
        Ok(())
    }
}

/// Everything the bootloader needs to know about the flash layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionMap {
    /// Where the staged image is read from
    pub storage: Region,
    /// Where the image is installed and executed
    pub run: Region,
    /// Link address the end marker value is relative to
    pub run_base: Address,
    /// Bytes at the tail of the image excluded from the length (e.g. a trailing checksum word)
    pub trailer_len: u32,
    /// Failed attempts tolerated before giving up
    pub max_retries: u8,
    /// Read back every programmed word
    pub verify_writes: bool,
}

impl RegionMap {
    pub const fn new(storage: Region, run: Region) -> Self {
        Self {
            storage,
            run,
            run_base: run.start,
            trailer_len: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            verify_writes: false,
        }
    }

    pub const fn with_run_base(mut self, run_base: Address) -> Self {
        self.run_base = run_base;
        self
    }

    pub const fn with_trailer_len(mut self, trailer_len: u32) -> Self {
        self.trailer_len = trailer_len;
        self
    }

    pub const fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub const fn with_verify_writes(mut self, verify_writes: bool) -> Self {
        self.verify_writes = verify_writes;
        self
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        self.storage.validate()?;
        self.run.validate()?;
        if self.run.start % self.run.page_size != 0 {
            return Err(LayoutError::RunNotPageAligned(self.run.start));
        }
        if self.storage.start < self.run.end && self.run.start < self.storage.end {
            return Err(LayoutError::Overlap);
        }
        Ok(())
    }

    /// Derive the image length from the value read at the Storage end marker.
    ///
    /// The result is rounded up to a whole word. The copy writes one word
    /// past it, so that extra word must fit in both regions as well.
    pub fn image_length(&self, end_marker_value: u32) -> Result<u32, AttemptFailure> {
        let raw = end_marker_value
            .checked_sub(self.run_base)
            .and_then(|len| len.checked_sub(self.trailer_len))
            .ok_or(AttemptFailure::LengthOutOfRange {
                length: end_marker_value,
            })?;
        let length = raw
            .checked_next_multiple_of(WORD_SIZE)
            .ok_or(AttemptFailure::LengthOutOfRange { length: raw })?;

        let span = copy_span(length);
        let fits = |region: &Region| span.is_some_and(|span| span <= region.len());
        if !fits(&self.run) || !fits(&self.storage) {
            return Err(AttemptFailure::LengthOutOfRange { length });
        }
        if self.run.signature.checked_add(length).map_or(true, |end| end > self.run.end) {
            return Err(AttemptFailure::LengthOutOfRange { length });
        }
        Ok(length)
    }
}

/// Number of words the copy engine writes for `image_len` bytes.
pub const fn copy_words(image_len: u32) -> u32 {
    image_len / WORD_SIZE + 1
}

/// Bytes touched by the copy, including the trailing extra word.
fn copy_span(image_len: u32) -> Option<u32> {
    copy_words(image_len).checked_mul(WORD_SIZE)
}
