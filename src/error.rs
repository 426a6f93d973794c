use crate::Address;

/// Why a single copy-and-validate attempt did not succeed.
///
/// Every variant is retryable: the retry controller restarts the whole
/// attempt from byte zero, and once the retries are used up all of them
/// collapse into [`BootStatus::CopyError`](crate::BootStatus::CopyError).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttemptFailure {
    #[error("erase failed for page at {address:#010x}")]
    EraseFailed { address: Address },
    #[error("program failed at {address:#010x}")]
    ProgramFailed { address: Address },
    #[error("read failed at {address:#010x}")]
    ReadFailed { address: Address },
    /// The end marker does not describe an image that fits both regions.
    #[error("image length {length:#x} does not fit the region map")]
    LengthOutOfRange { length: u32 },
    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("checksum engine rejected the image configuration")]
    EngineRejected,
}

/// Result of one attempt. `Ok(())` is the success outcome.
pub type AttemptOutcome = Result<(), AttemptFailure>;

/// Region map rejected by [`RegionMap::validate`](crate::RegionMap::validate).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    #[error("page size {0:#x} is not a power of two multiple of the word size")]
    BadPageSize(u32),
    #[error("address {0:#010x} is not word aligned")]
    Misaligned(Address),
    #[error("run region start {0:#010x} is not page aligned")]
    RunNotPageAligned(Address),
    #[error("region {start:#010x}..{end:#010x} is empty or inverted")]
    EmptyRegion { start: Address, end: Address },
    #[error("marker {0:#010x} lies outside its region")]
    MarkerOutOfRegion(Address),
    #[error("storage and run regions overlap")]
    Overlap,
}

/// A checksum engine refused a configuration.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChecksumError {
    #[error("polynomial not supported by this engine")]
    UnsupportedPolynomial,
    #[error("input and output reflection must match")]
    UnsupportedReflection,
    #[error("engine used before configuration")]
    NotConfigured,
}
