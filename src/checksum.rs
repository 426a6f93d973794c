//! Integrity validation of the installed image.

use crc::{Crc, Digest, CRC_32_JAMCRC, CRC_32_MPEG_2};

use crate::error::{AttemptFailure, AttemptOutcome, ChecksumError};
use crate::flash::NonVolatileMemory;
use crate::fmt::{debug, warn};
use crate::layout::RegionMap;
use crate::{Address, WORD_SIZE};

/// Operating-mode word the CRC peripheral requires after configuration.
pub const CRC_MODE: u32 = 0x36;

/// Generator polynomials a CRC peripheral typically offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polynomial {
    CrcCcitt,
    Crc16,
    Crc32,
}

impl Polynomial {
    pub const fn generator(self) -> u32 {
        match self {
            Polynomial::CrcCcitt => 0x1021,
            Polynomial::Crc16 => 0x8005,
            Polynomial::Crc32 => 0x04C1_1DB7,
        }
    }
}

/// Full configuration handed to a [`ChecksumEngine`] before each computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChecksumConfig {
    pub polynomial: Polynomial,
    pub reflect_in: bool,
    pub reflect_out: bool,
    pub complement_in: bool,
    pub complement_out: bool,
    pub seed: u32,
    pub mode: u32,
}

impl ChecksumConfig {
    /// The fixed configuration images are checked with: CRC-32, seed all
    /// ones, no reflection and no complement.
    pub const IMAGE: Self = Self {
        polynomial: Polynomial::Crc32,
        reflect_in: false,
        reflect_out: false,
        complement_in: false,
        complement_out: false,
        seed: 0xFFFF_FFFF,
        mode: CRC_MODE,
    };
}

/// A CRC unit, hardware or software.
///
/// State never carries over: callers reset and configure before every
/// computation.
pub trait ChecksumEngine {
    type Error;

    fn reset(&mut self);

    fn configure(&mut self, config: &ChecksumConfig) -> Result<(), Self::Error>;

    fn feed(&mut self, data: &[u8]);

    /// Final value of the running computation. The engine must be
    /// reconfigured before it is used again.
    fn result(&mut self) -> u32;
}

static CRC32_RAW: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);
static CRC32_REFLECTED: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

/// Table-driven software engine for the CRC-32 generator.
///
/// Reflection must be symmetric. The mode word is accepted and ignored;
/// it only means something to the peripheral.
#[derive(Default)]
pub struct SoftCrc {
    config: Option<ChecksumConfig>,
    digest: Option<Digest<'static, u32>>,
}

impl SoftCrc {
    pub const fn new() -> Self {
        Self {
            config: None,
            digest: None,
        }
    }
}

impl ChecksumEngine for SoftCrc {
    type Error = ChecksumError;

    fn reset(&mut self) {
        self.config = None;
        self.digest = None;
    }

    fn configure(&mut self, config: &ChecksumConfig) -> Result<(), Self::Error> {
        if config.polynomial != Polynomial::Crc32 {
            return Err(ChecksumError::UnsupportedPolynomial);
        }
        let crc = match (config.reflect_in, config.reflect_out) {
            (false, false) => &CRC32_RAW,
            (true, true) => &CRC32_REFLECTED,
            _ => return Err(ChecksumError::UnsupportedReflection),
        };
        self.digest = Some(crc.digest_with_initial(config.seed));
        self.config = Some(*config);
        Ok(())
    }

    fn feed(&mut self, data: &[u8]) {
        let (Some(config), Some(digest)) = (&self.config, &mut self.digest) else {
            warn!("crc fed before configuration, {} bytes dropped", data.len());
            return;
        };
        if !config.complement_in {
            digest.update(data);
            return;
        }
        let mut buf = [0u8; 32];
        for chunk in data.chunks(buf.len()) {
            for (dst, src) in buf.iter_mut().zip(chunk) {
                *dst = !*src;
            }
            digest.update(&buf[..chunk.len()]);
        }
    }

    fn result(&mut self) -> u32 {
        let complement_out = self.config.is_some_and(|c| c.complement_out);
        match self.digest.take() {
            Some(digest) if complement_out => !digest.finalize(),
            Some(digest) => digest.finalize(),
            None => {
                warn!("crc result read before configuration");
                0
            }
        }
    }
}

const CHUNK_WORDS: usize = 16;

/// Checksum `len` bytes of flash starting at `start`, with [`ChecksumConfig::IMAGE`].
///
/// A trailing partial word is read whole and truncated to `len`.
pub fn checksum_range<N, C>(
    nvm: &mut N,
    engine: &mut C,
    start: Address,
    len: u32,
) -> Result<u32, AttemptFailure>
where
    N: NonVolatileMemory,
    C: ChecksumEngine,
{
    engine.reset();
    engine
        .configure(&ChecksumConfig::IMAGE)
        .map_err(|_| AttemptFailure::EngineRejected)?;

    let mut buf = [0u8; CHUNK_WORDS * WORD_SIZE as usize];
    let mut offset = 0;
    while offset < len {
        let chunk = (len - offset).min(buf.len() as u32) as usize;
        for (i, word) in buf[..chunk].chunks_mut(WORD_SIZE as usize).enumerate() {
            let address = start + offset + (i as u32) * WORD_SIZE;
            let value = nvm
                .read_word(address)
                .map_err(|_| AttemptFailure::ReadFailed { address })?;
            word.copy_from_slice(&value.to_le_bytes()[..word.len()]);
        }
        engine.feed(&buf[..chunk]);
        offset += chunk as u32;
    }
    Ok(engine.result())
}

/// Compare the checksum of the freshly installed Run image with the one
/// recorded in Storage.
pub fn validate_image<N, C>(
    nvm: &mut N,
    engine: &mut C,
    map: &RegionMap,
    image_len: u32,
) -> AttemptOutcome
where
    N: NonVolatileMemory,
    C: ChecksumEngine,
{
    let expected = nvm
        .read_word(map.storage.checksum)
        .map_err(|_| AttemptFailure::ReadFailed {
            address: map.storage.checksum,
        })?;
    let actual = checksum_range(nvm, engine, map.run.signature, image_len)?;
    debug!("checksum expected {:#x} computed {:#x}", expected, actual);
    if actual != expected {
        return Err(AttemptFailure::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
