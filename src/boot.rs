//! Retry controller and boot decision.

use crate::checksum::{validate_image, ChecksumEngine};
use crate::copy::copy_image;
use crate::error::{AttemptFailure, AttemptOutcome, LayoutError};
use crate::flash::NonVolatileMemory;
use crate::fmt::{error, info, warn};
use crate::layout::RegionMap;

/// Externally observable state of one bootloader invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStatus {
    #[default]
    Unknown,
    /// The Run image was installed and validated
    Success,
    /// Retries exhausted; the only failure code ever signalled
    CopyError,
}

/// Retry controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attempt {
    /// Running attempt number `n`, counted from zero
    Attempting(u8),
    Succeeded,
    PanicState,
}

impl Attempt {
    /// Next state after the outcome of the current attempt.
    ///
    /// Terminal states stay where they are.
    pub fn next(self, outcome: &AttemptOutcome, max_retries: u8) -> Self {
        match (self, outcome) {
            (Attempt::Attempting(_), Ok(())) => Attempt::Succeeded,
            (Attempt::Attempting(n), Err(_)) if n < max_retries => Attempt::Attempting(n + 1),
            (Attempt::Attempting(_), Err(_)) => Attempt::PanicState,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Attempt::Attempting(_))
    }
}

/// Signals permanent failure, e.g. by blinking an indicator forever.
pub trait PanicSignal {
    fn signal(&mut self, reason: BootStatus) -> !;
}

/// Hands execution to the validated Run image.
pub trait FirmwareEntry {
    fn transfer_control(&mut self) -> !;
}

/// Summary of [`Bootloader::prepare_boot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootReport {
    pub status: BootStatus,
    /// Attempts started, including the last one
    pub attempts: u16,
    /// Cause of the most recent failed attempt
    pub last_failure: Option<AttemptFailure>,
    /// Whether the Storage marker page was erased after success
    pub marker_invalidated: bool,
}

/// Copies the staged Storage image into Run, validates it and decides what to boot.
///
/// Not reentrant. Nothing else may touch either region while it runs.
pub struct Bootloader<'a, N, C> {
    map: &'a RegionMap,
    nvm: &'a mut N,
    engine: &'a mut C,
}

impl<'a, N: NonVolatileMemory, C: ChecksumEngine> Bootloader<'a, N, C> {
    pub fn new(map: &'a RegionMap, nvm: &'a mut N, engine: &'a mut C) -> Result<Self, LayoutError> {
        map.validate()?;
        Ok(Self { map, nvm, engine })
    }

    /// One full copy-and-validate pass, starting from byte zero.
    ///
    /// The markers are read fresh every time.
    pub fn run_one_attempt(&mut self) -> AttemptOutcome {
        let marker = self.map.storage.end_marker;
        let end = self
            .nvm
            .read_word(marker)
            .map_err(|_| AttemptFailure::ReadFailed { address: marker })?;
        let image_len = self.map.image_length(end)?;

        let stats = copy_image(&mut *self.nvm, self.map, image_len)?;
        info!(
            "copied {} words, erased {} pages",
            stats.words_written,
            stats.pages_erased
        );

        validate_image(&mut *self.nvm, &mut *self.engine, self.map, image_len)
    }

    /// Run attempts until one succeeds or the retry budget is spent.
    ///
    /// On success the Storage marker page is erased so the staged image is
    /// not applied again. A failure of that erase is logged and otherwise
    /// ignored: the Run image is already validated.
    pub fn prepare_boot(&mut self) -> BootReport {
        let max_retries = self.map.max_retries;
        let mut report = BootReport {
            status: BootStatus::Unknown,
            attempts: 0,
            last_failure: None,
            marker_invalidated: false,
        };

        let mut state = Attempt::Attempting(0);
        while let Attempt::Attempting(n) = state {
            info!("attempt {} of {}", n as u16 + 1, max_retries as u16 + 1);
            report.attempts += 1;

            let outcome = self.run_one_attempt();
            if let Err(failure) = outcome {
                warn!("attempt {} failed: {:?}", n as u16 + 1, failure);
                report.last_failure = Some(failure);
            }
            state = state.next(&outcome, max_retries);
        }

        match state {
            Attempt::Succeeded => {
                report.status = BootStatus::Success;
                report.marker_invalidated = self.invalidate_storage();
            }
            _ => {
                error!("giving up after {} attempts", report.attempts);
                report.status = BootStatus::CopyError;
            }
        }
        report
    }

    /// Prepare, then either enter the Run image or signal `CopyError` forever.
    pub fn boot<E: FirmwareEntry, P: PanicSignal>(mut self, entry: &mut E, panic: &mut P) -> ! {
        let report = self.prepare_boot();
        match report.status {
            BootStatus::Success => {
                info!("booting run image");
                entry.transfer_control()
            }
            _ => panic.signal(BootStatus::CopyError),
        }
    }

    fn invalidate_storage(&mut self) -> bool {
        let storage = &self.map.storage;
        let page = storage.page_of(storage.signature);
        match self.nvm.erase_page(page, storage.page_size) {
            Ok(()) => true,
            Err(_) => {
                warn!("could not erase storage marker page {:#x}", page);
                false
            }
        }
    }
}
