//! Word-by-word transfer of the staged image from Storage to Run.

use crate::error::AttemptFailure;
use crate::flash::NonVolatileMemory;
use crate::fmt::{error, trace};
use crate::layout::{copy_words, RegionMap};
use crate::WORD_SIZE;

/// What one successful pass of the copy engine did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CopyStats {
    pub words_written: u32,
    pub pages_erased: u32,
}

/// Copy `image_len / 4 + 1` words from the start of Storage to the start of Run.
///
/// A Run page is erased when the first word landing in it is about to be
/// written; the destination walks forward so no page is erased twice. The
/// first failure aborts the pass and nothing is rolled back.
pub fn copy_image<N: NonVolatileMemory>(
    nvm: &mut N,
    map: &RegionMap,
    image_len: u32,
) -> Result<CopyStats, AttemptFailure> {
    let page_size = map.run.page_size;
    let mut stats = CopyStats::default();

    for i in 0..copy_words(image_len) {
        let offset = i * WORD_SIZE;
        let dst = map.run.start + offset;
        let src = map.storage.start + offset;

        if dst % page_size == 0 {
            trace!("erasing run page {:#x}", dst);
            nvm.erase_page(dst, page_size).map_err(|_| {
                error!("erase failed at {:#x}", dst);
                AttemptFailure::EraseFailed { address: dst }
            })?;
            stats.pages_erased += 1;
        }

        let word = nvm
            .read_word(src)
            .map_err(|_| AttemptFailure::ReadFailed { address: src })?;

        nvm.program(dst, &word.to_le_bytes()).map_err(|_| {
            error!("program failed at {:#x}", dst);
            AttemptFailure::ProgramFailed { address: dst }
        })?;

        if map.verify_writes {
            let readback = nvm
                .read_word(dst)
                .map_err(|_| AttemptFailure::ReadFailed { address: dst })?;
            if readback != word {
                error!("readback mismatch at {:#x}", dst);
                return Err(AttemptFailure::ProgramFailed { address: dst });
            }
        }
        stats.words_written += 1;
    }

    Ok(stats)
}
