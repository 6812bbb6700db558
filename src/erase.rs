use crate::error::Error;
use crate::platform::{Clock, PageIo, Platform};
use crate::raw::BufferId;
use crate::{LOG_FORMAT, LogVolume};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Pages erased per progress event.
const ERASE_BATCH_PAGES: u16 = 8;

impl<P: Platform> LogVolume<P> {
    /// True when the metadata page does not carry the current format marker:
    /// a factory-fresh chip, a device formatted by older firmware, or an
    /// interrupted bulk erase. Logging on such a device requires
    /// [`Self::erase_all`] (or [`Self::erase_chip`]) first.
    pub fn need_erase(&mut self) -> Result<bool, Error> {
        self.ensure_present()?;
        Ok(self.read_format()? != LOG_FORMAT)
    }

    fn read_format(&mut self) -> Result<u32, Error> {
        let page = self.metadata_page();
        self.io.page_to_buffer(BufferId::B1, page)?;
        let mut value = 0u32;
        for offset in 0..4 {
            value = (value << 8) | self.io.buffer_read(BufferId::B1, offset)? as u32;
        }
        Ok(value)
    }

    /// Stamp the format marker into the freshly erased metadata page and
    /// reset the session counters. Read-modify-write through buffer 1 so the
    /// reserved remainder of the page is preserved.
    fn finish_erase(&mut self) -> Result<(), Error> {
        let page = self.metadata_page();
        self.io.page_to_buffer(BufferId::B1, page)?;
        for (offset, byte) in LOG_FORMAT.to_be_bytes().into_iter().enumerate() {
            self.io.buffer_write(BufferId::B1, offset as u16, byte)?;
        }
        self.io.buffer_to_page(BufferId::B1, page, true)?;
        self.set_file_number(1);
        Ok(())
    }

    /// Erase every page including the metadata page, then write the current
    /// format marker. Cooperative: each iterator step erases one batch and
    /// yields a progress event, so the caller can keep a UI or watchdog fed
    /// during the multi-second sweep. Abandoning the iterator leaves the
    /// device with [`Self::need_erase`] still true.
    pub fn erase_all(&mut self) -> Result<EraseAll<'_, P>, Error> {
        self.ensure_present()?;
        let total_pages = self.metadata_page();
        let started_ms = self.io.millis();
        Ok(EraseAll {
            vol: self,
            next_page: 1,
            total_pages,
            started_ms,
            done: false,
        })
    }

    /// Single chip-erase command plus the format marker rewrite. Faster than
    /// the page-by-page sweep but opaque: no progress until the chip returns.
    pub fn erase_chip(&mut self) -> Result<(), Error> {
        self.ensure_present()?;

        #[cfg(feature = "defmt")]
        trace!("erase_chip");

        self.io.chip_erase()?;
        self.finish_erase()
    }
}

/// Progress of a bulk erase.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseProgress {
    pub pages_erased: u16,
    pub total_pages: u16,
    pub elapsed_ms: u32,
}

/// Cooperative bulk erase, produced by [`LogVolume::erase_all`].
pub struct EraseAll<'a, P: Platform> {
    vol: &'a mut LogVolume<P>,
    next_page: u16,
    total_pages: u16,
    started_ms: u32,
    done: bool,
}

impl<P: Platform> Iterator for EraseAll<'_, P> {
    type Item = Result<EraseProgress, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let batch_end = self
            .next_page
            .saturating_add(ERASE_BATCH_PAGES - 1)
            .min(self.total_pages);
        for page in self.next_page..=batch_end {
            if let Err(e) = self.vol.io.page_erase(page) {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.next_page = batch_end + 1;

        if self.next_page > self.total_pages {
            self.done = true;
            if let Err(e) = self.vol.finish_erase() {
                return Some(Err(e));
            }
        }

        Some(Ok(EraseProgress {
            pages_erased: batch_end,
            total_pages: self.total_pages,
            elapsed_ms: self.vol.io.millis().wrapping_sub(self.started_ms),
        }))
    }
}
