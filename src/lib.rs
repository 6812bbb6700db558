#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod error;
pub mod platform;
pub mod raw;

mod directory;
mod erase;
mod read;
mod write;

pub use directory::LogBounds;
pub use erase::{EraseAll, EraseProgress};
pub use raw::At45db;
pub use read::LogReader;
pub use write::LogWriter;

use crate::error::Error;
use crate::platform::{PageIo, Platform};

/// Magic value in the first four bytes of the metadata page. Its presence
/// certifies that the on-flash page layout matches this engine; change it if
/// (and only if) the low-level format changes.
pub const LOG_FORMAT: u32 = 0x2812_2011;

/// Every data page leads with its log's file number and the page's ordinal
/// within the log, both big-endian u16. The directory is reconstructed from
/// nothing but these markers.
pub(crate) const PAGE_HEADER_SIZE: u16 = 4;

/// The log engine: one storage device, many sequential logging sessions.
///
/// A volume hands out at most one cursor at a time ([`LogWriter`] or
/// [`LogReader`] borrow it mutably), which is what makes the single-writer,
/// single-reader contract of the two shared staging buffers hold by
/// construction. `file_number`/`file_page` are the live counters stamped into
/// each page header; after power loss they are re-derived by scanning, not
/// restored from RAM.
pub struct LogVolume<P: Platform> {
    pub(crate) io: P,
    pub(crate) overwrite: bool,
    pub(crate) file_number: u16,
    pub(crate) file_page: u16,
}

impl<P: Platform> LogVolume<P> {
    /// Wrap an initialized chip. With `overwrite` set, a full device wraps the
    /// write cursor back to page 1 and recycles the oldest pages; without it,
    /// writing stops at the last page and reports [`Error::StorageFull`].
    pub fn new(io: P, overwrite: bool) -> Self {
        Self {
            io,
            overwrite,
            file_number: 1,
            file_page: 1,
        }
    }

    /// False when device probing saw no recognizable chip. All cursor and
    /// directory operations refuse with [`Error::DeviceAbsent`] in that state.
    pub fn is_present(&self) -> bool {
        self.io.num_pages() != 0
    }

    pub fn num_pages(&self) -> u16 {
        self.io.num_pages()
    }

    pub fn page_size(&self) -> u16 {
        self.io.page_size()
    }

    /// File number stamped into pages by the current/next write session.
    pub fn file_number(&self) -> u16 {
        self.file_number
    }

    /// Ordinal of the page the write cursor is filling, 1-based within its log.
    pub fn file_page(&self) -> u16 {
        self.file_page
    }

    /// Override the session counters, e.g. to append to an existing log after
    /// a controlled restart. [`Self::start_new_log`] manages them otherwise.
    pub fn set_file_number(&mut self, file_number: u16) {
        self.file_number = file_number;
        self.file_page = 1;
    }

    pub fn into_inner(self) -> P {
        self.io
    }

    pub(crate) fn metadata_page(&self) -> u16 {
        self.io.num_pages() + 1
    }

    pub(crate) fn ensure_present(&self) -> Result<(), Error> {
        if self.io.num_pages() == 0 {
            return Err(Error::DeviceAbsent);
        }
        Ok(())
    }

    pub(crate) fn check_page(&self, page: u16) -> Result<(), Error> {
        if page < 1 || page > self.io.num_pages() {
            return Err(Error::InvalidPage);
        }
        Ok(())
    }
}
