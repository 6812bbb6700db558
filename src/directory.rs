use crate::error::Error;
use crate::platform::{PageIo, Platform};
use crate::raw::BufferId;
use crate::{LogVolume, LogWriter};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Marker stamped into the first four bytes of every data page.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct PageMarker {
    pub(crate) file_number: u16,
    pub(crate) file_page: u16,
}

impl PageMarker {
    /// Erased flash reads all ones; no real log ever gets number 0xFFFF.
    fn is_erased(self) -> bool {
        self.file_number == u16::MAX
    }

    /// Scan key: strictly increasing along write order, 0 for erased pages.
    fn key(self) -> u32 {
        if self.is_erased() {
            0
        } else {
            ((self.file_number as u32) << 16) | self.file_page as u32
        }
    }
}

/// First and last page of one log. `start > end` is a valid state: the log
/// wraps past the end of storage and continues from page 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogBounds {
    pub start: u16,
    pub end: u16,
}

// The directory has no index on flash and keeps none in RAM: every query is a
// forward scan over the page markers, pages 1..=num_pages in address order.
// Ties on the scan key (possible only after a torn write) resolve to the
// lowest page address, which makes every query deterministic after a crash.
impl<P: Platform> LogVolume<P> {
    pub(crate) fn read_page_marker(&mut self, page: u16) -> Result<PageMarker, Error> {
        self.io.page_to_buffer(BufferId::B1, page)?;
        let hi = self.io.buffer_read(BufferId::B1, 0)?;
        let lo = self.io.buffer_read(BufferId::B1, 1)?;
        let file_number = ((hi as u16) << 8) | lo as u16;
        let hi = self.io.buffer_read(BufferId::B1, 2)?;
        let lo = self.io.buffer_read(BufferId::B1, 3)?;
        let file_page = ((hi as u16) << 8) | lo as u16;
        Ok(PageMarker {
            file_number,
            file_page,
        })
    }

    /// Highest-keyed written page on the device, i.e. the page the last write
    /// session touched most recently. `None` on a fully erased device.
    pub fn find_last_page(&mut self) -> Result<Option<u16>, Error> {
        self.ensure_present()?;

        let mut best: Option<(u32, u16)> = None;
        for page in 1..=self.io.num_pages() {
            let key = self.read_page_marker(page)?.key();
            if key == 0 {
                continue;
            }
            if best.is_none_or(|(best_key, _)| key > best_key) {
                best = Some((key, page));
            }
        }

        #[cfg(feature = "debug-logs")]
        println!("directory: find_last_page -> {best:?}");

        Ok(best.map(|(_, page)| page))
    }

    /// File number of the most recent log, `None` on an empty device.
    pub fn find_last_log(&mut self) -> Result<Option<u16>, Error> {
        match self.find_last_page()? {
            None => Ok(None),
            Some(page) => Ok(Some(self.read_page_marker(page)?.file_number)),
        }
    }

    /// Last page of the log numbered `log_number`: the page carrying its
    /// highest in-log ordinal. `None` if no page carries that number.
    pub fn find_last_page_of_log(&mut self, log_number: u16) -> Result<Option<u16>, Error> {
        self.ensure_present()?;

        let mut best: Option<(u16, u16)> = None;
        for page in 1..=self.io.num_pages() {
            let marker = self.read_page_marker(page)?;
            if marker.is_erased() || marker.file_number != log_number {
                continue;
            }
            if best.is_none_or(|(best_ordinal, _)| marker.file_page > best_ordinal) {
                best = Some((marker.file_page, page));
            }
        }
        Ok(best.map(|(_, page)| page))
    }

    /// Count of distinct logs with at least one page on flash. File numbers
    /// are assigned contiguously, so this is the span between the lowest and
    /// highest numbers observed.
    pub fn get_num_logs(&mut self) -> Result<u16, Error> {
        self.ensure_present()?;

        let mut range: Option<(u16, u16)> = None;
        for page in 1..=self.io.num_pages() {
            let marker = self.read_page_marker(page)?;
            if marker.is_erased() {
                continue;
            }
            range = Some(match range {
                None => (marker.file_number, marker.file_number),
                Some((min, max)) => (min.min(marker.file_number), max.max(marker.file_number)),
            });
        }
        Ok(range.map_or(0, |(min, max)| max - min + 1))
    }

    /// A log's page range. The start is the page after the previous log's
    /// end; for the oldest log on a wrapped device that is the page after the
    /// newest written page, since everything before it has been recycled.
    pub fn get_log_boundaries(&mut self, log_number: u16) -> Result<LogBounds, Error> {
        let end = self
            .find_last_page_of_log(log_number)?
            .ok_or(Error::LogNotFound)?;

        let previous = match log_number.checked_sub(1) {
            Some(n) if n >= 1 => self.find_last_page_of_log(n)?,
            _ => None,
        };

        let start = match previous {
            Some(prev_end) => self.next_data_page(prev_end),
            None => {
                if self.check_wrapped()? {
                    // oldest surviving log; its intact tail begins right
                    // after the write head
                    match self.find_last_page()? {
                        Some(last) => self.next_data_page(last),
                        None => 1,
                    }
                } else {
                    1
                }
            }
        };

        #[cfg(feature = "debug-logs")]
        println!("directory: boundaries of log {log_number}: {start}..={end}");

        Ok(LogBounds { start, end })
    }

    /// True once the device has filled to its last data page at least once,
    /// meaning wraparound may have truncated the oldest log.
    pub fn check_wrapped(&mut self) -> Result<bool, Error> {
        self.ensure_present()?;
        let last = self.io.num_pages();
        Ok(!self.read_page_marker(last)?.is_erased())
    }

    /// Allocate the next file number and open a write session on the page
    /// after the most recent one. On a device that is full with overwrite
    /// disabled this reports [`Error::StorageFull`] instead of recycling.
    pub fn start_new_log(&mut self) -> Result<LogWriter<'_, P>, Error> {
        self.ensure_present()?;

        let (file_number, page) = match self.find_last_page()? {
            None => (1, 1),
            Some(last_page) => {
                let marker = self.read_page_marker(last_page)?;
                // 0xFFFF is the erased marker; restart numbering if the
                // counter ever gets there
                let next_number = match marker.file_number {
                    n if n >= u16::MAX - 1 => 1,
                    n => n + 1,
                };
                let next_page = if last_page >= self.io.num_pages() {
                    if !self.overwrite {
                        return Err(Error::StorageFull);
                    }
                    1
                } else {
                    last_page + 1
                };
                (next_number, next_page)
            }
        };

        #[cfg(feature = "defmt")]
        trace!("start_new_log: file {} at page {}", file_number, page);

        self.set_file_number(file_number);
        self.start_write(page)
    }

    fn next_data_page(&self, page: u16) -> u16 {
        if page >= self.io.num_pages() { 1 } else { page + 1 }
    }
}
