use crate::error::Error;
use crate::platform::{PageIo, Platform};
use crate::raw::BufferId;
use crate::{LogVolume, PAGE_HEADER_SIZE};
#[cfg(feature = "defmt")]
use defmt::trace;

impl<P: Platform> LogVolume<P> {
    /// Open a sequential write session at `page`. The session stamps the
    /// volume's current file number into every page it touches; use
    /// [`Self::start_new_log`] to begin a fresh numbered log instead of
    /// writing at an explicit address.
    pub fn start_write(&mut self, page: u16) -> Result<LogWriter<'_, P>, Error> {
        self.ensure_present()?;
        self.check_page(page)?;

        #[cfg(feature = "defmt")]
        trace!("start_write: page {} file {}", page, self.file_number);

        self.io.wait_ready()?;
        let mut writer = LogWriter {
            vol: self,
            buffer: BufferId::B1,
            page,
            offset: PAGE_HEADER_SIZE,
            stopped: false,
        };
        writer.stamp_header()?;
        Ok(writer)
    }
}

/// Sequential write cursor. Fills one staging buffer; when a page boundary is
/// crossed the full buffer is committed to flash without waiting and the other
/// buffer takes over, so the page-program latency is hidden behind the next
/// page's worth of writes. Call [`LogWriter::finish`] to make the final
/// partial page durable; a dropped writer loses it.
pub struct LogWriter<'a, P: Platform> {
    vol: &'a mut LogVolume<P>,
    buffer: BufferId,
    page: u16,
    offset: u16,
    stopped: bool,
}

impl<P: Platform> LogWriter<'_, P> {
    /// Flash page the cursor is currently filling.
    pub fn page(&self) -> u16 {
        self.page
    }

    pub fn file_number(&self) -> u16 {
        self.vol.file_number
    }

    pub fn file_page(&self) -> u16 {
        self.vol.file_page
    }

    fn stamp_header(&mut self) -> Result<(), Error> {
        let file_number = self.vol.file_number;
        let file_page = self.vol.file_page;
        self.vol
            .io
            .buffer_write(self.buffer, 0, (file_number >> 8) as u8)?;
        self.vol.io.buffer_write(self.buffer, 1, file_number as u8)?;
        self.vol
            .io
            .buffer_write(self.buffer, 2, (file_page >> 8) as u8)?;
        self.vol.io.buffer_write(self.buffer, 3, file_page as u8)?;
        Ok(())
    }

    /// Commit the filled buffer and move the cursor to the next page. The
    /// program runs in the background while the swapped-in buffer is stamped
    /// and refilled.
    fn commit_and_advance(&mut self) -> Result<(), Error> {
        self.vol.io.buffer_to_page(self.buffer, self.page, false)?;

        if self.page >= self.vol.io.num_pages() {
            if !self.vol.overwrite {
                self.stopped = true;
                return Ok(());
            }
            self.page = 1;
        } else {
            self.page += 1;
        }

        self.buffer = self.buffer.other();
        self.offset = PAGE_HEADER_SIZE;
        self.vol.file_page = self.vol.file_page.wrapping_add(1);
        self.stamp_header()
    }

    pub fn write_u8(&mut self, data: u8) -> Result<(), Error> {
        if self.stopped {
            return Err(Error::StorageFull);
        }
        self.vol.io.buffer_write(self.buffer, self.offset, data)?;
        self.offset += 1;
        if self.offset >= self.vol.io.page_size() {
            self.commit_and_advance()?;
        }
        Ok(())
    }

    pub fn write_u16(&mut self, data: u16) -> Result<(), Error> {
        self.write_u8((data >> 8) as u8)?;
        self.write_u8(data as u8)
    }

    pub fn write_u32(&mut self, data: u32) -> Result<(), Error> {
        self.write_u8((data >> 24) as u8)?;
        self.write_u8((data >> 16) as u8)?;
        self.write_u8((data >> 8) as u8)?;
        self.write_u8(data as u8)
    }

    pub fn write_i16(&mut self, data: i16) -> Result<(), Error> {
        self.write_u16(data as u16)
    }

    pub fn write_i32(&mut self, data: i32) -> Result<(), Error> {
        self.write_u32(data as u32)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        for &byte in data {
            self.write_u8(byte)?;
        }
        Ok(())
    }

    /// Commit the last partial page, waiting for the program to complete so
    /// the session is durable before the cursor is released.
    pub fn finish(self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("finish: page {} stopped={}", self.page, self.stopped);

        if self.stopped {
            // the final full page was already committed when the cursor halted
            return self.vol.io.wait_ready();
        }
        self.vol.io.buffer_to_page(self.buffer, self.page, true)
    }
}
