use crate::error::Error;
use crate::platform::{PageIo, Platform};
use crate::raw::BufferId;
use crate::{LogVolume, PAGE_HEADER_SIZE};

impl<P: Platform> LogVolume<P> {
    /// Open a sequential read session at `page`. The reader advances across
    /// page boundaries on its own, wrapping past the end of storage; it is the
    /// caller's job to stop at the bounds reported by
    /// [`Self::get_log_boundaries`].
    pub fn start_read(&mut self, page: u16) -> Result<LogReader<'_, P>, Error> {
        self.ensure_present()?;
        self.check_page(page)?;

        let mut reader = LogReader {
            vol: self,
            buffer: BufferId::B1,
            page,
            offset: PAGE_HEADER_SIZE,
            file_number: 0,
            file_page: 0,
        };
        reader.load_page(page)?;
        Ok(reader)
    }
}

/// Sequential read cursor. Reads go through one staging buffer; each page's
/// directory marker is parsed on load and exposed so callers can tell when
/// they have run off the end of a log.
pub struct LogReader<'a, P: Platform> {
    vol: &'a mut LogVolume<P>,
    buffer: BufferId,
    page: u16,
    offset: u16,
    file_number: u16,
    file_page: u16,
}

impl<P: Platform> LogReader<'_, P> {
    /// Flash page the cursor is currently reading.
    pub fn page(&self) -> u16 {
        self.page
    }

    /// File number from the current page's marker; 0xFFFF on an erased page.
    pub fn file_number(&self) -> u16 {
        self.file_number
    }

    /// This page's 1-based ordinal within its log.
    pub fn file_page(&self) -> u16 {
        self.file_page
    }

    fn load_page(&mut self, page: u16) -> Result<(), Error> {
        self.vol.io.page_to_buffer(self.buffer, page)?;
        let hi = self.vol.io.buffer_read(self.buffer, 0)?;
        let lo = self.vol.io.buffer_read(self.buffer, 1)?;
        self.file_number = ((hi as u16) << 8) | lo as u16;
        let hi = self.vol.io.buffer_read(self.buffer, 2)?;
        let lo = self.vol.io.buffer_read(self.buffer, 3)?;
        self.file_page = ((hi as u16) << 8) | lo as u16;
        self.page = page;
        self.offset = PAGE_HEADER_SIZE;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let data = self.vol.io.buffer_read(self.buffer, self.offset)?;
        self.offset += 1;
        if self.offset >= self.vol.io.page_size() {
            let next = if self.page >= self.vol.io.num_pages() {
                1
            } else {
                self.page + 1
            };
            self.load_page(next)?;
        }
        Ok(data)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(((hi as u16) << 8) | lo as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.read_u8()? as u32;
        }
        Ok(value)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), Error> {
        for byte in out {
            *byte = self.read_u8()?;
        }
        Ok(())
    }
}
