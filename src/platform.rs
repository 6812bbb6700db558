use crate::error::Error;
use crate::raw::{BufferId, DeviceId};

/// Byte-level bus access to the storage chip, as wired on a given board.
/// See README.md for an example implementation.
///
/// The engine assumes nothing about the bus beyond full-duplex byte exchange,
/// a chip-select line, and a millisecond tick for progress reporting. Commands
/// are delimited by `select`/`deselect` edges; a deselect/select toggle resets
/// the chip's command decoder.
pub trait Transport {
    /// Clock one byte out and return the byte clocked in.
    fn transfer_byte(&mut self, byte: u8) -> u8;

    /// Assert chip select.
    fn select(&mut self);

    /// Deassert chip select. On transfer and erase opcodes this edge is what
    /// starts the operation inside the chip.
    fn deselect(&mut self);

    /// Free-running millisecond counter; wrapping is fine.
    fn millis(&self) -> u32;
}

impl<T: Transport> Transport for &mut T {
    fn transfer_byte(&mut self, byte: u8) -> u8 {
        (**self).transfer_byte(byte)
    }

    fn select(&mut self) {
        (**self).select()
    }

    fn deselect(&mut self) {
        (**self).deselect()
    }

    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

/// Millisecond time source the engine uses for erase-progress events.
pub trait Clock {
    fn millis(&self) -> u32;
}

/// Page and staging-buffer operations of one DataFlash chip family.
///
/// One implementation exists per chip family; the cursor and directory layers
/// depend only on this trait. All operations that issue a program or transfer
/// command wait for the chip to be ready *before* issuing it, so callers never
/// race a previous command on the same buffer. `buffer_to_page` with
/// `wait = false` is the only call that returns while the chip is still busy:
/// the caller may keep filling the other buffer in the meantime.
pub trait PageIo {
    /// Page size in bytes, 512 or 528, probed at init and fixed thereafter.
    fn page_size(&self) -> u16;

    /// Usable data pages, addressed `1..=num_pages`. The next page up holds
    /// volume metadata. Zero means no device was recognized.
    fn num_pages(&self) -> u16;

    /// Identifiers captured during init.
    fn device_id(&self) -> DeviceId;

    /// Re-read manufacturer and device identifiers from the chip.
    fn read_manufacturer_id(&mut self) -> Result<DeviceId, Error>;

    /// Copy a full page from flash into a staging buffer; blocks until done.
    fn page_to_buffer(&mut self, buffer: BufferId, page: u16) -> Result<(), Error>;

    /// Program a staging buffer into flash at `page`, erasing it first. With
    /// `wait = false` this returns as soon as the command is issued.
    fn buffer_to_page(&mut self, buffer: BufferId, page: u16, wait: bool) -> Result<(), Error>;

    /// Write one byte into a staging buffer. Legal while the chip is busy
    /// programming out of the *other* buffer.
    fn buffer_write(&mut self, buffer: BufferId, offset: u16, data: u8) -> Result<(), Error>;

    /// Read one byte back from a staging buffer.
    fn buffer_read(&mut self, buffer: BufferId, offset: u16) -> Result<u8, Error>;

    /// Erase a single page; blocks until done.
    fn page_erase(&mut self, page: u16) -> Result<(), Error>;

    /// Erase the whole chip; blocks until done.
    fn chip_erase(&mut self) -> Result<(), Error>;

    /// One status poll: true when the chip reports ready.
    fn read_status(&mut self) -> Result<bool, Error>;

    /// Poll the status register until ready, up to a fixed attempt budget,
    /// then fail with [`Error::DeviceUnresponsive`].
    fn wait_ready(&mut self) -> Result<(), Error>;
}

/// Everything the log engine needs from the board: chip page I/O plus a clock.
pub trait Platform: PageIo + Clock {}

impl<T: PageIo + Clock> Platform for T {}
