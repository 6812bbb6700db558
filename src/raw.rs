use crate::error::Error;
use crate::platform::{Clock, PageIo, Transport};
#[cfg(feature = "defmt")]
use defmt::trace;

// AT45DB command set (datasheet opcodes; values are fixed by the chip)
pub const TRANSFER_PAGE_TO_BUFFER_1: u8 = 0x53;
pub const TRANSFER_PAGE_TO_BUFFER_2: u8 = 0x55;
pub const STATUS_REGISTER_READ: u8 = 0xD7;
pub const READ_MANUFACTURER_AND_DEVICE_ID: u8 = 0x9F;
pub const PAGE_READ: u8 = 0xD2;
pub const BUFFER_1_READ: u8 = 0xD4;
pub const BUFFER_2_READ: u8 = 0xD6;
pub const BUFFER_1_WRITE: u8 = 0x84;
pub const BUFFER_2_WRITE: u8 = 0x87;
pub const BUFFER_1_TO_PAGE_WITH_ERASE: u8 = 0x83;
pub const BUFFER_2_TO_PAGE_WITH_ERASE: u8 = 0x86;
pub const PAGE_ERASE: u8 = 0x81;
pub const BLOCK_ERASE: u8 = 0x50;
pub const SECTOR_ERASE: u8 = 0x7C;
/// Chip erase is the only multi-byte opcode: all four bytes in one frame.
pub const CHIP_ERASE: [u8; 4] = [0xC7, 0x94, 0x80, 0x9A];

/// Status register: ready/busy bit.
pub const STATUS_READY: u8 = 0x80;
/// Status register: set when the device is configured for 512-byte pages.
pub const STATUS_PAGE_SIZE_512: u8 = 0x01;

// Attempt budget for one ready wait. A page program finishes in a handful of
// milliseconds; at bus speed this budget is orders of magnitude past that, so
// exhausting it means the chip is gone, not slow.
pub(crate) const MAX_READY_POLLS: u32 = 100_000;

/// One of the two on-chip staging buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferId {
    B1,
    B2,
}

impl BufferId {
    pub fn other(self) -> Self {
        match self {
            BufferId::B1 => BufferId::B2,
            BufferId::B2 => BufferId::B1,
        }
    }
}

/// Density code carried in bits 8..13 of the device ID word.
#[derive(strum::FromRepr, strum::Display, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Density {
    Mbit16 = 0x6,
    Mbit32 = 0x7,
}

impl Density {
    /// Data pages available to the log engine. One page below the chip total:
    /// the top page is reserved for volume metadata.
    pub fn usable_pages(self) -> u16 {
        match self {
            Density::Mbit16 => 4095,
            Density::Mbit32 => 8191,
        }
    }
}

/// Manufacturer and device identifiers as read by [`READ_MANUFACTURER_AND_DEVICE_ID`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId {
    pub manufacturer: u8,
    pub device: u16,
}

impl DeviceId {
    pub fn density(self) -> Option<Density> {
        Density::from_repr(((self.device >> 8) & 0x1F) as u8)
    }

    /// Usable pages for the recognized density, 0 for anything else. An absent
    /// chip reads as all ones and lands in the 0 case.
    pub fn usable_pages(self) -> u16 {
        self.density().map_or(0, Density::usable_pages)
    }
}

/// Driver for the AT45DB161/AT45DB321 family behind an injected [`Transport`].
///
/// `init` probes the page size from the status register and the page count
/// from the device density; both are fixed for the life of the session.
pub struct At45db<T: Transport> {
    bus: T,
    page_size: u16,
    num_pages: u16,
    id: DeviceId,
}

impl<T: Transport> At45db<T> {
    pub fn init(bus: T) -> Result<Self, Error> {
        let mut chip = Self {
            bus,
            page_size: 0,
            num_pages: 0,
            id: DeviceId {
                manufacturer: 0,
                device: 0,
            },
        };

        // Page size select bit: 1 => 512-byte pages, 0 => factory 528.
        let status = chip.read_status_reg();
        chip.page_size = 528 - (((status & STATUS_PAGE_SIZE_512) as u16) << 4);

        chip.id = chip.read_manufacturer_id()?;
        chip.num_pages = chip.id.usable_pages();

        #[cfg(feature = "defmt")]
        trace!(
            "at45db init: page_size={} num_pages={}",
            chip.page_size, chip.num_pages
        );

        Ok(chip)
    }

    /// Hand the bus back, e.g. to share it with another device after logging.
    pub fn release(self) -> T {
        self.bus
    }

    /// Toggle chip select to reset the command decoder before a new opcode.
    fn reframe(&mut self) {
        self.bus.deselect();
        self.bus.select();
    }

    /// Two address bytes plus one don't-care byte. The shift pair depends on
    /// the page size: (7,1) for 512-byte pages, (6,2) for 528. Chip protocol,
    /// reproduced bit-exact.
    fn send_page_addr(&mut self, page: u16) {
        if self.page_size == 512 {
            self.bus.transfer_byte((page >> 7) as u8);
            self.bus.transfer_byte((page << 1) as u8);
        } else {
            self.bus.transfer_byte((page >> 6) as u8);
            self.bus.transfer_byte((page << 2) as u8);
        }
        self.bus.transfer_byte(0x00);
    }

    /// Don't-care byte plus the 16-bit in-buffer offset.
    fn send_buffer_addr(&mut self, offset: u16) {
        self.bus.transfer_byte(0x00);
        self.bus.transfer_byte((offset >> 8) as u8);
        self.bus.transfer_byte(offset as u8);
    }

    fn read_status_reg(&mut self) -> u8 {
        self.reframe();
        self.bus.transfer_byte(STATUS_REGISTER_READ);
        self.bus.transfer_byte(0x00)
    }
}

impl<T: Transport> PageIo for At45db<T> {
    fn page_size(&self) -> u16 {
        self.page_size
    }

    fn num_pages(&self) -> u16 {
        self.num_pages
    }

    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn read_manufacturer_id(&mut self) -> Result<DeviceId, Error> {
        self.reframe();
        self.bus.transfer_byte(READ_MANUFACTURER_AND_DEVICE_ID);
        let manufacturer = self.bus.transfer_byte(0xFF);
        let hi = self.bus.transfer_byte(0xFF);
        let lo = self.bus.transfer_byte(0xFF);
        self.bus.transfer_byte(0xFF);
        Ok(DeviceId {
            manufacturer,
            device: ((hi as u16) << 8) | lo as u16,
        })
    }

    fn page_to_buffer(&mut self, buffer: BufferId, page: u16) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("page_to_buffer: {} <- page {}", buffer, page);

        self.wait_ready()?;
        self.reframe();
        self.bus.transfer_byte(match buffer {
            BufferId::B1 => TRANSFER_PAGE_TO_BUFFER_1,
            BufferId::B2 => TRANSFER_PAGE_TO_BUFFER_2,
        });
        self.send_page_addr(page);
        // deselect edge starts the transfer
        self.reframe();
        self.wait_ready()
    }

    fn buffer_to_page(&mut self, buffer: BufferId, page: u16, wait: bool) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("buffer_to_page: {} -> page {} wait={}", buffer, page, wait);

        self.wait_ready()?;
        self.reframe();
        self.bus.transfer_byte(match buffer {
            BufferId::B1 => BUFFER_1_TO_PAGE_WITH_ERASE,
            BufferId::B2 => BUFFER_2_TO_PAGE_WITH_ERASE,
        });
        self.send_page_addr(page);
        self.reframe();
        if wait {
            self.wait_ready()?;
        }
        Ok(())
    }

    fn buffer_write(&mut self, buffer: BufferId, offset: u16, data: u8) -> Result<(), Error> {
        self.reframe();
        self.bus.transfer_byte(match buffer {
            BufferId::B1 => BUFFER_1_WRITE,
            BufferId::B2 => BUFFER_2_WRITE,
        });
        self.send_buffer_addr(offset);
        self.bus.transfer_byte(data);
        Ok(())
    }

    fn buffer_read(&mut self, buffer: BufferId, offset: u16) -> Result<u8, Error> {
        self.reframe();
        self.bus.transfer_byte(match buffer {
            BufferId::B1 => BUFFER_1_READ,
            BufferId::B2 => BUFFER_2_READ,
        });
        self.send_buffer_addr(offset);
        // one extra don't-care byte before data clocks out
        self.bus.transfer_byte(0x00);
        Ok(self.bus.transfer_byte(0x00))
    }

    fn page_erase(&mut self, page: u16) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("page_erase: page {}", page);

        self.wait_ready()?;
        self.reframe();
        self.bus.transfer_byte(PAGE_ERASE);
        self.send_page_addr(page);
        self.reframe();
        self.wait_ready()
    }

    fn chip_erase(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("chip_erase");

        self.wait_ready()?;
        self.reframe();
        for byte in CHIP_ERASE {
            self.bus.transfer_byte(byte);
        }
        self.reframe();
        self.wait_ready()
    }

    fn read_status(&mut self) -> Result<bool, Error> {
        Ok(self.read_status_reg() & STATUS_READY != 0)
    }

    fn wait_ready(&mut self) -> Result<(), Error> {
        for _ in 0..MAX_READY_POLLS {
            if self.read_status_reg() & STATUS_READY != 0 {
                return Ok(());
            }
        }
        Err(Error::DeviceUnresponsive)
    }
}

impl<T: Transport> Clock for At45db<T> {
    fn millis(&self) -> u32 {
        self.bus.millis()
    }
}
