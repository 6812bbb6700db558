mod common;

mod cursor {
    use crate::common::{self, PAYLOAD_512};
    use at45_datalog::error::Error;
    use at45_datalog::{At45db, LogVolume};
    use pretty_assertions::assert_eq;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn round_trip_across_page_boundary() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        let mut log = volume.start_new_log().unwrap();
        log.write_u8(0xA5).unwrap();
        log.write_i16(-12345).unwrap();
        log.write_u32(0xDEAD_BEEF).unwrap();
        // enough words to roll into page 2 mid-value
        for i in 0..130u32 {
            log.write_u32(i.wrapping_mul(0x0101_0101)).unwrap();
        }
        log.write_i32(-77_000_000).unwrap();
        log.finish().unwrap();

        let mut reader = volume.start_read(1).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0xA5);
        assert_eq!(reader.read_i16().unwrap(), -12345);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        for i in 0..130u32 {
            assert_eq!(reader.read_u32().unwrap(), i.wrapping_mul(0x0101_0101));
        }
        assert_eq!(reader.read_i32().unwrap(), -77_000_000);
        assert_eq!(reader.page(), 2);
    }

    #[test]
    fn six_hundred_bytes_span_two_pages() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        let data = pattern(600);
        let mut log = volume.start_new_log().unwrap();
        log.write_bytes(&data).unwrap();
        assert_eq!(log.page(), 2);
        log.finish().unwrap();

        assert_eq!(volume.get_num_logs().unwrap(), 1);
        let bounds = volume.get_log_boundaries(1).unwrap();
        assert_eq!((bounds.start, bounds.end), (1, 2));

        let mut reader = volume.start_read(bounds.start).unwrap();
        assert_eq!(reader.file_number(), 1);
        assert_eq!(reader.file_page(), 1);
        let mut read_back = vec![0u8; 600];
        reader.read_bytes(&mut read_back).unwrap();
        assert_eq!(read_back, data);
        assert_eq!(reader.page(), 2);
        assert_eq!(reader.file_page(), 2);

        drop(volume);
        // page markers on flash: log 1, ordinals 1 and 2
        assert_eq!(&flash.page(1)[0..4], &[0x00, 0x01, 0x00, 0x01]);
        assert_eq!(&flash.page(2)[0..4], &[0x00, 0x01, 0x00, 0x02]);
        // the rest of the final partial page stays erased
        assert!(flash.page(2)[4 + (600 - PAYLOAD_512)..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn commits_alternate_between_buffers() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        let mut log = volume.start_new_log().unwrap();
        log.write_bytes(&pattern(3 * PAYLOAD_512 + 10)).unwrap();
        log.finish().unwrap();
        drop(volume);

        let commits: Vec<(u8, u16)> = flash
            .ops
            .iter()
            .filter_map(|op| match op {
                common::Op::BufferToPage { buffer, page } => Some((*buffer, *page)),
                _ => None,
            })
            .collect();
        assert_eq!(commits, vec![(1, 1), (2, 2), (1, 3), (2, 4)]);
    }

    #[test]
    fn explicit_write_page_and_counters() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        volume.set_file_number(7);
        assert_eq!(volume.file_number(), 7);
        assert_eq!(volume.file_page(), 1);

        let mut log = volume.start_write(10).unwrap();
        assert_eq!(log.page(), 10);
        log.write_u16(0xBEEF).unwrap();
        log.finish().unwrap();
        drop(volume);

        assert_eq!(&flash.page(10)[0..6], &[0x00, 0x07, 0x00, 0x01, 0xBE, 0xEF]);
    }

    #[test]
    fn cursor_rejects_out_of_range_pages() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        assert_eq!(volume.start_write(0).err(), Some(Error::InvalidPage));
        assert_eq!(
            volume.start_write(common::METADATA_PAGE).err(),
            Some(Error::InvalidPage)
        );
        assert_eq!(volume.start_read(0).err(), Some(Error::InvalidPage));
    }
}

mod directory {
    use crate::common::{self, NUM_PAGES, PAYLOAD_512};
    use at45_datalog::error::Error;
    use at45_datalog::{At45db, LogBounds, LogVolume};
    use pretty_assertions::assert_eq;

    fn write_log(volume: &mut LogVolume<At45db<&mut common::MockFlash>>, len: usize) {
        let data: Vec<u8> = (0..len).map(|i| (i % 239) as u8).collect();
        let mut log = volume.start_new_log().unwrap();
        log.write_bytes(&data).unwrap();
        log.finish().unwrap();
    }

    #[test]
    fn boundaries_after_multiple_logs() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        write_log(&mut volume, 600); // pages 1..=2
        write_log(&mut volume, 1200); // pages 3..=5
        write_log(&mut volume, 40); // page 6

        assert_eq!(volume.get_num_logs().unwrap(), 3);
        assert_eq!(volume.find_last_log().unwrap(), Some(3));
        assert_eq!(volume.find_last_page().unwrap(), Some(6));
        assert_eq!(
            volume.get_log_boundaries(1).unwrap(),
            LogBounds { start: 1, end: 2 }
        );
        assert_eq!(
            volume.get_log_boundaries(2).unwrap(),
            LogBounds { start: 3, end: 5 }
        );
        assert_eq!(
            volume.get_log_boundaries(3).unwrap(),
            LogBounds { start: 6, end: 6 }
        );
        assert_eq!(
            volume.get_log_boundaries(4).err(),
            Some(Error::LogNotFound)
        );
        assert!(!volume.check_wrapped().unwrap());
    }

    #[test]
    fn empty_device_has_no_logs() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        assert_eq!(volume.get_num_logs().unwrap(), 0);
        assert_eq!(volume.find_last_page().unwrap(), None);
        assert_eq!(volume.find_last_log().unwrap(), None);
        assert_eq!(volume.get_log_boundaries(1).err(), Some(Error::LogNotFound));
    }

    #[test]
    fn state_survives_power_cycle() {
        let mut flash = common::MockFlash::new(512);

        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);
        write_log(&mut volume, 600);
        write_log(&mut volume, 600);
        let logs_before = volume.get_num_logs().unwrap();
        let bounds_before = (
            volume.get_log_boundaries(1).unwrap(),
            volume.get_log_boundaries(2).unwrap(),
        );
        drop(volume);

        // power cycle: nothing survives but the flash contents
        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);
        assert_eq!(volume.get_num_logs().unwrap(), logs_before);
        assert_eq!(
            (
                volume.get_log_boundaries(1).unwrap(),
                volume.get_log_boundaries(2).unwrap(),
            ),
            bounds_before
        );

        // numbering continues where the scan says it left off
        let mut log = volume.start_new_log().unwrap();
        assert_eq!(log.file_number(), 3);
        assert_eq!(log.page(), 5);
        log.write_u32(1).unwrap();
        log.finish().unwrap();
        assert_eq!(volume.get_num_logs().unwrap(), 3);
    }

    #[test]
    fn wraparound_recycles_oldest_pages() {
        let mut flash = common::MockFlash::new(512);
        // device filled by log 1 up to the second-to-last page
        for page in 1..=NUM_PAGES - 1 {
            flash.seed_page(page, 1, page);
        }

        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, true);
        assert_eq!(volume.find_last_page().unwrap(), Some(NUM_PAGES - 1));

        let mut log = volume.start_new_log().unwrap();
        assert_eq!(log.file_number(), 2);
        assert_eq!(log.page(), NUM_PAGES);
        log.write_bytes(&vec![0x42; PAYLOAD_512]).unwrap();
        // the cursor wrapped: next page to fill is page 1
        assert_eq!(log.page(), 1);
        assert_eq!(log.file_page(), 2);
        log.write_u32(0xCAFE_BABE).unwrap();
        log.finish().unwrap();

        assert!(volume.check_wrapped().unwrap());
        assert_eq!(volume.get_num_logs().unwrap(), 2);
        // log 2 spans the end of the device and continues on page 1
        assert_eq!(
            volume.get_log_boundaries(2).unwrap(),
            LogBounds {
                start: NUM_PAGES,
                end: 1
            }
        );
        // the oldest log lost its first page to the wrap
        assert_eq!(
            volume.get_log_boundaries(1).unwrap(),
            LogBounds {
                start: 2,
                end: NUM_PAGES - 1
            }
        );

        // reading follows the wrap transparently
        let mut reader = volume.start_read(NUM_PAGES).unwrap();
        let mut filled = vec![0u8; PAYLOAD_512];
        reader.read_bytes(&mut filled).unwrap();
        assert!(filled.iter().all(|&b| b == 0x42));
        assert_eq!(reader.read_u32().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.page(), 1);
        assert_eq!(reader.file_number(), 2);
        assert_eq!(reader.file_page(), 2);

        drop(volume);
        assert_eq!(&flash.page(1)[0..4], &[0x00, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn storage_full_without_overwrite() {
        let mut flash = common::MockFlash::new(512);
        for page in 1..=NUM_PAGES - 2 {
            flash.seed_page(page, 1, page);
        }

        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);

        let mut log = volume.start_new_log().unwrap();
        assert_eq!(log.page(), NUM_PAGES - 1);
        log.write_bytes(&vec![0x11; PAYLOAD_512]).unwrap();
        assert_eq!(log.page(), NUM_PAGES);
        log.write_bytes(&vec![0x22; PAYLOAD_512]).unwrap();
        // the last data page is committed, further writes are refused
        assert_eq!(log.write_u8(0x33).err(), Some(Error::StorageFull));
        log.finish().unwrap();

        drop(volume);
        assert_eq!(&flash.page(NUM_PAGES)[0..4], &[0x00, 0x02, 0x00, 0x02]);
        // no wraparound happened
        assert!(flash.page(1)[0..4].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn start_new_log_refuses_full_device_without_overwrite() {
        let mut flash = common::MockFlash::new(512);
        for page in 1..=NUM_PAGES {
            flash.seed_page(page, 1, page);
        }

        let chip = At45db::init(&mut flash).unwrap();
        let mut volume = LogVolume::new(chip, false);
        assert_eq!(volume.start_new_log().err(), Some(Error::StorageFull));
    }
}

mod device {
    use crate::common;
    use at45_datalog::error::Error;
    use at45_datalog::raw::{self, BufferId, Density};
    use at45_datalog::platform::PageIo;
    use at45_datalog::{At45db, LogVolume};
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_recognizes_density_and_page_size() {
        let mut flash = common::MockFlash::new(512);
        let chip = At45db::init(&mut flash).unwrap();
        assert_eq!(chip.page_size(), 512);
        assert_eq!(chip.num_pages(), common::NUM_PAGES);
        assert_eq!(chip.device_id().manufacturer, 0x1F);
        assert_eq!(chip.device_id().density(), Some(Density::Mbit16));

        let mut flash = common::MockFlash::new(528);
        let chip = At45db::init(&mut flash).unwrap();
        assert_eq!(chip.page_size(), 528);
    }

    #[test]
    fn missing_chip_reads_as_absent() {
        let mut flash = common::MockFlash::absent();
        let chip = At45db::init(&mut flash).unwrap();
        assert_eq!(chip.num_pages(), 0);

        let mut volume = LogVolume::new(chip, false);
        assert!(!volume.is_present());
        assert_eq!(volume.start_write(1).err(), Some(Error::DeviceAbsent));
        assert_eq!(volume.start_read(1).err(), Some(Error::DeviceAbsent));
        assert_eq!(volume.get_num_logs().err(), Some(Error::DeviceAbsent));
        assert_eq!(volume.start_new_log().err(), Some(Error::DeviceAbsent));
        assert_eq!(volume.need_erase().err(), Some(Error::DeviceAbsent));
        assert!(volume.erase_all().is_err());
    }

    #[test]
    fn stuck_busy_chip_is_reported_not_hung() {
        let mut flash = common::MockFlash::new(512);
        flash.set_stuck_busy(true);

        // probing does not wait on the ready bit, so init still works
        let chip = At45db::init(&mut flash).unwrap();
        assert_eq!(chip.num_pages(), common::NUM_PAGES);

        let mut volume = LogVolume::new(chip, false);
        assert_eq!(volume.start_write(1).err(), Some(Error::DeviceUnresponsive));
    }

    #[test]
    fn command_framing_matches_datasheet() {
        let mut flash = common::MockFlash::new(512);
        flash.set_record_frames(true);
        let mut chip = At45db::init(&mut flash).unwrap();

        chip.page_to_buffer(BufferId::B1, 3).unwrap();
        chip.buffer_write(BufferId::B1, 0x0102, 0xAA).unwrap();
        assert_eq!(chip.buffer_read(BufferId::B1, 0x0102).unwrap(), 0xAA);
        chip.page_erase(5).unwrap();
        chip.chip_erase().unwrap();
        drop(chip);

        // 512-byte pages: page address shifted by (7,1), one trailing don't-care
        let expect: &[&[u8]] = &[
            &[raw::TRANSFER_PAGE_TO_BUFFER_1, 0x00, 0x06, 0x00],
            &[raw::BUFFER_1_WRITE, 0x00, 0x01, 0x02, 0xAA],
            &[raw::BUFFER_1_READ, 0x00, 0x01, 0x02, 0x00, 0x00],
            &[raw::PAGE_ERASE, 0x00, 0x0A, 0x00],
            &[0xC7, 0x94, 0x80, 0x9A],
        ];
        for frame in expect {
            assert!(
                flash.frames.iter().any(|f| f == frame),
                "frame {frame:02X?} was never sent"
            );
        }
    }

    #[test]
    fn command_framing_shifts_for_528_byte_pages() {
        let mut flash = common::MockFlash::new(528);
        flash.set_record_frames(true);
        let mut chip = At45db::init(&mut flash).unwrap();
        chip.page_to_buffer(BufferId::B2, 3).unwrap();
        drop(chip);

        // 528-byte pages: page address shifted by (6,2)
        assert!(
            flash
                .frames
                .iter()
                .any(|f| f == &[raw::TRANSFER_PAGE_TO_BUFFER_2, 0x00, 0x0C, 0x00])
        );
    }
}
