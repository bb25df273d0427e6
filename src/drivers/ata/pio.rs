use bit_field::BitField;
use bitflags::bitflags;
use core::fmt;

use crate::drivers::block::{BlockDevice, DiskError, DiskResult, SECTOR_SIZE};
use crate::port::PortIo;

// ──────────────────────────────────────────────────────────────
//  ATA PIO port offsets (relative to io_base)
// ──────────────────────────────────────────────────────────────

const DATA_REG: u16        = 0; // R/W data (16-bit)
const ERROR_REG: u16       = 1; // R: error / W: features
const SECTOR_COUNT: u16    = 2;
const LBA_LOW: u16         = 3;
const LBA_MID: u16         = 4;
const LBA_HIGH: u16        = 5;
const DRIVE_HEAD: u16      = 6;
const CMD_STATUS: u16      = 7; // R: status / W: command

// ATA commands
const CMD_READ_SECTORS: u8  = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_IDENTIFY: u8      = 0xEC;

bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaStatus: u8 {
        const ERR = 0x01;
        const DRQ = 0x08;
        const DF  = 0x20;
        const RDY = 0x40;
        const BSY = 0x80;
    }
}

// ──────────────────────────────────────────────────────────────
//  IDENTIFY data
// ──────────────────────────────────────────────────────────────

/// Geometry and identity reported by IDENTIFY DEVICE.
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    pub model: [u8; 40],
    pub sectors: u32,
    pub logical_sector_size: u16,
    pub physical_sector_size: u16,
}

impl DeviceInfo {
    fn parse(raw: &[u16; 256]) -> DeviceInfo {
        // Model string, words 27-46, two ASCII bytes per word, high byte first.
        let mut model = [0u8; 40];
        for i in 0..20 {
            let word = raw[27 + i];
            model[i * 2] = (word >> 8) as u8;
            model[i * 2 + 1] = (word & 0xFF) as u8;
        }

        // Total 28-bit addressable sectors, words 60-61.
        let sectors = ((raw[61] as u32) << 16) | raw[60] as u32;

        let mut logical_sector_size: u16 = 512;
        let mut physical_sector_size: u16 = 512;

        // Word 106 carries the logical sector size only while bit 15 is clear.
        let word106 = raw[106];
        if !word106.get_bit(15) && word106 != 0 {
            logical_sector_size = word106;
        }

        // ATA8 words 117/118 take precedence when they hold a usable value.
        let word117 = raw[117];
        if word117 != 0 && word117 != 0xFFFF {
            logical_sector_size = word117;
        }
        let word118 = raw[118];
        if word118 != 0 && word118 != 0xFFFF {
            physical_sector_size = word118;
        }

        DeviceInfo {
            model,
            sectors,
            logical_sector_size,
            physical_sector_size,
        }
    }

    /// Model string with the vendor's trailing space padding removed.
    pub fn model(&self) -> &str {
        core::str::from_utf8(&self.model).unwrap_or("").trim_end()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({} sectors, {}B logical / {}B physical)",
            self.model(),
            self.sectors,
            self.logical_sector_size,
            self.physical_sector_size
        )
    }
}

// ──────────────────────────────────────────────────────────────
//  ATA Device
// ──────────────────────────────────────────────────────────────

pub struct AtaDevice<P: PortIo> {
    ports: P,
    io_base: u16,
    ctrl_base: u16,
    is_master: bool,
    pub detected: bool,
    info: Option<DeviceInfo>,
}

impl<P: PortIo> AtaDevice<P> {
    pub fn new(ports: P, io_base: u16, ctrl_base: u16, is_master: bool) -> Self {
        AtaDevice {
            ports,
            io_base,
            ctrl_base,
            is_master,
            detected: false,
            info: None,
        }
    }

    /// IDENTIFY data from the last successful probe.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    // ── Port I/O helpers ─────────────────────────────────────

    fn read_reg(&mut self, offset: u16) -> u8 {
        self.ports.inb(self.io_base + offset)
    }

    fn write_reg(&mut self, offset: u16, val: u8) {
        self.ports.outb(self.io_base + offset, val)
    }

    fn read_data16(&mut self) -> u16 {
        self.ports.inw(self.io_base + DATA_REG)
    }

    fn write_data16(&mut self, val: u16) {
        self.ports.outw(self.io_base + DATA_REG, val)
    }

    fn read_ctrl(&mut self) -> u8 {
        self.ports.inb(self.ctrl_base)
    }

    fn status(&mut self) -> AtaStatus {
        AtaStatus::from_bits_retain(self.read_reg(CMD_STATUS))
    }

    // ── Status polling ───────────────────────────────────────

    /// Wait until BSY bit clears. Returns Err on timeout.
    fn wait_bsy(&mut self) -> DiskResult<()> {
        for _ in 0..100_000 {
            if !self.status().contains(AtaStatus::BSY) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(DiskError::BusyTimeout)
    }

    /// Wait until DRQ is set (data ready). Checks for errors.
    fn wait_drq(&mut self) -> DiskResult<()> {
        for _ in 0..100_000 {
            let status = self.status();
            if status.intersects(AtaStatus::ERR | AtaStatus::DF) {
                return Err(DiskError::DeviceFault);
            }
            if status.contains(AtaStatus::DRQ) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(DiskError::DrqTimeout)
    }

    /// Perform the 400ns delay by reading the alternate status register 4 times.
    fn delay_400ns(&mut self) {
        for _ in 0..4 {
            let _ = self.read_ctrl();
        }
    }

    /// Select drive (master or slave).
    fn select_drive(&mut self) {
        let val = if self.is_master { 0xA0 } else { 0xB0 };
        self.write_reg(DRIVE_HEAD, val);
        self.delay_400ns();
    }

    // ── IDENTIFY ─────────────────────────────────────────────

    /// Probe the drive slot. Sets `detected` and caches the parsed info.
    pub fn identify(&mut self) -> DiskResult<DeviceInfo> {
        self.select_drive();
        self.write_reg(SECTOR_COUNT, 0);
        self.write_reg(LBA_LOW, 0);
        self.write_reg(LBA_MID, 0);
        self.write_reg(LBA_HIGH, 0);
        self.write_reg(CMD_STATUS, CMD_IDENTIFY);

        // Status of 0 means the slot is empty.
        if self.status().is_empty() {
            return Err(DiskError::NoDevice);
        }

        self.wait_bsy()?;

        // ATAPI and SATA devices park a signature in LBA mid/high.
        let mid = self.read_reg(LBA_MID);
        let high = self.read_reg(LBA_HIGH);
        if mid != 0 || high != 0 {
            return Err(DiskError::NoDevice);
        }

        self.wait_drq()?;

        let mut raw = [0u16; 256];
        for word in raw.iter_mut() {
            *word = self.read_data16();
        }

        let info = DeviceInfo::parse(&raw);
        self.detected = true;
        self.info = Some(info);
        Ok(info)
    }

    // ── READ SECTOR (LBA28) ─────────────────────────────────

    /// Read one 512-byte sector at the given LBA.
    pub fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()> {
        if !self.detected {
            return Err(DiskError::NoDevice);
        }

        self.wait_bsy()?;
        self.setup_lba28(lba);
        self.write_reg(CMD_STATUS, CMD_READ_SECTORS);

        self.wait_drq()?;

        // 256 words, low byte first.
        for i in 0..SECTOR_SIZE / 2 {
            let word = self.read_data16();
            buf[i * 2] = (word & 0xFF) as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }

        Ok(())
    }

    // ── WRITE SECTOR (LBA28) ────────────────────────────────

    /// Write one 512-byte sector at the given LBA.
    pub fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()> {
        if !self.detected {
            return Err(DiskError::NoDevice);
        }

        self.wait_bsy()?;
        self.setup_lba28(lba);
        self.write_reg(CMD_STATUS, CMD_WRITE_SECTORS);

        self.wait_drq()?;

        for i in 0..SECTOR_SIZE / 2 {
            let word = (buf[i * 2] as u16) | ((buf[i * 2 + 1] as u16) << 8);
            self.write_data16(word);
        }

        // The drive raises BSY while it commits the sector.
        self.wait_bsy()?;

        Ok(())
    }

    /// Program drive select plus the 28-bit LBA and a one-sector count.
    fn setup_lba28(&mut self, lba: u32) {
        let head = if self.is_master { 0xE0 } else { 0xF0 };
        self.write_reg(DRIVE_HEAD, head | ((lba >> 24) as u8 & 0x0F));
        self.delay_400ns();

        self.write_reg(ERROR_REG, 0); // features = 0
        self.write_reg(SECTOR_COUNT, 1);
        self.write_reg(LBA_LOW, lba as u8);
        self.write_reg(LBA_MID, (lba >> 8) as u8);
        self.write_reg(LBA_HIGH, (lba >> 16) as u8);
    }
}

impl<P: PortIo> BlockDevice for AtaDevice<P> {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()> {
        AtaDevice::read_sector(self, lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()> {
        AtaDevice::write_sector(self, lba, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    const IO: u16 = 0x1F0;
    const CTRL: u16 = 0x3F6;

    /// Scripted drive on the primary channel. Commands arm the data FIFO and
    /// the status byte; register writes are logged for protocol assertions.
    struct ScriptedDrive {
        present: bool,
        status: u8,
        lba_mid: u8,
        lba_high: u8,
        fail_reads: bool,
        identify: [u16; 256],
        sector: [u8; SECTOR_SIZE],
        data: VecDeque<u16>,
        written_words: Vec<u16>,
        reg_writes: Vec<(u16, u8)>,
    }

    impl ScriptedDrive {
        fn new() -> ScriptedDrive {
            ScriptedDrive {
                present: true,
                status: AtaStatus::RDY.bits(),
                lba_mid: 0,
                lba_high: 0,
                fail_reads: false,
                identify: [0u16; 256],
                sector: [0u8; SECTOR_SIZE],
                data: VecDeque::new(),
                written_words: Vec::new(),
                reg_writes: Vec::new(),
            }
        }

        fn start_command(&mut self, cmd: u8) {
            match cmd {
                CMD_IDENTIFY => {
                    self.data = self.identify.iter().copied().collect();
                    self.status = (AtaStatus::RDY | AtaStatus::DRQ).bits();
                }
                CMD_READ_SECTORS => {
                    if self.fail_reads {
                        self.status = (AtaStatus::RDY | AtaStatus::ERR).bits();
                        return;
                    }
                    self.data = self
                        .sector
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    self.status = (AtaStatus::RDY | AtaStatus::DRQ).bits();
                }
                CMD_WRITE_SECTORS => {
                    self.status = (AtaStatus::RDY | AtaStatus::DRQ).bits();
                }
                _ => {}
            }
        }
    }

    impl PortIo for ScriptedDrive {
        fn inb(&mut self, port: u16) -> u8 {
            if !self.present {
                return 0;
            }
            match port {
                p if p == IO + CMD_STATUS || p == CTRL => self.status,
                p if p == IO + LBA_MID => self.lba_mid,
                p if p == IO + LBA_HIGH => self.lba_high,
                _ => 0,
            }
        }

        fn outb(&mut self, port: u16, value: u8) {
            self.reg_writes.push((port, value));
            if self.present && port == IO + CMD_STATUS {
                self.start_command(value);
            }
        }

        fn inw(&mut self, port: u16) -> u16 {
            if port != IO + DATA_REG {
                return 0;
            }
            match self.data.pop_front() {
                Some(word) => {
                    if self.data.is_empty() {
                        self.status = AtaStatus::RDY.bits();
                    }
                    word
                }
                None => 0,
            }
        }

        fn outw(&mut self, port: u16, value: u16) {
            if port == IO + DATA_REG {
                self.written_words.push(value);
            }
        }
    }

    fn identify_words(model: &str, sectors: u32) -> [u16; 256] {
        let mut words = [0u16; 256];
        let mut bytes = [b' '; 40];
        bytes[..model.len()].copy_from_slice(model.as_bytes());
        for i in 0..20 {
            words[27 + i] = ((bytes[i * 2] as u16) << 8) | bytes[i * 2 + 1] as u16;
        }
        words[60] = sectors as u16;
        words[61] = (sectors >> 16) as u16;
        words
    }

    #[test]
    fn identify_reports_missing_device() {
        let mut fake = ScriptedDrive::new();
        fake.present = false;
        let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
        assert!(matches!(dev.identify(), Err(DiskError::NoDevice)));
    }

    #[test]
    fn identify_rejects_packet_signature() {
        let mut fake = ScriptedDrive::new();
        fake.lba_mid = 0x14;
        fake.lba_high = 0xEB;
        let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
        assert!(matches!(dev.identify(), Err(DiskError::NoDevice)));
    }

    #[test]
    fn identify_parses_model_and_geometry() {
        let mut fake = ScriptedDrive::new();
        fake.identify = identify_words("QEMU HARDDISK", 0x0012_ABCD);
        fake.identify[106] = 0x0200; // bit 15 clear, 512-byte logical sectors
        fake.identify[117] = 0xFFFF; // invalid, must be ignored
        fake.identify[118] = 0x1000; // 4096-byte physical sectors

        let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
        let info = dev.identify().unwrap();

        assert_eq!(info.model(), "QEMU HARDDISK");
        assert_eq!(info.sectors, 0x0012_ABCD);
        assert_eq!(info.logical_sector_size, 512);
        assert_eq!(info.physical_sector_size, 4096);
        assert!(dev.detected);
        assert_eq!(dev.info().unwrap().sectors, 0x0012_ABCD);

        assert_eq!(fake.reg_writes[0], (IO + DRIVE_HEAD, 0xA0));
        assert_eq!(*fake.reg_writes.last().unwrap(), (IO + CMD_STATUS, CMD_IDENTIFY));
    }

    #[test]
    fn read_sector_programs_lba28_registers() {
        let mut fake = ScriptedDrive::new();
        for (i, byte) in fake.sector.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }

        let mut buf = [0u8; SECTOR_SIZE];
        {
            let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
            dev.detected = true;
            dev.read_sector(0x0A12_3456, &mut buf).unwrap();
        }

        for (i, byte) in buf.iter().enumerate() {
            assert_eq!(*byte, (i % 251) as u8);
        }
        assert_eq!(
            fake.reg_writes,
            [
                (IO + DRIVE_HEAD, 0xE0 | 0x0A),
                (IO + ERROR_REG, 0),
                (IO + SECTOR_COUNT, 1),
                (IO + LBA_LOW, 0x56),
                (IO + LBA_MID, 0x34),
                (IO + LBA_HIGH, 0x12),
                (IO + CMD_STATUS, CMD_READ_SECTORS),
            ]
        );
    }

    #[test]
    fn write_sector_transfers_words_low_byte_first() {
        let mut fake = ScriptedDrive::new();
        let mut buf = [0u8; SECTOR_SIZE];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = (i / 2) as u8;
        }

        {
            let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
            dev.detected = true;
            dev.write_sector(9, &buf).unwrap();
        }

        assert_eq!(fake.written_words.len(), SECTOR_SIZE / 2);
        for (i, word) in fake.written_words.iter().enumerate() {
            let expected = u16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]);
            assert_eq!(*word, expected);
        }
        assert!(fake.reg_writes.contains(&(IO + CMD_STATUS, CMD_WRITE_SECTORS)));
    }

    #[test]
    fn read_rejects_unidentified_drive() {
        let mut fake = ScriptedDrive::new();
        let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(matches!(
            dev.read_sector(0, &mut buf),
            Err(DiskError::NoDevice)
        ));
    }

    #[test]
    fn error_status_aborts_transfer() {
        let mut fake = ScriptedDrive::new();
        fake.fail_reads = true;
        let mut dev = AtaDevice::new(&mut fake, IO, CTRL, true);
        dev.detected = true;
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(matches!(
            dev.read_sector(0, &mut buf),
            Err(DiskError::DeviceFault)
        ));
    }

    #[test]
    fn slave_select_uses_high_nibble() {
        let mut fake = ScriptedDrive::new();
        {
            let mut dev = AtaDevice::new(&mut fake, IO, CTRL, false);
            dev.detected = true;
            let mut buf = [0u8; SECTOR_SIZE];
            let _ = dev.read_sector(1, &mut buf);
        }
        assert_eq!(fake.reg_writes[0], (IO + DRIVE_HEAD, 0xF0));
    }
}
