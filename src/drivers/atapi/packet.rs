use crate::drivers::ata::AtaStatus;
use crate::drivers::block::{CD_SECTOR_SIZE, DiskError, DiskResult, OpticalDevice};
use crate::port::PortIo;

// ──────────────────────────────────────────────────────────────
//  ATAPI task file offsets (relative to io_base)
// ──────────────────────────────────────────────────────────────

const DATA_REG: u16     = 0;
const FEATURES: u16     = 1; // 0 = PIO transfer
const SECTOR_COUNT: u16 = 2;
const BYTE_COUNT_LO: u16 = 4; // LBA mid carries the byte-count limit
const BYTE_COUNT_HI: u16 = 5; // LBA high carries the byte-count limit
const DRIVE_HEAD: u16   = 6;
const CMD_STATUS: u16   = 7;

const CMD_PACKET: u8 = 0xA0;

// SCSI opcodes carried inside the packet
const SCSI_READ_10: u8       = 0x28;
const SCSI_READ_CAPACITY: u8 = 0x25;

const CDB_LEN: usize = 12;

// ──────────────────────────────────────────────────────────────
//  ATAPI Device
// ──────────────────────────────────────────────────────────────

pub struct AtapiDevice<P: PortIo> {
    ports: P,
    io_base: u16,
    ctrl_base: u16,
    is_master: bool,
}

impl<P: PortIo> AtapiDevice<P> {
    pub fn new(ports: P, io_base: u16, ctrl_base: u16, is_master: bool) -> Self {
        AtapiDevice {
            ports,
            io_base,
            ctrl_base,
            is_master,
        }
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

    fn status(&mut self) -> AtaStatus {
        AtaStatus::from_bits_retain(self.read_reg(CMD_STATUS))
    }

    fn wait_bsy(&mut self) -> DiskResult<()> {
        for _ in 0..100_000 {
            if !self.status().contains(AtaStatus::BSY) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(DiskError::BusyTimeout)
    }

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

    fn delay_400ns(&mut self) {
        for _ in 0..4 {
            let _ = self.ports.inb(self.ctrl_base);
        }
    }

    fn select_drive(&mut self) {
        let val = if self.is_master { 0xA0 } else { 0xB0 };
        self.write_reg(DRIVE_HEAD, val);
        self.delay_400ns();
    }

    // ── PACKET protocol ──────────────────────────────────────

    /// Arm a PACKET command: byte-count limit, 0xA0, then the 12-byte CDB
    /// pushed through the data port as six words, low byte first.
    fn send_packet(&mut self, byte_limit: u16, cdb: &[u8; CDB_LEN]) -> DiskResult<()> {
        self.select_drive();
        self.wait_bsy()?;

        self.write_reg(FEATURES, 0);
        self.write_reg(SECTOR_COUNT, 0);
        self.write_reg(BYTE_COUNT_LO, (byte_limit & 0xFF) as u8);
        self.write_reg(BYTE_COUNT_HI, (byte_limit >> 8) as u8);
        self.write_reg(CMD_STATUS, CMD_PACKET);

        self.wait_drq()?;

        for pair in cdb.chunks_exact(2) {
            self.write_data16(u16::from_le_bytes([pair[0], pair[1]]));
        }
        Ok(())
    }

    /// Read one 2048-byte sector with READ(10).
    pub fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()> {
        let mut cdb = [0u8; CDB_LEN];
        cdb[0] = SCSI_READ_10;
        cdb[2..6].copy_from_slice(&lba.to_be_bytes());
        cdb[8] = 1; // transfer length, big-endian, one sector

        self.send_packet(CD_SECTOR_SIZE as u16, &cdb)?;
        self.wait_drq()?;

        for i in 0..CD_SECTOR_SIZE / 2 {
            let word = self.read_data16();
            buf[i * 2] = (word & 0xFF) as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }
        Ok(())
    }

    /// READ CAPACITY(10): last addressable LBA and the block size.
    pub fn read_capacity(&mut self) -> DiskResult<(u32, u32)> {
        let mut cdb = [0u8; CDB_LEN];
        cdb[0] = SCSI_READ_CAPACITY;

        self.send_packet(8, &cdb)?;
        self.wait_drq()?;

        let mut resp = [0u8; 8];
        for i in 0..4 {
            let word = self.read_data16();
            resp[i * 2] = (word & 0xFF) as u8;
            resp[i * 2 + 1] = (word >> 8) as u8;
        }

        let max_lba = u32::from_be_bytes([resp[0], resp[1], resp[2], resp[3]]);
        let block_size = u32::from_be_bytes([resp[4], resp[5], resp[6], resp[7]]);
        Ok((max_lba, block_size))
    }

    /// Total disc capacity in bytes.
    pub fn disc_size(&mut self) -> DiskResult<u64> {
        let (max_lba, block_size) = self.read_capacity()?;
        Ok((max_lba as u64 + 1) * block_size as u64)
    }
}

impl<P: PortIo> OpticalDevice for AtapiDevice<P> {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()> {
        AtapiDevice::read_sector(self, lba, buf)
    }
}
