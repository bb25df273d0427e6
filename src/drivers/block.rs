use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Sector size of every ATA transfer.
pub const SECTOR_SIZE: usize = 512;

/// Sector size of every ATAPI data transfer (mode 1 user data).
pub const CD_SECTOR_SIZE: usize = 2048;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum DiskError {
    /// Nothing answered on the probed channel/drive slot.
    NoDevice,
    /// The device raised ERR or DF.
    DeviceFault,
    /// BSY never cleared within the poll bound.
    BusyTimeout,
    /// DRQ never rose within the poll bound.
    DrqTimeout,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiskError::NoDevice => write!(f, "no device present"),
            DiskError::DeviceFault => write!(f, "device reported a fault"),
            DiskError::BusyTimeout => write!(f, "timed out waiting for BSY to clear"),
            DiskError::DrqTimeout => write!(f, "timed out waiting for DRQ"),
        }
    }
}

pub type DiskResult<T> = Result<T, DiskError>;

// ── Seams ───────────────────────────────────────────────────────────────────

/// Random-access storage in 512-byte sectors.
pub trait BlockDevice {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()>;
    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()>;
}

/// Read-only storage in 2048-byte sectors.
pub trait OpticalDevice {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()> {
        (**self).read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()> {
        (**self).write_sector(lba, buf)
    }
}

impl<D: OpticalDevice + ?Sized> OpticalDevice for &mut D {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()> {
        (**self).read_sector(lba, buf)
    }
}

// ── RAM-backed devices ──────────────────────────────────────────────────────

/// Memory-backed block device for loopback-mounting disk images.
pub struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    pub fn new(sector_count: usize) -> RamDisk {
        RamDisk {
            data: vec![0; sector_count * SECTOR_SIZE],
        }
    }

    /// Wraps an image, padding the tail out to a whole sector.
    pub fn from_image(mut image: Vec<u8>) -> RamDisk {
        let tail = image.len() % SECTOR_SIZE;
        if tail != 0 {
            image.resize(image.len() + SECTOR_SIZE - tail, 0);
        }
        RamDisk { data: image }
    }

    pub fn sector_count(&self) -> usize {
        self.data.len() / SECTOR_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, lba: u32) -> DiskResult<core::ops::Range<usize>> {
        let start = lba as usize * SECTOR_SIZE;
        let end = start + SECTOR_SIZE;
        if end > self.data.len() {
            return Err(DiskError::DeviceFault);
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()> {
        let range = self.range(lba)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()> {
        let range = self.range(lba)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

/// Memory-backed optical device for loopback-mounting ISO images.
pub struct RamCdrom {
    data: Vec<u8>,
}

impl RamCdrom {
    pub fn from_image(mut image: Vec<u8>) -> RamCdrom {
        let tail = image.len() % CD_SECTOR_SIZE;
        if tail != 0 {
            image.resize(image.len() + CD_SECTOR_SIZE - tail, 0);
        }
        RamCdrom { data: image }
    }

    pub fn sector_count(&self) -> usize {
        self.data.len() / CD_SECTOR_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl OpticalDevice for RamCdrom {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()> {
        let start = lba as usize * CD_SECTOR_SIZE;
        let end = start + CD_SECTOR_SIZE;
        if end > self.data.len() {
            return Err(DiskError::DeviceFault);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}
