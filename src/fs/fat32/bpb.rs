use crate::drivers::block::SECTOR_SIZE;
use crate::fs::error::{FsError, FsResult};

/// BIOS Parameter Block fields the engine relies on, parsed from the boot
/// sector of the volume.
#[derive(Debug, Clone)]
pub(super) struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
}

impl Bpb {
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> FsResult<Bpb> {
        // Boot signature comes first; without it nothing else is trustworthy.
        if sector[510] != 0x55 || sector[511] != 0xAA {
            return Err(FsError::BadVolume);
        }

        let bpb = Bpb {
            bytes_per_sector: u16::from_le_bytes([sector[11], sector[12]]),
            sectors_per_cluster: sector[13],
            reserved_sectors: u16::from_le_bytes([sector[14], sector[15]]),
            fat_count: sector[16],
            sectors_per_fat: u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]),
            root_cluster: u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]),
        };
        bpb.validate()?;
        Ok(bpb)
    }

    /// Reject geometry the engine cannot operate on. Data moves through
    /// 512-byte device sectors, so only volumes formatted that way mount.
    fn validate(&self) -> FsResult<()> {
        if self.bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FsError::BadVolume);
        }
        if !self.sectors_per_cluster.is_power_of_two() {
            return Err(FsError::BadVolume);
        }
        if self.reserved_sectors == 0 || self.fat_count == 0 || self.sectors_per_fat == 0 {
            return Err(FsError::BadVolume);
        }
        if self.root_cluster < 2 {
            return Err(FsError::BadVolume);
        }
        Ok(())
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * self.bytes_per_sector as usize
    }

    /// How many entries the declared FAT size can address.
    pub fn fat_entry_count(&self) -> u32 {
        self.sectors_per_fat * (self.bytes_per_sector as u32 / 4)
    }
}
