use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str;

use crate::drivers::block::{OpticalDevice, CD_SECTOR_SIZE};
use crate::fs::error::{FsError, FsResult};

// ══════════════════════════════════════════════════════════════
//  Constants
// ══════════════════════════════════════════════════════════════

/// Volume descriptors start at sector 16; we only use the primary one.
const PVD_LBA: u32 = 16;
/// Offset of the root directory record inside the PVD.
const ROOT_RECORD_OFFSET: usize = 156;
/// File-flags bit marking a record as a directory.
const FLAG_DIRECTORY: u8 = 0x02;

// ══════════════════════════════════════════════════════════════
//  Records
// ══════════════════════════════════════════════════════════════

/// Where a file or directory lives on the disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lba: u32,
    pub size: u32,
}

impl Extent {
    /// Both-endian fields; we read the little-endian halves.
    fn from_record(rec: &[u8]) -> Extent {
        Extent {
            lba: u32::from_le_bytes([rec[2], rec[3], rec[4], rec[5]]),
            size: u32::from_le_bytes([rec[10], rec[11], rec[12], rec[13]]),
        }
    }
}

/// One decoded directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoDirEntry {
    pub name: String,
    pub extent: Extent,
    pub is_directory: bool,
}

impl IsoDirEntry {
    fn from_record(rec: &[u8]) -> IsoDirEntry {
        let name_len = rec[32] as usize;
        IsoDirEntry {
            name: str::from_utf8(&rec[33..33 + name_len])
                .unwrap_or("")
                .to_string(),
            extent: Extent::from_record(rec),
            is_directory: rec[25] & FLAG_DIRECTORY != 0,
        }
    }

    /// Directories get a trailing slash for listings.
    pub fn display_name(&self) -> String {
        if self.is_directory {
            let mut name = self.name.clone();
            name.push('/');
            name
        } else {
            self.name.clone()
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  IsoVolume
// ══════════════════════════════════════════════════════════════

pub struct IsoVolume<D: OpticalDevice> {
    disc: D,
    root: Extent,
}

impl<D: OpticalDevice> IsoVolume<D> {
    /// Open a disc by validating the primary volume descriptor and pulling
    /// the root directory extent out of it.
    pub fn open(mut disc: D) -> FsResult<IsoVolume<D>> {
        let mut sector = [0u8; CD_SECTOR_SIZE];
        disc.read_sector(PVD_LBA, &mut sector)?;

        if sector[0] != 1 || &sector[1..6] != b"CD001" {
            return Err(FsError::BadVolume);
        }
        let root = Extent::from_record(&sector[ROOT_RECORD_OFFSET..]);

        crate::log_info!("ISO9660: root directory at LBA {} ({} bytes)", root.lba, root.size);

        Ok(IsoVolume { disc, root })
    }

    /// Handle for the root directory.
    pub fn root_dir(&self) -> IsoDirEntry {
        IsoDirEntry {
            name: String::new(),
            extent: self.root,
            is_directory: true,
        }
    }

    /// Resolve an absolute path to a directory, component by component.
    /// Matching is exact, so versioned names need their `;1` spelled out.
    /// Plain files are reached through their parent's records, not here.
    pub fn open_path(&mut self, path: &str) -> FsResult<IsoDirEntry> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(self.root_dir());
        }

        let mut entry = self.root_dir();
        for component in trimmed.split('/').filter(|c| !c.is_empty()) {
            entry = self.find_in_dir(entry.extent, component)?;
        }
        Ok(entry)
    }

    /// Scan a directory extent for a subdirectory; only directory-flagged
    /// records match. A zero length byte ends the records of a sector; they
    /// never cross into the next one.
    fn find_in_dir(&mut self, dir: Extent, name: &str) -> FsResult<IsoDirEntry> {
        let want = name.as_bytes();
        let mut sector = [0u8; CD_SECTOR_SIZE];
        let sector_count = (dir.size as usize + CD_SECTOR_SIZE - 1) / CD_SECTOR_SIZE;

        for i in 0..sector_count {
            self.disc.read_sector(dir.lba + i as u32, &mut sector)?;
            let mut pos = 0;
            while pos < CD_SECTOR_SIZE {
                let len = sector[pos] as usize;
                if len == 0 || pos + len > CD_SECTOR_SIZE {
                    break;
                }
                let rec = &sector[pos..pos + len];
                pos += len;

                // A record holds 33 fixed bytes plus its name; anything
                // shorter, or a name overrunning the record, is corrupt.
                if len < 34 || 33 + rec[32] as usize > len {
                    return Err(FsError::BadVolume);
                }
                let name_len = rec[32] as usize;
                let rec_name = &rec[33..33 + name_len];
                if name_len == 1 && (rec_name[0] == 0x00 || rec_name[0] == 0x01) {
                    // Self and parent references.
                    continue;
                }
                if rec[25] & FLAG_DIRECTORY != 0 && rec_name == want {
                    return Ok(IsoDirEntry::from_record(rec));
                }
            }
        }
        Err(FsError::NotFound)
    }

    /// Every named entry of a directory, in record order.
    pub fn list_directory(&mut self, dir: Extent) -> FsResult<Vec<IsoDirEntry>> {
        let mut entries = Vec::new();
        let mut sector = [0u8; CD_SECTOR_SIZE];
        let sector_count = (dir.size as usize + CD_SECTOR_SIZE - 1) / CD_SECTOR_SIZE;

        for i in 0..sector_count {
            self.disc.read_sector(dir.lba + i as u32, &mut sector)?;
            let mut pos = 0;
            while pos < CD_SECTOR_SIZE {
                let len = sector[pos] as usize;
                if len == 0 || pos + len > CD_SECTOR_SIZE {
                    break;
                }
                let rec = &sector[pos..pos + len];
                pos += len;

                if len < 34 || 33 + rec[32] as usize > len {
                    return Err(FsError::BadVolume);
                }
                let name_len = rec[32] as usize;
                let rec_name = &rec[33..33 + name_len];
                if name_len == 1 && (rec_name[0] == 0x00 || rec_name[0] == 0x01) {
                    continue;
                }
                entries.push(IsoDirEntry::from_record(rec));
            }
        }
        Ok(entries)
    }

    pub fn list_path(&mut self, path: &str) -> FsResult<Vec<IsoDirEntry>> {
        let entry = self.open_path(path)?;
        self.list_directory(entry.extent)
    }

    /// Read a file in full. The final sector is truncated to the recorded
    /// size.
    pub fn read_file(&mut self, entry: &IsoDirEntry) -> FsResult<Vec<u8>> {
        if entry.is_directory {
            return Err(FsError::IsADirectory);
        }
        let size = entry.extent.size as usize;
        let mut data = Vec::with_capacity(size);
        let mut sector = [0u8; CD_SECTOR_SIZE];
        let sector_count = (size + CD_SECTOR_SIZE - 1) / CD_SECTOR_SIZE;

        for i in 0..sector_count {
            self.disc.read_sector(entry.extent.lba + i as u32, &mut sector)?;
            let take = (size - data.len()).min(CD_SECTOR_SIZE);
            data.extend_from_slice(&sector[..take]);
        }
        Ok(data)
    }

    /// Read a file by absolute path. The parent directory is resolved first
    /// and the file's record taken from its listing.
    pub fn read_file_at_path(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let trimmed = path.trim_matches('/');
        let (dir_path, file_name) = match trimmed.rsplit_once('/') {
            Some(split) => split,
            None => ("", trimmed),
        };
        if file_name.is_empty() {
            return Err(FsError::IsADirectory);
        }

        let parent = self.open_path(dir_path)?;
        let entry = self
            .list_directory(parent.extent)?
            .into_iter()
            .find(|e| e.name == file_name)
            .ok_or(FsError::NotFound)?;
        self.read_file(&entry)
    }
}
