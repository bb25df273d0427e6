use alloc::format;
use alloc::string::String;

pub(super) const DIR_ENTRY_SIZE: usize = 32;

// Directory entry attribute bits
pub(super) const ATTR_DIRECTORY: u8 = 0x10;
pub(super) const ATTR_LFN: u8 = 0x0F;

// ══════════════════════════════════════════════════════════════
//  Raw FAT32 directory entry (32 bytes)
// ══════════════════════════════════════════════════════════════

#[derive(Clone)]
pub(super) struct RawDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub cluster_hi: u16,
    pub cluster_lo: u16,
    pub file_size: u32,
}

impl RawDirEntry {
    pub fn from_bytes(data: &[u8]) -> Self {
        RawDirEntry {
            name: {
                let mut n = [0u8; 11];
                n.copy_from_slice(&data[0..11]);
                n
            },
            attr: data[11],
            cluster_hi: u16::from_le_bytes([data[20], data[21]]),
            cluster_lo: u16::from_le_bytes([data[26], data[27]]),
            file_size: u32::from_le_bytes([data[28], data[29], data[30], data[31]]),
        }
    }

    /// Cluster numbers are 28-bit; the top nibble of the on-disk field is
    /// reserved and dropped here.
    pub fn first_cluster(&self) -> u32 {
        (((self.cluster_hi as u32) << 16) | (self.cluster_lo as u32)) & super::FAT_ENTRY_MASK
    }

    /// 0x00 in the first name byte ends the whole directory.
    pub fn is_free(&self) -> bool {
        self.name[0] == 0x00
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == 0xE5
    }

    pub fn is_lfn(&self) -> bool {
        self.attr == ATTR_LFN
    }

    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    /// Convert the padded 8.3 name to `BASE.EXT` form.
    pub fn display_name(&self) -> String {
        let base = core::str::from_utf8(&self.name[0..8]).unwrap_or("").trim();
        let ext = core::str::from_utf8(&self.name[8..11]).unwrap_or("").trim();
        if ext.is_empty() {
            String::from(base)
        } else {
            format!("{}.{}", base, ext)
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  Public lookup results
// ══════════════════════════════════════════════════════════════

/// Where a file's governing directory entry lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub sector: u32,
    pub offset: usize,
}

/// Handle produced by path resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub first_cluster: u32,
    pub size: u32,
    pub is_directory: bool,
    /// None for the synthesized root directory.
    pub entry: Option<EntryLocation>,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub first_cluster: u32,
    pub size: u32,
    pub is_directory: bool,
}

impl DirEntry {
    /// Listing form: directories carry a trailing slash.
    pub fn display_name(&self) -> String {
        if self.is_directory {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Build the 8.3 search key for one path component. The first dot splits
/// base from extension; both halves are upper-cased and silently truncated
/// to 8 and 3 bytes, so every input produces a key.
pub fn make_short_name(name: &str) -> [u8; 11] {
    let mut short = [b' '; 11];
    let (base, ext) = match name.split_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    };
    for (slot, byte) in short[..8].iter_mut().zip(base.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    for (slot, byte) in short[8..].iter_mut().zip(ext.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    short
}
