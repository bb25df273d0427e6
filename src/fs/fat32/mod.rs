mod bpb;
mod dir;

pub use dir::{make_short_name, DirEntry, EntryLocation, FileInfo};

use alloc::vec;
use alloc::vec::Vec;

use bpb::Bpb;
use dir::{RawDirEntry, DIR_ENTRY_SIZE};

use crate::drivers::block::{BlockDevice, SECTOR_SIZE};
use crate::fs::error::{FsError, FsResult};

// ══════════════════════════════════════════════════════════════
//  Constants
// ══════════════════════════════════════════════════════════════

// FAT32 special cluster values
const FAT_EOC: u32 = 0x0FFF_FFF8; // end-of-chain marker (>= this)
const FAT_EOC_MARK: u32 = 0x0FFF_FFFF; // value stored when terminating a chain
const FAT_FREE: u32 = 0x0000_0000;

/// Only the low 28 bits of a FAT entry address clusters.
const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// How a write treats existing file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Free the old chain and store exactly the new bytes.
    Overwrite,
    /// Keep the old bytes and continue at the current end of file.
    Append,
}

// ══════════════════════════════════════════════════════════════
//  Fat32Volume
// ══════════════════════════════════════════════════════════════

pub struct Fat32Volume<D: BlockDevice> {
    disk: D,
    bpb: Bpb,
    fat_begin_lba: u32,
    cluster_begin_lba: u32,
    // One-sector FAT cache; chain walks usually stay within a sector.
    fat_cache: Option<(u32, [u8; SECTOR_SIZE])>,
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// Mount the volume whose boot sector sits at `volume_lba`.
    pub fn mount(mut disk: D, volume_lba: u32) -> FsResult<Fat32Volume<D>> {
        let mut sector = [0u8; SECTOR_SIZE];
        disk.read_sector(volume_lba, &mut sector)?;
        let bpb = Bpb::parse(&sector)?;

        let fat_begin_lba = volume_lba + bpb.reserved_sectors as u32;
        let cluster_begin_lba = fat_begin_lba + bpb.fat_count as u32 * bpb.sectors_per_fat;

        crate::log_info!(
            "FAT32: BPS={} SPC={} FATs={} FATsz={} root={} data_lba={}",
            bpb.bytes_per_sector,
            bpb.sectors_per_cluster,
            bpb.fat_count,
            bpb.sectors_per_fat,
            bpb.root_cluster,
            cluster_begin_lba
        );

        Ok(Fat32Volume {
            disk,
            bpb,
            fat_begin_lba,
            cluster_begin_lba,
            fat_cache: None,
        })
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb.root_cluster
    }

    pub fn cluster_size(&self) -> usize {
        self.bpb.cluster_size()
    }

    /// Handle for the root directory. It has no entry of its own.
    pub fn root_dir(&self) -> FileInfo {
        FileInfo {
            first_cluster: self.bpb.root_cluster,
            size: 0,
            is_directory: true,
            entry: None,
        }
    }

    /// First sector of a cluster in the data area.
    fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.cluster_begin_lba + (cluster - 2) * self.bpb.sectors_per_cluster as u32
    }

    // ── Low-level disk I/O helpers ──────────────────────────

    fn read_sector_raw(&mut self, lba: u32) -> FsResult<[u8; SECTOR_SIZE]> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.disk.read_sector(lba, &mut buf)?;
        Ok(buf)
    }

    fn write_sector_raw(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> FsResult<()> {
        self.disk.write_sector(lba, buf)?;
        Ok(())
    }

    // ── FAT operations ──────────────────────────────────────

    /// Sector (within the first FAT copy) and byte offset of an entry.
    /// Accepts raw on-disk words; only 28 bits address clusters.
    fn fat_location(&self, cluster: u32) -> (u32, usize) {
        let fat_offset = (cluster & FAT_ENTRY_MASK) * 4;
        let sector = fat_offset / self.bpb.bytes_per_sector as u32;
        let offset = (fat_offset % self.bpb.bytes_per_sector as u32) as usize;
        (sector, offset)
    }

    fn read_fat_sector(&mut self, lba: u32) -> FsResult<[u8; SECTOR_SIZE]> {
        if let Some((cached_lba, data)) = self.fat_cache {
            if cached_lba == lba {
                return Ok(data);
            }
        }
        let data = self.read_sector_raw(lba)?;
        self.fat_cache = Some((lba, data));
        Ok(data)
    }

    /// Next cluster in the chain after `cluster`, masked to 28 bits.
    pub fn next_cluster(&mut self, cluster: u32) -> FsResult<u32> {
        let (sector, offset) = self.fat_location(cluster);
        let data = self.read_fat_sector(self.fat_begin_lba + sector)?;
        let value = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) & FAT_ENTRY_MASK;
        Ok(value)
    }

    /// Store a FAT entry in every FAT copy, read-modify-write so the
    /// reserved top nibble of the 32-bit slot survives.
    pub fn write_fat_entry(&mut self, cluster: u32, value: u32) -> FsResult<()> {
        let (sector, offset) = self.fat_location(cluster);

        for copy in 0..self.bpb.fat_count as u32 {
            let lba = self.fat_begin_lba + copy * self.bpb.sectors_per_fat + sector;
            let mut data = self.read_sector_raw(lba)?;

            let existing = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            let merged = (existing & !FAT_ENTRY_MASK) | (value & FAT_ENTRY_MASK);
            data[offset..offset + 4].copy_from_slice(&merged.to_le_bytes());

            self.write_sector_raw(lba, &data)?;
            if copy == 0 {
                self.fat_cache = Some((lba, data));
            }
        }
        Ok(())
    }

    /// Scan the FAT for a free entry, beginning at `max(start, 2)`. The
    /// declared FAT size bounds the scan, not the partition size.
    pub fn find_free_cluster(&mut self, start: u32) -> FsResult<u32> {
        let mut cluster = start.max(2);
        let limit = self.bpb.fat_entry_count();
        while cluster < limit {
            if self.next_cluster(cluster)? == FAT_FREE {
                return Ok(cluster);
            }
            cluster += 1;
        }
        Err(FsError::NoSpace)
    }

    /// Claim the first free cluster at or after `start` and mark it
    /// end-of-chain.
    fn allocate_cluster(&mut self, start: u32) -> FsResult<u32> {
        let cluster = self.find_free_cluster(start)?;
        self.write_fat_entry(cluster, FAT_EOC_MARK)?;
        Ok(cluster)
    }

    /// Walk to the last cluster of a chain.
    fn chain_tail(&mut self, first: u32) -> FsResult<u32> {
        let mut cluster = first;
        loop {
            let next = self.next_cluster(cluster)?;
            if !(2..FAT_EOC).contains(&next) {
                return Ok(cluster);
            }
            cluster = next;
        }
    }

    /// Release every cluster of a chain back to the free pool.
    fn free_chain(&mut self, first: u32) -> FsResult<()> {
        let mut cluster = first;
        while (2..FAT_EOC).contains(&cluster) {
            let next = self.next_cluster(cluster)?;
            self.write_fat_entry(cluster, FAT_FREE)?;
            cluster = next;
        }
        Ok(())
    }

    // ── Cluster I/O ─────────────────────────────────────────

    /// Fill `buf` with one cluster. `buf` must hold `cluster_size()` bytes.
    pub fn read_cluster(&mut self, cluster: u32, buf: &mut [u8]) -> FsResult<()> {
        let first = self.cluster_to_sector(cluster);
        let sectors = self.bpb.sectors_per_cluster as usize;
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate().take(sectors) {
            let mut sector = [0u8; SECTOR_SIZE];
            self.disk.read_sector(first + i as u32, &mut sector)?;
            chunk.copy_from_slice(&sector);
        }
        Ok(())
    }

    fn write_cluster(&mut self, cluster: u32, buf: &[u8]) -> FsResult<()> {
        let first = self.cluster_to_sector(cluster);
        let sectors = self.bpb.sectors_per_cluster as usize;
        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate().take(sectors) {
            let mut sector = [0u8; SECTOR_SIZE];
            sector.copy_from_slice(chunk);
            self.disk.write_sector(first + i as u32, &sector)?;
        }
        Ok(())
    }

    // ── Directory operations ────────────────────────────────

    /// Resolve an absolute path to its directory entry. `/` yields the
    /// synthesized root handle.
    pub fn resolve_path(&mut self, path: &str) -> FsResult<FileInfo> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(self.root_dir());
        }

        let mut info = self.root_dir();
        for component in trimmed.split('/').filter(|c| !c.is_empty()) {
            if !info.is_directory {
                return Err(FsError::NotFound);
            }
            info = self.find_in_dir(info.first_cluster, component)?;
        }
        Ok(info)
    }

    /// Scan one directory chain for an 8.3 name. A 0x00 name byte ends the
    /// directory; deleted and long-name entries are passed over.
    fn find_in_dir(&mut self, dir_cluster: u32, name: &str) -> FsResult<FileInfo> {
        let want = make_short_name(name);
        let cluster_size = self.cluster_size();
        let mut buf = vec![0u8; cluster_size];
        let mut cluster = dir_cluster;

        while (2..FAT_EOC).contains(&cluster) {
            self.read_cluster(cluster, &mut buf)?;
            let first_sector = self.cluster_to_sector(cluster);

            for (index, raw) in buf.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
                let entry = RawDirEntry::from_bytes(raw);
                if entry.is_free() {
                    return Err(FsError::NotFound);
                }
                if entry.is_deleted() || entry.is_lfn() {
                    continue;
                }
                if entry.name == want {
                    let byte = index * DIR_ENTRY_SIZE;
                    return Ok(FileInfo {
                        first_cluster: entry.first_cluster(),
                        size: entry.file_size,
                        is_directory: entry.is_dir(),
                        entry: Some(EntryLocation {
                            sector: first_sector + (byte / SECTOR_SIZE) as u32,
                            offset: byte % SECTOR_SIZE,
                        }),
                    });
                }
            }

            cluster = self.next_cluster(cluster)?;
        }
        Err(FsError::NotFound)
    }

    /// Every live entry of the directory starting at `dir_cluster`.
    pub fn list_directory(&mut self, dir_cluster: u32) -> FsResult<Vec<DirEntry>> {
        let cluster_size = self.cluster_size();
        let mut entries = Vec::new();
        let mut buf = vec![0u8; cluster_size];
        let mut cluster = dir_cluster;

        while (2..FAT_EOC).contains(&cluster) {
            self.read_cluster(cluster, &mut buf)?;
            for raw in buf.chunks_exact(DIR_ENTRY_SIZE) {
                let entry = RawDirEntry::from_bytes(raw);
                if entry.is_free() {
                    return Ok(entries);
                }
                if entry.is_deleted() || entry.is_lfn() {
                    continue;
                }
                entries.push(DirEntry {
                    name: entry.display_name(),
                    first_cluster: entry.first_cluster(),
                    size: entry.file_size,
                    is_directory: entry.is_dir(),
                });
            }
            cluster = self.next_cluster(cluster)?;
        }
        Ok(entries)
    }

    /// Resolve `path` and list it. Fails on files.
    pub fn list_path(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let info = self.resolve_path(path)?;
        if !info.is_directory {
            return Err(FsError::NotADirectory);
        }
        self.list_directory(info.first_cluster)
    }

    // ── File reading ────────────────────────────────────────

    /// Read a whole file by walking its chain, stopping at `size` bytes or
    /// end-of-chain, whichever comes first.
    pub fn read_file(&mut self, info: &FileInfo) -> FsResult<Vec<u8>> {
        if info.is_directory {
            return Err(FsError::IsADirectory);
        }
        let cluster_size = self.cluster_size();
        let mut data = Vec::with_capacity(info.size as usize);
        let mut buf = vec![0u8; cluster_size];
        let mut remaining = info.size as usize;
        let mut cluster = info.first_cluster;

        while remaining > 0 && (2..FAT_EOC).contains(&cluster) {
            self.read_cluster(cluster, &mut buf)?;
            let take = remaining.min(cluster_size);
            data.extend_from_slice(&buf[..take]);
            remaining -= take;
            if remaining > 0 {
                cluster = self.next_cluster(cluster)?;
            }
        }
        Ok(data)
    }

    pub fn read_file_at_path(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let info = self.resolve_path(path)?;
        self.read_file(&info)
    }

    // ── File writing ────────────────────────────────────────

    /// Write `data` to an existing file. Overwrite releases the old chain
    /// and starts over; append continues at `size` bytes into the tail
    /// cluster. Returns the number of bytes actually stored: when the
    /// volume fills mid-write the write ends at the last full cluster and
    /// the directory entry still records what landed on disk. Only a
    /// failure to place the first new cluster is reported as `NoSpace`.
    pub fn write_file(&mut self, info: &FileInfo, data: &[u8], mode: WriteMode) -> FsResult<usize> {
        if info.is_directory {
            return Err(FsError::IsADirectory);
        }
        let location = info.entry.ok_or(FsError::InvalidPath)?;
        let cluster_size = self.cluster_size();

        let (first_cluster, mut cluster, mut offset, base_size) = match mode {
            WriteMode::Overwrite => {
                if info.first_cluster >= 2 {
                    self.free_chain(info.first_cluster)?;
                }
                let fresh = self.allocate_cluster(2)?;
                (fresh, fresh, 0usize, 0u32)
            }
            WriteMode::Append => {
                if info.first_cluster < 2 {
                    let fresh = self.allocate_cluster(2)?;
                    (fresh, fresh, 0, 0)
                } else {
                    let tail = self.chain_tail(info.first_cluster)?;
                    let offset = info.size as usize % cluster_size;
                    if offset == 0 && info.size > 0 {
                        // The tail cluster is exactly full; extend first.
                        let fresh = self.allocate_cluster(tail + 1)?;
                        self.write_fat_entry(tail, fresh)?;
                        (info.first_cluster, fresh, 0, info.size)
                    } else {
                        (info.first_cluster, tail, offset, info.size)
                    }
                }
            }
        };

        let mut written = 0usize;
        let mut buf = vec![0u8; cluster_size];
        while written < data.len() {
            if offset == 0 {
                buf.fill(0);
            } else {
                // Continuing mid-cluster: keep the bytes before `offset`.
                self.read_cluster(cluster, &mut buf)?;
            }

            let take = (data.len() - written).min(cluster_size - offset);
            buf[offset..offset + take].copy_from_slice(&data[written..written + take]);
            self.write_cluster(cluster, &buf)?;
            written += take;
            offset = 0;

            if written == data.len() {
                break;
            }
            // Extensions search just past the cluster that filled, keeping
            // chains roughly contiguous.
            match self.allocate_cluster(cluster + 1) {
                Ok(next) => {
                    self.write_fat_entry(cluster, next)?;
                    cluster = next;
                }
                Err(FsError::NoSpace) => break,
                Err(e) => return Err(e),
            }
        }

        let new_size = match mode {
            WriteMode::Overwrite => written as u32,
            WriteMode::Append => base_size + written as u32,
        };
        self.rewrite_entry(location, first_cluster, new_size)?;
        Ok(written)
    }

    pub fn write_file_at_path(
        &mut self,
        path: &str,
        data: &[u8],
        mode: WriteMode,
    ) -> FsResult<usize> {
        let info = self.resolve_path(path)?;
        self.write_file(&info, data, mode)
    }

    /// Patch a directory entry's first cluster and size in place. Name,
    /// attributes and timestamps stay as they were.
    fn rewrite_entry(
        &mut self,
        location: EntryLocation,
        first_cluster: u32,
        size: u32,
    ) -> FsResult<()> {
        let mut sector = self.read_sector_raw(location.sector)?;
        let entry = &mut sector[location.offset..location.offset + DIR_ENTRY_SIZE];
        entry[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        entry[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
        entry[28..32].copy_from_slice(&size.to_le_bytes());
        self.write_sector_raw(location.sector, &sector)
    }
}
