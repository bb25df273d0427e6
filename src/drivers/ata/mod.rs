pub mod pio;

pub use pio::{AtaDevice, AtaStatus, DeviceInfo};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::drivers::block::{BlockDevice, DiskResult, SECTOR_SIZE};
use crate::port::{PortIo, X86PortIo};

/// This kernel keeps its hard disk on the primary master slot.
pub const PRIMARY_IO_BASE: u16 = 0x1F0;
pub const PRIMARY_CTRL_BASE: u16 = 0x3F6;

lazy_static! {
    pub static ref PRIMARY_ATA: Mutex<AtaDevice<X86PortIo>> = Mutex::new(AtaDevice::new(
        X86PortIo,
        PRIMARY_IO_BASE,
        PRIMARY_CTRL_BASE,
        true
    ));
}

/// Zero-size handle that locks [`PRIMARY_ATA`] per operation, so the
/// filesystems can mount the global drive like any other block device.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryAtaHandle;

impl BlockDevice for PrimaryAtaHandle {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> DiskResult<()> {
        PRIMARY_ATA.lock().read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> DiskResult<()> {
        PRIMARY_ATA.lock().write_sector(lba, buf)
    }
}

pub fn init() {
    // Set nIEN on the channel before the first command; the drivers run
    // purely polled and nothing services IRQ 14.
    X86PortIo.outb(PRIMARY_CTRL_BASE, 0x02);

    let mut dev = PRIMARY_ATA.lock();
    match dev.identify() {
        Ok(info) => {
            crate::log_info!("ATA PIO: primary master is {}", info);
        }
        Err(e) => {
            crate::log_warn!("ATA PIO: no disk on primary master ({})", e);
        }
    }
}
