pub mod packet;

pub use packet::AtapiDevice;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::drivers::block::{DiskResult, OpticalDevice, CD_SECTOR_SIZE};
use crate::port::{PortIo, X86PortIo};

/// This kernel keeps its optical drive on the secondary master slot.
pub const SECONDARY_IO_BASE: u16 = 0x170;
pub const SECONDARY_CTRL_BASE: u16 = 0x376;

lazy_static! {
    pub static ref SECONDARY_ATAPI: Mutex<AtapiDevice<X86PortIo>> = Mutex::new(AtapiDevice::new(
        X86PortIo,
        SECONDARY_IO_BASE,
        SECONDARY_CTRL_BASE,
        true
    ));
}

/// Zero-size handle that locks [`SECONDARY_ATAPI`] per operation, the
/// optical twin of [`PrimaryAtaHandle`](crate::drivers::ata::PrimaryAtaHandle).
#[derive(Debug, Clone, Copy)]
pub struct SecondaryAtapiHandle;

impl OpticalDevice for SecondaryAtapiHandle {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; CD_SECTOR_SIZE]) -> DiskResult<()> {
        SECONDARY_ATAPI.lock().read_sector(lba, buf)
    }
}

pub fn init() {
    // nIEN before the first PACKET command, same rule as the ATA channel.
    X86PortIo.outb(SECONDARY_CTRL_BASE, 0x02);

    let mut dev = SECONDARY_ATAPI.lock();
    match dev.disc_size() {
        Ok(bytes) => {
            crate::log_info!("ATAPI: secondary master disc holds {} bytes", bytes);
        }
        Err(e) => {
            crate::log_warn!("ATAPI: no readable disc on secondary master ({})", e);
        }
    }
}
