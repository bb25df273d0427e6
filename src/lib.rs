#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod serial;
pub mod port;
pub mod drivers;
pub mod fs;

#[cfg(not(test))]
use core::panic::PanicInfo;

/// Bring up the storage stack: serial logging first, then the drive probes.
pub fn init() {
    serial::init();
    drivers::init();
    log_info!("HaliteOS storage subsystem online.");
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log_error!("{}", info);
    loop {
        x86_64::instructions::hlt();
    }
}
