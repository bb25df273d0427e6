pub mod block;
pub mod ata;
pub mod atapi;

pub fn init() {
    ata::init();
    atapi::init();
    crate::log_info!("Storage drivers initialized.");
}
