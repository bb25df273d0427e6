pub mod error;
pub mod fat32;
pub mod iso9660;

pub use error::{FsError, FsResult};
