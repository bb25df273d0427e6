use core::fmt;

use crate::drivers::block::DiskError;

/// Filesystem error types.
#[derive(Debug, Clone)]
pub enum FsError {
    NotFound,
    NotADirectory,
    IsADirectory,
    InvalidPath,
    NoSpace,
    /// On-disk structures failed validation at mount time.
    BadVolume,
    /// The underlying device failed.
    Io(DiskError),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file or directory"),
            FsError::NotADirectory => write!(f, "Not a directory"),
            FsError::IsADirectory => write!(f, "Is a directory"),
            FsError::InvalidPath => write!(f, "Invalid path"),
            FsError::NoSpace => write!(f, "No space left"),
            FsError::BadVolume => write!(f, "Invalid or unsupported volume"),
            FsError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl From<DiskError> for FsError {
    fn from(e: DiskError) -> FsError {
        FsError::Io(e)
    }
}

pub type FsResult<T> = Result<T, FsError>;
