use std::io;

use thiserror::Error;

/// Possible errors encountered when reading a bbi file
///
/// `UnknownMagic` and `InvalidFile` indicate a corrupt or unsupported file,
/// `Truncated` indicates the file ended before a field could be read, and
/// `Decompression` indicates a block could not be inflated. None of these are
/// recovered from internally.
#[derive(Error, Debug)]
pub enum BBIReadError {
    #[error("Invalid {what} magic at offset {offset}: expected {expected:#010x}, found {found:#010x}")]
    UnknownMagic {
        what: &'static str,
        offset: u64,
        expected: u32,
        found: u32,
    },
    #[error("The file was invalid at offset {offset}: {reason}")]
    InvalidFile { offset: u64, reason: String },
    #[error("Unexpected end of data at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },
    #[error("Unable to decompress block at offset {offset}: {reason}")]
    Decompression { offset: u64, reason: String },
    #[error("The passed chromosome ({}) was incorrect.", .0)]
    InvalidChromosome(String),
    #[error("The passed reduction level ({}) was not found", .0)]
    ReductionLevelNotFound(u32),
    #[error("Error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

impl BBIReadError {
    pub(crate) fn invalid(offset: u64, reason: impl Into<String>) -> Self {
        BBIReadError::InvalidFile {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error means the file is corrupt or of an unsupported variant
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            BBIReadError::UnknownMagic { .. } | BBIReadError::InvalidFile { .. }
        )
    }

    pub fn is_truncation(&self) -> bool {
        matches!(self, BBIReadError::Truncated { .. })
    }

    pub fn is_decompression_error(&self) -> bool {
        matches!(self, BBIReadError::Decompression { .. })
    }
}
