use std::{fmt, io};

#[derive(Debug)]
pub enum PcdError {
    MalformedHeader(String),
    UnsupportedEncoding(String),
    CorruptStream(String),
    Decompression(String),
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    SerializeMetadata(String),
    TaskJoin(String),
    IoError(io::Error),
}

impl fmt::Display for PcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcdError::MalformedHeader(e) => {
                write!(f, "Malformed PCD header: {}", e)
            }
            PcdError::UnsupportedEncoding(tag) => {
                write!(f, "PCD: {} files are not supported", tag)
            }
            PcdError::CorruptStream(e) => {
                write!(f, "Corrupt LZF stream: {}", e)
            }
            PcdError::Decompression(e) => {
                write!(f, "LZF decompression failed: {}", e)
            }
            PcdError::OutOfBounds {
                offset,
                len,
                available,
            } => {
                write!(
                    f,
                    "Read of {} bytes at offset {} is out of bounds ({} bytes available)",
                    len, offset, available
                )
            }
            PcdError::SerializeMetadata(e) => {
                write!(f, "Failed to serialize schema metadata: {}", e)
            }
            PcdError::TaskJoin(e) => {
                write!(f, "Decode task failed: {}", e)
            }
            PcdError::IoError(e) => {
                write!(f, "An I/O error occurred: {}", e)
            }
        }
    }
}

impl std::error::Error for PcdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PcdError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PcdError {
    fn from(e: io::Error) -> Self {
        PcdError::IoError(e)
    }
}
