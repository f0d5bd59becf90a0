//! Error types.

use thiserror::Error;

/// Malformed or non-conformant input. Always fatal.
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum FormatError {
    #[error("bad PNG signature")]
    Signature,

    #[error("stream ended at offset {0} before IEND")]
    Truncated(usize),

    #[error("chunk {tag} declares length {length} (max 2^31-1)")]
    ChunkTooLong { tag: String, length: u32 },

    #[error("no IHDR chunk in stream")]
    MissingHeader,

    #[error("IHDR payload must be 13 bytes, got {0}")]
    HeaderLength(usize),

    #[error("image height is zero")]
    ZeroHeight,

    #[error("decompressed length {len} is not divisible by height {height}")]
    Stride { len: usize, height: usize },

    #[error("row stride {got} does not match header geometry ({exp})")]
    Geometry { exp: usize, got: usize },

    #[error("empty scanline")]
    EmptyRow,

    #[error("unknown filter tag {0}")]
    UnknownFilter(u8),

    #[error("{got} passed to {name} filter")]
    FilterMismatch { name: &'static str, got: u8 },

    #[error("decompressed IDAT exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("zlib IDAT: {0}")]
    Inflate(String),

    #[error("zlib flush: {0}")]
    Deflate(String),
}

/// All library functions return a `Result` with this error type.
#[derive(Debug, Error)]
pub enum PngError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("integrity error: row {row} (filter {filter}) does not survive the round trip")]
    Integrity { row: usize, filter: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PngError>;
