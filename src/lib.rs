//! Random access into zlib and gzip compressed streams.
//!
//! A single decoding pass over the compressed data records access points
//! (compressed position, bit offset and the preceding 32 KiB of output) at a
//! configurable spacing. Later reads resume decompression at the nearest
//! point instead of the start of the stream, so the cost of a read is bounded
//! by the spacing rather than by the offset.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
mod framing;
pub mod index;
mod inflate;
pub mod reader;

pub use cache::{BufferCache, CacheStats};
pub use config::{
    BufferPolicy, ReaderConfig, DEFAULT_BUFFER_MARGIN, DEFAULT_CHECKPOINT_SPACING,
    DEFAULT_INPUT_CHUNK, WINDOW_SIZE,
};
pub use error::{Error, Result};
pub use extract::extract;
pub use framing::StreamFormat;
pub use index::{AccessIndex, AccessPoint, IndexBuilder};
pub use reader::RandomAccessReader;
