//! Reader configuration.
//!
//! Named defaults for the DEFLATE window, checkpoint spacing and input
//! buffering, plus the per-reader options that override them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// DEFLATE sliding window size. Every access point stores this much history.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Target uncompressed distance between access points.
pub const DEFAULT_CHECKPOINT_SPACING: usize = 1024 * 1024;

/// Compressed input read from the handle per refill.
pub const DEFAULT_INPUT_CHUNK: usize = 16 * 1024;

/// Default read-behind / read-ahead kept by the fixed-margin cache policy.
pub const DEFAULT_BUFFER_MARGIN: usize = 1024 * 1024;

/// How the byte cache is refilled on a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BufferPolicy {
    /// Buffer `[p - backward_margin, p + forward_margin]`, clipped to the stream.
    #[default]
    FixedMargin,
    /// Buffer the whole segment between the access point covering `p` and the
    /// next one.
    IndexAligned,
}

/// Configuration for a [`RandomAccessReader`](crate::RandomAccessReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderConfig {
    /// Bytes cached before a requested offset (fixed-margin policy only).
    /// Default: 1 MiB
    pub backward_margin: usize,

    /// Bytes cached after a requested offset (fixed-margin policy only).
    /// Default: 1 MiB
    pub forward_margin: usize,

    /// Cache refill policy.
    /// Default: fixed margin
    pub buffer_policy: BufferPolicy,

    /// Uncompressed bytes between access points.
    /// Default: 1 MiB
    pub checkpoint_spacing: usize,

    /// Compressed bytes read per input refill.
    /// Default: 16 KiB
    pub input_chunk_size: usize,

    /// Build the access index while opening.
    /// Default: true
    pub build_index_on_open: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            backward_margin: DEFAULT_BUFFER_MARGIN,
            forward_margin: DEFAULT_BUFFER_MARGIN,
            buffer_policy: BufferPolicy::FixedMargin,
            checkpoint_spacing: DEFAULT_CHECKPOINT_SPACING,
            input_chunk_size: DEFAULT_INPUT_CHUNK,
            build_index_on_open: true,
        }
    }
}

impl ReaderConfig {
    /// Cache refills snap to access point boundaries.
    pub fn index_aligned() -> Self {
        Self {
            buffer_policy: BufferPolicy::IndexAligned,
            ..Self::default()
        }
    }

    /// Open without building the index; call `build_index()` later.
    pub fn deferred() -> Self {
        Self {
            build_index_on_open: false,
            ..Self::default()
        }
    }

    pub(crate) fn input_chunk(&self) -> usize {
        self.input_chunk_size.max(1)
    }
}
