//! Access-point index over a compressed stream.
//!
//! One sequential pass decodes the whole stream and records a checkpoint
//! every `spacing` uncompressed bytes (rounded up to the next deflate block
//! boundary). Each checkpoint holds the compressed position, the bit offset
//! into the preceding byte, and the 32 KiB of output that precede it, which
//! is everything a raw decoder needs to resume there.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::time::Instant;

use crate::config::{DEFAULT_CHECKPOINT_SPACING, DEFAULT_INPUT_CHUNK, WINDOW_SIZE};
use crate::framing::{self, StreamCheck, StreamFormat};
use crate::inflate::{Inflater, InputBuffer, Step};
use crate::Result;

/// A position from which decompression can resume without reading from the
/// start of the stream.
#[derive(Clone)]
pub struct AccessPoint {
    compressed_offset: u64,
    bits: u8,
    uncompressed_offset: u64,
    window: Box<[u8]>,
}

impl AccessPoint {
    /// Offset of the first full compressed byte of the next block.
    pub fn compressed_offset(&self) -> u64 {
        self.compressed_offset
    }

    /// Number of bits (0-7) of the next block held in the byte before
    /// `compressed_offset`.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn uncompressed_offset(&self) -> u64 {
        self.uncompressed_offset
    }

    /// The `WINDOW_SIZE` bytes of output that precede this point.
    pub fn window(&self) -> &[u8] {
        &self.window
    }
}

impl fmt::Debug for AccessPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPoint")
            .field("compressed_offset", &self.compressed_offset)
            .field("bits", &self.bits)
            .field("uncompressed_offset", &self.uncompressed_offset)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable list of access points plus the stream totals.
#[derive(Debug, Clone)]
pub struct AccessIndex {
    format: StreamFormat,
    points: Vec<AccessPoint>,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl AccessIndex {
    /// Builds an index with the default checkpoint spacing.
    pub fn build<R: Read + Seek>(src: &mut R) -> Result<Self> {
        IndexBuilder::default().build(src)
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn points(&self) -> &[AccessPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bytes consumed from the handle, header and trailer included.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Index of the last access point at or before `offset`.
    pub fn locate(&self, offset: u64) -> usize {
        self.points
            .partition_point(|point| point.uncompressed_offset <= offset)
            .saturating_sub(1)
    }

    /// Uncompressed span covered by access point `i`: from its offset up to
    /// the next point, or to the end of the stream for the last one.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`. Indexes returned by [`locate`](Self::locate)
    /// are always valid.
    pub fn segment(&self, i: usize) -> Range<u64> {
        let start = self.points[i].uncompressed_offset;
        let end = self
            .points
            .get(i + 1)
            .map_or(self.uncompressed_size, |next| next.uncompressed_offset);
        start..end
    }

    /// Approximate heap footprint; dominated by one window per point.
    pub fn memory_bytes(&self) -> usize {
        self.points.capacity() * std::mem::size_of::<AccessPoint>() + self.points.len() * WINDOW_SIZE
    }

    #[cfg(test)]
    pub(crate) fn from_offsets(offsets: &[u64], uncompressed_size: u64) -> Self {
        let points = offsets
            .iter()
            .map(|&out| AccessPoint {
                compressed_offset: 0,
                bits: 0,
                uncompressed_offset: out,
                window: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            })
            .collect();
        Self {
            format: StreamFormat::Zlib,
            points,
            compressed_size: 0,
            uncompressed_size,
        }
    }
}

/// Performs the single decoding pass that produces an [`AccessIndex`].
#[derive(Debug, Clone, Copy)]
pub struct IndexBuilder {
    spacing: u64,
    input_chunk: usize,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_SPACING)
    }
}

impl IndexBuilder {
    /// Builder that emits an access point once more than `spacing`
    /// uncompressed bytes have been produced since the previous one.
    pub fn new(spacing: usize) -> Self {
        Self {
            spacing: spacing as u64,
            input_chunk: DEFAULT_INPUT_CHUNK,
        }
    }

    /// Compressed bytes read from the handle per refill. Zero is raised to 1.
    pub fn with_input_chunk(mut self, input_chunk: usize) -> Self {
        self.input_chunk = input_chunk.max(1);
        self
    }

    /// Decodes the first zlib or gzip stream in `src` from offset 0 and
    /// returns its index. The trailer check value is verified, so a
    /// successful build also proves the stream is intact. Anything after the
    /// first stream is ignored.
    pub fn build<R: Read + Seek>(&self, src: &mut R) -> Result<AccessIndex> {
        let started = Instant::now();
        src.seek(SeekFrom::Start(0))?;

        let mut input = InputBuffer::new(self.input_chunk, 0);
        let format = framing::read_header(&mut input, src)?;
        let mut check = StreamCheck::new(format);
        let mut inflater = Inflater::new();

        // Entry point right after the header; the index is never empty.
        let mut points = vec![AccessPoint {
            compressed_offset: input.position(),
            bits: 0,
            uncompressed_offset: 0,
            window: inflater.capture_window(),
        }];
        let mut last = 0u64;

        loop {
            let (step, produced) = inflater.inflate(&mut input, src, true)?;
            check.update(inflater.output(produced));
            match step {
                Step::StreamEnd => break,
                Step::BlockBoundary if inflater.total_out() - last > self.spacing => {
                    last = inflater.total_out();
                    points.push(AccessPoint {
                        compressed_offset: input.position(),
                        bits: inflater.boundary_bits()?,
                        uncompressed_offset: last,
                        window: inflater.capture_window(),
                    });
                }
                Step::BlockBoundary | Step::Progress => {}
            }
        }

        let uncompressed_size = inflater.total_out();
        check.verify_trailer(&mut input, src, uncompressed_size)?;
        // A boundary right before an empty final block covers no bytes.
        if points.len() > 1
            && points.last().map(AccessPoint::uncompressed_offset) == Some(uncompressed_size)
        {
            points.pop();
        }
        points.shrink_to_fit();

        let index = AccessIndex {
            format,
            points,
            compressed_size: input.position(),
            uncompressed_size,
        };
        log::debug!(
            "built {:?} access index: {} points, {} -> {} bytes in {:?}",
            format,
            index.len(),
            index.compressed_size,
            index.uncompressed_size,
            started.elapsed()
        );
        Ok(index)
    }
}
