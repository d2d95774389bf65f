//! Thin adapter over the `miniz_oxide` inflate core.
//!
//! `InputBuffer` reads compressed bytes from the handle in fixed chunks and
//! tracks the absolute offset of the next unconsumed byte. `Inflater` drives a
//! raw DEFLATE decoder into a circular output ring large enough to keep the
//! 32 KiB dictionary behind the write position.

use std::io::{self, Read};
use std::ops::Range;

use miniz_oxide::inflate::core::{
    decompress, inflate_flags, BlockBoundaryState, DecompressorOxide,
};
use miniz_oxide::inflate::TINFLStatus;

use crate::config::WINDOW_SIZE;
use crate::{Error, Result};

/// Output ring size. Must be a power of two and hold at least one window.
pub(crate) const RING_SIZE: usize = 2 * WINDOW_SIZE;

pub(crate) struct InputBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    /// Absolute stream offset of `buf[start]`.
    pos: u64,
    eof: bool,
}

impl InputBuffer {
    pub(crate) fn new(chunk: usize, pos: u64) -> Self {
        Self {
            buf: vec![0; chunk.max(1)],
            start: 0,
            end: 0,
            pos,
            eof: false,
        }
    }

    /// Absolute offset of the next byte that has not been consumed.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn available(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.eof
    }

    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.end - self.start);
        self.start += n;
        self.pos += n as u64;
    }

    /// Reads the next chunk once the buffer is drained. Returns the number of
    /// new bytes; zero marks end of input.
    pub(crate) fn refill<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        if !self.is_empty() {
            return Ok(self.end - self.start);
        }
        self.start = 0;
        self.end = 0;
        let n = loop {
            match src.read(&mut self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        self.end = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    pub(crate) fn read_u8<R: Read>(&mut self, src: &mut R) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(src, &mut byte)?;
        Ok(byte[0])
    }

    /// Fills `out` from buffered input, refilling as needed. Running out of
    /// input is a data error: the stream ended inside a header or trailer.
    pub(crate) fn read_exact<R: Read>(&mut self, src: &mut R, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if self.is_empty() && self.refill(src)? == 0 {
                return Err(Error::Corrupt("unexpected end of compressed stream"));
            }
            let avail = self.available();
            let n = avail.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&avail[..n]);
            self.consume(n);
            filled += n;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Output or input ran out; call again.
    Progress,
    /// A non-final deflate block just ended.
    BlockBoundary,
    /// The final block has been decoded.
    StreamEnd,
}

pub(crate) struct Inflater {
    decomp: Box<DecompressorOxide>,
    ring: Vec<u8>,
    ring_pos: usize,
    total_out: u64,
    done: bool,
}

impl Inflater {
    /// Fresh raw decoder positioned at the first block of a stream.
    pub(crate) fn new() -> Self {
        Self {
            decomp: Box::default(),
            ring: vec![0; RING_SIZE],
            ring_pos: 0,
            total_out: 0,
            done: false,
        }
    }

    /// Raw decoder resuming at a block boundary. `bits` of `bit_buf` (low
    /// bits) are the tail of the previous byte; `window` is the history that
    /// preceded uncompressed offset `out`.
    pub(crate) fn resume(bits: u8, bit_buf: u8, window: &[u8], out: u64) -> Self {
        debug_assert_eq!(window.len(), WINDOW_SIZE);
        let state = BlockBoundaryState {
            num_bits: bits,
            bit_buf,
            ..Default::default()
        };
        let mut ring = vec![0; RING_SIZE];
        ring[..WINDOW_SIZE].copy_from_slice(window);
        Self {
            decomp: Box::new(DecompressorOxide::from_block_boundary_state(&state)),
            ring,
            ring_pos: WINDOW_SIZE,
            total_out: out,
            done: false,
        }
    }

    /// Uncompressed bytes produced so far, including the resume offset.
    pub(crate) fn total_out(&self) -> u64 {
        self.total_out
    }

    pub(crate) fn output(&self, range: Range<usize>) -> &[u8] {
        &self.ring[range]
    }

    /// Runs the decoder once. The returned range indexes the bytes produced by
    /// this call in the ring; they stay valid until the next call.
    pub(crate) fn inflate<R: Read>(
        &mut self,
        input: &mut InputBuffer,
        src: &mut R,
        stop_at_block: bool,
    ) -> Result<(Step, Range<usize>)> {
        if self.done {
            return Ok((Step::StreamEnd, self.ring_pos..self.ring_pos));
        }
        if self.ring_pos == self.ring.len() {
            self.ring_pos = 0;
        }
        if input.is_empty() {
            input.refill(src)?;
        }

        let mut flags = 0;
        if !input.at_eof() {
            flags |= inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        }
        if stop_at_block {
            flags |= inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY;
        }

        let start = self.ring_pos;
        let (status, consumed, produced) =
            decompress(&mut self.decomp, input.available(), &mut self.ring, start, flags);
        input.consume(consumed);
        self.ring_pos += produced;
        self.total_out += produced as u64;

        let step = match status {
            TINFLStatus::Done => {
                self.done = true;
                Step::StreamEnd
            }
            TINFLStatus::BlockBoundary => Step::BlockBoundary,
            TINFLStatus::HasMoreOutput | TINFLStatus::NeedsMoreInput => Step::Progress,
            TINFLStatus::FailedCannotMakeProgress => {
                return Err(Error::Corrupt("compressed stream is truncated"))
            }
            _ => return Err(Error::Corrupt("invalid deflate data")),
        };
        Ok((step, start..start + produced))
    }

    /// Bits of the last consumed byte that belong to the next block. Only
    /// valid right after `Step::BlockBoundary`.
    pub(crate) fn boundary_bits(&self) -> Result<u8> {
        self.decomp
            .block_boundary_state()
            .map(|state| state.num_bits)
            .ok_or(Error::Corrupt("decoder is not at a block boundary"))
    }

    /// The `WINDOW_SIZE` bytes preceding the write position, oldest first.
    /// Before a full window has been produced the front is zero padding.
    pub(crate) fn capture_window(&self) -> Box<[u8]> {
        let mut window = vec![0u8; WINDOW_SIZE].into_boxed_slice();
        let start = (self.ring_pos + RING_SIZE - WINDOW_SIZE) % RING_SIZE;
        if start + WINDOW_SIZE <= RING_SIZE {
            window.copy_from_slice(&self.ring[start..start + WINDOW_SIZE]);
        } else {
            let head = RING_SIZE - start;
            window[..head].copy_from_slice(&self.ring[start..]);
            window[head..].copy_from_slice(&self.ring[..WINDOW_SIZE - head]);
        }
        window
    }
}
