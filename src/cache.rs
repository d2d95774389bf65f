//! Single-window byte cache above the extractor.
//!
//! The cache holds one contiguous run of decompressed bytes. A lookup inside
//! the run is served from memory; anything else discards the run and decodes
//! a new one around the requested offset, shaped by the [`BufferPolicy`].

use std::io::{Read, Seek};
use std::ops::Range;

use crate::config::BufferPolicy;
use crate::extract::extract;
use crate::index::AccessIndex;
use crate::{Error, Result};

/// Hit/miss counters for a [`BufferCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the buffered window.
    pub hits: u64,

    /// Lookups that forced a refill.
    pub misses: u64,

    /// Total bytes decoded by refills.
    pub bytes_filled: u64,
}

#[derive(Debug)]
pub struct BufferCache {
    policy: BufferPolicy,
    backward_margin: u64,
    forward_margin: u64,
    start: u64,
    data: Vec<u8>,
    stats: CacheStats,
}

impl BufferCache {
    pub fn new(policy: BufferPolicy, backward_margin: usize, forward_margin: usize) -> Self {
        Self {
            policy,
            backward_margin: backward_margin as u64,
            forward_margin: forward_margin as u64,
            start: 0,
            data: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: BufferPolicy) {
        if policy != self.policy {
            self.policy = policy;
            self.invalidate();
        }
    }

    /// New margins apply from the next refill; the current window is kept.
    pub fn set_margins(&mut self, backward_margin: usize, forward_margin: usize) {
        self.backward_margin = backward_margin as u64;
        self.forward_margin = forward_margin as u64;
    }

    /// Uncompressed span currently buffered.
    pub fn window(&self) -> Range<u64> {
        self.start..self.start + self.data.len() as u64
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset - self.start < self.data.len() as u64
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn invalidate(&mut self) {
        self.start = 0;
        self.data.clear();
    }

    /// Returns the byte at `offset`, refilling the window on a miss.
    pub fn get<R: Read + Seek>(
        &mut self,
        index: &AccessIndex,
        src: &mut R,
        offset: u64,
        input_chunk: usize,
    ) -> Result<u8> {
        let size = index.uncompressed_size();
        if offset >= size {
            return Err(Error::OutOfRange { offset, size });
        }
        if self.contains(offset) {
            self.stats.hits += 1;
            return Ok(self.data[(offset - self.start) as usize]);
        }

        self.stats.misses += 1;
        self.refill(index, src, offset, input_chunk)?;
        Ok(self.data[(offset - self.start) as usize])
    }

    /// Span to decode for a miss at `offset` under the current policy.
    pub fn refill_span(&self, index: &AccessIndex, offset: u64) -> Range<u64> {
        let size = index.uncompressed_size();
        match self.policy {
            BufferPolicy::FixedMargin => {
                let start = offset.saturating_sub(self.backward_margin);
                let end = offset
                    .saturating_add(self.forward_margin)
                    .saturating_add(1)
                    .min(size);
                start..end
            }
            BufferPolicy::IndexAligned => index.segment(index.locate(offset)),
        }
    }

    fn refill<R: Read + Seek>(
        &mut self,
        index: &AccessIndex,
        src: &mut R,
        offset: u64,
        input_chunk: usize,
    ) -> Result<()> {
        self.invalidate();
        let span = self.refill_span(index, offset);
        let len = usize::try_from(span.end - span.start)
            .map_err(|_| Error::Corrupt("cache window exceeds address space"))?;

        self.data.resize(len, 0);
        let filled = match extract(index, src, span.start, &mut self.data, input_chunk) {
            Ok(filled) => filled,
            Err(err) => {
                self.data.clear();
                return Err(err);
            }
        };
        if filled != len {
            self.data.clear();
            return Err(Error::Corrupt("compressed stream shorter than its index"));
        }
        self.start = span.start;
        self.stats.bytes_filled += len as u64;
        log::trace!(
            "cache refill {:?} for offset {} ({:?})",
            span,
            offset,
            self.policy
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::index::IndexBuilder;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("write");
        encoder.finish().expect("finish")
    }

    fn text(len: usize) -> Vec<u8> {
        let mut state = 0xdead_beef_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                b'a' + (state % 26) as u8
            })
            .collect()
    }

    #[test]
    fn fixed_margin_span_is_clipped() {
        let index = AccessIndex::from_offsets(&[0, 1000], 2000);
        let cache = BufferCache::new(BufferPolicy::FixedMargin, 100, 50);
        assert_eq!(cache.refill_span(&index, 500), 400..551);
        assert_eq!(cache.refill_span(&index, 20), 0..71);
        assert_eq!(cache.refill_span(&index, 1990), 1890..2000);
    }

    #[test]
    fn zero_margins_buffer_one_byte() {
        let index = AccessIndex::from_offsets(&[0], 10);
        let cache = BufferCache::new(BufferPolicy::FixedMargin, 0, 0);
        assert_eq!(cache.refill_span(&index, 4), 4..5);
    }

    #[test]
    fn index_aligned_span_matches_segment() {
        let index = AccessIndex::from_offsets(&[0, 1000, 2500], 3000);
        let cache = BufferCache::new(BufferPolicy::IndexAligned, 7, 7);
        assert_eq!(cache.refill_span(&index, 0), 0..1000);
        assert_eq!(cache.refill_span(&index, 999), 0..1000);
        assert_eq!(cache.refill_span(&index, 1000), 1000..2500);
        assert_eq!(cache.refill_span(&index, 2999), 2500..3000);
    }

    #[test]
    fn empty_cache_never_hits() {
        let mut cache = BufferCache::new(BufferPolicy::FixedMargin, 0, 0);
        assert!(!cache.contains(0));
        cache.set_policy(BufferPolicy::IndexAligned);
        assert!(!cache.contains(0));
        assert_eq!(cache.window(), 0..0);
    }

    #[test]
    fn short_refill_is_corrupt_and_empties_window() -> Result<()> {
        let data = text(100_000);
        let index = IndexBuilder::default().build(&mut Cursor::new(gzip(&data)))?;
        let mut cache = BufferCache::new(BufferPolicy::IndexAligned, 0, 0);

        let mut good = Cursor::new(gzip(&data));
        assert_eq!(cache.get(&index, &mut good, 10, 4096)?, data[10]);
        assert_eq!(cache.window(), 0..100_000);

        // A valid stream that ends before the length the index recorded.
        let mut shorter = Cursor::new(gzip(&data[..50_000]));
        cache.invalidate();
        let err = cache.get(&index, &mut shorter, 10, 4096).expect_err("short refill");
        assert!(err.is_corrupt(), "unexpected error {err:?}");
        assert_eq!(cache.window(), 0..0);
        Ok(())
    }

    #[test]
    fn failed_refill_empties_window() -> Result<()> {
        let data = text(300_000);
        let bytes = gzip(&data);
        let index = IndexBuilder::new(64 * 1024).build(&mut Cursor::new(bytes.clone()))?;
        let mut cache = BufferCache::new(BufferPolicy::FixedMargin, 1000, 1000);

        let mut src = Cursor::new(bytes.clone());
        assert_eq!(cache.get(&index, &mut src, 5_000, 4096)?, data[5_000]);
        assert!(cache.contains(5_000));

        let mut truncated = Cursor::new(bytes[..bytes.len() / 2].to_vec());
        let err = cache
            .get(&index, &mut truncated, 290_000, 4096)
            .expect_err("truncated refill");
        assert!(err.is_corrupt(), "unexpected error {err:?}");
        assert_eq!(cache.window(), 0..0);
        assert!(!cache.contains(5_000));
        assert_eq!(cache.stats().misses, 2);
        Ok(())
    }
}
