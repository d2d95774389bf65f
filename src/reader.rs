use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::cache::{BufferCache, CacheStats};
use crate::config::{BufferPolicy, ReaderConfig};
use crate::extract::extract;
use crate::index::{AccessIndex, IndexBuilder};
use crate::{Error, Result};

/// Random-access reader over a zlib or gzip stream.
///
/// Holds the compressed handle, the [`AccessIndex`] built from it and a
/// single-window [`BufferCache`] for byte-at-a-time access. A reader opened
/// from a path owns its file and closes it; a reader built from a caller's
/// handle hands it back on [`close`](Self::close) and never closes it.
///
/// ```rust,ignore
/// use zseek::RandomAccessReader;
///
/// let mut reader = RandomAccessReader::open("data.gz")?;
/// let mut buf = [0u8; 64];
/// let n = reader.read_at(3_000_000, &mut buf)?;
/// let b = reader.byte_at(42);
/// ```
pub struct RandomAccessReader<R> {
    handle: Option<R>,
    owns_handle: bool,
    index: Option<AccessIndex>,
    cache: BufferCache,
    cursor: u64,
    config: ReaderConfig,
}

impl RandomAccessReader<File> {
    /// Opens a compressed file with the default configuration and builds its
    /// index. The reader owns the file and closes it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be opened or read, and
    /// `Error::Corrupt` if it is not a valid zlib or gzip stream.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    /// Opens a compressed file with an explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - zlib or gzip file to read
    /// * `config` - cache margins, policy and checkpoint spacing
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open). No index build is attempted when
    /// `config.build_index_on_open` is false, so only opening can fail.
    pub fn open_with_config(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::with_handle(file, true, config)
    }
}

impl<R: Read + Seek> RandomAccessReader<R> {
    /// Wraps a caller-owned handle. Pass `&mut File` to keep using the file
    /// afterwards, or take it back with [`close`](Self::close).
    pub fn from_handle(handle: R) -> Result<Self> {
        Self::from_handle_with_config(handle, ReaderConfig::default())
    }

    /// Wraps a caller-owned handle with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the index build error when `config.build_index_on_open` is
    /// set and the stream cannot be indexed.
    pub fn from_handle_with_config(handle: R, config: ReaderConfig) -> Result<Self> {
        Self::with_handle(handle, false, config)
    }

    fn with_handle(handle: R, owns_handle: bool, config: ReaderConfig) -> Result<Self> {
        let mut reader = Self {
            handle: Some(handle),
            owns_handle,
            index: None,
            cache: BufferCache::new(
                config.buffer_policy,
                config.backward_margin,
                config.forward_margin,
            ),
            cursor: 0,
            config,
        };
        if config.build_index_on_open {
            reader.build_index()?;
        }
        Ok(reader)
    }

    /// (Re)builds the access index. On failure the reader is left without an
    /// index and [`is_ready`](Self::is_ready) reports false; the build may be
    /// retried.
    pub fn build_index(&mut self) -> Result<()> {
        self.index = None;
        self.cache.invalidate();
        self.cursor = 0;
        let handle = self.handle.as_mut().ok_or(Error::NotReady)?;
        let index = IndexBuilder::new(self.config.checkpoint_spacing)
            .with_input_chunk(self.config.input_chunk())
            .build(handle)
            .map_err(|err| {
                log::warn!("access index build failed: {err}");
                err
            })?;
        self.index = Some(index);
        Ok(())
    }

    /// Releases the index and cache. Returns the handle when it belongs to
    /// the caller; a handle opened from a path is closed. Calling this again
    /// is a no-op that returns `None`.
    pub fn close(&mut self) -> Option<R> {
        self.index = None;
        self.cache.invalidate();
        self.cursor = 0;
        let handle = self.handle.take()?;
        if self.owns_handle {
            drop(handle);
            None
        } else {
            Some(handle)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_some() && self.index.is_some()
    }

    pub fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Uncompressed stream length; 0 until the index is built.
    pub fn size(&self) -> u64 {
        self.index.as_ref().map_or(0, AccessIndex::uncompressed_size)
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn index(&self) -> Option<&AccessIndex> {
        self.index.as_ref()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Sets the fixed-margin cache extents used by the next refill.
    pub fn set_buffer_margins(&mut self, backward: usize, forward: usize) {
        self.config.backward_margin = backward;
        self.config.forward_margin = forward;
        self.cache.set_margins(backward, forward);
    }

    pub fn set_buffer_policy(&mut self, policy: BufferPolicy) {
        self.config.buffer_policy = policy;
        self.cache.set_policy(policy);
    }

    /// Moves the sequential cursor. `pos` may equal [`size`](Self::size).
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        let size = self.ready_index()?.uncompressed_size();
        if pos > size {
            return Err(Error::OutOfRange { offset: pos, size });
        }
        self.cursor = pos;
        Ok(())
    }

    /// Fills `buf` from `offset` without touching the cursor. Returns the
    /// number of bytes read, short only at end of stream.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let input_chunk = self.config.input_chunk();
        let (index, handle) = self.parts()?;
        let size = index.uncompressed_size();
        if offset > size {
            return Err(Error::OutOfRange { offset, size });
        }
        extract(index, handle, offset, buf, input_chunk)
    }

    /// Like [`read_at`](Self::read_at) but allocates the result.
    pub fn read_bytes_at(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        let available = self.size().saturating_sub(offset);
        let len = count.min(usize::try_from(available).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; len];
        let n = self.read_at(offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads up to `count` bytes at the cursor and advances it by the number
    /// actually returned.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let data = self.read_bytes_at(self.cursor, count)?;
        self.cursor += data.len() as u64;
        Ok(data)
    }

    /// Cached single-byte access that never fails: out of range, not ready
    /// and decode errors all yield `0`, which cannot be told apart from a
    /// real zero byte. Use [`try_byte_at`](Self::try_byte_at) to see errors.
    pub fn byte_at(&mut self, pos: u64) -> u8 {
        match self.try_byte_at(pos) {
            Ok(byte) => byte,
            Err(err) => {
                log::debug!("byte_at({pos}) -> 0: {err}");
                0
            }
        }
    }

    /// Byte at `pos`, served from the cache window and refilled on a miss.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` without an index, `Error::OutOfRange` when
    /// `pos >= size()`, and the extraction error if the refill fails.
    pub fn try_byte_at(&mut self, pos: u64) -> Result<u8> {
        let input_chunk = self.config.input_chunk();
        let (Some(index), Some(handle)) = (self.index.as_ref(), self.handle.as_mut()) else {
            return Err(Error::NotReady);
        };
        self.cache.get(index, handle, pos, input_chunk)
    }

    fn ready_index(&self) -> Result<&AccessIndex> {
        match (&self.index, &self.handle) {
            (Some(index), Some(_)) => Ok(index),
            _ => Err(Error::NotReady),
        }
    }

    fn parts(&mut self) -> Result<(&AccessIndex, &mut R)> {
        match (self.index.as_ref(), self.handle.as_mut()) {
            (Some(index), Some(handle)) => Ok((index, handle)),
            _ => Err(Error::NotReady),
        }
    }
}

impl<R: Read + Seek> Read for RandomAccessReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.cursor, buf)?;
        self.cursor += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for RandomAccessReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let size = self.ready_index()?.uncompressed_size();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.cursor.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}
