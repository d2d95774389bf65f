use std::io::{Read, Seek, SeekFrom};

use crate::index::{AccessIndex, AccessPoint};
use crate::inflate::{Inflater, InputBuffer, Step};
use crate::Result;

/// Reads up to `buf.len()` uncompressed bytes starting at `offset`.
///
/// Decoding resumes at the nearest access point at or before `offset`; the
/// bytes between that point and `offset` are decoded through the output ring
/// and dropped. Returns fewer bytes than requested only when the stream ends
/// first, and `Ok(0)` for offsets at or past the end.
pub fn extract<R: Read + Seek>(
    index: &AccessIndex,
    src: &mut R,
    offset: u64,
    buf: &mut [u8],
    input_chunk: usize,
) -> Result<usize> {
    if buf.is_empty() || offset >= index.uncompressed_size() {
        return Ok(0);
    }
    let point = &index.points()[index.locate(offset)];
    extract_from(point, src, offset, buf, input_chunk)
}

/// Same as [`extract`] but resumes from the given access point, which must
/// not lie past `offset`.
pub(crate) fn extract_from<R: Read + Seek>(
    point: &AccessPoint,
    src: &mut R,
    offset: u64,
    buf: &mut [u8],
    input_chunk: usize,
) -> Result<usize> {
    debug_assert!(point.uncompressed_offset() <= offset);

    let bits = point.bits();
    let start = point.compressed_offset() - u64::from(bits > 0);
    src.seek(SeekFrom::Start(start))?;
    let mut input = InputBuffer::new(input_chunk, start);
    let bit_buf = if bits > 0 {
        input.read_u8(src)? >> (8 - bits)
    } else {
        0
    };
    let mut inflater = Inflater::resume(bits, bit_buf, point.window(), point.uncompressed_offset());

    let mut skip = offset - point.uncompressed_offset();
    let mut filled = 0;
    while filled < buf.len() {
        let (step, produced) = inflater.inflate(&mut input, src, false)?;
        let mut out = inflater.output(produced);
        if skip > 0 {
            let n = out.len().min(usize::try_from(skip).unwrap_or(usize::MAX));
            skip -= n as u64;
            out = &out[n..];
        }
        let n = out.len().min(buf.len() - filled);
        buf[filled..filled + n].copy_from_slice(&out[..n]);
        filled += n;
        if step == Step::StreamEnd {
            break;
        }
    }

    log::trace!(
        "extracted {} bytes at {} from point {}",
        filled,
        offset,
        point.uncompressed_offset()
    );
    Ok(filled)
}
