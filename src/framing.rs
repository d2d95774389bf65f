//! zlib (RFC 1950) and gzip (RFC 1952) wrappers around the raw DEFLATE data.

use std::io::Read;

use crate::inflate::InputBuffer;
use crate::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CM_DEFLATE: u8 = 8;

const GZ_FHCRC: u8 = 1 << 1;
const GZ_FEXTRA: u8 = 1 << 2;
const GZ_FNAME: u8 = 1 << 3;
const GZ_FCOMMENT: u8 = 1 << 4;
const GZ_RESERVED: u8 = 0xe0;

const ZLIB_FDICT: u8 = 1 << 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Zlib,
    Gzip,
}

/// Detects the wrapper and consumes its header. On return `input` is
/// positioned at the first byte of DEFLATE data.
pub(crate) fn read_header<R: Read>(input: &mut InputBuffer, src: &mut R) -> Result<StreamFormat> {
    let mut magic = [0u8; 2];
    input.read_exact(src, &mut magic)?;
    if magic == GZIP_MAGIC {
        read_gzip_header(input, src, magic)?;
        return Ok(StreamFormat::Gzip);
    }

    let (cmf, flg) = (magic[0], magic[1]);
    if cmf & 0x0f != CM_DEFLATE || cmf >> 4 > 7 || u16::from_be_bytes(magic) % 31 != 0 {
        return Err(Error::Corrupt("unrecognized stream header"));
    }
    if flg & ZLIB_FDICT != 0 {
        return Err(Error::Corrupt("zlib preset dictionary is not supported"));
    }
    Ok(StreamFormat::Zlib)
}

fn read_gzip_header<R: Read>(input: &mut InputBuffer, src: &mut R, magic: [u8; 2]) -> Result<()> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&magic);

    let mut fixed = [0u8; 8];
    input.read_exact(src, &mut fixed)?;
    hasher.update(&fixed);
    let (method, flags) = (fixed[0], fixed[1]);
    if method != CM_DEFLATE {
        return Err(Error::Corrupt("gzip compression method is not deflate"));
    }
    if flags & GZ_RESERVED != 0 {
        return Err(Error::Corrupt("gzip header has reserved flags set"));
    }

    if flags & GZ_FEXTRA != 0 {
        let mut len = [0u8; 2];
        input.read_exact(src, &mut len)?;
        hasher.update(&len);
        let mut extra = vec![0u8; u16::from_le_bytes(len) as usize];
        input.read_exact(src, &mut extra)?;
        hasher.update(&extra);
    }
    if flags & GZ_FNAME != 0 {
        skip_zero_terminated(input, src, &mut hasher)?;
    }
    if flags & GZ_FCOMMENT != 0 {
        skip_zero_terminated(input, src, &mut hasher)?;
    }
    if flags & GZ_FHCRC != 0 {
        let mut crc = [0u8; 2];
        input.read_exact(src, &mut crc)?;
        if u16::from_le_bytes(crc) != hasher.finalize() as u16 {
            return Err(Error::Corrupt("gzip header checksum mismatch"));
        }
    }
    Ok(())
}

fn skip_zero_terminated<R: Read>(
    input: &mut InputBuffer,
    src: &mut R,
    hasher: &mut crc32fast::Hasher,
) -> Result<()> {
    loop {
        let byte = input.read_u8(src)?;
        hasher.update(&[byte]);
        if byte == 0 {
            return Ok(());
        }
    }
}

/// Running check value over the decompressed bytes, verified against the
/// wrapper's trailer once the final block has been decoded.
pub(crate) enum StreamCheck {
    Crc32(crc32fast::Hasher),
    Adler32(adler2::Adler32),
}

impl StreamCheck {
    pub(crate) fn new(format: StreamFormat) -> Self {
        match format {
            StreamFormat::Gzip => StreamCheck::Crc32(crc32fast::Hasher::new()),
            StreamFormat::Zlib => StreamCheck::Adler32(adler2::Adler32::new()),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            StreamCheck::Crc32(hasher) => hasher.update(data),
            StreamCheck::Adler32(hasher) => hasher.write_slice(data),
        }
    }

    /// Consumes the trailer that follows the DEFLATE data and compares it with
    /// what was decoded. `total_out` is the uncompressed stream length.
    pub(crate) fn verify_trailer<R: Read>(
        self,
        input: &mut InputBuffer,
        src: &mut R,
        total_out: u64,
    ) -> Result<()> {
        match self {
            StreamCheck::Crc32(hasher) => {
                let mut trailer = [0u8; 8];
                input.read_exact(src, &mut trailer)?;
                let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
                let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
                if crc != hasher.finalize() {
                    return Err(Error::Corrupt("gzip crc32 mismatch"));
                }
                if isize != total_out as u32 {
                    return Err(Error::Corrupt("gzip length mismatch"));
                }
            }
            StreamCheck::Adler32(hasher) => {
                let mut trailer = [0u8; 4];
                input.read_exact(src, &mut trailer)?;
                if u32::from_be_bytes(trailer) != hasher.checksum() {
                    return Err(Error::Corrupt("zlib adler32 mismatch"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::{Compression, GzBuilder};

    fn header_of(bytes: &[u8]) -> Result<(StreamFormat, u64)> {
        let mut src = Cursor::new(bytes);
        let mut input = InputBuffer::new(3, 0);
        let format = read_header(&mut input, &mut src)?;
        Ok((format, input.position()))
    }

    #[test]
    fn detects_zlib() -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"zlib payload").expect("write");
        let bytes = encoder.finish().expect("finish");
        assert_eq!(header_of(&bytes)?, (StreamFormat::Zlib, 2));
        Ok(())
    }

    #[test]
    fn detects_plain_gzip() -> Result<()> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"gzip payload").expect("write");
        let bytes = encoder.finish().expect("finish");
        assert_eq!(header_of(&bytes)?, (StreamFormat::Gzip, 10));
        Ok(())
    }

    #[test]
    fn skips_optional_gzip_fields() -> Result<()> {
        let extra = vec![7u8; 5];
        let mut encoder = GzBuilder::new()
            .filename("data.bin")
            .comment("a comment")
            .extra(extra)
            .write(Vec::new(), Compression::fast());
        encoder.write_all(b"payload").expect("write");
        let bytes = encoder.finish().expect("finish");

        let expected = 10 + (2 + 5) + (b"data.bin".len() + 1) + (b"a comment".len() + 1);
        assert_eq!(header_of(&bytes)?, (StreamFormat::Gzip, expected as u64));
        Ok(())
    }

    #[test]
    fn verifies_gzip_header_crc() -> Result<()> {
        let mut header = vec![0x1f, 0x8b, 8, GZ_FHCRC, 0, 0, 0, 0, 0, 255];
        let crc = crc32fast::hash(&header) as u16;
        header.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(header_of(&header)?, (StreamFormat::Gzip, 12));

        let last = header.len() - 1;
        header[last] ^= 0xff;
        assert!(header_of(&header).expect_err("bad crc").is_corrupt());
        Ok(())
    }

    #[test]
    fn rejects_bad_headers() {
        let cases: [&[u8]; 5] = [
            b"PK\x03\x04",
            &[0x1f, 0x8b, 7, 0, 0, 0, 0, 0, 0, 0],
            &[0x1f, 0x8b, 8, 0x20, 0, 0, 0, 0, 0, 0],
            // zlib with FDICT set; 0x78bb passes the FCHECK test
            &[0x78, 0xbb, 0, 0, 0, 0],
            &[0x1f],
        ];
        for case in cases {
            let err = header_of(case).expect_err("header must be rejected");
            assert!(err.is_corrupt(), "unexpected error {err:?}");
        }
    }

    #[test]
    fn trailer_mismatch_is_corrupt() {
        let mut check = StreamCheck::new(StreamFormat::Zlib);
        check.update(b"abc");
        let mut src = Cursor::new(vec![0u8, 0, 0, 0]);
        let mut input = InputBuffer::new(16, 0);
        let err = check
            .verify_trailer(&mut input, &mut src, 3)
            .expect_err("wrong adler");
        assert!(err.is_corrupt());

        let mut check = StreamCheck::new(StreamFormat::Zlib);
        check.update(b"abc");
        let adler = adler2::adler32_slice(b"abc");
        let mut src = Cursor::new(adler.to_be_bytes().to_vec());
        let mut input = InputBuffer::new(16, 0);
        assert!(check.verify_trailer(&mut input, &mut src, 3).is_ok());
    }
}
