//! PNM (PGM/PPM) codec.
//!
//! Binary PNM only: magic `P5` (greyscale) or `P6` (RGB), an ASCII header
//! of width, height and maxval with optional `#` comment lines, a single
//! whitespace byte after maxval, then big-endian samples: one byte per
//! sample for `maxval <= 255`, two otherwise.
//!
//! Reads widen to the 16-bit families without rescaling. Writes always
//! use a maxval of 65535; float greyscale is linearly rescaled to
//! `[0, 65535]` by the image min/max (a single-valued image writes
//! zeros). PPM carries RGB only: alpha is dropped on write and set to
//! maximum on read.

use crate::error::{IoError, IoResult};
use crate::loader::{ImageLoader, ReadSeek};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use piv_core::util::pixel_range;
use piv_core::{G16Image, GfImage, Gray, ImageLike, ImageLikeMut, Rgba, Rgba16Image, Size};
use std::io::{SeekFrom, Write};

/// Layout parsed from a PNM header.
#[derive(Debug, Clone, Copy)]
struct PnmHeader {
    /// 5 for PGM, 6 for PPM.
    kind: u8,
    width: u32,
    height: u32,
    maxval: u32,
    /// Stream offset of the first sample byte.
    data_offset: u64,
}

/// Loader for binary PGM/PPM streams.
#[derive(Debug, Default)]
pub struct PnmLoader {
    header: Option<PnmHeader>,
}

impl PnmLoader {
    /// Creates an unopened loader.
    pub fn new() -> Self {
        Self { header: None }
    }

    fn header(&self) -> IoResult<PnmHeader> {
        self.header.ok_or(IoError::NotOpen)
    }

    fn check_index(&self, index: usize) -> IoResult<()> {
        if index != 0 {
            return Err(IoError::NoSuchImage { index, count: 1 });
        }
        Ok(())
    }

    /// Reads the sample data of a P5 stream, widening to 16-bit.
    fn read_g16(&self, is: &mut dyn ReadSeek) -> IoResult<G16Image> {
        let h = self.header()?;
        is.seek(SeekFrom::Start(h.data_offset))?;

        let mut im = G16Image::with_size(Size::new(h.width, h.height));
        if h.maxval <= 255 {
            let mut row = vec![0u8; h.width as usize];
            for y in 0..h.height {
                is.read_exact(&mut row)?;
                for (dst, &src) in im.line_mut(y).iter_mut().zip(row.iter()) {
                    *dst = Gray(u16::from(src));
                }
            }
        } else {
            let mut row = vec![0u16; h.width as usize];
            for y in 0..h.height {
                is.read_u16_into::<BigEndian>(&mut row)?;
                for (dst, &src) in im.line_mut(y).iter_mut().zip(row.iter()) {
                    *dst = Gray(src);
                }
            }
        }

        Ok(im)
    }

    /// Reads the sample data of a P6 stream, widening to 16-bit RGBA
    /// with alpha at maximum.
    fn read_rgba16(&self, is: &mut dyn ReadSeek) -> IoResult<Rgba16Image> {
        let h = self.header()?;
        is.seek(SeekFrom::Start(h.data_offset))?;

        let mut im = Rgba16Image::with_size(Size::new(h.width, h.height));
        if h.maxval <= 255 {
            let mut row = vec![0u8; 3 * h.width as usize];
            for y in 0..h.height {
                is.read_exact(&mut row)?;
                for (dst, rgb) in im.line_mut(y).iter_mut().zip(row.chunks_exact(3)) {
                    *dst = Rgba::new(
                        u16::from(rgb[0]),
                        u16::from(rgb[1]),
                        u16::from(rgb[2]),
                        u16::MAX,
                    );
                }
            }
        } else {
            let mut row = vec![0u16; 3 * h.width as usize];
            for y in 0..h.height {
                is.read_u16_into::<BigEndian>(&mut row)?;
                for (dst, rgb) in im.line_mut(y).iter_mut().zip(row.chunks_exact(3)) {
                    *dst = Rgba::new(rgb[0], rgb[1], rgb[2], u16::MAX);
                }
            }
        }

        Ok(im)
    }
}

fn read_byte(is: &mut dyn ReadSeek) -> IoResult<u8> {
    let mut b = [0u8; 1];
    is.read_exact(&mut b)?;
    Ok(b[0])
}

/// Reads one whitespace-delimited header token, skipping `#` comment
/// lines. Consumes exactly one terminating whitespace byte, which is
/// what leaves the stream at the first sample after the maxval token.
fn read_token(is: &mut dyn ReadSeek) -> IoResult<String> {
    let mut b = read_byte(is)?;
    loop {
        if b == b'#' {
            while b != b'\n' {
                b = read_byte(is)?;
            }
        } else if b.is_ascii_whitespace() {
            b = read_byte(is)?;
        } else {
            break;
        }
    }

    let mut token = Vec::new();
    loop {
        token.push(b);
        match read_byte(is) {
            Ok(next) if !next.is_ascii_whitespace() => b = next,
            Ok(_) => break,
            Err(_) => break,
        }
    }

    String::from_utf8(token).map_err(|_| IoError::malformed("non-ASCII header token"))
}

fn parse_u32(token: &str, what: &str) -> IoResult<u32> {
    token
        .parse::<u32>()
        .map_err(|_| IoError::malformed(format!("bad {what}: {token:?}")))
}

fn header_kind(header: &[u8]) -> Option<u8> {
    if header.len() >= 2 && header[0] == b'P' && (header[1] == b'5' || header[1] == b'6') {
        Some(header[1] - b'0')
    } else {
        None
    }
}

impl ImageLoader for PnmLoader {
    fn name(&self) -> &'static str {
        "image/x-portable-anymap"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn clone_loader(&self) -> Box<dyn ImageLoader> {
        Box::new(PnmLoader::new())
    }

    fn can_load(&self, header: &[u8]) -> bool {
        header_kind(header).is_some()
    }

    fn can_save(&self) -> bool {
        true
    }

    fn num_images(&self) -> usize {
        // PNM files only ever contain a single image
        1
    }

    fn open(&mut self, is: &mut dyn ReadSeek) -> IoResult<()> {
        self.header = None;

        let mut magic = [0u8; 2];
        is.read_exact(&mut magic)?;
        let kind = header_kind(&magic)
            .ok_or_else(|| IoError::malformed(format!("unsupported magic {magic:?}")))?;

        let width = parse_u32(&read_token(is)?, "width")?;
        let height = parse_u32(&read_token(is)?, "height")?;
        let maxval = parse_u32(&read_token(is)?, "maxval")?;
        if maxval == 0 || maxval > 65535 {
            return Err(IoError::malformed(format!("maxval {maxval} out of range")));
        }

        self.header = Some(PnmHeader {
            kind,
            width,
            height,
            maxval,
            data_offset: is.stream_position()?,
        });
        Ok(())
    }

    fn extract_g16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<G16Image> {
        self.check_index(index)?;
        match self.header()?.kind {
            5 => self.read_g16(is),
            _ => Ok(self.read_rgba16(is)?.convert()),
        }
    }

    fn extract_gf(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<GfImage> {
        Ok(self.extract_g16(is, index)?.convert())
    }

    fn extract_rgba16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<Rgba16Image> {
        self.check_index(index)?;
        match self.header()?.kind {
            5 => Ok(self.read_g16(is)?.convert()),
            _ => self.read_rgba16(is),
        }
    }

    fn save_g16(&self, os: &mut dyn Write, im: &G16Image) -> IoResult<()> {
        write!(os, "P5\n# created by piv-io\n{} {}\n65535\n", im.width(), im.height())?;
        for y in 0..im.height() {
            for p in im.line(y) {
                os.write_u16::<BigEndian>(p.0)?;
            }
        }
        os.flush()?;
        Ok(())
    }

    fn save_gf(&self, os: &mut dyn Write, im: &GfImage) -> IoResult<()> {
        let (min, max) = pixel_range(im).unwrap_or((0.0, 0.0));
        // a single-valued image has no usable range; every sample maps to 0
        let range = if max == min { 1.0 } else { max - min };

        write!(os, "P5\n# created by piv-io\n{} {}\n65535\n", im.width(), im.height())?;
        for y in 0..im.height() {
            for p in im.line(y) {
                let scaled = (f64::from(u16::MAX) * (p.0 - min) / range) as u16;
                os.write_u16::<BigEndian>(scaled)?;
            }
        }
        os.flush()?;
        Ok(())
    }

    fn save_rgba16(&self, os: &mut dyn Write, im: &Rgba16Image) -> IoResult<()> {
        write!(os, "P6\n# created by piv-io\n{} {}\n65535\n", im.width(), im.height())?;
        // RGB only; alpha is not representable in PPM
        for y in 0..im.height() {
            for p in im.line(y) {
                os.write_u16::<BigEndian>(p.r)?;
                os.write_u16::<BigEndian>(p.g)?;
                os.write_u16::<BigEndian>(p.b)?;
            }
        }
        os.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piv_core::util;
    use std::io::Cursor;

    fn open_cursor(bytes: Vec<u8>) -> (PnmLoader, Cursor<Vec<u8>>) {
        let mut loader = PnmLoader::new();
        let mut cur = Cursor::new(bytes);
        loader.open(&mut cur).unwrap();
        (loader, cur)
    }

    #[test]
    fn test_reads_8bit_pgm() {
        let bytes = b"P5\n# a comment\n3 2\n255\n\x00\x01\x02\x03\x04\x05".to_vec();
        let (mut loader, mut cur) = open_cursor(bytes);

        assert_eq!(loader.num_images(), 1);
        let im = loader.extract_g16(&mut cur, 0).unwrap();
        assert_eq!(im.size(), Size::new(3, 2));
        assert_eq!(im[(0, 0)], Gray(0));
        assert_eq!(im[(2, 1)], Gray(5));
    }

    #[test]
    fn test_reads_16bit_pgm_big_endian() {
        let mut bytes = b"P5\n2 1\n65535\n".to_vec();
        bytes.extend_from_slice(&[0x01, 0x00, 0xff, 0xfe]);
        let (mut loader, mut cur) = open_cursor(bytes);

        let im = loader.extract_g16(&mut cur, 0).unwrap();
        assert_eq!(im[(0, 0)], Gray(256));
        assert_eq!(im[(1, 0)], Gray(0xfffe));
    }

    #[test]
    fn test_reads_ppm_with_max_alpha() {
        let bytes = b"P6\n1 1\n255\n\x0a\x14\x1e".to_vec();
        let (mut loader, mut cur) = open_cursor(bytes);

        let im = loader.extract_rgba16(&mut cur, 0).unwrap();
        assert_eq!(im[(0, 0)], Rgba::new(10, 20, 30, u16::MAX));
    }

    #[test]
    fn test_extract_before_open_fails() {
        let mut loader = PnmLoader::new();
        let mut cur = Cursor::new(Vec::new());
        assert!(matches!(
            loader.extract_g16(&mut cur, 0),
            Err(IoError::NotOpen)
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let (mut loader, mut cur) = open_cursor(b"P5\n1 1\n255\n\x00".to_vec());
        assert!(matches!(
            loader.extract_g16(&mut cur, 1),
            Err(IoError::NoSuchImage { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_magic() {
        let mut loader = PnmLoader::new();
        let mut cur = Cursor::new(b"P3\n1 1\n255\n".to_vec());
        assert!(loader.open(&mut cur).is_err());
    }

    #[test]
    fn test_g16_round_trip() {
        let mut im = G16Image::with_size(Size::new(4, 3));
        util::apply(&mut im, |i, _| Gray((i * 1000) as u16));

        let mut bytes = Vec::new();
        PnmLoader::new().save_g16(&mut bytes, &im).unwrap();

        let (mut loader, mut cur) = open_cursor(bytes);
        assert_eq!(loader.extract_g16(&mut cur, 0).unwrap(), im);
    }

    #[test]
    fn test_gf_save_rescales_to_full_range() {
        let mut im = GfImage::with_size(Size::new(2, 1));
        im[(0, 0)] = Gray(-1.0);
        im[(1, 0)] = Gray(3.0);

        let mut bytes = Vec::new();
        PnmLoader::new().save_gf(&mut bytes, &im).unwrap();

        let (mut loader, mut cur) = open_cursor(bytes);
        let restored = loader.extract_g16(&mut cur, 0).unwrap();
        assert_eq!(restored[(0, 0)], Gray(0));
        assert_eq!(restored[(1, 0)], Gray(u16::MAX));
    }

    #[test]
    fn test_gf_save_single_valued_image_writes_zeros() {
        let im = GfImage::filled(Size::new(2, 2), Gray(7.5));

        let mut bytes = Vec::new();
        PnmLoader::new().save_gf(&mut bytes, &im).unwrap();

        let (mut loader, mut cur) = open_cursor(bytes);
        let restored = loader.extract_g16(&mut cur, 0).unwrap();
        assert!(restored.iter().all(|&p| p == Gray(0)));
    }

    #[test]
    fn test_rgba16_round_trip_drops_alpha() {
        let im = Rgba16Image::filled(Size::new(2, 2), Rgba::new(1, 2, 3, 77));

        let mut bytes = Vec::new();
        PnmLoader::new().save_rgba16(&mut bytes, &im).unwrap();

        let (mut loader, mut cur) = open_cursor(bytes);
        let restored = loader.extract_rgba16(&mut cur, 0).unwrap();
        assert_eq!(restored[(0, 0)], Rgba::new(1, 2, 3, u16::MAX));
    }

    #[test]
    fn test_p6_to_greyscale_uses_luminance() {
        let bytes = b"P6\n1 1\n255\n\x64\xc8\x32".to_vec();
        let (mut loader, mut cur) = open_cursor(bytes);

        // (100*218 + 200*732 + 50*74) >> 10
        let im = loader.extract_g16(&mut cur, 0).unwrap();
        assert_eq!(im[(0, 0)], Gray(167));
    }
}
