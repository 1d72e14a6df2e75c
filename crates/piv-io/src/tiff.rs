//! Baseline TIFF reader.
//!
//! Read-only support for the subset PIV captures actually use: little- or
//! big-endian headers (`II*\0`, `MM\0*`), uncompressed strips, contiguous
//! planar layout, unsigned 8- or 16-bit samples, 1 (greyscale) or 3 (RGB)
//! samples per pixel. Multi-image files are addressable by directory
//! index; the whole IFD chain is walked at [`open`](ImageLoader::open).
//!
//! Anything outside that subset surfaces as
//! [`IoError::UnsupportedLayout`].

use crate::error::{IoError, IoResult};
use crate::loader::{ImageLoader, ReadSeek};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use piv_core::{G16Image, GfImage, Gray, ImageLikeMut, Rgba, Rgba16Image, Size};
use std::io::{SeekFrom, Write};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_SAMPLE_FORMAT: u16 = 339;

const COMPRESSION_NONE: u64 = 1;
const PLANAR_CONTIG: u64 = 1;
const SAMPLE_FORMAT_UINT: u64 = 1;

/// IFD-chain length guard against cyclic next-offsets.
const MAX_DIRECTORIES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: [u8; 4],
}

/// One image directory, with defaults already applied.
#[derive(Debug, Clone)]
struct TiffDir {
    width: u32,
    height: u32,
    bits_per_sample: u64,
    samples_per_pixel: u64,
    compression: u64,
    planar: u64,
    sample_format: u64,
    strip_offsets: Vec<u64>,
    strip_byte_counts: Vec<u64>,
}

#[derive(Debug)]
struct TiffState {
    endian: Endian,
    dirs: Vec<TiffDir>,
}

/// Loader for baseline TIFF streams. Read-only.
#[derive(Debug, Default)]
pub struct TiffLoader {
    state: Option<TiffState>,
}

impl TiffLoader {
    /// Creates an unopened loader.
    pub fn new() -> Self {
        Self { state: None }
    }

    fn state(&self) -> IoResult<&TiffState> {
        self.state.as_ref().ok_or(IoError::NotOpen)
    }

    fn dir(&self, index: usize) -> IoResult<(Endian, TiffDir)> {
        let state = self.state()?;
        let dir = state.dirs.get(index).ok_or(IoError::NoSuchImage {
            index,
            count: state.dirs.len(),
        })?;
        Ok((state.endian, dir.clone()))
    }

    /// Reads the numeric values of one entry, following the value offset
    /// when they do not fit inline.
    fn entry_values(endian: Endian, is: &mut dyn ReadSeek, entry: &IfdEntry) -> IoResult<Vec<u64>> {
        let elem_size: usize = match entry.field_type {
            1 => 1, // BYTE
            3 => 2, // SHORT
            4 => 4, // LONG
            t => {
                return Err(IoError::unsupported(format!(
                    "field type {t} for tag {}",
                    entry.tag
                )));
            }
        };

        let count = entry.count as usize;
        let total = elem_size * count;
        let bytes = if total <= 4 {
            entry.value[..total].to_vec()
        } else {
            let offset = u64::from(endian.u32(&entry.value));
            let pos = is.stream_position()?;
            is.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; total];
            is.read_exact(&mut buf)?;
            is.seek(SeekFrom::Start(pos))?;
            buf
        };

        Ok((0..count)
            .map(|i| {
                let b = &bytes[i * elem_size..];
                match entry.field_type {
                    1 => u64::from(b[0]),
                    3 => u64::from(endian.u16(b)),
                    _ => u64::from(endian.u32(b)),
                }
            })
            .collect())
    }

    fn parse_directory(
        endian: Endian,
        is: &mut dyn ReadSeek,
        offset: u64,
    ) -> IoResult<(TiffDir, u64)> {
        is.seek(SeekFrom::Start(offset))?;

        let mut count_buf = [0u8; 2];
        is.read_exact(&mut count_buf)?;
        let count = endian.u16(&count_buf) as usize;

        let mut block = vec![0u8; count * 12 + 4];
        is.read_exact(&mut block)?;
        let next = u64::from(endian.u32(&block[count * 12..]));

        let mut dir = TiffDir {
            width: 0,
            height: 0,
            bits_per_sample: 1,
            samples_per_pixel: 1,
            compression: COMPRESSION_NONE,
            planar: PLANAR_CONTIG,
            sample_format: SAMPLE_FORMAT_UINT,
            strip_offsets: Vec::new(),
            strip_byte_counts: Vec::new(),
        };

        for raw in block[..count * 12].chunks_exact(12) {
            let entry = IfdEntry {
                tag: endian.u16(&raw[0..2]),
                field_type: endian.u16(&raw[2..4]),
                count: endian.u32(&raw[4..8]),
                value: [raw[8], raw[9], raw[10], raw[11]],
            };

            let first = |vals: &[u64]| vals.first().copied().unwrap_or(0);
            match entry.tag {
                TAG_IMAGE_WIDTH => dir.width = first(&Self::entry_values(endian, is, &entry)?) as u32,
                TAG_IMAGE_LENGTH => {
                    dir.height = first(&Self::entry_values(endian, is, &entry)?) as u32;
                }
                TAG_BITS_PER_SAMPLE => {
                    let vals = Self::entry_values(endian, is, &entry)?;
                    if vals.windows(2).any(|w| w[0] != w[1]) {
                        return Err(IoError::unsupported(format!(
                            "mixed bits-per-sample {vals:?}"
                        )));
                    }
                    dir.bits_per_sample = first(&vals);
                }
                TAG_COMPRESSION => {
                    dir.compression = first(&Self::entry_values(endian, is, &entry)?);
                }
                TAG_STRIP_OFFSETS => dir.strip_offsets = Self::entry_values(endian, is, &entry)?,
                TAG_SAMPLES_PER_PIXEL => {
                    dir.samples_per_pixel = first(&Self::entry_values(endian, is, &entry)?);
                }
                TAG_STRIP_BYTE_COUNTS => {
                    dir.strip_byte_counts = Self::entry_values(endian, is, &entry)?;
                }
                TAG_PLANAR_CONFIG => {
                    dir.planar = first(&Self::entry_values(endian, is, &entry)?);
                }
                TAG_SAMPLE_FORMAT => {
                    dir.sample_format = first(&Self::entry_values(endian, is, &entry)?);
                }
                // ROWS_PER_STRIP only matters for strip assembly, which
                // concatenates byte counts anyway
                TAG_ROWS_PER_STRIP => {}
                _ => {}
            }
        }

        Ok((dir, next))
    }

    fn check_layout(dir: &TiffDir) -> IoResult<()> {
        if dir.compression != COMPRESSION_NONE {
            return Err(IoError::unsupported(format!(
                "compression {}",
                dir.compression
            )));
        }
        if dir.planar != PLANAR_CONTIG {
            return Err(IoError::unsupported(format!(
                "planar configuration {}",
                dir.planar
            )));
        }
        if dir.sample_format != SAMPLE_FORMAT_UINT {
            return Err(IoError::unsupported(format!(
                "sample format {}",
                dir.sample_format
            )));
        }
        if dir.bits_per_sample != 8 && dir.bits_per_sample != 16 {
            return Err(IoError::unsupported(format!(
                "{} bits per sample",
                dir.bits_per_sample
            )));
        }
        if dir.samples_per_pixel != 1 && dir.samples_per_pixel != 3 {
            return Err(IoError::unsupported(format!(
                "{} samples per pixel",
                dir.samples_per_pixel
            )));
        }
        if dir.strip_offsets.is_empty() || dir.strip_offsets.len() != dir.strip_byte_counts.len() {
            return Err(IoError::malformed(
                "strip offsets and byte counts missing or mismatched",
            ));
        }
        Ok(())
    }

    /// Concatenates all strips into one contiguous sample buffer.
    fn read_strips(dir: &TiffDir, is: &mut dyn ReadSeek) -> IoResult<Vec<u8>> {
        let expected = dir.width as usize
            * dir.height as usize
            * dir.samples_per_pixel as usize
            * (dir.bits_per_sample as usize / 8);

        let mut data = Vec::with_capacity(expected);
        for (&offset, &count) in dir.strip_offsets.iter().zip(&dir.strip_byte_counts) {
            is.seek(SeekFrom::Start(offset))?;
            let mut strip = vec![0u8; count as usize];
            is.read_exact(&mut strip)?;
            data.extend_from_slice(&strip);
        }

        if data.len() < expected {
            return Err(IoError::malformed(format!(
                "strip data holds {} bytes, image needs {expected}",
                data.len()
            )));
        }
        data.truncate(expected);
        Ok(data)
    }

    /// Decodes a sample buffer into pixels, widening 8-bit samples.
    fn decode<P, F>(dir: &TiffDir, endian: Endian, data: &[u8], make: F) -> piv_core::Image<P>
    where
        P: piv_core::Pixel,
        F: Fn(&mut dyn FnMut() -> u16) -> P,
    {
        let mut im = piv_core::Image::<P>::with_size(Size::new(dir.width, dir.height));
        let bytes_per_sample = dir.bits_per_sample as usize / 8;

        let mut cursor = 0usize;
        let mut next_sample = move |data: &[u8]| -> u16 {
            let v = if bytes_per_sample == 1 {
                u16::from(data[cursor])
            } else {
                endian.u16(&data[cursor..])
            };
            cursor += bytes_per_sample;
            v
        };

        for h in 0..dir.height {
            for p in im.line_mut(h) {
                *p = make(&mut || next_sample(data));
            }
        }
        im
    }

    fn read_g16(&self, is: &mut dyn ReadSeek, index: usize) -> IoResult<G16Image> {
        let (endian, dir) = self.dir(index)?;
        Self::check_layout(&dir)?;
        let data = Self::read_strips(&dir, is)?;

        Ok(Self::decode(&dir, endian, &data, |next| Gray(next())))
    }

    fn read_rgba16(&self, is: &mut dyn ReadSeek, index: usize) -> IoResult<Rgba16Image> {
        let (endian, dir) = self.dir(index)?;
        Self::check_layout(&dir)?;
        let data = Self::read_strips(&dir, is)?;

        Ok(Self::decode(&dir, endian, &data, |next| {
            Rgba::new(next(), next(), next(), u16::MAX)
        }))
    }
}

impl ImageLoader for TiffLoader {
    fn name(&self) -> &'static str {
        "image/tiff"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn clone_loader(&self) -> Box<dyn ImageLoader> {
        Box::new(TiffLoader::new())
    }

    fn can_load(&self, header: &[u8]) -> bool {
        if header.len() < 4 {
            return false;
        }
        let le = header[0..4] == [0x49, 0x49, 0x2a, 0x00];
        let be = header[0..4] == [0x4d, 0x4d, 0x00, 0x2a];
        le || be
    }

    fn can_save(&self) -> bool {
        false
    }

    fn num_images(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.dirs.len())
    }

    fn open(&mut self, is: &mut dyn ReadSeek) -> IoResult<()> {
        self.state = None;

        let mut header = [0u8; 8];
        is.read_exact(&mut header)?;
        let endian = match &header[0..2] {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            other => {
                return Err(IoError::malformed(format!("bad byte-order mark {other:?}")));
            }
        };
        if endian.u16(&header[2..4]) != 42 {
            return Err(IoError::malformed("bad TIFF magic"));
        }

        let mut dirs = Vec::new();
        let mut next = u64::from(endian.u32(&header[4..8]));
        while next != 0 {
            if dirs.len() >= MAX_DIRECTORIES {
                return Err(IoError::malformed("directory chain does not terminate"));
            }
            let (dir, n) = Self::parse_directory(endian, is, next)?;
            dirs.push(dir);
            next = n;
        }

        if dirs.is_empty() {
            return Err(IoError::malformed("no image directories"));
        }

        self.state = Some(TiffState { endian, dirs });
        Ok(())
    }

    fn extract_g16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<G16Image> {
        let (_, dir) = self.dir(index)?;
        if dir.samples_per_pixel == 3 {
            Ok(self.read_rgba16(is, index)?.convert())
        } else {
            self.read_g16(is, index)
        }
    }

    fn extract_gf(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<GfImage> {
        Ok(self.extract_g16(is, index)?.convert())
    }

    fn extract_rgba16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<Rgba16Image> {
        let (_, dir) = self.dir(index)?;
        if dir.samples_per_pixel == 1 {
            Ok(self.read_g16(is, index)?.convert())
        } else {
            self.read_rgba16(is, index)
        }
    }

    fn save_g16(&self, _os: &mut dyn Write, _im: &G16Image) -> IoResult<()> {
        Err(IoError::SaveUnsupported { name: self.name() })
    }

    fn save_gf(&self, _os: &mut dyn Write, _im: &GfImage) -> IoResult<()> {
        Err(IoError::SaveUnsupported { name: self.name() })
    }

    fn save_rgba16(&self, _os: &mut dyn Write, _im: &Rgba16Image) -> IoResult<()> {
        Err(IoError::SaveUnsupported { name: self.name() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use piv_core::ImageLike;
    use std::io::Cursor;

    enum E {
        Le,
        Be,
    }

    struct TiffBuilder {
        endian: E,
        bytes: Vec<u8>,
    }

    impl TiffBuilder {
        fn new(endian: E) -> Self {
            let mut bytes = Vec::new();
            match endian {
                E::Le => bytes.extend_from_slice(b"II\x2a\x00"),
                E::Be => bytes.extend_from_slice(b"MM\x00\x2a"),
            }
            // first IFD offset patched in finish()
            bytes.extend_from_slice(&[0; 4]);
            Self { endian, bytes }
        }

        fn u16(&mut self, v: u16) {
            match self.endian {
                E::Le => self.bytes.write_u16::<LittleEndian>(v).unwrap(),
                E::Be => self.bytes.write_u16::<BigEndian>(v).unwrap(),
            }
        }

        fn u32(&mut self, v: u32) {
            match self.endian {
                E::Le => self.bytes.write_u32::<LittleEndian>(v).unwrap(),
                E::Be => self.bytes.write_u32::<BigEndian>(v).unwrap(),
            }
        }

        fn entry_short(&mut self, tag: u16, value: u16) {
            self.u16(tag);
            self.u16(3);
            self.u32(1);
            self.u16(value);
            self.u16(0);
        }

        fn entry_long(&mut self, tag: u16, value: u32) {
            self.u16(tag);
            self.u16(4);
            self.u32(1);
            self.u32(value);
        }

        /// Appends an IFD describing one uncompressed greyscale image
        /// whose samples start at `data_offset`. Returns the offset of
        /// the written IFD.
        fn gray_ifd(
            &mut self,
            width: u32,
            height: u32,
            bits: u16,
            data_offset: u32,
            next_ifd: u32,
        ) -> u32 {
            let ifd_offset = self.bytes.len() as u32;
            self.u16(8); // entry count
            self.entry_long(TAG_IMAGE_WIDTH, width);
            self.entry_long(TAG_IMAGE_LENGTH, height);
            self.entry_short(TAG_BITS_PER_SAMPLE, bits);
            self.entry_short(TAG_COMPRESSION, 1);
            self.entry_long(TAG_STRIP_OFFSETS, data_offset);
            self.entry_short(TAG_SAMPLES_PER_PIXEL, 1);
            self.entry_long(
                TAG_STRIP_BYTE_COUNTS,
                width * height * u32::from(bits) / 8,
            );
            self.entry_short(TAG_SAMPLE_FORMAT, 1);
            self.u32(next_ifd);
            ifd_offset
        }

        fn finish(mut self, first_ifd: u32) -> Vec<u8> {
            let patch: [u8; 4] = match self.endian {
                E::Le => first_ifd.to_le_bytes(),
                E::Be => first_ifd.to_be_bytes(),
            };
            self.bytes[4..8].copy_from_slice(&patch);
            self.bytes
        }
    }

    #[test]
    fn test_reads_little_endian_8bit_gray() {
        let mut b = TiffBuilder::new(E::Le);
        let data_offset = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[1, 2, 3, 4]);
        let ifd = b.gray_ifd(2, 2, 8, data_offset, 0);
        let bytes = b.finish(ifd);

        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(bytes);
        let im = loader.load_g16(&mut cur).unwrap();
        assert_eq!(im.size(), Size::new(2, 2));
        assert_eq!(im[(0, 0)], Gray(1));
        assert_eq!(im[(1, 1)], Gray(4));
    }

    #[test]
    fn test_reads_big_endian_16bit_gray() {
        let mut b = TiffBuilder::new(E::Be);
        let data_offset = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[0x01, 0x00, 0xff, 0xfe]);
        let ifd = b.gray_ifd(2, 1, 16, data_offset, 0);
        let bytes = b.finish(ifd);

        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(bytes);
        let im = loader.load_g16(&mut cur).unwrap();
        assert_eq!(im[(0, 0)], Gray(256));
        assert_eq!(im[(1, 0)], Gray(0xfffe));
    }

    #[test]
    fn test_multi_directory_files_are_indexable() {
        let mut b = TiffBuilder::new(E::Le);
        let data_a = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[10; 4]);
        let data_b = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[20; 4]);

        let ifd_b = b.gray_ifd(2, 2, 8, data_b, 0);
        let ifd_a = b.gray_ifd(2, 2, 8, data_a, ifd_b);
        let bytes = b.finish(ifd_a);

        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(bytes);
        loader.open(&mut cur).unwrap();
        assert_eq!(loader.num_images(), 2);

        assert_eq!(loader.extract_g16(&mut cur, 0).unwrap()[(0, 0)], Gray(10));
        assert_eq!(loader.extract_g16(&mut cur, 1).unwrap()[(0, 0)], Gray(20));
        assert!(matches!(
            loader.extract_g16(&mut cur, 2),
            Err(IoError::NoSuchImage { .. })
        ));
    }

    #[test]
    fn test_rgb_reads_with_max_alpha_and_luminance_grey() {
        let mut b = TiffBuilder::new(E::Le);
        let data_offset = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[100, 200, 50]);

        let ifd_offset = b.bytes.len() as u32;
        b.u16(8);
        b.entry_long(TAG_IMAGE_WIDTH, 1);
        b.entry_long(TAG_IMAGE_LENGTH, 1);
        b.entry_short(TAG_BITS_PER_SAMPLE, 8);
        b.entry_short(TAG_COMPRESSION, 1);
        b.entry_long(TAG_STRIP_OFFSETS, data_offset);
        b.entry_short(TAG_SAMPLES_PER_PIXEL, 3);
        b.entry_long(TAG_STRIP_BYTE_COUNTS, 3);
        b.entry_short(TAG_SAMPLE_FORMAT, 1);
        b.u32(0);
        let bytes = b.finish(ifd_offset);

        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(bytes);
        loader.open(&mut cur).unwrap();

        let rgba = loader.extract_rgba16(&mut cur, 0).unwrap();
        assert_eq!(rgba[(0, 0)], Rgba::new(100, 200, 50, u16::MAX));

        let gray = loader.extract_g16(&mut cur, 0).unwrap();
        assert_eq!(gray[(0, 0)], Gray(167));
    }

    #[test]
    fn test_unsupported_layouts_are_rejected() {
        // LZW compression
        let mut b = TiffBuilder::new(E::Le);
        let data_offset = b.bytes.len() as u32;
        b.bytes.extend_from_slice(&[0; 4]);

        let ifd_offset = b.bytes.len() as u32;
        b.u16(8);
        b.entry_long(TAG_IMAGE_WIDTH, 2);
        b.entry_long(TAG_IMAGE_LENGTH, 2);
        b.entry_short(TAG_BITS_PER_SAMPLE, 8);
        b.entry_short(TAG_COMPRESSION, 5);
        b.entry_long(TAG_STRIP_OFFSETS, data_offset);
        b.entry_short(TAG_SAMPLES_PER_PIXEL, 1);
        b.entry_long(TAG_STRIP_BYTE_COUNTS, 4);
        b.entry_short(TAG_SAMPLE_FORMAT, 1);
        b.u32(0);
        let bytes = b.finish(ifd_offset);

        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(bytes);
        loader.open(&mut cur).unwrap();
        assert!(matches!(
            loader.extract_g16(&mut cur, 0),
            Err(IoError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn test_save_is_unsupported() {
        let loader = TiffLoader::new();
        let mut out = Vec::new();
        let im = G16Image::with_size(Size::new(2, 2));
        assert!(matches!(
            loader.save_g16(&mut out, &im),
            Err(IoError::SaveUnsupported { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let mut loader = TiffLoader::new();
        let mut cur = Cursor::new(b"II\x2a".to_vec());
        assert!(loader.open(&mut cur).is_err());
    }
}
