//! Loader interface and sniff-based registry.
//!
//! An [`ImageLoader`] is stateful per stream: [`open`](ImageLoader::open)
//! parses the header and records layout, `extract(i)` reads the `i`-th
//! contained image (TIFF files may hold several; PNM always one). The
//! [`LoaderRegistry`] dispatches on content: each loader advertises a
//! MIME-like name, a priority and a non-consuming header sniff.
//!
//! Registration is explicit: call [`register_default_loaders`] at program
//! start, after the logger is up, so no loader work happens before
//! `main`.
//!
//! # Example
//!
//! ```no_run
//! use piv_io::loader::{ImageLoader as _, LoaderRegistry, register_default_loaders};
//! use std::fs::File;
//!
//! register_default_loaders();
//!
//! let mut file = File::open("frame_0001.pgm")?;
//! let mut loader = LoaderRegistry::global().find_for(&mut file)?;
//! let frame = loader.load_gf(&mut file)?;
//! # Ok::<(), piv_io::IoError>(())
//! ```

use crate::error::{IoError, IoResult};
use crate::pnm::PnmLoader;
use crate::tiff::TiffLoader;
use piv_core::{G16Image, GfImage, Rgba16Image};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, OnceLock};

/// Combined stream capability used by loaders.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Number of bytes handed to [`ImageLoader::can_load`] sniffs.
pub const SNIFF_LEN: usize = 16;

/// A stateful image loader for one format.
///
/// `open` must reset any state held from a previous stream.
pub trait ImageLoader: Send {
    /// MIME-like name of this loader, used for exact lookup.
    fn name(&self) -> &'static str;

    /// Dispatch priority; higher wins when several loaders match.
    fn priority(&self) -> i32;

    /// Fresh, unopened copy of this loader.
    fn clone_loader(&self) -> Box<dyn ImageLoader>;

    /// `true` if the sniffed header bytes look like this format.
    fn can_load(&self, header: &[u8]) -> bool;

    /// `true` if this loader can write files.
    fn can_save(&self) -> bool;

    /// Number of images in the opened stream.
    fn num_images(&self) -> usize;

    /// Parses the header; the stream must be at the start of the data.
    fn open(&mut self, is: &mut dyn ReadSeek) -> IoResult<()>;

    /// Reads image `index` as 16-bit greyscale.
    fn extract_g16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<G16Image>;

    /// Reads image `index` as double greyscale.
    fn extract_gf(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<GfImage>;

    /// Reads image `index` as 16-bit RGBA.
    fn extract_rgba16(&mut self, is: &mut dyn ReadSeek, index: usize) -> IoResult<Rgba16Image>;

    /// Writes a 16-bit greyscale image.
    fn save_g16(&self, os: &mut dyn Write, im: &G16Image) -> IoResult<()>;

    /// Writes a double greyscale image (format-specific scaling).
    fn save_gf(&self, os: &mut dyn Write, im: &GfImage) -> IoResult<()>;

    /// Writes a 16-bit RGBA image.
    fn save_rgba16(&self, os: &mut dyn Write, im: &Rgba16Image) -> IoResult<()>;

    /// Opens the stream and extracts the first image as 16-bit greyscale.
    fn load_g16(&mut self, is: &mut dyn ReadSeek) -> IoResult<G16Image> {
        self.open(is)?;
        self.extract_g16(is, 0)
    }

    /// Opens the stream and extracts the first image as double greyscale.
    fn load_gf(&mut self, is: &mut dyn ReadSeek) -> IoResult<GfImage> {
        self.open(is)?;
        self.extract_gf(is, 0)
    }

    /// Opens the stream and extracts the first image as 16-bit RGBA.
    fn load_rgba16(&mut self, is: &mut dyn ReadSeek) -> IoResult<Rgba16Image> {
        self.open(is)?;
        self.extract_rgba16(is, 0)
    }
}

/// Reads up to [`SNIFF_LEN`] header bytes and restores the stream
/// position.
pub fn peek_header(is: &mut dyn ReadSeek) -> IoResult<Vec<u8>> {
    let pos = is.stream_position()?;
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = is.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    is.seek(SeekFrom::Start(pos))?;
    Ok(buf[..filled].to_vec())
}

/// Central repository of registered loaders.
///
/// Thread-safe; the global instance is shared by the whole process.
pub struct LoaderRegistry {
    loaders: Mutex<Vec<Box<dyn ImageLoader>>>,
}

impl LoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            loaders: Mutex::new(Vec::new()),
        }
    }

    /// The process-global registry.
    pub fn global() -> &'static LoaderRegistry {
        static INSTANCE: OnceLock<LoaderRegistry> = OnceLock::new();
        INSTANCE.get_or_init(LoaderRegistry::new)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn ImageLoader>>> {
        self.loaders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers a loader prototype, keeping the list sorted by
    /// descending priority. A second registration under the same name is
    /// ignored.
    pub fn register(&self, loader: Box<dyn ImageLoader>) -> bool {
        let mut loaders = self.lock();
        if loaders.iter().any(|l| l.name() == loader.name()) {
            return false;
        }
        loaders.push(loader);
        loaders.sort_by_key(|l| std::cmp::Reverse(l.priority()));
        true
    }

    /// Sniffs the stream and returns a fresh loader for the first
    /// matching format, by priority. The stream position is unchanged.
    pub fn find_for(&self, is: &mut dyn ReadSeek) -> IoResult<Box<dyn ImageLoader>> {
        let header = peek_header(is)?;
        self.lock()
            .iter()
            .find(|l| l.can_load(&header))
            .map(|l| l.clone_loader())
            .ok_or(IoError::NoLoaderFound)
    }

    /// Returns a fresh loader registered under exactly `name`.
    pub fn find_by_name(&self, name: &str) -> IoResult<Box<dyn ImageLoader>> {
        self.lock()
            .iter()
            .find(|l| l.name() == name)
            .map(|l| l.clone_loader())
            .ok_or_else(|| IoError::UnknownLoader {
                name: name.to_string(),
            })
    }

    /// Names of all registered loaders, in priority order.
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(|l| l.name()).collect()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers the built-in loaders (PNM, TIFF) with the global registry.
///
/// Call once at program start; further calls are no-ops.
pub fn register_default_loaders() {
    let registry = LoaderRegistry::global();
    registry.register(Box::new(PnmLoader::new()));
    registry.register(Box::new(TiffLoader::new()));
}
