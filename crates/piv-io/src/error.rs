//! Error types for image loading and vector-field output.

use thiserror::Error;

/// Result type alias using [`IoError`].
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Errors from loaders, the registry and the vector-field writer.
#[derive(Debug, Error)]
pub enum IoError {
    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `extract` was called before a successful `open`.
    #[error("stream is not open; call open() before extract()")]
    NotOpen,

    /// The stream does not hold the header the loader expected.
    #[error("truncated or malformed header: {reason}")]
    MalformedHeader {
        /// What was wrong
        reason: String,
    },

    /// No registered loader recognises the stream contents.
    #[error("no registered loader can read this stream")]
    NoLoaderFound,

    /// Lookup by name found nothing.
    #[error("no loader registered under name {name:?}")]
    UnknownLoader {
        /// The requested loader name
        name: String,
    },

    /// The requested image index does not exist in the file.
    #[error("image index {index} out of range; file holds {count} image(s)")]
    NoSuchImage {
        /// Requested index
        index: usize,
        /// Number of images in the file
        count: usize,
    },

    /// The file uses a sample layout this loader does not read.
    #[error("unsupported sample layout: {reason}")]
    UnsupportedLayout {
        /// The offending layout
        reason: String,
    },

    /// The loader cannot write files.
    #[error("saving is not supported by the {name} loader")]
    SaveUnsupported {
        /// Loader name
        name: &'static str,
    },

    /// An error bubbled up from the core image model.
    #[error(transparent)]
    Core(#[from] piv_core::Error),
}

impl IoError {
    /// Creates an [`IoError::MalformedHeader`] error.
    #[inline]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            reason: reason.into(),
        }
    }

    /// Creates an [`IoError::UnsupportedLayout`] error.
    #[inline]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedLayout {
            reason: reason.into(),
        }
    }
}
