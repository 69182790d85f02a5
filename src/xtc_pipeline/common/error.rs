use thiserror::Error;

/// Broad classes of failure, used by the session to decide whether an error
/// leaves it usable or aborts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller. Surfaced immediately, never retried.
    Input,
    /// A broken internal invariant. Fatal to the session.
    Internal,
    /// Reading or writing storage failed. Fatal to the session.
    Storage,
    /// A container on disk is not what it claims to be.
    Corruption,
}

#[derive(Error, Debug)]
pub enum XtcError {
    #[error("Frame dimensions {actual_width}x{actual_height} do not match expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Page {got} arrived out of order, expected page {expected}")]
    OutOfOrderPage { expected: usize, got: usize },

    #[error("Invalid chapter table: {0}")]
    InvalidChapterTable(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid conversion option: {0}")]
    InvalidOption(String),

    #[error("Encoded payload is {actual} bytes but header declares {declared}")]
    PayloadSizeMismatch { declared: usize, actual: usize },

    #[error("Container builder has already been finalized")]
    AlreadyFinalized,

    #[error("Container has no pages")]
    EmptyContainer,

    #[error("Container cannot hold more than {0} pages")]
    TooManyPages(usize),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session is busy with another operation")]
    SessionBusy,

    #[error("Corrupt container header: {0}")]
    CorruptHeader(String),

    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to decode input image: {0}")]
    DecodeError(String),

    #[error("Invalid book manifest: {0}")]
    InvalidManifest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl XtcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XtcError::DimensionMismatch { .. }
            | XtcError::OutOfOrderPage { .. }
            | XtcError::InvalidChapterTable(_)
            | XtcError::UnsupportedFormat(_)
            | XtcError::InvalidOption(_)
            | XtcError::EmptyContainer
            | XtcError::TooManyPages(_)
            | XtcError::SessionClosed
            | XtcError::SessionBusy
            | XtcError::InputReadError(_)
            | XtcError::DecodeError(_)
            | XtcError::InvalidManifest(_) => ErrorKind::Input,
            XtcError::PayloadSizeMismatch { .. } | XtcError::AlreadyFinalized => {
                ErrorKind::Internal
            }
            XtcError::IoError(_) => ErrorKind::Storage,
            XtcError::CorruptHeader(_) | XtcError::CorruptContainer(_) => ErrorKind::Corruption,
        }
    }

    /// Whether this error must take the owning session down with it.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal | ErrorKind::Storage)
    }
}

pub type Result<T> = std::result::Result<T, XtcError>;
