//! E-reader container pipeline module
//!
//! Turns rendered page frames into XTC containers for the XTEink readers:
//! frame validation, gray-level quantization, XTG/XTH page encoding, the
//! streaming container builder and reader, and the session that drives them.

pub mod common;
pub mod frame;
pub mod quantize;
pub mod page;
pub mod container;
pub mod session;

pub use common::{
    DevicePreset,
    ErrorKind,
    Result,
    XtcError,
};

pub use frame::{
    FrameSource,
    FrameValidator,
    RasterFrame,
    TiffFrameReader,
};

pub use quantize::{
    Levels,
    QuantizedRaster,
    Quantizer,
};

pub use page::{
    EncodedPage,
    PageEncoder,
    PageFormat,
    PageHeader,
    XtPageEncoder,
};

pub use container::{
    ChapterEntry,
    ContainerBuilder,
    ContainerSummary,
    Finding,
    MetadataRecord,
    ReadDirection,
    XtcReader,
};

pub use session::{
    BookManifest,
    CancelToken,
    CatalogueEntry,
    CatalogueSink,
    ConversionConfig,
    ConversionConfigBuilder,
    ConversionSession,
    SessionId,
    SessionRegistry,
    SessionState,
    SessionStats,
};
