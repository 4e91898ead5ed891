pub mod mzml;
mod offset_index;
pub mod source;
pub(crate) mod tag_tracker;
pub mod task;
pub(crate) mod utils;

pub use crate::io::mzml::{
    ExportOptions, ExportOutcome, ExportPolicy, ImportOptions, ImportOutcome, MzMLExporter,
    MzMLImporter, MzMLParserError, MzMLWriter, MzMLWriterError,
};
pub use crate::io::offset_index::OffsetIndex;
pub use crate::io::source::{ByteSource, ByteSourceRead, SourceMode, SourceView};
pub use crate::io::task::{CancellationToken, ProgressCallback, ProgressTracker};
