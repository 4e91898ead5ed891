//! Implements a streaming importer and an exporter for the PSI-MS mzML and
//! indexedmzML XML file formats.
//!
//! The importer never materializes `<binary>` payloads. It records where each one
//! lives so the arrays can be decoded later from a view of the same source.

mod reading_shared;
mod record_builder;
pub mod reader;
pub mod writer;

pub use crate::io::mzml::reading_shared::{MzMLParserError, MzMLParserState};

pub use crate::io::mzml::reader::{ImportOptions, ImportOutcome, MzMLImporter};

pub use crate::io::mzml::writer::{
    ExportOptions, ExportOutcome, ExportPolicy, MzMLExporter, MzMLWriter, MzMLWriterError,
    MzMLWriterState,
};
