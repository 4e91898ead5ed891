//! The data model an import produces: lazily decoded records, their metadata,
//! and the binary array machinery behind them.
pub mod bindata;
pub mod ms_function;
pub mod raw_file;
pub mod record;
pub mod scan_properties;

pub use crate::spectrum::bindata::{
    ArrayEncoding, ArrayRetrievalError, ArrayStatistics, ArrayType, BinaryDataArrayType,
    BinaryDataInfo, CompressionChain, DecodedArray, NumpressCompression,
};
pub use crate::spectrum::ms_function::{MsFunction, MsFunctionArena};
pub use crate::spectrum::raw_file::{Diagnostic, DiagnosticKind, RawDataFile};
pub use crate::spectrum::record::{
    scan_number_from_id, ChromatogramDescription, ChromatogramRecord, SpectrumDescription,
    SpectrumRecord,
};
pub use crate::spectrum::scan_properties::*;
