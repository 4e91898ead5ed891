use std::fmt::Display;
use std::io;

use thiserror::Error;

use crate::params::{ControlledVocabulary, Param, Unit};

pub type Bytes = Vec<u8>;

pub(crate) const fn is_target_little_endian() -> bool {
    u16::from_ne_bytes([1, 0]) == 1
}

/// The kinds of data arrays found in mass spectrometry data files governed
/// by the PSI-MS controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Hash, Eq, PartialOrd, Ord, Default)]
pub enum ArrayType {
    #[default]
    Unknown,
    MZArray,
    IntensityArray,
    ChargeArray,
    SignalToNoiseArray,
    TimeArray,
    WavelengthArray,
    /// A user-named array declared with MS:1000786
    NonStandardDataArray {
        name: Box<String>,
    },
    /// Any other controlled `... array` term this crate has no dedicated variant for
    Other {
        accession: u32,
        name: Box<String>,
    },
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonStandardDataArray { name } => write!(f, "NonStandardDataArray({name})"),
            Self::Other { accession, name } => write!(f, "Other(MS:{accession:07} {name})"),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl ArrayType {
    /// The data type this array is written with when the caller has no preference.
    ///
    /// The m/z and time arrays are encoded using `Float64`, the charge state array
    /// is encoded using `Int32`, and all other arrays are encoded using `Float32`.
    pub const fn preferred_dtype(&self) -> BinaryDataArrayType {
        match self {
            ArrayType::MZArray | ArrayType::TimeArray => BinaryDataArrayType::Float64,
            ArrayType::IntensityArray => BinaryDataArrayType::Float32,
            ArrayType::ChargeArray => BinaryDataArrayType::Int32,
            _ => BinaryDataArrayType::Float32,
        }
    }

    pub fn nonstandard<S: ToString>(name: S) -> ArrayType {
        ArrayType::NonStandardDataArray {
            name: Box::new(name.to_string()),
        }
    }

    pub const fn accession(&self) -> Option<u32> {
        match self {
            ArrayType::Unknown => None,
            ArrayType::MZArray => Some(1000514),
            ArrayType::IntensityArray => Some(1000515),
            ArrayType::ChargeArray => Some(1000516),
            ArrayType::SignalToNoiseArray => Some(1000517),
            ArrayType::TimeArray => Some(1000595),
            ArrayType::WavelengthArray => Some(1000617),
            ArrayType::NonStandardDataArray { .. } => Some(1000786),
            ArrayType::Other { accession, .. } => Some(*accession),
        }
    }

    /// The unit a value of this array is assumed to carry when none is declared
    pub const fn default_unit(&self) -> Unit {
        match self {
            ArrayType::MZArray => Unit::MZ,
            ArrayType::IntensityArray => Unit::DetectorCounts,
            ArrayType::TimeArray => Unit::Minute,
            _ => Unit::Unknown,
        }
    }

    /// Create a [`Param`] for this array type.
    ///
    /// If a unit is provided, that unit will be specified, otherwise the
    /// array's default unit is used.
    pub fn as_param(&self, unit: Option<Unit>) -> Option<Param> {
        const CV: ControlledVocabulary = ControlledVocabulary::MS;
        let accession = self.accession()?;
        let mut param = match self {
            ArrayType::Unknown => return None,
            ArrayType::MZArray => CV.param(accession, "m/z array"),
            ArrayType::IntensityArray => CV.param(accession, "intensity array"),
            ArrayType::ChargeArray => CV.param(accession, "charge array"),
            ArrayType::SignalToNoiseArray => CV.param(accession, "signal to noise array"),
            ArrayType::TimeArray => CV.param(accession, "time array"),
            ArrayType::WavelengthArray => CV.param(accession, "wavelength array"),
            ArrayType::NonStandardDataArray { name } => {
                CV.param_val(accession, "non-standard data array", name.as_str())
            }
            ArrayType::Other { name, .. } => CV.param(accession, name.as_str()),
        };
        param.unit = unit.unwrap_or(self.default_unit());
        Some(param)
    }

    /// Recognize a controlled term as an array type. Unlisted terms whose name ends in
    /// `array` become [`ArrayType::Other`].
    pub fn from_param(param: &Param) -> Option<Self> {
        if param.controlled_vocabulary != Some(ControlledVocabulary::MS) {
            return None;
        }
        let tp = match param.accession? {
            1000514 => Self::MZArray,
            1000515 => Self::IntensityArray,
            1000516 => Self::ChargeArray,
            1000517 => Self::SignalToNoiseArray,
            1000595 => Self::TimeArray,
            1000617 => Self::WavelengthArray,
            1000786 => Self::nonstandard(&param.value),
            accession if param.name.ends_with(" array") => Self::Other {
                accession,
                name: Box::new(param.name.clone()),
            },
            _ => return None,
        };
        Some(tp)
    }
}

/// The canonical primitive data types found in MS data file formats
/// supported by the PSI-MS controlled vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub enum BinaryDataArrayType {
    #[default]
    Unknown,
    Float64,
    Float32,
    Int64,
    Int32,
    ASCII,
}

impl Display for BinaryDataArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryDataArrayType {
    /// Get the size in bytes of a single value of this type
    pub const fn size_of(&self) -> usize {
        match self {
            BinaryDataArrayType::Unknown | BinaryDataArrayType::ASCII => 1,
            BinaryDataArrayType::Float32 | BinaryDataArrayType::Int32 => 4,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Int64 => 8,
        }
    }

    pub const fn is_numeric(&self) -> bool {
        !matches!(
            self,
            BinaryDataArrayType::Unknown | BinaryDataArrayType::ASCII
        )
    }

    pub const fn accession(&self) -> Option<u32> {
        match self {
            Self::Float32 => Some(1000521),
            Self::Float64 => Some(1000523),
            Self::Int32 => Some(1000519),
            Self::Int64 => Some(1000522),
            Self::ASCII => Some(1001479),
            Self::Unknown => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            BinaryDataArrayType::Unknown => "unknown",
            BinaryDataArrayType::Float64 => "64-bit float",
            BinaryDataArrayType::Float32 => "32-bit float",
            BinaryDataArrayType::Int64 => "64-bit integer",
            BinaryDataArrayType::Int32 => "32-bit integer",
            BinaryDataArrayType::ASCII => "null-terminated ASCII string",
        }
    }

    pub fn as_param(&self) -> Option<Param> {
        self.accession()
            .map(|acc| ControlledVocabulary::MS.param(acc, self.name()))
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000521 => Some(Self::Float32),
            1000523 => Some(Self::Float64),
            1000519 => Some(Self::Int32),
            1000522 => Some(Self::Int64),
            1001479 => Some(Self::ASCII),
            _ => None,
        }
    }
}

/// The three MS-Numpress transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumpressCompression {
    /// Linear prediction, suited to monotonic m/z and time axes
    Linear,
    /// Positive integer compression, for integral counts
    PositiveInteger,
    /// Short logged float, for intensities
    ShortLoggedFloat,
}

impl NumpressCompression {
    /// Bytes of fixed header preceding the encoded values, counting Linear's
    /// two verbatim starting values.
    pub const fn header_len(&self) -> usize {
        match self {
            Self::Linear => 16,
            Self::PositiveInteger => 0,
            Self::ShortLoggedFloat => 8,
        }
    }
}

impl Display for NumpressCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Linear => "MS-Numpress linear prediction",
            Self::PositiveInteger => "MS-Numpress positive integer",
            Self::ShortLoggedFloat => "MS-Numpress short logged float",
        };
        f.write_str(name)
    }
}

/// The ordered stages applied to a binary array's bytes before transport encoding.
///
/// A Numpress stage, when present, is always the innermost transform and a zlib
/// stage always wraps whatever is beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompressionChain {
    pub numpress: Option<NumpressCompression>,
    pub zlib: bool,
}

/// Compression terms that are valid mzML but that this crate cannot decode
const UNSUPPORTED_COMPRESSION_ACCESSIONS: &[u32] = &[
    // truncation, delta prediction and zlib
    1003089,
    // truncation, linear prediction and zlib
    1003090,
];

impl Display for CompressionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CompressionChain {
    pub const NONE: CompressionChain = CompressionChain {
        numpress: None,
        zlib: false,
    };
    pub const ZLIB: CompressionChain = CompressionChain {
        numpress: None,
        zlib: true,
    };

    pub const fn numpress(kind: NumpressCompression, zlib: bool) -> Self {
        Self {
            numpress: Some(kind),
            zlib,
        }
    }

    pub const fn is_compressed(&self) -> bool {
        self.zlib || self.numpress.is_some()
    }

    /// Every chain this crate can decode and encode
    pub const fn all() -> [CompressionChain; 8] {
        use NumpressCompression::*;
        [
            Self::NONE,
            Self::ZLIB,
            Self::numpress(Linear, false),
            Self::numpress(PositiveInteger, false),
            Self::numpress(ShortLoggedFloat, false),
            Self::numpress(Linear, true),
            Self::numpress(PositiveInteger, true),
            Self::numpress(ShortLoggedFloat, true),
        ]
    }

    pub const fn accession(&self) -> u32 {
        use NumpressCompression::*;
        match (self.numpress, self.zlib) {
            (None, false) => 1000576,
            (None, true) => 1000574,
            (Some(Linear), false) => 1002312,
            (Some(PositiveInteger), false) => 1002313,
            (Some(ShortLoggedFloat), false) => 1002314,
            (Some(Linear), true) => 1002746,
            (Some(PositiveInteger), true) => 1002747,
            (Some(ShortLoggedFloat), true) => 1002748,
        }
    }

    pub const fn name(&self) -> &'static str {
        use NumpressCompression::*;
        match (self.numpress, self.zlib) {
            (None, false) => "no compression",
            (None, true) => "zlib compression",
            (Some(Linear), false) => "MS-Numpress linear prediction compression",
            (Some(PositiveInteger), false) => "MS-Numpress positive integer compression",
            (Some(ShortLoggedFloat), false) => "MS-Numpress short logged float compression",
            (Some(Linear), true) => {
                "MS-Numpress linear prediction compression followed by zlib compression"
            }
            (Some(PositiveInteger), true) => {
                "MS-Numpress positive integer compression followed by zlib compression"
            }
            (Some(ShortLoggedFloat), true) => {
                "MS-Numpress short logged float compression followed by zlib compression"
            }
        }
    }

    pub fn as_param(&self) -> Param {
        ControlledVocabulary::MS.param(self.accession(), self.name())
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        Self::all().into_iter().find(|c| c.accession() == accession)
    }

    /// Whether `accession` names a compression scheme this crate knows of but cannot decode
    pub fn is_unsupported_accession(accession: u32) -> bool {
        UNSUPPORTED_COMPRESSION_ACCESSIONS.contains(&accession)
    }

    /// Fold a second compression term into this chain, as when a document lists
    /// the Numpress and zlib terms separately.
    pub fn merge(self, other: CompressionChain) -> CompressionChain {
        CompressionChain {
            numpress: other.numpress.or(self.numpress),
            zlib: self.zlib || other.zlib,
        }
    }
}

/// A high level set of failure modes that an operation to retrieve a decoded
/// array might encounter. Also used to represent failures while encoding.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArrayRetrievalError {
    #[error("Array type {0} not found")]
    NotFound(ArrayType),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("The {kind} decoder failed with status {status}: {reason}")]
    NumpressDecodeFailed {
        kind: NumpressCompression,
        status: i32,
        reason: String,
    },
    #[error("The {kind} encoder failed with status {status}: {reason}")]
    NumpressEncodeFailed {
        kind: NumpressCompression,
        status: i32,
        reason: String,
    },
    #[error("An error occurred while compressing: {0}")]
    CompressionError(String),
    #[error("Unsupported compression {0}")]
    UnsupportedCompression(String),
    #[error("The array does not declare a numeric precision")]
    MissingPrecision,
    #[error("Cannot decode values of type {0}")]
    UnsupportedDataType(BinaryDataArrayType),
    #[error("The requested data type does not match the number of bytes available in the buffer")]
    DataTypeSizeMismatch,
    #[error("Failed to allocate {requested} bytes to decode an array")]
    AllocationFailed { requested: usize },
    #[error("Malformed base64 transport encoding: {0}")]
    TransportError(String),
    #[error("Failed to read {length} bytes at offset {position}: {message}")]
    ReadError {
        position: u64,
        length: u64,
        message: String,
    },
}

impl From<bytemuck::PodCastError> for ArrayRetrievalError {
    fn from(_value: bytemuck::PodCastError) -> Self {
        Self::DataTypeSizeMismatch
    }
}

impl From<base64_simd::Error> for ArrayRetrievalError {
    fn from(value: base64_simd::Error) -> Self {
        Self::TransportError(value.to_string())
    }
}

impl From<ArrayRetrievalError> for io::Error {
    fn from(value: ArrayRetrievalError) -> Self {
        match value {
            ArrayRetrievalError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            ArrayRetrievalError::AllocationFailed { .. } => {
                io::Error::new(io::ErrorKind::OutOfMemory, value)
            }
            ArrayRetrievalError::ReadError { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, value)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}
