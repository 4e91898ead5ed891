mod codec;
mod encodings;
mod info;
pub mod numpress;

pub use codec::{
    decode, decode_transport, deflate, encode, encode_transport, inflate, ArrayEncoding,
    ArrayStatistics, DecodedArray,
};
pub use encodings::{
    ArrayRetrievalError, ArrayType, BinaryDataArrayType, Bytes, CompressionChain,
    NumpressCompression,
};
pub use info::{BinaryDataInfo, BinaryParamKind};
