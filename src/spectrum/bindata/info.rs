use std::fmt::{self, Formatter};

use crate::io::source::ByteSourceRead;
use crate::params::{Param, ParamList, Unit};

use super::codec::{self, try_allocate, DecodedArray};
use super::encodings::{
    ArrayRetrievalError, ArrayType, BinaryDataArrayType, CompressionChain,
};

/// Where one `<binaryDataArray>` payload lives in its source file and how to decode it.
///
/// `position` is the absolute offset of the first byte of the `<binary>` text and is
/// only meaningful for views of the [`ByteSource`](crate::io::ByteSource) the record
/// was imported from.
#[derive(Clone, Default, PartialEq)]
pub struct BinaryDataInfo {
    pub position: u64,
    pub encoded_length: u32,
    pub declared_length: u32,
    pub precision: Option<BinaryDataArrayType>,
    pub compression: CompressionChain,
    /// A compression term that is valid mzML but cannot be decoded here
    pub unsupported_compression: Option<Param>,
    pub array_type: ArrayType,
    pub unit: Unit,
    pub params: ParamList,
}

impl fmt::Debug for BinaryDataInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryDataInfo")
            .field("array_type", &self.array_type)
            .field("position", &self.position)
            .field("encoded_length", &self.encoded_length)
            .field("declared_length", &self.declared_length)
            .field("precision", &self.precision)
            .field("compression", &self.compression)
            .finish()
    }
}

crate::impl_param_described!(BinaryDataInfo);

/// What a cvParam inside a `<binaryDataArray>` turned out to describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryParamKind {
    Precision,
    Compression,
    UnsupportedCompression,
    ArrayType,
    Other,
}

impl BinaryDataInfo {
    pub fn new(declared_length: u32) -> Self {
        Self {
            declared_length,
            ..Default::default()
        }
    }

    /// Fold one cvParam of the enclosing `<binaryDataArray>` into this description.
    ///
    /// Separate Numpress and zlib terms are merged into one chain. Terms that are
    /// not about the encoding are kept in `params`.
    pub fn apply_param(&mut self, param: Param) -> BinaryParamKind {
        if let (Some(accession), true) = (param.accession, param.is_controlled()) {
            if let Some(dtype) = BinaryDataArrayType::from_accession(accession) {
                self.precision = Some(dtype);
                return BinaryParamKind::Precision;
            }
            if let Some(chain) = CompressionChain::from_accession(accession) {
                self.compression = self.compression.merge(chain);
                return BinaryParamKind::Compression;
            }
            if CompressionChain::is_unsupported_accession(accession) {
                self.unsupported_compression = Some(param);
                return BinaryParamKind::UnsupportedCompression;
            }
            if let Some(array_type) = ArrayType::from_param(&param) {
                self.array_type = array_type;
                self.unit = match param.unit {
                    Unit::Unknown => self.array_type.default_unit(),
                    unit => unit,
                };
                return BinaryParamKind::ArrayType;
            }
        }
        self.params.push(param);
        BinaryParamKind::Other
    }

    pub fn is_empty(&self) -> bool {
        self.encoded_length == 0
    }

    /// Read the base64 text of the payload without decoding it.
    pub fn read_encoded<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<Vec<u8>, ArrayRetrievalError> {
        let length = self.encoded_length as usize;
        let read_error = |message: String| ArrayRetrievalError::ReadError {
            position: self.position,
            length: self.encoded_length as u64,
            message,
        };
        if self.position.saturating_add(self.encoded_length as u64) > source.total_length() {
            return Err(read_error(format!(
                "payload extends past the end of the {} byte source",
                source.total_length()
            )));
        }
        let mut buffer: Vec<u8> = try_allocate(length)?;
        buffer.resize(length, 0);
        source
            .seek_to(self.position)
            .map_err(|e| read_error(e.to_string()))?;
        let mut filled = 0;
        while filled < length {
            let n = source
                .read_into(&mut buffer[filled..], length - filled)
                .map_err(|e| read_error(e.to_string()))?;
            if n == 0 {
                return Err(read_error("unexpected end of source".to_string()));
            }
            filled += n;
        }
        Ok(buffer)
    }

    /// Fetch, transport-decode and decode this array from `source`.
    ///
    /// The view is always repositioned first, so calls are independent of whatever
    /// the view was last used for.
    pub fn decode<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        if let Some(param) = self.unsupported_compression.as_ref() {
            return Err(ArrayRetrievalError::UnsupportedCompression(
                param.curie().unwrap_or_else(|| param.name.clone()),
            ));
        }
        if self.is_empty() {
            return Ok(DecodedArray::default());
        }
        let text = self.read_encoded(source)?;
        let bytes = codec::decode_transport(&text)?;
        log::trace!(
            "Decoding {} ({} bytes, {:?}, {}) at {}",
            self.array_type,
            bytes.len(),
            self.precision,
            self.compression,
            self.position
        );
        codec::decode(
            &bytes,
            self.precision,
            self.declared_length as usize,
            self.compression,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::source::ByteSource;
    use crate::params::ControlledVocabulary;
    use crate::spectrum::bindata::{ArrayEncoding, NumpressCompression};

    fn embed(values: &[f64], encoding: ArrayEncoding) -> (ByteSource, BinaryDataInfo) {
        let raw = codec::encode(values, &encoding).unwrap();
        let text = codec::encode_transport(&raw);
        let prefix = b"<binary>";
        let mut doc = prefix.to_vec();
        doc.extend_from_slice(text.as_bytes());
        doc.extend_from_slice(b"</binary>");
        let mut info = BinaryDataInfo::new(values.len() as u32);
        info.position = prefix.len() as u64;
        info.encoded_length = text.len() as u32;
        info.compression = encoding.compression;
        info.precision = Some(encoding.declared_precision());
        (ByteSource::from_bytes(doc), info)
    }

    #[test]
    fn test_apply_params() {
        let cv = ControlledVocabulary::MS;
        let mut info = BinaryDataInfo::new(3);
        assert_eq!(
            info.apply_param(cv.param(1000523, "64-bit float")),
            BinaryParamKind::Precision
        );
        assert_eq!(
            info.apply_param(cv.param(1002312, "MS-Numpress linear prediction compression")),
            BinaryParamKind::Compression
        );
        assert_eq!(
            info.apply_param(cv.param(1000574, "zlib compression")),
            BinaryParamKind::Compression
        );
        assert_eq!(
            info.apply_param(cv.param(1000514, "m/z array")),
            BinaryParamKind::ArrayType
        );
        assert_eq!(
            info.apply_param(Param::new_key_value("note", "x")),
            BinaryParamKind::Other
        );
        assert_eq!(info.precision, Some(BinaryDataArrayType::Float64));
        assert_eq!(
            info.compression,
            CompressionChain::numpress(NumpressCompression::Linear, true)
        );
        assert_eq!(info.array_type, ArrayType::MZArray);
        assert_eq!(info.unit, Unit::MZ);
        assert_eq!(info.params.len(), 1);
    }

    #[test]
    fn test_decode_from_source() {
        let values = [100.0, 200.5, 300.25];
        let (source, info) = embed(
            &values,
            ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        );
        let mut view = source.view().unwrap();
        // Leave the cursor somewhere unrelated first
        view.seek_to(2).unwrap();
        let decoded = info.decode(&mut view).unwrap();
        assert_eq!(decoded.values, values);
        let again = info.decode(&mut view).unwrap();
        assert_eq!(again, decoded);
    }

    #[test]
    fn test_unsupported_and_out_of_bounds() {
        let (source, mut info) = embed(
            &[1.0],
            ArrayEncoding::new(BinaryDataArrayType::Float32, CompressionChain::NONE),
        );
        let mut view = source.view().unwrap();

        let mut bad = info.clone();
        bad.apply_param(
            ControlledVocabulary::MS.param(1003089, "truncation, delta prediction and zlib"),
        );
        assert!(matches!(
            bad.decode(&mut view),
            Err(ArrayRetrievalError::UnsupportedCompression(_))
        ));

        info.position = 1_000;
        assert!(matches!(
            info.decode(&mut view),
            Err(ArrayRetrievalError::ReadError { .. })
        ));
    }
}
