//! Decoding and encoding of binary data array payloads.
//!
//! Decoding runs the compression chain outside-in: zlib inflate, then either a
//! Numpress transform or a fixed-width little-endian read. Statistics are gathered
//! while values are produced, never in a second pass.
use std::io::prelude::*;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use super::encodings::{
    is_target_little_endian, ArrayRetrievalError, ArrayType, BinaryDataArrayType, Bytes,
    CompressionChain, NumpressCompression,
};
use super::numpress::{self, NumpressError};

/// Numpress half-byte encoding spends at most nine nibbles on a value; only used to size
/// the inflate buffer.
const NUMPRESS_BYTES_PER_VALUE_HINT: usize = 5;

/// Summary statistics gathered while an array is decoded.
///
/// An empty array reports `max = -inf`, `min = +inf`, `min_nonzero = +inf` and
/// `-1` for every index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayStatistics {
    pub max: f64,
    pub max_index: isize,
    pub min: f64,
    pub min_index: isize,
    pub min_nonzero: f64,
    pub min_nonzero_index: isize,
    pub sum: f64,
}

impl Default for ArrayStatistics {
    fn default() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            max_index: -1,
            min: f64::INFINITY,
            min_index: -1,
            min_nonzero: f64::INFINITY,
            min_nonzero_index: -1,
            sum: 0.0,
        }
    }
}

impl ArrayStatistics {
    /// Fold the value at `index` into the running statistics. Ties keep the earliest index.
    #[inline]
    pub fn observe(&mut self, index: usize, value: f64) {
        self.sum += value;
        if value.is_nan() {
            return;
        }
        let index = index as isize;
        if self.max_index < 0 || value > self.max {
            self.max = value;
            self.max_index = index;
        }
        if self.min_index < 0 || value < self.min {
            self.min = value;
            self.min_index = index;
        }
        if value != 0.0 && (self.min_nonzero_index < 0 || value < self.min_nonzero) {
            self.min_nonzero = value;
            self.min_nonzero_index = index;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max_index < 0
    }
}

/// A materialized array and the statistics collected while decoding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedArray {
    pub values: Vec<f64>,
    pub stats: ArrayStatistics,
}

impl DecodedArray {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.values.iter()
    }
}

impl AsRef<[f64]> for DecodedArray {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// Reserve exactly `count` items, reporting failure instead of aborting.
pub(crate) fn try_allocate<T>(count: usize) -> Result<Vec<T>, ArrayRetrievalError> {
    let mut buffer = Vec::new();
    // Lengths come from the document, so a failed reservation is an expected outcome.
    buffer
        .try_reserve_exact(count)
        .map_err(|_| ArrayRetrievalError::AllocationFailed {
            requested: count.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buffer)
}

/// Collects decoded values and their statistics in one pass.
struct ArrayAccumulator {
    values: Vec<f64>,
    stats: ArrayStatistics,
}

impl ArrayAccumulator {
    fn with_capacity(count: usize) -> Result<Self, ArrayRetrievalError> {
        Ok(Self {
            values: try_allocate(count)?,
            stats: ArrayStatistics::default(),
        })
    }

    #[inline]
    fn push(&mut self, value: f64) -> Result<(), ArrayRetrievalError> {
        if self.values.len() == self.values.capacity() {
            let extra = self.values.len().max(16);
            self.values
                .try_reserve(extra)
                .map_err(|_| ArrayRetrievalError::AllocationFailed {
                    requested: (self.values.len() + extra) * std::mem::size_of::<f64>(),
                })?;
        }
        self.stats.observe(self.values.len(), value);
        self.values.push(value);
        Ok(())
    }

    fn finish(self) -> DecodedArray {
        DecodedArray {
            values: self.values,
            stats: self.stats,
        }
    }
}

/// Inflate a zlib stream into a buffer first sized to `size_hint` bytes, growing it as needed.
///
/// The stream is fed without a finishing flush so a full output buffer only pauses
/// decompression instead of ending it.
pub fn inflate(bytes: &[u8], size_hint: usize) -> Result<Bytes, ArrayRetrievalError> {
    let mut out: Bytes = try_allocate(size_hint)?;
    if bytes.is_empty() {
        return Ok(out);
    }
    let mut decoder = Decompress::new(true);
    loop {
        let before_in = decoder.total_in();
        let before_out = decoder.total_out();
        if out.len() == out.capacity() {
            let extra = out.capacity().max(1024);
            out.try_reserve(extra)
                .map_err(|_| ArrayRetrievalError::AllocationFailed {
                    requested: out.capacity().saturating_add(extra),
                })?;
        }
        let consumed = before_in as usize;
        let status = decoder
            .decompress_vec(&bytes[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled =
                    decoder.total_in() == before_in && decoder.total_out() == before_out;
                if stalled && out.len() < out.capacity() {
                    return Err(ArrayRetrievalError::DecompressionError(
                        "zlib stream ended before its end marker".to_string(),
                    ));
                }
            }
        }
    }
}

pub fn deflate(bytes: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| ArrayRetrievalError::CompressionError(e.to_string()))
}

/// Decode base64 transport text, tolerating embedded whitespace.
pub fn decode_transport(text: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
    if text.iter().any(|b| b.is_ascii_whitespace()) {
        let compact: Vec<u8> = text
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        Ok(base64_simd::STANDARD.decode_to_vec(compact)?)
    } else {
        Ok(base64_simd::STANDARD.decode_to_vec(text)?)
    }
}

pub fn encode_transport(bytes: &[u8]) -> String {
    base64_simd::STANDARD.encode_to_string(bytes)
}

fn decode_fixed_width(
    payload: &[u8],
    precision: BinaryDataArrayType,
    declared_length: usize,
) -> Result<DecodedArray, ArrayRetrievalError> {
    if !precision.is_numeric() {
        return Err(ArrayRetrievalError::UnsupportedDataType(precision));
    }
    let width = precision.size_of();
    if payload.len() % width != 0 {
        return Err(ArrayRetrievalError::DataTypeSizeMismatch);
    }
    let count = payload.len() / width;
    if count != declared_length {
        log::debug!("Decoded {count} values where {declared_length} were declared");
    }
    let mut acc = ArrayAccumulator::with_capacity(count)?;
    match precision {
        BinaryDataArrayType::Float64 => {
            for chunk in payload.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                acc.push(f64::from_le_bytes(raw))?;
            }
        }
        BinaryDataArrayType::Float32 => {
            for chunk in payload.chunks_exact(4) {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                acc.push(f32::from_le_bytes(raw) as f64)?;
            }
        }
        BinaryDataArrayType::Int64 => {
            for chunk in payload.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                acc.push(i64::from_le_bytes(raw) as f64)?;
            }
        }
        BinaryDataArrayType::Int32 => {
            for chunk in payload.chunks_exact(4) {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                acc.push(i32::from_le_bytes(raw) as f64)?;
            }
        }
        BinaryDataArrayType::Unknown | BinaryDataArrayType::ASCII => {
            return Err(ArrayRetrievalError::UnsupportedDataType(precision))
        }
    }
    Ok(acc.finish())
}

/// Errors raised inside a Numpress decode, either by the transform or by the value sink
enum NumpressSinkError {
    Numpress(NumpressError),
    Sink(ArrayRetrievalError),
}

impl From<NumpressError> for NumpressSinkError {
    fn from(value: NumpressError) -> Self {
        Self::Numpress(value)
    }
}

fn decode_numpress(
    payload: &[u8],
    kind: NumpressCompression,
    declared_length: usize,
) -> Result<DecodedArray, ArrayRetrievalError> {
    let mut acc = ArrayAccumulator::with_capacity(declared_length)?;
    let sink = |value: f64| acc.push(value).map_err(NumpressSinkError::Sink);
    let result = match kind {
        NumpressCompression::Linear => numpress::decode_linear(payload, sink),
        NumpressCompression::PositiveInteger => numpress::decode_pic(payload, sink),
        NumpressCompression::ShortLoggedFloat => numpress::decode_slof(payload, sink),
    };
    match result {
        Ok(count) => {
            if count != declared_length {
                log::debug!("{kind} produced {count} values where {declared_length} were declared");
            }
            Ok(acc.finish())
        }
        Err(NumpressSinkError::Numpress(e)) => Err(ArrayRetrievalError::NumpressDecodeFailed {
            kind,
            status: e.status(),
            reason: e.to_string(),
        }),
        Err(NumpressSinkError::Sink(e)) => Err(e),
    }
}

/// Decode raw (post-transport) bytes into values.
///
/// `precision` may be `None` only when the chain includes a Numpress stage.
/// An empty payload decodes to an empty array with sentinel statistics.
pub fn decode(
    bytes: &[u8],
    precision: Option<BinaryDataArrayType>,
    declared_length: usize,
    compression: CompressionChain,
) -> Result<DecodedArray, ArrayRetrievalError> {
    if bytes.is_empty() {
        return Ok(DecodedArray::default());
    }
    let precision = precision.filter(|p| *p != BinaryDataArrayType::Unknown);

    let inflated;
    let payload: &[u8] = if compression.zlib {
        let size_hint = match (compression.numpress, precision) {
            (Some(kind), _) => declared_length
                .saturating_mul(NUMPRESS_BYTES_PER_VALUE_HINT)
                .saturating_add(kind.header_len()),
            (None, Some(p)) => declared_length.saturating_mul(p.size_of()),
            (None, None) => return Err(ArrayRetrievalError::MissingPrecision),
        };
        inflated = inflate(bytes, size_hint)?;
        &inflated
    } else {
        bytes
    };

    match compression.numpress {
        Some(kind) => decode_numpress(payload, kind, declared_length),
        None => {
            let precision = precision.ok_or(ArrayRetrievalError::MissingPrecision)?;
            decode_fixed_width(payload, precision, declared_length)
        }
    }
}

/// How one array is written: its numeric type and compression chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayEncoding {
    pub precision: BinaryDataArrayType,
    pub compression: CompressionChain,
}

impl ArrayEncoding {
    pub const fn new(precision: BinaryDataArrayType, compression: CompressionChain) -> Self {
        Self {
            precision,
            compression,
        }
    }

    /// The preferred data type of `array_type`, zlib compressed
    pub const fn for_array(array_type: &ArrayType) -> Self {
        Self::new(array_type.preferred_dtype(), CompressionChain::ZLIB)
    }

    /// The precision recorded in the document. Numpress output is always written as 64-bit float.
    pub const fn declared_precision(&self) -> BinaryDataArrayType {
        match self.compression.numpress {
            Some(_) => BinaryDataArrayType::Float64,
            None => self.precision,
        }
    }
}

fn encode_fixed_width(
    values: &[f64],
    precision: BinaryDataArrayType,
) -> Result<Bytes, ArrayRetrievalError> {
    let mut out: Bytes = try_allocate(values.len().saturating_mul(precision.size_of()))?;
    match precision {
        BinaryDataArrayType::Float64 => {
            if is_target_little_endian() {
                out.extend_from_slice(bytemuck::cast_slice(values));
            } else {
                values
                    .iter()
                    .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
            }
        }
        BinaryDataArrayType::Float32 => {
            let narrowed: Vec<f32> = values.iter().map(|v| *v as f32).collect();
            if is_target_little_endian() {
                out.extend_from_slice(bytemuck::cast_slice(&narrowed));
            } else {
                narrowed
                    .iter()
                    .for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
            }
        }
        BinaryDataArrayType::Int64 => values
            .iter()
            .for_each(|v| out.extend_from_slice(&(v.round() as i64).to_le_bytes())),
        BinaryDataArrayType::Int32 => values
            .iter()
            .for_each(|v| out.extend_from_slice(&(v.round() as i32).to_le_bytes())),
        BinaryDataArrayType::Unknown | BinaryDataArrayType::ASCII => {
            return Err(ArrayRetrievalError::UnsupportedDataType(precision))
        }
    }
    Ok(out)
}

fn encode_numpress(values: &[f64], kind: NumpressCompression) -> Result<Bytes, ArrayRetrievalError> {
    let result = match kind {
        NumpressCompression::Linear => {
            numpress::encode_linear(values, numpress::optimal_linear_fixed_point(values))
        }
        NumpressCompression::PositiveInteger => numpress::encode_pic(values),
        NumpressCompression::ShortLoggedFloat => {
            numpress::encode_slof(values, numpress::optimal_slof_fixed_point(values))
        }
    };
    result.map_err(|e| ArrayRetrievalError::NumpressEncodeFailed {
        kind,
        status: e.status(),
        reason: e.to_string(),
    })
}

/// Encode values into raw (pre-transport) bytes, the mirror of [`decode`].
pub fn encode(values: &[f64], encoding: &ArrayEncoding) -> Result<Bytes, ArrayRetrievalError> {
    let raw = match encoding.compression.numpress {
        Some(kind) => encode_numpress(values, kind)?,
        None => encode_fixed_width(values, encoding.precision)?,
    };
    if encoding.compression.zlib {
        deflate(&raw)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn naive_stats(values: &[f64]) -> ArrayStatistics {
        let mut stats = ArrayStatistics::default();
        let mut max_idx = None;
        let mut min_idx = None;
        let mut min_nz_idx = None;
        for (i, v) in values.iter().enumerate() {
            if max_idx.map(|j: usize| *v > values[j]).unwrap_or(true) {
                max_idx = Some(i);
            }
            if min_idx.map(|j: usize| *v < values[j]).unwrap_or(true) {
                min_idx = Some(i);
            }
            if *v != 0.0 && min_nz_idx.map(|j: usize| *v < values[j]).unwrap_or(true) {
                min_nz_idx = Some(i);
            }
        }
        stats.sum = values.iter().sum();
        if let Some(i) = max_idx {
            stats.max = values[i];
            stats.max_index = i as isize;
        }
        if let Some(i) = min_idx {
            stats.min = values[i];
            stats.min_index = i as isize;
        }
        if let Some(i) = min_nz_idx {
            stats.min_nonzero = values[i];
            stats.min_nonzero_index = i as isize;
        }
        stats
    }

    fn round_trip(values: &[f64], encoding: ArrayEncoding) -> DecodedArray {
        let raw = encode(values, &encoding).unwrap();
        let text = encode_transport(&raw);
        let bytes = decode_transport(text.as_bytes()).unwrap();
        assert_eq!(bytes, raw);
        let precision = match encoding.compression.numpress {
            Some(_) => None,
            None => Some(encoding.precision),
        };
        decode(&bytes, precision, values.len(), encoding.compression).unwrap()
    }

    fn tolerance(encoding: &ArrayEncoding, value: f64) -> f64 {
        match (encoding.compression.numpress, encoding.precision) {
            (Some(NumpressCompression::ShortLoggedFloat), _) => (value.abs() + 1.0) * 1e-3,
            (Some(NumpressCompression::Linear), _) => 1e-3,
            (Some(NumpressCompression::PositiveInteger), _) => 0.5,
            (None, BinaryDataArrayType::Float32) => value.abs() * f32::EPSILON as f64,
            (None, BinaryDataArrayType::Int32 | BinaryDataArrayType::Int64) => 0.5,
            _ => 0.0,
        }
    }

    #[test]
    fn test_round_trip_all_chains() {
        let values = vec![
            101.0525, 101.0531, 150.25, 200.5, 200.75, 350.125, 512.0, 999.875, 1200.0,
        ];
        let precisions = [
            BinaryDataArrayType::Float64,
            BinaryDataArrayType::Float32,
            BinaryDataArrayType::Int32,
            BinaryDataArrayType::Int64,
        ];
        for chain in CompressionChain::all() {
            for precision in precisions {
                let encoding = ArrayEncoding::new(precision, chain);
                let decoded = round_trip(&values, encoding);
                assert_eq!(decoded.len(), values.len(), "{encoding:?}");
                for (a, b) in values.iter().zip(decoded.iter()) {
                    let tol = tolerance(&encoding, *a);
                    assert!((a - b).abs() <= tol, "{encoding:?}: {a} != {b}");
                }
                assert_eq!(decoded.stats.max_index, 8);
                assert_eq!(decoded.stats.min_index, 0);
            }
        }
    }

    #[test]
    fn test_float64_exact() {
        let values = vec![100.0, 200.5, 1e-9, 12345.678901234];
        for chain in [CompressionChain::NONE, CompressionChain::ZLIB] {
            let decoded = round_trip(
                &values,
                ArrayEncoding::new(BinaryDataArrayType::Float64, chain),
            );
            assert_eq!(decoded.values, values);
        }
    }

    #[test]
    fn test_statistics_match_naive() {
        let cases: Vec<Vec<f64>> = vec![
            vec![],
            vec![0.0, 5.0],
            vec![5.0, 0.0],
            vec![0.0],
            vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0],
            vec![0.0, 0.0, 2.5, 0.0, 2.5, 7.25],
        ];
        for values in cases {
            let decoded = round_trip(
                &values,
                ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
            );
            assert_eq!(decoded.stats, naive_stats(&values), "{values:?}");
        }
    }

    #[test]
    fn test_empty_sentinels() {
        let decoded = decode(&[], Some(BinaryDataArrayType::Float32), 0, CompressionChain::ZLIB)
            .unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.stats.is_empty());
        assert_eq!(decoded.stats.max, f64::NEG_INFINITY);
        assert_eq!(decoded.stats.min, f64::INFINITY);
        assert_eq!(decoded.stats.min_nonzero, f64::INFINITY);
        assert_eq!(decoded.stats.max_index, -1);
        assert_eq!(decoded.stats.min_index, -1);
        assert_eq!(decoded.stats.min_nonzero_index, -1);
        assert_eq!(decoded.stats.sum, 0.0);

        let zipped_empty = encode(
            &[],
            &ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        )
        .unwrap();
        let decoded = decode(
            &zipped_empty,
            Some(BinaryDataArrayType::Float64),
            0,
            CompressionChain::ZLIB,
        )
        .unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.stats.is_empty());
    }

    #[test]
    fn test_one_zero_one_nonzero() {
        let decoded = round_trip(
            &[0.0, 42.0],
            ArrayEncoding::new(BinaryDataArrayType::Float32, CompressionChain::NONE),
        );
        assert_eq!(decoded.stats.min, 0.0);
        assert_eq!(decoded.stats.min_index, 0);
        assert_eq!(decoded.stats.min_nonzero, 42.0);
        assert_eq!(decoded.stats.min_nonzero_index, 1);
        assert_eq!(decoded.stats.max_index, 1);
        assert_eq!(decoded.stats.sum, 42.0);
    }

    #[test]
    fn test_inflate_grows() {
        let values: Vec<f64> = (0..5000).map(|i| i as f64 * 0.5).collect();
        let raw = encode(
            &values,
            &ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        )
        .unwrap();
        // Declare far fewer values than are present so the first buffer is too small
        let decoded = decode(&raw, Some(BinaryDataArrayType::Float64), 3, CompressionChain::ZLIB)
            .unwrap();
        assert_eq!(decoded.values, values);
    }

    #[test]
    fn test_inflate_from_undersized_buffer() {
        let values: Vec<f64> = (0..5000).map(|i| 100.0 + i as f64 * 0.25).collect();
        let raw = deflate(bytemuck::cast_slice(&values)).unwrap();
        for hint in [0, 1, 8, 4000 * 8, 5000 * 8 - 1, 5000 * 8] {
            let inflated = inflate(&raw, hint).unwrap();
            assert_eq!(inflated.len(), 5000 * 8, "hint {hint}");
        }
        let decoded = decode(
            &raw,
            Some(BinaryDataArrayType::Float64),
            4000,
            CompressionChain::ZLIB,
        )
        .unwrap();
        assert_eq!(decoded.values, values);
    }

    #[test]
    fn test_short_numpress_zlib_arrays() {
        let values = [445.1, 445.2, 445.35];
        for kind in [
            NumpressCompression::Linear,
            NumpressCompression::PositiveInteger,
            NumpressCompression::ShortLoggedFloat,
        ] {
            let encoding = ArrayEncoding::new(
                BinaryDataArrayType::Float64,
                CompressionChain::numpress(kind, true),
            );
            for n in 1..=3 {
                let decoded = round_trip(&values[..n], encoding);
                assert_eq!(decoded.len(), n, "{kind} with {n} values");
                for (a, b) in values[..n].iter().zip(decoded.iter()) {
                    let tol = tolerance(&encoding, *a);
                    assert!((a - b).abs() <= tol, "{kind}: {a} != {b}");
                }
            }
        }
    }

    #[test]
    fn test_truncated_zlib() {
        let raw = encode(
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        )
        .unwrap();
        let err = decode(
            &raw[..raw.len() / 2],
            Some(BinaryDataArrayType::Float64),
            6,
            CompressionChain::ZLIB,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::DecompressionError(_)), "{err:?}");

        let err = decode(
            b"not zlib at all",
            Some(BinaryDataArrayType::Float64),
            2,
            CompressionChain::ZLIB,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::DecompressionError(_)), "{err:?}");
    }

    #[test]
    fn test_numpress_failure_status() {
        let chain = CompressionChain::numpress(NumpressCompression::Linear, false);
        let err = decode(&[0u8; 10], None, 1, chain).unwrap_err();
        assert!(matches!(
            err,
            ArrayRetrievalError::NumpressDecodeFailed {
                kind: NumpressCompression::Linear,
                status,
                ..
            } if status < 0
        ));

        let err = encode(
            &[-5.0],
            &ArrayEncoding::new(
                BinaryDataArrayType::Float64,
                CompressionChain::numpress(NumpressCompression::PositiveInteger, false),
            ),
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::NumpressEncodeFailed { status: -2, .. }));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(&[0u8; 8], None, 1, CompressionChain::NONE).unwrap_err(),
            ArrayRetrievalError::MissingPrecision
        );
        assert_eq!(
            decode(&[0u8; 7], Some(BinaryDataArrayType::Float64), 1, CompressionChain::NONE)
                .unwrap_err(),
            ArrayRetrievalError::DataTypeSizeMismatch
        );
        assert!(matches!(
            decode(&[0u8; 8], Some(BinaryDataArrayType::ASCII), 8, CompressionChain::NONE),
            Err(ArrayRetrievalError::UnsupportedDataType(_))
        ));
        assert!(matches!(
            decode_transport(b"!!!notbase64"),
            Err(ArrayRetrievalError::TransportError(_))
        ));
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let raw = encode(
            &[1.0, 2.0],
            &ArrayEncoding::new(
                BinaryDataArrayType::Float64,
                CompressionChain::numpress(NumpressCompression::PositiveInteger, false),
            ),
        )
        .unwrap();
        let chain = CompressionChain::numpress(NumpressCompression::PositiveInteger, false);
        let err = decode(&raw, None, usize::MAX / 2, chain).unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::AllocationFailed { .. }), "{err:?}");
    }

    #[test]
    fn test_transport_whitespace() {
        let raw = encode(
            &[1.5, 2.5],
            &ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::NONE),
        )
        .unwrap();
        let text = encode_transport(&raw);
        let (a, b) = text.split_at(8);
        let spaced = format!("\n  {a}\n{b}  \n");
        assert_eq!(decode_transport(spaced.as_bytes()).unwrap(), raw);
    }
}
