//! MS-Numpress linear prediction, positive integer and short logged float codecs.
//!
//! Decoders stream each value to a caller-supplied sink instead of materializing
//! their own buffer, so the caller controls allocation and can fold statistics
//! into the same pass. Every failure carries a negative status code.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumpressError {
    #[error("Corrupt input data: {0}")]
    CorruptInput(&'static str),
    #[error("Value {value} cannot be represented: {reason}")]
    OutOfRange { value: f64, reason: &'static str },
}

impl NumpressError {
    /// The status code a C-style caller would have received
    pub const fn status(&self) -> i32 {
        match self {
            Self::CorruptInput(_) => -1,
            Self::OutOfRange { .. } => -2,
        }
    }
}

/// The fixed point header is an 8-byte big-endian IEEE754 double
fn encode_fixed_point(fixed_point: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&fixed_point.to_be_bytes());
}

fn decode_fixed_point(data: &[u8]) -> Result<f64, NumpressError> {
    let header: [u8; 8] = data
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(NumpressError::CorruptInput(
            "not enough bytes to read fixed point",
        ))?;
    Ok(f64::from_be_bytes(header))
}

/// Packs half-bytes into bytes, high nibble first.
#[derive(Debug, Default)]
struct HalfByteWriter {
    pending: Option<u8>,
}

impl HalfByteWriter {
    fn push(&mut self, nibble: u8, out: &mut Vec<u8>) {
        match self.pending.take() {
            Some(high) => out.push((high << 4) | (nibble & 0xf)),
            None => self.pending = Some(nibble & 0xf),
        }
    }

    fn finish(self, out: &mut Vec<u8>) {
        if let Some(high) = self.pending {
            out.push(high << 4);
        }
    }

    /// Write `x` as a count nibble followed by its significant half-bytes, least significant first.
    ///
    /// A count of 1-8 means that many leading zero nibbles were dropped, 9-15 means
    /// `count - 8` leading `0xf` nibbles were dropped and 0 means all eight nibbles follow.
    fn encode_int(&mut self, x: u32, out: &mut Vec<u8>) {
        const MASK: u32 = 0xf000_0000;
        let (head, skipped) = match x & MASK {
            0 => {
                let l = (0u32..8)
                    .find(|i| x & (MASK >> (4 * i)) != 0)
                    .unwrap_or(8);
                (l, l)
            }
            MASK => {
                let l = (0u32..8)
                    .find(|i| x & (MASK >> (4 * i)) != (MASK >> (4 * i)))
                    .unwrap_or(7);
                (l + 8, l)
            }
            _ => (0, 0),
        };
        self.push(head as u8, out);
        for i in skipped..8 {
            self.push(((x >> (4 * (i - skipped))) & 0xf) as u8, out);
        }
    }
}

/// Reads half-bytes back out of a packed buffer.
struct HalfByteReader<'a> {
    data: &'a [u8],
    index: usize,
    low: bool,
}

impl<'a> HalfByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: 0,
            low: false,
        }
    }

    fn has_more(&self) -> bool {
        if self.index >= self.data.len() {
            return false;
        }
        // A lone trailing zero nibble is padding
        !(self.low && self.index == self.data.len() - 1 && self.data[self.index] & 0xf == 0)
    }

    fn nibbles_left(&self) -> usize {
        if self.index >= self.data.len() {
            0
        } else {
            (self.data.len() - self.index) * 2 - usize::from(self.low)
        }
    }

    fn next_nibble(&mut self) -> Result<u8, NumpressError> {
        let byte = *self
            .data
            .get(self.index)
            .ok_or(NumpressError::CorruptInput("truncated half-byte stream"))?;
        if self.low {
            self.low = false;
            self.index += 1;
            Ok(byte & 0xf)
        } else {
            self.low = true;
            Ok(byte >> 4)
        }
    }

    fn decode_int(&mut self) -> Result<u32, NumpressError> {
        let head = self.next_nibble()? as usize;
        let (n, mut value) = if head <= 8 {
            (head, 0u32)
        } else {
            let n = head - 8;
            let fill = (0..n).fold(0u32, |acc, i| acc | (0xf000_0000u32 >> (4 * i)));
            (n, fill)
        };
        if n == 8 {
            return Ok(value);
        }
        if 8 - n > self.nibbles_left() {
            return Err(NumpressError::CorruptInput("truncated integer"));
        }
        for i in n..8 {
            let nibble = self.next_nibble()? as u32;
            value |= nibble << ((i - n) * 4);
        }
        Ok(value)
    }
}

/// The largest fixed point that keeps every linear prediction residual of `data` in 32 bits
pub fn optimal_linear_fixed_point(data: &[f64]) -> f64 {
    match data.len() {
        0 => 0.0,
        1 => (i32::MAX as f64 / data[0]).floor(),
        _ => {
            let mut max_double = data[0].max(data[1]);
            for i in 2..data.len() {
                let extrapolated = data[i - 1] + (data[i - 1] - data[i - 2]);
                let diff = data[i] - extrapolated;
                max_double = max_double.max((diff.abs() + 1.0).ceil());
            }
            (i32::MAX as f64 / max_double).floor()
        }
    }
}

fn scale_linear(value: f64, fixed_point: f64) -> Result<i64, NumpressError> {
    let scaled = value * fixed_point + 0.5;
    if scaled > i64::MAX as f64 {
        return Err(NumpressError::OutOfRange {
            value,
            reason: "scaled value overflows a 64-bit integer",
        });
    }
    Ok(scaled as i64)
}

/// Encode `data` by storing the first two values as fixed point integers and every later
/// value as the residual from a linear extrapolation of the previous two.
pub fn encode_linear(data: &[f64], fixed_point: f64) -> Result<Vec<u8>, NumpressError> {
    let mut out = Vec::with_capacity(16 + data.len() * 5 / 2);
    encode_fixed_point(fixed_point, &mut out);
    if data.is_empty() {
        return Ok(out);
    }

    let mut ints = [0i64; 3];
    ints[1] = scale_linear(data[0], fixed_point)?;
    out.extend_from_slice(&(ints[1] as u32).to_le_bytes());
    if data.len() == 1 {
        return Ok(out);
    }
    ints[2] = scale_linear(data[1], fixed_point)?;
    out.extend_from_slice(&(ints[2] as u32).to_le_bytes());

    let mut writer = HalfByteWriter::default();
    for &value in &data[2..] {
        ints[0] = ints[1];
        ints[1] = ints[2];
        ints[2] = scale_linear(value, fixed_point)?;
        let extrapolated = ints[1] + (ints[1] - ints[0]);
        let diff = ints[2] - extrapolated;
        let diff = i32::try_from(diff).map_err(|_| NumpressError::OutOfRange {
            value,
            reason: "linear prediction residual exceeds 32 bits",
        })?;
        writer.encode_int(diff as u32, &mut out);
    }
    writer.finish(&mut out);
    Ok(out)
}

/// Decode a linear prediction buffer, passing each value to `emit`. Returns the value count.
pub fn decode_linear<E, F>(data: &[u8], mut emit: F) -> Result<usize, E>
where
    E: From<NumpressError>,
    F: FnMut(f64) -> Result<(), E>,
{
    if data.len() == 8 {
        return Ok(0);
    }
    let fixed_point = decode_fixed_point(data)?;
    let read_u32 = |offset: usize, reason: &'static str| -> Result<i64, NumpressError> {
        let bytes: [u8; 4] = data
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or(NumpressError::CorruptInput(reason))?;
        Ok(u32::from_le_bytes(bytes) as i64)
    };

    let mut ints = [0i64; 3];
    ints[1] = read_u32(8, "not enough bytes to read first value")?;
    emit(ints[1] as f64 / fixed_point)?;
    if data.len() == 12 {
        return Ok(1);
    }
    ints[2] = read_u32(12, "not enough bytes to read second value")?;
    emit(ints[2] as f64 / fixed_point)?;

    let mut count = 2;
    let mut reader = HalfByteReader::new(&data[16..]);
    while reader.has_more() {
        ints[0] = ints[1];
        ints[1] = ints[2];
        let diff = reader.decode_int()? as i32;
        let extrapolated = ints[1] + (ints[1] - ints[0]);
        let y = extrapolated + diff as i64;
        emit(y as f64 / fixed_point)?;
        ints[2] = y;
        count += 1;
    }
    Ok(count)
}

/// Encode non-negative values by rounding to the nearest integer.
pub fn encode_pic(data: &[f64]) -> Result<Vec<u8>, NumpressError> {
    let mut out = Vec::with_capacity(data.len() * 5 / 2 + 1);
    let mut writer = HalfByteWriter::default();
    for &value in data {
        if value + 0.5 > i32::MAX as f64 || value < -0.5 {
            return Err(NumpressError::OutOfRange {
                value,
                reason: "positive integer compression requires values in [0, i32::MAX]",
            });
        }
        writer.encode_int((value + 0.5) as u32, &mut out);
    }
    writer.finish(&mut out);
    Ok(out)
}

pub fn decode_pic<E, F>(data: &[u8], mut emit: F) -> Result<usize, E>
where
    E: From<NumpressError>,
    F: FnMut(f64) -> Result<(), E>,
{
    let mut reader = HalfByteReader::new(data);
    let mut count = 0;
    while reader.has_more() {
        let value = reader.decode_int()?;
        emit(value as f64)?;
        count += 1;
    }
    Ok(count)
}

/// The largest fixed point that keeps `ln(x + 1) * fixed_point` within 16 bits for all of `data`
pub fn optimal_slof_fixed_point(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let max_double = data
        .iter()
        .map(|x| (x + 1.0).ln())
        .fold(1.0f64, |acc, x| acc.max(x));
    (u16::MAX as f64 / max_double).floor()
}

pub fn encode_slof(data: &[f64], fixed_point: f64) -> Result<Vec<u8>, NumpressError> {
    let mut out = Vec::with_capacity(8 + data.len() * 2);
    encode_fixed_point(fixed_point, &mut out);
    for &value in data {
        let scaled = (value + 1.0).ln() * fixed_point;
        if scaled > u16::MAX as f64 {
            return Err(NumpressError::OutOfRange {
                value,
                reason: "logged value overflows 16 bits",
            });
        }
        let x = (scaled + 0.5) as u16;
        out.extend_from_slice(&x.to_le_bytes());
    }
    Ok(out)
}

pub fn decode_slof<E, F>(data: &[u8], mut emit: F) -> Result<usize, E>
where
    E: From<NumpressError>,
    F: FnMut(f64) -> Result<(), E>,
{
    let fixed_point = decode_fixed_point(data)?;
    let body = &data[8..];
    if body.len() % 2 != 0 {
        return Err(NumpressError::CorruptInput("odd number of bytes after fixed point").into());
    }
    for chunk in body.chunks_exact(2) {
        let x = u16::from_le_bytes([chunk[0], chunk[1]]);
        emit((x as f64 / fixed_point).exp() - 1.0)?;
    }
    Ok(body.len() / 2)
}
