//! Lazily decoded spectrum and chromatogram records.
//!
//! A record holds its metadata and a [`BinaryDataInfo`] for every array. Building a
//! record never touches a payload; the `*_values` methods decode on each call.
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::impl_param_described;
use crate::io::source::ByteSourceRead;
use crate::params::ParamList;

use super::bindata::{ArrayRetrievalError, ArrayType, BinaryDataInfo, DecodedArray};
use super::ms_function::MsFunction;
use super::scan_properties::{
    Acquisition, ChromatogramType, Precursor, Product, ScanPolarity, SignalContinuity,
    SpectrumType,
};

static SCAN_TOKEN: OnceLock<Regex> = OnceLock::new();

/// Derive a scan number from a native id, using its `scan=N` token when present
/// and `index + 1` otherwise.
pub fn scan_number_from_id(id: &str, index: usize) -> u32 {
    let pattern = SCAN_TOKEN.get_or_init(|| Regex::new(r"(?:^|\s)scan=(\d+)").unwrap());
    pattern
        .captures(id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX))
}

/// The metadata of a `<spectrum>`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpectrumDescription {
    pub id: String,
    pub index: usize,
    pub scan_number: u32,
    pub ms_level: u8,
    pub spectrum_type: SpectrumType,
    /// Shared with every other spectrum of the same type and level
    pub function: Option<Arc<MsFunction>>,

    pub polarity: ScanPolarity,
    pub signal_continuity: SignalContinuity,

    pub total_ion_current: Option<f64>,
    pub base_peak_mz: Option<f64>,
    pub base_peak_intensity: Option<f64>,
    pub lowest_observed_mz: Option<f64>,
    pub highest_observed_mz: Option<f64>,

    pub default_array_length: usize,
    pub data_processing_ref: Option<String>,
    pub source_file_ref: Option<String>,

    pub acquisition: Acquisition,
    pub precursors: Vec<Precursor>,
    pub products: Vec<Product>,
    pub params: ParamList,
}

impl SpectrumDescription {
    /// Scan start time of the first scan, in minutes
    pub fn start_time(&self) -> Option<f64> {
        self.acquisition.start_time()
    }

    pub fn injection_time(&self) -> Option<f64> {
        self.acquisition.first_scan().and_then(|s| s.injection_time)
    }

    pub fn filter_string(&self) -> Option<&str> {
        self.acquisition
            .first_scan()
            .and_then(|s| s.filter_string.as_deref())
    }

    /// The observed m/z range, falling back to the span of the scan windows.
    pub fn mz_range(&self) -> Option<(f64, f64)> {
        if let (Some(low), Some(high)) = (self.lowest_observed_mz, self.highest_observed_mz) {
            return Some((low, high));
        }
        let windows = self
            .acquisition
            .scans
            .iter()
            .flat_map(|s| s.scan_windows.iter());
        windows.fold(None, |acc, w| match acc {
            None => Some((w.lower_bound, w.upper_bound)),
            Some((low, high)) => Some((low.min(w.lower_bound), high.max(w.upper_bound))),
        })
    }

    pub fn precursor(&self) -> Option<&Precursor> {
        self.precursors.first()
    }
}

/// A spectrum with both axis arrays located but not decoded
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRecord {
    pub description: SpectrumDescription,
    pub mz: BinaryDataInfo,
    pub intensity: BinaryDataInfo,
    /// Arrays other than m/z and intensity, in document order
    pub extra_arrays: Vec<BinaryDataInfo>,
}

impl SpectrumRecord {
    pub fn description(&self) -> &SpectrumDescription {
        &self.description
    }

    pub fn id(&self) -> &str {
        &self.description.id
    }

    pub fn index(&self) -> usize {
        self.description.index
    }

    pub fn scan_number(&self) -> u32 {
        self.description.scan_number
    }

    pub fn ms_level(&self) -> u8 {
        self.description.ms_level
    }

    pub fn polarity(&self) -> ScanPolarity {
        self.description.polarity
    }

    pub fn start_time(&self) -> Option<f64> {
        self.description.start_time()
    }

    pub fn total_ion_current(&self) -> Option<f64> {
        self.description.total_ion_current
    }

    pub fn mz_range(&self) -> Option<(f64, f64)> {
        self.description.mz_range()
    }

    pub fn mz_values<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.mz.decode(source)
    }

    pub fn intensity_values<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.intensity.decode(source)
    }

    /// Every array of this spectrum, axis arrays first
    pub fn arrays(&self) -> impl Iterator<Item = &BinaryDataInfo> {
        [&self.mz, &self.intensity]
            .into_iter()
            .chain(self.extra_arrays.iter())
    }

    pub fn get_array(&self, array_type: &ArrayType) -> Option<&BinaryDataInfo> {
        self.arrays().find(|a| a.array_type == *array_type)
    }

    pub fn decode_array<R: ByteSourceRead + ?Sized>(
        &self,
        array_type: &ArrayType,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.get_array(array_type)
            .ok_or_else(|| ArrayRetrievalError::NotFound(array_type.clone()))?
            .decode(source)
    }
}

/// The metadata of a `<chromatogram>`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChromatogramDescription {
    pub id: String,
    pub index: usize,
    pub chromatogram_type: ChromatogramType,
    pub polarity: ScanPolarity,
    pub default_array_length: usize,
    pub data_processing_ref: Option<String>,
    pub precursor: Option<Precursor>,
    pub product: Option<Product>,
    pub params: ParamList,
}

/// A chromatogram with its time and intensity arrays located but not decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ChromatogramRecord {
    pub description: ChromatogramDescription,
    pub time: BinaryDataInfo,
    pub intensity: BinaryDataInfo,
    pub extra_arrays: Vec<BinaryDataInfo>,
}

impl ChromatogramRecord {
    pub fn description(&self) -> &ChromatogramDescription {
        &self.description
    }

    pub fn id(&self) -> &str {
        &self.description.id
    }

    pub fn index(&self) -> usize {
        self.description.index
    }

    pub fn chromatogram_type(&self) -> &ChromatogramType {
        &self.description.chromatogram_type
    }

    pub fn time_values<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.time.decode(source)
    }

    pub fn intensity_values<R: ByteSourceRead + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.intensity.decode(source)
    }

    pub fn arrays(&self) -> impl Iterator<Item = &BinaryDataInfo> {
        [&self.time, &self.intensity]
            .into_iter()
            .chain(self.extra_arrays.iter())
    }

    pub fn get_array(&self, array_type: &ArrayType) -> Option<&BinaryDataInfo> {
        self.arrays().find(|a| a.array_type == *array_type)
    }

    pub fn decode_array<R: ByteSourceRead + ?Sized>(
        &self,
        array_type: &ArrayType,
        source: &mut R,
    ) -> Result<DecodedArray, ArrayRetrievalError> {
        self.get_array(array_type)
            .ok_or_else(|| ArrayRetrievalError::NotFound(array_type.clone()))?
            .decode(source)
    }
}

impl_param_described!(SpectrumDescription, ChromatogramDescription);

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::scan_properties::{ScanEvent, ScanWindow};

    #[test]
    fn test_scan_number_from_id() {
        assert_eq!(
            scan_number_from_id("controllerType=0 controllerNumber=1 scan=42", 0),
            42
        );
        assert_eq!(scan_number_from_id("spectrum=7", 6), 7);
        assert_eq!(scan_number_from_id("scan=12", 0), 12);
        assert_eq!(scan_number_from_id("prescan=12", 3), 4);
        assert_eq!(scan_number_from_id("scan=", 9), 10);
        assert_eq!(scan_number_from_id("sample=1 period=1 cycle=3 scan=88", 1), 88);
        assert_eq!(scan_number_from_id("scan=99999999999", 4), 5);
    }

    #[test]
    fn test_mz_range_fallback() {
        let mut descr = SpectrumDescription::default();
        assert_eq!(descr.mz_range(), None);
        descr.acquisition.scans.push(ScanEvent {
            scan_windows: vec![
                ScanWindow {
                    lower_bound: 200.0,
                    upper_bound: 800.0,
                },
                ScanWindow {
                    lower_bound: 150.0,
                    upper_bound: 600.0,
                },
            ],
            ..Default::default()
        });
        assert_eq!(descr.mz_range(), Some((150.0, 800.0)));
        descr.lowest_observed_mz = Some(151.5);
        descr.highest_observed_mz = Some(799.0);
        assert_eq!(descr.mz_range(), Some((151.5, 799.0)));
    }
}
