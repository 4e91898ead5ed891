//! Scratch state for the `<spectrum>` or `<chromatogram>` the importer is inside.
//!
//! Builders only see attributes and params. Which builder method an event reaches
//! is decided by the importer from the element's ancestry.
use quick_xml::events::BytesStart;

use crate::io::tag_tracker::TagTracker;
use crate::params::{ControlledVocabulary, Param, ParamDescribed};
use crate::spectrum::bindata::{ArrayType, BinaryDataInfo, BinaryParamKind};
use crate::spectrum::ms_function::MsFunctionArena;
use crate::spectrum::raw_file::DiagnosticKind;
use crate::spectrum::record::{
    scan_number_from_id, ChromatogramDescription, ChromatogramRecord, SpectrumDescription,
    SpectrumRecord,
};
use crate::spectrum::scan_properties::{
    Activation, ChromatogramType, IsolationWindow, Precursor, Product, ScanEvent, ScanPolarity,
    ScanWindow, SelectedIon, SignalContinuity, SpectrumType,
};

use super::reading_shared::{
    optional_attribute, optional_parsed, required_attribute, required_parsed, ElementResult,
};

/// A data-quality problem found while finishing a record, located by the importer
pub(crate) type Finding = (DiagnosticKind, String);

/// Collects the `<binaryDataArray>` entries of one record
#[derive(Debug, Default)]
pub(crate) struct ArrayCollector {
    arrays: Vec<BinaryDataInfo>,
    current: Option<BinaryDataInfo>,
}

impl ArrayCollector {
    fn begin(&mut self, event: &BytesStart, default_length: usize) -> ElementResult {
        let encoded_length: u32 = required_parsed(event, "binaryDataArray", "encodedLength")?;
        let declared_length = match optional_parsed::<u32>(event, "binaryDataArray", "arrayLength")?
        {
            Some(n) => n,
            None => u32::try_from(default_length).unwrap_or(u32::MAX),
        };
        let mut info = BinaryDataInfo::new(declared_length);
        info.encoded_length = encoded_length;
        self.current = Some(info);
        Ok(())
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut BinaryDataInfo> {
        self.current.as_mut()
    }

    fn add_param(&mut self, param: Param) {
        if let Some(info) = self.current.as_mut() {
            let kind = info.apply_param(param);
            if kind == BinaryParamKind::UnsupportedCompression {
                log::debug!("Array declares a compression that cannot be decoded");
            }
        }
    }

    fn end(&mut self) {
        if let Some(info) = self.current.take() {
            self.arrays.push(info);
        }
    }

    /// Pick out the two axis arrays, reporting anything odd about the rest.
    fn split_axes(
        self,
        first: &ArrayType,
        second: &ArrayType,
        default_length: usize,
        findings: &mut Vec<Finding>,
    ) -> (Option<BinaryDataInfo>, Option<BinaryDataInfo>, Vec<BinaryDataInfo>) {
        let mut a = None;
        let mut b = None;
        let mut extra = Vec::new();
        for info in self.arrays {
            if info.declared_length as usize != default_length {
                findings.push((
                    DiagnosticKind::ArrayLengthMismatch,
                    format!(
                        "{} declares {} values but its record declares {}",
                        info.array_type, info.declared_length, default_length
                    ),
                ));
            }
            if info.array_type == ArrayType::Unknown {
                findings.push((
                    DiagnosticKind::UnknownArrayType,
                    "a binary data array has no array type term".to_string(),
                ));
                extra.push(info);
            } else if info.array_type == *first && a.is_none() {
                a = Some(info);
            } else if info.array_type == *second && b.is_none() {
                b = Some(info);
            } else {
                if info.array_type == *first || info.array_type == *second {
                    findings.push((
                        DiagnosticKind::DuplicateArray,
                        format!("{} appears more than once", info.array_type),
                    ));
                }
                extra.push(info);
            }
        }
        (a, b, extra)
    }
}

/// Collects precursors and products, shared by spectra and chromatograms
#[derive(Debug, Default)]
pub(crate) struct IonCollector {
    precursors: Vec<Precursor>,
    products: Vec<Product>,
}

impl IonCollector {
    fn start_element(&mut self, tag: &str, event: &BytesStart, tracker: &TagTracker) -> ElementResult {
        match tag {
            "precursor" => {
                let precursor = Precursor {
                    spectrum_ref: optional_attribute(event, "spectrumRef")?,
                    ..Default::default()
                };
                self.precursors.push(precursor);
            }
            "selectedIon" => {
                if let Some(precursor) = self.precursors.last_mut() {
                    precursor.ions.push(SelectedIon::default());
                }
            }
            "product" => self.products.push(Product::default()),
            "isolationWindow" => {
                if tracker.inside("product") {
                    if let Some(product) = self.products.last_mut() {
                        product.isolation_window = Some(IsolationWindow::default());
                    }
                } else if let Some(precursor) = self.precursors.last_mut() {
                    precursor.isolation_window = Some(IsolationWindow::default());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Route a param inside `<precursor>` or `<product>`, handing back anything else.
    fn add_param(&mut self, param: Param, tracker: &TagTracker) -> Option<Param> {
        if tracker.inside("product") {
            let product = match self.products.last_mut() {
                Some(p) => p,
                None => return Some(param),
            };
            if tracker.inside("isolationWindow") {
                if let Some(window) = product.isolation_window.as_mut() {
                    fill_isolation_window(window, param);
                    return None;
                }
            }
            product.add_param(param);
            return None;
        }
        if !tracker.inside("precursor") {
            return Some(param);
        }
        let precursor = match self.precursors.last_mut() {
            Some(p) => p,
            None => return Some(param),
        };
        if tracker.inside("isolationWindow") {
            if let Some(window) = precursor.isolation_window.as_mut() {
                fill_isolation_window(window, param);
                return None;
            }
        } else if tracker.inside("selectedIon") {
            if let Some(ion) = precursor.ions.last_mut() {
                fill_selected_ion(ion, param);
                return None;
            }
        } else if tracker.inside("activation") {
            fill_activation(&mut precursor.activation, param);
            return None;
        }
        precursor.add_param(param);
        None
    }
}

fn fill_isolation_window(window: &mut IsolationWindow, param: Param) {
    if param.controlled_vocabulary.is_some() {
        let slot = match param.accession {
            Some(1000827) => Some(&mut window.target),
            Some(1000828) => Some(&mut window.lower_offset),
            Some(1000829) => Some(&mut window.upper_offset),
            _ => None,
        };
        if let (Some(slot), Some(value)) = (slot, param.to_f64()) {
            *slot = Some(value);
            return;
        }
    }
    window.add_param(param);
}

fn fill_selected_ion(ion: &mut SelectedIon, param: Param) {
    if param.is_ms(1000744) {
        if let Some(mz) = param.to_f64() {
            ion.mz = mz;
            return;
        }
    } else if param.is_ms(1000041) {
        if let Ok(z) = param.value.trim().parse::<i32>() {
            ion.charge = Some(z);
            return;
        }
    } else if param.is_ms(1000042) {
        if let Some(intensity) = param.to_f64() {
            ion.intensity = Some(intensity);
            return;
        }
    }
    ion.add_param(param);
}

fn fill_activation(activation: &mut Activation, param: Param) {
    if Activation::is_param_activation(&param) {
        activation.methods.push(param);
    } else if param.is_ms(1000045) && param.to_f64().is_some() {
        activation.energy = param.to_f64();
    } else {
        activation.add_param(param);
    }
}

fn fill_scan_event(scan: &mut ScanEvent, param: Param) {
    if param.is_ms(1000016) {
        if let Some(value) = param.to_f64() {
            scan.start_time = Some(param.unit.time_to_minutes(value));
            return;
        }
    } else if param.is_ms(1000927) {
        if let Some(value) = param.to_f64() {
            scan.injection_time = Some(param.unit.time_to_milliseconds(value));
            return;
        }
    } else if param.is_ms(1000512) {
        scan.filter_string = Some(param.value);
        return;
    }
    scan.add_param(param);
}

fn fill_scan_window(window: &mut ScanWindow, param: Param) -> Option<Param> {
    let value = param.to_f64();
    match (param.is_ms(1000501), param.is_ms(1000500), value) {
        (true, _, Some(v)) => window.lower_bound = v,
        (_, true, Some(v)) => window.upper_bound = v,
        _ => return Some(param),
    }
    None
}

/// The scratch state of the `<spectrum>` being read
#[derive(Debug)]
pub(crate) struct SpectrumBuilder {
    pub(crate) description: SpectrumDescription,
    pub(crate) arrays: ArrayCollector,
    ions: IonCollector,
    /// Offset of the `<spectrum` start tag
    pub(crate) offset: u64,
}

impl SpectrumBuilder {
    pub(crate) fn new(event: &BytesStart, offset: u64) -> ElementResult<Self> {
        let description = SpectrumDescription {
            id: required_attribute(event, "spectrum", "id")?,
            index: required_parsed(event, "spectrum", "index")?,
            default_array_length: required_parsed(event, "spectrum", "defaultArrayLength")?,
            data_processing_ref: optional_attribute(event, "dataProcessingRef")?,
            source_file_ref: optional_attribute(event, "sourceFileRef")?,
            ..Default::default()
        };
        Ok(Self {
            description,
            arrays: ArrayCollector::default(),
            ions: IonCollector::default(),
            offset,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.description.id
    }

    pub(crate) fn start_element(
        &mut self,
        tag: &str,
        event: &BytesStart,
        tracker: &TagTracker,
    ) -> ElementResult {
        match tag {
            "scan" => {
                let scan = ScanEvent {
                    instrument_configuration_ref: optional_attribute(
                        event,
                        "instrumentConfigurationRef",
                    )?,
                    ..Default::default()
                };
                self.description.acquisition.scans.push(scan);
            }
            "scanWindow" => {
                if let Some(scan) = self.description.acquisition.scans.last_mut() {
                    scan.scan_windows.push(ScanWindow::default());
                }
            }
            "binaryDataArray" => {
                self.arrays
                    .begin(event, self.description.default_array_length)?;
            }
            _ => self.ions.start_element(tag, event, tracker)?,
        }
        Ok(())
    }

    pub(crate) fn end_element(&mut self, tag: &str) {
        if tag == "binaryDataArray" {
            self.arrays.end();
        }
    }

    pub(crate) fn add_param(&mut self, param: Param, tracker: &TagTracker) {
        if tracker.inside("binaryDataArray") {
            self.arrays.add_param(param);
            return;
        }
        let param = match self.ions.add_param(param, tracker) {
            Some(p) => p,
            None => return,
        };
        let acquisition = &mut self.description.acquisition;
        if tracker.inside("scanWindow") {
            if let Some(scan) = acquisition.scans.last_mut() {
                let rest = match scan.scan_windows.last_mut() {
                    Some(window) => fill_scan_window(window, param),
                    None => Some(param),
                };
                if let Some(rest) = rest {
                    scan.add_param(rest);
                }
                return;
            }
        } else if tracker.inside("scan") {
            if let Some(scan) = acquisition.scans.last_mut() {
                fill_scan_event(scan, param);
                return;
            }
        } else if tracker.inside("scanList") {
            acquisition.add_param(param);
            return;
        }
        self.fill_spectrum(param);
    }

    fn fill_spectrum(&mut self, param: Param) {
        let descr = &mut self.description;
        if param.controlled_vocabulary == Some(ControlledVocabulary::MS) {
            if let Some(accession) = param.accession {
                if let Some(polarity) = ScanPolarity::from_accession(accession) {
                    descr.polarity = polarity;
                    return;
                }
                if let Some(continuity) = SignalContinuity::from_accession(accession) {
                    descr.signal_continuity = continuity;
                    return;
                }
                let slot = match accession {
                    1000285 => Some(&mut descr.total_ion_current),
                    1000504 => Some(&mut descr.base_peak_mz),
                    1000505 => Some(&mut descr.base_peak_intensity),
                    1000528 => Some(&mut descr.lowest_observed_mz),
                    1000527 => Some(&mut descr.highest_observed_mz),
                    _ => None,
                };
                if let (Some(slot), Some(value)) = (slot, param.to_f64()) {
                    *slot = Some(value);
                    return;
                }
                if accession == 1000511 {
                    if let Ok(level) = param.value.trim().parse::<u8>() {
                        descr.ms_level = level;
                        return;
                    }
                }
                if let Some(spectrum_type) = SpectrumType::from_param(&param) {
                    descr.spectrum_type = spectrum_type;
                    return;
                }
            }
        }
        descr.add_param(param);
    }

    /// Close the spectrum. Without both axis arrays no record is produced.
    pub(crate) fn finish(
        mut self,
        functions: &mut MsFunctionArena,
        findings: &mut Vec<Finding>,
    ) -> Option<SpectrumRecord> {
        let default_length = self.description.default_array_length;
        let (mz, intensity, extra_arrays) = self.arrays.split_axes(
            &ArrayType::MZArray,
            &ArrayType::IntensityArray,
            default_length,
            findings,
        );
        let descr = &mut self.description;
        descr.precursors = self.ions.precursors;
        descr.products = self.ions.products;
        descr.scan_number = scan_number_from_id(&descr.id, descr.index);
        let function_type = match &descr.spectrum_type {
            SpectrumType::Unknown => SpectrumType::default_for_level(descr.ms_level),
            tp => tp.clone(),
        };
        descr.function = Some(functions.intern(function_type, descr.ms_level));

        match (mz, intensity) {
            (Some(mz), Some(intensity)) => Some(SpectrumRecord {
                description: self.description,
                mz,
                intensity,
                extra_arrays,
            }),
            (mz, _) => {
                let missing = if mz.is_none() { "m/z" } else { "intensity" };
                findings.push((
                    DiagnosticKind::MissingArray,
                    format!("spectrum has no {missing} array and was skipped"),
                ));
                None
            }
        }
    }
}

/// The scratch state of the `<chromatogram>` being read
#[derive(Debug)]
pub(crate) struct ChromatogramBuilder {
    pub(crate) description: ChromatogramDescription,
    pub(crate) arrays: ArrayCollector,
    ions: IonCollector,
    pub(crate) offset: u64,
}

impl ChromatogramBuilder {
    pub(crate) fn new(event: &BytesStart, offset: u64) -> ElementResult<Self> {
        let description = ChromatogramDescription {
            id: required_attribute(event, "chromatogram", "id")?,
            index: required_parsed(event, "chromatogram", "index")?,
            default_array_length: required_parsed(event, "chromatogram", "defaultArrayLength")?,
            data_processing_ref: optional_attribute(event, "dataProcessingRef")?,
            ..Default::default()
        };
        Ok(Self {
            description,
            arrays: ArrayCollector::default(),
            ions: IonCollector::default(),
            offset,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.description.id
    }

    pub(crate) fn start_element(
        &mut self,
        tag: &str,
        event: &BytesStart,
        tracker: &TagTracker,
    ) -> ElementResult {
        if tag == "binaryDataArray" {
            self.arrays
                .begin(event, self.description.default_array_length)
        } else {
            self.ions.start_element(tag, event, tracker)
        }
    }

    pub(crate) fn end_element(&mut self, tag: &str) {
        if tag == "binaryDataArray" {
            self.arrays.end();
        }
    }

    pub(crate) fn add_param(&mut self, param: Param, tracker: &TagTracker) {
        if tracker.inside("binaryDataArray") {
            self.arrays.add_param(param);
            return;
        }
        let param = match self.ions.add_param(param, tracker) {
            Some(p) => p,
            None => return,
        };
        let descr = &mut self.description;
        let ms_accession = param
            .accession
            .filter(|_| param.controlled_vocabulary == Some(ControlledVocabulary::MS));
        if let Some(polarity) = ms_accession.and_then(ScanPolarity::from_accession) {
            descr.polarity = polarity;
        } else if let Some(tp) = ChromatogramType::from_param(&param) {
            descr.chromatogram_type = tp;
        } else {
            descr.add_param(param);
        }
    }

    pub(crate) fn finish(mut self, findings: &mut Vec<Finding>) -> Option<ChromatogramRecord> {
        let default_length = self.description.default_array_length;
        let (time, intensity, extra_arrays) = self.arrays.split_axes(
            &ArrayType::TimeArray,
            &ArrayType::IntensityArray,
            default_length,
            findings,
        );
        self.description.precursor = self.ions.precursors.into_iter().next();
        self.description.product = self.ions.products.into_iter().next();
        match (time, intensity) {
            (Some(time), Some(intensity)) => Some(ChromatogramRecord {
                description: self.description,
                time,
                intensity,
                extra_arrays,
            }),
            (time, _) => {
                let missing = if time.is_none() { "time" } else { "intensity" };
                findings.push((
                    DiagnosticKind::MissingArray,
                    format!("chromatogram has no {missing} array and was skipped"),
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Unit;

    fn tracker_at(path: &[&str]) -> TagTracker {
        let mut tracker = TagTracker::new();
        for name in path {
            tracker.enter(*name);
        }
        tracker
    }

    #[test]
    fn test_precursor_routing() {
        let cv = ControlledVocabulary::MS;
        let event = BytesStart::from_content(
            r#"spectrum id="scan=2" index="1" defaultArrayLength="0""#,
            8,
        );
        let mut builder = SpectrumBuilder::new(&event, 0).unwrap();
        let precursor = BytesStart::from_content(r#"precursor spectrumRef="scan=1""#, 9);
        let tracker = tracker_at(&["spectrum", "precursorList", "precursor"]);
        builder.start_element("precursor", &precursor, &tracker).unwrap();

        let tracker = tracker_at(&[
            "spectrum",
            "precursorList",
            "precursor",
            "isolationWindow",
        ]);
        builder
            .start_element("isolationWindow", &BytesStart::new("isolationWindow"), &tracker)
            .unwrap();
        builder.add_param(cv.param_val(1000827, "isolation window target m/z", 445.3), &tracker);
        builder.add_param(cv.param_val(1000828, "isolation window lower offset", 1.0), &tracker);

        let tracker = tracker_at(&[
            "spectrum",
            "precursorList",
            "precursor",
            "selectedIonList",
            "selectedIon",
        ]);
        builder
            .start_element("selectedIon", &BytesStart::new("selectedIon"), &tracker)
            .unwrap();
        builder.add_param(cv.param_val(1000744, "selected ion m/z", 445.34), &tracker);
        builder.add_param(cv.param_val(1000041, "charge state", 2), &tracker);

        let tracker = tracker_at(&["spectrum", "precursorList", "precursor", "activation"]);
        builder.add_param(cv.param(1000133, "collision-induced dissociation"), &tracker);
        builder.add_param(
            cv.param_val(1000045, "collision energy", 35).with_unit_t(&Unit::Electronvolt),
            &tracker,
        );

        let tracker = tracker_at(&["spectrum"]);
        builder.add_param(cv.param_val(1000511, "ms level", 2), &tracker);

        let mut findings = Vec::new();
        let mut arena = MsFunctionArena::new();
        assert!(builder.finish(&mut arena, &mut findings).is_none());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, DiagnosticKind::MissingArray);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_scan_routing() {
        let cv = ControlledVocabulary::MS;
        let event = BytesStart::from_content(
            r#"spectrum id="scan=1" index="0" defaultArrayLength="2""#,
            8,
        );
        let mut builder = SpectrumBuilder::new(&event, 0).unwrap();
        let tracker = tracker_at(&["spectrum", "scanList", "scan"]);
        builder
            .start_element("scan", &BytesStart::new("scan"), &tracker)
            .unwrap();
        builder.add_param(
            cv.param_val(1000016, "scan start time", 90.0)
                .with_unit("UO:0000010", "second"),
            &tracker,
        );
        builder.add_param(cv.param_val(1000512, "filter string", "FTMS + p"), &tracker);
        let tracker = tracker_at(&["spectrum", "scanList", "scan", "scanWindowList", "scanWindow"]);
        builder
            .start_element("scanWindow", &BytesStart::new("scanWindow"), &tracker)
            .unwrap();
        builder.add_param(cv.param_val(1000501, "scan window lower limit", 200), &tracker);
        builder.add_param(cv.param_val(1000500, "scan window upper limit", 2000), &tracker);
        let tracker = tracker_at(&["spectrum"]);
        builder.add_param(cv.param(1000579, "MS1 spectrum"), &tracker);
        builder.add_param(cv.param(1000130, "positive scan"), &tracker);
        builder.add_param(cv.param_val(1000285, "total ion current", 30.0), &tracker);

        let descr = &builder.description;
        assert_eq!(descr.start_time(), Some(1.5));
        assert_eq!(descr.filter_string(), Some("FTMS + p"));
        assert_eq!(descr.mz_range(), Some((200.0, 2000.0)));
        assert_eq!(descr.spectrum_type, SpectrumType::MS1Spectrum);
        assert_eq!(descr.polarity, ScanPolarity::Positive);
        assert_eq!(descr.total_ion_current, Some(30.0));
        assert!(descr.params.is_empty());
    }

    #[test]
    fn test_injection_time_units() {
        let cv = ControlledVocabulary::MS;
        let cases = [
            (Some(("UO:0000028", "millisecond")), 20.25, 20.25),
            (Some(("UO:0000010", "second")), 0.25, 250.0),
            (Some(("UO:0000031", "minute")), 0.5, 30000.0),
            (None, 35.0, 35.0),
        ];
        for (unit, value, expected) in cases {
            let mut param = cv.param_val(1000927, "ion injection time", value);
            if let Some((accession, name)) = unit {
                param = param.with_unit(accession, name);
            }
            let mut scan = ScanEvent::default();
            fill_scan_event(&mut scan, param);
            assert_eq!(scan.injection_time, Some(expected), "{unit:?}");
            assert!(scan.params.is_empty());
        }
    }
}
