use std::fmt::Debug;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;

use crate::io::offset_index::OffsetIndex;
use crate::io::source::ByteSourceRead;
use crate::io::task::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::io::utils::MD5HashingStream;
use crate::meta::{
    DataProcessing, FileMetadata, InstrumentConfiguration, MSDataFileMetadata, Software,
};
use crate::params::{ControlledVocabulary, Param, ParamDescribed, Unit};
use crate::spectrum::bindata::{
    encode, encode_transport, ArrayEncoding, ArrayRetrievalError, ArrayType, BinaryDataArrayType,
    BinaryDataInfo, CompressionChain, DecodedArray,
};
use crate::spectrum::raw_file::RawDataFile;
use crate::spectrum::record::{ChromatogramRecord, SpectrumDescription, SpectrumRecord};
use crate::spectrum::scan_properties::*;

const BUFFER_SIZE: usize = 64 * 1024;

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value: &str = $value.as_ref();
        $elt.push_attribute(($name, value));
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

const MS: ControlledVocabulary = ControlledVocabulary::MS;

const MS_LEVEL: u32 = 1000511;
const TOTAL_ION_CURRENT: u32 = 1000285;
const BASE_PEAK_MZ: u32 = 1000504;
const BASE_PEAK_INTENSITY: u32 = 1000505;
const LOWEST_OBSERVED_MZ: u32 = 1000528;
const HIGHEST_OBSERVED_MZ: u32 = 1000527;
const SCAN_START_TIME: u32 = 1000016;
const ION_INJECTION_TIME: u32 = 1000927;
const FILTER_STRING: u32 = 1000512;

/**
The different states that [`MzMLWriter`] can enter while writing an mzML document.
This is only necessary for the module consumer when determining where something
may have gone wrong.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum MzMLWriterState {
    Start,
    Header,
    SpectrumList,
    SpectrumListClosed,
    ChromatogramList,
    ChromatogramListClosed,
    MzMLClosed,
    End,
}

#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error {0} was encountered while writing")]
    XMLError(#[from] XMLError),
    #[error("An IO error {0} was encountered while writing")]
    IOError(#[from] io::Error),
    #[error("Cannot move from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: MzMLWriterState,
        to_state: MzMLWriterState,
    },
    #[error("Failed to re-encode {array_type} of {id}: {source}")]
    CodecError {
        id: String,
        array_type: ArrayType,
        #[source]
        source: ArrayRetrievalError,
    },
}

impl From<MzMLWriterError> for io::Error {
    fn from(value: MzMLWriterError) -> Self {
        match value {
            MzMLWriterError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

/// The precision and compression each kind of array is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPolicy {
    pub mz: ArrayEncoding,
    pub intensity: ArrayEncoding,
    pub time: ArrayEncoding,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self {
            mz: ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
            intensity: ArrayEncoding::new(BinaryDataArrayType::Float32, CompressionChain::ZLIB),
            time: ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        }
    }
}

impl ExportPolicy {
    pub fn with_mz(mut self, encoding: ArrayEncoding) -> Self {
        self.mz = encoding;
        self
    }

    pub fn with_intensity(mut self, encoding: ArrayEncoding) -> Self {
        self.intensity = encoding;
        self
    }

    pub fn with_time(mut self, encoding: ArrayEncoding) -> Self {
        self.time = encoding;
        self
    }

    /// The encoding for an array. Arrays without a policy slot keep the encoding they were read with.
    pub fn encoding_for(&self, info: &BinaryDataInfo) -> ArrayEncoding {
        match &info.array_type {
            ArrayType::MZArray => self.mz,
            ArrayType::IntensityArray => self.intensity,
            ArrayType::TimeArray => self.time,
            array_type => {
                let precision = info
                    .precision
                    .filter(|p| p.is_numeric())
                    .unwrap_or_else(|| array_type.preferred_dtype());
                ArrayEncoding::new(precision, info.compression)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub policy: ExportPolicy,
    /// Added to the softwareList and referenced by the conversion entry of the dataProcessingList
    pub software: Software,
    /// Wrap the document in `<indexedmzML>` with an offset index and checksum
    pub write_index: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            policy: ExportPolicy::default(),
            software: Software::this_library(),
            write_index: true,
        }
    }
}

impl ExportOptions {
    pub fn with_policy(mut self, policy: ExportPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_software(mut self, software: Software) -> Self {
        self.software = software;
        self
    }

    pub fn with_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }
}

/// How an export ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { spectra: usize, chromatograms: usize },
    Cancelled,
}

struct InnerXMLWriter<W: Write> {
    handle: Writer<MD5HashingStream<BufWriter<W>>>,
}

impl<W: Write> Debug for InnerXMLWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerXMLWriter")
            .field("position", &self.position())
            .finish()
    }
}

impl<W: Write> InnerXMLWriter<W> {
    fn new(file: W) -> Self {
        let stream = MD5HashingStream::new(BufWriter::with_capacity(BUFFER_SIZE, file));
        Self {
            handle: Writer::new_with_indent(stream, b' ', 2),
        }
    }

    /// The offset of the next byte to be written
    fn position(&self) -> u64 {
        self.handle.get_ref().bytes_written()
    }

    fn digest(&self) -> String {
        format!("{:x}", self.handle.get_ref().compute())
    }

    fn write_event(&mut self, event: Event) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }

    /// Write a start tag, returning the offset of its `<`
    fn write_start_at(&mut self, elt: &BytesStart) -> Result<u64, MzMLWriterError> {
        self.handle.write_event(Event::Start(elt.borrow()))?;
        Ok(self.position() - (elt.len() as u64 + 2))
    }

    fn write_param(&mut self, param: &Param) -> WriterResult {
        let mut elt = match (param.curie(), param.controlled_vocabulary.and_then(|cv| cv.prefix())) {
            (Some(curie), Some(cv_ref)) => {
                let mut elt = bstart!("cvParam");
                attrib!("cvRef", cv_ref, elt);
                attrib!("accession", curie, elt);
                elt
            }
            _ => bstart!("userParam"),
        };
        attrib!("name", param.name, elt);
        attrib!("value", param.value, elt);
        if let Some((unit_acc, unit_name)) = param.unit.for_param() {
            let prefix = unit_acc.split(':').next().unwrap_or("UO");
            attrib!("unitCvRef", prefix, elt);
            attrib!("unitAccession", unit_acc, elt);
            attrib!("unitName", unit_name, elt);
        }
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    fn write_param_list<'a, T: IntoIterator<Item = &'a Param>>(&mut self, params: T) -> WriterResult {
        for param in params {
            self.write_param(param)?
        }
        Ok(())
    }

    fn write_value(&mut self, accession: u32, name: &str, value: f64, unit: Unit) -> WriterResult {
        self.write_param(&MS.param_val(accession, name, value).with_unit_t(&unit))
    }

    fn write_text_element(&mut self, name: &str, content: &str) -> WriterResult {
        let tag = BytesStart::new(name);
        self.handle.write_event(Event::Start(tag.borrow()))?;
        self.handle.write_event(Event::Text(BytesText::new(content)))?;
        self.handle.write_event(Event::End(tag.to_end()))?;
        Ok(())
    }

    fn into_inner(self) -> io::Result<W> {
        self.handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
    }
}

fn codec_error(id: &str, info: &BinaryDataInfo, source: ArrayRetrievalError) -> MzMLWriterError {
    MzMLWriterError::CodecError {
        id: id.to_string(),
        array_type: info.array_type.clone(),
        source,
    }
}

/// Decode every array of a record, axis arrays first
fn decode_arrays<'r, R, I>(
    arrays: I,
    source: &mut R,
    id: &str,
) -> Result<Vec<(&'r BinaryDataInfo, DecodedArray)>, MzMLWriterError>
where
    R: ByteSourceRead + ?Sized,
    I: Iterator<Item = &'r BinaryDataInfo>,
{
    arrays
        .map(|info| {
            info.decode(source)
                .map(|values| (info, values))
                .map_err(|e| codec_error(id, info, e))
        })
        .collect()
}

/**
Writes an mzML document one record at a time, re-encoding each array from the
document it was read from.

Counts are declared when a list is opened, so the caller must know how many records
it will write. When indexing is enabled the byte offset of every record is collected
and written with an MD5 `<fileChecksum>` when the writer is closed.
*/
#[derive(Debug)]
pub struct MzMLWriter<W: Write> {
    handle: InnerXMLWriter<W>,
    state: MzMLWriterState,
    options: ExportOptions,
    spectrum_index: OffsetIndex,
    chromatogram_index: OffsetIndex,
    spectrum_count: usize,
    spectrum_counter: usize,
    chromatogram_count: usize,
    chromatogram_counter: usize,
    spectrum_data_processing: String,
    chromatogram_data_processing: String,
}

impl<W: Write> MzMLWriter<W> {
    const PSIMS_VERSION: &'static str = "4.1.57";
    const UNIT_VERSION: &'static str = "releases/2020-03-10";

    pub fn new(file: W, options: ExportOptions) -> Self {
        Self {
            handle: InnerXMLWriter::new(file),
            state: MzMLWriterState::Start,
            options,
            spectrum_index: OffsetIndex::new("spectrum"),
            chromatogram_index: OffsetIndex::new("chromatogram"),
            spectrum_count: 0,
            spectrum_counter: 0,
            chromatogram_count: 0,
            chromatogram_counter: 0,
            spectrum_data_processing: String::new(),
            chromatogram_data_processing: String::new(),
        }
    }

    pub fn state(&self) -> MzMLWriterState {
        self.state
    }

    pub fn spectrum_index(&self) -> &OffsetIndex {
        &self.spectrum_index
    }

    pub fn chromatogram_index(&self) -> &OffsetIndex {
        &self.chromatogram_index
    }

    fn transition_err(&self, to_state: MzMLWriterState) -> WriterResult {
        Err(MzMLWriterError::StateTransitionError {
            from_state: self.state,
            to_state,
        })
    }

    fn conversion_id(&self) -> String {
        format!("{}_conversion", self.options.software.id)
    }

    fn start_document(&mut self) -> WriterResult {
        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        if self.options.write_index {
            let mut indexed = bstart!("indexedmzML");
            indexed.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
            indexed.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
            indexed.push_attribute((
                "xsi:schemaLocation",
                "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.3_idx.xsd",
            ));
            self.handle.write_event(Event::Start(indexed))?;
        }
        let mut mzml = bstart!("mzML");
        mzml.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
        mzml.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        mzml.push_attribute((
            "xsi:schemaLocation",
            "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.0.xsd",
        ));
        mzml.push_attribute(("version", "1.1.0"));
        self.handle.write_event(Event::Start(mzml))?;
        Ok(())
    }

    fn write_cv_list(&mut self) -> WriterResult {
        let mut cv_list = bstart!("cvList");
        cv_list.push_attribute(("count", "2"));
        start_event!(self, cv_list);

        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "MS"));
        cv.push_attribute(("fullName", "PSI-MS"));
        cv.push_attribute(("URI", "http://purl.obolibrary.org/obo/ms.obo"));
        cv.push_attribute(("version", Self::PSIMS_VERSION));
        self.handle.write_event(Event::Empty(cv))?;

        let mut cv = bstart!("cv");
        cv.push_attribute(("id", "UO"));
        cv.push_attribute(("fullName", "UNIT-ONTOLOGY"));
        cv.push_attribute(("URI", "http://ontologies.berkeleybop.org/uo.obo"));
        cv.push_attribute(("version", Self::UNIT_VERSION));
        self.handle.write_event(Event::Empty(cv))?;

        end_event!(self, cv_list);
        Ok(())
    }

    fn write_file_description(&mut self, metadata: &FileMetadata) -> WriterResult {
        let fd = bstart!("fileDescription");
        start_event!(self, fd);

        let fc_tag = bstart!("fileContent");
        start_event!(self, fc_tag);
        self.handle.write_param_list(metadata.file_description.params())?;
        end_event!(self, fc_tag);

        let source_files = &metadata.file_description.source_files;
        if !source_files.is_empty() {
            let mut outer = bstart!("sourceFileList");
            let count = source_files.len().to_string();
            attrib!("count", count, outer);
            start_event!(self, outer);
            for sf in source_files.iter() {
                let mut tag = bstart!("sourceFile");
                attrib!("id", sf.id, tag);
                attrib!("name", sf.name, tag);
                attrib!("location", sf.location, tag);
                start_event!(self, tag);
                self.handle.write_param_list(sf.params())?;
                end_event!(self, tag);
            }
            end_event!(self, outer);
        }

        end_event!(self, fd);
        Ok(())
    }

    fn write_software_list(&mut self, softwares: &[Software]) -> WriterResult {
        let own = &self.options.software;
        let include_own = !softwares.iter().any(|sw| sw.id == own.id);
        let mut all: Vec<&Software> = softwares.iter().collect();
        if include_own {
            all.push(own);
        }
        let mut outer = bstart!("softwareList");
        let count = all.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for soft in all {
            let mut tag = bstart!("software");
            attrib!("id", soft.id, tag);
            attrib!("version", soft.version, tag);
            start_event!(self, tag);
            self.handle.write_param_list(soft.params())?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_instrument_configurations(
        &mut self,
        configurations: &[InstrumentConfiguration],
    ) -> WriterResult {
        let placeholder = [InstrumentConfiguration::new("IC1")];
        let configurations = if configurations.is_empty() {
            &placeholder[..]
        } else {
            configurations
        };
        let mut outer = bstart!("instrumentConfigurationList");
        let count = configurations.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for ic in configurations {
            let mut tag = bstart!("instrumentConfiguration");
            attrib!("id", ic.id, tag);
            start_event!(self, tag);
            self.handle.write_param_list(ic.params())?;
            if let Some(software_ref) = ic.software_reference.as_ref() {
                let mut sw = bstart!("softwareRef");
                attrib!("ref", software_ref, sw);
                self.handle.write_event(Event::Empty(sw))?;
            }
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_data_processing(&mut self, data_processings: &[DataProcessing]) -> WriterResult {
        let conversion = DataProcessing::conversion(self.conversion_id(), self.options.software.id.clone());
        let mut outer = bstart!("dataProcessingList");
        let count = (data_processings.len() + 1).to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for dp in data_processings.iter().chain([&conversion]) {
            let mut tag = bstart!("dataProcessing");
            attrib!("id", dp.id, tag);
            start_event!(self, tag);
            for method in dp.iter() {
                let mut mtag = bstart!("processingMethod");
                let order = method.order.to_string();
                attrib!("order", order, mtag);
                attrib!("softwareRef", method.software_reference, mtag);
                start_event!(self, mtag);
                self.handle.write_param_list(method.params())?;
                end_event!(self, mtag);
            }
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn start_run(&mut self, metadata: &FileMetadata) -> WriterResult {
        let run_meta = metadata.run_description();
        let mut run = bstart!("run");
        let run_id = run_meta.id.clone().unwrap_or_else(|| "run1".to_string());
        attrib!("id", run_id, run);
        let instrument_ref = run_meta
            .default_instrument_id
            .clone()
            .or_else(|| metadata.instrument_configurations.first().map(|ic| ic.id.clone()))
            .unwrap_or_else(|| "IC1".to_string());
        attrib!("defaultInstrumentConfigurationRef", instrument_ref, run);
        if let Some(sf_ref) = run_meta.default_source_file_id.as_ref() {
            attrib!("defaultSourceFileRef", sf_ref, run);
        }
        if let Some(ts) = run_meta.start_time.as_ref() {
            attrib!("startTimeStamp", ts, run);
        }
        self.handle.write_event(Event::Start(run))?;
        Ok(())
    }

    /// Write everything that precedes the `<spectrumList>`
    pub fn write_header(&mut self, metadata: &FileMetadata) -> WriterResult {
        if self.state != MzMLWriterState::Start {
            return self.transition_err(MzMLWriterState::Header);
        }
        self.start_document()?;
        self.write_cv_list()?;
        self.write_file_description(metadata)?;
        self.write_software_list(&metadata.softwares)?;
        self.write_instrument_configurations(&metadata.instrument_configurations)?;
        self.write_data_processing(&metadata.data_processings)?;
        self.start_run(metadata)?;

        let conversion = self.conversion_id();
        self.spectrum_data_processing = metadata
            .run
            .spectrum_data_processing_ref
            .clone()
            .unwrap_or_else(|| conversion.clone());
        self.chromatogram_data_processing = metadata
            .run
            .chromatogram_data_processing_ref
            .clone()
            .unwrap_or(conversion);
        self.state = MzMLWriterState::Header;
        Ok(())
    }

    /// Open the `<spectrumList>`, declaring that `count` spectra will follow
    pub fn start_spectrum_list(&mut self, count: usize) -> WriterResult {
        if self.state != MzMLWriterState::Header {
            return self.transition_err(MzMLWriterState::SpectrumList);
        }
        let mut list = bstart!("spectrumList");
        let count_s = count.to_string();
        attrib!("count", count_s, list);
        attrib!("defaultDataProcessingRef", self.spectrum_data_processing, list);
        self.handle.write_event(Event::Start(list))?;
        self.spectrum_count = count;
        self.state = MzMLWriterState::SpectrumList;
        Ok(())
    }

    pub fn close_spectrum_list(&mut self) -> WriterResult {
        if self.state != MzMLWriterState::SpectrumList {
            return self.transition_err(MzMLWriterState::SpectrumListClosed);
        }
        if self.spectrum_count != self.spectrum_counter {
            warn!(
                "Declared {} spectra but wrote {}",
                self.spectrum_count, self.spectrum_counter
            );
        }
        self.handle
            .write_event(Event::End(BytesEnd::new("spectrumList")))?;
        self.state = MzMLWriterState::SpectrumListClosed;
        Ok(())
    }

    pub fn start_chromatogram_list(&mut self, count: usize) -> WriterResult {
        if self.state != MzMLWriterState::SpectrumListClosed {
            return self.transition_err(MzMLWriterState::ChromatogramList);
        }
        let mut list = bstart!("chromatogramList");
        let count_s = count.to_string();
        attrib!("count", count_s, list);
        attrib!("defaultDataProcessingRef", self.chromatogram_data_processing, list);
        self.handle.write_event(Event::Start(list))?;
        self.chromatogram_count = count;
        self.state = MzMLWriterState::ChromatogramList;
        Ok(())
    }

    pub fn close_chromatogram_list(&mut self) -> WriterResult {
        if self.state != MzMLWriterState::ChromatogramList {
            return self.transition_err(MzMLWriterState::ChromatogramListClosed);
        }
        if self.chromatogram_count != self.chromatogram_counter {
            warn!(
                "Declared {} chromatograms but wrote {}",
                self.chromatogram_count, self.chromatogram_counter
            );
        }
        self.handle
            .write_event(Event::End(BytesEnd::new("chromatogramList")))?;
        self.state = MzMLWriterState::ChromatogramListClosed;
        Ok(())
    }

    fn write_scan_list(&mut self, acq: &Acquisition) -> WriterResult {
        let mut scan_list_tag = bstart!("scanList");
        let count = acq.scans.len().to_string();
        attrib!("count", count, scan_list_tag);
        start_event!(self, scan_list_tag);
        if acq.params.is_empty() {
            self.handle
                .write_param(&MS.param(1000795, "no combination"))?;
        } else {
            self.handle.write_param_list(acq.params())?;
        }
        for scan in acq.scans.iter() {
            let mut scan_tag = bstart!("scan");
            if let Some(ic_ref) = scan.instrument_configuration_ref.as_ref() {
                attrib!("instrumentConfigurationRef", ic_ref, scan_tag);
            }
            start_event!(self, scan_tag);
            if let Some(time) = scan.start_time {
                self.handle
                    .write_value(SCAN_START_TIME, "scan start time", time, Unit::Minute)?;
            }
            if let Some(filter) = scan.filter_string.as_ref() {
                self.handle
                    .write_param(&MS.param_val(FILTER_STRING, "filter string", filter))?;
            }
            if let Some(injection) = scan.injection_time {
                self.handle.write_value(
                    ION_INJECTION_TIME,
                    "ion injection time",
                    injection,
                    Unit::Millisecond,
                )?;
            }
            self.handle.write_param_list(scan.params())?;
            if !scan.scan_windows.is_empty() {
                let mut windows_tag = bstart!("scanWindowList");
                let count = scan.scan_windows.len().to_string();
                attrib!("count", count, windows_tag);
                start_event!(self, windows_tag);
                for window in scan.scan_windows.iter() {
                    let window_tag = bstart!("scanWindow");
                    start_event!(self, window_tag);
                    self.handle.write_value(
                        1000501,
                        "scan window lower limit",
                        window.lower_bound,
                        Unit::MZ,
                    )?;
                    self.handle.write_value(
                        1000500,
                        "scan window upper limit",
                        window.upper_bound,
                        Unit::MZ,
                    )?;
                    end_event!(self, window_tag);
                }
                end_event!(self, windows_tag);
            }
            end_event!(self, scan_tag);
        }
        end_event!(self, scan_list_tag);
        Ok(())
    }

    fn write_isolation_window(&mut self, iw: &IsolationWindow) -> WriterResult {
        let iw_tag = bstart!("isolationWindow");
        start_event!(self, iw_tag);
        if let Some(target) = iw.target {
            self.handle
                .write_value(1000827, "isolation window target m/z", target, Unit::MZ)?;
        }
        if let Some(lower) = iw.lower_offset {
            self.handle
                .write_value(1000828, "isolation window lower offset", lower, Unit::MZ)?;
        }
        if let Some(upper) = iw.upper_offset {
            self.handle
                .write_value(1000829, "isolation window upper offset", upper, Unit::MZ)?;
        }
        self.handle.write_param_list(iw.params())?;
        end_event!(self, iw_tag);
        Ok(())
    }

    fn write_selected_ions(&mut self, precursor: &Precursor) -> WriterResult {
        if precursor.ions.is_empty() {
            return Ok(());
        }
        let mut outer = bstart!("selectedIonList");
        let count = precursor.ions.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for ion in precursor.ions.iter() {
            let tag = bstart!("selectedIon");
            start_event!(self, tag);
            self.handle
                .write_value(1000744, "selected ion m/z", ion.mz, Unit::MZ)?;
            if let Some(charge) = ion.charge {
                self.handle
                    .write_param(&MS.param_val(1000041, "charge state", charge))?;
            }
            if let Some(intensity) = ion.intensity {
                self.handle.write_value(
                    1000042,
                    "peak intensity",
                    intensity,
                    Unit::DetectorCounts,
                )?;
            }
            self.handle.write_param_list(ion.params())?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_activation(&mut self, activation: &Activation) -> WriterResult {
        let tag = bstart!("activation");
        start_event!(self, tag);
        self.handle.write_param_list(activation.methods.iter())?;
        if let Some(energy) = activation.energy {
            self.handle
                .write_value(1000045, "collision energy", energy, Unit::Electronvolt)?;
        }
        self.handle.write_param_list(activation.params())?;
        end_event!(self, tag);
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> WriterResult {
        let mut tag = bstart!("precursor");
        if let Some(spectrum_ref) = precursor.spectrum_ref.as_ref() {
            attrib!("spectrumRef", spectrum_ref, tag);
        }
        start_event!(self, tag);
        if let Some(iw) = precursor.isolation_window.as_ref() {
            self.write_isolation_window(iw)?;
        }
        self.write_selected_ions(precursor)?;
        self.write_activation(&precursor.activation)?;
        self.handle.write_param_list(precursor.params())?;
        end_event!(self, tag);
        Ok(())
    }

    fn write_precursor_list<'a, I: ExactSizeIterator<Item = &'a Precursor>>(
        &mut self,
        precursors: I,
    ) -> WriterResult {
        if precursors.len() == 0 {
            return Ok(());
        }
        let mut outer = bstart!("precursorList");
        let count = precursors.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for precursor in precursors {
            self.write_precursor(precursor)?;
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_product_list<'a, I: ExactSizeIterator<Item = &'a Product>>(
        &mut self,
        products: I,
    ) -> WriterResult {
        if products.len() == 0 {
            return Ok(());
        }
        let mut outer = bstart!("productList");
        let count = products.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for product in products {
            let tag = bstart!("product");
            start_event!(self, tag);
            if let Some(iw) = product.isolation_window.as_ref() {
                self.write_isolation_window(iw)?;
            }
            self.handle.write_param_list(product.params())?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_binary_data_array(
        &mut self,
        info: &BinaryDataInfo,
        encoding: ArrayEncoding,
        values: &[f64],
        default_array_length: usize,
        id: &str,
    ) -> WriterResult {
        let encoded = encode(values, &encoding).map_err(|e| codec_error(id, info, e))?;
        let text = encode_transport(&encoded);

        let mut outer = bstart!("binaryDataArray");
        let encoded_len = text.len().to_string();
        attrib!("encodedLength", encoded_len, outer);
        if values.len() != default_array_length {
            let array_len = values.len().to_string();
            attrib!("arrayLength", array_len, outer);
        }
        start_event!(self, outer);
        if let Some(dtype) = encoding.declared_precision().as_param() {
            self.handle.write_param(&dtype)?;
        }
        self.handle.write_param(&encoding.compression.as_param())?;
        if let Some(array_param) = info.array_type.as_param(Some(info.unit)) {
            self.handle.write_param(&array_param)?;
        }
        self.handle.write_param_list(info.params.iter())?;

        let bin = bstart!("binary");
        start_event!(self, bin);
        self.handle
            .write_event(Event::Text(BytesText::from_escaped(text)))?;
        end_event!(self, bin);
        end_event!(self, outer);
        Ok(())
    }

    fn write_binary_data_arrays(
        &mut self,
        decoded: &[(&BinaryDataInfo, DecodedArray)],
        default_array_length: usize,
        id: &str,
    ) -> WriterResult {
        let mut outer = bstart!("binaryDataArrayList");
        let count = decoded.len().to_string();
        attrib!("count", count, outer);
        start_event!(self, outer);
        for (info, values) in decoded {
            let encoding = self.options.policy.encoding_for(info);
            self.write_binary_data_array(
                info,
                encoding,
                values.as_slice(),
                default_array_length,
                id,
            )?;
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_spectrum_params(&mut self, descr: &SpectrumDescription) -> WriterResult {
        let spectrum_type = match (&descr.spectrum_type, descr.function.as_ref()) {
            (SpectrumType::Unknown, Some(function)) => function.spectrum_type.clone(),
            (SpectrumType::Unknown, None) => SpectrumType::default_for_level(descr.ms_level),
            (tp, _) => tp.clone(),
        };
        if let Some(param) = spectrum_type.as_param() {
            self.handle.write_param(&param)?;
        }
        self.handle
            .write_param(&MS.param_val(MS_LEVEL, "ms level", descr.ms_level))?;
        match descr.polarity.as_param() {
            Some(param) => self.handle.write_param(&param)?,
            None => debug!("Polarity of {} is unknown and was not written", descr.id),
        }
        if let Some(param) = descr.signal_continuity.as_param() {
            self.handle.write_param(&param)?;
        }
        let values = [
            (TOTAL_ION_CURRENT, "total ion current", descr.total_ion_current, Unit::DetectorCounts),
            (BASE_PEAK_MZ, "base peak m/z", descr.base_peak_mz, Unit::MZ),
            (BASE_PEAK_INTENSITY, "base peak intensity", descr.base_peak_intensity, Unit::DetectorCounts),
            (LOWEST_OBSERVED_MZ, "lowest observed m/z", descr.lowest_observed_mz, Unit::MZ),
            (HIGHEST_OBSERVED_MZ, "highest observed m/z", descr.highest_observed_mz, Unit::MZ),
        ];
        for (accession, name, value, unit) in values {
            if let Some(value) = value {
                self.handle.write_value(accession, name, value, unit)?;
            }
        }
        self.handle.write_param_list(descr.params())?;
        Ok(())
    }

    /**
    Write one spectrum, decoding its arrays from `source` and re-encoding them
    with the export policy.

    The `index` attribute is the spectrum's position in this output, not in the
    document it was read from.
    */
    pub fn write_spectrum<R: ByteSourceRead + ?Sized>(
        &mut self,
        spectrum: &SpectrumRecord,
        source: &mut R,
    ) -> WriterResult {
        if self.state != MzMLWriterState::SpectrumList {
            return self.transition_err(MzMLWriterState::SpectrumList);
        }
        let descr = spectrum.description();
        let mut outer = bstart!("spectrum");
        let index = self.spectrum_counter.to_string();
        attrib!("index", index, outer);
        attrib!("id", descr.id, outer);
        let decoded = decode_arrays(spectrum.arrays(), source, &descr.id)?;
        let default_array_length = decoded.first().map(|(_, v)| v.len()).unwrap_or_default();
        let length = default_array_length.to_string();
        attrib!("defaultArrayLength", length, outer);
        if let Some(dp_ref) = descr.data_processing_ref.as_ref() {
            attrib!("dataProcessingRef", dp_ref, outer);
        }
        if let Some(sf_ref) = descr.source_file_ref.as_ref() {
            attrib!("sourceFileRef", sf_ref, outer);
        }
        let offset = self.handle.write_start_at(&outer)?;
        self.spectrum_index.insert(descr.id.as_str(), offset);
        self.spectrum_counter += 1;

        self.write_spectrum_params(descr)?;
        self.write_scan_list(&descr.acquisition)?;
        self.write_precursor_list(descr.precursors.iter())?;
        self.write_product_list(descr.products.iter())?;
        self.write_binary_data_arrays(&decoded, default_array_length, &descr.id)?;

        end_event!(self, outer);
        Ok(())
    }

    pub fn write_chromatogram<R: ByteSourceRead + ?Sized>(
        &mut self,
        chromatogram: &ChromatogramRecord,
        source: &mut R,
    ) -> WriterResult {
        if self.state != MzMLWriterState::ChromatogramList {
            return self.transition_err(MzMLWriterState::ChromatogramList);
        }
        let descr = chromatogram.description();
        let mut outer = bstart!("chromatogram");
        let index = self.chromatogram_counter.to_string();
        attrib!("index", index, outer);
        attrib!("id", descr.id, outer);
        let decoded = decode_arrays(chromatogram.arrays(), source, &descr.id)?;
        let default_array_length = decoded.first().map(|(_, v)| v.len()).unwrap_or_default();
        let length = default_array_length.to_string();
        attrib!("defaultArrayLength", length, outer);
        if let Some(dp_ref) = descr.data_processing_ref.as_ref() {
            attrib!("dataProcessingRef", dp_ref, outer);
        }
        let offset = self.handle.write_start_at(&outer)?;
        self.chromatogram_index.insert(descr.id.as_str(), offset);
        self.chromatogram_counter += 1;

        if let Some(param) = descr.chromatogram_type.as_param() {
            self.handle.write_param(&param)?;
        }
        if let Some(param) = descr.polarity.as_param() {
            self.handle.write_param(&param)?;
        }
        self.handle.write_param_list(descr.params())?;
        if let Some(precursor) = descr.precursor.as_ref() {
            self.write_precursor(precursor)?;
        }
        if let Some(product) = descr.product.as_ref() {
            let tag = bstart!("product");
            start_event!(self, tag);
            if let Some(iw) = product.isolation_window.as_ref() {
                self.write_isolation_window(iw)?;
            }
            self.handle.write_param_list(product.params())?;
            end_event!(self, tag);
        }
        self.write_binary_data_arrays(&decoded, default_array_length, &descr.id)?;
        end_event!(self, outer);
        Ok(())
    }

    fn write_index(&mut self, index: &OffsetIndex) -> WriterResult {
        let mut outer = bstart!("index");
        attrib!("name", index.name, outer);
        start_event!(self, outer);
        for (id, offset) in index.iter() {
            let mut tag = bstart!("offset");
            attrib!("idRef", id, tag);
            start_event!(self, tag);
            let content = offset.to_string();
            self.handle.write_event(Event::Text(BytesText::new(&content)))?;
            end_event!(self, tag);
        }
        end_event!(self, outer);
        Ok(())
    }

    fn write_index_list(&mut self) -> WriterResult {
        let mut outer = bstart!("indexList");
        attrib!("count", "2", outer);
        let offset = self.handle.write_start_at(&outer)?;
        let spectrum_index = std::mem::take(&mut self.spectrum_index);
        let chromatogram_index = std::mem::take(&mut self.chromatogram_index);
        self.write_index(&spectrum_index)?;
        self.write_index(&chromatogram_index)?;
        self.spectrum_index = spectrum_index;
        self.chromatogram_index = chromatogram_index;
        end_event!(self, outer);

        self.handle
            .write_text_element("indexListOffset", &offset.to_string())?;

        let tag = bstart!("fileChecksum");
        start_event!(self, tag);
        let content = self.handle.digest();
        self.handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(self, tag);
        Ok(())
    }

    /// Close all open elements, write the index if enabled, and flush the stream.
    pub fn close(mut self) -> Result<W, MzMLWriterError> {
        match self.state {
            MzMLWriterState::SpectrumListClosed | MzMLWriterState::ChromatogramListClosed => {}
            _ => {
                self.transition_err(MzMLWriterState::MzMLClosed)?;
            }
        }
        self.handle.write_event(Event::End(BytesEnd::new("run")))?;
        self.handle.write_event(Event::End(BytesEnd::new("mzML")))?;
        self.state = MzMLWriterState::MzMLClosed;
        if self.options.write_index {
            self.write_index_list()?;
            self.handle
                .write_event(Event::End(BytesEnd::new("indexedmzML")))?;
        }
        self.handle.handle.get_mut().write_all(b"\n")?;
        self.state = MzMLWriterState::End;
        Ok(self.handle.into_inner()?)
    }
}

/**
Writes a [`RawDataFile`] back out as mzML, polling for cancellation before each record.

```no_run
use mzstream::io::mzml::{ExportOptions, MzMLExporter, MzMLImporter};

let raw = MzMLImporter::default().import_path("in.mzML")?.complete().ok_or("import was cancelled")?;
let outcome = MzMLExporter::new(ExportOptions::default()).export_path(&raw, "out.mzML")?;
println!("{outcome:?}");
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub struct MzMLExporter<'a> {
    options: ExportOptions,
    cancellation: Option<CancellationToken>,
    progress: Option<ProgressCallback<'a>>,
}

impl Debug for MzMLExporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MzMLExporter")
            .field("options", &self.options)
            .field("cancellation", &self.cancellation)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for MzMLExporter<'_> {
    fn default() -> Self {
        Self::new(ExportOptions::default())
    }
}

impl<'a> MzMLExporter<'a> {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            cancellation: None,
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_progress<F: FnMut(f64) + Send + 'a>(mut self, callback: F) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Export to a file. A cancelled or failed export leaves no file behind.
    pub fn export_path<P: AsRef<Path>>(
        self,
        raw: &RawDataFile,
        path: P,
    ) -> Result<ExportOutcome, MzMLWriterError> {
        let path = path.as_ref();
        debug!("Exporting to {}", path.display());
        let file = fs::File::create(path)?;
        let result = self.export_to(raw, file);
        if !matches!(result, Ok(ExportOutcome::Written { .. })) {
            debug!("Removing incomplete output {}", path.display());
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove incomplete output {}: {e}", path.display());
            }
        }
        result
    }

    /// Export to any writer. On cancellation the writer is dropped with a partial document in it.
    pub fn export_to<W: Write>(
        mut self,
        raw: &RawDataFile,
        file: W,
    ) -> Result<ExportOutcome, MzMLWriterError> {
        let mut view = raw.view()?;
        let total = (raw.spectra.len() + raw.chromatograms.len()) as u64;
        let mut progress = ProgressTracker::new(0.1, self.progress.take());
        let mut writer = MzMLWriter::new(file, self.options.clone());
        writer.write_header(&raw.metadata)?;

        let mut done = 0u64;
        writer.start_spectrum_list(raw.spectra.len())?;
        for spectrum in raw.iter_spectra() {
            if self.is_cancelled() {
                debug!("Export cancelled before {}", spectrum.id());
                return Ok(ExportOutcome::Cancelled);
            }
            writer.write_spectrum(spectrum, &mut view)?;
            done += 1;
            progress.update(done, total);
        }
        writer.close_spectrum_list()?;

        if !raw.chromatograms.is_empty() {
            writer.start_chromatogram_list(raw.chromatograms.len())?;
            for chromatogram in raw.iter_chromatograms() {
                if self.is_cancelled() {
                    debug!("Export cancelled before {}", chromatogram.id());
                    return Ok(ExportOutcome::Cancelled);
                }
                writer.write_chromatogram(chromatogram, &mut view)?;
                done += 1;
                progress.update(done, total);
            }
            writer.close_chromatogram_list()?;
        }
        let mut file = writer.close()?;
        file.flush()?;
        progress.finish();
        Ok(ExportOutcome::Written {
            spectra: raw.spectra.len(),
            chromatograms: raw.chromatograms.len(),
        })
    }
}
