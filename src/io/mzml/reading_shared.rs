use std::collections::HashMap;
use std::io;
use std::str::FromStr;

use quick_xml::events::BytesStart;
use quick_xml::Error as XMLError;

use thiserror::Error;

use crate::io::tag_tracker::TagTracker;
use crate::meta::{
    DataProcessing, FileMetadata, InstrumentConfiguration, ProcessingMethod, Software,
    SourceFile,
};
use crate::params::{curie_to_num, ControlledVocabulary, Param, ParamDescribed, ParamList, Unit};

/**
The section of the document the importer was in. This is only needed by the
module consumer to determine where in the document an error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum MzMLParserState {
    Start = 0,

    // Top-level metadata
    CVList,
    FileDescription,
    ReferenceParamGroupList,
    SoftwareList,
    InstrumentConfigurationList,
    DataProcessingList,

    Run,

    // Spectrum and Chromatogram List Elements
    SpectrumList,
    Spectrum,
    ScanList,
    PrecursorList,
    ProductList,
    BinaryDataArrayList,
    BinaryDataArray,
    Binary,

    ChromatogramList,
    Chromatogram,

    IndexList,
}

impl MzMLParserState {
    /// The most specific section named by the open elements
    pub(crate) fn from_tracker(tracker: &TagTracker) -> Self {
        let names: Vec<&str> = tracker.iter().collect();
        for name in names.into_iter().rev() {
            let state = match name {
                "binary" => Self::Binary,
                "binaryDataArray" => Self::BinaryDataArray,
                "binaryDataArrayList" => Self::BinaryDataArrayList,
                "precursorList" => Self::PrecursorList,
                "productList" => Self::ProductList,
                "scanList" => Self::ScanList,
                "spectrum" => Self::Spectrum,
                "chromatogram" => Self::Chromatogram,
                "spectrumList" => Self::SpectrumList,
                "chromatogramList" => Self::ChromatogramList,
                "run" => Self::Run,
                "dataProcessingList" => Self::DataProcessingList,
                "instrumentConfigurationList" => Self::InstrumentConfigurationList,
                "softwareList" => Self::SoftwareList,
                "referenceableParamGroupList" => Self::ReferenceParamGroupList,
                "fileDescription" => Self::FileDescription,
                "cvList" => Self::CVList,
                "indexList" => Self::IndexList,
                _ => continue,
            };
            return state;
        }
        Self::Start
    }
}

/**
All the ways that mzML parsing can go wrong. Each of these aborts the whole import.
*/
#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("An XML error {source} was encountered in {state:?} at line {line}")]
    XMLError {
        state: MzMLParserState,
        line: usize,
        #[source]
        source: XMLError,
    },
    #[error("<{tag}> at line {line} is missing required attribute `{attribute}`")]
    MissingAttribute {
        tag: String,
        attribute: String,
        line: usize,
    },
    #[error("<{tag}> at line {line} has malformed attribute {attribute}=\"{value}\"")]
    MalformedAttribute {
        tag: String,
        attribute: String,
        value: String,
        line: usize,
    },
    #[error("Expected </{expected}> but found </{found}> at line {line}")]
    TagMismatch {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("Reference to undefined referenceableParamGroup {id} at line {line}")]
    UnknownParamGroup { id: String, line: usize },
    #[error("The document ended inside <{open}> at line {line}")]
    UnexpectedEof { open: String, line: usize },
    #[error("An IO error {0} was encountered")]
    IOError(#[from] io::Error),
}

impl MzMLParserError {
    /// The 1-based source line the error was found on, if it was found in the document
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::XMLError { line, .. }
            | Self::MissingAttribute { line, .. }
            | Self::MalformedAttribute { line, .. }
            | Self::TagMismatch { line, .. }
            | Self::UnknownParamGroup { line, .. }
            | Self::UnexpectedEof { line, .. } => Some(*line),
            Self::IOError(_) => None,
        }
    }
}

impl From<MzMLParserError> for io::Error {
    fn from(value: MzMLParserError) -> Self {
        match value {
            MzMLParserError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// An error raised while handling one element, before the importer knows its line number
#[derive(Debug, Error)]
pub enum ElementError {
    #[error("<{tag}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        tag: &'static str,
        attribute: &'static str,
    },
    #[error("<{tag}> has malformed attribute {attribute}=\"{value}\"")]
    MalformedAttribute {
        tag: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("Reference to undefined referenceableParamGroup {0}")]
    UnknownParamGroup(String),
    #[error(transparent)]
    XMLError(#[from] XMLError),
    #[error(transparent)]
    IOError(#[from] io::Error),
}

impl From<quick_xml::events::attributes::AttrError> for ElementError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Self::XMLError(value.into())
    }
}

pub type ElementResult<T = ()> = Result<T, ElementError>;

impl ElementError {
    /// Attach the source location, producing the error the importer reports
    pub fn at_line(self, line: usize, state: MzMLParserState) -> MzMLParserError {
        match self {
            Self::MissingAttribute { tag, attribute } => MzMLParserError::MissingAttribute {
                tag: tag.to_string(),
                attribute: attribute.to_string(),
                line,
            },
            Self::MalformedAttribute {
                tag,
                attribute,
                value,
            } => MzMLParserError::MalformedAttribute {
                tag: tag.to_string(),
                attribute: attribute.to_string(),
                value,
                line,
            },
            Self::UnknownParamGroup(id) => MzMLParserError::UnknownParamGroup { id, line },
            Self::XMLError(source) => MzMLParserError::XMLError {
                state,
                line,
                source,
            },
            Self::IOError(e) => MzMLParserError::IOError(e),
        }
    }
}

/// Find and unescape the attribute `name` of `event`
pub fn optional_attribute(event: &BytesStart, name: &str) -> ElementResult<Option<String>> {
    for attr in event.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Fetch an attribute the element cannot do without
pub fn required_attribute(
    event: &BytesStart,
    tag: &'static str,
    name: &'static str,
) -> ElementResult<String> {
    optional_attribute(event, name)?.ok_or(ElementError::MissingAttribute {
        tag,
        attribute: name,
    })
}

/// Fetch and parse an attribute the element cannot do without
pub fn required_parsed<T: FromStr>(
    event: &BytesStart,
    tag: &'static str,
    name: &'static str,
) -> ElementResult<T> {
    let value = required_attribute(event, tag, name)?;
    value
        .trim()
        .parse()
        .map_err(|_| ElementError::MalformedAttribute {
            tag,
            attribute: name,
            value,
        })
}

pub fn optional_parsed<T: FromStr>(
    event: &BytesStart,
    tag: &'static str,
    name: &'static str,
) -> ElementResult<Option<T>> {
    match optional_attribute(event, name)? {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ElementError::MalformedAttribute {
                tag,
                attribute: name,
                value,
            }),
        None => Ok(None),
    }
}

/**
Parse a `<cvParam>` or `<userParam>` element.

A `<cvParam>` must carry an `accession`. Units are resolved from `unitAccession`,
falling back to `unitName`.
*/
pub fn parse_param(event: &BytesStart, is_controlled: bool) -> ElementResult<Param> {
    let tag = if is_controlled { "cvParam" } else { "userParam" };
    let mut param = Param::new();
    let mut unit_name = None;
    let mut unit_accession = None;
    let mut has_accession = false;
    for attr in event.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"name" => param.name = attr.unescape_value()?.into_owned(),
            b"value" => param.value = attr.unescape_value()?.into_owned(),
            b"cvRef" => {
                let cv_id = attr.unescape_value()?;
                param.controlled_vocabulary = cv_id
                    .parse::<ControlledVocabulary>()
                    .ok()
                    .and_then(|cv| cv.as_option());
            }
            b"accession" => {
                let v = attr.unescape_value()?;
                let (cv, acc) = curie_to_num(&v);
                if acc.is_none() {
                    return Err(ElementError::MalformedAttribute {
                        tag,
                        attribute: "accession",
                        value: v.into_owned(),
                    });
                }
                has_accession = true;
                param.accession = acc;
                if param.controlled_vocabulary.is_none() {
                    param.controlled_vocabulary = cv;
                }
            }
            b"unitName" => unit_name = Some(Unit::from_name(&attr.unescape_value()?)),
            b"unitAccession" => {
                unit_accession = Some(Unit::from_accession(&attr.unescape_value()?))
            }
            _ => {}
        }
    }
    if is_controlled && !has_accession {
        return Err(ElementError::MissingAttribute {
            tag,
            attribute: "accession",
        });
    }
    param.unit = match (unit_accession, unit_name) {
        (Some(unit), _) if unit != Unit::Unknown => unit,
        (_, Some(unit)) => unit,
        _ => Unit::Unknown,
    };
    Ok(param)
}

/// The `<referenceableParamGroup>` definitions of a document, by id.
#[derive(Debug, Default, Clone)]
pub struct ParamGroupRegistry {
    groups: HashMap<String, ParamList>,
    current: Option<String>,
}

impl ParamGroupRegistry {
    pub fn begin(&mut self, id: String) {
        self.groups.entry(id.clone()).or_default();
        self.current = Some(id);
    }

    /// Add a param to the group being defined, if any
    pub fn add_param(&mut self, param: Param) {
        if let Some(group) = self
            .current
            .as_ref()
            .and_then(|id| self.groups.get_mut(id))
        {
            group.push(param);
        }
    }

    pub fn end(&mut self) {
        self.current = None;
    }

    /// The params of group `id`, copied so the caller may fold them into its own element.
    pub fn resolve(&self, id: &str) -> ElementResult<ParamList> {
        self.groups
            .get(id)
            .cloned()
            .ok_or_else(|| ElementError::UnknownParamGroup(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/**Builds up the metadata sections that precede the `<spectrumList>` of an mzML file.*/
#[derive(Debug, Default)]
pub struct FileMetadataBuilder {
    pub metadata: FileMetadata,
}

impl FileMetadataBuilder {
    pub fn start_element(&mut self, tag: &str, event: &BytesStart) -> ElementResult {
        match tag {
            "sourceFile" => {
                let source_file = SourceFile {
                    id: required_attribute(event, "sourceFile", "id")?,
                    name: optional_attribute(event, "name")?.unwrap_or_default(),
                    location: optional_attribute(event, "location")?.unwrap_or_default(),
                    params: ParamList::new(),
                };
                self.metadata
                    .file_description
                    .source_files
                    .push(source_file);
            }
            "software" => {
                let software = Software::new(
                    required_attribute(event, "software", "id")?,
                    optional_attribute(event, "version")?.unwrap_or_default(),
                );
                self.metadata.softwares.push(software);
            }
            "instrumentConfiguration" => {
                let ic =
                    InstrumentConfiguration::new(required_attribute(event, "instrumentConfiguration", "id")?);
                self.metadata.instrument_configurations.push(ic);
            }
            "softwareRef" => {
                let reference = required_attribute(event, "softwareRef", "ref")?;
                if let Some(ic) = self.metadata.instrument_configurations.last_mut() {
                    ic.software_reference = Some(reference);
                }
            }
            "dataProcessing" => {
                let dp = DataProcessing::new(required_attribute(event, "dataProcessing", "id")?);
                self.metadata.data_processings.push(dp);
            }
            "processingMethod" => {
                let method = ProcessingMethod {
                    order: optional_parsed(event, "processingMethod", "order")?.unwrap_or_default(),
                    software_reference: optional_attribute(event, "softwareRef")?
                        .unwrap_or_default(),
                    params: ParamList::new(),
                };
                if let Some(dp) = self.metadata.data_processings.last_mut() {
                    dp.push(method);
                }
            }
            "run" => {
                let run = &mut self.metadata.run;
                run.id = Some(required_attribute(event, "run", "id")?);
                run.default_instrument_id =
                    optional_attribute(event, "defaultInstrumentConfigurationRef")?;
                run.default_source_file_id = optional_attribute(event, "defaultSourceFileRef")?;
                run.start_time = optional_attribute(event, "startTimeStamp")?;
            }
            "spectrumList" => {
                self.metadata.run.spectrum_data_processing_ref =
                    optional_attribute(event, "defaultDataProcessingRef")?;
            }
            "chromatogramList" => {
                self.metadata.run.chromatogram_data_processing_ref =
                    optional_attribute(event, "defaultDataProcessingRef")?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Route a param to the metadata section the tracker says it belongs to.
    ///
    /// Returns the param back if no section claims it.
    pub fn add_param(&mut self, param: Param, tracker: &TagTracker) -> Option<Param> {
        let meta = &mut self.metadata;
        if tracker.inside("sourceFile") {
            if let Some(sf) = meta.file_description.source_files.last_mut() {
                sf.add_param(param);
                return None;
            }
        } else if tracker.inside("fileContent") {
            meta.file_description.add_param(param);
            return None;
        } else if tracker.inside("instrumentConfiguration") {
            if let Some(ic) = meta.instrument_configurations.last_mut() {
                ic.add_param(param);
                return None;
            }
        } else if tracker.inside("software") {
            if let Some(sw) = meta.softwares.last_mut() {
                sw.add_param(param);
                return None;
            }
        } else if tracker.inside("processingMethod") {
            if let Some(method) = meta
                .data_processings
                .last_mut()
                .and_then(|dp| dp.methods.last_mut())
            {
                method.add_param(param);
                return None;
            }
        }
        Some(param)
    }

    pub fn finish(self) -> FileMetadata {
        self.metadata
    }
}
