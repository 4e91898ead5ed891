use std::io;
use std::mem;
use std::path::Path;

use log::{debug, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::io::source::{ByteSource, ByteSourceRead, SourceMode};
use crate::io::tag_tracker::TagTracker;
use crate::io::task::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::params::Param;
use crate::spectrum::bindata::BinaryDataInfo;
use crate::spectrum::ms_function::MsFunctionArena;
use crate::spectrum::raw_file::{Diagnostic, RawDataFile};

use super::reading_shared::{
    parse_param, required_attribute, ElementError, ElementResult, FileMetadataBuilder,
    MzMLParserError, MzMLParserState, ParamGroupRegistry,
};
use super::record_builder::{ChromatogramBuilder, Finding, SpectrumBuilder};

const BINARY_CLOSE: &[u8] = b"</binary>";

/// How an import session reads its document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    /// Fraction of the document between progress reports
    pub progress_step: f64,
    /// Seek over `<binary>` text using `encodedLength` instead of scanning it
    pub skip_binary_payloads: bool,
    pub source_mode: SourceMode,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            progress_step: 0.10,
            skip_binary_payloads: true,
            source_mode: SourceMode::Auto,
        }
    }
}

impl ImportOptions {
    pub fn with_progress_step(mut self, step: f64) -> Self {
        self.progress_step = step;
        self
    }

    pub fn with_skip_binary_payloads(mut self, skip: bool) -> Self {
        self.skip_binary_payloads = skip;
        self
    }

    pub fn with_source_mode(mut self, mode: SourceMode) -> Self {
        self.source_mode = mode;
        self
    }
}

/// How an import ended. Cancellation is not an error and yields no partial result.
#[derive(Debug)]
pub enum ImportOutcome {
    Complete(RawDataFile),
    Cancelled,
}

impl ImportOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn complete(self) -> Option<RawDataFile> {
        match self {
            Self::Complete(raw) => Some(raw),
            Self::Cancelled => None,
        }
    }
}

/**
Reads an mzML document in one streaming pass, producing a [`RawDataFile`] whose records
locate their binary arrays without decoding them.

```no_run
use mzstream::io::mzml::{ImportOptions, MzMLImporter};

let outcome = MzMLImporter::new(ImportOptions::default())
    .with_progress(|fraction| println!("{:.0}%", fraction * 100.0))
    .import_path("sample.mzML")?;
if let Some(raw) = outcome.complete() {
    let mut view = raw.view()?;
    for spectrum in raw.iter_spectra() {
        let mzs = spectrum.mz_values(&mut view)?;
        println!("{} {}", spectrum.id(), mzs.len());
    }
}
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub struct MzMLImporter<'a> {
    options: ImportOptions,
    cancellation: Option<CancellationToken>,
    progress: Option<ProgressCallback<'a>>,
}

impl std::fmt::Debug for MzMLImporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MzMLImporter")
            .field("options", &self.options)
            .field("cancellation", &self.cancellation)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for MzMLImporter<'_> {
    fn default() -> Self {
        Self::new(ImportOptions::default())
    }
}

impl<'a> MzMLImporter<'a> {
    pub fn new(options: ImportOptions) -> Self {
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

    pub fn import_path<P: AsRef<Path>>(self, path: P) -> Result<ImportOutcome, MzMLParserError> {
        let path = path.as_ref();
        debug!("Importing {}", path.display());
        let source = ByteSource::open_with(path, self.options.source_mode)?;
        self.import_source(source)
    }

    pub fn import_source(self, source: ByteSource) -> Result<ImportOutcome, MzMLParserError> {
        let view = source.view()?;
        self.import_from(source, view)
    }

    /// Import by walking `reader`, which must read the same bytes as `source`.
    ///
    /// The returned container keeps `source` for later decoding.
    pub fn import_from<R: ByteSourceRead>(
        self,
        source: ByteSource,
        reader: R,
    ) -> Result<ImportOutcome, MzMLParserError> {
        ImportSession::new(self, source, reader)?.run()
    }
}

/// What the parser is currently inside of
#[derive(Debug, Default)]
enum Context {
    #[default]
    Document,
    InSpectrum(Box<SpectrumBuilder>),
    InChromatogram(Box<ChromatogramBuilder>),
}

struct ImportSession<'a, R: ByteSourceRead> {
    reader: Reader<R>,
    tracker: TagTracker,
    context: Context,
    header: FileMetadataBuilder,
    param_groups: ParamGroupRegistry,
    functions: MsFunctionArena,
    output: RawDataFile,
    progress: ProgressTracker<'a>,
    cancellation: Option<CancellationToken>,
    skip_binary_payloads: bool,
    total_length: u64,
}

impl<'a, R: ByteSourceRead> ImportSession<'a, R> {
    fn new(importer: MzMLImporter<'a>, source: ByteSource, mut reader: R) -> io::Result<Self> {
        reader.seek_to(source.bom_length())?;
        let total_length = reader.total_length();
        let mut xml = Reader::from_reader(reader);
        xml.trim_text(true);
        xml.check_end_names(false);
        Ok(Self {
            reader: xml,
            tracker: TagTracker::new(),
            context: Context::Document,
            header: FileMetadataBuilder::default(),
            param_groups: ParamGroupRegistry::default(),
            functions: MsFunctionArena::new(),
            output: RawDataFile::new(source),
            progress: ProgressTracker::new(importer.options.progress_step, importer.progress),
            cancellation: importer.cancellation,
            skip_binary_payloads: importer.options.skip_binary_payloads,
            total_length,
        })
    }

    fn position(&self) -> u64 {
        self.reader.get_ref().position()
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    fn line_at(&mut self, offset: u64) -> Result<usize, MzMLParserError> {
        Ok(self.reader.get_mut().line_at(offset)?)
    }

    fn locate(&mut self, error: ElementError, offset: u64) -> MzMLParserError {
        let state = MzMLParserState::from_tracker(&self.tracker);
        match self.line_at(offset) {
            Ok(line) => error.at_line(line, state),
            Err(e) => e,
        }
    }

    fn run(mut self) -> Result<ImportOutcome, MzMLParserError> {
        let mut buffer = Vec::new();
        loop {
            if self.is_cancelled() {
                debug!("Import cancelled at byte {}", self.position());
                return Ok(ImportOutcome::Cancelled);
            }
            match self.reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref e)) => {
                    let end = self.position();
                    let offset = end.saturating_sub(e.len() as u64 + 2);
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    trace!("Starting mzML element: {tag}");
                    if let Err(err) = self.start_element(&tag, e, offset, end, false) {
                        return Err(self.locate(err, offset));
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    let end = self.position();
                    let offset = end.saturating_sub(e.len() as u64 + 3);
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    trace!("Empty mzML element: {tag}");
                    if let Err(err) = self.start_element(&tag, e, offset, end, true) {
                        return Err(self.locate(err, offset));
                    }
                    self.end_element(&tag, offset, end)?;
                }
                Ok(Event::End(ref e)) => {
                    let end = self.position();
                    let offset = end.saturating_sub(e.len() as u64 + 3);
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    trace!("Ending mzML element: {tag}");
                    self.end_element(&tag, offset, end)?;
                }
                Ok(Event::Eof) => {
                    trace!("Reached EOF");
                    break;
                }
                Ok(_) => {}
                Err(source) => {
                    let state = MzMLParserState::from_tracker(&self.tracker);
                    let line = self.line_at(self.position())?;
                    return Err(MzMLParserError::XMLError {
                        state,
                        line,
                        source,
                    });
                }
            }
            self.progress.update(self.position(), self.total_length);
            buffer.clear();
        }

        if let Some(open) = self.tracker.current() {
            let open = open.to_string();
            let line = self.line_at(self.total_length)?;
            return Err(MzMLParserError::UnexpectedEof { open, line });
        }
        self.progress.finish();

        let mut output = self.output;
        output.metadata = self.header.finish();
        debug!(
            "Read {} spectra, {} chromatograms and {} MS functions with {} diagnostics",
            output.spectra.len(),
            output.chromatograms.len(),
            self.functions.len(),
            output.diagnostics.len()
        );
        Ok(ImportOutcome::Complete(output))
    }

    fn start_element(
        &mut self,
        tag: &str,
        event: &BytesStart,
        offset: u64,
        end: u64,
        is_empty: bool,
    ) -> ElementResult {
        self.tracker.enter(tag);
        match tag {
            "cvParam" | "userParam" => {
                let param = parse_param(event, tag == "cvParam")?;
                self.route_param(param);
            }
            "referenceableParamGroupRef" => {
                let id = required_attribute(event, "referenceableParamGroupRef", "ref")?;
                for param in self.param_groups.resolve(&id)? {
                    self.route_param(param);
                }
            }
            "referenceableParamGroup" => {
                let id = required_attribute(event, "referenceableParamGroup", "id")?;
                self.param_groups.begin(id);
            }
            "spectrum" => {
                let builder = SpectrumBuilder::new(event, offset)?;
                self.context = Context::InSpectrum(Box::new(builder));
            }
            "chromatogram" => {
                let builder = ChromatogramBuilder::new(event, offset)?;
                self.context = Context::InChromatogram(Box::new(builder));
            }
            "binary" => self.start_binary(end, is_empty)?,
            _ => match &mut self.context {
                Context::InSpectrum(builder) => builder.start_element(tag, event, &self.tracker)?,
                Context::InChromatogram(builder) => {
                    builder.start_element(tag, event, &self.tracker)?
                }
                Context::Document => {
                    if !self.tracker.inside("indexList") {
                        self.header.start_element(tag, event)?
                    }
                }
            },
        }
        Ok(())
    }

    fn end_element(&mut self, tag: &str, offset: u64, end: u64) -> Result<(), MzMLParserError> {
        if let Err(mismatch) = self.tracker.exit(tag) {
            let line = self.line_at(offset)?;
            return Err(MzMLParserError::TagMismatch {
                expected: mismatch.expected.unwrap_or_default(),
                found: mismatch.found,
                line,
            });
        }
        match tag {
            "referenceableParamGroup" => self.param_groups.end(),
            "binary" => self.end_binary(end),
            "spectrum" => self.finish_spectrum()?,
            "chromatogram" => self.finish_chromatogram()?,
            _ => match &mut self.context {
                Context::InSpectrum(builder) => builder.end_element(tag),
                Context::InChromatogram(builder) => builder.end_element(tag),
                Context::Document => {}
            },
        }
        Ok(())
    }

    fn route_param(&mut self, param: Param) {
        let tracker = &self.tracker;
        match &mut self.context {
            Context::InSpectrum(builder) => builder.add_param(param, tracker),
            Context::InChromatogram(builder) => builder.add_param(param, tracker),
            Context::Document => {
                if tracker.inside("referenceableParamGroup") {
                    self.param_groups.add_param(param);
                } else if let Some(param) = self.header.add_param(param, tracker) {
                    trace!("Ignoring {param} in {:?}", tracker.current());
                }
            }
        }
    }

    fn current_array(&mut self) -> Option<&mut BinaryDataInfo> {
        match &mut self.context {
            Context::InSpectrum(builder) => builder.arrays.current_mut(),
            Context::InChromatogram(builder) => builder.arrays.current_mut(),
            Context::Document => None,
        }
    }

    /// Record where the payload starts and, when allowed, jump over it.
    fn start_binary(&mut self, position: u64, is_empty: bool) -> io::Result<()> {
        let encoded_length = match self.current_array() {
            Some(info) => {
                info.position = position;
                if is_empty {
                    info.encoded_length = 0;
                }
                info.encoded_length as u64
            }
            None => return Ok(()),
        };
        if is_empty || !self.skip_binary_payloads || encoded_length == 0 {
            return Ok(());
        }

        let target = position + encoded_length;
        let source = self.reader.get_mut();
        if target + BINARY_CLOSE.len() as u64 > source.total_length() {
            return Ok(());
        }
        source.seek_to(target)?;
        let mut probe = [0u8; 9];
        let mut filled = 0;
        while filled < probe.len() {
            let n = source.read_into(&mut probe[filled..], BINARY_CLOSE.len() - filled)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if &probe[..filled] == BINARY_CLOSE {
            source.seek_to(target)?;
        } else {
            debug!("encodedLength {encoded_length} at {position} does not end at </binary>, scanning instead");
            source.seek_to(position)?;
        }
        Ok(())
    }

    fn end_binary(&mut self, end: u64) {
        let close = end.saturating_sub(BINARY_CLOSE.len() as u64);
        if let Some(info) = self.current_array() {
            let actual = close.saturating_sub(info.position);
            if actual != info.encoded_length as u64 {
                debug!(
                    "Payload at {} is {} bytes, not the declared {}",
                    info.position, actual, info.encoded_length
                );
                info.encoded_length = u32::try_from(actual).unwrap_or(u32::MAX);
            }
        }
    }

    fn report(
        &mut self,
        findings: Vec<Finding>,
        element_id: &str,
        offset: u64,
    ) -> Result<(), MzMLParserError> {
        if findings.is_empty() {
            return Ok(());
        }
        let line = self.line_at(offset)?;
        for (kind, message) in findings {
            let diagnostic = Diagnostic {
                kind,
                element_id: element_id.to_string(),
                line,
                message,
            };
            warn!("{diagnostic}");
            self.output.diagnostics.push(diagnostic);
        }
        Ok(())
    }

    fn finish_spectrum(&mut self) -> Result<(), MzMLParserError> {
        let builder = match mem::take(&mut self.context) {
            Context::InSpectrum(builder) => builder,
            other => {
                self.context = other;
                return Ok(());
            }
        };
        let id = builder.id().to_string();
        let offset = builder.offset;
        let mut findings = Vec::new();
        let record = builder.finish(&mut self.functions, &mut findings);
        self.report(findings, &id, offset)?;
        if let Some(record) = record {
            debug!("Read spectrum {id} at {offset}");
            if self.output.spectrum_index.insert(id.as_str(), offset).is_some() {
                warn!("Spectrum id {id} appears more than once");
            }
            self.output.spectra.push(record);
        }
        Ok(())
    }

    fn finish_chromatogram(&mut self) -> Result<(), MzMLParserError> {
        let builder = match mem::take(&mut self.context) {
            Context::InChromatogram(builder) => builder,
            other => {
                self.context = other;
                return Ok(());
            }
        };
        let id = builder.id().to_string();
        let offset = builder.offset;
        let mut findings = Vec::new();
        let record = builder.finish(&mut findings);
        self.report(findings, &id, offset)?;
        if let Some(record) = record {
            debug!("Read chromatogram {id} at {offset}");
            if self
                .output
                .chromatogram_index
                .insert(id.as_str(), offset)
                .is_some()
            {
                warn!("Chromatogram id {id} appears more than once");
            }
            self.output.chromatograms.push(record);
        }
        Ok(())
    }
}
