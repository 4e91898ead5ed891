use std::fmt::Display;
use std::io;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::io::source::ByteSource;
use crate::io::OffsetIndex;
use crate::meta::{
    DataProcessing, FileDescription, FileMetadata, InstrumentConfiguration, MSDataFileMetadata,
    MassSpectrometryRun, Software,
};

#[cfg(feature = "parallelism")]
use super::bindata::{ArrayRetrievalError, DecodedArray};
use super::record::{ChromatogramRecord, SpectrumRecord};

/// What kind of data-quality problem a [`Diagnostic`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A record lacked one of its axis arrays and was skipped
    MissingArray,
    /// An array declared a different length than its record
    ArrayLengthMismatch,
    /// An array carried no recognizable array type term
    UnknownArrayType,
    /// A record declared the same array type twice; the later one was kept as an extra
    DuplicateArray,
}

/// A non-fatal problem found while importing, kept alongside the records that did load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The native id of the element the problem was found in
    pub element_id: String,
    pub line: usize,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} in {} (line {}): {}",
            self.kind, self.element_id, self.line, self.message
        )
    }
}

/// Look up the first record carrying `id` through its offset index.
///
/// A repeated id gets no index entry of its own but its record is still kept, so
/// a record sits at or after its index position. Records added without an index
/// entry are only found by a scan.
fn find_by_id<'a, T>(
    index: &OffsetIndex,
    records: &'a [T],
    id: &str,
    key: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    match index.index_of(id) {
        Some(i) => match records.get(i) {
            Some(record) if key(record) == id => Some(record),
            _ => records.get(i..)?.iter().find(|r| key(r) == id),
        },
        None if index.len() < records.len() => records.iter().find(|r| key(r) == id),
        None => None,
    }
}

/// The result of importing one mzML document.
///
/// Records keep only the location of their arrays. Decoding needs a view of the
/// [`ByteSource`] this container holds, taken with [`RawDataFile::view`].
#[derive(Debug)]
pub struct RawDataFile {
    pub source: ByteSource,
    pub metadata: FileMetadata,
    pub spectra: Vec<SpectrumRecord>,
    pub chromatograms: Vec<ChromatogramRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub spectrum_index: OffsetIndex,
    pub chromatogram_index: OffsetIndex,
}

impl RawDataFile {
    pub fn new(source: ByteSource) -> Self {
        Self {
            source,
            metadata: FileMetadata::default(),
            spectra: Vec::new(),
            chromatograms: Vec::new(),
            diagnostics: Vec::new(),
            spectrum_index: OffsetIndex::new("spectrum"),
            chromatogram_index: OffsetIndex::new("chromatogram"),
        }
    }

    /// An independent read cursor over the source document
    pub fn view(&self) -> io::Result<crate::io::source::SourceView> {
        self.source.view()
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn get_spectrum_by_id(&self, id: &str) -> Option<&SpectrumRecord> {
        find_by_id(&self.spectrum_index, &self.spectra, id, SpectrumRecord::id)
    }

    pub fn get_spectrum_by_index(&self, index: usize) -> Option<&SpectrumRecord> {
        self.spectra.iter().find(|s| s.index() == index)
    }

    pub fn get_spectrum_by_scan_number(&self, scan_number: u32) -> Option<&SpectrumRecord> {
        self.spectra.iter().find(|s| s.scan_number() == scan_number)
    }

    pub fn get_chromatogram_by_id(&self, id: &str) -> Option<&ChromatogramRecord> {
        find_by_id(
            &self.chromatogram_index,
            &self.chromatograms,
            id,
            ChromatogramRecord::id,
        )
    }

    pub fn iter_spectra(&self) -> std::slice::Iter<'_, SpectrumRecord> {
        self.spectra.iter()
    }

    pub fn iter_chromatograms(&self) -> std::slice::Iter<'_, ChromatogramRecord> {
        self.chromatograms.iter()
    }

    /// Decode the m/z and intensity arrays of every spectrum, one source view per task.
    #[cfg(feature = "parallelism")]
    pub fn decode_all_spectra(
        &self,
    ) -> Vec<Result<(DecodedArray, DecodedArray), ArrayRetrievalError>> {
        self.spectra
            .par_iter()
            .map_init(
                || self.source.view(),
                |view, record| -> Result<(DecodedArray, DecodedArray), ArrayRetrievalError> {
                    let view = view.as_mut().map_err(|e| ArrayRetrievalError::ReadError {
                        position: record.mz.position,
                        length: record.mz.encoded_length as u64,
                        message: e.to_string(),
                    })?;
                    let mzs = record.mz_values(view)?;
                    let intensities = record.intensity_values(view)?;
                    Ok((mzs, intensities))
                },
            )
            .collect()
    }
}

impl MSDataFileMetadata for RawDataFile {
    fn data_processings(&self) -> &[DataProcessing] {
        self.metadata.data_processings()
    }

    fn instrument_configurations(&self) -> &[InstrumentConfiguration] {
        self.metadata.instrument_configurations()
    }

    fn file_description(&self) -> &FileDescription {
        self.metadata.file_description()
    }

    fn softwares(&self) -> &[Software] {
        self.metadata.softwares()
    }

    fn run_description(&self) -> &MassSpectrometryRun {
        self.metadata.run_description()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::io::mzml::{ImportOptions, MzMLImporter};
    use crate::spectrum::bindata::{
        encode, encode_transport, ArrayEncoding, BinaryDataArrayType, CompressionChain,
    };

    fn binary_array(accession: &str, name: &str, values: &[f64], encoding: ArrayEncoding) -> String {
        let text = encode_transport(&encode(values, &encoding).unwrap());
        let dtype = encoding.declared_precision().as_param().unwrap();
        let compression = encoding.compression.as_param();
        format!(
            r#"<binaryDataArray encodedLength="{}">
<cvParam cvRef="MS" accession="{}" name="{}" value=""/>
<cvParam cvRef="MS" accession="{}" name="{}" value=""/>
<cvParam cvRef="MS" accession="{accession}" name="{name}" value=""/>
<binary>{text}</binary>
</binaryDataArray>"#,
            text.len(),
            dtype.curie().unwrap(),
            dtype.name,
            compression.curie().unwrap(),
            compression.name,
        )
    }

    fn peaks(i: usize) -> (Vec<f64>, Vec<f64>) {
        let mzs = (0..i + 2).map(|j| 100.0 + (i * 10 + j) as f64 * 0.5).collect();
        let intensities = (0..i + 2).map(|j| ((j * 37 + i) % 11) as f64 * 100.0).collect();
        (mzs, intensities)
    }

    fn document(ids: &[&str], chromatogram_ids: &[&str]) -> Vec<u8> {
        let zlib = ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB);
        let mut doc = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
<run id="r1">
"#,
        );
        doc.push_str(&format!("<spectrumList count=\"{}\">\n", ids.len()));
        for (i, id) in ids.iter().enumerate() {
            let (mzs, intensities) = peaks(i);
            doc.push_str(&format!(
                r#"<spectrum index="{i}" id="{id}" defaultArrayLength="{}">
<cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="1"/>
<binaryDataArrayList count="2">
{}
{}
</binaryDataArrayList>
</spectrum>
"#,
                mzs.len(),
                binary_array("MS:1000514", "m/z array", &mzs, zlib),
                binary_array("MS:1000515", "intensity array", &intensities, zlib),
            ));
        }
        doc.push_str("</spectrumList>\n");
        if chromatogram_ids.is_empty() {
            doc.push_str("</run>\n</mzML>\n");
            return doc.into_bytes();
        }
        doc.push_str(&format!(
            "<chromatogramList count=\"{}\">\n",
            chromatogram_ids.len()
        ));
        for (i, id) in chromatogram_ids.iter().enumerate() {
            doc.push_str(&format!(
                r#"<chromatogram index="{i}" id="{id}" defaultArrayLength="2">
<binaryDataArrayList count="2">
{}
{}
</binaryDataArrayList>
</chromatogram>
"#,
                binary_array("MS:1000595", "time array", &[0.5, 1.0 + i as f64], zlib),
                binary_array("MS:1000515", "intensity array", &[5.0, 7.0], zlib),
            ));
        }
        doc.push_str("</chromatogramList>\n</run>\n</mzML>\n");
        doc.into_bytes()
    }

    fn import(doc: Vec<u8>) -> RawDataFile {
        MzMLImporter::new(ImportOptions::default())
            .import_source(ByteSource::from_bytes(doc))
            .unwrap()
            .complete()
            .unwrap()
    }

    #[test]
    fn test_lookup_by_id() {
        let raw = import(document(
            &["scan=1", "scan=2", "scan=3", "scan=4"],
            &["TIC", "BPC"],
        ));
        assert_eq!(raw.len(), 4);
        for (i, id) in ["scan=1", "scan=2", "scan=3", "scan=4"].iter().enumerate() {
            let spectrum = raw.get_spectrum_by_id(id).unwrap();
            assert_eq!(spectrum.id(), *id);
            assert_eq!(spectrum.index(), i);
        }
        assert!(raw.get_spectrum_by_id("scan=5").is_none());
        assert_eq!(raw.get_chromatogram_by_id("BPC").unwrap().index(), 1);
        assert!(raw.get_chromatogram_by_id("SIC").is_none());
    }

    #[test]
    fn test_lookup_by_id_with_repeated_ids() {
        let raw = import(document(
            &["scan=1", "scan=2", "scan=2", "scan=3", "scan=4"],
            &["TIC", "TIC", "BPC"],
        ));
        assert_eq!(raw.len(), 5);
        assert_eq!(raw.spectrum_index.len(), 4);
        assert_eq!(raw.get_spectrum_by_id("scan=1").unwrap().index(), 0);
        assert_eq!(raw.get_spectrum_by_id("scan=2").unwrap().index(), 1);
        assert_eq!(raw.get_spectrum_by_id("scan=3").unwrap().index(), 3);
        assert_eq!(raw.get_spectrum_by_id("scan=4").unwrap().index(), 4);
        assert_eq!(raw.get_chromatogram_by_id("TIC").unwrap().index(), 0);
        assert_eq!(raw.get_chromatogram_by_id("BPC").unwrap().index(), 2);
    }

    #[test]
    fn test_lookup_by_id_without_index_entries() {
        let mut raw = import(document(&["scan=1", "scan=2"], &[]));
        let mut extra = raw.spectra[1].clone();
        extra.description.id = "scan=9".to_string();
        extra.description.index = 2;
        raw.spectra.push(extra);
        assert_eq!(raw.get_spectrum_by_id("scan=9").unwrap().index(), 2);
        assert_eq!(raw.get_spectrum_by_id("scan=2").unwrap().index(), 1);
    }

    #[cfg(feature = "parallelism")]
    #[test_log::test]
    fn test_decode_all_spectra_matches_sequential() -> Result<(), ArrayRetrievalError> {
        let ids: Vec<String> = (0..24).map(|i| format!("scan={}", i + 1)).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let raw = import(document(&ids, &[]));
        let decoded = raw.decode_all_spectra();
        assert_eq!(decoded.len(), raw.len());

        let mut view = raw.view().unwrap();
        for (record, result) in raw.iter_spectra().zip(decoded) {
            let (mzs, intensities) = result?;
            assert_eq!(mzs, record.mz_values(&mut view)?);
            assert_eq!(intensities, record.intensity_values(&mut view)?);
            let (expected_mzs, expected_intensities) = peaks(record.index());
            assert_eq!(mzs.values, expected_mzs);
            assert_eq!(intensities.values, expected_intensities);
        }
        Ok(())
    }

    #[cfg(feature = "parallelism")]
    #[test_log::test]
    fn test_decode_all_spectra_reports_damaged_payload() {
        let ids: Vec<String> = (0..8).map(|i| format!("scan={}", i + 1)).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut raw = import(document(&ids, &[]));
        raw.spectra[3].mz.position = raw.source.len();

        let decoded = raw.decode_all_spectra();
        assert_eq!(decoded.len(), 8);
        let mut view = raw.view().unwrap();
        for (i, (record, result)) in raw.iter_spectra().zip(decoded).enumerate() {
            if i == 3 {
                let err = result.unwrap_err();
                assert!(matches!(err, ArrayRetrievalError::ReadError { .. }), "{err:?}");
                assert_eq!(record.mz_values(&mut view).unwrap_err(), err);
            } else {
                let (mzs, _) = result.unwrap();
                assert_eq!(mzs, record.mz_values(&mut view).unwrap());
            }
        }
    }
}
