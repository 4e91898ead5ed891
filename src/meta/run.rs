/// Attributes of the `<run>` element and of the lists inside it.
#[derive(Debug, Default, PartialEq, Hash, Eq, Clone)]
pub struct MassSpectrometryRun {
    pub id: Option<String>,
    pub default_instrument_id: Option<String>,
    pub default_source_file_id: Option<String>,
    pub start_time: Option<String>,
    /// `defaultDataProcessingRef` of `<spectrumList>`
    pub spectrum_data_processing_ref: Option<String>,
    /// `defaultDataProcessingRef` of `<chromatogramList>`
    pub chromatogram_data_processing_ref: Option<String>,
}
