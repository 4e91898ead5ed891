use super::{
    DataProcessing, FileDescription, InstrumentConfiguration, MassSpectrometryRun, Software,
};

/// Access to the file-level sections of an mzML document.
pub trait MSDataFileMetadata {
    fn data_processings(&self) -> &[DataProcessing];
    fn instrument_configurations(&self) -> &[InstrumentConfiguration];
    fn file_description(&self) -> &FileDescription;
    fn softwares(&self) -> &[Software];
    fn run_description(&self) -> &MassSpectrometryRun;
}
