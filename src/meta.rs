//! File-level metadata carried from import through to export.
pub mod data_processing;
pub mod file_description;
pub mod instrument;
pub mod run;
pub mod software;
mod traits;

pub use crate::meta::data_processing::{DataProcessing, ProcessingMethod};
pub use crate::meta::file_description::{FileDescription, SourceFile};
pub use crate::meta::instrument::InstrumentConfiguration;
pub use crate::meta::run::MassSpectrometryRun;
pub use crate::meta::software::Software;
pub use crate::meta::traits::MSDataFileMetadata;

/// Everything outside `<run>` that a document declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_description: FileDescription,
    pub softwares: Vec<Software>,
    pub instrument_configurations: Vec<InstrumentConfiguration>,
    pub data_processings: Vec<DataProcessing>,
    pub run: MassSpectrometryRun,
}

impl MSDataFileMetadata for FileMetadata {
    fn data_processings(&self) -> &[DataProcessing] {
        &self.data_processings
    }

    fn instrument_configurations(&self) -> &[InstrumentConfiguration] {
        &self.instrument_configurations
    }

    fn file_description(&self) -> &FileDescription {
        &self.file_description
    }

    fn softwares(&self) -> &[Software] {
        &self.softwares
    }

    fn run_description(&self) -> &MassSpectrometryRun {
        &self.run
    }
}
