//! `mzstream` reads mzML documents into lightweight records that point back into
//! the source file, decodes their binary arrays on demand, and writes them out
//! again as (indexed) mzML.
//!
//! ```no_run
//! use mzstream::io::{ByteSource, MzMLImporter};
//!
//! let raw = MzMLImporter::default()
//!     .import_source(ByteSource::open("small.mzML")?)?
//!     .complete()
//!     .ok_or("import was cancelled")?;
//! let mut view = raw.view()?;
//! for spectrum in raw.iter_spectra() {
//!     let mzs = spectrum.mz_values(&mut view)?;
//!     println!("{} has {} points", spectrum.id(), mzs.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod io;
pub mod meta;
pub mod params;
pub mod spectrum;

pub use crate::io::mzml::{MzMLExporter, MzMLImporter};
pub use crate::io::{ByteSource, CancellationToken};
pub use crate::spectrum::{ChromatogramRecord, RawDataFile, SpectrumRecord};
