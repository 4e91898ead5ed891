use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use log::{error, info};

use mzstream::io::mzml::{ExportOptions, ImportOptions, MzMLExporter, MzMLImporter};
use mzstream::io::{ExportOutcome, SourceView};
use mzstream::meta::MSDataFileMetadata;
use mzstream::spectrum::ArrayRetrievalError;
use mzstream::{RawDataFile, SpectrumRecord};

fn summarize_spectrum(
    spectrum: &SpectrumRecord,
    view: &mut SourceView,
) -> Result<usize, ArrayRetrievalError> {
    let mzs = spectrum.mz_values(view)?;
    let intensities = spectrum.intensity_values(view)?;
    let descr = spectrum.description();
    let tic = descr
        .total_ion_current
        .unwrap_or(intensities.stats.sum);
    let base_peak = usize::try_from(intensities.stats.max_index)
        .ok()
        .and_then(|i| mzs.as_slice().get(i).map(|mz| (*mz, intensities.stats.max)));
    println!(
        "{}\t{}\tscan={}\tMS{}\tRT={}\tpoints={}\tTIC={:0.3e}\tBP={}",
        descr.index,
        descr.id,
        descr.scan_number,
        descr.ms_level,
        descr
            .start_time()
            .map(|t| format!("{t:0.4}"))
            .unwrap_or_else(|| "?".to_string()),
        mzs.len(),
        tic,
        base_peak
            .map(|(mz, int)| format!("{mz:0.4}@{int:0.3e}"))
            .unwrap_or_else(|| "-".to_string()),
    );
    Ok(mzs.len())
}

fn summarize(raw: &RawDataFile) -> Result<(), Box<dyn std::error::Error>> {
    let run = raw.run_description();
    println!("Run: {}", run.id.as_deref().unwrap_or("(unnamed)"));
    println!(
        "Spectra: {}  Chromatograms: {}",
        raw.spectra.len(),
        raw.chromatograms.len()
    );
    let mut view = raw.view()?;
    let mut points = 0usize;
    for spectrum in raw.iter_spectra() {
        match summarize_spectrum(spectrum, &mut view) {
            Ok(n) => points += n,
            Err(e) => println!("{}\t{}\tcould not be decoded: {e}", spectrum.index(), spectrum.id()),
        }
    }
    println!("Total m/z points: {points}");
    for chromatogram in raw.iter_chromatograms() {
        match chromatogram.time_values(&mut view) {
            Ok(times) => println!(
                "{}\t{}\t{}\tpoints={}",
                chromatogram.index(),
                chromatogram.id(),
                chromatogram.chromatogram_type(),
                times.len()
            ),
            Err(e) => println!(
                "{}\t{}\tcould not be decoded: {e}",
                chromatogram.index(),
                chromatogram.id()
            ),
        }
    }
    if !raw.diagnostics.is_empty() {
        println!("Diagnostics: {}", raw.diagnostics.len());
    }
    for diagnostic in raw.diagnostics.iter() {
        println!("  {diagnostic}");
    }
    Ok(())
}

fn run(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let outcome = MzMLImporter::new(ImportOptions::default())
        .with_progress(|fraction| info!("Imported {:.0}%", fraction * 100.0))
        .import_path(input)?;
    let Some(raw) = outcome.complete() else {
        return Err("import was cancelled".into());
    };
    info!("Imported {} in {:0.3?}", input.display(), start.elapsed());
    summarize(&raw)?;

    if let Some(output) = output {
        let start = Instant::now();
        let outcome = MzMLExporter::new(ExportOptions::default())
            .with_progress(|fraction| info!("Exported {:.0}%", fraction * 100.0))
            .export_path(&raw, output)?;
        if let ExportOutcome::Written {
            spectra,
            chromatograms,
        } = outcome
        {
            println!(
                "Wrote {spectra} spectra and {chromatograms} chromatograms to {} in {:0.3?}",
                output.display(),
                start.elapsed()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let Some(input) = args.get(1) else {
        let program = args.first().map(String::as_str).unwrap_or("mzstream");
        eprintln!("Usage: {program} <input.mzML> [output.mzML]");
        return ExitCode::FAILURE;
    };
    let output = args.get(2).map(Path::new);
    match run(Path::new(input), output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
