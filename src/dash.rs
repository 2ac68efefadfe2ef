use log::{info, warn};

use nh_surveillance::clean_records;
use snafu::{prelude::*, Snafu};

use std::path::Path;

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::dash::charts::GenerationSummary;

pub mod charts;
pub mod dashboard;
pub mod figures;
pub mod io_csv;
pub mod store;

#[derive(Debug, Snafu)]
pub enum DashError {
    #[snafu(display("Error reading the input directory {path}"))]
    ReadingDataDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The input directory {path} holds no data files"))]
    EmptyDataDir { path: String },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a record from {path}"))]
    CsvLineParse { source: csv::Error, path: String },
    #[snafu(display("File {path} is missing the required column {column:?}"))]
    MissingColumn { path: String, column: String },
    #[snafu(display("File {path} does not share the column schema of {first_path}"))]
    SchemaMismatch { path: String, first_path: String },
    #[snafu(display(
        "Line {line} of {path} holds the non-numeric count {value:?} in column {column:?}"
    ))]
    BadCount {
        path: String,
        line: usize,
        column: String,
        value: String,
    },
    #[snafu(display("{source}"))]
    Cleaning {
        source: nh_surveillance::CleaningError,
    },
    #[snafu(display("The geolocation {value:?} does not hold a coordinate pair"))]
    GeoParse { value: String },
    #[snafu(display("Error writing the artifact {path}"))]
    WritingArtifact {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading the artifact {path}"))]
    ReadingArtifact {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening manifest {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("The generated manifest differs from the reference manifest"))]
    ManifestMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashResult<T> = Result<T, DashError>;

/// Runs the whole batch: ingestion, cleaning, the four aggregated views,
/// chart generation and the manifest. One chart failing is recorded in the
/// summary and does not abort its siblings; everything else is fatal.
pub fn run_pipeline(args: &Args) -> DashResult<GenerationSummary> {
    let raw = io_csv::load_directory(&args.data)?;
    let cleaned = clean_records(&raw).context(CleaningSnafu {})?;

    let views = charts::Views::build(&cleaned);
    let out_dir = Path::new(&args.out);
    let summary = charts::generate_all(&views, out_dir);
    let manifest = store::build_manifest(&summary.written);
    store::write_manifest(out_dir, &manifest)?;
    info!(
        "pipeline done: {} artifacts written, {} failures",
        summary.written.len(),
        summary.failures.len()
    );

    // The reference manifest, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(&manifest, reference_path)?;
    }

    Ok(summary)
}

fn check_reference(manifest: &JSValue, reference_path: &str) -> DashResult<()> {
    let reference = store::read_manifest(reference_path)?;
    let pretty = serde_json::to_string_pretty(manifest).context(ParsingJsonSnafu {})?;
    let pretty_ref = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    if pretty_ref != pretty {
        warn!("Found differences with the reference manifest");
        print_diff(pretty_ref.as_str(), pretty.as_str(), "\n");
        return ManifestMismatchSnafu {}.fail();
    }
    Ok(())
}
