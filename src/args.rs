use clap::Parser;

/// This program builds the chart catalog of the COVID-19 nursing home dashboard.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (directory path) The directory holding the weekly surveillance exports, one CSV file
    /// per reporting period. All the files must share one column schema.
    #[clap(short, long, value_parser, default_value = "data")]
    pub data: String,

    /// (directory path) The directory the chart artifacts and the manifest will be written to.
    /// It is created if it does not exist.
    #[clap(short, long, value_parser, default_value = "datasets")]
    pub out: String,

    /// (file path) A reference manifest in JSON format. If provided, nhdash will check that
    /// the generated catalog matches the reference and fail with a diff otherwise.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
