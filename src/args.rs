use clap::Parser;

/// This is a peer-review feedback merging program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the merge: master workbook, input and output
    /// folders, sheet names and the task geometry. All the fields must be filled in.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (default excel) The merge strategy to run. See documentation for the available
    /// strategies.
    #[clap(long, value_parser)]
    pub strategy: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the diagnostics summary of the merge
    /// will be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference file containing the expected diagnostics summary in JSON
    /// format. If provided, revmerge will check that the produced summary matches the
    /// reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
