//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "investigator",
    version,
    about = "Inspect thread stacks and heap usage of running .NET processes",
    after_help = "\
EXAMPLES:
    investigator                                  Interactive shell over live processes
    investigator -c 'stack my-service'            Run one command and exit
    investigator -c 'heap 1234 Dictionary'        Heap totals for matching types
    investigator --snapshot dump.json             Inspect a recorded snapshot"
)]
pub struct Args {
    /// Inspect processes recorded in a JSON snapshot instead of live ones
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Run this command and exit (repeatable, run in order)
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Extra directory to search for the runtime's data access component (repeatable)
    #[arg(long = "dac-dir", value_name = "DIR")]
    pub dac_dirs: Vec<PathBuf>,

    /// Suppress banner and prompt
    #[arg(short, long)]
    pub quiet: bool,
}
