//! # investigator - Main Entry Point
//!
//! Supports two operational modes:
//! - **Interactive** (default): reads commands from stdin until `quit`
//! - **Batch** (`-c <CMD>`, repeatable): runs the given commands and exits
//!
//! Either mode inspects live processes through `/proc`, or a recorded
//! snapshot with `--snapshot <FILE>`.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use investigator::cli::Args;
use investigator::preflight::{run_live_checks, run_snapshot_checks};
use investigator::process_lookup::{ProcFsTable, ProcessTable};
use investigator::runtime::procfs::ProcFsAttacher;
use investigator::runtime::snapshot::{Snapshot, SnapshotAttacher};
use investigator::runtime::{Attacher, DacRegistry};
use investigator::session::Inspector;
use investigator::shell::{Flow, Shell};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("invalid argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let snapshot = match &args.snapshot {
        Some(path) => {
            run_snapshot_checks(path, &args.dac_dirs)?;
            let snapshot = Snapshot::from_file(path)?;
            info!("Loaded {} recorded processes from {}", snapshot.processes.len(), path.display());
            Some(Arc::new(snapshot))
        }
        None => {
            run_live_checks(Path::new("/proc"), &args.dac_dirs)?;
            None
        }
    };

    let processes: &dyn ProcessTable = match &snapshot {
        Some(snapshot) => &**snapshot,
        None => &ProcFsTable,
    };
    let attacher: Arc<dyn Attacher> = match &snapshot {
        Some(snapshot) => Arc::new(SnapshotAttacher::new(Arc::clone(snapshot))),
        None => Arc::new(ProcFsAttacher),
    };

    let dacs = DacRegistry::with_search_dirs(&dac_search_dirs(&args.dac_dirs));
    let inspector = Inspector::new(attacher);

    let stdout = io::stdout();
    let mut shell = Shell::new(processes, &inspector, &dacs, stdout.lock());

    if args.commands.is_empty() {
        if !args.quiet {
            eprintln!("investigator v{}", env!("CARGO_PKG_VERSION"));
        }
        shell.run(io::stdin().lock(), !args.quiet).context("Failed to run shell")?;
    } else {
        for command in &args.commands {
            if shell.execute(command).context("Failed to write output")? == Flow::Quit {
                break;
            }
        }
    }

    shell.into_inner().flush().context("Failed to flush output")?;
    Ok(())
}

/// Configured DAC directories, then the directory holding this executable.
fn dac_search_dirs(configured: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = configured.to_vec();
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    dirs
}
