//! Interactive command shell
//!
//! Routes parsed commands to the process resolver, the stack walker and the
//! heap aggregator. Every `stack`/`heap`/`save` command opens exactly one session
//! and closes it before the command returns, whatever happened in between.
//! Inspection failures are printed and the shell carries on; only errors
//! writing to the output end the loop.

pub mod command;
pub mod output;

use log::{debug, info};
use std::io::{self, BufRead, Write};

use crate::analysis::{self, SearchFilter};
use crate::domain::{InspectError, Pid};
use crate::process_lookup::{list_processes, resolve_target, ProcessEntry, ProcessTable};
use crate::runtime::snapshot::{record_process, ProcessSnapshot, Snapshot};
use crate::runtime::{ClrRuntime, DacRegistry};
use crate::session::{Inspector, ATTACH_TIMEOUT};

pub use command::Command;

/// Prompt shown before each interactive command
pub const PROMPT: &str = "Enter Command (or ?): ";

/// Whether the shell should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Command dispatcher bound to a process table, an inspector and an output.
pub struct Shell<'a, W: Write> {
    processes: &'a dyn ProcessTable,
    inspector: &'a Inspector,
    dacs: &'a DacRegistry,
    out: W,
}

impl<'a, W: Write> Shell<'a, W> {
    pub fn new(
        processes: &'a dyn ProcessTable,
        inspector: &'a Inspector,
        dacs: &'a DacRegistry,
        out: W,
    ) -> Self {
        Self { processes, inspector, dacs, out }
    }

    /// Give back the output sink
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Read commands from `input` until `quit` or end of input.
    ///
    /// # Errors
    /// Returns an error only if reading input or writing output fails.
    pub fn run<R: BufRead>(&mut self, mut input: R, prompt: bool) -> io::Result<()> {
        let mut line = String::new();
        loop {
            if prompt {
                writeln!(self.out, "{PROMPT}")?;
                self.out.flush()?;
            }

            line.clear();
            if input.read_line(&mut line)? == 0 {
                debug!("End of input");
                return Ok(());
            }

            if self.execute(&line)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Execute one command line.
    ///
    /// # Errors
    /// Returns an error only if writing output fails.
    pub fn execute(&mut self, line: &str) -> io::Result<Flow> {
        match Command::parse(line) {
            Command::Help => writeln!(self.out, "{}", output::HELP)?,
            Command::List { command_line } => self.list(command_line)?,
            Command::Stack { target, search } => {
                self.stack(target.as_deref(), search.as_deref())?;
            }
            Command::Heap { target, search } => self.heap(target.as_deref(), search.as_deref())?,
            Command::Save { target, path } => self.save(target.as_deref(), path.as_deref())?,
            Command::ThreadPool { .. } => {
                writeln!(self.out, "ThreadPool inspection is not supported")?;
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Empty => {}
            Command::Unknown(keyword) => {
                writeln!(self.out, "Unknown command '{keyword}' (type ? for help)")?;
            }
        }
        self.out.flush()?;
        Ok(Flow::Continue)
    }

    fn list(&mut self, with_command_line: bool) -> io::Result<()> {
        writeln!(self.out, "Processes:")?;
        match list_processes(self.processes) {
            Ok(entries) => {
                for entry in &entries {
                    let command_line = if with_command_line {
                        self.processes.command_line(entry.pid).unwrap_or_default()
                    } else {
                        String::new()
                    };
                    output::write_process(&mut self.out, entry, &command_line)?;
                }
            }
            Err(e) => writeln!(self.out, "Failed to list processes: {e:#}")?,
        }
        writeln!(self.out)
    }

    fn stack(&mut self, target: Option<&str>, search: Option<&str>) -> io::Result<()> {
        let Some(pid) = self.resolve(target)? else {
            return Ok(());
        };
        let filter = SearchFilter::new(search);

        match self.with_runtime(pid, |runtime| Ok(analysis::walk(runtime, &filter)?)) {
            Ok(Some(records)) => {
                info!("{} threads matched in {pid}", records.len());
                for record in &records {
                    output::write_thread(&mut self.out, record)?;
                }
                Ok(())
            }
            Ok(None) => self.report_unmanaged(),
            Err(e) => self.report(&e),
        }
    }

    fn heap(&mut self, target: Option<&str>, search: Option<&str>) -> io::Result<()> {
        let Some(pid) = self.resolve(target)? else {
            return Ok(());
        };
        let filter = SearchFilter::new(search);

        match self.with_runtime(pid, |runtime| Ok(analysis::aggregate(runtime, &filter)?)) {
            Ok(Some(aggregates)) => {
                info!("{} heap types matched in {pid}", aggregates.len());
                for aggregate in &aggregates {
                    output::write_aggregate(&mut self.out, aggregate)?;
                }
                Ok(())
            }
            Ok(None) => self.report_unmanaged(),
            Err(e) => self.report(&e),
        }
    }

    fn save(&mut self, target: Option<&str>, path: Option<&str>) -> io::Result<()> {
        let Some(pid) = self.resolve(target)? else {
            return Ok(());
        };
        let Some(path) = path else {
            return writeln!(self.out, "Missing file: expected Save <Pid|ProcessName> <file>");
        };

        let recorded = match self.record(pid) {
            Ok(recorded) => recorded,
            Err(e) => return self.report(&e),
        };
        let threads = recorded.threads.len();
        let objects = recorded.heap.len();

        match (Snapshot { processes: vec![recorded] }).to_file(path) {
            Ok(()) => writeln!(
                self.out,
                "Saved {threads} threads and {objects} heap objects of {pid} to {path}"
            ),
            Err(e) => writeln!(self.out, "Failed to save snapshot: {e:#}"),
        }
    }

    /// Record `pid` through its first runtime, or bare if it has none.
    fn record(&self, pid: Pid) -> Result<ProcessSnapshot, InspectError> {
        let entry = self
            .processes
            .processes()
            .ok()
            .and_then(|entries| entries.into_iter().find(|e| e.pid == pid))
            .unwrap_or_else(|| ProcessEntry { pid, name: pid.0.to_string() });
        let command_line = self.processes.command_line(pid);

        let mut session = self.inspector.open(pid, ATTACH_TIMEOUT)?;
        let runtimes = session.clr_versions().to_vec();
        let recorded = match session.runtime(self.dacs)? {
            Some(runtime) => record_process(&entry, command_line, runtimes, Some(runtime.as_ref()))?,
            None => record_process(&entry, command_line, runtimes, None)?,
        };
        session.close();
        Ok(recorded)
    }

    /// Resolve a target token, reporting when there is nothing to attach to.
    fn resolve(&mut self, token: Option<&str>) -> io::Result<Option<Pid>> {
        let Some(token) = token else {
            writeln!(self.out, "Missing target: expected <Pid|ProcessName>")?;
            return Ok(None);
        };

        let target = resolve_target(self.processes, token);
        match target.pid {
            Some(pid) => debug!("Resolved '{}' to {pid}", target.raw),
            None if target.is_numeric() => {
                writeln!(self.out, "Invalid process id '{}'", target.raw)?;
            }
            None => writeln!(self.out, "Could not find process by name")?,
        }
        Ok(target.pid)
    }

    /// Open a session, hand its runtime to `f`, and close the session.
    ///
    /// `Ok(None)` means the target has no managed runtime.
    fn with_runtime<T>(
        &self,
        pid: Pid,
        f: impl FnOnce(&dyn ClrRuntime) -> Result<T, InspectError>,
    ) -> Result<Option<T>, InspectError> {
        let mut session = self.inspector.open(pid, ATTACH_TIMEOUT)?;
        let result = match session.runtime(self.dacs) {
            Ok(Some(runtime)) => f(runtime.as_ref()).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        session.close();
        result
    }

    fn report_unmanaged(&mut self) -> io::Result<()> {
        writeln!(self.out, "Process is probably not running in the CLR")
    }

    fn report(&mut self, err: &InspectError) -> io::Result<()> {
        info!("Command failed: {err}");
        writeln!(self.out, "Exception running command:")?;
        writeln!(self.out, "{err}")
    }
}
