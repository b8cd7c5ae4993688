//! Recorded runtime snapshots
//!
//! A snapshot is a JSON document describing processes, their runtime versions,
//! thread stacks and heap objects. Attaching to a snapshot behaves like
//! attaching to a live process, which makes it useful for replaying a capture
//! taken elsewhere and for exercising the inspection core in tests.
//! [`record_process`] captures one from any attached runtime, live or recorded;
//! failures met while recording are stored and replayed as the same failures.
//!
//! ```json
//! {
//!   "processes": [{
//!     "pid": 1234,
//!     "name": "orders-api",
//!     "runtimes": [{ "flavor": "core", "version": "8.0.1",
//!                    "dac": { "file_name": "libmscordaccore.so" } }],
//!     "threads": [{ "os_thread_id": 4660,
//!                   "frames": [{ "ip": 140737, "sp": 8192, "display": "Program.Main()" }] }],
//!     "heap": [{ "address": 4096, "type_id": 1, "type_name": "System.String", "size": 24 }]
//!   }]
//! }
//! ```

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use super::{
    AttachMode, Attacher, ClrInfo, ClrRuntime, DataTarget, Frame, HeapObject, HeapObjects,
    ThreadInfo,
};
use crate::domain::{AttachError, DacResolutionError, Pid, Tid, WalkError};
use crate::process_lookup::{ProcessEntry, ProcessTable};

/// A recorded set of processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub processes: Vec<ProcessSnapshot>,
}

/// One recorded process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub name: String,
    #[serde(default)]
    pub command_line: Option<String>,
    #[serde(default)]
    pub runtimes: Vec<ClrInfo>,
    #[serde(default)]
    pub threads: Vec<ThreadSnapshot>,
    #[serde(default)]
    pub heap: Vec<HeapObject>,
    /// Reported after every recorded heap object has been yielded.
    #[serde(default)]
    pub heap_error: Option<String>,
}

/// One recorded thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub os_thread_id: Tid,
    #[serde(default)]
    pub current_exception: Option<String>,
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Unwinding this thread fails with this reason.
    #[serde(default)]
    pub unwind_error: Option<String>,
}

impl Snapshot {
    /// Load a snapshot from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid snapshot.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid snapshot {}", path.display()))
    }

    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid snapshot.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create snapshot {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        writer.flush().with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(())
    }

    fn process(&self, pid: Pid) -> Option<&ProcessSnapshot> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

impl ProcessTable for Snapshot {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .processes
            .iter()
            .map(|p| ProcessEntry { pid: p.pid, name: p.name.clone() })
            .collect())
    }

    fn command_line(&self, pid: Pid) -> Option<String> {
        self.process(pid).and_then(|p| p.command_line.clone())
    }
}

/// Record one process through an attached runtime.
///
/// Every thread is unwound and the whole heap is enumerated. A thread that
/// fails to unwind, or a heap pass that fails, is kept as an error entry
/// rather than aborting the recording.
///
/// # Errors
/// Returns an error only if the runtime's thread list cannot be read.
pub fn record_process(
    entry: &ProcessEntry,
    command_line: Option<String>,
    runtimes: Vec<ClrInfo>,
    runtime: Option<&dyn ClrRuntime>,
) -> Result<ProcessSnapshot, WalkError> {
    let mut process = ProcessSnapshot {
        pid: entry.pid,
        name: entry.name.clone(),
        command_line,
        runtimes,
        threads: Vec::new(),
        heap: Vec::new(),
        heap_error: None,
    };
    let Some(runtime) = runtime else {
        return Ok(process);
    };

    for thread in runtime.threads()? {
        let (frames, unwind_error) = match runtime.unwind(&thread) {
            Ok(frames) => (frames, None),
            Err(WalkError::Unwind { reason, .. }) => (Vec::new(), Some(reason)),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        process.threads.push(ThreadSnapshot {
            os_thread_id: thread.os_thread_id,
            current_exception: thread.current_exception,
            frames,
            unwind_error,
        });
    }

    match runtime.heap_objects() {
        Ok(objects) => {
            for object in objects {
                match object {
                    Ok(object) => process.heap.push(object),
                    Err(e) => {
                        process.heap_error = Some(heap_failure(e));
                        break;
                    }
                }
            }
        }
        Err(e) => process.heap_error = Some(heap_failure(e)),
    }

    debug!(
        "Recorded {}: {} threads, {} heap objects",
        entry.pid,
        process.threads.len(),
        process.heap.len()
    );
    Ok(process)
}

fn heap_failure(err: WalkError) -> String {
    match err {
        WalkError::Heap(reason) => reason,
        other => other.to_string(),
    }
}

/// Attaches to processes recorded in a [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotAttacher {
    snapshot: Arc<Snapshot>,
}

impl SnapshotAttacher {
    #[must_use]
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }
}

impl Attacher for SnapshotAttacher {
    fn attach(&self, pid: Pid, _mode: AttachMode) -> Result<Box<dyn DataTarget>, AttachError> {
        let process = self.snapshot.process(pid).ok_or(AttachError::ProcessNotFound(pid))?;
        debug!("Attached to recorded process {pid} ({})", process.name);
        Ok(Box::new(SnapshotTarget { process: process.clone(), detach_on_exit: false }))
    }
}

/// An attachment to a recorded process.
#[derive(Debug)]
pub struct SnapshotTarget {
    process: ProcessSnapshot,
    detach_on_exit: bool,
}

impl DataTarget for SnapshotTarget {
    fn pid(&self) -> Pid {
        self.process.pid
    }

    fn set_detach_on_exit(&mut self) -> Result<(), AttachError> {
        self.detach_on_exit = true;
        Ok(())
    }

    fn detach_on_exit(&self) -> bool {
        self.detach_on_exit
    }

    fn clr_versions(&self) -> &[ClrInfo] {
        &self.process.runtimes
    }

    fn create_runtime(
        &self,
        info: &ClrInfo,
        dac_location: &Path,
    ) -> Result<Box<dyn ClrRuntime + '_>, DacResolutionError> {
        if dac_location.as_os_str().is_empty() {
            return Err(DacResolutionError::NoLocation { version: info.to_string() });
        }
        debug!("Recorded runtime {info} using DAC {}", dac_location.display());
        Ok(Box::new(SnapshotRuntime { process: &self.process }))
    }

    fn detach(&mut self) {
        debug!("Detached from recorded process {}", self.process.pid);
    }
}

struct SnapshotRuntime<'a> {
    process: &'a ProcessSnapshot,
}

impl ClrRuntime for SnapshotRuntime<'_> {
    fn threads(&self) -> Result<Vec<ThreadInfo>, WalkError> {
        Ok(self
            .process
            .threads
            .iter()
            .map(|t| ThreadInfo {
                os_thread_id: t.os_thread_id,
                current_exception: t.current_exception.clone(),
            })
            .collect())
    }

    fn unwind(&self, thread: &ThreadInfo) -> Result<Vec<Frame>, WalkError> {
        let recorded = self
            .process
            .threads
            .iter()
            .find(|t| t.os_thread_id == thread.os_thread_id)
            .ok_or_else(|| WalkError::Unwind {
                tid: thread.os_thread_id,
                reason: "thread is not part of the snapshot".to_string(),
            })?;

        match &recorded.unwind_error {
            Some(reason) => {
                Err(WalkError::Unwind { tid: thread.os_thread_id, reason: reason.clone() })
            }
            None => Ok(recorded.frames.clone()),
        }
    }

    fn heap_objects(&self) -> Result<HeapObjects<'_>, WalkError> {
        let objects = self.process.heap.iter().cloned().map(Ok);
        let failure = self.process.heap_error.clone().map(|e| Err(WalkError::Heap(e)));
        Ok(Box::new(objects.chain(failure)))
    }
}
