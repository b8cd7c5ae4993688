//! # Runtime Introspection Interface
//!
//! The traits in this module are the seam between the inspection core
//! (session lifecycle, stack walker, heap aggregator) and whatever actually
//! reads the target process.
//!
//! ```text
//!   Attacher ──attach(pid)──▶ DataTarget ──create_runtime(dac)──▶ ClrRuntime
//!                               │                                  │
//!                               └─ clr_versions(): [ClrInfo]       ├─ threads() / unwind()
//!                                                                  └─ heap_objects()
//! ```
//!
//! Two backends implement them:
//!
//! - [`procfs`]: live Linux processes, read through `/proc` without stopping
//!   the target
//! - [`snapshot`]: a recorded runtime snapshot (JSON), used for replay and tests
//!
//! The introspection component ("DAC") for a runtime version is located by
//! a [`dac::DacStrategy`] picked from a [`dac::DacRegistry`] keyed by
//! [`RuntimeFlavor`].

pub mod dac;
pub mod procfs;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::{Address, AttachError, DacResolutionError, Pid, Tid, TypeId, WalkError};

pub use dac::{DacRegistry, DacStrategy, DeclaredThenDefault};

/// Family of managed runtime found in a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFlavor {
    /// .NET Framework (`clr.dll`, `mscorwks.dll`)
    Desktop,
    /// .NET Core / .NET 5+ (`coreclr.dll`, `libcoreclr.so`)
    Core,
}

impl RuntimeFlavor {
    /// File name the runtime's data access component ships under.
    #[must_use]
    pub fn dac_file_name(self) -> &'static str {
        match self {
            RuntimeFlavor::Desktop => "mscordacwks.dll",
            #[cfg(windows)]
            RuntimeFlavor::Core => "mscordaccore.dll",
            #[cfg(not(windows))]
            RuntimeFlavor::Core => "libmscordaccore.so",
        }
    }

    /// Identify a runtime from the file name of a loaded module.
    #[must_use]
    pub fn from_module_name(file_name: &str) -> Option<Self> {
        match file_name.to_ascii_lowercase().as_str() {
            "libcoreclr.so" | "libcoreclr.dylib" | "coreclr.dll" => Some(RuntimeFlavor::Core),
            "clr.dll" | "mscorwks.dll" => Some(RuntimeFlavor::Desktop),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFlavor::Desktop => write!(f, "Desktop CLR"),
            RuntimeFlavor::Core => write!(f, "CoreCLR"),
        }
    }
}

/// Where to find the data access component for one runtime version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DacInfo {
    /// Packaged default file name of the component.
    #[serde(default)]
    pub file_name: String,
    /// Location reported by the runtime itself, if any.
    #[serde(default)]
    pub declared_location: Option<PathBuf>,
}

/// A runtime version loaded in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClrInfo {
    pub flavor: RuntimeFlavor,
    pub version: String,
    #[serde(default)]
    pub dac: DacInfo,
}

impl ClrInfo {
    /// The declared data access component location, ignoring empty paths.
    #[must_use]
    pub fn try_get_dac_location(&self) -> Option<&Path> {
        self.dac.declared_location.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

impl fmt::Display for ClrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.flavor, self.version)
    }
}

/// A thread known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub os_thread_id: Tid,
    pub current_exception: Option<String>,
}

/// One unwound stack frame, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "ip")]
    pub instruction_pointer: Address,
    #[serde(rename = "sp")]
    pub stack_pointer: Address,
    pub display: String,
}

/// A live object on the managed heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapObject {
    pub address: Address,
    pub type_id: TypeId,
    pub type_name: String,
    pub size: u64,
}

/// Stream of heap objects; an `Err` item ends the pass.
pub type HeapObjects<'a> = Box<dyn Iterator<Item = Result<HeapObject, WalkError>> + 'a>;

/// A live view of one managed runtime inside an attached target.
pub trait ClrRuntime {
    /// Threads in runtime enumeration order.
    ///
    /// # Errors
    /// Returns an error if the thread list cannot be read.
    fn threads(&self) -> Result<Vec<ThreadInfo>, WalkError>;

    /// Unwind one thread's call stack, innermost frame first.
    ///
    /// # Errors
    /// Returns an error if the stack cannot be read or is corrupt.
    fn unwind(&self, thread: &ThreadInfo) -> Result<Vec<Frame>, WalkError>;

    /// Enumerate every live object on the managed heap.
    ///
    /// # Errors
    /// Returns an error if heap enumeration cannot start.
    fn heap_objects(&self) -> Result<HeapObjects<'_>, WalkError>;
}

/// How an attachment may touch the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// Read-only; the target is never suspended, injected into or written.
    NonInvasive,
}

/// An open attachment to one process.
///
/// Dropping a `DataTarget` must release the attachment.
pub trait DataTarget: Send {
    fn pid(&self) -> Pid;

    /// Ask for the attachment to be released if the inspector dies.
    ///
    /// # Errors
    /// Returns an error if the backend cannot arrange this.
    fn set_detach_on_exit(&mut self) -> Result<(), AttachError>;

    /// Whether [`DataTarget::set_detach_on_exit`] has taken effect.
    fn detach_on_exit(&self) -> bool;

    /// Runtime versions loaded in the target, in discovery order.
    fn clr_versions(&self) -> &[ClrInfo];

    /// Build a runtime view from a data access component location.
    ///
    /// # Errors
    /// Returns an error if the component is missing, unreadable or invalid.
    fn create_runtime(
        &self,
        info: &ClrInfo,
        dac_location: &Path,
    ) -> Result<Box<dyn ClrRuntime + '_>, DacResolutionError>;

    /// Release the attachment. Called at most once by the session.
    fn detach(&mut self);
}

/// Opens attachments. Implementations must be callable from a helper thread.
pub trait Attacher: Send + Sync {
    /// # Errors
    /// Returns an error if the process is missing or cannot be read.
    fn attach(&self, pid: Pid, mode: AttachMode) -> Result<Box<dyn DataTarget>, AttachError>;
}
