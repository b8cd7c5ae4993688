//! # investigator - Interactive Inspector for .NET Processes
//!
//! investigator attaches to a running managed (.NET) process without pausing
//! it, prints the call stack of every managed thread, and summarizes the live
//! managed heap by type. Commands are read from an interactive prompt or given
//! on the command line.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   stdin / -c <CMD>                              │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ command lines
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Shell (Command Dispatcher)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │   Process    │──▶│  Inspector   │──▶│   Session    │        │
//! │  │   Resolver   │   │ (1 at a time)│   │ (detach once)│        │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘        │
//! │                                                │ DacRegistry    │
//! │                                                ▼                │
//! │                     ┌──────────────┐   ┌──────────────┐        │
//! │                     │ Stack Walker │◀──│  ClrRuntime  │        │
//! │                     │ Heap Aggreg. │   │   (trait)    │        │
//! │                     └──────────────┘   └──────────────┘        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ backends
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  procfs (live, read-only /proc)      snapshot (recorded JSON)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`shell`]: command parsing, dispatch and output formatting
//! - [`process_lookup`]: turns a `<pid|name>` token into a process id
//! - [`session`]: time-bounded, single-session attachment with guaranteed detach
//! - [`runtime`]: the backend traits (`Attacher`, `DataTarget`, `ClrRuntime`),
//!   data access component lookup, and the procfs and snapshot backends
//! - [`analysis`]: the stack walk and the heap aggregation, pure logic over
//!   `ClrRuntime`
//! - [`symbolization`]: `/proc/<pid>/maps` parsing and ELF symbol lookup for
//!   native frames
//! - [`domain`]: core types (`Pid`, `Tid`, `Address`, `TypeId`) and errors
//! - [`cli`], [`preflight`]: argument parsing and startup checks
//!
//! ## Typical Usage
//!
//! ```bash
//! # Interactive shell
//! ./investigator
//!
//! # One-shot heap summary of types matching "Dictionary"
//! ./investigator -c 'heap my-service dictionary'
//!
//! # Replay a recorded snapshot
//! ./investigator --snapshot dump.json -c 'stack 1234'
//! ```
//!
//! ## Key Concepts
//!
//! - **CLR**: the .NET common language runtime hosting the managed code
//! - **DAC**: the runtime's data access component, a version-matched library
//!   used to read runtime structures out of another process
//! - **Non-invasive attach**: the target is never suspended or signalled

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod preflight;
pub mod process_lookup;
pub mod runtime;
pub mod session;
pub mod shell;
pub mod symbolization;

#[cfg(test)]
mod testing;
