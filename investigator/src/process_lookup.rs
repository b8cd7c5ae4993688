//! Resolve a command's target token to a process ID, and list processes.

use anyhow::{bail, Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

use crate::domain::Pid;

/// Linux truncates `/proc/<pid>/stat` command names to this many bytes.
const COMM_MAX_LEN: usize = 15;

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub name: String,
}

/// Source of running processes.
pub trait ProcessTable {
    /// All running processes, in enumeration order.
    ///
    /// # Errors
    /// Returns an error if the process table cannot be read.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Command line of one process, if it can be read.
    fn command_line(&self, pid: Pid) -> Option<String>;
}

/// The live process table, read from `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFsTable;

impl ProcessTable for ProcFsTable {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let proc_dir = fs::read_dir("/proc").context("Failed to read /proc")?;
        let mut entries = Vec::new();

        for entry in proc_dir.flatten() {
            let file_name = entry.file_name();
            let Ok(pid) = file_name.to_string_lossy().parse::<u32>() else {
                continue;
            };

            // Processes can exit between read_dir and here
            let Ok(stat_content) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
                continue;
            };
            let Ok(comm) = extract_comm(&stat_content) else {
                continue;
            };

            let name = if comm.len() >= COMM_MAX_LEN {
                full_name_from_cmdline(pid, &comm).unwrap_or(comm)
            } else {
                comm
            };
            entries.push(ProcessEntry { pid: Pid(pid), name });
        }

        Ok(entries)
    }

    fn command_line(&self, pid: Pid) -> Option<String> {
        let raw = fs::read(format!("/proc/{}/cmdline", pid.0)).ok()?;
        Some(join_cmdline(&raw))
    }
}

/// A command's target as typed, with the pid it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub raw: String,
    pub pid: Option<Pid>,
}

impl TargetRef {
    /// True when the token is an integer, whether or not it fits a pid.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        is_integer_token(&self.raw)
    }
}

/// Resolve a target token.
///
/// Integer tokens are taken verbatim; whether the process exists is only
/// discovered at attach time. Integers outside the pid range resolve to
/// nothing and are never looked up by name. Any other token is looked up as
/// a process name.
pub fn resolve_target(table: &dyn ProcessTable, token: &str) -> TargetRef {
    let pid = match token.parse::<u32>() {
        Ok(pid) => Some(Pid(pid)),
        Err(_) if is_integer_token(token) => None,
        Err(_) => find_process_by_name(table, token),
    };
    TargetRef { raw: token.to_string(), pid }
}

fn is_integer_token(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Find a process by name.
///
/// Matches the whole name, ignoring case with the same Unicode lowercasing
/// as search phrases. When several processes share the name, the first one
/// enumerated wins; enumeration order is not stable.
pub fn find_process_by_name(table: &dyn ProcessTable, name: &str) -> Option<Pid> {
    let processes = match table.processes() {
        Ok(processes) => processes,
        Err(e) => {
            warn!("Failed to enumerate processes: {e:#}");
            return None;
        }
    };

    let wanted = name.to_lowercase();
    processes.into_iter().find(|p| p.name.to_lowercase() == wanted).map(|p| p.pid)
}

/// All processes, ordered by name.
///
/// # Errors
/// Returns an error if the process table cannot be read.
pub fn list_processes(table: &dyn ProcessTable) -> Result<Vec<ProcessEntry>> {
    let mut processes = table.processes()?;
    processes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(processes)
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Result<String> {
    let open = stat_line.find('(').context("Invalid stat format")?;
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    if open >= close {
        bail!("Invalid stat format");
    }
    Ok(stat_line[open + 1..close].to_string())
}

/// Recover an untruncated name from `argv[0]` when it extends `comm`.
fn full_name_from_cmdline(pid: u32, comm: &str) -> Option<String> {
    let raw = fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let argv0 = raw.split(|&b| b == 0).next()?;
    let argv0 = String::from_utf8_lossy(argv0);
    let base = Path::new(argv0.as_ref()).file_name()?.to_str()?.to_string();
    base.starts_with(comm).then_some(base)
}

/// `/proc/<pid>/cmdline` separates arguments with NUL bytes.
fn join_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeTable {
        entries: Vec<ProcessEntry>,
        queries: Cell<usize>,
    }

    impl FakeTable {
        fn new(entries: &[(u32, &str)]) -> Self {
            Self {
                entries: entries
                    .iter()
                    .map(|&(pid, name)| ProcessEntry { pid: Pid(pid), name: name.to_string() })
                    .collect(),
                queries: Cell::new(0),
            }
        }
    }

    impl ProcessTable for FakeTable {
        fn processes(&self) -> Result<Vec<ProcessEntry>> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.entries.clone())
        }

        fn command_line(&self, _pid: Pid) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_extract_comm() {
        let stat = "1234 (my-app) S 1 1234 1234 0 -1 4194304";
        assert_eq!(extract_comm(stat).unwrap(), "my-app");
    }

    #[test]
    fn test_extract_comm_with_parens() {
        // Command names can contain parentheses
        let stat = "1234 (app (v2)) S 1 1234";
        assert_eq!(extract_comm(stat).unwrap(), "app (v2)");
    }

    #[test]
    fn test_integer_token_is_taken_verbatim() {
        let table = FakeTable::new(&[]);
        let target = resolve_target(&table, "999999");
        assert_eq!(target.pid, Some(Pid(999_999)));
        assert_eq!(table.queries.get(), 0);
    }

    #[test]
    fn test_out_of_range_integers_skip_name_lookup() {
        let table = FakeTable::new(&[(10, "-5"), (20, "4294967296")]);
        for token in ["-5", "4294967296", "+0012345678901"] {
            let target = resolve_target(&table, token);
            assert_eq!(target.pid, None, "{token}");
            assert!(target.is_numeric());
        }
        assert_eq!(table.queries.get(), 0);

        let target = resolve_target(&table, "-x");
        assert!(!target.is_numeric());
        assert_eq!(table.queries.get(), 1);
    }

    #[test]
    fn test_name_match_folds_unicode_case() {
        let table = FakeTable::new(&[(10, "Überwacher"), (20, "dotnet")]);
        assert_eq!(resolve_target(&table, "ÜBERWACHER").pid, Some(Pid(10)));
        assert_eq!(resolve_target(&table, "DOTNET").pid, Some(Pid(20)));
    }

    #[test]
    fn test_name_match_ignores_case() {
        let table = FakeTable::new(&[(10, "sshd"), (20, "Orders.Api"), (30, "orders.api")]);
        assert_eq!(resolve_target(&table, "ORDERS.API").pid, Some(Pid(20)));
    }

    #[test]
    fn test_name_must_match_whole() {
        let table = FakeTable::new(&[(10, "orders.api")]);
        assert_eq!(resolve_target(&table, "orders").pid, None);
    }

    #[test]
    fn test_list_is_sorted_by_name() {
        let table = FakeTable::new(&[(3, "zsh"), (1, "bash"), (2, "init")]);
        let names: Vec<_> = list_processes(&table).unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["bash", "init", "zsh"]);
    }

    #[test]
    fn test_join_cmdline() {
        assert_eq!(join_cmdline(b"dotnet\0app.dll\0--urls\0"), "dotnet app.dll --urls");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_procfs_table_contains_self() {
        let me = Pid(std::process::id());
        let processes = ProcFsTable.processes().unwrap();
        assert!(processes.iter().any(|p| p.pid == me));
    }
}
