//! Memory mapping utilities for process address space analysis
//!
//! Parses `/proc/<pid>/maps` so the live backend can tell which module an
//! address belongs to, where a thread's stack lives, and which runtime
//! libraries the target has loaded.

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::Pid;

/// Address range `[start, end)` in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub range: MemoryRange,
    pub perms: String,
    /// File offset the mapping starts at
    pub offset: u64,
    /// Backing file, or pseudo name like `[stack]`
    pub path: Option<PathBuf>,
}

impl MemoryMapping {
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.perms.as_bytes().get(2) == Some(&b'x')
    }

    /// True for mappings backed by a real file (not `[heap]`, `[vdso]`, ...)
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        self.path.as_deref().is_some_and(Path::is_absolute)
    }

    /// Short module name for display, e.g. `libcoreclr.so`
    #[must_use]
    pub fn module_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map_or_else(|| "<anonymous>".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Read and parse `/proc/<pid>/maps`.
///
/// # Errors
/// Returns the underlying I/O error so callers can tell a vanished process
/// (`NotFound`) from a permission problem (`PermissionDenied`).
pub fn read_memory_maps(pid: Pid) -> io::Result<Vec<MemoryMapping>> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    let maps = fs::read_to_string(&maps_path)?;
    let mappings = parse_memory_maps(&maps);
    debug!("Parsed {} mappings from {maps_path}", mappings.len());
    Ok(mappings)
}

/// Parse the text of a maps file, skipping malformed lines.
///
/// Line format: `start-end perms offset dev inode [pathname]`
#[must_use]
pub fn parse_memory_maps(maps: &str) -> Vec<MemoryMapping> {
    maps.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<MemoryMapping> {
    let mut parts = line.split_whitespace();
    let (start, end) = parts.next()?.split_once('-')?;
    let perms = parts.next()?.to_string();
    let offset = u64::from_str_radix(parts.next()?, 16).ok()?;
    let _dev = parts.next()?;
    let _inode = parts.next()?;

    // Paths may contain spaces; everything after the inode is the path
    let rest: Vec<&str> = parts.collect();
    let path = if rest.is_empty() { None } else { Some(PathBuf::from(rest.join(" "))) };

    Some(MemoryMapping {
        range: MemoryRange {
            start: u64::from_str_radix(start, 16).ok()?,
            end: u64::from_str_radix(end, 16).ok()?,
        },
        perms,
        offset,
        path,
    })
}

/// Find the mapping containing `addr`.
#[must_use]
pub fn find_mapping(mappings: &[MemoryMapping], addr: u64) -> Option<&MemoryMapping> {
    mappings.iter().find(|m| m.range.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a02000 r--p 00000000 08:01 1311 /usr/bin/dotnet
55d0c0a02000-55d0c0a10000 r-xp 00002000 08:01 1311 /usr/bin/dotnet
7f1a2b000000-7f1a2b400000 r-xp 00100000 08:01 2042 /usr/share/dotnet/shared/Microsoft.NETCore.App/8.0.1/libcoreclr.so
7f1a2c000000-7f1a2c021000 rw-p 00000000 00:00 0
7ffd1f000000-7ffd1f021000 rw-p 00000000 00:00 0                          [stack]
7f1a2d000000-7f1a2d001000 r-xp 00000000 08:01 77 /opt/my app/lib native.so
";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
    }

    #[test]
    fn test_parse_memory_maps() {
        let mappings = parse_memory_maps(MAPS);
        assert_eq!(mappings.len(), 6);

        let coreclr = &mappings[2];
        assert!(coreclr.is_executable());
        assert!(coreclr.is_file_backed());
        assert_eq!(coreclr.offset, 0x10_0000);
        assert_eq!(coreclr.module_name(), "libcoreclr.so");

        assert_eq!(mappings[3].path, None);
        assert_eq!(mappings[4].path.as_deref(), Some(Path::new("[stack]")));
        assert!(!mappings[4].is_file_backed());
    }

    #[test]
    fn test_path_with_spaces() {
        let mappings = parse_memory_maps(MAPS);
        assert_eq!(mappings[5].path.as_deref(), Some(Path::new("/opt/my app/lib native.so")));
    }

    #[test]
    fn test_find_mapping() {
        let mappings = parse_memory_maps(MAPS);
        let found = find_mapping(&mappings, 0x7ffd_1f00_0100).unwrap();
        assert_eq!(found.module_name(), "[stack]");
        assert!(find_mapping(&mappings, 0x10).is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_own_maps() {
        let mappings = read_memory_maps(Pid(std::process::id())).unwrap();
        assert!(mappings.iter().any(MemoryMapping::is_executable));
    }
}
