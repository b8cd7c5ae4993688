//! Live Linux backend
//!
//! Attaches to a running process through `/proc` only. Nothing here stops,
//! signals, traces or writes to the target:
//!
//! - `/proc/<pid>/maps` lists loaded modules, which identifies the runtime
//! - `/proc/<pid>/mem` is opened read-only for stack memory
//! - `/proc/<pid>/task/<tid>/syscall` gives a blocked thread's `sp` and `pc`
//!
//! Threads are unwound by stack scanning: starting at the thread's stack
//! pointer, every word that points into executable code of a mapped module
//! file is reported as a return address. This finds real callers but can also
//! report stale values left on the stack; JIT-compiled managed code lives in
//! anonymous mappings and is not reported.
//!
//! The data access component is located and checked to be a loadable module
//! exporting the runtime's data access entry point, so a wrong or missing file
//! is reported before any walk. It is not loaded: managed thread state and
//! heap enumeration need its COM protocol, which this backend does not speak.
//! `heap` on a live process therefore fails, and a live process can be
//! recorded with `save` to keep its stacks as a snapshot.

use log::{debug, info};
use object::Object;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use super::{
    AttachMode, Attacher, ClrInfo, ClrRuntime, DacInfo, DataTarget, Frame, HeapObjects,
    RuntimeFlavor, ThreadInfo,
};
use crate::domain::{Address, AttachError, DacResolutionError, Pid, Tid, WalkError};
use crate::preflight::privilege_hint;
use crate::symbolization::{find_mapping, read_memory_maps, MemoryMapping, Symbolizer};

/// Most bytes of stack scanned per thread
const MAX_SCAN_BYTES: u64 = 64 * 1024;

/// Most frames reported per thread
const MAX_FRAMES: usize = 256;

/// Entry point every data access component exports
const DAC_ENTRY_POINT: &str = "CLRDataCreateInstance";

/// Stack slots are read as 64-bit words
const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Attaches to live processes via `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFsAttacher;

impl Attacher for ProcFsAttacher {
    fn attach(&self, pid: Pid, mode: AttachMode) -> Result<Box<dyn DataTarget>, AttachError> {
        let AttachMode::NonInvasive = mode;
        Ok(Box::new(ProcFsTarget::open(pid)?))
    }
}

/// An open, read-only attachment to a live process.
#[derive(Debug)]
pub struct ProcFsTarget {
    pid: Pid,
    mem: Option<File>,
    mappings: Vec<MemoryMapping>,
    versions: Vec<ClrInfo>,
    detach_on_exit: bool,
}

impl ProcFsTarget {
    fn open(pid: Pid) -> Result<Self, AttachError> {
        if !Path::new(&format!("/proc/{}", pid.0)).exists() {
            return Err(AttachError::ProcessNotFound(pid));
        }

        let mappings = read_memory_maps(pid).map_err(|e| attach_error(pid, "maps", e))?;
        let mem = File::open(format!("/proc/{}/mem", pid.0))
            .map_err(|e| attach_error(pid, "mem", e))?;

        let versions = detect_runtimes(&mappings, &root_dir(pid));
        info!(
            "Attached to {pid} ({} mappings, {} runtime version(s))",
            mappings.len(),
            versions.len()
        );

        Ok(Self { pid, mem: Some(mem), mappings, versions, detach_on_exit: false })
    }

    fn read_memory(&self, addr: u64, len: usize) -> io::Result<Vec<u8>> {
        let mem = self
            .mem
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "target detached"))?;
        let mut buf = vec![0u8; len];
        let read = mem.read_at(&mut buf, addr)?;
        buf.truncate(read);
        Ok(buf)
    }
}

impl DataTarget for ProcFsTarget {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn set_detach_on_exit(&mut self) -> Result<(), AttachError> {
        // The mem handle is close-on-exec and owned by this process, so the
        // kernel drops it if we die; no registration with the target needed.
        self.detach_on_exit = true;
        Ok(())
    }

    fn detach_on_exit(&self) -> bool {
        self.detach_on_exit
    }

    fn clr_versions(&self) -> &[ClrInfo] {
        &self.versions
    }

    fn create_runtime(
        &self,
        info: &ClrInfo,
        dac_location: &Path,
    ) -> Result<Box<dyn ClrRuntime + '_>, DacResolutionError> {
        validate_dac(dac_location)?;
        debug!("Validated DAC {} for {info}", dac_location.display());
        Ok(Box::new(NativeRuntime { target: self, symbolizer: Symbolizer::new(root_dir(self.pid)) }))
    }

    fn detach(&mut self) {
        if self.mem.take().is_some() {
            info!("Detached from {}", self.pid);
        }
    }
}

/// The data access component must be an object file exporting its entry point.
fn validate_dac(path: &Path) -> Result<(), DacResolutionError> {
    let invalid = |reason: String| DacResolutionError::Invalid { path: path.to_path_buf(), reason };

    let data = fs::read(path)
        .map_err(|source| DacResolutionError::Unreadable { path: path.to_path_buf(), source })?;
    let obj = object::File::parse(&*data).map_err(|e| invalid(e.to_string()))?;
    let exports = obj.exports().map_err(|e| invalid(e.to_string()))?;

    if !exports.iter().any(|export| export.name() == DAC_ENTRY_POINT.as_bytes()) {
        return Err(invalid(format!("does not export {DAC_ENTRY_POINT}")));
    }
    Ok(())
}

/// Thread and stack access for a live process.
struct NativeRuntime<'a> {
    target: &'a ProcFsTarget,
    symbolizer: Symbolizer,
}

impl NativeRuntime<'_> {
    fn frame(&self, ip: u64, sp: u64) -> Frame {
        let display = find_mapping(&self.target.mappings, ip)
            .map_or_else(|| format!("0x{ip:x}"), |m| self.symbolizer.describe(ip, m));
        Frame { instruction_pointer: Address(ip), stack_pointer: Address(sp), display }
    }

    fn is_code(&self, addr: u64) -> bool {
        find_mapping(&self.target.mappings, addr)
            .is_some_and(|m| m.is_executable() && m.is_file_backed())
    }

    fn scan_stack(&self, tid: Tid, sp: u64, frames: &mut Vec<Frame>) -> Result<(), WalkError> {
        let Some(stack) = find_mapping(&self.target.mappings, sp) else {
            debug!("{tid}: stack pointer 0x{sp:x} is outside every mapping");
            return Ok(());
        };

        let len = (stack.range.end - sp).min(MAX_SCAN_BYTES);
        let bytes = self
            .target
            .read_memory(sp, usize::try_from(len).unwrap_or(usize::MAX))
            .map_err(|e| WalkError::Unwind { tid, reason: format!("reading stack: {e}") })?;

        for (slot, word) in (sp..).step_by(WORD_SIZE).zip(bytes.chunks_exact(WORD_SIZE)) {
            if frames.len() >= MAX_FRAMES {
                break;
            }
            let mut raw = [0u8; WORD_SIZE];
            raw.copy_from_slice(word);
            let value = u64::from_ne_bytes(raw);
            if self.is_code(value) {
                frames.push(self.frame(value, slot));
            }
        }
        Ok(())
    }
}

impl ClrRuntime for NativeRuntime<'_> {
    fn threads(&self) -> Result<Vec<ThreadInfo>, WalkError> {
        let task_dir = format!("/proc/{}/task", self.target.pid.0);
        let threads = fs::read_dir(&task_dir)?
            .filter_map(|entry| {
                let tid = entry.ok()?.file_name().to_string_lossy().parse::<u32>().ok()?;
                Some(ThreadInfo { os_thread_id: Tid(tid), current_exception: None })
            })
            .collect();
        Ok(threads)
    }

    fn unwind(&self, thread: &ThreadInfo) -> Result<Vec<Frame>, WalkError> {
        let tid = thread.os_thread_id;
        let path = format!("/proc/{}/task/{}/syscall", self.target.pid.0, tid.0);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{tid} exited during the walk");
                return Ok(Vec::new());
            }
            Err(e) => return Err(WalkError::Unwind { tid, reason: format!("{path}: {e}") }),
        };

        let Some((sp, pc)) = parse_syscall_registers(&content) else {
            debug!("{tid} is running, no registers available");
            return Ok(Vec::new());
        };

        let mut frames = vec![self.frame(pc, sp)];
        self.scan_stack(tid, sp, &mut frames)?;
        debug!("{tid}: {} frames", frames.len());
        Ok(frames)
    }

    fn heap_objects(&self) -> Result<HeapObjects<'_>, WalkError> {
        Err(WalkError::Unsupported(format!(
            "Heap enumeration of live process {} is not supported; \
             inspect a recorded snapshot with --snapshot instead",
            self.target.pid
        )))
    }
}

/// Where the target's own filesystem view starts.
fn root_dir(pid: Pid) -> PathBuf {
    PathBuf::from(format!("/proc/{}/root", pid.0))
}

/// Find managed runtimes among the loaded modules, in load order.
///
/// The runtime version is the name of the directory the runtime library was
/// loaded from (`.../Microsoft.NETCore.App/8.0.1/libcoreclr.so` → `8.0.1`).
/// The data access component is declared when it sits next to the runtime.
fn detect_runtimes(mappings: &[MemoryMapping], root: &Path) -> Vec<ClrInfo> {
    let mut seen: Vec<&Path> = Vec::new();
    let mut versions = Vec::new();

    for path in mappings.iter().filter_map(|m| m.path.as_deref()) {
        if seen.contains(&path) {
            continue;
        }
        seen.push(path);

        let Some(flavor) =
            path.file_name().and_then(|n| n.to_str()).and_then(RuntimeFlavor::from_module_name)
        else {
            continue;
        };

        let dir = path.parent().unwrap_or(Path::new("/"));
        let version = dir
            .file_name()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned());

        let sibling = root.join(dir.strip_prefix("/").unwrap_or(dir)).join(flavor.dac_file_name());
        let declared_location = sibling.is_file().then_some(sibling);

        info!("Found {flavor} {version} at {}", path.display());
        versions.push(ClrInfo {
            flavor,
            version,
            dac: DacInfo { file_name: flavor.dac_file_name().to_string(), declared_location },
        });
    }

    versions
}

/// Extract `(sp, pc)` from `/proc/<pid>/task/<tid>/syscall`.
///
/// The file holds `running`, `-1 sp pc` (blocked outside a syscall) or
/// `nr arg1 .. arg6 sp pc`.
fn parse_syscall_registers(content: &str) -> Option<(u64, u64)> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let hex = |s: &str| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok();
    let sp = hex(fields[fields.len() - 2])?;
    let pc = hex(fields[fields.len() - 1])?;
    Some((sp, pc))
}

fn attach_error(pid: Pid, what: &str, err: io::Error) -> AttachError {
    match err.kind() {
        io::ErrorKind::NotFound => AttachError::ProcessNotFound(pid),
        io::ErrorKind::PermissionDenied => AttachError::AccessDenied {
            pid,
            reason: format!("cannot read /proc {what}; {}", privilege_hint()),
        },
        _ => AttachError::Failed { pid, reason: format!("/proc {what}: {err}") },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::parse_memory_maps;

    #[test]
    fn test_parse_syscall_blocked_in_syscall() {
        let line = "202 0x7f0c 0x80 0x0 0x0 0x0 0x0 0x7ffd1f020a40 0x7f1a2b0a4c10\n";
        assert_eq!(
            parse_syscall_registers(line),
            Some((0x7ffd_1f02_0a40, 0x7f1a_2b0a_4c10))
        );
    }

    #[test]
    fn test_parse_syscall_blocked_outside_syscall() {
        assert_eq!(parse_syscall_registers("-1 0x7ffd1000 0x401000"), Some((0x7ffd_1000, 0x40_1000)));
    }

    #[test]
    fn test_parse_syscall_running() {
        assert_eq!(parse_syscall_registers("running\n"), None);
    }

    #[test]
    fn test_detect_runtimes_reads_version_from_directory() {
        let maps = "\
7f1a2b000000-7f1a2b100000 r--p 00000000 08:01 2042 /usr/share/dotnet/shared/Microsoft.NETCore.App/8.0.1/libcoreclr.so
7f1a2b100000-7f1a2b400000 r-xp 00100000 08:01 2042 /usr/share/dotnet/shared/Microsoft.NETCore.App/8.0.1/libcoreclr.so
7f1a2c000000-7f1a2c100000 r-xp 00000000 08:01 99 /usr/lib/libc.so.6
";
        let versions = detect_runtimes(&parse_memory_maps(maps), Path::new("/nonexistent-root"));
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].flavor, RuntimeFlavor::Core);
        assert_eq!(versions[0].version, "8.0.1");
        assert_eq!(versions[0].dac.file_name, RuntimeFlavor::Core.dac_file_name());
        assert_eq!(versions[0].dac.declared_location, None);
    }

    #[test]
    fn test_only_file_backed_executable_mappings_are_code() {
        let maps = "\
7f1a2c000000-7f1a2c100000 r-xp 00000000 08:01 99 /usr/lib/libc.so.6
7f1a2d000000-7f1a2d100000 rwxp 00000000 00:00 0
7f1a2e000000-7f1a2e100000 r-xp 00000000 00:00 0 [anon:jit]
7f1a2f000000-7f1a2f100000 rw-p 00000000 08:01 99 /usr/lib/libc.so.6
";
        let target = ProcFsTarget {
            pid: Pid(1),
            mem: None,
            mappings: parse_memory_maps(maps),
            versions: Vec::new(),
            detach_on_exit: false,
        };
        let runtime =
            NativeRuntime { target: &target, symbolizer: Symbolizer::new("/nonexistent-root") };

        assert!(runtime.is_code(0x7f1a_2c00_0100));
        assert!(!runtime.is_code(0x7f1a_2d00_0100));
        assert!(!runtime.is_code(0x7f1a_2e00_0100));
        assert!(!runtime.is_code(0x7f1a_2f00_0100));
        assert!(!runtime.is_code(0x1000));
    }

    #[test]
    fn test_validate_dac_missing_file() {
        let err = validate_dac(Path::new("/nonexistent/libmscordaccore.so")).unwrap_err();
        assert!(matches!(err, DacResolutionError::Unreadable { .. }));
    }

    #[test]
    fn test_validate_dac_requires_entry_point() {
        let exe = std::env::current_exe().unwrap();
        let err = validate_dac(&exe).unwrap_err();
        assert!(matches!(
            err,
            DacResolutionError::Invalid { ref reason, .. } if reason.contains(DAC_ENTRY_POINT)
        ));
    }

    #[test]
    fn test_validate_dac_not_an_object() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), b"not a library").unwrap();
        let err = validate_dac(file.path()).unwrap_err();
        assert!(matches!(err, DacResolutionError::Invalid { .. }));
    }

    #[test]
    fn test_attach_missing_process() {
        let result = ProcFsAttacher.attach(Pid(999_999_999), AttachMode::NonInvasive);
        assert!(matches!(result, Err(AttachError::ProcessNotFound(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_attach_self_finds_no_managed_runtime() {
        let mut target =
            ProcFsAttacher.attach(Pid(std::process::id()), AttachMode::NonInvasive).unwrap();
        assert!(target.clr_versions().is_empty());
        assert!(!target.detach_on_exit());
        target.set_detach_on_exit().unwrap();
        assert!(target.detach_on_exit());
        target.detach();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unwind_self_after_rejecting_own_binary_as_dac() {
        let pid = Pid(std::process::id());
        let target = ProcFsTarget::open(pid).unwrap();
        let info = ClrInfo {
            flavor: RuntimeFlavor::Core,
            version: "test".to_string(),
            dac: DacInfo::default(),
        };
        let exe = std::env::current_exe().unwrap();
        assert!(matches!(
            target.create_runtime(&info, &exe),
            Err(DacResolutionError::Invalid { .. })
        ));
        let runtime = NativeRuntime { target: &target, symbolizer: Symbolizer::new(root_dir(pid)) };

        let threads = runtime.threads().unwrap();
        assert!(!threads.is_empty());
        // Threads may be running or exit mid-walk; unwinding must not fail
        for thread in &threads {
            runtime.unwind(thread).unwrap();
        }
        assert!(matches!(runtime.heap_objects(), Err(WalkError::Unsupported(_))));
    }
}
