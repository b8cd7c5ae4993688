//! Text rendering for shell output

use std::io::{self, Write};

use crate::analysis::{ThreadRecord, TypeAggregate};
use crate::process_lookup::ProcessEntry;

pub const HELP: &str = "\
Commands:
List <optional true/false to include command line> - list running processes
Stack <Pid|ProcessName> <optional search phrase> - prints CLR stack traces
Heap <Pid|ProcessName> <optional search phrase> - prints heap allocations
ThreadPool <Pid|ProcessName> - prints ThreadPool information
Save <Pid|ProcessName> <file> - records stacks and heap to a snapshot file
Quit
";

/// `pid<TAB>name<TAB>command line`
pub fn write_process(out: &mut impl Write, entry: &ProcessEntry, command_line: &str) -> io::Result<()> {
    writeln!(out, "{}\t{}\t{}", entry.pid.0, entry.name, command_line)
}

/// Thread header, then one `ip sp display` line per frame, then a blank line
pub fn write_thread(out: &mut impl Write, record: &ThreadRecord) -> io::Result<()> {
    writeln!(out, "ThreadID: {:X}", record.os_thread_id.0)?;
    writeln!(out, "Exception?: {}", record.current_exception.as_deref().unwrap_or("none"))?;
    writeln!(out, "Callstack:")?;
    for frame in &record.frames {
        writeln!(
            out,
            "{:>12X} {:>12X} {}",
            frame.instruction_pointer, frame.stack_pointer, frame.display
        )?;
    }
    writeln!(out)
}

/// `size count type` with thousands separators
pub fn write_aggregate(out: &mut impl Write, aggregate: &TypeAggregate) -> io::Result<()> {
    writeln!(
        out,
        "{:>12} {:>12} {}",
        group_thousands(aggregate.total_size),
        group_thousands(aggregate.count),
        aggregate.type_name
    )
}

/// `1234567` → `1,234,567`
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
