//! Thread stack walking
//!
//! Unwinds every thread the runtime knows about, in the runtime's own
//! enumeration order. Threads without frames are dropped before filtering,
//! so they never show up, filter or not.

use log::debug;

use super::SearchFilter;
use crate::domain::{Tid, WalkError};
use crate::runtime::{ClrRuntime, Frame};

/// One thread's unwound call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub os_thread_id: Tid,
    pub current_exception: Option<String>,
    /// Innermost frame first
    pub frames: Vec<Frame>,
}

impl ThreadRecord {
    fn matches(&self, filter: &SearchFilter) -> bool {
        self.frames.iter().any(|frame| filter.matches(&frame.display))
    }
}

/// Unwind all threads and keep those with frames that pass `filter`.
///
/// # Errors
/// The first thread that fails to unwind aborts the whole walk.
pub fn walk(runtime: &dyn ClrRuntime, filter: &SearchFilter) -> Result<Vec<ThreadRecord>, WalkError> {
    let threads = runtime.threads()?;
    let total = threads.len();
    let mut records = Vec::new();

    for thread in threads {
        let frames = runtime.unwind(&thread)?;
        if frames.is_empty() {
            continue;
        }

        let record = ThreadRecord {
            os_thread_id: thread.os_thread_id,
            current_exception: thread.current_exception,
            frames,
        };
        if record.matches(filter) {
            records.push(record);
        }
    }

    debug!("Stack walk kept {} of {total} threads", records.len());
    Ok(records)
}
