//! Test doubles shared by unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{AttachError, DacResolutionError, Pid};
use crate::runtime::{AttachMode, Attacher, ClrInfo, ClrRuntime, DataTarget};

/// Attach/detach counters shared between an attacher and its targets.
#[derive(Debug, Default)]
pub struct Counters {
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
}

impl Counters {
    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

/// Wraps another attacher, counting attaches and detaches.
pub struct CountingAttacher<A> {
    inner: A,
    pub counters: Arc<Counters>,
    delay: Duration,
}

impl<A: Attacher> CountingAttacher<A> {
    pub fn new(inner: A) -> Self {
        Self { inner, counters: Arc::new(Counters::default()), delay: Duration::ZERO }
    }

    /// Make every attach take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl<A: Attacher> Attacher for CountingAttacher<A> {
    fn attach(&self, pid: Pid, mode: AttachMode) -> Result<Box<dyn DataTarget>, AttachError> {
        self.counters.attaches.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let inner = self.inner.attach(pid, mode)?;
        Ok(Box::new(CountingTarget { inner, counters: Arc::clone(&self.counters) }))
    }
}

struct CountingTarget {
    inner: Box<dyn DataTarget>,
    counters: Arc<Counters>,
}

impl DataTarget for CountingTarget {
    fn pid(&self) -> Pid {
        self.inner.pid()
    }

    fn set_detach_on_exit(&mut self) -> Result<(), AttachError> {
        self.inner.set_detach_on_exit()
    }

    fn detach_on_exit(&self) -> bool {
        self.inner.detach_on_exit()
    }

    fn clr_versions(&self) -> &[ClrInfo] {
        self.inner.clr_versions()
    }

    fn create_runtime(
        &self,
        info: &ClrInfo,
        dac_location: &Path,
    ) -> Result<Box<dyn ClrRuntime + '_>, DacResolutionError> {
        self.inner.create_runtime(info, dac_location)
    }

    fn detach(&mut self) {
        self.counters.detaches.fetch_add(1, Ordering::SeqCst);
        self.inner.detach();
    }
}
