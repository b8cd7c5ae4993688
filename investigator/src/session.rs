//! Inspection sessions
//!
//! A [`Session`] is one read-only attachment to one process. It is opened by
//! an [`Inspector`], which allows at most one open session at a time, and it
//! detaches exactly once: on [`Session::close`] or when dropped, whichever
//! comes first. Runtime handles borrow the session, so the borrow checker
//! rules out using one after the session is closed.

use crossbeam_channel::{bounded, RecvTimeoutError, SendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::domain::{AttachError, InspectError, Pid};
use crate::runtime::{AttachMode, Attacher, ClrInfo, ClrRuntime, DacRegistry, DataTarget};

/// How long an attach may take before it is abandoned
pub const ATTACH_TIMEOUT: Duration = Duration::from_millis(5000);

/// Opens inspection sessions, one at a time.
pub struct Inspector {
    attacher: Arc<dyn Attacher>,
    active: Arc<AtomicBool>,
}

impl Inspector {
    #[must_use]
    pub fn new(attacher: Arc<dyn Attacher>) -> Self {
        Self { attacher, active: Arc::new(AtomicBool::new(false)) }
    }

    /// True while a session opened by this inspector is still open.
    #[must_use]
    pub fn has_open_session(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Attach to `pid` without disturbing it, waiting at most `timeout`.
    ///
    /// After a timeout the guard stays taken until the abandoned attach has
    /// finished and been detached, so a retry cannot overlap it.
    ///
    /// # Errors
    /// - [`AttachError::SessionActive`] if another session or an abandoned
    ///   attach is still outstanding
    /// - [`AttachError::Timeout`] if the attach does not finish in time
    /// - any error reported by the backend
    pub fn open(&self, pid: Pid, timeout: Duration) -> Result<Session, AttachError> {
        if self.active.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(AttachError::SessionActive(pid));
        }

        let mut target = self.attach_with_timeout(pid, timeout)?;

        if let Err(e) = target.set_detach_on_exit() {
            target.detach();
            self.active.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!("Opened session for {pid}");
        Ok(Session { pid, target: Some(target), active: Arc::clone(&self.active) })
    }

    /// Run the attach on a helper thread. Releases the guard on every error
    /// path except a timeout, where the helper releases it once it is done.
    fn attach_with_timeout(
        &self,
        pid: Pid,
        timeout: Duration,
    ) -> Result<Box<dyn DataTarget>, AttachError> {
        // Rendezvous channel: a result is either taken by the caller or
        // handed back to the helper, never left buffered
        let (tx, rx) = bounded(0);
        let attacher = Arc::clone(&self.attacher);
        let active = Arc::clone(&self.active);

        let spawned = thread::Builder::new().name(format!("attach-{}", pid.0)).spawn(move || {
            let result = attacher.attach(pid, AttachMode::NonInvasive);
            if let Err(SendError(abandoned)) = tx.send(result) {
                if let Ok(mut late) = abandoned {
                    warn!("Attach to {pid} finished after the timeout, detaching");
                    late.detach();
                }
                active.store(false, Ordering::SeqCst);
            }
        });
        if let Err(e) = spawned {
            self.active.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                return Err(AttachError::Timeout {
                    pid,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Err(RecvTimeoutError::Disconnected) => Err(AttachError::Failed {
                pid,
                reason: "attach thread ended without a result".to_string(),
            }),
        };
        if outcome.is_err() {
            self.active.store(false, Ordering::SeqCst);
        }
        outcome
    }
}

/// An open attachment to one target process.
pub struct Session {
    pid: Pid,
    target: Option<Box<dyn DataTarget>>,
    active: Arc<AtomicBool>,
}

impl Session {
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    /// Runtime versions found in the target; empty once closed.
    #[must_use]
    pub fn clr_versions(&self) -> &[ClrInfo] {
        match self.target.as_deref() {
            Some(target) => target.clr_versions(),
            None => &[],
        }
    }

    /// Build a handle for the target's first runtime version.
    ///
    /// Returns `Ok(None)` when the target has no managed runtime loaded.
    ///
    /// # Errors
    /// Returns an error if the session is closed or the data access
    /// component cannot be located or loaded.
    pub fn runtime(
        &self,
        dacs: &DacRegistry,
    ) -> Result<Option<Box<dyn ClrRuntime + '_>>, InspectError> {
        let target = self.target.as_deref().ok_or_else(|| AttachError::Failed {
            pid: self.pid,
            reason: "session is closed".to_string(),
        })?;

        let versions = target.clr_versions();
        let Some(info) = versions.first() else {
            return Ok(None);
        };
        if versions.len() > 1 {
            debug!("{} runtime versions in {}, using {info}", versions.len(), self.pid);
        }

        let dac_location = dacs.locate(info)?;
        info!("Using {info} in {} with DAC {}", self.pid, dac_location.display());
        Ok(Some(target.create_runtime(info, &dac_location)?))
    }

    /// Detach from the target. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut target) = self.target.take() {
            target.detach();
            self.active.store(false, Ordering::SeqCst);
            info!("Closed session for {}", self.pid);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
