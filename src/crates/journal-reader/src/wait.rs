//! Waiting for the writer.

use crate::backend::{
    Backend, Canceller, Capabilities, WAIT_INFINITE, WAKE_APPEND, WAKE_INVALIDATE, WAKE_NOP,
};
use crate::entry::Entry;
use crate::error::{JournalError, Result};
use crate::journal::Journal;
use journal_common::Microseconds;
use std::convert::Infallible;
use std::ffi::c_int;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Why a wait returned with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// Entries were appended.
    Append,
    /// Journal files were added, removed or rotated; positions should be
    /// re-established by seeking.
    Invalidate,
}

/// How [`Journal::wait`] blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitMode {
    /// Block inside the backend.
    #[default]
    Blocking,
    /// Poll the backend's descriptor, then let the backend process the
    /// wakeup. Same readiness model an external event loop uses.
    Select,
}

/// Closes a [`Journal`] from another thread.
///
/// Closing wakes a pending [`Journal::wait`] or [`Journal::watch`], which then
/// fails with [`JournalError::Closed`]. Every later call on the journal fails
/// the same way.
#[derive(Clone)]
pub struct CloseHandle<C: Canceller> {
    closed: Arc<AtomicBool>,
    canceller: C,
}

impl<C: Canceller> CloseHandle<C> {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.canceller.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<C: Canceller> std::fmt::Debug for CloseHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn wake_reason(rc: c_int) -> Option<WakeReason> {
    match rc {
        WAKE_NOP => None,
        WAKE_APPEND => Some(WakeReason::Append),
        rc => {
            if rc != WAKE_INVALIDATE {
                debug!(rc, "unknown wake reason, treating as invalidation");
            }
            Some(WakeReason::Invalidate)
        }
    }
}

/// Poll timeout in milliseconds, rounded up so short waits do not spin.
fn poll_timeout_ms(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let ms = timeout.as_nanos().div_ceil(1_000_000);
            c_int::try_from(ms).unwrap_or(c_int::MAX)
        }
    }
}

impl<B: Backend> Journal<B> {
    /// Block until the journal changes or `timeout` elapses (`None` waits
    /// forever). A timeout without changes yields `Ok(None)`.
    pub fn wait(
        &mut self,
        timeout: Option<Duration>,
        mode: WaitMode,
    ) -> Result<Option<WakeReason>> {
        self.ensure_open()?;

        let rc = match mode {
            WaitMode::Blocking => {
                let usec =
                    timeout.map_or(WAIT_INFINITE, |t| Microseconds::from_duration(t).get());
                self.backend.wait(usec)
            }
            WaitMode::Select => {
                self.require(Capabilities::WAIT_FD, "descriptor based waits")?;
                self.select(timeout)?
            }
        };

        if rc < 0 {
            return Err(self.wait_error(rc));
        }
        let reason = wake_reason(rc);
        trace!(?reason, "wait returned");
        Ok(reason)
    }

    /// Descriptor that turns readable when the journal changes, for use in an
    /// external event loop. Once it is readable call
    /// [`process`](Self::process).
    ///
    /// The descriptor belongs to the current backend handle. An auto-reopen
    /// replaces it, so fetch it again after any move rather than caching it.
    pub fn fd(&mut self) -> Result<RawFd> {
        self.ensure_open()?;
        self.require(Capabilities::WAIT_FD, "descriptor based waits")?;
        self.backend.get_fd().map_err(|code| self.wait_error(code))
    }

    /// Acknowledge a wakeup of the [`fd`](Self::fd) descriptor and report
    /// what changed. `Ok(None)` when nothing did.
    pub fn process(&mut self) -> Result<Option<WakeReason>> {
        self.ensure_open()?;
        self.require(Capabilities::WAIT_FD, "descriptor based waits")?;
        let rc = self.backend.process();
        if rc < 0 {
            return Err(self.wait_error(rc));
        }
        Ok(wake_reason(rc))
    }

    fn select(&mut self, timeout: Option<Duration>) -> Result<c_int> {
        let fd = match self.backend.get_fd() {
            Ok(fd) => fd,
            Err(code) => return Err(self.wait_error(code)),
        };

        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `pollfd` is a valid, exclusively borrowed array of one.
        let ready = unsafe { libc::poll(&mut pollfd, 1, poll_timeout_ms(timeout)) };

        if ready < 0 {
            let errno = nix::errno::Errno::last();
            if errno == nix::errno::Errno::EINTR {
                return Ok(WAKE_NOP);
            }
            return Err(self.wait_error(-(errno as c_int)));
        }
        if ready == 0 {
            return Ok(WAKE_NOP);
        }
        Ok(self.backend.process())
    }

    /// Errors of an interrupted wait after a close request report the close.
    fn wait_error(&self, code: c_int) -> JournalError {
        if self.closed.load(Ordering::SeqCst) {
            JournalError::Closed
        } else {
            JournalError::from_code(code)
        }
    }

    /// Whether select mode can miss notifications.
    pub fn wait_is_reliable(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.require(Capabilities::WAIT_FD, "descriptor based waits")?;
        Ok(self.backend.reliable_fd() > 0)
    }

    /// Follow the journal forever, handing every new entry to `callback`.
    ///
    /// Returns only with an error, typically [`JournalError::Closed`] once a
    /// [`CloseHandle`] closed the journal.
    pub fn watch<F>(&mut self, mut callback: F) -> Result<Infallible>
    where
        F: FnMut(Entry),
    {
        loop {
            if self.wait(None, WaitMode::Blocking)?.is_none() {
                continue;
            }
            while self.move_next()? {
                callback(self.current_entry()?);
            }
        }
    }

    /// A handle closing this journal from another thread.
    pub fn close_handle(&self) -> CloseHandle<B::Canceller> {
        CloseHandle {
            closed: Arc::clone(&self.closed),
            canceller: self.canceller.clone(),
        }
    }
}
