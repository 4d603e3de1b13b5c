//! The journal engine: lifecycle, state and capability checks.

use crate::backend::{Backend, Capabilities, OpenSelector};
use crate::entry::Entry;
use crate::error::{check, JournalError, Result};
use crate::filter::FilterTerm;
use crate::navigation::SeekTarget;
use crate::options::{Config, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle of a [`Journal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JournalState {
    /// Open, but no entry selected yet (fresh open or after a seek).
    Unpositioned,
    /// A move selected an entry; field reads are valid.
    Positioned,
    /// A reopen could not restore the backend. Only a new journal recovers.
    Failed,
    Closed,
}

/// Read cursor over a journal store.
///
/// The journal owns its backend exclusively and closes it when dropped.
/// Every operation takes `&mut self`: one journal is one cursor. Use
/// [`close_handle`](Journal::close_handle) to stop a blocked reader from
/// another thread.
pub struct Journal<B: Backend> {
    pub(crate) backend: B,
    pub(crate) options: OpenOptions,
    pub(crate) selector: OpenSelector,
    pub(crate) capabilities: Capabilities,
    pub(crate) filters: Vec<FilterTerm>,
    pub(crate) data_threshold: Option<usize>,
    pub(crate) operations: u64,
    pub(crate) state: JournalState,
    pub(crate) closed: Arc<AtomicBool>,
    pub(crate) canceller: B::Canceller,
}

impl<B: Backend> Journal<B> {
    /// Open `backend` as described by `options`.
    pub fn open(mut backend: B, options: OpenOptions) -> Result<Self> {
        options.validate()?;
        let selector = options.selector()?;
        let capabilities = backend.capabilities();

        if let Some((required, feature)) = selector.required_capability() {
            if !capabilities.contains(required) {
                return Err(JournalError::Unsupported(feature));
            }
        }
        if options.data_threshold.is_some() && !capabilities.contains(Capabilities::DATA_THRESHOLD)
        {
            return Err(JournalError::Unsupported("data threshold"));
        }

        check(backend.open(&selector, options.flags))?;
        if let Some(size) = options.data_threshold {
            if let Err(err) = check(backend.set_data_threshold(size)) {
                backend.close();
                return Err(err);
            }
        }

        info!(?selector, flags = ?options.flags, ?capabilities, "opened journal");

        let canceller = backend.canceller();
        Ok(Self {
            backend,
            data_threshold: options.data_threshold,
            options,
            selector,
            capabilities,
            filters: Vec::new(),
            operations: 0,
            state: JournalState::Unpositioned,
            closed: Arc::new(AtomicBool::new(false)),
            canceller,
        })
    }

    /// Open `backend` with the options of a loaded configuration.
    pub fn from_config(backend: B, config: &Config) -> Result<Self> {
        Self::open(backend, config.journal.clone())
    }

    /// Release the backend handle. Calling it again does nothing.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.state != JournalState::Closed {
            self.backend.close();
            self.state = JournalState::Closed;
            debug!("closed journal");
        }
    }

    pub fn state(&self) -> JournalState {
        if self.closed.load(Ordering::SeqCst) {
            JournalState::Closed
        } else {
            self.state
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Iterate over every matching entry from the head of the journal.
    pub fn entries(&mut self) -> Result<Entries<'_, B>> {
        self.seek(SeekTarget::Head)?;
        Ok(Entries {
            journal: self,
            done: false,
        })
    }

    /// Bytes used by the journal store.
    pub fn disk_usage(&mut self) -> Result<u64> {
        self.ensure_open()?;
        self.require(Capabilities::DISK_USAGE, "disk usage")?;
        self.backend.get_usage().map_err(JournalError::from_code)
    }

    /// Payload size above which the backend truncates field data.
    pub fn data_threshold(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.require(Capabilities::DATA_THRESHOLD, "data threshold")?;
        self.backend
            .get_data_threshold()
            .map_err(JournalError::from_code)
    }

    /// Change the truncation threshold. The value survives reopens.
    pub fn set_data_threshold(&mut self, size: usize) -> Result<()> {
        self.ensure_open()?;
        self.require(Capabilities::DATA_THRESHOLD, "data threshold")?;
        check(self.backend.set_data_threshold(size))?;
        self.data_threshold = Some(size);
        Ok(())
    }

    /// Fail unless the journal can still talk to its backend.
    pub(crate) fn ensure_open(&mut self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) && self.state != JournalState::Closed {
            self.backend.close();
            self.state = JournalState::Closed;
            debug!("journal closed by handle");
        }

        match self.state {
            JournalState::Closed => Err(JournalError::Closed),
            JournalState::Failed => Err(JournalError::Failed),
            JournalState::Unpositioned | JournalState::Positioned => Ok(()),
        }
    }

    pub(crate) fn require(&self, capability: Capabilities, feature: &'static str) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(JournalError::Unsupported(feature))
        }
    }

    /// Reads without a selected entry are passed on; the backend decides.
    pub(crate) fn trace_unpositioned(&self, operation: &'static str) {
        if self.state == JournalState::Unpositioned {
            debug!(operation, "read before any move, forwarding to backend");
        }
    }
}

impl<B: Backend> Drop for Journal<B> {
    fn drop(&mut self) {
        if self.state != JournalState::Closed {
            self.backend.close();
        }
    }
}

/// Iterator returned by [`Journal::entries`].
pub struct Entries<'a, B: Backend> {
    journal: &'a mut Journal<B>,
    done: bool,
}

impl<B: Backend> Iterator for Entries<'_, B> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let entry = match self.journal.move_next() {
            Ok(true) => self.journal.current_entry(),
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(err) => Err(err),
        };
        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_open_and_close_lifecycle() {
        let store = MemoryStore::new();
        let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();
        assert_eq!(journal.state(), JournalState::Unpositioned);
        assert_eq!(store.open_count(), 1);

        journal.close();
        journal.close();
        assert_eq!(journal.state(), JournalState::Closed);
        assert!(matches!(journal.move_next(), Err(JournalError::Closed)));
    }

    #[test]
    fn test_entries_iterates_from_head() {
        let store = MemoryStore::new();
        for n in 0..3 {
            store.append([("N", n.to_string())]);
        }
        let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();
        assert!(journal.move_next().unwrap());
        assert!(journal.move_next().unwrap());

        let values: Vec<String> = journal
            .entries()
            .unwrap()
            .map(|e| e.unwrap().get("N").unwrap().to_string())
            .collect();
        assert_eq!(values, ["0", "1", "2"]);
    }

    #[test]
    fn test_data_threshold_is_applied_on_open() {
        let store = MemoryStore::new();
        store.append([("MESSAGE", "x".repeat(100))]);
        let options = OpenOptions::new().with_data_threshold(20);
        let mut journal = Journal::open(store.journal(), options).unwrap();

        assert_eq!(journal.data_threshold().unwrap(), 20);
        assert!(journal.move_next().unwrap());
        assert_eq!(journal.read_field("message").unwrap().unwrap().len(), 12);
    }
}
