//! Movement, seeking and the periodic reopen of the backend handle.
//!
//! Every movement primitive counts towards the reopen threshold. Once it is
//! reached the engine captures the current cursor, closes the backend, opens
//! it again with the same options, replays the data threshold and the filter
//! log, and seeks back to the cursor. Callers only observe the extra latency
//! of the move that triggered it.

use crate::backend::Backend;
use crate::error::{check, JournalError, Result};
use crate::filter::apply_term;
use crate::journal::{Journal, JournalState};
use journal_common::{Microseconds, Seconds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{debug, instrument, warn};

/// Opaque backend token naming one entry; stable across reopens of the same
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorToken(String);

impl CursorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CursorToken {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(JournalError::InvalidArgument(String::from(
                "cursor token is empty",
            )));
        }
        Ok(Self(s.to_string()))
    }
}

/// Where [`Journal::seek`] moves the read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekTarget {
    Head,
    Tail,
    /// Nearest entry to a wall-clock time. Sub-second precision is
    /// discarded: the time is truncated to whole seconds before it is handed
    /// to the backend in microseconds.
    Time(SystemTime),
    /// Nearest entry to an exact realtime timestamp.
    RealtimeUsec(Microseconds),
    Cursor(CursorToken),
}

impl FromStr for SeekTarget {
    type Err = JournalError;

    /// Parses the symbolic targets `head`/`start` and `tail`/`end`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" | "start" => Ok(SeekTarget::Head),
            "tail" | "end" => Ok(SeekTarget::Tail),
            other => Err(JournalError::InvalidArgument(format!(
                "unknown seek target {:?}",
                other
            ))),
        }
    }
}

impl From<CursorToken> for SeekTarget {
    fn from(cursor: CursorToken) -> Self {
        SeekTarget::Cursor(cursor)
    }
}

impl From<SystemTime> for SeekTarget {
    fn from(time: SystemTime) -> Self {
        SeekTarget::Time(time)
    }
}

impl<B: Backend> Journal<B> {
    /// Move to the next entry. `false` at the end of the journal.
    pub fn move_next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let rc = self.backend.next();
        self.moved(rc).map(|n| n > 0)
    }

    /// Move to the previous entry. `false` at the start of the journal.
    pub fn move_previous(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let rc = self.backend.previous();
        self.moved(rc).map(|n| n > 0)
    }

    /// Move forward up to `skip` entries and return how many were passed.
    ///
    /// A count below `skip` means the end was reached on the way.
    pub fn move_next_skip(&mut self, skip: u64) -> Result<u64> {
        self.ensure_open()?;
        let rc = self.backend.next_skip(skip);
        self.moved(rc).map(|n| n as u64)
    }

    /// Move backward up to `skip` entries and return how many were passed.
    pub fn move_previous_skip(&mut self, skip: u64) -> Result<u64> {
        self.ensure_open()?;
        let rc = self.backend.previous_skip(skip);
        self.moved(rc).map(|n| n as u64)
    }

    /// Move by a signed offset. Positive offsets skip forward; zero and
    /// negative offsets skip backward.
    pub fn move_by(&mut self, offset: i64) -> Result<u64> {
        if offset > 0 {
            self.move_next_skip(offset.unsigned_abs())
        } else {
            self.move_previous_skip(offset.unsigned_abs())
        }
    }

    /// Reposition the read cursor.
    ///
    /// A seek only marks a place in the journal; it does not select an
    /// entry. Call [`move_next`](Self::move_next) or
    /// [`move_previous`](Self::move_previous) before reading fields.
    #[instrument(level = "debug", skip(self))]
    pub fn seek(&mut self, target: SeekTarget) -> Result<()> {
        self.ensure_open()?;

        let rc = match &target {
            SeekTarget::Head => self.backend.seek_head(),
            SeekTarget::Tail => self.backend.seek_tail(),
            SeekTarget::Time(time) => {
                let seconds = Seconds::from_system_time(*time).ok_or_else(|| {
                    JournalError::InvalidArgument(format!("{:?} is out of range", time))
                })?;
                self.backend
                    .seek_realtime_usec(seconds.to_microseconds().get())
            }
            SeekTarget::RealtimeUsec(usec) => self.backend.seek_realtime_usec(usec.get()),
            SeekTarget::Cursor(cursor) => self.backend.seek_cursor(cursor.as_str()),
        };
        check(rc)?;

        self.state = JournalState::Unpositioned;
        Ok(())
    }

    /// Token of the current entry.
    pub fn cursor(&mut self) -> Result<CursorToken> {
        self.ensure_open()?;
        self.trace_unpositioned("cursor");
        self.backend
            .get_cursor()
            .map(CursorToken)
            .map_err(JournalError::from_code)
    }

    /// Whether the current entry is the one `cursor` names.
    pub fn cursor_matches(&mut self, cursor: &CursorToken) -> Result<bool> {
        self.ensure_open()?;
        self.trace_unpositioned("cursor_matches");
        check(self.backend.test_cursor(cursor.as_str())).map(|rc| rc > 0)
    }

    /// Bookkeeping after a movement primitive returned `rc`.
    fn moved(&mut self, rc: std::ffi::c_int) -> Result<std::ffi::c_int> {
        let rc = check(rc)?;
        if rc > 0 {
            self.state = JournalState::Positioned;
        }

        self.operations += 1;
        if self
            .options
            .auto_reopen
            .is_some_and(|every| self.operations >= every)
        {
            self.reopen()?;
        }
        Ok(rc)
    }

    /// Close and reopen the backend, restoring matches and position.
    #[instrument(level = "debug", skip(self), fields(operations = self.operations))]
    fn reopen(&mut self) -> Result<()> {
        let cursor = match self.backend.get_cursor() {
            Ok(cursor) => cursor,
            Err(code) => {
                warn!(
                    error = %JournalError::from_code(code),
                    "cannot capture position, postponing reopen"
                );
                self.operations = 0;
                return Ok(());
            }
        };

        self.backend.close();
        if let Err(err) = self.restore(&cursor) {
            warn!(error = %err, "reopen failed");
            self.state = JournalState::Failed;
            return Err(err);
        }

        self.operations = 0;
        debug!(filters = self.filters.len(), "reopened journal");
        Ok(())
    }

    fn restore(&mut self, cursor: &str) -> Result<()> {
        check(self.backend.open(&self.selector, self.options.flags))?;
        if let Some(size) = self.data_threshold {
            check(self.backend.set_data_threshold(size))?;
        }
        for term in &self.filters {
            apply_term(&mut self.backend, term)?;
        }
        check(self.backend.seek_cursor(cursor))?;
        check(self.backend.next_skip(0))?;
        Ok(())
    }
}
