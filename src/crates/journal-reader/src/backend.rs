//! Capability interface of the external journal store.
//!
//! The engine never touches storage directly; it drives an implementation of
//! [`Backend`] through the same primitive operations a native journal library
//! exposes. Status primitives return a raw `c_int` following the native
//! convention:
//!
//! - negative: failure, the value is `-errno`
//! - zero: boundary reached, nothing to enumerate, or no change
//! - positive: success (a count, a flag, or a wake reason)
//!
//! Primitives producing a value return `Result<T, c_int>` with the same
//! negative code in the error position. Buffers handed out by the backend are
//! borrowed for the duration of the call and their lengths are native `usize`
//! values, so every size exchanged with the store uses the platform width of
//! `size_t`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::ffi::c_int;
use std::os::fd::RawFd;
use std::path::PathBuf;

/// Wake reason: the wait timed out without changes.
pub const WAKE_NOP: c_int = 0;
/// Wake reason: entries were appended.
pub const WAKE_APPEND: c_int = 1;
/// Wake reason: journal files were added, removed or rotated.
pub const WAKE_INVALIDATE: c_int = 2;

/// Timeout value meaning "wait forever".
pub const WAIT_INFINITE: u64 = u64::MAX;

/// Default size above which the backend truncates field payloads.
pub const DEFAULT_DATA_THRESHOLD: usize = 64 * 1024;

bitflags! {
    /// Optional operations a backend may provide.
    ///
    /// Reported once by [`Backend::capabilities`] and consulted by the
    /// engine before each optional call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Capabilities: u32 {
        const OPEN_DIRECTORY = 1 << 0;
        const OPEN_FILES = 1 << 1;
        const OPEN_NAMESPACE = 1 << 2;
        const QUERY_UNIQUE = 1 << 3;
        const CATALOG = 1 << 4;
        const WAIT_FD = 1 << 5;
        const DATA_THRESHOLD = 1 << 6;
        const DISK_USAGE = 1 << 7;
    }
}

bitflags! {
    /// Flags selecting which journal files a default or namespace open
    /// includes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
    pub struct OpenFlags: u32 {
        /// Only files generated on the local machine.
        const LOCAL_ONLY = 1 << 0;
        /// Only non-persistent files.
        const RUNTIME_ONLY = 1 << 1;
        /// Only kernel and system service files.
        const SYSTEM = 1 << 2;
        /// Only files of the current user.
        const CURRENT_USER = 1 << 3;
        /// Paths are relative to an OS root directory.
        const OS_ROOT = 1 << 4;
        /// Include every namespace.
        const ALL_NAMESPACES = 1 << 5;
        /// Include the default namespace next to the requested one.
        const INCLUDE_DEFAULT_NAMESPACE = 1 << 6;
    }
}

/// Which part of the store a handle opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSelector {
    /// Every journal visible to the current user.
    Default,
    /// The journal files living in one directory.
    Directory(PathBuf),
    /// An explicit list of journal files.
    Files(Vec<PathBuf>),
    /// The journal of a namespace (container).
    Namespace(String),
}

impl OpenSelector {
    /// The capability needed to open this selector, if any.
    pub fn required_capability(&self) -> Option<(Capabilities, &'static str)> {
        match self {
            OpenSelector::Default => None,
            OpenSelector::Directory(_) => {
                Some((Capabilities::OPEN_DIRECTORY, "opening a journal directory"))
            }
            OpenSelector::Files(_) => Some((Capabilities::OPEN_FILES, "opening journal files")),
            OpenSelector::Namespace(_) => {
                Some((Capabilities::OPEN_NAMESPACE, "opening a journal namespace"))
            }
        }
    }
}

/// Interrupts a blocked [`Backend::wait`] from another thread.
pub trait Canceller: Clone + Send + Sync + 'static {
    /// Make a pending or future wait return promptly with an error.
    fn cancel(&self);
}

/// Backends that cannot be interrupted use the unit canceller.
impl Canceller for () {
    fn cancel(&self) {}
}

/// Primitive operation set of a journal store.
///
/// A backend is a reusable adapter: `open` creates a native handle, `close`
/// releases it, and the engine may cycle through both several times over its
/// lifetime. The engine owns the backend exclusively and calls `close` before
/// dropping it.
pub trait Backend: Send {
    type Canceller: Canceller;

    /// Optional operations supported by this backend.
    fn capabilities(&self) -> Capabilities;

    /// A handle able to interrupt waits on this backend from another thread.
    fn canceller(&self) -> Self::Canceller;

    fn open(&mut self, selector: &OpenSelector, flags: OpenFlags) -> c_int;

    /// Release the native handle. Safe on a closed or never opened backend.
    fn close(&mut self);

    fn next(&mut self) -> c_int;
    fn previous(&mut self) -> c_int;
    fn next_skip(&mut self, skip: u64) -> c_int;
    fn previous_skip(&mut self, skip: u64) -> c_int;

    fn seek_head(&mut self) -> c_int;
    fn seek_tail(&mut self) -> c_int;
    fn seek_realtime_usec(&mut self, usec: u64) -> c_int;
    fn seek_cursor(&mut self, cursor: &str) -> c_int;

    fn get_cursor(&mut self) -> Result<String, c_int>;
    /// Positive when the current entry is the one `cursor` names.
    fn test_cursor(&mut self, cursor: &str) -> c_int;

    fn get_realtime_usec(&mut self) -> Result<u64, c_int>;
    /// Monotonic timestamp of the current entry and the boot it belongs to.
    fn get_monotonic_usec(&mut self) -> Result<(u64, uuid::Uuid), c_int>;

    /// The raw `NAME=value` payload of one field of the current entry.
    /// `-ENOENT` when the entry lacks the field.
    fn get_data(&mut self, field: &str) -> Result<&[u8], c_int>;
    fn restart_data(&mut self);
    /// Next `NAME=value` payload of the current entry, `None` once drained.
    fn enumerate_data(&mut self) -> Result<Option<&[u8]>, c_int>;

    fn query_unique(&mut self, field: &str) -> c_int;
    fn restart_unique(&mut self);
    fn enumerate_unique(&mut self) -> Result<Option<&[u8]>, c_int>;

    fn add_match(&mut self, data: &[u8]) -> c_int;
    fn add_conjunction(&mut self) -> c_int;
    fn add_disjunction(&mut self) -> c_int;
    fn flush_matches(&mut self);

    /// Block for up to `timeout_usec` ([`WAIT_INFINITE`] for no limit) and
    /// return a wake reason.
    fn wait(&mut self, timeout_usec: u64) -> c_int;
    /// A descriptor that becomes readable when the journal changes.
    fn get_fd(&mut self) -> Result<RawFd, c_int>;
    /// Acknowledge a wakeup signalled on the descriptor; returns a wake
    /// reason.
    fn process(&mut self) -> c_int;
    /// Positive when waiting on the descriptor never misses a change.
    fn reliable_fd(&mut self) -> c_int;

    fn get_usage(&mut self) -> Result<u64, c_int>;
    fn get_data_threshold(&mut self) -> Result<usize, c_int>;
    fn set_data_threshold(&mut self, size: usize) -> c_int;

    /// Catalog text for the current entry, placeholders already resolved.
    fn get_catalog(&mut self) -> Result<String, c_int>;
    /// Catalog template registered for a message identifier.
    fn get_catalog_for_message_id(&mut self, id: uuid::Uuid) -> Result<String, c_int>;
}
