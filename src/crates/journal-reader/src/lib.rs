//! Read-cursor engine over an append-only journal store
//!
//! This crate drives a journal owned by an independent writer through a small
//! set of backend primitives ([`Backend`]) and turns them into a typed
//! reader: positional navigation, match filters, change notification, and
//! entry decoding with catalog substitution. Long-lived readers periodically
//! close and reopen the backend to bound native resource growth; position
//! and filters survive the reopen.
//!
//! ## Usage
//!
//! ```no_run
//! use journal_reader::{Journal, MatchGroup, MemoryStore, OpenOptions, SeekTarget, WaitMode};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.append([("MESSAGE", "service started"), ("PRIORITY", "6")]);
//!
//! let mut journal = Journal::open(store.journal(), OpenOptions::default())?;
//! journal.filter(&[MatchGroup::new().with("priority", 6)])?;
//!
//! // A seek only marks a place; move before reading.
//! journal.seek(SeekTarget::Head)?;
//! while journal.move_next()? {
//!     let entry = journal.current_entry()?;
//!     println!("{}", entry.message().unwrap_or_default());
//! }
//!
//! if let Some(reason) = journal.wait(Some(Duration::from_secs(1)), WaitMode::Blocking)? {
//!     println!("journal changed: {:?}", reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod entry;
pub mod error;
pub mod filter;
pub mod journal;
pub mod memory;
pub mod navigation;
pub mod options;
pub mod wait;

pub use backend::{Backend, Canceller, Capabilities, OpenFlags, OpenSelector};
pub use entry::{CatalogOptions, Entry};
pub use error::{JournalError, Result};
pub use filter::{FilterTerm, MatchGroup};
pub use journal::{Entries, Journal, JournalState};
pub use memory::{MemoryCanceller, MemoryJournal, MemoryStore};
pub use navigation::{CursorToken, SeekTarget};
pub use options::{Config, OpenOptions};
pub use wait::{CloseHandle, WaitMode, WakeReason};
