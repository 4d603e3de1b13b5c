//! In-process journal store.
//!
//! [`MemoryStore`] plays the external writer: it appends entries, rotates and
//! registers catalog templates. [`MemoryJournal`] is a [`Backend`] reading
//! from such a store with the same return-code conventions, sequencing rules
//! and change notifications a native journal library has. Several journals
//! may read one store concurrently, each with its own position and matches.

mod filter;
mod location;

use crate::backend::{
    Backend, Canceller, Capabilities, OpenFlags, OpenSelector, DEFAULT_DATA_THRESHOLD,
    WAIT_INFINITE, WAKE_APPEND, WAKE_INVALIDATE, WAKE_NOP,
};
use crate::entry::Entry;
use filter::{is_valid_field_name, LogicalOp, MatchFilter};
use journal_common::{format_id128, monotonic_now, Microseconds};
use location::{Direction, Location};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::ffi::c_int;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub(crate) seqnum: u64,
    pub(crate) realtime: u64,
    pub(crate) monotonic: u64,
    pub(crate) boot_id: Uuid,
    /// `NAME=value` payloads in the order they were written.
    pub(crate) fields: Vec<Vec<u8>>,
}

impl StoredEntry {
    fn field(&self, name: &str) -> Option<&[u8]> {
        let name = name.as_bytes();
        self.fields
            .iter()
            .rev()
            .find(|f| f.len() > name.len() && f.starts_with(name) && f[name.len()] == b'=')
            .map(Vec::as_slice)
    }
}

struct Store {
    seqnum_id: Uuid,
    boot_id: Uuid,
    entries: Vec<StoredEntry>,
    appends: u64,
    invalidations: u64,
    catalog: HashMap<Uuid, String>,
    watchers: Vec<(u64, UnixStream)>,
    next_watcher: u64,
}

impl Store {
    /// Poke every registered descriptor. A full socket buffer already
    /// signals readiness, so short writes are ignored.
    fn poke_watchers(&self) {
        for (_, stream) in &self.watchers {
            let _ = (&*stream).write(&[1]);
        }
    }
}

struct Shared {
    store: Mutex<Store>,
    changed: Condvar,
    opens: AtomicU64,
}

impl Shared {
    fn notify(&self, store: &Store) {
        self.changed.notify_all();
        store.poke_watchers();
    }
}

/// Writer side of an in-memory journal.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let boot_id = journal_common::boot_id().unwrap_or_else(|_| journal_common::random_id());
        let store = Store {
            seqnum_id: journal_common::random_id(),
            boot_id,
            entries: Vec::new(),
            appends: 0,
            invalidations: 0,
            catalog: HashMap::new(),
            watchers: Vec::new(),
            next_watcher: 0,
        };

        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                changed: Condvar::new(),
                opens: AtomicU64::new(0),
            }),
        }
    }

    /// Append an entry stamped with the current time. Returns its sequence
    /// number.
    pub fn append<I, K, V>(&self, fields: I) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        self.append_at(Microseconds::now(), fields)
    }

    /// Append an entry with an explicit realtime timestamp.
    ///
    /// Timestamps never go backwards: an entry older than its predecessor is
    /// stamped with the predecessor's time.
    pub fn append_at<I, K, V>(&self, realtime: Microseconds, fields: I) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, value)| {
                let mut payload = Vec::from(name.as_ref().as_bytes());
                payload.push(b'=');
                payload.extend_from_slice(value.as_ref());
                payload
            })
            .collect();
        let monotonic = monotonic_now().unwrap_or_default().get();

        let mut store = self.shared.store.lock();
        let seqnum = store.entries.last().map_or(1, |e| e.seqnum + 1);
        let realtime = store
            .entries
            .last()
            .map_or(realtime.get(), |e| e.realtime.max(realtime.get()));
        let boot_id = store.boot_id;
        store.entries.push(StoredEntry {
            seqnum,
            realtime,
            monotonic,
            boot_id,
            fields,
        });
        store.appends += 1;
        self.shared.notify(&store);

        seqnum
    }

    /// Signal that the set of journal files changed.
    pub fn rotate(&self) {
        let mut store = self.shared.store.lock();
        store.invalidations += 1;
        self.shared.notify(&store);
    }

    /// Register the catalog template of a message identifier.
    pub fn add_catalog(&self, message_id: Uuid, template: impl Into<String>) {
        self.shared
            .store
            .lock()
            .catalog
            .insert(message_id, template.into());
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times readers of this store were opened.
    pub fn open_count(&self) -> u64 {
        self.shared.opens.load(Ordering::Relaxed)
    }

    /// A new, unopened reader of this store.
    pub fn journal(&self) -> MemoryJournal {
        MemoryJournal {
            shared: Arc::clone(&self.shared),
            capabilities: Capabilities::all(),
            reliable_fd: true,
            cancelled: Arc::new(AtomicBool::new(false)),
            handle: None,
            seen: None,
        }
    }
}

/// Interrupts waits of one [`MemoryJournal`].
#[derive(Clone)]
pub struct MemoryCanceller {
    shared: Arc<Shared>,
    cancelled: Arc<AtomicBool>,
}

impl Canceller for MemoryCanceller {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let store = self.shared.store.lock();
        self.shared.notify(&store);
    }
}

struct Handle {
    location: Location,
    filter: MatchFilter,
    data_index: usize,
    unique: Vec<Vec<u8>>,
    unique_index: usize,
    threshold: usize,
    buffer: Vec<u8>,
    seen_appends: u64,
    seen_invalidations: u64,
    notifier: Option<(u64, UnixStream)>,
}

impl Handle {
    /// Copy a payload into the handle buffer, truncated to the threshold but
    /// never below its `NAME=` prefix.
    fn fill(&mut self, payload: &[u8]) -> &[u8] {
        let prefix = payload.iter().position(|&b| b == b'=').map_or(0, |p| p + 1);
        let len = payload.len().min(self.threshold.max(prefix));
        self.buffer.clear();
        self.buffer.extend_from_slice(&payload[..len]);
        &self.buffer
    }

    fn moved(&mut self, location: Location) {
        self.location = location;
        self.data_index = 0;
    }

    fn has_pending(&self, store: &Store) -> bool {
        store.invalidations != self.seen_invalidations || store.appends != self.seen_appends
    }

    /// Consume pending change notifications.
    fn wake_reason(&mut self, store: &Store) -> c_int {
        if store.invalidations != self.seen_invalidations {
            self.seen_invalidations = store.invalidations;
            self.seen_appends = store.appends;
            WAKE_INVALIDATE
        } else if store.appends != self.seen_appends {
            self.seen_appends = store.appends;
            WAKE_APPEND
        } else {
            WAKE_NOP
        }
    }
}

fn errno(err: std::io::Error) -> c_int {
    -err.raw_os_error().unwrap_or(libc::EIO)
}

struct CursorParts {
    seqnum_id: Option<Uuid>,
    seqnum: u64,
    realtime: Option<u64>,
}

fn format_cursor(seqnum_id: &Uuid, entry: &StoredEntry) -> String {
    format!(
        "s={};i={:x};b={};m={:x};t={:x}",
        format_id128(seqnum_id),
        entry.seqnum,
        format_id128(&entry.boot_id),
        entry.monotonic,
        entry.realtime
    )
}

fn parse_cursor(cursor: &str) -> Option<CursorParts> {
    let mut seqnum_id = None;
    let mut seqnum = None;
    let mut realtime = None;

    for item in cursor.split(';') {
        let (key, value) = item.split_once('=')?;
        match key {
            "s" => seqnum_id = Some(Uuid::try_parse(value).ok()?),
            "i" => seqnum = Some(u64::from_str_radix(value, 16).ok()?),
            "t" => realtime = Some(u64::from_str_radix(value, 16).ok()?),
            "b" | "m" | "x" => {}
            _ => return None,
        }
    }

    Some(CursorParts {
        seqnum_id,
        seqnum: seqnum?,
        realtime,
    })
}

/// Reader side of an in-memory journal.
pub struct MemoryJournal {
    shared: Arc<Shared>,
    capabilities: Capabilities,
    reliable_fd: bool,
    cancelled: Arc<AtomicBool>,
    handle: Option<Handle>,
    /// Change counters of the last closed handle, picked up by the next open.
    seen: Option<(u64, u64)>,
}

impl MemoryJournal {
    /// Restrict the optional operations this reader advertises.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Specifies whether waiting on the descriptor is reported as reliable.
    pub fn with_reliable_fd(mut self, reliable: bool) -> Self {
        self.reliable_fd = reliable;
        self
    }

    fn step(&mut self, direction: Direction) -> c_int {
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        let store = self.shared.store.lock();
        let expr = handle.filter.expression();
        let (location, advanced) = handle.location.step(&store.entries, expr.as_ref(), direction);
        handle.moved(location);
        c_int::from(advanced)
    }

    fn skip(&mut self, direction: Direction, skip: u64) -> c_int {
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        if skip > i32::MAX as u64 {
            return -libc::EINVAL;
        }
        let store = self.shared.store.lock();
        let expr = handle.filter.expression();
        let (location, moved) =
            handle
                .location
                .skip(&store.entries, expr.as_ref(), direction, skip);
        handle.moved(location);
        moved as c_int
    }

    fn seek(&mut self, location: Location) -> c_int {
        match self.handle.as_mut() {
            Some(handle) => {
                handle.moved(location);
                0
            }
            None => -libc::EBADF,
        }
    }

    /// Run `f` on the entry the handle is positioned on.
    fn with_current<T>(
        &mut self,
        f: impl FnOnce(&mut Handle, &Store, &StoredEntry) -> Result<T, c_int>,
    ) -> Result<T, c_int> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(-libc::EBADF);
        };
        let store = self.shared.store.lock();
        let index = handle.location.entry().ok_or(-libc::EADDRNOTAVAIL)?;
        let entry = store.entries.get(index).ok_or(-libc::EADDRNOTAVAIL)?;
        f(handle, &store, entry)
    }

    fn register_notifier(&mut self) -> Result<RawFd, c_int> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(-libc::EBADF);
        };
        if let Some((_, stream)) = &handle.notifier {
            return Ok(stream.as_raw_fd());
        }

        let (reader, writer) = UnixStream::pair().map_err(errno)?;
        reader.set_nonblocking(true).map_err(errno)?;
        writer.set_nonblocking(true).map_err(errno)?;

        // Changes that predate the descriptor must still make it readable.
        let mut store = self.shared.store.lock();
        if handle.has_pending(&store) || self.cancelled.load(Ordering::SeqCst) {
            let _ = (&writer).write(&[1]);
        }
        let id = store.next_watcher;
        store.next_watcher += 1;
        store.watchers.push((id, writer));

        let fd = reader.as_raw_fd();
        handle.notifier = Some((id, reader));
        Ok(fd)
    }
}

impl Backend for MemoryJournal {
    type Canceller = MemoryCanceller;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn canceller(&self) -> MemoryCanceller {
        MemoryCanceller {
            shared: Arc::clone(&self.shared),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn open(&mut self, selector: &OpenSelector, flags: OpenFlags) -> c_int {
        if let OpenSelector::Files(files) = selector {
            if files.is_empty() {
                return -libc::EINVAL;
            }
        }
        self.close();

        let store = self.shared.store.lock();
        let (seen_appends, seen_invalidations) =
            self.seen.unwrap_or((store.appends, store.invalidations));
        self.handle = Some(Handle {
            location: Location::Head,
            filter: MatchFilter::default(),
            data_index: 0,
            unique: Vec::new(),
            unique_index: 0,
            threshold: DEFAULT_DATA_THRESHOLD,
            buffer: Vec::new(),
            seen_appends,
            seen_invalidations,
            notifier: None,
        });
        drop(store);

        let opens = self.shared.opens.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(?selector, ?flags, opens, "opened in-memory journal");
        0
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.seen = Some((handle.seen_appends, handle.seen_invalidations));
        if let Some((id, _)) = handle.notifier {
            self.shared.store.lock().watchers.retain(|(w, _)| *w != id);
        }
    }

    fn next(&mut self) -> c_int {
        self.step(Direction::Forward)
    }

    fn previous(&mut self) -> c_int {
        self.step(Direction::Backward)
    }

    fn next_skip(&mut self, skip: u64) -> c_int {
        self.skip(Direction::Forward, skip)
    }

    fn previous_skip(&mut self, skip: u64) -> c_int {
        self.skip(Direction::Backward, skip)
    }

    fn seek_head(&mut self) -> c_int {
        self.seek(Location::Head)
    }

    fn seek_tail(&mut self) -> c_int {
        self.seek(Location::Tail)
    }

    fn seek_realtime_usec(&mut self, usec: u64) -> c_int {
        self.seek(Location::Realtime(usec))
    }

    fn seek_cursor(&mut self, cursor: &str) -> c_int {
        let Some(parts) = parse_cursor(cursor) else {
            return -libc::EINVAL;
        };
        let seqnum_id = self.shared.store.lock().seqnum_id;

        // A cursor of another store can only be honoured by its timestamp.
        let location = match (parts.seqnum_id, parts.realtime) {
            (Some(id), Some(usec)) if id != seqnum_id => Location::Realtime(usec),
            _ => Location::Seqnum(parts.seqnum),
        };
        self.seek(location)
    }

    fn get_cursor(&mut self) -> Result<String, c_int> {
        self.with_current(|_, store, entry| Ok(format_cursor(&store.seqnum_id, entry)))
    }

    fn test_cursor(&mut self, cursor: &str) -> c_int {
        let Some(parts) = parse_cursor(cursor) else {
            return -libc::EINVAL;
        };
        let same = self.with_current(|_, store, entry| {
            Ok(entry.seqnum == parts.seqnum
                && parts.seqnum_id.map_or(true, |id| id == store.seqnum_id))
        });
        match same {
            Ok(same) => c_int::from(same),
            Err(code) => code,
        }
    }

    fn get_realtime_usec(&mut self) -> Result<u64, c_int> {
        self.with_current(|_, _, entry| Ok(entry.realtime))
    }

    fn get_monotonic_usec(&mut self) -> Result<(u64, Uuid), c_int> {
        self.with_current(|_, _, entry| Ok((entry.monotonic, entry.boot_id)))
    }

    fn get_data(&mut self, field: &str) -> Result<&[u8], c_int> {
        if !is_valid_field_name(field.as_bytes()) {
            return Err(-libc::EINVAL);
        }
        self.with_current(|handle, _, entry| {
            let payload = entry.field(field).ok_or(-libc::ENOENT)?;
            handle.fill(payload);
            Ok(())
        })?;
        Ok(self.handle.as_ref().map_or(&[][..], |h| h.buffer.as_slice()))
    }

    fn restart_data(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.data_index = 0;
        }
    }

    fn enumerate_data(&mut self) -> Result<Option<&[u8]>, c_int> {
        let more = self.with_current(|handle, _, entry| {
            let Some(payload) = entry.fields.get(handle.data_index) else {
                return Ok(false);
            };
            handle.data_index += 1;
            handle.fill(payload);
            Ok(true)
        })?;
        Ok(self
            .handle
            .as_ref()
            .filter(|_| more)
            .map(|h| h.buffer.as_slice()))
    }

    fn query_unique(&mut self, field: &str) -> c_int {
        if !is_valid_field_name(field.as_bytes()) {
            return -libc::EINVAL;
        }
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        let store = self.shared.store.lock();
        let mut seen = HashSet::new();
        handle.unique = store
            .entries
            .iter()
            .filter_map(|e| e.field(field))
            .filter(|payload| seen.insert(*payload))
            .map(<[u8]>::to_vec)
            .collect();
        handle.unique_index = 0;
        0
    }

    fn restart_unique(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.unique_index = 0;
        }
    }

    fn enumerate_unique(&mut self) -> Result<Option<&[u8]>, c_int> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(-libc::EBADF);
        };
        let Some(payload) = handle.unique.get(handle.unique_index).cloned() else {
            return Ok(None);
        };
        handle.unique_index += 1;
        Ok(Some(handle.fill(&payload)))
    }

    fn add_match(&mut self, data: &[u8]) -> c_int {
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        match data.iter().position(|&b| b == b'=') {
            Some(pos) if is_valid_field_name(&data[..pos]) => {
                handle.filter.add_match(data);
                0
            }
            _ => -libc::EINVAL,
        }
    }

    fn add_conjunction(&mut self) -> c_int {
        match self.handle.as_mut() {
            Some(handle) => {
                handle.filter.set_operation(LogicalOp::Conjunction);
                0
            }
            None => -libc::EBADF,
        }
    }

    fn add_disjunction(&mut self) -> c_int {
        match self.handle.as_mut() {
            Some(handle) => {
                handle.filter.set_operation(LogicalOp::Disjunction);
                0
            }
            None => -libc::EBADF,
        }
    }

    fn flush_matches(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.filter.clear();
        }
    }

    fn wait(&mut self, timeout_usec: u64) -> c_int {
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        let deadline = (timeout_usec != WAIT_INFINITE)
            .then(|| Instant::now().checked_add(Duration::from_micros(timeout_usec)))
            .flatten();

        let mut store = self.shared.store.lock();
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return -libc::ECANCELED;
            }
            let reason = handle.wake_reason(&store);
            if reason != WAKE_NOP {
                return reason;
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.changed.wait_until(&mut store, deadline).timed_out() {
                        return handle.wake_reason(&store);
                    }
                }
                None if timeout_usec == WAIT_INFINITE => self.shared.changed.wait(&mut store),
                // Unrepresentable deadline: wait in bounded slices.
                None => {
                    self.shared
                        .changed
                        .wait_for(&mut store, Duration::from_secs(3600));
                }
            }
        }
    }

    fn get_fd(&mut self) -> Result<RawFd, c_int> {
        self.register_notifier()
    }

    fn process(&mut self) -> c_int {
        let Some(handle) = self.handle.as_mut() else {
            return -libc::EBADF;
        };
        if let Some((_, stream)) = &handle.notifier {
            let mut buf = [0u8; 64];
            loop {
                match (&*stream).read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return errno(e),
                }
            }
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return -libc::ECANCELED;
        }
        let store = self.shared.store.lock();
        handle.wake_reason(&store)
    }

    fn reliable_fd(&mut self) -> c_int {
        c_int::from(self.reliable_fd)
    }

    fn get_usage(&mut self) -> Result<u64, c_int> {
        if self.handle.is_none() {
            return Err(-libc::EBADF);
        }
        let store = self.shared.store.lock();
        Ok(store
            .entries
            .iter()
            .flat_map(|e| e.fields.iter())
            .map(|f| f.len() as u64)
            .sum())
    }

    fn get_data_threshold(&mut self) -> Result<usize, c_int> {
        self.handle
            .as_ref()
            .map(|h| h.threshold)
            .ok_or(-libc::EBADF)
    }

    fn set_data_threshold(&mut self, size: usize) -> c_int {
        match self.handle.as_mut() {
            Some(handle) => {
                // Zero lifts the limit.
                handle.threshold = if size == 0 { usize::MAX } else { size };
                0
            }
            None => -libc::EBADF,
        }
    }

    fn get_catalog(&mut self) -> Result<String, c_int> {
        self.with_current(|_, store, entry| {
            let message_id = entry
                .field("MESSAGE_ID")
                .and_then(|payload| std::str::from_utf8(&payload[b"MESSAGE_ID=".len()..]).ok())
                .and_then(|id| Uuid::try_parse(id.trim()).ok())
                .ok_or(-libc::ENOENT)?;
            let template = store.catalog.get(&message_id).ok_or(-libc::ENOENT)?;
            let entry = Entry::from_payloads(entry.fields.iter().map(Vec::as_slice));
            Ok(entry.render_catalog(template))
        })
    }

    fn get_catalog_for_message_id(&mut self, id: Uuid) -> Result<String, c_int> {
        if self.handle.is_none() {
            return Err(-libc::EBADF);
        }
        self.shared
            .store
            .lock()
            .catalog
            .get(&id)
            .cloned()
            .ok_or(-libc::ENOENT)
    }
}

impl Drop for MemoryJournal {
    fn drop(&mut self) {
        self.close();
    }
}
