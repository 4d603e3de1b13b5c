//! Shared helpers for the integration tests.

#![allow(dead_code)]

use journal_reader::{Backend, Capabilities, OpenFlags, OpenSelector};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::c_int;
use std::os::fd::RawFd;
use std::sync::Arc;

/// Return values and recorded calls of a [`ScriptedBackend`].
pub struct Script {
    /// Every primitive invoked, in order.
    pub calls: Vec<String>,
    /// Results of the movement primitives. When empty, single moves succeed
    /// and skips move the full distance.
    pub moves: VecDeque<c_int>,
    /// Results of `open`; `0` once drained.
    pub opens: VecDeque<c_int>,
    pub cursor: Result<String, c_int>,
    /// Payloads handed out by the field enumeration.
    pub fields: Vec<String>,
    /// Error returned by field access instead of the payloads.
    pub fields_error: Option<c_int>,
    /// Results of `wait` and `process`; `0` once drained.
    pub waits: VecDeque<c_int>,
    pub match_result: c_int,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            moves: VecDeque::new(),
            opens: VecDeque::new(),
            cursor: Ok(String::from("s=0;i=1")),
            fields: Vec::new(),
            fields_error: None,
            waits: VecDeque::new(),
            match_result: 0,
        }
    }
}

/// Backend returning scripted status codes and recording every call.
pub struct ScriptedBackend {
    pub script: Arc<Mutex<Script>>,
    capabilities: Capabilities,
    buffer: Vec<u8>,
    data_index: usize,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        let backend = Self {
            script: Arc::clone(&script),
            capabilities: Capabilities::all(),
            buffer: Vec::new(),
            data_index: 0,
        };
        (backend, script)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.script.lock().calls.push(call.into());
    }

    fn movement(&self, call: String, default: c_int) -> c_int {
        let mut script = self.script.lock();
        script.calls.push(call);
        script.moves.pop_front().unwrap_or(default)
    }
}

/// Calls recorded since the last drain.
pub fn drain_calls(script: &Arc<Mutex<Script>>) -> Vec<String> {
    std::mem::take(&mut script.lock().calls)
}

impl Backend for ScriptedBackend {
    type Canceller = ();

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn canceller(&self) {}

    fn open(&mut self, _selector: &OpenSelector, _flags: OpenFlags) -> c_int {
        let mut script = self.script.lock();
        script.calls.push(String::from("open"));
        script.opens.pop_front().unwrap_or(0)
    }

    fn close(&mut self) {
        self.record("close");
    }

    fn next(&mut self) -> c_int {
        self.movement(String::from("next"), 1)
    }

    fn previous(&mut self) -> c_int {
        self.movement(String::from("previous"), 1)
    }

    fn next_skip(&mut self, skip: u64) -> c_int {
        self.movement(format!("next_skip({})", skip), skip as c_int)
    }

    fn previous_skip(&mut self, skip: u64) -> c_int {
        self.movement(format!("previous_skip({})", skip), skip as c_int)
    }

    fn seek_head(&mut self) -> c_int {
        self.record("seek_head");
        0
    }

    fn seek_tail(&mut self) -> c_int {
        self.record("seek_tail");
        0
    }

    fn seek_realtime_usec(&mut self, usec: u64) -> c_int {
        self.record(format!("seek_realtime({})", usec));
        0
    }

    fn seek_cursor(&mut self, cursor: &str) -> c_int {
        self.record(format!("seek_cursor({})", cursor));
        0
    }

    fn get_cursor(&mut self) -> Result<String, c_int> {
        self.record("get_cursor");
        self.script.lock().cursor.clone()
    }

    fn test_cursor(&mut self, cursor: &str) -> c_int {
        self.record(format!("test_cursor({})", cursor));
        let script = self.script.lock();
        match &script.cursor {
            Ok(current) => c_int::from(current == cursor),
            Err(code) => *code,
        }
    }

    fn get_realtime_usec(&mut self) -> Result<u64, c_int> {
        Ok(1_700_000_000_000_000)
    }

    fn get_monotonic_usec(&mut self) -> Result<(u64, uuid::Uuid), c_int> {
        Ok((42, uuid::Uuid::nil()))
    }

    fn get_data(&mut self, field: &str) -> Result<&[u8], c_int> {
        self.record(format!("get_data({})", field));
        let script = self.script.lock();
        if let Some(code) = script.fields_error {
            return Err(code);
        }
        let prefix = format!("{}=", field);
        let payload = script
            .fields
            .iter()
            .rev()
            .find(|f| f.starts_with(&prefix))
            .ok_or(-libc::ENOENT)?;
        self.buffer = payload.clone().into_bytes();
        drop(script);
        Ok(&self.buffer)
    }

    fn restart_data(&mut self) {
        self.record("restart_data");
        self.data_index = 0;
    }

    fn enumerate_data(&mut self) -> Result<Option<&[u8]>, c_int> {
        let script = self.script.lock();
        if let Some(code) = script.fields_error {
            return Err(code);
        }
        let Some(payload) = script.fields.get(self.data_index) else {
            return Ok(None);
        };
        self.buffer = payload.clone().into_bytes();
        self.data_index += 1;
        drop(script);
        Ok(Some(&self.buffer))
    }

    fn query_unique(&mut self, field: &str) -> c_int {
        self.record(format!("query_unique({})", field));
        0
    }

    fn restart_unique(&mut self) {}

    fn enumerate_unique(&mut self) -> Result<Option<&[u8]>, c_int> {
        Ok(None)
    }

    fn add_match(&mut self, data: &[u8]) -> c_int {
        self.record(format!("add_match({})", String::from_utf8_lossy(data)));
        self.script.lock().match_result
    }

    fn add_conjunction(&mut self) -> c_int {
        self.record("add_conjunction");
        0
    }

    fn add_disjunction(&mut self) -> c_int {
        self.record("add_disjunction");
        0
    }

    fn flush_matches(&mut self) {
        self.record("flush_matches");
    }

    fn wait(&mut self, timeout_usec: u64) -> c_int {
        let mut script = self.script.lock();
        script.calls.push(format!("wait({})", timeout_usec));
        script.waits.pop_front().unwrap_or(0)
    }

    fn get_fd(&mut self) -> Result<RawFd, c_int> {
        Err(-libc::ENOSYS)
    }

    fn process(&mut self) -> c_int {
        self.script.lock().waits.pop_front().unwrap_or(0)
    }

    fn reliable_fd(&mut self) -> c_int {
        0
    }

    fn get_usage(&mut self) -> Result<u64, c_int> {
        Ok(4096)
    }

    fn get_data_threshold(&mut self) -> Result<usize, c_int> {
        Ok(65536)
    }

    fn set_data_threshold(&mut self, size: usize) -> c_int {
        self.record(format!("set_data_threshold({})", size));
        0
    }

    fn get_catalog(&mut self) -> Result<String, c_int> {
        Err(-libc::ENOENT)
    }

    fn get_catalog_for_message_id(&mut self, _id: uuid::Uuid) -> Result<String, c_int> {
        Err(-libc::ENOENT)
    }
}

/// Install a test subscriber so engine logs show up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
