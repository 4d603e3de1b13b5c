//! Decoded journal entries and catalog rendering.

use crate::backend::{Backend, Capabilities};
use crate::error::{JournalError, Result};
use crate::journal::Journal;
use journal_common::Microseconds;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::ops::Index;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

/// `@FIELD@` placeholders of a catalog template.
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"@([A-Za-z0-9_]+)@").expect("invalid regex"))
}

/// Split a `NAME=value` payload on its first `=`.
fn split_payload(payload: &[u8]) -> Option<(Cow<'_, str>, Cow<'_, str>)> {
    let pos = payload.iter().position(|&b| b == b'=')?;
    Some((
        String::from_utf8_lossy(&payload[..pos]),
        String::from_utf8_lossy(&payload[pos + 1..]),
    ))
}

/// One journal entry, decoded.
///
/// Fields keep the order in which the backend enumerated them; a name that
/// appears twice keeps its last value. Lookups by name ignore case. The typed
/// accessors (`message`, `priority`, ...) read only the canonical upper-case
/// field, so a differently cased field of the same name cannot replace them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    fields: Vec<(String, String)>,
    pub realtime_timestamp: Option<Microseconds>,
    pub monotonic_timestamp: Option<(Microseconds, Uuid)>,
}

impl Entry {
    /// Build an entry from `(name, value)` pairs.
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entry = Entry::default();
        for (name, value) in fields {
            entry.insert(name.into(), value.into());
        }
        entry
    }

    /// Build an entry from raw `NAME=value` payloads. Payloads without a
    /// separator are skipped.
    pub(crate) fn from_payloads<'a>(payloads: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut entry = Entry::default();
        for payload in payloads {
            if let Some((name, value)) = split_payload(payload) {
                entry.insert(name.into_owned(), value.into_owned());
            }
        }
        entry
    }

    fn insert(&mut self, name: String, value: String) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Value of a field, looked up without regard to case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn canonical(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn message(&self) -> Option<&str> {
        self.canonical("MESSAGE")
    }

    /// Syslog priority, 0 (emergency) to 7 (debug).
    pub fn priority(&self) -> Option<u8> {
        self.canonical("PRIORITY")?.trim().parse().ok()
    }

    pub fn message_id(&self) -> Option<Uuid> {
        Uuid::try_parse(self.canonical("MESSAGE_ID")?.trim()).ok()
    }

    /// Whether the entry refers to a catalog template.
    pub fn has_catalog(&self) -> bool {
        self.message_id().is_some()
    }

    /// Replace every `@FIELD@` placeholder of `template` with the value of
    /// that field. Placeholders naming absent fields are kept as they are.
    pub fn render_catalog(&self, template: &str) -> String {
        placeholder_regex()
            .replace_all(template, |caps: &Captures| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// `entry["MESSAGE"]`, same lookup as [`Entry::get`].
///
/// # Panics
///
/// Panics when the entry has no such field.
impl Index<&str> for Entry {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        match self.get(name) {
            Some(value) => value,
            None => panic!("entry has no field {:?}", name),
        }
    }
}

impl<'a> IntoIterator for &'a Entry {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl IntoIterator for Entry {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// How [`Journal::entry_catalog`] renders a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Substitute `@FIELD@` placeholders with the entry's values.
    pub replace: bool,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self { replace: true }
    }
}

impl<B: Backend> Journal<B> {
    /// Decode every field of the current entry.
    ///
    /// Valid only after a successful move; right after a seek the backend
    /// reports the missing position as an error.
    pub fn current_entry(&mut self) -> Result<Entry> {
        self.ensure_open()?;
        self.trace_unpositioned("current_entry");

        self.backend.restart_data();
        let mut entry = Entry::default();
        loop {
            match self.backend.enumerate_data() {
                Ok(Some(payload)) => match split_payload(payload) {
                    Some((name, value)) => entry.insert(name.into_owned(), value.into_owned()),
                    None => debug!(len = payload.len(), "skipping payload without separator"),
                },
                Ok(None) => break,
                Err(code) => return Err(JournalError::from_code(code)),
            }
        }

        let realtime = self
            .backend
            .get_realtime_usec()
            .map_err(JournalError::from_code)?;
        let (monotonic, boot_id) = self
            .backend
            .get_monotonic_usec()
            .map_err(JournalError::from_code)?;
        entry.realtime_timestamp = Some(Microseconds(realtime));
        entry.monotonic_timestamp = Some((Microseconds(monotonic), boot_id));

        Ok(entry)
    }

    /// Value of one field of the current entry; `None` when the entry does
    /// not carry it.
    pub fn read_field(&mut self, name: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        self.trace_unpositioned("read_field");

        let name = name.to_ascii_uppercase();
        match self.backend.get_data(&name) {
            Ok(payload) => Ok(split_payload(payload).map(|(_, value)| value.into_owned())),
            Err(code) if code == -libc::ENOENT => Ok(None),
            Err(code) => Err(JournalError::from_code(code)),
        }
    }

    /// Every distinct value stored for `field`, regardless of position and
    /// matches.
    pub fn query_unique(&mut self, field: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.require(Capabilities::QUERY_UNIQUE, "unique value queries")?;

        let field = field.to_ascii_uppercase();
        crate::error::check(self.backend.query_unique(&field))?;
        self.backend.restart_unique();

        let mut values = Vec::new();
        while let Some(payload) = self
            .backend
            .enumerate_unique()
            .map_err(JournalError::from_code)?
        {
            if let Some((_, value)) = split_payload(payload) {
                values.push(value.into_owned());
            }
        }
        Ok(values)
    }

    /// Catalog template registered for a message identifier.
    pub fn catalog_for(&mut self, message_id: &str) -> Result<String> {
        self.ensure_open()?;
        self.require(Capabilities::CATALOG, "catalog lookup")?;

        let id = Uuid::try_parse(message_id.trim()).map_err(|e| {
            JournalError::InvalidArgument(format!("message id {:?}: {}", message_id, e))
        })?;
        self.backend
            .get_catalog_for_message_id(id)
            .map_err(JournalError::from_code)
    }

    /// Catalog text of the current entry, rendered by the backend.
    pub fn current_catalog(&mut self) -> Result<String> {
        self.ensure_open()?;
        self.require(Capabilities::CATALOG, "catalog lookup")?;
        self.trace_unpositioned("current_catalog");

        self.backend.get_catalog().map_err(JournalError::from_code)
    }

    /// Catalog text of a decoded entry, `None` when it carries no message
    /// identifier or no template is registered for it.
    pub fn entry_catalog(
        &mut self,
        entry: &Entry,
        options: CatalogOptions,
    ) -> Result<Option<String>> {
        let Some(id) = entry.message_id() else {
            return Ok(None);
        };
        self.ensure_open()?;
        self.require(Capabilities::CATALOG, "catalog lookup")?;

        match self.backend.get_catalog_for_message_id(id) {
            Ok(template) if options.replace => Ok(Some(entry.render_catalog(&template))),
            Ok(template) => Ok(Some(template)),
            Err(code) if code == -libc::ENOENT => Ok(None),
            Err(code) => Err(JournalError::from_code(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let entry = Entry::new([("_PID", "100"), ("MESSAGE", "hello world")]);
        assert_eq!(entry.get("_pid"), Some("100"));
        assert_eq!(entry.get("_PID"), Some("100"));
        assert_eq!(entry.get("Message"), Some("hello world"));
        assert_eq!(entry.get("missing"), None);
    }

    #[test]
    fn test_repeated_field_keeps_last_value_and_order() {
        let entry = Entry::from_payloads([&b"A=1"[..], b"B=2", b"A=3", b"garbage"]);
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.field_names().collect::<Vec<_>>(), ["A", "B"]);
        assert_eq!(entry.get("A"), Some("3"));
    }

    #[test]
    fn test_value_keeps_later_separators() {
        let entry = Entry::from_payloads([&b"QUERY=a=b=c"[..]]);
        assert_eq!(entry.get("QUERY"), Some("a=b=c"));
    }

    #[test]
    fn test_typed_accessors() {
        let entry = Entry::new([
            ("MESSAGE", "disk full"),
            ("PRIORITY", "3"),
            ("MESSAGE_ID", "fc2e22bc6ee647b6b90729ab34a250b1"),
        ]);
        assert_eq!(entry.message(), Some("disk full"));
        assert_eq!(entry.priority(), Some(3));
        assert!(entry.has_catalog());

        let entry = Entry::new([("PRIORITY", "high"), ("MESSAGE_ID", "nope")]);
        assert_eq!(entry.priority(), None);
        assert!(!entry.has_catalog());
    }

    #[test]
    fn test_accessors_ignore_differently_cased_fields() {
        let entry = Entry::new([
            ("message", "shadow"),
            ("MESSAGE", "real"),
            ("priority", "7"),
            ("PRIORITY", "2"),
        ]);
        assert_eq!(entry.message(), Some("real"));
        assert_eq!(entry.priority(), Some(2));
        assert_eq!(entry.get("message"), Some("shadow"));

        let entry = Entry::new([("message", "lower only")]);
        assert_eq!(entry.message(), None);
        assert_eq!(entry.get("MESSAGE"), Some("lower only"));
    }

    #[test]
    fn test_index_by_name() {
        let entry = Entry::new([("_PID", "100")]);
        assert_eq!(&entry["_PID"], "100");
        assert_eq!(&entry["_pid"], "100");
    }

    #[test]
    #[should_panic(expected = "entry has no field")]
    fn test_index_missing_field_panics() {
        let entry = Entry::new([("_PID", "100")]);
        let _ = &entry["MESSAGE"];
    }

    #[test]
    fn test_render_catalog_leaves_unknown_placeholders() {
        let entry = Entry::new([("UNIT", "nginx.service"), ("RESULT", "failed")]);
        assert_eq!(
            entry.render_catalog("Unit @UNIT@ has @RESULT@, see @DOC_URL@. mail@host"),
            "Unit nginx.service has failed, see @DOC_URL@. mail@host"
        );
    }

    #[test]
    fn test_entry_iteration_follows_insertion_order() {
        let entry = Entry::new([("B", "2"), ("A", "1")]);
        let pairs: Vec<_> = (&entry).into_iter().collect();
        assert_eq!(pairs, [("B", "2"), ("A", "1")]);

        let owned: Vec<_> = entry.into_iter().collect();
        assert_eq!(owned[0], (String::from("B"), String::from("2")));
    }
}
