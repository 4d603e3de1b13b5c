//! Open options and YAML configuration.

use crate::backend::{OpenFlags, OpenSelector};
use crate::error::{JournalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of navigation calls between two reopens of the backend handle.
pub const DEFAULT_AUTO_REOPEN: u64 = 10_000;

fn default_auto_reopen() -> Option<u64> {
    Some(DEFAULT_AUTO_REOPEN)
}

/// How a [`Journal`](crate::Journal) opens its backend.
///
/// At most one of `path`, `files` and `namespace` may be set; with none of
/// them the default journal is opened. The options are kept by the engine for
/// the whole lifetime of the reader, since every automatic reopen goes through
/// them again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenOptions {
    #[serde(default)]
    pub flags: OpenFlags,

    /// Directory holding the journal files to open.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Explicit list of journal files to open.
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,

    /// Journal namespace (container) to open.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Reopen the backend after this many navigation calls; `None` never
    /// reopens.
    #[serde(default = "default_auto_reopen")]
    pub auto_reopen: Option<u64>,

    /// Payload size above which the backend truncates field data. Applied
    /// right after opening when set.
    #[serde(default)]
    pub data_threshold: Option<usize>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::empty(),
            path: None,
            files: None,
            namespace: None,
            auto_reopen: default_auto_reopen(),
            data_threshold: None,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Open the journal files of a directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Open an explicit set of journal files.
    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    /// Open the journal of a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Specifies the reopen threshold, `None` to disable reopening.
    pub fn with_auto_reopen(mut self, every: Option<u64>) -> Self {
        self.auto_reopen = every;
        self
    }

    pub fn with_data_threshold(mut self, size: usize) -> Self {
        self.data_threshold = Some(size);
        self
    }

    /// Resolve the selector fields into a single open selector.
    pub fn selector(&self) -> Result<OpenSelector> {
        let mut selected = Vec::with_capacity(1);
        if let Some(path) = &self.path {
            selected.push(OpenSelector::Directory(path.clone()));
        }
        if let Some(files) = &self.files {
            selected.push(OpenSelector::Files(files.clone()));
        }
        if let Some(namespace) = &self.namespace {
            selected.push(OpenSelector::Namespace(namespace.clone()));
        }

        if selected.len() > 1 {
            return Err(JournalError::Config(String::from(
                "path, files and namespace are mutually exclusive",
            )));
        }

        Ok(selected.pop().unwrap_or(OpenSelector::Default))
    }

    /// Check the options for contradictions before they reach the backend.
    pub fn validate(&self) -> Result<()> {
        let selector = self.selector()?;

        if let OpenSelector::Files(files) = &selector {
            if files.is_empty() {
                return Err(JournalError::Config(String::from(
                    "files must contain at least one path",
                )));
            }
        }

        if self.auto_reopen == Some(0) {
            return Err(JournalError::Config(String::from(
                "auto_reopen must be greater than 0 (use null to disable)",
            )));
        }

        if self.data_threshold == Some(0) {
            return Err(JournalError::Config(String::from(
                "data_threshold must be greater than 0",
            )));
        }

        Ok(())
    }
}

/// File configuration of a journal reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub journal: OpenOptions,
}

impl Config {
    /// Load and validate a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents).map_err(|e| match e {
            JournalError::Config(msg) => {
                JournalError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|e| JournalError::Config(e.to_string()))?;
        config.journal.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_open_default_journal() {
        let options = OpenOptions::default();
        assert_eq!(options.selector().unwrap(), OpenSelector::Default);
        assert_eq!(options.auto_reopen, Some(DEFAULT_AUTO_REOPEN));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_conflicting_selectors_are_rejected() {
        let options = OpenOptions::new()
            .with_path("/var/log/journal")
            .with_namespace("web");
        assert!(matches!(options.selector(), Err(JournalError::Config(_))));
        assert!(matches!(options.validate(), Err(JournalError::Config(_))));
    }

    #[test]
    fn test_single_selector_is_resolved() {
        let options = OpenOptions::new().with_files(["/tmp/a.journal", "/tmp/b.journal"]);
        assert_eq!(
            options.selector().unwrap(),
            OpenSelector::Files(vec![
                PathBuf::from("/tmp/a.journal"),
                PathBuf::from("/tmp/b.journal")
            ])
        );
    }

    #[test]
    fn test_zero_thresholds_are_rejected() {
        let options = OpenOptions::new().with_auto_reopen(Some(0));
        assert!(options.validate().is_err());

        let options = OpenOptions::new().with_data_threshold(0);
        assert!(options.validate().is_err());

        let options = OpenOptions::new().with_files(Vec::<PathBuf>::new());
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_yaml_defaults_and_overrides() {
        let config = Config::from_yaml_str("journal:\n  namespace: web\n").unwrap();
        assert_eq!(config.journal.namespace.as_deref(), Some("web"));
        assert_eq!(config.journal.auto_reopen, Some(DEFAULT_AUTO_REOPEN));

        let config = Config::from_yaml_str("journal:\n  auto_reopen: null\n").unwrap();
        assert_eq!(config.journal.auto_reopen, None);

        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_yaml_unknown_fields_are_rejected() {
        let err = Config::from_yaml_str("journal:\n  cursor_cache: 12\n").unwrap_err();
        assert!(matches!(err, JournalError::Config(_)));
    }
}
