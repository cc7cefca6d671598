//! Mapping table: which logical control a key drives and how
//!
//! Loaded from a YAML mapping file:
//!
//! ```yaml
//! settings:
//!   takeover_threshold: 3.0
//! controls:
//!   - { group: "[Channel1]", item: jog, status: 0xB0, control: 0x10, options: [rot64] }
//! outputs:
//!   - { group: "[Channel1]", item: play, status: 0x90, control: 0x3B, min: 0.5, max: 1.0 }
//! ```

pub mod key;
pub mod options;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::conditioning::EngineSettings;
use crate::feedback::FeedbackSpec;

pub use key::MidiKey;
pub use options::MidiOptions;

/// Errors raised while building a mapping table
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mapping: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("key {key} is mapped to both {first} and {second}")]
    DuplicateKey {
        key: MidiKey,
        first: ControlName,
        second: ControlName,
    },
}

/// Logical control addressed by a mapping (`[Channel1]`, `volume`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlName {
    pub group: String,
    pub item: String,
}

impl ControlName {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for ControlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.item)
    }
}

/// Input mapping as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMapping {
    #[serde(flatten)]
    pub name: ControlName,
    pub status: u8,
    pub control: u8,
    #[serde(default)]
    pub options: MidiOptions,
}

impl ControlMapping {
    pub fn key(&self) -> MidiKey {
        MidiKey::new(self.status, self.control)
    }
}

/// Output mapping as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMapping {
    #[serde(flatten)]
    pub name: ControlName,
    #[serde(flatten)]
    pub spec: FeedbackSpec,
}

/// Mapping file root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingFile {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub controls: Vec<ControlMapping>,
    #[serde(default)]
    pub outputs: Vec<OutputMapping>,
}

/// What one key resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub name: ControlName,
    pub options: MidiOptions,
}

/// What changed between two mapping tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDiff {
    pub added: Vec<MidiKey>,
    pub removed: Vec<MidiKey>,
    /// Bound in both, but to another control or with other options
    pub changed: Vec<MidiKey>,
    pub settings_changed: bool,
    pub outputs_changed: bool,
}

impl MappingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && !self.settings_changed
            && !self.outputs_changed
    }
}

impl fmt::Display for MappingDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} changed",
            self.added.len(),
            self.removed.len(),
            self.changed.len()
        )?;
        if self.settings_changed {
            write!(f, ", settings changed")?;
        }
        if self.outputs_changed {
            write!(f, ", outputs changed")?;
        }
        Ok(())
    }
}

/// Lookup table from key to mapping entry
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    settings: EngineSettings,
    entries: HashMap<MidiKey, MappingEntry>,
    outputs: HashMap<ControlName, Vec<FeedbackSpec>>,
}

impl MappingTable {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Build from a parsed mapping file
    pub fn from_file(file: MappingFile) -> Result<Self, MappingError> {
        file.settings
            .validate()
            .map_err(MappingError::InvalidSettings)?;

        let mut table = Self::new(file.settings);
        for mapping in file.controls {
            table.insert(mapping.key(), mapping.name, mapping.options)?;
        }
        for output in file.outputs {
            table.add_output(output.name, output.spec);
        }
        Ok(table)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, MappingError> {
        let file: MappingFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file)
    }

    /// Load a mapping file from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| MappingError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let table = Self::from_yaml(&yaml)?;
        info!(
            "Loaded {} input and {} output mappings from {}",
            table.entries.len(),
            table.outputs.values().map(Vec::len).sum::<usize>(),
            path.display()
        );
        Ok(table)
    }

    /// Bind a key. A key can only be bound once per table.
    pub fn insert(
        &mut self,
        key: MidiKey,
        name: ControlName,
        options: MidiOptions,
    ) -> Result<(), MappingError> {
        if let Some(existing) = self.entries.get(&key) {
            return Err(MappingError::DuplicateKey {
                key,
                first: existing.name.clone(),
                second: name,
            });
        }
        self.entries.insert(key, MappingEntry { name, options });
        Ok(())
    }

    pub fn add_output(&mut self, name: ControlName, spec: FeedbackSpec) {
        self.outputs.entry(name).or_default().push(spec);
    }

    pub fn get(&self, key: &MidiKey) -> Option<&MappingEntry> {
        self.entries.get(key)
    }

    /// Keys bound to a logical control, in key order
    pub fn keys_for(&self, name: &ControlName) -> Vec<MidiKey> {
        let mut keys: Vec<MidiKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.name == *name)
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Feedback outputs driven by a logical control
    pub fn outputs_for(&self, name: &ControlName) -> &[FeedbackSpec] {
        self.outputs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Compare against a newer table. Key lists come back sorted.
    pub fn diff(&self, newer: &MappingTable) -> MappingDiff {
        let mut diff = MappingDiff {
            settings_changed: self.settings != newer.settings,
            outputs_changed: self.outputs != newer.outputs,
            ..Default::default()
        };
        for (key, entry) in &newer.entries {
            match self.entries.get(key) {
                None => diff.added.push(*key),
                Some(old) if old != entry => diff.changed.push(*key),
                Some(_) => {}
            }
        }
        diff.removed = self
            .entries
            .keys()
            .filter(|key| !newer.entries.contains_key(key))
            .copied()
            .collect();

        diff.added.sort();
        diff.removed.sort();
        diff.changed.sort();
        diff
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
