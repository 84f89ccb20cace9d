//! Service descriptor loading and persistence
//!
//! A descriptor is a YAML file named `<id>.yml`:
//!
//! ```yaml
//! name: Web Server
//! description: Serves the front page
//! start: /usr/bin/webd
//! user: www
//! group: www
//! needs:
//!   - db
//! enabled: true
//! ```

use serde::{Deserialize, Deserializer};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File extension recognised as a service descriptor
pub const DESCRIPTOR_EXTENSION: &str = "yml";

/// Parsed service definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Stable identifier (descriptor file stem)
    pub id: String,
    /// Display name, defaults to the id
    pub name: String,
    pub description: String,
    /// Executable launched with no arguments; may be empty for a
    /// descriptor that only groups dependencies
    pub start_command: String,
    pub run_as_user: String,
    pub run_as_group: String,
    /// Ids that must be started first, in declaration order
    pub dependencies: Vec<String>,
    pub enabled: bool,
    /// Backing descriptor file
    pub path: PathBuf,
}

/// On-disk shape of a descriptor
#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    name: Option<String>,
    description: Option<String>,
    start: Option<String>,
    user: Option<String>,
    group: Option<String>,
    #[serde(default)]
    needs: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    enabled: Option<bool>,
}

/// Accept YAML 1.1 style booleans (`yes`, `off`, ...) next to plain ones
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Word(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(value)) => Ok(Some(value)),
        Some(Flag::Word(word)) => parse_flag(&word)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid boolean: {}", word))),
    }
}

fn parse_flag(word: &str) -> Option<bool> {
    match word.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => Some(true),
        "n" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

impl ServiceDefinition {
    /// Build a definition for `id` from descriptor text
    pub fn parse(id: &str, content: &str, path: &Path) -> Result<Self, DescriptorError> {
        let raw: Descriptor = serde_yaml::from_str(content)?;

        Ok(Self {
            id: id.to_string(),
            name: raw.name.unwrap_or_else(|| id.to_string()),
            description: raw.description.unwrap_or_default(),
            start_command: raw.start.unwrap_or_default(),
            run_as_user: raw.user.unwrap_or_else(|| "root".into()),
            run_as_group: raw.group.unwrap_or_else(|| "root".into()),
            dependencies: raw.needs,
            enabled: raw.enabled.unwrap_or(true),
            path: path.to_path_buf(),
        })
    }

    /// Name plus description, as shown in progress lines
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.description)
        }
    }
}

/// Derive a service id from a descriptor path (`/etc/.../web.yml` -> `web`)
pub fn service_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Load a service definition from a descriptor file
pub fn load_definition(path: &Path) -> Result<ServiceDefinition, DescriptorError> {
    let id = service_id(path).ok_or_else(|| DescriptorError::BadName(path.to_path_buf()))?;
    let content = fs::read_to_string(path)?;
    ServiceDefinition::parse(&id, &content, path)
}

/// Rewrite the `enabled` key of a descriptor, leaving other keys untouched
///
/// The new content goes to a sibling temp file which is synced and then
/// renamed over the descriptor, so a crash leaves either the old or the new
/// file in place.
pub fn persist_enabled(path: &Path, enabled: bool) -> Result<(), DescriptorError> {
    let content = fs::read_to_string(path)?;
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&content)?;

    let mapping = doc
        .as_mapping_mut()
        .ok_or_else(|| DescriptorError::NotAMapping(path.to_path_buf()))?;
    mapping.insert("enabled".into(), enabled.into());

    let rendered = serde_yaml::to_string(&doc)?;
    let tmp = temp_path(path);

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(rendered.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(DescriptorError::from)
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", file_name))
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Descriptor {} is not a mapping", .0.display())]
    NotAMapping(PathBuf),

    #[error("Cannot derive a service id from {}", .0.display())]
    BadName(PathBuf),
}
