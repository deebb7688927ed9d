use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

pub mod pipeline;
pub mod sanitize;
pub mod validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    File,
    App,
    Domain,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::App => "app",
            EntityType::Domain => "domain",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(EntityType::File),
            "app" => Ok(EntityType::App),
            "domain" => Ok(EntityType::Domain),
            other => Err(anyhow!("unknown entity type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "coding")]
    Coding,
    #[serde(rename = "building")]
    Building,
    #[serde(rename = "indexing")]
    Indexing,
    #[serde(rename = "debugging")]
    Debugging,
    #[serde(rename = "browsing")]
    Browsing,
    #[serde(rename = "running tests")]
    RunningTests,
    #[serde(rename = "writing tests")]
    WritingTests,
    #[serde(rename = "manual testing")]
    ManualTesting,
    #[serde(rename = "writing docs")]
    WritingDocs,
    #[serde(rename = "code reviewing")]
    CodeReviewing,
    #[serde(rename = "designing")]
    Designing,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::Building => "building",
            Category::Indexing => "indexing",
            Category::Debugging => "debugging",
            Category::Browsing => "browsing",
            Category::RunningTests => "running tests",
            Category::WritingTests => "writing tests",
            Category::ManualTesting => "manual testing",
            Category::WritingDocs => "writing docs",
            Category::CodeReviewing => "code reviewing",
            Category::Designing => "designing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coding" => Ok(Category::Coding),
            "building" => Ok(Category::Building),
            "indexing" => Ok(Category::Indexing),
            "debugging" => Ok(Category::Debugging),
            "browsing" => Ok(Category::Browsing),
            "running tests" => Ok(Category::RunningTests),
            "writing tests" => Ok(Category::WritingTests),
            "manual testing" => Ok(Category::ManualTesting),
            "writing docs" => Ok(Category::WritingDocs),
            "code reviewing" => Ok(Category::CodeReviewing),
            "designing" => Ok(Category::Designing),
            other => Err(anyhow!("unknown category '{other}'")),
        }
    }
}

/// One observed coding-activity event, normalized for transmission.
///
/// `entity` and `time` are fixed at construction; the optional fields are
/// each filled exactly once by the pipeline stage responsible for them,
/// unless a configured override supplies them up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub category: Category,
    pub time: f64,
    #[serde(default)]
    pub is_write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<i64>,
    #[serde(rename = "cursorpos", default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<i64>,
    #[serde(default)]
    pub user_agent: String,
}

impl Heartbeat {
    /// Stable identity string used for per-record reporting.
    pub fn id(&self) -> String {
        format!(
            "{:.6}-{}-{}-{}",
            self.time, self.entity_type, self.category, self.entity
        )
    }
}

/// Where file-reading detectors take their content from: the heartbeat's
/// own entity path, or a caller-supplied local file standing in for a
/// transient/virtual entity (e.g. stdin-piped editor buffers).
///
/// Selected once at pipeline construction, not re-decided per call.
#[derive(Debug, Clone)]
pub enum FileSource {
    Entity,
    LocalFile(PathBuf),
}

impl FileSource {
    pub fn from_local_file(local_file: Option<PathBuf>) -> Self {
        match local_file {
            Some(path) => FileSource::LocalFile(path),
            None => FileSource::Entity,
        }
    }

    pub fn resolve(&self, heartbeat: &Heartbeat) -> PathBuf {
        match self {
            FileSource::Entity => PathBuf::from(&heartbeat.entity),
            FileSource::LocalFile(path) => path.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_heartbeat(entity: &str) -> Heartbeat {
    Heartbeat {
        entity: entity.to_string(),
        entity_type: EntityType::File,
        category: Category::Coding,
        time: 1_585_598_059.1,
        is_write: false,
        language: None,
        dependencies: Vec::new(),
        project: None,
        branch: None,
        lines: None,
        cursor_position: None,
        user_agent: "kadence/0.1.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_id_includes_time_type_category_entity() {
        let hb = test_heartbeat("/tmp/main.swift");
        assert_eq!(hb.id(), "1585598059.100000-file-coding-/tmp/main.swift");
    }

    #[test]
    fn heartbeat_serializes_wire_field_names() {
        let mut hb = test_heartbeat("/tmp/main.swift");
        hb.cursor_position = Some(12);
        let value = serde_json::to_value(&hb).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["category"], "coding");
        assert_eq!(value["cursorpos"], 12);
        assert!(value.get("language").is_none());
        assert!(value.get("dependencies").is_none());
    }

    #[test]
    fn category_round_trips_spaced_names() {
        let category: Category = "code reviewing".parse().unwrap();
        assert_eq!(category, Category::CodeReviewing);
        assert_eq!(category.to_string(), "code reviewing");
    }

    #[test]
    fn file_source_prefers_local_file_override() {
        let hb = test_heartbeat("/virtual/stdin");
        let source = FileSource::from_local_file(Some(PathBuf::from("/tmp/real.swift")));
        assert_eq!(source.resolve(&hb), PathBuf::from("/tmp/real.swift"));

        let source = FileSource::from_local_file(None);
        assert_eq!(source.resolve(&hb), PathBuf::from("/virtual/stdin"));
    }
}
