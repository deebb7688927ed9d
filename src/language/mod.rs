use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::{EntityType, FileSource, Heartbeat};

/// Languages this tool can name on a heartbeat. Detection is by file
/// extension; the dependency parsers key off this enum as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Css,
    Go,
    Html,
    Java,
    JavaScript,
    Json,
    Kotlin,
    Markdown,
    ObjectiveC,
    Php,
    Python,
    Ruby,
    Rust,
    Shell,
    Swift,
    TypeScript,
    Yaml,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Css => "CSS",
            Language::Go => "Go",
            Language::Html => "HTML",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
            Language::Json => "JSON",
            Language::Kotlin => "Kotlin",
            Language::Markdown => "Markdown",
            Language::ObjectiveC => "Objective-C",
            Language::Php => "PHP",
            Language::Python => "Python",
            Language::Ruby => "Ruby",
            Language::Rust => "Rust",
            Language::Shell => "Shell",
            Language::Swift => "Swift",
            Language::TypeScript => "TypeScript",
            Language::Yaml => "YAML",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "c" | "h" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "hpp" | "hh" => Some(Language::Cpp),
            "css" => Some(Language::Css),
            "go" => Some(Language::Go),
            "html" | "htm" => Some(Language::Html),
            "java" => Some(Language::Java),
            "js" | "jsx" | "mjs" => Some(Language::JavaScript),
            "json" => Some(Language::Json),
            "kt" | "kts" => Some(Language::Kotlin),
            "md" | "markdown" => Some(Language::Markdown),
            "m" | "mm" => Some(Language::ObjectiveC),
            "php" => Some(Language::Php),
            "py" | "pyw" | "pyi" => Some(Language::Python),
            "rb" => Some(Language::Ruby),
            "rs" => Some(Language::Rust),
            "sh" | "bash" | "zsh" => Some(Language::Shell),
            "swift" => Some(Language::Swift),
            "ts" | "tsx" => Some(Language::TypeScript),
            "yml" | "yaml" => Some(Language::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "c++" | "cpp" => Ok(Language::Cpp),
            "css" => Ok(Language::Css),
            "go" => Ok(Language::Go),
            "html" => Ok(Language::Html),
            "java" => Ok(Language::Java),
            "javascript" => Ok(Language::JavaScript),
            "json" => Ok(Language::Json),
            "kotlin" => Ok(Language::Kotlin),
            "markdown" => Ok(Language::Markdown),
            "objective-c" | "objc" => Ok(Language::ObjectiveC),
            "php" => Ok(Language::Php),
            "python" => Ok(Language::Python),
            "ruby" => Ok(Language::Ruby),
            "rust" => Ok(Language::Rust),
            "shell" | "bash" => Ok(Language::Shell),
            "swift" => Ok(Language::Swift),
            "typescript" => Ok(Language::TypeScript),
            "yaml" => Ok(Language::Yaml),
            other => Err(anyhow::anyhow!("unsupported language '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Always wins, even over caller-supplied values.
    pub overwrite: Option<String>,
    /// Fallback when detection finds nothing.
    pub alternative: Option<String>,
    pub local_file: Option<PathBuf>,
}

/// Fills `language` from the file extension. Pure path inspection with
/// no file I/O, so this stage never errors.
pub fn detection_stage(config: Config) -> Stage {
    let source = FileSource::from_local_file(config.local_file.clone());
    Stage::new("language", move |mut batch: Vec<Heartbeat>| {
        for hb in &mut batch {
            detect(hb, &config, &source);
        }
        Ok(batch)
    })
}

fn detect(heartbeat: &mut Heartbeat, config: &Config, source: &FileSource) {
    if let Some(overwrite) = &config.overwrite {
        heartbeat.language = Some(overwrite.clone());
        return;
    }

    if heartbeat.language.is_none() && heartbeat.entity_type == EntityType::File {
        heartbeat.language =
            Language::from_path(&source.resolve(heartbeat)).map(|lang| lang.to_string());
    }

    if heartbeat.language.is_none() {
        heartbeat.language = config.alternative.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::test_heartbeat;

    #[test]
    fn detects_from_entity_extension() {
        let mut hb = test_heartbeat("/tmp/project/main.swift");
        detect(&mut hb, &Config::default(), &FileSource::Entity);
        assert_eq!(hb.language.as_deref(), Some("Swift"));
    }

    #[test]
    fn local_file_extension_wins_for_virtual_entities() {
        let mut hb = test_heartbeat("untitled-buffer");
        let source = FileSource::LocalFile(PathBuf::from("/tmp/buffer-copy.rs"));
        detect(&mut hb, &Config::default(), &source);
        assert_eq!(hb.language.as_deref(), Some("Rust"));
    }

    #[test]
    fn overwrite_beats_detection_and_existing_value() {
        let mut hb = test_heartbeat("/tmp/main.swift");
        hb.language = Some("Rust".to_string());
        let config = Config {
            overwrite: Some("Python".to_string()),
            ..Default::default()
        };
        detect(&mut hb, &config, &FileSource::Entity);
        assert_eq!(hb.language.as_deref(), Some("Python"));
    }

    #[test]
    fn alternative_fills_only_on_miss() {
        let config = Config {
            alternative: Some("Swift".to_string()),
            ..Default::default()
        };

        let mut unknown = test_heartbeat("/tmp/main.xyz");
        detect(&mut unknown, &config, &FileSource::Entity);
        assert_eq!(unknown.language.as_deref(), Some("Swift"));

        let mut known = test_heartbeat("/tmp/main.go");
        detect(&mut known, &config, &FileSource::Entity);
        assert_eq!(known.language.as_deref(), Some("Go"));
    }

    #[test]
    fn existing_language_is_not_overwritten_by_detection() {
        let mut hb = test_heartbeat("/tmp/main.swift");
        hb.language = Some("Objective-C".to_string());
        detect(&mut hb, &Config::default(), &FileSource::Entity);
        assert_eq!(hb.language.as_deref(), Some("Objective-C"));
    }

    #[test]
    fn parses_wire_names_case_insensitively() {
        assert_eq!("swift".parse::<Language>().unwrap(), Language::Swift);
        assert_eq!("Objective-C".parse::<Language>().unwrap(), Language::ObjectiveC);
        assert!("klingon".parse::<Language>().is_err());
    }
}
