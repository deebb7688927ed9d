//! Dependency extraction: per-grammar state machines over a tokenized
//! view of the source file. The set of grammars is closed and compiled
//! in; files in languages without a parser are simply skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::debug;

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::{EntityType, FileSource, Heartbeat};
use crate::language::Language;

pub mod swift;
pub mod tokenizer;

use tokenizer::Tokenizer;

/// Sources larger than this are skipped rather than tokenized.
const MAX_SOURCE_SIZE: u64 = 512_000;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub local_file: Option<PathBuf>,
}

/// Fills `dependencies` for file entities whose detected language has a
/// compiled-in parser. A missing file or unsupported language is a miss;
/// an unreadable file or tokenizer failure aborts the invocation.
pub fn detection_stage(config: Config) -> Stage {
    let source = FileSource::from_local_file(config.local_file);
    Stage::new("deps", move |mut batch: Vec<Heartbeat>| {
        for hb in &mut batch {
            if hb.entity_type != EntityType::File || !hb.dependencies.is_empty() {
                continue;
            }

            let Some(language) = hb
                .language
                .as_deref()
                .and_then(|name| Language::from_str(name).ok())
            else {
                continue;
            };

            let path = source.resolve(hb);
            if !path.is_file() {
                continue;
            }

            if let Some(deps) = parse_file(&path, language)? {
                hb.dependencies = deps;
            }
        }
        Ok(batch)
    })
}

/// Runs the parser registered for `language` over the file, or returns
/// `None` when the language has no parser or the file is oversized.
fn parse_file(path: &Path, language: Language) -> Result<Option<Vec<String>>> {
    if language != Language::Swift {
        return Ok(None);
    }

    let size = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    if size > MAX_SOURCE_SIZE {
        debug!(
            "skipping dependency scan of {} ({size} bytes exceeds limit)",
            path.display()
        );
        return Ok(None);
    }

    let raw =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let content = String::from_utf8_lossy(&raw);

    let mut parser = swift::SwiftParser::new();
    let deps = parser
        .parse(&content, &Tokenizer::swift())
        .with_context(|| format!("failed to parse dependencies from {}", path.display()))?;
    Ok(Some(deps))
}
