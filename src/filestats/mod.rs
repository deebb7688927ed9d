use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::{EntityType, FileSource, Heartbeat};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub local_file: Option<PathBuf>,
}

/// Fills `lines` for file entities. A missing file is a miss, not an
/// error; an unreadable file aborts the invocation.
pub fn detection_stage(config: Config) -> Stage {
    let source = FileSource::from_local_file(config.local_file);
    Stage::new("filestats", move |mut batch: Vec<Heartbeat>| {
        for hb in &mut batch {
            if hb.entity_type != EntityType::File || hb.lines.is_some() {
                continue;
            }

            let path = source.resolve(hb);
            if !path.is_file() {
                continue;
            }

            hb.lines = Some(count_lines(&path)?);
        }
        Ok(batch)
    })
}

fn count_lines(path: &Path) -> Result<i64> {
    let raw = fs::read(path)
        .with_context(|| format!("failed to read file stats from {}", path.display()))?;
    Ok(String::from_utf8_lossy(&raw).lines().count() as i64)
}
