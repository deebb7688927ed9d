use std::path::Path;

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::{EntityType, Heartbeat};

/// Placeholder written over redacted fields. A constant marker (rather
/// than a hash) keeps sanitization idempotent and matches what the
/// collector expects for obfuscated records.
pub const HIDDEN: &str = "HIDDEN";

#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeConfig {
    pub hide_branch_names: bool,
    pub hide_file_names: bool,
    pub hide_project_names: bool,
}

pub fn stage(config: SanitizeConfig) -> Stage {
    Stage::new("sanitize", move |batch| {
        Ok(batch
            .into_iter()
            .map(|hb| sanitize(hb, &config))
            .collect())
    })
}

/// Redacts the configured fields. Irreversible: this runs before the
/// detectors, and the fill-once rule stops them from re-deriving a value
/// the placeholder already occupies.
///
/// File-name hiding keeps the extension (`HIDDEN.swift`) so
/// extension-based language detection still works, and clears any
/// caller-supplied dependencies, line count and cursor position derived
/// from the original file.
pub fn sanitize(mut heartbeat: Heartbeat, config: &SanitizeConfig) -> Heartbeat {
    if config.hide_branch_names {
        heartbeat.branch = Some(HIDDEN.to_string());
    }

    if config.hide_project_names {
        heartbeat.project = Some(HIDDEN.to_string());
    }

    if config.hide_file_names && heartbeat.entity_type == EntityType::File {
        heartbeat.entity = hide_file_name(&heartbeat.entity);
        heartbeat.dependencies.clear();
        heartbeat.lines = None;
        heartbeat.cursor_position = None;
    }

    heartbeat
}

fn hide_file_name(entity: &str) -> String {
    match Path::new(entity).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{HIDDEN}.{ext}"),
        None => HIDDEN.to_string(),
    }
}
