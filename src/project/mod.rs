use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::{EntityType, FileSource, Heartbeat};

/// Marker file searched upward from the entity. First line is the
/// project name; an optional second line pins the branch.
pub const PROJECT_FILE: &str = ".kadence-project";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Always wins, even over caller-supplied values.
    pub overwrite: Option<String>,
    /// Fallback when detection finds nothing.
    pub alternative: Option<String>,
    pub local_file: Option<PathBuf>,
}

/// Fills `project` and `branch` for file entities: marker file first,
/// then git, then the configured alternative. Detection misses are fine;
/// the heartbeat simply ships without a project.
pub fn detection_stage(config: Config) -> Stage {
    let source = FileSource::from_local_file(config.local_file.clone());
    Stage::new("project", move |mut batch: Vec<Heartbeat>| {
        for hb in &mut batch {
            detect(hb, &config, &source);
        }
        Ok(batch)
    })
}

fn detect(heartbeat: &mut Heartbeat, config: &Config, source: &FileSource) {
    if let Some(overwrite) = &config.overwrite {
        heartbeat.project = Some(overwrite.clone());
    }

    if heartbeat.entity_type == EntityType::File
        && (heartbeat.project.is_none() || heartbeat.branch.is_none())
    {
        let path = source.resolve(heartbeat);

        if let Some(marker) = find_project_file(&path) {
            if heartbeat.project.is_none() {
                heartbeat.project = marker.project;
            }
            if heartbeat.branch.is_none() {
                heartbeat.branch = marker.branch;
            }
        }

        if heartbeat.project.is_none() || heartbeat.branch.is_none() {
            if let Some(git) = find_git(&path) {
                if heartbeat.project.is_none() {
                    heartbeat.project = Some(git.project);
                }
                if heartbeat.branch.is_none() {
                    heartbeat.branch = git.branch;
                }
            }
        }
    }

    if heartbeat.project.is_none() {
        heartbeat.project = config.alternative.clone();
    }
}

struct MarkerFile {
    project: Option<String>,
    branch: Option<String>,
}

fn find_project_file(start: &Path) -> Option<MarkerFile> {
    for dir in ancestors_of(start) {
        let candidate = dir.join(PROJECT_FILE);
        if !candidate.is_file() {
            continue;
        }

        let contents = match fs::read_to_string(&candidate) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("failed to read {}: {err}", candidate.display());
                return None;
            }
        };

        let mut lines = contents.lines();
        let project = lines
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string);
        let branch = lines
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string);
        return Some(MarkerFile { project, branch });
    }

    None
}

struct GitInfo {
    project: String,
    branch: Option<String>,
}

/// Minimal git inspection: the repository directory name is the project,
/// the `HEAD` ref name is the branch. Detached heads yield no branch.
fn find_git(start: &Path) -> Option<GitInfo> {
    for dir in ancestors_of(start) {
        let dot_git = dir.join(".git");

        let git_dir = if dot_git.is_dir() {
            dot_git
        } else if dot_git.is_file() {
            // Worktree/submodule: `.git` is a pointer file.
            let contents = fs::read_to_string(&dot_git).ok()?;
            let target = contents.strip_prefix("gitdir:")?.trim();
            dir.join(target)
        } else {
            continue;
        };

        let project = dir.file_name()?.to_string_lossy().to_string();
        let branch = read_head_branch(&git_dir.join("HEAD"));
        return Some(GitInfo { project, branch });
    }

    None
}

fn read_head_branch(head: &Path) -> Option<String> {
    let contents = fs::read_to_string(head).ok()?;
    let reference = contents.trim().strip_prefix("ref:")?.trim();
    let branch = reference
        .strip_prefix("refs/heads/")
        .unwrap_or(reference);
    if branch.is_empty() {
        None
    } else {
        Some(branch.to_string())
    }
}

fn ancestors_of(path: &Path) -> impl Iterator<Item = &Path> {
    // For a file path, start at its directory.
    let start = if path.extension().is_some() || path.is_file() {
        path.parent().unwrap_or(path)
    } else {
        path
    };
    start.ancestors()
}
