use std::path::PathBuf;

use clap::Parser;

use crate::api::DEFAULT_TIMEOUT_SECS;
use crate::heartbeat::{Category, EntityType};

/// Flags map 1:1 onto the pipeline configuration. Exit code is 0 when
/// the batch was fully sent or safely queued, non-zero on configuration
/// errors, stage failures, or per-record rejections.
#[derive(Parser, Debug)]
#[command(
    name = "kadence",
    version,
    about = "Records one batch of coding activity and delivers it to the collector"
)]
pub struct Args {
    /// File path (or app/domain identifier) the activity happened in.
    #[arg(long)]
    pub entity: String,

    #[arg(long, default_value = "file")]
    pub entity_type: EntityType,

    #[arg(long, default_value = "coding")]
    pub category: Category,

    /// Seconds since the epoch; defaults to now.
    #[arg(long)]
    pub time: Option<f64>,

    /// Marks the event as a file write.
    #[arg(long)]
    pub write: bool,

    /// API key; falls back to the settings file.
    #[arg(long)]
    pub key: Option<String>,

    #[arg(long)]
    pub api_url: Option<String>,

    /// Machine name sent alongside each batch.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Extra CA certificate bundle (PEM) to trust.
    #[arg(long)]
    pub ssl_certs_file: Option<PathBuf>,

    /// Network timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Editor plugin identifier, appended to the user agent.
    #[arg(long)]
    pub plugin: Option<String>,

    /// Language override; always wins over detection.
    #[arg(long)]
    pub language: Option<String>,

    /// Language fallback when detection finds nothing.
    #[arg(long)]
    pub alternate_language: Option<String>,

    /// Project override; always wins over detection.
    #[arg(long)]
    pub project: Option<String>,

    /// Project fallback when detection finds nothing.
    #[arg(long)]
    pub alternate_project: Option<String>,

    /// Real file to analyze when the entity is a transient path.
    #[arg(long)]
    pub local_file: Option<PathBuf>,

    #[arg(long)]
    pub hide_branch_names: bool,

    #[arg(long)]
    pub hide_file_names: bool,

    #[arg(long)]
    pub hide_project_names: bool,

    /// Regex; heartbeats whose entity matches are dropped. Repeatable.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Regex; when given, only matching entities are kept. Repeatable.
    #[arg(long)]
    pub include: Vec<String>,

    /// Drop heartbeats with no detected project.
    #[arg(long)]
    pub exclude_unknown_project: bool,

    /// Keep only heartbeats that resolved a project.
    #[arg(long)]
    pub include_only_with_project_file: bool,

    /// Read additional heartbeats as a JSON array on stdin.
    #[arg(long)]
    pub extra_heartbeats: bool,

    /// Offline queue database location.
    #[arg(long)]
    pub offline_queue_file: Option<PathBuf>,

    /// Settings file location.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation_parses_with_defaults() {
        let args = Args::parse_from(["kadence", "--entity", "/tmp/main.swift"]);
        assert_eq!(args.entity, "/tmp/main.swift");
        assert_eq!(args.entity_type, EntityType::File);
        assert_eq!(args.category, Category::Coding);
        assert_eq!(args.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(!args.write);
    }

    #[test]
    fn spaced_category_names_parse() {
        let args = Args::parse_from([
            "kadence",
            "--entity",
            "/tmp/review.swift",
            "--category",
            "code reviewing",
        ]);
        assert_eq!(args.category, Category::CodeReviewing);
    }

    #[test]
    fn repeatable_patterns_accumulate() {
        let args = Args::parse_from([
            "kadence",
            "--entity",
            "/tmp/main.swift",
            "--exclude",
            "node_modules",
            "--exclude",
            r"\.generated\.",
            "--include",
            r"\.swift$",
        ]);
        assert_eq!(args.exclude.len(), 2);
        assert_eq!(args.include.len(), 1);
    }

    #[test]
    fn missing_entity_is_a_usage_error() {
        assert!(Args::try_parse_from(["kadence"]).is_err());
    }
}
