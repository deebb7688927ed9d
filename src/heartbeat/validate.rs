use anyhow::{Context, Result};
use log::debug;
use regex::Regex;

use crate::heartbeat::pipeline::Stage;
use crate::heartbeat::Heartbeat;

/// Inclusion/exclusion rules applied to fully-enriched heartbeats.
///
/// Patterns are regular expressions matched (unanchored) against the
/// entity. A heartbeat is kept iff it matches at least one include
/// pattern (when any are configured), matches no exclude pattern, and
/// satisfies the project-presence rules.
#[derive(Debug, Default)]
pub struct ValidateConfig {
    pub exclude: Vec<Regex>,
    pub include: Vec<Regex>,
    pub exclude_unknown_project: bool,
    pub include_only_with_project_file: bool,
}

impl ValidateConfig {
    /// Compiles the raw pattern lists. Invalid patterns are configuration
    /// errors and surface before the pipeline runs.
    pub fn compile(
        exclude: &[String],
        include: &[String],
        exclude_unknown_project: bool,
        include_only_with_project_file: bool,
    ) -> Result<Self> {
        Ok(Self {
            exclude: compile_patterns(exclude).context("invalid exclude pattern")?,
            include: compile_patterns(include).context("invalid include pattern")?,
            exclude_unknown_project,
            include_only_with_project_file,
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|raw| Regex::new(raw).with_context(|| format!("failed to compile '{raw}'")))
        .collect()
}

pub fn stage(config: ValidateConfig) -> Stage {
    Stage::new("validate", move |batch: Vec<Heartbeat>| {
        Ok(batch
            .into_iter()
            .filter(|hb| {
                let keep = qualifies(hb, &config);
                if !keep {
                    debug!("heartbeat {} filtered out", hb.id());
                }
                keep
            })
            .collect())
    })
}

fn qualifies(heartbeat: &Heartbeat, config: &ValidateConfig) -> bool {
    let has_project = heartbeat
        .project
        .as_deref()
        .is_some_and(|p| !p.is_empty());

    if config.exclude_unknown_project && !has_project {
        return false;
    }

    if config.include_only_with_project_file && !has_project {
        return false;
    }

    if config.exclude.iter().any(|re| re.is_match(&heartbeat.entity)) {
        return false;
    }

    if !config.include.is_empty()
        && !config.include.iter().any(|re| re.is_match(&heartbeat.entity))
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::test_heartbeat;

    fn config(exclude: &[&str], include: &[&str]) -> ValidateConfig {
        ValidateConfig::compile(
            &exclude.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &include.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            false,
            false,
        )
        .unwrap()
    }

    #[test]
    fn keeps_everything_with_no_patterns() {
        assert!(qualifies(&test_heartbeat("/tmp/any.rs"), &config(&[], &[])));
    }

    #[test]
    fn exclude_pattern_drops_matches() {
        let cfg = config(&["/node_modules/"], &[]);
        assert!(!qualifies(
            &test_heartbeat("/app/node_modules/lodash/index.js"),
            &cfg
        ));
        assert!(qualifies(&test_heartbeat("/app/src/index.js"), &cfg));
    }

    #[test]
    fn include_patterns_require_a_match() {
        let cfg = config(&[], &[r"\.swift$"]);
        assert!(qualifies(&test_heartbeat("/tmp/main.swift"), &cfg));
        assert!(!qualifies(&test_heartbeat("/tmp/main.rs"), &cfg));
    }

    #[test]
    fn exclude_wins_over_include() {
        let cfg = config(&["generated"], &[r"\.swift$"]);
        assert!(!qualifies(&test_heartbeat("/tmp/generated/api.swift"), &cfg));
    }

    #[test]
    fn exclude_unknown_project_drops_empty_project() {
        let cfg = ValidateConfig::compile(&[], &[], true, false).unwrap();
        assert!(!qualifies(&test_heartbeat("/tmp/main.swift"), &cfg));

        let mut hb = test_heartbeat("/tmp/main.swift");
        hb.project = Some("kadence".to_string());
        assert!(qualifies(&hb, &cfg));
    }

    #[test]
    fn include_only_with_project_file_requires_project() {
        let cfg = ValidateConfig::compile(&[], &[], false, true).unwrap();
        let mut hb = test_heartbeat("/tmp/main.swift");
        assert!(!qualifies(&hb, &cfg));
        hb.project = Some("kadence".to_string());
        assert!(qualifies(&hb, &cfg));
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let err = ValidateConfig::compile(&["(unclosed".to_string()], &[], false, false)
            .unwrap_err();
        assert!(err.to_string().contains("exclude"));
    }

    // Adding an exclude pattern can only shrink the accepted set; adding
    // a first include pattern can only shrink or preserve it.
    #[test]
    fn pattern_growth_is_monotonic() {
        let entities = [
            "/tmp/a.swift",
            "/tmp/b.rs",
            "/app/node_modules/c.js",
            "/app/src/d.js",
        ];

        let base = config(&[], &[]);
        let with_exclude = config(&["node_modules"], &[]);
        let with_include = config(&[], &[r"\.(swift|js)$"]);

        for entity in entities {
            let hb = test_heartbeat(entity);
            if qualifies(&hb, &with_exclude) {
                assert!(qualifies(&hb, &base));
            }
            if qualifies(&hb, &with_include) {
                assert!(qualifies(&hb, &base));
            }
        }
    }
}
