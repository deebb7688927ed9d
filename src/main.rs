use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};

use kadence::api::{self, Client, Options, DEFAULT_API_URL};
use kadence::cli::Args;
use kadence::heartbeat::pipeline::Pipeline;
use kadence::heartbeat::{sanitize, validate, Heartbeat};
use kadence::offline::{Delivery, Dispatcher, Queue};
use kadence::settings::SettingsStore;
use kadence::{deps, filestats, language, offline, project};

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match run(args) {
        Ok(delivery) if delivery.rejected > 0 => {
            warn!(
                "{} heartbeat(s) rejected by the collector and requeued",
                delivery.rejected
            );
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<Delivery> {
    let settings_path = match &args.config_file {
        Some(path) => path.clone(),
        None => SettingsStore::default_path()?,
    };
    let store = SettingsStore::load(settings_path)?;

    let api_key = args
        .key
        .clone()
        .or_else(|| store.settings().api_key.clone())
        .ok_or_else(|| {
            anyhow!(
                "missing API key: pass --key or set api_key in {}",
                store.path().display()
            )
        })?;

    let api_url = args
        .api_url
        .clone()
        .or_else(|| store.settings().api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let client = Client::new(
        &api_url,
        Options {
            api_key,
            hostname: args.hostname.clone(),
            plugin: args.plugin.clone(),
            timeout: Duration::from_secs(args.timeout),
            ssl_cert_path: args.ssl_certs_file.clone(),
        },
    )?;

    let queue_path = match &args.offline_queue_file {
        Some(path) => path.clone(),
        None => offline::default_queue_path()?,
    };
    let queue = Queue::open(&queue_path)?;
    let dispatcher = Dispatcher::new(queue, Box::new(client));

    let mut pipeline = build_pipeline(&args, dispatcher)?;
    let batch = gather_heartbeats(&args)?;

    let delivery = pipeline.handle(batch)?;
    info!(
        "done: {} sent, {} queued, {} rejected",
        delivery.sent, delivery.queued, delivery.rejected
    );
    Ok(delivery)
}

/// Stage order is fixed: sanitize first so detectors cannot re-derive
/// redacted values, validate last so its rules see enriched heartbeats.
fn build_pipeline(args: &Args, dispatcher: Dispatcher) -> Result<Pipeline> {
    let validate_config = validate::ValidateConfig::compile(
        &args.exclude,
        &args.include,
        args.exclude_unknown_project,
        args.include_only_with_project_file,
    )?;

    let stages = vec![
        sanitize::stage(sanitize::SanitizeConfig {
            hide_branch_names: args.hide_branch_names,
            hide_file_names: args.hide_file_names,
            hide_project_names: args.hide_project_names,
        }),
        language::detection_stage(language::Config {
            overwrite: args.language.clone(),
            alternative: args.alternate_language.clone(),
            local_file: args.local_file.clone(),
        }),
        deps::detection_stage(deps::Config {
            local_file: args.local_file.clone(),
        }),
        filestats::detection_stage(filestats::Config {
            local_file: args.local_file.clone(),
        }),
        project::detection_stage(project::Config {
            overwrite: args.project.clone(),
            alternative: args.alternate_project.clone(),
            local_file: args.local_file.clone(),
        }),
        validate::stage(validate_config),
    ];

    Ok(Pipeline::new(stages, dispatcher))
}

fn gather_heartbeats(args: &Args) -> Result<Vec<Heartbeat>> {
    let user_agent = api::user_agent(args.plugin.as_deref());

    let mut batch = vec![Heartbeat {
        entity: args.entity.clone(),
        entity_type: args.entity_type,
        category: args.category,
        time: args.time.unwrap_or_else(now),
        is_write: args.write,
        language: None,
        dependencies: Vec::new(),
        project: None,
        branch: None,
        lines: None,
        cursor_position: None,
        user_agent: user_agent.clone(),
    }];

    if args.extra_heartbeats {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read extra heartbeats from stdin")?;

        if !raw.trim().is_empty() {
            let extra: Vec<Heartbeat> =
                serde_json::from_str(&raw).context("invalid extra heartbeats JSON")?;
            for mut hb in extra {
                if hb.user_agent.is_empty() {
                    hb.user_agent = user_agent.clone();
                }
                batch.push(hb);
            }
        }
    }

    Ok(batch)
}

fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
