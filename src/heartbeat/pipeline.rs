use anyhow::{Context, Result};
use log::debug;

use crate::heartbeat::Heartbeat;
use crate::offline::{Delivery, Dispatcher};

/// One named transformation applied to the batch. Stages may fill fields
/// in, drop heartbeats that do not qualify, or both; they never perform
/// network or queue I/O (that is the dispatcher's job).
pub struct Stage {
    name: &'static str,
    run: Box<dyn Fn(Vec<Heartbeat>) -> Result<Vec<Heartbeat>>>,
}

impl Stage {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(Vec<Heartbeat>) -> Result<Vec<Heartbeat>> + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run(&self, batch: Vec<Heartbeat>) -> Result<Vec<Heartbeat>> {
        (self.run)(batch)
    }
}

/// The ordered chain applied to one batch of heartbeats.
///
/// Stage order is significant and fixed by the caller: sanitization runs
/// first so no later stage can re-derive redacted data, validation runs
/// last among enrichments so its rules see fully-populated heartbeats.
/// A stage error aborts the whole invocation; only the terminal dispatch
/// may partially succeed.
pub struct Pipeline {
    stages: Vec<Stage>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, dispatcher: Dispatcher) -> Self {
        Self { stages, dispatcher }
    }

    pub fn handle(&mut self, mut batch: Vec<Heartbeat>) -> Result<Delivery> {
        for stage in &self.stages {
            let before = batch.len();
            batch = stage
                .run(batch)
                .with_context(|| format!("pipeline stage '{}' failed", stage.name))?;

            if batch.len() < before {
                debug!(
                    "stage '{}' dropped {} heartbeat(s)",
                    stage.name,
                    before - batch.len()
                );
            }
        }

        self.dispatcher.deliver(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SendError, SendResult, Sender};
    use crate::heartbeat::test_heartbeat;
    use crate::offline::Queue;

    struct AcceptAll;

    impl Sender for AcceptAll {
        fn send(&self, _batch: &[Heartbeat]) -> Result<SendResult, SendError> {
            Ok(SendResult::default())
        }
    }

    fn pipeline_with(stages: Vec<Stage>) -> (Pipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(&dir.path().join("queue.sqlite3")).unwrap();
        let dispatcher = Dispatcher::new(queue, Box::new(AcceptAll));
        (Pipeline::new(stages, dispatcher), dir)
    }

    #[test]
    fn stages_run_in_order() {
        let first = Stage::new("first", |mut batch: Vec<Heartbeat>| {
            for hb in &mut batch {
                hb.language = Some("Swift".to_string());
            }
            Ok(batch)
        });
        // Depends on the first stage's output; proves ordering.
        let second = Stage::new("second", |mut batch: Vec<Heartbeat>| {
            for hb in &mut batch {
                assert_eq!(hb.language.as_deref(), Some("Swift"));
                hb.project = Some("ordered".to_string());
            }
            Ok(batch)
        });

        let (mut pipeline, _dir) = pipeline_with(vec![first, second]);
        let delivery = pipeline.handle(vec![test_heartbeat("/tmp/a.swift")]).unwrap();
        assert_eq!(delivery.sent, 1);
    }

    #[test]
    fn stage_error_aborts_invocation() {
        let failing = Stage::new("failing", |_batch| anyhow::bail!("disk on fire"));
        let unreachable = Stage::new("unreachable", |_batch| {
            panic!("stage after a failure must not run");
        });

        let (mut pipeline, _dir) = pipeline_with(vec![failing, unreachable]);
        let err = pipeline
            .handle(vec![test_heartbeat("/tmp/a.swift")])
            .unwrap_err();
        assert!(err.to_string().contains("failing"));
    }

    #[test]
    fn dropping_stage_shrinks_batch() {
        let drop_writes = Stage::new("drop-writes", |batch: Vec<Heartbeat>| {
            Ok(batch.into_iter().filter(|hb| !hb.is_write).collect())
        });

        let (mut pipeline, _dir) = pipeline_with(vec![drop_writes]);
        let mut write = test_heartbeat("/tmp/w.swift");
        write.is_write = true;
        let delivery = pipeline
            .handle(vec![write, test_heartbeat("/tmp/r.swift")])
            .unwrap();
        assert_eq!(delivery.sent, 1);
    }
}
