//! Sync Orchestrator
//!
//! Builds one credential lane per API key, shards the tracked players across
//! the lanes, then syncs the selected streams one after another. Within a
//! stream every non-empty shard gets its own worker task; workers share the
//! watermark store and the export actor, nothing else.
//!
//! ```text
//!                        ┌─► worker(lane 0, shard 0) ─┐
//! stream ─► SCHEMA ──────┼─► worker(lane 1, shard 1) ─┼──► join_all ──► next stream
//!                        └─► worker(lane 2, shard 2) ─┘
//!                                   │
//!                                   ▼
//!                             ExportActor ──► sink
//! ```

pub mod pipeline;

pub use pipeline::WorkerReport;

use crate::clock::SyncClock;
use crate::config::TapConfig;
use crate::error::TapError;
use crate::lane::CredentialLane;
use crate::pacing::Pacer;
use crate::protocol::{spawn_exporter, Emitter, ExportHandle};
use crate::remote::ClientFactory;
use crate::sharding::partition;
use crate::state::WatermarkStore;
use crate::streams::StreamKind;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle of one stream within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Pending,
    Running,
    Draining,
    Done,
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamPhase::Pending => "pending",
            StreamPhase::Running => "running",
            StreamPhase::Draining => "draining",
            StreamPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub records: BTreeMap<StreamKind, u64>,
    pub states: u64,
    pub identities_completed: u64,
    pub identities_failed: u64,
    pub items_skipped: u64,
    pub remote_successes: u64,
    pub remote_failures: u64,
}

impl SyncReport {
    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }

    pub fn records_for(&self, stream: StreamKind) -> u64 {
        self.records.get(&stream).copied().unwrap_or(0)
    }

    fn absorb(&mut self, worker: &WorkerReport) {
        self.identities_completed += worker.identities_completed;
        self.identities_failed += worker.identities_failed;
        self.items_skipped += worker.items_skipped;
    }

    /// Run-level outcome: fails only when the source was never reached
    pub fn verdict(&self) -> Result<(), TapError> {
        if self.remote_failures > 0 && self.remote_successes == 0 {
            return Err(TapError::SourceUnreachable {
                failures: self.remote_failures,
            });
        }
        Ok(())
    }
}

/// Everything a worker needs besides its lane
pub struct SyncContext {
    pub watermarks: Arc<WatermarkStore>,
    pub export: ExportHandle,
    pub clock: Arc<dyn SyncClock>,
    pub start_date: NaiveDate,
    pub queue_id: Option<u32>,
}

/// Runs a full sync over the configured players
pub struct SyncEngine {
    config: TapConfig,
    factory: Arc<dyn ClientFactory>,
    pacer: Arc<dyn Pacer>,
    clock: Arc<dyn SyncClock>,
}

impl SyncEngine {
    pub fn new(
        config: TapConfig,
        factory: Arc<dyn ClientFactory>,
        pacer: Arc<dyn Pacer>,
        clock: Arc<dyn SyncClock>,
    ) -> Result<Self, TapError> {
        config.validate()?;
        Ok(SyncEngine {
            config,
            factory,
            pacer,
            clock,
        })
    }

    /// One lane per key; a key whose client cannot be built leaves a hole
    fn build_lanes(&self, report: &mut SyncReport) -> Vec<Option<Arc<CredentialLane>>> {
        self.config
            .api_keys
            .iter()
            .enumerate()
            .map(|(index, key)| match self.factory.connect(key) {
                Ok(client) => Some(Arc::new(CredentialLane::new(
                    index,
                    client,
                    self.pacer.clone(),
                ))),
                Err(e) => {
                    error!(lane = index, "Failed to build client for credential: {}", e);
                    report.remote_failures += 1;
                    None
                }
            })
            .collect()
    }

    /// Sync `streams` in order, writing every message to `emitter`.
    ///
    /// Per-identity failures are logged and counted in the report. Only a
    /// failing sink makes this return an error.
    pub async fn run(
        &self,
        streams: &[StreamKind],
        watermarks: Arc<WatermarkStore>,
        emitter: Emitter,
    ) -> Result<SyncReport, TapError> {
        let mut report = SyncReport::default();
        let lanes = self.build_lanes(&mut report);
        let shards = partition(&self.config.players, lanes.len());

        let (export, export_task) = spawn_exporter(emitter, watermarks.clone());
        let ctx = Arc::new(SyncContext {
            watermarks,
            export: export.clone(),
            clock: self.clock.clone(),
            start_date: self.config.start_date()?,
            queue_id: self.config.queue_id,
        });

        info!(
            lanes = lanes.len(),
            players = self.config.players.len(),
            streams = streams.len(),
            "Starting sync"
        );

        for &stream in streams {
            self.run_stream(stream, &ctx, &lanes, &shards, &mut report)
                .await;
        }

        let summary = export.shutdown().await;
        if let Err(e) = export_task.await {
            error!("Export actor panicked: {}", e);
        }

        for lane in lanes.iter().flatten() {
            let stats = lane.stats();
            report.remote_successes += stats.successes;
            report.remote_failures += stats.failures;
        }
        report.records = summary.records;
        report.states = summary.states;

        info!(
            records = report.total_records(),
            states = report.states,
            completed = report.identities_completed,
            failed = report.identities_failed,
            skipped = report.items_skipped,
            remote_ok = report.remote_successes,
            remote_failed = report.remote_failures,
            "Sync finished"
        );

        match summary.error {
            Some(e) => Err(TapError::Export(e)),
            None => Ok(report),
        }
    }

    async fn run_stream(
        &self,
        stream: StreamKind,
        ctx: &Arc<SyncContext>,
        lanes: &[Option<Arc<CredentialLane>>],
        shards: &[Vec<String>],
        report: &mut SyncReport,
    ) {
        info!(stream = %stream, phase = %StreamPhase::Pending, "Syncing stream");
        if let Err(e) = ctx.export.declare_schema(stream) {
            error!(stream = %stream, "Cannot declare schema, skipping stream: {}", e);
            report.identities_failed += shards.iter().map(|s| s.len() as u64).sum::<u64>();
            return;
        }

        let mut workers = Vec::new();
        for (index, shard) in shards.iter().enumerate() {
            if shard.is_empty() {
                continue;
            }
            let Some(lane) = lanes.get(index).cloned().flatten() else {
                error!(
                    stream = %stream,
                    lane = index,
                    players = shard.len(),
                    "Group {}: no client for this credential, skipping shard",
                    index
                );
                report.identities_failed += shard.len() as u64;
                continue;
            };
            workers.push(tokio::spawn(pipeline::run_worker(
                ctx.clone(),
                stream,
                lane,
                shard.clone(),
            )));
        }

        info!(
            stream = %stream,
            phase = %StreamPhase::Running,
            workers = workers.len(),
            "Workers started"
        );
        let results = join_all(workers).await;
        info!(stream = %stream, phase = %StreamPhase::Draining, "Workers finished");

        for result in results {
            match result {
                Ok(worker) => report.absorb(&worker),
                Err(e) => error!(stream = %stream, "Worker panicked: {}", e),
            }
        }
        info!(stream = %stream, phase = %StreamPhase::Done, "Stream done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::pacing::NoopPacer;
    use crate::protocol::SharedBuffer;
    use crate::remote::{SimulatedClientFactory, SimulatedRemote};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn engine(config: TapConfig, factory: SimulatedClientFactory) -> SyncEngine {
        SyncEngine::new(
            config,
            Arc::new(factory),
            Arc::new(NoopPacer::new()),
            Arc::new(SimulatedClock::new(today())),
        )
        .unwrap()
    }

    #[test]
    fn test_verdict() {
        let mut report = SyncReport::default();
        assert!(report.verdict().is_ok(), "nothing attempted is not a failure");
        report.remote_failures = 3;
        assert!(matches!(
            report.verdict(),
            Err(TapError::SourceUnreachable { failures: 3 })
        ));
        report.remote_successes = 1;
        assert!(report.verdict().is_ok());
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = TapConfig::test();
        config.api_keys.clear();
        let result = SyncEngine::new(
            config,
            Arc::new(SimulatedClientFactory::new(Arc::new(SimulatedRemote::default()))),
            Arc::new(NoopPacer::new()),
            Arc::new(SimulatedClock::new(today())),
        );
        assert!(matches!(result, Err(TapError::Config(_))));
    }

    #[tokio::test]
    async fn test_one_schema_per_stream_even_with_many_lanes() {
        let remote = Arc::new(SimulatedRemote::default());
        let mut config = TapConfig::test();
        config.api_keys = (0..3).map(|i| format!("key-{}", i)).collect();
        for i in 0..9 {
            let name = format!("P{}", i);
            remote.add_player(&name, "EUW");
            config.players.push(format!("{}#EUW", name));
        }

        let buffer = SharedBuffer::new();
        let report = engine(config, SimulatedClientFactory::new(remote))
            .run(
                &[StreamKind::Accounts],
                Arc::new(WatermarkStore::new()),
                Emitter::new(Box::new(buffer.clone())),
            )
            .await
            .unwrap();

        let messages = buffer.messages();
        assert_eq!(messages.iter().filter(|m| m["type"] == "SCHEMA").count(), 1);
        assert_eq!(messages[0]["type"], "SCHEMA");
        assert_eq!(report.records_for(StreamKind::Accounts), 9);
        assert_eq!(report.identities_completed, 9);
        assert_eq!(report.states, 9);
    }

    #[tokio::test]
    async fn test_rejected_credential_skips_only_its_shard() {
        let remote = Arc::new(SimulatedRemote::default());
        let mut config = TapConfig::test();
        config.api_keys = vec!["good".to_string(), "bad".to_string()];
        for i in 0..20 {
            let name = format!("P{}", i);
            remote.add_player(&name, "EUW");
            config.players.push(format!("{}#EUW", name));
        }
        let bad_shard = partition(&config.players, 2)[1].len() as u64;
        assert!(bad_shard > 0);

        let factory = SimulatedClientFactory::new(remote).reject_key("bad");
        let report = engine(config, factory)
            .run(
                &[StreamKind::Accounts, StreamKind::Elos],
                Arc::new(WatermarkStore::new()),
                Emitter::new(Box::new(SharedBuffer::new())),
            )
            .await
            .unwrap();

        assert_eq!(report.identities_failed, bad_shard * 2);
        assert_eq!(report.identities_completed, (20 - bad_shard) * 2);
        assert_eq!(report.records_for(StreamKind::Accounts), 20 - bad_shard);
        assert!(report.verdict().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_source_fails_verdict() {
        let remote = Arc::new(SimulatedRemote::default());
        remote.break_key("Ghost#EUW");
        let mut config = TapConfig::test();
        config.players = vec!["Ghost#EUW".to_string()];

        let report = engine(config, SimulatedClientFactory::new(remote))
            .run(
                &[StreamKind::Accounts],
                Arc::new(WatermarkStore::new()),
                Emitter::new(Box::new(SharedBuffer::new())),
            )
            .await
            .unwrap();

        assert_eq!(report.identities_failed, 1);
        assert!(matches!(
            report.verdict(),
            Err(TapError::SourceUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_skipped_when_exporter_is_gone() {
        let remote = Arc::new(SimulatedRemote::default());
        remote.add_player("Faker", "KR1");
        let mut config = TapConfig::test();
        config.players = vec!["Faker#KR1".to_string()];
        let engine = engine(config, SimulatedClientFactory::new(remote.clone()));

        let watermarks = Arc::new(WatermarkStore::new());
        let emitter = Emitter::new(Box::new(SharedBuffer::new()));
        let (export, task) = spawn_exporter(emitter, watermarks.clone());
        task.abort();
        let _ = task.await;
        let ctx = Arc::new(SyncContext {
            watermarks,
            export,
            clock: Arc::new(SimulatedClock::new(today())),
            start_date: today(),
            queue_id: None,
        });

        let mut report = SyncReport::default();
        let lanes = engine.build_lanes(&mut report);
        let shards = partition(&engine.config.players, lanes.len());
        engine
            .run_stream(StreamKind::Accounts, &ctx, &lanes, &shards, &mut report)
            .await;

        assert_eq!(report.identities_failed, 1);
        assert_eq!(report.identities_completed, 0);
        assert_eq!(remote.call_count(), 0, "no worker started");
    }
}
