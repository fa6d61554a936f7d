//! Export Actor
//!
//! Single owner of the output sink during a sync. Workers send records and
//! identity-completion events over one channel; the actor writes them in
//! arrival order and answers each completion once its STATE line is written.
//!
//! ```text
//! Worker 1 ──┐
//! Worker 2 ──┤──► ExportActor ──► apply watermark ──► snapshot ──► STATE line ──► ack
//! Worker 3 ──┘
//! ```
//!
//! Applying a watermark and emitting the snapshot happen back to back inside
//! the actor, so STATE lines are emitted in the order advances were applied
//! and every snapshot is globally consistent. A worker's records always
//! precede its own checkpoint because the channel is FIFO per sender.

use crate::protocol::{Emitter, ExportError};
use crate::state::WatermarkStore;
use crate::streams::StreamKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// Messages for the export actor
pub enum ExportMessage {
    /// Declare a stream before any of its records
    Schema { stream: StreamKind },
    /// Emit one record
    Record { stream: StreamKind, record: Value },
    /// An identity finished a stream. Applies the watermark (if any), emits a
    /// STATE line and acknowledges.
    Complete {
        stream: StreamKind,
        player: String,
        watermark: Option<String>,
        ack_tx: oneshot::Sender<Result<(), ExportError>>,
    },
    /// Graceful shutdown
    Shutdown {
        response_tx: oneshot::Sender<ExportSummary>,
    },
}

/// What the actor wrote over its lifetime
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub records: BTreeMap<StreamKind, u64>,
    pub states: u64,
    /// First sink error, if any. Later messages are dropped once the sink failed.
    pub error: Option<ExportError>,
}

impl ExportSummary {
    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }
}

struct ExportActor {
    emitter: Emitter,
    watermarks: Arc<WatermarkStore>,
    rx: mpsc::UnboundedReceiver<ExportMessage>,
    summary: ExportSummary,
}

impl ExportActor {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ExportMessage::Schema { stream } => {
                    let result = self.emitter.emit_schema(stream);
                    self.track(result);
                }
                ExportMessage::Record { stream, record } => {
                    if self.emit_record(stream, &record) {
                        *self.summary.records.entry(stream).or_insert(0) += 1;
                    }
                }
                ExportMessage::Complete {
                    stream,
                    player,
                    watermark,
                    ack_tx,
                } => {
                    let snapshot = match watermark {
                        Some(date) => {
                            self.watermarks
                                .set_and_snapshot(stream.name(), &player, &date)
                        }
                        None => self.watermarks.snapshot(),
                    };
                    let result = self.emit_state(&snapshot);
                    let _ = ack_tx.send(result);
                }
                ExportMessage::Shutdown { response_tx } => {
                    info!(
                        records = self.summary.total_records(),
                        states = self.summary.states,
                        "Export actor shutting down"
                    );
                    let _ = response_tx.send(std::mem::take(&mut self.summary));
                    return;
                }
            }
        }
    }

    fn emit_record(&mut self, stream: StreamKind, record: &Value) -> bool {
        if self.summary.error.is_some() {
            return false;
        }
        let result = self.emitter.emit_record(stream, record);
        let ok = result.is_ok();
        self.track(result);
        ok
    }

    fn emit_state(&mut self, snapshot: &crate::state::StateValue) -> Result<(), ExportError> {
        if self.summary.error.is_some() {
            return Err(ExportError::Closed);
        }
        match self.emitter.emit_state(snapshot) {
            Ok(()) => {
                self.summary.states += 1;
                Ok(())
            }
            Err(e) => {
                let reported = ExportError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    e.to_string(),
                ));
                self.track(Err(e));
                Err(reported)
            }
        }
    }

    fn track(&mut self, result: Result<(), ExportError>) {
        if let Err(e) = result {
            error!("Export sink failed: {}", e);
            if self.summary.error.is_none() {
                self.summary.error = Some(e);
            }
        }
    }
}

// ============================================================================
// ExportHandle - public interface for interacting with the export actor
// ============================================================================

/// Handle for sending messages to the export actor
#[derive(Clone)]
pub struct ExportHandle {
    tx: mpsc::UnboundedSender<ExportMessage>,
}

impl ExportHandle {
    pub fn declare_schema(&self, stream: StreamKind) -> Result<(), ExportError> {
        self.tx
            .send(ExportMessage::Schema { stream })
            .map_err(|_| ExportError::Closed)
    }

    /// Queue one record (fire-and-forget)
    pub fn record<T: Serialize>(&self, stream: StreamKind, record: &T) -> Result<(), ExportError> {
        let record = serde_json::to_value(record)?;
        self.tx
            .send(ExportMessage::Record { stream, record })
            .map_err(|_| ExportError::Closed)
    }

    /// Mark a player done for a stream and wait until its checkpoint is written
    pub async fn complete(
        &self,
        stream: StreamKind,
        player: &str,
        watermark: Option<String>,
    ) -> Result<(), ExportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(ExportMessage::Complete {
                stream,
                player: player.to_string(),
                watermark,
                ack_tx,
            })
            .map_err(|_| ExportError::Closed)?;
        ack_rx.await.unwrap_or(Err(ExportError::Closed))
    }

    /// Graceful shutdown; everything queued before it is written first
    pub async fn shutdown(&self) -> ExportSummary {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(ExportMessage::Shutdown { response_tx }).is_err() {
            return ExportSummary {
                error: Some(ExportError::Closed),
                ..Default::default()
            };
        }
        response_rx.await.unwrap_or_else(|_| ExportSummary {
            error: Some(ExportError::Closed),
            ..Default::default()
        })
    }
}

/// Spawn the export actor and return its handle + join handle
pub fn spawn_exporter(
    emitter: Emitter,
    watermarks: Arc<WatermarkStore>,
) -> (ExportHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = ExportActor {
        emitter,
        watermarks,
        rx,
        summary: ExportSummary::default(),
    };
    let task = tokio::spawn(actor.run());
    (ExportHandle { tx }, task)
}
