use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use betrace_common::violation::Violation;
use betrace_common::wire;

use super::ViolationExporter;

/// Drains the engine's violation channel into bounded batches: a batch goes
/// out when it reaches `max_batch` records or when `flush_interval` elapses
/// with at least one record pending. Export failures are logged and the
/// batch is dropped; retries belong to the exporter.
pub struct ExportBatcher {
    max_batch: usize,
    flush_interval: Duration,
}

impl ExportBatcher {
    pub fn new(max_batch: usize, flush_interval: Duration) -> Self {
        Self {
            max_batch,
            flush_interval,
        }
    }

    pub async fn run(
        self,
        mut rx: mpsc::Receiver<Violation>,
        exporter: Arc<dyn ViolationExporter>,
    ) {
        let mut pending: Vec<Violation> = Vec::with_capacity(self.max_batch);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(v) => {
                            pending.push(v);
                            if pending.len() >= self.max_batch {
                                flush(&mut pending, exporter.as_ref()).await;
                            }
                        }
                        None => {
                            flush(&mut pending, exporter.as_ref()).await;
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    flush(&mut pending, exporter.as_ref()).await;
                }
            }
        }
    }
}

async fn flush(pending: &mut Vec<Violation>, exporter: &dyn ViolationExporter) {
    if pending.is_empty() {
        return;
    }
    let batch: Vec<_> = pending.drain(..).map(|v| wire::export_span(&v)).collect();
    let size = batch.len();
    if let Err(e) = exporter.export(batch).await {
        tracing::error!(error = %e, records = size, "violation export failed, dropping batch");
    }
}
