pub mod batcher;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use betrace_common::wire::ExportSpan;

#[derive(Debug)]
pub struct ExportError(pub String);

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "export: {}", self.0)
    }
}

impl std::error::Error for ExportError {}

/// Destination for violation batches. Fire-and-forget from the engine's
/// perspective; retries are the exporter's problem.
#[async_trait]
pub trait ViolationExporter: Send + Sync {
    async fn export(&self, batch: Vec<ExportSpan>) -> Result<(), ExportError>;
}

/// Test and development exporter that keeps everything in memory.
#[derive(Clone, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<ExportSpan>>>,
    batches: Arc<AtomicUsize>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    pub async fn exported(&self) -> Vec<ExportSpan> {
        self.spans.lock().await.clone()
    }
}

#[async_trait]
impl ViolationExporter for InMemoryExporter {
    async fn export(&self, batch: Vec<ExportSpan>) -> Result<(), ExportError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.spans.lock().await.extend(batch);
        Ok(())
    }
}
