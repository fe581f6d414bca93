use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on active rules; further creates return `Capacity`.
    pub max_rules: usize,
    /// Per-span, per-rule evaluation deadline.
    pub eval_timeout: Duration,
    /// Idle timeout after which a trace context is closed and evaluated.
    pub trace_window: Duration,
    /// Per-trace span cap; reaching it closes the context immediately.
    pub trace_max_spans: usize,
    /// Global cap on buffered trace contexts; beyond it the oldest context
    /// is evicted without producing violations.
    pub max_traces: usize,
    /// Ingest queue depth.
    pub ingest_queue: usize,
    /// How long `submit` may block on a full queue before dropping.
    pub ingest_block: Duration,
    /// Evaluation errors per rule within `error_window` before quarantine.
    pub error_budget: u64,
    pub error_window: Duration,
    /// Evaluation worker count; `None` means available parallelism.
    pub workers: Option<usize>,
    pub export_batch: usize,
    pub export_interval: Duration,
    pub sweep_interval: Duration,
    /// Budget for serializing with concurrent operations on one rule id.
    pub op_lock_wait: Duration,
    /// HMAC-SHA256 key for violation signatures; absent disables signing.
    pub signing_secret: Option<Vec<u8>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rules: 1000,
            eval_timeout: Duration::from_millis(100),
            trace_window: Duration::from_secs(30),
            trace_max_spans: 10_000,
            max_traces: 10_000,
            ingest_queue: 10_000,
            ingest_block: Duration::from_millis(10),
            error_budget: 100,
            error_window: Duration::from_secs(60),
            workers: None,
            export_batch: 100,
            export_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
            op_lock_wait: Duration::from_secs(2),
            signing_secret: None,
        }
    }
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }
}
