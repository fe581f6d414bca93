use async_trait::async_trait;

use betrace_common::wire::{self, ExportSpan};
use betrace_engine::export::{ExportError, ViolationExporter};

/// Default sink when no OTLP endpoint is wired up: every violation batch is
/// written to the structured log, one line per record.
pub struct LogExporter;

#[async_trait]
impl ViolationExporter for LogExporter {
    async fn export(&self, batch: Vec<ExportSpan>) -> Result<(), ExportError> {
        for span in &batch {
            let find = |key: &str| {
                span.attributes
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or_default()
            };
            tracing::info!(
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                violation_id = find(wire::ATTR_ID),
                rule_id = find(wire::ATTR_RULE_ID),
                severity = find(wire::ATTR_SEVERITY),
                message = find(wire::ATTR_MESSAGE),
                "violation"
            );
        }
        Ok(())
    }
}
