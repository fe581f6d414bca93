use std::sync::Arc;

use serde::{Deserialize, Serialize};

use betrace_common::violation::Severity;
use betrace_dsl::{DslError, RuleAst};

/// The durable face of a rule: exactly what the store serializes. Source
/// text and compiled AST are kept consistent by compiling at every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    pub name: String,
    pub source: String,
    pub severity: Severity,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// A rule as the evaluator sees it. The AST is immutable and shared by
/// reference across workers and successive table snapshots.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub record: RuleRecord,
    pub ast: Arc<RuleAst>,
    pub trace_scoped: bool,
    pub selectors: Vec<String>,
}

impl CompiledRule {
    pub fn compile(record: RuleRecord) -> Result<Self, DslError> {
        let (ast, info) = betrace_dsl::compile(&record.source)?;
        Ok(Self {
            record,
            ast: Arc::new(ast),
            trace_scoped: info.trace_scoped,
            selectors: info.selectors,
        })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Evaluated on the ingest path only when enabled.
    pub fn active(&self) -> bool {
        self.record.enabled
    }
}

/// Rule ids become file names in the durable store and attribute values on
/// the wire, so the accepted alphabet is restricted.
pub fn validate_rule_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
