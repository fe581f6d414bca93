use serde::{Deserialize, Serialize};

use crate::violation::Violation;

pub const ATTR_ID: &str = "betrace.violation.id";
pub const ATTR_RULE_ID: &str = "betrace.violation.rule_id";
pub const ATTR_RULE_NAME: &str = "betrace.violation.rule_name";
pub const ATTR_SEVERITY: &str = "betrace.violation.severity";
pub const ATTR_MESSAGE: &str = "betrace.violation.message";
pub const ATTR_SIGNATURE: &str = "betrace.violation.signature";
pub const ATTR_META_PREFIX: &str = "betrace.violation.meta.";

/// OTLP-shaped span carrying one violation to the exporter. The attribute
/// schema is fixed; per-rule metadata rides under the `meta.` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpan {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub start_ns: i64,
    pub end_ns: i64,
    pub attributes: Vec<(String, String)>,
}

pub fn export_span(v: &Violation) -> ExportSpan {
    let mut attributes = vec![
        (ATTR_ID.to_string(), v.id.clone()),
        (ATTR_RULE_ID.to_string(), v.rule_id.clone()),
        (ATTR_RULE_NAME.to_string(), v.rule_name.clone()),
        (ATTR_SEVERITY.to_string(), v.severity.as_str().to_string()),
        (ATTR_MESSAGE.to_string(), v.message.clone()),
        (
            ATTR_SIGNATURE.to_string(),
            v.signature.clone().unwrap_or_default(),
        ),
    ];
    for (k, val) in &v.metadata {
        attributes.push((format!("{ATTR_META_PREFIX}{k}"), val.clone()));
    }

    ExportSpan {
        trace_id: v.trace_id.clone(),
        span_id: v.span_id.clone(),
        name: "betrace.violation".to_string(),
        start_ns: v.fired_at_ns,
        end_ns: v.fired_at_ns,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::Severity;

    fn sample() -> Violation {
        Violation {
            id: "v-1".into(),
            rule_id: "r-1".into(),
            rule_name: "slow checkout".into(),
            severity: Severity::Critical,
            trace_id: "t-1".into(),
            span_id: "s-1".into(),
            fired_at_ns: 42,
            message: "never clause 1 matched".into(),
            metadata: vec![
                ("never[0]".into(), "payment status failed".into()),
                ("evicted".into(), "true".into()),
            ],
            signature: Some("c2ln".into()),
        }
    }

    #[test]
    fn fixed_attributes_in_schema_order() {
        let span = export_span(&sample());
        let keys: Vec<&str> = span.attributes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            &keys[..6],
            &[
                ATTR_ID,
                ATTR_RULE_ID,
                ATTR_RULE_NAME,
                ATTR_SEVERITY,
                ATTR_MESSAGE,
                ATTR_SIGNATURE
            ]
        );
    }

    #[test]
    fn metadata_rides_under_meta_prefix() {
        let span = export_span(&sample());
        assert!(span
            .attributes
            .contains(&("betrace.violation.meta.evicted".into(), "true".into())));
    }

    #[test]
    fn trace_and_span_ids_copied_through() {
        let span = export_span(&sample());
        assert_eq!(span.trace_id, "t-1");
        assert_eq!(span.span_id, "s-1");
        assert_eq!(span.start_ns, span.end_ns);
    }

    #[test]
    fn missing_signature_exports_empty() {
        let mut v = sample();
        v.signature = None;
        let span = export_span(&v);
        assert!(span
            .attributes
            .contains(&(ATTR_SIGNATURE.to_string(), String::new())));
    }
}
