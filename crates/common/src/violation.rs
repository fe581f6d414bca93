use serde::{Deserialize, Serialize};

use crate::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Produced when a rule's assertion fails on observed data. Immutable once
/// built; metadata preserves the insertion order of the clauses that
/// contributed so repeated evaluations are byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub trace_id: String,
    pub span_id: String,
    pub fired_at_ns: i64,
    pub message: String,
    pub metadata: Vec<(String, String)>,
    pub signature: Option<String>,
}

impl Violation {
    /// The signed tuple: id, rule_id, rule_name, severity and message, in
    /// wire-schema order.
    fn signed_fields(&self) -> [&str; 5] {
        [
            &self.id,
            &self.rule_id,
            &self.rule_name,
            self.severity.as_str(),
            &self.message,
        ]
    }

    pub fn sign(&mut self, secret: &[u8]) {
        self.signature = Some(crypto::sign_fields(secret, &self.signed_fields()));
    }

    pub fn verify(&self, secret: &[u8]) -> bool {
        match &self.signature {
            Some(sig) => crypto::verify_fields(secret, &self.signed_fields(), sig),
            None => false,
        }
    }
}
