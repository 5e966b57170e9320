//! History record types.

use chaos_core::{InvokeError, ProcessId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the history file. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryRecord {
    /// Written before the request is sent.
    Invoke {
        proc_id: ProcessId,
        node: String,
        timestamp: DateTime<Utc>,
        request: Value,
    },

    /// Written after the outcome is known.
    Return {
        proc_id: ProcessId,
        timestamp: DateTime<Utc>,
        outcome: Outcome,
    },
}

impl HistoryRecord {
    pub fn proc_id(&self) -> ProcessId {
        match self {
            Self::Invoke { proc_id, .. } | Self::Return { proc_id, .. } => *proc_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Invoke { timestamp, .. } | Self::Return { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self, Self::Invoke { .. })
    }
}

/// Result of one operation as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The database answered.
    Ok(Value),
    /// The invocation failed; see [`InvokeError::is_definite`].
    Error(InvokeError),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_record_shape() {
        let record = HistoryRecord::Invoke {
            proc_id: ProcessId::new(3),
            node: "n2".to_string(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            request: serde_json::json!({"from": 1, "to": 2, "amount": 5}),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "invoke");
        assert_eq!(json["proc_id"], 3);
        assert_eq!(json["node"], "n2");
        assert_eq!(json["request"]["amount"], 5);
    }

    #[test]
    fn error_outcome_keeps_error_kind() {
        let record = HistoryRecord::Return {
            proc_id: ProcessId::new(4),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            outcome: Outcome::Error(InvokeError::Indeterminate("connection reset".into())),
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""kind":"return""#));
        assert!(line.contains(r#""error":{"type":"indeterminate""#));

        let decoded: HistoryRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_invoke());
    }
}
