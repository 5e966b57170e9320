//! Fault operations, fault primitives and the generators that pick targets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One fault action to apply to one node during one dispatch round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Name of the fault primitive on the agent (e.g. `kill`, `drop`).
    pub name: String,
    /// Primitive-specific arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Operation {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A fault primitive executed by the agent on its own node.
#[async_trait]
pub trait Nemesis: Send + Sync {
    /// Applies the fault.
    async fn invoke(&self, args: &[String]) -> Result<()>;

    /// Undoes the fault.
    async fn recover(&self, args: &[String]) -> Result<()>;

    /// Unique name of the primitive (registry key).
    fn name(&self) -> &str;
}

/// Decides which nodes receive a fault in one dispatch round.
pub trait NemesisGenerator: Send + Sync {
    /// Stable name, used for logging.
    fn name(&self) -> &str;

    /// Returns exactly one slot per input node; `None` means no fault for
    /// that node this round.
    fn generate(&self, nodes: &[String]) -> Vec<Option<Operation>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_args_default_to_empty() {
        let op: Operation = serde_json::from_str(r#"{"name":"drop"}"#).unwrap();
        assert_eq!(op, Operation::new("drop", Vec::<String>::new()));
    }

    #[test]
    fn operation_new_collects_args() {
        let op = Operation::new("kill", ["noop", "storage"]);
        assert_eq!(op.args, vec!["noop".to_string(), "storage".to_string()]);
    }
}
