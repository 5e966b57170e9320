//! Service classes a database node can run.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Class of service started or killed on a node.
///
/// Clustered databases usually split into a coordinator (placement driver),
/// a storage layer and a stateless gateway that clients connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Cluster metadata / placement service.
    Coordinator,
    /// Replicated storage service.
    Storage,
    /// Client-facing gateway.
    Gateway,
    /// Every service on the node.
    All,
}

impl ServiceKind {
    /// Concrete services, in start order.
    pub const CONCRETE: [ServiceKind; 3] = [Self::Coordinator, Self::Storage, Self::Gateway];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Storage => "storage",
            Self::Gateway => "gateway",
            Self::All => "all",
        }
    }

    /// Expands `All` into the concrete services it covers.
    pub fn expand(self) -> Vec<ServiceKind> {
        match self {
            Self::All => Self::CONCRETE.to_vec(),
            other => vec![other],
        }
    }
}

impl Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" | "pd" => Ok(Self::Coordinator),
            "storage" | "kv" | "tikv" => Ok(Self::Storage),
            "gateway" | "tidb" | "sql" => Ok(Self::Gateway),
            "all" => Ok(Self::All),
            other => Err(Error::UnknownService(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("coordinator", ServiceKind::Coordinator)]
    #[test_case("pd", ServiceKind::Coordinator)]
    #[test_case("TiKV", ServiceKind::Storage)]
    #[test_case("gateway", ServiceKind::Gateway)]
    #[test_case("tidb", ServiceKind::Gateway)]
    #[test_case(" all ", ServiceKind::All)]
    fn parses_service_names(input: &str, expected: ServiceKind) {
        assert_eq!(input.parse::<ServiceKind>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_service() {
        let err = "raft".parse::<ServiceKind>().unwrap_err();
        assert!(matches!(err, Error::UnknownService(ref s) if s == "raft"));
    }

    #[test]
    fn all_expands_to_concrete_services() {
        assert_eq!(ServiceKind::All.expand(), ServiceKind::CONCRETE.to_vec());
        assert_eq!(ServiceKind::Storage.expand(), vec![ServiceKind::Storage]);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for kind in [ServiceKind::All, ServiceKind::Gateway] {
            assert_eq!(kind.to_string().parse::<ServiceKind>().unwrap(), kind);
        }
    }
}
