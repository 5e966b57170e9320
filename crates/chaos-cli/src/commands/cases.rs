//! Workload cases known to the binary.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

/// A workload: which client the controller drives and which verifier reads
/// the resulting history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    /// Noop clients; the history only gets the structural check.
    Noop,
}

impl Case {
    pub const NAMES: [&'static str; 1] = ["noop"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Case {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "noop" => Ok(Self::Noop),
            other => bail!(
                "invalid client test case {other:?}, expected one of {:?}",
                Self::NAMES
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_cases_only() {
        assert_eq!("noop".parse::<Case>().unwrap(), Case::Noop);
        assert_eq!(Case::Noop.to_string(), "noop");

        let err = "bank".parse::<Case>().unwrap_err();
        assert!(err.to_string().contains("bank"));
    }
}
