//! Target selection policies.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Mutex;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::{NemesisError, Result};

/// How many of `n` target nodes a generator picks each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Every node.
    All,
    /// Exactly one node.
    Random,
    /// A minority: `(n - 1) / 2`.
    Minor,
    /// A majority: `n - (n - 1) / 2`.
    Major,
}

impl Policy {
    /// Number of nodes selected out of `n`.
    pub fn count(self, n: usize) -> usize {
        let minor = n.saturating_sub(1) / 2;
        match self {
            Self::All => n,
            Self::Random => n.min(1),
            Self::Minor => minor,
            Self::Major => n - minor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Random => "random",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = NemesisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "random" => Ok(Self::Random),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(NemesisError::UnknownGenerator(other.to_string())),
        }
    }
}

/// Fault family a generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Kill,
    Drop,
}

/// Splits `minor_kill` into its policy and family.
pub(crate) fn parse_name(name: &str) -> Result<(Policy, Family)> {
    let unknown = || NemesisError::UnknownGenerator(name.to_string());

    let (policy, family) = name.split_once('_').ok_or_else(unknown)?;
    let policy = policy.parse::<Policy>().map_err(|_| unknown())?;
    let family = match family {
        "kill" => Family::Kill,
        "drop" => Family::Drop,
        _ => return Err(unknown()),
    };
    Ok((policy, family))
}

/// Picks which target indices receive a fault.
///
/// Shared by all rounds of one generator; seed it for reproducible runs.
#[derive(Debug)]
pub struct Selector {
    policy: Policy,
    rng: Mutex<SmallRng>,
}

impl Selector {
    pub fn new(policy: Policy) -> Self {
        Self::from_rng(policy, SmallRng::from_entropy())
    }

    pub fn with_seed(policy: Policy, seed: u64) -> Self {
        Self::from_rng(policy, SmallRng::seed_from_u64(seed))
    }

    fn from_rng(policy: Policy, rng: SmallRng) -> Self {
        Self {
            policy,
            rng: Mutex::new(rng),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns a mask of length `n` with exactly `policy.count(n)` entries set.
    pub fn select(&self, n: usize) -> Vec<bool> {
        let mut indices: Vec<usize> = (0..n).collect();
        {
            // A panic while shuffling leaves the rng usable.
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            indices.shuffle(&mut *rng);
        }

        let mut mask = vec![false; n];
        for &i in indices.iter().take(self.policy.count(n)) {
            mask[i] = true;
        }
        mask
    }
}
