//! # chaos-nemesis: fault generators and fault primitives
//!
//! Two halves live here:
//! - Generators run in the controller. Each one picks, per dispatch round,
//!   which nodes receive a fault ([`KillGenerator`], [`DropGenerator`]).
//! - Primitives run in the agent and apply a fault to their own node
//!   ([`KillNemesis`], [`DropNemesis`]).
//!
//! Generator names follow `<policy>_<family>`, e.g. `minor_kill` or
//! `all_drop`; see [`Policy`] for how many nodes each policy selects.

use chaos_core::{NemesisGenerator, ServiceKind};

mod drop;
mod error;
mod firewall;
mod kill;
mod policy;

pub use drop::{DropGenerator, DropNemesis};
pub use error::{NemesisError, Result};
pub use firewall::{Firewall, Iptables, MemoryFirewall};
pub use kill::{KillGenerator, KillNemesis};
pub use policy::{Family, Policy, Selector};

/// Every generator name accepted by [`generator_from_name`].
pub const GENERATOR_NAMES: [&str; 8] = [
    "random_kill",
    "all_kill",
    "minor_kill",
    "major_kill",
    "random_drop",
    "all_drop",
    "minor_drop",
    "major_drop",
];

/// Builds a generator from its `<policy>_<family>` name.
///
/// Kill generators target every service of `db`.
pub fn generator_from_name(name: &str, db: &str) -> Result<Box<dyn NemesisGenerator>> {
    let (policy, family) = policy::parse_name(name)?;
    Ok(match family {
        Family::Kill => Box::new(KillGenerator::new(db, policy, ServiceKind::All)),
        Family::Drop => Box::new(DropGenerator::new(policy)),
    })
}

/// Parses a comma separated generator list, ignoring empty entries.
pub fn generators_from_list(list: &str, db: &str) -> Result<Vec<Box<dyn NemesisGenerator>>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| generator_from_name(name, db))
        .collect()
}
