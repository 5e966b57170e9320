//! Structural history checks.
//!
//! These checks do not decide linearizability; they decide whether a history
//! is complete enough for a linearizability checker to consume: every
//! operation invoked exactly once, returned exactly once, in that order.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use chaos_core::{ProcessId, Verifier};
use tracing::{info, warn};

use crate::{HistoryRecord, read_history};

/// A structural problem found in a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Two Invoke records share an ID.
    DuplicateInvoke(ProcessId),
    /// Two Return records share an ID.
    DuplicateReturn(ProcessId),
    /// A Return appears with no earlier Invoke.
    ReturnBeforeInvoke(ProcessId),
    /// An Invoke never got its Return.
    MissingReturn(ProcessId),
    /// IDs are not the contiguous range `1..=n`.
    MissingProcess(ProcessId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateInvoke(id) => write!(f, "process {id} invoked more than once"),
            Self::DuplicateReturn(id) => write!(f, "process {id} returned more than once"),
            Self::ReturnBeforeInvoke(id) => write!(f, "process {id} returned before it was invoked"),
            Self::MissingReturn(id) => write!(f, "process {id} never returned"),
            Self::MissingProcess(id) => write!(f, "process {id} is missing from the history"),
        }
    }
}

/// Summary of a structural check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub invokes: usize,
    pub returns: usize,
    /// Returns whose outcome is an error.
    pub errors: usize,
    pub violations: Vec<Violation>,
}

impl HistoryReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Default)]
struct Seen {
    invoked: bool,
    returned: bool,
}

/// Checks Invoke/Return pairing over a sequence of records.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryChecker;

impl HistoryChecker {
    pub fn check(records: &[HistoryRecord]) -> HistoryReport {
        let mut report = HistoryReport::default();
        let mut seen: HashMap<ProcessId, Seen> = HashMap::new();

        for record in records {
            let id = record.proc_id();
            let entry = seen.entry(id).or_default();

            match record {
                HistoryRecord::Invoke { .. } => {
                    report.invokes += 1;
                    if entry.invoked {
                        report.violations.push(Violation::DuplicateInvoke(id));
                    }
                    entry.invoked = true;
                }
                HistoryRecord::Return { outcome, .. } => {
                    report.returns += 1;
                    if !outcome.is_ok() {
                        report.errors += 1;
                    }
                    if !entry.invoked {
                        report.violations.push(Violation::ReturnBeforeInvoke(id));
                    }
                    if entry.returned {
                        report.violations.push(Violation::DuplicateReturn(id));
                    }
                    entry.returned = true;
                }
            }
        }

        let ids: BTreeSet<ProcessId> = seen.keys().copied().collect();
        for id in &ids {
            if seen[id].invoked && !seen[id].returned {
                report.violations.push(Violation::MissingReturn(*id));
            }
        }

        if let Some(max) = ids.last() {
            for raw in 1..=max.as_u64() {
                let id = ProcessId::new(raw);
                if !ids.contains(&id) {
                    report.violations.push(Violation::MissingProcess(id));
                }
            }
        }

        report
    }
}

/// [`Verifier`] that only performs the structural check.
///
/// Used by workload cases that have no semantic model (e.g. `noop`).
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryVerifier;

impl Verifier for HistoryVerifier {
    fn verify(&self, history: &Path) -> anyhow::Result<bool> {
        let records = read_history(history)?;
        let report = HistoryChecker::check(&records);

        for violation in &report.violations {
            warn!(history = %history.display(), %violation, "history violation");
        }
        info!(
            history = %history.display(),
            invokes = report.invokes,
            returns = report.returns,
            errors = report.errors,
            "history checked"
        );

        Ok(report.is_valid())
    }
}
