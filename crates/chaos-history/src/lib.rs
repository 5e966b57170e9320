//! Operation history for chaos runs.
//!
//! Every logical client operation produces two records: an `Invoke` written
//! before the request is sent and a `Return` written once the outcome is
//! known. Both carry the operation's [`ProcessId`](chaos_core::ProcessId) so a
//! verifier can pair them up and derive real-time bounds for each operation.
//!
//! ## Format
//!
//! The history file is JSON lines, one record per line:
//!
//! ```text
//! {"kind":"invoke","proc_id":1,"node":"n1","timestamp":"2026-10-17T08:00:00.000001Z","request":1}
//! {"kind":"return","proc_id":1,"timestamp":"2026-10-17T08:00:00.000350Z","outcome":{"ok":0}}
//! ```

mod checker;
mod error;
mod reader;
mod record;
mod recorder;

pub use checker::{HistoryChecker, HistoryReport, HistoryVerifier, Violation};
pub use error::{HistoryError, Result};
pub use reader::read_history;
pub use record::{HistoryRecord, Outcome};
pub use recorder::Recorder;
