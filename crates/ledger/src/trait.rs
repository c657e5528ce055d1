use std::sync::Arc;

use thiserror::Error;

use crate::entry::{LogEntry, NewLogEntry};
use crate::query::{LogFilter, LogQuery};

/// Ledger sink failure.
///
/// These never roll back the cargo mutation that produced the entry; callers
/// report them on the operational log and carry on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger is full (capacity {0})")]
    Full(usize),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit ledger.
///
/// Appends are linearized with respect to each other (implementations use an
/// internal lock); they are independent of any cargo-side locking.
pub trait AuditLedger: Send + Sync {
    /// Append one entry, assigning its id, sequence and timestamp.
    fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LedgerError>;

    /// Restartable, most-recent-first view of the entries matching `filter`.
    fn query(&self, filter: LogFilter) -> LogQuery;
}

impl<L> AuditLedger for Arc<L>
where
    L: AuditLedger + ?Sized,
{
    fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LedgerError> {
        (**self).append(entry)
    }

    fn query(&self, filter: LogFilter) -> LogQuery {
        (**self).query(filter)
    }
}
