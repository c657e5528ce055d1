//! Audit ledger: append-only record of every mutating cargo operation.
//!
//! The ledger is the single writer of [`LogEntry`] values. It references
//! domain entities by id only and never owns them.

pub mod entry;
pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use entry::{ActionType, LogEntry, NewLogEntry};
pub use in_memory::InMemoryLedger;
pub use query::{LogFilter, LogQuery};
pub use r#trait::{AuditLedger, LedgerError};
