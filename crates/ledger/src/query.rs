//! Ledger queries.
//!
//! A [`LogQuery`] holds a snapshot of the ledger taken at query time plus a
//! filter. Iteration is lazy and newest-first, and can be restarted any number
//! of times; appends made after the query was taken are not visible to it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::{ItemId, UserId};

use crate::entry::{ActionType, LogEntry};

/// Filter criteria for ledger queries. Every field is optional; `None`
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    /// Inclusive lower bound on `timestamp`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end: Option<DateTime<Utc>>,
    pub item_id: Option<ItemId>,
    pub user_id: Option<UserId>,
    pub action_type: Option<ActionType>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.start.is_none_or(|s| entry.timestamp >= s)
            && self.end.is_none_or(|e| entry.timestamp <= e)
            && self
                .item_id
                .as_ref()
                .is_none_or(|id| entry.item_id.as_ref() == Some(id))
            && self
                .user_id
                .as_ref()
                .is_none_or(|id| entry.user_id.as_ref() == Some(id))
            && self.action_type.is_none_or(|a| entry.action_type == a)
    }
}

/// Lazy, restartable query result.
#[derive(Debug, Clone)]
pub struct LogQuery {
    snapshot: Arc<Vec<LogEntry>>,
    filter: LogFilter,
}

impl LogQuery {
    pub fn new(snapshot: Arc<Vec<LogEntry>>, filter: LogFilter) -> Self {
        Self { snapshot, filter }
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    /// Matching entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.snapshot
            .iter()
            .rev()
            .filter(move |entry| self.filter.matches(entry))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a LogQuery {
    type Item = &'a LogEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a LogEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
