use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use stowage_core::LogId;

use crate::entry::{LogEntry, NewLogEntry};
use crate::query::{LogFilter, LogQuery};
use crate::r#trait::{AuditLedger, LedgerError};

#[derive(Debug, Default)]
struct LedgerState {
    entries: Arc<Vec<LogEntry>>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// In-memory append-only ledger.
///
/// Entries live in a shared snapshot; taking a query is O(1) and an append
/// only copies the vector when a query snapshot is still alive. An optional
/// capacity turns the ledger into a bounded sink that reports
/// [`LedgerError::Full`] instead of growing.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    capacity: Option<usize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLedger for InMemoryLedger {
    fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LedgerError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| LedgerError::Unavailable("lock poisoned".to_string()))?;

        if let Some(capacity) = self.capacity {
            if state.entries.len() >= capacity {
                return Err(LedgerError::Full(capacity));
            }
        }

        // Timestamps never go backwards in append order.
        let requested = entry.occurred_at.unwrap_or_else(Utc::now);
        let timestamp = match state.last_timestamp {
            Some(last) if last > requested => last,
            _ => requested,
        };

        let stored = LogEntry {
            id: LogId::new(),
            sequence: state.entries.len() as u64 + 1,
            timestamp,
            user_id: entry.user_id,
            action_type: entry.action_type,
            item_id: entry.item_id,
            details: entry.details,
        };

        Arc::make_mut(&mut state.entries).push(stored.clone());
        state.last_timestamp = Some(timestamp);

        Ok(stored)
    }

    fn query(&self, filter: LogFilter) -> LogQuery {
        // A poisoned ledger still answers queries with what it holds.
        let snapshot = match self.state.lock() {
            Ok(state) => state.entries.clone(),
            Err(poisoned) => poisoned.into_inner().entries.clone(),
        };
        LogQuery::new(snapshot, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ActionType;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use stowage_core::{ItemId, UserId};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn append_assigns_sequence_and_query_is_newest_first() {
        let ledger = InMemoryLedger::new();
        ledger
            .append(NewLogEntry::new(ActionType::Placement).item(ItemId::from("a")).at(at(0)))
            .unwrap();
        ledger
            .append(NewLogEntry::new(ActionType::Retrieval).item(ItemId::from("b")).at(at(10)))
            .unwrap();

        let all = ledger.query(LogFilter::default()).to_vec();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sequence, 2);
        assert_eq!(all[1].sequence, 1);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let ledger = InMemoryLedger::new();
        ledger.append(NewLogEntry::new(ActionType::Import).at(at(100))).unwrap();
        let second = ledger.append(NewLogEntry::new(ActionType::Import).at(at(5))).unwrap();
        assert_eq!(second.timestamp, at(100));
    }

    #[test]
    fn filters_combine() {
        let ledger = InMemoryLedger::new();
        let alice = UserId::from("alice");
        ledger
            .append(
                NewLogEntry::new(ActionType::Placement)
                    .by(Some(alice.clone()))
                    .item(ItemId::from("a"))
                    .at(at(0)),
            )
            .unwrap();
        ledger
            .append(NewLogEntry::new(ActionType::Placement).item(ItemId::from("a")).at(at(20)))
            .unwrap();
        ledger
            .append(
                NewLogEntry::new(ActionType::Retrieval)
                    .by(Some(alice.clone()))
                    .item(ItemId::from("a"))
                    .at(at(30)),
            )
            .unwrap();

        let q = ledger.query(LogFilter {
            user_id: Some(alice),
            action_type: Some(ActionType::Placement),
            ..Default::default()
        });
        assert_eq!(q.count(), 1);

        let q = ledger.query(LogFilter {
            start: Some(at(10)),
            end: Some(at(25)),
            ..Default::default()
        });
        assert_eq!(q.to_vec()[0].sequence, 2);
    }

    #[test]
    fn query_is_a_restartable_snapshot() {
        let ledger = InMemoryLedger::new();
        ledger.append(NewLogEntry::new(ActionType::Import)).unwrap();
        let q = ledger.query(LogFilter::default());
        ledger.append(NewLogEntry::new(ActionType::Import)).unwrap();

        assert_eq!(q.iter().count(), 1);
        assert_eq!(q.iter().count(), 1);
        assert_eq!(ledger.query(LogFilter::default()).count(), 2);
    }

    #[test]
    fn bounded_ledger_reports_full() {
        let ledger = InMemoryLedger::with_capacity(1);
        ledger.append(NewLogEntry::new(ActionType::Import)).unwrap();
        let err = ledger.append(NewLogEntry::new(ActionType::Import)).unwrap_err();
        assert_eq!(err, LedgerError::Full(1));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn action_type_parse_is_lenient_on_separators() {
        assert_eq!(ActionType::parse("return-plan").unwrap(), ActionType::ReturnPlan);
        assert_eq!(ActionType::parse("Placement").unwrap(), ActionType::Placement);
        assert!(ActionType::parse("teleport").is_err());
    }

    proptest! {
        /// Property: sequences are strictly increasing and timestamps monotonic,
        /// whatever business times callers supply.
        #[test]
        fn appends_are_linearized(offsets in prop::collection::vec(-1000i64..1000, 1..50)) {
            let ledger = InMemoryLedger::new();
            for off in offsets {
                ledger.append(NewLogEntry::new(ActionType::Simulation).at(at(off))).unwrap();
            }
            let entries: Vec<LogEntry> = ledger.query(LogFilter::default()).to_vec();
            for pair in entries.windows(2) {
                // newest first
                prop_assert!(pair[0].sequence > pair[1].sequence);
                prop_assert!(pair[0].timestamp >= pair[1].timestamp);
            }
        }
    }
}
