use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stowage_core::{DomainError, DomainResult, ItemId, LogId, UserId};

/// Kind of mutating operation recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Placement,
    Rearrangement,
    Retrieval,
    Waste,
    Simulation,
    ReturnPlan,
    Disposal,
    Undocking,
    Import,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Placement => "placement",
            ActionType::Rearrangement => "rearrangement",
            ActionType::Retrieval => "retrieval",
            ActionType::Waste => "waste",
            ActionType::Simulation => "simulation",
            ActionType::ReturnPlan => "returnplan",
            ActionType::Disposal => "disposal",
            ActionType::Undocking => "undocking",
            ActionType::Import => "import",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "placement" => Ok(ActionType::Placement),
            "rearrangement" => Ok(ActionType::Rearrangement),
            "retrieval" => Ok(ActionType::Retrieval),
            "waste" => Ok(ActionType::Waste),
            "simulation" => Ok(ActionType::Simulation),
            "returnplan" => Ok(ActionType::ReturnPlan),
            "disposal" => Ok(ActionType::Disposal),
            "undocking" => Ok(ActionType::Undocking),
            "import" => Ok(ActionType::Import),
            other => Err(DomainError::validation(format!("unknown action type '{other}'"))),
        }
    }
}

/// An entry ready to be appended (not yet assigned an id or sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub action_type: ActionType,
    pub user_id: Option<UserId>,
    pub item_id: Option<ItemId>,
    /// Business time supplied by the caller; the ledger falls back to now.
    pub occurred_at: Option<DateTime<Utc>>,
    pub details: Option<JsonValue>,
}

impl NewLogEntry {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            user_id: None,
            item_id: None,
            occurred_at: None,
            details: None,
        }
    }

    pub fn by(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// An appended, immutable ledger entry.
///
/// `sequence` is strictly increasing per ledger and `timestamp` never goes
/// backwards in append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: LogId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub action_type: ActionType,
    pub item_id: Option<ItemId>,
    pub details: Option<JsonValue>,
}
