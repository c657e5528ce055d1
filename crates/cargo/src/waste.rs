use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, DomainError, DomainResult, ItemId};

use crate::geometry::BoundingBox;

/// Why an item became waste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasteReason {
    Expired,
    Depleted,
}

impl WasteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WasteReason::Expired => "Expired",
            WasteReason::Depleted => "Depleted",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "expired" => Ok(WasteReason::Expired),
            "depleted" | "out of uses" => Ok(WasteReason::Depleted),
            other => Err(DomainError::validation(format!("unknown waste reason '{other}'"))),
        }
    }
}

impl core::fmt::Display for WasteReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Created when an item turns into waste; consumed by undocking.
///
/// `sequence` orders records by age (lower is older) independently of the
/// simulated clock. The container and box are where the waste still sits;
/// both are empty for waste imported without an arrangement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteRecord {
    pub item_id: ItemId,
    pub reason: WasteReason,
    pub container_id: Option<ContainerId>,
    pub position: Option<BoundingBox>,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}
