//! Request and response records for [`crate::CargoService`].
//!
//! Field names follow the camelCase wire format. Requests are validated by the
//! service before anything reaches the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stowage_cargo::{
    BoundingBox, ContainerSpec, ItemSpec, ItemStatus, Placement, ReturnManifest, ReturnStep,
    RetrievalStep, WasteReason,
};
use stowage_core::{ContainerId, DomainError, DomainResult, ItemId, UserId};
use stowage_ledger::{ActionType, LogEntry, LogFilter};

use crate::lifecycle::{ItemChange, ItemUsage, UsageRequest};
use crate::placement::Relocation;

// ---- search ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub item_name: Option<String>,
}

impl SearchRequest {
    pub fn by_id(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: Some(item_id.into()),
            item_name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            item_id: None,
            item_name: Some(name.into()),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        let blank_name = self.item_name.as_deref().is_none_or(|n| n.trim().is_empty());
        if self.item_id.is_none() && blank_name {
            return Err(DomainError::validation("either itemId or itemName is required"));
        }
        Ok(())
    }
}

/// Where an item is and what state it is in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item_id: ItemId,
    pub name: String,
    pub status: ItemStatus,
    pub container_id: Option<ContainerId>,
    pub zone: Option<String>,
    pub position: Option<BoundingBox>,
    pub remaining_uses: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub found: bool,
    pub item: Option<ItemView>,
    pub retrieval_steps: Vec<RetrievalStep>,
}

// ---- stow / place / retrieve ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StowRequest {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    /// Candidate containers; every registered container when absent.
    #[serde(default)]
    pub containers: Option<Vec<ContainerId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StowResponse {
    pub placement: Placement,
    pub rearrangement: Option<Relocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub container_id: ContainerId,
    pub position: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceResponse {
    pub success: bool,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    pub success: bool,
    pub retrieval_steps: Vec<RetrievalStep>,
    pub remaining_uses: Option<u32>,
}

// ---- what-if placement ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    pub items: Vec<ItemSpec>,
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementView {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub position: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RearrangementView {
    pub step: usize,
    pub action: String,
    pub item_id: ItemId,
    pub from_container: ContainerId,
    pub from_position: BoundingBox,
    pub to_container: ContainerId,
    pub to_position: BoundingBox,
}

impl RearrangementView {
    pub(crate) fn from_relocation(step: usize, r: &Relocation) -> Self {
        Self {
            step,
            action: "move".to_string(),
            item_id: r.item_id.clone(),
            from_container: r.from.container_id.clone(),
            from_position: r.from.position,
            to_container: r.to.container_id.clone(),
            to_position: r.to.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedView {
    pub item_id: ItemId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
    pub success: bool,
    pub placements: Vec<PlacementView>,
    pub rearrangements: Vec<RearrangementView>,
    pub unplaced: Vec<UnplacedView>,
}

// ---- simulation ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    #[serde(default)]
    pub num_of_days: Option<i64>,
    #[serde(default)]
    pub to_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items_to_be_used_per_day: Vec<UsageRequest>,
}

impl SimulateRequest {
    pub fn days(num_of_days: i64) -> Self {
        Self {
            num_of_days: Some(num_of_days),
            ..Self::default()
        }
    }

    pub fn using(mut self, usage: Vec<UsageRequest>) -> Self {
        self.items_to_be_used_per_day = usage;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        match (self.num_of_days, self.to_timestamp) {
            (None, None) => Err(DomainError::validation(
                "either numOfDays or toTimestamp is required",
            )),
            (Some(_), Some(_)) => Err(DomainError::validation(
                "numOfDays and toTimestamp are mutually exclusive",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationChanges {
    pub items_used: Vec<ItemUsage>,
    pub items_expired: Vec<ItemChange>,
    pub items_depleted: Vec<ItemChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub success: bool,
    pub new_date: NaiveDate,
    pub changes: SimulationChanges,
}

// ---- waste ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteItemView {
    pub item_id: ItemId,
    pub name: String,
    pub reason: WasteReason,
    pub container_id: Option<ContainerId>,
    pub position: Option<BoundingBox>,
    pub mass: f64,
    pub volume: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteResponse {
    pub success: bool,
    pub waste_items: Vec<WasteItemView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPlanRequest {
    pub undocking_container_id: ContainerId,
    pub undocking_date: NaiveDate,
    pub max_weight: f64,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPlanResponse {
    pub success: bool,
    pub return_plan: Vec<ReturnStep>,
    pub retrieval_steps: Vec<RetrievalStep>,
    pub return_manifest: ReturnManifest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndockingRequest {
    pub undocking_container_id: ContainerId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndockingResponse {
    pub success: bool,
    pub items_removed: usize,
}

// ---- logs ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsRequest {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
}

impl LogsRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(DomainError::validation("startDate is after endDate"));
            }
        }
        Ok(())
    }
}

impl From<LogsRequest> for LogFilter {
    fn from(value: LogsRequest) -> Self {
        LogFilter {
            start: value.start_date,
            end: value.end_date,
            item_id: value.item_id,
            user_id: value.user_id,
            action_type: value.action_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}
