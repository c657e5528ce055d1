use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, ItemId};

use crate::retrieval::RetrievalStep;
use crate::waste::WasteReason;

/// A waste item selected for return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    pub item_id: ItemId,
    pub name: String,
    pub reason: WasteReason,
    pub mass: f64,
    pub volume: f64,
    pub container_id: Option<ContainerId>,
}

/// Move of one selected item from its source container to the undocking module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnStep {
    pub step: usize,
    pub item_id: ItemId,
    pub item_name: String,
    pub from_container: ContainerId,
    pub to_container: ContainerId,
}

/// Selected waste plus metadata for one undocking event.
///
/// `total_mass` and `total_volume` are always the sums over `items`, and
/// `total_mass <= max_mass`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnManifest {
    pub undocking_container_id: ContainerId,
    pub undocking_date: NaiveDate,
    pub max_mass: f64,
    pub items: Vec<ReturnItem>,
    pub total_mass: f64,
    pub total_volume: f64,
    pub return_plan: Vec<ReturnStep>,
    pub retrieval_steps: Vec<RetrievalStep>,
}

impl ReturnManifest {
    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().map(|i| &i.item_id)
    }
}
