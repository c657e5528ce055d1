use serde::{Deserialize, Serialize};

use stowage_core::ItemId;

/// What the crew does with an item during a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetrievalAction {
    /// Take an occluder out; it goes back afterwards.
    Remove,
    /// Take an occluder out for good (it has its own pending retrieval).
    SetAside,
    /// Take the target out.
    Retrieve,
    /// Put a removed occluder back into its exact prior box.
    PlaceBack,
}

/// One step of a retrieval plan. Plans are computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalStep {
    pub step: usize,
    pub action: RetrievalAction,
    pub item_id: ItemId,
    pub item_name: String,
}
