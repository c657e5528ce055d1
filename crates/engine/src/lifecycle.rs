//! Day-by-day simulation of usage, expiry and depletion.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stowage_cargo::WasteReason;
use stowage_core::{DomainResult, Entity, ItemId};

use crate::store::CargoStore;

/// An item named for daily use, by id or by exact name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRequest {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub name: Option<String>,
}

impl UsageRequest {
    pub fn by_id(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: Some(item_id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            item_id: None,
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUsage {
    pub item_id: ItemId,
    pub name: String,
    pub remaining_uses: Option<u32>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChange {
    pub item_id: ItemId,
    pub name: String,
    pub date: NaiveDate,
}

/// Everything that happened during one `advance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub new_date: NaiveDate,
    pub items_used: Vec<ItemUsage>,
    pub items_expired: Vec<ItemChange>,
    pub items_depleted: Vec<ItemChange>,
}

impl SimulationReport {
    fn empty(date: NaiveDate) -> Self {
        Self {
            new_date: date,
            items_used: Vec::new(),
            items_expired: Vec::new(),
            items_depleted: Vec::new(),
        }
    }

    /// Items that turned into waste, in the order they did.
    pub fn wasted(&self) -> impl Iterator<Item = (&ItemChange, WasteReason)> {
        self.items_expired
            .iter()
            .map(|c| (c, WasteReason::Expired))
            .chain(self.items_depleted.iter().map(|c| (c, WasteReason::Depleted)))
    }
}

/// Resolve usage requests to distinct item ids. Unknown ids and names are
/// skipped.
fn resolve(store: &CargoStore, usage: &[UsageRequest]) -> BTreeSet<ItemId> {
    let mut ids = BTreeSet::new();
    for request in usage {
        let by_id = request
            .item_id
            .as_ref()
            .and_then(|id| store.item(id).ok());
        let by_name = || {
            request.name.as_deref().and_then(|name| {
                let mut matches = store.items().filter(|i| i.name() == name);
                let first = matches.next()?;
                Some(
                    std::iter::once(first)
                        .chain(matches)
                        .find(|i| i.is_stowed())
                        .unwrap_or(first),
                )
            })
        };
        match by_id.or_else(by_name) {
            Some(item) => {
                ids.insert(item.id().clone());
            }
            None => debug!(?request, "usage request matches no item"),
        }
    }
    ids
}

/// Advance the clock by `num_days`, one day at a time.
///
/// Each day every distinct stowed item in `usage` loses one use, the clock
/// moves forward, then every stowed item is checked for expiry (first) and
/// depletion. Non-positive `num_days` leaves the store untouched.
pub fn advance(
    store: &mut CargoStore,
    num_days: i64,
    usage: &[UsageRequest],
) -> DomainResult<SimulationReport> {
    let mut report = SimulationReport::empty(store.today());
    if num_days <= 0 {
        return Ok(report);
    }
    let used = resolve(store, usage);

    for _ in 0..num_days {
        let mut consumed = Vec::with_capacity(used.len());
        for id in &used {
            let item = store.item_mut(id)?;
            if item.is_stowed() {
                let remaining = item.consume_use();
                consumed.push((id.clone(), item.name().to_string(), remaining));
            }
        }

        let today = store.advance_clock()?;
        report
            .items_used
            .extend(consumed.into_iter().map(|(item_id, name, remaining_uses)| ItemUsage {
                item_id,
                name,
                remaining_uses,
                date: today,
            }));

        let due: Vec<(ItemId, String, WasteReason)> = store
            .items()
            .filter_map(|i| {
                i.waste_condition(today)
                    .map(|reason| (i.id().clone(), i.name().to_string(), reason))
            })
            .collect();
        let created_at = store.midnight();
        for (item_id, name, reason) in due {
            store.record_waste(&item_id, reason, created_at)?;
            let change = ItemChange {
                item_id,
                name,
                date: today,
            };
            match reason {
                WasteReason::Expired => report.items_expired.push(change),
                WasteReason::Depleted => report.items_depleted.push(change),
            }
        }
    }
    report.new_date = store.today();
    Ok(report)
}

/// Advance to `target`; a target that is not in the future is a no-op.
pub fn advance_to(
    store: &mut CargoStore,
    target: NaiveDate,
    usage: &[UsageRequest],
) -> DomainResult<SimulationReport> {
    let days = (target - store.today()).num_days();
    advance(store, days, usage)
}
