//! Return manifests and undocking.
//!
//! Selection is greedy by density (volume per unit mass, massless items
//! first), oldest waste first on ties. It is bounded by the mass budget and
//! by the free volume of the undocking module. Greedy is not optimal; it is
//! predictable and linear after the sort.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use stowage_cargo::geometry::EPSILON;
use stowage_cargo::{ReturnItem, ReturnManifest, ReturnStep, RetrievalStep};
use stowage_core::{ContainerId, DomainError, DomainResult, ItemId};

use crate::retrieval::{extraction_sequence, renumber};
use crate::store::CargoStore;

struct Candidate {
    item: ReturnItem,
    sequence: u64,
}

impl Candidate {
    fn density(&self) -> f64 {
        if self.item.mass <= EPSILON {
            f64::INFINITY
        } else {
            self.item.volume / self.item.mass
        }
    }
}

/// Build a manifest without storing it.
pub fn plan_return(
    store: &CargoStore,
    undocking: &ContainerId,
    undocking_date: NaiveDate,
    max_mass: f64,
) -> DomainResult<ReturnManifest> {
    if !max_mass.is_finite() || max_mass < 0.0 {
        return Err(DomainError::MassBudgetExceeded(max_mass));
    }
    let capacity = store.container(undocking)?.free_volume();

    let mut candidates = store
        .waste_records()
        .into_iter()
        .map(|record| {
            let item = store.item(&record.item_id)?;
            Ok(Candidate {
                item: ReturnItem {
                    item_id: record.item_id.clone(),
                    name: item.name().to_string(),
                    reason: record.reason,
                    mass: item.mass(),
                    volume: item.volume(),
                    container_id: record.container_id.clone(),
                },
                sequence: record.sequence,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;
    candidates.sort_by(|a, b| {
        b.density()
            .total_cmp(&a.density())
            .then_with(|| a.sequence.cmp(&b.sequence))
            .then_with(|| a.item.item_id.cmp(&b.item.item_id))
    });

    let mut items = Vec::new();
    let (mut total_mass, mut total_volume, mut moved_volume) = (0.0, 0.0, 0.0);
    for candidate in candidates {
        let item = candidate.item;
        // Waste already inside the module takes no extra room.
        let needs_room = item.container_id.as_ref() != Some(undocking);
        let extra_volume = if needs_room { item.volume } else { 0.0 };
        if total_mass + item.mass > max_mass
            || moved_volume + extra_volume > capacity + EPSILON
        {
            continue;
        }
        total_mass += item.mass;
        total_volume += item.volume;
        moved_volume += extra_volume;
        items.push(item);
    }

    let return_plan = items
        .iter()
        .filter_map(|item| {
            let from = item.container_id.as_ref()?;
            (from != undocking).then(|| (item, from.clone()))
        })
        .enumerate()
        .map(|(n, (item, from_container))| ReturnStep {
            step: n + 1,
            item_id: item.item_id.clone(),
            item_name: item.name.clone(),
            from_container,
            to_container: undocking.clone(),
        })
        .collect();

    let selected: BTreeSet<ItemId> = items.iter().map(|i| i.item_id.clone()).collect();
    let (retrieval_steps, _) = extraction_plan(store, undocking, &selected)?;

    Ok(ReturnManifest {
        undocking_container_id: undocking.clone(),
        undocking_date,
        max_mass,
        items,
        total_mass,
        total_volume,
        return_plan,
        retrieval_steps,
    })
}

/// Build a manifest and make it the active one for `undocking`.
pub fn build_return_plan(
    store: &mut CargoStore,
    undocking: &ContainerId,
    undocking_date: NaiveDate,
    max_mass: f64,
) -> DomainResult<ReturnManifest> {
    let manifest = plan_return(store, undocking, undocking_date, max_mass)?;
    store.set_manifest(manifest.clone());
    Ok(manifest)
}

/// Steps to pull `selected` out of every source container except the
/// undocking module itself, plus the containers as they look afterwards.
fn extraction_plan(
    store: &CargoStore,
    undocking: &ContainerId,
    selected: &BTreeSet<ItemId>,
) -> DomainResult<(Vec<RetrievalStep>, Vec<stowage_cargo::Container>)> {
    let mut by_container: BTreeMap<&ContainerId, BTreeSet<ItemId>> = BTreeMap::new();
    for id in selected {
        if let Some((container_id, _)) = store.claim_location(id) {
            by_container.entry(container_id).or_default().insert(id.clone());
        }
    }

    let mut steps = Vec::new();
    let mut updated = Vec::with_capacity(by_container.len());
    for (container_id, targets) in by_container {
        let mut container = store.container(container_id)?.clone();
        if container_id == undocking {
            for id in &targets {
                container.release(id);
            }
        } else {
            steps.extend(extraction_sequence(store, &mut container, &targets)?);
        }
        updated.push(container);
    }
    renumber(&mut steps);
    Ok((steps, updated))
}

/// What an undocking removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    pub undocking_container_id: ContainerId,
    pub items_removed: usize,
    pub removed: Vec<ItemId>,
    pub total_mass: f64,
    pub retrieval_steps: Vec<RetrievalStep>,
}

/// Execute the active manifest for `undocking`: pull every item that is
/// still waste out of its container and mark it removed. The manifest is
/// consumed; a second call fails with `NoActiveManifest`.
pub fn complete_undocking(
    store: &mut CargoStore,
    undocking: &ContainerId,
) -> DomainResult<RemovalReport> {
    let manifest = store
        .manifest(undocking)
        .ok_or_else(|| DomainError::NoActiveManifest(undocking.clone()))?;
    let pending: Vec<(ItemId, f64)> = manifest
        .items
        .iter()
        .filter(|i| {
            store
                .item(&i.item_id)
                .is_ok_and(|item| item.status() == stowage_cargo::ItemStatus::Waste)
        })
        .map(|i| (i.item_id.clone(), i.mass))
        .collect();
    let selected: BTreeSet<ItemId> = pending.iter().map(|(id, _)| id.clone()).collect();
    let (retrieval_steps, updated) = extraction_plan(store, undocking, &selected)?;

    store.take_manifest(undocking);
    for container in updated {
        store.replace_container(container);
    }
    for id in &selected {
        store.dispose(id)?;
    }

    Ok(RemovalReport {
        undocking_container_id: undocking.clone(),
        items_removed: pending.len(),
        total_mass: pending.iter().map(|(_, m)| m).sum(),
        removed: pending.into_iter().map(|(id, _)| id).collect(),
        retrieval_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{container_spec, cube_at, day0};
    use proptest::prelude::*;
    use stowage_cargo::{BoundingBox, Dimensions, ItemSpec, ItemStatus, Point3, WasteReason};

    fn undock() -> ContainerId {
        ContainerId::from("U1")
    }

    fn store() -> CargoStore {
        let mut store = CargoStore::new(day0());
        store
            .register_container(container_spec("C1", "Storage", 300.0, 50.0, 50.0))
            .unwrap();
        store
            .register_container(container_spec("U1", "Airlock", 100.0, 100.0, 100.0))
            .unwrap();
        store
    }

    /// Stow a waste item of `volume` (as a 1 x 1 x volume bar) and `mass` at
    /// width offset `slot`.
    fn waste(store: &mut CargoStore, id: &str, volume: f64, mass: f64, slot: f64) {
        store
            .register_item(ItemSpec {
                item_id: ItemId::from(id),
                name: format!("waste {id}"),
                dimensions: Dimensions::new(1.0, volume, 1.0).unwrap(),
                mass,
                priority: 10,
                expiry_date: None,
                usage_limit: None,
                preferred_zone: "Storage".into(),
            })
            .unwrap();
        let bbox = BoundingBox::at(
            Point3::new(slot, 0.0, 0.0),
            Dimensions::new(1.0, volume, 1.0).unwrap(),
        );
        let item_id = ItemId::from(id);
        store.place_at(&item_id, &ContainerId::from("C1"), bbox).unwrap();
        store
            .record_waste(&item_id, WasteReason::Expired, store.midnight())
            .unwrap();
    }

    #[test]
    fn greedy_selection_respects_the_budget() {
        let mut store = store();
        waste(&mut store, "v10", 10.0, 4.0, 0.0);
        waste(&mut store, "v6", 6.0, 3.0, 2.0);
        waste(&mut store, "v3", 3.0, 1.0, 4.0);

        let manifest = plan_return(&store, &undock(), day0(), 5.0).unwrap();
        assert!(manifest.total_mass <= 5.0);
        let mass: f64 = manifest.items.iter().map(|i| i.mass).sum();
        let volume: f64 = manifest.items.iter().map(|i| i.volume).sum();
        assert!((manifest.total_mass - mass).abs() < 1e-9);
        assert!((manifest.total_volume - volume).abs() < 1e-9);
        // Densest first.
        assert_eq!(manifest.items[0].item_id.as_str(), "v3");
        assert_eq!(manifest.return_plan.len(), manifest.items.len());
        assert!(manifest.return_plan.iter().all(|s| s.to_container == undock()));
    }

    #[test]
    fn rounding_never_pushes_the_total_over_the_budget() {
        let mut store = store();
        waste(&mut store, "a", 1.0, 0.1, 0.0);
        waste(&mut store, "b", 2.0, 0.2, 2.0);
        let manifest = plan_return(&store, &undock(), day0(), 0.3).unwrap();
        assert!(manifest.total_mass <= 0.3);
        let ids: Vec<&str> = manifest.items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn massless_waste_goes_first_and_ties_go_to_the_oldest() {
        let mut store = store();
        waste(&mut store, "old", 2.0, 1.0, 0.0);
        waste(&mut store, "new", 2.0, 1.0, 2.0);
        waste(&mut store, "air", 1.0, 0.0, 4.0);
        let manifest = plan_return(&store, &undock(), day0(), 1.0).unwrap();
        let ids: Vec<&str> = manifest.items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["air", "old"]);
    }

    #[test]
    fn invalid_budget_and_unknown_module_are_rejected() {
        let store = store();
        assert!(matches!(
            plan_return(&store, &undock(), day0(), -1.0),
            Err(DomainError::MassBudgetExceeded(_))
        ));
        assert!(matches!(
            plan_return(&store, &undock(), day0(), f64::NAN),
            Err(DomainError::MassBudgetExceeded(_))
        ));
        assert!(matches!(
            plan_return(&store, &ContainerId::from("nope"), day0(), 10.0),
            Err(DomainError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn module_volume_caps_the_selection() {
        let mut store = CargoStore::new(day0());
        store
            .register_container(container_spec("C1", "Storage", 300.0, 50.0, 50.0))
            .unwrap();
        store
            .register_container(container_spec("U1", "Airlock", 1.0, 5.0, 1.0))
            .unwrap();
        waste(&mut store, "big", 10.0, 1.0, 0.0);
        waste(&mut store, "small", 4.0, 1.0, 2.0);
        let manifest = plan_return(&store, &undock(), day0(), 100.0).unwrap();
        let ids: Vec<&str> = manifest.items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["small"]);
    }

    #[test]
    fn rebuilding_replaces_the_active_manifest() {
        let mut store = store();
        waste(&mut store, "a", 2.0, 1.0, 0.0);
        build_return_plan(&mut store, &undock(), day0(), 0.5).unwrap();
        assert!(store.manifest(&undock()).unwrap().items.is_empty());
        build_return_plan(&mut store, &undock(), day0(), 5.0).unwrap();
        assert_eq!(store.manifest(&undock()).unwrap().items.len(), 1);
    }

    #[test]
    fn undocking_removes_selected_waste_once() {
        let mut store = store();
        waste(&mut store, "a", 2.0, 1.0, 0.0);
        waste(&mut store, "b", 3.0, 1.0, 2.0);
        build_return_plan(&mut store, &undock(), day0(), 10.0).unwrap();

        let report = complete_undocking(&mut store, &undock()).unwrap();
        assert_eq!(report.items_removed, 2);
        for id in ["a", "b"] {
            let item_id = ItemId::from(id);
            assert_eq!(store.item(&item_id).unwrap().status(), ItemStatus::Removed);
            assert!(store.waste_record(&item_id).is_none());
        }
        assert_eq!(store.container(&ContainerId::from("C1")).unwrap().claim_count(), 0);
        store.verify().unwrap();

        let snapshot: Vec<ItemStatus> = store.items().map(|i| i.status()).collect();
        assert_eq!(
            complete_undocking(&mut store, &undock()),
            Err(DomainError::NoActiveManifest(undock()))
        );
        let again: Vec<ItemStatus> = store.items().map(|i| i.status()).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn stacked_waste_is_pulled_front_to_back() {
        let mut store = store();
        // "front" sits right in front of "back" and both are waste.
        for (id, bbox) in [
            ("back", cube_at(0.0, 20.0, 0.0, 10.0)),
            ("front", cube_at(0.0, 0.0, 0.0, 10.0)),
        ] {
            store
                .register_item(ItemSpec {
                    item_id: ItemId::from(id),
                    name: id.into(),
                    dimensions: Dimensions::new(10.0, 10.0, 10.0).unwrap(),
                    mass: 1.0,
                    priority: 10,
                    expiry_date: None,
                    usage_limit: None,
                    preferred_zone: "Storage".into(),
                })
                .unwrap();
            let item_id = ItemId::from(id);
            store.place_at(&item_id, &ContainerId::from("C1"), bbox).unwrap();
            store
                .record_waste(&item_id, WasteReason::Depleted, store.midnight())
                .unwrap();
        }
        let manifest = build_return_plan(&mut store, &undock(), day0(), 10.0).unwrap();
        assert!(manifest
            .retrieval_steps
            .iter()
            .all(|s| s.action != stowage_cargo::RetrievalAction::PlaceBack));
        complete_undocking(&mut store, &undock()).unwrap();
        assert_eq!(store.container(&ContainerId::from("C1")).unwrap().claim_count(), 0);
    }

    proptest! {
        /// The manifest never exceeds its mass budget.
        #[test]
        fn manifest_respects_mass_budget(
            masses in proptest::collection::vec(0.0f64..20.0, 1..12),
            budget in 0.0f64..60.0,
        ) {
            let mut store = store();
            for (n, mass) in masses.iter().enumerate() {
                waste(&mut store, &format!("w{n}"), 1.0 + n as f64, *mass, n as f64 * 2.0);
            }
            let manifest = plan_return(&store, &undock(), day0(), budget).unwrap();
            prop_assert!(manifest.total_mass <= budget);
        }
    }
}
