//! Retrieval planning and execution.
//!
//! A plan lists what the crew does at the open face: lift every occluder
//! (nearest first), take the target, put the lifted items back in reverse
//! order. Occluders that are leaving anyway are set aside instead.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use stowage_cargo::{BoundingBox, Container, Placement, RetrievalAction, RetrievalStep};
use stowage_core::{DomainError, DomainResult, Entity, ItemId};

use crate::store::CargoStore;

/// Plan the retrieval of a stowed item.
pub fn plan_retrieval(
    store: &CargoStore,
    item_id: &ItemId,
    set_aside: &BTreeSet<ItemId>,
) -> DomainResult<Vec<RetrievalStep>> {
    let item = store.item(item_id)?;
    if !item.is_stowed() {
        return Err(item.not_stowed());
    }
    plan_extraction(store, item_id, set_aside)
}

/// Plan taking out anything that holds a claim, waste included.
pub fn plan_extraction(
    store: &CargoStore,
    item_id: &ItemId,
    set_aside: &BTreeSet<ItemId>,
) -> DomainResult<Vec<RetrievalStep>> {
    let item = store.item(item_id)?;
    let (container_id, _) = store
        .claim_location(item_id)
        .ok_or_else(|| item.not_stowed())?;
    steps_in(store, store.container(container_id)?, item_id, set_aside)
}

pub(crate) fn steps_in(
    store: &CargoStore,
    container: &Container,
    target: &ItemId,
    set_aside: &BTreeSet<ItemId>,
) -> DomainResult<Vec<RetrievalStep>> {
    let occluders = container.occluders_of(target).ok_or_else(|| {
        DomainError::conflict(format!(
            "item {target} holds no claim in container {}",
            container.id()
        ))
    })?;
    let name_of = |id: &ItemId| {
        store
            .item(id)
            .map(|i| i.name().to_string())
            .unwrap_or_default()
    };

    let mut steps = Vec::with_capacity(occluders.len() * 2 + 1);
    for (id, _) in &occluders {
        let action = if set_aside.contains(id) {
            RetrievalAction::SetAside
        } else {
            RetrievalAction::Remove
        };
        steps.push((action, id.clone()));
    }
    steps.push((RetrievalAction::Retrieve, target.clone()));
    for (id, _) in occluders.iter().rev().filter(|(id, _)| !set_aside.contains(id)) {
        steps.push((RetrievalAction::PlaceBack, id.clone()));
    }

    Ok(steps
        .into_iter()
        .enumerate()
        .map(|(n, (action, item_id))| RetrievalStep {
            step: n + 1,
            action,
            item_name: name_of(&item_id),
            item_id,
        })
        .collect())
}

/// Claims that left a container while a plan was applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRetrieval {
    pub retrieved: Vec<(ItemId, BoundingBox)>,
    pub set_aside: Vec<(ItemId, BoundingBox)>,
}

/// Execute `steps` against `container`'s claims.
///
/// Runs on a copy and writes back only if every step is legal: a `Retrieve`
/// with occluders still in place, a `PlaceBack` of something never removed or
/// a removed item left out at the end are all rejected.
pub fn apply_retrieval(
    container: &mut Container,
    steps: &[RetrievalStep],
) -> DomainResult<AppliedRetrieval> {
    let mut scratch = container.clone();
    let mut lifted: BTreeMap<ItemId, BoundingBox> = BTreeMap::new();
    let mut applied = AppliedRetrieval::default();

    for step in steps {
        let id = &step.item_id;
        match step.action {
            RetrievalAction::Remove => {
                let bbox = release(&mut scratch, id)?;
                lifted.insert(id.clone(), bbox);
            }
            RetrievalAction::SetAside => {
                let bbox = release(&mut scratch, id)?;
                applied.set_aside.push((id.clone(), bbox));
            }
            RetrievalAction::Retrieve => {
                let blocking = scratch.occluders_of(id).unwrap_or_default();
                if let Some((first, _)) = blocking.first() {
                    return Err(DomainError::conflict(format!(
                        "item {id} is still blocked by {first}"
                    )));
                }
                let bbox = release(&mut scratch, id)?;
                applied.retrieved.push((id.clone(), bbox));
            }
            RetrievalAction::PlaceBack => {
                let bbox = lifted.remove(id).ok_or_else(|| {
                    DomainError::conflict(format!("item {id} is placed back but was never removed"))
                })?;
                scratch.claim(id.clone(), bbox)?;
            }
        }
    }
    if let Some(id) = lifted.keys().next() {
        return Err(DomainError::conflict(format!(
            "item {id} was removed but never placed back"
        )));
    }
    *container = scratch;
    Ok(applied)
}

fn release(container: &mut Container, id: &ItemId) -> DomainResult<BoundingBox> {
    container.release(id).ok_or_else(|| {
        DomainError::conflict(format!(
            "item {id} holds no claim in container {}",
            container.id()
        ))
    })
}

/// A committed retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutcome {
    pub steps: Vec<RetrievalStep>,
    pub vacated: Placement,
    pub remaining_uses: Option<u32>,
}

/// Plan, execute and commit the retrieval of a stowed item.
pub fn retrieve(store: &mut CargoStore, item_id: &ItemId) -> DomainResult<RetrievalOutcome> {
    let steps = plan_retrieval(store, item_id, &BTreeSet::new())?;
    let (container_id, _) = store
        .claim_location(item_id)
        .ok_or_else(|| DomainError::conflict(format!("item {item_id} lost its claim")))?;
    let mut container = store.container(container_id)?.clone();
    apply_retrieval(&mut container, &steps)?;
    let (vacated, remaining_uses) = store.commit_retrieval(item_id, container)?;
    Ok(RetrievalOutcome {
        steps,
        vacated,
        remaining_uses,
    })
}

/// Take every item of `targets` out of `container`, nearest first. Targets
/// found in front of another target are set aside rather than put back.
pub(crate) fn extraction_sequence(
    store: &CargoStore,
    container: &mut Container,
    targets: &BTreeSet<ItemId>,
) -> DomainResult<Vec<RetrievalStep>> {
    let mut order: Vec<(ItemId, f64)> = container
        .claims()
        .filter(|(id, _)| targets.contains(*id))
        .map(|(id, bbox)| (id.clone(), bbox.depth_from_open_face()))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut remaining: BTreeSet<ItemId> = order.iter().map(|(id, _)| id.clone()).collect();
    let mut steps = Vec::new();
    for (id, _) in order {
        if !remaining.remove(&id) {
            continue;
        }
        let plan = steps_in(store, container, &id, &remaining)?;
        let applied = apply_retrieval(container, &plan)?;
        for (gone, _) in &applied.set_aside {
            remaining.remove(gone);
        }
        steps.extend(plan);
    }
    Ok(steps)
}

/// Renumber concatenated plans so steps count up from 1.
pub(crate) fn renumber(steps: &mut [RetrievalStep]) {
    for (n, step) in steps.iter_mut().enumerate() {
        step.step = n + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{container_spec, cube_at, day0, item_spec};
    use proptest::prelude::*;
    use stowage_core::ContainerId;

    fn id(s: &str) -> ItemId {
        ItemId::from(s)
    }

    fn c1() -> ContainerId {
        ContainerId::from("C1")
    }

    /// target at the back, `mid` and `front` in its line of sight, `aside`
    /// next to it.
    fn stacked() -> CargoStore {
        let mut store = CargoStore::new(day0());
        store
            .register_container(container_spec("C1", "Lab", 100.0, 100.0, 100.0))
            .unwrap();
        for (name, bbox) in [
            ("target", cube_at(0.0, 50.0, 0.0, 10.0)),
            ("mid", cube_at(0.0, 20.0, 0.0, 10.0)),
            ("front", cube_at(5.0, 0.0, 5.0, 10.0)),
            ("aside", cube_at(30.0, 0.0, 0.0, 10.0)),
        ] {
            store
                .register_item(item_spec(name, 10.0, 10.0, 10.0, 50, "Lab"))
                .unwrap();
            store.place_at(&id(name), &c1(), bbox).unwrap();
        }
        store
    }

    fn actions(steps: &[RetrievalStep]) -> Vec<(RetrievalAction, &str)> {
        steps.iter().map(|s| (s.action, s.item_id.as_str())).collect()
    }

    #[test]
    fn unobstructed_item_is_a_single_step() {
        let store = stacked();
        let steps = plan_retrieval(&store, &id("aside"), &BTreeSet::new()).unwrap();
        assert_eq!(actions(&steps), vec![(RetrievalAction::Retrieve, "aside")]);
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[0].item_name, "item aside");
    }

    #[test]
    fn occluders_are_removed_nearest_first_and_placed_back_in_reverse() {
        let store = stacked();
        let steps = plan_retrieval(&store, &id("target"), &BTreeSet::new()).unwrap();
        assert_eq!(
            actions(&steps),
            vec![
                (RetrievalAction::Remove, "front"),
                (RetrievalAction::Remove, "mid"),
                (RetrievalAction::Retrieve, "target"),
                (RetrievalAction::PlaceBack, "mid"),
                (RetrievalAction::PlaceBack, "front"),
            ]
        );
        let numbers: Vec<usize> = steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn set_aside_occluders_are_not_placed_back() {
        let store = stacked();
        let set_aside = BTreeSet::from([id("mid")]);
        let steps = plan_retrieval(&store, &id("target"), &set_aside).unwrap();
        assert_eq!(
            actions(&steps),
            vec![
                (RetrievalAction::Remove, "front"),
                (RetrievalAction::SetAside, "mid"),
                (RetrievalAction::Retrieve, "target"),
                (RetrievalAction::PlaceBack, "front"),
            ]
        );
    }

    #[test]
    fn non_stowed_items_are_rejected() {
        let mut store = stacked();
        store
            .register_item(item_spec("loose", 1.0, 1.0, 1.0, 50, "Lab"))
            .unwrap();
        assert!(matches!(
            plan_retrieval(&store, &id("loose"), &BTreeSet::new()),
            Err(DomainError::ItemNotStowed { status: "staged", .. })
        ));
        assert!(matches!(
            plan_retrieval(&store, &id("ghost"), &BTreeSet::new()),
            Err(DomainError::ItemNotFound(_))
        ));
    }

    #[test]
    fn retrieve_frees_space_and_restores_occluders() {
        let mut store = stacked();
        let before = store.container(&c1()).unwrap().clone();
        let outcome = retrieve(&mut store, &id("target")).unwrap();
        assert_eq!(outcome.steps.len(), 5);

        let after = store.container(&c1()).unwrap();
        assert!(after.claim_of(&id("target")).is_none());
        for other in ["mid", "front", "aside"] {
            assert_eq!(after.claim_of(&id(other)), before.claim_of(&id(other)));
        }
        assert_eq!(
            store.item(&id("target")).unwrap().status(),
            stowage_cargo::ItemStatus::Retrieved
        );
        store.verify().unwrap();
    }

    #[test]
    fn retrieve_decrements_remaining_uses() {
        let mut store = CargoStore::new(day0());
        store
            .register_container(container_spec("C1", "Lab", 50.0, 50.0, 50.0))
            .unwrap();
        let mut spec = item_spec("kit", 10.0, 10.0, 10.0, 50, "Lab");
        spec.usage_limit = Some(3);
        store.register_item(spec).unwrap();
        store.place_at(&id("kit"), &c1(), cube_at(0.0, 0.0, 0.0, 10.0)).unwrap();

        let outcome = retrieve(&mut store, &id("kit")).unwrap();
        assert_eq!(outcome.remaining_uses, Some(2));
        assert!(matches!(
            retrieve(&mut store, &id("kit")),
            Err(DomainError::ItemNotStowed { .. })
        ));
    }

    #[test]
    fn apply_rejects_blocked_retrieve() {
        let store = stacked();
        let mut container = store.container(&c1()).unwrap().clone();
        let before = container.clone();
        let steps = vec![RetrievalStep {
            step: 1,
            action: RetrievalAction::Retrieve,
            item_id: id("target"),
            item_name: String::new(),
        }];
        assert!(matches!(
            apply_retrieval(&mut container, &steps),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(container, before);
    }

    #[test]
    fn extraction_sets_aside_other_targets() {
        let store = stacked();
        let mut container = store.container(&c1()).unwrap().clone();
        let targets = BTreeSet::from([id("target"), id("mid")]);
        let mut steps = extraction_sequence(&store, &mut container, &targets).unwrap();
        renumber(&mut steps);

        assert!(container.claim_of(&id("target")).is_none());
        assert!(container.claim_of(&id("mid")).is_none());
        assert!(container.claim_of(&id("front")).is_some());
        assert!(steps
            .iter()
            .all(|s| !(s.action == RetrievalAction::PlaceBack && s.item_id == id("mid"))));
        assert_eq!(steps.last().map(|s| s.step), Some(steps.len()));
    }

    proptest! {
        /// After the `Remove` steps the target is unobstructed, and after the
        /// whole plan every occluder is back in its exact box.
        #[test]
        fn plans_clear_the_path_and_restore_occluders(
            boxes in proptest::collection::vec((0u8..5, 0u8..5, 0u8..5), 1..20),
            pick in 0usize..20,
        ) {
            let mut store = CargoStore::new(day0());
            store
                .register_container(container_spec("C1", "Lab", 50.0, 50.0, 50.0))
                .unwrap();
            let mut placed = Vec::new();
            for (n, (w, d, h)) in boxes.into_iter().enumerate() {
                let name = format!("i{n}");
                store.register_item(item_spec(&name, 10.0, 10.0, 10.0, 50, "Lab")).unwrap();
                let bbox = cube_at(f64::from(w) * 10.0, f64::from(d) * 10.0, f64::from(h) * 10.0, 10.0);
                if store.place_at(&id(&name), &c1(), bbox).is_ok() {
                    placed.push(name);
                }
            }
            let target = id(&placed[pick % placed.len()]);
            let before = store.container(&c1()).unwrap().clone();
            let steps = plan_retrieval(&store, &target, &BTreeSet::new()).unwrap();

            let removes: Vec<RetrievalStep> = steps
                .iter()
                .take_while(|s| s.action == RetrievalAction::Remove)
                .cloned()
                .collect();
            let mut partial = before.clone();
            for s in &removes {
                partial.release(&s.item_id);
            }
            prop_assert!(partial.occluders_of(&target).unwrap().is_empty());

            let mut full = before.clone();
            apply_retrieval(&mut full, &steps).unwrap();
            prop_assert!(full.claim_of(&target).is_none());
            for s in &removes {
                prop_assert_eq!(full.claim_of(&s.item_id), before.claim_of(&s.item_id));
            }
        }
    }
}
