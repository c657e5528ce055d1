//! Placement search.
//!
//! Candidates are enumerated, never backtracked: for every ranked container,
//! every distinct rotation of the item and every anchor point, the box is
//! tried and scored. The smallest [`SearchKey`] wins. If nothing fits, a
//! single lower-or-equal priority item may be moved out of the way.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use stowage_cargo::geometry::EPSILON;
use stowage_cargo::{
    orientations, BoundingBox, Container, Dimensions, Item, ItemStatus, Orientation, Placement,
    Point3,
};
use stowage_core::{ContainerId, DomainError, DomainResult, Entity, ItemId};

use crate::store::CargoStore;

/// Tunables for the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Items at or above this priority are kept near the open face; the rest
    /// are pushed towards the back wall.
    pub deep_storage_threshold: u8,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            deep_storage_threshold: 50,
        }
    }
}

/// A stowed item moved aside to make room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    pub item_id: ItemId,
    pub from: Placement,
    pub to: Placement,
}

/// Outcome of a successful search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPlan {
    pub item_id: ItemId,
    pub placement: Placement,
    pub relocation: Option<Relocation>,
}

impl PlacementPlan {
    fn moves(&self) -> Vec<(ItemId, Placement)> {
        let mut moves = Vec::with_capacity(2);
        if let Some(r) = &self.relocation {
            moves.push((r.item_id.clone(), r.to.clone()));
        }
        moves.push((self.item_id.clone(), self.placement.clone()));
        moves
    }
}

/// Score of a candidate box. Compared field by field, smallest first; the
/// container id breaks ties between equal scores in different containers.
#[derive(Debug, Clone, Copy)]
struct SearchKey {
    zone_group: u8,
    occluders: usize,
    depth_key: f64,
    displaced: f64,
    anchor: Point3,
    orientation: usize,
}

impl SearchKey {
    fn compare(&self, ours: &ContainerId, other: &Self, theirs: &ContainerId) -> Ordering {
        self.zone_group
            .cmp(&other.zone_group)
            .then_with(|| self.occluders.cmp(&other.occluders))
            .then_with(|| cmp_f64(self.depth_key, other.depth_key))
            .then_with(|| cmp_f64(self.displaced, other.displaced))
            .then_with(|| ours.cmp(theirs))
            .then_with(|| cmp_f64(self.anchor.height, other.anchor.height))
            .then_with(|| cmp_f64(self.anchor.width, other.anchor.width))
            .then_with(|| cmp_f64(self.anchor.depth, other.anchor.depth))
            .then_with(|| self.orientation.cmp(&other.orientation))
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    if (a - b).abs() <= EPSILON {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    container_id: ContainerId,
    position: BoundingBox,
    orientation: Orientation,
    key: SearchKey,
}

impl Candidate {
    fn placement(&self) -> Placement {
        Placement {
            container_id: self.container_id.clone(),
            position: self.position,
            orientation: self.orientation,
        }
    }
}

/// A container as seen by one search.
struct Slot<'a> {
    zone_group: u8,
    container: &'a Container,
}

/// What is being placed.
#[derive(Debug, Clone, Copy)]
struct Load {
    dims: Dimensions,
    priority: u8,
    displaced: f64,
}

/// Order candidate containers: preferred zone first, then the rest; each group
/// by ascending free volume, then id.
pub fn rank_containers<'a>(
    store: &'a CargoStore,
    candidates: &[ContainerId],
    preferred_zone: &str,
) -> DomainResult<Vec<(u8, &'a Container)>> {
    let ids: BTreeSet<&ContainerId> = candidates.iter().collect();
    let mut ranked = ids
        .into_iter()
        .map(|id| {
            let container = store.container(id)?;
            let group = u8::from(container.zone() != preferred_zone);
            Ok((group, container))
        })
        .collect::<DomainResult<Vec<_>>>()?;
    ranked.sort_by(|(ga, a), (gb, b)| {
        ga.cmp(gb)
            .then_with(|| a.free_volume().total_cmp(&b.free_volume()))
            .then_with(|| a.id().cmp(b.id()))
    });
    Ok(ranked)
}

/// Anchor points for a box of size `size`: the origin, three far corners of
/// every claim, the spot right in front of every claim, and the back-wall
/// projection of all of those.
fn anchors(container: &Container, size: Dimensions) -> Vec<Point3> {
    let mut points = vec![Point3::ORIGIN];
    for (_, claim) in container.claims() {
        points.push(Point3::new(claim.end.width, claim.start.depth, claim.start.height));
        points.push(Point3::new(claim.start.width, claim.end.depth, claim.start.height));
        points.push(Point3::new(claim.start.width, claim.start.depth, claim.end.height));
        let front = claim.start.depth - size.depth;
        if front >= -EPSILON {
            points.push(Point3::new(claim.start.width, front.max(0.0), claim.start.height));
        }
    }
    let back = container.dimensions().depth - size.depth;
    if back >= -EPSILON {
        let projected: Vec<Point3> = points
            .iter()
            .map(|p| Point3::new(p.width, back.max(0.0), p.height))
            .collect();
        points.extend(projected);
    }
    points.sort_by(|a, b| {
        a.height
            .total_cmp(&b.height)
            .then_with(|| a.width.total_cmp(&b.width))
            .then_with(|| a.depth.total_cmp(&b.depth))
    });
    points.dedup_by(|a, b| {
        cmp_f64(a.height, b.height).is_eq()
            && cmp_f64(a.width, b.width).is_eq()
            && cmp_f64(a.depth, b.depth).is_eq()
    });
    points
}

fn best_candidate(slots: &[Slot<'_>], load: Load, policy: &PlacementPolicy) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for slot in slots {
        let bounds = slot.container.dimensions();
        let mut tried: Vec<Dimensions> = Vec::with_capacity(6);
        for (orientation, size) in orientations(load.dims) {
            if tried.iter().any(|d| d.approx_eq(&size)) || !size.fits_within(&bounds) {
                continue;
            }
            tried.push(size);
            for anchor in anchors(slot.container, size) {
                let position = BoundingBox::at(anchor, size);
                if !slot.container.is_free(&position, None) {
                    continue;
                }
                let depth_key = if load.priority >= policy.deep_storage_threshold {
                    position.depth_from_open_face()
                } else {
                    (bounds.depth - position.end.depth).max(0.0)
                };
                let key = SearchKey {
                    zone_group: slot.zone_group,
                    occluders: slot.container.occluder_count(&position),
                    depth_key,
                    displaced: load.displaced,
                    anchor,
                    orientation: orientation.index(),
                };
                let ours = slot.container.id();
                if best
                    .as_ref()
                    .is_none_or(|b| key.compare(ours, &b.key, &b.container_id).is_lt())
                {
                    best = Some(Candidate {
                        container_id: slot.container.id().clone(),
                        position,
                        orientation,
                        key,
                    });
                }
            }
        }
    }
    best
}

fn slots<'a, C>(ranked: &'a [(u8, C)]) -> Vec<Slot<'a>>
where
    C: core::borrow::Borrow<Container>,
{
    ranked
        .iter()
        .map(|(zone_group, container)| Slot {
            zone_group: *zone_group,
            container: <C as core::borrow::Borrow<Container>>::borrow(container),
        })
        .collect()
}

/// Find a placement for `item_id` among `candidates` without mutating anything.
pub fn plan_placement(
    store: &CargoStore,
    item_id: &ItemId,
    candidates: &[ContainerId],
    policy: &PlacementPolicy,
) -> DomainResult<PlacementPlan> {
    let item = store.item(item_id)?;
    match item.status() {
        ItemStatus::Staged | ItemStatus::Retrieved => {}
        ItemStatus::Stowed => {
            return Err(DomainError::conflict(format!(
                "item {item_id} already holds a claim"
            )));
        }
        status => {
            return Err(DomainError::conflict(format!(
                "item {item_id} is {status} and cannot be stowed"
            )));
        }
    }
    let ranked = rank_containers(store, candidates, item.preferred_zone())?;
    let load = Load {
        dims: item.dimensions(),
        priority: item.priority(),
        displaced: 0.0,
    };

    if let Some(found) = best_candidate(&slots(&ranked), load, policy) {
        debug!(
            item = %item_id,
            container = %found.container_id,
            occluders = found.key.occluders,
            "placement found"
        );
        return Ok(PlacementPlan {
            item_id: item_id.clone(),
            placement: found.placement(),
            relocation: None,
        });
    }

    debug!(item = %item_id, "no free space, trying rearrangement");
    rearrange(store, item, &ranked, policy).ok_or_else(|| DomainError::NoSpaceAvailable(item_id.clone()))
}

/// One-move fallback: lift a single lower-or-equal priority item, place the
/// new item, then re-place the lifted one.
fn rearrange(
    store: &CargoStore,
    item: &Item,
    ranked: &[(u8, &Container)],
    policy: &PlacementPolicy,
) -> Option<PlacementPlan> {
    let mut victims: Vec<&Item> = ranked
        .iter()
        .flat_map(|(_, c)| c.claims().map(|(id, _)| id))
        .filter_map(|id| store.item(id).ok())
        .filter(|v| v.is_stowed() && v.priority() <= item.priority())
        .collect();
    victims.sort_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| a.id().cmp(b.id())));

    for victim in victims {
        let Some(from) = victim.placement() else {
            continue;
        };
        let mut scratch: Vec<(u8, Container)> =
            ranked.iter().map(|(g, c)| (*g, (*c).clone())).collect();
        let Some((_, home)) = scratch.iter_mut().find(|(_, c)| c.id() == &from.container_id) else {
            continue;
        };
        home.release(victim.id());

        let load = Load {
            dims: item.dimensions(),
            priority: item.priority(),
            displaced: victim.volume(),
        };
        let Some(spot) = best_candidate(&slots(&scratch), load, policy) else {
            continue;
        };
        let claimed = scratch
            .iter_mut()
            .find(|(_, c)| c.id() == &spot.container_id)
            .is_some_and(|(_, c)| c.claim(item.id().clone(), spot.position).is_ok());
        if !claimed {
            continue;
        }

        let victim_load = Load {
            dims: victim.dimensions(),
            priority: victim.priority(),
            displaced: 0.0,
        };
        let Some(new_home) = best_candidate(&slots(&scratch), victim_load, policy) else {
            continue;
        };
        debug!(
            item = %item.id(),
            moved = %victim.id(),
            "rearrangement found"
        );
        return Some(PlacementPlan {
            item_id: item.id().clone(),
            placement: spot.placement(),
            relocation: Some(Relocation {
                item_id: victim.id().clone(),
                from: from.clone(),
                to: new_home.placement(),
            }),
        });
    }
    None
}

/// Commit a plan produced by [`plan_placement`].
///
/// The plan must still describe the store: the item must not have been
/// stowed elsewhere since, and a relocated item must still sit where the
/// plan found it.
pub fn commit_placement(store: &mut CargoStore, plan: &PlacementPlan) -> DomainResult<()> {
    let item = store.item(&plan.item_id)?;
    if item.is_stowed() {
        return Err(DomainError::conflict(format!(
            "item {} was stowed while its placement was planned",
            plan.item_id
        )));
    }
    if let Some(r) = &plan.relocation {
        if store.item(&r.item_id)?.placement() != Some(&r.from) {
            return Err(DomainError::conflict(format!(
                "item {} moved while a rearrangement around it was planned",
                r.item_id
            )));
        }
    }
    store.apply_placements(plan.moves())
}

/// Search and commit in one step.
pub fn place(
    store: &mut CargoStore,
    item_id: &ItemId,
    candidates: &[ContainerId],
    policy: &PlacementPolicy,
) -> DomainResult<PlacementPlan> {
    let plan = plan_placement(store, item_id, candidates, policy)?;
    commit_placement(store, &plan)?;
    Ok(plan)
}

/// Result of placing several items against a what-if store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub placements: Vec<PlacementPlan>,
    pub unplaced: Vec<(ItemId, String)>,
}

/// Place `items` one by one (priority descending, then volume ascending, then
/// id) into `candidates`. Failures are reported per item.
pub fn place_batch(
    store: &mut CargoStore,
    items: &[ItemId],
    candidates: &[ContainerId],
    policy: &PlacementPolicy,
) -> BatchOutcome {
    let mut order: Vec<(&ItemId, u8, f64)> = items
        .iter()
        .map(|id| {
            store
                .item(id)
                .map(|i| (id, i.priority(), i.volume()))
                .unwrap_or((id, 0, 0.0))
        })
        .collect();
    order.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.2.total_cmp(&b.2))
            .then_with(|| a.0.cmp(b.0))
    });
    order.dedup_by(|a, b| a.0 == b.0);

    let mut outcome = BatchOutcome::default();
    for (id, _, _) in order {
        match place(store, id, candidates, policy) {
            Ok(plan) => outcome.placements.push(plan),
            Err(err) => outcome.unplaced.push((id.clone(), err.to_string())),
        }
    }
    outcome
}
