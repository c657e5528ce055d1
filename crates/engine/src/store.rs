//! Owned cargo state.
//!
//! `CargoStore` is the arena every planner works against: containers, items,
//! waste records, the active return manifests and the mission clock. It is a
//! plain value (`Clone` gives a what-if copy); locking is the service's job.
//!
//! Every mutating method is all-or-nothing: it validates and stages changes on
//! copies of the touched containers and only writes back once nothing can
//! fail any more.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, NaiveDate, Utc};

use stowage_cargo::{
    BoundingBox, Container, ContainerSpec, Item, ItemSpec, ItemStatus, Orientation, Placement,
    ReturnManifest, WasteReason, WasteRecord,
};
use stowage_core::{ContainerId, DomainError, DomainResult, Entity, ItemId};

#[derive(Debug, Clone)]
pub struct CargoStore {
    today: NaiveDate,
    containers: BTreeMap<ContainerId, Container>,
    items: BTreeMap<ItemId, Item>,
    waste: BTreeMap<ItemId, WasteRecord>,
    manifests: BTreeMap<ContainerId, ReturnManifest>,
    next_waste_sequence: u64,
}

impl CargoStore {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            containers: BTreeMap::new(),
            items: BTreeMap::new(),
            waste: BTreeMap::new(),
            manifests: BTreeMap::new(),
            next_waste_sequence: 1,
        }
    }

    /// Current mission date.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub(crate) fn advance_clock(&mut self) -> DomainResult<NaiveDate> {
        self.today = self
            .today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DomainError::validation("mission date out of range"))?;
        Ok(self.today)
    }

    // ---- registration ----

    /// Register a container.
    ///
    /// Re-registering an identical spec is a no-op. A different spec replaces
    /// an empty container; an occupied one cannot change shape.
    pub fn register_container(&mut self, spec: ContainerSpec) -> DomainResult<()> {
        let container = Container::new(spec)?;
        match self.containers.get(container.id()) {
            Some(existing) if existing.spec() == container.spec() => Ok(()),
            Some(existing) if existing.claim_count() > 0 => Err(DomainError::conflict(format!(
                "container {} is occupied and cannot be redefined",
                existing.id()
            ))),
            _ => {
                self.containers.insert(container.id().clone(), container);
                Ok(())
            }
        }
    }

    /// Register a fresh, staged item.
    pub fn register_item(&mut self, spec: ItemSpec) -> DomainResult<()> {
        let item = Item::new(spec)?;
        self.insert_item(item, self.midnight())
    }

    /// Insert an item rebuilt from an exported record. Waste items get a
    /// waste record without a location until their arrangement row arrives.
    pub fn restore_item(&mut self, item: Item, recorded_at: DateTime<Utc>) -> DomainResult<()> {
        self.insert_item(item, recorded_at)
    }

    fn insert_item(&mut self, item: Item, recorded_at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(existing) = self.items.get(item.id()) {
            if existing.status() != ItemStatus::Staged {
                return Err(DomainError::conflict(format!(
                    "item {} is already registered ({})",
                    existing.id(),
                    existing.status()
                )));
            }
        }
        if item.status() == ItemStatus::Waste {
            let reason = item
                .waste_reason()
                .ok_or_else(|| DomainError::validation("waste items need a waste reason"))?;
            let record = WasteRecord {
                item_id: item.id().clone(),
                reason,
                container_id: None,
                position: None,
                created_at: recorded_at,
                sequence: self.take_waste_sequence(),
            };
            self.waste.insert(item.id().clone(), record);
        }
        self.items.insert(item.id().clone(), item);
        Ok(())
    }

    // ---- lookups ----

    pub fn container(&self, id: &ContainerId) -> DomainResult<&Container> {
        self.containers
            .get(id)
            .ok_or_else(|| DomainError::container_not_found(id))
    }

    pub fn item(&self, id: &ItemId) -> DomainResult<&Item> {
        self.items.get(id).ok_or_else(|| DomainError::item_not_found(id))
    }

    pub(crate) fn item_mut(&mut self, id: &ItemId) -> DomainResult<&mut Item> {
        self.items
            .get_mut(id)
            .ok_or_else(|| DomainError::item_not_found(id))
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.containers.keys().cloned().collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Name lookup: an exact (case-insensitive) match beats a partial one;
    /// ties go to the lowest item id.
    pub fn find_by_name(&self, name: &str) -> Option<&Item> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.items
            .values()
            .find(|i| i.name().to_lowercase() == needle)
            .or_else(|| {
                self.items
                    .values()
                    .find(|i| i.name().to_lowercase().contains(&needle))
            })
    }

    /// Waste records, oldest first.
    pub fn waste_records(&self) -> Vec<&WasteRecord> {
        let mut records: Vec<&WasteRecord> = self.waste.values().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    pub fn waste_record(&self, item_id: &ItemId) -> Option<&WasteRecord> {
        self.waste.get(item_id)
    }

    pub fn manifest(&self, undocking: &ContainerId) -> Option<&ReturnManifest> {
        self.manifests.get(undocking)
    }

    pub(crate) fn set_manifest(&mut self, manifest: ReturnManifest) {
        self.manifests
            .insert(manifest.undocking_container_id.clone(), manifest);
    }

    pub(crate) fn take_manifest(&mut self, undocking: &ContainerId) -> Option<ReturnManifest> {
        self.manifests.remove(undocking)
    }

    /// Container and box an item physically occupies: its placement while
    /// stowed, its waste record's location while waste.
    pub fn claim_location(&self, item_id: &ItemId) -> Option<(&ContainerId, &BoundingBox)> {
        let item = self.items.get(item_id)?;
        match item.status() {
            ItemStatus::Stowed => item
                .placement()
                .map(|p| (&p.container_id, &p.position)),
            ItemStatus::Waste => {
                let record = self.waste.get(item_id)?;
                record.container_id.as_ref().zip(record.position.as_ref())
            }
            _ => None,
        }
    }

    // ---- placement commits ----

    /// Commit a set of placements atomically.
    ///
    /// Items that already hold a claim are relocated; the others are stowed.
    /// Claims are released and re-taken on copies of the touched containers,
    /// so an overlap anywhere leaves the store untouched.
    pub fn apply_placements(&mut self, moves: Vec<(ItemId, Placement)>) -> DomainResult<()> {
        let mut seen = BTreeSet::new();
        for (item_id, placement) in &moves {
            if !seen.insert(item_id) {
                return Err(DomainError::conflict(format!(
                    "item {item_id} appears twice in one placement"
                )));
            }
            let item = self.item(item_id)?;
            if matches!(item.status(), ItemStatus::Waste | ItemStatus::Removed) {
                return Err(DomainError::conflict(format!(
                    "item {item_id} is {} and cannot be placed",
                    item.status()
                )));
            }
            self.container(&placement.container_id)?;
            let expected = placement.orientation.apply(item.dimensions());
            if !expected.approx_eq(&placement.position.dimensions()) {
                return Err(DomainError::invalid_dimensions(format!(
                    "box for item {item_id} does not match its {:?} orientation",
                    placement.orientation
                )));
            }
        }

        let mut touched: BTreeMap<ContainerId, Container> = BTreeMap::new();
        for (item_id, _) in &moves {
            if let Some(current) = self.item(item_id)?.placement() {
                let container = self.checkout(&mut touched, &current.container_id)?;
                container.release(item_id).ok_or_else(|| {
                    DomainError::conflict(format!(
                        "item {item_id} has no claim in container {}",
                        current.container_id
                    ))
                })?;
            }
        }
        for (item_id, placement) in &moves {
            let container = self.checkout(&mut touched, &placement.container_id)?;
            container.claim(item_id.clone(), placement.position)?;
        }

        for (item_id, placement) in moves {
            let item = self.item_mut(&item_id)?;
            if item.is_stowed() {
                item.relocate(placement)?;
            } else {
                item.stow(placement)?;
            }
        }
        self.containers.extend(touched);
        Ok(())
    }

    /// Manual placement at an exact box. The box must be one of the item's
    /// rotations, lie within the container and overlap nothing.
    pub fn place_at(
        &mut self,
        item_id: &ItemId,
        container_id: &ContainerId,
        position: BoundingBox,
    ) -> DomainResult<Placement> {
        let position = BoundingBox::new(position.start, position.end)?;
        let item = self.item(item_id)?;
        if item.is_stowed() {
            return Err(DomainError::conflict(format!(
                "item {item_id} already holds a claim; retrieve it first"
            )));
        }
        let container = self.container(container_id)?;
        let orientation = Orientation::matching(item.dimensions(), &position.dimensions())
            .ok_or_else(|| {
                DomainError::invalid_dimensions(format!(
                    "box does not match any rotation of item {item_id}"
                ))
            })?;
        if !position.within(&container.dimensions()) {
            return Err(DomainError::validation(format!(
                "box for item {item_id} exceeds the bounds of container {container_id}"
            )));
        }
        let placement = Placement {
            container_id: container_id.clone(),
            position,
            orientation,
        };
        self.apply_placements(vec![(item_id.clone(), placement.clone())])?;
        Ok(placement)
    }

    /// Re-create a claim from an arrangement record.
    ///
    /// Staged items are placed as with [`CargoStore::place_at`]; waste items
    /// get their claim back and their waste record is located.
    pub fn restore_claim(
        &mut self,
        item_id: &ItemId,
        container_id: &ContainerId,
        position: BoundingBox,
    ) -> DomainResult<()> {
        let status = self.item(item_id)?.status();
        match status {
            ItemStatus::Staged | ItemStatus::Retrieved => {
                self.place_at(item_id, container_id, position).map(|_| ())
            }
            ItemStatus::Waste => {
                let position = BoundingBox::new(position.start, position.end)?;
                let located = self
                    .waste
                    .get(item_id)
                    .is_some_and(|r| r.container_id.is_some());
                if located {
                    return Err(DomainError::conflict(format!(
                        "waste item {item_id} already holds a claim"
                    )));
                }
                let mut container = self.container(container_id)?.clone();
                container.claim(item_id.clone(), position)?;
                let record = self.waste.get_mut(item_id).ok_or_else(|| {
                    DomainError::conflict(format!("waste item {item_id} has no waste record"))
                })?;
                record.container_id = Some(container_id.clone());
                record.position = Some(position);
                self.containers.insert(container_id.clone(), container);
                Ok(())
            }
            ItemStatus::Stowed | ItemStatus::Removed => Err(DomainError::conflict(format!(
                "item {item_id} is {status} and cannot take an arrangement row"
            ))),
        }
    }

    // ---- retrieval / lifecycle commits ----

    /// Finish a retrieval whose steps were applied to `container`:
    /// `Stowed → Retrieved`, one use consumed, container written back.
    pub(crate) fn commit_retrieval(
        &mut self,
        item_id: &ItemId,
        container: Container,
    ) -> DomainResult<(Placement, Option<u32>)> {
        let item = self.item_mut(item_id)?;
        let vacated = item.retrieve()?;
        let remaining = item.consume_use();
        self.containers.insert(container.id().clone(), container);
        Ok((vacated, remaining))
    }

    /// `Stowed → Waste`; the claim stays where it is and the record remembers it.
    pub(crate) fn record_waste(
        &mut self,
        item_id: &ItemId,
        reason: WasteReason,
        created_at: DateTime<Utc>,
    ) -> DomainResult<&WasteRecord> {
        let vacated = self.item_mut(item_id)?.mark_waste(reason)?;
        let record = WasteRecord {
            item_id: item_id.clone(),
            reason,
            container_id: Some(vacated.container_id),
            position: Some(vacated.position),
            created_at,
            sequence: self.take_waste_sequence(),
        };
        self.waste.insert(item_id.clone(), record);
        self.waste
            .get(item_id)
            .ok_or_else(|| DomainError::conflict(format!("waste record for {item_id} vanished")))
    }

    /// `Waste → Removed`; the caller has already freed the claim.
    pub(crate) fn dispose(&mut self, item_id: &ItemId) -> DomainResult<()> {
        self.item_mut(item_id)?.mark_removed()?;
        self.waste.remove(item_id);
        Ok(())
    }

    pub(crate) fn replace_container(&mut self, container: Container) {
        self.containers.insert(container.id().clone(), container);
    }

    /// Check the cross-entity invariants: every stowed item's placement is
    /// mirrored by its container claim, every located waste record likewise,
    /// and every claim belongs to an item that physically occupies it.
    pub fn verify(&self) -> DomainResult<()> {
        for container in self.containers.values() {
            for (item_id, bbox) in container.claims() {
                match self.claim_location(item_id) {
                    Some((cid, expected)) if cid == container.id() && expected == bbox => {}
                    _ => {
                        return Err(DomainError::conflict(format!(
                            "claim of {item_id} in container {} has no matching item state",
                            container.id()
                        )));
                    }
                }
            }
        }
        for item in self.items.values() {
            if let Some((cid, bbox)) = self.claim_location(item.id()) {
                let claimed = self.container(cid)?.claim_of(item.id());
                if claimed != Some(bbox) {
                    return Err(DomainError::conflict(format!(
                        "item {} is not claimed in container {cid}",
                        item.id()
                    )));
                }
            }
        }
        Ok(())
    }

    fn checkout<'a>(
        &self,
        touched: &'a mut BTreeMap<ContainerId, Container>,
        id: &ContainerId,
    ) -> DomainResult<&'a mut Container> {
        if !touched.contains_key(id) {
            touched.insert(id.clone(), self.container(id)?.clone());
        }
        touched
            .get_mut(id)
            .ok_or_else(|| DomainError::container_not_found(id))
    }

    fn take_waste_sequence(&mut self) -> u64 {
        let sequence = self.next_waste_sequence;
        self.next_waste_sequence += 1;
        sequence
    }

    /// Start of the current mission day, used to timestamp records that have
    /// no business time of their own.
    pub(crate) fn midnight(&self) -> DateTime<Utc> {
        self.today.and_time(chrono::NaiveTime::default()).and_utc()
    }
}
