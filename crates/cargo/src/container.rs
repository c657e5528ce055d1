use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, DomainError, DomainResult, Entity, ItemId};

use crate::geometry::{overlaps, BoundingBox, Dimensions};

/// Registration input for a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub container_id: ContainerId,
    pub zone: String,
    pub dimensions: Dimensions,
}

impl ContainerSpec {
    pub fn validate(&self) -> DomainResult<()> {
        if self.container_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("container id cannot be empty"));
        }
        if self.zone.trim().is_empty() {
            return Err(DomainError::validation("zone cannot be empty"));
        }
        self.dimensions.validate()
    }
}

/// Entity: Container.
///
/// A container owns the space claims of everything physically inside it:
/// stowed items and waste still awaiting undocking. The open face is the
/// `depth = 0` plane. Claims never overlap and never leave the container.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    spec: ContainerSpec,
    claims: BTreeMap<ItemId, BoundingBox>,
}

impl Entity for Container {
    type Id = ContainerId;

    fn id(&self) -> &Self::Id {
        &self.spec.container_id
    }
}

impl Container {
    pub fn new(spec: ContainerSpec) -> DomainResult<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            claims: BTreeMap::new(),
        })
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn zone(&self) -> &str {
        &self.spec.zone
    }

    pub fn dimensions(&self) -> Dimensions {
        self.spec.dimensions
    }

    pub fn volume(&self) -> f64 {
        self.spec.dimensions.volume()
    }

    pub fn claimed_volume(&self) -> f64 {
        self.claims.values().map(BoundingBox::volume).sum()
    }

    pub fn free_volume(&self) -> f64 {
        (self.volume() - self.claimed_volume()).max(0.0)
    }

    pub fn claims(&self) -> impl Iterator<Item = (&ItemId, &BoundingBox)> {
        self.claims.iter()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    pub fn claim_of(&self, item_id: &ItemId) -> Option<&BoundingBox> {
        self.claims.get(item_id)
    }

    /// True if `bbox` is inside the container and clear of every claim
    /// (other than `ignoring`'s own).
    pub fn is_free(&self, bbox: &BoundingBox, ignoring: Option<&ItemId>) -> bool {
        bbox.within(&self.spec.dimensions)
            && self
                .claims
                .iter()
                .filter(|(id, _)| Some(*id) != ignoring)
                .all(|(_, other)| !overlaps(bbox, other))
    }

    /// Claim `bbox` for `item_id`, enforcing containment and non-overlap.
    pub fn claim(&mut self, item_id: ItemId, bbox: BoundingBox) -> DomainResult<()> {
        if self.claims.contains_key(&item_id) {
            return Err(DomainError::conflict(format!(
                "item {item_id} already holds a claim in container {}",
                self.spec.container_id
            )));
        }
        if !bbox.within(&self.spec.dimensions) {
            return Err(DomainError::validation(format!(
                "position of item {item_id} exceeds the bounds of container {}",
                self.spec.container_id
            )));
        }
        if let Some((other, _)) = self.claims.iter().find(|(_, other)| overlaps(&bbox, other)) {
            return Err(DomainError::conflict(format!(
                "position of item {item_id} overlaps item {other} in container {}",
                self.spec.container_id
            )));
        }
        self.claims.insert(item_id, bbox);
        Ok(())
    }

    pub fn release(&mut self, item_id: &ItemId) -> Option<BoundingBox> {
        self.claims.remove(item_id)
    }

    /// Claims lying between the open face and `target`, nearest first
    /// (ties broken by item id).
    pub fn occluders_of(&self, target: &ItemId) -> Option<Vec<(ItemId, BoundingBox)>> {
        let target_box = self.claims.get(target)?;
        let mut blocking: Vec<(ItemId, BoundingBox)> = self
            .claims
            .iter()
            .filter(|(id, bbox)| *id != target && bbox.occludes(target_box))
            .map(|(id, bbox)| (id.clone(), *bbox))
            .collect();
        blocking.sort_by(|(a_id, a), (b_id, b)| {
            a.depth_from_open_face()
                .total_cmp(&b.depth_from_open_face())
                .then_with(|| a_id.cmp(b_id))
        });
        Some(blocking)
    }

    /// Number of existing claims that would block access to `bbox`.
    pub fn occluder_count(&self, bbox: &BoundingBox) -> usize {
        self.claims.values().filter(|other| other.occludes(bbox)).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::Point3;

    pub(crate) fn container(id: &str, zone: &str, w: f64, d: f64, h: f64) -> Container {
        Container::new(ContainerSpec {
            container_id: ContainerId::from(id),
            zone: zone.to_string(),
            dimensions: Dimensions::new(w, d, h).unwrap(),
        })
        .unwrap()
    }

    fn cube(w: f64, d: f64, h: f64, size: f64) -> BoundingBox {
        BoundingBox::at(
            Point3::new(w, d, h),
            Dimensions::new(size, size, size).unwrap(),
        )
    }

    #[test]
    fn claims_respect_bounds_and_overlap() {
        let mut c = container("C1", "A", 100.0, 85.0, 200.0);
        c.claim(ItemId::from("a"), cube(0.0, 0.0, 0.0, 10.0)).unwrap();
        assert!(c.claim(ItemId::from("b"), cube(5.0, 5.0, 5.0, 10.0)).is_err());
        assert!(c.claim(ItemId::from("b"), cube(95.0, 0.0, 0.0, 10.0)).is_err());
        c.claim(ItemId::from("b"), cube(10.0, 0.0, 0.0, 10.0)).unwrap();
        assert_eq!(c.claim_count(), 2);
        assert!((c.free_volume() - (100.0 * 85.0 * 200.0 - 2000.0)).abs() < 1e-6);
    }

    #[test]
    fn occluders_are_sorted_nearest_first() {
        let mut c = container("C1", "A", 100.0, 100.0, 100.0);
        c.claim(ItemId::from("target"), cube(0.0, 50.0, 0.0, 10.0)).unwrap();
        c.claim(ItemId::from("mid"), cube(0.0, 20.0, 0.0, 10.0)).unwrap();
        c.claim(ItemId::from("front"), cube(5.0, 0.0, 5.0, 10.0)).unwrap();
        c.claim(ItemId::from("aside"), cube(30.0, 0.0, 0.0, 10.0)).unwrap();

        let occ = c.occluders_of(&ItemId::from("target")).unwrap();
        let ids: Vec<&str> = occ.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["front", "mid"]);
        assert!(c.occluders_of(&ItemId::from("missing")).is_none());
    }

    #[test]
    fn rejects_blank_zone() {
        let spec = ContainerSpec {
            container_id: ContainerId::from("C"),
            zone: String::new(),
            dimensions: Dimensions::new(1.0, 1.0, 1.0).unwrap(),
        };
        assert!(Container::new(spec).is_err());
    }
}
