use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, DomainError, DomainResult, Entity, ItemId, ValueObject};

use crate::geometry::{BoundingBox, Dimensions, Orientation};
use crate::waste::WasteReason;

/// Lowest and highest accepted priority.
pub const PRIORITY_RANGE: core::ops::RangeInclusive<u8> = 1..=100;

/// Lifecycle state of an item.
///
/// `Staged` items are registered but have never been stowed. `Waste` and
/// `Removed` are absorbing for the day simulator; only undocking moves an item
/// from `Waste` to `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Staged,
    Stowed,
    Retrieved,
    Waste,
    Removed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Staged => "staged",
            ItemStatus::Stowed => "stowed",
            ItemStatus::Retrieved => "retrieved",
            ItemStatus::Waste => "waste",
            ItemStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "staged" => Ok(ItemStatus::Staged),
            "stowed" => Ok(ItemStatus::Stowed),
            "retrieved" => Ok(ItemStatus::Retrieved),
            "waste" => Ok(ItemStatus::Waste),
            "removed" => Ok(ItemStatus::Removed),
            other => Err(DomainError::validation(format!("unknown item status '{other}'"))),
        }
    }
}

impl core::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stowed item sits: container, box and the rotation used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub container_id: ContainerId,
    pub position: BoundingBox,
    pub orientation: Orientation,
}

impl ValueObject for Placement {}

/// Registration input for an item. Every attribute is required; nothing is
/// defaulted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSpec {
    pub item_id: ItemId,
    pub name: String,
    pub dimensions: Dimensions,
    pub mass: f64,
    pub priority: u8,
    pub expiry_date: Option<NaiveDate>,
    pub usage_limit: Option<u32>,
    pub preferred_zone: String,
}

impl ItemSpec {
    pub fn validate(&self) -> DomainResult<()> {
        if self.item_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("item id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        self.dimensions.validate()?;
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(DomainError::validation(format!(
                "mass must be a non-negative finite number (got {})",
                self.mass
            )));
        }
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(DomainError::validation(format!(
                "priority must be within 1-100 (got {})",
                self.priority
            )));
        }
        if self.preferred_zone.trim().is_empty() {
            return Err(DomainError::validation("preferred zone cannot be empty"));
        }
        Ok(())
    }
}

/// Entity: Item.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    spec: ItemSpec,
    remaining_uses: Option<u32>,
    status: ItemStatus,
    placement: Option<Placement>,
    waste_reason: Option<WasteReason>,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.spec.item_id
    }
}

impl Item {
    /// A freshly registered, staged item with its full usage allowance.
    pub fn new(spec: ItemSpec) -> DomainResult<Self> {
        spec.validate()?;
        Ok(Self {
            remaining_uses: spec.usage_limit,
            spec,
            status: ItemStatus::Staged,
            placement: None,
            waste_reason: None,
        })
    }

    /// Rebuild an item from an exported record.
    ///
    /// Placements are not part of the item record, so a `Stowed` item comes
    /// back `Staged` until its arrangement row is applied.
    pub fn restore(
        spec: ItemSpec,
        remaining_uses: Option<u32>,
        status: ItemStatus,
        waste_reason: Option<WasteReason>,
    ) -> DomainResult<Self> {
        spec.validate()?;
        if let (Some(limit), Some(left)) = (spec.usage_limit, remaining_uses) {
            if left > limit {
                return Err(DomainError::validation(format!(
                    "remaining uses ({left}) exceed usage limit ({limit})"
                )));
            }
        }
        if spec.usage_limit.is_none() && remaining_uses.is_some() {
            return Err(DomainError::validation("remaining uses given without a usage limit"));
        }
        let status = match status {
            ItemStatus::Stowed => ItemStatus::Staged,
            other => other,
        };
        let waste_reason = match status {
            ItemStatus::Waste | ItemStatus::Removed => waste_reason,
            _ => None,
        };
        if status == ItemStatus::Waste && waste_reason.is_none() {
            return Err(DomainError::validation("waste items need a waste reason"));
        }
        Ok(Self {
            spec,
            remaining_uses,
            status,
            placement: None,
            waste_reason,
        })
    }

    pub fn spec(&self) -> &ItemSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn dimensions(&self) -> Dimensions {
        self.spec.dimensions
    }

    pub fn volume(&self) -> f64 {
        self.spec.dimensions.volume()
    }

    pub fn mass(&self) -> f64 {
        self.spec.mass
    }

    pub fn priority(&self) -> u8 {
        self.spec.priority
    }

    pub fn preferred_zone(&self) -> &str {
        &self.spec.preferred_zone
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.spec.expiry_date
    }

    pub fn usage_limit(&self) -> Option<u32> {
        self.spec.usage_limit
    }

    pub fn remaining_uses(&self) -> Option<u32> {
        self.remaining_uses
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn waste_reason(&self) -> Option<WasteReason> {
        self.waste_reason
    }

    pub fn is_stowed(&self) -> bool {
        self.status == ItemStatus::Stowed
    }

    /// Error used whenever an operation needs a stowed item.
    pub fn not_stowed(&self) -> DomainError {
        DomainError::ItemNotStowed {
            item_id: self.spec.item_id.clone(),
            status: self.status.as_str(),
        }
    }

    /// Record a placement. Legal from `Staged` and `Retrieved` only.
    pub fn stow(&mut self, placement: Placement) -> DomainResult<()> {
        match self.status {
            ItemStatus::Staged | ItemStatus::Retrieved => {
                self.placement = Some(placement);
                self.status = ItemStatus::Stowed;
                Ok(())
            }
            ItemStatus::Stowed => Err(DomainError::conflict(format!(
                "item {} is already stowed; remove it first",
                self.spec.item_id
            ))),
            ItemStatus::Waste | ItemStatus::Removed => Err(DomainError::conflict(format!(
                "item {} is {} and cannot be stowed again",
                self.spec.item_id, self.status
            ))),
        }
    }

    /// Move a stowed item to a new box (rearrangement).
    pub fn relocate(&mut self, placement: Placement) -> DomainResult<()> {
        if !self.is_stowed() {
            return Err(self.not_stowed());
        }
        self.placement = Some(placement);
        Ok(())
    }

    /// `Stowed → Retrieved`; returns the vacated placement.
    pub fn retrieve(&mut self) -> DomainResult<Placement> {
        if !self.is_stowed() {
            return Err(self.not_stowed());
        }
        self.status = ItemStatus::Retrieved;
        self.placement.take().ok_or_else(|| self.not_stowed())
    }

    /// Consume one use. Never increases the counter and never goes below zero.
    pub fn consume_use(&mut self) -> Option<u32> {
        if let Some(left) = self.remaining_uses.as_mut() {
            *left = left.saturating_sub(1);
        }
        self.remaining_uses
    }

    /// Reason this stowed item should become waste on `today`, if any.
    /// Expiry takes precedence over depletion.
    pub fn waste_condition(&self, today: NaiveDate) -> Option<WasteReason> {
        if !self.is_stowed() {
            return None;
        }
        if self.spec.expiry_date.is_some_and(|expiry| today >= expiry) {
            return Some(WasteReason::Expired);
        }
        if self.remaining_uses == Some(0) {
            return Some(WasteReason::Depleted);
        }
        None
    }

    /// `Stowed → Waste`. The item keeps occupying its box (the container claim
    /// stays), but it no longer has a placement of its own; the vacated
    /// placement is returned so it can be recorded on the waste record.
    pub fn mark_waste(&mut self, reason: WasteReason) -> DomainResult<Placement> {
        if !self.is_stowed() {
            return Err(self.not_stowed());
        }
        self.status = ItemStatus::Waste;
        self.waste_reason = Some(reason);
        self.placement.take().ok_or_else(|| self.not_stowed())
    }

    /// `Waste → Removed` (undocking).
    pub fn mark_removed(&mut self) -> DomainResult<()> {
        if self.status != ItemStatus::Waste {
            return Err(DomainError::conflict(format!(
                "item {} is {}, only waste can be removed",
                self.spec.item_id, self.status
            )));
        }
        self.status = ItemStatus::Removed;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::Point3;
    use proptest::prelude::*;

    pub(crate) fn spec(id: &str) -> ItemSpec {
        ItemSpec {
            item_id: ItemId::from(id),
            name: format!("item {id}"),
            dimensions: Dimensions::new(10.0, 10.0, 10.0).unwrap(),
            mass: 2.0,
            priority: 50,
            expiry_date: None,
            usage_limit: None,
            preferred_zone: "Crew Quarters".to_string(),
        }
    }

    fn placement() -> Placement {
        Placement {
            container_id: ContainerId::from("C1"),
            position: BoundingBox::at(Point3::ORIGIN, Dimensions::new(10.0, 10.0, 10.0).unwrap()),
            orientation: Orientation::Wdh,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn new_item_is_staged_without_placement() {
        let item = Item::new(spec("A")).unwrap();
        assert_eq!(item.status(), ItemStatus::Staged);
        assert!(item.placement().is_none());
    }

    #[test]
    fn validation_rejects_missing_attributes() {
        let mut s = spec("A");
        s.priority = 0;
        assert!(matches!(Item::new(s), Err(DomainError::Validation(_))));

        let mut s = spec("A");
        s.preferred_zone = " ".into();
        assert!(Item::new(s).is_err());

        let mut s = spec("A");
        s.dimensions.depth = 0.0;
        assert!(matches!(Item::new(s), Err(DomainError::InvalidDimensions(_))));

        let mut s = spec("A");
        s.mass = -1.0;
        assert!(Item::new(s).is_err());
    }

    #[test]
    fn placement_exists_iff_stowed() {
        let mut item = Item::new(spec("A")).unwrap();
        item.stow(placement()).unwrap();
        assert!(item.is_stowed() && item.placement().is_some());

        let vacated = item.retrieve().unwrap();
        assert_eq!(vacated, placement());
        assert_eq!(item.status(), ItemStatus::Retrieved);
        assert!(item.placement().is_none());

        item.stow(placement()).unwrap();
        item.mark_waste(WasteReason::Expired).unwrap();
        assert!(item.placement().is_none());
    }

    #[test]
    fn waste_can_never_be_stowed_again() {
        let mut item = Item::new(spec("A")).unwrap();
        item.stow(placement()).unwrap();
        item.mark_waste(WasteReason::Depleted).unwrap();
        assert!(matches!(item.stow(placement()), Err(DomainError::Conflict(_))));
        item.mark_removed().unwrap();
        assert!(item.stow(placement()).is_err());
        assert!(item.mark_removed().is_err());
    }

    #[test]
    fn expiry_wins_over_depletion() {
        let mut s = spec("A");
        s.expiry_date = Some(date("2025-01-05"));
        s.usage_limit = Some(1);
        let mut item = Item::new(s).unwrap();
        item.stow(placement()).unwrap();
        assert_eq!(item.waste_condition(date("2025-01-04")), None);
        item.consume_use();
        assert_eq!(item.waste_condition(date("2025-01-04")), Some(WasteReason::Depleted));
        assert_eq!(item.waste_condition(date("2025-01-05")), Some(WasteReason::Expired));
    }

    #[test]
    fn restore_keeps_counters_and_demotes_stowed() {
        let mut s = spec("A");
        s.usage_limit = Some(5);
        let item = Item::restore(s.clone(), Some(2), ItemStatus::Stowed, None).unwrap();
        assert_eq!(item.status(), ItemStatus::Staged);
        assert_eq!(item.remaining_uses(), Some(2));

        assert!(Item::restore(s.clone(), Some(6), ItemStatus::Staged, None).is_err());
        assert!(Item::restore(s, Some(0), ItemStatus::Waste, None).is_err());
    }

    proptest! {
        /// Property: remaining uses never increase, whatever the number of uses.
        #[test]
        fn remaining_uses_never_increase(limit in 0u32..20, uses in 0usize..40) {
            let mut s = spec("A");
            s.usage_limit = Some(limit);
            let mut item = Item::new(s).unwrap();
            let mut last = item.remaining_uses().unwrap();
            for _ in 0..uses {
                let now = item.consume_use().unwrap();
                prop_assert!(now <= last);
                last = now;
            }
        }
    }
}
