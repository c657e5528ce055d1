#![allow(dead_code)]

use chrono::{DateTime, Days, NaiveDate, Utc};

use stowage_cargo::{ContainerSpec, Dimensions, ItemSpec};
use stowage_core::{ContainerId, DomainResult, ItemId, UserId};
use stowage_engine::dto::{RetrieveRequest, RetrieveResponse, StowRequest, StowResponse};
use stowage_engine::{CargoService, EngineConfig};

pub fn day0() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

pub fn day(n: u64) -> NaiveDate {
    day0().checked_add_days(Days::new(n)).unwrap()
}

pub fn at() -> DateTime<Utc> {
    day0().and_hms_opt(8, 30, 0).unwrap().and_utc()
}

pub fn service() -> CargoService {
    CargoService::new(EngineConfig::default().with_start_date(day0()))
}

pub fn container(id: &str, zone: &str, w: f64, d: f64, h: f64) -> ContainerSpec {
    ContainerSpec {
        container_id: ContainerId::from(id),
        zone: zone.into(),
        dimensions: Dimensions::new(w, d, h).unwrap(),
    }
}

/// An item with mass 1, no expiry and unlimited uses.
pub fn item(id: &str, w: f64, d: f64, h: f64, priority: u8, zone: &str) -> ItemSpec {
    ItemSpec {
        item_id: ItemId::from(id),
        name: format!("{id} item"),
        dimensions: Dimensions::new(w, d, h).unwrap(),
        mass: 1.0,
        priority,
        expiry_date: None,
        usage_limit: None,
        preferred_zone: zone.into(),
    }
}

pub fn stow(svc: &CargoService, id: &str) -> DomainResult<StowResponse> {
    svc.stow(StowRequest {
        item_id: ItemId::from(id),
        user_id: UserId::from("crew-1"),
        timestamp: at(),
        containers: None,
    })
}

pub fn retrieve(svc: &CargoService, id: &str) -> DomainResult<RetrieveResponse> {
    svc.retrieve(RetrieveRequest {
        item_id: ItemId::from(id),
        user_id: UserId::from("crew-1"),
        timestamp: at(),
    })
}
