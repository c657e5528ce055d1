//! Stowage engine: placement, retrieval, lifecycle and return planning over
//! an owned [`CargoStore`], exposed through the thread-safe [`CargoService`].
//!
//! The planners (`placement`, `retrieval`, `lifecycle`, `returns`) are plain
//! functions over `&CargoStore` / `&mut CargoStore`; the service adds
//! locking, validation of typed requests and the audit trail.

pub mod config;
pub mod dto;
pub mod interchange;
pub mod lifecycle;
pub mod locks;
pub mod placement;
pub mod retrieval;
pub mod returns;
pub mod service;
pub mod store;

pub use config::EngineConfig;
pub use interchange::{ImportReport, InterchangeError, RowError};
pub use lifecycle::{ItemChange, ItemUsage, SimulationReport, UsageRequest};
pub use placement::{PlacementPlan, PlacementPolicy, Relocation};
pub use retrieval::RetrievalOutcome;
pub use returns::RemovalReport;
pub use service::CargoService;
pub use store::CargoStore;
