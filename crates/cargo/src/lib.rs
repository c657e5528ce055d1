//! Cargo domain module.
//!
//! Items, containers and the spatial model they share, plus the records the
//! planners produce (retrieval steps, waste records, return manifests).
//! Deterministic domain logic only (no IO, no locking, no storage).

pub mod container;
pub mod geometry;
pub mod item;
pub mod manifest;
pub mod retrieval;
pub mod waste;

pub use container::{Container, ContainerSpec};
pub use geometry::{fits, orientations, overlaps, BoundingBox, Dimensions, Orientation, Point3};
pub use item::{Item, ItemSpec, ItemStatus, Placement};
pub use manifest::{ReturnItem, ReturnManifest, ReturnStep};
pub use retrieval::{RetrievalAction, RetrievalStep};
pub use waste::{WasteReason, WasteRecord};
