//! Domain error model.

use thiserror::Error;

use crate::id::{ContainerId, ItemId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is recoverable at the call boundary: a failed operation
/// leaves cargo state untouched and the caller may retry with adjusted input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A dimension was zero, negative or not finite.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Any other malformed input (empty name, priority out of range, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// The item exists but is not in a state that holds a container claim.
    #[error("item {item_id} is not stowed (status: {status})")]
    ItemNotStowed {
        item_id: ItemId,
        status: &'static str,
    },

    /// No candidate container can take the item, even after rearrangement.
    #[error("no space available for item {0}")]
    NoSpaceAvailable(ItemId),

    /// No return manifest was built for this container since the last undocking.
    #[error("no active return manifest for container {0}")]
    NoActiveManifest(ContainerId),

    /// The mass budget cannot be satisfied even by an empty selection.
    #[error("mass budget cannot be satisfied: {0}")]
    MassBudgetExceeded(f64),

    /// A conflicting concurrent change or a duplicate registration.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn item_not_found(id: &ItemId) -> Self {
        Self::ItemNotFound(id.clone())
    }

    pub fn container_not_found(id: &ContainerId) -> Self {
        Self::ContainerNotFound(id.clone())
    }

    /// Stable machine-readable code, used by the DTO layer and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidDimensions(_) => "invalid_dimensions",
            DomainError::Validation(_) => "validation_error",
            DomainError::ItemNotFound(_) => "item_not_found",
            DomainError::ContainerNotFound(_) => "container_not_found",
            DomainError::ItemNotStowed { .. } => "item_not_stowed",
            DomainError::NoSpaceAvailable(_) => "no_space_available",
            DomainError::NoActiveManifest(_) => "no_active_manifest",
            DomainError::MassBudgetExceeded(_) => "mass_budget_exceeded",
            DomainError::Conflict(_) => "conflict",
        }
    }
}
