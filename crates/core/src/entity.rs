//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Items and containers are entities: they keep their identity while their
/// status, remaining uses or space claims change.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
