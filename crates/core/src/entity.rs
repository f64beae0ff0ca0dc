//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// An inventory lot keeps its identity while its disposable volume shrinks.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
