//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values:
/// `BloodType::APos == BloodType::APos` and two `Volume`s holding the same
/// amount are interchangeable. Lots, in contrast, are entities (see [`crate::Entity`]).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
