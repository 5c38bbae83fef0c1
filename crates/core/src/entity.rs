//! Entity trait: identity that survives content changes.

/// Something with a stable identity.
///
/// Backing containers are entities: their slots change constantly but the aggregate
/// tracks them by id.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
