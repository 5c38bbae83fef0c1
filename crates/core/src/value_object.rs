//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Item stacks and kinds are value objects: two stacks with the same kind, quantity and
/// attributes are interchangeable, regardless of which slot they sit in. That is what lets
/// the sort engine swap them freely.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Quantity(u32);
///
/// impl ValueObject for Quantity {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
