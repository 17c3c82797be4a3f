//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**; they represent
/// concepts where identity doesn't matter — only the values matter. To
/// "modify" a value object, create a new one with the new values.
///
/// Example:
/// - `ClientInfo { name, phone, address }` is a value object
/// - `SubOrder { id: SubOrderId(...), ... }` is an entity
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
