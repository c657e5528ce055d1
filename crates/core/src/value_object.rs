//! Value object trait: equality by value, not identity.
//!
//! Value objects are defined entirely by their attribute values. In this
//! workspace they are the geometric primitives (dimensions, points, boxes,
//! placements): two boxes with the same corners are the same box, whichever
//! item happens to occupy it.

/// Marker trait for value objects.
///
/// The trait requires:
/// - **Clone**: value objects are cheap to copy
/// - **PartialEq**: compared by attribute values (floating point, so no `Eq`)
/// - **Debug**: shows up in logs and assertion failures
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Dimensions { width: f64, depth: f64, height: f64 }
///
/// impl ValueObject for Dimensions {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
