//! Spatial model: boxes, orientations and the predicates the planners use.
//!
//! Coordinates are container-local. The three axes are named after the
//! container's own dimensions (`width`, `depth`, `height`) and the open face
//! (the only access side) is the `depth = 0` plane.
//!
//! Everything here is pure. Malformed dimensions are rejected by
//! [`Dimensions::new`] at the boundary; the predicates assume valid input.

use serde::{Deserialize, Serialize};

use stowage_core::{DomainError, DomainResult, ValueObject};

/// Tolerance for floating point comparisons on coordinates (cm).
pub const EPSILON: f64 = 1e-9;

/// Extent of a box along the three container axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl ValueObject for Dimensions {}

impl Dimensions {
    /// Validated constructor: every axis must be finite and strictly positive.
    pub fn new(width: f64, depth: f64, height: f64) -> DomainResult<Self> {
        let dims = Self {
            width,
            depth,
            height,
        };
        dims.validate()?;
        Ok(dims)
    }

    pub fn validate(&self) -> DomainResult<()> {
        for (axis, value) in [
            ("width", self.width),
            ("depth", self.depth),
            ("height", self.height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DomainError::invalid_dimensions(format!(
                    "{axis} must be a positive finite number (got {value})"
                )));
            }
        }
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.width * self.depth * self.height
    }

    /// True if `self` fits inside `outer` without rotating.
    pub fn fits_within(&self, outer: &Dimensions) -> bool {
        self.width <= outer.width + EPSILON
            && self.depth <= outer.depth + EPSILON
            && self.height <= outer.height + EPSILON
    }

    /// Approximate equality, used to match a requested box against an item's
    /// possible orientations.
    pub fn approx_eq(&self, other: &Dimensions) -> bool {
        (self.width - other.width).abs() <= EPSILON
            && (self.depth - other.depth).abs() <= EPSILON
            && (self.height - other.height).abs() <= EPSILON
    }
}

/// A point in container-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl ValueObject for Point3 {}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 {
        width: 0.0,
        depth: 0.0,
        height: 0.0,
    };

    pub fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }
}

/// One of the six axis-aligned rotations of a rectangular item.
///
/// The variant name lists which of the item's own (width, depth, height)
/// ends up on the container's width, depth and height axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Wdh,
    Whd,
    Dwh,
    Dhw,
    Hwd,
    Hdw,
}

impl Orientation {
    pub const ALL: [Orientation; 6] = [
        Orientation::Wdh,
        Orientation::Whd,
        Orientation::Dwh,
        Orientation::Dhw,
        Orientation::Hwd,
        Orientation::Hdw,
    ];

    /// Position in [`Orientation::ALL`]; used as the last search tie-break.
    pub fn index(self) -> usize {
        match self {
            Orientation::Wdh => 0,
            Orientation::Whd => 1,
            Orientation::Dwh => 2,
            Orientation::Dhw => 3,
            Orientation::Hwd => 4,
            Orientation::Hdw => 5,
        }
    }

    /// Dimensions of an item with `dims` once rotated into this orientation.
    pub fn apply(self, dims: Dimensions) -> Dimensions {
        let Dimensions {
            width: w,
            depth: d,
            height: h,
        } = dims;
        let (width, depth, height) = match self {
            Orientation::Wdh => (w, d, h),
            Orientation::Whd => (w, h, d),
            Orientation::Dwh => (d, w, h),
            Orientation::Dhw => (d, h, w),
            Orientation::Hwd => (h, w, d),
            Orientation::Hdw => (h, d, w),
        };
        Dimensions {
            width,
            depth,
            height,
        }
    }

    /// First orientation that turns `dims` into `target`, if any.
    pub fn matching(dims: Dimensions, target: &Dimensions) -> Option<Orientation> {
        Orientation::ALL
            .into_iter()
            .find(|o| o.apply(dims).approx_eq(target))
    }
}

/// The six rotations of `dims`, in [`Orientation::ALL`] order.
///
/// Cubes and square prisms produce duplicates; callers that care dedupe.
pub fn orientations(dims: Dimensions) -> [(Orientation, Dimensions); 6] {
    Orientation::ALL.map(|o| (o, o.apply(dims)))
}

/// True if an item of size `dims` fits in a container of size `container`
/// under at least one rotation.
pub fn fits(dims: Dimensions, container: &Dimensions) -> bool {
    Orientation::ALL
        .into_iter()
        .any(|o| o.apply(dims).fits_within(container))
}

/// Axis-aligned box in container-local coordinates (`start` < `end`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "startCoordinates")]
    pub start: Point3,
    #[serde(rename = "endCoordinates")]
    pub end: Point3,
}

impl ValueObject for BoundingBox {}

impl BoundingBox {
    /// Validated constructor from two corners.
    pub fn new(start: Point3, end: Point3) -> DomainResult<Self> {
        let bbox = Self { start, end };
        for v in [start.width, start.depth, start.height] {
            if !v.is_finite() || v < -EPSILON {
                return Err(DomainError::invalid_dimensions(format!(
                    "start coordinates must be finite and non-negative (got {v})"
                )));
            }
        }
        bbox.dimensions().validate()?;
        Ok(bbox)
    }

    /// Box of size `dims` whose minimum corner is `anchor`.
    pub fn at(anchor: Point3, dims: Dimensions) -> Self {
        Self {
            start: anchor,
            end: Point3 {
                width: anchor.width + dims.width,
                depth: anchor.depth + dims.depth,
                height: anchor.height + dims.height,
            },
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.end.width - self.start.width,
            depth: self.end.depth - self.start.depth,
            height: self.end.height - self.start.height,
        }
    }

    pub fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Minimum coordinate along the access axis; smaller is easier to reach.
    pub fn depth_from_open_face(&self) -> f64 {
        self.start.depth
    }

    /// True if the box lies entirely inside a container of size `container`.
    pub fn within(&self, container: &Dimensions) -> bool {
        self.start.width >= -EPSILON
            && self.start.depth >= -EPSILON
            && self.start.height >= -EPSILON
            && self.end.width <= container.width + EPSILON
            && self.end.depth <= container.depth + EPSILON
            && self.end.height <= container.height + EPSILON
    }

    /// Overlap of the projections on the width–height plane (the view
    /// through the open face). Touching edges do not count.
    pub fn projection_overlaps(&self, other: &BoundingBox) -> bool {
        intervals_overlap(
            self.start.width,
            self.end.width,
            other.start.width,
            other.end.width,
        ) && intervals_overlap(
            self.start.height,
            self.end.height,
            other.start.height,
            other.end.height,
        )
    }

    /// True if `self` lies strictly between the open face and `target` and
    /// blocks its line of extraction.
    pub fn occludes(&self, target: &BoundingBox) -> bool {
        self.depth_from_open_face() + EPSILON < target.depth_from_open_face()
            && self.projection_overlaps(target)
    }
}

/// Axis-aligned overlap on all three axes. Touching faces do not overlap.
pub fn overlaps(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.projection_overlaps(b) && intervals_overlap(a.start.depth, a.end.depth, b.start.depth, b.end.depth)
}

fn intervals_overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> bool {
    a_start < b_end - EPSILON && b_start < a_end - EPSILON
}
