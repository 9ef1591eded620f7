//! Axis-Aligned Bounding Boxes
//!
//! The bounding volume type the broad phase indexes. A box is a (min, max)
//! corner pair; once initialized min <= max holds component-wise, but
//! degenerate boxes (min > max, or zero extent) are permitted transiently
//! during construction and detected by [`Aabb::is_degenerate`].

use crate::fixed::Fix64;
use crate::math::Vec3;

/// Axis-aligned bounding box over [`Fix64`] coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create from min and max corners.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Zero-extent box at a single point.
    #[inline]
    pub const fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Create from center and half-extents.
    pub fn from_center_half(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Check if two boxes intersect (touching counts).
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if `other` is entirely inside this box.
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Smallest box covering both inputs.
    #[inline]
    pub fn merged(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Box volume with saturating products, so extreme boxes clamp to
    /// [`Fix64::MAX`] instead of wrapping into a negative heuristic.
    ///
    /// This is the metric the hierarchy caches per node for its insertion
    /// and revalidation heuristics.
    pub fn volume(&self) -> Fix64 {
        let d = self.max - self.min;
        d.x.saturating_mul(d.y).saturating_mul(d.z)
    }

    /// Surface area, same saturating policy as [`Aabb::volume`].
    pub fn surface_area(&self) -> Fix64 {
        let d = self.max - self.min;
        let faces = d
            .x
            .saturating_mul(d.y)
            .saturating_add(d.y.saturating_mul(d.z))
            .saturating_add(d.z.saturating_mul(d.x));
        faces.saturating_add(faces)
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max).scale(Fix64::HALF)
    }

    /// Half-extents.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min).scale(Fix64::HALF)
    }

    /// Grow symmetrically by `margin` on every axis.
    pub fn expand(&self, margin: Fix64) -> Aabb {
        let m = Vec3::splat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// A box with no positive extent on some axis. Degenerate boxes poison
    /// the tree's volume heuristic, so insertion refreshes them first.
    pub fn is_degenerate(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y || self.max.z <= self.min.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_at(x: i32, y: i32, z: i32) -> Aabb {
        Aabb::new(Vec3::from_int(x, y, z), Vec3::from_int(x + 1, y + 1, z + 1))
    }

    #[test]
    fn test_intersects() {
        let a = unit_box_at(0, 0, 0);
        let b = Aabb::new(
            Vec3::new(Fix64::HALF, Fix64::HALF, Fix64::HALF),
            Vec3::from_int(2, 2, 2),
        );
        let c = unit_box_at(5, 5, 5);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        // Touching faces count as intersecting.
        let d = unit_box_at(1, 0, 0);
        assert!(a.intersects(&d));
    }

    #[test]
    fn test_merged_covers_both() {
        let a = unit_box_at(0, 0, 0);
        let b = unit_box_at(3, -2, 1);
        let m = Aabb::merged(&a, &b);
        assert!(m.contains(&a));
        assert!(m.contains(&b));
        assert_eq!(m.min, Vec3::from_int(0, -2, 0));
        assert_eq!(m.max, Vec3::from_int(4, 1, 2));
    }

    #[test]
    fn test_volume_and_area() {
        let b = Aabb::new(Vec3::ZERO, Vec3::from_int(2, 3, 4));
        assert_eq!(b.volume(), Fix64::from_int(24));
        assert_eq!(b.surface_area(), Fix64::from_int(52));
        // Extreme boxes saturate instead of wrapping negative.
        let huge = Aabb::new(
            Vec3::splat(Fix64::MIN.half()),
            Vec3::splat(Fix64::MAX.half()),
        );
        assert_eq!(huge.volume(), Fix64::MAX);
    }

    #[test]
    fn test_degenerate() {
        assert!(Aabb::from_point(Vec3::from_int(1, 2, 3)).is_degenerate());
        assert!(!unit_box_at(0, 0, 0).is_degenerate());
        let flat = Aabb::new(Vec3::ZERO, Vec3::new(Fix64::ONE, Fix64::ZERO, Fix64::ONE));
        assert!(flat.is_degenerate());
    }

    #[test]
    fn test_expand() {
        let b = unit_box_at(0, 0, 0).expand(Fix64::HALF);
        assert_eq!(b.min, Vec3::splat(-Fix64::HALF));
        assert_eq!(
            b.max,
            Vec3::splat(Fix64::ONE + Fix64::HALF)
        );
    }
}
