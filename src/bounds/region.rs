//! Axis-aligned bounding region

use super::Corners;
use glam::Vec3;

/// Axis-aligned region `[xmin, xmax, ymin, ymax, zmin, zmax]`
///
/// `min <= max` holds per axis for every region built from points. A region
/// built from zero points is inverted and reports [`BoundingRegion::is_empty`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingRegion {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingRegion {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Region centered on `center` with the given half size
    pub fn from_center(center: Vec3, half_size: Vec3) -> Self {
        Self::new(center - half_size, center + half_size)
    }

    /// Build from the 6-float extent layout
    pub fn from_array(extent: [f32; 6]) -> Self {
        Self::new(
            Vec3::new(extent[0], extent[2], extent[4]),
            Vec3::new(extent[1], extent[3], extent[5]),
        )
    }

    /// The 6-float extent layout `[xmin, xmax, ymin, ymax, zmin, zmax]`
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z,
        ]
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |region, p| region.include(*p))
    }

    /// Grow to include `point`
    pub fn include(self, point: Vec3) -> Self {
        Self::new(self.min.min(point), self.max.max(point))
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_size(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Corner `i` takes max x when bit 0 is set, max y for bit 1, max z for bit 2
    pub fn corner(&self, i: usize) -> Vec3 {
        Vec3::new(
            if i & 1 != 0 { self.max.x } else { self.min.x },
            if i & 2 != 0 { self.max.y } else { self.min.y },
            if i & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// True when `other` lies fully inside this region (boundaries included)
    pub fn contains_region(&self, other: &BoundingRegion) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &BoundingRegion) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn merge(&self, other: &BoundingRegion) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// Closest point of the region to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    pub fn distance_squared(&self, point: Vec3) -> f32 {
        self.closest_point(point).distance_squared(point)
    }
}

impl Corners for BoundingRegion {
    fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| self.corner(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_layout() {
        let region = BoundingRegion::from_array([-1.0, 1.0, -2.0, 2.0, -3.0, 3.0]);
        assert_eq!(region.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(region.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(region.to_array(), [-1.0, 1.0, -2.0, 2.0, -3.0, 3.0]);
    }

    #[test]
    fn test_from_points() {
        let region = BoundingRegion::from_points(&[
            Vec3::new(1.0, 5.0, -2.0),
            Vec3::new(-3.0, 0.0, 4.0),
        ]);
        assert_eq!(region.min, Vec3::new(-3.0, 0.0, -2.0));
        assert_eq!(region.max, Vec3::new(1.0, 5.0, 4.0));
        assert!(BoundingRegion::from_points(&[]).is_empty());
    }

    #[test]
    fn test_containment_and_overlap() {
        let outer = BoundingRegion::new(Vec3::ZERO, Vec3::splat(4.0));
        let inner = BoundingRegion::new(Vec3::ONE, Vec3::splat(2.0));
        let touching = BoundingRegion::new(Vec3::splat(4.0), Vec3::splat(5.0));
        let apart = BoundingRegion::new(Vec3::splat(6.0), Vec3::splat(7.0));

        assert!(outer.contains_region(&inner));
        assert!(!inner.contains_region(&outer));
        assert!(outer.intersects(&touching));
        assert!(!outer.intersects(&apart));
        assert!(outer.contains_point(Vec3::new(4.0, 0.0, 2.0)));
    }

    #[test]
    fn test_corners_cover_extent() {
        let region = BoundingRegion::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        let corners = region.corners();
        assert_eq!(corners[0], region.min);
        assert_eq!(corners[7], region.max);
        assert_eq!(BoundingRegion::from_points(&corners), region);
    }
}
