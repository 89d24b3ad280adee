//! Axis-aligned bounding box, used for octree node bounds, emitter insertion
//! boxes (`position ± range`) and component extents.

use nalgebra::Vector3;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisAlignedBoundingBox {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for AxisAlignedBoundingBox {
    #[inline]
    fn default() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(-f32::MAX, -f32::MAX, -f32::MAX),
        }
    }
}

impl AxisAlignedBoundingBox {
    #[inline]
    pub fn from_radius(center: Vector3<f32>, radius: f32) -> Self {
        Self {
            min: center.add_scalar(-radius),
            max: center.add_scalar(radius),
        }
    }

    #[inline]
    pub fn from_min_max(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_point(point: Vector3<f32>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    #[inline]
    pub fn from_points(points: &[Vector3<f32>]) -> Self {
        let mut aabb = AxisAlignedBoundingBox::default();
        for pt in points {
            aabb.add_point(*pt);
        }
        aabb
    }

    #[inline]
    pub fn add_point(&mut self, a: Vector3<f32>) {
        self.min = self.min.zip_map(&a, |m, a| m.min(a));
        self.max = self.max.zip_map(&a, |m, a| m.max(a));
    }

    #[inline]
    pub fn inflate(&mut self, delta: Vector3<f32>) {
        self.min -= delta.scale(0.5);
        self.max += delta.scale(0.5);
    }

    #[inline]
    pub fn add_box(&mut self, other: Self) {
        self.add_point(other.min);
        self.add_point(other.max);
    }

    #[inline]
    pub fn center(&self) -> Vector3<f32> {
        (self.max + self.min).scale(0.5)
    }

    #[inline]
    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min).scale(0.5)
    }

    #[inline]
    pub fn is_contains_point(&self, point: Vector3<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    #[inline]
    pub fn is_intersects_sphere(&self, position: Vector3<f32>, radius: f32) -> bool {
        let r2 = radius.powi(2);
        let mut dmin = 0.0;

        for axis in 0..3 {
            if position[axis] < self.min[axis] {
                dmin += (position[axis] - self.min[axis]).powi(2);
            } else if position[axis] > self.max[axis] {
                dmin += (position[axis] - self.max[axis]).powi(2);
            }
        }

        dmin <= r2
    }

    #[inline]
    pub fn is_intersects_aabb(&self, other: &Self) -> bool {
        let self_center = self.center();
        let self_half = self.half_extents();
        let other_center = other.center();
        let other_half = other.half_extents();

        (self_center.x - other_center.x).abs() <= self_half.x + other_half.x
            && (self_center.y - other_center.y).abs() <= self_half.y + other_half.y
            && (self_center.z - other_center.z).abs() <= self_half.z + other_half.z
    }

    /// True if `self` fully contains `other` — used by the loose octree to
    /// find the deepest node whose bounds fully contain an entity.
    #[inline]
    pub fn contains_aabb(&self, other: &Self) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.min.z >= self.min.z
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
            && other.max.z <= self.max.z
    }

    /// Splits into 8 equal octants, in the fixed order used by `Octree`
    /// branches (x-minor, y, z-major).
    #[inline]
    pub fn split(&self) -> [AxisAlignedBoundingBox; 8] {
        let center = self.center();
        let min = &self.min;
        let max = &self.max;
        [
            Self::from_min_max(Vector3::new(min.x, min.y, min.z), Vector3::new(center.x, center.y, center.z)),
            Self::from_min_max(Vector3::new(center.x, min.y, min.z), Vector3::new(max.x, center.y, center.z)),
            Self::from_min_max(Vector3::new(min.x, min.y, center.z), Vector3::new(center.x, center.y, max.z)),
            Self::from_min_max(Vector3::new(center.x, min.y, center.z), Vector3::new(max.x, center.y, max.z)),
            Self::from_min_max(Vector3::new(min.x, center.y, min.z), Vector3::new(center.x, max.y, center.z)),
            Self::from_min_max(Vector3::new(center.x, center.y, min.z), Vector3::new(max.x, max.y, center.z)),
            Self::from_min_max(Vector3::new(min.x, center.y, center.z), Vector3::new(center.x, max.y, max.z)),
            Self::from_min_max(Vector3::new(center.x, center.y, center.z), Vector3::new(max.x, max.y, max.z)),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_empty() {
        let b = AxisAlignedBoundingBox::default();
        assert!(b.min.x > b.max.x);
    }

    #[test]
    fn add_point_grows_bounds() {
        let mut b = AxisAlignedBoundingBox::from_point(Vector3::new(0.0, 0.0, 0.0));
        b.add_point(Vector3::new(2.0, -1.0, 0.0));
        assert_eq!(b.min, Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn contains_aabb_is_strict() {
        let outer = AxisAlignedBoundingBox::from_radius(Vector3::new(0.0, 0.0, 0.0), 10.0);
        let inner = AxisAlignedBoundingBox::from_radius(Vector3::new(1.0, 1.0, 1.0), 1.0);
        let disjoint = AxisAlignedBoundingBox::from_radius(Vector3::new(100.0, 0.0, 0.0), 1.0);
        assert!(outer.contains_aabb(&inner));
        assert!(!outer.contains_aabb(&disjoint));
    }

    #[test]
    fn split_covers_original_volume() {
        let b = AxisAlignedBoundingBox::from_radius(Vector3::new(0.0, 0.0, 0.0), 4.0);
        let octants = b.split();
        let mut rebuilt = AxisAlignedBoundingBox::default();
        for o in octants {
            rebuilt.add_box(o);
        }
        assert_eq!(rebuilt.min, b.min);
        assert_eq!(rebuilt.max, b.max);
    }
}
