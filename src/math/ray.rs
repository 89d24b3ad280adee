//! Ray primitives used by the ray-trace world BVH (C3) and the listener
//! probe (C9): a slab box test for BVH descent, and a Möller–Trumbore
//! triangle test for leaf-level hits.

use super::aabb::AxisAlignedBoundingBox;
use nalgebra::Vector3;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub dir: Vector3<f32>,
}

impl Ray {
    #[inline]
    pub fn new(origin: Vector3<f32>, dir: Vector3<f32>) -> Self {
        Self { origin, dir }
    }

    #[inline]
    pub fn from_two_points(begin: Vector3<f32>, end: Vector3<f32>) -> Self {
        Self {
            origin: begin,
            dir: end - begin,
        }
    }

    #[inline]
    pub fn get_point(&self, t: f32) -> Vector3<f32> {
        self.origin + self.dir.scale(t)
    }

    /// Slab test against an AABB's min/max corners. Returns the entry/exit
    /// ray-parameter interval for a ray of unit-length-normalized `dir`
    /// treated as `origin + dir * t`, `t` clamped to `[0, 1]` meaning the
    /// segment between `origin` and `origin + dir`.
    #[inline]
    pub fn box_intersection(&self, min: &Vector3<f32>, max: &Vector3<f32>) -> Option<(f32, f32)> {
        let (mut tmin, mut tmax) = if self.dir.x >= 0.0 {
            ((min.x - self.origin.x) / self.dir.x, (max.x - self.origin.x) / self.dir.x)
        } else {
            ((max.x - self.origin.x) / self.dir.x, (min.x - self.origin.x) / self.dir.x)
        };

        let (tymin, tymax) = if self.dir.y >= 0.0 {
            ((min.y - self.origin.y) / self.dir.y, (max.y - self.origin.y) / self.dir.y)
        } else {
            ((max.y - self.origin.y) / self.dir.y, (min.y - self.origin.y) / self.dir.y)
        };

        if tmin > tymax || tymin > tmax {
            return None;
        }
        if tymin > tmin {
            tmin = tymin;
        }
        if tymax < tmax {
            tmax = tymax;
        }

        let (tzmin, tzmax) = if self.dir.z >= 0.0 {
            ((min.z - self.origin.z) / self.dir.z, (max.z - self.origin.z) / self.dir.z)
        } else {
            ((max.z - self.origin.z) / self.dir.z, (min.z - self.origin.z) / self.dir.z)
        };

        if tmin > tzmax || tzmin > tmax {
            return None;
        }
        if tzmin > tmin {
            tmin = tzmin;
        }
        if tzmax < tmax {
            tmax = tzmax;
        }

        if tmin <= 1.0 && tmax >= 0.0 {
            Some((tmin, tmax))
        } else {
            None
        }
    }

    #[inline]
    pub fn aabb_intersection(&self, aabb: &AxisAlignedBoundingBox) -> Option<(f32, f32)> {
        self.box_intersection(&aabb.min, &aabb.max)
    }

    /// Möller–Trumbore ray-triangle intersection. Returns `(t, barycentric_u, barycentric_v)`
    /// for a hit within `[0, max_t]`, where `t` is in ray-parameter units of `dir`
    /// (so callers pass a `dir` scaled to the desired max range and read `t` in `[0,1]`).
    #[inline]
    pub fn triangle_intersection(&self, vertices: &[Vector3<f32>; 3], max_t: f32) -> Option<f32> {
        const EPSILON: f32 = 1.0e-6;
        let edge1 = vertices[1] - vertices[0];
        let edge2 = vertices[2] - vertices[0];
        let h = self.dir.cross(&edge2);
        let a = edge1.dot(&h);
        if a.abs() < EPSILON {
            return None;
        }
        let f = 1.0 / a;
        let s = self.origin - vertices[0];
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&edge1);
        let v = f * self.dir.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(&q);
        if t > EPSILON && t <= max_t {
            Some(t)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn box_intersection_hits_centered_box() {
        let ray = Ray::new(Vector3::new(-5.0, 0.0, 0.0), Vector3::new(10.0, 0.0, 0.0));
        let hit = ray.box_intersection(&Vector3::new(-1.0, -1.0, -1.0), &Vector3::new(1.0, 1.0, 1.0));
        assert!(hit.is_some());
    }

    #[test]
    fn box_intersection_misses_offset_box() {
        let ray = Ray::new(Vector3::new(-5.0, 10.0, 0.0), Vector3::new(10.0, 0.0, 0.0));
        let hit = ray.box_intersection(&Vector3::new(-1.0, -1.0, -1.0), &Vector3::new(1.0, 1.0, 1.0));
        assert!(hit.is_none());
    }

    #[test]
    fn triangle_intersection_hits_center() {
        let tri = [
            Vector3::new(-1.0, -1.0, 0.0),
            Vector3::new(1.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let ray = Ray::new(Vector3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 10.0));
        assert!(ray.triangle_intersection(&tri, 1.0).is_some());
    }

    #[test]
    fn triangle_intersection_misses_outside() {
        let tri = [
            Vector3::new(-1.0, -1.0, 0.0),
            Vector3::new(1.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let ray = Ray::new(Vector3::new(5.0, 5.0, -5.0), Vector3::new(0.0, 0.0, 10.0));
        assert!(ray.triangle_intersection(&tri, 1.0).is_none());
    }
}
