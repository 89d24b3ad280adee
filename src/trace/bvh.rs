//! Ray-trace world BVH (C3): a triangle octree rebuilt on demand from the
//! component set a listener probe found nearby (pre-selected by
//! [`crate::spatial::octree::Octree`]). Structure and build algorithm are
//! lifted directly from `fyrox-core::octree`'s static triangle octree,
//! generalized so each triangle carries the owning component's material.

use crate::math::{aabb::AxisAlignedBoundingBox, ray::Ray};
use crate::pool::{Handle, Pool};
use nalgebra::Vector3;

/// Per-band (low/medium/high) acoustic coefficients of a component's texture.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    pub absorption: [f32; 3],
    pub transmission: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            absorption: [0.1, 0.1, 0.1],
            transmission: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TaggedTriangle {
    pub vertices: [Vector3<f32>; 3],
    pub component: u32,
    pub material: Material,
}

#[derive(Copy, Clone, Debug)]
pub struct Hit {
    pub t: f32,
    pub triangle: u32,
    pub component: u32,
    pub material: Material,
}

#[derive(Clone, Debug)]
enum BvhNode {
    Leaf {
        indices: Vec<u32>,
        bounds: AxisAlignedBoundingBox,
    },
    Branch {
        bounds: AxisAlignedBoundingBox,
        leaves: [Handle<BvhNode>; 8],
    },
}

#[derive(Default)]
pub struct WorldBvh {
    nodes: Pool<BvhNode>,
    root: Handle<BvhNode>,
    triangles: Vec<TaggedTriangle>,
}

impl WorldBvh {
    pub fn build(triangles: Vec<TaggedTriangle>, split_threshold: usize) -> Self {
        let mut bounds = AxisAlignedBoundingBox::default();
        for triangle in &triangles {
            for pt in triangle.vertices.iter() {
                bounds.add_point(*pt);
            }
        }
        let inflation = 2.0 * f32::EPSILON;
        bounds.inflate(Vector3::new(inflation, inflation, inflation));

        let indices: Vec<u32> = (0..triangles.len() as u32).collect();

        let mut nodes = Pool::new();
        let root = build_recursive(&mut nodes, &triangles, bounds, indices, split_threshold);

        Self { nodes, root, triangles }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_vertices(&self, index: u32) -> [Vector3<f32>; 3] {
        self.triangles[index as usize].vertices
    }

    /// Nearest hit along `ray.dir` within `[0, max_t]`, `max_t` in the same
    /// units as `ray.dir`'s length (see [`Ray::triangle_intersection`]).
    pub fn first_hit(&self, ray: &Ray, max_t: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        self.collect_hits(self.root, ray, max_t, &mut |hit| {
            if best.map(|b| hit.t < b.t).unwrap_or(true) {
                best = Some(hit);
            }
        });
        best
    }

    pub fn all_hits(&self, ray: &Ray, max_t: f32) -> Vec<Hit> {
        let mut hits = Vec::new();
        self.collect_hits(self.root, ray, max_t, &mut |hit| hits.push(hit));
        hits.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());
        hits
    }

    /// True if any triangle blocks the straight segment `a -> b` (occlusion
    /// test). Equivalent to `first_hit` over the segment with `max_t = 1.0`.
    pub fn segment_blocked(&self, a: Vector3<f32>, b: Vector3<f32>) -> bool {
        let ray = Ray::from_two_points(a, b);
        self.first_hit(&ray, 1.0).is_some()
    }

    fn collect_hits(&self, node: Handle<BvhNode>, ray: &Ray, max_t: f32, out: &mut impl FnMut(Hit)) {
        match self.nodes.borrow(node) {
            BvhNode::Leaf { indices, bounds } => {
                if ray.aabb_intersection(bounds).is_none() {
                    return;
                }
                for &index in indices {
                    let triangle = &self.triangles[index as usize];
                    if let Some(t) = ray.triangle_intersection(&triangle.vertices, max_t) {
                        out(Hit {
                            t,
                            triangle: index,
                            component: triangle.component,
                            material: triangle.material,
                        });
                    }
                }
            }
            BvhNode::Branch { bounds, leaves } => {
                if ray.aabb_intersection(bounds).is_none() {
                    return;
                }
                for leaf in leaves {
                    self.collect_hits(*leaf, ray, max_t, out);
                }
            }
        }
    }
}

fn build_recursive(
    nodes: &mut Pool<BvhNode>,
    triangles: &[TaggedTriangle],
    bounds: AxisAlignedBoundingBox,
    indices: Vec<u32>,
    split_threshold: usize,
) -> Handle<BvhNode> {
    if indices.len() <= split_threshold {
        nodes.spawn(BvhNode::Leaf { bounds, indices })
    } else {
        let mut leaves = [Handle::NONE; 8];
        let leaf_bounds = bounds.split();

        for (i, leaf_bound) in leaf_bounds.into_iter().enumerate() {
            let mut leaf_indices = Vec::new();
            for &index in indices.iter() {
                let triangle_bounds = AxisAlignedBoundingBox::from_points(&triangles[index as usize].vertices);
                if triangle_bounds.is_intersects_aabb(&leaf_bound) {
                    leaf_indices.push(index);
                }
            }
            leaves[i] = build_recursive(nodes, triangles, leaf_bound, leaf_indices, split_threshold);
        }

        nodes.spawn(BvhNode::Branch { leaves, bounds })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn flat_floor() -> TaggedTriangle {
        TaggedTriangle {
            vertices: [
                Vector3::new(-10.0, 0.0, -10.0),
                Vector3::new(10.0, 0.0, -10.0),
                Vector3::new(0.0, 0.0, 10.0),
            ],
            component: 7,
            material: Material::default(),
        }
    }

    #[test]
    fn first_hit_reports_nearest_triangle() {
        let bvh = WorldBvh::build(vec![flat_floor()], 4);
        let ray = Ray::new(Vector3::new(0.0, 5.0, 0.0), Vector3::new(0.0, -10.0, 0.0));
        let hit = bvh.first_hit(&ray, 1.0).expect("ray should hit floor");
        assert_eq!(hit.component, 7);
    }

    #[test]
    fn segment_blocked_true_when_geometry_intervenes() {
        let bvh = WorldBvh::build(vec![flat_floor()], 4);
        assert!(bvh.segment_blocked(Vector3::new(0.0, 5.0, 0.0), Vector3::new(0.0, -5.0, 0.0)));
    }

    #[test]
    fn segment_blocked_false_when_clear() {
        let bvh = WorldBvh::build(vec![flat_floor()], 4);
        assert!(!bvh.segment_blocked(Vector3::new(0.0, 5.0, 0.0), Vector3::new(0.0, 6.0, 0.0)));
    }

    #[test]
    fn all_hits_is_sorted_by_distance() {
        let mut near = flat_floor();
        near.vertices.iter_mut().for_each(|v| v.y += 1.0);
        let far = flat_floor();
        let bvh = WorldBvh::build(vec![far, near], 1);
        let ray = Ray::new(Vector3::new(0.0, 5.0, 0.0), Vector3::new(0.0, -10.0, 0.0));
        let hits = bvh.all_hits(&ray, 1.0);
        assert!(hits.len() >= 2);
        assert!(hits.windows(2).all(|w| w[0].t <= w[1].t));
    }
}
