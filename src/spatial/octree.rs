//! Dynamic loose octree over components, emitters, listeners and meters
//! (C2). Generalized from the static, build-once triangle octree of
//! `fyrox-core::octree` into a mutable index supporting insert/remove/update
//! at interactive rates.
//!
//! Each node owns four separate lists (one per entity kind) rather than one
//! mixed list, matching the node layout described for the spatial index.
//! Insertion walks down to the deepest node whose bounds fully contain the
//! entity's own bounds (the "loose" part: node bounds are fixed at
//! construction and never shrink to fit their contents).

use crate::layer_mask::LayerMask;
use crate::math::aabb::AxisAlignedBoundingBox;
use crate::math::ray::Ray;
use arrayvec::ArrayVec;
use fxhash::FxHashMap;
use nalgebra::Vector3;

const MAX_TRAVERSAL_DEPTH: usize = 24;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Component,
    Emitter,
    Listener,
    Meter,
}

/// Opaque reference to a world-owned entity; the octree never dereferences
/// it, it only carries it alongside the bounds/layer-mask used for queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub index: u32,
}

#[derive(Clone)]
struct Item {
    entity: EntityRef,
    layer_mask: LayerMask,
    bounds: AxisAlignedBoundingBox,
}

#[derive(Default)]
struct NodeLists {
    components: Vec<Item>,
    emitters: Vec<Item>,
    listeners: Vec<Item>,
    meters: Vec<Item>,
}

impl NodeLists {
    fn list_mut(&mut self, kind: EntityKind) -> &mut Vec<Item> {
        match kind {
            EntityKind::Component => &mut self.components,
            EntityKind::Emitter => &mut self.emitters,
            EntityKind::Listener => &mut self.listeners,
            EntityKind::Meter => &mut self.meters,
        }
    }

    fn list(&self, kind: EntityKind) -> &Vec<Item> {
        match kind {
            EntityKind::Component => &self.components,
            EntityKind::Emitter => &self.emitters,
            EntityKind::Listener => &self.listeners,
            EntityKind::Meter => &self.meters,
        }
    }

    fn is_empty(&self) -> bool {
        self.components.is_empty() && self.emitters.is_empty() && self.listeners.is_empty() && self.meters.is_empty()
    }
}

struct Node {
    bounds: AxisAlignedBoundingBox,
    children: Option<[u32; 8]>,
    lists: NodeLists,
}

struct Location {
    node: u32,
    kind: EntityKind,
}

/// A loose octree with a fixed root half-size and a bounded construction
/// depth. Traversals (`visit_colliding`, `ray_hits_component`) walk an
/// explicit, fixed-capacity stack and never allocate.
pub struct Octree {
    nodes: Vec<Node>,
    max_depth: u32,
    locations: FxHashMap<EntityRef, Location>,
}

impl Octree {
    pub fn new(half_size: f32, max_depth: u32) -> Self {
        let root = Node {
            bounds: AxisAlignedBoundingBox::from_radius(Vector3::new(0.0, 0.0, 0.0), half_size),
            children: None,
            lists: NodeLists::default(),
        };
        Self {
            nodes: vec![root],
            max_depth: max_depth.min(MAX_TRAVERSAL_DEPTH as u32),
            locations: FxHashMap::default(),
        }
    }

    fn ensure_children(&mut self, node_index: u32) -> [u32; 8] {
        if let Some(children) = self.nodes[node_index as usize].children {
            return children;
        }
        let octants = self.nodes[node_index as usize].bounds.split();
        let mut indices = [0u32; 8];
        for (i, bounds) in octants.into_iter().enumerate() {
            let idx = self.nodes.len() as u32;
            self.nodes.push(Node {
                bounds,
                children: None,
                lists: NodeLists::default(),
            });
            indices[i] = idx;
        }
        self.nodes[node_index as usize].children = Some(indices);
        indices
    }

    /// Inserts `entity` with the given world-space `bounds`, descending to
    /// the deepest node that fully contains it. Replaces any prior location
    /// for the same entity.
    pub fn insert(&mut self, entity: EntityRef, bounds: AxisAlignedBoundingBox, layer_mask: LayerMask) {
        self.remove(entity);

        let mut current = 0u32;
        let mut depth = 0;
        loop {
            if depth >= self.max_depth {
                break;
            }
            let children = self.ensure_children(current);
            let mut descended = false;
            for child in children {
                if self.nodes[child as usize].bounds.contains_aabb(&bounds) {
                    current = child;
                    depth += 1;
                    descended = true;
                    break;
                }
            }
            if !descended {
                break;
            }
        }

        self.nodes[current as usize].lists.list_mut(entity.kind).push(Item {
            entity,
            layer_mask,
            bounds,
        });
        self.locations.insert(
            entity,
            Location {
                node: current,
                kind: entity.kind,
            },
        );
    }

    /// Removes `entity` if present. A no-op if it was never inserted.
    pub fn remove(&mut self, entity: EntityRef) {
        if let Some(location) = self.locations.remove(&entity) {
            let list = self.nodes[location.node as usize].lists.list_mut(location.kind);
            list.retain(|item| item.entity != entity);
        }
    }

    /// Removes then re-inserts `entity`; equivalent to `remove` + `insert`
    /// but named separately since it's the common per-frame update path.
    pub fn update(&mut self, entity: EntityRef, bounds: AxisAlignedBoundingBox, layer_mask: LayerMask) {
        self.insert(entity, bounds, layer_mask);
    }

    pub fn is_tracked(&self, entity: EntityRef) -> bool {
        self.locations.contains_key(&entity)
    }

    fn node_intersects_query(node: &Node, min: Vector3<f32>, max: Vector3<f32>) -> bool {
        node.bounds.is_intersects_aabb(&AxisAlignedBoundingBox::from_min_max(min, max))
    }

    /// Descends only nodes whose extent intersects `[min, max]`, invoking
    /// `callback` once per entity whose own bounds also intersect it.
    pub fn visit_colliding(&self, min: Vector3<f32>, max: Vector3<f32>, mut callback: impl FnMut(EntityRef)) {
        let mut stack: ArrayVec<u32, 256> = ArrayVec::new();
        stack.push(0);
        let query = AxisAlignedBoundingBox::from_min_max(min, max);

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            if !Self::node_intersects_query(node, min, max) {
                continue;
            }
            for list in [&node.lists.components, &node.lists.emitters, &node.lists.listeners, &node.lists.meters] {
                for item in list {
                    if item.bounds.is_intersects_aabb(&query) {
                        callback(item.entity);
                    }
                }
            }
            if let Some(children) = node.children {
                for child in children {
                    if stack.len() < stack.capacity() {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Collects every emitter whose layer mask intersects `layer_mask` and
    /// whose distance to `center` is within the emitter's own insertion
    /// range (recovered from the half-extent of its insertion box, since
    /// emitters are inserted with bounds `position ± range`).
    pub fn find_speakers(&self, center: Vector3<f32>, layer_mask: LayerMask, output: &mut Vec<EntityRef>) {
        let mut stack: ArrayVec<u32, 256> = ArrayVec::new();
        stack.push(0);

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            for item in &node.lists.emitters {
                if !item.layer_mask.intersects_mask(layer_mask) {
                    continue;
                }
                let position = item.bounds.center();
                let range = item.bounds.half_extents().x;
                if (position - center).norm_squared() <= range * range {
                    output.push(item.entity);
                }
            }
            if let Some(children) = node.children {
                for child in children {
                    if stack.len() < stack.capacity() {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Broad-phase component hits along `ray` (ray-vs-AABB only; leaf-level
    /// triangle hits are the ray-trace BVH's job).
    pub fn ray_hits_component(&self, ray: &Ray, layer_mask: LayerMask) -> Vec<EntityRef> {
        let mut hits = Vec::new();
        let mut stack: ArrayVec<u32, 256> = ArrayVec::new();
        stack.push(0);

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            if ray.aabb_intersection(&node.bounds).is_none() {
                continue;
            }
            for item in &node.lists.components {
                if item.layer_mask.intersects_mask(layer_mask) && ray.aabb_intersection(&item.bounds).is_some() {
                    hits.push(item.entity);
                }
            }
            if let Some(children) = node.children {
                for child in children {
                    if stack.len() < stack.capacity() {
                        stack.push(child);
                    }
                }
            }
        }
        hits
    }

    /// Fast clear used when the all-mic layer mask changes: every component
    /// is dropped from every node without touching emitters/listeners/meters.
    pub fn clear_components(&mut self) {
        self.locations.retain(|entity, _| entity.kind != EntityKind::Component);
        for node in &mut self.nodes {
            node.lists.components.clear();
        }
    }

    pub fn is_empty_at_root(&self) -> bool {
        self.nodes[0].lists.is_empty() && self.nodes[0].children.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn emitter(i: u32) -> EntityRef {
        EntityRef {
            kind: EntityKind::Emitter,
            index: i,
        }
    }

    #[test]
    fn insert_then_remove_leaves_tree_untouched() {
        let mut tree = Octree::new(100.0, 6);
        let e = emitter(1);
        let bounds = AxisAlignedBoundingBox::from_radius(Vector3::new(1.0, 1.0, 1.0), 2.0);
        tree.insert(e, bounds, LayerMask::ALL);
        assert!(tree.is_tracked(e));
        tree.remove(e);
        assert!(!tree.is_tracked(e));
    }

    #[test]
    fn visit_colliding_finds_inserted_entity_once() {
        let mut tree = Octree::new(100.0, 6);
        let e = emitter(2);
        let bounds = AxisAlignedBoundingBox::from_radius(Vector3::new(5.0, 0.0, 0.0), 1.0);
        tree.insert(e, bounds, LayerMask::ALL);

        let mut hits = Vec::new();
        tree.visit_colliding(Vector3::new(-10.0, -10.0, -10.0), Vector3::new(10.0, 10.0, 10.0), |found| {
            hits.push(found);
        });
        assert_eq!(hits, vec![e]);
    }

    #[test]
    fn find_speakers_respects_layer_mask_and_range() {
        let mut tree = Octree::new(100.0, 6);
        let near = emitter(3);
        let far = emitter(4);
        let wrong_layer = emitter(5);
        tree.insert(near, AxisAlignedBoundingBox::from_radius(Vector3::new(1.0, 0.0, 0.0), 5.0), LayerMask::single(0));
        tree.insert(far, AxisAlignedBoundingBox::from_radius(Vector3::new(50.0, 0.0, 0.0), 1.0), LayerMask::single(0));
        tree.insert(wrong_layer, AxisAlignedBoundingBox::from_radius(Vector3::new(1.0, 0.0, 0.0), 5.0), LayerMask::single(1));

        let mut out = Vec::new();
        tree.find_speakers(Vector3::new(0.0, 0.0, 0.0), LayerMask::single(0), &mut out);
        assert_eq!(out, vec![near]);
    }

    #[test]
    fn clear_components_only_drops_components() {
        let mut tree = Octree::new(100.0, 6);
        let comp = EntityRef { kind: EntityKind::Component, index: 1 };
        let em = emitter(6);
        let bounds = AxisAlignedBoundingBox::from_radius(Vector3::new(0.0, 0.0, 0.0), 1.0);
        tree.insert(comp, bounds, LayerMask::ALL);
        tree.insert(em, bounds, LayerMask::ALL);
        tree.clear_components();
        assert!(!tree.is_tracked(comp));
        assert!(tree.is_tracked(em));
    }

    #[test]
    fn ray_hits_component_finds_intersecting_component() {
        let mut tree = Octree::new(100.0, 6);
        let comp = EntityRef { kind: EntityKind::Component, index: 2 };
        let bounds = AxisAlignedBoundingBox::from_radius(Vector3::new(0.0, 0.0, 5.0), 1.0);
        tree.insert(comp, bounds, LayerMask::ALL);

        let ray = Ray::new(Vector3::new(0.0, 0.0, -10.0), Vector3::new(0.0, 0.0, 20.0));
        let hits = tree.ray_hits_component(&ray, LayerMask::ALL);
        assert_eq!(hits, vec![comp]);
    }
}
