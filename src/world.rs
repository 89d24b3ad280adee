//! World aggregate (C10): owns every component/emitter/listener/meter pool,
//! the spatial index over them, and the per-frame synchronization pass that
//! pushes dirty geometry into the octree before the audio thread reads it.

use crate::asset::sound_asset::SoundAsset;
use crate::layer_mask::LayerMask;
use crate::math::aabb::AxisAlignedBoundingBox;
use crate::pool::{Handle, Pool};
use crate::spatial::octree::{EntityKind, EntityRef, Octree};
use crate::trace::bvh::{Material, TaggedTriangle, WorldBvh};
use nalgebra::{UnitQuaternion, Vector3};

/// Static (within a frame) acoustic geometry: a triangle soup tagged with a
/// material, the unit other modules trace rays against.
pub struct Component {
    pub triangles: Vec<TaggedTriangle>,
    pub bounds: AxisAlignedBoundingBox,
    pub layer_mask: LayerMask,
}

#[derive(Clone, Debug)]
pub struct Listener {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub gain: f32,
    pub layer_mask: LayerMask,
    pub range: f32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            gain: 1.0,
            layer_mask: LayerMask::ALL,
            range: 100.0,
        }
    }
}

/// A passive probe point: receives the same room-statistics tracing a
/// listener does but never drives backend playback (used for level meters).
#[derive(Clone, Debug)]
pub struct Meter {
    pub position: Vector3<f32>,
    pub layer_mask: LayerMask,
    pub range: f32,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            layer_mask: LayerMask::ALL,
            range: 100.0,
        }
    }
}

#[derive(Default)]
struct DirtySets {
    components: Vec<Handle<Component>>,
    emitters: Vec<Handle<crate::emitter::Emitter>>,
    listeners: Vec<Handle<Listener>>,
    meters: Vec<Handle<Meter>>,
}

pub struct World {
    pub components: Pool<Component>,
    pub emitters: Pool<crate::emitter::Emitter>,
    pub listeners: Pool<Listener>,
    pub meters: Pool<Meter>,
    pub assets: Pool<SoundAsset>,

    octree: Octree,
    dirty: DirtySets,
    all_mic_layer_mask: LayerMask,
    active_microphone: Option<Handle<Listener>>,
}

impl World {
    pub fn new(half_size: f32, max_depth: u32) -> Self {
        Self {
            components: Pool::new(),
            emitters: Pool::new(),
            listeners: Pool::new(),
            meters: Pool::new(),
            assets: Pool::new(),
            octree: Octree::new(half_size, max_depth),
            dirty: DirtySets::default(),
            all_mic_layer_mask: LayerMask::NONE,
            active_microphone: None,
        }
    }

    pub fn set_active_microphone(&mut self, listener: Option<Handle<Listener>>) {
        self.active_microphone = listener;
    }

    pub fn active_microphone(&self) -> Option<Handle<Listener>> {
        self.active_microphone
    }

    pub fn add_component(&mut self, triangles: Vec<TaggedTriangle>, layer_mask: LayerMask) -> Handle<Component> {
        let bounds = AxisAlignedBoundingBox::from_points(&triangles.iter().flat_map(|t| t.vertices).collect::<Vec<_>>());
        let handle = self.components.spawn(Component { triangles, bounds, layer_mask });
        self.dirty.components.push(handle);
        handle
    }

    pub fn remove_component(&mut self, handle: Handle<Component>) {
        if let Some(_) = self.components.free(handle) {
            self.octree.remove(EntityRef { kind: EntityKind::Component, index: handle.index() });
        }
    }

    pub fn add_emitter(&mut self, emitter: crate::emitter::Emitter) -> Handle<crate::emitter::Emitter> {
        let handle = self.emitters.spawn(emitter);
        self.dirty.emitters.push(handle);
        handle
    }

    pub fn remove_emitter(&mut self, handle: Handle<crate::emitter::Emitter>) {
        if self.emitters.free(handle).is_some() {
            self.octree.remove(EntityRef { kind: EntityKind::Emitter, index: handle.index() });
        }
    }

    pub fn add_listener(&mut self, listener: Listener) -> Handle<Listener> {
        let handle = self.listeners.spawn(listener);
        self.dirty.listeners.push(handle);
        self.recompute_all_mic_mask();
        handle
    }

    pub fn remove_listener(&mut self, handle: Handle<Listener>) {
        if self.listeners.free(handle).is_some() {
            self.octree.remove(EntityRef { kind: EntityKind::Listener, index: handle.index() });
            if self.active_microphone == Some(handle) {
                self.active_microphone = None;
            }
            self.recompute_all_mic_mask();
        }
    }

    pub fn add_meter(&mut self, meter: Meter) -> Handle<Meter> {
        let handle = self.meters.spawn(meter);
        self.dirty.meters.push(handle);
        self.recompute_all_mic_mask();
        handle
    }

    pub fn remove_meter(&mut self, handle: Handle<Meter>) {
        if self.meters.free(handle).is_some() {
            self.octree.remove(EntityRef { kind: EntityKind::Meter, index: handle.index() });
            self.recompute_all_mic_mask();
        }
    }

    pub fn add_sound_asset(&mut self, asset: SoundAsset) -> Handle<SoundAsset> {
        self.assets.spawn(asset)
    }

    pub fn remove_sound_asset(&mut self, handle: Handle<SoundAsset>) {
        self.assets.free(handle);
    }

    pub fn mark_component_dirty(&mut self, handle: Handle<Component>) {
        self.dirty.components.push(handle);
    }

    pub fn mark_emitter_dirty(&mut self, handle: Handle<crate::emitter::Emitter>) {
        self.dirty.emitters.push(handle);
    }

    pub fn mark_listener_dirty(&mut self, handle: Handle<Listener>) {
        self.dirty.listeners.push(handle);
        self.recompute_all_mic_mask();
    }

    pub fn mark_meter_dirty(&mut self, handle: Handle<Meter>) {
        self.dirty.meters.push(handle);
        self.recompute_all_mic_mask();
    }

    pub fn all_mic_layer_mask(&self) -> LayerMask {
        self.all_mic_layer_mask
    }

    /// Recomputes the union of every active listener's and meter's layer
    /// mask. When the union changes, components are wholesale re-asserted:
    /// cheap relative to per-component diffing since components rarely move.
    fn recompute_all_mic_mask(&mut self) {
        let mut mask = LayerMask::NONE;
        for listener in self.listeners.iter() {
            mask |= listener.layer_mask;
        }
        for meter in self.meters.iter() {
            mask |= meter.layer_mask;
        }
        if mask != self.all_mic_layer_mask {
            self.all_mic_layer_mask = mask;
            self.octree.clear_components();
            for (handle, component) in self.components.pair_iter() {
                self.dirty.components.push(handle);
                let _ = component;
            }
        }
    }

    /// Drains every dirty list, pushing updated bounds/layer masks into the
    /// octree. Call once per frame before the audio thread runs its pass.
    pub fn prepare_process_audio(&mut self) {
        for handle in self.dirty.components.drain(..) {
            if let Some(component) = self.components.try_borrow(handle) {
                let entity = EntityRef { kind: EntityKind::Component, index: handle.index() };
                if component.layer_mask.intersects_mask(self.all_mic_layer_mask) {
                    self.octree.update(entity, component.bounds, component.layer_mask);
                } else {
                    self.octree.remove(entity);
                }
            }
        }

        for handle in self.dirty.emitters.drain(..) {
            if let Some(emitter) = self.emitters.try_borrow(handle) {
                let bounds = AxisAlignedBoundingBox::from_radius(emitter.position, emitter.range);
                self.octree.update(EntityRef { kind: EntityKind::Emitter, index: handle.index() }, bounds, emitter.layer_mask);
            }
        }

        for handle in self.dirty.listeners.drain(..) {
            if let Some(listener) = self.listeners.try_borrow(handle) {
                let bounds = AxisAlignedBoundingBox::from_radius(listener.position, listener.range);
                self.octree.update(EntityRef { kind: EntityKind::Listener, index: handle.index() }, bounds, listener.layer_mask);
            }
        }

        for handle in self.dirty.meters.drain(..) {
            if let Some(meter) = self.meters.try_borrow(handle) {
                let bounds = AxisAlignedBoundingBox::from_radius(meter.position, meter.range);
                self.octree.update(EntityRef { kind: EntityKind::Meter, index: handle.index() }, bounds, meter.layer_mask);
            }
        }
    }

    pub fn find_speakers(&self, center: Vector3<f32>, layer_mask: LayerMask, output: &mut Vec<EntityRef>) {
        self.octree.find_speakers(center, layer_mask, output);
    }

    /// Builds a fresh ray-trace BVH from every component within `radius` of
    /// `center` whose mask intersects `layer_mask`. Rebuilt on demand per
    /// probe rather than kept resident, since the set of nearby components
    /// changes whenever the probe position moves meaningfully.
    pub fn build_local_bvh(&self, center: Vector3<f32>, radius: f32, layer_mask: LayerMask) -> WorldBvh {
        let min = center.add_scalar(-radius);
        let max = center.add_scalar(radius);
        let mut triangles = Vec::new();

        self.octree.visit_colliding(min, max, |entity| {
            if entity.kind != EntityKind::Component {
                return;
            }
            let handle = self.components.handle_from_index(entity.index);
            if let Some(component) = self.components.try_borrow(handle) {
                if component.layer_mask.intersects_mask(layer_mask) {
                    triangles.extend(component.triangles.iter().copied());
                }
            }
        });

        WorldBvh::build(triangles, 4)
    }

    pub fn component_material_hint(&self) -> Material {
        Material::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source_pool::OwnerId;

    fn triangle_at(z: f32) -> TaggedTriangle {
        TaggedTriangle {
            vertices: [Vector3::new(-5.0, -5.0, z), Vector3::new(5.0, -5.0, z), Vector3::new(0.0, 5.0, z)],
            component: 0,
            material: Material::default(),
        }
    }

    #[test]
    fn add_listener_updates_all_mic_mask() {
        let mut world = World::new(500.0, 8);
        assert_eq!(world.all_mic_layer_mask(), LayerMask::NONE);
        let mut listener = Listener::default();
        listener.layer_mask = LayerMask::single(2);
        world.add_listener(listener);
        assert_eq!(world.all_mic_layer_mask(), LayerMask::single(2));
    }

    #[test]
    fn prepare_process_audio_makes_emitter_findable() {
        let mut world = World::new(500.0, 8);
        let emitter = crate::emitter::Emitter::new(OwnerId(1));
        world.add_emitter(emitter);
        world.prepare_process_audio();

        let mut out = Vec::new();
        world.find_speakers(Vector3::zeros(), LayerMask::ALL, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn component_outside_all_mic_mask_is_excluded_from_octree() {
        let mut world = World::new(500.0, 8);
        world.add_component(vec![triangle_at(1.0)], LayerMask::ALL);
        world.prepare_process_audio();

        // No listener/meter exists yet, so the all-mic mask is NONE and the
        // component must never have entered the octree.
        let bvh = world.build_local_bvh(Vector3::zeros(), 10.0, LayerMask::ALL);
        assert!(bvh.is_empty());
    }

    #[test]
    fn build_local_bvh_only_includes_components_within_radius() {
        let mut world = World::new(500.0, 8);
        world.add_listener(Listener::default());
        let near = world.add_component(vec![triangle_at(1.0)], LayerMask::ALL);
        let far = world.add_component(vec![triangle_at(400.0)], LayerMask::ALL);
        world.prepare_process_audio();

        let bvh = world.build_local_bvh(Vector3::zeros(), 10.0, LayerMask::ALL);
        assert!(!bvh.is_empty());
        let _ = (near, far);
    }
}
