//! Top-level facade (§6): peer factories for every world-owned entity kind
//! plus the `process_audio` entry point a host calls once per audio frame.
//! Dirty-bit notification methods are thin forwarders to [`crate::world::World`];
//! the actual per-frame work (source binding, direct/indirect path, shared
//! slot assignment) lives in [`Engine::process_audio`].

use crate::backend::{AudioBackend, Extension};
use crate::config::{AuralizationMode, Config};
use crate::effect_pool::{EffectPool, EffectSlotHandle, EnvironmentCandidate, DEFAULT_KEEP_ALIVE};
use crate::emitter::{Emitter, EmitterState};
use crate::environment::{compute_direct_path, indirect_path_from_room, EnvironmentTracker};
use crate::log::Log;
use crate::pool::Handle;
use crate::probe::{trace_probe, ProbeCache};
use crate::source_pool::{OwnerId, SourcePool};
use crate::spatial::octree::EntityKind;
use crate::trace::bvh::TaggedTriangle;
use crate::world::{Component, Listener, Meter, World};
use fxhash::FxHashMap;
use std::time::Duration;

const DEFAULT_WORLD_HALF_SIZE: f32 = 2048.0;
const DEFAULT_WORLD_MAX_DEPTH: u32 = 10;
const PROBE_CACHE_CAPACITY: usize = 32;
/// Per-frame exponential-smoothing factor for indirect-path parameters
/// (§4.8); not exposed via [`Config`] since it is a fixed audio-rate
/// constant rather than a tunable quality knob.
const ENVIRONMENT_SMOOTHING: f32 = 0.2;

pub struct Engine {
    pub world: World,
    backend: Box<dyn AudioBackend>,
    source_pool: SourcePool,
    effect_pool: EffectPool,
    config: Config,
    probe_caches: FxHashMap<u32, ProbeCache>,
    trackers: FxHashMap<OwnerId, EnvironmentTracker>,
}

impl Engine {
    pub fn new(config: Config, backend: Box<dyn AudioBackend>) -> Self {
        let effect_pool = EffectPool::new(config.max_shared_effect_slots() as usize);
        Self {
            world: World::new(DEFAULT_WORLD_HALF_SIZE, DEFAULT_WORLD_MAX_DEPTH),
            backend,
            source_pool: SourcePool::new(),
            effect_pool,
            config,
            probe_caches: FxHashMap::default(),
            trackers: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn create_component(&mut self, triangles: Vec<TaggedTriangle>, layer_mask: crate::layer_mask::LayerMask) -> Handle<Component> {
        self.world.add_component(triangles, layer_mask)
    }

    pub fn destroy_component(&mut self, handle: Handle<Component>) {
        self.world.remove_component(handle);
    }

    pub fn notify_component_dirty(&mut self, handle: Handle<Component>) {
        self.world.mark_component_dirty(handle);
    }

    pub fn create_emitter(&mut self, owner: OwnerId) -> Handle<Emitter> {
        self.world.add_emitter(Emitter::new(owner))
    }

    pub fn create_sound_asset(&mut self, asset: crate::asset::sound_asset::SoundAsset) -> Handle<crate::asset::sound_asset::SoundAsset> {
        self.world.add_sound_asset(asset)
    }

    pub fn destroy_sound_asset(&mut self, handle: Handle<crate::asset::sound_asset::SoundAsset>) {
        self.world.remove_sound_asset(handle);
    }

    pub fn destroy_emitter(&mut self, handle: Handle<Emitter>) {
        if let Some(emitter) = self.world.emitters.try_borrow(handle) {
            self.trackers.remove(&emitter.owner);
            if let Some(source_handle) = emitter.source_handle {
                self.source_pool.unbind(self.backend.as_mut(), source_handle);
            }
        }
        self.world.remove_emitter(handle);
    }

    pub fn notify_emitter_dirty(&mut self, handle: Handle<Emitter>) {
        self.world.mark_emitter_dirty(handle);
    }

    pub fn create_listener(&mut self, listener: Listener) -> Handle<Listener> {
        self.world.add_listener(listener)
    }

    pub fn destroy_listener(&mut self, handle: Handle<Listener>) {
        self.probe_caches.remove(&handle.index());
        self.world.remove_listener(handle);
    }

    pub fn notify_listener_dirty(&mut self, handle: Handle<Listener>) {
        self.world.mark_listener_dirty(handle);
    }

    pub fn create_meter(&mut self, meter: Meter) -> Handle<Meter> {
        self.world.add_meter(meter)
    }

    pub fn destroy_meter(&mut self, handle: Handle<Meter>) {
        self.probe_caches.remove(&handle.index());
        self.world.remove_meter(handle);
    }

    pub fn set_active_microphone(&mut self, listener: Option<Handle<Listener>>) {
        self.world.set_active_microphone(listener);
    }

    /// Runs one frame: synchronizes the spatial index, advances every
    /// audible emitter near the active microphone, and re-derives the
    /// shared reverb-slot assignment from their indirect-path parameters.
    pub fn process_audio(&mut self, elapsed: Duration) {
        self.world.prepare_process_audio();

        let Some(listener_handle) = self.world.active_microphone() else {
            self.effect_pool.assign_speakers(self.backend.as_mut(), &[]);
            return;
        };
        let Some(listener) = self.world.listeners.try_borrow(listener_handle).cloned() else {
            return;
        };

        Log::verify(self.backend.set_listener_position(listener.position));
        Log::verify(self.backend.set_listener_velocity(listener.velocity));
        let forward = listener.orientation * nalgebra::Vector3::z();
        let up = listener.orientation * nalgebra::Vector3::y();
        Log::verify(self.backend.set_listener_orientation(forward, up));
        Log::verify(self.backend.set_listener_gain(listener.gain));

        let mode = self.config.auralization_mode();
        let efx_active = self.config.enable_efx() && self.backend.is_extension_available(Extension::Efx);
        let run_indirect = mode == AuralizationMode::Full && efx_active;

        let mut nearby = Vec::new();
        self.world.find_speakers(listener.position, listener.layer_mask, &mut nearby);

        // Disabled skips the occlusion trace entirely; direct_sound still needs
        // it to drive the per-emitter distance/occlusion gain below.
        let bvh = (mode != AuralizationMode::Disabled)
            .then(|| self.world.build_local_bvh(listener.position, listener.range, listener.layer_mask));

        let probe = if run_indirect {
            let trace_quality = self.config.effective_trace_quality();
            let probe_cache = self
                .probe_caches
                .entry(listener_handle.index())
                .or_insert_with(|| ProbeCache::new(PROBE_CACHE_CAPACITY));
            let bvh_ref = bvh.as_ref().expect("indirect path requires a built bvh");
            Some(match probe_cache.find_reusable(listener.position) {
                Some(cached) => cached.clone(),
                None => {
                    let traced = trace_probe(
                        bvh_ref,
                        listener.position,
                        listener.range,
                        trace_quality.ray_count,
                        trace_quality.max_bounces,
                        trace_quality.max_transmits,
                    );
                    probe_cache.insert(traced.clone());
                    traced
                }
            })
        } else {
            None
        };

        let mut candidates = Vec::new();

        for entity in &nearby {
            if entity.kind != EntityKind::Emitter {
                continue;
            }
            let handle = self.world.emitters.handle_from_index(entity.index);
            let Some(emitter) = self.world.emitters.try_borrow_mut(handle) else {
                continue;
            };
            if emitter.state != EmitterState::Playing {
                continue;
            }

            // B3: a positionless emitter ignores position/velocity/environment
            // entirely and mixes relative to the listener at full volume.
            let direct_gain = if emitter.positionless || mode == AuralizationMode::Disabled {
                emitter.volume
            } else {
                let distance = (emitter.position - listener.position).norm();
                let occluded = bvh
                    .as_ref()
                    .map(|b| b.segment_blocked(emitter.position, listener.position))
                    .unwrap_or(false);
                let direct = compute_direct_path(distance, emitter.range, if occluded { 1.0 } else { 0.0 }, [0.1, 0.1, 0.1]);
                direct.gain * emitter.volume
            };

            let source_handle = emitter
                .source_handle
                .filter(|&h| self.source_pool.is_still_owner(h, emitter.owner))
                .or_else(|| self.source_pool.bind(self.backend.as_mut(), emitter.owner, emitter.importance));
            emitter.source_handle = source_handle;

            if let Some(backend_id) = source_handle.and_then(|h| self.source_pool.backend_id(h)) {
                Log::verify(self.backend.set_source_gain(backend_id, direct_gain));
                Log::verify(self.backend.set_source_direct_filter(backend_id, None));
            }

            emitter.tick(elapsed, self.backend.as_mut(), &self.source_pool, &self.world.assets);

            if emitter.positionless || !run_indirect {
                emitter.reset_listener_smooth = false;
                continue;
            }
            let Some(probe) = probe.as_ref() else {
                emitter.reset_listener_smooth = false;
                continue;
            };

            let tracker = self
                .trackers
                .entry(emitter.owner)
                .or_insert_with(|| EnvironmentTracker::new(DEFAULT_KEEP_ALIVE));
            let target = indirect_path_from_room(&probe.stats);
            let audible = direct_gain > 0.0;
            tracker.advance(target, emitter.reset_listener_smooth, audible, elapsed, ENVIRONMENT_SMOOTHING);
            emitter.reset_listener_smooth = false;

            candidates.push(EnvironmentCandidate {
                owner: emitter.owner,
                params: tracker.current(),
                attenuated_gain: direct_gain.max(0.001),
            });
        }

        if run_indirect {
            let assignment = self.effect_pool.assign_speakers(self.backend.as_mut(), &candidates);
            let owned_this_frame: Vec<EffectSlotHandle> = assignment.values().copied().collect();
            self.effect_pool
                .advance_keep_alive(self.backend.as_mut(), &owned_this_frame, elapsed, DEFAULT_KEEP_ALIVE);
        } else {
            // EFX disabled/unavailable or auralization mode isn't full: no
            // shared reverb slots, direct-path filtering only.
            self.effect_pool.assign_speakers(self.backend.as_mut(), &[]);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::NullBackend;
    use crate::source_pool::OwnerId;

    #[test]
    fn process_audio_without_active_microphone_is_a_no_op() {
        let mut engine = Engine::new(Config::default(), Box::new(NullBackend::default()));
        engine.process_audio(Duration::from_millis(16));
    }

    #[test]
    fn emitter_near_active_listener_gets_bound_to_a_source() {
        let mut engine = Engine::new(Config::default(), Box::new(NullBackend::default()));
        let listener = engine.create_listener(Listener::default());
        engine.set_active_microphone(Some(listener));

        let emitter_handle = engine.create_emitter(OwnerId(1));
        {
            let emitter = engine.world.emitters.try_borrow_mut(emitter_handle).unwrap();
            emitter.state = EmitterState::Playing;
            emitter.mark_dirty(crate::emitter::DirtyFlags::GEOMETRY);
        }
        engine.notify_emitter_dirty(emitter_handle);

        engine.process_audio(Duration::from_millis(16));

        let emitter = engine.world.emitters.try_borrow(emitter_handle).unwrap();
        assert!(emitter.source_handle.is_some());
    }

    #[test]
    fn positionless_emitter_is_never_offered_as_a_reverb_candidate() {
        let mut engine = Engine::new(Config::default(), Box::new(NullBackend::default()));
        let listener = engine.create_listener(Listener::default());
        engine.set_active_microphone(Some(listener));

        let emitter_handle = engine.create_emitter(OwnerId(1));
        {
            let emitter = engine.world.emitters.try_borrow_mut(emitter_handle).unwrap();
            emitter.state = EmitterState::Playing;
            emitter.positionless = true;
            emitter.volume = 0.75;
            emitter.mark_dirty(crate::emitter::DirtyFlags::GEOMETRY);
        }
        engine.notify_emitter_dirty(emitter_handle);

        engine.process_audio(Duration::from_millis(16));

        assert_eq!(engine.effect_pool.active_slot_count(), 0);
        assert!(!engine.trackers.contains_key(&OwnerId(1)));
    }

    #[test]
    fn disabled_auralization_mode_skips_reverb_assignment() {
        let mut config = Config::default();
        config.set_auralization_mode(AuralizationMode::Disabled);
        let mut engine = Engine::new(config, Box::new(NullBackend::default()));
        let listener = engine.create_listener(Listener::default());
        engine.set_active_microphone(Some(listener));

        let emitter_handle = engine.create_emitter(OwnerId(1));
        {
            let emitter = engine.world.emitters.try_borrow_mut(emitter_handle).unwrap();
            emitter.state = EmitterState::Playing;
            emitter.mark_dirty(crate::emitter::DirtyFlags::GEOMETRY);
        }
        engine.notify_emitter_dirty(emitter_handle);

        engine.process_audio(Duration::from_millis(16));

        assert_eq!(engine.effect_pool.active_slot_count(), 0);
        assert!(engine.trackers.is_empty());
    }

    #[test]
    fn disabling_efx_releases_shared_slots() {
        let mut config = Config::default();
        config.set_enable_efx(false);
        let mut engine = Engine::new(config, Box::new(NullBackend::default()));
        let listener = engine.create_listener(Listener::default());
        engine.set_active_microphone(Some(listener));

        let emitter_handle = engine.create_emitter(OwnerId(1));
        {
            let emitter = engine.world.emitters.try_borrow_mut(emitter_handle).unwrap();
            emitter.state = EmitterState::Playing;
            emitter.mark_dirty(crate::emitter::DirtyFlags::GEOMETRY);
        }
        engine.notify_emitter_dirty(emitter_handle);

        engine.process_audio(Duration::from_millis(16));

        assert_eq!(engine.effect_pool.active_slot_count(), 0);
    }
}
