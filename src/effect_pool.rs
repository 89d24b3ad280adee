//! Bounded pool of hardware reverb effect slots (C6), shared across emitters
//! with similar environments by the algorithm of §4.6. A slot configured
//! with a non-null effect stays "kept alive" for a short timeout after its
//! last owner releases it, so brief inaudibility doesn't thrash backend
//! state.

use crate::backend::{AudioBackend, AuxSlotId, EaxReverbParams, EffectId};
use crate::log::Log;
use crate::source_pool::OwnerId;
use fxhash::FxHashMap;
use std::time::Duration;

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(100);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EffectSlotHandle(pub u32);

struct EffectSlot {
    aux_slot: AuxSlotId,
    effect: EffectId,
    reference_owner: Option<OwnerId>,
    keep_alive_elapsed: Duration,
}

/// One emitter's computed indirect-path parameters, offered up for this
/// frame's shared-slot assignment.
#[derive(Copy, Clone, Debug)]
pub struct EnvironmentCandidate {
    pub owner: OwnerId,
    pub params: EaxReverbParams,
    /// The emitter's own attenuated direct-path gain, used to compensate
    /// `reflection_gain`/`late_reverb_gain` for the backend's statistical
    /// reverb model (§4.6, §9 open question).
    pub attenuated_gain: f32,
}

/// Divides `reflection_gain`/`late_reverb_gain` by the reference emitter's
/// attenuated direct gain, clamped away from zero per the §9 open-question
/// resolution: faithful implementations reproduce the `max(g, 0.001)` clamp
/// rather than letting a near-silent reference blow up the compensation.
pub fn compensate_shared_gain(mut params: EaxReverbParams, reference_attenuated_gain: f32) -> EaxReverbParams {
    let divisor = reference_attenuated_gain.max(0.001);
    params.reflection_gain /= divisor;
    params.late_reverb_gain /= divisor;
    params
}

pub struct EffectPool {
    slots: Vec<EffectSlot>,
    max_shared: usize,
}

impl EffectPool {
    pub fn new(max_shared: usize) -> Self {
        Self {
            slots: Vec::new(),
            max_shared: max_shared.clamp(2, 8),
        }
    }

    pub fn active_slot_count(&self) -> usize {
        self.slots.iter().filter(|s| s.reference_owner.is_some()).count()
    }

    /// Runs the full per-frame assignment: similarity-sorts candidates,
    /// promotes the `max_shared` least-similar-to-everyone-else emitters to
    /// reference slots, and attaches every other candidate to its nearest
    /// reference. Returns each candidate's assigned slot.
    pub fn assign_speakers(
        &mut self,
        backend: &mut dyn AudioBackend,
        candidates: &[EnvironmentCandidate],
    ) -> FxHashMap<OwnerId, EffectSlotHandle> {
        let mut assignment = FxHashMap::default();

        if candidates.is_empty() {
            self.release_all(backend);
            return assignment;
        }

        let n = candidates.len();
        let mut total_distance = vec![0.0f32; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    total_distance[i] += candidates[i].params.similarity_distance(&candidates[j].params);
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| total_distance[a].partial_cmp(&total_distance[b]).unwrap());

        let reference_count = self.max_shared.min(n);
        let reference_indices = &order[..reference_count];

        self.ensure_slot_count(backend, reference_count);

        for (slot_index, &candidate_index) in reference_indices.iter().enumerate() {
            let candidate = &candidates[candidate_index];
            let params = compensate_shared_gain(candidate.params, candidate.attenuated_gain);
            let slot = &mut self.slots[slot_index];
            slot.reference_owner = Some(candidate.owner);
            slot.keep_alive_elapsed = Duration::ZERO;
            Log::verify(backend.set_reverb_params(slot.effect, &params));
            assignment.insert(candidate.owner, EffectSlotHandle(slot_index as u32));
        }

        for &candidate_index in &order[reference_count..] {
            let candidate = &candidates[candidate_index];
            let nearest = reference_indices
                .iter()
                .enumerate()
                .min_by(|(_, &a), (_, &b)| {
                    let da = candidate.params.similarity_distance(&candidates[a].params);
                    let db = candidate.params.similarity_distance(&candidates[b].params);
                    da.partial_cmp(&db).unwrap()
                })
                .map(|(slot_index, _)| slot_index)
                .unwrap_or(0);
            assignment.insert(candidate.owner, EffectSlotHandle(nearest as u32));
        }

        assignment
    }

    fn ensure_slot_count(&mut self, backend: &mut dyn AudioBackend, needed: usize) {
        while self.slots.len() < needed {
            match (backend.create_aux_slot(), backend.create_effect()) {
                (Ok(aux_slot), Ok(effect)) => {
                    Log::verify(backend.set_aux_slot_effect(aux_slot, Some(effect)));
                    self.slots.push(EffectSlot {
                        aux_slot,
                        effect,
                        reference_owner: None,
                        keep_alive_elapsed: Duration::ZERO,
                    });
                }
                (aux_result, effect_result) => {
                    Log::verify(aux_result);
                    Log::verify(effect_result);
                    break;
                }
            }
        }
    }

    pub fn aux_slot_id(&self, handle: EffectSlotHandle) -> Option<AuxSlotId> {
        self.slots.get(handle.0 as usize).map(|s| s.aux_slot)
    }

    /// Advances keep-alive timers for slots that went unowned this frame and
    /// releases any that exceeded `timeout`.
    pub fn advance_keep_alive(&mut self, backend: &mut dyn AudioBackend, owned_this_frame: &[EffectSlotHandle], elapsed: Duration, timeout: Duration) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if owned_this_frame.iter().any(|h| h.0 as usize == index) {
                continue;
            }
            slot.keep_alive_elapsed += elapsed;
            if slot.keep_alive_elapsed >= timeout {
                slot.reference_owner = None;
                Log::verify(backend.set_reverb_params(slot.effect, &EaxReverbParams { gain: 0.0, ..EaxReverbParams::default() }));
            }
        }
    }

    pub fn release_all(&mut self, backend: &mut dyn AudioBackend) {
        for slot in &self.slots {
            Log::verify(backend.set_aux_slot_effect(slot.aux_slot, None));
            Log::verify(backend.destroy_effect(slot.effect));
            Log::verify(backend.destroy_aux_slot(slot.aux_slot));
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::NullBackend;

    fn candidate(owner: u64, gain: f32) -> EnvironmentCandidate {
        let mut params = EaxReverbParams::default();
        params.gain = gain;
        EnvironmentCandidate {
            owner: OwnerId(owner),
            params,
            attenuated_gain: 0.8,
        }
    }

    #[test]
    fn max_shared_slots_of_two_with_two_environments_yields_two_slots() {
        let mut backend = NullBackend::default();
        let mut pool = EffectPool::new(2);

        let candidates = vec![
            candidate(1, 0.9),
            candidate(2, 0.91),
            candidate(3, 0.89),
            candidate(4, 0.1),
            candidate(5, 0.11),
        ];

        let assignment = pool.assign_speakers(&mut backend, &candidates);
        assert_eq!(assignment.len(), 5);
        let distinct: std::collections::HashSet<_> = assignment.values().collect();
        assert_eq!(distinct.len(), 2);
        assert_eq!(pool.active_slot_count(), 2);
    }

    #[test]
    fn empty_candidates_releases_all_slots() {
        let mut backend = NullBackend::default();
        let mut pool = EffectPool::new(4);
        let candidates = vec![candidate(1, 0.5)];
        pool.assign_speakers(&mut backend, &candidates);
        assert_eq!(pool.active_slot_count(), 1);
        pool.assign_speakers(&mut backend, &[]);
        assert_eq!(pool.active_slot_count(), 0);
    }

    #[test]
    fn gain_compensation_divides_by_clamped_reference_gain() {
        let mut params = EaxReverbParams::default();
        params.reflection_gain = 0.1;
        params.late_reverb_gain = 0.2;
        let compensated = compensate_shared_gain(params, 0.0);
        assert_eq!(compensated.reflection_gain, 0.1 / 0.001);
        assert_eq!(compensated.late_reverb_gain, 0.2 / 0.001);
    }
}
