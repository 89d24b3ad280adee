//! Direct-path occlusion filtering and indirect-path (reverb) derivation
//! from room statistics (C8). Distance smoothing and the keep-alive timeout
//! live here; the shared-slot assignment itself is [`crate::effect_pool`].

use crate::backend::reverb::EaxReverbParams;
use crate::backend::{FilterParams, FilterType};
use crate::probe::RoomStatistics;
use std::time::Duration;

/// Direct (unreflected) path from emitter to microphone: one straight ray,
/// attenuated by distance and by any occluding geometry it passed through.
#[derive(Copy, Clone, Debug)]
pub struct DirectPathResult {
    pub gain: f32,
    pub filter: FilterParams,
}

/// Linear distance attenuation clamped to `[0, 1]`, `gain = 0` at or beyond
/// `range`. Occlusion further multiplies `gain` by `1 - obstruction`, and
/// band-specific transmission losses become the direct-path filter.
pub fn compute_direct_path(distance: f32, range: f32, obstruction: f32, transmission: [f32; 3]) -> DirectPathResult {
    let distance_gain = if range > 0.0 { (1.0 - distance / range).clamp(0.0, 1.0) } else { 0.0 };
    let gain = distance_gain * (1.0 - obstruction.clamp(0.0, 1.0));
    DirectPathResult {
        gain,
        filter: filter_params_for_direct_path(transmission),
    }
}

/// Maps per-band transmission loss onto a backend filter. Per the backend
/// naming quirk (§4.8): the filter reads as low-pass when `gain_hf <
/// gain_lf`, high-pass otherwise — `kind` itself is cosmetic bookkeeping.
pub fn filter_params_for_direct_path(transmission: [f32; 3]) -> FilterParams {
    let gain_lf = transmission[0].clamp(0.0, 1.0);
    let gain_hf = transmission[2].clamp(0.0, 1.0);
    FilterParams {
        kind: if gain_hf < gain_lf { FilterType::LowPass } else { FilterType::HighPass },
        gain: 1.0,
        gain_lf,
        gain_hf,
    }
}

/// Derives EAX-reverb-equivalent indirect-path parameters from a probe's
/// room statistics (Sabine reverb time per band, mean free path for the
/// reflection/late-reverb onset delays).
pub fn indirect_path_from_room(stats: &RoomStatistics) -> EaxReverbParams {
    let mut params = EaxReverbParams::default();
    params.decay_time = stats.reverb_time[1].max(0.1);
    params.decay_lf_ratio = if stats.reverb_time[1] > 0.0 { (stats.reverb_time[0] / stats.reverb_time[1]).clamp(0.1, 2.0) } else { 1.0 };
    params.decay_hf_ratio = if stats.reverb_time[1] > 0.0 { (stats.reverb_time[2] / stats.reverb_time[1]).clamp(0.1, 2.0) } else { 1.0 };
    params.reflection_delay = (stats.mean_free_path / 343.0).max(0.0);
    params.late_reverb_delay = stats.echo_delay.max(0.0);
    params.gain_lf = (1.0 - stats.absorption[0]).clamp(0.0, 1.0);
    params.gain_hf = (1.0 - stats.absorption[2]).clamp(0.0, 1.0);
    params
}

/// Per-emitter-or-microphone-pair indirect-path state: smooths reverb
/// parameters frame to frame and releases the underlying slot request after
/// `keep_alive` of silence, mirroring `deoalEnvironment`'s tracker.
pub struct EnvironmentTracker {
    current: EaxReverbParams,
    silence_elapsed: Duration,
    pub keep_alive: Duration,
}

impl EnvironmentTracker {
    pub fn new(keep_alive: Duration) -> Self {
        Self {
            current: EaxReverbParams::default(),
            silence_elapsed: Duration::ZERO,
            keep_alive,
        }
    }

    pub fn current(&self) -> EaxReverbParams {
        self.current
    }

    /// Advances the tracker one frame. `reset_smooth` bypasses interpolation
    /// (listener teleport/scene load); otherwise blends toward `target` at
    /// `smoothing` per frame. `audible` resets the silence timer; once it
    /// has been false for `keep_alive`, parameters snap to silence (`gain =
    /// 0`) so the caller can safely release the shared slot.
    pub fn advance(&mut self, target: EaxReverbParams, reset_smooth: bool, audible: bool, elapsed: Duration, smoothing: f32) {
        if reset_smooth {
            self.current = target;
        } else {
            self.current = self.current.lerp(&target, smoothing.clamp(0.0, 1.0));
        }

        if audible {
            self.silence_elapsed = Duration::ZERO;
        } else {
            self.silence_elapsed += elapsed;
            if self.silence_elapsed >= self.keep_alive {
                self.current.gain = 0.0;
            }
        }
    }

    pub fn is_silent(&self) -> bool {
        self.current.gain <= 0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn direct_path_gain_falls_off_linearly_with_distance() {
        let near = compute_direct_path(0.0, 10.0, 0.0, [0.0; 3]);
        let far = compute_direct_path(10.0, 10.0, 0.0, [0.0; 3]);
        assert_eq!(near.gain, 1.0);
        assert_eq!(far.gain, 0.0);
    }

    #[test]
    fn obstruction_attenuates_direct_path_multiplicatively() {
        let clear = compute_direct_path(5.0, 10.0, 0.0, [0.0; 3]);
        let blocked = compute_direct_path(5.0, 10.0, 0.5, [0.0; 3]);
        assert!((blocked.gain - clear.gain * 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn filter_kind_follows_low_high_pass_naming_quirk() {
        let low = filter_params_for_direct_path([0.9, 0.5, 0.1]);
        assert_eq!(low.kind, FilterType::LowPass);
        let high = filter_params_for_direct_path([0.1, 0.5, 0.9]);
        assert_eq!(high.kind, FilterType::HighPass);
    }

    #[test]
    fn tracker_reset_smooth_snaps_instead_of_blending() {
        let mut tracker = EnvironmentTracker::new(Duration::from_millis(100));
        let mut target = EaxReverbParams::default();
        target.gain = 0.2;
        tracker.advance(target, true, true, Duration::from_millis(16), 0.1);
        assert_eq!(tracker.current().gain, 0.2);
    }

    #[test]
    fn tracker_silences_after_keep_alive_elapses_without_audibility() {
        let mut tracker = EnvironmentTracker::new(Duration::from_millis(50));
        let target = EaxReverbParams::default();
        tracker.advance(target, true, false, Duration::from_millis(16), 0.2);
        assert!(!tracker.is_silent());
        tracker.advance(target, false, false, Duration::from_millis(60), 0.2);
        assert!(tracker.is_silent());
    }
}
