//! Thin handle-typed interface to a low-level 3D audio backend (C1).
//! Every operation wraps a single backend call with error translation and
//! fails fast: callers never silently drop a [`BackendError`].

pub mod reverb;

use crate::error::BackendError;
use nalgebra::Vector3;
pub use reverb::EaxReverbParams;
use std::fmt;

/// Opaque, backend-assigned identifier. Distinct from [`crate::pool::Handle`]:
/// these index into the driver's own resource tables, not into a `Pool`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendId(pub u32);

pub type SourceId = BackendId;
pub type BufferId = BackendId;
pub type FilterId = BackendId;
pub type EffectId = BackendId;
pub type AuxSlotId = BackendId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterType {
    Null,
    LowPass,
    HighPass,
    BandPass,
}

/// `(gain, gain_lf, gain_hf)` programmed onto a direct-path filter. Per the
/// backend naming quirk (§4.8), the filter behaves as low-pass when
/// `gain_hf < gain_lf` and as high-pass otherwise, regardless of `kind`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FilterParams {
    pub kind: FilterType,
    pub gain: f32,
    pub gain_lf: f32,
    pub gain_hf: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            kind: FilterType::Null,
            gain: 1.0,
            gain_lf: 1.0,
            gain_hf: 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SourceStatus {
    pub state: SourceState,
    pub processed_count: u32,
    pub sample_offset: u64,
}

impl Default for SourceState {
    fn default() -> Self {
        SourceState::Initial
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistanceModel {
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
}

/// A single extension probed at context creation (HRTF head-tracking, EFX).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Extension {
    Efx,
    Hrtf,
}

/// Hardware 3D audio backend. All methods run on the audio thread only
/// (debug-only thread-identity check in implementations); every method
/// returns `Result<_, BackendError>` and implementations must never panic
/// on a recoverable driver failure.
pub trait AudioBackend: fmt::Debug {
    fn is_extension_available(&self, ext: Extension) -> bool;

    fn create_source(&mut self) -> Result<SourceId, BackendError>;
    fn destroy_source(&mut self, id: SourceId) -> Result<(), BackendError>;

    fn create_buffer(&mut self) -> Result<BufferId, BackendError>;
    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), BackendError>;
    fn fill_buffer(&mut self, id: BufferId, pcm: &[u8], channels: u16, sample_rate: u32) -> Result<(), BackendError>;

    fn create_filter(&mut self) -> Result<FilterId, BackendError>;
    fn destroy_filter(&mut self, id: FilterId) -> Result<(), BackendError>;
    fn set_filter_params(&mut self, id: FilterId, params: FilterParams) -> Result<(), BackendError>;

    fn create_effect(&mut self) -> Result<EffectId, BackendError>;
    fn destroy_effect(&mut self, id: EffectId) -> Result<(), BackendError>;
    fn set_reverb_params(&mut self, id: EffectId, params: &EaxReverbParams) -> Result<(), BackendError>;

    fn create_aux_slot(&mut self) -> Result<AuxSlotId, BackendError>;
    fn destroy_aux_slot(&mut self, id: AuxSlotId) -> Result<(), BackendError>;
    fn set_aux_slot_effect(&mut self, slot: AuxSlotId, effect: Option<EffectId>) -> Result<(), BackendError>;

    fn set_source_position(&mut self, id: SourceId, position: Vector3<f32>) -> Result<(), BackendError>;
    fn set_source_velocity(&mut self, id: SourceId, velocity: Vector3<f32>) -> Result<(), BackendError>;
    fn set_source_orientation(&mut self, id: SourceId, direction: Vector3<f32>) -> Result<(), BackendError>;
    fn set_source_gain(&mut self, id: SourceId, gain: f32) -> Result<(), BackendError>;
    fn set_source_pitch(&mut self, id: SourceId, pitch: f32) -> Result<(), BackendError>;
    fn set_source_looping(&mut self, id: SourceId, looping: bool) -> Result<(), BackendError>;
    fn set_source_distance_model(&mut self, id: SourceId, model: DistanceModel) -> Result<(), BackendError>;
    fn set_source_direct_filter(&mut self, id: SourceId, filter: Option<FilterId>) -> Result<(), BackendError>;
    fn set_source_aux_send(&mut self, id: SourceId, slot: Option<AuxSlotId>) -> Result<(), BackendError>;

    fn queue_buffer(&mut self, source: SourceId, buffer: BufferId) -> Result<(), BackendError>;
    fn unqueue_processed_buffers(&mut self, source: SourceId) -> Result<Vec<BufferId>, BackendError>;
    fn source_status(&self, source: SourceId) -> Result<SourceStatus, BackendError>;
    fn play(&mut self, source: SourceId) -> Result<(), BackendError>;
    fn stop(&mut self, source: SourceId) -> Result<(), BackendError>;
    fn pause(&mut self, source: SourceId) -> Result<(), BackendError>;

    fn set_listener_position(&mut self, position: Vector3<f32>) -> Result<(), BackendError>;
    fn set_listener_velocity(&mut self, velocity: Vector3<f32>) -> Result<(), BackendError>;
    fn set_listener_orientation(&mut self, forward: Vector3<f32>, up: Vector3<f32>) -> Result<(), BackendError>;
    fn set_listener_gain(&mut self, gain: f32) -> Result<(), BackendError>;
}

/// Reference backend that accepts every call and hands out monotonically
/// increasing ids. Used by tests and by hosts without a real device —
/// mirrors how `deoalBasics` isolates raw driver calls behind one seam, but
/// never touches any hardware.
#[derive(Debug, Default)]
pub struct NullBackend {
    next_id: u32,
}

impl NullBackend {
    fn fresh_id(&mut self) -> BackendId {
        self.next_id += 1;
        BackendId(self.next_id)
    }
}

impl AudioBackend for NullBackend {
    fn is_extension_available(&self, _ext: Extension) -> bool {
        true
    }

    fn create_source(&mut self) -> Result<SourceId, BackendError> {
        Ok(self.fresh_id())
    }

    fn destroy_source(&mut self, _id: SourceId) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferId, BackendError> {
        Ok(self.fresh_id())
    }

    fn destroy_buffer(&mut self, _id: BufferId) -> Result<(), BackendError> {
        Ok(())
    }

    fn fill_buffer(&mut self, _id: BufferId, _pcm: &[u8], _channels: u16, _sample_rate: u32) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_filter(&mut self) -> Result<FilterId, BackendError> {
        Ok(self.fresh_id())
    }

    fn destroy_filter(&mut self, _id: FilterId) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_filter_params(&mut self, _id: FilterId, _params: FilterParams) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_effect(&mut self) -> Result<EffectId, BackendError> {
        Ok(self.fresh_id())
    }

    fn destroy_effect(&mut self, _id: EffectId) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_reverb_params(&mut self, _id: EffectId, _params: &EaxReverbParams) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_aux_slot(&mut self) -> Result<AuxSlotId, BackendError> {
        Ok(self.fresh_id())
    }

    fn destroy_aux_slot(&mut self, _id: AuxSlotId) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_aux_slot_effect(&mut self, _slot: AuxSlotId, _effect: Option<EffectId>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_position(&mut self, _id: SourceId, _position: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_velocity(&mut self, _id: SourceId, _velocity: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_orientation(&mut self, _id: SourceId, _direction: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_gain(&mut self, _id: SourceId, _gain: f32) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_pitch(&mut self, _id: SourceId, _pitch: f32) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_looping(&mut self, _id: SourceId, _looping: bool) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_distance_model(&mut self, _id: SourceId, _model: DistanceModel) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_direct_filter(&mut self, _id: SourceId, _filter: Option<FilterId>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_source_aux_send(&mut self, _id: SourceId, _slot: Option<AuxSlotId>) -> Result<(), BackendError> {
        Ok(())
    }

    fn queue_buffer(&mut self, _source: SourceId, _buffer: BufferId) -> Result<(), BackendError> {
        Ok(())
    }

    fn unqueue_processed_buffers(&mut self, _source: SourceId) -> Result<Vec<BufferId>, BackendError> {
        Ok(Vec::new())
    }

    fn source_status(&self, _source: SourceId) -> Result<SourceStatus, BackendError> {
        Ok(SourceStatus::default())
    }

    fn play(&mut self, _source: SourceId) -> Result<(), BackendError> {
        Ok(())
    }

    fn stop(&mut self, _source: SourceId) -> Result<(), BackendError> {
        Ok(())
    }

    fn pause(&mut self, _source: SourceId) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_listener_position(&mut self, _position: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_listener_velocity(&mut self, _velocity: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_listener_orientation(&mut self, _forward: Vector3<f32>, _up: Vector3<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_listener_gain(&mut self, _gain: f32) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn null_backend_hands_out_distinct_ids() {
        let mut backend = NullBackend::default();
        let a = backend.create_source().unwrap();
        let b = backend.create_source().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn null_backend_reports_default_status() {
        let backend = NullBackend::default();
        let status = backend.source_status(SourceId(1)).unwrap();
        assert_eq!(status.state, SourceState::Initial);
    }
}
