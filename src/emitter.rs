//! Emitter ("speaker") state machine (C7): play/pause/stop transitions,
//! streaming queue refill with underrun recovery, and position-offset
//! simulation while unbound from a hardware source.

use crate::asset::decode_buffer::{DecodeBuffer, Decoder};
use crate::asset::sound_asset::SoundAsset;
use crate::backend::{AudioBackend, DistanceModel, FilterParams, SourceId, SourceState};
use crate::error::InvalidParameter;
use crate::layer_mask::LayerMask;
use crate::log::Log;
use crate::pool::{Handle, Pool};
use crate::source_pool::{OwnerId, SourceHandle, SourcePool};
use bitflags::bitflags;
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmitterState {
    Stopped,
    Paused,
    Playing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmitterSpatialKind {
    Point,
    Directional,
}

/// A PCM source an emitter can read chunks from; `Synth`/`Video` are
/// alternatives to a resident/streaming [`SoundAsset`], unified behind one
/// `read_samples` behavior per the "flatten virtual hierarchies" design note.
pub trait SampleSource: Send {
    fn bytes_per_sample(&self) -> u8;
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    /// `None` for an open-ended generator (e.g. a live synth).
    fn total_samples(&self) -> Option<u64>;
    /// Produces up to `count` samples starting at `offset`, looping-aware if
    /// the source wraps on its own.
    fn read_samples(&mut self, offset: u64, count: u64) -> Vec<u8>;
}

pub enum EmitterSource {
    Sound(Handle<SoundAsset>),
    Synth(Arc<Mutex<dyn SampleSource>>),
    Video(Arc<Mutex<dyn SampleSource>>),
    None,
}

impl std::fmt::Debug for EmitterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitterSource::Sound(h) => write!(f, "Sound({h:?})"),
            EmitterSource::Synth(_) => write!(f, "Synth(..)"),
            EmitterSource::Video(_) => write!(f, "Video(..)"),
            EmitterSource::None => write!(f, "None"),
        }
    }
}

/// Streaming buffer count/duration per source kind (§4.7).
#[derive(Copy, Clone, Debug)]
pub struct StreamingProfile {
    pub buffer_count: u32,
    pub buffer_duration: Duration,
}

pub const SOUND_STREAM_PROFILE: StreamingProfile = StreamingProfile {
    buffer_count: 5,
    buffer_duration: Duration::from_millis(200),
};
pub const VIDEO_STREAM_PROFILE: StreamingProfile = StreamingProfile {
    buffer_count: 5,
    buffer_duration: Duration::from_millis(200),
};
pub const SYNTH_STREAM_PROFILE: StreamingProfile = StreamingProfile {
    buffer_count: 2,
    buffer_duration: Duration::from_millis(50),
};

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        const GEOMETRY = 0b0001;
        const GAIN = 0b0010;
        const DISTANCE_MODEL = 0b0100;
        const PITCH_OR_LOOPING = 0b1000;
    }
}

pub struct Emitter {
    pub owner: OwnerId,
    pub source: EmitterSource,
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub layer_mask: LayerMask,
    pub spatial_kind: EmitterSpatialKind,
    pub range: f32,
    pub volume: f32,
    pub muted: bool,
    pub looping: bool,
    pub play_speed: f32,
    pub play_from: f32,
    pub play_to: f32,
    pub play_position: f32,
    pub state: EmitterState,
    pub positionless: bool,
    pub play_finished: bool,
    pub importance: i32,
    pub reset_listener_smooth: bool,

    pub(crate) source_handle: Option<SourceHandle>,
    dirty: DirtyFlags,
    queue_sample_offset: u64,
    buffers_in_flight: u32,
    decode_buffer: DecodeBuffer,
    stream_decoder: Option<Box<dyn Decoder>>,
}

impl Emitter {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            source: EmitterSource::None,
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            layer_mask: LayerMask::ALL,
            spatial_kind: EmitterSpatialKind::Point,
            range: 50.0,
            volume: 1.0,
            muted: false,
            looping: false,
            play_speed: 1.0,
            play_from: 0.0,
            play_to: f32::MAX,
            play_position: 0.0,
            state: EmitterState::Stopped,
            positionless: false,
            play_finished: false,
            importance: 0,
            reset_listener_smooth: true,
            source_handle: None,
            dirty: DirtyFlags::empty(),
            queue_sample_offset: 0,
            buffers_in_flight: 0,
            decode_buffer: DecodeBuffer::new(),
            stream_decoder: None,
        }
    }

    pub fn validate_play_range(from: f32, to: f32) -> Result<(), InvalidParameter> {
        if from > to {
            Err(InvalidParameter::InvalidPlayRange { from, to })
        } else {
            Ok(())
        }
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    fn streaming_profile(&self) -> Option<StreamingProfile> {
        match &self.source {
            EmitterSource::Sound(_) => Some(SOUND_STREAM_PROFILE),
            EmitterSource::Video(_) => Some(VIDEO_STREAM_PROFILE),
            EmitterSource::Synth(_) => Some(SYNTH_STREAM_PROFILE),
            EmitterSource::None => None,
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming_profile().is_some()
    }

    fn sample_rate(&self) -> f32 {
        44_100.0
    }

    /// Per-frame operation given the emitter is `Playing` (§4.7). Returns
    /// whether the emitter is still bound at the end of the frame — callers
    /// use this to decide whether to `unbind` from the source pool.
    pub fn tick(&mut self, elapsed: Duration, backend: &mut dyn AudioBackend, source_pool: &SourcePool, assets: &Pool<SoundAsset>) {
        if self.state != EmitterState::Playing || self.play_finished {
            return;
        }

        let elapsed_samples = self.sample_rate() * elapsed.as_secs_f32() * self.play_speed;

        let bound_backend_id = self
            .source_handle
            .filter(|&h| source_pool.is_still_owner(h, self.owner))
            .and_then(|h| source_pool.backend_id(h));

        let Some(backend_id) = bound_backend_id else {
            self.play_position += elapsed_samples;
            if !self.looping && self.play_position >= self.play_to {
                self.play_finished = true;
            }
            return;
        };

        let status = match backend.source_status(backend_id) {
            Ok(status) => status,
            Err(e) => {
                Log::err(format!("source_status failed: {e}"));
                return;
            }
        };

        let mut underrun = false;
        if self.is_streaming() && status.state == SourceState::Stopped {
            // Tie-break (§4.7): underrun wins only if still short of play_to;
            // otherwise this is a natural end-of-stream.
            if self.play_position < self.play_to {
                underrun = true;
                Log::warn("Buffer Underrun");
            } else {
                self.play_finished = true;
                return;
            }
        }

        self.apply_dirty(backend, backend_id);
        self.play_position += elapsed_samples;

        if self.is_streaming() {
            self.refill_buffers(backend, backend_id, underrun, assets);
        }
    }

    fn apply_dirty(&mut self, backend: &mut dyn AudioBackend, backend_id: SourceId) {
        if self.dirty.contains(DirtyFlags::GEOMETRY) && !self.positionless {
            Log::verify(backend.set_source_position(backend_id, self.position));
            Log::verify(backend.set_source_velocity(backend_id, self.velocity));
            let forward = self.orientation * Vector3::z();
            Log::verify(backend.set_source_orientation(backend_id, forward));
        }
        if self.dirty.contains(DirtyFlags::GAIN) {
            let gain = if self.muted { 0.0 } else { self.volume };
            Log::verify(backend.set_source_gain(backend_id, gain));
        }
        if self.dirty.contains(DirtyFlags::DISTANCE_MODEL) {
            Log::verify(backend.set_source_distance_model(
                backend_id,
                DistanceModel {
                    reference_distance: 1.0,
                    max_distance: self.range,
                    rolloff_factor: 1.0,
                },
            ));
        }
        if self.dirty.contains(DirtyFlags::PITCH_OR_LOOPING) {
            Log::verify(backend.set_source_pitch(backend_id, self.play_speed));
            Log::verify(backend.set_source_looping(backend_id, false));
        }
        self.dirty = DirtyFlags::empty();
    }

    /// Unqueues finished buffers and refills up to the source kind's
    /// streaming profile; re-issues `play()` on underrun or on a
    /// looping wrap where every buffer had drained.
    fn refill_buffers(&mut self, backend: &mut dyn AudioBackend, backend_id: SourceId, underrun: bool, assets: &Pool<SoundAsset>) {
        let Some(profile) = self.streaming_profile() else {
            return;
        };

        let processed = match backend.unqueue_processed_buffers(backend_id) {
            Ok(buffers) => buffers,
            Err(e) => {
                Log::err(format!("unqueue_processed_buffers failed: {e}"));
                return;
            }
        };
        for buffer in &processed {
            Log::verify(backend.destroy_buffer(*buffer));
            self.buffers_in_flight = self.buffers_in_flight.saturating_sub(1);
        }

        let wrapped_empty = self.looping && self.buffers_in_flight == 0 && !processed.is_empty();

        while self.buffers_in_flight < profile.buffer_count {
            let chunk = self.next_chunk(profile.buffer_duration, assets);
            let Some((pcm, channels, sample_rate)) = chunk else {
                break;
            };
            match backend.create_buffer() {
                Ok(buffer) => {
                    Log::verify(backend.fill_buffer(buffer, &pcm, channels, sample_rate));
                    Log::verify(backend.queue_buffer(backend_id, buffer));
                    self.buffers_in_flight += 1;
                }
                Err(e) => {
                    Log::warn(format!("create_buffer failed: {e}"));
                    break;
                }
            }
        }

        if underrun || wrapped_empty {
            Log::verify(backend.play(backend_id));
        }
    }

    /// Produces one chunk's worth of PCM from whichever source kind backs
    /// this emitter, using the looping decode-buffer path when `looping` and
    /// the non-looping path otherwise. `Synth`/`Video` pull straight from
    /// their `SampleSource`; `Sound` resolves its handle against `assets` and
    /// either slices the resident blob or drives the asset's decoder.
    fn next_chunk(&mut self, duration: Duration, assets: &Pool<SoundAsset>) -> Option<(Vec<u8>, u16, u32)> {
        match &self.source {
            EmitterSource::Synth(src) | EmitterSource::Video(src) => {
                let mut locked = src.lock().expect("sample source mutex poisoned");
                let count = (locked.sample_rate() as u64) / 5;
                let offset = self.queue_sample_offset;
                let data = locked.read_samples(offset, count);
                if data.is_empty() {
                    return None;
                }
                self.queue_sample_offset += count;
                Some((data, locked.channels(), locked.sample_rate()))
            }
            EmitterSource::Sound(handle) => {
                let asset = assets.try_borrow(*handle)?;
                let frame_bytes = (asset.bytes_per_sample as u64 * asset.channels as u64).max(1);
                let n_bytes = ((asset.sample_rate as u64 * duration.as_millis() as u64 / 1000) * frame_bytes) as usize;

                if let Some(pcm) = asset.resident_pcm() {
                    let offset = (self.queue_sample_offset * frame_bytes) as usize;
                    if offset >= pcm.len() {
                        if !self.looping {
                            return None;
                        }
                        self.queue_sample_offset = 0;
                        return self.next_chunk(duration, assets);
                    }
                    let end = (offset + n_bytes).min(pcm.len());
                    let chunk = pcm[offset..end].to_vec();
                    self.queue_sample_offset += (end - offset) as u64 / frame_bytes.max(1);
                    Some((chunk, asset.channels, asset.sample_rate))
                } else {
                    if self.stream_decoder.is_none() {
                        self.stream_decoder = asset.open_decoder();
                    }
                    let decoder = self.stream_decoder.as_deref_mut()?;
                    let produced = if self.looping {
                        self.decode_buffer.decode_looping(decoder, n_bytes)
                    } else {
                        self.decode_buffer.decode(decoder, n_bytes)
                    };
                    if produced == 0 {
                        return None;
                    }
                    Some((self.decode_buffer.bytes().to_vec(), asset.channels, asset.sample_rate))
                }
            }
            EmitterSource::None => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn unbound_emitter_advances_position_and_latches_finished() {
        let mut emitter = Emitter::new(OwnerId(1));
        emitter.state = EmitterState::Playing;
        emitter.play_to = 10.0;
        emitter.looping = false;

        let pool = SourcePool::new();
        let assets = Pool::new();
        let mut backend = NullBackend::default();
        emitter.tick(Duration::from_secs(1), &mut backend, &pool, &assets);
        assert!(emitter.play_position > 0.0);

        // Drive position past play_to.
        emitter.play_position = 100.0;
        emitter.tick(Duration::from_millis(1), &mut backend, &pool, &assets);
        assert!(emitter.play_finished);

        // Latch: stays finished even if play_position is reset without a
        // fresh Playing command.
        emitter.play_position = 0.0;
        emitter.tick(Duration::from_millis(1), &mut backend, &pool, &assets);
        assert!(emitter.play_finished);
    }

    #[test]
    fn play_range_validation_rejects_inverted_range() {
        assert!(Emitter::validate_play_range(0.0, 10.0).is_ok());
        assert!(Emitter::validate_play_range(10.0, 0.0).is_err());
    }

    #[test]
    fn streaming_profiles_match_specification() {
        assert_eq!(SOUND_STREAM_PROFILE.buffer_count, 5);
        assert_eq!(SOUND_STREAM_PROFILE.buffer_duration, Duration::from_millis(200));
        assert_eq!(SYNTH_STREAM_PROFILE.buffer_count, 2);
        assert_eq!(SYNTH_STREAM_PROFILE.buffer_duration, Duration::from_millis(50));
    }

    #[test]
    fn resident_sound_source_yields_chunks_then_loops() {
        use crate::asset::sound_asset::SoundAsset;

        let mut assets = Pool::new();
        let pcm = vec![1u8; 4_410 * 2];
        let handle = assets.spawn(SoundAsset::resident("clip.wav", 0, 0, 2, 1, 44_100, pcm));

        let mut emitter = Emitter::new(OwnerId(1));
        emitter.source = EmitterSource::Sound(handle);
        emitter.looping = true;

        let first = emitter.next_chunk(Duration::from_millis(100), &assets).unwrap();
        assert_eq!(first.0.len(), 8_820);
        // Exhausting the resident blob wraps back to the start when looping.
        let second = emitter.next_chunk(Duration::from_millis(400), &assets).unwrap();
        assert!(!second.0.is_empty());
    }
}
