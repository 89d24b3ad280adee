//! Developer-mode diagnostics surface (§6, §9). No text parsing lives in
//! this crate: a host's console/CLI turns typed-in text into a
//! [`DevModeCommand`] and submits it; the engine answers with data, never
//! side effects beyond logging, in line with "developer-mode is a
//! read-only snapshot" (§9).

use crate::pool::Handle;
use crate::world::Listener;
use nalgebra::Vector3;

/// One of the `dm_*` console commands. Each variant carries exactly the
/// arguments that command's original text form required.
#[derive(Clone, Debug, PartialEq)]
pub enum DevModeCommand {
    Enable(bool),
    Help,
    LogCalcEnvProbe { position: Vector3<f32> },
    ShowModuleInfo,
    ShowSpeakerEnvInfo { emitter: Handle<crate::emitter::Emitter> },
    ShowSpeakerEnvInfoAt { position: Vector3<f32> },
    ShowSpeakerEnvInfoClosest { position: Vector3<f32> },
    ShowActiveMicInfo,
    CaptureMicRays,
    ShowAudioModels,
    CaptureSpeakerDirectClosest { position: Vector3<f32> },
}

/// Read-only data the engine copies out once per audio frame (§9: developer
/// mode must never observe a torn or half-updated frame). A host renders
/// this however it likes; nothing here is mutable from outside the engine.
#[derive(Clone, Debug, Default)]
pub struct DevModeSnapshot {
    pub active_microphone: Option<Handle<Listener>>,
    pub active_listener_position: Option<Vector3<f32>>,
    pub tracked_component_count: u32,
    pub tracked_emitter_count: u32,
    pub active_reverb_slot_count: u32,
    pub last_probe_ray_count: u32,
    pub last_probe_reverb_time: Option<[f32; 3]>,
}

impl DevModeSnapshot {
    pub fn capture(
        active_microphone: Option<Handle<Listener>>,
        active_listener_position: Option<Vector3<f32>>,
        tracked_component_count: u32,
        tracked_emitter_count: u32,
        active_reverb_slot_count: u32,
        last_probe_ray_count: u32,
        last_probe_reverb_time: Option<[f32; 3]>,
    ) -> Self {
        Self {
            active_microphone,
            active_listener_position,
            tracked_component_count,
            tracked_emitter_count,
            active_reverb_slot_count,
            last_probe_ray_count,
            last_probe_reverb_time,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshot_capture_carries_every_field_through() {
        let snapshot = DevModeSnapshot::capture(None, Some(Vector3::new(1.0, 2.0, 3.0)), 4, 5, 2, 64, Some([0.3, 0.4, 0.5]));
        assert_eq!(snapshot.tracked_component_count, 4);
        assert_eq!(snapshot.tracked_emitter_count, 5);
        assert_eq!(snapshot.active_listener_position, Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(snapshot.last_probe_reverb_time, Some([0.3, 0.4, 0.5]));
    }

    #[test]
    fn commands_are_plain_data_no_parsing_here() {
        let cmd = DevModeCommand::LogCalcEnvProbe { position: Vector3::zeros() };
        assert_eq!(cmd, DevModeCommand::LogCalcEnvProbe { position: Vector3::zeros() });
    }
}
