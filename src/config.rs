//! Dynamic configuration surface (§6). Every key has a default and a valid
//! range/enum membership; setters validate at the boundary instead of
//! panicking, following how `fyrox-resource` validates settings.

use crate::error::InvalidParameter;
use std::collections::HashSet;
use strum_macros::{Display, EnumString};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum AuralizationMode {
    Disabled,
    DirectSound,
    #[default]
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum AuralizationQuality {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

/// Ray-tracing parameters derived from a quality tier. `sound_trace_ray_count`
/// and friends in [`Config`] override these when explicitly set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceQuality {
    pub ray_count: u32,
    pub max_bounces: u32,
    pub max_transmits: u32,
}

impl AuralizationQuality {
    pub fn trace_quality(self) -> TraceQuality {
        match self {
            AuralizationQuality::VeryLow => TraceQuality { ray_count: 32, max_bounces: 1, max_transmits: 1 },
            AuralizationQuality::Low => TraceQuality { ray_count: 48, max_bounces: 1, max_transmits: 2 },
            AuralizationQuality::Medium => TraceQuality { ray_count: 64, max_bounces: 2, max_transmits: 2 },
            AuralizationQuality::High => TraceQuality { ray_count: 128, max_bounces: 3, max_transmits: 3 },
            AuralizationQuality::VeryHigh => TraceQuality { ray_count: 256, max_bounces: 4, max_transmits: 4 },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

/// Dynamic runtime configuration; see §6 of the specification for the full
/// key table. All values carry defaults and are validated on write.
#[derive(Clone, Debug)]
pub struct Config {
    device_name: String,
    enable_efx: bool,
    stream_buf_size_threshold: u64,
    auralization_mode: AuralizationMode,
    auralization_quality: AuralizationQuality,
    max_shared_effect_slots: u32,
    sound_trace_ray_count: Option<u32>,
    sound_trace_max_bounce_count: Option<u32>,
    sound_trace_max_transmit_count: Option<u32>,
    estimate_room_ray_count: u32,
    eax_reverb_reflection_gain_factor: f32,
    eax_reverb_late_reverb_gain_factor: f32,
    async_audio: bool,
    frame_rate_limit: u32,
    async_audio_skip_sync_time_ratio: f32,
    log_level: LogLevel,
    disable_extensions: HashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            enable_efx: true,
            stream_buf_size_threshold: 700_000,
            auralization_mode: AuralizationMode::Full,
            auralization_quality: AuralizationQuality::Medium,
            max_shared_effect_slots: 8,
            sound_trace_ray_count: None,
            sound_trace_max_bounce_count: None,
            sound_trace_max_transmit_count: None,
            estimate_room_ray_count: 128,
            eax_reverb_reflection_gain_factor: 1.0,
            eax_reverb_late_reverb_gain_factor: 1.0,
            async_audio: true,
            frame_rate_limit: 0,
            async_audio_skip_sync_time_ratio: 0.5,
            log_level: LogLevel::Info,
            disable_extensions: HashSet::new(),
        }
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), InvalidParameter> {
    if value < min || value > max {
        Err(InvalidParameter::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        })
    } else {
        Ok(())
    }
}

impl Config {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_device_name(&mut self, name: impl Into<String>) {
        self.device_name = name.into();
    }

    pub fn enable_efx(&self) -> bool {
        self.enable_efx
    }

    pub fn set_enable_efx(&mut self, value: bool) {
        self.enable_efx = value;
    }

    pub fn stream_buf_size_threshold(&self) -> u64 {
        self.stream_buf_size_threshold
    }

    pub fn set_stream_buf_size_threshold(&mut self, bytes: u64) {
        self.stream_buf_size_threshold = bytes;
    }

    pub fn auralization_mode(&self) -> AuralizationMode {
        self.auralization_mode
    }

    pub fn set_auralization_mode(&mut self, mode: AuralizationMode) {
        self.auralization_mode = mode;
    }

    pub fn auralization_quality(&self) -> AuralizationQuality {
        self.auralization_quality
    }

    pub fn set_auralization_quality(&mut self, quality: AuralizationQuality) {
        self.auralization_quality = quality;
    }

    pub fn max_shared_effect_slots(&self) -> u32 {
        self.max_shared_effect_slots
    }

    pub fn set_max_shared_effect_slots(&mut self, value: u32) -> Result<(), InvalidParameter> {
        if !(2..=8).contains(&value) {
            return Err(InvalidParameter::OutOfRange {
                field: "max_shared_effect_slots",
                value: value.to_string(),
                min: "2".into(),
                max: "8".into(),
            });
        }
        self.max_shared_effect_slots = value;
        Ok(())
    }

    /// Effective ray count: an explicit override if set, else derived from quality.
    pub fn effective_trace_quality(&self) -> TraceQuality {
        let derived = self.auralization_quality.trace_quality();
        TraceQuality {
            ray_count: self.sound_trace_ray_count.unwrap_or(derived.ray_count),
            max_bounces: self.sound_trace_max_bounce_count.unwrap_or(derived.max_bounces),
            max_transmits: self.sound_trace_max_transmit_count.unwrap_or(derived.max_transmits),
        }
    }

    pub fn set_sound_trace_ray_count(&mut self, value: u32) -> Result<(), InvalidParameter> {
        if value == 0 {
            return Err(InvalidParameter::OutOfRange {
                field: "sound_trace_ray_count",
                value: "0".into(),
                min: "1".into(),
                max: "u32::MAX".into(),
            });
        }
        self.sound_trace_ray_count = Some(value);
        Ok(())
    }

    pub fn set_sound_trace_max_bounce_count(&mut self, value: u32) {
        self.sound_trace_max_bounce_count = Some(value);
    }

    pub fn set_sound_trace_max_transmit_count(&mut self, value: u32) {
        self.sound_trace_max_transmit_count = Some(value);
    }

    pub fn estimate_room_ray_count(&self) -> u32 {
        self.estimate_room_ray_count
    }

    pub fn eax_reverb_reflection_gain_factor(&self) -> f32 {
        self.eax_reverb_reflection_gain_factor
    }

    pub fn set_eax_reverb_reflection_gain_factor(&mut self, value: f32) {
        self.eax_reverb_reflection_gain_factor = value;
    }

    pub fn eax_reverb_late_reverb_gain_factor(&self) -> f32 {
        self.eax_reverb_late_reverb_gain_factor
    }

    pub fn set_eax_reverb_late_reverb_gain_factor(&mut self, value: f32) {
        self.eax_reverb_late_reverb_gain_factor = value;
    }

    pub fn async_audio(&self) -> bool {
        self.async_audio
    }

    pub fn set_async_audio(&mut self, value: bool) {
        self.async_audio = value;
    }

    pub fn frame_rate_limit(&self) -> u32 {
        self.frame_rate_limit
    }

    pub fn set_frame_rate_limit(&mut self, value: u32) {
        self.frame_rate_limit = value;
    }

    pub fn async_audio_skip_sync_time_ratio(&self) -> f32 {
        self.async_audio_skip_sync_time_ratio
    }

    pub fn set_async_audio_skip_sync_time_ratio(&mut self, value: f32) -> Result<(), InvalidParameter> {
        check_range("async_audio_skip_sync_time_ratio", value, 0.0, 1.0)?;
        self.async_audio_skip_sync_time_ratio = value;
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    pub fn disable_extension(&mut self, name: impl Into<String>) {
        self.disable_extensions.insert(name.into());
    }

    pub fn is_extension_disabled(&self, name: &str) -> bool {
        self.disable_extensions.contains(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_specification_table() {
        let cfg = Config::default();
        assert_eq!(cfg.device_name(), "");
        assert!(cfg.enable_efx());
        assert_eq!(cfg.stream_buf_size_threshold(), 700_000);
        assert_eq!(cfg.auralization_mode(), AuralizationMode::Full);
        assert_eq!(cfg.auralization_quality(), AuralizationQuality::Medium);
        assert_eq!(cfg.max_shared_effect_slots(), 8);
        assert_eq!(cfg.estimate_room_ray_count(), 128);
        assert!(cfg.async_audio());
        assert_eq!(cfg.frame_rate_limit(), 0);
        assert_eq!(cfg.async_audio_skip_sync_time_ratio(), 0.5);
    }

    #[test]
    fn max_shared_effect_slots_rejects_out_of_range() {
        let mut cfg = Config::default();
        assert!(cfg.set_max_shared_effect_slots(1).is_err());
        assert!(cfg.set_max_shared_effect_slots(9).is_err());
        assert!(cfg.set_max_shared_effect_slots(4).is_ok());
        assert_eq!(cfg.max_shared_effect_slots(), 4);
    }

    #[test]
    fn quality_boundary_ray_counts() {
        assert_eq!(AuralizationQuality::VeryLow.trace_quality().ray_count, 32);
        assert_eq!(AuralizationQuality::VeryHigh.trace_quality().ray_count, 256);
    }

    #[test]
    fn explicit_ray_count_overrides_quality() {
        let mut cfg = Config::default();
        cfg.set_sound_trace_ray_count(17).unwrap();
        assert_eq!(cfg.effective_trace_quality().ray_count, 17);
    }

    #[test]
    fn skip_sync_ratio_validates_unit_interval() {
        let mut cfg = Config::default();
        assert!(cfg.set_async_audio_skip_sync_time_ratio(-0.1).is_err());
        assert!(cfg.set_async_audio_skip_sync_time_ratio(1.1).is_err());
        assert!(cfg.set_async_audio_skip_sync_time_ratio(0.75).is_ok());
    }
}
