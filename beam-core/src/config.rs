//! Runtime configuration for a beam session.
//!
//! Everything here has a sensible default; binaries override individual
//! fields from CLI flags. There is deliberately no on-disk config file.

use std::collections::HashSet;
use std::time::Duration;

/// Tunables for one beam session (both roles).
#[derive(Debug, Clone)]
pub struct BeamConfig {
    /// Encoder expected frame rate and the capture pacing floor.
    pub target_fps: u32,
    /// Video encoder average bitrate in bits/second.
    pub video_bitrate: u32,
    /// Audio encoder bitrate for stereo input, bits/second.
    pub audio_bitrate_stereo: u32,
    /// Audio encoder bitrate for mono input, bits/second.
    pub audio_bitrate_mono: u32,
    /// Bundle IDs whose process-global audio must not be muted while
    /// non-beamed windows of the same app remain on screen.
    pub mute_blacklist: HashSet<String>,
    /// Forced IDR cadence in frames.
    pub max_keyframe_interval: u32,
    /// Control-channel ping period.
    pub heartbeat_interval: Duration,
    /// Control-channel disconnect threshold.
    pub heartbeat_timeout: Duration,
    /// Reassembly GC cutoff in 90 kHz ticks (one second of media clock).
    pub reassembly_gc_window: u32,
}

impl Default for BeamConfig {
    fn default() -> Self {
        let mut mute_blacklist = HashSet::new();
        mute_blacklist.insert("com.google.Chrome".to_string());
        Self {
            target_fps: 30,
            video_bitrate: 8_000_000,
            audio_bitrate_stereo: 128_000,
            audio_bitrate_mono: 64_000,
            mute_blacklist,
            max_keyframe_interval: 60,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
            reassembly_gc_window: 90_000,
        }
    }
}

impl BeamConfig {
    /// Audio bitrate for the given channel count.
    pub fn audio_bitrate(&self, channels: u32) -> u32 {
        if channels >= 2 {
            self.audio_bitrate_stereo
        } else {
            self.audio_bitrate_mono
        }
    }

    /// Minimum interval between captured frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_table() {
        let cfg = BeamConfig::default();
        assert_eq!(cfg.target_fps, 30);
        assert_eq!(cfg.video_bitrate, 8_000_000);
        assert_eq!(cfg.audio_bitrate(2), 128_000);
        assert_eq!(cfg.audio_bitrate(1), 64_000);
        assert!(cfg.mute_blacklist.contains("com.google.Chrome"));
        assert_eq!(cfg.max_keyframe_interval, 60);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(cfg.reassembly_gc_window, 90_000);
    }

    #[test]
    fn frame_interval_is_fps_reciprocal() {
        let cfg = BeamConfig::default();
        let interval = cfg.frame_interval();
        assert!((interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}
