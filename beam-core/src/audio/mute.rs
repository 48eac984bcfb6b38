//! Local-mute policy.
//!
//! Some applications play all audio for every window through a single
//! process (one audio engine per bundle). Muting that process locally
//! while the user still has non-beamed windows of the same app open
//! would silence those windows too, so such bundles are blacklisted
//! from the mute tap unless every window of the app is being beamed.

use std::collections::HashSet;

/// Decides whether the sender may locally mute the captured app.
#[derive(Debug, Clone)]
pub struct MutePolicy {
    blacklist: HashSet<String>,
}

impl MutePolicy {
    pub fn new(blacklist: HashSet<String>) -> Self {
        Self { blacklist }
    }

    /// `false` iff the bundle is blacklisted AND the app still has
    /// windows on screen that are not part of a beam.
    pub fn should_mute(
        &self,
        bundle_id: &str,
        total_windows: usize,
        beamed_windows: usize,
    ) -> bool {
        !(self.blacklist.contains(bundle_id) && total_windows > beamed_windows)
    }
}

impl Default for MutePolicy {
    fn default() -> Self {
        let mut blacklist = HashSet::new();
        blacklist.insert("com.google.Chrome".to_string());
        Self { blacklist }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklisted_app_with_other_windows_keeps_audio() {
        let policy = MutePolicy::default();
        assert!(!policy.should_mute("com.google.Chrome", 3, 1));
    }

    #[test]
    fn blacklisted_app_fully_beamed_is_muted() {
        let policy = MutePolicy::default();
        assert!(policy.should_mute("com.google.Chrome", 1, 1));
    }

    #[test]
    fn non_blacklisted_app_is_always_muted() {
        let policy = MutePolicy::default();
        assert!(policy.should_mute("com.apple.Safari", 5, 1));
    }

    #[test]
    fn zero_windows_edge() {
        let policy = MutePolicy::default();
        assert!(policy.should_mute("com.google.Chrome", 0, 0));
    }

    #[test]
    fn custom_blacklist() {
        let mut blacklist = HashSet::new();
        blacklist.insert("com.example.Game".to_string());
        let policy = MutePolicy::new(blacklist);
        assert!(!policy.should_mute("com.example.Game", 2, 1));
        assert!(policy.should_mute("com.google.Chrome", 2, 1));
    }
}
