//! Which targets each source's episodes go to

use crate::types::PlatformId;

const VIDEO_TARGETS: &[PlatformId] = &[
    PlatformId::Twitter,
    PlatformId::Twitter2,
    PlatformId::LinkedIn,
];

const AUDIO_TARGETS: &[PlatformId] = &[
    PlatformId::Twitter,
    PlatformId::Twitter2,
    PlatformId::Facebook,
    PlatformId::Facebook2,
    PlatformId::Threads,
];

/// Targets an automated run may post a `source` episode to
pub fn allowed_targets(source: PlatformId) -> &'static [PlatformId] {
    match source {
        PlatformId::YouTube | PlatformId::Rumble => VIDEO_TARGETS,
        PlatformId::Spotify => AUDIO_TARGETS,
        _ => &[],
    }
}

pub fn is_routed(source: PlatformId, target: PlatformId) -> bool {
    allowed_targets(source).contains(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_sources() {
        for source in [PlatformId::YouTube, PlatformId::Rumble] {
            assert!(is_routed(source, PlatformId::Twitter2));
            assert!(is_routed(source, PlatformId::LinkedIn));
            assert!(!is_routed(source, PlatformId::Facebook));
            assert!(!is_routed(source, PlatformId::Threads));
        }
    }

    #[test]
    fn test_spotify_skips_linkedin() {
        assert!(!is_routed(PlatformId::Spotify, PlatformId::LinkedIn));
        assert_eq!(allowed_targets(PlatformId::Spotify).len(), 5);
    }

    #[test]
    fn test_targets_route_nowhere() {
        assert!(allowed_targets(PlatformId::Bluesky).is_empty());
    }
}
