//! Medien-Fähigkeiten des Hosts
//!
//! Wiedergabe der Gegenstelle, Klingelton und Desktop-Benachrichtigungen
//! stellt die Seite bereit, in die das Telefon eingebettet ist.

use crate::signaling::{MediaTrack, TrackKind};
use futures::future::BoxFuture;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Failed to route audio to {device}: {reason}")]
    Sink { device: String, reason: String },
}

// ============================================================================
// REMOTE STREAM
// ============================================================================

/// Empfangene Audio-Tracks der Gegenstelle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteStream {
    tracks: Vec<MediaTrack>,
}

impl RemoteStream {
    /// Übernimmt nur die Audio-Tracks
    pub fn from_tracks(tracks: &[MediaTrack]) -> Self {
        Self {
            tracks: tracks
                .iter()
                .filter(|t| t.kind == TrackKind::Audio)
                .cloned()
                .collect(),
        }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Wiedergabe-Element der Oberfläche
pub trait AudioOutput: Send + Sync {
    fn attach(&self, stream: RemoteStream);

    /// Unterstützt das Element die Wahl des Ausgabegeräts?
    fn supports_sink_selection(&self) -> bool;

    fn set_sink(&self, device_id: &str) -> BoxFuture<'static, Result<(), MediaError>>;

    fn play(&self);

    /// Entfernt den angehängten Stream
    fn clear(&self);
}

/// Klingelton in Schleife
pub trait Ringer: Send + Sync {
    fn start_loop(&self);
    fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    Default,
}

/// Desktop-Benachrichtigungen
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn request_permission(&self) -> BoxFuture<'static, NotificationPermission>;

    fn show(&self, title: &str, body: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_stream_keeps_audio_only() {
        let tracks = vec![
            MediaTrack {
                id: "a1".to_string(),
                kind: TrackKind::Audio,
            },
            MediaTrack {
                id: "v1".to_string(),
                kind: TrackKind::Video,
            },
        ];

        let stream = RemoteStream::from_tracks(&tracks);
        assert_eq!(stream.tracks().len(), 1);
        assert_eq!(stream.tracks()[0].id, "a1");

        assert!(RemoteStream::from_tracks(&tracks[1..]).is_empty());
    }
}
