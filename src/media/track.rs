//! Track Handles
//!
//! Ein Track Handle ist eine opake Fähigkeit für genau einen Audio- oder
//! Video-Stream. Die Engine liefert Implementierungen; der Core reicht
//! Handles nur an Sinks weiter und steuert ihren Lebenszyklus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// MEDIA KIND
// ============================================================================

/// Art eines Media-Streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

// ============================================================================
// SINK
// ============================================================================

pub const DEFAULT_AUDIO_OUTPUT: &str = "default-audio-output";

/// Referenz auf eine Render-Fläche (Video-Element, Audio-Ausgabe, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SinkRef(String);

impl SinkRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Standard-Audioausgabe des Geräts
    pub fn default_audio_output() -> Self {
        Self::new(DEFAULT_AUDIO_OUTPUT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// TRACK HANDLE
// ============================================================================

/// Fähigkeit eines einzelnen Tracks
///
/// `close()` muss idempotent sein: ein bereits geschlossener Track
/// ignoriert weitere Aufrufe.
pub trait TrackHandle: Send + Sync {
    /// Engine-interne Track-ID
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Spielt den Track in der angegebenen Sink ab
    fn play(&self, sink: &SinkRef);

    /// Stoppt die Wiedergabe bzw. Aufnahme (gibt Hardware frei)
    fn stop(&self);

    /// Schließt den Track endgültig
    fn close(&self);

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

impl fmt::Debug for dyn TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

// ============================================================================
// LOCAL TRACKS
// ============================================================================

/// Lokale Tracks einer Session
///
/// Gehört exklusiv dem Session Controller. Tracks werden beim Freigeben
/// herausgenommen, dadurch wird jeder Track genau einmal geschlossen.
#[derive(Debug, Default)]
pub struct LocalTracks {
    audio: Option<Arc<dyn TrackHandle>>,
    video: Option<Arc<dyn TrackHandle>>,
}

impl LocalTracks {
    pub fn new(audio: Arc<dyn TrackHandle>, video: Arc<dyn TrackHandle>) -> Self {
        Self {
            audio: Some(audio),
            video: Some(video),
        }
    }

    pub fn audio(&self) -> Option<&Arc<dyn TrackHandle>> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&Arc<dyn TrackHandle>> {
        self.video.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    /// Alle vorhandenen Tracks in Publish-Reihenfolge (Mikrofon, Kamera)
    pub fn publishable(&self) -> Vec<Arc<dyn TrackHandle>> {
        self.audio
            .iter()
            .chain(self.video.iter())
            .map(Arc::clone)
            .collect()
    }

    /// Stoppt und schließt alle Tracks
    ///
    /// Gibt die Anzahl der freigegebenen Tracks zurück; auf leeren
    /// `LocalTracks` ein No-op.
    pub fn release(&mut self) -> usize {
        let mut released = 0;
        for track in [self.audio.take(), self.video.take()].into_iter().flatten() {
            track.stop();
            track.close();
            released += 1;
        }
        if released > 0 {
            tracing::debug!("Released {} local track(s)", released);
        }
        released
    }
}

// ============================================================================
// TESTS
// ============================================================================
