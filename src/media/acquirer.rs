//! Media Acquisition - Mikrofon und Kamera

use super::track::TrackHandle;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum MediaError {
    #[error("Permission to access media devices denied")]
    PermissionDenied,

    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Media acquisition failed: {0}")]
    Acquisition(String),
}

// ============================================================================
// MEDIA ACQUIRER
// ============================================================================

/// Erzeugt lokale Tracks aus der Geräte-Hardware
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    /// Öffnet Mikrofon und Kamera
    ///
    /// Gibt `(audio, video)` zurück. Beide Tracks sind aktiviert und
    /// gehören danach dem Aufrufer.
    async fn acquire_audio_video(
        &self,
    ) -> Result<(Arc<dyn TrackHandle>, Arc<dyn TrackHandle>), MediaError>;
}
