//! Media Module - Lokale und entfernte Tracks
//!
//! Dieses Modul beschreibt die Media-Fähigkeiten, die von der
//! Real-Time-Engine bereitgestellt werden:
//! - Track Handles (Audio/Video, lokal oder entfernt)
//! - Acquisition von Mikrofon und Kamera
//! - Besitz der lokalen Tracks während einer Session
//!

mod acquirer;
pub mod mock;
mod track;

pub use acquirer::{MediaAcquirer, MediaError};
pub use track::{LocalTracks, MediaKind, SinkRef, TrackHandle, DEFAULT_AUDIO_OUTPUT};
