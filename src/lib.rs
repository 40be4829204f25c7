//! Group Call - Session-Core für Audio/Video-Calls
//!
//! Verwaltet eine Call-Session zwischen dem lokalen Teilnehmer und beliebig
//! vielen entfernten Teilnehmern eines Channels:
//! - Join/Leave mit expliziter State Machine
//! - Publish von Mikrofon und Kamera, Kamera an/aus ohne Unpublish
//! - Registry der entfernten Teilnehmer aus dem Transport-Event-Strom
//!
//! Transport, Media-Hardware und Rendering sind externe Fähigkeiten
//! ([`transport::TransportSession`], [`media::MediaAcquirer`],
//! [`media::TrackHandle`]).

pub mod call_engine;
pub mod config;
pub mod identity;
pub mod media;
pub mod transport;

use call_engine::{
    CallEvent, PlaybackPolicy, RemoteParticipant, SessionController, SessionError,
    SessionOptions, SessionSnapshot,
};
use config::CallConfig;
use identity::LocalIdentity;
use media::{MediaAcquirer, SinkRef};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use transport::TransportSession;

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging
///
/// `RUST_LOG` aus der Umgebung plus die konfigurierte Direktive. Ein
/// zweiter Aufruf lässt den bestehenden Subscriber unverändert.
pub fn init_logging(directive: &str) {
    let mut filter = EnvFilter::from_default_env();
    match directive.parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log directive '{}': {}", directive, e),
    }

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialized");
    }
}

// ============================================================================
// CALL APP
// ============================================================================

/// Eine Call-Session samt Konfiguration
///
/// Wird pro Call erstellt und explizit an die UI übergeben; es gibt keinen
/// globalen Zustand. Nach außen sichtbar sind nur Befehle
/// (`join`, `leave`, `toggle_camera`) und lesende Snapshots.
pub struct CallApp {
    config: CallConfig,
    controller: Arc<SessionController>,
}

impl CallApp {
    /// Erstellt die Session mit frisch generierter lokaler Identität
    pub fn new(
        config: CallConfig,
        transport: Arc<dyn TransportSession>,
        acquirer: Arc<dyn MediaAcquirer>,
    ) -> Self {
        let playback = if config.audio_output.is_empty() {
            PlaybackPolicy::manual()
        } else {
            PlaybackPolicy::with_audio_sink(SinkRef::new(config.audio_output.clone()))
        };
        let options = SessionOptions::new(config.app_id.clone(), config.credential.clone())
            .with_playback(playback);
        tracing::info!("Call session created for {}", options.identity);

        Self {
            config,
            controller: Arc::new(SessionController::new(options, transport, acquirer)),
        }
    }

    /// Tritt dem konfigurierten Standard-Channel bei
    pub async fn join(&self) -> Result<(), SessionError> {
        self.controller.join(&self.config.default_channel).await
    }

    pub async fn join_channel(&self, channel_id: &str) -> Result<(), SessionError> {
        self.controller.join(channel_id).await
    }

    pub async fn leave(&self) -> Result<(), SessionError> {
        self.controller.leave().await
    }

    /// Gibt den neuen Kamera-Status zurück
    pub fn toggle_camera(&self) -> Result<bool, SessionError> {
        self.controller.toggle_camera()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.controller.participants()
    }

    /// Gibt einen Event-Receiver für UI-Updates zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.controller.subscribe()
    }

    pub fn local_identity(&self) -> &LocalIdentity {
        self.controller.local_identity()
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Abbau beim Schließen der UI
    ///
    /// Wie `leave()`, Fehler werden nur geloggt.
    pub async fn shutdown(&self) {
        if let Err(e) = self.controller.leave().await {
            tracing::warn!("Error leaving channel during shutdown: {}", e);
        }
    }
}

impl std::fmt::Debug for CallApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallApp")
            .field("channel", &self.config.default_channel)
            .field("controller", &self.controller)
            .finish()
    }
}
