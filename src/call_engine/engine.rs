//! Session Controller
//!
//! Einzige Instanz, die den Zustand einer Call-Session verändert:
//! Join/Leave des Channels, Publish der lokalen Tracks und die
//! Kamera-Policy. Entfernte Teilnehmer werden über die
//! [`ParticipantRegistry`] aus dem Event-Strom der Transport-Session
//! nachgeführt.
//!
//! ```text
//! Idle ──join──▶ Joining ──transport ok + publish ok──▶ Joined
//!  ▲                │                                     │
//!  └── Fehler/leave ┘                                     │
//!  └──────────────────────── Leaving ◀──────leave─────────┘
//! ```
//!
//! Befehle werden über einen Command-Lock serialisiert. Ein `leave()`
//! während eines laufenden `join()` markiert den Join als abgebrochen und
//! läuft danach; der Join räumt an seinem nächsten Haltepunkt selbst auf.

use super::registry::{ParticipantRegistry, ParticipantSummary, PlaybackPolicy, RemoteParticipant};
use crate::identity::{Credential, LocalIdentity};
use crate::media::{LocalTracks, MediaAcquirer, MediaError, TrackHandle};
use crate::transport::{EventSubscription, TransportError, TransportSession};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Media acquisition failed: {0}")]
    MediaAcquisitionFailed(#[from] MediaError),

    #[error("Join failed: {0}")]
    JoinFailed(TransportError),

    #[error("Publish failed: {0}")]
    PublishFailed(TransportError),

    #[error("Join cancelled by leave")]
    JoinCancelled,

    #[error("Already joined to a channel")]
    AlreadyJoined,

    #[error("Join already in progress")]
    AlreadyJoining,

    #[error("Leave in progress")]
    LeaveInProgress,

    #[error("Leave failed: {0}")]
    LeaveFailed(TransportError),

    #[error("No local video track")]
    NoVideoTrack,
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// Status der Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nicht verbunden
    Idle,
    /// Tracks vorhanden, Join/Publish läuft
    Joining,
    /// Im Channel, Tracks veröffentlicht
    Joined,
    /// Abbau läuft
    Leaving,
}

/// Events die vom SessionController ausgelöst werden
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(SessionStatus),
    CameraToggled(bool),
    ParticipantsChanged(Vec<ParticipantSummary>),
    Error(String),
}

/// Lesende Sicht auf die Session für die UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub channel_id: Option<String>,
    pub local_identity: LocalIdentity,
    pub status: SessionStatus,
    pub has_audio: bool,
    pub has_video: bool,
    pub camera_enabled: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Unveränderliche Parameter einer Session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub app_id: String,
    pub credential: Option<Credential>,
    pub identity: LocalIdentity,
    pub playback: PlaybackPolicy,
}

impl SessionOptions {
    /// Optionen mit frisch generierter lokaler Identität
    pub fn new(app_id: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            app_id: app_id.into(),
            credential,
            identity: LocalIdentity::generate(),
            playback: PlaybackPolicy::default(),
        }
    }

    pub fn with_playback(mut self, playback: PlaybackPolicy) -> Self {
        self.playback = playback;
        self
    }
}

struct SessionState {
    status: SessionStatus,
    channel_id: Option<String>,
    local_tracks: LocalTracks,
    camera_enabled: bool,
    joined_at: Option<DateTime<Utc>>,
    join_in_flight: bool,
    leave_requested: bool,
    event_pump: Option<JoinHandle<()>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            channel_id: None,
            local_tracks: LocalTracks::default(),
            camera_enabled: false,
            joined_at: None,
            join_in_flight: false,
            leave_requested: false,
            event_pump: None,
        }
    }
}

// ============================================================================
// SESSION CONTROLLER
// ============================================================================

/// Steuert Join/Leave, Publish und Kamera-Policy einer Call-Session
pub struct SessionController {
    options: SessionOptions,
    transport: Arc<dyn TransportSession>,
    acquirer: Arc<dyn MediaAcquirer>,
    registry: Arc<ParticipantRegistry>,
    state: Mutex<SessionState>,
    command_lock: tokio::sync::Mutex<()>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl SessionController {
    /// Erstellt einen neuen SessionController im Status `Idle`
    pub fn new(
        options: SessionOptions,
        transport: Arc<dyn TransportSession>,
        acquirer: Arc<dyn MediaAcquirer>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let registry = Arc::new(ParticipantRegistry::new(
            Arc::clone(&transport),
            event_tx.clone(),
            options.playback.clone(),
        ));

        Self {
            options,
            transport,
            acquirer,
            registry,
            state: Mutex::new(SessionState::default()),
            command_lock: tokio::sync::Mutex::new(()),
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Gibt den aktuellen Session-Status zurück
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn local_identity(&self) -> &LocalIdentity {
        &self.options.identity
    }

    pub fn camera_enabled(&self) -> bool {
        self.state.lock().camera_enabled
    }

    /// Lokaler Video-Track für die eigene Vorschau
    pub fn local_video(&self) -> Option<Arc<dyn TrackHandle>> {
        self.state.lock().local_tracks.video().cloned()
    }

    pub fn local_audio(&self) -> Option<Arc<dyn TrackHandle>> {
        self.state.lock().local_tracks.audio().cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            channel_id: state.channel_id.clone(),
            local_identity: self.options.identity.clone(),
            status: state.status,
            has_audio: state.local_tracks.audio().is_some(),
            has_video: state.local_tracks.video().is_some(),
            camera_enabled: state.camera_enabled,
            joined_at: state.joined_at,
        }
    }

    /// Entfernte Teilnehmer in Render-Reihenfolge
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    /// Tritt dem Channel bei und veröffentlicht Mikrofon und Kamera
    pub async fn join(&self, channel_id: &str) -> Result<(), SessionError> {
        let _command = match self.command_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(self.busy_error()),
        };

        {
            let mut state = self.state.lock();
            match state.status {
                SessionStatus::Idle => {}
                SessionStatus::Joined => return Err(SessionError::AlreadyJoined),
                SessionStatus::Joining => return Err(SessionError::AlreadyJoining),
                SessionStatus::Leaving => return Err(SessionError::LeaveInProgress),
            }
            state.join_in_flight = true;
            state.leave_requested = false;
        }

        tracing::info!(
            "Joining channel '{}' as {}",
            channel_id,
            self.options.identity
        );

        let result = self.run_join(channel_id).await;
        {
            let mut state = self.state.lock();
            state.join_in_flight = false;
            state.leave_requested = false;
        }

        match &result {
            Ok(()) => tracing::info!("Joined channel '{}'", channel_id),
            Err(SessionError::JoinCancelled) => {
                tracing::info!("Join of channel '{}' cancelled by leave", channel_id)
            }
            Err(e) => {
                tracing::error!("Failed to join channel '{}': {}", channel_id, e);
                let _ = self.event_tx.send(CallEvent::Error(e.to_string()));
            }
        }

        result
    }

    /// Verlässt den Channel und gibt alle lokalen Ressourcen frei
    ///
    /// Mehrfache oder gleichzeitige Aufrufe sind erlaubt; im Status `Idle`
    /// ist `leave()` ein erfolgreiches No-op. Läuft gerade ein Join, wird er
    /// abgebrochen und `leave()` wartet, bis er sich aufgelöst hat.
    pub async fn leave(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if state.join_in_flight {
                tracing::info!("Leave requested while join is in flight");
                state.leave_requested = true;
            }
        }

        let _command = self.command_lock.lock().await;

        if self.status() == SessionStatus::Idle {
            tracing::debug!("Leave ignored, session is idle");
            return Ok(());
        }

        tracing::info!("Leaving channel");
        self.set_state(SessionStatus::Leaving);

        self.teardown(true).await.map_err(|e| {
            tracing::error!("Leave not acknowledged by transport: {}", e);
            let _ = self.event_tx.send(CallEvent::Error(e.to_string()));
            SessionError::LeaveFailed(e)
        })
    }

    /// Schaltet die Kamera aus bzw. wieder ein
    ///
    /// Aus: Track deaktivieren und stoppen (Kamera wird freigegeben).
    /// An: Track wieder aktivieren. Der Track bleibt dabei veröffentlicht;
    /// entfernte Teilnehmer sehen ein leeres Bild, kein eingefrorenes.
    /// Gibt den neuen Kamera-Status zurück.
    pub fn toggle_camera(&self) -> Result<bool, SessionError> {
        let enabled = {
            let mut state = self.state.lock();
            let video = state
                .local_tracks
                .video()
                .cloned()
                .ok_or(SessionError::NoVideoTrack)?;

            if state.camera_enabled {
                video.set_enabled(false);
                video.stop();
            } else {
                video.set_enabled(true);
            }
            state.camera_enabled = !state.camera_enabled;
            state.camera_enabled
        };

        tracing::info!("Camera {}", if enabled { "enabled" } else { "disabled" });
        let _ = self.event_tx.send(CallEvent::CameraToggled(enabled));
        Ok(enabled)
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Acquire → Joining → Transport-Join → Publish → Joined
    async fn run_join(&self, channel_id: &str) -> Result<(), SessionError> {
        let (audio, video) = self.acquirer.acquire_audio_video().await.map_err(|e| {
            tracing::warn!("Could not acquire microphone/camera: {}", e);
            SessionError::MediaAcquisitionFailed(e)
        })?;
        let mut tracks = LocalTracks::new(audio, video);

        if self.leave_requested() {
            tracks.release();
            return Err(SessionError::JoinCancelled);
        }

        {
            let mut state = self.state.lock();
            state.local_tracks = tracks;
            state.channel_id = Some(channel_id.to_string());
            state.camera_enabled = true;
        }
        self.set_state(SessionStatus::Joining);

        // Listener vor dem Join, damit kein frühes Event verloren geht
        self.start_event_pump();

        if let Err(e) = self
            .transport
            .join(
                &self.options.app_id,
                channel_id,
                self.options.credential.as_ref(),
                &self.options.identity,
            )
            .await
        {
            let _ = self.teardown(false).await;
            return Err(SessionError::JoinFailed(e));
        }

        if self.leave_requested() {
            return self.cancel_join().await;
        }

        let publishable = self.state.lock().local_tracks.publishable();
        if let Err(e) = self.transport.publish(&publishable).await {
            let _ = self.teardown(true).await;
            return Err(SessionError::PublishFailed(e));
        }
        tracing::debug!("Published {} local track(s)", publishable.len());

        if self.leave_requested() {
            return self.cancel_join().await;
        }

        {
            let mut state = self.state.lock();
            if !state.camera_enabled {
                if let Some(video) = state.local_tracks.video() {
                    video.set_enabled(true);
                }
            }
            state.camera_enabled = true;
            state.joined_at = Some(Utc::now());
        }
        self.set_state(SessionStatus::Joined);

        Ok(())
    }

    async fn cancel_join(&self) -> Result<(), SessionError> {
        self.set_state(SessionStatus::Leaving);
        if let Err(e) = self.teardown(true).await {
            tracing::warn!("Transport leave after cancelled join failed: {}", e);
        }
        Err(SessionError::JoinCancelled)
    }

    /// Gibt lokale Tracks frei, stoppt die Event-Verarbeitung, verlässt
    /// optional den Channel und setzt den Status auf `Idle`
    ///
    /// Der Status wird auch dann `Idle`, wenn der Transport-Leave
    /// fehlschlägt.
    async fn teardown(&self, leave_transport: bool) -> Result<(), TransportError> {
        let (mut tracks, event_pump) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.local_tracks),
                state.event_pump.take(),
            )
        };

        tracks.release();

        if let Some(task) = event_pump {
            task.abort();
            // Abwarten, damit kein laufender Subscribe mehr in die Registry schreibt
            let _ = task.await;
        }

        let result = if leave_transport {
            self.transport.leave().await
        } else {
            Ok(())
        };

        self.registry.clear();

        {
            let mut state = self.state.lock();
            state.channel_id = None;
            state.camera_enabled = false;
            state.joined_at = None;
            state.leave_requested = false;
        }
        self.set_state(SessionStatus::Idle);

        result
    }

    /// Registriert den Transport-Listener und startet die Event-Verarbeitung
    fn start_event_pump(&self) {
        let subscription = self.transport.add_listener();
        let registry = Arc::clone(&self.registry);
        let event_tx = self.event_tx.clone();

        let task = tokio::spawn(run_event_pump(subscription, registry, event_tx));
        self.state.lock().event_pump = Some(task);
    }

    fn leave_requested(&self) -> bool {
        self.state.lock().leave_requested
    }

    /// Fehler für einen Join, während ein anderer Befehl läuft
    fn busy_error(&self) -> SessionError {
        let state = self.state.lock();
        match state.status {
            SessionStatus::Joined => SessionError::AlreadyJoined,
            SessionStatus::Leaving => SessionError::LeaveInProgress,
            SessionStatus::Joining => SessionError::AlreadyJoining,
            SessionStatus::Idle if state.join_in_flight => SessionError::AlreadyJoining,
            SessionStatus::Idle => SessionError::LeaveInProgress,
        }
    }

    /// Aktualisiert den State und sendet Event
    fn set_state(&self, new_state: SessionStatus) {
        self.state.lock().status = new_state;
        tracing::debug!("Session state: {:?}", new_state);
        let _ = self.event_tx.send(CallEvent::StateChanged(new_state));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.event_pump.take() {
            task.abort();
        }
        if state.local_tracks.release() > 0 {
            tracing::warn!("SessionController dropped without leave, local tracks released");
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("identity", &self.options.identity)
            .field("status", &self.status())
            .field("camera_enabled", &self.camera_enabled())
            .finish()
    }
}

// ============================================================================
// EVENT PUMP
// ============================================================================

/// Verarbeitet Transport-Events der Reihe nach
///
/// Fehler einzelner Events werden geloggt und als `CallEvent::Error`
/// gemeldet, beenden die Verarbeitung aber nicht.
async fn run_event_pump(
    mut subscription: EventSubscription,
    registry: Arc<ParticipantRegistry>,
    event_tx: broadcast::Sender<CallEvent>,
) {
    while let Some(event) = subscription.next().await {
        tracing::debug!("Transport event: {:?}", event);
        if let Err(e) = registry.handle_event(event).await {
            let _ = event_tx.send(CallEvent::Error(e.to_string()));
        }
    }
    tracing::debug!("Transport event stream closed");
}

// ============================================================================
// TESTS
// ============================================================================
