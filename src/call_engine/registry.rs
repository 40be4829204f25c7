//! Participant Registry
//!
//! Hält die Sicht auf alle entfernten Teilnehmer und welche Media-Arten sie
//! gerade veröffentlichen. Die Registry reduziert den ungeordneten
//! Event-Strom der Transport-Session zu einem konsistenten Zustand:
//!
//! - doppelte `user-published` Events führen zu genau einem Subscribe
//! - pro (Teilnehmer, Media-Art) gewinnt das zuletzt eingegangene Event
//! - ein Eintrag existiert nur, solange mindestens ein Track abonniert ist
//! - entfernte Audio-Tracks werden sofort in der Audio-Sink abgespielt

use super::engine::CallEvent;
use crate::identity::ParticipantId;
use crate::media::{MediaKind, SinkRef, TrackHandle};
use crate::transport::{TransportError, TransportEvent, TransportSession};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Subscribe to {identity}/{kind} failed: {source}")]
    SubscribeFailed {
        identity: ParticipantId,
        kind: MediaKind,
        #[source]
        source: TransportError,
    },
}

// ============================================================================
// REMOTE PARTICIPANT
// ============================================================================

/// Entfernter Teilnehmer mit seinen abonnierten Tracks
#[derive(Clone)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub audio_track: Option<Arc<dyn TrackHandle>>,
    pub video_track: Option<Arc<dyn TrackHandle>>,
}

impl RemoteParticipant {
    fn new(id: ParticipantId) -> Self {
        Self {
            id,
            audio_track: None,
            video_track: None,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio_track.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_track.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_audio() && !self.has_video()
    }

    pub fn track(&self, kind: MediaKind) -> Option<&Arc<dyn TrackHandle>> {
        match kind {
            MediaKind::Audio => self.audio_track.as_ref(),
            MediaKind::Video => self.video_track.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: MediaKind) -> &mut Option<Arc<dyn TrackHandle>> {
        match kind {
            MediaKind::Audio => &mut self.audio_track,
            MediaKind::Video => &mut self.video_track,
        }
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id.clone(),
            has_audio: self.has_audio(),
            has_video: self.has_video(),
        }
    }
}

impl fmt::Debug for RemoteParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteParticipant")
            .field("id", &self.id)
            .field("audio", &self.audio_track.as_ref().map(|t| t.id().to_string()))
            .field("video", &self.video_track.as_ref().map(|t| t.id().to_string()))
            .finish()
    }
}

/// Serialisierbare Zeile für die Teilnehmerliste der UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: ParticipantId,
    pub has_audio: bool,
    pub has_video: bool,
}

// ============================================================================
// PLAYBACK POLICY
// ============================================================================

/// Wohin entfernte Tracks automatisch abgespielt werden
///
/// Audio läuft ohne Zutun der UI, sobald der Subscribe erfolgreich war.
/// Video braucht eine Render-Fläche pro Teilnehmer und bleibt der UI
/// überlassen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackPolicy {
    /// `None` schaltet die automatische Audio-Wiedergabe ab
    pub audio_sink: Option<SinkRef>,
}

impl PlaybackPolicy {
    pub fn with_audio_sink(sink: SinkRef) -> Self {
        Self {
            audio_sink: Some(sink),
        }
    }

    pub fn manual() -> Self {
        Self { audio_sink: None }
    }

    fn sink_for(&self, kind: MediaKind) -> Option<&SinkRef> {
        match kind {
            MediaKind::Audio => self.audio_sink.as_ref(),
            MediaKind::Video => None,
        }
    }
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self::with_audio_sink(SinkRef::default_audio_output())
    }
}

// ============================================================================
// REGISTRY STATE
// ============================================================================

type TrackKey = (ParticipantId, MediaKind);

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ParticipantId, Entry>,
    /// Laufende Subscribes mit ihrem Stempel; ein späteres Event entfernt
    /// den Key und entwertet damit das Ergebnis
    pending: HashMap<TrackKey, u64>,
    next_stamp: u64,
    next_order: u64,
}

struct Entry {
    participant: RemoteParticipant,
    order: u64,
}

impl RegistryState {
    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn has_track(&self, key: &TrackKey) -> bool {
        self.entries
            .get(&key.0)
            .map(|e| e.participant.track(key.1).is_some())
            .unwrap_or(false)
    }

    fn summaries(&self) -> Vec<ParticipantSummary> {
        self.ordered().into_iter().map(|p| p.summary()).collect()
    }

    fn ordered(&self) -> Vec<RemoteParticipant> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.order);
        entries.into_iter().map(|e| e.participant.clone()).collect()
    }
}

// ============================================================================
// PARTICIPANT REGISTRY
// ============================================================================

/// Teilnehmer-Registry einer Session
///
/// Einziger Besitzer der Einträge; nach außen nur lesend über
/// [`ParticipantRegistry::snapshot`].
pub struct ParticipantRegistry {
    transport: Arc<dyn TransportSession>,
    playback: PlaybackPolicy,
    state: Mutex<RegistryState>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl ParticipantRegistry {
    /// Erstellt eine leere Registry
    pub fn new(
        transport: Arc<dyn TransportSession>,
        event_tx: broadcast::Sender<CallEvent>,
        playback: PlaybackPolicy,
    ) -> Self {
        Self {
            transport,
            playback,
            state: Mutex::new(RegistryState::default()),
            event_tx,
        }
    }

    /// Verarbeitet ein Event der Transport-Session
    pub async fn handle_event(&self, event: TransportEvent) -> Result<(), RegistryError> {
        match event {
            TransportEvent::UserPublished {
                identity,
                media_kind,
            } => self.on_remote_published(identity, media_kind).await,
            TransportEvent::UserUnpublished {
                identity,
                media_kind,
            } => {
                self.on_remote_unpublished(&identity, media_kind);
                Ok(())
            }
            TransportEvent::UserLeft { identity } => {
                self.on_remote_user_left(&identity);
                Ok(())
            }
        }
    }

    /// Abonniert den veröffentlichten Track und trägt ihn ein
    ///
    /// Der Eintrag wird erst nach erfolgreichem Subscribe angelegt bzw.
    /// ergänzt. Ist die Art bereits abonniert oder ein Subscribe dafür
    /// unterwegs, passiert nichts.
    pub async fn on_remote_published(
        &self,
        identity: ParticipantId,
        kind: MediaKind,
    ) -> Result<(), RegistryError> {
        let key = (identity.clone(), kind);

        let stamp = {
            let mut state = self.state.lock();
            if state.has_track(&key) || state.pending.contains_key(&key) {
                tracing::debug!("Ignoring duplicate publish of {} by {}", kind, identity);
                return Ok(());
            }
            let stamp = state.stamp();
            state.pending.insert(key.clone(), stamp);
            stamp
        };

        tracing::debug!("Subscribing to {} of {}", kind, identity);
        let result = self.transport.subscribe(&identity, kind).await;

        let summaries = {
            let mut state = self.state.lock();
            // Unpublish, User-Left oder clear() haben den Key inzwischen entfernt
            let current = state.pending.get(&key) == Some(&stamp);
            if current {
                state.pending.remove(&key);
            }

            let track = match result {
                Ok(track) => track,
                Err(e) => {
                    tracing::warn!("Subscribe to {} of {} failed: {}", kind, identity, e);
                    return Err(RegistryError::SubscribeFailed {
                        identity,
                        kind,
                        source: e,
                    });
                }
            };

            if !current {
                tracing::debug!("Discarding stale {} subscription of {}", kind, identity);
                track.stop();
                return Ok(());
            }

            let order = state.next_order;
            if !state.entries.contains_key(&identity) {
                state.next_order += 1;
                tracing::info!("Remote participant {} joined the view", identity);
            }
            let entry = state.entries.entry(identity.clone()).or_insert_with(|| Entry {
                participant: RemoteParticipant::new(identity.clone()),
                order,
            });
            if let Some(sink) = self.playback.sink_for(kind) {
                track.play(sink);
            }
            *entry.participant.slot_mut(kind) = Some(track);
            state.summaries()
        };

        self.notify(summaries);
        Ok(())
    }

    /// Entfernt die Art vom Eintrag; leere Einträge verschwinden
    pub fn on_remote_unpublished(&self, identity: &ParticipantId, kind: MediaKind) {
        let key = (identity.clone(), kind);

        let summaries = {
            let mut state = self.state.lock();
            state.pending.remove(&key);

            let Some(entry) = state.entries.get_mut(identity) else {
                return;
            };
            let Some(track) = entry.participant.slot_mut(kind).take() else {
                return;
            };
            track.stop();

            if entry.participant.is_empty() {
                state.entries.remove(identity);
                tracing::info!("Remote participant {} has no media left", identity);
            }
            state.summaries()
        };

        self.notify(summaries);
    }

    /// Entfernt den Eintrag unabhängig von noch vorhandenen Tracks
    pub fn on_remote_user_left(&self, identity: &ParticipantId) {
        let summaries = {
            let mut state = self.state.lock();
            for kind in MediaKind::ALL {
                state.pending.remove(&(identity.clone(), kind));
            }

            let Some(entry) = state.entries.remove(identity) else {
                return;
            };
            for track in [entry.participant.audio_track, entry.participant.video_track]
                .into_iter()
                .flatten()
            {
                track.stop();
            }
            tracing::info!("Remote participant {} left", identity);
            state.summaries()
        };

        self.notify(summaries);
    }

    /// Leert die Registry (beim Verlassen des Channels)
    ///
    /// Noch laufende Subscribes werden dadurch verworfen.
    pub fn clear(&self) {
        let removed = {
            let mut state = self.state.lock();
            state.pending.clear();
            state.entries.drain().map(|(_, e)| e).collect::<Vec<_>>()
        };

        if removed.is_empty() {
            return;
        }
        for entry in &removed {
            for track in [&entry.participant.audio_track, &entry.participant.video_track]
                .into_iter()
                .flatten()
            {
                track.stop();
            }
        }
        tracing::debug!("Cleared {} remote participant(s)", removed.len());
        self.notify(Vec::new());
    }

    /// Lesende Sicht für das Rendering, in Reihenfolge des ersten Subscribe
    pub fn snapshot(&self) -> Vec<RemoteParticipant> {
        self.state.lock().ordered()
    }

    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.state.lock().summaries()
    }

    pub fn get(&self, identity: &ParticipantId) -> Option<RemoteParticipant> {
        self.state
            .lock()
            .entries
            .get(identity)
            .map(|e| e.participant.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, summaries: Vec<ParticipantSummary>) {
        let _ = self
            .event_tx
            .send(CallEvent::ParticipantsChanged(summaries));
    }
}

impl fmt::Debug for ParticipantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantRegistry")
            .field("participants", &self.summaries())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn setup() -> (Arc<MockTransport>, ParticipantRegistry) {
        let transport = Arc::new(MockTransport::new());
        let (event_tx, _) = broadcast::channel(64);
        let registry =
            ParticipantRegistry::new(transport.clone(), event_tx, PlaybackPolicy::default());
        (transport, registry)
    }

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    #[tokio::test]
    async fn test_publish_then_unpublish_removes_entry() {
        let (_transport, registry) = setup();

        registry
            .on_remote_published(id("u1"), MediaKind::Video)
            .await
            .unwrap();
        let u1 = registry.get(&id("u1")).unwrap();
        assert!(u1.has_video());
        assert!(!u1.has_audio());

        registry.on_remote_unpublished(&id("u1"), MediaKind::Video);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_user_left_removes_entry_without_unpublish() {
        let (transport, registry) = setup();

        registry
            .on_remote_published(id("u2"), MediaKind::Audio)
            .await
            .unwrap();
        registry
            .on_remote_published(id("u2"), MediaKind::Video)
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);

        registry.on_remote_user_left(&id("u2"));

        assert!(registry.get(&id("u2")).is_none());
        assert!(transport.subscribed_tracks().iter().all(|t| t.is_stopped()));
    }

    #[tokio::test]
    async fn test_user_left_for_unknown_identity() {
        let (_transport, registry) = setup();

        registry.on_remote_user_left(&id("ghost"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_publish_subscribes_once() {
        let (transport, registry) = setup();

        for _ in 0..2 {
            registry
                .on_remote_published(id("u1"), MediaKind::Video)
                .await
                .unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(transport.subscribe_count("u1", MediaKind::Video), 1);
    }

    #[tokio::test]
    async fn test_last_event_per_kind_wins() {
        let (_transport, registry) = setup();

        registry
            .handle_event(TransportEvent::published("u1", MediaKind::Video))
            .await
            .unwrap();
        registry
            .handle_event(TransportEvent::published("u1", MediaKind::Audio))
            .await
            .unwrap();
        registry
            .handle_event(TransportEvent::unpublished("u1", MediaKind::Video))
            .await
            .unwrap();
        registry
            .handle_event(TransportEvent::unpublished("u1", MediaKind::Audio))
            .await
            .unwrap();
        registry
            .handle_event(TransportEvent::published("u1", MediaKind::Video))
            .await
            .unwrap();

        let u1 = registry.get(&id("u1")).unwrap();
        assert!(u1.has_video());
        assert!(!u1.has_audio());
    }

    #[tokio::test]
    async fn test_unpublish_twice_is_harmless() {
        let (_transport, registry) = setup();

        registry
            .on_remote_published(id("u1"), MediaKind::Audio)
            .await
            .unwrap();
        registry
            .on_remote_published(id("u1"), MediaKind::Video)
            .await
            .unwrap();

        registry.on_remote_unpublished(&id("u1"), MediaKind::Video);
        registry.on_remote_unpublished(&id("u1"), MediaKind::Video);

        let u1 = registry.get(&id("u1")).unwrap();
        assert!(u1.has_audio());
        assert!(!u1.has_video());
    }

    #[tokio::test]
    async fn test_subscribe_failure_leaves_registry_untouched() {
        let (transport, registry) = setup();
        transport.fail_subscribe("u1", MediaKind::Video);

        registry
            .on_remote_published(id("u2"), MediaKind::Video)
            .await
            .unwrap();
        let result = registry
            .on_remote_published(id("u1"), MediaKind::Video)
            .await;

        assert!(matches!(
            result,
            Err(RegistryError::SubscribeFailed { kind: MediaKind::Video, .. })
        ));
        assert!(registry.get(&id("u1")).is_none());
        assert!(registry.get(&id("u2")).unwrap().has_video());
    }

    #[tokio::test]
    async fn test_unpublish_during_subscribe_discards_result() {
        let transport = Arc::new(MockTransport::new().gated_subscribe());
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(ParticipantRegistry::new(
            transport.clone(),
            event_tx,
            PlaybackPolicy::default(),
        ));

        let pending = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .on_remote_published(ParticipantId::from("u1"), MediaKind::Video)
                    .await
            })
        };
        while transport.subscribe_count("u1", MediaKind::Video) == 0 {
            tokio::task::yield_now().await;
        }

        registry.on_remote_unpublished(&id("u1"), MediaKind::Video);
        transport.release_subscribe();
        pending.await.unwrap().unwrap();

        assert!(registry.is_empty());
        let track = &transport.subscribed_tracks()[0];
        assert!(track.is_stopped());
        assert!(track.played_in().is_empty());
    }

    #[tokio::test]
    async fn test_republish_during_subscribe_keeps_newest() {
        let transport = Arc::new(MockTransport::new().gated_subscribe());
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(ParticipantRegistry::new(
            transport.clone(),
            event_tx,
            PlaybackPolicy::default(),
        ));
        let spawn_publish = || {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .on_remote_published(ParticipantId::from("u1"), MediaKind::Video)
                    .await
            })
        };

        let first = spawn_publish();
        while transport.subscribe_count("u1", MediaKind::Video) == 0 {
            tokio::task::yield_now().await;
        }
        registry.on_remote_unpublished(&id("u1"), MediaKind::Video);
        let second = spawn_publish();
        while transport.subscribe_count("u1", MediaKind::Video) < 2 {
            tokio::task::yield_now().await;
        }

        transport.release_subscribe();
        transport.release_subscribe();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let held = registry.get(&id("u1")).unwrap().video_track.unwrap();
        let tracks = transport.subscribed_tracks();
        assert_eq!(tracks.len(), 2);
        for track in &tracks {
            assert_eq!(track.is_stopped(), track.id() != held.id());
        }
        assert!(registry.state.lock().pending.is_empty());
    }

    #[tokio::test]
    async fn test_bookkeeping_is_pruned() {
        let (_transport, registry) = setup();

        for n in 0..100 {
            let user = id(&format!("u{}", n));
            registry
                .on_remote_published(user.clone(), MediaKind::Video)
                .await
                .unwrap();
            registry.on_remote_user_left(&user);
        }
        registry
            .on_remote_published(id("u1"), MediaKind::Audio)
            .await
            .unwrap();
        registry.on_remote_unpublished(&id("u1"), MediaKind::Audio);
        registry
            .on_remote_published(id("u2"), MediaKind::Audio)
            .await
            .unwrap();
        registry.clear();

        let state = registry.state.lock();
        assert!(state.entries.is_empty());
        assert!(state.pending.is_empty());
    }

    #[tokio::test]
    async fn test_remote_audio_plays_in_audio_sink() {
        let (transport, registry) = setup();

        registry
            .on_remote_published(id("u1"), MediaKind::Audio)
            .await
            .unwrap();
        registry
            .on_remote_published(id("u1"), MediaKind::Video)
            .await
            .unwrap();

        let tracks = transport.subscribed_tracks();
        assert_eq!(tracks[0].played_in(), vec![SinkRef::default_audio_output()]);
        // Video wird von der UI in ihre eigene Fläche gelegt
        assert!(tracks[1].played_in().is_empty());
    }

    #[tokio::test]
    async fn test_manual_playback_leaves_audio_alone() {
        let transport = Arc::new(MockTransport::new());
        let (event_tx, _) = broadcast::channel(64);
        let registry =
            ParticipantRegistry::new(transport.clone(), event_tx, PlaybackPolicy::manual());

        registry
            .on_remote_published(id("u1"), MediaKind::Audio)
            .await
            .unwrap();

        assert!(transport.subscribed_tracks()[0].played_in().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_keeps_insertion_order() {
        let (_transport, registry) = setup();

        for name in ["carol", "alice", "bob"] {
            registry
                .on_remote_published(id(name), MediaKind::Video)
                .await
                .unwrap();
        }
        // Zweite Art ändert die Position nicht
        registry
            .on_remote_published(id("carol"), MediaKind::Audio)
            .await
            .unwrap();

        let ids: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["carol", "alice", "bob"]);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let transport = Arc::new(MockTransport::new());
        let (event_tx, mut event_rx) = broadcast::channel(64);
        let registry = ParticipantRegistry::new(transport, event_tx, PlaybackPolicy::manual());

        registry
            .on_remote_published(id("u1"), MediaKind::Video)
            .await
            .unwrap();

        match event_rx.recv().await.unwrap() {
            CallEvent::ParticipantsChanged(list) => {
                assert_eq!(
                    list,
                    vec![ParticipantSummary {
                        id: id("u1"),
                        has_audio: false,
                        has_video: true,
                    }]
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_stops_remote_tracks() {
        let (transport, registry) = setup();

        registry
            .on_remote_published(id("u1"), MediaKind::Audio)
            .await
            .unwrap();
        registry.clear();

        assert!(registry.is_empty());
        assert!(transport.subscribed_tracks()[0].is_stopped());
    }
}
