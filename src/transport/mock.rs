//! Mock Transport für Tests
//!
//! Protokolliert alle Aufrufe, kann gezielt fehlschlagen und `join`,
//! `publish` bzw. `subscribe` anhalten, bis der Test sie freigibt. Events werden über
//! einen eingebetteten [`EventEmitter`] ausgeliefert.

use super::listener::{EventEmitter, EventSubscription};
use super::messages::TransportEvent;
use super::session::{TransportError, TransportSession};
use crate::identity::{Credential, LocalIdentity, ParticipantId};
use crate::media::mock::MockTrack;
use crate::media::{MediaKind, TrackHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Aufgezeichneter Aufruf an die Transport-Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Join {
        app_id: String,
        channel_id: String,
        has_credential: bool,
        identity: String,
    },
    Leave,
    Publish {
        track_ids: Vec<String>,
    },
    Subscribe {
        identity: ParticipantId,
        kind: MediaKind,
    },
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Transport-Session ohne Netzwerk
#[derive(Debug, Default)]
pub struct MockTransport {
    emitter: EventEmitter,
    calls: Mutex<Vec<TransportCall>>,
    joined: AtomicBool,
    join_error: Option<TransportError>,
    leave_error: Option<TransportError>,
    publish_error: Option<TransportError>,
    failing_subscribes: Mutex<HashSet<(ParticipantId, MediaKind)>>,
    join_gate: Option<Arc<Notify>>,
    publish_gate: Option<Arc<Notify>>,
    subscribe_gate: Option<Arc<Notify>>,
    subscribed_tracks: Mutex<Vec<Arc<MockTrack>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `join` schlägt mit `JoinRejected` fehl
    pub fn failing_join(mut self, reason: &str) -> Self {
        self.join_error = Some(TransportError::JoinRejected(reason.to_string()));
        self
    }

    /// `leave` schlägt mit einem Netzwerkfehler fehl
    pub fn failing_leave(mut self) -> Self {
        self.leave_error = Some(TransportError::Network("leave not acknowledged".to_string()));
        self
    }

    pub fn failing_publish(mut self) -> Self {
        self.publish_error = Some(TransportError::Other("publish refused".to_string()));
        self
    }

    /// `join` wartet, bis [`MockTransport::release_join`] aufgerufen wird
    pub fn gated_join(mut self) -> Self {
        self.join_gate = Some(Arc::new(Notify::new()));
        self
    }

    /// `publish` wartet, bis [`MockTransport::release_publish`] aufgerufen wird
    pub fn gated_publish(mut self) -> Self {
        self.publish_gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Jeder `subscribe` wartet auf [`MockTransport::release_subscribe`]
    pub fn gated_subscribe(mut self) -> Self {
        self.subscribe_gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release_join(&self) {
        if let Some(gate) = &self.join_gate {
            gate.notify_one();
        }
    }

    pub fn release_publish(&self) {
        if let Some(gate) = &self.publish_gate {
            gate.notify_one();
        }
    }

    pub fn release_subscribe(&self) {
        if let Some(gate) = &self.subscribe_gate {
            gate.notify_one();
        }
    }

    /// Lässt den Subscribe für `(identity, kind)` fehlschlagen
    pub fn fail_subscribe(&self, identity: &str, kind: MediaKind) {
        self.failing_subscribes
            .lock()
            .insert((ParticipantId::from(identity), kind));
    }

    /// Liefert ein Event an alle registrierten Listener aus
    pub fn emit(&self, event: TransportEvent) -> usize {
        self.emitter.emit(event)
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Publish { .. }))
    }

    pub fn leave_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Leave))
    }

    pub fn subscribe_count(&self, identity: &str, kind: MediaKind) -> usize {
        self.count(|c| {
            matches!(c, TransportCall::Subscribe { identity: id, kind: k }
                if id.as_str() == identity && *k == kind)
        })
    }

    /// Alle Tracks, die bisher per Subscribe ausgegeben wurden
    pub fn subscribed_tracks(&self) -> Vec<Arc<MockTrack>> {
        self.subscribed_tracks.lock().clone()
    }

    fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl TransportSession for MockTransport {
    async fn join(
        &self,
        app_id: &str,
        channel_id: &str,
        credential: Option<&Credential>,
        identity: &LocalIdentity,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Join {
            app_id: app_id.to_string(),
            channel_id: channel_id.to_string(),
            has_credential: credential.is_some(),
            identity: identity.to_string(),
        });

        if let Some(gate) = &self.join_gate {
            gate.notified().await;
        }

        if let Some(error) = &self.join_error {
            return Err(error.clone());
        }

        self.joined.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Leave);
        self.joined.store(false, Ordering::SeqCst);

        match &self.leave_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn publish(&self, tracks: &[Arc<dyn TrackHandle>]) -> Result<(), TransportError> {
        self.record(TransportCall::Publish {
            track_ids: tracks.iter().map(|t| t.id().to_string()).collect(),
        });

        if let Some(gate) = &self.publish_gate {
            gate.notified().await;
        }

        if !self.is_joined() {
            return Err(TransportError::NotJoined);
        }

        match &self.publish_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        identity: &ParticipantId,
        kind: MediaKind,
    ) -> Result<Arc<dyn TrackHandle>, TransportError> {
        self.record(TransportCall::Subscribe {
            identity: identity.clone(),
            kind,
        });

        if let Some(gate) = &self.subscribe_gate {
            gate.notified().await;
        }

        if self
            .failing_subscribes
            .lock()
            .contains(&(identity.clone(), kind))
        {
            return Err(TransportError::SubscribeFailed {
                identity: identity.clone(),
                kind,
                reason: "remote track unavailable".to_string(),
            });
        }

        let track = MockTrack::new(kind);
        self.subscribed_tracks.lock().push(Arc::clone(&track));

        let track: Arc<dyn TrackHandle> = track;
        Ok(track)
    }

    fn add_listener(&self) -> EventSubscription {
        self.emitter.listen()
    }
}
