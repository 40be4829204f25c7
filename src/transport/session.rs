//! Transport Session
//!
//! Repräsentiert genau eine Channel-Verbindung der Real-Time-Engine.
//! Verbindungsaufbau, Encoding und Netzwerk liegen vollständig bei der
//! Engine; der Core sieht nur diese Schnittstelle.

use super::listener::EventSubscription;
use crate::identity::{Credential, LocalIdentity, ParticipantId};
use crate::media::{MediaKind, TrackHandle};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Join rejected: {0}")]
    JoinRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not joined to a channel")]
    NotJoined,

    #[error("Subscribe to {identity}/{kind} failed: {reason}")]
    SubscribeFailed {
        identity: ParticipantId,
        kind: MediaKind,
        reason: String,
    },

    #[error("Transport error: {0}")]
    Other(String),
}

// ============================================================================
// TRANSPORT SESSION
// ============================================================================

/// Schnittstelle zur Channel-Verbindung der Engine
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Tritt dem Channel bei
    async fn join(
        &self,
        app_id: &str,
        channel_id: &str,
        credential: Option<&Credential>,
        identity: &LocalIdentity,
    ) -> Result<(), TransportError>;

    /// Verlässt den Channel
    async fn leave(&self) -> Result<(), TransportError>;

    /// Veröffentlicht lokale Tracks
    async fn publish(&self, tracks: &[Arc<dyn TrackHandle>]) -> Result<(), TransportError>;

    /// Abonniert einen Track eines entfernten Teilnehmers
    ///
    /// Gibt das abspielbare Track Handle zurück.
    async fn subscribe(
        &self,
        identity: &ParticipantId,
        kind: MediaKind,
    ) -> Result<Arc<dyn TrackHandle>, TransportError>;

    /// Registriert einen Listener für Teilnehmer-Events
    ///
    /// Der Listener bleibt registriert, bis die zurückgegebene
    /// Subscription gedroppt wird.
    fn add_listener(&self) -> EventSubscription;
}
