//! Event Types der Transport-Session
//!
//! Die Namen entsprechen den Event-Namen der Engine
//! (`user-published`, `user-unpublished`, `user-left`).

use crate::identity::ParticipantId;
use crate::media::MediaKind;
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Teilnehmer-Events, die die Transport-Session asynchron meldet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportEvent {
    /// Entfernter Teilnehmer hat einen Track veröffentlicht
    UserPublished {
        identity: ParticipantId,
        #[serde(rename = "mediaKind")]
        media_kind: MediaKind,
    },

    /// Entfernter Teilnehmer hat einen Track zurückgezogen
    UserUnpublished {
        identity: ParticipantId,
        #[serde(rename = "mediaKind")]
        media_kind: MediaKind,
    },

    /// Entfernter Teilnehmer hat den Channel verlassen
    UserLeft { identity: ParticipantId },
}

impl TransportEvent {
    /// Teilnehmer, auf den sich das Event bezieht
    pub fn identity(&self) -> &ParticipantId {
        match self {
            TransportEvent::UserPublished { identity, .. }
            | TransportEvent::UserUnpublished { identity, .. }
            | TransportEvent::UserLeft { identity } => identity,
        }
    }

    pub fn published(identity: impl Into<ParticipantId>, media_kind: MediaKind) -> Self {
        TransportEvent::UserPublished {
            identity: identity.into(),
            media_kind,
        }
    }

    pub fn unpublished(identity: impl Into<ParticipantId>, media_kind: MediaKind) -> Self {
        TransportEvent::UserUnpublished {
            identity: identity.into(),
            media_kind,
        }
    }

    pub fn left(identity: impl Into<ParticipantId>) -> Self {
        TransportEvent::UserLeft {
            identity: identity.into(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_events() {
        let published: TransportEvent = serde_json::from_str(
            r#"{"type":"user-published","identity":"u1","mediaKind":"video"}"#,
        )
        .unwrap();
        assert_eq!(published, TransportEvent::published("u1", MediaKind::Video));

        let left: TransportEvent =
            serde_json::from_str(r#"{"type":"user-left","identity":"u2"}"#).unwrap();
        assert_eq!(left.identity().as_str(), "u2");
    }

    #[test]
    fn test_serialize_unpublished() {
        let json =
            serde_json::to_value(TransportEvent::unpublished("u1", MediaKind::Audio)).unwrap();

        assert_eq!(json["type"], "user-unpublished");
        assert_eq!(json["mediaKind"], "audio");
    }
}
