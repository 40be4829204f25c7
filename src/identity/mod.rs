//! Identity Module - Teilnehmer-Identitäten und Credentials
//!
//! Dieses Modul verwaltet die Identitäten innerhalb eines Channels:
//! - Lokale Identität (zufällig generiert, pro Session unveränderlich)
//! - Identitäten entfernter Teilnehmer
//! - Opakes Join-Credential (Token)
//!

mod local;

pub use local::{Credential, LocalIdentity, ParticipantId, IDENTITY_LEN};
