//! Transport Module - Verbindung zum Channel
//!
//! Dieses Modul beschreibt die Schnittstelle zur Real-Time-Engine:
//! - Join/Leave eines Channels
//! - Publish lokaler Tracks, Subscribe entfernter Tracks
//! - Teilnehmer-Events (published, unpublished, left) mit
//!   Listener-Registrierung, die beim Drop automatisch aufgehoben wird
//!

mod listener;
mod messages;
pub mod mock;
mod session;

pub use listener::{EventEmitter, EventSubscription, ListenerGuard};
pub use messages::TransportEvent;
pub use session::{TransportError, TransportSession};
