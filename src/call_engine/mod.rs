//! Call Engine Module - Session State Machine
//!
//! Dieses Modul verwaltet:
//! - Join/Leave des Channels und Publish der lokalen Tracks
//! - Kamera-Policy (an/aus ohne Unpublish)
//! - Registry der entfernten Teilnehmer aus dem Transport-Event-Strom
//! - automatische Wiedergabe entfernter Audio-Tracks

mod engine;
mod registry;

pub use engine::{
    CallEvent, SessionController, SessionError, SessionOptions, SessionSnapshot, SessionStatus,
};
pub use registry::{
    ParticipantRegistry, ParticipantSummary, PlaybackPolicy, RegistryError, RemoteParticipant,
};
