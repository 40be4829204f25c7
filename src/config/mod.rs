//! Config Module - Call-Konfiguration
//!
//! Lädt App-ID, Standard-Channel, Token und Log-Filter:
//! - aus `config.json` im Konfigurationsverzeichnis der App
//! - überschrieben durch Umgebungsvariablen
//!

mod settings;

pub use settings::{CallConfig, ConfigError, DEFAULT_CHANNEL, DEFAULT_LOG_FILTER};
