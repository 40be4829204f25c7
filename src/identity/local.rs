//! Lokale und entfernte Identitäten
//!
//! Die lokale Identität wird einmal pro Session zufällig erzeugt
//! (13 Zeichen Base-36) und bleibt danach unverändert.
//!
//! ## Verwendung
//! ```rust
//! use group_call::identity::LocalIdentity;
//!
//! let identity = LocalIdentity::generate();
//! assert_eq!(identity.as_str().len(), 13);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Länge einer generierten lokalen Identität
pub const IDENTITY_LEN: usize = 13;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// LOCAL IDENTITY
// ============================================================================

/// Identität des lokalen Teilnehmers im Channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    /// Generiert eine neue zufällige Identität
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..IDENTITY_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..BASE36_ALPHABET.len());
                char::from(BASE36_ALPHABET[idx])
            })
            .collect();
        Self(id)
    }

    /// Übernimmt eine extern vergebene Identität
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// PARTICIPANT ID
// ============================================================================

/// Identität eines entfernten Teilnehmers (stabil solange er im Channel ist)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// CREDENTIAL
// ============================================================================

/// Opakes Join-Token für den Channel
///
/// Der Inhalt taucht nie in Logs auf.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Gibt das Token für die Übergabe an die Transport-Schicht zurück
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"[redacted]").finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_generation() {
        let identity = LocalIdentity::generate();

        assert_eq!(identity.as_str().len(), IDENTITY_LEN);
        assert!(identity
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_identities_are_unique() {
        let a = LocalIdentity::generate();
        let b = LocalIdentity::generate();

        // 36^13 Möglichkeiten, Kollision praktisch ausgeschlossen
        assert_ne!(a, b);
    }

    #[test]
    fn test_credential_is_redacted() {
        let credential = Credential::new("007eJxTsecret");

        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret"));
        assert_eq!(credential.expose(), "007eJxTsecret");
    }

    #[test]
    fn test_participant_id_serializes_as_string() {
        let id = ParticipantId::from("u1");

        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u1\"");
    }
}
