//! Labels für alle sichtbaren Texte
//!
//! Der CRM-Host liefert die Übersetzungen, wir greifen nur über Codes zu.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const INBOUND_CALL_LABEL: &str = "voip_inbound_call_label";
pub const INBOUND_CALL_DESCRIPTION: &str = "voip_inbound_call_description";
pub const OUTBOUND_CALL_LABEL: &str = "voip_outbound_call_label";
pub const REGISTER_FAILED: &str = "voip_register_failed";
pub const TRANSPORT_FAILED: &str = "voip_transport_failed";
pub const PERMISSION_DENIED: &str = "voip_permission_denied";
pub const ACCEPT_FAILED: &str = "voip_accept_failed";
pub const UNEXPECTED_ERROR: &str = "unexpected_error";

/// Code → Text Tabelle mit Fallback auf `unexpected_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: HashMap<String, String>,
}

impl Dictionary {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Gibt den Text für `code` zurück
    pub fn code<'a>(&'a self, code: &'a str) -> &'a str {
        self.entries
            .get(code)
            .or_else(|| self.entries.get(UNEXPECTED_ERROR))
            .map(String::as_str)
            .unwrap_or(code)
    }

    /// Überschreibt oder ergänzt einzelne Einträge
    pub fn merge(&mut self, other: Dictionary) {
        self.entries.extend(other.entries);
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        let entries = [
            (INBOUND_CALL_LABEL, "Inbound call"),
            (INBOUND_CALL_DESCRIPTION, "Incoming call from "),
            (OUTBOUND_CALL_LABEL, "Outbound call"),
            (REGISTER_FAILED, "Phone registration failed"),
            (TRANSPORT_FAILED, "Connection to the phone service was lost"),
            (PERMISSION_DENIED, "Microphone access was denied"),
            (ACCEPT_FAILED, "The call could not be answered"),
            (UNEXPECTED_ERROR, "Unexpected error"),
        ]
        .into_iter()
        .map(|(code, text)| (code.to_string(), text.to_string()))
        .collect();

        Self { entries }
    }
}
