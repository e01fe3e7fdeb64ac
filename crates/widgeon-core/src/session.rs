// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session port and state-key derivation.

use std::collections::HashMap;

use crate::naming::DEFAULT_WIDGET_ID;
use crate::OptionMap;

/// Mapping-like access to the host's per-user session.
///
/// The host serializes access per session; implementations need no locking of
/// their own beyond what their storage requires.
pub trait SessionStore {
    /// Current value under `key`, if any.
    fn load(&self, key: &str) -> Option<OptionMap>;
    /// Replace the value under `key`.
    fn store(&mut self, key: &str, value: OptionMap);
    /// Drop `key`.
    fn remove(&mut self, key: &str);
}

impl SessionStore for HashMap<String, OptionMap> {
    fn load(&self, key: &str) -> Option<OptionMap> {
        self.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: OptionMap) {
        self.insert(key.to_owned(), value);
    }

    fn remove(&mut self, key: &str) {
        HashMap::remove(self, key);
    }
}

/// Which persisted tier a session key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTier {
    /// Replaced at the end of every render.
    Page,
    /// Created once, only changed by widget logic.
    Permanent,
}

impl StateTier {
    /// Tag appended to the identification key.
    pub fn tag(self) -> &'static str {
        match self {
            StateTier::Page => "page",
            StateTier::Permanent => "permanent",
        }
    }
}

/// `widget_<name>_<id>`; a missing id maps to `default`.
pub fn identification_key(name: &str, widget_id: Option<&str>) -> String {
    format!("widget_{name}_{}", widget_id.unwrap_or(DEFAULT_WIDGET_ID))
}

/// Session key of one state tier.
pub fn session_key(name: &str, widget_id: Option<&str>, tier: StateTier) -> String {
    format!("{}_{}", identification_key(name, widget_id), tier.tag())
}
