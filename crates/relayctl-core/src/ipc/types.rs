//! Request/response messages exchanged over the daemon socket.
//!
//! Messages are plain JSON objects, one request and one response per
//! connection:
//!
//! ```text
//! → {"relay":"plants","action":"on","requester":"pi"}
//! ← {"relay":"plants","status":"on"}
//!
//! → {"relay":"all","action":"status","requester":"pi"}
//! ← {"farbed":"off","nearbed":"off", ... ,"pump2":"off"}
//!
//! → {"relay":"valve99","action":"off","requester":"pi"}
//! ← {"error":"invalid relay name \"valve99\""}
//! ```

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What to do with the addressed relay(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    On,
    Off,
}

impl From<bool> for RelayStatus {
    fn from(energized: bool) -> Self {
        if energized {
            RelayStatus::On
        } else {
            RelayStatus::Off
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayStatus::On => f.write_str("on"),
            RelayStatus::Off => f.write_str("off"),
        }
    }
}

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// A configured relay name, or `"all"`.
    pub relay: String,
    pub action: Action,
    /// Free-text caller identity, logged for audit only. Older clients send
    /// it as `username`.
    #[serde(default, alias = "username")]
    pub requester: String,
}

impl RelayRequest {
    pub fn new(relay: impl Into<String>, action: Action, requester: impl Into<String>) -> Self {
        Self {
            relay: relay.into(),
            action,
            requester: requester.into(),
        }
    }
}

/// The daemon's reply. Exactly one is sent per connection.
///
/// The wire shapes overlap (a relay table may contain names like `relay`
/// or `status`), so replies are decoded against the request that produced
/// them with [`codec::decode_reply`](super::codec::decode_reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RelayResponse {
    /// The request was rejected or the hardware could not be reached.
    Error { error: String },
    /// Resulting state of one relay.
    Single { relay: String, status: RelayStatus },
    /// Resulting state of every relay, in registry order.
    All(StatusMap),
}

impl RelayResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RelayResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RelayResponse::Error { .. })
    }
}

/// Ordered relay name → status mapping, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMap(Vec<(String, RelayStatus)>);

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, status: RelayStatus) {
        self.0.push((name.into(), status));
    }

    pub fn get(&self, name: &str) -> Option<RelayStatus> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RelayStatus)> {
        self.0.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RelayStatus)> for StatusMap {
    fn from_iter<I: IntoIterator<Item = (String, RelayStatus)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for StatusMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, status) in &self.0 {
            map.serialize_entry(name, status)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StatusMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusMapVisitor;

        impl<'de> Visitor<'de> for StatusMapVisitor {
            type Value = StatusMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of relay names to \"on\"/\"off\"")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StatusMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, status)) = access.next_entry::<String, RelayStatus>()? {
                    entries.push((name, status));
                }
                Ok(StatusMap(entries))
            }
        }

        deserializer.deserialize_map(StatusMapVisitor)
    }
}
