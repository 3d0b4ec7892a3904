use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

/// Session description blob (`{"type":"offer","sdp":"v=0..."}` in practice).
///
/// Kept as the exact JSON text it arrived as; the controller never looks
/// inside, it only hands it to the media endpoint.
#[derive(Clone)]
pub struct SessionDescription(Box<RawValue>);

/// ICE candidate blob (`{"candidate":"...","sdpMid":"0",...}` in practice)
#[derive(Clone)]
pub struct IceCandidate(Box<RawValue>);

macro_rules! opaque_json {
    ($name:ident, $what:literal) => {
        impl $name {
            /// Wrap a JSON document without touching its bytes
            pub fn from_json(json: &str) -> Result<Self> {
                RawValue::from_string(json.to_owned())
                    .map(Self)
                    .map_err(|e| Error::MalformedMessage(format!("{}: {}", $what, e)))
            }

            /// Serialize any value into the blob
            pub fn from_value<T: Serialize>(value: &T) -> Result<Self> {
                serde_json::value::to_raw_value(value)
                    .map(Self)
                    .map_err(|e| Error::MalformedMessage(format!("{}: {}", $what, e)))
            }

            /// Decode the blob into the endpoint's own type
            pub fn to_value<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
                serde_json::from_str(self.0.get())
                    .map_err(|e| Error::MalformedMessage(format!("{}: {}", $what, e)))
            }

            pub fn as_json(&self) -> &str {
                self.0.get()
            }

            pub(crate) fn from_raw(raw: &RawValue) -> Self {
                Self(raw.to_owned())
            }

            pub(crate) fn as_raw(&self) -> &RawValue {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.get() == other.0.get()
            }
        }

        impl Eq for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0.get()).finish()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }
    };
}

opaque_json!(SessionDescription, "session description");
opaque_json!(IceCandidate, "ICE candidate");

impl IceCandidate {
    /// The `candidate:` attribute line, when the blob carries one
    pub fn candidate_line(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(self.as_json()).ok()?;
        value
            .get("candidate")
            .and_then(|line| line.as_str())
            .map(str::to_owned)
    }
}
