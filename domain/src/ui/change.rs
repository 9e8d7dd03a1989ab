//! Change events replayed from the host against a widget.

use super::uid::Uid;
use serde::{Deserialize, Serialize};

/// A user-visible edit addressed to the widget whose uid is `target_uid`.
///
/// Only the field relevant to the target widget kind is read; the rest keep
/// their defaults. `value_bytes` travels as base64 in JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "Uid", default)]
    pub target_uid: Uid,
    #[serde(rename = "ValueBytes", default, with = "base64_bytes")]
    pub value_bytes: Vec<u8>,
    #[serde(rename = "ValueString", default)]
    pub value_string: String,
    #[serde(rename = "ValueFloat", default)]
    pub value_float: f64,
    #[serde(rename = "ValueInt", default)]
    pub value_int: i64,
    #[serde(rename = "ValueBool", default)]
    pub value_bool: bool,
}

impl ChangeEvent {
    pub fn for_uid(target_uid: Uid) -> Self {
        Self {
            target_uid,
            ..Self::default()
        }
    }

    pub fn with_string(mut self, value: impl Into<String>) -> Self {
        self.value_string = value.into();
        self
    }

    pub fn with_float(mut self, value: f64) -> Self {
        self.value_float = value;
        self
    }

    pub fn with_int(mut self, value: i64) -> Self {
        self.value_int = value;
        self
    }

    pub fn with_bool(mut self, value: bool) -> Self {
        self.value_bool = value;
        self
    }

    pub fn with_bytes(mut self, value: Vec<u8>) -> Self {
        self.value_bytes = value;
        self
    }
}

/// Serde adapter encoding byte vectors as standard base64 strings.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_event_uses_defaults() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"ValueString":"2024-01-01 00:00","ValueBool":false}"#).unwrap();
        assert_eq!(event.value_string, "2024-01-01 00:00");
        assert_eq!(event.target_uid, Uid(0));
        assert!(event.value_bytes.is_empty());
    }

    #[test]
    fn bytes_travel_as_base64() {
        let event = ChangeEvent::for_uid(Uid(3)).with_bytes(vec![0, 1, 2, 255]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ValueBytes"], "AAEC/w==");
        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.value_bytes, vec![0, 1, 2, 255]);
    }

    #[test]
    fn null_bytes_decode_to_empty() {
        let event: ChangeEvent = serde_json::from_str(r#"{"Uid":7,"ValueBytes":null}"#).unwrap();
        assert_eq!(event.target_uid, Uid(7));
        assert!(event.value_bytes.is_empty());
    }
}
