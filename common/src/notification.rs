use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};
use zbus::zvariant::{OwnedValue, Value};

/// A notification as tracked by the daemon and shown to clients.
///
/// Field layout follows the wire order of `Notify`, plus the id the daemon
/// assigned, the parsed urgency, and the time the daemon accepted it.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Notification {
    pub id: u32,
    pub app_name: String,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: HashMap<String, HintValue>,
    pub urgency: Urgency,
    pub replaces_id: u32,
    pub expire_timeout: i32,
    pub received_at: DateTime<Utc>,
}

/// Closed set of hint value shapes the daemon understands.
///
/// Anything else a client sends is dropped during conversion. Dropping is
/// deliberate: real clients attach vendor-specific hints and a server must
/// never fail a `Notify` call over them.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum HintValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Dict(HashMap<String, HintValue>),
}

impl HintValue {
    pub fn from_variant(value: &Value<'_>) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(Self::Bool(*v)),
            Value::U8(v) => Some(Self::Int(i64::from(*v))),
            Value::I16(v) => Some(Self::Int(i64::from(*v))),
            Value::U16(v) => Some(Self::Int(i64::from(*v))),
            Value::I32(v) => Some(Self::Int(i64::from(*v))),
            Value::U32(v) => Some(Self::Int(i64::from(*v))),
            Value::I64(v) => Some(Self::Int(*v)),
            Value::U64(v) => i64::try_from(*v).ok().map(Self::Int),
            Value::Str(v) => Some(Self::Str(v.as_str().to_owned())),
            Value::Array(arr) => {
                // Byte arrays are the only array hint in the standard
                // (image payloads, raw icons).
                let mut bytes = Vec::with_capacity(arr.len());
                for item in arr.iter() {
                    match item {
                        Value::U8(b) => bytes.push(*b),
                        _ => return None,
                    }
                }
                Some(Self::Bytes(bytes))
            }
            Value::Dict(_) => {
                let map = <HashMap<String, OwnedValue>>::try_from(value.try_clone().ok()?).ok()?;
                Some(Self::Dict(Self::from_variant_map(&map)))
            }
            // Nested variant, unwrap and retry
            Value::Value(inner) => Self::from_variant(inner),
            _ => None,
        }
    }

    /// Converts a raw `a{sv}` hint table, skipping entries the closed set
    /// cannot represent.
    pub fn from_variant_map(hints: &HashMap<String, OwnedValue>) -> HashMap<String, Self> {
        hints
            .iter()
            .filter_map(|(key, value)| Self::from_variant(value).map(|v| (key.clone(), v)))
            .collect()
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    Critical,
}

impl Urgency {
    /// Reads the standard `urgency` byte hint, defaulting to `Normal` when
    /// absent or malformed.
    pub fn from_hints(hints: &HashMap<String, OwnedValue>) -> Self {
        hints
            .get("urgency")
            .and_then(|raw| u8::try_from(raw).ok())
            .map(|level| match level {
                0 => Self::Low,
                2 => Self::Critical,
                _ => Self::Normal,
            })
            .unwrap_or_default()
    }
}

/// Reason codes for the `NotificationClosed` signal.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Expired,
    Dismissed,
    Closed,
    Undefined,
}

impl CloseReason {
    pub fn code(self) -> u32 {
        match self {
            Self::Expired => 1,
            Self::Dismissed => 2,
            Self::Closed => 3,
            Self::Undefined => 4,
        }
    }
}

/// The capability vocabulary of the Desktop Notifications specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    ActionIcons,
    Body,
    BodyHyperlinks,
    BodyImages,
    BodyMarkup,
    IconMulti,
    IconStatic,
    Persistence,
    Sound,
}

/// What this server actually advertises.
pub const SUPPORTED_CAPABILITIES: &[Capability] = &[Capability::Body];

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(value: Value<'_>) -> OwnedValue {
        OwnedValue::try_from(value).unwrap()
    }

    #[test]
    fn hint_conversion_keeps_supported_shapes() {
        let mut hints = HashMap::new();
        hints.insert("transient".to_string(), owned(Value::Bool(true)));
        hints.insert("urgency".to_string(), owned(Value::U8(2)));
        hints.insert("x-offset".to_string(), owned(Value::I32(-40)));
        hints.insert(
            "desktop-entry".to_string(),
            owned(Value::from("org.example.Mail")),
        );

        let converted = HintValue::from_variant_map(&hints);
        assert_eq!(converted.get("transient"), Some(&HintValue::Bool(true)));
        assert_eq!(converted.get("urgency"), Some(&HintValue::Int(2)));
        assert_eq!(converted.get("x-offset"), Some(&HintValue::Int(-40)));
        assert_eq!(
            converted.get("desktop-entry"),
            Some(&HintValue::Str("org.example.Mail".to_string()))
        );
    }

    #[test]
    fn hint_conversion_drops_unsupported_shapes() {
        let mut hints = HashMap::new();
        hints.insert("scale".to_string(), owned(Value::F64(1.5)));
        hints.insert("level".to_string(), owned(Value::U8(7)));

        let converted = HintValue::from_variant_map(&hints);
        assert!(!converted.contains_key("scale"));
        assert_eq!(converted.get("level"), Some(&HintValue::Int(7)));
    }

    #[test]
    fn hint_conversion_collects_byte_arrays() {
        let mut hints = HashMap::new();
        hints.insert(
            "image-data".to_string(),
            owned(Value::from(vec![1u8, 2, 3])),
        );

        let converted = HintValue::from_variant_map(&hints);
        assert_eq!(
            converted.get("image-data"),
            Some(&HintValue::Bytes(vec![1, 2, 3]))
        );
    }

    #[test]
    fn urgency_defaults_to_normal() {
        let mut hints = HashMap::new();
        assert_eq!(Urgency::from_hints(&hints), Urgency::Normal);

        hints.insert("urgency".to_string(), owned(Value::U8(0)));
        assert_eq!(Urgency::from_hints(&hints), Urgency::Low);

        hints.insert("urgency".to_string(), owned(Value::U8(2)));
        assert_eq!(Urgency::from_hints(&hints), Urgency::Critical);

        // Wrong type is ignored, not an error
        hints.insert("urgency".to_string(), owned(Value::from("high")));
        assert_eq!(Urgency::from_hints(&hints), Urgency::Normal);
    }

    #[test]
    fn close_reason_codes_match_the_wire() {
        assert_eq!(CloseReason::Expired.code(), 1);
        assert_eq!(CloseReason::Dismissed.code(), 2);
        assert_eq!(CloseReason::Closed.code(), 3);
        assert_eq!(CloseReason::Undefined.code(), 4);
    }

    #[test]
    fn supported_capabilities_stay_within_the_vocabulary() {
        use strum::IntoEnumIterator;
        for capability in SUPPORTED_CAPABILITIES {
            assert!(Capability::iter().any(|known| known == *capability));
        }
        assert_eq!(SUPPORTED_CAPABILITIES, &[Capability::Body]);
    }
}
