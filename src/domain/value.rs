//! Preference value model
//!
//! Every stored preference is one of six kinds. Values carry their kind as a
//! tag so the on-disk document can be read back without guessing.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The in-memory cache: key to typed value
pub type PrefMap = HashMap<String, PrefValue>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("Unknown value kind: {0}")]
    UnknownKind(String),

    #[error("Invalid {kind} value: {input}")]
    Invalid { kind: ValueKind, input: String },
}

/// A single typed preference value
///
/// Floats compare by bit pattern, so `NaN` equals itself and `-0.0` differs
/// from `0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    String(String),
    Int(i32),
    Long(i64),
    Float(#[serde(with = "float_repr")] f32),
    #[serde(rename = "boolean")]
    Bool(bool),
    StringSet(BTreeSet<String>),
}

impl PartialEq for PrefValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PrefValue::String(a), PrefValue::String(b)) => a == b,
            (PrefValue::Int(a), PrefValue::Int(b)) => a == b,
            (PrefValue::Long(a), PrefValue::Long(b)) => a == b,
            (PrefValue::Float(a), PrefValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PrefValue::Bool(a), PrefValue::Bool(b)) => a == b,
            (PrefValue::StringSet(a), PrefValue::StringSet(b)) => a == b,
            _ => false,
        }
    }
}

/// JSON has no literal for non-finite numbers; they are written as the
/// strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
mod float_repr {
    use serde::de;
    use serde::{Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if *value == f32::INFINITY {
            serializer.serialize_str(INFINITY)
        } else if *value == f32::NEG_INFINITY {
            serializer.serialize_str(NEG_INFINITY)
        } else {
            serializer.serialize_f32(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                NAN => Ok(f32::NAN),
                INFINITY => Ok(f32::INFINITY),
                NEG_INFINITY => Ok(f32::NEG_INFINITY),
                other => Err(de::Error::custom(format!("invalid float value: {}", other))),
            },
        }
    }
}

impl PrefValue {
    /// Returns the kind tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            PrefValue::String(_) => ValueKind::String,
            PrefValue::Int(_) => ValueKind::Int,
            PrefValue::Long(_) => ValueKind::Long,
            PrefValue::Float(_) => ValueKind::Float,
            PrefValue::Bool(_) => ValueKind::Bool,
            PrefValue::StringSet(_) => ValueKind::StringSet,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrefValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            PrefValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PrefValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            PrefValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrefValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            PrefValue::StringSet(set) => Some(set),
            _ => None,
        }
    }

    /// Parses a value of the given kind from its text form.
    ///
    /// String sets are written as comma-separated items; empty items are
    /// dropped so `""` is the empty set.
    pub fn parse(kind: ValueKind, input: &str) -> Result<Self, ValueError> {
        let invalid = || ValueError::Invalid {
            kind,
            input: input.to_string(),
        };

        match kind {
            ValueKind::String => Ok(PrefValue::String(input.to_string())),
            ValueKind::Int => input.trim().parse().map(PrefValue::Int).map_err(|_| invalid()),
            ValueKind::Long => input.trim().parse().map(PrefValue::Long).map_err(|_| invalid()),
            ValueKind::Float => input.trim().parse().map(PrefValue::Float).map_err(|_| invalid()),
            ValueKind::Bool => match input.trim() {
                "true" => Ok(PrefValue::Bool(true)),
                "false" => Ok(PrefValue::Bool(false)),
                _ => Err(invalid()),
            },
            ValueKind::StringSet => Ok(PrefValue::StringSet(
                input
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::String(s) => write!(f, "{}", s),
            PrefValue::Int(v) => write!(f, "{}", v),
            PrefValue::Long(v) => write!(f, "{}", v),
            PrefValue::Float(v) => write!(f, "{}", v),
            PrefValue::Bool(v) => write!(f, "{}", v),
            PrefValue::StringSet(set) => {
                let items: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

impl From<String> for PrefValue {
    fn from(s: String) -> Self {
        PrefValue::String(s)
    }
}

impl From<&str> for PrefValue {
    fn from(s: &str) -> Self {
        PrefValue::String(s.to_string())
    }
}

impl From<i32> for PrefValue {
    fn from(v: i32) -> Self {
        PrefValue::Int(v)
    }
}

impl From<i64> for PrefValue {
    fn from(v: i64) -> Self {
        PrefValue::Long(v)
    }
}

impl From<f32> for PrefValue {
    fn from(v: f32) -> Self {
        PrefValue::Float(v)
    }
}

impl From<bool> for PrefValue {
    fn from(v: bool) -> Self {
        PrefValue::Bool(v)
    }
}

impl From<BTreeSet<String>> for PrefValue {
    fn from(set: BTreeSet<String>) -> Self {
        PrefValue::StringSet(set)
    }
}

/// Kind tag of a preference value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Int,
    Long,
    Float,
    #[value(alias = "boolean")]
    Bool,
    #[value(name = "set", alias = "string-set")]
    StringSet,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Bool => "boolean",
            ValueKind::StringSet => "string_set",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ValueKind::String),
            "int" => Ok(ValueKind::Int),
            "long" => Ok(ValueKind::Long),
            "float" => Ok(ValueKind::Float),
            "bool" | "boolean" => Ok(ValueKind::Bool),
            "set" | "string_set" => Ok(ValueKind::StringSet),
            other => Err(ValueError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PrefValue::Int(2)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "int", "value": 2}));

        let json = serde_json::to_value(PrefValue::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "boolean", "value": true}));

        let json = serde_json::to_value(PrefValue::StringSet(set(&["b", "a"]))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "string_set", "value": ["a", "b"]})
        );
    }

    #[test]
    fn int_out_of_range_is_rejected() {
        let parsed: Result<PrefValue, _> =
            serde_json::from_str(r#"{"type": "int", "value": 4294967296}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn string_sets_compare_element_wise() {
        let a = PrefValue::StringSet(set(&["x", "y"]));
        let b = PrefValue::StringSet(set(&["y", "x"]));
        assert_eq!(a, b);
        assert_ne!(a, PrefValue::StringSet(set(&["x"])));
    }

    #[test]
    fn typed_accessors_reject_other_kinds() {
        let v = PrefValue::Long(7);
        assert_eq!(v.as_long(), Some(7));
        assert_eq!(v.as_int(), None);
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn parse_from_text() {
        assert_eq!(
            PrefValue::parse(ValueKind::Int, "42").unwrap(),
            PrefValue::Int(42)
        );
        assert_eq!(
            PrefValue::parse(ValueKind::Bool, "false").unwrap(),
            PrefValue::Bool(false)
        );
        assert_eq!(
            PrefValue::parse(ValueKind::StringSet, "a, b,,c").unwrap(),
            PrefValue::StringSet(set(&["a", "b", "c"]))
        );
        assert!(PrefValue::parse(ValueKind::Int, "nope").is_err());
        assert!(PrefValue::parse(ValueKind::Float, "half").is_err());
        assert_eq!(
            PrefValue::parse(ValueKind::Float, "NaN").unwrap(),
            PrefValue::Float(f32::NAN)
        );
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(PrefValue::Float(f32::NAN), PrefValue::Float(f32::NAN));
        assert_ne!(PrefValue::Float(0.0), PrefValue::Float(-0.0));
        assert_eq!(PrefValue::Float(1.5), PrefValue::Float(1.5));
        assert_ne!(PrefValue::Int(1), PrefValue::Long(1));
    }

    #[test]
    fn non_finite_floats_use_string_forms() {
        let cases = [
            (f32::NAN, "NaN"),
            (f32::INFINITY, "Infinity"),
            (f32::NEG_INFINITY, "-Infinity"),
        ];
        for (value, text) in cases {
            let json = serde_json::to_value(PrefValue::Float(value)).unwrap();
            assert_eq!(json, serde_json::json!({"type": "float", "value": text}));

            let back: PrefValue = serde_json::from_value(json).unwrap();
            assert_eq!(back, PrefValue::Float(value));
        }
    }

    #[test]
    fn negative_zero_keeps_its_sign_in_json() {
        let text = serde_json::to_string(&PrefValue::Float(-0.0)).unwrap();
        let back: PrefValue = serde_json::from_str(&text).unwrap();
        assert!(back.as_float().unwrap().is_sign_negative());
    }

    #[test]
    fn unknown_float_text_is_rejected() {
        let parsed: Result<PrefValue, _> =
            serde_json::from_str(r#"{"type": "float", "value": "lots"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let v = PrefValue::StringSet(set(&["a", "b"]));
        assert_eq!(v.to_string(), "a,b");
        assert_eq!(PrefValue::parse(v.kind(), &v.to_string()).unwrap(), v);
    }

    #[test]
    fn kind_from_str() {
        assert_eq!("boolean".parse::<ValueKind>().unwrap(), ValueKind::Bool);
        assert_eq!("set".parse::<ValueKind>().unwrap(), ValueKind::StringSet);
        assert!("map".parse::<ValueKind>().is_err());
    }
}
