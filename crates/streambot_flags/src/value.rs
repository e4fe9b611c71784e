//! Flag values and typed coercion.
//!
//! Storage is permissive (whatever JSON the file holds) while access is
//! typed: callers read through [`FlagValue::as_bool`], [`FlagValue::as_int`]
//! and friends, which mirror the typed getters on the manager.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String tokens that read as `true`, compared case-insensitively.
const TRUTHY_TOKENS: [&str; 4] = ["true", "1", "yes", "on"];

/// Value held by a feature flag.
///
/// Serialized as plain JSON. Shapes that are not a scalar or a list of
/// strings are carried verbatim in [`FlagValue::Json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean toggle
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
    /// List of strings
    List(Vec<String>),
    /// Any other JSON shape (objects, mixed arrays)
    Json(Value),
}

impl FlagValue {
    /// Convert raw JSON into a flag value. `null` means "no value".
    pub fn from_json(value: Value) -> Option<Self> {
        let converted = match value {
            Value::Null => return None,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => match n.as_f64() {
                    Some(f) => Self::Float(f),
                    None => Self::Json(Value::Number(n)),
                },
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    Self::List(
                        items
                            .into_iter()
                            .filter_map(|item| match item {
                                Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Self::Json(Value::Array(items))
                }
            }
            other @ Value::Object(_) => Self::Json(other),
        };
        Some(converted)
    }

    /// Interpret text typed by a person: JSON when it parses, otherwise the
    /// literal string. `null` yields `None`.
    ///
    /// ```
    /// use streambot_flags::FlagValue;
    ///
    /// assert_eq!(FlagValue::parse_input("250"), Some(FlagValue::Int(250)));
    /// assert_eq!(FlagValue::parse_input("chaos"), Some(FlagValue::from("chaos")));
    /// ```
    pub fn parse_input(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_json(value),
            Err(_) => Some(Self::String(raw.to_string())),
        }
    }

    /// Whether the value survives a write to the JSON config file.
    ///
    /// JSON has no NaN or infinity, so such floats would come back as `null`.
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Render as JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::from(items.clone()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Boolean reading of the value.
    ///
    /// Strings are true only for `true`, `1`, `yes` or `on` (any case).
    pub fn as_bool(&self) -> Option<bool> {
        let b = match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => {
                let lowered = s.to_lowercase();
                TRUTHY_TOKENS.contains(&lowered.as_str())
            }
            Self::List(items) => !items.is_empty(),
            Self::Json(Value::Array(items)) => !items.is_empty(),
            Self::Json(Value::Object(map)) => !map.is_empty(),
            Self::Json(other) => !other.is_null(),
        };
        Some(b)
    }

    /// Integer reading of the value. Floats truncate toward zero.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point reading of the value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String rendering of the value.
    pub fn as_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::List(_) | Self::Json(_) => self.to_json().to_string(),
        }
    }
}

impl std::fmt::Display for FlagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for FlagValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for FlagValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for FlagValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<String>> for FlagValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for FlagValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_string).collect())
    }
}
