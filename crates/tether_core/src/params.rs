//! User-editable parameter values attached to host entities.
//!
//! Hosts store shader and object parameters as loosely typed values. The
//! sync engine converts them to typed renderer parameters using the
//! property schema, so this module only needs to carry the raw value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A raw host parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl HostValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            HostValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            HostValue::Int(i) => Some(*i as f32),
            HostValue::Float(f) => Some(*f as f32),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Bool(b) => Some(i32::from(*b)),
            HostValue::Int(i) => i32::try_from(*i).ok(),
            HostValue::Float(f) => Some(*f as i32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            HostValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Float components, widening scalars to a one-element list.
    pub fn as_floats(&self) -> Option<Vec<f32>> {
        match self {
            HostValue::FloatArray(v) => Some(v.iter().map(|f| *f as f32).collect()),
            other => other.as_f32().map(|f| vec![f]),
        }
    }
}

impl From<f32> for HostValue {
    fn from(value: f32) -> Self {
        HostValue::Float(value as f64)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Int(value as i64)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<[f32; 3]> for HostValue {
    fn from(value: [f32; 3]) -> Self {
        HostValue::FloatArray(value.iter().map(|f| *f as f64).collect())
    }
}

/// Ordered parameter table keyed by parameter name.
pub type Params = BTreeMap<String, HostValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json() {
        let params: Params =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 0.5, "d": "tex.<f4>.exr", "e": [1, 0, 0]}"#)
                .unwrap();
        assert_eq!(params["a"], HostValue::Bool(true));
        assert_eq!(params["b"].as_i32(), Some(3));
        assert_eq!(params["c"].as_f32(), Some(0.5));
        assert_eq!(params["d"].as_str(), Some("tex.<f4>.exr"));
        assert_eq!(params["e"].as_floats(), Some(vec![1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_scalar_widening() {
        assert_eq!(HostValue::from(2.0f32).as_floats(), Some(vec![2.0]));
        assert_eq!(HostValue::from("x").as_floats(), None);
    }
}
