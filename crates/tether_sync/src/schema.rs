//! Property schema: which user properties become renderer attributes,
//! primvars or options, and with what type.
//!
//! The schema is plain data loaded once per session. A builtin copy ships
//! with the crate (`config/schema.json`); pipelines can load their own.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tether_core::HostValue;
use tether_math::{Mat4, Vec3};
use tether_sg::ParamValue;
use thiserror::Error;

const BUILTIN_SCHEMA: &str = include_str!("../config/schema.json");

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid property '{section}.{name}': {reason}")]
    Invalid {
        section: &'static str,
        name: String,
        reason: String,
    },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Renderer-side parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    String,
    Color,
    Point,
    Vector,
    Normal,
    Matrix,
}

/// How one user property is copied to the renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyMeta {
    #[serde(rename = "type")]
    pub renderman_type: ParamType,

    /// Primvar name on geometry
    #[serde(default)]
    pub primvar: Option<String>,

    /// Attribute name on instance groups or the root
    #[serde(default)]
    pub riattr: Option<String>,

    /// Scene option name
    #[serde(default)]
    pub riopt: Option<String>,

    #[serde(default)]
    pub array_size: Option<usize>,

    /// Objects may defer this property to the scene
    #[serde(default)]
    pub inheritable: bool,

    /// Value meaning "inherit"
    #[serde(default)]
    pub inherit_true_value: Option<HostValue>,

    #[serde(default)]
    pub default: Option<HostValue>,
}

impl PropertyMeta {
    /// Does `value` ask for the inherited value?
    pub fn inherits(&self, value: &HostValue) -> bool {
        self.inheritable
            && self
                .inherit_true_value
                .as_ref()
                .is_some_and(|marker| same_value(marker, value))
    }

    /// Convert a host value to this property's renderer type.
    pub fn convert(&self, value: &HostValue) -> Option<ParamValue> {
        convert(value, self.renderman_type, self.array_size)
    }
}

/// Property tables for each owner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySchema {
    /// Per-object properties
    pub object: BTreeMap<String, PropertyMeta>,
    /// Scene properties: options and values objects inherit
    pub scene: BTreeMap<String, PropertyMeta>,
    /// Attributes on the scene root
    pub root: BTreeMap<String, PropertyMeta>,
}

impl PropertySchema {
    /// The schema shipped with the crate.
    pub fn builtin() -> SchemaResult<Self> {
        Self::from_json(BUILTIN_SCHEMA)
    }

    pub fn from_json(content: &str) -> SchemaResult<Self> {
        let schema: PropertySchema = serde_json::from_str(content)?;
        schema.validate()?;
        log::debug!(
            "Property schema: {} object, {} scene, {} root properties",
            schema.object.len(),
            schema.scene.len(),
            schema.root.len()
        );
        Ok(schema)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> SchemaResult<()> {
        let sections = [
            ("object", &self.object),
            ("scene", &self.scene),
            ("root", &self.root),
        ];
        for (section, table) in sections {
            for (name, meta) in table {
                let invalid = |reason: &str| SchemaError::Invalid {
                    section,
                    name: name.clone(),
                    reason: reason.to_string(),
                };
                if meta.primvar.is_none() && meta.riattr.is_none() && meta.riopt.is_none() {
                    return Err(invalid("no primvar, riattr or riopt target"));
                }
                if meta.array_size == Some(0) {
                    return Err(invalid("array_size must be positive"));
                }
                if meta.inheritable && meta.inherit_true_value.is_none() {
                    return Err(invalid("inheritable without inherit_true_value"));
                }
            }
        }
        Ok(())
    }

    /// Object properties written as attributes.
    pub fn object_attributes(&self) -> impl Iterator<Item = (&str, &str, &PropertyMeta)> + '_ {
        self.object
            .iter()
            .filter_map(|(name, meta)| meta.riattr.as_deref().map(|a| (name.as_str(), a, meta)))
    }

    /// Object properties written as primvars.
    pub fn object_primvars(&self) -> impl Iterator<Item = (&str, &str, &PropertyMeta)> + '_ {
        self.object
            .iter()
            .filter_map(|(name, meta)| meta.primvar.as_deref().map(|p| (name.as_str(), p, meta)))
    }

    pub fn root_attributes(&self) -> impl Iterator<Item = (&str, &str, &PropertyMeta)> + '_ {
        self.root
            .iter()
            .filter_map(|(name, meta)| meta.riattr.as_deref().map(|a| (name.as_str(), a, meta)))
    }

    pub fn scene_options(&self) -> impl Iterator<Item = (&str, &str, &PropertyMeta)> + '_ {
        self.scene
            .iter()
            .filter_map(|(name, meta)| meta.riopt.as_deref().map(|o| (name.as_str(), o, meta)))
    }
}

/// Convert a host value to a typed renderer value.
pub fn convert(value: &HostValue, ty: ParamType, array_size: Option<usize>) -> Option<ParamValue> {
    if array_size.is_some() {
        return match ty {
            ParamType::Int => value
                .as_floats()
                .map(|v| ParamValue::IntArray(v.into_iter().map(|f| f as i32).collect())),
            ParamType::Float => value.as_floats().map(ParamValue::FloatArray),
            ParamType::String => match value {
                HostValue::StringArray(v) => Some(ParamValue::StringArray(v.clone())),
                HostValue::String(s) => Some(ParamValue::StringArray(vec![s.clone()])),
                _ => None,
            },
            ParamType::Color => value.as_floats().map(|v| {
                ParamValue::ColorArray(v.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
            }),
            _ => None,
        };
    }

    match ty {
        ParamType::Int => value.as_i32().map(ParamValue::Int),
        ParamType::Float => value.as_f32().map(ParamValue::Float),
        ParamType::String => value.as_str().map(|s| ParamValue::String(s.to_string())),
        ParamType::Color => triple(value).map(ParamValue::Color),
        ParamType::Point => triple(value).map(|c| ParamValue::Point(Vec3::from(c))),
        ParamType::Vector => triple(value).map(|c| ParamValue::Vector(Vec3::from(c))),
        ParamType::Normal => triple(value).map(|c| ParamValue::Normal(Vec3::from(c))),
        ParamType::Matrix => value.as_floats().and_then(|v| {
            let arr: [f32; 16] = v.try_into().ok()?;
            Some(ParamValue::Matrix(Mat4::from_cols_array(&arr)))
        }),
    }
}

fn triple(value: &HostValue) -> Option<[f32; 3]> {
    let v = value.as_floats()?;
    match v.as_slice() {
        [x, y, z] => Some([*x, *y, *z]),
        [s] => Some([*s, *s, *s]),
        _ => None,
    }
}

/// Convert a shader parameter with no schema entry, going by the value alone.
pub fn infer(value: &HostValue) -> ParamValue {
    match value {
        HostValue::Bool(b) => ParamValue::Int(i32::from(*b)),
        HostValue::Int(i) => ParamValue::Int(*i as i32),
        HostValue::Float(f) => ParamValue::Float(*f as f32),
        HostValue::String(s) => ParamValue::String(s.clone()),
        HostValue::FloatArray(v) if v.len() == 3 => {
            ParamValue::Color([v[0] as f32, v[1] as f32, v[2] as f32])
        }
        HostValue::FloatArray(v) => ParamValue::FloatArray(v.iter().map(|f| *f as f32).collect()),
        HostValue::StringArray(v) => ParamValue::StringArray(v.clone()),
    }
}

/// Equality that treats `-1` and `-1.0` as the same value.
pub fn same_value(a: &HostValue, b: &HostValue) -> bool {
    match (a.as_f32(), b.as_f32()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Zero, false, empty string or empty array.
pub fn is_falsy(value: &HostValue) -> bool {
    match value {
        HostValue::Bool(b) => !b,
        HostValue::Int(i) => *i == 0,
        HostValue::Float(f) => *f == 0.0,
        HostValue::String(s) => s.is_empty(),
        HostValue::FloatArray(v) => v.is_empty(),
        HostValue::StringArray(v) => v.is_empty(),
    }
}
