//! Typed parameter tables.
//!
//! Shaders, attributes and options are flat name -> value tables. Primvars
//! additionally carry a detail (interpolation class) and one value per
//! motion time sample.

use std::collections::BTreeMap;

use tether_math::{Mat4, Vec3};

/// A renderer parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    String(String),
    Color([f32; 3]),
    Point(Vec3),
    Vector(Vec3),
    Normal(Vec3),
    Matrix(Mat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
    ColorArray(Vec<[f32; 3]>),
    PointArray(Vec<Vec3>),
    NormalArray(Vec<Vec3>),
    /// Connection to another shader by handle
    Reference(String),
    ReferenceArray(Vec<String>),
}

impl ParamValue {
    /// Number of elements for array values, 1 otherwise.
    pub fn len(&self) -> usize {
        match self {
            ParamValue::IntArray(v) => v.len(),
            ParamValue::FloatArray(v) => v.len(),
            ParamValue::StringArray(v) => v.len(),
            ParamValue::ColorArray(v) => v.len(),
            ParamValue::PointArray(v) => v.len(),
            ParamValue::NormalArray(v) => v.len(),
            ParamValue::ReferenceArray(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A flat ordered parameter table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamList {
    params: BTreeMap<String, ParamValue>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.params.insert(name.into(), value);
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i32) {
        self.set(name, ParamValue::Int(value));
    }

    pub fn set_float(&mut self, name: impl Into<String>, value: f32) {
        self.set(name, ParamValue::Float(value));
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, ParamValue::String(value.into()));
    }

    pub fn set_color(&mut self, name: impl Into<String>, value: [f32; 3]) {
        self.set(name, ParamValue::Color(value));
    }

    pub fn set_float_array(&mut self, name: impl Into<String>, value: Vec<f32>) {
        self.set(name, ParamValue::FloatArray(value));
    }

    pub fn set_string_array(&mut self, name: impl Into<String>, value: Vec<String>) {
        self.set(name, ParamValue::StringArray(value));
    }

    pub fn set_matrix(&mut self, name: impl Into<String>, value: Mat4) {
        self.set(name, ParamValue::Matrix(value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.params.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.params.get(name) {
            Some(ParamValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.params.get(name) {
            Some(ParamValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.params.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> + '_ {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Interpolation class of a primvar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detail {
    Constant,
    Uniform,
    Vertex,
    Varying,
    FaceVarying,
}

/// One primvar: its detail and a value per time sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Primvar {
    pub detail: Detail,
    pub samples: Vec<ParamValue>,
}

/// Primvars of one geometry node.
///
/// With an empty `times` array every primvar holds a single sample. With
/// N times, motion primvars (`P`) hold N samples in time order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimvarList {
    times: Vec<f32>,
    vars: BTreeMap<String, Primvar>,
}

impl PrimvarList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the motion sample times. An empty slice disables motion and
    /// drops every sample past the first.
    pub fn set_times(&mut self, times: &[f32]) {
        self.times = times.to_vec();
        let keep = self.times.len().max(1);
        for var in self.vars.values_mut() {
            var.samples.truncate(keep);
        }
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// Write one sample of a primvar, growing the sample array as needed.
    pub fn set_detail(&mut self, name: impl Into<String>, value: ParamValue, detail: Detail, sample: usize) {
        let var = self.vars.entry(name.into()).or_insert_with(|| Primvar {
            detail,
            samples: Vec::new(),
        });
        var.detail = detail;
        if sample >= var.samples.len() {
            var.samples.resize(sample + 1, value.clone());
        }
        var.samples[sample] = value;
    }

    /// Set a single-sample primvar, replacing any samples it had.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue, detail: Detail) {
        self.vars.insert(
            name.into(),
            Primvar {
                detail,
                samples: vec![value],
            },
        );
    }

    pub fn set_constant(&mut self, name: impl Into<String>, value: ParamValue) {
        self.set(name, value, Detail::Constant);
    }

    pub fn get(&self, name: &str) -> Option<&Primvar> {
        self.vars.get(name)
    }

    /// First sample of a primvar.
    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.vars.get(name).and_then(|v| v.samples.first())
    }

    pub fn sample_count(&self, name: &str) -> usize {
        self.vars.get(name).map_or(0, |v| v.samples.len())
    }

    pub fn remove(&mut self, name: &str) -> Option<Primvar> {
        self.vars.remove(name)
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.vars.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.vars.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_list_typed_getters() {
        let mut params = ParamList::new();
        params.set_int("a", 3);
        params.set_float("b", 0.5);
        params.set_string("c", "hello");
        assert_eq!(params.get_int("a"), Some(3));
        assert_eq!(params.get_float("b"), Some(0.5));
        assert_eq!(params.get_string("c"), Some("hello"));
        assert_eq!(params.get_int("b"), None);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_primvar_samples_grow() {
        let mut pv = PrimvarList::new();
        pv.set_times(&[0.0, 0.5, 1.0]);
        pv.set_detail("P", ParamValue::PointArray(vec![Vec3::ZERO]), Detail::Vertex, 0);
        pv.set_detail("P", ParamValue::PointArray(vec![Vec3::X]), Detail::Vertex, 2);
        assert_eq!(pv.sample_count("P"), 3);
        assert_eq!(pv.get("P").unwrap().samples[2], ParamValue::PointArray(vec![Vec3::X]));
    }

    #[test]
    fn test_clearing_times_keeps_first_sample() {
        let mut pv = PrimvarList::new();
        pv.set_times(&[0.0, 1.0]);
        pv.set_detail("P", ParamValue::PointArray(vec![Vec3::ZERO]), Detail::Vertex, 0);
        pv.set_detail("P", ParamValue::PointArray(vec![Vec3::Y]), Detail::Vertex, 1);
        pv.set_times(&[]);
        assert!(pv.times().is_empty());
        assert_eq!(pv.sample_count("P"), 1);
        assert_eq!(pv.value("P"), Some(&ParamValue::PointArray(vec![Vec3::ZERO])));
    }

    #[test]
    fn test_param_value_len() {
        assert_eq!(ParamValue::Float(1.0).len(), 1);
        assert_eq!(ParamValue::IntArray(vec![1, 2, 3]).len(), 3);
        assert!(ParamValue::StringArray(vec![]).is_empty());
    }
}
