//! Uniform variable values.
//!
//! Uniforms are the tunable parameters of a filter: every `uniform`
//! declaration of a shader that is not a sampler. The type set is closed
//! and matches what GLSL exposes to the host.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GLSL type of a uniform variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformType {
    /// Parse a GLSL type keyword.
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        let ty = match keyword {
            "float" => UniformType::Float,
            "vec2" => UniformType::Vec2,
            "vec3" => UniformType::Vec3,
            "vec4" => UniformType::Vec4,
            "int" => UniformType::Int,
            "ivec2" => UniformType::IVec2,
            "ivec3" => UniformType::IVec3,
            "ivec4" => UniformType::IVec4,
            "uint" => UniformType::UInt,
            "uvec2" => UniformType::UVec2,
            "uvec3" => UniformType::UVec3,
            "uvec4" => UniformType::UVec4,
            "bool" => UniformType::Bool,
            "bvec2" => UniformType::BVec2,
            "bvec3" => UniformType::BVec3,
            "bvec4" => UniformType::BVec4,
            "mat2" => UniformType::Mat2,
            "mat3" => UniformType::Mat3,
            "mat4" => UniformType::Mat4,
            _ => return None,
        };
        Some(ty)
    }

    /// GLSL keyword for this type.
    pub fn glsl_name(&self) -> &'static str {
        match self {
            UniformType::Float => "float",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Int => "int",
            UniformType::IVec2 => "ivec2",
            UniformType::IVec3 => "ivec3",
            UniformType::IVec4 => "ivec4",
            UniformType::UInt => "uint",
            UniformType::UVec2 => "uvec2",
            UniformType::UVec3 => "uvec3",
            UniformType::UVec4 => "uvec4",
            UniformType::Bool => "bool",
            UniformType::BVec2 => "bvec2",
            UniformType::BVec3 => "bvec3",
            UniformType::BVec4 => "bvec4",
            UniformType::Mat2 => "mat2",
            UniformType::Mat3 => "mat3",
            UniformType::Mat4 => "mat4",
        }
    }

    /// Value GLSL assigns before the host sets anything.
    pub fn default_value(&self) -> UniformValue {
        match self {
            UniformType::Float => UniformValue::Float(0.0),
            UniformType::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformType::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformType::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformType::Int => UniformValue::Int(0),
            UniformType::IVec2 => UniformValue::IVec2([0; 2]),
            UniformType::IVec3 => UniformValue::IVec3([0; 3]),
            UniformType::IVec4 => UniformValue::IVec4([0; 4]),
            UniformType::UInt => UniformValue::UInt(0),
            UniformType::UVec2 => UniformValue::UVec2([0; 2]),
            UniformType::UVec3 => UniformValue::UVec3([0; 3]),
            UniformType::UVec4 => UniformValue::UVec4([0; 4]),
            UniformType::Bool => UniformValue::Bool(false),
            UniformType::BVec2 => UniformValue::BVec2([false; 2]),
            UniformType::BVec3 => UniformValue::BVec3([false; 3]),
            UniformType::BVec4 => UniformValue::BVec4([false; 4]),
            UniformType::Mat2 => UniformValue::Mat2([0.0; 4]),
            UniformType::Mat3 => UniformValue::Mat3([0.0; 9]),
            UniformType::Mat4 => UniformValue::Mat4([0.0; 16]),
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glsl_name())
    }
}

/// Value of a uniform variable.
///
/// Matrices are stored column-major.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    UInt(u32),
    UVec2([u32; 2]),
    UVec3([u32; 3]),
    UVec4([u32; 4]),
    Bool(bool),
    BVec2([bool; 2]),
    BVec3([bool; 3]),
    BVec4([bool; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

// ============================================================================
// UniformValue Implementation
// ============================================================================

impl UniformValue {
    /// Get the GLSL type of this value.
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::IVec2(_) => UniformType::IVec2,
            UniformValue::IVec3(_) => UniformType::IVec3,
            UniformValue::IVec4(_) => UniformType::IVec4,
            UniformValue::UInt(_) => UniformType::UInt,
            UniformValue::UVec2(_) => UniformType::UVec2,
            UniformValue::UVec3(_) => UniformType::UVec3,
            UniformValue::UVec4(_) => UniformType::UVec4,
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::BVec2(_) => UniformType::BVec2,
            UniformValue::BVec3(_) => UniformType::BVec3,
            UniformValue::BVec4(_) => UniformType::BVec4,
            UniformValue::Mat2(_) => UniformType::Mat2,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Try to get this value as a float.
    /// Integers are converted.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(f) => Some(*f),
            UniformValue::Int(i) => Some(*i as f32),
            UniformValue::UInt(u) => Some(*u as f32),
            _ => None,
        }
    }

    /// Try to get this value as a signed integer.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            UniformValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let UniformValue::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Float components of a float scalar, vector or matrix.
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            UniformValue::Float(f) => Some(std::slice::from_ref(f)),
            UniformValue::Vec2(v) => Some(&v[..]),
            UniformValue::Vec3(v) => Some(&v[..]),
            UniformValue::Vec4(v) => Some(&v[..]),
            UniformValue::Mat2(m) => Some(&m[..]),
            UniformValue::Mat3(m) => Some(&m[..]),
            UniformValue::Mat4(m) => Some(&m[..]),
            _ => None,
        }
    }

    /// Try to get this value as a four component vector.
    pub fn as_vec4(&self) -> Option<[f32; 4]> {
        if let UniformValue::Vec4(v) = self {
            Some(*v)
        } else {
            None
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Float(v) => write!(f, "{:.4}", v),
            UniformValue::Int(v) => write!(f, "{}", v),
            UniformValue::UInt(v) => write!(f, "{}u", v),
            UniformValue::Bool(v) => write!(f, "{}", v),
            other => write!(f, "{}(..)", other.uniform_type()),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

// ============================================================================
// Uniform Sets
// ============================================================================

/// Snapshot of uniform values, keyed by filter path then variable name.
///
/// Taken from one pipeline with [`crate::execution::pipeline::Pipeline::uniforms`]
/// and re-applied to any pipeline built from a layout with the same filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniformSet {
    filters: IndexMap<String, IndexMap<String, UniformValue>>,
}

impl UniformSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value.
    pub fn set(&mut self, filter: impl Into<String>, name: impl Into<String>, value: UniformValue) {
        self.filters
            .entry(filter.into())
            .or_default()
            .insert(name.into(), value);
    }

    /// Look up a value.
    pub fn get(&self, filter: &str, name: &str) -> Option<&UniformValue> {
        self.filters.get(filter).and_then(|vars| vars.get(name))
    }

    /// Iterate over `(filter, name, value)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &UniformValue)> {
        self.filters.iter().flat_map(|(filter, vars)| {
            vars.iter()
                .map(move |(name, value)| (filter.as_str(), name.as_str(), value))
        })
    }

    /// Number of recorded values.
    pub fn len(&self) -> usize {
        self.filters.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glsl_keywords() {
        assert_eq!(UniformType::from_glsl("vec3"), Some(UniformType::Vec3));
        assert_eq!(UniformType::from_glsl("sampler2D"), None);
        assert_eq!(UniformType::Mat4.glsl_name(), "mat4");
        assert_eq!(UniformType::IVec2.default_value(), UniformValue::IVec2([0, 0]));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(UniformValue::from(1.5f32).uniform_type(), UniformType::Float);
        assert_eq!(UniformValue::from([0.0f32; 4]).uniform_type(), UniformType::Vec4);
        assert_eq!(UniformValue::Int(3).as_float(), Some(3.0));
        assert_eq!(UniformValue::Vec2([1.0, 2.0]).as_floats(), Some(&[1.0, 2.0][..]));
        assert_eq!(UniformValue::Bool(true).as_floats(), None);
    }

    #[test]
    fn test_uniform_set_json() {
        let mut set = UniformSet::new();
        set.set("Blur", "radius", UniformValue::Float(2.0));
        set.set("Sub::Mix", "weights", UniformValue::Vec3([0.2, 0.3, 0.5]));
        assert_eq!(set.len(), 2);

        let json = set.to_json().unwrap();
        assert!(json.contains("radius"));
        let back = UniformSet::from_json(&json).unwrap();
        assert_eq!(back.get("Sub::Mix", "weights"), Some(&UniformValue::Vec3([0.2, 0.3, 0.5])));
        assert_eq!(back.iter().count(), 2);
    }
}
