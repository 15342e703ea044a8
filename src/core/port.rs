//! Port definitions for filters and pipelines.
//!
//! Ports are the named attachment points of a filter or pipeline. Input
//! ports receive exactly one texture, output ports may feed many.

use crate::core::format::TextureFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used in element paths such as `Sub::Filter`.
pub const PATH_SEPARATOR: &str = "::";

/// Direction of a port (input or output).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    /// The other direction.
    pub fn opposite(&self) -> Self {
        match self {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// A named input or output of a filter or pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Unique name within the owning layout.
    pub name: String,
    /// Input or output.
    pub direction: PortDirection,
    /// Expected texture format, when known.
    pub format: Option<TextureFormat>,
}

impl Port {
    /// Create an input port with no expected format.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            format: None,
        }
    }

    /// Create an output port with no expected format.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            format: None,
        }
    }

    /// Attach an expected format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }
}

/// Check that a port or element name can be used in paths.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(PATH_SEPARATOR) && !name.chars().any(char::is_whitespace)
}

/// Find a port by name.
pub fn find_port<'a>(ports: &'a [Port], name: &str) -> Option<(usize, &'a Port)> {
    ports.iter().enumerate().find(|(_, p)| p.name == name)
}
