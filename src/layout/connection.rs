//! Connection types for pipeline layouts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the boundary element in paths and messages.
pub const THIS: &str = "THIS";

/// One side of a connection: an element of the layout, or the layout itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRef {
    /// The owning pipeline's own input and output ports.
    Boundary,
    /// A filter or nested pipeline, by instance name.
    Element(String),
}

impl ElementRef {
    pub fn element(name: impl Into<String>) -> Self {
        ElementRef::Element(name.into())
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, ElementRef::Boundary)
    }

    pub fn name(&self) -> &str {
        match self {
            ElementRef::Boundary => THIS,
            ElementRef::Element(name) => name,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An endpoint of a connection (element + port).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The element.
    pub element: ElementRef,
    /// The port name on that element.
    pub port: String,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(element: ElementRef, port: impl Into<String>) -> Self {
        Self {
            element,
            port: port.into(),
        }
    }

    /// Endpoint on a boundary port.
    pub fn boundary(port: impl Into<String>) -> Self {
        Self::new(ElementRef::Boundary, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.element, self.port)
    }
}

/// A directed edge from an output (or boundary input) to an input (or
/// boundary output).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Producing endpoint.
    pub from: Endpoint,
    /// Consuming endpoint.
    pub to: Endpoint,
}

impl Connection {
    /// Create a new connection.
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let endpoint = Endpoint::new(ElementRef::element("Blur"), "outText");
        assert_eq!(endpoint.element.name(), "Blur");
        assert_eq!(endpoint.to_string(), "Blur.outText");
        assert!(Endpoint::boundary("In").element.is_boundary());
    }

    #[test]
    fn test_connection_display() {
        let connection = Connection::new(
            Endpoint::boundary("In"),
            Endpoint::new(ElementRef::element("F"), "inText"),
        );
        assert_eq!(connection.to_string(), "THIS.In -> F.inText");
    }
}
