//! Layout serialization for saving and loading.
//!
//! Shaders are stored as text and scanned again on load; the layout is
//! rebuilt through the public API so every connection is checked anew.

use crate::core::config::FormatPolicy;
use crate::core::error::GlipResult;
use crate::core::format::TextureFormat;
use crate::core::port::Port;
use crate::core::shader::ShaderSource;
use crate::layout::connection::Connection;
use crate::layout::filter::FilterLayout;
use crate::layout::pipeline::{ElementLayout, PipelineLayout};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serializable shader text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedShader {
    /// Name used in logs
    pub name: String,
    /// GLSL text
    pub source: String,
}

impl From<&ShaderSource> for SerializedShader {
    fn from(shader: &ShaderSource) -> Self {
        Self {
            name: shader.name().to_string(),
            source: shader.source().to_string(),
        }
    }
}

impl SerializedShader {
    fn to_shader(&self) -> GlipResult<ShaderSource> {
        Ok(ShaderSource::new(self.source.as_str())?.with_name(self.name.as_str()))
    }
}

/// Serializable representation of a filter layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedFilter {
    /// Template name
    pub name: String,
    /// Output format
    pub format: TextureFormat,
    /// Fragment shader
    pub fragment: SerializedShader,
    /// Custom vertex shader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<SerializedShader>,
    #[serde(default)]
    pub blending: bool,
    #[serde(default = "default_clearing")]
    pub clearing: bool,
    #[serde(default)]
    pub source: bool,
    #[serde(default)]
    pub sink: bool,
    /// Declared input formats
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub input_formats: IndexMap<String, TextureFormat>,
}

fn default_clearing() -> bool {
    true
}

impl From<&FilterLayout> for SerializedFilter {
    fn from(filter: &FilterLayout) -> Self {
        Self {
            name: filter.name().to_string(),
            format: *filter.format(),
            fragment: filter.fragment_shader().into(),
            vertex: filter.custom_vertex_shader().map(SerializedShader::from),
            blending: filter.blending(),
            clearing: filter.clearing(),
            source: filter.is_source(),
            sink: filter.is_sink(),
            input_formats: filter
                .inputs()
                .iter()
                .filter_map(|p| p.format.map(|f| (p.name.clone(), f)))
                .collect(),
        }
    }
}

impl SerializedFilter {
    /// Rebuild the filter layout.
    pub fn into_layout(self) -> GlipResult<FilterLayout> {
        let mut builder = FilterLayout::builder(self.name, self.format, self.fragment.to_shader()?)
            .blending(self.blending)
            .clearing(self.clearing);
        if let Some(vertex) = &self.vertex {
            builder = builder.vertex(vertex.to_shader()?);
        }
        if self.source {
            builder = builder.source();
        }
        if self.sink {
            builder = builder.sink();
        }
        for (port, format) in self.input_formats {
            builder = builder.with_input_format(port, format);
        }
        Ok(builder.build()?)
    }
}

/// Serializable boundary port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedPort {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TextureFormat>,
}

impl From<&Port> for SerializedPort {
    fn from(port: &Port) -> Self {
        Self {
            name: port.name.clone(),
            format: port.format,
        }
    }
}

/// Serializable element of a layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SerializedElement {
    Filter {
        name: String,
        filter: SerializedFilter,
    },
    Pipeline {
        name: String,
        layout: Box<SerializedLayout>,
    },
}

/// Serializable representation of a complete pipeline layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLayout {
    /// Layout format version
    pub version: String,
    /// Layout name
    pub name: String,
    #[serde(default)]
    pub format_policy: FormatPolicy,
    /// Boundary inputs
    pub inputs: Vec<SerializedPort>,
    /// Boundary outputs
    pub outputs: Vec<SerializedPort>,
    /// Elements in declaration order
    pub elements: Vec<SerializedElement>,
    /// All connections
    pub connections: Vec<Connection>,
}

impl SerializedLayout {
    /// Current format version.
    pub const VERSION: &'static str = "1.0.0";

    /// Capture a layout and everything nested in it.
    pub fn from_layout(layout: &PipelineLayout) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            name: layout.name().to_string(),
            format_policy: layout.format_policy(),
            inputs: layout.inputs().iter().map(SerializedPort::from).collect(),
            outputs: layout.outputs().iter().map(SerializedPort::from).collect(),
            elements: layout
                .elements()
                .map(|(name, element)| match element {
                    ElementLayout::Filter(filter) => SerializedElement::Filter {
                        name: name.to_string(),
                        filter: SerializedFilter::from(filter.as_ref()),
                    },
                    ElementLayout::Pipeline(pipeline) => SerializedElement::Pipeline {
                        name: name.to_string(),
                        layout: Box::new(Self::from_layout(pipeline)),
                    },
                })
                .collect(),
            connections: layout.connections().to_vec(),
        }
    }

    /// Rebuild the layout, checking every element and connection.
    pub fn into_layout(self) -> GlipResult<PipelineLayout> {
        let mut layout = PipelineLayout::new(self.name).with_format_policy(self.format_policy);
        for port in self.inputs {
            match port.format {
                Some(format) => layout.add_input_with_format(port.name, format)?,
                None => layout.add_input(port.name)?,
            };
        }
        for port in self.outputs {
            match port.format {
                Some(format) => layout.add_output_with_format(port.name, format)?,
                None => layout.add_output(port.name)?,
            };
        }
        for element in self.elements {
            match element {
                SerializedElement::Filter { name, filter } => layout.add(filter.into_layout()?, name)?,
                SerializedElement::Pipeline { name, layout: nested } => {
                    layout.add(nested.into_layout()?, name)?
                }
            }
        }
        for connection in self.connections {
            layout.connect_endpoints(connection.from, connection.to)?;
        }
        Ok(layout)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to compact JSON (no whitespace).
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl PipelineLayout {
    /// Serialize this layout to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        SerializedLayout::from_layout(self).to_json()
    }

    /// Load a layout from JSON.
    pub fn from_json(json: &str) -> GlipResult<Self> {
        SerializedLayout::from_json(json)?.into_layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{GlipError, LayoutError};
    use crate::core::format::{PixelDepth, PixelMode};

    const COPY: &str = "#version 130\nuniform sampler2D inText;\nout vec4 outText;\nin vec2 texCoord;\nvoid main() { outText = texture(inText, texCoord); }\n";

    fn nested_layout() -> PipelineLayout {
        let format = TextureFormat::new(4, 4, PixelMode::Rgba, PixelDepth::F16);
        let copy = FilterLayout::builder("Copy", format, ShaderSource::new(COPY).unwrap().with_name("copy.glsl"))
            .blending(true)
            .build()
            .unwrap();

        let mut inner = PipelineLayout::new("Inner");
        inner.add_input("In").unwrap();
        inner.add_output_with_format("Out", format).unwrap();
        inner.add(copy.clone(), "C").unwrap();
        inner.connect_to_input("In", "C", "inText").unwrap();
        inner.connect_to_output("C", "outText", "Out").unwrap();

        let mut outer = PipelineLayout::new("Outer").with_format_policy(FormatPolicy::Permissive);
        outer.add_input("Source").unwrap();
        outer.add_output("Result").unwrap();
        outer.add(inner, "Sub").unwrap();
        outer.add(copy, "Last").unwrap();
        outer.connect_to_input("Source", "Sub", "In").unwrap();
        outer.connect("Sub", "Out", "Last", "inText").unwrap();
        outer.connect_to_output("Last", "outText", "Result").unwrap();
        outer
    }

    #[test]
    fn test_layout_json() {
        let layout = nested_layout();
        let json = layout.to_json().unwrap();
        assert!(json.contains("\"kind\": \"pipeline\""));
        assert!(json.contains("copy.glsl"));

        let restored = PipelineLayout::from_json(&json).unwrap();
        assert_eq!(restored.name(), "Outer");
        assert_eq!(restored.format_policy(), FormatPolicy::Permissive);
        assert_eq!(restored.filter_paths(), layout.filter_paths());
        assert_eq!(restored.connections(), layout.connections());
        let last = restored.filter("Last").unwrap();
        assert!(last.blending());
        assert_eq!(last.fragment_shader().name(), "copy.glsl");
        assert_eq!(restored.filter("Sub::C").unwrap().format().depth(), PixelDepth::F16);
        assert!(restored.check().is_ok());
    }

    #[test]
    fn test_invalid_connection_rejected_on_load() {
        let mut serialized = SerializedLayout::from_layout(&nested_layout());
        let duplicate = serialized.connections[1].clone();
        serialized.connections.push(duplicate);
        let json = serialized.to_json_compact().unwrap();

        let result = PipelineLayout::from_json(&json);
        assert!(matches!(
            result,
            Err(GlipError::Layout(LayoutError::PortAlreadyConnected { .. }))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PipelineLayout::from_json("{\"version\": 1}"),
            Err(GlipError::Serialization(_))
        ));
    }
}
