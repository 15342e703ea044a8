//! Filter layouts: a shader, an output format and the ports they imply.

use crate::core::error::{LayoutError, LayoutResult, ParseError};
use crate::core::format::TextureFormat;
use crate::core::port::{find_port, is_valid_name, Port, PortDirection};
use crate::core::shader::{ShaderSource, UniformDeclaration};
use crate::core::uniform::UniformType;
use indexmap::IndexMap;

/// Template of a single filter.
///
/// Input ports are the samplers declared by the shaders, output ports the
/// `out` variables of the fragment shader. Every output is rendered with the
/// filter's format.
#[derive(Debug, Clone)]
pub struct FilterLayout {
    name: String,
    format: TextureFormat,
    fragment: ShaderSource,
    vertex: Option<ShaderSource>,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    uniforms: Vec<UniformDeclaration>,
    blending: bool,
    clearing: bool,
    source: bool,
    sink: bool,
}

impl FilterLayout {
    /// Filter with default flags.
    pub fn new(
        name: impl Into<String>,
        format: TextureFormat,
        fragment: ShaderSource,
    ) -> LayoutResult<Self> {
        Self::builder(name, format, fragment).build()
    }

    pub fn builder(
        name: impl Into<String>,
        format: TextureFormat,
        fragment: ShaderSource,
    ) -> FilterLayoutBuilder {
        FilterLayoutBuilder {
            name: name.into(),
            format,
            fragment,
            vertex: None,
            blending: false,
            clearing: true,
            source: false,
            sink: false,
            input_formats: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format of every output.
    pub fn format(&self) -> &TextureFormat {
        &self.format
    }

    pub fn fragment_shader(&self) -> &ShaderSource {
        &self.fragment
    }

    /// The custom vertex shader, if one was given.
    pub fn custom_vertex_shader(&self) -> Option<&ShaderSource> {
        self.vertex.as_ref()
    }

    /// Vertex shader to link with the fragment shader. Without a custom one,
    /// the standard quad shader is generated for the fragment shader's GLSL
    /// version, or `default_version` when it declares none.
    pub fn vertex_shader(&self, default_version: u32) -> Result<ShaderSource, ParseError> {
        match &self.vertex {
            Some(vertex) => Ok(vertex.clone()),
            None => standard_vertex_shader(
                self.fragment.version().unwrap_or(default_version),
                self.fragment.profile(),
            ),
        }
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        find_port(&self.inputs, name).map(|(_, port)| port)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        find_port(&self.outputs, name).map(|(_, port)| port)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        find_port(&self.inputs, name).map(|(index, _)| index)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        find_port(&self.outputs, name).map(|(index, _)| index)
    }

    /// Uniforms of both shaders, vertex shader first.
    pub fn uniforms(&self) -> &[UniformDeclaration] {
        &self.uniforms
    }

    pub fn uniform_type(&self, name: &str) -> Option<UniformType> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| u.ty)
    }

    /// Outputs are added to their previous content.
    pub fn blending(&self) -> bool {
        self.blending
    }

    /// Outputs are cleared before drawing.
    pub fn clearing(&self) -> bool {
        self.clearing
    }

    pub fn is_source(&self) -> bool {
        self.source
    }

    pub fn is_sink(&self) -> bool {
        self.sink
    }

    pub fn requires_compatibility(&self) -> bool {
        self.fragment.requires_compatibility()
    }
}

/// Builder for [`FilterLayout`].
#[derive(Debug, Clone)]
pub struct FilterLayoutBuilder {
    name: String,
    format: TextureFormat,
    fragment: ShaderSource,
    vertex: Option<ShaderSource>,
    blending: bool,
    clearing: bool,
    source: bool,
    sink: bool,
    input_formats: IndexMap<String, TextureFormat>,
}

impl FilterLayoutBuilder {
    /// Replace the standard vertex shader.
    pub fn vertex(mut self, vertex: ShaderSource) -> Self {
        self.vertex = Some(vertex);
        self
    }

    pub fn blending(mut self, enabled: bool) -> Self {
        self.blending = enabled;
        self
    }

    pub fn clearing(mut self, enabled: bool) -> Self {
        self.clearing = enabled;
        self
    }

    /// Allow the filter to have no inputs.
    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// Allow the filter to have no outputs.
    pub fn sink(mut self) -> Self {
        self.sink = true;
        self
    }

    /// Expected format of the texture reaching input `port`.
    pub fn with_input_format(mut self, port: impl Into<String>, format: TextureFormat) -> Self {
        self.input_formats.insert(port.into(), format);
        self
    }

    pub fn build(self) -> LayoutResult<FilterLayout> {
        if !is_valid_name(&self.name) {
            return Err(LayoutError::InvalidName { name: self.name });
        }

        let mut inputs: Vec<Port> = Vec::new();
        let vertex_samplers = self.vertex.iter().flat_map(|v| v.inputs());
        for sampler in vertex_samplers.chain(self.fragment.inputs()) {
            if find_port(&inputs, sampler).is_none() {
                let mut port = Port::input(sampler.as_str());
                port.format = self.input_formats.get(sampler).copied();
                inputs.push(port);
            }
        }
        if let Some(port) = self.input_formats.keys().find(|p| find_port(&inputs, p).is_none()) {
            return Err(LayoutError::UnknownPort {
                element: self.name,
                port: port.clone(),
                direction: PortDirection::Input,
            });
        }

        let mut outputs: Vec<Port> = Vec::new();
        for output in self.fragment.outputs() {
            if find_port(&outputs, output).is_some() {
                return Err(LayoutError::DuplicateName {
                    owner: self.name,
                    name: output.clone(),
                });
            }
            outputs.push(Port::output(output.as_str()).with_format(self.format));
        }

        if outputs.is_empty() && !self.sink {
            return Err(LayoutError::NoPorts {
                filter: self.name,
                direction: PortDirection::Output,
                marker: "sink".to_string(),
            });
        }
        if inputs.is_empty() && !self.source {
            return Err(LayoutError::NoPorts {
                filter: self.name,
                direction: PortDirection::Input,
                marker: "source".to_string(),
            });
        }

        let mut uniforms: Vec<UniformDeclaration> = Vec::new();
        let vertex_uniforms = self.vertex.iter().flat_map(|v| v.uniforms());
        for uniform in vertex_uniforms.chain(self.fragment.uniforms()) {
            if !uniforms.iter().any(|u| u.name == uniform.name) {
                uniforms.push(uniform.clone());
            }
        }

        Ok(FilterLayout {
            name: self.name,
            format: self.format,
            fragment: self.fragment,
            vertex: self.vertex,
            inputs,
            outputs,
            uniforms,
            blending: self.blending,
            clearing: self.clearing,
            source: self.source,
            sink: self.sink,
        })
    }
}

/// Pass-through vertex shader drawing the full-screen quad and exposing
/// `texCoord` to the fragment shader.
pub fn standard_vertex_shader(
    version: u32,
    profile: Option<&str>,
) -> Result<ShaderSource, ParseError> {
    let es = profile == Some("es");
    let legacy = if es { version < 300 } else { version < 130 };
    let (attribute, varying) = if legacy {
        ("attribute", "varying")
    } else {
        ("in", "out")
    };
    let directive = match profile {
        Some(profile) => format!("#version {} {}", version, profile),
        None => format!("#version {}", version),
    };
    let text = format!(
        "{directive}\n\
         {attribute} vec2 vertexPosition;\n\
         {attribute} vec2 vertexTexCoord;\n\
         {varying} vec2 texCoord;\n\
         void main()\n\
         {{\n    texCoord = vertexTexCoord;\n    gl_Position = vec4(vertexPosition, 0.0, 1.0);\n}}\n"
    );
    Ok(ShaderSource::new(text)?.with_name("<standard vertex shader>"))
}
