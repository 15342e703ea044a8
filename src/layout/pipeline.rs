//! Pipeline layouts: hierarchical graph templates.
//!
//! A [`PipelineLayout`] holds an ordered set of elements (filters or nested
//! pipeline layouts), its own boundary ports and the connections between
//! them. Every connection is checked when it is added; whole-layout rules
//! such as "every input is connected" are checked by [`PipelineLayout::check`]
//! and again when a pipeline is instantiated.

use crate::core::config::FormatPolicy;
use crate::core::error::{LayoutError, LayoutResult, ValidationReport};
use crate::core::format::TextureFormat;
use crate::core::port::{find_port, is_valid_name, Port, PortDirection, PATH_SEPARATOR};
use crate::layout::connection::{Connection, ElementRef, Endpoint, THIS};
use crate::layout::filter::FilterLayout;
use crate::validation::ValidationPipeline;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// An element of a pipeline layout.
#[derive(Debug, Clone)]
pub enum ElementLayout {
    Filter(Arc<FilterLayout>),
    Pipeline(Arc<PipelineLayout>),
}

impl ElementLayout {
    /// Name of the template (not of the instance).
    pub fn layout_name(&self) -> &str {
        match self {
            ElementLayout::Filter(filter) => filter.name(),
            ElementLayout::Pipeline(pipeline) => pipeline.name(),
        }
    }

    pub fn inputs(&self) -> &[Port] {
        match self {
            ElementLayout::Filter(filter) => filter.inputs(),
            ElementLayout::Pipeline(pipeline) => pipeline.inputs(),
        }
    }

    pub fn outputs(&self) -> &[Port] {
        match self {
            ElementLayout::Filter(filter) => filter.outputs(),
            ElementLayout::Pipeline(pipeline) => pipeline.outputs(),
        }
    }

    pub fn as_filter(&self) -> Option<&FilterLayout> {
        match self {
            ElementLayout::Filter(filter) => Some(filter),
            ElementLayout::Pipeline(_) => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineLayout> {
        match self {
            ElementLayout::Filter(_) => None,
            ElementLayout::Pipeline(pipeline) => Some(pipeline),
        }
    }
}

impl From<FilterLayout> for ElementLayout {
    fn from(filter: FilterLayout) -> Self {
        ElementLayout::Filter(Arc::new(filter))
    }
}

impl From<Arc<FilterLayout>> for ElementLayout {
    fn from(filter: Arc<FilterLayout>) -> Self {
        ElementLayout::Filter(filter)
    }
}

impl From<PipelineLayout> for ElementLayout {
    fn from(pipeline: PipelineLayout) -> Self {
        ElementLayout::Pipeline(Arc::new(pipeline))
    }
}

impl From<Arc<PipelineLayout>> for ElementLayout {
    fn from(pipeline: Arc<PipelineLayout>) -> Self {
        ElementLayout::Pipeline(pipeline)
    }
}

/// Template of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineLayout {
    name: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    elements: IndexMap<String, ElementLayout>,
    connections: Vec<Connection>,
    format_policy: FormatPolicy,
}

impl PipelineLayout {
    /// Create an empty layout with the strict format policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            elements: IndexMap::new(),
            connections: Vec::new(),
            format_policy: FormatPolicy::default(),
        }
    }

    /// Policy applied to connection formats.
    pub fn with_format_policy(mut self, policy: FormatPolicy) -> Self {
        self.format_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format_policy(&self) -> FormatPolicy {
        self.format_policy
    }

    // ========================================================================
    // Boundary Ports
    // ========================================================================

    /// Declare a boundary input. Returns its index.
    pub fn add_input(&mut self, name: impl Into<String>) -> LayoutResult<usize> {
        let port = Port::input(name);
        self.add_port(port)
    }

    /// Declare a boundary input expecting textures of `format`.
    pub fn add_input_with_format(
        &mut self,
        name: impl Into<String>,
        format: TextureFormat,
    ) -> LayoutResult<usize> {
        self.add_port(Port::input(name).with_format(format))
    }

    /// Declare a boundary output. Returns its index.
    pub fn add_output(&mut self, name: impl Into<String>) -> LayoutResult<usize> {
        self.add_port(Port::output(name))
    }

    /// Declare a boundary output expecting textures of `format`.
    pub fn add_output_with_format(
        &mut self,
        name: impl Into<String>,
        format: TextureFormat,
    ) -> LayoutResult<usize> {
        self.add_port(Port::output(name).with_format(format))
    }

    fn add_port(&mut self, port: Port) -> LayoutResult<usize> {
        if !is_valid_name(&port.name) {
            return Err(LayoutError::InvalidName { name: port.name });
        }
        if self.input_index(&port.name).is_some() || self.output_index(&port.name).is_some() {
            return Err(LayoutError::DuplicateName {
                owner: self.name.clone(),
                name: port.name,
            });
        }
        let ports = if port.is_input() {
            &mut self.inputs
        } else {
            &mut self.outputs
        };
        ports.push(port);
        Ok(ports.len() - 1)
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        find_port(&self.inputs, name).map(|(index, _)| index)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        find_port(&self.outputs, name).map(|(index, _)| index)
    }

    // ========================================================================
    // Elements
    // ========================================================================

    /// Add a filter or nested pipeline under the instance name `name`.
    pub fn add(&mut self, element: impl Into<ElementLayout>, name: impl Into<String>) -> LayoutResult<()> {
        let name = name.into();
        if !is_valid_name(&name) || name == THIS {
            return Err(LayoutError::InvalidName { name });
        }
        if self.elements.contains_key(&name) {
            return Err(LayoutError::DuplicateName {
                owner: self.name.clone(),
                name,
            });
        }
        self.elements.insert(name, element.into());
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<&ElementLayout> {
        self.elements.get(name)
    }

    /// Elements in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = (&str, &ElementLayout)> {
        self.elements.iter().map(|(name, element)| (name.as_str(), element))
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn element_index(&self, name: &str) -> Option<usize> {
        self.elements.get_index_of(name)
    }

    /// Find a filter by path, e.g. `"Blur"` or `"Sub::Blur"`.
    pub fn filter(&self, path: &str) -> Option<&FilterLayout> {
        match path.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => self.elements.get(head)?.as_pipeline()?.filter(rest),
            None => self.elements.get(path)?.as_filter(),
        }
    }

    /// Number of filters, nested ones included.
    pub fn filter_count(&self) -> usize {
        self.elements
            .values()
            .map(|element| match element {
                ElementLayout::Filter(_) => 1,
                ElementLayout::Pipeline(pipeline) => pipeline.filter_count(),
            })
            .sum()
    }

    /// Paths of every filter, nested ones included, in declaration order.
    pub fn filter_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for (name, element) in &self.elements {
            match element {
                ElementLayout::Filter(_) => paths.push(name.clone()),
                ElementLayout::Pipeline(pipeline) => paths.extend(
                    pipeline
                        .filter_paths()
                        .into_iter()
                        .map(|path| format!("{}{}{}", name, PATH_SEPARATOR, path)),
                ),
            }
        }
        paths
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connect output `from_port` of element `from` to input `to_port` of
    /// element `to`.
    pub fn connect(
        &mut self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
    ) -> LayoutResult<()> {
        self.connect_endpoints(
            Endpoint::new(ElementRef::element(from), from_port),
            Endpoint::new(ElementRef::element(to), to_port),
        )
    }

    /// Connect boundary input `input` to input `to_port` of element `to`.
    pub fn connect_to_input(&mut self, input: &str, to: &str, to_port: &str) -> LayoutResult<()> {
        self.connect_endpoints(
            Endpoint::boundary(input),
            Endpoint::new(ElementRef::element(to), to_port),
        )
    }

    /// Connect output `from_port` of element `from` to boundary output `output`.
    pub fn connect_to_output(&mut self, from: &str, from_port: &str, output: &str) -> LayoutResult<()> {
        self.connect_endpoints(
            Endpoint::new(ElementRef::element(from), from_port),
            Endpoint::boundary(output),
        )
    }

    /// Add a connection between two endpoints after checking it.
    pub fn connect_endpoints(&mut self, from: Endpoint, to: Endpoint) -> LayoutResult<()> {
        if from.element.is_boundary() && to.element.is_boundary() {
            return Err(LayoutError::PassThrough {
                layout: self.name.clone(),
                input: from.port,
                output: to.port,
            });
        }

        let from_format = self.resolve_port(&from, PortDirection::Output)?.format;
        let to_format = self.resolve_port(&to, PortDirection::Input)?.format;

        if self.connection_source(&to).is_some() {
            return Err(LayoutError::PortAlreadyConnected {
                element: self.qualified(&to.element),
                port: to.port,
            });
        }

        if self.format_policy.is_strict() {
            if let (Some(from_format), Some(to_format)) = (from_format, to_format) {
                if !from_format.is_compatible_with(&to_format) {
                    return Err(LayoutError::FormatMismatch {
                        from: from.to_string(),
                        to: to.to_string(),
                        from_format,
                        to_format,
                    });
                }
            }
        }

        if let (ElementRef::Element(source), ElementRef::Element(target)) = (&from.element, &to.element) {
            if self.is_reachable(target, source) {
                return Err(LayoutError::Cycle {
                    elements: vec![source.clone(), target.clone()],
                });
            }
        }

        self.connections.push(Connection::new(from, to));
        Ok(())
    }

    /// Find the port an endpoint designates. `direction` is the direction the
    /// port must have on an element; boundary ports are looked up with the
    /// opposite direction, since a boundary input acts as a source.
    fn resolve_port(&self, endpoint: &Endpoint, direction: PortDirection) -> LayoutResult<&Port> {
        let (expected, other) = match &endpoint.element {
            ElementRef::Boundary => match direction {
                PortDirection::Output => (self.inputs.as_slice(), self.outputs.as_slice()),
                PortDirection::Input => (self.outputs.as_slice(), self.inputs.as_slice()),
            },
            ElementRef::Element(name) => {
                let element = self.elements.get(name).ok_or_else(|| LayoutError::UnknownElement {
                    layout: self.name.clone(),
                    element: name.clone(),
                })?;
                match direction {
                    PortDirection::Output => (element.outputs(), element.inputs()),
                    PortDirection::Input => (element.inputs(), element.outputs()),
                }
            }
        };
        let expected_direction = if endpoint.element.is_boundary() {
            direction.opposite()
        } else {
            direction
        };

        if let Some((_, port)) = find_port(expected, &endpoint.port) {
            return Ok(port);
        }
        if find_port(other, &endpoint.port).is_some() {
            return Err(LayoutError::PortDirection {
                element: self.qualified(&endpoint.element),
                port: endpoint.port.clone(),
                expected: expected_direction,
                actual: expected_direction.opposite(),
            });
        }
        Err(LayoutError::UnknownPort {
            element: self.qualified(&endpoint.element),
            port: endpoint.port.clone(),
            direction: expected_direction,
        })
    }

    fn qualified(&self, element: &ElementRef) -> String {
        match element {
            ElementRef::Boundary => self.name.clone(),
            ElementRef::Element(name) => name.clone(),
        }
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The endpoint feeding `destination`, if connected.
    pub fn connection_source(&self, destination: &Endpoint) -> Option<&Endpoint> {
        self.connections
            .iter()
            .find(|c| &c.to == destination)
            .map(|c| &c.from)
    }

    /// Every endpoint fed by `source`.
    pub fn connection_destinations(&self, source: &Endpoint) -> Vec<&Endpoint> {
        self.connections
            .iter()
            .filter(|c| &c.from == source)
            .map(|c| &c.to)
            .collect()
    }

    /// Connections leaving element `name`.
    pub fn connections_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.from.element.name() == name && !c.from.element.is_boundary())
    }

    /// Connections entering element `name`.
    pub fn connections_to<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.to.element.name() == name && !c.to.element.is_boundary())
    }

    /// Check if element `target` is reachable from element `start`.
    pub fn is_reachable(&self, start: &str, target: &str) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                for connection in self.connections_from(current) {
                    if let ElementRef::Element(next) = &connection.to.element {
                        queue.push_back(next.as_str());
                    }
                }
            }
        }

        false
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Run the whole-layout checks.
    ///
    /// Returns the report, or [`LayoutError::Invalid`] carrying every error.
    pub fn check(&self) -> LayoutResult<ValidationReport> {
        ValidationPipeline::default_pipeline()
            .validate(self)
            .into_result(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{PixelDepth, PixelMode};
    use crate::core::shader::ShaderSource;

    const COPY: &str = "#version 130\nuniform sampler2D inText;\nout vec4 outText;\nin vec2 texCoord;\nvoid main() { outText = texture(inText, texCoord); }\n";

    fn copy_filter(format: TextureFormat) -> FilterLayout {
        FilterLayout::new("Copy", format, ShaderSource::new(COPY).unwrap()).unwrap()
    }

    fn rgba() -> TextureFormat {
        TextureFormat::new(2, 2, PixelMode::Rgba, PixelDepth::U8)
    }

    fn chain(length: usize) -> PipelineLayout {
        let mut layout = PipelineLayout::new("Chain");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        for i in 0..length {
            layout.add(copy_filter(rgba()), format!("F{}", i)).unwrap();
        }
        layout.connect_to_input("In", "F0", "inText").unwrap();
        for i in 1..length {
            layout
                .connect(&format!("F{}", i - 1), "outText", &format!("F{}", i), "inText")
                .unwrap();
        }
        layout
            .connect_to_output(&format!("F{}", length - 1), "outText", "Out")
            .unwrap();
        layout
    }

    #[test]
    fn test_boundary_names() {
        let mut layout = PipelineLayout::new("P");
        assert_eq!(layout.add_input("In").unwrap(), 0);
        assert_eq!(layout.add_output("Out").unwrap(), 0);
        assert!(matches!(layout.add_output("In"), Err(LayoutError::DuplicateName { .. })));
        assert!(matches!(layout.add_input("bad name"), Err(LayoutError::InvalidName { .. })));
    }

    #[test]
    fn test_duplicate_element() {
        let mut layout = PipelineLayout::new("P");
        layout.add(copy_filter(rgba()), "F").unwrap();
        let result = layout.add(copy_filter(rgba()), "F");
        assert!(matches!(result, Err(LayoutError::DuplicateName { .. })));
    }

    #[test]
    fn test_connect_twice() {
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add_input("Other").unwrap();
        layout.add(copy_filter(rgba()), "F").unwrap();
        layout.connect_to_input("In", "F", "inText").unwrap();
        let result = layout.connect_to_input("Other", "F", "inText");
        assert!(matches!(result, Err(LayoutError::PortAlreadyConnected { .. })));
    }

    #[test]
    fn test_unknown_and_direction() {
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add(copy_filter(rgba()), "F").unwrap();
        layout.add(copy_filter(rgba()), "G").unwrap();

        assert!(matches!(
            layout.connect_to_input("Missing", "F", "inText"),
            Err(LayoutError::UnknownPort { .. })
        ));
        assert!(matches!(
            layout.connect("X", "outText", "F", "inText"),
            Err(LayoutError::UnknownElement { .. })
        ));
        assert!(matches!(
            layout.connect("F", "inText", "G", "inText"),
            Err(LayoutError::PortDirection { .. })
        ));
        assert!(matches!(
            layout.connect("F", "outText", "G", "outText"),
            Err(LayoutError::PortDirection { .. })
        ));
    }

    #[test]
    fn test_boundary_port_directions() {
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        layout.add(copy_filter(rgba()), "F").unwrap();

        let result = layout.connect_endpoints(
            Endpoint::boundary("Out"),
            Endpoint::new(ElementRef::element("F"), "inText"),
        );
        assert!(matches!(
            result,
            Err(LayoutError::PortDirection { ref element, .. }) if element == "P"
        ));
        let result = layout.connect_endpoints(
            Endpoint::new(ElementRef::element("F"), "outText"),
            Endpoint::boundary("In"),
        );
        assert!(matches!(result, Err(LayoutError::PortDirection { .. })));
        assert!(matches!(
            layout.connect_to_output("F", "outText", "Missing"),
            Err(LayoutError::UnknownPort { .. })
        ));

        layout.connect_to_input("In", "F", "inText").unwrap();
        layout.connect_to_output("F", "outText", "Out").unwrap();
        assert_eq!(layout.connections().len(), 2);
    }

    #[test]
    fn test_direct_and_indirect_cycles() {
        let mut layout = PipelineLayout::new("P");
        for name in ["A", "B", "C"] {
            layout.add(copy_filter(rgba()), name).unwrap();
        }
        assert!(matches!(
            layout.connect("A", "outText", "A", "inText"),
            Err(LayoutError::Cycle { .. })
        ));
        layout.connect("A", "outText", "B", "inText").unwrap();
        layout.connect("B", "outText", "C", "inText").unwrap();
        assert!(matches!(
            layout.connect("C", "outText", "A", "inText"),
            Err(LayoutError::Cycle { .. })
        ));
    }

    #[test]
    fn test_pass_through_rejected() {
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        let result = layout.connect_endpoints(Endpoint::boundary("In"), Endpoint::boundary("Out"));
        assert!(matches!(result, Err(LayoutError::PassThrough { .. })));
    }

    #[test]
    fn test_strict_format() {
        let rgb = TextureFormat::new(2, 2, PixelMode::Rgb, PixelDepth::F32);
        let mut strict = PipelineLayout::new("P");
        strict.add_input_with_format("In", rgb).unwrap();
        strict.add(copy_filter(rgba()), "F").unwrap();
        strict.add_output_with_format("Out", rgb).unwrap();
        assert!(matches!(
            strict.connect_to_output("F", "outText", "Out"),
            Err(LayoutError::FormatMismatch { .. })
        ));

        let mut permissive = PipelineLayout::new("P").with_format_policy(FormatPolicy::Permissive);
        permissive.add(copy_filter(rgba()), "F").unwrap();
        permissive.add_output_with_format("Out", rgb).unwrap();
        permissive.connect_to_output("F", "outText", "Out").unwrap();
    }

    #[test]
    fn test_nested_queries() {
        let inner = chain(2);
        let mut outer = PipelineLayout::new("Outer");
        outer.add_input("In").unwrap();
        outer.add_output("Out").unwrap();
        outer.add(inner, "Sub").unwrap();
        outer.add(copy_filter(rgba()), "Last").unwrap();
        outer.connect_to_input("In", "Sub", "In").unwrap();
        outer.connect("Sub", "Out", "Last", "inText").unwrap();
        outer.connect_to_output("Last", "outText", "Out").unwrap();

        assert_eq!(outer.filter_count(), 3);
        assert_eq!(outer.filter_paths(), vec!["Sub::F0", "Sub::F1", "Last"]);
        assert!(outer.filter("Sub::F1").is_some());
        assert!(outer.filter("Sub::Missing").is_none());
        assert_eq!(
            outer.connection_source(&Endpoint::new(ElementRef::element("Last"), "inText")),
            Some(&Endpoint::new(ElementRef::element("Sub"), "Out"))
        );
        assert!(outer.check().unwrap().can_execute());
    }

    #[test]
    fn test_check_reports_unconnected() {
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        layout.add(copy_filter(rgba()), "F").unwrap();
        match layout.check() {
            Err(LayoutError::Invalid { errors, .. }) => {
                assert!(errors.iter().any(|e| matches!(e, LayoutError::UnconnectedInput { .. })));
                assert!(errors.iter().any(|e| matches!(e, LayoutError::UnconnectedOutput { .. })));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(chain(3).check().is_ok());
    }
}
