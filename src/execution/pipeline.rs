//! Pipeline execution engine.
//!
//! A [`Pipeline`] is one instance of a [`PipelineLayout`] on a [`Context`].
//! Instantiation validates the layout, flattens nested layouts into a single
//! list of filters, orders them, compiles every program and allocates every
//! texture and framebuffer. After that, [`Pipeline::process`] only binds and
//! draws.

use crate::core::config::GlipConfig;
use crate::core::error::{
    BindingError, BindingResult, GlipError, GlipResult, LayoutError, ResourceError, StreamError,
};
use crate::core::format::TextureFormat;
use crate::core::port::{find_port, Port, PortDirection, PATH_SEPARATOR};
use crate::core::uniform::{UniformSet, UniformValue};
use crate::execution::streams::{ResolvedStream, StreamId, StreamManager};
use crate::gpu::context::Context;
use crate::gpu::device::{ProgramSource, RawTexture, RenderPass};
use crate::gpu::resources::{
    FramebufferSlot, ProgramSlot, ResourceArena, Texture, TextureSlot, WeakTexture,
};
use crate::layout::connection::{ElementRef, THIS};
use crate::layout::filter::FilterLayout;
use crate::layout::pipeline::{ElementLayout, PipelineLayout};
use crate::layout::topology::stable_topological_order;
use crate::validation::ValidationPipeline;
use indexmap::IndexMap;
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// At least one input has no texture.
    Unbound,
    /// Every input has a texture.
    Bound,
    /// The last `process()` completed.
    Executed,
    /// A filter failed on its first run; the instance cannot be used.
    Broken,
}

/// What the output textures currently hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputValidity {
    /// Never processed, content is undefined.
    Undefined,
    /// Inputs or uniforms changed since the last `process()`.
    Stale,
    /// Result of the last `process()` with the current bindings.
    Current,
}

/// Execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Completed `process()` calls.
    pub runs: u64,
    /// Draws issued over all runs.
    pub filters_drawn: u64,
    /// Time spent submitting the last run.
    pub last_duration: Duration,
    /// Time spent submitting all runs.
    pub total_duration: Duration,
}

struct FilterInstance {
    path: String,
    layout: Arc<FilterLayout>,
    inputs: Vec<ResolvedStream>,
    program: ProgramSlot,
    /// `None` for sinks without outputs, which are compiled but never drawn.
    framebuffer: Option<FramebufferSlot>,
    outputs: Vec<TextureSlot>,
    uniforms: IndexMap<String, UniformValue>,
    drawn: bool,
}

// ============================================================================
// Flattening
// ============================================================================

struct FlatFilter {
    path: String,
    layout: Arc<FilterLayout>,
    inputs: Vec<StreamId>,
}

/// Turns a hierarchy of layouts into a flat list of filters whose inputs are
/// streams, in depth-first declaration order.
#[derive(Default)]
struct Flattener {
    streams: StreamManager,
    filters: Vec<FlatFilter>,
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}

impl Flattener {
    /// Declare the streams of `layout`, whose boundary inputs are
    /// `boundary_inputs`, and return the streams of its boundary outputs.
    fn flatten(
        &mut self,
        layout: &PipelineLayout,
        prefix: &str,
        boundary_inputs: &[StreamId],
    ) -> Result<Vec<StreamId>, StreamError> {
        let mut element_streams: Vec<(Vec<StreamId>, Vec<StreamId>)> = Vec::new();

        for (name, element) in layout.elements() {
            let path = qualify(prefix, name);
            let inputs: Vec<StreamId> = element
                .inputs()
                .iter()
                .map(|port| self.streams.declare(format!("{}.{}", path, port.name)))
                .collect();

            let outputs = match element {
                ElementLayout::Filter(filter) => {
                    let index = self.filters.len();
                    let outputs = filter
                        .outputs()
                        .iter()
                        .enumerate()
                        .map(|(k, port)| {
                            self.streams.produced(format!("{}.{}", path, port.name), index, k)
                        })
                        .collect();
                    self.filters.push(FlatFilter {
                        path,
                        layout: Arc::clone(filter),
                        inputs: inputs.clone(),
                    });
                    outputs
                }
                ElementLayout::Pipeline(nested) => self.flatten(nested, &path, &inputs)?,
            };
            element_streams.push((inputs, outputs));
        }

        let owner = if prefix.is_empty() { THIS } else { prefix };
        let boundary_outputs: Vec<StreamId> = layout
            .outputs()
            .iter()
            .map(|port| self.streams.declare(format!("{}.{}", owner, port.name)))
            .collect();

        for connection in layout.connections() {
            let source = match &connection.from.element {
                ElementRef::Boundary => layout
                    .input_index(&connection.from.port)
                    .and_then(|i| boundary_inputs.get(i)),
                ElementRef::Element(name) => layout.element_index(name).and_then(|e| {
                    let (_, outputs) = &element_streams[e];
                    find_port(layout.element(name)?.outputs(), &connection.from.port)
                        .and_then(|(k, _)| outputs.get(k))
                }),
            };
            let target = match &connection.to.element {
                ElementRef::Boundary => layout
                    .output_index(&connection.to.port)
                    .and_then(|i| boundary_outputs.get(i)),
                ElementRef::Element(name) => layout.element_index(name).and_then(|e| {
                    let (inputs, _) = &element_streams[e];
                    find_port(layout.element(name)?.inputs(), &connection.to.port)
                        .and_then(|(k, _)| inputs.get(k))
                }),
            };
            match (source, target) {
                (Some(&source), Some(&target)) => self.streams.link(target, source)?,
                _ => {
                    return Err(StreamError::Unresolved {
                        stream: format!("{}: {}", owner, connection),
                    })
                }
            }
        }

        Ok(boundary_outputs)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// An executable instance of a pipeline layout.
///
/// Every instance owns its programs, framebuffers and intermediate textures;
/// two instances of the same layout share nothing, so one can read the
/// other's output (ping-pong). Dropping the pipeline releases everything it
/// allocated. Input textures are not owned: the pipeline keeps weak
/// references to them.
pub struct Pipeline {
    name: String,
    layout_name: String,
    config: GlipConfig,
    arena: ResourceArena,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    /// Format expected by each input: the port's own, or its first consumer's.
    input_formats: Vec<Option<TextureFormat>>,
    /// Filters in depth-first declaration order.
    filters: Vec<FilterInstance>,
    /// Execution order, as indices into `filters`.
    order: Vec<usize>,
    output_sources: Vec<(usize, usize)>,
    bindings: Vec<Option<WeakTexture>>,
    state: PipelineState,
    validity: OutputValidity,
    stats: ExecutionStats,
}

impl Pipeline {
    /// Instantiate `layout` with the default configuration.
    pub fn new(context: &Context, layout: &PipelineLayout, name: impl Into<String>) -> GlipResult<Self> {
        Self::with_config(context, layout, name, GlipConfig::default())
    }

    /// Instantiate `layout`. Every program is compiled and every texture
    /// allocated before this returns.
    pub fn with_config(
        context: &Context,
        layout: &PipelineLayout,
        name: impl Into<String>,
        config: GlipConfig,
    ) -> GlipResult<Self> {
        let name = name.into();
        let start = Instant::now();

        ValidationPipeline::for_device(context.limits())
            .validate(layout)
            .into_result(layout.name())
            .map_err(|e| GlipError::at(name.as_str(), e))?;

        let mut flattener = Flattener::default();
        let externals: Vec<StreamId> = layout
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, port)| flattener.streams.external(format!("{}.{}", THIS, port.name), i))
            .collect();
        let output_streams = flattener
            .flatten(layout, "", &externals)
            .map_err(|e| GlipError::at(name.as_str(), e))?;
        let Flattener { streams, filters: flat } = flattener;

        let mut resolved_inputs = Vec::with_capacity(flat.len());
        for filter in &flat {
            let inputs = filter
                .inputs
                .iter()
                .map(|stream| streams.resolve(*stream))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| GlipError::at(qualify(&name, &filter.path), e))?;
            resolved_inputs.push(inputs);
        }

        let mut output_sources = Vec::with_capacity(output_streams.len());
        for (port, stream) in layout.outputs().iter().zip(&output_streams) {
            match streams.resolve(*stream).map_err(|e| GlipError::at(name.as_str(), e))? {
                ResolvedStream::Produced { filter, output } => output_sources.push((filter, output)),
                ResolvedStream::External { input } => {
                    let error = LayoutError::PassThrough {
                        layout: layout.name().to_string(),
                        input: layout.inputs()[input].name.clone(),
                        output: port.name.clone(),
                    };
                    return Err(GlipError::at(name.as_str(), error));
                }
            }
        }

        let edges: Vec<(usize, usize)> = resolved_inputs
            .iter()
            .enumerate()
            .flat_map(|(consumer, inputs)| {
                inputs.iter().filter_map(move |input| match input {
                    ResolvedStream::Produced { filter, .. } => Some((*filter, consumer)),
                    ResolvedStream::External { .. } => None,
                })
            })
            .collect();
        let order = stable_topological_order(flat.len(), &edges).map_err(|remaining| {
            let error = LayoutError::Cycle {
                elements: remaining.into_iter().map(|i| flat[i].path.clone()).collect(),
            };
            GlipError::at(name.as_str(), error)
        })?;

        let input_formats = layout
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, port)| {
                port.format.or_else(|| {
                    flat.iter().zip(&resolved_inputs).find_map(|(filter, inputs)| {
                        let k = inputs
                            .iter()
                            .position(|r| *r == ResolvedStream::External { input: i })?;
                        filter.layout.inputs()[k].format
                    })
                })
            })
            .collect();

        let mut arena = ResourceArena::new(context);
        let mut filters = Vec::with_capacity(flat.len());
        for (filter, inputs) in flat.into_iter().zip(resolved_inputs) {
            let location = qualify(&name, &filter.path);
            let instance = Self::instantiate_filter(&mut arena, &config, filter, inputs)
                .map_err(|e| GlipError::at(location, e))?;
            filters.push(instance);
        }

        info!(
            "Instantiated pipeline '{}' from layout '{}': {} filter(s) in {:?}",
            name,
            layout.name(),
            filters.len(),
            start.elapsed()
        );

        let bindings = vec![None; layout.inputs().len()];
        let state = if bindings.is_empty() {
            PipelineState::Bound
        } else {
            PipelineState::Unbound
        };

        Ok(Self {
            name,
            layout_name: layout.name().to_string(),
            config,
            arena,
            inputs: layout.inputs().to_vec(),
            outputs: layout.outputs().to_vec(),
            input_formats,
            filters,
            order,
            output_sources,
            bindings,
            state,
            validity: OutputValidity::Undefined,
            stats: ExecutionStats::default(),
        })
    }

    fn instantiate_filter(
        arena: &mut ResourceArena,
        config: &GlipConfig,
        filter: FlatFilter,
        inputs: Vec<ResolvedStream>,
    ) -> GlipResult<FilterInstance> {
        let layout = filter.layout;
        let vertex = layout.vertex_shader(config.default_glsl_version)?;
        let samplers: Vec<String> = layout.inputs().iter().map(|p| p.name.clone()).collect();
        let output_names: Vec<String> = layout.outputs().iter().map(|p| p.name.clone()).collect();

        let program = arena.compile_program(&ProgramSource {
            vertex: &vertex,
            fragment: layout.fragment_shader(),
            samplers: &samplers,
            outputs: &output_names,
            compatibility: layout.requires_compatibility(),
        })?;

        let outputs = layout
            .outputs()
            .iter()
            .map(|_| arena.allocate_texture(*layout.format()))
            .collect::<Result<Vec<_>, _>>()?;
        let framebuffer = if outputs.is_empty() {
            None
        } else {
            Some(arena.create_framebuffer(&outputs)?)
        };

        debug!(
            "Filter '{}': {} input(s), {} output(s) of {}",
            filter.path,
            samplers.len(),
            outputs.len(),
            layout.format()
        );

        Ok(FilterInstance {
            path: filter.path,
            layout,
            inputs,
            program,
            framebuffer,
            outputs,
            uniforms: IndexMap::new(),
            drawn: false,
        })
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind `texture` to the input named `port`, replacing any previous
    /// binding.
    pub fn bind_input(&mut self, port: &str, texture: &Texture) -> BindingResult<()> {
        let index = find_port(&self.inputs, port)
            .map(|(index, _)| index)
            .ok_or_else(|| self.unknown_port(port, PortDirection::Input))?;
        self.bind_input_at(index, texture)
    }

    /// Bind `texture` to input `index`.
    pub fn bind_input_at(&mut self, index: usize, texture: &Texture) -> BindingResult<()> {
        self.check_binding(index, texture)?;
        let unchanged = self.bindings[index]
            .as_ref()
            .map_or(false, |bound| bound.is(texture));
        self.bindings[index] = Some(texture.downgrade());
        if !unchanged {
            self.invalidate();
        }
        if self.bindings.iter().all(Option::is_some) && self.state == PipelineState::Unbound {
            self.state = PipelineState::Bound;
        }
        Ok(())
    }

    fn check_binding(&self, index: usize, texture: &Texture) -> BindingResult<()> {
        let port = match self.inputs.get(index) {
            Some(port) => port.name.clone(),
            None => return Err(self.unknown_port(&index.to_string(), PortDirection::Input)),
        };

        if !texture.context().ptr_eq(self.arena.context()) {
            return Err(BindingError::ContextMismatch { port });
        }
        let owned = self
            .filters
            .iter()
            .flat_map(|f| f.outputs.iter())
            .any(|slot| self.arena.texture(*slot).ptr_eq(texture));
        if owned {
            return Err(BindingError::SelfFeedback {
                pipeline: self.name.clone(),
                port,
            });
        }
        if self.config.format_policy.is_strict() {
            if let Some(expected) = self.input_formats[index] {
                if !expected.is_compatible_with(texture.format()) {
                    return Err(BindingError::FormatMismatch {
                        port,
                        expected,
                        actual: *texture.format(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bind textures to inputs in port order.
    pub fn bind_inputs(&mut self, textures: &[&Texture]) -> BindingResult<()> {
        for (index, texture) in textures.iter().enumerate() {
            self.bind_input_at(index, texture)?;
        }
        Ok(())
    }

    /// Remove the binding of input `port`.
    pub fn unbind_input(&mut self, port: &str) -> BindingResult<()> {
        let index = find_port(&self.inputs, port)
            .map(|(index, _)| index)
            .ok_or_else(|| self.unknown_port(port, PortDirection::Input))?;
        if self.bindings[index].take().is_some() {
            self.invalidate();
            if self.state != PipelineState::Broken {
                self.state = PipelineState::Unbound;
            }
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        if self.validity == OutputValidity::Current {
            self.validity = OutputValidity::Stale;
        }
        if self.state == PipelineState::Executed {
            self.state = PipelineState::Bound;
        }
    }

    fn unknown_port(&self, port: &str, direction: PortDirection) -> BindingError {
        BindingError::UnknownPort {
            pipeline: self.name.clone(),
            port: port.to_string(),
            direction,
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run every filter once, in execution order.
    ///
    /// Work is submitted to the device; reading an output back is the
    /// synchronization point.
    pub fn process(&mut self) -> GlipResult<()> {
        if self.state == PipelineState::Broken {
            return Err(ResourceError::Broken {
                pipeline: self.name.clone(),
            }
            .into());
        }

        let mut external = Vec::with_capacity(self.bindings.len());
        for (port, binding) in self.inputs.iter().zip(&self.bindings) {
            let Some(binding) = binding else {
                return Err(BindingError::UnboundInput {
                    pipeline: self.name.clone(),
                    port: port.name.clone(),
                }
                .into());
            };
            let Some((raw, _)) = binding.get() else {
                return Err(BindingError::ReleasedInput {
                    pipeline: self.name.clone(),
                    port: port.name.clone(),
                }
                .into());
            };
            external.push(raw);
        }

        let start = Instant::now();
        let mut drawn = 0;
        for position in 0..self.order.len() {
            let index = self.order[position];
            let filter = &self.filters[index];
            let Some(framebuffer) = filter.framebuffer else {
                continue;
            };

            let inputs: Vec<RawTexture> = filter
                .inputs
                .iter()
                .map(|input| match *input {
                    ResolvedStream::External { input } => external[input],
                    ResolvedStream::Produced { filter, output } => {
                        self.arena.texture(self.filters[filter].outputs[output]).raw()
                    }
                })
                .collect();
            let format = filter.layout.format();
            let pass = RenderPass {
                program: self.arena.program(filter.program),
                framebuffer: self.arena.framebuffer(framebuffer),
                width: format.width(),
                height: format.height(),
                inputs: &inputs,
                uniforms: &filter.uniforms,
                blending: filter.layout.blending(),
                clearing: filter.layout.clearing(),
                clear_color: self.config.clear_color,
            };
            let mipmapped: Vec<RawTexture> = if format.mip_levels() > 1 {
                filter.outputs.iter().map(|slot| self.arena.texture(*slot).raw()).collect()
            } else {
                Vec::new()
            };

            let result = self.arena.context().with_device(|device| {
                device.draw(&pass)?;
                for raw in &mipmapped {
                    device.generate_mipmaps(*raw)?;
                }
                Ok::<(), ResourceError>(())
            });

            if let Err(e) = result {
                let location = qualify(&self.name, &filter.path);
                let first_run = !filter.drawn;
                // Earlier filters of this run already overwrote their outputs.
                self.invalidate();
                if first_run && self.config.check_first_run {
                    error!("Filter '{}' failed on its first run, pipeline is broken", location);
                    self.state = PipelineState::Broken;
                }
                return Err(GlipError::at(location, e));
            }
            debug!("Drew '{}' ({}x{})", filter.path, format.width(), format.height());
            self.filters[index].drawn = true;
            drawn += 1;
        }

        let elapsed = start.elapsed();
        self.stats.runs += 1;
        self.stats.filters_drawn += drawn;
        self.stats.last_duration = elapsed;
        self.stats.total_duration += elapsed;
        self.state = PipelineState::Executed;
        self.validity = OutputValidity::Current;
        Ok(())
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Texture of boundary output `index`.
    ///
    /// Always available; its content is undefined until the first
    /// `process()` and stale after rebinding, see [`Pipeline::output_validity`].
    pub fn out(&self, index: usize) -> BindingResult<&Texture> {
        let (filter, output) = *self
            .output_sources
            .get(index)
            .ok_or_else(|| self.unknown_port(&index.to_string(), PortDirection::Output))?;
        Ok(self.arena.texture(self.filters[filter].outputs[output]))
    }

    /// Texture of the boundary output named `port`.
    pub fn out_by_name(&self, port: &str) -> BindingResult<&Texture> {
        let index = find_port(&self.outputs, port)
            .map(|(index, _)| index)
            .ok_or_else(|| self.unknown_port(port, PortDirection::Output))?;
        self.out(index)
    }

    /// Texture written by output `port` of the filter at `path`.
    pub fn filter_output(&self, path: &str, port: &str) -> Option<&Texture> {
        let filter = self.filters.iter().find(|f| f.path == path)?;
        let index = filter.layout.output_index(port)?;
        Some(self.arena.texture(filter.outputs[index]))
    }

    pub fn output_validity(&self) -> OutputValidity {
        self.validity
    }

    // ========================================================================
    // Uniforms
    // ========================================================================

    /// Set uniform `name` of the filter at `path` for every later run.
    pub fn set_uniform(&mut self, path: &str, name: &str, value: UniformValue) -> BindingResult<()> {
        let pipeline = &self.name;
        let filter = self
            .filters
            .iter_mut()
            .find(|f| f.path == path)
            .ok_or_else(|| BindingError::UnknownFilter {
                pipeline: pipeline.clone(),
                filter: path.to_string(),
            })?;
        let expected = filter
            .layout
            .uniform_type(name)
            .ok_or_else(|| BindingError::UnknownUniform {
                filter: path.to_string(),
                name: name.to_string(),
            })?;
        if value.uniform_type() != expected {
            return Err(BindingError::UniformTypeMismatch {
                filter: path.to_string(),
                name: name.to_string(),
                expected,
                actual: value.uniform_type(),
            });
        }
        let changed = filter.uniforms.get(name) != Some(&value);
        filter.uniforms.insert(name.to_string(), value);
        if changed {
            self.invalidate();
        }
        Ok(())
    }

    /// Value last set for a uniform. Unset uniforms hold the device default.
    pub fn uniform(&self, path: &str, name: &str) -> Option<&UniformValue> {
        self.filters
            .iter()
            .find(|f| f.path == path)
            .and_then(|f| f.uniforms.get(name))
    }

    /// Snapshot of every uniform set on this pipeline.
    pub fn uniforms(&self) -> UniformSet {
        let mut set = UniformSet::new();
        for filter in &self.filters {
            for (name, value) in &filter.uniforms {
                set.set(filter.path.as_str(), name.as_str(), *value);
            }
        }
        set
    }

    /// Set every uniform of `set`. Stops at the first value that does not
    /// fit this pipeline.
    pub fn apply_uniforms(&mut self, set: &UniformSet) -> BindingResult<()> {
        for (filter, name, value) in set.iter() {
            self.set_uniform(filter, name, *value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the layout this pipeline was built from.
    pub fn layout_name(&self) -> &str {
        &self.layout_name
    }

    pub fn context(&self) -> &Context {
        self.arena.context()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Filter paths in the order `process()` runs them.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.filters[i].path.as_str()).collect()
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("layout", &self.layout_name)
            .field("state", &self.state)
            .field("filters", &self.execution_order())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FormatPolicy;
    use crate::core::error::{ErrorKind, ResourceResult, TextureIoError};
    use crate::core::format::{FilterMode, PixelDepth, PixelMode, WrapMode};
    use crate::core::shader::ShaderSource;
    use crate::gpu::device::{Device, DeviceLimits, RawFramebuffer, RawProgram};
    use crate::gpu::software::{Fragment, SoftwareDevice};
    use std::cell::Cell;
    use std::rc::Rc;

    const COPY: &str = "#version 130\nuniform sampler2D inText;\nout vec4 outText;\nin vec2 texCoord;\nvoid main() { outText = texture(inText, texCoord); }\n";

    const GAIN: &str = "#version 130\nuniform sampler2D inText;\nuniform float gain;\nout vec4 outText;\nin vec2 texCoord;\nvoid main() { outText = gain * texture(inText, texCoord); }\n";

    const LIFE: &str = "#version 130\nuniform sampler2D inText;\nout vec4 outText;\nin vec2 texCoord;\nvoid main()\n{\n    ivec2 p = ivec2(gl_FragCoord.xy);\n    int n = 0;\n    for(int j = -1; j <= 1; j++)\n        for(int i = -1; i <= 1; i++)\n            if(i != 0 || j != 0)\n                n += int(texelFetch(inText, p + ivec2(i, j), 0).r > 0.5);\n    bool alive = texelFetch(inText, p, 0).r > 0.5;\n    outText = vec4((n == 3 || (alive && n == 2)) ? 1.0 : 0.0, 0.0, 0.0, 1.0);\n}\n";

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn copy_kernel(fragment: &Fragment<'_>, out: &mut [[f32; 4]]) {
        out[0] = fragment.sample("inText", fragment.tex_coord());
    }

    fn gain_kernel(fragment: &Fragment<'_>, out: &mut [[f32; 4]]) {
        let gain = fragment.uniform_f32("gain", 0.0);
        let c = fragment.sample("inText", fragment.tex_coord());
        out[0] = [c[0] * gain, c[1] * gain, c[2] * gain, c[3]];
    }

    fn life_kernel(fragment: &Fragment<'_>, out: &mut [[f32; 4]]) {
        let (x, y) = fragment.coord();
        let (w, h) = fragment.size();
        let alive_at = |dx: i64, dy: i64| {
            let u = (x as f32 + dx as f32 + 0.5) / w as f32;
            let v = (y as f32 + dy as f32 + 0.5) / h as f32;
            fragment.sample("inText", [u, v])[0] > 0.5
        };
        let mut neighbors = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) != (0, 0) && alive_at(dx, dy) {
                    neighbors += 1;
                }
            }
        }
        let alive = neighbors == 3 || (alive_at(0, 0) && neighbors == 2);
        out[0] = [if alive { 1.0 } else { 0.0 }, 0.0, 0.0, 1.0];
    }

    fn context() -> Context {
        init_logger();
        Context::new(
            SoftwareDevice::new()
                .with_kernel(COPY, copy_kernel)
                .with_kernel(GAIN, gain_kernel)
                .with_kernel(LIFE, life_kernel),
        )
    }

    fn filter(name: &str, source: &str, format: TextureFormat) -> FilterLayout {
        FilterLayout::new(name, format, ShaderSource::new(source).unwrap()).unwrap()
    }

    fn single(source: &str, format: TextureFormat) -> PipelineLayout {
        let mut layout = PipelineLayout::new("Single");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        layout.add(filter("F", source, format), "F").unwrap();
        layout.connect_to_input("In", "F", "inText").unwrap();
        layout.connect_to_output("F", "outText", "Out").unwrap();
        layout
    }

    #[test]
    fn test_copy_white() {
        let context = context();
        let format = TextureFormat::rgba8(2, 2);
        let mut pipeline = Pipeline::new(&context, &single(COPY, format), "Copy").unwrap();
        assert_eq!(pipeline.state(), PipelineState::Unbound);
        assert_eq!(pipeline.output_validity(), OutputValidity::Undefined);

        let input = Texture::with_data(&context, format, &[255u8; 16]).unwrap();
        pipeline.bind_input("In", &input).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Bound);
        pipeline.process().unwrap();

        assert_eq!(pipeline.state(), PipelineState::Executed);
        assert_eq!(pipeline.output_validity(), OutputValidity::Current);
        assert_eq!(pipeline.out(0).unwrap().read().unwrap(), vec![255u8; 16]);
        assert_eq!(pipeline.out_by_name("Out").unwrap().format(), &format);
        assert_eq!(pipeline.stats().runs, 1);
        assert_eq!(pipeline.stats().filters_drawn, 1);
    }

    #[test]
    fn test_unbound_and_released_inputs() {
        let context = context();
        let format = TextureFormat::rgba8(2, 2);
        let mut pipeline = Pipeline::new(&context, &single(COPY, format), "Copy").unwrap();

        let err = pipeline.process().unwrap_err();
        assert!(matches!(err, GlipError::Binding(BindingError::UnboundInput { .. })));
        assert!(!err.is_fatal());

        let input = Texture::new(&context, format).unwrap();
        pipeline.bind_input("In", &input).unwrap();
        drop(input);
        assert!(matches!(
            pipeline.process(),
            Err(GlipError::Binding(BindingError::ReleasedInput { .. }))
        ));

        let input = Texture::new(&context, format).unwrap();
        pipeline.bind_inputs(&[&input]).unwrap();
        pipeline.process().unwrap();

        pipeline.unbind_input("In").unwrap();
        assert_eq!(pipeline.state(), PipelineState::Unbound);
        assert!(matches!(
            pipeline.bind_input("Missing", &input),
            Err(BindingError::UnknownPort { .. })
        ));
    }

    #[test]
    fn test_rebinding_makes_outputs_stale() {
        let context = context();
        let format = TextureFormat::rgba8(1, 1);
        let mut pipeline = Pipeline::new(&context, &single(COPY, format), "Copy").unwrap();
        let a = Texture::with_data(&context, format, &[1, 2, 3, 4]).unwrap();
        let b = Texture::with_data(&context, format, &[5, 6, 7, 8]).unwrap();

        pipeline.bind_input("In", &a).unwrap();
        pipeline.process().unwrap();
        pipeline.bind_input("In", &a).unwrap();
        assert_eq!(pipeline.output_validity(), OutputValidity::Current);

        pipeline.bind_input("In", &b).unwrap();
        assert_eq!(pipeline.output_validity(), OutputValidity::Stale);
        assert_eq!(pipeline.state(), PipelineState::Bound);
        assert_eq!(pipeline.out(0).unwrap().read().unwrap(), vec![1, 2, 3, 4]);

        pipeline.process().unwrap();
        assert_eq!(pipeline.out(0).unwrap().read().unwrap(), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_bind_format_policy() {
        let context = context();
        let format = TextureFormat::rgba8(2, 2);
        let mut layout = PipelineLayout::new("P");
        layout.add_input_with_format("In", format).unwrap();
        layout.add_output("Out").unwrap();
        layout.add(filter("F", COPY, format), "F").unwrap();
        layout.connect_to_input("In", "F", "inText").unwrap();
        layout.connect_to_output("F", "outText", "Out").unwrap();

        let wrong = Texture::new(&context, TextureFormat::new(2, 2, PixelMode::Red, PixelDepth::F32)).unwrap();
        let mut strict = Pipeline::new(&context, &layout, "Strict").unwrap();
        assert!(matches!(
            strict.bind_input("In", &wrong),
            Err(BindingError::FormatMismatch { .. })
        ));

        let config = GlipConfig::default().with_format_policy(FormatPolicy::Permissive);
        let mut permissive = Pipeline::with_config(&context, &layout, "Permissive", config).unwrap();
        permissive.bind_input("In", &wrong).unwrap();
        permissive.process().unwrap();
    }

    #[test]
    fn test_self_feedback_and_context_mismatch() {
        let context = context();
        let format = TextureFormat::rgba8(2, 2);
        let mut pipeline = Pipeline::new(&context, &single(COPY, format), "Copy").unwrap();

        assert!(matches!(
            pipeline.check_binding(0, pipeline.out(0).unwrap()),
            Err(BindingError::SelfFeedback { .. })
        ));

        let other = Context::software();
        let foreign = Texture::new(&other, format).unwrap();
        assert!(matches!(
            pipeline.bind_input("In", &foreign),
            Err(BindingError::ContextMismatch { .. })
        ));
    }

    #[test]
    fn test_independent_instances_and_idempotence() {
        let context = context();
        let format = TextureFormat::new(2, 1, PixelMode::Rgba, PixelDepth::U8);
        let layout = single(GAIN, format);
        let mut first = Pipeline::new(&context, &layout, "First").unwrap();
        let mut second = Pipeline::new(&context, &layout, "Second").unwrap();

        let input = Texture::with_data(&context, format, &[100, 100, 100, 255, 200, 200, 200, 255]).unwrap();
        first.bind_input("In", &input).unwrap();
        second.bind_input("In", &input).unwrap();
        first.set_uniform("F", "gain", UniformValue::Float(0.5)).unwrap();
        second.set_uniform("F", "gain", UniformValue::Float(1.0)).unwrap();

        first.process().unwrap();
        second.process().unwrap();
        let once = first.out(0).unwrap().read().unwrap();
        first.process().unwrap();
        assert_eq!(first.out(0).unwrap().read().unwrap(), once);
        assert_eq!(once, vec![50, 50, 50, 255, 100, 100, 100, 255]);
        assert_eq!(
            second.out(0).unwrap().read().unwrap(),
            vec![100, 100, 100, 255, 200, 200, 200, 255]
        );
        assert!(!first.out(0).unwrap().ptr_eq(second.out(0).unwrap()));
    }

    #[test]
    fn test_uniform_errors_and_snapshot() {
        let context = context();
        let layout = single(GAIN, TextureFormat::rgba8(1, 1));
        let mut pipeline = Pipeline::new(&context, &layout, "P").unwrap();

        assert!(matches!(
            pipeline.set_uniform("G", "gain", UniformValue::Float(1.0)),
            Err(BindingError::UnknownFilter { .. })
        ));
        assert!(matches!(
            pipeline.set_uniform("F", "bias", UniformValue::Float(1.0)),
            Err(BindingError::UnknownUniform { .. })
        ));
        assert!(matches!(
            pipeline.set_uniform("F", "gain", UniformValue::Int(1)),
            Err(BindingError::UniformTypeMismatch { .. })
        ));

        pipeline.set_uniform("F", "gain", UniformValue::Float(2.0)).unwrap();
        let snapshot = pipeline.uniforms();
        assert_eq!(snapshot.len(), 1);

        let mut other = Pipeline::new(&context, &layout, "Other").unwrap();
        assert!(other.uniform("F", "gain").is_none());
        other.apply_uniforms(&UniformSet::from_json(&snapshot.to_json().unwrap()).unwrap()).unwrap();
        assert_eq!(other.uniform("F", "gain"), Some(&UniformValue::Float(2.0)));
    }

    #[test]
    fn test_missing_kernel_is_instantiation_error() {
        let context = Context::software();
        let err = Pipeline::new(&context, &single(COPY, TextureFormat::rgba8(2, 2)), "Main").unwrap_err();
        match &err {
            GlipError::Instantiation { location, .. } => assert_eq!(location, "Main::F"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(matches!(err.root_cause(), GlipError::Resource(ResourceError::Compile { .. })));
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let context = context();
        let mut layout = PipelineLayout::new("P");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        layout.add(filter("F", COPY, TextureFormat::rgba8(2, 2)), "F").unwrap();
        layout.connect_to_output("F", "outText", "Out").unwrap();

        let err = Pipeline::new(&context, &layout, "P").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(matches!(
            err.root_cause(),
            GlipError::Layout(LayoutError::Invalid { errors, .. })
                if matches!(errors[0], LayoutError::UnconnectedInput { .. })
        ));

        let big = single(COPY, TextureFormat::rgba8(8192, 2));
        let err = Pipeline::new(&context, &big, "Big").unwrap_err();
        assert!(matches!(
            err.root_cause(),
            GlipError::Layout(LayoutError::Invalid { errors, .. })
                if matches!(errors[0], LayoutError::ExceedsLimits { .. })
        ));
    }

    #[test]
    fn test_nested_pipeline_order() {
        let context = context();
        let format = TextureFormat::new(1, 1, PixelMode::Red, PixelDepth::F32);
        let mut inner = PipelineLayout::new("Inner");
        inner.add_input("In").unwrap();
        inner.add_output("Out").unwrap();
        inner.add(filter("Gain", GAIN, format), "Second").unwrap();
        inner.add(filter("Gain", GAIN, format), "First").unwrap();
        inner.connect_to_input("In", "First", "inText").unwrap();
        inner.connect("First", "outText", "Second", "inText").unwrap();
        inner.connect_to_output("Second", "outText", "Out").unwrap();

        let mut outer = PipelineLayout::new("Outer");
        outer.add_input("In").unwrap();
        outer.add_output("Out").unwrap();
        outer.add_output("Raw").unwrap();
        outer.add(inner, "Sub").unwrap();
        outer.add(filter("Copy", COPY, format), "Head").unwrap();
        outer.connect_to_input("In", "Head", "inText").unwrap();
        outer.connect("Head", "outText", "Sub", "In").unwrap();
        outer.connect_to_output("Sub", "Out", "Out").unwrap();
        outer.connect_to_output("Head", "outText", "Raw").unwrap();

        let mut pipeline = Pipeline::new(&context, &outer, "Main").unwrap();
        assert_eq!(pipeline.execution_order(), vec!["Head", "Sub::First", "Sub::Second"]);
        assert_eq!(pipeline.filter_count(), 3);

        let input = Texture::with_data(&context, format, &1.5f32.to_le_bytes()).unwrap();
        pipeline.bind_input("In", &input).unwrap();
        pipeline.set_uniform("Sub::First", "gain", UniformValue::Float(2.0)).unwrap();
        pipeline.set_uniform("Sub::Second", "gain", UniformValue::Float(3.0)).unwrap();
        pipeline.process().unwrap();

        let out = pipeline.out_by_name("Out").unwrap().read().unwrap();
        assert_eq!(f32::from_le_bytes([out[0], out[1], out[2], out[3]]), 9.0);
        let raw = pipeline.out_by_name("Raw").unwrap().read().unwrap();
        assert_eq!(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), 1.5);
        assert!(pipeline.filter_output("Sub::First", "outText").is_some());

        let again = Pipeline::new(&context, &outer, "Again").unwrap();
        assert_eq!(again.execution_order(), pipeline.execution_order());
    }

    fn life_step(cells: &[u8], width: usize, height: usize) -> Vec<u8> {
        let mut next = vec![0u8; cells.len()];
        for y in 0..height {
            for x in 0..width {
                let mut neighbors = 0;
                for dy in [height - 1, 0, 1] {
                    for dx in [width - 1, 0, 1] {
                        if (dx, dy) == (0, 0) {
                            continue;
                        }
                        let nx = (x + dx) % width;
                        let ny = (y + dy) % height;
                        neighbors += (cells[ny * width + nx] > 0) as u32;
                    }
                }
                let alive = cells[y * width + x] > 0;
                next[y * width + x] = (neighbors == 3 || (alive && neighbors == 2)) as u8;
            }
        }
        next
    }

    #[test]
    fn test_game_of_life_ping_pong() {
        let context = context();
        let (width, height) = (16usize, 12usize);
        let format = TextureFormat::new(width as u32, height as u32, PixelMode::Rgb, PixelDepth::U8)
            .with_filter(FilterMode::Nearest)
            .with_wrap(WrapMode::Repeat);

        let mut layout = PipelineLayout::new("GameOfLife");
        layout.add_input("Input").unwrap();
        layout.add_output("Output").unwrap();
        layout.add(filter("GameOfLife", LIFE, format), "GameOfLife_1").unwrap();
        layout.add(filter("GameOfLife", LIFE, format), "GameOfLife_2").unwrap();
        layout.connect_to_input("Input", "GameOfLife_1", "inText").unwrap();
        layout.connect("GameOfLife_1", "outText", "GameOfLife_2", "inText").unwrap();
        layout.connect_to_output("GameOfLife_2", "outText", "Output").unwrap();

        let mut seed = 0x2545_f491u32;
        let mut cells: Vec<u8> = (0..width * height)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((seed >> 16) % 3 == 0) as u8
            })
            .collect();
        let pixels: Vec<u8> = cells.iter().flat_map(|&c| [c * 255, 0, 0]).collect();
        let initial = Texture::with_data(&context, format, &pixels).unwrap();

        let mut ping = Pipeline::new(&context, &layout, "Ping").unwrap();
        let mut pong = Pipeline::new(&context, &layout, "Pong").unwrap();
        ping.bind_input("Input", &initial).unwrap();
        ping.process().unwrap();
        cells = life_step(&life_step(&cells, width, height), width, height);

        for step in 0..6 {
            let (source, target) = if step % 2 == 0 {
                (&ping, &mut pong)
            } else {
                (&pong, &mut ping)
            };
            let previous = source.out(0).unwrap().read().unwrap();
            let observed: Vec<u8> = previous.chunks_exact(3).map(|p| (p[0] > 127) as u8).collect();
            assert_eq!(observed, cells, "mismatch before step {}", step);

            target.bind_input("Input", source.out(0).unwrap()).unwrap();
            target.process().unwrap();
            cells = life_step(&life_step(&cells, width, height), width, height);
        }
    }

    /// Device whose draws fail on demand.
    struct FlakyDevice {
        inner: SoftwareDevice,
        fail: Rc<Cell<bool>>,
    }

    impl Device for FlakyDevice {
        fn name(&self) -> &str {
            "flaky"
        }
        fn limits(&self) -> DeviceLimits {
            self.inner.limits()
        }
        fn create_texture(&mut self, format: &TextureFormat) -> ResourceResult<RawTexture> {
            self.inner.create_texture(format)
        }
        fn write_texture(&mut self, t: RawTexture, f: &TextureFormat, d: &[u8]) -> Result<(), TextureIoError> {
            self.inner.write_texture(t, f, d)
        }
        fn read_texture(&mut self, t: RawTexture, f: &TextureFormat) -> Result<Vec<u8>, TextureIoError> {
            self.inner.read_texture(t, f)
        }
        fn delete_texture(&mut self, t: RawTexture) {
            self.inner.delete_texture(t)
        }
        fn compile_program(&mut self, source: &ProgramSource<'_>) -> ResourceResult<RawProgram> {
            self.inner.compile_program(source)
        }
        fn delete_program(&mut self, p: RawProgram) {
            self.inner.delete_program(p)
        }
        fn create_framebuffer(&mut self, targets: &[RawTexture]) -> ResourceResult<RawFramebuffer> {
            self.inner.create_framebuffer(targets)
        }
        fn delete_framebuffer(&mut self, f: RawFramebuffer) {
            self.inner.delete_framebuffer(f)
        }
        fn draw(&mut self, pass: &RenderPass<'_>) -> ResourceResult<()> {
            if self.fail.get() {
                return Err(ResourceError::Device("GL_OUT_OF_MEMORY".to_string()));
            }
            self.inner.draw(pass)
        }
        fn generate_mipmaps(&mut self, t: RawTexture) -> ResourceResult<()> {
            self.inner.generate_mipmaps(t)
        }
        fn finish(&mut self) {}
    }

    #[test]
    fn test_first_run_failure_breaks_pipeline() {
        init_logger();
        let fail = Rc::new(Cell::new(true));
        let context = Context::new(FlakyDevice {
            inner: SoftwareDevice::new().with_kernel(COPY, copy_kernel),
            fail: Rc::clone(&fail),
        });
        let format = TextureFormat::rgba8(1, 1);
        let layout = single(COPY, format);
        let input = Texture::new(&context, format).unwrap();

        let mut broken = Pipeline::new(&context, &layout, "Broken").unwrap();
        broken.bind_input("In", &input).unwrap();
        assert!(broken.process().unwrap_err().is_fatal());
        assert_eq!(broken.state(), PipelineState::Broken);
        fail.set(false);
        assert!(matches!(
            broken.process(),
            Err(GlipError::Resource(ResourceError::Broken { .. }))
        ));

        let mut healthy = Pipeline::new(&context, &layout, "Healthy").unwrap();
        healthy.bind_input("In", &input).unwrap();
        healthy.process().unwrap();
        fail.set(true);
        assert!(healthy.process().is_err());
        assert_ne!(healthy.state(), PipelineState::Broken);
        fail.set(false);
        healthy.process().unwrap();
    }

    #[test]
    fn test_failed_run_leaves_outputs_stale() {
        init_logger();
        let fail = Rc::new(Cell::new(false));
        let context = Context::new(FlakyDevice {
            inner: SoftwareDevice::new().with_kernel(COPY, copy_kernel),
            fail: Rc::clone(&fail),
        });
        let format = TextureFormat::rgba8(1, 1);
        let mut pipeline = Pipeline::new(&context, &single(COPY, format), "P").unwrap();
        let input = Texture::new(&context, format).unwrap();
        pipeline.bind_input("In", &input).unwrap();
        pipeline.process().unwrap();
        assert_eq!(pipeline.output_validity(), OutputValidity::Current);
        assert_eq!(pipeline.state(), PipelineState::Executed);

        fail.set(true);
        assert!(pipeline.process().is_err());
        assert_eq!(pipeline.output_validity(), OutputValidity::Stale);
        assert_eq!(pipeline.state(), PipelineState::Bound);
        assert_eq!(pipeline.stats().runs, 1);

        fail.set(false);
        pipeline.process().unwrap();
        assert_eq!(pipeline.output_validity(), OutputValidity::Current);
    }

    #[test]
    fn test_sink_filter_is_not_drawn() {
        init_logger();
        let sink_source = "uniform sampler2D inText;\nvoid main() {}\n";
        let context = Context::new(
            SoftwareDevice::new()
                .with_kernel(COPY, copy_kernel)
                .with_kernel(sink_source, |_: &Fragment<'_>, _: &mut [[f32; 4]]| {}),
        );
        let format = TextureFormat::rgba8(1, 1);
        let sink = FilterLayout::builder("Probe", format, ShaderSource::new(sink_source).unwrap())
            .sink()
            .build()
            .unwrap();

        let mut layout = single(COPY, format);
        layout.add(sink, "Probe").unwrap();
        layout.connect("F", "outText", "Probe", "inText").unwrap();

        let mut pipeline = Pipeline::new(&context, &layout, "P").unwrap();
        let input = Texture::new(&context, format).unwrap();
        pipeline.bind_input("In", &input).unwrap();
        pipeline.process().unwrap();
        assert_eq!(pipeline.execution_order(), vec!["F", "Probe"]);
        assert_eq!(pipeline.stats().filters_drawn, 1);
    }
}
