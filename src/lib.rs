//! # Glip - GPU image processing pipelines
//!
//! Glip composes GLSL fragment shaders into reusable processing graphs that
//! run on the GPU.
//!
//! ## Features
//!
//! - **Shader-defined filters**: input ports, output ports and uniform
//!   variables are read from the fragment shader source
//! - **Hierarchical layouts**: pipelines can contain filters and other
//!   pipelines, addressed with `"Sub::Filter"` paths
//! - **Eager checks**: wiring errors are reported when the layout is built,
//!   not when it runs
//! - **Ahead-of-time allocation**: an instance compiles every program and
//!   allocates every texture once; processing only binds and draws
//! - **Software device**: a CPU device running Rust kernels, for tests and
//!   headless use
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use glip::prelude::*;
//!
//! let context = Context::new(GlDevice::new(gl)?);
//! let format = TextureFormat::rgba8(640, 480);
//!
//! let blur = FilterLayout::new("Blur", format, ShaderSource::from_file("blur.glsl")?)?;
//!
//! let mut layout = PipelineLayout::new("Smooth");
//! layout.add_input("Image")?;
//! layout.add_output("Result")?;
//! layout.add(blur, "Blur")?;
//! layout.connect_to_input("Image", "Blur", "inText")?;
//! layout.connect_to_output("Blur", "outText", "Result")?;
//!
//! let mut pipeline = Pipeline::new(&context, &layout, "Main")?;
//! let image = Texture::with_data(&context, format, &pixels)?;
//! pipeline.bind_input("Image", &image)?;
//! pipeline.set_uniform("Blur", "radius", UniformValue::Float(2.0))?;
//! pipeline.process()?;
//! let result = pipeline.out(0)?.read()?;
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`core`]: formats, shader parsing, uniforms, errors and configuration
//! - [`gpu`]: the device abstraction, contexts and owned GPU objects
//! - [`layout`]: filter and pipeline layouts, topology and serialization
//! - [`validation`]: multi-stage layout validation
//! - [`execution`]: pipeline instances and stream resolution

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod gpu;
pub mod layout;
pub mod validation;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use glip::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::config::{FormatPolicy, GlipConfig};
    pub use crate::core::format::{FilterMode, PixelDepth, PixelMode, TextureFormat, WrapMode};
    pub use crate::core::port::{Port, PortDirection};
    pub use crate::core::shader::{ShaderSource, UniformDeclaration};
    pub use crate::core::uniform::{UniformSet, UniformType, UniformValue};

    // Errors
    pub use crate::core::error::{
        BindingError, ErrorKind, GlipError, GlipResult, LayoutError, ParseError, ResourceError,
        StreamError, TextureIoError, ValidationReport, ValidationWarning,
    };

    // GPU
    pub use crate::gpu::context::Context;
    pub use crate::gpu::device::{Device, DeviceLimits};
    #[cfg(feature = "gl")]
    pub use crate::gpu::gl::GlDevice;
    pub use crate::gpu::resources::Texture;
    pub use crate::gpu::software::{Fragment, SoftwareDevice};

    // Layouts
    pub use crate::layout::connection::{Connection, ElementRef, Endpoint, THIS};
    pub use crate::layout::filter::{FilterLayout, FilterLayoutBuilder};
    pub use crate::layout::pipeline::{ElementLayout, PipelineLayout};
    pub use crate::layout::serialization::SerializedLayout;
    pub use crate::layout::topology::TopologyAnalyzer;

    // Validation
    pub use crate::validation::pipeline::ValidationPipeline;
    pub use crate::validation::stages::ValidationStage;

    // Execution
    pub use crate::execution::pipeline::{ExecutionStats, OutputValidity, Pipeline, PipelineState};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
