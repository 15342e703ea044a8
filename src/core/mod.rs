//! Core types shared by every layer of the crate.
//!
//! This module contains:
//! - Texture formats and pixel encodings
//! - Shader sources and the ports they declare
//! - Uniform types and values
//! - Error types and validation reports
//! - Runtime configuration

pub mod config;
pub mod error;
pub mod format;
pub mod port;
pub mod shader;
pub mod uniform;

// Re-export commonly used types
pub use config::{FormatPolicy, GlipConfig};
pub use error::{
    BindingError, GlipError, GlipResult, LayoutError, ParseError, ResourceError, StreamError,
    TextureIoError, ValidationReport, ValidationWarning,
};
pub use format::{FilterMode, PixelDepth, PixelMode, TextureFormat, WrapMode};
pub use port::{Port, PortDirection};
pub use shader::{ShaderSource, UniformDeclaration};
pub use uniform::{UniformSet, UniformType, UniformValue};
