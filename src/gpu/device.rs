//! The device abstraction every GPU object goes through.

use crate::core::error::{ResourceResult, TextureIoError};
use crate::core::format::TextureFormat;
use crate::core::shader::ShaderSource;
use crate::core::uniform::UniformValue;
use indexmap::IndexMap;

/// Device-side texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTexture(pub(crate) u64);

/// Device-side framebuffer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawFramebuffer(pub(crate) u64);

/// Device-side program name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawProgram(pub(crate) u64);

/// Capabilities queried from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest texture width or height.
    pub max_texture_size: u32,
    /// Samplers usable by one program.
    pub max_texture_units: u32,
    /// Render targets attachable to one framebuffer.
    pub max_color_attachments: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            max_texture_units: 16,
            max_color_attachments: 8,
        }
    }
}

/// Everything needed to build a filter program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub vertex: &'a ShaderSource,
    pub fragment: &'a ShaderSource,
    /// Sampler names; sampler `i` reads texture unit `i`.
    pub samplers: &'a [String],
    /// Output names; output `i` writes color attachment `i`.
    pub outputs: &'a [String],
    /// The fragment shader writes `gl_FragColor`.
    pub compatibility: bool,
}

/// One draw of a full-screen quad.
#[derive(Debug, Clone, Copy)]
pub struct RenderPass<'a> {
    pub program: RawProgram,
    pub framebuffer: RawFramebuffer,
    pub width: u32,
    pub height: u32,
    /// Textures in sampler order.
    pub inputs: &'a [RawTexture],
    pub uniforms: &'a IndexMap<String, UniformValue>,
    /// Add fragment results to the existing content.
    pub blending: bool,
    /// Fill targets with `clear_color` before drawing.
    pub clearing: bool,
    pub clear_color: [f32; 4],
}

/// A graphics device able to run filter programs.
///
/// All calls happen on the thread that owns the device. Objects passed back
/// in were created by the same device.
pub trait Device {
    /// Human-readable device name.
    fn name(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    /// Allocate storage for a texture. Content is undefined.
    fn create_texture(&mut self, format: &TextureFormat) -> ResourceResult<RawTexture>;

    /// Upload a tightly packed host buffer of `format.size_in_bytes()` bytes.
    fn write_texture(
        &mut self,
        texture: RawTexture,
        format: &TextureFormat,
        data: &[u8],
    ) -> Result<(), TextureIoError>;

    /// Download the base level as a tightly packed host buffer.
    fn read_texture(
        &mut self,
        texture: RawTexture,
        format: &TextureFormat,
    ) -> Result<Vec<u8>, TextureIoError>;

    fn delete_texture(&mut self, texture: RawTexture);

    /// Compile and link a filter program.
    fn compile_program(&mut self, source: &ProgramSource<'_>) -> ResourceResult<RawProgram>;

    fn delete_program(&mut self, program: RawProgram);

    /// Build a framebuffer rendering into `targets`, attachment `i` being
    /// `targets[i]`. All targets must have the same size.
    fn create_framebuffer(&mut self, targets: &[RawTexture]) -> ResourceResult<RawFramebuffer>;

    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer);

    fn draw(&mut self, pass: &RenderPass<'_>) -> ResourceResult<()>;

    /// Rebuild the mipmap chain from the base level.
    fn generate_mipmaps(&mut self, texture: RawTexture) -> ResourceResult<()>;

    /// Block until submitted work is complete.
    fn finish(&mut self);
}
