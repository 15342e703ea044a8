//! OpenGL 3 / GLES 3 device on top of `glow`.

use crate::core::error::{ResourceError, ResourceResult, TextureIoError};
use crate::core::format::{FilterMode, PixelDepth, PixelMode, TextureFormat, WrapMode};
use crate::core::shader::ShaderSource;
use crate::core::uniform::UniformValue;
use crate::gpu::device::{
    Device, DeviceLimits, ProgramSource, RawFramebuffer, RawProgram, RawTexture, RenderPass,
};
use glow::HasContext;
use log::{debug, warn};
use std::collections::HashMap;

/// Attribute slot of the quad corner position.
pub const VERTEX_POSITION_ATTRIBUTE: u32 = 0;
/// Attribute slot of the quad texture coordinate.
pub const VERTEX_TEX_COORD_ATTRIBUTE: u32 = 1;

/// Full-screen quad as a triangle strip: position, texture coordinate.
const QUAD: [[f32; 4]; 4] = [
    [-1.0, -1.0, 0.0, 0.0],
    [1.0, -1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0, 1.0],
];

/// A [`Device`] driving an OpenGL context.
pub struct GlDevice {
    gl: glow::Context,
    name: String,
    limits: DeviceLimits,
    textures: HashMap<u64, glow::NativeTexture>,
    framebuffers: HashMap<u64, glow::NativeFramebuffer>,
    programs: HashMap<u64, glow::NativeProgram>,
    vertex_array: glow::NativeVertexArray,
    vertex_buffer: glow::NativeBuffer,
    next_id: u64,
}

impl GlDevice {
    /// Take over a GL context.
    ///
    /// # Safety
    ///
    /// The context must be current on the calling thread for the whole
    /// lifetime of the device, and must support OpenGL 3.0 or GLES 3.0.
    pub unsafe fn new(gl: glow::Context) -> ResourceResult<Self> {
        let renderer = gl.get_parameter_string(glow::RENDERER);
        let version = gl.get_parameter_string(glow::VERSION);
        let limits = DeviceLimits {
            max_texture_size: gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(1) as u32,
            max_texture_units: gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS).max(1) as u32,
            max_color_attachments: gl.get_parameter_i32(glow::MAX_COLOR_ATTACHMENTS).max(1) as u32,
        };

        let vertex_array = gl.create_vertex_array().map_err(allocation("vertex array"))?;
        let vertex_buffer = gl.create_buffer().map_err(allocation("vertex buffer"))?;
        gl.bind_vertex_array(Some(vertex_array));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&QUAD),
            glow::STATIC_DRAW,
        );
        let stride = std::mem::size_of::<[f32; 4]>() as i32;
        gl.enable_vertex_attrib_array(VERTEX_POSITION_ATTRIBUTE);
        gl.vertex_attrib_pointer_f32(VERTEX_POSITION_ATTRIBUTE, 2, glow::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(VERTEX_TEX_COORD_ATTRIBUTE);
        gl.vertex_attrib_pointer_f32(VERTEX_TEX_COORD_ATTRIBUTE, 2, glow::FLOAT, false, stride, 8);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        gl.bind_vertex_array(None);

        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);

        debug!("GL device '{}' ({}), {:?}", renderer, version, limits);
        Ok(Self {
            gl,
            name: renderer,
            limits,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            vertex_array,
            vertex_buffer,
            next_id: 1,
        })
    }

    /// The wrapped context.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, texture: RawTexture) -> ResourceResult<glow::NativeTexture> {
        self.textures
            .get(&texture.0)
            .copied()
            .ok_or_else(|| ResourceError::Device(format!("unknown texture {}", texture.0)))
    }

    /// Report and clear the pending GL error.
    unsafe fn check_error(&self, operation: &str) -> ResourceResult<()> {
        match self.gl.get_error() {
            glow::NO_ERROR => Ok(()),
            code => Err(ResourceError::Device(format!(
                "{} failed with GL error 0x{:04x}",
                operation, code
            ))),
        }
    }

    unsafe fn compile_shader(&self, kind: u32, source: &ShaderSource) -> ResourceResult<glow::NativeShader> {
        let shader = self.gl.create_shader(kind).map_err(allocation("shader"))?;
        self.gl.shader_source(shader, source.source());
        self.gl.compile_shader(shader);
        if !self.gl.get_shader_compile_status(shader) {
            let log = self.gl.get_shader_info_log(shader);
            self.gl.delete_shader(shader);
            return Err(ResourceError::Compile {
                shader: source.name().to_string(),
                log: source.annotate_log(&log),
            });
        }
        Ok(shader)
    }

    unsafe fn set_uniform(&self, program: glow::NativeProgram, name: &str, value: &UniformValue) {
        let gl = &self.gl;
        let Some(location) = gl.get_uniform_location(program, name) else {
            return;
        };
        let location = Some(&location);
        match value {
            UniformValue::Float(v) => gl.uniform_1_f32(location, *v),
            UniformValue::Vec2(v) => gl.uniform_2_f32_slice(location, v),
            UniformValue::Vec3(v) => gl.uniform_3_f32_slice(location, v),
            UniformValue::Vec4(v) => gl.uniform_4_f32_slice(location, v),
            UniformValue::Int(v) => gl.uniform_1_i32(location, *v),
            UniformValue::IVec2(v) => gl.uniform_2_i32_slice(location, v),
            UniformValue::IVec3(v) => gl.uniform_3_i32_slice(location, v),
            UniformValue::IVec4(v) => gl.uniform_4_i32_slice(location, v),
            UniformValue::UInt(v) => gl.uniform_1_u32(location, *v),
            UniformValue::UVec2(v) => gl.uniform_2_u32_slice(location, v),
            UniformValue::UVec3(v) => gl.uniform_3_u32_slice(location, v),
            UniformValue::UVec4(v) => gl.uniform_4_u32_slice(location, v),
            UniformValue::Bool(v) => gl.uniform_1_i32(location, *v as i32),
            UniformValue::BVec2(v) => gl.uniform_2_i32(location, v[0] as i32, v[1] as i32),
            UniformValue::BVec3(v) => {
                gl.uniform_3_i32(location, v[0] as i32, v[1] as i32, v[2] as i32)
            }
            UniformValue::BVec4(v) => gl.uniform_4_i32(
                location,
                v[0] as i32,
                v[1] as i32,
                v[2] as i32,
                v[3] as i32,
            ),
            UniformValue::Mat2(v) => gl.uniform_matrix_2_f32_slice(location, false, v),
            UniformValue::Mat3(v) => gl.uniform_matrix_3_f32_slice(location, false, v),
            UniformValue::Mat4(v) => gl.uniform_matrix_4_f32_slice(location, false, v),
        }
    }
}

fn allocation(what: &'static str) -> impl Fn(String) -> ResourceError {
    move |reason| ResourceError::Allocation {
        what: what.to_string(),
        reason,
    }
}

/// Internal format, pixel format and component type.
fn gl_format(mode: PixelMode, depth: PixelDepth) -> (u32, u32, u32) {
    let pixel = match mode {
        PixelMode::Red => glow::RED,
        PixelMode::Rg => glow::RG,
        PixelMode::Rgb => glow::RGB,
        PixelMode::Rgba => glow::RGBA,
    };
    let (internal, ty) = match (mode, depth) {
        (PixelMode::Red, PixelDepth::U8) => (glow::R8, glow::UNSIGNED_BYTE),
        (PixelMode::Rg, PixelDepth::U8) => (glow::RG8, glow::UNSIGNED_BYTE),
        (PixelMode::Rgb, PixelDepth::U8) => (glow::RGB8, glow::UNSIGNED_BYTE),
        (PixelMode::Rgba, PixelDepth::U8) => (glow::RGBA8, glow::UNSIGNED_BYTE),
        (PixelMode::Red, PixelDepth::I8) => (glow::R8_SNORM, glow::BYTE),
        (PixelMode::Rg, PixelDepth::I8) => (glow::RG8_SNORM, glow::BYTE),
        (PixelMode::Rgb, PixelDepth::I8) => (glow::RGB8_SNORM, glow::BYTE),
        (PixelMode::Rgba, PixelDepth::I8) => (glow::RGBA8_SNORM, glow::BYTE),
        (PixelMode::Red, PixelDepth::U16) => (glow::R16, glow::UNSIGNED_SHORT),
        (PixelMode::Rg, PixelDepth::U16) => (glow::RG16, glow::UNSIGNED_SHORT),
        (PixelMode::Rgb, PixelDepth::U16) => (glow::RGB16, glow::UNSIGNED_SHORT),
        (PixelMode::Rgba, PixelDepth::U16) => (glow::RGBA16, glow::UNSIGNED_SHORT),
        (PixelMode::Red, PixelDepth::I16) => (glow::R16_SNORM, glow::SHORT),
        (PixelMode::Rg, PixelDepth::I16) => (glow::RG16_SNORM, glow::SHORT),
        (PixelMode::Rgb, PixelDepth::I16) => (glow::RGB16_SNORM, glow::SHORT),
        (PixelMode::Rgba, PixelDepth::I16) => (glow::RGBA16_SNORM, glow::SHORT),
        (PixelMode::Red, PixelDepth::F16) => (glow::R16F, glow::HALF_FLOAT),
        (PixelMode::Rg, PixelDepth::F16) => (glow::RG16F, glow::HALF_FLOAT),
        (PixelMode::Rgb, PixelDepth::F16) => (glow::RGB16F, glow::HALF_FLOAT),
        (PixelMode::Rgba, PixelDepth::F16) => (glow::RGBA16F, glow::HALF_FLOAT),
        (PixelMode::Red, PixelDepth::F32) => (glow::R32F, glow::FLOAT),
        (PixelMode::Rg, PixelDepth::F32) => (glow::RG32F, glow::FLOAT),
        (PixelMode::Rgb, PixelDepth::F32) => (glow::RGB32F, glow::FLOAT),
        (PixelMode::Rgba, PixelDepth::F32) => (glow::RGBA32F, glow::FLOAT),
    };
    (internal, pixel, ty)
}

fn gl_filter(filter: FilterMode, mipmapped: bool) -> i32 {
    let value = match (filter, mipmapped) {
        (FilterMode::Nearest, false) => glow::NEAREST,
        (FilterMode::Linear, false) => glow::LINEAR,
        (FilterMode::Nearest, true) => glow::NEAREST_MIPMAP_NEAREST,
        (FilterMode::Linear, true) => glow::LINEAR_MIPMAP_LINEAR,
    };
    value as i32
}

fn gl_wrap(wrap: WrapMode) -> i32 {
    let value = match wrap {
        WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        WrapMode::Repeat => glow::REPEAT,
        WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
    };
    value as i32
}

fn framebuffer_status(status: u32) -> String {
    match status {
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "incomplete attachment".to_string(),
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => "missing attachment".to_string(),
        glow::FRAMEBUFFER_UNSUPPORTED => "unsupported attachment format".to_string(),
        other => format!("status 0x{:04x}", other),
    }
}

impl Device for GlDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(&mut self, format: &TextureFormat) -> ResourceResult<RawTexture> {
        format.validate(self.limits.max_texture_size)?;
        let (internal, pixel, ty) = gl_format(format.mode(), format.depth());
        let mipmapped = format.mip_levels() > 1;

        let native = unsafe {
            let gl = &self.gl;
            let native = gl.create_texture().map_err(allocation("texture"))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(native));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                gl_filter(format.min_filter(), mipmapped),
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                gl_filter(format.mag_filter(), false),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, gl_wrap(format.wrap_s()));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, gl_wrap(format.wrap_t()));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAX_LEVEL,
                format.mip_levels() as i32 - 1,
            );

            let (mut width, mut height) = (format.width() as i32, format.height() as i32);
            for level in 0..format.mip_levels() as i32 {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    level,
                    internal as i32,
                    width,
                    height,
                    0,
                    pixel,
                    ty,
                    None,
                );
                width = (width / 2).max(1);
                height = (height / 2).max(1);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);

            if let Err(error) = self.check_error("texture allocation") {
                gl.delete_texture(native);
                return Err(ResourceError::Allocation {
                    what: format!("texture {}", format),
                    reason: error.to_string(),
                });
            }
            native
        };

        let id = self.next_id();
        self.textures.insert(id, native);
        Ok(RawTexture(id))
    }

    fn write_texture(
        &mut self,
        texture: RawTexture,
        format: &TextureFormat,
        data: &[u8],
    ) -> Result<(), TextureIoError> {
        if data.len() != format.size_in_bytes() {
            return Err(TextureIoError::BufferSize {
                format: *format,
                expected: format.size_in_bytes(),
                actual: data.len(),
            });
        }
        let native = self
            .texture(texture)
            .map_err(|e| TextureIoError::Device(e.to_string()))?;
        let (_, pixel, ty) = gl_format(format.mode(), format.depth());
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                format.width() as i32,
                format.height() as i32,
                pixel,
                ty,
                glow::PixelUnpackData::Slice(data),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            self.check_error("texture upload")
                .map_err(|e| TextureIoError::Device(e.to_string()))
        }
    }

    fn read_texture(
        &mut self,
        texture: RawTexture,
        format: &TextureFormat,
    ) -> Result<Vec<u8>, TextureIoError> {
        let native = self
            .texture(texture)
            .map_err(|e| TextureIoError::Device(e.to_string()))?;
        let (_, pixel, ty) = gl_format(format.mode(), format.depth());
        let mut data = vec![0u8; format.size_in_bytes()];
        unsafe {
            let gl = &self.gl;
            let framebuffer = gl
                .create_framebuffer()
                .map_err(TextureIoError::Device)?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(native),
                0,
            );
            gl.read_buffer(glow::COLOR_ATTACHMENT0);
            gl.read_pixels(
                0,
                0,
                format.width() as i32,
                format.height() as i32,
                pixel,
                ty,
                glow::PixelPackData::Slice(&mut data),
            );
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.delete_framebuffer(framebuffer);
            self.check_error("texture download")
                .map_err(|e| TextureIoError::Device(e.to_string()))?;
        }
        Ok(data)
    }

    fn delete_texture(&mut self, texture: RawTexture) {
        if let Some(texture) = self.textures.remove(&texture.0) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn compile_program(&mut self, source: &ProgramSource<'_>) -> ResourceResult<RawProgram> {
        if source.samplers.len() > self.limits.max_texture_units as usize {
            return Err(ResourceError::TooManyPorts {
                direction: crate::core::port::PortDirection::Input,
                count: source.samplers.len(),
                max: self.limits.max_texture_units,
            });
        }
        if source.outputs.len() > self.limits.max_color_attachments as usize {
            return Err(ResourceError::TooManyPorts {
                direction: crate::core::port::PortDirection::Output,
                count: source.outputs.len(),
                max: self.limits.max_color_attachments,
            });
        }

        let program = unsafe {
            let vertex = self.compile_shader(glow::VERTEX_SHADER, source.vertex)?;
            let fragment = match self.compile_shader(glow::FRAGMENT_SHADER, source.fragment) {
                Ok(fragment) => fragment,
                Err(error) => {
                    self.gl.delete_shader(vertex);
                    return Err(error);
                }
            };

            let gl = &self.gl;
            let program = match gl.create_program() {
                Ok(program) => program,
                Err(reason) => {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                    return Err(allocation("program")(reason));
                }
            };
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.bind_attrib_location(program, VERTEX_POSITION_ATTRIBUTE, "vertexPosition");
            gl.bind_attrib_location(program, VERTEX_TEX_COORD_ATTRIBUTE, "vertexTexCoord");
            if !source.compatibility {
                for (index, output) in source.outputs.iter().enumerate() {
                    gl.bind_frag_data_location(program, index as u32, output);
                }
            }
            gl.link_program(program);

            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(ResourceError::Link {
                    shader: source.fragment.name().to_string(),
                    log: source.fragment.annotate_log(&log),
                });
            }

            gl.use_program(Some(program));
            for (unit, sampler) in source.samplers.iter().enumerate() {
                match gl.get_uniform_location(program, sampler) {
                    Some(location) => gl.uniform_1_i32(Some(&location), unit as i32),
                    None => warn!(
                        "Sampler '{}' of '{}' is unused and was optimized out",
                        sampler,
                        source.fragment.name()
                    ),
                }
            }
            gl.use_program(None);
            program
        };

        let id = self.next_id();
        self.programs.insert(id, program);
        Ok(RawProgram(id))
    }

    fn delete_program(&mut self, program: RawProgram) {
        if let Some(program) = self.programs.remove(&program.0) {
            unsafe { self.gl.delete_program(program) };
        }
    }

    fn create_framebuffer(&mut self, targets: &[RawTexture]) -> ResourceResult<RawFramebuffer> {
        if targets.len() > self.limits.max_color_attachments as usize {
            return Err(ResourceError::TooManyPorts {
                direction: crate::core::port::PortDirection::Output,
                count: targets.len(),
                max: self.limits.max_color_attachments,
            });
        }
        let natives = targets
            .iter()
            .map(|t| self.texture(*t))
            .collect::<ResourceResult<Vec<_>>>()?;

        let framebuffer = unsafe {
            let gl = &self.gl;
            let framebuffer = gl.create_framebuffer().map_err(allocation("framebuffer"))?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            let mut attachments = Vec::with_capacity(natives.len());
            for (index, native) in natives.iter().enumerate() {
                let attachment = glow::COLOR_ATTACHMENT0 + index as u32;
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    Some(*native),
                    0,
                );
                attachments.push(attachment);
            }
            gl.draw_buffers(&attachments);

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                return Err(ResourceError::IncompleteFramebuffer {
                    reason: framebuffer_status(status),
                });
            }
            framebuffer
        };

        let id = self.next_id();
        self.framebuffers.insert(id, framebuffer);
        Ok(RawFramebuffer(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        if let Some(framebuffer) = self.framebuffers.remove(&framebuffer.0) {
            unsafe { self.gl.delete_framebuffer(framebuffer) };
        }
    }

    fn draw(&mut self, pass: &RenderPass<'_>) -> ResourceResult<()> {
        let program = *self
            .programs
            .get(&pass.program.0)
            .ok_or_else(|| ResourceError::Device(format!("unknown program {}", pass.program.0)))?;
        let framebuffer = *self.framebuffers.get(&pass.framebuffer.0).ok_or_else(|| {
            ResourceError::Device(format!("unknown framebuffer {}", pass.framebuffer.0))
        })?;
        let inputs = pass
            .inputs
            .iter()
            .map(|t| self.texture(*t))
            .collect::<ResourceResult<Vec<_>>>()?;

        unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.viewport(0, 0, pass.width as i32, pass.height as i32);
            if pass.clearing {
                let [r, g, b, a] = pass.clear_color;
                gl.clear_color(r, g, b, a);
                gl.clear(glow::COLOR_BUFFER_BIT);
            }
            if pass.blending {
                gl.enable(glow::BLEND);
                gl.blend_equation(glow::FUNC_ADD);
                gl.blend_func(glow::ONE, glow::ONE);
            } else {
                gl.disable(glow::BLEND);
            }

            gl.use_program(Some(program));
            for (unit, native) in inputs.iter().enumerate() {
                gl.active_texture(glow::TEXTURE0 + unit as u32);
                gl.bind_texture(glow::TEXTURE_2D, Some(*native));
            }
            for (name, value) in pass.uniforms {
                self.set_uniform(program, name, value);
            }

            gl.bind_vertex_array(Some(self.vertex_array));
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, QUAD.len() as i32);
            gl.bind_vertex_array(None);

            for unit in (0..inputs.len()).rev() {
                gl.active_texture(glow::TEXTURE0 + unit as u32);
                gl.bind_texture(glow::TEXTURE_2D, None);
            }
            gl.use_program(None);
            gl.disable(glow::BLEND);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.check_error("draw")
        }
    }

    fn generate_mipmaps(&mut self, texture: RawTexture) -> ResourceResult<()> {
        let native = self.texture(texture)?;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
            self.gl.generate_mipmap(glow::TEXTURE_2D);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            self.check_error("mipmap generation")
        }
    }

    fn finish(&mut self) {
        unsafe { self.gl.finish() };
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        unsafe {
            for (_, framebuffer) in self.framebuffers.drain() {
                self.gl.delete_framebuffer(framebuffer);
            }
            for (_, program) in self.programs.drain() {
                self.gl.delete_program(program);
            }
            for (_, texture) in self.textures.drain() {
                self.gl.delete_texture(texture);
            }
            self.gl.delete_buffer(self.vertex_buffer);
            self.gl.delete_vertex_array(self.vertex_array);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_table() {
        assert_eq!(
            gl_format(PixelMode::Rgba, PixelDepth::U8),
            (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE)
        );
        assert_eq!(
            gl_format(PixelMode::Red, PixelDepth::F16),
            (glow::R16F, glow::RED, glow::HALF_FLOAT)
        );
        assert_eq!(gl_filter(FilterMode::Linear, true), glow::LINEAR_MIPMAP_LINEAR as i32);
        assert_eq!(gl_wrap(WrapMode::Repeat), glow::REPEAT as i32);
    }

    #[test]
    fn test_allocation_error() {
        let error = allocation("program")("GL_OUT_OF_MEMORY".to_string());
        assert!(matches!(
            &error,
            ResourceError::Allocation { what, reason } if what == "program" && reason == "GL_OUT_OF_MEMORY"
        ));
    }

    #[test]
    fn test_quad_layout() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD);
        assert_eq!(bytes.len(), 4 * 4 * 4);
    }
}
