//! CPU rasterizer implementing [`Device`].
//!
//! GLSL is not interpreted. Each fragment shader is matched, by its exact
//! text, to a Rust kernel registered with [`SoftwareDevice::with_kernel`].
//! The kernel is called once per target pixel with a [`Fragment`] giving
//! access to samplers and uniforms, and writes one RGBA value per output.
//!
//! Texels are stored as `f32` and rounded to the texture depth on every
//! write, so results match what a GPU would store.

use crate::core::error::{ResourceError, ResourceResult, TextureIoError};
use crate::core::format::{FilterMode, TextureFormat};
use crate::core::port::PortDirection;
use crate::core::uniform::UniformValue;
use crate::gpu::device::{
    Device, DeviceLimits, ProgramSource, RawFramebuffer, RawProgram, RawTexture, RenderPass,
};
use indexmap::IndexMap;
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Per-pixel function standing in for a fragment shader.
pub type Kernel = Rc<dyn Fn(&Fragment<'_>, &mut [[f32; 4]])>;

#[derive(Clone)]
struct SoftTexture {
    format: TextureFormat,
    texels: Vec<[f32; 4]>,
}

impl SoftTexture {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = self.format.wrap_s().apply(x, self.format.width());
        let y = self.format.wrap_t().apply(y, self.format.height());
        self.texels[(y * self.format.width() + x) as usize]
    }

    fn sample(&self, uv: [f32; 2], filter: FilterMode) -> [f32; 4] {
        let w = self.format.width() as f32;
        let h = self.format.height() as f32;
        match filter {
            FilterMode::Nearest => {
                self.texel((uv[0] * w).floor() as i64, (uv[1] * h).floor() as i64)
            }
            FilterMode::Linear => {
                let fx = uv[0] * w - 0.5;
                let fy = uv[1] * h - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = mix(self.texel(x0, y0), self.texel(x0 + 1, y0), tx);
                let bottom = mix(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), tx);
                mix(top, bottom, ty)
            }
        }
    }
}

fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

/// Round a color to what `format` stores. Missing channels read back as
/// green 0, blue 0, alpha 1.
fn store(format: &TextureFormat, color: [f32; 4]) -> [f32; 4] {
    let depth = format.depth();
    let channels = format.channels();
    std::array::from_fn(|i| {
        if i < channels {
            depth.quantize(color[i])
        } else if i == 3 {
            1.0
        } else {
            0.0
        }
    })
}

struct SoftProgram {
    kernel: Kernel,
    samplers: Vec<String>,
    outputs: usize,
}

/// Context handed to a kernel for one pixel.
pub struct Fragment<'a> {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    samplers: &'a [String],
    inputs: &'a [SoftTexture],
    uniforms: &'a IndexMap<String, UniformValue>,
}

impl<'a> Fragment<'a> {
    /// Pixel coordinates in the target.
    pub fn coord(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Normalized coordinates of the pixel center, like `texCoord`.
    pub fn tex_coord(&self) -> [f32; 2] {
        [
            (self.x as f32 + 0.5) / self.width as f32,
            (self.y as f32 + 0.5) / self.height as f32,
        ]
    }

    /// Size of the target.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sample an input like `texture(name, uv)`. Unknown names read as zero.
    pub fn sample(&self, name: &str, uv: [f32; 2]) -> [f32; 4] {
        match self.unit(name) {
            Some(unit) => self.sample_unit(unit, uv),
            None => [0.0; 4],
        }
    }

    /// Sample the texture bound to sampler `unit`.
    pub fn sample_unit(&self, unit: usize, uv: [f32; 2]) -> [f32; 4] {
        let Some(texture) = self.inputs.get(unit) else {
            return [0.0; 4];
        };
        let format = &texture.format;
        let minifying = format.width() > self.width || format.height() > self.height;
        let filter = if minifying {
            format.min_filter()
        } else {
            format.mag_filter()
        };
        texture.sample(uv, filter)
    }

    /// Read one texel like `texelFetch`. Out-of-range reads return zero.
    pub fn texel_fetch(&self, name: &str, x: i64, y: i64) -> [f32; 4] {
        let Some(texture) = self.unit(name).and_then(|unit| self.inputs.get(unit)) else {
            return [0.0; 4];
        };
        let (w, h) = (texture.format.width() as i64, texture.format.height() as i64);
        if x < 0 || y < 0 || x >= w || y >= h {
            return [0.0; 4];
        }
        texture.texels[(y * w + x) as usize]
    }

    /// Size of an input like `textureSize(name, 0)`.
    pub fn texture_size(&self, name: &str) -> Option<(u32, u32)> {
        self.unit(name)
            .and_then(|unit| self.inputs.get(unit))
            .map(|t| (t.format.width(), t.format.height()))
    }

    /// Current value of a uniform.
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Scalar uniform, or `default` when unset.
    pub fn uniform_f32(&self, name: &str, default: f32) -> f32 {
        self.uniform(name).and_then(|v| v.as_float()).unwrap_or(default)
    }

    fn unit(&self, name: &str) -> Option<usize> {
        self.samplers.iter().position(|s| s == name)
    }
}

/// A [`Device`] running kernels on the CPU.
pub struct SoftwareDevice {
    limits: DeviceLimits,
    kernels: HashMap<String, Kernel>,
    textures: HashMap<u64, SoftTexture>,
    programs: HashMap<u64, SoftProgram>,
    framebuffers: HashMap<u64, Vec<RawTexture>>,
    next_id: u64,
    draws: u64,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            kernels: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            draws: 0,
        }
    }

    /// Register the kernel run for programs whose fragment shader is
    /// exactly `fragment_source`.
    pub fn with_kernel(
        mut self,
        fragment_source: impl Into<String>,
        kernel: impl Fn(&Fragment<'_>, &mut [[f32; 4]]) + 'static,
    ) -> Self {
        self.kernels.insert(fragment_source.into(), Rc::new(kernel));
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, texture: RawTexture) -> ResourceResult<&SoftTexture> {
        self.textures
            .get(&texture.0)
            .ok_or_else(|| ResourceError::Device(format!("unknown texture {}", texture.0)))
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SoftwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareDevice")
            .field("kernels", &self.kernels.len())
            .field("textures", &self.textures.len())
            .field("programs", &self.programs.len())
            .field("draws", &self.draws)
            .finish()
    }
}

impl Device for SoftwareDevice {
    fn name(&self) -> &str {
        "software"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(&mut self, format: &TextureFormat) -> ResourceResult<RawTexture> {
        format.validate(self.limits.max_texture_size)?;
        let id = self.next_id();
        self.textures.insert(
            id,
            SoftTexture {
                format: *format,
                texels: vec![store(format, [0.0; 4]); format.pixel_count()],
            },
        );
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
        let target = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| TextureIoError::Device(format!("unknown texture {}", texture.0)))?;

        let depth = format.depth();
        let channels = format.channels();
        for (texel, pixel) in target
            .texels
            .iter_mut()
            .zip(data.chunks_exact(format.bytes_per_pixel()))
        {
            let mut color = [0.0, 0.0, 0.0, 1.0];
            for (c, component) in pixel.chunks_exact(depth.bytes()).take(channels).enumerate() {
                color[c] = depth.decode(component);
            }
            *texel = store(format, color);
        }
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: RawTexture,
        format: &TextureFormat,
    ) -> Result<Vec<u8>, TextureIoError> {
        let source = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| TextureIoError::Device(format!("unknown texture {}", texture.0)))?;

        let mut data = Vec::with_capacity(format.size_in_bytes());
        for texel in &source.texels {
            for value in texel.iter().take(format.channels()) {
                format.depth().encode(*value, &mut data);
            }
        }
        Ok(data)
    }

    fn delete_texture(&mut self, texture: RawTexture) {
        self.textures.remove(&texture.0);
    }

    fn compile_program(&mut self, source: &ProgramSource<'_>) -> ResourceResult<RawProgram> {
        let Some(kernel) = self.kernels.get(source.fragment.source()).cloned() else {
            return Err(ResourceError::Compile {
                shader: source.fragment.name().to_string(),
                log: source
                    .fragment
                    .annotate_log("0:1(1): error: no kernel registered for this shader"),
            });
        };
        if source.samplers.len() > self.limits.max_texture_units as usize {
            return Err(ResourceError::TooManyPorts {
                direction: PortDirection::Input,
                count: source.samplers.len(),
                max: self.limits.max_texture_units,
            });
        }
        if source.outputs.len() > self.limits.max_color_attachments as usize {
            return Err(ResourceError::TooManyPorts {
                direction: PortDirection::Output,
                count: source.outputs.len(),
                max: self.limits.max_color_attachments,
            });
        }

        let id = self.next_id();
        self.programs.insert(
            id,
            SoftProgram {
                kernel,
                samplers: source.samplers.to_vec(),
                outputs: source.outputs.len(),
            },
        );
        Ok(RawProgram(id))
    }

    fn delete_program(&mut self, program: RawProgram) {
        self.programs.remove(&program.0);
    }

    fn create_framebuffer(&mut self, targets: &[RawTexture]) -> ResourceResult<RawFramebuffer> {
        if targets.len() > self.limits.max_color_attachments as usize {
            return Err(ResourceError::TooManyPorts {
                direction: PortDirection::Output,
                count: targets.len(),
                max: self.limits.max_color_attachments,
            });
        }
        let mut size = None;
        for target in targets {
            let format = self.texture(*target)?.format;
            let target_size = (format.width(), format.height());
            if *size.get_or_insert(target_size) != target_size {
                return Err(ResourceError::IncompleteFramebuffer {
                    reason: "attachments have different sizes".to_string(),
                });
            }
        }
        let id = self.next_id();
        self.framebuffers.insert(id, targets.to_vec());
        Ok(RawFramebuffer(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn draw(&mut self, pass: &RenderPass<'_>) -> ResourceResult<()> {
        let program = self
            .programs
            .get(&pass.program.0)
            .ok_or_else(|| ResourceError::Device(format!("unknown program {}", pass.program.0)))?;
        let kernel = program.kernel.clone();
        let samplers = program.samplers.clone();
        let output_count = program.outputs;

        let targets = self
            .framebuffers
            .get(&pass.framebuffer.0)
            .cloned()
            .ok_or_else(|| {
                ResourceError::Device(format!("unknown framebuffer {}", pass.framebuffer.0))
            })?;

        // Inputs are read from a snapshot, the way a GPU reads a texture
        // while rendering into another one.
        let inputs = pass
            .inputs
            .iter()
            .map(|raw| self.texture(*raw).cloned())
            .collect::<ResourceResult<Vec<_>>>()?;

        let mut outputs = Vec::with_capacity(targets.len());
        for raw in &targets {
            let texture = self.texture(*raw)?;
            let texels = if pass.clearing {
                vec![store(&texture.format, pass.clear_color); texture.texels.len()]
            } else {
                texture.texels.clone()
            };
            outputs.push((texture.format, texels));
        }

        let mut colors = vec![[0.0f32; 4]; output_count.max(targets.len())];
        for y in 0..pass.height {
            for x in 0..pass.width {
                let fragment = Fragment {
                    x,
                    y,
                    width: pass.width,
                    height: pass.height,
                    samplers: &samplers,
                    inputs: &inputs,
                    uniforms: pass.uniforms,
                };
                colors.iter_mut().for_each(|c| *c = [0.0; 4]);
                kernel(&fragment, &mut colors);

                for ((format, texels), color) in outputs.iter_mut().zip(&colors) {
                    if x >= format.width() || y >= format.height() {
                        continue;
                    }
                    let index = (y * format.width() + x) as usize;
                    let value = if pass.blending {
                        std::array::from_fn(|i| texels[index][i] + color[i])
                    } else {
                        *color
                    };
                    texels[index] = store(format, value);
                }
            }
        }

        for (raw, (_, texels)) in targets.iter().zip(outputs) {
            if let Some(texture) = self.textures.get_mut(&raw.0) {
                texture.texels = texels;
            }
        }
        self.draws += 1;
        trace!(
            "Software draw #{}: {}x{}, {} input(s), {} target(s)",
            self.draws,
            pass.width,
            pass.height,
            pass.inputs.len(),
            targets.len()
        );
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: RawTexture) -> ResourceResult<()> {
        self.texture(texture).map(|_| ())
    }

    fn finish(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{PixelDepth, PixelMode, WrapMode};
    use crate::core::shader::ShaderSource;

    const INVERT: &str = "uniform sampler2D src;\nout vec4 dst;\nvoid main() { dst = 1.0 - texture(src, texCoord); }\n";

    fn invert_kernel(fragment: &Fragment<'_>, out: &mut [[f32; 4]]) {
        let c = fragment.sample("src", fragment.tex_coord());
        out[0] = [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], 1.0];
    }

    fn program(device: &mut SoftwareDevice, fragment: &ShaderSource) -> ResourceResult<RawProgram> {
        let vertex = ShaderSource::new("void main() {}").unwrap();
        device.compile_program(&ProgramSource {
            vertex: &vertex,
            fragment,
            samplers: fragment.inputs(),
            outputs: fragment.outputs(),
            compatibility: false,
        })
    }

    #[test]
    fn test_draw_invert() {
        let mut device = SoftwareDevice::new().with_kernel(INVERT, invert_kernel);
        let format = TextureFormat::new(2, 1, PixelMode::Rgb, PixelDepth::U8);
        let src = device.create_texture(&format).unwrap();
        let dst = device.create_texture(&format).unwrap();
        device.write_texture(src, &format, &[0, 0, 0, 255, 128, 0]).unwrap();

        let fragment = ShaderSource::new(INVERT).unwrap();
        let program = program(&mut device, &fragment).unwrap();
        let framebuffer = device.create_framebuffer(&[dst]).unwrap();
        let uniforms = IndexMap::new();
        device
            .draw(&RenderPass {
                program,
                framebuffer,
                width: 2,
                height: 1,
                inputs: &[src],
                uniforms: &uniforms,
                blending: false,
                clearing: true,
                clear_color: [0.0; 4],
            })
            .unwrap();

        assert_eq!(device.read_texture(dst, &format).unwrap(), vec![255, 255, 255, 0, 127, 255]);
    }

    #[test]
    fn test_missing_kernel() {
        let mut device = SoftwareDevice::new();
        let fragment = ShaderSource::new(INVERT).unwrap();
        match program(&mut device, &fragment) {
            Err(ResourceError::Compile { log, .. }) => assert!(log.contains("no kernel")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_blending_accumulates() {
        let mut device = SoftwareDevice::new().with_kernel(INVERT, |_: &Fragment<'_>, out: &mut [[f32; 4]]| {
            out[0] = [0.25, 0.0, 0.0, 0.0];
        });
        let format = TextureFormat::new(1, 1, PixelMode::Red, PixelDepth::F32);
        let dst = device.create_texture(&format).unwrap();
        let fragment = ShaderSource::new(INVERT).unwrap();
        let program = program(&mut device, &fragment).unwrap();
        let framebuffer = device.create_framebuffer(&[dst]).unwrap();
        let uniforms = IndexMap::new();
        let src = device.create_texture(&format).unwrap();
        for _ in 0..3 {
            device
                .draw(&RenderPass {
                    program,
                    framebuffer,
                    width: 1,
                    height: 1,
                    inputs: &[src],
                    uniforms: &uniforms,
                    blending: true,
                    clearing: false,
                    clear_color: [0.0; 4],
                })
                .unwrap();
        }
        let bytes = device.read_texture(dst, &format).unwrap();
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.75);
    }

    #[test]
    fn test_sampling_wraps() {
        let format = TextureFormat::new(2, 1, PixelMode::Red, PixelDepth::F32).with_wrap(WrapMode::Repeat);
        let texture = SoftTexture {
            format,
            texels: vec![[0.1, 0.0, 0.0, 1.0], [0.9, 0.0, 0.0, 1.0]],
        };
        assert_eq!(texture.sample([1.25, 0.5], FilterMode::Nearest)[0], 0.1);
        assert_eq!(texture.sample([-0.25, 0.5], FilterMode::Nearest)[0], 0.9);
        let halfway = texture.sample([0.5, 0.5], FilterMode::Linear)[0];
        assert!((halfway - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_attachments() {
        let mut device = SoftwareDevice::new();
        let a = device.create_texture(&TextureFormat::rgba8(2, 2)).unwrap();
        let b = device.create_texture(&TextureFormat::rgba8(4, 4)).unwrap();
        assert!(matches!(
            device.create_framebuffer(&[a, b]),
            Err(ResourceError::IncompleteFramebuffer { .. })
        ));
    }
}
