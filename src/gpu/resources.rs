//! Owned GPU objects.

use crate::core::error::{GlipResult, ResourceResult, TextureIoError};
use crate::core::format::TextureFormat;
use crate::gpu::context::{Context, DropObject};
use crate::gpu::device::{ProgramSource, RawFramebuffer, RawProgram, RawTexture};
use std::fmt;
use std::rc::{Rc, Weak};

struct TextureInner {
    context: Context,
    raw: RawTexture,
    format: TextureFormat,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.context.release(DropObject::Texture(self.raw));
    }
}

/// A texture owned by the caller or by a pipeline.
///
/// Dropping the handle deletes the texture. Pipelines only keep weak
/// references to the textures bound to their inputs.
pub struct Texture {
    inner: Rc<TextureInner>,
}

impl Texture {
    /// Allocate a texture with undefined content.
    pub fn new(context: &Context, format: TextureFormat) -> ResourceResult<Self> {
        format.validate(context.limits().max_texture_size)?;
        let raw = context.with_device(|device| device.create_texture(&format))?;
        Ok(Self {
            inner: Rc::new(TextureInner {
                context: context.clone(),
                raw,
                format,
            }),
        })
    }

    /// Allocate a texture and upload `data` into it.
    pub fn with_data(context: &Context, format: TextureFormat, data: &[u8]) -> GlipResult<Self> {
        let texture = Self::new(context, format)?;
        texture.write(data)?;
        Ok(texture)
    }

    pub fn format(&self) -> &TextureFormat {
        &self.inner.format
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Upload a tightly packed buffer of exactly `format().size_in_bytes()` bytes.
    pub fn write(&self, data: &[u8]) -> Result<(), TextureIoError> {
        let format = &self.inner.format;
        check_size(format, data.len())?;
        self.inner.context.with_device(|device| {
            device.write_texture(self.inner.raw, format, data)?;
            if format.mip_levels() > 1 {
                device
                    .generate_mipmaps(self.inner.raw)
                    .map_err(|e| TextureIoError::Device(e.to_string()))?;
            }
            Ok(())
        })
    }

    /// Download the texture content.
    pub fn read(&self) -> Result<Vec<u8>, TextureIoError> {
        let data = self
            .inner
            .context
            .with_device(|device| device.read_texture(self.inner.raw, &self.inner.format))?;
        check_size(&self.inner.format, data.len())?;
        Ok(data)
    }

    pub(crate) fn raw(&self) -> RawTexture {
        self.inner.raw
    }

    pub(crate) fn downgrade(&self) -> WeakTexture {
        WeakTexture {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Same underlying texture.
    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("raw", &self.inner.raw)
            .field("format", &self.inner.format)
            .finish()
    }
}

fn check_size(format: &TextureFormat, actual: usize) -> Result<(), TextureIoError> {
    let expected = format.size_in_bytes();
    if actual != expected {
        return Err(TextureIoError::BufferSize {
            format: *format,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Non-owning reference to a [`Texture`].
#[derive(Clone)]
pub(crate) struct WeakTexture {
    inner: Weak<TextureInner>,
}

impl WeakTexture {
    /// Raw name and format, if the texture is still alive.
    pub(crate) fn get(&self) -> Option<(RawTexture, TextureFormat)> {
        self.inner.upgrade().map(|inner| (inner.raw, inner.format))
    }

    pub(crate) fn is(&self, texture: &Texture) -> bool {
        Weak::ptr_eq(&self.inner, &Rc::downgrade(&texture.inner))
    }
}

// ============================================================================
// Resource Arena
// ============================================================================

/// Index of a texture in a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot(usize);

/// Index of a framebuffer in a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferSlot(usize);

/// Index of a program in a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramSlot(usize);

/// Every object a pipeline instance owns, released together.
pub(crate) struct ResourceArena {
    context: Context,
    textures: Vec<Texture>,
    framebuffers: Vec<RawFramebuffer>,
    programs: Vec<RawProgram>,
}

impl ResourceArena {
    pub(crate) fn new(context: &Context) -> Self {
        Self {
            context: context.clone(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
            programs: Vec::new(),
        }
    }

    pub(crate) fn allocate_texture(&mut self, format: TextureFormat) -> ResourceResult<TextureSlot> {
        self.textures.push(Texture::new(&self.context, format)?);
        Ok(TextureSlot(self.textures.len() - 1))
    }

    pub(crate) fn compile_program(&mut self, source: &ProgramSource<'_>) -> ResourceResult<ProgramSlot> {
        let raw = self.context.with_device(|device| device.compile_program(source))?;
        self.programs.push(raw);
        Ok(ProgramSlot(self.programs.len() - 1))
    }

    pub(crate) fn create_framebuffer(&mut self, targets: &[TextureSlot]) -> ResourceResult<FramebufferSlot> {
        let raws: Vec<RawTexture> = targets.iter().map(|slot| self.textures[slot.0].raw()).collect();
        let raw = self.context.with_device(|device| device.create_framebuffer(&raws))?;
        self.framebuffers.push(raw);
        Ok(FramebufferSlot(self.framebuffers.len() - 1))
    }

    pub(crate) fn texture(&self, slot: TextureSlot) -> &Texture {
        &self.textures[slot.0]
    }

    pub(crate) fn program(&self, slot: ProgramSlot) -> RawProgram {
        self.programs[slot.0]
    }

    pub(crate) fn framebuffer(&self, slot: FramebufferSlot) -> RawFramebuffer {
        self.framebuffers[slot.0]
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }
}

impl Drop for ResourceArena {
    fn drop(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.context.release(DropObject::Framebuffer(framebuffer));
        }
        for program in self.programs.drain(..) {
            self.context.release(DropObject::Program(program));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResourceError;
    use crate::core::format::{PixelDepth, PixelMode};

    #[test]
    fn test_write_read() {
        let context = Context::software();
        let format = TextureFormat::new(2, 1, PixelMode::Rgb, PixelDepth::U8);
        let data = [0u8, 128, 255, 10, 20, 30];
        let texture = Texture::with_data(&context, format, &data).unwrap();
        assert_eq!(texture.read().unwrap(), data.to_vec());
    }

    #[test]
    fn test_wrong_buffer_size() {
        let context = Context::software();
        let texture = Texture::new(&context, TextureFormat::rgba8(2, 2)).unwrap();
        let result = texture.write(&[0u8; 15]);
        assert!(matches!(
            result,
            Err(TextureIoError::BufferSize {
                expected: 16,
                actual: 15,
                ..
            })
        ));
    }

    #[test]
    fn test_too_large() {
        let context = Context::software();
        let result = Texture::new(&context, TextureFormat::rgba8(1 << 20, 1));
        assert!(matches!(result, Err(ResourceError::TextureTooLarge { .. })));
    }

    #[test]
    fn test_weak_reference() {
        let context = Context::software();
        let texture = Texture::new(&context, TextureFormat::rgba8(1, 1)).unwrap();
        let weak = texture.downgrade();
        assert!(weak.is(&texture));
        assert!(weak.get().is_some());
        drop(texture);
        assert!(weak.get().is_none());
    }
}
