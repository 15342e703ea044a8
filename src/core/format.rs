//! Texture formats.
//!
//! A [`TextureFormat`] is an immutable description of a texture: size, pixel
//! layout, component depth and sampling parameters. It is used both to
//! allocate textures and to check that connected ports agree.

use crate::core::error::{ResourceError, ResourceResult};
use half::f16;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelMode {
    /// Single red channel.
    Red,
    /// Red and green channels.
    Rg,
    /// Red, green and blue channels.
    Rgb,
    /// Red, green, blue and alpha channels.
    Rgba,
}

impl PixelMode {
    /// Number of channels.
    pub fn channels(&self) -> usize {
        match self {
            PixelMode::Red => 1,
            PixelMode::Rg => 2,
            PixelMode::Rgb => 3,
            PixelMode::Rgba => 4,
        }
    }
}

impl fmt::Display for PixelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelMode::Red => write!(f, "R"),
            PixelMode::Rg => write!(f, "RG"),
            PixelMode::Rgb => write!(f, "RGB"),
            PixelMode::Rgba => write!(f, "RGBA"),
        }
    }
}

/// Numeric type of a pixel component.
///
/// Integer depths are normalized: unsigned values map to `[0, 1]`, signed
/// values to `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelDepth {
    /// Unsigned normalized 8-bit.
    U8,
    /// Signed normalized 8-bit.
    I8,
    /// Unsigned normalized 16-bit.
    U16,
    /// Signed normalized 16-bit.
    I16,
    /// Half precision float.
    F16,
    /// Single precision float.
    F32,
}

impl PixelDepth {
    /// Size of one component in bytes.
    pub fn bytes(&self) -> usize {
        match self {
            PixelDepth::U8 | PixelDepth::I8 => 1,
            PixelDepth::U16 | PixelDepth::I16 | PixelDepth::F16 => 2,
            PixelDepth::F32 => 4,
        }
    }

    /// Whether components are stored as floating point.
    pub fn is_float(&self) -> bool {
        matches!(self, PixelDepth::F16 | PixelDepth::F32)
    }

    /// Round a value to what this depth can store.
    pub fn quantize(&self, value: f32) -> f32 {
        match self {
            PixelDepth::U8 => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
            PixelDepth::I8 => (value.clamp(-1.0, 1.0) * 127.0).round() / 127.0,
            PixelDepth::U16 => (value.clamp(0.0, 1.0) * 65535.0).round() / 65535.0,
            PixelDepth::I16 => (value.clamp(-1.0, 1.0) * 32767.0).round() / 32767.0,
            PixelDepth::F16 => f16::from_f32(value).to_f32(),
            PixelDepth::F32 => value,
        }
    }

    /// Decode one little-endian component. `bytes` holds exactly [`Self::bytes`] bytes.
    pub fn decode(&self, bytes: &[u8]) -> f32 {
        match self {
            PixelDepth::U8 => bytes[0] as f32 / 255.0,
            PixelDepth::I8 => (bytes[0] as i8 as f32 / 127.0).max(-1.0),
            PixelDepth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 65535.0,
            PixelDepth::I16 => (i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32767.0).max(-1.0),
            PixelDepth::F16 => f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            PixelDepth::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Encode one component, appending its little-endian bytes to `out`.
    pub fn encode(&self, value: f32, out: &mut Vec<u8>) {
        match self {
            PixelDepth::U8 => out.push((value.clamp(0.0, 1.0) * 255.0).round() as u8),
            PixelDepth::I8 => out.push((value.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8),
            PixelDepth::U16 => {
                let v = (value.clamp(0.0, 1.0) * 65535.0).round() as u16;
                out.extend_from_slice(&v.to_le_bytes());
            }
            PixelDepth::I16 => {
                let v = (value.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
            PixelDepth::F16 => out.extend_from_slice(&f16::from_f32(value).to_le_bytes()),
            PixelDepth::F32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

impl fmt::Display for PixelDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelDepth::U8 => "U8",
            PixelDepth::I8 => "I8",
            PixelDepth::U16 => "U16",
            PixelDepth::I16 => "I16",
            PixelDepth::F16 => "F16",
            PixelDepth::F32 => "F32",
        };
        write!(f, "{}", name)
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Bilinear interpolation.
    Linear,
}

/// Behavior of texture coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Tile the texture.
    Repeat,
    /// Tile the texture, mirroring every other tile.
    MirroredRepeat,
}

impl WrapMode {
    /// Map a texel index onto `0..size`.
    pub fn apply(&self, index: i64, size: u32) -> u32 {
        let n = size.max(1) as i64;
        let wrapped = match self {
            WrapMode::ClampToEdge => index.clamp(0, n - 1),
            WrapMode::Repeat => index.rem_euclid(n),
            WrapMode::MirroredRepeat => {
                let m = index.rem_euclid(2 * n);
                if m < n {
                    m
                } else {
                    2 * n - 1 - m
                }
            }
        };
        wrapped as u32
    }
}

/// Complete description of a texture.
///
/// Equality is structural. Two formats are *compatible* when they share the
/// same pixel mode and depth, regardless of size or sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureFormat {
    width: u32,
    height: u32,
    mode: PixelMode,
    depth: PixelDepth,
    min_filter: FilterMode,
    mag_filter: FilterMode,
    wrap_s: WrapMode,
    wrap_t: WrapMode,
    mip_levels: u32,
}

impl TextureFormat {
    /// Create a format with nearest filtering, edge clamping and no mipmaps.
    pub fn new(width: u32, height: u32, mode: PixelMode, depth: PixelDepth) -> Self {
        Self {
            width,
            height,
            mode,
            depth,
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            mip_levels: 1,
        }
    }

    /// Shorthand for an 8-bit RGBA format.
    pub fn rgba8(width: u32, height: u32) -> Self {
        Self::new(width, height, PixelMode::Rgba, PixelDepth::U8)
    }

    /// Set both minification and magnification filters.
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.min_filter = filter;
        self.mag_filter = filter;
        self
    }

    /// Set minification and magnification filters separately.
    pub fn with_filters(mut self, min: FilterMode, mag: FilterMode) -> Self {
        self.min_filter = min;
        self.mag_filter = mag;
        self
    }

    /// Set the same wrap mode on both axes.
    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self
    }

    /// Set S and T wrap modes separately.
    pub fn with_wrapping(mut self, s: WrapMode, t: WrapMode) -> Self {
        self.wrap_s = s;
        self.wrap_t = t;
        self
    }

    /// Set the number of mip levels (1 means no mipmaps).
    pub fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }

    /// Same format with another size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> PixelMode {
        self.mode
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    pub fn min_filter(&self) -> FilterMode {
        self.min_filter
    }

    pub fn mag_filter(&self) -> FilterMode {
        self.mag_filter
    }

    pub fn wrap_s(&self) -> WrapMode {
        self.wrap_s
    }

    pub fn wrap_t(&self) -> WrapMode {
        self.wrap_t
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Number of channels per pixel.
    pub fn channels(&self) -> usize {
        self.mode.channels()
    }

    /// Size of one pixel in bytes.
    pub fn bytes_per_pixel(&self) -> usize {
        self.mode.channels() * self.depth.bytes()
    }

    /// Size of one tightly packed row in bytes.
    pub fn row_size(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    /// Number of pixels in the base level.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of the base level in bytes, as exchanged with host memory.
    pub fn size_in_bytes(&self) -> usize {
        self.row_size() * self.height as usize
    }

    /// Largest valid mip level count for this size.
    pub fn max_mip_levels(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Same pixel mode and depth.
    pub fn is_compatible_with(&self, other: &TextureFormat) -> bool {
        self.mode == other.mode && self.depth == other.depth
    }

    /// Check that a texture of this format can exist on a device.
    pub fn validate(&self, max_size: u32) -> ResourceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ResourceError::Allocation {
                what: format!("texture {}", self),
                reason: "width and height must be non-zero".to_string(),
            });
        }
        if self.width > max_size || self.height > max_size {
            return Err(ResourceError::TextureTooLarge {
                width: self.width,
                height: self.height,
                max: max_size,
            });
        }
        if self.mip_levels == 0 || self.mip_levels > self.max_mip_levels() {
            return Err(ResourceError::Allocation {
                what: format!("texture {}", self),
                reason: format!(
                    "mip level count must be between 1 and {}",
                    self.max_mip_levels()
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}/{}", self.width, self.height, self.mode, self.depth)
    }
}
