//! GPU access: devices, contexts and the objects they own.
//!
//! Two devices are provided:
//! - [`GlDevice`] drives an OpenGL 3 / GLES 3 context through `glow`
//!   (feature `gl`, enabled by default)
//! - [`SoftwareDevice`] runs registered Rust kernels on the CPU, for tests
//!   and headless use

pub mod context;
pub mod device;
#[cfg(feature = "gl")]
pub mod gl;
pub mod resources;
pub mod software;

pub use context::Context;
pub use device::{Device, DeviceLimits, ProgramSource, RenderPass};
#[cfg(feature = "gl")]
pub use gl::GlDevice;
pub use resources::Texture;
pub use software::{Fragment, Kernel, SoftwareDevice};
