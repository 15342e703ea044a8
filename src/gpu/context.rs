//! Shared ownership of a device.
//!
//! Every texture, framebuffer and program belongs to exactly one
//! [`Context`]. Handles hold a clone of it and give their object back through
//! [`Context::release`] when dropped. Objects released while the device is
//! busy are queued and deleted before the next device call.

use crate::gpu::device::{Device, DeviceLimits, RawFramebuffer, RawProgram, RawTexture};
use crate::gpu::software::SoftwareDevice;
use log::{debug, trace};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) enum DropObject {
    Texture(RawTexture),
    Framebuffer(RawFramebuffer),
    Program(RawProgram),
}

impl DropObject {
    fn delete(self, device: &mut dyn Device) {
        match self {
            DropObject::Texture(texture) => device.delete_texture(texture),
            DropObject::Framebuffer(framebuffer) => device.delete_framebuffer(framebuffer),
            DropObject::Program(program) => device.delete_program(program),
        }
    }
}

struct ContextInner {
    device: RefCell<Box<dyn Device>>,
    pending: RefCell<Vec<DropObject>>,
}

/// Handle to a device, cheap to clone.
///
/// A context is bound to the thread that created it.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    pub fn new(device: impl Device + 'static) -> Self {
        debug!("Created context on '{}'", device.name());
        Self {
            inner: Rc::new(ContextInner {
                device: RefCell::new(Box::new(device)),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Context on a [`SoftwareDevice`] with no kernels registered.
    pub fn software() -> Self {
        Self::new(SoftwareDevice::new())
    }

    /// Run `f` with exclusive access to the device.
    ///
    /// # Panics
    ///
    /// Panics when called from inside another `with_device` closure.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut dyn Device) -> R) -> R {
        let mut device = self.inner.device.borrow_mut();
        let pending: Vec<DropObject> = self.inner.pending.borrow_mut().drain(..).collect();
        if !pending.is_empty() {
            trace!("Deleting {} queued object(s)", pending.len());
        }
        for object in pending {
            object.delete(&mut **device);
        }
        f(&mut **device)
    }

    /// Give an object back to the device.
    pub(crate) fn release(&self, object: DropObject) {
        match self.inner.device.try_borrow_mut() {
            Ok(mut device) => object.delete(&mut **device),
            Err(_) => self.inner.pending.borrow_mut().push(object),
        }
    }

    pub fn limits(&self) -> DeviceLimits {
        self.inner.device.borrow().limits()
    }

    pub fn device_name(&self) -> String {
        self.inner.device.borrow().name().to_string()
    }

    /// Wait for the device to complete submitted work.
    pub fn finish(&self) {
        self.with_device(|device| device.finish());
    }

    /// Both handles refer to the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.inner.device.try_borrow() {
            Ok(device) => device.name().to_string(),
            Err(_) => "<busy>".to_string(),
        };
        f.debug_struct("Context").field("device", &name).finish()
    }
}
