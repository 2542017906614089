use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{GpuDevice, GpuError, GpuHandle, TextureDesc};
use crate::task::{ManagerKind, TaskPayload};

use super::{GpuResource, ManagedResource, ResourceSlot};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TextureKind {
    /// Uploaded from CPU-side RGBA8 pixels.
    Image,
    /// Color attachment of a render target; no CPU-side pixels.
    RenderTarget,
}

#[derive(Debug)]
struct TextureData {
    width: u32,
    height: u32,
    pixels: Option<Arc<[u8]>>,
}

/// A 2D texture.
///
/// Pixel data stays in memory after upload unless
/// [`release_source_after_upload`](Self::release_source_after_upload) is set,
/// in which case the texture cannot be restored after a context loss.
#[derive(Debug)]
pub struct Texture {
    name: String,
    kind: TextureKind,
    mipmaps: bool,
    release_source: bool,
    data: Mutex<TextureData>,
    slot: ResourceSlot,
}

impl Texture {
    pub fn from_pixels(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: TextureKind::Image,
            mipmaps: false,
            release_source: false,
            data: Mutex::new(TextureData {
                width,
                height,
                pixels: Some(pixels.into()),
            }),
            slot: ResourceSlot::new(),
        }
    }

    pub fn render_target(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            kind: TextureKind::RenderTarget,
            mipmaps: false,
            release_source: false,
            data: Mutex::new(TextureData {
                width,
                height,
                pixels: None,
            }),
            slot: ResourceSlot::new(),
        }
    }

    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.mipmaps = mipmaps;
        self
    }

    pub fn release_source_after_upload(mut self, release: bool) -> Self {
        self.release_source = release;
        self
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn size(&self) -> (u32, u32) {
        let data = self.data.lock();
        (data.width, data.height)
    }

    /// Changes the size of a render-target texture.
    ///
    /// Returns `false` for image textures, whose size is fixed by their pixels.
    /// The GPU object keeps its old size until the next `reload`.
    pub fn set_size(&self, width: u32, height: u32) -> bool {
        if self.kind != TextureKind::RenderTarget {
            return false;
        }
        let mut data = self.data.lock();
        data.width = width;
        data.height = height;
        true
    }

    /// Resizes a render-target texture and re-creates it if it is allocated.
    pub fn resize(&self, gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<(), GpuError> {
        if !self.set_size(width, height) {
            return Err(GpuError::InvalidSize { width, height });
        }
        if self.slot.handle_in(gpu.context_id()).is_some() {
            self.reload(gpu)?;
        }
        Ok(())
    }
}

impl GpuResource for Texture {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> &ResourceSlot {
        &self.slot
    }

    fn upload(&self, gpu: &mut dyn GpuDevice) -> Result<GpuHandle, GpuError> {
        let mut data = self.data.lock();
        if self.kind == TextureKind::Image && data.pixels.is_none() {
            return Err(GpuError::SourceReleased(self.name.clone()));
        }

        let handle = gpu.create_texture(&TextureDesc {
            label: &self.name,
            width: data.width,
            height: data.height,
            mipmaps: self.mipmaps,
            render_attachment: self.kind == TextureKind::RenderTarget,
            pixels: data.pixels.as_deref(),
        })?;

        if self.release_source {
            data.pixels = None;
        }
        Ok(handle)
    }

    fn release(&self, gpu: &mut dyn GpuDevice, handle: GpuHandle) {
        gpu.delete_texture(handle);
    }

    fn is_mipmapped(&self) -> bool {
        self.mipmaps
    }

    fn should_release_source_data(&self) -> bool {
        self.release_source
    }

    fn can_restore(&self) -> bool {
        self.kind == TextureKind::RenderTarget || self.data.lock().pixels.is_some()
    }
}

impl ManagedResource for Texture {
    const MANAGER: ManagerKind = ManagerKind::Textures;

    fn payload(resource: Arc<Self>) -> TaskPayload {
        TaskPayload::Texture(resource)
    }

    fn batch_payload(resources: Vec<Arc<Self>>) -> TaskPayload {
        TaskPayload::Textures(resources)
    }

    fn swap_payload(old: Arc<Self>, new: Arc<Self>) -> TaskPayload {
        TaskPayload::TextureSwap { old, new }
    }
}
