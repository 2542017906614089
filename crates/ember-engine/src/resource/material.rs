use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{GpuDevice, GpuError, GpuHandle, ProgramDesc};
use crate::task::{ManagerKind, TaskPayload};

use super::{GpuResource, ManagedResource, ResourceSlot, Texture};

/// A shader program plus the textures it samples.
///
/// Textures are bound to consecutive units in the order they were added. The
/// program links against the textures' handles in the current context, so all
/// of them must be created first.
#[derive(Debug)]
pub struct Material {
    name: String,
    vertex: String,
    fragment: String,
    textures: Mutex<Vec<Arc<Texture>>>,
    slot: ResourceSlot,
}

impl Material {
    pub fn new(name: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
            textures: Mutex::new(Vec::new()),
            slot: ResourceSlot::new(),
        }
    }

    pub fn with_texture(self, texture: Arc<Texture>) -> Self {
        self.add_texture(texture);
        self
    }

    /// Attaches a texture. Returns `false` if it is already attached.
    ///
    /// Takes effect at the next create or reload.
    pub fn add_texture(&self, texture: Arc<Texture>) -> bool {
        let mut textures = self.textures.lock();
        if textures.iter().any(|t| Arc::ptr_eq(t, &texture)) {
            return false;
        }
        textures.push(texture);
        true
    }

    pub fn remove_texture(&self, texture: &Arc<Texture>) -> bool {
        let mut textures = self.textures.lock();
        let before = textures.len();
        textures.retain(|t| !Arc::ptr_eq(t, texture));
        textures.len() != before
    }

    pub fn textures(&self) -> Vec<Arc<Texture>> {
        self.textures.lock().clone()
    }
}

impl GpuResource for Material {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> &ResourceSlot {
        &self.slot
    }

    fn upload(&self, gpu: &mut dyn GpuDevice) -> Result<GpuHandle, GpuError> {
        let context = gpu.context_id();
        let units = self
            .textures
            .lock()
            .iter()
            .map(|t| {
                t.slot()
                    .handle_in(context)
                    .ok_or_else(|| GpuError::MissingTexture(t.name().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        gpu.create_program(&ProgramDesc {
            label: &self.name,
            vertex: &self.vertex,
            fragment: &self.fragment,
            textures: &units,
        })
    }

    fn release(&self, gpu: &mut dyn GpuDevice, handle: GpuHandle) {
        gpu.delete_program(handle);
    }
}

impl ManagedResource for Material {
    const MANAGER: ManagerKind = ManagerKind::Materials;

    fn payload(resource: Arc<Self>) -> TaskPayload {
        TaskPayload::Material(resource)
    }

    fn batch_payload(resources: Vec<Arc<Self>>) -> TaskPayload {
        TaskPayload::Materials(resources)
    }

    fn swap_payload(old: Arc<Self>, new: Arc<Self>) -> TaskPayload {
        TaskPayload::MaterialSwap { old, new }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    fn texture(name: &str) -> Arc<Texture> {
        Arc::new(Texture::from_pixels(name, 1, 1, vec![0, 0, 0, 255]))
    }

    #[test]
    fn binds_textures_in_attach_order() {
        let mut gpu = HeadlessDevice::new();
        let (a, b) = (texture("a"), texture("b"));
        b.create(&mut gpu).unwrap();
        a.create(&mut gpu).unwrap();

        let mat = Material::new("m", "vs", "fs")
            .with_texture(a.clone())
            .with_texture(b.clone());
        mat.create(&mut gpu).unwrap();

        let program = mat.handle().unwrap();
        assert_eq!(
            gpu.program_textures(program),
            Some(&[a.handle().unwrap(), b.handle().unwrap()][..])
        );
    }

    #[test]
    fn missing_texture_fails_link() {
        let mut gpu = HeadlessDevice::new();
        let mat = Material::new("m", "vs", "fs").with_texture(texture("a"));
        assert_eq!(
            mat.create(&mut gpu),
            Err(GpuError::MissingTexture("a".to_string()))
        );
        assert_eq!(mat.handle(), None);
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn attaching_twice_is_ignored() {
        let a = texture("a");
        let mat = Material::new("m", "vs", "fs");
        assert!(mat.add_texture(a.clone()));
        assert!(!mat.add_texture(a.clone()));
        assert_eq!(mat.textures().len(), 1);
        assert!(mat.remove_texture(&a));
        assert!(!mat.remove_texture(&a));
    }
}
