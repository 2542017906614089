use std::sync::Arc;

use super::{Material, ResourceManager, Texture};

pub type TextureManager = ResourceManager<Texture>;
pub type MaterialManager = ResourceManager<Material>;

/// The process-wide resource managers, injected into every renderer.
///
/// Clones share the same managers.
#[derive(Clone, Default)]
pub struct ResourceHub {
    textures: Arc<TextureManager>,
    materials: Arc<MaterialManager>,
}

impl ResourceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }

    /// Drops every registry entry and renderer registration.
    ///
    /// GPU objects are not deleted; call this after the last renderer is gone.
    pub fn teardown(&self) {
        self.materials.teardown();
        self.textures.teardown();
    }

    #[cfg(test)]
    pub(crate) fn reset_for_tests(&self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ResourceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHub")
            .field("textures", &self.textures.len())
            .field("materials", &self.materials.len())
            .finish()
    }
}
