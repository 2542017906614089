//! GPU-context-bound resources and their process-wide managers.
//!
//! Resources are shared as `Arc<T>` between application threads (which only
//! describe and enqueue them) and the render thread (which creates, destroys
//! and reloads them). The `Arc` is the resource identity; it survives any
//! number of context losses.

mod hub;
mod manager;
mod material;
mod slot;
mod texture;

pub use hub::{MaterialManager, ResourceHub, TextureManager};
pub use manager::ResourceManager;
pub use material::Material;
pub use slot::ResourceSlot;
pub use texture::{Texture, TextureKind};

use std::sync::Arc;

use crate::gpu::{ContextId, GpuDevice, GpuError, GpuHandle, RendererId};
use crate::task::{ManagerKind, TaskPayload};

/// Contract for any object that lives in a GPU context.
///
/// Implementors provide [`upload`](Self::upload) and [`release`](Self::release);
/// the lifecycle methods built on top are idempotent:
/// - `create` on an already-created resource does nothing
/// - `destroy` on an unallocated resource does nothing
pub trait GpuResource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Handle bookkeeping shared by all resource kinds.
    fn slot(&self) -> &ResourceSlot;

    /// Creates the GPU object from the CPU-side description.
    fn upload(&self, gpu: &mut dyn GpuDevice) -> Result<GpuHandle, GpuError>;

    /// Deletes a GPU object previously returned by `upload`.
    fn release(&self, gpu: &mut dyn GpuDevice, handle: GpuHandle);

    fn is_mipmapped(&self) -> bool {
        false
    }

    fn should_release_source_data(&self) -> bool {
        false
    }

    /// Whether the CPU-side description is still available for another upload.
    fn can_restore(&self) -> bool {
        true
    }

    fn handle(&self) -> Option<GpuHandle> {
        self.slot().handle()
    }

    fn owner(&self) -> Option<RendererId> {
        self.slot().owner()
    }

    fn last_error(&self) -> Option<GpuError> {
        self.slot().last_error()
    }

    fn create(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        let context = gpu.context_id();
        if self.slot().handle_in(context).is_some() {
            return Ok(());
        }
        match self.upload(gpu) {
            Ok(handle) => {
                self.slot().store(context, handle);
                Ok(())
            }
            Err(err) => {
                self.slot().record_failure(err.clone());
                Err(err)
            }
        }
    }

    fn destroy(&self, gpu: &mut dyn GpuDevice) {
        if let Some(handle) = self.slot().take_in(gpu.context_id()) {
            self.release(gpu, handle);
        }
    }

    /// Re-creates the GPU object in place. Identity is unchanged.
    fn reload(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        self.destroy(gpu);
        self.create(gpu)
    }

    /// Forgets handles of a lost context without touching the GPU.
    fn invalidate(&self, context: ContextId) -> bool {
        self.slot().invalidate(context)
    }
}

/// A resource kind that has its own manager and frame-task payloads.
pub trait ManagedResource: GpuResource + Sized {
    const MANAGER: ManagerKind;

    fn payload(resource: Arc<Self>) -> TaskPayload;
    fn batch_payload(resources: Vec<Arc<Self>>) -> TaskPayload;
    fn swap_payload(old: Arc<Self>, new: Arc<Self>) -> TaskPayload;
}
