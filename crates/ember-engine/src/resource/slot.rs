use parking_lot::Mutex;

use crate::gpu::{ContextHandle, ContextId, GpuError, GpuHandle, RendererId};

#[derive(Debug, Default)]
struct SlotState {
    handle: Option<ContextHandle>,
    owner: Option<RendererId>,
    last_error: Option<GpuError>,
}

/// Handle, owner and failure state of one GPU resource.
///
/// A slot holds at most one handle, stamped with its context. `None` is the
/// "unallocated" state.
#[derive(Debug, Default)]
pub struct ResourceSlot {
    state: Mutex<SlotState>,
}

impl ResourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<GpuHandle> {
        self.state.lock().handle.map(|h| h.handle)
    }

    pub fn handle_in(&self, context: ContextId) -> Option<GpuHandle> {
        self.state.lock().handle.and_then(|h| h.in_context(context))
    }

    pub fn owner(&self) -> Option<RendererId> {
        self.state.lock().owner
    }

    pub fn set_owner(&self, owner: RendererId) {
        self.state.lock().owner = Some(owner);
    }

    pub fn last_error(&self) -> Option<GpuError> {
        self.state.lock().last_error.clone()
    }

    pub(crate) fn store(&self, context: ContextId, handle: GpuHandle) {
        let mut state = self.state.lock();
        state.handle = Some(ContextHandle::new(context, handle));
        state.last_error = None;
    }

    pub(crate) fn record_failure(&self, err: GpuError) {
        let mut state = self.state.lock();
        state.handle = None;
        state.last_error = Some(err);
    }

    /// Takes the handle if it belongs to `context`.
    ///
    /// A handle from any other context is dropped as well: that context is
    /// gone or foreign, and its object cannot be deleted from here.
    pub(crate) fn take_in(&self, context: ContextId) -> Option<GpuHandle> {
        self.state.lock().handle.take().and_then(|h| h.in_context(context))
    }

    pub(crate) fn invalidate(&self, context: ContextId) -> bool {
        let mut state = self.state.lock();
        match state.handle {
            Some(h) if h.context == context => {
                state.handle = None;
                true
            }
            _ => false,
        }
    }

    /// Drops the handle regardless of its context.
    pub(crate) fn forget(&self) {
        self.state.lock().handle = None;
    }
}
