use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Numeric object name assigned by a [`GpuDevice`](super::GpuDevice).
///
/// Only meaningful together with the context that produced it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GpuHandle(u32);

impl GpuHandle {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one GPU context. Minted once per device instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A handle together with the context it is valid in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ContextHandle {
    pub context: ContextId,
    pub handle: GpuHandle,
}

impl ContextHandle {
    #[inline]
    pub const fn new(context: ContextId, handle: GpuHandle) -> Self {
        Self { context, handle }
    }

    /// Returns the handle if it belongs to `context`.
    #[inline]
    pub fn in_context(self, context: ContextId) -> Option<GpuHandle> {
        (self.context == context).then_some(self.handle)
    }
}

/// Opaque renderer identity, compared by value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RendererId(u64);

static NEXT_RENDERER: AtomicU64 = AtomicU64::new(1);

impl RendererId {
    pub fn next() -> Self {
        Self(NEXT_RENDERER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderer-{}", self.0)
    }
}
