use thiserror::Error;

use super::GpuHandle;

/// Failure reported by a GPU device while creating or using an object.
///
/// These never abort a frame: the caller records the failure on the resource
/// and keeps rendering everything else.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GpuError {
    #[error("texture limit reached ({limit} live textures)")]
    OutOfTextureUnits { limit: usize },

    #[error("invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("pixel data for `{name}` is {actual} bytes, expected {expected}")]
    PixelDataSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("texture `{0}` has no GPU handle in the current context")]
    MissingTexture(String),

    #[error("source data for `{0}` was released after upload")]
    SourceReleased(String),

    #[error("unknown GPU handle {0}")]
    UnknownHandle(GpuHandle),

    #[error("framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),

    #[error("shader program `{name}` failed to link: {reason}")]
    Link { name: String, reason: String },

    #[error("no live GPU context")]
    NoContext,

    #[error("surface unavailable: {0}")]
    Surface(String),
}
