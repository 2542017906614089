/// Lifecycle of a renderer's GPU context.
///
/// `Uninitialized -> Live -> Lost -> Live -> ...`, ending in `TornDown`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContextState {
    Uninitialized,
    Live,
    Lost,
    TornDown,
}

impl ContextState {
    #[inline]
    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}
