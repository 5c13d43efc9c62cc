use crate::session::SessionHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Control surface of the voice engine
    pub handle: SessionHandle,
}

impl AppState {
    pub fn new(handle: SessionHandle) -> Self {
        Self { handle }
    }
}
