//! Shared application state handed to every request handler.

use std::sync::Arc;

use crate::bridge::TerminalBridge;
use crate::documents::DocumentSet;

/// Read-only document set plus the bridge that owns all tmux/ttyd
/// resources. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentSet>,
    pub bridge: Arc<TerminalBridge>,
}

impl AppState {
    pub fn new(documents: DocumentSet, bridge: TerminalBridge) -> Self {
        Self {
            documents: Arc::new(documents),
            bridge: Arc::new(bridge),
        }
    }
}
