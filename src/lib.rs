//! md-open - preview markdown files in the browser, with an optional
//! catchup panel mirroring a tmux pane.
//!
//! The library exposes the HTTP serving layer: document and asset routes,
//! the tmux/ttyd bridge, and the server lifecycle.

pub mod assets;
pub mod binder;
pub mod bridge;
pub mod config;
pub mod content_type;
pub mod documents;
pub mod error;
pub mod http_server;
pub mod server;
pub mod state;

pub use config::{BridgeSettings, ServerConfig};
pub use error::{ApiError, ServerError};
pub use server::{start, start_with_runner, ServerHandle};
