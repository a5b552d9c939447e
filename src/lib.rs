//! LanShare: a local file server.
//!
//! Serves a directory tree over HTTP GET, returns a small browser upload page at
//! `/upload`, and accepts streamed single-shot uploads over PUT. Uploaded names are
//! sanitised and never overwrite existing files.

pub mod config;
pub mod error;
pub mod frontend;
pub mod http;
pub mod logging;
pub mod naming;
pub mod router;
pub mod server;
pub mod upload;

use shadow_rs::shadow;

shadow!(build);

pub use config::{Args, ServerConfig};
pub use error::{ApiError, ServerError};
pub use server::FileServer;
