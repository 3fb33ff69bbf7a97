//! HTTP transport adapter: configuration, middleware, response mapping,
//! health endpoints, and shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod response;
pub mod shutdown;

pub use config::NetworkConfig;
pub use handlers::{AppState, Carrier};
pub use middleware::{build_http_layers, DrainPendingLayer};
pub use module::NetworkModule;
pub use response::{http_status, ApiResponse};
pub use shutdown::{HealthState, ShutdownController};
