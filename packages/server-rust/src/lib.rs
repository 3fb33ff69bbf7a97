//! Backbone Server -- DAG composition, background executor, instrumentation, and the axum transport.

pub mod network;
pub mod service;
pub mod telemetry;

pub use network::{ApiResponse, AppState, Carrier, NetworkConfig, NetworkModule};
pub use service::{
    BackgroundExecutor, Dag, DagEnv, Instrumentation, ManagedService, ServerConfig, ServiceRegistry,
    Step,
};
