//! Use-case orchestration services.
//!
//! 1. **DAG** (`dag`): typed step pipelines with background and parallel edges
//! 2. **Instrumentation** (`instrument`): spans, latency and outcome metrics per execution
//! 3. **Background executor** (`worker`): bounded worker pool with pending-task tracking
//! 4. **Registry** (`registry`): init/shutdown sequencing of managed services

pub mod config;
pub mod dag;
pub mod instrument;
pub mod registry;
pub mod worker;

pub use config::{ConfigError, ServerConfig};
pub use dag::{Dag, DagEnv, Step};
pub use instrument::{instrument_dag_step, instrument_use_case, Instrumentation, Instrumented};
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use worker::{BackgroundError, BackgroundExecutor, BackgroundTask, TaskHandle, TaskOutcome};
