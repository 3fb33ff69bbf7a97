use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::config::ServerConfig;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Context handed to services during initialization.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: Arc<ServerConfig>,
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// Long-lived process component with an explicit start/stop lifecycle.
///
/// Use cases stay plain values; only shared infrastructure such as the
/// background executor or provider connection pools implements this.
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name, used for lookup and in lifecycle logs.
    fn name(&self) -> &'static str;

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Stops the service. With `terminate` set, skip graceful cleanup.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Holds managed services and sequences their lifecycle.
///
/// Services initialize in registration order and shut down in reverse, so a
/// service may rely on everything registered before it.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service and returns the shared handle.
    pub fn register<T: ManagedService>(&self, service: T) -> Arc<T> {
        let shared = Arc::new(service);
        self.register_shared(Arc::clone(&shared));
        shared
    }

    /// Registers a service that is already shared elsewhere.
    ///
    /// Registering a second service under an existing name replaces the first
    /// without changing its position in the lifecycle order.
    pub fn register_shared<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        let replaced = self.by_name.insert(name, service.clone()).is_some();
        self.by_type.insert(TypeId::of::<T>(), service);
        if !replaced {
            self.order.write().push(name);
        }
    }

    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initializes every service in registration order.
    ///
    /// If one fails, the services already initialized are shut down again in
    /// reverse order before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first `init()` failure, tagged with the service name.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.order.read().clone();
        for (idx, name) in order.iter().enumerate() {
            let Some(service) = self.get_by_name(name) else {
                continue;
            };
            if let Err(err) = service.init(ctx).await {
                for started in order[..idx].iter().rev() {
                    if let Some(service) = self.get_by_name(started) {
                        if let Err(rollback) = service.shutdown(true).await {
                            warn!(service = started, error = %rollback, "rollback shutdown failed");
                        }
                    }
                }
                return Err(err.context(format!("failed to initialize service '{name}'")));
            }
            info!(service = name, "service initialized");
        }
        Ok(())
    }

    /// Shuts every service down in reverse registration order.
    ///
    /// All services are visited even when one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown()` failure, tagged with the service name.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let order = self.order.read().clone();
        let mut first_err = None;
        for name in order.iter().rev() {
            let Some(service) = self.get_by_name(name) else {
                continue;
            };
            match service.shutdown(terminate).await {
                Ok(()) => info!(service = name, terminate, "service stopped"),
                Err(err) => {
                    warn!(service = name, error = %err, "service shutdown failed");
                    if first_err.is_none() {
                        first_err =
                            Some(err.context(format!("failed to shut down service '{name}'")));
                    }
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
