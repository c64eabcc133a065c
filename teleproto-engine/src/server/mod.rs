//! The server: shared state, request dispatch and per-connection engines.

mod connection;
pub mod dispatch;
pub mod registry;

use std::sync::{Arc, PoisonError, RwLock};

use teleproto_mtproto::transport::Transport;
use teleproto_tl_types::SchemaRegistry;
use tracing::warn;

use crate::config::ServerConfig;
use crate::operations;

pub use connection::ServerConnection;
pub use dispatch::{ClientInfo, Context, Operation, OperationFactory, Reply};
pub use registry::{AuthKeyStore, MemoryAuthKeyStore, Registry, UserRecord};

struct Inner {
    config: ServerConfig,
    registry: Registry,
    factories: RwLock<Vec<Arc<dyn OperationFactory>>>,
    schema: Option<SchemaRegistry>,
}

/// Cheaply cloneable handle to one server's state.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// A server with the built-in operations and an in-memory key store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Registry::default())
    }

    pub fn with_registry(config: ServerConfig, registry: Registry) -> Self {
        let schema = match SchemaRegistry::builtin() {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!("[teleproto] schema registry unavailable: {e}");
                None
            }
        };
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                factories: RwLock::new(operations::builtin_factories()),
                schema,
            }),
        }
    }

    /// Adds a factory after the ones already registered. Connections opened
    /// afterwards see it.
    pub fn register_operation_factory(&self, factory: Arc<dyn OperationFactory>) {
        self.inner.factories.write().unwrap_or_else(PoisonError::into_inner).push(factory);
    }

    pub fn factories(&self) -> Vec<Arc<dyn OperationFactory>> {
        self.inner.factories.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Schema name for a constructor id, for log messages.
    pub fn describe(&self, id: u32) -> String {
        match &self.inner.schema {
            Some(schema) => schema.describe(id),
            None => format!("{id:#010x}"),
        }
    }

    /// Engine for one newly accepted connection.
    pub fn connection<T: Transport>(&self, transport: T) -> ServerConnection<T> {
        ServerConnection::new(self.clone(), transport)
    }
}
