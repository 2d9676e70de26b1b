//! # Environment
//!
//! The top-level execution environment shared by every hosted service in the
//! process. It holds:
//! - the well-known owner slot that publishes the shared port table,
//! - a registry of live isolation contexts,
//! - id counters and the process-wide [`HostingConfig`].
//!
//! Uses DashMap for the context registry so services can spawn and unload
//! contexts concurrently without a global lock.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::config::HostingConfig;
use crate::ports;
use crate::ports::PortAllocator;
use crate::ports::PortError;
use crate::ports::PortTable;

/// Strong type for isolation context identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// Strong type for hosted service identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServiceId(pub u64);

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service-{}", self.0)
    }
}

/// What the registry knows about a live isolation context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextInfo {
    pub id: ContextId,
    pub name: String,
}

static GLOBAL: OnceLock<Arc<Environment>> = OnceLock::new();

pub struct Environment {
    config: HostingConfig,
    port_owner: Mutex<Option<Arc<PortTable>>>,
    contexts: DashMap<ContextId, ContextInfo>,
    next_context_id: AtomicU64,
    next_service_id: AtomicU64,
}

impl Environment {
    pub fn new(config: HostingConfig) -> Self {
        Self {
            config,
            port_owner: Mutex::new(None),
            contexts: DashMap::new(),
            next_context_id: AtomicU64::new(1),
            next_service_id: AtomicU64::new(1),
        }
    }

    /// Installs the process-wide environment built from `config`.
    ///
    /// Returns `false` if it already exists, in which case its configuration
    /// is left as it was.
    pub fn init_global(config: HostingConfig) -> bool {
        let mut installed = false;
        GLOBAL.get_or_init(|| {
            installed = true;
            Arc::new(Environment::new(config))
        });
        installed
    }

    /// The process-wide environment. Created with default configuration if
    /// [`init_global`](Self::init_global) was not called first.
    pub fn global() -> Arc<Environment> {
        GLOBAL
            .get_or_init(|| Arc::new(Environment::new(HostingConfig::default())))
            .clone()
    }

    pub fn config(&self) -> &HostingConfig {
        &self.config
    }

    /// Claims the port-owner slot for `context` if nobody holds it yet.
    ///
    /// Returns `true` when `context` became the owner. The table outlives the
    /// owner context so assignments stay stable after it unloads.
    pub fn designate_owner(&self, context: ContextId) -> bool {
        let mut slot = self.port_owner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(Arc::new(PortTable::new(context, self.config.base_port)));
        tracing::info!(
            owner = %context,
            base_port = self.config.base_port,
            "port table owner designated"
        );
        true
    }

    /// The context currently holding the port-owner slot.
    pub fn port_owner(&self) -> Option<ContextId> {
        self.port_allocator().ok().map(|ports| ports.owner())
    }

    /// Resolves a proxy onto the owner's port table.
    pub fn port_allocator(&self) -> ports::Result<PortAllocator> {
        let slot = self.port_owner.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|table| PortAllocator::new(Arc::clone(table)))
            .ok_or(PortError::Unavailable)
    }

    pub(crate) fn register_context(&self, name: &str) -> ContextId {
        let id = ContextId(self.next_context_id.fetch_add(1, Ordering::Relaxed));
        self.contexts.insert(
            id,
            ContextInfo {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub(crate) fn remove_context(&self, id: ContextId) -> bool {
        self.contexts.remove(&id).is_some()
    }

    pub(crate) fn next_service_id(&self) -> ServiceId {
        ServiceId(self.next_service_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Every isolation context that has been spawned and not yet unloaded,
    /// ordered by id.
    pub fn live_contexts(&self) -> Vec<ContextInfo> {
        let mut all: Vec<_> = self.contexts.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|info| info.id);
        all
    }

    pub fn is_live(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(HostingConfig::default())
    }
}
