//! # Bus collaborator
//!
//! The message bus itself (transport, retries, queue I/O) lives outside this
//! crate. A hosted service only needs the narrow surface below: hand it a
//! configuration, start it under a bootstrap policy, run one-time
//! provisioning, and release it.
//!
//! Bus implementations are organized like the other pluggable pieces: the
//! contract here, each implementation in its own module under `src/bus/`.

pub mod configuration;
pub mod memory;

pub use configuration::BusConfiguration;
pub use memory::BusEvent;
pub use memory::BusProbe;
pub use memory::RecordingBus;

use std::collections::BTreeSet;
use std::sync::Arc;

use busaddr::TypeName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus refused the configuration it was given.
    Configuration(String),
    Start(String),
    Deployment(String),
    Shutdown(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Bus rejected configuration: {}", msg),
            Self::Start(msg) => write!(f, "Bus failed to start: {}", msg),
            Self::Deployment(msg) => write!(f, "Bus deployment failed: {}", msg),
            Self::Shutdown(msg) => write!(f, "Bus shutdown failed: {}", msg),
        }
    }
}

impl std::error::Error for BusError {}

pub type Result<T> = std::result::Result<T, BusError>;

/// Strong type for bootstrap policy identifiers.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PolicyId(pub String);

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of consumer types that are active for a hosted service.
///
/// An empty set accepts every consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapPolicy {
    id: PolicyId,
    accepted: BTreeSet<TypeName>,
}

impl BootstrapPolicy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PolicyId(id.into()),
            accepted: BTreeSet::new(),
        }
    }

    /// A policy that activates every consumer it is shown.
    pub fn accept_all() -> Self {
        Self::new("default")
    }

    pub fn accept(mut self, consumer: TypeName) -> Self {
        self.accepted.insert(consumer);
        self
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn accepts(&self, consumer: &TypeName) -> bool {
        self.accepted.is_empty() || self.accepted.contains(consumer)
    }
}

/// The message bus as seen from inside an isolation context.
pub trait ServiceBus {
    /// Receives the generated, overlay-patched configuration.
    fn configure(&mut self, configuration: BusConfiguration) -> Result<()>;

    /// Begins processing messages for the consumers `policy` accepts.
    fn start(&mut self, policy: &BootstrapPolicy) -> Result<()>;

    /// Provisions queues and other durable resources without processing
    /// any message.
    fn initial_deployment(&mut self, policy: &BootstrapPolicy, principal: &str) -> Result<()>;

    /// Releases everything the bus holds. Called at most once.
    fn dispose(&mut self) -> Result<()>;
}

/// Builds a bus. Invoked inside the isolation context, so the bus itself
/// never crosses the context boundary.
pub type BusFactory = Arc<dyn Fn() -> Box<dyn ServiceBus> + Send + Sync>;
