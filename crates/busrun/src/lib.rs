//! # busrun
//!
//! Hosts plain message consumers as isolated services. Given a consumer type
//! and the assembly it ships in, busrun derives its queue endpoints by
//! convention, overlays an optional standalone override file, and runs the
//! resulting bus inside a dedicated isolation context with a guarded
//! lifecycle.
//!
//! Layers, leaves first:
//! - [`namer`] and [`ports`]: endpoint derivation and the shared port table.
//! - [`overlay`] and [`scanner`]: override files and consumer discovery.
//! - [`shell`]: the host shell state machine living inside a context.
//! - [`isolation`]: the context itself, one thread per hosted service.
//! - [`bootstrap`] and [`launcher`]: build, start, stop and install services.

pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod environment;
pub mod isolation;
pub mod launcher;
pub mod logging;
pub mod namer;
pub mod overlay;
pub mod ports;
pub mod scanner;
pub mod shell;

pub use busaddr;
pub use busaddr::EndpointAddress;
pub use busaddr::Protocol;
pub use busaddr::TypeName;

pub use bootstrap::BootstrapError;
pub use bootstrap::Bootstrapper;
pub use bootstrap::ConsumerType;
pub use bootstrap::ServiceDefinition;
pub use bootstrap::ServiceHandle;
pub use bootstrap::ShellSpec;
pub use bus::BootstrapPolicy;
pub use bus::BusConfiguration;
pub use bus::ServiceBus;
pub use config::HostingConfig;
pub use environment::ContextId;
pub use environment::Environment;
pub use environment::ServiceId;
pub use isolation::IsolationContext;
pub use isolation::IsolationError;
pub use launcher::Invocation;
pub use launcher::Launcher;
pub use launcher::RunningServices;
pub use namer::EndpointNamer;
pub use ports::PortAllocator;
pub use scanner::Assembly;
pub use scanner::MessageConsumer;
pub use shell::HostShell;
pub use shell::ShellState;
